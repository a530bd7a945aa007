use tracing::debug;

use super::{Home, action::HomeAction};
use crate::sync::{Event, delta::DeltaSync, model::ScanMode};

pub fn handle(home: &mut Home, event: Event) -> HomeAction {
    let state = &mut home.state;
    match event {
        Event::Attached { generation, today } => {
            let engine = DeltaSync::new(today);
            engine.start(&mut state.projection);
            state.engine = Some(engine);
            state.generation = generation;
            HomeAction::SetStatusLine(format!("Syncing {today}…"))
        }
        Event::Feed { generation, event } => {
            if generation != state.generation {
                debug!("Dropping feed event of stale attachment {generation}");
            } else if let Some(engine) = &state.engine {
                engine.apply(&mut state.projection, &event);
            }
            HomeAction::None
        }
        Event::Connectivity(connected) => {
            let was_connected = state.projection.connected;
            state.projection.connected = connected;
            match (was_connected, connected) {
                (true, false) => HomeAction::SetStatusLine("⚠ Connection lost".into()),
                _ => HomeAction::None,
            }
        }
        Event::ScanCommitted(outcome) => {
            let verb = match outcome.mode {
                ScanMode::Prep => "Prepared",
                ScanMode::Return => "Returned",
            };
            let bowl = outcome.bowl;
            HomeAction::SetStatusLine(format!(
                "✔ {verb} {} ({} / {})",
                bowl.code, bowl.company, bowl.customer
            ))
        }
        Event::PatchApplied(summary) => HomeAction::SetStatusLine(format!(
            "✔ Patch: {} created, {} updated",
            summary.created, summary.updated
        )),
        Event::ResetDone => HomeAction::SetStatusLine("✔ Prepared history cleared".into()),
        Event::Exported(paths) => HomeAction::SetStatusLine(match paths.first() {
            Some(first) => format!(
                "✔ Exported {} sheet(s) to {}",
                paths.len(),
                first.parent().unwrap_or(first).display()
            ),
            None => "Nothing exported".into(),
        }),
        Event::Failure(msg) => HomeAction::SetStatusLine(format!("⛔ {msg}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{
        delta::{Feed, FeedEvent},
        store::StoreEvent,
    };
    use chrono::NaiveDate;
    use serde_json::json;

    fn active(key: &str) -> FeedEvent {
        FeedEvent {
            feed: Feed::Active,
            event: StoreEvent::Added {
                key: key.into(),
                value: json!({"code": key}),
            },
        }
    }

    #[test]
    fn test_drops_events_of_stale_attachment() {
        let mut home = Home::default();
        let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();

        handle(&mut home, Event::Attached { generation: 1, today });
        handle(&mut home, Event::Feed { generation: 1, event: active("B1") });
        handle(&mut home, Event::Attached { generation: 2, today });
        handle(&mut home, Event::Feed { generation: 1, event: active("B2") });
        handle(&mut home, Event::Feed { generation: 2, event: active("B1") });

        assert_eq!(home.state.projection.active_count, 1);
    }

    #[test]
    fn test_reports_connection_loss_once() {
        let mut home = Home::default();

        assert_eq!(handle(&mut home, Event::Connectivity(true)), HomeAction::None);
        assert!(matches!(
            handle(&mut home, Event::Connectivity(false)),
            HomeAction::SetStatusLine(_)
        ));
        assert_eq!(handle(&mut home, Event::Connectivity(false)), HomeAction::None);
    }
}
