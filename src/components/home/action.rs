use color_eyre::Result;
use tokio::time::sleep;
use tracing::debug;

use crate::{
    action::Action,
    components::home::{Home, PREP_KEYS, RETURN_KEYS},
    export::ExportKind,
    sync::{self, model::ScanMode, scan::ScanRequest},
};

#[derive(Debug, PartialEq, Eq)]
pub enum HomeAction {
    None,
    ToggleMode,
    CycleDish { forward: bool },
    Type(char),
    Paste(String),
    Backspace,
    Submit,
    Export,
    Reattach,
    SetStatusLine(String),
}

pub fn perform(home: &mut Home, action: HomeAction) -> Result<Option<Action>> {
    match do_perform(home, action) {
        result @ Ok(Some(Action::SetStatusLine(_))) => {
            home.need_status_line_reset = true;
            result
        }
        result => result,
    }
}

fn do_perform(home: &mut Home, action: HomeAction) -> Result<Option<Action>> {
    let state = &mut home.state;
    match action {
        HomeAction::ToggleMode => {
            state.mode = state.mode.toggled();
            let keys = match state.mode {
                ScanMode::Prep => PREP_KEYS.clone(),
                ScanMode::Return => RETURN_KEYS.clone(),
            };
            return Ok(Some(Action::SetRelevantKeys(keys)));
        }
        HomeAction::CycleDish { forward } => {
            if state.mode == ScanMode::Prep {
                state.cycle_dish(&home.config.dishes, forward);
            }
        }
        HomeAction::Type(c) => {
            if state.input_enabled {
                state.input.push(c);
            }
        }
        HomeAction::Paste(text) => {
            if state.input_enabled {
                state.input.push_str(text.trim());
            }
        }
        HomeAction::Backspace => {
            state.input.pop();
        }
        HomeAction::Submit => return submit(home),
        HomeAction::Export => {
            home.send_sync(sync::Command::Export(ExportKind::All));
            return Ok(Some(Action::SetStatusLine("Exporting…".into())));
        }
        HomeAction::Reattach => {
            home.send_sync(sync::Command::Attach);
            return Ok(Some(Action::SetStatusLine("Reconnecting…".into())));
        }
        HomeAction::SetStatusLine(msg) => return Ok(Some(Action::SetStatusLine(msg))),
        HomeAction::None => {}
    }
    if home.need_status_line_reset {
        home.need_status_line_reset = false;
        return Ok(Some(Action::SetStatusLine("".into())));
    }
    Ok(None)
}

fn submit(home: &mut Home) -> Result<Option<Action>> {
    if !home.state.input_enabled {
        return Ok(None);
    }
    let code = std::mem::take(&mut home.state.input);
    if code.trim().is_empty() {
        return Ok(None);
    }
    let mode = home.state.mode;
    let dish = match mode {
        ScanMode::Prep => home.state.selected_dish(&home.config.dishes).cloned(),
        ScanMode::Return => None,
    };
    let request = ScanRequest {
        code: code.trim().to_owned(),
        mode,
        user: home.config.user.clone(),
        dish,
    };
    home.send_sync(sync::Command::Scan {
        request,
        customers: home.state.projection.customers.clone(),
    });

    home.state.input_enabled = false;
    schedule_input_reenable(home);
    Ok(Some(Action::SetStatusLine(format!("⏳ {mode} {}", code.trim()))))
}

/// The input comes back after the cooldown whether or not the write has finished.
fn schedule_input_reenable(home: &Home) {
    let Some(action_tx) = home.action_tx.clone() else {
        return;
    };
    let cooldown = home.config.scan_cooldown();
    tokio::spawn(async move {
        sleep(cooldown).await;
        if let Err(err) = action_tx.send(Action::EnableScanInput) {
            debug!("Unable to re-enable scan input: {err:?}");
        }
    });
}
