//! Keeps the projection's counters in step with the remote collections from add/remove
//! notifications alone, so that whole collections never have to be downloaded.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use strum::Display;
use tracing::{debug, warn};

use super::{
    model::{CustomerReference, DATE_FORMAT, MyScanEntry, PreparedRecord},
    paths,
    projection::ProjectionState,
    store::{EventStream, RemoteStore, StoreError, StoreEvent, SubscriptionKind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Feed {
    Active,
    Prepared,
    Returned,
    MyScans,
    Customers,
    LastSync,
}

impl Feed {
    pub const ALL: [Self; 6] = [
        Self::Active,
        Self::Prepared,
        Self::Returned,
        Self::MyScans,
        Self::Customers,
        Self::LastSync,
    ];

    fn source(self) -> (&'static str, SubscriptionKind) {
        match self {
            Self::Active => (paths::ACTIVE_BOWLS, SubscriptionKind::Children),
            Self::Prepared => (paths::PREPARED_BOWLS, SubscriptionKind::Children),
            Self::Returned => (paths::RETURNED_BOWLS, SubscriptionKind::Children),
            Self::MyScans => (paths::MY_SCANS, SubscriptionKind::Children),
            Self::Customers => (paths::CUSTOMER_DATA, SubscriptionKind::Value),
            Self::LastSync => (paths::LAST_SYNC, SubscriptionKind::Value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedEvent {
    pub feed: Feed,
    pub event: StoreEvent,
}

/// Opens every feed. Each stream first replays what is already stored.
pub async fn subscribe_all(store: &dyn RemoteStore) -> Result<Vec<(Feed, EventStream)>, StoreError> {
    let mut streams = Vec::with_capacity(Feed::ALL.len());
    for feed in Feed::ALL {
        let (collection, kind) = feed.source();
        let stream = store.subscribe(paths::collection(collection)?, kind).await?;
        streams.push((feed, stream));
    }
    Ok(streams)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReturnDate {
    return_date: String,
}

/// Reducer from feed events to projection updates.
///
/// "Today" is fixed when the engine is created and is not moved across midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaSync {
    today: NaiveDate,
}

impl DeltaSync {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Prepares `state` for a replay of all feeds.
    pub fn start(&self, state: &mut ProjectionState) {
        state.reset_counters();
    }

    /// Applies one event, returning whether the projection changed.
    pub fn apply(&self, state: &mut ProjectionState, feed_event: &FeedEvent) -> bool {
        let today = self.today.format(DATE_FORMAT).to_string();
        match (feed_event.feed, &feed_event.event) {
            (Feed::Active, StoreEvent::Added { .. }) => {
                state.active_count += 1;
                true
            }
            (Feed::Active, StoreEvent::Removed { key }) => {
                if state.active_count == 0 {
                    warn!("Active bowl {key} removed while the count is already zero");
                    return false;
                }
                state.active_count -= 1;
                true
            }
            (Feed::Prepared, StoreEvent::Added { key, value }) => {
                let Some(record) = decode::<PreparedRecord>(feed_event.feed, key, value) else {
                    return false;
                };
                if record.creation_date != today {
                    return false;
                }
                if state.prepared_today.insert(key.clone(), record).is_none() {
                    state.prepared_today_count += 1;
                }
                true
            }
            (Feed::Returned, StoreEvent::Added { key, value }) => {
                match decode::<ReturnDate>(feed_event.feed, key, value) {
                    Some(record) if record.return_date == today => {
                        state.returned_today_count += 1;
                        true
                    }
                    _ => false,
                }
            }
            (Feed::MyScans, StoreEvent::Added { key, value }) => {
                match decode::<MyScanEntry>(feed_event.feed, key, value) {
                    Some(entry) if entry.date == today => {
                        *state.scan_tallies.entry(entry.user).or_default() += 1;
                        true
                    }
                    _ => false,
                }
            }
            (Feed::Prepared, StoreEvent::Cleared) => {
                debug!("Prepared bowls were reset remotely");
                state.clear_prepared_today();
                true
            }
            (Feed::MyScans, StoreEvent::Cleared) => {
                state.scan_tallies.clear();
                true
            }
            (Feed::Customers, StoreEvent::Value(value)) => {
                state.customers = decode_customers(value.as_ref()).into();
                true
            }
            (Feed::LastSync, StoreEvent::Value(value)) => {
                state.last_sync = value.as_ref().map(|it| match it {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                });
                true
            }
            _ => false,
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(feed: Feed, key: &str, value: &Value) -> Option<T> {
    match T::deserialize(value) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!("Skipping undecodable {feed} record {key}: {err}");
            None
        }
    }
}

fn decode_customers(value: Option<&Value>) -> Vec<CustomerReference> {
    let entries: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(map)) => map.values().collect(),
        _ => vec![],
    };
    entries
        .into_iter()
        .filter_map(|entry| match CustomerReference::deserialize(entry) {
            Ok(reference) => Some(reference),
            Err(err) => {
                warn!("Skipping undecodable customer reference {entry}: {err}");
                None
            }
        })
        .collect()
}
