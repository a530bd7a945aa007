//! Bulk upsert of bowls from externally supplied customer/order data.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use itertools::Itertools;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use super::{
    model::{Bowl, CustomerReference, DATE_FORMAT, Moment, NOT_AVAILABLE},
    paths,
    store::{MultiPathUpdate, RemoteStore, StoreError, is_valid_key},
};

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("patch data is not valid: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("patch data contains no bowl codes")]
    Empty,
    #[error("bowl code {0:?} contains characters that cannot be stored")]
    InvalidCode(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Payload {
    Many(Vec<CompanyRecord>),
    One(CompanyRecord),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompanyRecord {
    pub name: String,
    #[serde(default)]
    pub deliveries: Vec<Delivery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Delivery {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub dishes: Vec<DishGroup>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DishGroup {
    pub label: String,
    #[serde(default)]
    pub bowl_codes: Vec<String>,
    #[serde(default)]
    pub users: Vec<PatchUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatchUser {
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatchSummary {
    pub created: usize,
    pub updated: usize,
}

pub fn parse(raw: &str) -> Result<Vec<CompanyRecord>, PatchError> {
    Ok(match serde_json::from_str(raw)? {
        Payload::Many(records) => records,
        Payload::One(record) => vec![record],
    })
}

/// First `YYYY-MM-DD` embedded in a delivery identifier.
pub fn delivery_date(identifier: &str) -> Option<NaiveDate> {
    let bytes = identifier.as_bytes();
    bytes.windows(10).enumerate().find_map(|(start, window)| {
        let shaped = window.iter().enumerate().all(|(idx, byte)| match idx {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        });
        let candidate = identifier.get(start..start + 10)?;
        shaped
            .then(|| NaiveDate::parse_from_str(candidate, DATE_FORMAT).ok())
            .flatten()
    })
}

/// One bowl record per leaf code; a code listed twice keeps its last occurrence.
pub fn plan(records: &[CompanyRecord], now: Moment) -> Result<BTreeMap<String, Bowl>, PatchError> {
    let mut staged = BTreeMap::new();
    for company in records {
        for delivery in &company.deliveries {
            let creation_date = delivery_date(&delivery.id)
                .map(|it| it.format(DATE_FORMAT).to_string())
                .unwrap_or_else(|| now.date());
            for dish in &delivery.dishes {
                let customer = dish.users.iter().map(|it| it.username.trim()).join(", ");
                for code in dish.bowl_codes.iter().map(|it| it.trim()) {
                    if !is_valid_key(code) {
                        return Err(PatchError::InvalidCode(code.to_owned()));
                    }
                    let bowl = Bowl {
                        code: code.to_owned(),
                        dish: dish.label.clone(),
                        user: None,
                        company: company.name.clone(),
                        customer: if customer.is_empty() {
                            NOT_AVAILABLE.to_owned()
                        } else {
                            customer.clone()
                        },
                        creation_date: creation_date.clone(),
                        timestamp: now.timestamp(),
                    };
                    staged.insert(code.to_owned(), bowl);
                }
            }
        }
    }
    if staged.is_empty() {
        return Err(PatchError::Empty);
    }
    Ok(staged)
}

pub async fn apply(
    store: &dyn RemoteStore,
    raw: &str,
    now: Moment,
) -> Result<PatchSummary, PatchError> {
    let staged = plan(&parse(raw)?, now)?;

    let existing: BTreeSet<String> = store
        .read_once(paths::collection(paths::ACTIVE_BOWLS)?)
        .await?
        .and_then(|it| it.as_object().map(|map| map.keys().cloned().collect()))
        .unwrap_or_default();
    let updated = staged.keys().filter(|code| existing.contains(*code)).count();
    let summary = PatchSummary {
        created: staged.len() - updated,
        updated,
    };

    let mut update = MultiPathUpdate::new();
    let mut customers = Vec::with_capacity(staged.len());
    for (code, bowl) in &staged {
        update.set(paths::entry(paths::ACTIVE_BOWLS, code)?, bowl)?;
        customers.push(CustomerReference {
            bowl_id: code.clone(),
            company: bowl.company.clone(),
            customer_name: bowl.customer.clone(),
        });
    }
    update.set(paths::collection(paths::CUSTOMER_DATA)?, &customers)?;
    update.set(paths::collection(paths::LAST_SYNC)?, &now.timestamp())?;

    debug!("Submitting patch of {} bowls", staged.len());
    store.atomic_update(update).await?;
    info!(
        "Patch applied: {} created, {} updated",
        summary.created, summary.updated
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::store::{MemoryStore, StorePath};
    use chrono::{Local, TimeZone};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn now() -> Moment {
        Moment(Local.with_ymd_and_hms(2026, 10, 18, 6, 30, 0).unwrap())
    }

    fn payload() -> String {
        json!({
            "name": "Acme",
            "deliveries": [{
                "id": "ORD-2026-10-20-7",
                "dishes": [{
                    "label": "A",
                    "bowlCodes": ["B200", "B201"],
                    "users": [{"username": "Co1"}, {"username": "Co2"}],
                }],
            }],
        })
        .to_string()
    }

    async fn read(store: &MemoryStore, raw: &str) -> Option<Value> {
        store.read_once(StorePath::parse(raw).unwrap()).await.unwrap()
    }

    #[test]
    fn test_delivery_date_extraction() {
        assert_eq!(
            delivery_date("ORD-2026-10-20-7"),
            NaiveDate::from_ymd_opt(2026, 10, 20)
        );
        assert_eq!(delivery_date("2026-13-01"), None);
        assert_eq!(delivery_date("ORD-7"), None);
        assert_eq!(delivery_date("ö-2026-02-03"), NaiveDate::from_ymd_opt(2026, 2, 3));
    }

    #[test]
    fn test_parse_accepts_single_record_or_array() {
        assert_eq!(parse(&payload()).unwrap().len(), 1);
        assert_eq!(parse(&format!("[{}, {}]", payload(), payload())).unwrap().len(), 2);
        assert!(matches!(parse("{not json"), Err(PatchError::Parse(_))));
    }

    #[test]
    fn test_plan_defaults() {
        let records = parse(
            &json!({"name": "Beta", "deliveries": [{"id": "x", "dishes": [
                {"label": "C", "bowlCodes": ["B1"]}
            ]}]})
            .to_string(),
        )
        .unwrap();

        let staged = plan(&records, now()).unwrap();

        assert_eq!(staged["B1"].customer, NOT_AVAILABLE);
        assert_eq!(staged["B1"].creation_date, "2026-10-18");
        assert_eq!(staged["B1"].company, "Beta");
    }

    #[test]
    fn test_plan_rejects_empty_payload() {
        let records = parse(r#"{"name": "Acme", "deliveries": []}"#).unwrap();
        assert!(matches!(plan(&records, now()), Err(PatchError::Empty)));
    }

    #[tokio::test]
    async fn test_apply_classifies_created_and_updated() {
        let store = MemoryStore::new();
        let mut update = MultiPathUpdate::new();
        update
            .set(
                StorePath::parse("activeBowls/B200").unwrap(),
                &json!({"code": "B200", "dish": "Z", "company": "Old"}),
            )
            .unwrap();
        store.atomic_update(update).await.unwrap();

        let summary = apply(&store, &payload(), now()).await.unwrap();

        assert_eq!(summary, PatchSummary { created: 1, updated: 1 });
        for code in ["B200", "B201"] {
            let bowl = read(&store, &format!("activeBowls/{code}")).await.unwrap();
            assert_eq!(bowl["dish"], json!("A"));
            assert_eq!(bowl["company"], json!("Acme"));
            assert_eq!(bowl["customer"], json!("Co1, Co2"));
            assert_eq!(bowl["creationDate"], json!("2026-10-20"));
        }
        assert_eq!(
            read(&store, "customerData").await,
            Some(json!([
                {"bowl_id": "B200", "company": "Acme", "customer_name": "Co1, Co2"},
                {"bowl_id": "B201", "company": "Acme", "customer_name": "Co1, Co2"},
            ]))
        );
        assert_eq!(read(&store, "lastSync").await, Some(json!(now().timestamp())));
    }

    #[tokio::test]
    async fn test_transport_failure_writes_nothing() {
        let store = MemoryStore::new();
        store.set_connected(false);

        let result = apply(&store, &payload(), now()).await;

        assert!(matches!(result, Err(PatchError::Store(StoreError::Offline))));
        store.set_connected(true);
        assert_eq!(store.snapshot(), json!({}));
    }
}
