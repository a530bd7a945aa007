//! Turns one scanned code into one atomic write.
//!
//! Return scans read the active record first; that read is not part of the write
//! transaction, so two clients returning the same code at once can both append a
//! returned record.

use thiserror::Error;
use tracing::{debug, info};

use super::{
    model::{
        Bowl, CustomerReference, Moment, MyScanEntry, NOT_AVAILABLE, ReturnedRecord,
        ScanHistoryEntry, ScanMode,
    },
    paths,
    store::{MultiPathUpdate, RemoteStore, StoreError, is_valid_key},
};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("nothing was scanned")]
    EmptyCode,
    #[error("code {0:?} contains characters that cannot be stored")]
    InvalidCode(String),
    #[error("no dish selected for prep")]
    MissingDish,
    #[error("not connected, scan was not recorded")]
    Offline,
    #[error("bowl {0} is not in circulation")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub code: String,
    pub mode: ScanMode,
    pub user: String,
    pub dish: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub mode: ScanMode,
    pub bowl: Bowl,
    pub paths_written: usize,
}

pub fn lookup_customer<'a>(
    customers: &'a [CustomerReference],
    code: &str,
) -> Option<&'a CustomerReference> {
    customers.iter().find(|it| it.bowl_id == code)
}

pub async fn scan(
    store: &dyn RemoteStore,
    request: &ScanRequest,
    customers: &[CustomerReference],
    now: Moment,
) -> Result<ScanOutcome, ScanError> {
    let code = validate(request)?;
    if !store.is_connected() {
        return Err(ScanError::Offline);
    }
    let (bowl, update) = match request.mode {
        ScanMode::Prep => prep_update(code, request, customers, now)?,
        ScanMode::Return => {
            let active = store
                .read_once(paths::entry(paths::ACTIVE_BOWLS, code)?)
                .await?
                .ok_or_else(|| ScanError::NotFound(code.to_owned()))?;
            let active: Bowl = serde_json::from_value(active).map_err(StoreError::from)?;
            return_update(active, request, now)?
        }
    };
    let paths_written = update.len();
    debug!("Submitting {} scan of {code} touching {paths_written} paths", request.mode);
    store.atomic_update(update).await?;
    info!("{} scan of {code} by {} committed", request.mode, request.user);
    Ok(ScanOutcome {
        mode: request.mode,
        bowl,
        paths_written,
    })
}

fn validate(request: &ScanRequest) -> Result<&str, ScanError> {
    let code = request.code.trim();
    if code.is_empty() {
        return Err(ScanError::EmptyCode);
    }
    if !is_valid_key(code) {
        return Err(ScanError::InvalidCode(code.to_owned()));
    }
    Ok(code)
}

/// Blind upsert of the active bowl plus the three append-only records.
pub fn prep_update(
    code: &str,
    request: &ScanRequest,
    customers: &[CustomerReference],
    now: Moment,
) -> Result<(Bowl, MultiPathUpdate), ScanError> {
    let dish = request
        .dish
        .clone()
        .filter(|it| !it.trim().is_empty())
        .ok_or(ScanError::MissingDish)?;
    let reference = lookup_customer(customers, code);
    let bowl = Bowl {
        code: code.to_owned(),
        dish: dish.clone(),
        user: Some(request.user.clone()),
        company: reference.map_or_else(|| NOT_AVAILABLE.to_owned(), |it| it.company.clone()),
        customer: reference
            .map_or_else(|| NOT_AVAILABLE.to_owned(), |it| it.customer_name.clone()),
        creation_date: now.date(),
        timestamp: now.timestamp(),
    };

    let mut update = MultiPathUpdate::new();
    update.set(paths::entry(paths::ACTIVE_BOWLS, code)?, &bowl)?;
    update.set(paths::entry(paths::PREPARED_BOWLS, &now.record_key(code))?, &bowl)?;
    stage_audit(&mut update, code, request, Some(dish), now)?;
    Ok((bowl, update))
}

/// Tombstones the active bowl and appends its returned copy.
pub fn return_update(
    active: Bowl,
    request: &ScanRequest,
    now: Moment,
) -> Result<(Bowl, MultiPathUpdate), ScanError> {
    let code = active.code.clone();
    let dish = Some(active.dish.clone());
    let returned = ReturnedRecord {
        bowl: Bowl {
            user: Some(request.user.clone()),
            ..active
        },
        return_date: now.date(),
        return_time: now.time(),
    };

    let mut update = MultiPathUpdate::new();
    update.remove(paths::entry(paths::ACTIVE_BOWLS, &code)?);
    update.set(paths::entry(paths::RETURNED_BOWLS, &now.record_key(&code))?, &returned)?;
    stage_audit(&mut update, &code, request, dish, now)?;
    Ok((returned.bowl, update))
}

fn stage_audit(
    update: &mut MultiPathUpdate,
    code: &str,
    request: &ScanRequest,
    dish: Option<String>,
    now: Moment,
) -> Result<(), StoreError> {
    let my_scan = MyScanEntry {
        code: code.to_owned(),
        user: request.user.clone(),
        mode: request.mode,
        dish,
        date: now.date(),
        timestamp: now.timestamp(),
    };
    let history = ScanHistoryEntry {
        code: code.to_owned(),
        user: request.user.clone(),
        mode: request.mode,
        timestamp: now.timestamp(),
    };
    update.set(
        paths::entry(paths::MY_SCANS, &now.user_record_key(code, &request.user))?,
        &my_scan,
    )?;
    update.set(paths::entry(paths::SCAN_HISTORY, &now.record_key(code))?, &history)?;
    Ok(())
}
