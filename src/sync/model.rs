use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use strum::Display;

use super::store::sanitize_key;

/// Current state of a bowl in circulation, stored at `activeBowls/{code}`.
///
/// Prepared records share this shape; they are appended per prep scan and never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bowl {
    pub code: String,
    pub dish: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default = "not_available")]
    pub company: String,
    #[serde(default = "not_available")]
    pub customer: String,
    pub creation_date: String,
    pub timestamp: String,
}

pub type PreparedRecord = Bowl;

/// Immutable copy of an active bowl at the moment it came back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnedRecord {
    #[serde(flatten)]
    pub bowl: Bowl,
    pub return_date: String,
    pub return_time: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScanMode {
    #[default]
    Prep,
    Return,
}

impl ScanMode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Prep => Self::Return,
            Self::Return => Self::Prep,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanHistoryEntry {
    pub code: String,
    pub user: String,
    pub mode: ScanMode,
    pub timestamp: String,
}

/// Per-user tally record; one per scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MyScanEntry {
    pub code: String,
    pub user: String,
    pub mode: ScanMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dish: Option<String>,
    pub date: String,
    pub timestamp: String,
}

/// Who ordered which bowl, as delivered by the last bulk patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerReference {
    pub bowl_id: String,
    pub company: String,
    pub customer_name: String,
}

pub const NOT_AVAILABLE: &str = "N/A";

fn not_available() -> String {
    NOT_AVAILABLE.to_owned()
}

/// The instant a scan or patch happens, with the renderings stored remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment(pub DateTime<Local>);

impl Moment {
    pub fn now() -> Self {
        Self(Local::now())
    }

    pub fn date(&self) -> String {
        self.0.format(DATE_FORMAT).to_string()
    }

    pub fn time(&self) -> String {
        self.0.format("%H:%M:%S").to_string()
    }

    pub fn timestamp(&self) -> String {
        self.0.to_rfc3339()
    }

    /// `{millis}-{code}`, unique per scan of a code.
    pub fn record_key(&self, code: &str) -> String {
        sanitize_key(&format!("{}-{code}", self.0.timestamp_millis()))
    }

    /// `{millis}-{code}-{user}`
    pub fn user_record_key(&self, code: &str, user: &str) -> String {
        sanitize_key(&format!("{}-{code}-{user}", self.0.timestamp_millis()))
    }
}

pub const DATE_FORMAT: &str = "%Y-%m-%d";
