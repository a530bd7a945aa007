use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{Datelike, NaiveDate};
use color_eyre::{Result, eyre::Context};
use serde::de::DeserializeOwned;
use serde_json::Value;
use strum::Display;
use tracing::{info, warn};

use crate::sync::{
    model::{Bowl, ReturnedRecord},
    paths,
    store::RemoteStore,
};

pub mod csv;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, clap::ValueEnum)]
#[strum(serialize_all = "lowercase")]
pub enum ExportKind {
    Active,
    Returned,
    All,
}

/// A named table ready to be written as one spreadsheet sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: &'static str,
    pub headers: &'static [&'static str],
    pub rows: Vec<Vec<String>>,
}

const ACTIVE_HEADERS: &[&str] = &[
    "Code", "Dish", "Company", "Customer", "User", "Creation Date", "Timestamp",
];
const RETURNED_HEADERS: &[&str] = &[
    "Code", "Dish", "Company", "Customer", "User", "Creation Date", "Return Date",
    "Return Time",
];

/// Reads the source collections once and writes one CSV file per sheet.
pub async fn export(
    store: &dyn RemoteStore,
    kind: ExportKind,
    export_dir: &Path,
    day: NaiveDate,
) -> Result<Vec<PathBuf>> {
    let mut sheets = vec![];
    if matches!(kind, ExportKind::Active | ExportKind::All) {
        let value = store
            .read_once(paths::collection(paths::ACTIVE_BOWLS)?)
            .await
            .wrap_err("reading active bowls")?;
        sheets.push(active_sheet(value));
    }
    if matches!(kind, ExportKind::Returned | ExportKind::All) {
        let value = store
            .read_once(paths::collection(paths::RETURNED_BOWLS)?)
            .await
            .wrap_err("reading returned bowls")?;
        sheets.push(returned_sheet(value));
    }

    let mut written = vec![];
    for sheet in &sheets {
        let path = build_export_file_path(export_dir, day, sheet.name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).wrap_err("Failed to create export directory")?;
        }
        let file = fs::File::create(&path)
            .with_context(|| format!("Failed to create CSV file at {}", path.display()))?;
        csv::write_sheet(sheet, file)?;
        info!("Exported {} rows to {}", sheet.rows.len(), path.display());
        written.push(path);
    }
    Ok(written)
}

pub fn active_sheet(value: Option<Value>) -> Sheet {
    let mut bowls: Vec<Bowl> = records(value);
    bowls.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Sheet {
        name: "active",
        headers: ACTIVE_HEADERS,
        rows: bowls
            .into_iter()
            .map(|bowl| {
                vec![
                    bowl.code,
                    bowl.dish,
                    bowl.company,
                    bowl.customer,
                    bowl.user.unwrap_or_default(),
                    bowl.creation_date,
                    bowl.timestamp,
                ]
            })
            .collect(),
    }
}

pub fn returned_sheet(value: Option<Value>) -> Sheet {
    let mut returned: Vec<ReturnedRecord> = records(value);
    returned.sort_by(|a, b| {
        (&a.return_date, &a.return_time).cmp(&(&b.return_date, &b.return_time))
    });
    Sheet {
        name: "returned",
        headers: RETURNED_HEADERS,
        rows: returned
            .into_iter()
            .map(|record| {
                vec![
                    record.bowl.code,
                    record.bowl.dish,
                    record.bowl.company,
                    record.bowl.customer,
                    record.bowl.user.unwrap_or_default(),
                    record.bowl.creation_date,
                    record.return_date,
                    record.return_time,
                ]
            })
            .collect(),
    }
}

fn records<T: DeserializeOwned>(value: Option<Value>) -> Vec<T> {
    let Some(Value::Object(map)) = value else {
        return vec![];
    };
    map.into_iter()
        .filter_map(|(key, record)| match serde_json::from_value(record) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("Leaving undecodable record {key} out of the export: {err}");
                None
            }
        })
        .collect()
}

fn build_export_file_path(export_dir: &Path, day: NaiveDate, sheet: &str) -> PathBuf {
    let year = day.year();
    let month = day.month();
    let day_num = day.day();

    let filename = format!("{year:04}-{month:02}-{day_num:02}-{sheet}.csv");
    export_dir
        .join(year.to_string())
        .join(format!("{month:02}"))
        .join(filename)
}
