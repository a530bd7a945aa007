use itertools::Itertools;

use crate::sync::{model::PreparedRecord, projection::ProjectionState};

/// Today's prepared bowls for one company and dish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub company: String,
    pub dish: String,
    pub count: usize,
    pub customers: Vec<String>,
}

/// Report of the bowls prepared today. A bowl prepared twice counts once, under its latest prep.
pub fn today_report(projection: &ProjectionState) -> Vec<ReportRow> {
    prepared_report(projection.prepared_today_by_code().into_values())
}

/// Groups prepared records by company and dish, sorted by company, then dish.
pub fn prepared_report<'a>(records: impl IntoIterator<Item = &'a PreparedRecord>) -> Vec<ReportRow> {
    records
        .into_iter()
        .into_group_map_by(|record| (record.company.clone(), record.dish.clone()))
        .into_iter()
        .map(|((company, dish), group)| ReportRow {
            company,
            dish,
            count: group.len(),
            customers: group
                .iter()
                .map(|record| record.customer.clone())
                .sorted()
                .dedup()
                .collect(),
        })
        .sorted_by(|a, b| (&a.company, &a.dish).cmp(&(&b.company, &b.dish)))
        .collect()
}
