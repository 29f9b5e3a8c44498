//! Battery history selection for `/server/battery`.
//!
//! All comparisons run on the stored timestamp text, which orders the same
//! way as the timestamps themselves.

use serde::Deserialize;

use super::record::{format_timestamp, TelemetrySample};

/// Raw query string of `/server/battery`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    pub all: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Which part of the telemetry history to return
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryQuery {
    /// Every record
    All,
    /// Records with `from <= timestamp <= to`
    Range { from: String, to: String },
    /// Records whose timestamp starts with the given `YYYY-MM-DD`
    Day(String),
}

impl HistoryQuery {
    /// Interpret query parameters.
    ///
    /// `all` wins over a range; a range needs both ends. Anything else falls
    /// back to `today` (a `YYYY-MM-DD` date in the configured time zone).
    pub fn from_params(params: &HistoryParams, today: &str) -> Self {
        if params.all.is_some() {
            return HistoryQuery::All;
        }
        match (&params.from, &params.to) {
            (Some(from), Some(to)) => HistoryQuery::Range {
                from: from.clone(),
                to: to.clone(),
            },
            _ => HistoryQuery::Day(today.to_string()),
        }
    }

    fn matches(&self, timestamp: &str) -> bool {
        match self {
            HistoryQuery::All => true,
            HistoryQuery::Range { from, to } => timestamp >= from.as_str() && timestamp <= to.as_str(),
            HistoryQuery::Day(day) => timestamp.starts_with(day.as_str()),
        }
    }

    /// Keep the matching records, preserving their order
    pub fn apply(&self, records: Vec<TelemetrySample>) -> Vec<TelemetrySample> {
        records
            .into_iter()
            .filter(|record| self.matches(&format_timestamp(&record.timestamp)))
            .collect()
    }
}
