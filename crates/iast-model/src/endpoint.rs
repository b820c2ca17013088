//! Durable Queue row.

use crate::record::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    New,
    InProgress,
    Done,
    Failed,
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScanStatus::New => "new",
            ScanStatus::InProgress => "in-progress",
            ScanStatus::Done => "done",
            ScanStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A row in the per-target Durable Queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: u64,
    pub record: Record,
    pub fingerprint: String,
    pub scan_status: ScanStatus,
    pub created_at: DateTime<Utc>,
}
