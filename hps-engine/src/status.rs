//! Point-in-time description of a serving handle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use hps_core::models::TierStats;
use hps_core::EngineState;

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub id: Uuid,
    pub version: &'static str,
    pub state: EngineState,
    pub initialized_at: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
    pub worker_threads: usize,
    pub tables: Vec<TableStatus>,
}

/// One served table and its tiers.
#[derive(Debug, Clone, Serialize)]
pub struct TableStatus {
    pub model: String,
    pub table_id: u32,
    pub name: String,
    pub rows: usize,
    pub dim: usize,
    pub slot_num: usize,
    pub storage: &'static str,
    pub tiers: Vec<TierStats>,
}

impl EngineStatus {
    pub fn table(&self, model: &str, table_id: u32) -> Option<&TableStatus> {
        self.tables
            .iter()
            .find(|t| t.model == model && t.table_id == table_id)
    }
}
