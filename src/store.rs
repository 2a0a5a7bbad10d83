//! Persistence of proposed matches and their review status.
//!
//! Search results are stored as `pending`. A reviewer later confirms or
//! rejects each one; only reviewed records can be deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::ids::MatchId;
use crate::storage::StorageManager;

const CSV_HEADERS: [&str; 6] = [
    "id",
    "lost_item_id",
    "found_item_id",
    "confidence",
    "status",
    "created_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Confirmed => "confirmed",
            MatchStatus::Rejected => "rejected",
        };
        f.pad(s)
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(MatchStatus::Pending),
            "confirmed" => Ok(MatchStatus::Confirmed),
            "rejected" => Ok(MatchStatus::Rejected),
            other => Err(format!("unknown match status '{other}'")),
        }
    }
}

/// A candidate handed to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMatch {
    pub lost_item_id: u64,
    pub found_item_id: u64,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMatch {
    pub id: MatchId,
    pub lost_item_id: u64,
    pub found_item_id: u64,
    pub confidence: f32,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed match store: {0}")]
    Csv(#[from] csv::Error),

    #[error("match {0} not found")]
    NotFound(MatchId),

    #[error("match {id} is {from}, cannot mark it {to}")]
    InvalidTransition {
        id: MatchId,
        from: MatchStatus,
        to: MatchStatus,
    },

    #[error("match {0} is still pending and cannot be deleted")]
    DeletePending(MatchId),

    #[error("match store lock poisoned")]
    Poisoned,
}

/// Receives the ranked candidates of a completed search.
pub trait MatchStore: Send + Sync {
    /// Store all `matches` as pending, in order, and return the stored rows.
    fn insert_pending(&self, matches: &[NewMatch]) -> Result<Vec<StoredMatch>, StoreError>;
}

/// Match records kept in one CSV file.
#[derive(Clone)]
pub struct CsvMatchStore {
    storage: Arc<dyn StorageManager>,
    ident: String,
    list: Arc<RwLock<Vec<StoredMatch>>>,
}

impl CsvMatchStore {
    pub fn load(storage: Arc<dyn StorageManager>, ident: &str) -> Result<Self, StoreError> {
        if !storage.exists(ident) {
            log::info!("Creating new match store {ident}");
            storage.write(ident, &encode(&[])?)?;
        }

        let now = Instant::now();
        let data = storage.read(ident)?;
        let mut csv_reader = csv::Reader::from_reader(data.as_slice());
        let list = csv_reader
            .deserialize::<StoredMatch>()
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "took {}ms to read {} matches",
            now.elapsed().as_micros() as f64 / 1000.0,
            list.len()
        );

        Ok(Self {
            storage,
            ident: ident.to_string(),
            list: Arc::new(RwLock::new(list)),
        })
    }

    /// All records, optionally only those with `status`, oldest first.
    pub fn list(&self, status: Option<MatchStatus>) -> Result<Vec<StoredMatch>, StoreError> {
        let list = self.list.read().map_err(|_| StoreError::Poisoned)?;
        Ok(list
            .iter()
            .filter(|m| status.map_or(true, |s| m.status == s))
            .cloned()
            .collect())
    }

    pub fn get(&self, id: &MatchId) -> Result<StoredMatch, StoreError> {
        let list = self.list.read().map_err(|_| StoreError::Poisoned)?;
        list.iter()
            .find(|m| &m.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Review a pending match. Repeating the current status is a no-op.
    pub fn set_status(&self, id: &MatchId, status: MatchStatus) -> Result<StoredMatch, StoreError> {
        let mut list = self.list.write().map_err(|_| StoreError::Poisoned)?;
        let idx = list
            .iter()
            .position(|m| &m.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let current = list[idx].status;
        if current == status {
            return Ok(list[idx].clone());
        }
        if current != MatchStatus::Pending || status == MatchStatus::Pending {
            return Err(StoreError::InvalidTransition {
                id: id.clone(),
                from: current,
                to: status,
            });
        }

        list[idx].status = status;
        if let Err(err) = self.save(&list) {
            list[idx].status = current;
            return Err(err);
        }

        log::info!("match {id} marked {status}");
        Ok(list[idx].clone())
    }

    /// Remove a reviewed match record.
    pub fn delete(&self, id: &MatchId) -> Result<StoredMatch, StoreError> {
        let mut list = self.list.write().map_err(|_| StoreError::Poisoned)?;
        let idx = list
            .iter()
            .position(|m| &m.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if list[idx].status == MatchStatus::Pending {
            return Err(StoreError::DeletePending(id.clone()));
        }

        let removed = list.remove(idx);
        if let Err(err) = self.save(&list) {
            list.insert(idx, removed);
            return Err(err);
        }

        Ok(removed)
    }

    fn save(&self, list: &[StoredMatch]) -> Result<(), StoreError> {
        self.storage.write(&self.ident, &encode(list)?)?;
        Ok(())
    }
}

impl MatchStore for CsvMatchStore {
    fn insert_pending(&self, matches: &[NewMatch]) -> Result<Vec<StoredMatch>, StoreError> {
        let mut list = self.list.write().map_err(|_| StoreError::Poisoned)?;
        let created_at = Utc::now();

        let inserted: Vec<StoredMatch> = matches
            .iter()
            .map(|m| StoredMatch {
                id: MatchId::new(),
                lost_item_id: m.lost_item_id,
                found_item_id: m.found_item_id,
                confidence: m.confidence,
                status: MatchStatus::Pending,
                created_at,
            })
            .collect();

        let previous_len = list.len();
        list.extend(inserted.iter().cloned());

        if let Err(err) = self.save(&list) {
            list.truncate(previous_len);
            return Err(err);
        }

        log::info!("stored {} pending match(es)", inserted.len());
        Ok(inserted)
    }
}

fn encode(list: &[StoredMatch]) -> Result<Vec<u8>, StoreError> {
    let mut csv_wrt = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    csv_wrt.write_record(CSV_HEADERS)?;
    for m in list {
        csv_wrt.serialize(m)?;
    }
    csv_wrt
        .into_inner()
        .map_err(|err| StoreError::Io(err.into_error()))
}
