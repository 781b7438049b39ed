// src/persistence.rs
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::dataset::{Dataset, CURRENT_SCHEMA_VERSION};
use crate::migration::{migrate, stored_version};
use crate::salary::SalaryRules;
use crate::storage::Storage;

// --- Configuration & Constants ---

pub const DATASET_KEY: &str = "payroll_data";
pub const BACKUP_KEY_PREFIX: &str = "payroll_backup_";
pub const CONTEXT_KEY: &str = "payroll_save_context";

pub const DEFAULT_MAX_DATASET_BYTES: u64 = 5_000_000;
pub const DEFAULT_MAX_STORAGE_BYTES: u64 = 10_000_000;
pub const DEFAULT_WARN_RATIO: f64 = 0.8;
pub const DEFAULT_BACKUP_EVERY: u64 = 10;
pub const DEFAULT_BACKUP_RETENTION: usize = 5;

// --- Error Handling ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    /// The serialized dataset alone is over the per-dataset cap.
    Dataset,
    /// Everything stored plus the new dataset would be over the storage cap.
    Storage,
}

impl fmt::Display for QuotaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dataset => f.write_str("dataset size"),
            Self::Storage => f.write_str("storage usage"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("File I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("JSON processing error")]
    Json(#[from] serde_json::Error),

    #[error("Invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("Quota exceeded: {kind} would be {bytes} bytes, limit is {limit}. Export or clear old data first")]
    QuotaExceeded {
        kind: QuotaKind,
        bytes: u64,
        limit: u64,
    },

    #[error("Backup '{0}' not found")]
    BackupNotFound(String),

    #[error("Backup '{key}' cannot be restored: {reason}")]
    BackupUnusable { key: String, reason: String },
}

// Helper to create context-aware IO errors
pub(crate) fn io_context<E: Into<std::io::Error>, S: Into<String>>(
    source: E,
    context: S,
) -> PersistenceError {
    PersistenceError::Io {
        source: source.into(),
        context: context.into(),
    }
}

/// Size caps and backup cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageLimits {
    pub max_dataset_bytes: u64,
    pub max_storage_bytes: u64,
    /// Fraction of `max_storage_bytes` above which saves log a warning.
    pub warn_ratio: f64,
    /// A backup snapshot is written on every Nth successful save.
    pub backup_every: u64,
    pub backup_retention: usize,
}

impl Default for StorageLimits {
    fn default() -> Self {
        Self {
            max_dataset_bytes: DEFAULT_MAX_DATASET_BYTES,
            max_storage_bytes: DEFAULT_MAX_STORAGE_BYTES,
            warn_ratio: DEFAULT_WARN_RATIO,
            backup_every: DEFAULT_BACKUP_EVERY,
            backup_retention: DEFAULT_BACKUP_RETENTION,
        }
    }
}

/// Mutable bookkeeping carried between saves. Owned by one manager, never
/// shared globally; tests hand in a fresh one. Stored under [`CONTEXT_KEY`]
/// so the backup cadence survives restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveContext {
    pub save_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceState {
    Empty,
    Migrating { from_version: u32 },
    Loaded { version: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub bytes_written: u64,
    pub storage_used: u64,
    pub usage_ratio: f64,
    pub near_quota: bool,
    pub backup_key: Option<String>,
    pub pruned_backups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    NoData,
    /// Stored data failed structural checks or migration. No dataset is
    /// handed out.
    Rejected { reason: String },
    Loaded {
        dataset: Dataset,
        migrated_from: Option<u32>,
    },
}

impl LoadOutcome {
    pub fn into_dataset(self) -> Option<Dataset> {
        match self {
            Self::Loaded { dataset, .. } => Some(dataset),
            _ => None,
        }
    }
}

/// Timestamped copy of a dataset as it was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub created_at: DateTime<Utc>,
    /// Hex SHA-256 of the compact JSON encoding of `data`.
    pub sha256: String,
    pub data: Value,
}

impl BackupSnapshot {
    fn new(created_at: DateTime<Utc>, data: Value) -> Result<Self, PersistenceError> {
        let sha256 = digest_of(&data)?;
        Ok(Self {
            created_at,
            sha256,
            data,
        })
    }

    pub fn verify(&self) -> Result<bool, PersistenceError> {
        Ok(digest_of(&self.data)? == self.sha256)
    }
}

fn digest_of(data: &Value) -> Result<String, PersistenceError> {
    let encoded = serde_json::to_string(data)?;
    Ok(hex::encode(Sha256::digest(encoded.as_bytes())))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageUsage {
    pub used_bytes: u64,
    pub dataset_bytes: u64,
    pub backup_count: usize,
    pub max_storage_bytes: u64,
    pub usage_ratio: f64,
}

fn backup_key_for(timestamp_millis: i64) -> String {
    format!("{}{}", BACKUP_KEY_PREFIX, timestamp_millis)
}

fn backup_timestamp(key: &str) -> Option<i64> {
    key.strip_prefix(BACKUP_KEY_PREFIX)?.parse().ok()
}

// --- Persistence Manager ---

/// Owns the stored dataset: quota-checked saves, versioned loads with
/// migration, and backup rotation.
pub struct PersistenceManager<S: Storage> {
    storage: S,
    rules: SalaryRules,
    limits: StorageLimits,
    context: SaveContext,
    clock: Box<dyn Clock>,
    state: PersistenceState,
}

impl<S: Storage> PersistenceManager<S> {
    pub fn new(storage: S, rules: SalaryRules) -> Self {
        Self {
            storage,
            rules,
            limits: StorageLimits::default(),
            context: SaveContext::default(),
            clock: Box::new(SystemClock),
            state: PersistenceState::Empty,
        }
    }

    /// Like [`new`](Self::new), but resumes the save counter recorded by an
    /// earlier run. An unreadable counter starts over from zero.
    pub fn open(storage: S, rules: SalaryRules) -> Result<Self, PersistenceError> {
        let context = match storage.get(CONTEXT_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Ignoring unreadable save context: {}", e);
                SaveContext::default()
            }),
            None => SaveContext::default(),
        };
        debug!("Resuming at save #{}", context.save_count);
        Ok(Self::new(storage, rules).with_context(context))
    }

    pub fn with_limits(mut self, limits: StorageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_context(mut self, context: SaveContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn state(&self) -> PersistenceState {
        self.state
    }

    pub fn context(&self) -> &SaveContext {
        &self.context
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn rules(&self) -> &SalaryRules {
        &self.rules
    }

    // --- Save ---

    /// Writes the dataset under the primary key, stamped with the current
    /// schema version.
    ///
    /// Both size caps are checked before anything is written, so a rejected
    /// save leaves stored data untouched.
    pub fn save(&mut self, dataset: &Dataset) -> Result<SaveOutcome, PersistenceError> {
        let mut stamped = dataset.clone();
        stamped.version = CURRENT_SCHEMA_VERSION;
        let payload = serde_json::to_string(&stamped)?;
        let bytes = payload.len() as u64;

        if bytes > self.limits.max_dataset_bytes {
            error!(
                "Refusing save: dataset is {} bytes, cap is {}",
                bytes, self.limits.max_dataset_bytes
            );
            return Err(PersistenceError::QuotaExceeded {
                kind: QuotaKind::Dataset,
                bytes,
                limit: self.limits.max_dataset_bytes,
            });
        }

        // The new payload replaces whatever sits under the primary key.
        let others = self
            .storage
            .used_bytes()?
            .saturating_sub(self.storage.size_of(DATASET_KEY)?);
        let projected = others + bytes;
        if projected > self.limits.max_storage_bytes {
            error!(
                "Refusing save: storage would grow to {} bytes, cap is {}",
                projected, self.limits.max_storage_bytes
            );
            return Err(PersistenceError::QuotaExceeded {
                kind: QuotaKind::Storage,
                bytes: projected,
                limit: self.limits.max_storage_bytes,
            });
        }

        self.storage.set(DATASET_KEY, &payload)?;
        self.context.save_count += 1;
        if let Err(e) = self.store_context() {
            warn!("Failed to record save count: {}", e);
        }
        self.state = PersistenceState::Loaded {
            version: CURRENT_SCHEMA_VERSION,
        };
        info!(
            "Saved {} ({} employees, {} bytes, save #{})",
            stamped.month,
            stamped.employees.len(),
            bytes,
            self.context.save_count
        );

        let usage_ratio = projected as f64 / self.limits.max_storage_bytes as f64;
        let near_quota = usage_ratio >= self.limits.warn_ratio;
        if near_quota {
            warn!(
                "Storage is {:.0}% full ({} of {} bytes). Consider exporting and clearing old data.",
                usage_ratio * 100.0,
                projected,
                self.limits.max_storage_bytes
            );
        }

        let mut outcome = SaveOutcome {
            bytes_written: bytes,
            storage_used: projected,
            usage_ratio,
            near_quota,
            backup_key: None,
            pruned_backups: Vec::new(),
        };

        if self.limits.backup_every > 0 && self.context.save_count % self.limits.backup_every == 0 {
            // The primary save already succeeded; backup trouble is only logged.
            match self.write_backup(&stamped) {
                Ok(key) => {
                    outcome.backup_key = Some(key);
                    match self.prune_backups() {
                        Ok(pruned) => outcome.pruned_backups = pruned,
                        Err(e) => error!("Failed to prune backups: {}", e),
                    }
                }
                Err(e) => error!("Failed to write backup snapshot: {}", e),
            }
        }

        Ok(outcome)
    }

    fn store_context(&mut self) -> Result<(), PersistenceError> {
        let raw = serde_json::to_string(&self.context)?;
        self.storage.set(CONTEXT_KEY, &raw)
    }

    fn write_backup(&mut self, dataset: &Dataset) -> Result<String, PersistenceError> {
        let created_at = self.clock.now();
        let snapshot = BackupSnapshot::new(created_at, serde_json::to_value(dataset)?)?;
        let payload = serde_json::to_string(&snapshot)?;

        let projected = self.storage.used_bytes()? + payload.len() as u64;
        if projected > self.limits.max_storage_bytes {
            return Err(PersistenceError::QuotaExceeded {
                kind: QuotaKind::Storage,
                bytes: projected,
                limit: self.limits.max_storage_bytes,
            });
        }

        // Two snapshots within the same millisecond get distinct keys.
        let mut millis = created_at.timestamp_millis();
        while self.storage.get(&backup_key_for(millis))?.is_some() {
            millis += 1;
        }
        let key = backup_key_for(millis);
        self.storage.set(&key, &payload)?;
        info!("Backup snapshot written: {}", key);
        Ok(key)
    }

    /// Deletes all but the newest `backup_retention` snapshots, newest judged
    /// by the timestamp embedded in the key. Returns the deleted keys.
    pub fn prune_backups(&mut self) -> Result<Vec<String>, PersistenceError> {
        let mut backups: Vec<(i64, String)> = self
            .storage
            .keys()?
            .into_iter()
            .filter_map(|key| backup_timestamp(&key).map(|ts| (ts, key)))
            .collect();
        backups.sort_by(|a, b| b.0.cmp(&a.0));

        let mut pruned = Vec::new();
        for (_, key) in backups.into_iter().skip(self.limits.backup_retention) {
            self.storage.remove(&key)?;
            debug!("Pruned backup {}", key);
            pruned.push(key);
        }
        if !pruned.is_empty() {
            info!("Pruned {} old backup snapshot(s)", pruned.len());
        }
        Ok(pruned)
    }

    // --- Load ---

    /// Reads the stored dataset.
    ///
    /// Absent data is `NoData`. Malformed data, or data whose migration
    /// fails, is `Rejected` and the manager returns to `Empty`. Stale schemas
    /// are migrated and immediately re-saved.
    pub fn load(&mut self) -> Result<LoadOutcome, PersistenceError> {
        let Some(raw) = self.storage.get(DATASET_KEY)? else {
            info!("No stored dataset under '{}'", DATASET_KEY);
            self.state = PersistenceState::Empty;
            return Ok(LoadOutcome::NoData);
        };

        let (dataset, migrated_from) = match self.decode(&raw) {
            Ok(decoded) => decoded,
            Err(reason) => {
                warn!("Stored dataset rejected: {}", reason);
                self.state = PersistenceState::Empty;
                return Ok(LoadOutcome::Rejected { reason });
            }
        };

        if let Some(from_version) = migrated_from {
            if let Err(e) = self.save(&dataset) {
                warn!(
                    "Dataset migrated from v{} but re-saving it failed: {}. It will be migrated again next load.",
                    from_version, e
                );
            }
        }
        self.state = PersistenceState::Loaded {
            version: dataset.version,
        };
        info!(
            "Loaded {} with {} employees",
            dataset.month,
            dataset.employees.len()
        );
        Ok(LoadOutcome::Loaded {
            dataset,
            migrated_from,
        })
    }

    /// Parse, structural checks, migration and recomputation. Errors are
    /// human-readable rejection reasons.
    fn decode(&mut self, raw: &str) -> Result<(Dataset, Option<u32>), String> {
        let doc: Value =
            serde_json::from_str(raw).map_err(|e| format!("stored data is not valid JSON: {}", e))?;
        check_structure(&doc)?;

        let version = stored_version(&doc).map_err(|e| e.to_string())?;
        let (doc, migrated_from) = if version < CURRENT_SCHEMA_VERSION {
            self.state = PersistenceState::Migrating {
                from_version: version,
            };
            let migrated = migrate(doc).map_err(|e| format!("migration failed: {}", e))?;
            (migrated, Some(version))
        } else if version > CURRENT_SCHEMA_VERSION {
            return Err(format!(
                "stored schema v{} is newer than supported v{}",
                version, CURRENT_SCHEMA_VERSION
            ));
        } else {
            (doc, None)
        };

        let mut dataset: Dataset = serde_json::from_value(doc)
            .map_err(|e| format!("stored data does not match the dataset shape: {}", e))?;
        dataset
            .recompute_all(&self.rules)
            .map_err(|e| e.to_string())?;
        Ok((dataset, migrated_from))
    }

    // --- Clear ---

    /// Removes the primary dataset only; backups stay.
    pub fn clear(&mut self) -> Result<bool, PersistenceError> {
        let removed = self.storage.remove(DATASET_KEY)?;
        self.state = PersistenceState::Empty;
        info!("Cleared stored dataset (existed: {})", removed);
        Ok(removed)
    }

    // --- Backups ---

    /// Snapshots newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, PersistenceError> {
        let mut backups = Vec::new();
        for key in self.storage.keys()? {
            let Some(millis) = backup_timestamp(&key) else {
                continue;
            };
            let Some(created_at) = Utc.timestamp_millis_opt(millis).single() else {
                continue;
            };
            backups.push(BackupInfo {
                bytes: self.storage.size_of(&key)?,
                key,
                created_at,
            });
        }
        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }

    /// Restores a snapshot as the primary dataset. The snapshot is checked
    /// against its digest, migrated if old, recomputed, and saved through the
    /// normal quota-checked path.
    pub fn restore_backup(&mut self, key: &str) -> Result<Dataset, PersistenceError> {
        if backup_timestamp(key).is_none() {
            return Err(PersistenceError::BackupNotFound(key.to_string()));
        }
        let raw = self
            .storage
            .get(key)?
            .ok_or_else(|| PersistenceError::BackupNotFound(key.to_string()))?;
        let unusable = |reason: String| PersistenceError::BackupUnusable {
            key: key.to_string(),
            reason,
        };

        let snapshot: BackupSnapshot =
            serde_json::from_str(&raw).map_err(|e| unusable(format!("not a snapshot: {}", e)))?;
        if !snapshot.verify()? {
            return Err(unusable("digest mismatch".to_string()));
        }
        let payload = serde_json::to_string(&snapshot.data)?;
        let (dataset, _) = self.decode(&payload).map_err(unusable)?;

        self.save(&dataset)?;
        info!("Restored backup {} ({})", key, dataset.month);
        Ok(dataset)
    }

    pub fn usage(&self) -> Result<StorageUsage, PersistenceError> {
        let used_bytes = self.storage.used_bytes()?;
        Ok(StorageUsage {
            used_bytes,
            dataset_bytes: self.storage.size_of(DATASET_KEY)?,
            backup_count: self.list_backups()?.len(),
            max_storage_bytes: self.limits.max_storage_bytes,
            usage_ratio: used_bytes as f64 / self.limits.max_storage_bytes as f64,
        })
    }
}

fn check_structure(doc: &Value) -> Result<(), String> {
    let object = doc
        .as_object()
        .ok_or_else(|| "stored data is not an object".to_string())?;
    match object.get("employees") {
        Some(Value::Array(_)) => Ok(()),
        Some(_) => Err("'employees' is not a list".to_string()),
        None => Err("'employees' is missing".to_string()),
    }
}
