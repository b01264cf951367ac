//! Curated exact-match table.
//!
//! Authoritative grades for well-known injury patterns, keyed on the
//! normalized `(injury type, severity, disability code)` triple. Lookups are
//! pure equality on the key: a hit is certain, a miss says nothing.

use std::collections::HashMap;
use std::path::Path;

use sanzero_core::{CaseFields, CaseKey, DisabilityGrade, InjuryType, Severity};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::StoreError;

/// One curated row as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExactEntry {
    pub injury_type: InjuryType,
    pub severity: Severity,
    pub disability_code: String,
    pub grade: DisabilityGrade,
    /// Statute or landmark case backing the grade.
    pub reference: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// A successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ExactMatch {
    pub key: CaseKey,
    pub grade: DisabilityGrade,
    pub reference: String,
}

#[derive(Debug, Default)]
pub struct ExactMatchTable {
    entries: HashMap<CaseKey, ExactEntry>,
}

impl ExactMatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table, rejecting entries whose keys collide after normalization.
    pub fn from_entries(entries: Vec<ExactEntry>) -> Result<Self, StoreError> {
        let mut table = Self::new();
        for entry in entries {
            table.insert(entry)?;
        }
        Ok(table)
    }

    /// Load a JSON array of [`ExactEntry`] rows.
    pub fn load_json(path: &Path) -> Result<Self, StoreError> {
        let text = std::fs::read_to_string(path)?;
        let entries: Vec<ExactEntry> = serde_json::from_str(&text)?;
        let table = Self::from_entries(entries)?;
        info!(entries = table.len(), path = %path.display(), "loaded exact-match table");
        Ok(table)
    }

    pub fn insert(&mut self, entry: ExactEntry) -> Result<(), StoreError> {
        let key = CaseKey::new(entry.injury_type, entry.severity, &entry.disability_code)
            .ok_or_else(|| {
                StoreError::Other(format!(
                    "exact-match entry has an empty disability code: {:?}",
                    entry.disability_code
                ))
            })?;
        if self.entries.contains_key(&key) {
            return Err(StoreError::DuplicateExactKey(key.to_string()));
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    /// Exact lookup. Cases missing any key field never match.
    pub fn lookup(&self, fields: &CaseFields) -> Option<ExactMatch> {
        let key = CaseKey::from_fields(fields)?;
        self.entries.get(&key).map(|entry| ExactMatch {
            grade: entry.grade,
            reference: entry.reference.clone(),
            key,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
