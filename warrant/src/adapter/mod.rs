//! Policy storage adapters: how rules enter and leave the model.
//!
//! The engine only depends on the [`Adapter`] trait; the CSV-like file
//! adapter and the in-memory adapter here are the reference
//! implementations. Auto-save capabilities are optional: the default
//! methods answer [`AdapterError::NotImplemented`] and the enforcer treats
//! that as "storage unchanged".

mod file;
mod memory;

pub use file::{FileAdapter, FilteredFileAdapter};
pub use memory::MemoryAdapter;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, PolicyError};
use crate::model::Model;

/// Positional field filters for a filtered load, keyed by policy type.
///
/// An empty filter value matches any field; a policy type with no entry is
/// loaded unfiltered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    pub rules: HashMap<String, Vec<String>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field filter for one policy type (`"p"`, `"g2"`, ...).
    pub fn with(mut self, ptype: &str, field_values: &[&str]) -> Self {
        self.rules.insert(
            ptype.to_string(),
            field_values.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether a parsed policy line passes this filter.
    pub(crate) fn keeps(&self, fields: &[String]) -> bool {
        let Some(key) = fields.first() else {
            return false;
        };
        let Some(wanted) = self.rules.get(key) else {
            return true;
        };
        if fields.len() < wanted.len() + 1 {
            return false;
        }
        wanted
            .iter()
            .enumerate()
            .all(|(i, fv)| fv.is_empty() || fields[i + 1] == *fv)
    }
}

/// The storage contract consumed by the enforcer.
pub trait Adapter: Send + Sync {
    /// Load all rules into the model.
    fn load_policy(&mut self, m: &mut Model) -> Result<(), AdapterError>;

    /// Persist all of the model's rules, replacing previous content.
    fn save_policy(&mut self, m: &Model) -> Result<(), AdapterError>;

    /// Persist one added rule (auto-save).
    fn add_policy(
        &mut self,
        _sec: &str,
        _ptype: &str,
        _rule: &[String],
    ) -> Result<(), AdapterError> {
        Err(AdapterError::NotImplemented("add_policy"))
    }

    /// Persist one removed rule (auto-save).
    fn remove_policy(
        &mut self,
        _sec: &str,
        _ptype: &str,
        _rule: &[String],
    ) -> Result<(), AdapterError> {
        Err(AdapterError::NotImplemented("remove_policy"))
    }

    /// Persist a filtered removal (auto-save).
    fn remove_filtered_policy(
        &mut self,
        _sec: &str,
        _ptype: &str,
        _field_index: usize,
        _field_values: &[String],
    ) -> Result<(), AdapterError> {
        Err(AdapterError::NotImplemented("remove_filtered_policy"))
    }

    /// Load only the rules selected by `filter`.
    fn load_filtered_policy(
        &mut self,
        _m: &mut Model,
        _filter: &Filter,
    ) -> Result<(), AdapterError> {
        Err(AdapterError::NotImplemented("load_filtered_policy"))
    }

    /// Whether the last load was filtered (a filtered store must not be
    /// saved back, it would truncate the source).
    fn is_filtered(&self) -> bool {
        false
    }
}

/// Split one CSV-like policy line into trimmed fields.
/// `None` for blank lines and `#` comments.
pub(crate) fn parse_policy_line(line: &str) -> Option<Vec<String>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(line.split(',').map(|f| f.trim().to_string()).collect())
}

/// Feed one storage line into the model.
pub(crate) fn load_policy_line(line: &str, m: &mut Model) -> Result<(), PolicyError> {
    let Some(fields) = parse_policy_line(line) else {
        return Ok(());
    };
    load_policy_fields(&fields, m)
}

/// Feed one parsed rule (`[key, field...]`) into the model. Duplicates are
/// skipped silently.
pub(crate) fn load_policy_fields(fields: &[String], m: &mut Model) -> Result<(), PolicyError> {
    let Some(key) = fields.first() else {
        return Ok(());
    };
    if key.is_empty() {
        return Err(PolicyError::ParseLine(fields.join(", ")));
    }
    let sec = &key[..1];
    if sec != "p" && sec != "g" {
        return Err(PolicyError::ParseLine(fields.join(", ")));
    }
    if m.get_assertion(sec, key).is_none() {
        return Err(PolicyError::UnknownPolicyType {
            sec: sec.to_string(),
            ptype: key.to_string(),
        });
    }
    m.add_policy(sec, key, fields[1..].to_vec());
    Ok(())
}
