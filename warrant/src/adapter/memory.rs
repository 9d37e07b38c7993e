//! In-memory adapter: rules live in the adapter itself. Useful for
//! embedding and for tests; implements the auto-save operations.

use crate::error::AdapterError;
use crate::model::Model;

use super::{load_policy_fields, Adapter};

#[derive(Debug, Clone, Default)]
pub struct MemoryAdapter {
    /// (ptype, rule body) pairs in storage order.
    rules: Vec<(String, Vec<String>)>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rules (test visibility into auto-save).
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn position(&self, ptype: &str, rule: &[String]) -> Option<usize> {
        self.rules
            .iter()
            .position(|(p, r)| p == ptype && r.as_slice() == rule)
    }
}

impl Adapter for MemoryAdapter {
    fn load_policy(&mut self, m: &mut Model) -> Result<(), AdapterError> {
        for (ptype, rule) in &self.rules {
            let mut fields = Vec::with_capacity(rule.len() + 1);
            fields.push(ptype.clone());
            fields.extend(rule.iter().cloned());
            load_policy_fields(&fields, m).map_err(|e| {
                AdapterError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e.to_string(),
                ))
            })?;
        }
        Ok(())
    }

    fn save_policy(&mut self, m: &Model) -> Result<(), AdapterError> {
        self.rules.clear();
        for sec in ["p", "g"] {
            for key in m.keys(sec) {
                for rule in m.get_policy(sec, &key) {
                    self.rules.push((key.clone(), rule));
                }
            }
        }
        Ok(())
    }

    fn add_policy(&mut self, _sec: &str, ptype: &str, rule: &[String]) -> Result<(), AdapterError> {
        if self.position(ptype, rule).is_none() {
            self.rules.push((ptype.to_string(), rule.to_vec()));
        }
        Ok(())
    }

    fn remove_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        rule: &[String],
    ) -> Result<(), AdapterError> {
        if let Some(pos) = self.position(ptype, rule) {
            self.rules.remove(pos);
        }
        Ok(())
    }

    fn remove_filtered_policy(
        &mut self,
        _sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Result<(), AdapterError> {
        self.rules.retain(|(p, rule)| {
            if p != ptype || field_values.is_empty() {
                return true;
            }
            let matched = field_values.iter().enumerate().all(|(i, fv)| {
                fv.is_empty()
                    || rule
                        .get(field_index + i)
                        .map(|f| f == fv)
                        .unwrap_or(false)
            });
            !matched
        });
        Ok(())
    }
}
