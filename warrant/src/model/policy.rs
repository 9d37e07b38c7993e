//! Policy store operations: the union of all `p`- and `g`-assertion rules.
//!
//! Every mutation keeps the per-assertion uniqueness index in sync with the
//! rule vector. Batch variants are all-or-nothing.

use tracing::debug;

use super::{canonical, Model};

impl Model {
    /// Append a rule if its canonical form is not already present.
    pub fn add_policy(&mut self, sec: &str, ptype: &str, rule: Vec<String>) -> bool {
        let Some(ast) = self.get_assertion_mut(sec, ptype) else {
            return false;
        };
        let key = canonical(&rule);
        if ast.policy_index.contains_key(&key) {
            return false;
        }
        ast.policy_index.insert(key, ast.policy.len());
        ast.policy.push(rule);
        true
    }

    /// Append a batch of rules. If any rule already exists (or appears twice
    /// in the batch) nothing is added.
    pub fn add_policies(&mut self, sec: &str, ptype: &str, rules: &[Vec<String>]) -> bool {
        let Some(ast) = self.get_assertion_mut(sec, ptype) else {
            return false;
        };
        let mut seen = std::collections::HashSet::new();
        for rule in rules {
            let key = canonical(rule);
            if ast.policy_index.contains_key(&key) || !seen.insert(key) {
                return false;
            }
        }
        for rule in rules {
            ast.policy_index
                .insert(canonical(rule), ast.policy.len());
            ast.policy.push(rule.clone());
        }
        true
    }

    /// Remove a rule by canonical form. Absence is not an error.
    pub fn remove_policy(&mut self, sec: &str, ptype: &str, rule: &[String]) -> bool {
        let Some(ast) = self.get_assertion_mut(sec, ptype) else {
            return false;
        };
        let key = canonical(rule);
        let Some(pos) = ast.policy_index.remove(&key) else {
            return false;
        };
        ast.policy.remove(pos);
        // Every entry after the removal point shifted left by one.
        for rule in &ast.policy[pos..] {
            if let Some(idx) = ast.policy_index.get_mut(&canonical(rule)) {
                *idx -= 1;
            }
        }
        debug!(sec, ptype, removed = key.as_str(), "policy rule removed");
        true
    }

    /// Remove a batch of rules; all must be present or nothing is removed.
    pub fn remove_policies(&mut self, sec: &str, ptype: &str, rules: &[Vec<String>]) -> bool {
        {
            let Some(ast) = self.get_assertion(sec, ptype) else {
                return false;
            };
            if rules
                .iter()
                .any(|r| !ast.policy_index.contains_key(&canonical(r)))
            {
                return false;
            }
        }
        for rule in rules {
            self.remove_policy(sec, ptype, rule);
        }
        true
    }

    /// Remove every rule matching the positional filter and return them.
    ///
    /// A rule matches when, for each offset `i`, `field_values[i]` is empty
    /// or equals `rule[field_index + i]`.
    pub fn remove_filtered_policy(
        &mut self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> (bool, Vec<Vec<String>>) {
        let Some(ast) = self.get_assertion_mut(sec, ptype) else {
            return (false, Vec::new());
        };
        let mut kept = Vec::with_capacity(ast.policy.len());
        let mut removed = Vec::new();
        for rule in ast.policy.drain(..) {
            if filter_matches(&rule, field_index, field_values) {
                removed.push(rule);
            } else {
                kept.push(rule);
            }
        }
        ast.policy = kept;
        ast.rebuild_index();
        (!removed.is_empty(), removed)
    }

    /// Replace `old` with `new`, preserving its position. Rejected when
    /// `old` is absent or `new` already exists elsewhere.
    pub fn update_policy(
        &mut self,
        sec: &str,
        ptype: &str,
        old: &[String],
        new: Vec<String>,
    ) -> bool {
        let Some(ast) = self.get_assertion_mut(sec, ptype) else {
            return false;
        };
        let old_key = canonical(old);
        let new_key = canonical(&new);
        let Some(&pos) = ast.policy_index.get(&old_key) else {
            return false;
        };
        if old_key != new_key && ast.policy_index.contains_key(&new_key) {
            return false;
        }
        ast.policy_index.remove(&old_key);
        ast.policy_index.insert(new_key, pos);
        ast.policy[pos] = new;
        true
    }

    /// Whether the rule is stored, by canonical form.
    pub fn has_policy(&self, sec: &str, ptype: &str, rule: &[String]) -> bool {
        self.get_assertion(sec, ptype)
            .map(|ast| ast.policy_index.contains_key(&canonical(rule)))
            .unwrap_or(false)
    }

    /// All rules of one assertion, in stored order.
    pub fn get_policy(&self, sec: &str, ptype: &str) -> Vec<Vec<String>> {
        self.get_assertion(sec, ptype)
            .map(|ast| ast.policy.clone())
            .unwrap_or_default()
    }

    /// Rules matching a positional filter.
    pub fn get_filtered_policy(
        &self,
        sec: &str,
        ptype: &str,
        field_index: usize,
        field_values: &[String],
    ) -> Vec<Vec<String>> {
        self.get_assertion(sec, ptype)
            .map(|ast| {
                ast.policy
                    .iter()
                    .filter(|rule| filter_matches(rule, field_index, field_values))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every stored rule, keeping the assertions themselves.
    pub fn clear_policy(&mut self) {
        for sec in ["p", "g"] {
            if let Some(section) = self.sections_mut(sec) {
                for ast in section.values_mut() {
                    ast.policy.clear();
                    ast.policy_index.clear();
                }
            }
        }
    }

    /// The storage text form: all `p` keys then all `g` keys, each
    /// assertion's rules in stored order, without a trailing newline.
    pub fn policy_text(&self) -> String {
        let mut out = String::new();
        for sec in ["p", "g"] {
            for key in self.keys(sec) {
                if let Some(ast) = self.get_assertion(sec, &key) {
                    for rule in &ast.policy {
                        out.push_str(&key);
                        out.push_str(", ");
                        out.push_str(&canonical(rule));
                        out.push('\n');
                    }
                }
            }
        }
        out.truncate(out.trim_end_matches('\n').len());
        out
    }

    fn sections_mut(
        &mut self,
        sec: &str,
    ) -> Option<&mut std::collections::HashMap<String, super::Assertion>> {
        self.sections.get_mut(sec)
    }
}

fn filter_matches(rule: &[String], field_index: usize, field_values: &[String]) -> bool {
    if field_values.is_empty() {
        return false;
    }
    field_values.iter().enumerate().all(|(i, fv)| {
        fv.is_empty()
            || rule
                .get(field_index + i)
                .map(|f| f == fv)
                .unwrap_or(false)
    })
}
