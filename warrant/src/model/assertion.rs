//! One parsed key/value pair of the model, plus the policy rules it owns.

use std::collections::HashMap;

use crate::error::{EnforceError, ModelError, PolicyError};
use crate::rbac::{ConditionalRoleManager, RoleManager};

/// Direction of an incremental role-link update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PolicyOp {
    Add,
    Remove,
}

/// An assertion is one line of the model, e.g. `p = sub, obj, act`,
/// together with the rules stored under it and their uniqueness index.
#[derive(Debug, Clone, Default)]
pub struct Assertion {
    /// The assertion key (`p`, `p2`, `g`, ...).
    pub key: String,
    /// The raw definition. For `e`/`m` this is the (rewritten) expression.
    pub value: String,
    /// Qualified attribute names (`p_sub`, ...) for `r`/`p`; the `_`
    /// positions for `g`.
    pub tokens: Vec<String>,
    /// For `g` assertions: named parameter positions after the `_`
    /// positions, consumed by link-condition predicates.
    pub params_tokens: Vec<String>,
    /// The stored rules, in insertion order.
    pub policy: Vec<Vec<String>>,
    /// canonical(rule) -> position in `policy`.
    pub(crate) policy_index: HashMap<String, usize>,
    /// Unqualified field name (`sub`, `eft`, `priority`, ...) -> position.
    pub(crate) field_index_map: HashMap<String, usize>,
}

/// The canonical serialization of a rule, used as the uniqueness key and in
/// the storage text form.
pub(crate) fn canonical(rule: &[String]) -> String {
    rule.join(", ")
}

impl Assertion {
    pub(crate) fn new(sec: &str, key: &str, value: &str) -> Self {
        let mut ast = Assertion {
            key: key.to_string(),
            value: value.to_string(),
            ..Default::default()
        };
        match sec {
            "r" | "p" => {
                for tok in value.split(',') {
                    let field = tok.trim();
                    ast.field_index_map
                        .insert(field.to_string(), ast.tokens.len());
                    ast.tokens.push(format!("{}_{}", key, field));
                }
            }
            "g" => {
                // `_` positions are the edge arity; trailing named positions
                // are predicate parameters.
                for tok in value.split(',') {
                    let tok = tok.trim();
                    if tok == "_" {
                        ast.tokens.push(tok.to_string());
                    } else {
                        ast.params_tokens.push(tok.to_string());
                    }
                }
            }
            _ => {}
        }
        ast
    }

    /// Position of an unqualified field (`sub`, `eft`, `priority`, `dom`)
    /// within a rule.
    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.field_index_map.get(field).copied()
    }

    /// Whether this `g` assertion carries predicate parameters and so is
    /// served by a conditional role manager.
    pub(crate) fn is_conditional(&self) -> bool {
        !self.params_tokens.is_empty()
    }

    fn check_role_definition(&self) -> Result<(), ModelError> {
        if self.tokens.len() < 2 {
            return Err(ModelError::RoleDefinition {
                key: self.key.clone(),
                count: self.tokens.len(),
            });
        }
        Ok(())
    }

    fn check_rule_arity(&self, rule: &[String]) -> Result<(), PolicyError> {
        if rule.len() < self.tokens.len() {
            return Err(PolicyError::RuleTooShort {
                ptype: self.key.clone(),
                expected: self.tokens.len(),
                got: rule.len(),
            });
        }
        Ok(())
    }

    /// Edge endpoints and domain of a grouping rule. Fields beyond the
    /// declared `_` arity are ignored here.
    fn edge<'r>(&self, rule: &'r [String]) -> (&'r str, &'r str, Option<&'r str>) {
        let domain = if self.tokens.len() >= 3 {
            rule.get(2).map(|s| s.as_str())
        } else {
            None
        };
        (&rule[0], &rule[1], domain)
    }

    /// Rebuild the role graph from every stored rule.
    pub(crate) fn build_role_links(&self, rm: &mut dyn RoleManager) -> Result<(), EnforceError> {
        self.check_role_definition()?;
        for rule in &self.policy {
            self.check_rule_arity(rule)?;
            let (name1, name2, domain) = self.edge(rule);
            rm.add_link(name1, name2, domain);
        }
        Ok(())
    }

    /// Apply one batch of grouping-rule changes to the role graph.
    pub(crate) fn build_incremental_role_links(
        &self,
        rm: &mut dyn RoleManager,
        op: PolicyOp,
        rules: &[Vec<String>],
    ) -> Result<(), EnforceError> {
        self.check_role_definition()?;
        for rule in rules {
            self.check_rule_arity(rule)?;
            let (name1, name2, domain) = self.edge(rule);
            match op {
                PolicyOp::Add => rm.add_link(name1, name2, domain),
                PolicyOp::Remove => rm.delete_link(name1, name2, domain),
            }
        }
        Ok(())
    }

    /// Rebuild a conditional role graph, wiring rule tails in as predicate
    /// parameters.
    pub(crate) fn build_conditional_role_links(
        &self,
        crm: &mut ConditionalRoleManager,
    ) -> Result<(), EnforceError> {
        self.check_role_definition()?;
        for rule in &self.policy {
            self.add_conditional_link(crm, rule)?;
        }
        Ok(())
    }

    pub(crate) fn build_incremental_conditional_role_links(
        &self,
        crm: &mut ConditionalRoleManager,
        op: PolicyOp,
        rules: &[Vec<String>],
    ) -> Result<(), EnforceError> {
        self.check_role_definition()?;
        for rule in rules {
            match op {
                PolicyOp::Add => self.add_conditional_link(crm, rule)?,
                PolicyOp::Remove => {
                    self.check_rule_arity(rule)?;
                    let (name1, name2, domain) = self.edge(rule);
                    crm.delete_link(name1, name2, domain);
                }
            }
        }
        Ok(())
    }

    fn add_conditional_link(
        &self,
        crm: &mut ConditionalRoleManager,
        rule: &[String],
    ) -> Result<(), EnforceError> {
        self.check_rule_arity(rule)?;
        let (name1, name2, domain) = self.edge(rule);
        crm.add_link(name1, name2, domain);
        let params: Vec<String> = rule[self.tokens.len()..].to_vec();
        match domain {
            Some(dom) => crm.set_domain_link_condition_params(name1, name2, dom, params),
            None => crm.set_link_condition_params(name1, name2, params),
        }
        Ok(())
    }

    /// Rebuild `policy_index` from scratch.
    pub(crate) fn rebuild_index(&mut self) {
        self.policy_index = self
            .policy
            .iter()
            .enumerate()
            .map(|(i, rule)| (canonical(rule), i))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::DefaultRoleManager;

    fn rules(raw: &[&[&str]]) -> Vec<Vec<String>> {
        raw.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn request_tokens_are_qualified() {
        let ast = Assertion::new("r", "r", "sub, obj, act");
        assert_eq!(ast.tokens, vec!["r_sub", "r_obj", "r_act"]);
        assert_eq!(ast.field_index("obj"), Some(1));
    }

    #[test]
    fn grouping_tokens_split_params() {
        let ast = Assertion::new("g", "g", "_, _, start, end");
        assert_eq!(ast.tokens, vec!["_", "_"]);
        assert_eq!(ast.params_tokens, vec!["start", "end"]);
        assert!(ast.is_conditional());
    }

    #[test]
    fn one_position_role_definition_is_rejected() {
        let mut ast = Assertion::new("g", "g", "_");
        ast.policy = rules(&[&["alice", "admin"]]);
        let mut rm = DefaultRoleManager::new(10);
        assert!(matches!(
            ast.build_role_links(&mut rm),
            Err(EnforceError::Model(ModelError::RoleDefinition { .. }))
        ));
    }

    #[test]
    fn short_rule_is_rejected() {
        let mut ast = Assertion::new("g", "g", "_, _, _");
        ast.policy = rules(&[&["alice", "admin"]]);
        let mut rm = DefaultRoleManager::new(10);
        assert!(matches!(
            ast.build_role_links(&mut rm),
            Err(EnforceError::Policy(PolicyError::RuleTooShort { .. }))
        ));
    }

    #[test]
    fn trailing_fields_beyond_arity_are_ignored() {
        let mut ast = Assertion::new("g", "g", "_, _");
        ast.policy = rules(&[&["alice", "admin", "leftover"]]);
        let mut rm = DefaultRoleManager::new(10);
        ast.build_role_links(&mut rm).unwrap();
        assert!(rm.has_link("alice", "admin", None).unwrap());
        // The third field was not treated as a domain.
        assert!(!rm.has_link("alice", "admin", Some("leftover")).unwrap());
    }

    #[test]
    fn incremental_remove_deletes_edge() {
        let ast = Assertion::new("g", "g", "_, _");
        let mut rm = DefaultRoleManager::new(10);
        let batch = rules(&[&["alice", "admin"]]);
        ast.build_incremental_role_links(&mut rm, PolicyOp::Add, &batch)
            .unwrap();
        assert!(rm.has_link("alice", "admin", None).unwrap());
        ast.build_incremental_role_links(&mut rm, PolicyOp::Remove, &batch)
            .unwrap();
        assert!(!rm.has_link("alice", "admin", None).unwrap());
    }
}
