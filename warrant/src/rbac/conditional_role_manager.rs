//! Role manager whose edges carry link-condition predicates, evaluated at
//! query time. An edge with a predicate that returns false is not
//! traversed; a predicate error aborts the query.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::RoleError;

use super::default_role_manager::{Graph, DEFAULT_DOMAIN};
use super::{LinkConditionFn, MatchingFn, RoleManager};

#[derive(Default)]
struct Condition {
    func: Option<LinkConditionFn>,
    params: Vec<String>,
}

pub struct ConditionalRoleManager {
    domains: HashMap<String, Graph>,
    /// (name1, name2, domain) -> predicate and parameters. Kept outside the
    /// graph so conditions registered before their edge (or surviving a
    /// rebuild) are not lost.
    conditions: HashMap<(String, String, String), Condition>,
    max_hierarchy_level: usize,
}

impl ConditionalRoleManager {
    pub fn new(max_hierarchy_level: usize) -> Self {
        Self {
            domains: HashMap::new(),
            conditions: HashMap::new(),
            max_hierarchy_level,
        }
    }

    /// Attach a predicate to a domainless edge.
    pub fn set_link_condition_fn(&mut self, name1: &str, name2: &str, f: LinkConditionFn) {
        self.condition_mut(name1, name2, DEFAULT_DOMAIN).func = Some(f);
    }

    /// Attach a predicate to a domain-qualified edge.
    pub fn set_domain_link_condition_fn(
        &mut self,
        name1: &str,
        name2: &str,
        domain: &str,
        f: LinkConditionFn,
    ) {
        self.condition_mut(name1, name2, domain).func = Some(f);
    }

    /// Set the parameter vector of a domainless edge.
    pub fn set_link_condition_params(&mut self, name1: &str, name2: &str, params: Vec<String>) {
        self.condition_mut(name1, name2, DEFAULT_DOMAIN).params = params;
    }

    /// Set the parameter vector of a domain-qualified edge.
    pub fn set_domain_link_condition_params(
        &mut self,
        name1: &str,
        name2: &str,
        domain: &str,
        params: Vec<String>,
    ) {
        self.condition_mut(name1, name2, domain).params = params;
    }

    fn condition_mut(&mut self, name1: &str, name2: &str, domain: &str) -> &mut Condition {
        self.conditions
            .entry((name1.to_string(), name2.to_string(), domain.to_string()))
            .or_default()
    }

    /// Whether the edge is live right now. `Ok(true)` when no predicate is
    /// attached.
    fn edge_passes(&self, name1: &str, name2: &str, domain: &str) -> Result<bool, RoleError> {
        let key = (name1.to_string(), name2.to_string(), domain.to_string());
        let Some(cond) = self.conditions.get(&key) else {
            return Ok(true);
        };
        let Some(func) = &cond.func else {
            return Ok(true);
        };
        func(&cond.params).map_err(|message| RoleError::LinkCondition {
            name1: name1.to_string(),
            name2: name2.to_string(),
            message,
        })
    }

    fn search(&self, graph: &Graph, dom: &str, name1: &str, name2: &str) -> Result<bool, RoleError> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        if graph.parents.contains_key(name1) {
            visited.insert(name1);
            queue.push_back(name1);
        }

        let mut level = 0;
        while !queue.is_empty() && level < self.max_hierarchy_level {
            for _ in 0..queue.len() {
                let Some(vertex) = queue.pop_front() else {
                    break;
                };
                let Some(parents) = graph.parents.get(vertex) else {
                    continue;
                };
                for parent in parents {
                    if !self.edge_passes(vertex, parent, dom)? {
                        continue;
                    }
                    if parent == name2 {
                        return Ok(true);
                    }
                    if visited.insert(parent) {
                        queue.push_back(parent);
                    }
                }
            }
            level += 1;
        }
        Ok(false)
    }
}

impl RoleManager for ConditionalRoleManager {
    fn clear(&mut self) {
        // Conditions survive a rebuild; only the edges go.
        self.domains.clear();
    }

    fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) {
        let dom = domain.unwrap_or(DEFAULT_DOMAIN);
        self.domains.entry(dom.to_string()).or_default().add(name1, name2);
    }

    fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) {
        let dom = domain.unwrap_or(DEFAULT_DOMAIN);
        if let Some(graph) = self.domains.get_mut(dom) {
            graph.remove(name1, name2);
        }
        self.conditions
            .remove(&(name1.to_string(), name2.to_string(), dom.to_string()));
    }

    fn has_link(
        &self,
        name1: &str,
        name2: &str,
        domain: Option<&str>,
    ) -> Result<bool, RoleError> {
        if name1 == name2 {
            return Ok(true);
        }
        let dom = domain.unwrap_or(DEFAULT_DOMAIN);
        match self.domains.get(dom) {
            Some(graph) => self.search(graph, dom, name1, name2),
            None => Ok(false),
        }
    }

    fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        let dom = domain.unwrap_or(DEFAULT_DOMAIN);
        let mut roles: Vec<String> = self
            .domains
            .get(dom)
            .and_then(|g| g.parents.get(name))
            .map(|set| {
                set.iter()
                    .filter(|role| {
                        self.edge_passes(name, role, dom).unwrap_or(false)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        roles.sort();
        roles
    }

    fn get_users(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        let dom = domain.unwrap_or(DEFAULT_DOMAIN);
        let mut users: Vec<String> = self
            .domains
            .get(dom)
            .and_then(|g| g.children.get(name))
            .map(|set| {
                set.iter()
                    .filter(|user| {
                        self.edge_passes(user, name, dom).unwrap_or(false)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        users.sort();
        users
    }

    fn add_matching_func(&mut self, _f: MatchingFn) {
        // Pattern roles are not combined with link conditions.
    }

    fn add_domain_matching_func(&mut self, _f: MatchingFn) {}
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn true_when(expected: &'static str) -> LinkConditionFn {
        Arc::new(move |params: &[String]| {
            Ok(params.first().map(|p| p == expected).unwrap_or(false))
        })
    }

    #[test]
    fn edge_without_condition_is_live() {
        let mut crm = ConditionalRoleManager::new(10);
        crm.add_link("alice", "admin", None);
        assert!(crm.has_link("alice", "admin", None).unwrap());
    }

    #[test]
    fn condition_gates_reachability() {
        let mut crm = ConditionalRoleManager::new(10);
        crm.add_link("alice", "data2_admin", None);
        crm.add_link("alice", "data3_admin", None);
        crm.set_link_condition_fn("alice", "data2_admin", true_when("yes"));
        crm.set_link_condition_fn("alice", "data3_admin", true_when("yes"));
        crm.set_link_condition_params("alice", "data2_admin", vec!["yes".into()]);
        crm.set_link_condition_params("alice", "data3_admin", vec!["no".into()]);

        assert!(crm.has_link("alice", "data2_admin", None).unwrap());
        assert!(!crm.has_link("alice", "data3_admin", None).unwrap());
    }

    #[test]
    fn condition_applies_transitively() {
        let mut crm = ConditionalRoleManager::new(10);
        crm.add_link("alice", "staff", None);
        crm.add_link("staff", "admin", None);
        crm.set_link_condition_fn("staff", "admin", true_when("yes"));
        crm.set_link_condition_params("staff", "admin", vec!["no".into()]);
        assert!(!crm.has_link("alice", "admin", None).unwrap());
        crm.set_link_condition_params("staff", "admin", vec!["yes".into()]);
        assert!(crm.has_link("alice", "admin", None).unwrap());
    }

    #[test]
    fn domain_qualified_conditions() {
        let mut crm = ConditionalRoleManager::new(10);
        crm.add_link("alice", "admin", Some("domain2"));
        crm.set_domain_link_condition_fn("alice", "admin", "domain2", true_when("yes"));
        crm.set_domain_link_condition_params("alice", "admin", "domain2", vec!["yes".into()]);
        assert!(crm.has_link("alice", "admin", Some("domain2")).unwrap());
        assert!(!crm.has_link("alice", "admin", Some("domain3")).unwrap());
    }

    #[test]
    fn predicate_error_propagates() {
        let mut crm = ConditionalRoleManager::new(10);
        crm.add_link("alice", "admin", None);
        crm.set_link_condition_fn(
            "alice",
            "admin",
            Arc::new(|_: &[String]| Err("bad time format".to_string())),
        );
        let err = crm.has_link("alice", "admin", None).unwrap_err();
        assert!(matches!(err, RoleError::LinkCondition { .. }));
    }

    #[test]
    fn conditions_survive_clear() {
        let mut crm = ConditionalRoleManager::new(10);
        crm.add_link("alice", "admin", None);
        crm.set_link_condition_fn("alice", "admin", true_when("yes"));
        crm.set_link_condition_params("alice", "admin", vec!["no".into()]);
        crm.clear();
        crm.add_link("alice", "admin", None);
        assert!(!crm.has_link("alice", "admin", None).unwrap());
    }
}
