//! The default role manager: one directed graph per domain, breadth-first
//! reachability with a visited set and a depth cap.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::trace;

use crate::error::RoleError;

use super::{MatchingFn, RoleManager};

pub(crate) const DEFAULT_DOMAIN: &str = "";

/// Inheritance edges for one domain.
#[derive(Debug, Clone, Default)]
pub(crate) struct Graph {
    /// member -> roles it inherits from
    pub parents: HashMap<String, HashSet<String>>,
    /// role -> members that inherit from it
    pub children: HashMap<String, HashSet<String>>,
}

impl Graph {
    pub fn add(&mut self, name1: &str, name2: &str) {
        self.parents
            .entry(name1.to_string())
            .or_default()
            .insert(name2.to_string());
        self.children
            .entry(name2.to_string())
            .or_default()
            .insert(name1.to_string());
    }

    pub fn remove(&mut self, name1: &str, name2: &str) {
        if let Some(set) = self.parents.get_mut(name1) {
            set.remove(name2);
        }
        if let Some(set) = self.children.get_mut(name2) {
            set.remove(name1);
        }
    }
}

pub struct DefaultRoleManager {
    domains: HashMap<String, Graph>,
    max_hierarchy_level: usize,
    matching_fn: Option<MatchingFn>,
    domain_matching_fn: Option<MatchingFn>,
}

impl DefaultRoleManager {
    /// `max_hierarchy_level` bounds the traversal depth (10 in practice).
    pub fn new(max_hierarchy_level: usize) -> Self {
        Self {
            domains: HashMap::new(),
            max_hierarchy_level,
            matching_fn: None,
            domain_matching_fn: None,
        }
    }

    /// `query == stored`, or the matching function holds.
    fn node_matches(&self, query: &str, stored: &str) -> bool {
        query == stored
            || self
                .matching_fn
                .as_ref()
                .map(|f| f(query, stored))
                .unwrap_or(false)
    }

    /// The domain graphs a query should consult.
    fn matching_domains(&self, domain: &str) -> Vec<&Graph> {
        match &self.domain_matching_fn {
            None => self.domains.get(domain).into_iter().collect(),
            Some(f) => self
                .domains
                .iter()
                .filter(|(stored, _)| *stored == domain || f(domain, stored))
                .map(|(_, g)| g)
                .collect(),
        }
    }

    fn search(&self, graph: &Graph, name1: &str, name2: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();

        for vertex in graph.parents.keys() {
            if self.node_matches(name1, vertex) {
                visited.insert(vertex);
                queue.push_back(vertex);
            }
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
                    if parent == name2 || self.node_matches(parent.as_str(), name2) {
                        return true;
                    }
                    if visited.insert(parent) {
                        queue.push_back(parent);
                    }
                }
            }
            level += 1;
        }
        false
    }
}

impl RoleManager for DefaultRoleManager {
    fn clear(&mut self) {
        self.domains.clear();
    }

    fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) {
        let dom = domain.unwrap_or(DEFAULT_DOMAIN);
        self.domains.entry(dom.to_string()).or_default().add(name1, name2);
        trace!(name1, name2, domain = dom, "role link added");
    }

    fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>) {
        let dom = domain.unwrap_or(DEFAULT_DOMAIN);
        if let Some(graph) = self.domains.get_mut(dom) {
            graph.remove(name1, name2);
        }
    }

    fn has_link(
        &self,
        name1: &str,
        name2: &str,
        domain: Option<&str>,
    ) -> Result<bool, RoleError> {
        if self.node_matches(name1, name2) {
            return Ok(true);
        }
        let dom = domain.unwrap_or(DEFAULT_DOMAIN);
        Ok(self
            .matching_domains(dom)
            .into_iter()
            .any(|graph| self.search(graph, name1, name2)))
    }

    fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        let dom = domain.unwrap_or(DEFAULT_DOMAIN);
        let mut roles: Vec<String> = self
            .matching_domains(dom)
            .into_iter()
            .flat_map(|graph| {
                graph
                    .parents
                    .iter()
                    .filter(|(vertex, _)| self.node_matches(name, vertex))
                    .flat_map(|(_, parents)| parents.iter().cloned())
            })
            .collect();
        roles.sort();
        roles.dedup();
        roles
    }

    fn get_users(&self, name: &str, domain: Option<&str>) -> Vec<String> {
        let dom = domain.unwrap_or(DEFAULT_DOMAIN);
        let mut users: Vec<String> = self
            .matching_domains(dom)
            .into_iter()
            .flat_map(|graph| {
                graph
                    .children
                    .iter()
                    .filter(|(vertex, _)| self.node_matches(name, vertex))
                    .flat_map(|(_, children)| children.iter().cloned())
            })
            .collect();
        users.sort();
        users.dedup();
        users
    }

    fn add_matching_func(&mut self, f: MatchingFn) {
        self.matching_fn = Some(f);
    }

    fn add_domain_matching_func(&mut self, f: MatchingFn) {
        self.domain_matching_fn = Some(f);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::builtins;

    fn linked(pairs: &[(&str, &str)]) -> DefaultRoleManager {
        let mut rm = DefaultRoleManager::new(10);
        for (a, b) in pairs {
            rm.add_link(a, b, None);
        }
        rm
    }

    #[test]
    fn direct_and_transitive_links() {
        let rm = linked(&[("u1", "g1"), ("g1", "g2"), ("g2", "g3")]);
        assert!(rm.has_link("u1", "g1", None).unwrap());
        assert!(rm.has_link("u1", "g3", None).unwrap());
        assert!(!rm.has_link("g3", "u1", None).unwrap());
        assert!(rm.has_link("u1", "u1", None).unwrap());
    }

    #[test]
    fn delete_link_breaks_reachability() {
        let mut rm = linked(&[("u1", "g1"), ("g1", "g2")]);
        rm.delete_link("g1", "g2", None);
        assert!(rm.has_link("u1", "g1", None).unwrap());
        assert!(!rm.has_link("u1", "g2", None).unwrap());
        // Deleting again is harmless.
        rm.delete_link("g1", "g2", None);
    }

    #[test]
    fn cycles_terminate() {
        let rm = linked(&[("a", "b"), ("b", "c"), ("c", "a")]);
        assert!(rm.has_link("a", "c", None).unwrap());
        assert!(!rm.has_link("a", "x", None).unwrap());
    }

    #[test]
    fn hierarchy_level_caps_depth() {
        let mut rm = DefaultRoleManager::new(2);
        rm.add_link("a", "b", None);
        rm.add_link("b", "c", None);
        rm.add_link("c", "d", None);
        assert!(rm.has_link("a", "c", None).unwrap());
        assert!(!rm.has_link("a", "d", None).unwrap());
    }

    #[test]
    fn domains_are_independent() {
        let mut rm = DefaultRoleManager::new(10);
        rm.add_link("alice", "admin", Some("domain1"));
        rm.add_link("bob", "admin", Some("domain2"));
        assert!(rm.has_link("alice", "admin", Some("domain1")).unwrap());
        assert!(!rm.has_link("alice", "admin", Some("domain2")).unwrap());
        assert!(!rm.has_link("alice", "admin", None).unwrap());
    }

    #[test]
    fn matching_func_bridges_patterns() {
        let mut rm = DefaultRoleManager::new(10);
        rm.add_link("/book/:id", "book_group", None);
        assert!(!rm.has_link("/book/1", "book_group", None).unwrap());
        rm.add_matching_func(Arc::new(builtins::key_match2));
        assert!(rm.has_link("/book/1", "book_group", None).unwrap());
        assert!(!rm.has_link("/pen/1", "book_group", None).unwrap());
    }

    #[test]
    fn domain_matching_func_bridges_domains() {
        let mut rm = DefaultRoleManager::new(10);
        rm.add_link("alice", "admin", Some("*"));
        assert!(!rm.has_link("alice", "admin", Some("domain1")).unwrap());
        rm.add_domain_matching_func(Arc::new(builtins::key_match));
        assert!(rm.has_link("alice", "admin", Some("domain1")).unwrap());
    }

    #[test]
    fn roles_and_users() {
        let rm = linked(&[("u1", "g1"), ("u2", "g1"), ("g1", "g2")]);
        assert_eq!(rm.get_roles("u1", None), vec!["g1"]);
        assert_eq!(rm.get_users("g1", None), vec!["u1", "u2"]);
        // get_roles is direct, not transitive.
        assert_eq!(rm.get_roles("u1", None).len(), 1);
    }

    #[test]
    fn clear_drops_edges() {
        let mut rm = linked(&[("u1", "g1")]);
        rm.clear();
        assert!(!rm.has_link("u1", "g1", None).unwrap());
    }
}
