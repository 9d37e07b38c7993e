//! Role managers: directed role-inheritance graphs with reachability
//! queries, optionally partitioned by domain and optionally gated by
//! link-condition predicates.

mod conditional_role_manager;
mod default_role_manager;

pub use conditional_role_manager::ConditionalRoleManager;
pub use default_role_manager::DefaultRoleManager;

use std::sync::Arc;

use crate::error::RoleError;

/// Pattern-equivalence between role or domain names, e.g. `keyMatch2` so
/// `/orgs/1` is equivalent to `/orgs/:id`. The first argument is the query
/// name, the second the stored name.
pub type MatchingFn = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// A predicate attached to a role-graph edge, evaluated at query time over
/// the edge's parameter vector. An `Err` aborts the traversal.
pub type LinkConditionFn = Arc<dyn Fn(&[String]) -> Result<bool, String> + Send + Sync>;

/// The contract every role manager fulfills.
///
/// `has_link` is transitive reachability; cycles must not cause
/// non-termination and traversal depth is capped per manager.
pub trait RoleManager: Send + Sync {
    /// Drop all edges (registered matching functions and link conditions
    /// survive, so rebuilds are cheap).
    fn clear(&mut self);

    /// Insert an inheritance edge: `name1` inherits from `name2`.
    fn add_link(&mut self, name1: &str, name2: &str, domain: Option<&str>);

    /// Remove an edge. Absence is not an error.
    fn delete_link(&mut self, name1: &str, name2: &str, domain: Option<&str>);

    /// Whether `name2` is reachable from `name1`.
    fn has_link(&self, name1: &str, name2: &str, domain: Option<&str>)
        -> Result<bool, RoleError>;

    /// Direct roles of `name`.
    fn get_roles(&self, name: &str, domain: Option<&str>) -> Vec<String>;

    /// Direct members of `name`.
    fn get_users(&self, name: &str, domain: Option<&str>) -> Vec<String>;

    /// Use `f` as pattern-equivalence between role names.
    fn add_matching_func(&mut self, f: MatchingFn);

    /// Use `f` as pattern-equivalence between domain names.
    fn add_domain_matching_func(&mut self, f: MatchingFn);
}
