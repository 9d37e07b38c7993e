//! warrant — a model-driven authorization engine.
//!
//! The rules of authorization are not baked into code: a declarative model
//! describes the request shape, the stored policy shape, optional role
//! graphs, a boolean matcher expression and an effect aggregation, and the
//! same engine then implements ACLs, RBAC (with or without domains),
//! ABAC over structured subjects, RESTful path matching, priority-ordered
//! allow/deny and temporally conditional roles.
//!
//! # Modules
//!
//! - [`model`] — model configuration, assertions, and the embedded policy
//!   store.
//! - [`rbac`] — role managers: plain and condition-gated inheritance
//!   graphs.
//! - [`expr`] — the expression evaluator behind compiled matchers.
//! - [`effector`] — effect aggregation (allow-override, deny-override,
//!   priorities).
//! - [`builtins`] — matcher functions: `keyMatch` family, `regexMatch`,
//!   `ipMatch`, `globMatch`, `timeMatch`.
//! - [`enforcer`] — the enforcement pipeline and runtime surface.
//! - [`adapter`] — policy storage: CSV-like files and in-memory stores.
//! - [`error`] — typed errors for every failure domain.
//!
//! # Example
//!
//! ```no_run
//! use warrant::{Enforcer, Value};
//!
//! # fn main() -> warrant::error::Result<()> {
//! let e = Enforcer::from_files("examples/rbac_model.conf", "examples/rbac_policy.csv")?;
//! let allowed = e.enforce(&[
//!     Value::from("alice"),
//!     Value::from("data1"),
//!     Value::from("read"),
//! ])?;
//! # let _ = allowed;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod builtins;
pub mod effector;
pub mod enforcer;
pub mod error;
pub mod expr;
mod management;
pub mod model;
pub mod rbac;

pub use adapter::{Adapter, FileAdapter, Filter, FilteredFileAdapter, MemoryAdapter};
pub use effector::{Effect, Effector};
pub use enforcer::{EnforceContext, Enforcer};
pub use error::EnforceError;
pub use expr::Value;
pub use model::Model;
pub use rbac::{ConditionalRoleManager, DefaultRoleManager, RoleManager};
