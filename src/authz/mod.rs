//! Relationship-based authorization for the conference platform.
//!
//! Rule modules register grants into a [`RegistryBuilder`]; the frozen
//! [`RuleRegistry`] yields a per-request [`AbilitySet`], which answers
//! single-instance decisions ([`engine`]) and compiles list filters
//! ([`query`]). Route handlers go through an [`AuditGuard`].

pub mod ability;
pub mod condition;
pub mod engine;
pub mod errors;
pub mod guard;
pub mod instance;
pub mod loader;
pub mod policy;
pub mod query;
pub mod registry;
pub mod rules;
pub mod schema;
pub mod types;
pub mod web;

pub use ability::{AbilitySet, Grant};
pub use condition::{Condition, Includes, Quantifier};
pub use errors::AuthzError;
pub use guard::{AuditGuard, CheckStatus, RequestAudit};
pub use instance::Instance;
pub use query::QueryPredicate;
pub use registry::{RegistryBuilder, RuleRegistry};
pub use schema::Schema;
pub use types::{Action, ActionSet, ResourceType, Subject};
