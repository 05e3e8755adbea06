//! Variables: scoped storage, `{{name}}` interpolation and dynamic values.

pub mod interpolate;
pub mod store;
pub mod system;

pub use interpolate::{deep_interpolate, interpolate, merge_query, resolve_request};
pub use store::{PendingWrite, ScopeKey, VarError, Variable, VariableScope, VariableStore};
pub use system::resolve_dynamic_variable;
