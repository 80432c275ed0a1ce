pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, Result, ScriptProblem};
pub use types::{Row, validate_identifier};
pub use value::Value;
