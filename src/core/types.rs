use super::{DbError, Result, Value};
use lazy_static::lazy_static;
use regex::Regex;

pub type Row = Vec<Value>;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap();
}

/// Checks that `name` can be spliced into SQL as an unquoted identifier.
pub fn validate_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(DbError::InvalidIdentifier(name.to_string()))
    }
}
