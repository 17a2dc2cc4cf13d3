//! Validation Error Types
//!
//! Errors raised when a model fails its own invariants. These are surfaced to
//! callers unchanged and never auto-corrected.

use std::collections::BTreeSet;
use thiserror::Error;

/// Validation errors for Page, Block and Reference operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid field value: {0}")]
    InvalidField(String),

    #[error("Page {page_id} cannot become a descendant of itself")]
    CyclicHierarchy { page_id: i64 },

    #[error("A page with slug '{slug}' already exists at path '{path}'")]
    PathConflict { path: String, slug: String },

    #[error("{}", describe_missing_references(.0))]
    MissingReferences(BTreeSet<i64>),

    /// Hooks whose id cannot name any reference (too large to store)
    #[error("Unresolvable reference hooks: {}", .0.join(", "))]
    UnresolvableHooks(Vec<String>),

    #[error("References must refer to either a page or a block, not {0}")]
    MalformedReference(&'static str),

    #[error("Invalid block type: {0}")]
    InvalidBlockType(String),

    #[error("Properties validation failed: {0}")]
    InvalidProperties(String),
}

fn describe_missing_references(ids: &BTreeSet<i64>) -> String {
    let listed = ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    if ids.len() == 1 {
        format!("Reference {} does not exist", listed)
    } else {
        format!("References {} do not exist", listed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_reference_singular_wording() {
        let err = ValidationError::MissingReferences(BTreeSet::from([7]));
        assert_eq!(err.to_string(), "Reference 7 does not exist");
    }

    #[test]
    fn test_missing_references_listed_in_ascending_order() {
        let err = ValidationError::MissingReferences(BTreeSet::from([12, 3, 5]));
        assert_eq!(err.to_string(), "References 3, 5, 12 do not exist");
    }
}
