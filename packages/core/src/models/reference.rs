//! Reference Data Structures
//!
//! A `Reference` is a directed edge from a containing block to exactly one
//! target, either a page or a block. Block content points at its references
//! through inline hooks of the form `!ref(<id>)`. A hook preceded by a
//! backslash (`\!ref(<id>)`) is a literal and is never resolved.
//!
//! # Examples
//!
//! ```rust
//! use pagetree_core::models::find_references;
//!
//! let ids = find_references(r"see !ref(5) and \!ref(6)");
//! assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![5]);
//! ```

use crate::models::{BlockId, PageId, ValidationError};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Internal row identifier of a reference
pub type ReferenceId = i64;

/// Keyword that introduces an inline reference hook
pub const REFERENCE_HOOK: &str = "!ref";

/// Matches hooks together with an optional escaping backslash.
///
/// Group 1: escape (empty if unescaped), group 2: reference id.
const HOOK_PATTERN: &str = r"(\\?)!ref\((\d+)\)";

fn hook_regex() -> &'static Regex {
    static HOOK_REGEX: OnceLock<Regex> = OnceLock::new();
    HOOK_REGEX.get_or_init(|| Regex::new(HOOK_PATTERN).expect("valid hook regex"))
}

/// What a reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ReferenceTarget {
    Page(PageId),
    Block(BlockId),
}

impl ReferenceTarget {
    /// Build a target from the two nullable target columns
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MalformedReference` unless exactly one of the
    /// two is set.
    pub fn from_parts(
        referenced_page: Option<PageId>,
        referenced_block: Option<BlockId>,
    ) -> Result<Self, ValidationError> {
        match (referenced_page, referenced_block) {
            (Some(page), None) => Ok(ReferenceTarget::Page(page)),
            (None, Some(block)) => Ok(ReferenceTarget::Block(block)),
            (Some(_), Some(_)) => Err(ValidationError::MalformedReference("both")),
            (None, None) => Err(ValidationError::MalformedReference("neither")),
        }
    }

    pub fn page_id(&self) -> Option<PageId> {
        match self {
            ReferenceTarget::Page(id) => Some(*id),
            ReferenceTarget::Block(_) => None,
        }
    }

    pub fn block_id(&self) -> Option<BlockId> {
        match self {
            ReferenceTarget::Page(_) => None,
            ReferenceTarget::Block(id) => Some(*id),
        }
    }
}

/// A directed link from a block's content to a page or block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub id: ReferenceId,
    pub containing_block: BlockId,
    pub target: ReferenceTarget,
}

impl Reference {
    /// The inline hook text for this reference, e.g. `!ref(4)`
    pub fn hook(&self) -> String {
        hook_for(self.id)
    }

    /// Replace every unescaped hook of this reference in `content` with `url`
    pub fn update_references(&self, content: &str, url: &str) -> String {
        replace_hook(content, self.id, url)
    }
}

/// Hook text for a reference id
pub fn hook_for(id: ReferenceId) -> String {
    format!("{}({})", REFERENCE_HOOK, id)
}

/// Ids of all unescaped hooks in `text`
pub fn find_references(text: &str) -> BTreeSet<ReferenceId> {
    hook_regex()
        .captures_iter(text)
        .filter(|caps| caps[1].is_empty())
        .filter_map(|caps| caps[2].parse().ok())
        .collect()
}

/// Unescaped hooks whose id does not fit a [`ReferenceId`], as written
///
/// [`find_references`] cannot report these, yet no stored reference can back
/// them either.
pub fn find_unresolvable_hooks(text: &str) -> Vec<String> {
    hook_regex()
        .captures_iter(text)
        .filter(|caps| caps[1].is_empty() && caps[2].parse::<ReferenceId>().is_err())
        .map(|caps| caps[0].to_string())
        .collect()
}

/// Substitute unescaped hooks for `id` with `replacement`, leaving escaped
/// hooks and hooks of other references untouched
pub fn replace_hook(text: &str, id: ReferenceId, replacement: &str) -> String {
    hook_regex()
        .replace_all(text, |caps: &Captures| {
            let matches_id = caps[2].parse::<ReferenceId>().ok() == Some(id);
            if caps[1].is_empty() && matches_id {
                replacement.to_string()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_references_skips_escaped_hooks() {
        let ids = find_references("!ref(5) and \\!ref(6)");
        assert_eq!(ids, BTreeSet::from([5]));
    }

    #[test]
    fn test_find_references_deduplicates() {
        let ids = find_references("!ref(2) !ref(10)\n\n!ref(2)");
        assert_eq!(ids, BTreeSet::from([2, 10]));
    }

    #[test]
    fn test_find_references_ignores_malformed_hooks() {
        assert!(find_references("!ref() !ref(x) ref(3) !ref (4)").is_empty());
    }

    #[test]
    fn test_oversized_hook_ids_are_unresolvable() {
        let text = "!ref(7) !ref(99999999999999999999) \\!ref(88888888888888888888)";

        assert_eq!(find_references(text), BTreeSet::from([7]));
        assert_eq!(find_unresolvable_hooks(text), vec!["!ref(99999999999999999999)"]);
        assert!(find_unresolvable_hooks("!ref(9223372036854775807)").is_empty());
    }

    #[test]
    fn test_target_requires_exactly_one() {
        assert_eq!(
            ReferenceTarget::from_parts(Some(1), None).unwrap(),
            ReferenceTarget::Page(1)
        );
        assert_eq!(
            ReferenceTarget::from_parts(None, Some(2)).unwrap(),
            ReferenceTarget::Block(2)
        );
        assert_eq!(
            ReferenceTarget::from_parts(Some(1), Some(2)).unwrap_err(),
            ValidationError::MalformedReference("both")
        );
        assert_eq!(
            ReferenceTarget::from_parts(None, None).unwrap_err(),
            ValidationError::MalformedReference("neither")
        );
    }

    #[test]
    fn test_update_references_rewrites_only_own_hook() {
        let reference = Reference {
            id: 3,
            containing_block: 1,
            target: ReferenceTarget::Page(8),
        };

        let content = "[x](!ref(3)) [y](!ref(31)) \\!ref(3) !ref(3)";
        assert_eq!(
            reference.update_references(content, "/a/b/"),
            "[x](/a/b/) [y](!ref(31)) \\!ref(3) /a/b/"
        );
    }

    #[test]
    fn test_hook_text() {
        assert_eq!(hook_for(42), "!ref(42)");
    }
}
