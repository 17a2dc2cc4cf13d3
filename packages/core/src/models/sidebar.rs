//! Sidebar Navigation Tree
//!
//! The sidebar for a page shows every top-level page, the full ancestor chain
//! of the page with all siblings at each ancestor level, and the page's own
//! direct children. Siblings' children (cousins) are never expanded.
//!
//! The tree is assembled bottom-up: the current page's children are attached
//! to the current page inside its sibling list, that list is attached to the
//! parent inside the parent's sibling list, and so on up to the top level.

use crate::models::PageId;
use serde::{Deserialize, Serialize};

/// A link in the sidebar, optionally expanded with its children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidebarLink {
    #[serde(skip)]
    pub page_id: PageId,

    pub title: String,
    pub url: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<SidebarLink>,
}

impl SidebarLink {
    pub fn new(page_id: PageId, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            page_id,
            title: title.into(),
            url: url.into(),
            children: Vec::new(),
        }
    }
}

/// One sibling list on the way from the current page to the top level
#[derive(Debug, Clone)]
pub struct SidebarLevel {
    /// All pages sharing a parent, in display order
    pub siblings: Vec<SidebarLink>,

    /// The page on the ancestor chain within `siblings`
    pub focus: PageId,
}

/// Splice sibling levels together into the final sidebar tree
///
/// `levels` runs from the current page's level (first) to the top level (last).
/// `children` are the current page's direct children.
pub fn assemble_sidebar(children: Vec<SidebarLink>, levels: Vec<SidebarLevel>) -> Vec<SidebarLink> {
    let mut carried = children;

    for level in levels {
        let mut siblings = level.siblings;
        if let Some(focused) = siblings.iter_mut().find(|link| link.page_id == level.focus) {
            focused.children = carried;
        }
        carried = siblings;
    }

    carried
}
