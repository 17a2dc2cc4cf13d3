//! Page Data Structures
//!
//! A `Page` is a node in the content hierarchy. Besides its own `parent_id`,
//! every page caches the slugs and titles of all of its ancestors:
//!
//! - `denormalised_path`: ancestor slugs joined by `/`, root first
//! - `denormalised_titles`: ancestor titles joined by `\n`, root first
//!
//! Both are empty for top-level pages. The caches let URLs and breadcrumbs be
//! produced without walking the tree.
//!
//! # Examples
//!
//! ```rust
//! use pagetree_core::models::Page;
//!
//! let page = Page::draft("Getting Started", None, None).unwrap();
//! assert_eq!(page.slug, "getting-started");
//! assert_eq!(page.get_absolute_url(), "/getting-started/");
//! ```

use crate::models::ValidationError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use uuid::Uuid;

/// Internal row identifier of a page
pub type PageId = i64;

/// Separator between slugs in `denormalised_path`
pub const PATH_SEPARATOR: char = '/';

/// Separator between titles in `denormalised_titles`
pub const TITLE_SEPARATOR: char = '\n';

/// Field values as they were when the page was read from the store.
///
/// Used to decide whether cached paths need recomputing on save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedState {
    pub parent_id: Option<PageId>,
    pub slug: String,
    pub title: String,
}

/// A node in the page hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Internal row id (0 until first save)
    pub id: PageId,

    /// Stable external identity, survives renames and moves
    pub uuid: Uuid,

    /// Parent page; `None` means top-level
    pub parent_id: Option<PageId>,

    pub title: String,

    /// Unique only in combination with `denormalised_path`
    pub slug: String,

    /// Ancestor slugs, root first, joined by `/`
    pub denormalised_path: String,

    /// Ancestor titles, root first, joined by `\n`
    pub denormalised_titles: String,

    #[serde(skip)]
    pub(crate) loaded: Option<LoadedState>,
}

/// One entry in a breadcrumb trail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub title: String,
    pub url: String,
}

impl Page {
    /// Build an unsaved page, deriving the slug from the title when none is given
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the title is empty or multi-line, or if no
    /// usable slug can be derived.
    pub fn draft(
        title: impl Into<String>,
        slug: Option<String>,
        parent_id: Option<PageId>,
    ) -> Result<Self, ValidationError> {
        let title = title.into();
        let slug = match slug {
            Some(s) if !s.trim().is_empty() => s,
            _ => slugify(&title),
        };

        let page = Self {
            id: 0,
            uuid: Uuid::new_v4(),
            parent_id,
            title,
            slug,
            denormalised_path: String::new(),
            denormalised_titles: String::new(),
            loaded: None,
        };
        page.validate()?;
        Ok(page)
    }

    /// Rebuild a page from stored column values, remembering them as loaded state
    pub(crate) fn from_stored(
        id: PageId,
        uuid: Uuid,
        parent_id: Option<PageId>,
        title: String,
        slug: String,
        denormalised_path: String,
        denormalised_titles: String,
    ) -> Self {
        let loaded = Some(LoadedState {
            parent_id,
            slug: slug.clone(),
            title: title.clone(),
        });

        Self {
            id,
            uuid,
            parent_id,
            title,
            slug,
            denormalised_path,
            denormalised_titles,
            loaded,
        }
    }

    /// Record the current field values as the persisted state
    pub(crate) fn mark_saved(&mut self) {
        self.loaded = Some(LoadedState {
            parent_id: self.parent_id,
            slug: self.slug.clone(),
            title: self.title.clone(),
        });
    }

    /// Field values as last read from or written to the store
    pub fn loaded_state(&self) -> Option<&LoadedState> {
        self.loaded.as_ref()
    }

    /// Whether this page has never been saved
    pub fn is_new(&self) -> bool {
        self.loaded.is_none()
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Check field-level invariants
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingField("title".to_string()));
        }

        if self.title.contains(TITLE_SEPARATOR) {
            return Err(ValidationError::InvalidField(
                "title cannot contain line breaks".to_string(),
            ));
        }

        if self.slug.is_empty() {
            return Err(ValidationError::MissingField("slug".to_string()));
        }

        if !is_valid_slug(&self.slug) {
            return Err(ValidationError::InvalidField(format!(
                "slug '{}' may only contain letters, numbers, underscores or hyphens",
                self.slug
            )));
        }

        if !self.is_new() && self.parent_id == Some(self.id) {
            return Err(ValidationError::CyclicHierarchy { page_id: self.id });
        }

        Ok(())
    }

    /// Whether the parent reference differs from the loaded state
    ///
    /// A new page counts as changed when it is created with a parent.
    pub fn parent_changed(&self) -> bool {
        match &self.loaded {
            Some(loaded) => loaded.parent_id != self.parent_id,
            None => self.parent_id.is_some(),
        }
    }

    pub fn slug_changed(&self) -> bool {
        self.loaded
            .as_ref()
            .is_some_and(|loaded| loaded.slug != self.slug)
    }

    /// Whether the cached path and titles must be recomputed on save
    pub fn needs_path_recompute(&self, force: bool) -> bool {
        force
            || (self.denormalised_path.is_empty() && self.parent_id.is_some())
            || (!self.denormalised_path.is_empty() && self.parent_id.is_none())
            || self.slug_changed()
            || self.parent_changed()
    }

    /// Recompute cached path and titles from the (new) parent
    ///
    /// Returns `true` if either cached value changed.
    pub fn recompute_path(&mut self, parent: Option<&Page>) -> bool {
        let (path, titles) = match parent {
            Some(parent) => (parent.child_path(), parent.child_titles()),
            None => (String::new(), String::new()),
        };

        let changed = path != self.denormalised_path || titles != self.denormalised_titles;
        self.denormalised_path = path;
        self.denormalised_titles = titles;
        changed
    }

    /// The `denormalised_path` this page's children should carry
    pub fn child_path(&self) -> String {
        join_segment(&self.denormalised_path, &self.slug, PATH_SEPARATOR)
    }

    /// The `denormalised_titles` this page's children should carry
    pub fn child_titles(&self) -> String {
        join_segment(&self.denormalised_titles, &self.title, TITLE_SEPARATOR)
    }

    /// Canonical URL, e.g. `/a/b/c/` for page `c` under `a/b`
    pub fn get_absolute_url(&self) -> String {
        url_for(&self.denormalised_path, &self.slug)
    }

    /// Breadcrumb trail from this page up to its top-level ancestor
    ///
    /// Built entirely from the cached strings, walking them right to left and
    /// pairing each trailing slug with its trailing title.
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        let mut trail = vec![Breadcrumb {
            title: self.title.clone(),
            url: self.get_absolute_url(),
        }];

        if self.denormalised_path.is_empty() {
            return trail;
        }

        let slugs: Vec<&str> = self.denormalised_path.split(PATH_SEPARATOR).collect();
        let titles: Vec<&str> = self.denormalised_titles.split(TITLE_SEPARATOR).collect();

        for depth in (0..slugs.len()).rev() {
            trail.push(Breadcrumb {
                title: titles.get(depth).copied().unwrap_or_default().to_string(),
                url: url_for(&slugs[..depth].join("/"), slugs[depth]),
            });
        }

        trail
    }
}

/// Join a prefix and one segment, omitting the separator for an empty prefix
pub fn join_segment(prefix: &str, segment: &str, separator: char) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}{}{}", prefix, separator, segment)
    }
}

/// Build the URL for a page given its cached path and slug
pub fn url_for(path: &str, slug: &str) -> String {
    if path.is_empty() {
        format!("/{}/", slug)
    } else {
        format!("/{}/{}/", path, slug)
    }
}

/// Split a URL path such as `a/b/c` into (`a/b`, `c`)
///
/// Leading and trailing slashes are ignored. Returns `None` for an empty path.
pub fn split_url_path(url_path: &str) -> Option<(String, String)> {
    let trimmed = url_path.trim_matches(PATH_SEPARATOR);
    if trimmed.is_empty() {
        return None;
    }

    match trimmed.rsplit_once(PATH_SEPARATOR) {
        Some((path, slug)) => Some((path.to_string(), slug.to_string())),
        None => Some((String::new(), trimmed.to_string())),
    }
}

/// Derive a URL slug from free text
///
/// Keeps unicode letters and digits, lowercases, drops punctuation and
/// collapses runs of whitespace or hyphens into a single hyphen.
pub fn slugify(value: &str) -> String {
    static STRIP: OnceLock<Regex> = OnceLock::new();
    static COLLAPSE: OnceLock<Regex> = OnceLock::new();

    let strip = STRIP.get_or_init(|| Regex::new(r"[^\w\s-]").expect("valid slug regex"));
    let collapse = COLLAPSE.get_or_init(|| Regex::new(r"[-\s]+").expect("valid slug regex"));

    let lowered = value.to_lowercase();
    let stripped = strip.replace_all(&lowered, "");
    let collapsed = collapse.replace_all(stripped.trim(), "-");
    collapsed.trim_matches('-').to_string()
}

fn is_valid_slug(slug: &str) -> bool {
    slug.chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
#[path = "page_test.rs"]
mod page_test;
