//! Data Models
//!
//! This module contains the core data structures:
//!
//! - `Page` - Node in the content hierarchy with cached ancestor path/titles
//! - `Block` - Ordered unit of content owned by a page, polymorphic over `BlockKind`
//! - `Reference` - Link from a block's content to a page or block
//! - `SidebarLink` - Navigation tree entries
//! - `UnsavedWork` - Disposable editor snapshots
//!
//! Models hold no database handles; persistence lives in [`crate::db`] and
//! orchestration in [`crate::services`].

mod block;
mod page;
mod reference;
mod sidebar;
mod unsaved_work;
mod validation;

pub use block::{block_url, Block, BlockId, BlockKind, BlockType, TextBlock};
pub use page::{
    join_segment, slugify, split_url_path, url_for, Breadcrumb, LoadedState, Page, PageId,
    PATH_SEPARATOR, TITLE_SEPARATOR,
};
pub use reference::{
    find_references, find_unresolvable_hooks, hook_for, replace_hook, Reference, ReferenceId,
    ReferenceTarget, REFERENCE_HOOK,
};
pub use sidebar::{assemble_sidebar, SidebarLevel, SidebarLink};
pub use unsaved_work::UnsavedWork;
pub use validation::ValidationError;
