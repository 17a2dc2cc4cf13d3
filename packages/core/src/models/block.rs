//! Block Data Structures
//!
//! A `Block` is a unit of content owned by exactly one page. Blocks are
//! polymorphic: the shared fields live on the base row (`blocks` table) and
//! each concrete variant keeps its own fields in a derived row keyed by the
//! base id (e.g. `text_blocks`). The `block_type` column is the discriminator.
//!
//! A block may start life as a generic placeholder (`BlockKind::Generic`) and
//! later be cast to a concrete variant, keeping its id and position.

use crate::models::{PageId, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Internal row identifier of a block
pub type BlockId = i64;

/// Discriminator stored in `blocks.block_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    /// Generic placeholder with no variant fields
    Block,
    Text,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Block => "block",
            BlockType::Text => "text",
        }
    }

    /// The type this variant specialises, `None` for the base type
    pub fn parent_type(&self) -> Option<BlockType> {
        match self {
            BlockType::Block => None,
            BlockType::Text => Some(BlockType::Block),
        }
    }

    /// Whether `self` is a strict specialisation of `other`
    pub fn is_specialization_of(&self, other: BlockType) -> bool {
        let mut current = self.parent_type();
        while let Some(ty) = current {
            if ty == other {
                return true;
            }
            current = ty.parent_type();
        }
        false
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block" => Ok(BlockType::Block),
            "text" => Ok(BlockType::Text),
            other => Err(ValidationError::InvalidBlockType(other.to_string())),
        }
    }
}

/// Fields specific to text blocks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    pub content: String,
}

/// Variant payload of a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    #[serde(rename = "block")]
    Generic,
    Text(TextBlock),
}

impl BlockKind {
    pub fn text(content: impl Into<String>) -> Self {
        BlockKind::Text(TextBlock {
            content: content.into(),
        })
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            BlockKind::Generic => BlockType::Block,
            BlockKind::Text(_) => BlockType::Text,
        }
    }

    /// Free-text content that may embed reference hooks
    pub fn content(&self) -> Option<&str> {
        match self {
            BlockKind::Generic => None,
            BlockKind::Text(text) => Some(&text.content),
        }
    }

    /// Build the payload for `target` from caller-supplied JSON fields
    ///
    /// `fields` must be a JSON object (or null). Keys that the target variant
    /// does not define are rejected.
    pub fn from_fields(target: BlockType, fields: &Value) -> Result<Self, ValidationError> {
        let empty = serde_json::Map::new();
        let object = match fields {
            Value::Null => &empty,
            Value::Object(map) => map,
            _ => {
                return Err(ValidationError::InvalidProperties(
                    "extra fields must be a JSON object".to_string(),
                ))
            }
        };

        let allowed: &[&str] = match target {
            BlockType::Block => &[],
            BlockType::Text => &["content"],
        };
        if let Some(unknown) = object.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(ValidationError::InvalidProperties(format!(
                "'{}' is not a field of {} blocks",
                unknown, target
            )));
        }

        match target {
            BlockType::Block => Ok(BlockKind::Generic),
            BlockType::Text => {
                let content = match object.get("content") {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s.clone(),
                    Some(_) => {
                        return Err(ValidationError::InvalidProperties(
                            "content must be a string".to_string(),
                        ))
                    }
                };
                Ok(BlockKind::Text(TextBlock { content }))
            }
        }
    }
}

/// A unit of content owned by a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: BlockId,

    /// Owning page
    pub page_id: PageId,

    /// Sort key, unique per page
    pub position: i32,

    pub published: bool,

    pub created: DateTime<Utc>,

    #[serde(flatten)]
    pub kind: BlockKind,
}

impl Block {
    pub fn block_type(&self) -> BlockType {
        self.kind.block_type()
    }

    pub fn content(&self) -> Option<&str> {
        self.kind.content()
    }

    /// URL of this block given the URL of its page
    pub fn url_within(&self, page_url: &str) -> String {
        block_url(page_url, self.id)
    }
}

/// Anchor URL for a block on a page
pub fn block_url(page_url: &str, block_id: BlockId) -> String {
    format!("{}#block-{}", page_url, block_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_type_round_trips_through_str() {
        assert_eq!("text".parse::<BlockType>().unwrap(), BlockType::Text);
        assert_eq!(BlockType::Block.to_string(), "block");
        assert!("image".parse::<BlockType>().is_err());
    }

    #[test]
    fn test_specialization() {
        assert!(BlockType::Text.is_specialization_of(BlockType::Block));
        assert!(!BlockType::Block.is_specialization_of(BlockType::Text));
        assert!(!BlockType::Text.is_specialization_of(BlockType::Text));
    }

    #[test]
    fn test_from_fields_text() {
        let kind = BlockKind::from_fields(BlockType::Text, &json!({"content": "hi"})).unwrap();
        assert_eq!(kind, BlockKind::text("hi"));

        let empty = BlockKind::from_fields(BlockType::Text, &Value::Null).unwrap();
        assert_eq!(empty.content(), Some(""));
    }

    #[test]
    fn test_from_fields_rejects_unknown_keys() {
        let err = BlockKind::from_fields(BlockType::Text, &json!({"colour": "red"})).unwrap_err();
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn test_from_fields_rejects_non_string_content() {
        assert!(BlockKind::from_fields(BlockType::Text, &json!({"content": 4})).is_err());
        assert!(BlockKind::from_fields(BlockType::Text, &json!([1, 2])).is_err());
    }

    #[test]
    fn test_block_serializes_with_type_tag() {
        let block = Block {
            id: 5,
            page_id: 1,
            position: 100,
            published: false,
            created: Utc::now(),
            kind: BlockKind::text("Hello"),
        };

        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["content"], "Hello");
        assert_eq!(value["pageId"], 1);
    }

    #[test]
    fn test_block_url() {
        assert_eq!(block_url("/a/b/", 12), "/a/b/#block-12");
    }
}
