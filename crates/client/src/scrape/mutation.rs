//! DOM mutation significance filter.
//!
//! Mirrors what a mutation observer reports and decides whether a batch is
//! worth a re-scrape. Style and class churn, script/style text and
//! non-content elements never count.

use serde::{Deserialize, Serialize};

const IGNORED_ATTRIBUTES: &[&str] = &["style", "class"];
const NON_CONTENT_PARENTS: &[&str] = &["script", "style", "noscript"];
const NON_CONTENT_ELEMENTS: &[&str] = &["script", "style", "noscript", "meta", "link"];

/// A node added to or removed from the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum MutatedNode {
    Element { tag: String },
    Text { text: String },
    /// Comments, processing instructions and similar.
    Other,
}

/// One mutation observer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationRecord {
    Attributes {
        attribute: String,
    },
    CharacterData {
        /// Tag of the edited text node's parent, if it has one.
        parent_tag: Option<String>,
    },
    ChildList {
        #[serde(default)]
        added: Vec<MutatedNode>,
        #[serde(default)]
        removed: Vec<MutatedNode>,
    },
}

fn tag_in(tag: &str, list: &[&str]) -> bool {
    list.iter().any(|t| t.eq_ignore_ascii_case(tag))
}

fn is_content_node(node: &MutatedNode) -> bool {
    match node {
        MutatedNode::Element { tag } => !tag_in(tag, NON_CONTENT_ELEMENTS),
        MutatedNode::Text { text } => !text.trim().is_empty(),
        MutatedNode::Other => false,
    }
}

impl MutationRecord {
    /// Whether this record can change the page's readable text.
    pub fn is_significant(&self) -> bool {
        match self {
            MutationRecord::Attributes { attribute } => !tag_in(attribute, IGNORED_ATTRIBUTES),
            MutationRecord::CharacterData { parent_tag } => parent_tag
                .as_deref()
                .is_none_or(|tag| !tag_in(tag, NON_CONTENT_PARENTS)),
            MutationRecord::ChildList { added, removed } => {
                added.iter().chain(removed.iter()).any(is_content_node)
            }
        }
    }
}

/// A batch is forwarded when at least one record is significant.
pub fn is_significant_batch(records: &[MutationRecord]) -> bool {
    records.iter().any(MutationRecord::is_significant)
}
