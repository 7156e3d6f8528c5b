//! Declarative view trees.

use serde::{Deserialize, Serialize};

/// One node of a view tree.
///
/// Components emit complete trees. Diffing and patching belong to the
/// renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VNode {
    Element {
        tag: String,
        /// Stable identity for reconciliation among siblings.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attrs: Vec<(String, String)>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<VNode>,
    },
    Text {
        text: String,
    },
}

impl VNode {
    /// An element without attributes or children.
    pub fn element(tag: impl Into<String>) -> Self {
        Self::Element {
            tag: tag.into(),
            key: None,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Set the reconciliation key. No effect on text nodes.
    pub fn with_key(mut self, value: impl Into<String>) -> Self {
        if let Self::Element { key, .. } = &mut self {
            *key = Some(value.into());
        }
        self
    }

    /// Set an attribute, replacing an earlier value. No effect on text
    /// nodes.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Element { attrs, .. } = &mut self {
            let (name, value) = (name.into(), value.into());
            match attrs.iter_mut().find(|(existing, _)| *existing == name) {
                Some((_, slot)) => *slot = value,
                None => attrs.push((name, value)),
            }
        }
        self
    }

    pub fn with_child(self, child: VNode) -> Self {
        self.with_children([child])
    }

    /// Append children. No effect on text nodes.
    pub fn with_children(mut self, new: impl IntoIterator<Item = VNode>) -> Self {
        if let Self::Element { children, .. } = &mut self {
            children.extend(new);
        }
        self
    }

    /// Append a text child.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(Self::text(text))
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Element { tag, .. } => Some(tag),
            Self::Text { .. } => None,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Element { key, .. } => key.as_deref(),
            Self::Text { .. } => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            Self::Element { attrs, .. } => attrs
                .iter()
                .find(|(existing, _)| existing == name)
                .map(|(_, value)| value.as_str()),
            Self::Text { .. } => None,
        }
    }

    pub fn children(&self) -> &[VNode] {
        match self {
            Self::Element { children, .. } => children,
            Self::Text { .. } => &[],
        }
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Element { children, .. } => children.iter().map(Self::text_content).collect(),
        }
    }
}
