//! Graph entities and the partial updates that target them.

use serde::{Deserialize, Serialize};

/// Width and height of a node inserted without an explicit size.
pub const DEFAULT_NODE_SIZE: Size = Size {
    width: 50.0,
    height: 50.0,
};

/// Canvas position of a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rendered size of a node.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl Default for Size {
    fn default() -> Self {
        DEFAULT_NODE_SIZE
    }
}

/// A materialized diagram node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub position: Position,
    pub size: Size,
    pub label: String,
}

impl Node {
    pub fn new(id: impl Into<String>, position: Position, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            position,
            size: Size::default(),
            label: label.into(),
        }
    }

    pub fn with_size(mut self, size: Size) -> Self {
        self.size = size;
        self
    }

    /// A patch that sets every field of this node.
    pub fn to_patch(&self) -> NodePatch {
        NodePatch {
            position: Some(self.position),
            size: Some(self.size),
            label: Some(self.label.clone()),
        }
    }
}

/// A materialized diagram edge.
///
/// `source` and `target` may name nodes this replica has never seen.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn to_patch(&self) -> EdgePatch {
        EdgePatch {
            source: Some(self.source.clone()),
            target: Some(self.target.clone()),
        }
    }

    /// Whether either endpoint is `node_id`.
    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// Fields written by a node insert or update. `None` leaves a field alone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl NodePatch {
    pub fn position(position: Position) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn size(size: Size) -> Self {
        Self {
            size: Some(size),
            ..Default::default()
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.size.is_none() && self.label.is_none()
    }
}

/// Fields written by an edge insert or update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl EdgePatch {
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.target.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_defaults_to_sample_size() {
        let node = Node::new("1", Position::new(0.0, 9.0), "A");
        assert_eq!(node.size, DEFAULT_NODE_SIZE);
    }

    #[test]
    fn test_node_patch_omits_unset_fields() {
        let json = serde_json::to_string(&NodePatch::label("E")).unwrap();
        assert_eq!(json, r#"{"label":"E"}"#);
    }

    #[test]
    fn test_edge_touches() {
        let edge = Edge::new("e1-2", "1", "2");
        assert!(edge.touches("1"));
        assert!(edge.touches("2"));
        assert!(!edge.touches("3"));
    }
}
