//! The starter diagram: four labelled nodes in a diamond and one edge.

use crate::model::{Edge, Node, Position, Size};

pub fn nodes() -> Vec<Node> {
    let size = Size::new(50.0, 50.0);
    vec![
        Node::new("1", Position::new(0.0, 9.0), "A").with_size(size),
        Node::new("2", Position::new(125.0, 125.0), "B").with_size(size),
        Node::new("3", Position::new(0.0, 250.0), "C").with_size(size),
        Node::new("4", Position::new(-125.0, 125.0), "D").with_size(size),
    ]
}

pub fn edges() -> Vec<Edge> {
    vec![Edge::new("e1-2", "1", "2")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_edges_reference_sample_nodes() {
        let nodes = nodes();
        for edge in edges() {
            assert!(nodes.iter().any(|n| n.id == edge.source));
            assert!(nodes.iter().any(|n| n.id == edge.target));
        }
    }
}
