//! Display-oriented node trees for decoded packets.
//!
//! A tree is a pure function of a [`DecodedPacket`](crate::DecodedPacket)
//! and a [`ProjectionConfig`]: projecting the same packet twice yields equal
//! trees, expansion hints included.

mod print;
mod project;

use serde::{Deserialize, Serialize};

use crate::value::Scalar;

pub use print::{print_tree, PrintChild, Printable};
pub use project::{get_tree, project};

/// Scalar value attached to a node.
pub type NodeValue = Scalar;

/// Semantic class of a node; the expansion hint derives from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    Header,
    /// Schema-decoded body.
    Body,
    Field,
    Message,
    Repeated,
    Element,
    Multiplexed,
    Packet,
    /// Body with no registered decoder, bytes kept verbatim.
    Unknown,
    /// Body decoded by a flat layout.
    Opaque,
    HexRow,
    /// Where decoding stopped early.
    Marker,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeNode {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<NodeValue>,
    /// Short description of a grouping node, such as its type name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    pub kind: NodeKind,
    pub expand_by_default: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn leaf(kind: NodeKind, label: impl Into<String>, value: NodeValue) -> Self {
        Self {
            label: label.into(),
            value: Some(value),
            annotation: None,
            kind,
            expand_by_default: false,
            children: Vec::new(),
        }
    }

    pub fn group(kind: NodeKind, label: impl Into<String>, children: Vec<TreeNode>) -> Self {
        Self {
            label: label.into(),
            value: None,
            annotation: None,
            kind,
            expand_by_default: false,
            children,
        }
    }

    pub fn annotated(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = Some(annotation.into());
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of levels, counting this node.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(TreeNode::depth).max().unwrap_or(0)
    }

    /// Total number of nodes, counting this node.
    pub fn node_count(&self) -> usize {
        let nested: usize = self.children.iter().map(TreeNode::node_count).sum();
        1 + nested
    }

    /// Follows child labels from this node.
    pub fn find(&self, path: &[&str]) -> Option<&TreeNode> {
        path.iter().try_fold(self, |node, label| {
            node.children.iter().find(|c| c.label == *label)
        })
    }

    pub fn child(&self, label: &str) -> Option<&TreeNode> {
        self.find(&[label])
    }

    /// Text rendering with box-drawing branches, one node per line.
    pub fn render(&self) -> String {
        self.render_with(ProjectionConfig::default().bytes_preview)
    }

    /// Like [`render`](Self::render), previewing at most `bytes_preview`
    /// bytes of byte values.
    pub fn render_with(&self, bytes_preview: usize) -> String {
        Rendered {
            node: self,
            bytes_preview,
        }
        .to_string_with_tab("")
    }

    fn headline(&self, bytes_preview: usize) -> String {
        let mut line = self.label.clone();
        if let Some(annotation) = &self.annotation {
            line.push_str(" <");
            line.push_str(annotation);
            line.push('>');
        }
        if let Some(value) = &self.value {
            line.push_str(": ");
            line.push_str(&value.display_with(bytes_preview));
        }
        line
    }
}

struct Rendered<'a> {
    node: &'a TreeNode,
    bytes_preview: usize,
}

impl Printable for Rendered<'_> {
    fn to_string_with_tab(&self, tab: &str) -> String {
        let children: Vec<Rendered<'_>> = self
            .node
            .children
            .iter()
            .map(|node| Rendered {
                node,
                bytes_preview: self.bytes_preview,
            })
            .collect();
        let printers: Vec<_> = children
            .iter()
            .map(|child| move |tab: &str| child.to_string_with_tab(tab))
            .collect();
        let refs: Vec<&PrintChild<'_>> = printers.iter().map(|p| p as &PrintChild<'_>).collect();
        self.node.headline(self.bytes_preview) + &print_tree(tab, &refs)
    }
}

/// Projection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectionConfig {
    /// Groups nested deeper than this below the body start collapsed.
    pub expand_depth: usize,
    /// Repeated groups and hex dumps with more children start collapsed.
    pub collapse_repeated_over: usize,
    pub hex_row_width: usize,
    /// Bytes shown inline for byte values.
    pub bytes_preview: usize,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            expand_depth: 2,
            collapse_repeated_over: 16,
            hex_row_width: 16,
            bytes_preview: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TreeNode {
        TreeNode::group(
            NodeKind::Root,
            "Ping",
            vec![
                TreeNode::group(
                    NodeKind::Header,
                    "header",
                    vec![TreeNode::leaf(NodeKind::Field, "message_type", Scalar::UInt(10))],
                )
                .annotated("simple"),
                TreeNode::leaf(NodeKind::Unknown, "body", Scalar::Bytes(vec![0xab])),
            ],
        )
    }

    #[test]
    fn find_and_depth() {
        let root = sample();
        assert_eq!(root.depth(), 3);
        assert_eq!(root.node_count(), 4);
        assert_eq!(
            root.find(&["header", "message_type"])
                .and_then(|n| n.value.clone()),
            Some(Scalar::UInt(10))
        );
        assert!(root.find(&["header", "nope"]).is_none());
        assert_eq!(root.find(&[]), Some(&root));
    }

    #[test]
    fn render_is_box_drawn() {
        assert_eq!(
            sample().render(),
            "Ping\n├─ header <simple>\n│  └─ message_type: 10\n└─ body: ab (1 bytes)"
        );
    }

    #[test]
    fn config_defaults_fill_missing_keys() {
        let config: ProjectionConfig = toml::from_str("expand_depth = 5").unwrap();
        assert_eq!(config.expand_depth, 5);
        assert_eq!(config.collapse_repeated_over, 16);
    }
}
