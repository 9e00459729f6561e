//! Materialized node trees.
//!
//! [`TreeNode`] is the fully-baked counterpart of the streaming [`Node`]:
//! every child stream resolved into a concrete child sequence. The serialized
//! shape elides empty attribute lists and empty child sequences.

use futures::future::BoxFuture;
use serde::Serialize;

use weft_shared::errors::Result;

use crate::node::{Attribute, Node, NodeStream};

/// A fully materialized node
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TreeNode {
    Element {
        #[serde(rename = "tagName")]
        tag_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        attributes: Option<Vec<TreeAttribute>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        children: Option<Vec<TreeNode>>,
        l: u32,
        c: u32,
    },
    Text {
        #[serde(rename = "textContent")]
        text_content: String,
        l: u32,
        c: u32,
    },
    Doctype {
        #[serde(rename = "doctypeDeclaration")]
        doctype_declaration: String,
        l: u32,
        c: u32,
    },
    Comment {
        comment: String,
        l: u32,
        c: u32,
    },
}

/// A materialized attribute
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TreeAttribute {
    pub name: String,
    pub value: String,
    pub l: u32,
    pub c: u32,
}

impl From<Attribute> for TreeAttribute {
    fn from(attr: Attribute) -> Self {
        Self {
            name: attr.name,
            value: attr.value,
            l: attr.location.line,
            c: attr.location.column,
        }
    }
}

/// Drains the given stream, recursively resolving every element's child
/// stream. The first in-band error aborts the resolution.
pub(crate) fn resolve_stream(mut stream: NodeStream) -> BoxFuture<'static, Result<Vec<TreeNode>>> {
    Box::pin(async move {
        let mut nodes = Vec::new();
        while let Some(item) = stream.next().await {
            nodes.push(resolve_node(item?).await?);
        }
        Ok(nodes)
    })
}

async fn resolve_node(node: Node) -> Result<TreeNode> {
    Ok(match node {
        Node::Element {
            tag_name,
            attributes,
            children,
            location,
        } => {
            let children = match children {
                Some(stream) => {
                    let resolved = resolve_stream(stream).await?;
                    if resolved.is_empty() {
                        None
                    } else {
                        Some(resolved)
                    }
                }
                None => None,
            };
            let attributes = if attributes.is_empty() {
                None
            } else {
                Some(attributes.into_iter().map(TreeAttribute::from).collect())
            };

            TreeNode::Element {
                tag_name,
                attributes,
                children,
                l: location.line,
                c: location.column,
            }
        }
        Node::Text { text, location } => TreeNode::Text {
            text_content: text,
            l: location.line,
            c: location.column,
        },
        Node::Doctype { declaration, location } => TreeNode::Doctype {
            doctype_declaration: declaration,
            l: location.line,
            c: location.column,
        },
        Node::Comment { comment, location } => TreeNode::Comment {
            comment,
            l: location.line,
            c: location.column,
        },
    })
}

/// Serializes a materialized tree back into markup. Elements without
/// children are written with self-closing syntax, so a reparse yields an
/// equivalent tree.
pub fn write_html(nodes: &[TreeNode]) -> String {
    let mut writer = Writer { buffer: String::new() };
    writer.write_nodes(nodes);
    writer.buffer
}

struct Writer {
    buffer: String,
}

impl Writer {
    fn write_nodes(&mut self, nodes: &[TreeNode]) {
        for node in nodes {
            self.write_node(node);
        }
    }

    fn write_node(&mut self, node: &TreeNode) {
        match node {
            TreeNode::Element {
                tag_name,
                attributes,
                children,
                ..
            } => {
                self.buffer.push('<');
                self.buffer.push_str(tag_name);
                if let Some(attributes) = attributes {
                    for attr in attributes {
                        self.write_attribute(attr);
                    }
                }
                match children {
                    Some(children) => {
                        self.buffer.push('>');
                        self.write_nodes(children);
                        self.buffer.push_str("</");
                        self.buffer.push_str(tag_name);
                        self.buffer.push('>');
                    }
                    None => self.buffer.push_str(" />"),
                }
            }
            TreeNode::Text { text_content, .. } => self.buffer.push_str(text_content),
            TreeNode::Doctype {
                doctype_declaration, ..
            } => {
                self.buffer.push_str("<!DOCTYPE ");
                self.buffer.push_str(doctype_declaration);
                self.buffer.push('>');
            }
            TreeNode::Comment { comment, .. } => {
                self.buffer.push_str("<!-- ");
                self.buffer.push_str(comment);
                self.buffer.push_str(" -->");
            }
        }
    }

    fn write_attribute(&mut self, attr: &TreeAttribute) {
        self.buffer.push(' ');
        self.buffer.push_str(&attr.name);
        if attr.value.is_empty() {
            return;
        }

        self.buffer.push_str("=\"");
        for ch in attr.value.chars() {
            // quotes and backslashes go back out escaped so they survive a
            // reparse
            if ch == '"' || ch == '\\' {
                self.buffer.push('\\');
            }
            self.buffer.push(ch);
        }
        self.buffer.push('"');
    }
}
