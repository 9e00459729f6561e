//! Token stream to node stream construction.
//!
//! The builder consumes the lexer's tokens and writes one node stream per
//! nesting level. It tracks ancestry as an immutable stack of tagnames passed
//! down the recursion; there are no parent pointers.

use futures::future::BoxFuture;
use log::warn;
use tokio::sync::mpsc::{channel, Receiver, Sender};

use weft_shared::byte_stream::Location;
use weft_shared::errors::{Error, Result};

use crate::node::{Attribute, Node, NodeStream, NODE_CHANNEL_CAPACITY};
use crate::parser::ParserOptions;
use crate::tokenizer::token::Token;

/// Outcome of assembling one element
enum Unwind {
    /// The element ended; keep parsing siblings
    Continue,
    /// A closing tag matched an ancestor with this (transformed) name
    Close(String),
    /// The token stream ended
    Eof,
}

/// Writer over a node channel that downgrades to a drain once the consumer
/// has dropped the receiving end, so an abandoned child stream never blocks
/// the outer one.
struct NodeWriter {
    tx: Sender<Result<Node>>,
    open: bool,
}

impl NodeWriter {
    fn new(tx: Sender<Result<Node>>) -> Self {
        Self { tx, open: true }
    }

    async fn write(&mut self, node: Node) {
        if !self.open {
            return;
        }
        if self.tx.send(Ok(node)).await.is_err() {
            self.open = false;
        }
    }

    /// Delivers the error in-band and closes the writer
    async fn abort(&mut self, error: Error) {
        if !self.open {
            return;
        }
        let _ = self.tx.send(Err(error)).await;
        self.open = false;
    }
}

/// Consumes the token stream and produces hierarchical streamed nodes.
pub struct TreeBuilder {
    tokens: Receiver<Token>,
    options: ParserOptions,
}

impl TreeBuilder {
    pub fn new(tokens: Receiver<Token>, options: ParserOptions) -> Self {
        Self { tokens, options }
    }

    /// Runs the builder until the token stream terminates, writing the
    /// top-level node sequence to `writer`.
    pub async fn run(mut self, writer: Sender<Result<Node>>) {
        let mut writer = NodeWriter::new(writer);
        if let Err(error) = self.parse_children(&mut writer, &[]).await {
            // every level already aborted its own writer on the way out
            warn!("parse aborted: {error}");
        }
    }

    /// Parses one nesting level. Returns the transformed tagname of the
    /// ancestor a closing tag matched, or `None` when the input ended.
    fn parse_children<'a>(
        &'a mut self,
        writer: &'a mut NodeWriter,
        parent_stack: &'a [String],
    ) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move {
            loop {
                let Some(token) = self.tokens.recv().await else {
                    return Ok(None);
                };

                match token {
                    Token::Eof { .. } => return Ok(None),
                    Token::Error { error, .. } => {
                        writer.abort(error.clone()).await;
                        return Err(error);
                    }
                    Token::Text { text, location } => {
                        writer.write(Node::Text { text, location }).await;
                    }
                    Token::DoctypeDeclaration { declaration, location } => {
                        writer.write(Node::Doctype { declaration, location }).await;
                    }
                    Token::Comment { comment, location } => {
                        if !self.options.strip_comments {
                            writer.write(Node::Comment { comment, location }).await;
                        }
                    }
                    Token::OpeningTagName { name, location } => {
                        match self.parse_element(writer, parent_stack, name, location).await? {
                            Unwind::Continue => {}
                            Unwind::Close(close) => return Ok(Some(close)),
                            Unwind::Eof => return Ok(None),
                        }
                    }
                    Token::ClosingTagName { name, location } => {
                        let name = self.options.tag_name_casing.apply(&name);
                        if parent_stack.iter().any(|tag| *tag == name) {
                            return Ok(Some(name));
                        }
                        // no ancestor matches; graceful recovery for
                        // mismatched closers
                        warn!("ignoring stray closing tag </{name}> at {location}");
                    }
                    other => {
                        let error = Error::ParserProtocol(format!(
                            "unexpected {other} token outside an opening tag at {}",
                            other.location()
                        ));
                        writer.abort(error.clone()).await;
                        return Err(error);
                    }
                }

                // a dropped root receiver cancels the whole parse
                if !writer.open && parent_stack.is_empty() {
                    return Ok(None);
                }
            }
        })
    }

    /// Assembles one element: attribute tokens, then either a self-closing
    /// end or a body parsed into a fresh child stream.
    async fn parse_element(
        &mut self,
        writer: &mut NodeWriter,
        parent_stack: &[String],
        raw_name: String,
        location: Location,
    ) -> Result<Unwind> {
        let tag_name = self.options.tag_name_casing.apply(&raw_name);
        let mut attributes: Vec<Attribute> = Vec::new();

        loop {
            let Some(token) = self.tokens.recv().await else {
                // the lexer went away mid-tag; close out like EOF
                self.write_childless(writer, tag_name, attributes, location).await;
                return Ok(Unwind::Eof);
            };

            match token {
                Token::AttributeName { name, location } => {
                    attributes.push(Attribute {
                        name,
                        value: String::new(),
                        location,
                    });
                }
                Token::AttributeValue { value, location } => {
                    let Some(attr) = attributes.last_mut() else {
                        let error = Error::ParserProtocol(format!(
                            "attribute value with no preceding attribute name at {location}"
                        ));
                        writer.abort(error.clone()).await;
                        return Err(error);
                    };
                    attr.value = value;
                }
                Token::SelfClosingTagEnd { .. } => {
                    self.write_childless(writer, tag_name, attributes, location).await;
                    return Ok(Unwind::Continue);
                }
                Token::OpeningTagEnd { .. } => {
                    let (tx, rx) = channel(NODE_CHANNEL_CAPACITY);
                    let mut child_writer = NodeWriter::new(tx);

                    // the parent element goes out before any of its children
                    writer
                        .write(Node::Element {
                            tag_name: tag_name.clone(),
                            attributes,
                            children: Some(NodeStream::new(rx)),
                            location,
                        })
                        .await;

                    let mut stack = parent_stack.to_vec();
                    stack.push(tag_name.clone());
                    let result = self.parse_children(&mut child_writer, &stack).await;

                    return match result {
                        Err(error) => {
                            writer.abort(error.clone()).await;
                            Err(error)
                        }
                        Ok(None) => Ok(Unwind::Eof),
                        Ok(Some(close)) if close == tag_name => Ok(Unwind::Continue),
                        Ok(Some(close)) => Ok(Unwind::Close(close)),
                    };
                }
                Token::Eof { .. } => {
                    self.write_childless(writer, tag_name, attributes, location).await;
                    return Ok(Unwind::Eof);
                }
                Token::Error { error, .. } => {
                    writer.abort(error.clone()).await;
                    return Err(error);
                }
                other => {
                    let error = Error::ParserProtocol(format!(
                        "unexpected {other} token inside an opening tag at {}",
                        other.location()
                    ));
                    writer.abort(error.clone()).await;
                    return Err(error);
                }
            }
        }
    }

    async fn write_childless(
        &mut self,
        writer: &mut NodeWriter,
        tag_name: String,
        attributes: Vec<Attribute>,
        location: Location,
    ) {
        writer
            .write(Node::Element {
                tag_name,
                attributes,
                children: None,
                location,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use weft_shared::byte_stream::Location;

    use super::*;
    use crate::parser::TagNameCasing;
    use crate::tree::{resolve_stream, TreeNode};

    /// Runs the builder over a hand-made token sequence and materializes the
    /// resulting tree.
    async fn build(tokens: Vec<Token>, options: ParserOptions) -> Result<Vec<TreeNode>> {
        let (token_tx, token_rx) = mpsc::channel(64);
        let (node_tx, node_rx) = mpsc::channel(NODE_CHANNEL_CAPACITY);

        let builder = TreeBuilder::new(token_rx, options);
        let handle = tokio::spawn(builder.run(node_tx));

        for token in tokens {
            token_tx.send(token).await.expect("send token");
        }
        drop(token_tx);

        let result = resolve_stream(NodeStream::new(node_rx)).await;
        handle.await.expect("builder task");
        result
    }

    fn at(column: u32) -> Location {
        Location::new(1, column, column as usize - 1)
    }

    #[tokio::test]
    async fn test_attribute_value_without_name_is_protocol_error() {
        let tokens = vec![
            Token::OpeningTagName {
                name: "div".into(),
                location: at(2),
            },
            Token::AttributeValue {
                value: "x".into(),
                location: at(6),
            },
        ];

        let err = build(tokens, ParserOptions::default())
            .await
            .expect_err("should abort");
        assert!(matches!(err, Error::ParserProtocol(_)));
    }

    #[tokio::test]
    async fn test_stray_close_at_root_is_ignored() {
        let tokens = vec![
            Token::ClosingTagName {
                name: "div".into(),
                location: at(3),
            },
            Token::Text {
                text: "x".into(),
                location: at(9),
            },
            Token::Eof { location: at(10) },
        ];

        let tree = build(tokens, ParserOptions::default()).await.expect("tree");
        assert_eq!(
            tree,
            vec![TreeNode::Text {
                text_content: "x".into(),
                l: 1,
                c: 9,
            }]
        );
    }

    #[tokio::test]
    async fn test_comments_can_be_stripped() {
        let tokens = vec![
            Token::Comment {
                comment: "note".into(),
                location: at(1),
            },
            Token::Eof { location: at(20) },
        ];

        let options = ParserOptions {
            strip_comments: true,
            ..Default::default()
        };
        let tree = build(tokens, options).await.expect("tree");
        assert!(tree.is_empty());
    }

    #[tokio::test]
    async fn test_unclosed_element_closes_at_eof() {
        let tokens = vec![
            Token::OpeningTagName {
                name: "div".into(),
                location: at(2),
            },
            Token::OpeningTagEnd { location: at(5) },
            Token::Text {
                text: "inner".into(),
                location: at(6),
            },
            Token::Eof { location: at(11) },
        ];

        let tree = build(tokens, ParserOptions::default()).await.expect("tree");
        assert_eq!(
            tree,
            vec![TreeNode::Element {
                tag_name: "div".into(),
                attributes: None,
                children: Some(vec![TreeNode::Text {
                    text_content: "inner".into(),
                    l: 1,
                    c: 6,
                }]),
                l: 1,
                c: 2,
            }]
        );
    }

    #[tokio::test]
    async fn test_casing_normalizes_closing_tags() {
        let tokens = vec![
            Token::OpeningTagName {
                name: "DIV".into(),
                location: at(2),
            },
            Token::OpeningTagEnd { location: at(5) },
            Token::ClosingTagName {
                name: "Div".into(),
                location: at(8),
            },
            Token::Eof { location: at(12) },
        ];

        let options = ParserOptions {
            tag_name_casing: TagNameCasing::Upper,
            ..Default::default()
        };
        let tree = build(tokens, options).await.expect("tree");
        assert_eq!(
            tree,
            vec![TreeNode::Element {
                tag_name: "DIV".into(),
                attributes: None,
                children: None,
                l: 1,
                c: 2,
            }]
        );
    }
}
