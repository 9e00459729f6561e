//! Streaming HTML lexer and lazy tree builder
//!
//! weft turns a byte stream into a lazy tree of typed nodes. The lexer is a
//! state machine over a BOM-aware character decoder; the tree builder hands
//! every element a lazy child stream so deeply nested documents can be
//! processed incrementally, under backpressure, without materializing the
//! full tree.
//!
//! ```no_run
//! use weft_html::parser::{HtmlParser, ParserOptions};
//!
//! # async fn example() -> weft_shared::errors::Result<()> {
//! let parser = HtmlParser::new(ParserOptions::default());
//! let tree = parser.parse_string("<div>Hello</div>").to_array().await?;
//! # Ok(())
//! # }
//! ```

pub mod chars;
pub mod node;
pub mod parser;
pub mod tokenizer;
pub mod tree;

use crate::parser::{HtmlParser, ParserOptions};
use crate::tree::TreeNode;
use weft_shared::errors::Result;

/// Parses the given HTML string with default options and returns the fully
/// materialized node tree.
pub async fn parse_string_to_tree(html: &str) -> Result<Vec<TreeNode>> {
    let parser = HtmlParser::new(ParserOptions::default());
    parser.parse_string(html).to_array().await
}
