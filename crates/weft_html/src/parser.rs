//! Public parser facade.
//!
//! [`HtmlParser`] wires the pipeline together: byte source → decoder → lexer
//! task → token channel → tree builder task → node channel. A parse yields a
//! single-use [`ParseResult`] over the root node stream.

pub mod tree_builder;

use std::path::Path;

use tokio::sync::mpsc::channel;

use weft_shared::byte_stream::{ByteSource, CharStream};
use weft_shared::errors::{Error, Result};

use crate::node::{NodeStream, NODE_CHANNEL_CAPACITY};
use crate::parser::tree_builder::TreeBuilder;
use crate::tokenizer::{Tokenizer, TOKEN_CHANNEL_CAPACITY};
use crate::tree::{self, TreeNode};

/// How tagnames are normalized before they are stored and compared
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TagNameCasing {
    /// Lowercase both opening and closing tagnames
    #[default]
    Lower,
    /// Uppercase both opening and closing tagnames
    Upper,
    /// Keep tagnames as written; closing tags must then match exactly
    Preserve,
}

impl TagNameCasing {
    pub fn apply(&self, name: &str) -> String {
        match self {
            TagNameCasing::Lower => name.to_ascii_lowercase(),
            TagNameCasing::Upper => name.to_ascii_uppercase(),
            TagNameCasing::Preserve => name.to_string(),
        }
    }
}

/// Options that can be passed to the parser
#[derive(Clone, Debug, Default)]
pub struct ParserOptions {
    pub tag_name_casing: TagNameCasing,
    /// When true, `/>` on non-void elements is treated like `>` (the body
    /// starts)
    pub ignore_self_closing_syntax: bool,
    /// When true, comment nodes are dropped instead of emitted
    pub strip_comments: bool,
}

/// The main parser object
#[derive(Clone, Debug, Default)]
pub struct HtmlParser {
    options: ParserOptions,
}

impl HtmlParser {
    pub fn new(options: ParserOptions) -> Self {
        Self { options }
    }

    /// Parses the file at the given path. Opening the file can fail; the
    /// underlying OS error message is propagated verbatim.
    pub async fn parse_file(&self, path: impl AsRef<Path>) -> Result<ParseResult> {
        let source = ByteSource::open(path.as_ref()).await?;
        Ok(self.spawn_pipeline(source))
    }

    /// Parses an in-memory string
    pub fn parse_string(&self, text: &str) -> ParseResult {
        self.spawn_pipeline(ByteSource::from_str(text))
    }

    /// Spawns the lexer and builder tasks over the given source. Must be
    /// called from within a tokio runtime.
    fn spawn_pipeline(&self, source: ByteSource) -> ParseResult {
        let (token_tx, token_rx) = channel(TOKEN_CHANNEL_CAPACITY);
        let (node_tx, node_rx) = channel(NODE_CHANNEL_CAPACITY);

        let tokenizer = Tokenizer::new(
            CharStream::new(source),
            token_tx,
            self.options.ignore_self_closing_syntax,
        );
        let builder = TreeBuilder::new(token_rx, self.options.clone());

        tokio::spawn(tokenizer.run());
        tokio::spawn(builder.run(node_tx));

        ParseResult {
            stream: Some(NodeStream::new(node_rx)),
        }
    }
}

/// Single-use handle over the root node stream of one parse.
#[derive(Debug)]
pub struct ParseResult {
    stream: Option<NodeStream>,
}

impl ParseResult {
    /// Takes the root node stream for async iteration. A second consumption
    /// attempt fails with [`Error::Consumed`].
    pub fn stream(&mut self) -> Result<NodeStream> {
        self.stream.take().ok_or(Error::Consumed)
    }

    /// Fully drains the tree, recursively resolving each element's child
    /// stream into a concrete child sequence.
    pub async fn to_array(&mut self) -> Result<Vec<TreeNode>> {
        let stream = self.stream()?;
        tree::resolve_stream(stream).await
    }
}
