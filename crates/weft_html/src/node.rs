//! Streaming node model.
//!
//! Nodes are produced once and handed to the consumer; element nodes carry a
//! lazy [`NodeStream`] over their children so deeply nested documents can be
//! processed without materializing the full tree.

use tokio::sync::mpsc::Receiver;

use weft_shared::byte_stream::Location;
use weft_shared::errors::Result;

/// Capacity of each node channel. Small on purpose: the consumer's iteration
/// pace is what drives the pipeline.
pub const NODE_CHANNEL_CAPACITY: usize = 16;

/// A single attribute on an element node. The value is the empty string for
/// boolean attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
    pub location: Location,
}

/// A node delivered on a node stream.
#[derive(Debug)]
pub enum Node {
    /// An element. `children` is `None` when the element is self-closing or
    /// void; otherwise the stream is eventually closed exactly once.
    Element {
        tag_name: String,
        attributes: Vec<Attribute>,
        children: Option<NodeStream>,
        location: Location,
    },
    Text {
        text: String,
        location: Location,
    },
    Doctype {
        declaration: String,
        location: Location,
    },
    Comment {
        comment: String,
        location: Location,
    },
}

impl Node {
    pub fn location(&self) -> Location {
        match self {
            Node::Element { location, .. }
            | Node::Text { location, .. }
            | Node::Doctype { location, .. }
            | Node::Comment { location, .. } => *location,
        }
    }
}

/// A finite, lazy sequence of nodes. Dropping the stream releases the
/// producer; it does not block the enclosing stream.
#[derive(Debug)]
pub struct NodeStream {
    rx: Receiver<Result<Node>>,
}

impl NodeStream {
    pub(crate) fn new(rx: Receiver<Result<Node>>) -> Self {
        Self { rx }
    }

    /// The next node, or `None` once the stream has closed. An `Err` item is
    /// terminal: the stream closes after yielding it.
    pub async fn next(&mut self) -> Option<Result<Node>> {
        self.rx.recv().await
    }
}
