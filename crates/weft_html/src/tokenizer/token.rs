use std::fmt;

use weft_shared::byte_stream::Location;
use weft_shared::errors::Error;

/// The different token structures that can be emitted by the lexer
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// A non-empty run of character data
    Text { text: String, location: Location },
    /// The tagname of an opening tag
    OpeningTagName { name: String, location: Location },
    /// An attribute name inside an opening tag
    AttributeName { name: String, location: Location },
    /// The value belonging to the immediately preceding attribute name
    AttributeValue { value: String, location: Location },
    /// The opening tag closed with `>` and the element has a body
    OpeningTagEnd { location: Location },
    /// The opening tag was terminated with `/>`, or the tagname is void
    SelfClosingTagEnd { location: Location },
    /// The tagname inside `</tag>`
    ClosingTagName { name: String, location: Location },
    /// Content between `<!--` and `-->`, trimmed of surrounding whitespace
    Comment { comment: String, location: Location },
    /// The identifier following `<!DOCTYPE`, trimmed
    DoctypeDeclaration { declaration: String, location: Location },
    /// Abortive; the stream closes after this token
    Error { error: Error, location: Location },
    /// Terminal; emitted exactly once
    Eof { location: Location },
}

impl Token {
    pub fn location(&self) -> Location {
        match self {
            Token::Text { location, .. }
            | Token::OpeningTagName { location, .. }
            | Token::AttributeName { location, .. }
            | Token::AttributeValue { location, .. }
            | Token::OpeningTagEnd { location }
            | Token::SelfClosingTagEnd { location }
            | Token::ClosingTagName { location, .. }
            | Token::Comment { location, .. }
            | Token::DoctypeDeclaration { location, .. }
            | Token::Error { location, .. }
            | Token::Eof { location } => *location,
        }
    }

    /// Returns true when the token is an EOF token
    pub fn is_eof(&self) -> bool {
        matches!(self, Token::Eof { .. })
    }

    /// Returns true for attribute name and attribute value tokens
    pub fn is_attribute(&self) -> bool {
        matches!(self, Token::AttributeName { .. } | Token::AttributeValue { .. })
    }
}

// Each token can be displayed as a string
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Text { text, .. } => write!(f, "{text}"),
            Token::OpeningTagName { name, .. } => write!(f, "<{name}"),
            Token::AttributeName { name, .. } => write!(f, " {name}"),
            Token::AttributeValue { value, .. } => write!(f, "=\"{value}\""),
            Token::OpeningTagEnd { .. } => write!(f, ">"),
            Token::SelfClosingTagEnd { .. } => write!(f, " />"),
            Token::ClosingTagName { name, .. } => write!(f, "</{name}>"),
            Token::Comment { comment, .. } => write!(f, "<!-- {comment} -->"),
            Token::DoctypeDeclaration { declaration, .. } => write!(f, "<!DOCTYPE {declaration}>"),
            Token::Error { error, .. } => write!(f, "ERROR: {error}"),
            Token::Eof { .. } => write!(f, "EOF"),
        }
    }
}
