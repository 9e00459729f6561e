use weft_shared::byte_stream::Location;

/// These are the states in which the lexer can be in. Each step consumes
/// characters, emits zero or more tokens and yields the next state; `None`
/// terminates the machine.
#[derive(Clone, Debug, PartialEq)]
pub enum State {
    /// Accumulating character data until markup is recognized
    TextContent,

    /// Inside `<name`, reading the tagname and the attribute list
    OpeningTag,

    /// Inside `</name`, reading the closing tagname
    ClosingTag,

    /// Inside `<!-- ... -->`; the location is that of the opening `<`
    Comment { location: Location },

    /// Verbatim content of a raw-text element, scanning for `</tagname`
    RawContent { tag_name: String },
}
