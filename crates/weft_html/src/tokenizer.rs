//! The lexer state machine.
//!
//! The lexer reads decoded characters and emits [`Token`]s into a bounded
//! channel. It is organized as a set of state functions: every step consumes
//! characters from the stream, writes zero or more tokens to the sink, and
//! returns the next state. The driver loop in [`Tokenizer::run`] awaits each
//! transition, so a full downstream buffer suspends the lexer.

pub mod state;
pub mod token;

use log::trace;
use tokio::sync::mpsc::Sender;

use weft_shared::byte_stream::Character::{Ch, StreamEnd};
use weft_shared::byte_stream::{CharStream, Location};
use weft_shared::errors::Result;

use crate::chars::{
    is_attribute_value_quote, is_legal_attribute_name_char, is_legal_leading_tag_name_char,
    is_legal_tag_name_char, is_legal_unquoted_attribute_value_char, is_raw_text_element,
    is_script_quote, is_style_quote, is_void_element, is_whitespace,
};
use crate::tokenizer::state::State;
use crate::tokenizer::token::Token;

/// Capacity of the token channel between the lexer and the tree builder
pub const TOKEN_CHANNEL_CAPACITY: usize = 128;

/// The lexer will read the character stream and emit tokens that can be used
/// by the tree builder.
pub struct Tokenizer {
    /// Decoded character input stream
    chars: CharStream,
    /// Sink for produced tokens
    sink: Sender<Token>,
    /// When true, `/>` on a non-void element is treated like `>`
    ignore_self_closing_syntax: bool,
    /// Buffered text content and the position of its first character
    text: String,
    text_location: Location,
    /// Set once the downstream receiver went away; terminates the run loop
    closed: bool,
}

impl Tokenizer {
    pub fn new(chars: CharStream, sink: Sender<Token>, ignore_self_closing_syntax: bool) -> Self {
        Self {
            chars,
            sink,
            ignore_self_closing_syntax,
            text: String::new(),
            text_location: Location::default(),
            closed: false,
        }
    }

    /// Drives the state machine until the input terminates, an error is
    /// emitted, or the downstream receiver is dropped.
    pub async fn run(mut self) {
        let mut state = Some(State::TextContent);

        while let Some(current) = state {
            if self.closed {
                return;
            }

            match self.step(current).await {
                Ok(next) => state = next,
                Err(error) => {
                    let location = error.location().unwrap_or_else(|| self.chars.location());
                    self.emit(Token::Error { error, location }).await;
                    return;
                }
            }
        }
    }

    async fn step(&mut self, state: State) -> Result<Option<State>> {
        trace!("lexer state: {state:?}");

        match state {
            State::TextContent => self.lex_text_content().await,
            State::OpeningTag => self.lex_opening_tag().await,
            State::ClosingTag => self.lex_closing_tag().await,
            State::Comment { location } => self.lex_comment(location).await,
            State::RawContent { tag_name } => self.lex_raw_content(tag_name).await,
        }
    }

    async fn emit(&mut self, token: Token) {
        if self.closed {
            return;
        }
        if self.sink.send(token).await.is_err() {
            self.closed = true;
        }
    }

    fn push_text(&mut self, ch: char, location: Location) {
        if self.text.is_empty() {
            self.text_location = location;
        }
        self.text.push(ch);
    }

    /// Emits the buffered text, if any. Empty text tokens are suppressed.
    async fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text);
        let location = self.text_location;
        self.emit(Token::Text { text, location }).await;
    }

    /// The initial state: accumulate character data until markup shows up.
    async fn lex_text_content(&mut self) -> Result<Option<State>> {
        loop {
            if self.closed {
                return Ok(None);
            }

            let (ch, location) = self.chars.pull().await?;
            match ch {
                StreamEnd => {
                    self.flush_text().await;
                    self.emit(Token::Eof { location }).await;
                    return Ok(None);
                }
                Ch('<') => {
                    if let Some(next) = self.lex_markup_start(location).await? {
                        return Ok(Some(next));
                    }
                }
                Ch(c) => self.push_text(c, location),
            }
        }
    }

    /// Decides what a `<` introduces. Returns the next state, or None when
    /// the `<` turned out to be plain text.
    async fn lex_markup_start(&mut self, lt_location: Location) -> Result<Option<State>> {
        let (ch, location) = self.chars.pull().await?;
        match ch {
            Ch(c) if is_legal_leading_tag_name_char(c) => {
                self.chars.unread(ch, location)?;
                self.flush_text().await;
                Ok(Some(State::OpeningTag))
            }
            Ch('/') => {
                let (ch2, location2) = self.chars.pull().await?;
                match ch2 {
                    Ch(c2) if is_legal_leading_tag_name_char(c2) => {
                        self.chars.unread(ch2, location2)?;
                        self.flush_text().await;
                        Ok(Some(State::ClosingTag))
                    }
                    _ => {
                        self.push_text('<', lt_location);
                        self.push_text('/', location);
                        self.chars.unread(ch2, location2)?;
                        Ok(None)
                    }
                }
            }
            Ch('!') => self.lex_markup_declaration(lt_location, location).await,
            _ => {
                self.push_text('<', lt_location);
                self.chars.unread(ch, location)?;
                Ok(None)
            }
        }
    }

    /// After `<!`: either a comment, a doctype declaration, or plain text.
    async fn lex_markup_declaration(
        &mut self,
        lt_location: Location,
        bang_location: Location,
    ) -> Result<Option<State>> {
        let (ch, location) = self.chars.pull().await?;
        match ch {
            Ch('-') => {
                let (ch2, location2) = self.chars.pull().await?;
                if ch2 == Ch('-') {
                    self.flush_text().await;
                    return Ok(Some(State::Comment { location: lt_location }));
                }

                self.push_text('<', lt_location);
                self.push_text('!', bang_location);
                self.push_text('-', location);
                self.chars.unread(ch2, location2)?;
                Ok(None)
            }
            Ch(c @ 'D') => {
                // the keyword match is case-sensitive: "<!DOCTYPE" + whitespace
                let mut matched = vec![(c, location)];
                let mut is_doctype = true;
                for expected in "OCTYPE".chars() {
                    let (ch2, location2) = self.chars.pull().await?;
                    match ch2 {
                        Ch(c2) if c2 == expected => matched.push((c2, location2)),
                        _ => {
                            self.chars.unread(ch2, location2)?;
                            is_doctype = false;
                            break;
                        }
                    }
                }
                if is_doctype {
                    let (ws, ws_location) = self.chars.pull().await?;
                    match ws {
                        Ch(w) if is_whitespace(w) => {
                            self.flush_text().await;
                            self.lex_doctype_declaration(lt_location).await?;
                            return Ok(None);
                        }
                        _ => self.chars.unread(ws, ws_location)?,
                    }
                }

                // not a doctype after all; everything seen so far is text
                self.push_text('<', lt_location);
                self.push_text('!', bang_location);
                for (c2, location2) in matched {
                    self.push_text(c2, location2);
                }
                Ok(None)
            }
            _ => {
                self.push_text('<', lt_location);
                self.push_text('!', bang_location);
                self.chars.unread(ch, location)?;
                Ok(None)
            }
        }
    }

    /// Reads the identifier of a `<!DOCTYPE ...>` declaration up to `>`.
    /// Runs inline from the text state.
    async fn lex_doctype_declaration(&mut self, location: Location) -> Result<()> {
        let mut declaration = String::new();
        loop {
            let (ch, ch_location) = self.chars.pull().await?;
            match ch {
                Ch('>') => break,
                Ch(c) => declaration.push(c),
                StreamEnd => {
                    // truncated declaration; the text state will emit EOF
                    self.chars.unread(ch, ch_location)?;
                    break;
                }
            }
        }

        let declaration = declaration.trim().to_string();
        self.emit(Token::DoctypeDeclaration { declaration, location }).await;
        Ok(())
    }

    /// Reads the tagname and attribute list of an opening tag up to `>`.
    async fn lex_opening_tag(&mut self) -> Result<Option<State>> {
        let (first, name_location) = self.chars.pull().await?;
        let mut name = match first {
            Ch(c) => String::from(c),
            StreamEnd => {
                self.emit(Token::Eof { location: name_location }).await;
                return Ok(None);
            }
        };
        loop {
            let (ch, location) = self.chars.pull().await?;
            match ch {
                Ch(c) if is_legal_tag_name_char(c) => name.push(c),
                _ => {
                    self.chars.unread(ch, location)?;
                    break;
                }
            }
        }
        self.emit(Token::OpeningTagName {
            name: name.clone(),
            location: name_location,
        })
        .await;

        let is_void = is_void_element(&name);
        let is_raw = is_raw_text_element(&name);

        // the last non-whitespace character decides whether `>` closes the
        // tag as `/>`
        let mut last_was_slash = false;
        loop {
            let (ch, location) = self.chars.pull().await?;
            match ch {
                Ch(c) if is_whitespace(c) => {}
                Ch('>') => {
                    let self_closing =
                        is_void || (!self.ignore_self_closing_syntax && last_was_slash);
                    if self_closing {
                        self.emit(Token::SelfClosingTagEnd { location }).await;
                        return Ok(Some(State::TextContent));
                    }

                    self.emit(Token::OpeningTagEnd { location }).await;
                    if is_raw {
                        return Ok(Some(State::RawContent { tag_name: name }));
                    }
                    return Ok(Some(State::TextContent));
                }
                Ch(c) if is_legal_attribute_name_char(c) => {
                    self.chars.unread(ch, location)?;
                    self.lex_attribute().await?;
                    last_was_slash = false;
                }
                Ch(c) => last_was_slash = c == '/',
                StreamEnd => {
                    self.emit(Token::Eof { location }).await;
                    return Ok(None);
                }
            }
        }
    }

    /// Emits exactly one attribute name and, when an `=` follows, at most one
    /// attribute value.
    async fn lex_attribute(&mut self) -> Result<()> {
        let (first, name_location) = self.chars.pull().await?;
        let mut name = match first {
            Ch(c) => String::from(c),
            StreamEnd => {
                self.chars.unread(first, name_location)?;
                return Ok(());
            }
        };
        loop {
            let (ch, location) = self.chars.pull().await?;
            match ch {
                Ch(c) if is_legal_attribute_name_char(c) => name.push(c),
                _ => {
                    self.chars.unread(ch, location)?;
                    break;
                }
            }
        }
        self.emit(Token::AttributeName {
            name,
            location: name_location,
        })
        .await;

        let (ch, location) = self.chars.pull().await?;
        if ch != Ch('=') {
            // boolean attribute; the tag loop reprocesses the character
            self.chars.unread(ch, location)?;
            return Ok(());
        }

        let (ch, value_location) = self.chars.pull().await?;
        match ch {
            Ch(q) if is_attribute_value_quote(q) => {
                let mut value = String::new();
                let mut escaped = false;
                loop {
                    let (ch2, location2) = self.chars.pull().await?;
                    match ch2 {
                        StreamEnd => {
                            // unterminated value; the partial value is dropped
                            self.chars.unread(ch2, location2)?;
                            return Ok(());
                        }
                        Ch(c2) if escaped => {
                            value.push(c2);
                            escaped = false;
                        }
                        Ch('\\') => escaped = true,
                        Ch(c2) if c2 == q => break,
                        Ch(c2) => value.push(c2),
                    }
                }
                self.emit(Token::AttributeValue {
                    value,
                    location: value_location,
                })
                .await;
            }
            Ch(c) if is_legal_unquoted_attribute_value_char(c) => {
                let mut value = String::from(c);
                loop {
                    let (ch2, location2) = self.chars.pull().await?;
                    match ch2 {
                        Ch(c2) if is_legal_unquoted_attribute_value_char(c2) => value.push(c2),
                        _ => {
                            self.chars.unread(ch2, location2)?;
                            break;
                        }
                    }
                }
                self.emit(Token::AttributeValue {
                    value,
                    location: value_location,
                })
                .await;
            }
            _ => {
                // `=` followed by neither a quote nor a value character
                self.chars.unread(ch, value_location)?;
                self.emit(Token::AttributeValue {
                    value: String::new(),
                    location: value_location,
                })
                .await;
            }
        }

        Ok(())
    }

    /// Reads the tagname of a closing tag and consumes the remainder of the
    /// tag up to `>`.
    async fn lex_closing_tag(&mut self) -> Result<Option<State>> {
        let (first, name_location) = self.chars.pull().await?;
        let mut name = match first {
            Ch(c) => String::from(c),
            StreamEnd => {
                self.emit(Token::Eof { location: name_location }).await;
                return Ok(None);
            }
        };
        loop {
            let (ch, location) = self.chars.pull().await?;
            match ch {
                Ch(c) if is_legal_tag_name_char(c) => name.push(c),
                _ => {
                    self.chars.unread(ch, location)?;
                    break;
                }
            }
        }
        self.emit(Token::ClosingTagName {
            name,
            location: name_location,
        })
        .await;

        self.lex_closing_tag_end().await
    }

    /// Consumes the remainder of a closing tag up to and including `>`
    async fn lex_closing_tag_end(&mut self) -> Result<Option<State>> {
        loop {
            let (ch, location) = self.chars.pull().await?;
            match ch {
                Ch('>') => return Ok(Some(State::TextContent)),
                Ch(_) => {}
                StreamEnd => {
                    self.emit(Token::Eof { location }).await;
                    return Ok(None);
                }
            }
        }
    }

    /// Buffers codepoints until the last three are `-->`.
    async fn lex_comment(&mut self, location: Location) -> Result<Option<State>> {
        let mut buffer = String::new();
        loop {
            let (ch, ch_location) = self.chars.pull().await?;
            match ch {
                Ch(c) => {
                    buffer.push(c);
                    if buffer.ends_with("-->") {
                        buffer.truncate(buffer.len() - 3);
                        let comment = buffer.trim().to_string();
                        self.emit(Token::Comment { comment, location }).await;
                        return Ok(Some(State::TextContent));
                    }
                }
                StreamEnd => {
                    // unterminated comment; emit what was collected
                    let comment = buffer.trim().to_string();
                    self.emit(Token::Comment { comment, location }).await;
                    self.emit(Token::Eof { location: ch_location }).await;
                    return Ok(None);
                }
            }
        }
    }

    /// Reads the body of a raw-text element verbatim, honoring unescaped
    /// quote runs, until the literal `</tagname` followed by a character that
    /// cannot extend the tagname.
    async fn lex_raw_content(&mut self, tag_name: String) -> Result<Option<State>> {
        let close_pattern = format!("</{tag_name}");
        let script_quotes = tag_name == "script";
        let style_quotes = tag_name == "style";

        let mut buffer = String::new();
        let mut buffer_location = Location::default();
        let mut lt_location = Location::default();
        let mut quote: Option<char> = None;
        let mut escaped = false;

        loop {
            let (ch, location) = self.chars.pull().await?;
            let c = match ch {
                Ch(c) => c,
                StreamEnd => {
                    // the close tag never showed up; everything is text
                    if !buffer.is_empty() {
                        self.emit(Token::Text {
                            text: buffer,
                            location: buffer_location,
                        })
                        .await;
                    }
                    self.emit(Token::Eof { location }).await;
                    return Ok(None);
                }
            };
            if buffer.is_empty() {
                buffer_location = location;
            }

            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                buffer.push(c);
                continue;
            }
            if (script_quotes && is_script_quote(c)) || (style_quotes && is_style_quote(c)) {
                quote = Some(c);
                buffer.push(c);
                continue;
            }

            if c == '<' {
                lt_location = location;
            }
            buffer.push(c);

            if buffer.ends_with(&close_pattern) {
                // the suffix only closes the element when the next character
                // cannot extend the tagname
                let (next, next_location) = self.chars.pull().await?;
                if let Ch(n) = next {
                    if is_legal_tag_name_char(n) {
                        self.chars.unread(next, next_location)?;
                        continue;
                    }
                }
                self.chars.unread(next, next_location)?;

                buffer.truncate(buffer.len() - close_pattern.len());
                if !buffer.is_empty() {
                    self.emit(Token::Text {
                        text: buffer,
                        location: buffer_location,
                    })
                    .await;
                }

                // `<` and `/` are single-column ASCII, so the name starts two
                // columns after the recorded `<`
                let name_location =
                    Location::new(lt_location.line, lt_location.column + 2, lt_location.offset + 2);
                self.emit(Token::ClosingTagName {
                    name: tag_name,
                    location: name_location,
                })
                .await;

                return self.lex_closing_tag_end().await;
            }
        }
    }
}
