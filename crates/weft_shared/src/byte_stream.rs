use std::collections::VecDeque;
use std::fmt::{self, Debug, Formatter};
use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::errors::{Error, Result};

pub const CHAR_LF: char = '\u{000A}';
pub const CHAR_CR: char = '\u{000D}';

/// Size of the read buffer for file-backed sources. Power of two, balancing
/// syscall count against memory footprint.
const FILE_BUFFER_SIZE: usize = 256;

/// Encoding defines the way the byte stream is decoded, as what defines a
/// "character". Chosen once per stream by BOM inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// Stream is of UTF8 characters
    UTF8,
    /// Stream consists of 16-bit UTF characters (Little Endian)
    UTF16LE,
    /// Stream consists of 16-bit UTF characters (Big Endian)
    UTF16BE,
    /// Stream consists of 32-bit UTF characters (Little Endian)
    UTF32LE,
    /// Stream consists of 32-bit UTF characters (Big Endian)
    UTF32BE,
}

/// Defines a single element in the stream. Note that characters are not the
/// same as bytes, since a single character can be multiple bytes in UTF8,
/// UTF16 or UTF32.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Character {
    /// Standard UTF character
    Ch(char),
    /// Stream exhausted and closed
    StreamEnd,
}

use Character::{Ch, StreamEnd};

impl fmt::Display for Character {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Ch(ch) => write!(f, "{ch}"),
            StreamEnd => write!(f, "StreamEnd"),
        }
    }
}

/// Location holds the position of an element in the data source
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// Line number, starting with 1
    pub line: u32,
    /// Column number, starting with 1
    pub column: u32,
    /// Byte offset, starting with 0
    pub offset: usize,
}

impl Default for Location {
    /// Default to line 1, column 1
    fn default() -> Self {
        Self::new(1, 1, 0)
    }
}

impl Location {
    /// Create a new Location
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self { line, column, offset }
    }
}

impl Debug for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.line, self.column)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// True for the line-break codepoints U+000A..U+000D, all treated uniformly
/// as line breaks for position tracking.
fn is_line_break(ch: char) -> bool {
    ('\u{000A}'..='\u{000D}').contains(&ch)
}

/// Uniform byte pull over a file descriptor or an in-memory buffer.
pub enum ByteSource {
    /// File-backed source reading through a fixed-size buffer
    File {
        file: File,
        buf: [u8; FILE_BUFFER_SIZE],
        pos: usize,
        len: usize,
    },
    /// In-memory source over a pre-decoded byte slice
    Memory { bytes: Vec<u8>, pos: usize },
}

impl Debug for ByteSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ByteSource::File { .. } => write!(f, "ByteSource::File"),
            ByteSource::Memory { bytes, pos } => {
                write!(f, "ByteSource::Memory({pos}/{})", bytes.len())
            }
        }
    }
}

impl ByteSource {
    /// Opens the given file for reading. I/O errors carry the OS error string.
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).await.map_err(Error::io)?;

        Ok(ByteSource::File {
            file,
            buf: [0; FILE_BUFFER_SIZE],
            pos: 0,
            len: 0,
        })
    }

    /// Creates an in-memory source over the UTF-8 bytes of the given string
    pub fn from_str(s: &str) -> Self {
        ByteSource::Memory {
            bytes: s.as_bytes().to_vec(),
            pos: 0,
        }
    }

    /// Creates an in-memory source over raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        ByteSource::Memory {
            bytes: bytes.to_vec(),
            pos: 0,
        }
    }

    /// Pulls the next raw byte, or None at end of input
    pub async fn pull(&mut self) -> Result<Option<u8>> {
        match self {
            ByteSource::Memory { bytes, pos } => {
                if *pos >= bytes.len() {
                    return Ok(None);
                }
                let b = bytes[*pos];
                *pos += 1;
                Ok(Some(b))
            }
            ByteSource::File { file, buf, pos, len } => {
                if *pos >= *len {
                    *len = file.read(buf).await.map_err(Error::io)?;
                    *pos = 0;
                    if *len == 0 {
                        return Ok(None);
                    }
                }
                let b = buf[*pos];
                *pos += 1;
                Ok(Some(b))
            }
        }
    }
}

/// CharStream decodes a byte source into characters, tracking line/column
/// positions and supporting a single slot of pushback.
///
/// The encoding is chosen on the first pull by inspecting the first four
/// bytes for a byte-order mark; without one the stream is read as UTF-8.
#[derive(Debug)]
pub struct CharStream {
    source: ByteSource,
    /// Chosen on first pull
    encoding: Option<Encoding>,
    /// Sniffed bytes that turned out not to be part of a BOM
    pending: VecDeque<u8>,
    /// Position of the next character to be pulled
    location: Location,
    /// Single-slot pushback with the location the character was read at
    pushback: Option<(Character, Location)>,
}

impl CharStream {
    pub fn new(source: ByteSource) -> Self {
        Self {
            source,
            encoding: None,
            pending: VecDeque::new(),
            location: Location::default(),
            pushback: None,
        }
    }

    /// The encoding selected by BOM inspection, once the first pull happened
    pub fn encoding(&self) -> Option<Encoding> {
        self.encoding
    }

    /// Position of the next character to be pulled
    pub fn location(&self) -> Location {
        self.location
    }

    /// Reads the next character together with its position. Returns
    /// `StreamEnd` once the input is exhausted; decoding failures are
    /// `Error::Decode` at the failing byte.
    pub async fn pull(&mut self) -> Result<(Character, Location)> {
        if let Some((ch, location)) = self.pushback.take() {
            self.advance(ch);
            return Ok((ch, location));
        }

        let encoding = match self.encoding {
            Some(encoding) => encoding,
            None => {
                let encoding = self.detect_encoding().await?;
                self.encoding = Some(encoding);
                encoding
            }
        };

        let location = self.location;
        let ch = match encoding {
            Encoding::UTF8 => self.pull_utf8(location).await?,
            Encoding::UTF16LE => self.pull_utf16(location, u16::from_le_bytes).await?,
            Encoding::UTF16BE => self.pull_utf16(location, u16::from_be_bytes).await?,
            Encoding::UTF32LE => self.pull_utf32(location, u32::from_le_bytes).await?,
            Encoding::UTF32BE => self.pull_utf32(location, u32::from_be_bytes).await?,
        };
        self.advance(ch);

        Ok((ch, location))
    }

    /// Unread the given character so the next pull returns it again, with
    /// identical position. A second unread without an intervening pull is a
    /// protocol error.
    pub fn unread(&mut self, ch: Character, location: Location) -> Result<()> {
        if self.pushback.is_some() {
            return Err(Error::LexerProtocol(
                "double unread without an intervening pull".into(),
            ));
        }

        self.pushback = Some((ch, location));
        self.location = location;
        Ok(())
    }

    /// Inspect the first four bytes for a byte-order mark. Bytes that are not
    /// part of a BOM are kept for decoding.
    async fn detect_encoding(&mut self) -> Result<Encoding> {
        let mut bom = [0u8; 4];
        let mut n = 0;
        while n < 4 {
            match self.source.pull().await? {
                Some(b) => {
                    bom[n] = b;
                    n += 1;
                }
                None => break,
            }
        }

        let (encoding, skip) = if n >= 3 && bom[..3] == [0xEF, 0xBB, 0xBF] {
            (Encoding::UTF8, 3)
        } else if n == 4 && bom == [0xFF, 0xFE, 0x00, 0x00] {
            (Encoding::UTF32LE, 4)
        } else if n == 4 && bom == [0x00, 0x00, 0xFE, 0xFF] {
            (Encoding::UTF32BE, 4)
        } else if n >= 2 && bom[..2] == [0xFF, 0xFE] {
            (Encoding::UTF16LE, 2)
        } else if n >= 2 && bom[..2] == [0xFE, 0xFF] {
            (Encoding::UTF16BE, 2)
        } else {
            (Encoding::UTF8, 0)
        };

        for &b in &bom[skip..n] {
            self.pending.push_back(b);
        }

        Ok(encoding)
    }

    /// Next raw byte, draining the BOM leftovers first
    async fn next_byte(&mut self) -> Result<Option<u8>> {
        if let Some(b) = self.pending.pop_front() {
            return Ok(Some(b));
        }
        self.source.pull().await
    }

    async fn pull_utf8(&mut self, location: Location) -> Result<Character> {
        let Some(first) = self.next_byte().await? else {
            return Ok(StreamEnd);
        };

        let width = match first {
            0x00..=0x7F => 1,
            0xC2..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF4 => 4,
            _ => {
                return Err(Error::decode(
                    format!("invalid utf-8 leading byte 0x{first:02X}"),
                    location,
                ))
            }
        };

        let mut cp = match width {
            1 => u32::from(first),
            2 => u32::from(first & 0x1F),
            3 => u32::from(first & 0x0F),
            _ => u32::from(first & 0x07),
        };
        for _ in 1..width {
            let b = self
                .next_byte()
                .await?
                .ok_or_else(|| Error::decode("truncated utf-8 sequence", location))?;
            if b & 0xC0 != 0x80 {
                return Err(Error::decode(
                    format!("invalid utf-8 continuation byte 0x{b:02X}"),
                    location,
                ));
            }
            cp = (cp << 6) | u32::from(b & 0x3F);
        }

        match char::from_u32(cp) {
            Some(ch) => Ok(Ch(ch)),
            None => Err(Error::decode(format!("invalid codepoint U+{cp:04X}"), location)),
        }
    }

    async fn pull_utf16(
        &mut self,
        location: Location,
        from_bytes: fn([u8; 2]) -> u16,
    ) -> Result<Character> {
        let Some(unit) = self.next_unit16(location, from_bytes).await? else {
            return Ok(StreamEnd);
        };

        // Lead surrogates combine with the following trail surrogate into a
        // single codepoint; an unpaired surrogate cannot be represented.
        let cp = if (0xD800..=0xDBFF).contains(&unit) {
            let low = self
                .next_unit16(location, from_bytes)
                .await?
                .ok_or_else(|| Error::decode("truncated surrogate pair", location))?;
            if !(0xDC00..=0xDFFF).contains(&low) {
                return Err(Error::decode(
                    format!("unpaired lead surrogate 0x{unit:04X}"),
                    location,
                ));
            }
            0x10000 + ((u32::from(unit) - 0xD800) << 10) + (u32::from(low) - 0xDC00)
        } else if (0xDC00..=0xDFFF).contains(&unit) {
            return Err(Error::decode(
                format!("unpaired trail surrogate 0x{unit:04X}"),
                location,
            ));
        } else {
            u32::from(unit)
        };

        match char::from_u32(cp) {
            Some(ch) => Ok(Ch(ch)),
            None => Err(Error::decode(format!("invalid codepoint U+{cp:04X}"), location)),
        }
    }

    async fn next_unit16(
        &mut self,
        location: Location,
        from_bytes: fn([u8; 2]) -> u16,
    ) -> Result<Option<u16>> {
        let Some(b0) = self.next_byte().await? else {
            return Ok(None);
        };
        let b1 = self
            .next_byte()
            .await?
            .ok_or_else(|| Error::decode("truncated utf-16 code unit", location))?;

        Ok(Some(from_bytes([b0, b1])))
    }

    async fn pull_utf32(
        &mut self,
        location: Location,
        from_bytes: fn([u8; 4]) -> u32,
    ) -> Result<Character> {
        let Some(b0) = self.next_byte().await? else {
            return Ok(StreamEnd);
        };
        let mut bytes = [b0, 0, 0, 0];
        for slot in bytes.iter_mut().skip(1) {
            *slot = self
                .next_byte()
                .await?
                .ok_or_else(|| Error::decode("truncated utf-32 code unit", location))?;
        }

        let cp = from_bytes(bytes);
        match char::from_u32(cp) {
            Some(ch) => Ok(Ch(ch)),
            None => Err(Error::decode(format!("invalid codepoint U+{cp:04X}"), location)),
        }
    }

    /// Advances the position past the given character
    fn advance(&mut self, ch: Character) {
        let Ch(ch) = ch else {
            return;
        };

        if is_line_break(ch) {
            self.location.line += 1;
            self.location.column = 1;
        } else {
            self.location.column += 1;
        }
        self.location.offset += self.char_width(ch);
    }

    /// Byte width of the character in the stream encoding
    fn char_width(&self, ch: char) -> usize {
        match self.encoding {
            Some(Encoding::UTF8) | None => ch.len_utf8(),
            Some(Encoding::UTF16LE) | Some(Encoding::UTF16BE) => ch.len_utf16() * 2,
            Some(Encoding::UTF32LE) | Some(Encoding::UTF32BE) => 4,
        }
    }
}
