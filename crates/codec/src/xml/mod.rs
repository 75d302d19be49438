//! Streaming structural tokenizer
//!
//! The plaintext body is an XML document with a flat, versioned vocabulary
//! (no namespaces, no DTDs, no mixed content). This module turns the byte
//! stream into a pull sequence of structural events — element open with
//! attributes, element close, enclosed text — without materializing the
//! document.
//!
//! Hand-written for the same reason the body parser is: the vocabulary is
//! fixed and the decoder must keep byte-level control over what is and is
//! not accepted. Declarations, comments and processing instructions are
//! skipped; CDATA becomes text; entity references are decoded; mismatched
//! or unbalanced close tags are structural errors.

use std::io::Read;

use vaultsync_core::{DecodeError, DecodeResult};

/// One structural event pulled from the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    /// An element opened: `<Name attr="value">`.
    Start {
        /// Element name.
        name: String,
        /// Attributes in document order.
        attributes: Vec<(String, String)>,
    },
    /// An element closed: `</Name>` (synthesized for `<Name/>`).
    End {
        /// Element name.
        name: String,
    },
    /// Text enclosed by the current element, entities decoded.
    /// Whitespace-only runs between elements are not reported.
    Text(String),
    /// End of document; only valid once every element is closed.
    Eof,
}

/// Pull reader producing [`XmlEvent`]s from a byte stream.
pub struct XmlReader<R: Read> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
    len: usize,
    eof: bool,
    bom_checked: bool,
    /// Synthesized close event for a self-closing element.
    pending_end: Option<String>,
    /// Open-element stack for balance checking.
    stack: Vec<String>,
}

const BUF_SIZE: usize = 8 * 1024;

impl<R: Read> XmlReader<R> {
    /// Wrap a plaintext body stream.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: vec![0; BUF_SIZE],
            pos: 0,
            len: 0,
            eof: false,
            bom_checked: false,
            pending_end: None,
            stack: Vec::new(),
        }
    }

    /// Current element nesting depth.
    pub fn depth(&self) -> usize {
        self.stack.len() + usize::from(self.pending_end.is_some())
    }

    fn fill(&mut self) -> DecodeResult<()> {
        if self.pos < self.len || self.eof {
            return Ok(());
        }
        self.pos = 0;
        self.len = self.inner.read(&mut self.buf)?;
        if self.len == 0 {
            self.eof = true;
        }
        Ok(())
    }

    fn peek(&mut self) -> DecodeResult<Option<u8>> {
        self.fill()?;
        if self.pos < self.len {
            Ok(Some(self.buf[self.pos]))
        } else {
            Ok(None)
        }
    }

    fn next_byte(&mut self) -> DecodeResult<Option<u8>> {
        let b = self.peek()?;
        if b.is_some() {
            self.pos += 1;
        }
        Ok(b)
    }

    fn expect_byte(&mut self) -> DecodeResult<u8> {
        self.next_byte()?
            .ok_or_else(|| DecodeError::structural("unexpected end of document"))
    }

    /// Consume a UTF-8 byte-order mark if the document starts with one.
    fn skip_bom(&mut self) -> DecodeResult<()> {
        self.fill()?;
        if self.len - self.pos >= 3 && self.buf[self.pos..self.pos + 3] == [0xEF, 0xBB, 0xBF] {
            self.pos += 3;
        }
        Ok(())
    }

    /// Consume input until `marker` has been seen.
    fn skip_until(&mut self, marker: &[u8]) -> DecodeResult<()> {
        let mut window: Vec<u8> = Vec::with_capacity(marker.len());
        loop {
            let b = self.expect_byte()?;
            if window.len() == marker.len() {
                window.remove(0);
            }
            window.push(b);
            if window == marker {
                return Ok(());
            }
        }
    }

    /// Pull the next structural event.
    pub fn next_event(&mut self) -> DecodeResult<XmlEvent> {
        if let Some(name) = self.pending_end.take() {
            return Ok(XmlEvent::End { name });
        }
        if !self.bom_checked {
            self.bom_checked = true;
            self.skip_bom()?;
        }

        loop {
            match self.peek()? {
                None => {
                    return if self.stack.is_empty() {
                        Ok(XmlEvent::Eof)
                    } else {
                        Err(DecodeError::structural(format!(
                            "document ended inside <{}>",
                            self.stack.last().expect("stack checked non-empty")
                        )))
                    };
                }
                Some(b'<') => {
                    self.pos += 1;
                    match self.expect_byte()? {
                        b'?' => self.skip_until(b"?>")?,
                        b'!' => {
                            if let Some(event) = self.read_bang()? {
                                return Ok(event);
                            }
                        }
                        b'/' => return self.read_end_tag(),
                        first => return self.read_start_tag(first),
                    }
                }
                Some(_) => {
                    if let Some(text) = self.read_text()? {
                        return Ok(XmlEvent::Text(text));
                    }
                }
            }
        }
    }

    /// `<!` constructs: comments and doctype are skipped, CDATA is text.
    fn read_bang(&mut self) -> DecodeResult<Option<XmlEvent>> {
        match self.expect_byte()? {
            b'-' => {
                if self.expect_byte()? != b'-' {
                    return Err(DecodeError::structural("malformed comment"));
                }
                self.skip_until(b"-->")?;
                Ok(None)
            }
            b'[' => {
                // <![CDATA[ ... ]]>
                for expected in b"CDATA[" {
                    if self.expect_byte()? != *expected {
                        return Err(DecodeError::structural("malformed CDATA section"));
                    }
                }
                let mut text = Vec::new();
                loop {
                    let b = self.expect_byte()?;
                    text.push(b);
                    if text.ends_with(b"]]>") {
                        text.truncate(text.len() - 3);
                        break;
                    }
                }
                if self.stack.is_empty() {
                    return Err(DecodeError::structural("text outside the root element"));
                }
                Ok(Some(XmlEvent::Text(into_utf8(text)?)))
            }
            _ => {
                // DOCTYPE and friends; the vocabulary does not use them.
                self.skip_until(b">")?;
                Ok(None)
            }
        }
    }

    fn read_name(&mut self, first: u8) -> DecodeResult<String> {
        if !is_name_start(first) {
            return Err(DecodeError::structural(format!(
                "invalid name start byte 0x{:02X}",
                first
            )));
        }
        let mut name = vec![first];
        while let Some(b) = self.peek()? {
            if is_name_byte(b) {
                name.push(b);
                self.pos += 1;
            } else {
                break;
            }
        }
        into_utf8(name)
    }

    fn skip_whitespace(&mut self) -> DecodeResult<()> {
        while let Some(b) = self.peek()? {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(())
    }

    fn read_start_tag(&mut self, first: u8) -> DecodeResult<XmlEvent> {
        let name = self.read_name(first)?;
        let mut attributes = Vec::new();

        loop {
            self.skip_whitespace()?;
            match self.expect_byte()? {
                b'>' => {
                    self.stack.push(name.clone());
                    return Ok(XmlEvent::Start { name, attributes });
                }
                b'/' => {
                    if self.expect_byte()? != b'>' {
                        return Err(DecodeError::structural("malformed self-closing tag"));
                    }
                    self.pending_end = Some(name.clone());
                    return Ok(XmlEvent::Start { name, attributes });
                }
                b => {
                    let attr_name = self.read_name(b)?;
                    self.skip_whitespace()?;
                    if self.expect_byte()? != b'=' {
                        return Err(DecodeError::structural(format!(
                            "attribute {} missing '='",
                            attr_name
                        )));
                    }
                    self.skip_whitespace()?;
                    let quote = self.expect_byte()?;
                    if quote != b'"' && quote != b'\'' {
                        return Err(DecodeError::structural("unquoted attribute value"));
                    }
                    let mut raw = Vec::new();
                    loop {
                        let b = self.expect_byte()?;
                        if b == quote {
                            break;
                        }
                        raw.push(b);
                    }
                    attributes.push((attr_name, decode_entities(&into_utf8(raw)?)?));
                }
            }
        }
    }

    fn read_end_tag(&mut self) -> DecodeResult<XmlEvent> {
        let first = self.expect_byte()?;
        let name = self.read_name(first)?;
        self.skip_whitespace()?;
        if self.expect_byte()? != b'>' {
            return Err(DecodeError::structural(format!(
                "malformed close tag </{}",
                name
            )));
        }
        match self.stack.pop() {
            Some(open) if open == name => Ok(XmlEvent::End { name }),
            Some(open) => Err(DecodeError::structural(format!(
                "close tag </{}> does not match open <{}>",
                name, open
            ))),
            None => Err(DecodeError::structural(format!(
                "close tag </{}> without an open element",
                name
            ))),
        }
    }

    /// Text run up to the next markup. Returns `None` for whitespace-only
    /// runs between elements.
    fn read_text(&mut self) -> DecodeResult<Option<String>> {
        let mut raw = Vec::new();
        while let Some(b) = self.peek()? {
            if b == b'<' {
                break;
            }
            raw.push(b);
            self.pos += 1;
        }
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(None);
        }
        if self.stack.is_empty() {
            return Err(DecodeError::structural("text outside the root element"));
        }
        Ok(Some(decode_entities(&into_utf8(raw)?)?))
    }
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b':'
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b':' | b'-' | b'.')
}

fn into_utf8(bytes: Vec<u8>) -> DecodeResult<String> {
    String::from_utf8(bytes).map_err(|_| DecodeError::structural("invalid UTF-8 in document"))
}

/// Decode the five named entities plus numeric character references.
fn decode_entities(text: &str) -> DecodeResult<String> {
    if !text.contains('&') {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| DecodeError::structural("unterminated entity reference"))?;
        let entity = &after[..semi];
        match entity {
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "amp" => out.push('&'),
            "apos" => out.push('\''),
            "quot" => out.push('"'),
            _ => {
                let code = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(|dec| dec.parse::<u32>()))
                    .ok_or_else(|| {
                        DecodeError::structural(format!("unknown entity &{};", entity))
                    })?
                    .map_err(|_| {
                        DecodeError::structural(format!("malformed entity &{};", entity))
                    })?;
                out.push(char::from_u32(code).ok_or_else(|| {
                    DecodeError::structural(format!("invalid character reference &{};", entity))
                })?);
            }
        }
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
