//! Minimal parser for the XML fragments the debugger writes to its socket.
//!
//! Replies are single elements carrying attribute/value pairs and optional
//! child elements. No text nodes, namespaces, comments or processing
//! instructions appear on the wire, so a full XML implementation is not
//! required.
use std::collections::HashMap;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("expected '{expected}' at offset {offset}")]
    Unexpected { expected: char, offset: usize },
    #[error("expected a name at offset {0}")]
    ExpectedName(usize),
    #[error("mismatched closing tag: expected </{expected}>, found </{found}>")]
    MismatchedTag { expected: String, found: String },
    #[error("unexpected trailing input at offset {0}")]
    TrailingInput(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: HashMap<String, String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Parse a complete reply into its element tree.
pub fn parse(input: &str) -> Result<Element, ParseError> {
    let mut parser = Parser { input, pos: 0 };
    parser.skip_whitespace();
    let element = parser.parse_element()?;
    parser.skip_whitespace();
    if parser.pos < parser.input.len() {
        return Err(ParseError::TrailingInput(parser.pos));
    }
    Ok(element)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn parse_element(&mut self) -> Result<Element, ParseError> {
        self.expect('<')?;
        let name = self.parse_name()?;
        let mut attributes = HashMap::new();

        loop {
            self.skip_whitespace();
            match self.peek()? {
                b'/' => {
                    self.pos += 1;
                    self.expect('>')?;
                    return Ok(Element {
                        name,
                        attributes,
                        children: Vec::new(),
                    });
                }
                b'>' => {
                    self.pos += 1;
                    break;
                }
                _ => {
                    let attr_name = self.parse_name()?;
                    self.skip_whitespace();
                    self.expect('=')?;
                    self.skip_whitespace();
                    let value = self.parse_quoted()?;
                    attributes.insert(attr_name, value);
                }
            }
        }

        let mut children = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek()? != b'<' {
                return Err(ParseError::Unexpected {
                    expected: '<',
                    offset: self.pos,
                });
            }
            if self.peek_at(1)? == b'/' {
                self.pos += 2;
                let closing = self.parse_name()?;
                self.skip_whitespace();
                self.expect('>')?;
                if closing != name {
                    return Err(ParseError::MismatchedTag {
                        expected: name,
                        found: closing,
                    });
                }
                return Ok(Element {
                    name,
                    attributes,
                    children,
                });
            }
            children.push(self.parse_element()?);
        }
    }

    fn parse_name(&mut self) -> Result<String, ParseError> {
        let bytes = self.input.as_bytes();
        let start = self.pos;
        while self.pos < bytes.len()
            && (bytes[self.pos].is_ascii_alphanumeric()
                || bytes[self.pos] == b'_'
                || bytes[self.pos] == b'-')
        {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(ParseError::ExpectedName(start));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_quoted(&mut self) -> Result<String, ParseError> {
        let quote = match self.peek()? {
            q @ (b'"' | b'\'') => q,
            _ => {
                return Err(ParseError::Unexpected {
                    expected: '"',
                    offset: self.pos,
                })
            }
        };
        self.pos += 1;
        let start = self.pos;
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos] != quote {
            self.pos += 1;
        }
        if self.pos >= bytes.len() {
            return Err(ParseError::UnexpectedEof);
        }
        let raw = &self.input[start..self.pos];
        self.pos += 1;
        Ok(unescape(raw))
    }

    fn peek(&self) -> Result<u8, ParseError> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Result<u8, ParseError> {
        self.input
            .as_bytes()
            .get(self.pos + offset)
            .copied()
            .ok_or(ParseError::UnexpectedEof)
    }

    fn expect(&mut self, expected: char) -> Result<(), ParseError> {
        if self.peek()? == expected as u8 {
            self.pos += 1;
            Ok(())
        } else {
            Err(ParseError::Unexpected {
                expected,
                offset: self.pos,
            })
        }
    }

    fn skip_whitespace(&mut self) {
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }
}

/// Resolve the character entities the debugger escapes attribute values with.
fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];
        let Some(end) = rest.find(';') else {
            break;
        };
        match &rest[1..end] {
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "amp" => out.push('&'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            entity => {
                let code = entity
                    .strip_prefix('#')
                    .and_then(|digits| digits.parse::<u32>().ok())
                    .and_then(char::from_u32);
                match code {
                    Some(c) => out.push(c),
                    // unknown entity, keep it verbatim
                    None => out.push_str(&rest[..=end]),
                }
            }
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}
