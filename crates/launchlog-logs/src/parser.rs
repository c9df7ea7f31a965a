//! Incremental parser for game console output.
//!
//! Game output is a mix of plain text lines and log4j XML events, which may
//! span several lines:
//!
//! ```text
//! [12:00:00] [main/INFO]: plain text still happens
//! <log4j:Event logger="net.minecraft.server.Main" timestamp="1700000000" level="INFO" thread="main">
//!   <log4j:Message><![CDATA[Starting server]]></log4j:Message>
//! </log4j:Event>
//! ```
//!
//! Text is appended as it arrives and [`LogParser::parse_available`] hands
//! back whatever can be decided without more input. A suspected event start
//! that is not yet complete is parked and picked up again by the next append.

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;

use launchlog_types::Severity;

use crate::level;

const EVENT_TAG: &[u8] = b"log4j:Event";
const MESSAGE_TAG: &[u8] = b"log4j:Message";
/// Opening token of an event, compared case-insensitively
const EVENT_OPEN: &[u8] = b"<log4j:event";

/// What went wrong with a structured event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseErrorKind {
    MissingLogger,
    MissingTimestamp,
    InvalidTimestamp,
    MissingMessage,
    /// The XML itself could not be read
    Malformed,
}

/// A malformed structured event
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub kind: ParseErrorKind,
}

impl ParseError {
    fn new(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    fn malformed(err: impl std::fmt::Display) -> Self {
        Self::new(ParseErrorKind::Malformed, format!("malformed log4j:Event: {}", err))
    }
}

/// A parsed log4j event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEvent {
    pub logger: String,
    pub severity: Severity,
    /// Level exactly as the producer wrote it
    pub severity_text: String,
    pub timestamp: DateTime<Utc>,
    pub thread: String,
    pub message: String,
}

/// One unit of parser output
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedItem {
    Structured(LogEvent),
    PlainText { message: String },
    /// The buffered input may be the start of an event; wait for more.
    /// Never returned by [`LogParser::parse_available`].
    Partial { data: String },
}

#[derive(Debug, Default)]
struct ParseBuffer {
    /// Text not yet handed out
    pending: String,
    /// A parked, possibly incomplete event start
    carry: Option<String>,
}

/// Incremental log4j/plain-text parser for one output channel
#[derive(Debug, Default)]
pub struct LogParser {
    buffer: ParseBuffer,
    error: Option<ParseError>,
}

impl LogParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line of output. A parked partial event is continued on a
    /// new line, as the line break was stripped by whoever split the output.
    pub fn append_line(&mut self, line: &str) {
        if let Some(mut carry) = self.buffer.carry.take() {
            carry.push('\n');
            carry.push_str(&self.buffer.pending);
            self.buffer.pending = carry;
        }
        self.buffer.pending.push_str(line);
    }

    /// Append a raw chunk of output exactly as read, with no separator
    pub fn append(&mut self, chunk: &str) {
        if let Some(mut carry) = self.buffer.carry.take() {
            carry.push_str(&self.buffer.pending);
            self.buffer.pending = carry;
        }
        self.buffer.pending.push_str(chunk);
    }

    /// Error raised by the last parse attempt, if any
    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.pending.is_empty() && self.buffer.carry.is_none()
    }

    /// Make one unit of progress.
    ///
    /// Returns `None` when the buffer is empty or the event at its front is
    /// malformed; in the latter case [`LogParser::error`] is set and the
    /// buffer is left as it was.
    pub fn parse_next(&mut self) -> Option<ParsedItem> {
        self.error = None;

        if self.buffer.pending.is_empty() {
            return self
                .buffer
                .carry
                .as_ref()
                .map(|data| ParsedItem::Partial { data: data.clone() });
        }

        if self.buffer.pending.trim().is_empty() {
            return Some(ParsedItem::PlainText {
                message: std::mem::take(&mut self.buffer.pending),
            });
        }

        if is_complete_event(&self.buffer.pending) {
            return match parse_event(&self.buffer.pending) {
                Ok((event, consumed)) => {
                    // trailing whitespace stays for the next item
                    self.buffer.pending.drain(..consumed);
                    Some(ParsedItem::Structured(event))
                }
                Err(err) => {
                    tracing::debug!(error = %err, "rejected log4j event");
                    self.error = Some(err);
                    None
                }
            };
        }

        let pending = &self.buffer.pending;
        let candidate = pending
            .match_indices('<')
            .map(|(pos, _)| pos)
            .find(|&pos| is_potential_event_start(&pending[pos..]));

        match candidate {
            None => Some(ParsedItem::PlainText {
                message: std::mem::take(&mut self.buffer.pending),
            }),
            Some(pos) => {
                let complete = is_complete_event(&pending[pos..]);
                // An unfinished event start parks its whole line, so a line
                // is never split on an arrival boundary
                let cut = if complete {
                    pos
                } else {
                    pending[..pos].rfind('\n').map_or(0, |nl| nl + 1)
                };
                if cut > 0 {
                    let rest = self.buffer.pending.split_off(cut);
                    let text = std::mem::replace(&mut self.buffer.pending, rest);
                    if !text.trim().is_empty() {
                        return Some(ParsedItem::PlainText { message: text });
                    }
                    if complete {
                        return self.parse_next();
                    }
                }
                let data = std::mem::take(&mut self.buffer.pending);
                self.buffer.carry = Some(data.clone());
                Some(ParsedItem::Partial { data })
            }
        }
    }

    /// Parse everything that can be decided without more input.
    ///
    /// Stops at a parked partial event or at a malformed one; check
    /// [`LogParser::error`] afterwards.
    pub fn parse_available(&mut self) -> Vec<ParsedItem> {
        let mut items = Vec::new();
        while let Some(item) = self.parse_next() {
            if matches!(item, ParsedItem::Partial { .. }) {
                break;
            }
            items.push(item);
        }
        items
    }

    /// Take every buffered byte out of the parser, parked partials included,
    /// and clear the error. Used to recover from a malformed event.
    pub fn take_pending(&mut self) -> String {
        self.error = None;
        let mut text = self.buffer.carry.take().unwrap_or_default();
        if !text.is_empty() && !self.buffer.pending.is_empty() {
            text.push('\n');
        }
        text.push_str(&std::mem::take(&mut self.buffer.pending));
        text
    }

    /// End of stream: whatever is still buffered is plain text
    pub fn flush(&mut self) -> Option<ParsedItem> {
        let text = self.take_pending();
        if text.trim().is_empty() {
            None
        } else {
            Some(ParsedItem::PlainText { message: text })
        }
    }
}

fn is_tag(name: &[u8], tag: &[u8]) -> bool {
    name.eq_ignore_ascii_case(tag)
}

/// `s` starts with `<` and is a case-insensitive prefix of the event opening
/// token, or starts with the whole token
fn is_potential_event_start(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'<') {
        return false;
    }
    let n = bytes.len().min(EVENT_OPEN.len());
    bytes[..n].eq_ignore_ascii_case(&EVENT_OPEN[..n])
}

/// Whether `buf` starts with a whole log4j event, walking start and end
/// elements of any name until the root closes
fn is_complete_event(buf: &str) -> bool {
    let mut reader = Reader::from_str(buf);

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) if is_tag(start.name().as_ref(), EVENT_TAG) => break,
            Ok(Event::Empty(start)) => return is_tag(start.name().as_ref(), EVENT_TAG),
            Ok(Event::Text(text)) if text.iter().all(u8::is_ascii_whitespace) => {}
            Ok(Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_)) => {}
            _ => return false,
        }
    }

    let mut depth = 1usize;
    while depth > 0 {
        match reader.read_event() {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(_)) => depth -= 1,
            Ok(Event::Eof) | Err(_) => return false,
            Ok(_) => {}
        }
    }
    true
}

/// Parse the event at the front of `buf`, returning it and the number of
/// bytes it occupied
fn parse_event(buf: &str) -> Result<(LogEvent, usize), ParseError> {
    let mut reader = Reader::from_str(buf);

    let (root, self_closing) = loop {
        match reader.read_event().map_err(ParseError::malformed)? {
            Event::Start(start) => break (start, false),
            Event::Empty(start) => break (start, true),
            Event::Eof => return Err(ParseError::malformed("unexpected end of input")),
            _ => {}
        }
    };

    let mut event = parse_attributes(&root)?;
    if self_closing {
        return Err(missing_message());
    }

    let mut message = None;
    let mut depth = 1usize;
    loop {
        match reader.read_event().map_err(ParseError::malformed)? {
            Event::Start(start) if is_tag(start.name().as_ref(), MESSAGE_TAG) => {
                message = Some(read_message(&mut reader)?);
            }
            Event::Empty(start) if is_tag(start.name().as_ref(), MESSAGE_TAG) => {
                message = Some(String::new());
            }
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => return Err(ParseError::malformed("unexpected end of input")),
            _ => {}
        }
    }

    event.message = message.ok_or_else(missing_message)?;
    let consumed = reader.buffer_position() as usize;
    Ok((event, consumed.min(buf.len())))
}

fn missing_message() -> ParseError {
    ParseError::new(
        ParseErrorKind::MissingMessage,
        "log4j:Event has no log4j:Message element",
    )
}

fn parse_attributes(root: &BytesStart<'_>) -> Result<LogEvent, ParseError> {
    let mut logger = String::new();
    let mut timestamp = None;
    let mut severity_text = String::new();
    let mut thread = String::new();

    for attr in root.attributes() {
        let attr = attr.map_err(ParseError::malformed)?;
        let value = attr.unescape_value().map_err(ParseError::malformed)?;
        let value = value.trim();

        match attr.key.as_ref() {
            b"logger" => logger = value.to_string(),
            b"timestamp" => timestamp = Some(parse_timestamp(value)?),
            b"level" => severity_text = value.to_string(),
            b"thread" => thread = value.to_string(),
            _ => {}
        }
    }

    if logger.is_empty() {
        return Err(ParseError::new(
            ParseErrorKind::MissingLogger,
            "log4j:Event is missing required attribute `logger`",
        ));
    }
    let Some(timestamp) = timestamp else {
        return Err(ParseError::new(
            ParseErrorKind::MissingTimestamp,
            "log4j:Event is missing required attribute `timestamp`",
        ));
    };

    let severity = match level::from_name(&severity_text) {
        Severity::Unknown => Severity::Info,
        known => known,
    };

    Ok(LogEvent {
        logger,
        severity,
        severity_text,
        timestamp,
        thread,
        message: String::new(),
    })
}

/// Epoch seconds. Sub-second attributes are not looked at.
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ParseError> {
    if value.is_empty() {
        return Err(ParseError::new(
            ParseErrorKind::MissingTimestamp,
            "log4j:Event is missing required attribute `timestamp`",
        ));
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| {
            ParseError::new(
                ParseErrorKind::InvalidTimestamp,
                format!("log4j:Event has an invalid timestamp '{}'", value),
            )
        })
}

/// Concatenate the character data of a `log4j:Message` element, consuming
/// its end tag
fn read_message(reader: &mut Reader<&[u8]>) -> Result<String, ParseError> {
    let mut message = String::new();
    loop {
        match reader.read_event().map_err(ParseError::malformed)? {
            Event::Text(text) => {
                message.push_str(&text.unescape().map_err(ParseError::malformed)?);
            }
            Event::CData(data) => message.push_str(&String::from_utf8_lossy(&data)),
            Event::End(end) if is_tag(end.name().as_ref(), MESSAGE_TAG) => return Ok(message),
            Event::Eof => return Err(ParseError::malformed("unexpected end of input")),
            _ => {}
        }
    }
}
