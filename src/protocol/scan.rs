//! Incremental message boundary detection for unframed streams.
//!
//! # Responsibilities
//! - Report where the first message in a growing buffer ends
//! - Keep the scan position between calls so bytes already examined are not
//!   walked again when more arrive
//!
//! # Design Decisions
//! - Binary and compact walk the value tree with an explicit frame stack,
//!   advancing one field header, container header or primitive at a time
//!   through the protocol's own decoder; an incomplete step is retried whole
//! - JSON tracks bracket depth outside string literals and hands the value to
//!   `serde_json` only once the outermost bracket closes
//! - A scanner measures one message; the channel starts a fresh one after
//!   every split

use std::fmt;
use std::marker::PhantomData;

use super::json::json_message_len;
use super::{
    checked_size, incomplete_as_none, FieldType, InputProtocol, ProtocolError, Result,
    MAX_SKIP_DEPTH,
};

/// Finds where the first message in a growing buffer ends.
pub trait MessageScanner: Send + fmt::Debug {
    /// Examine `buf`, which starts with every byte passed to earlier calls,
    /// and return the message length once the message is complete.
    fn scan(&mut self, buf: &[u8]) -> Result<Option<usize>>;
}

/// Protocols decoded with a byte cursor that reports its position.
pub(crate) trait CursorProtocol: Send + Sync + fmt::Debug + 'static {
    type Input<'a>: InputProtocol;

    fn open(buf: &[u8]) -> Self::Input<'_>;

    fn position(input: &Self::Input<'_>) -> usize;
}

#[derive(Debug, Clone, Copy)]
enum Frame {
    Struct,
    Elements {
        element_type: FieldType,
        remaining: usize,
    },
    /// `remaining` counts keys and values; even means a key is next.
    Entries {
        key_type: FieldType,
        value_type: FieldType,
        remaining: usize,
    },
}

enum Step {
    Envelope,
    Value(Option<Frame>),
    Close,
}

/// Resumable skip over one binary or compact message.
#[derive(Debug)]
pub(crate) struct SkipScanner<C> {
    pos: usize,
    frames: Vec<Frame>,
    protocol: PhantomData<C>,
}

impl<C: CursorProtocol> SkipScanner<C> {
    pub(crate) fn new() -> Self {
        Self {
            pos: 0,
            frames: Vec::new(),
            protocol: PhantomData,
        }
    }
}

impl<C: CursorProtocol> MessageScanner for SkipScanner<C> {
    fn scan(&mut self, buf: &[u8]) -> Result<Option<usize>> {
        loop {
            let mut input = C::open(buf.get(self.pos..).unwrap_or_default());
            let Some(step) = incomplete_as_none(next_step(&self.frames, &mut input))? else {
                return Ok(None);
            };
            self.pos += C::position(&input);

            match step {
                Step::Envelope => self.frames.push(Frame::Struct),
                Step::Value(child) => {
                    if let Some(
                        Frame::Elements { remaining, .. } | Frame::Entries { remaining, .. },
                    ) = self.frames.last_mut()
                    {
                        *remaining -= 1;
                    }
                    if let Some(child) = child {
                        self.frames.push(child);
                    }
                }
                Step::Close => {
                    self.frames.pop();
                    if self.frames.is_empty() {
                        return Ok(Some(self.pos));
                    }
                }
            }
        }
    }
}

/// Decode the next unit without touching the frame stack.
fn next_step<P: InputProtocol + ?Sized>(frames: &[Frame], input: &mut P) -> Result<Step> {
    let Some(top) = frames.last() else {
        input.read_message_begin()?;
        return Ok(Step::Envelope);
    };

    let value_type = match *top {
        Frame::Struct => {
            let field = input.read_field_begin()?;
            if field.field_type == FieldType::Stop {
                return Ok(Step::Close);
            }
            field.field_type
        }
        Frame::Elements { remaining: 0, .. } | Frame::Entries { remaining: 0, .. } => {
            return Ok(Step::Close)
        }
        Frame::Elements { element_type, .. } => element_type,
        Frame::Entries {
            key_type,
            value_type,
            remaining,
        } => {
            if remaining % 2 == 0 {
                key_type
            } else {
                value_type
            }
        }
    };

    if frames.len() >= MAX_SKIP_DEPTH {
        return Err(ProtocolError::DepthLimit);
    }
    open_value(input, value_type).map(Step::Value)
}

/// Consume a primitive, or the header of a container that still has to be
/// walked.
fn open_value<P: InputProtocol + ?Sized>(
    input: &mut P,
    field_type: FieldType,
) -> Result<Option<Frame>> {
    match field_type {
        FieldType::Struct => Ok(Some(Frame::Struct)),
        FieldType::List => {
            let ident = input.read_list_begin()?;
            Ok(Some(Frame::Elements {
                element_type: ident.element_type,
                remaining: checked_size(i64::from(ident.size))?,
            }))
        }
        FieldType::Set => {
            let ident = input.read_set_begin()?;
            Ok(Some(Frame::Elements {
                element_type: ident.element_type,
                remaining: checked_size(i64::from(ident.size))?,
            }))
        }
        FieldType::Map => {
            let ident = input.read_map_begin()?;
            if ident.size == 0 {
                return Ok(None);
            }
            let (Some(key_type), Some(value_type)) = (ident.key_type, ident.value_type) else {
                return Err(ProtocolError::InvalidData(
                    "map entry types missing".to_string(),
                ));
            };
            let entries = checked_size(i64::from(ident.size))?;
            Ok(Some(Frame::Entries {
                key_type,
                value_type,
                remaining: entries.checked_mul(2).ok_or(ProtocolError::NegativeSize(
                    i64::from(ident.size),
                ))?,
            }))
        }
        FieldType::Stop | FieldType::Void => Err(ProtocolError::InvalidData(format!(
            "cannot skip field type {:?}",
            field_type
        ))),
        primitive => input.skip(primitive).map(|_| None),
    }
}

/// Bracket-depth scan over one JSON message.
#[derive(Debug, Default)]
pub(crate) struct JsonScanner {
    pos: usize,
    depth: usize,
    opened: bool,
    in_string: bool,
    escaped: bool,
    /// The message does not start with an array or object; let the parser
    /// decide on the whole buffer.
    whole: bool,
}

impl MessageScanner for JsonScanner {
    fn scan(&mut self, buf: &[u8]) -> Result<Option<usize>> {
        if self.whole {
            return json_message_len(buf);
        }

        while let Some(&byte) = buf.get(self.pos) {
            self.pos += 1;
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b' ' | b'\t' | b'\r' | b'\n' => {}
                b'[' | b'{' => {
                    self.depth += 1;
                    self.opened = true;
                }
                b']' | b'}' if self.depth > 0 => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        let measured = json_message_len(&buf[..self.pos])?;
                        self.whole = measured.is_none();
                        return Ok(measured);
                    }
                }
                b'"' if self.opened => self.in_string = true,
                _ if self.opened => {}
                _ => {
                    self.whole = true;
                    return json_message_len(buf);
                }
            }
        }
        Ok(None)
    }
}
