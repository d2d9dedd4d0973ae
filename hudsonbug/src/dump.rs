//! Decoder for the register dump printed by the `x` command.
//!
//! The monitor answers with free form text such as
//!
//! ```text
//! PC=00FF0D3C USP=00000000 SSP=00001FFC SR=2000 X:0  N:0  Z:0  V:0  C:0
//! D  00000000 FFFF9470 00000007 00000009  00000001 00001206 00FF00E0 00004AB9
//! A  00000CB0 00000000 00FF00E1 000012AD  00001120 00001206 00001000 00001FFC
//! ```
//!
//! `PC` and `SR` carry their value inline, the data and address registers follow a bare
//! `D` or `A` marker as a run of eight values. Everything else is ignored.

use crate::monitor::MonitorError;
use crate::registers::{RegisterId, RegisterStore, NUM_REGISTERS};

/// Number of values following a `D` or `A` marker.
const RUN_LENGTH: u16 = 8;

/// A whitespace delimited token and its byte offset in the dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub offset: usize,
}

/// Splits a dump into whitespace delimited tokens.
///
/// The tokenizer owns its position, the buffer itself is never modified.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    buffer: &'a str,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(buffer: &'a str) -> Self {
        Self {
            buffer,
            position: 0,
        }
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        let rest = &self.buffer[self.position..];
        let start = self.position + rest.find(|c: char| !c.is_ascii_whitespace())?;
        let len = self.buffer[start..]
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(self.buffer.len() - start);

        self.position = start + len;

        Some(Token {
            text: &self.buffer[start..start + len],
            offset: start,
        })
    }
}

/// Why a register was not updated by a dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// The dump did not mention the register.
    NotPresent,
    /// The dump ended before the register's position in a `D`/`A` run.
    Truncated,
    /// The register's value could not be decoded as hexadecimal.
    InvalidValue {
        /// The undecodable value text.
        token: String,
        /// Byte offset of the token in the dump.
        offset: usize,
    },
}

/// A register left unchanged by a dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissedRegister {
    pub register: RegisterId,
    pub reason: MissReason,
}

/// Result of decoding a dump that was recognised as a register dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpStatus {
    /// All registers were updated.
    Complete,
    /// Some registers kept their previous value.
    Partial(Vec<MissedRegister>),
}

impl DumpStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, DumpStatus::Complete)
    }

    /// The registers that were not updated.
    pub fn missed(&self) -> &[MissedRegister] {
        match self {
            DumpStatus::Complete => &[],
            DumpStatus::Partial(missed) => missed,
        }
    }
}

/// Errors while refreshing registers from a dump.
#[derive(Debug, thiserror::Error, docsplay::Display)]
pub enum DumpError {
    /// The monitor response does not look like a register dump: {0:?}
    NotARegisterDump(String),

    /// Failed to request the register dump.
    Monitor(#[from] MonitorError),
}

/// Per register bookkeeping while decoding.
///
/// A successful update always wins over a failure seen for the same register.
struct Outcome {
    slots: [Option<Result<(), MissReason>>; NUM_REGISTERS],
}

impl Outcome {
    fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    fn updated(&mut self, id: RegisterId) {
        self.slots[id.index()] = Some(Ok(()));
    }

    fn missed(&mut self, id: RegisterId, reason: MissReason) {
        let slot = &mut self.slots[id.index()];
        if !matches!(slot, Some(Ok(()))) {
            *slot = Some(Err(reason));
        }
    }

    fn into_status(self) -> DumpStatus {
        let missed: Vec<_> = self
            .slots
            .into_iter()
            .zip(RegisterId::all())
            .filter_map(|(slot, register)| match slot {
                Some(Ok(())) => None,
                Some(Err(reason)) => Some(MissedRegister { register, reason }),
                None => Some(MissedRegister {
                    register,
                    reason: MissReason::NotPresent,
                }),
            })
            .collect();

        if missed.is_empty() {
            DumpStatus::Complete
        } else {
            DumpStatus::Partial(missed)
        }
    }
}

/// Decodes a hexadecimal register value. Signs and empty values are rejected.
fn parse_hex(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(text, 16).ok()
}

/// Decodes `value` into `id`, or records why it could not.
fn supply(
    store: &mut impl RegisterStore,
    outcome: &mut Outcome,
    id: RegisterId,
    value: &str,
    offset: usize,
) {
    match parse_hex(value) {
        Some(value) => {
            store.supply_register(id, value);
            outcome.updated(id);
        }
        None => {
            tracing::warn!("Skipping {}: {:?} at offset {} is not a hex value", id, value, offset);
            outcome.missed(
                id,
                MissReason::InvalidValue {
                    token: value.to_owned(),
                    offset,
                },
            );
        }
    }
}

/// Strips the separator between an inline label and its value, as in `PC=00FF0D3C`.
fn inline_value(rest: &str) -> &str {
    rest.strip_prefix(|c| c == '=' || c == ':').unwrap_or(rest)
}

/// Decodes one complete register dump into `store`.
///
/// Registers that the dump does not update keep their previous value in `store` and are
/// listed in the returned [`DumpStatus::Partial`]. Only text that contains no register field
/// at all is rejected.
pub fn decode_register_dump(
    dump: &str,
    store: &mut impl RegisterStore,
) -> Result<DumpStatus, DumpError> {
    let mut outcome = Outcome::new();
    let mut recognised = false;
    let mut tokens = Tokenizer::new(dump);

    while let Some(token) = tokens.next() {
        let inline = if let Some(rest) = token.text.strip_prefix("PC") {
            Some((RegisterId::PC, rest))
        } else if let Some(rest) = token.text.strip_prefix("SR") {
            Some((RegisterId::SR, rest))
        } else {
            None
        };

        if let Some((id, rest)) = inline {
            recognised = true;
            let value = inline_value(rest);
            let offset = token.offset + (token.text.len() - value.len());
            supply(store, &mut outcome, id, value, offset);
            continue;
        }

        let base = match token.text {
            "D" => 0,
            "A" => RUN_LENGTH,
            _ => {
                tracing::trace!("Ignoring token {:?}", token.text);
                continue;
            }
        };
        recognised = true;

        for position in 0..RUN_LENGTH {
            let id = RegisterId(base + position);
            match tokens.next() {
                Some(value) => supply(store, &mut outcome, id, value.text, value.offset),
                None => {
                    tracing::debug!(
                        "Register dump ended inside the {} run after {} values",
                        token.text,
                        position
                    );
                    for missing in position..RUN_LENGTH {
                        outcome.missed(RegisterId(base + missing), MissReason::Truncated);
                    }
                    break;
                }
            }
        }
    }

    if !recognised {
        return Err(DumpError::NotARegisterDump(dump.trim().to_owned()));
    }

    Ok(outcome.into_status())
}
