//! Motorola S-record ingestion.
//!
//! Only the 16-bit address family matters here: `S0` headers are noted,
//! `S1` records carry data, `S9` terminates. Every record's checksum is
//! the complement of the byte sum of count, address and data; a mismatch
//! or a byte count below 3 rejects the record. Loading emits one
//! `ui:memory:bulk:write` per data record.

use log::debug;
use thiserror::Error;

use wirewrap_core::core::error::SimError;
use wirewrap_core::core::event::Payload;
use wirewrap_core::core::simulator::Channel;

#[derive(Debug, Error)]
pub enum SRecordError {
    #[error("line {line}: record too short")]
    TooShort { line: usize },

    #[error("line {line}: not an S-record")]
    BadPrefix { line: usize },

    #[error("line {line}: unsupported record type S{kind}")]
    Unsupported { line: usize, kind: char },

    #[error("line {line}: invalid hex digit")]
    BadHex { line: usize },

    #[error("line {line}: byte count {count} below minimum of 3")]
    BadCount { line: usize, count: u8 },

    #[error("line {line}: checksum mismatch (computed {computed:#04x}, record has {found:#04x})")]
    BadChecksum {
        line: usize,
        computed: u8,
        found: u8,
    },

    #[error(transparent)]
    Sim(#[from] SimError),
}

/// One decoded record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    /// S0: header bytes (usually ASCII).
    Header(Vec<u8>),
    /// S1: data at a 16-bit load address.
    Data { address: u16, bytes: Vec<u8> },
    /// S9: termination with start address.
    Termination { address: u16 },
}

fn hex_bytes(text: &str, line: usize) -> Result<Vec<u8>, SRecordError> {
    if !text.is_ascii() {
        return Err(SRecordError::BadHex { line });
    }
    if text.len() % 2 != 0 {
        return Err(SRecordError::TooShort { line });
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16).map_err(|_| SRecordError::BadHex { line })
        })
        .collect()
}

/// Decode one line. Blank lines yield `None`.
pub fn parse_record(text: &str, line: usize) -> Result<Option<Record>, SRecordError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let mut chars = text.chars();
    if chars.next() != Some('S') {
        return Err(SRecordError::BadPrefix { line });
    }
    let kind = chars.next().ok_or(SRecordError::TooShort { line })?;
    let payload = hex_bytes(chars.as_str(), line)?;
    if payload.len() < 2 {
        return Err(SRecordError::TooShort { line });
    }

    let count = payload[0];
    if count < 3 {
        return Err(SRecordError::BadCount { line, count });
    }
    if usize::from(count) != payload.len() - 1 {
        return Err(SRecordError::TooShort { line });
    }

    // Checksum covers count, address and data bytes.
    let found = *payload.last().unwrap_or(&0);
    let sum: u32 = payload[..payload.len() - 1].iter().map(|&b| u32::from(b)).sum();
    let computed = 0xFF - (sum % 0x100) as u8;
    if computed != found {
        return Err(SRecordError::BadChecksum {
            line,
            computed,
            found,
        });
    }

    let address = (u16::from(payload[1]) << 8) | u16::from(payload[2]);
    let data = payload[3..payload.len() - 1].to_vec();
    match kind {
        '0' => Ok(Some(Record::Header(data))),
        '1' => Ok(Some(Record::Data {
            address,
            bytes: data,
        })),
        '9' => Ok(Some(Record::Termination { address })),
        other => Err(SRecordError::Unsupported { line, kind: other }),
    }
}

/// Decode a whole file.
pub fn parse(text: &str) -> Result<Vec<Record>, SRecordError> {
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if let Some(record) = parse_record(line, index + 1)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Load a file into the running system: one `ui:memory:bulk:write` per
/// data record. Returns the termination start address, if the file had
/// one.
pub fn load(channel: &Channel, text: &str) -> Result<Option<u16>, SRecordError> {
    let mut start = None;
    for record in parse(text)? {
        match record {
            Record::Header(bytes) => {
                debug!("srecord header: {}", String::from_utf8_lossy(&bytes));
            }
            Record::Data { address, bytes } => {
                channel.emit("ui:memory:bulk:write", Payload::Block { address, bytes })?;
            }
            Record::Termination { address } => start = Some(address),
        }
    }
    Ok(start)
}
