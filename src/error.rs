use thiserror::Error;

use crate::models::encoding::EncodingError;
use crate::models::iso_type::IsoType;

/// Errors raised while decoding an inbound buffer.
///
/// Every variant carries enough context to point at the offending byte:
/// the absolute buffer offset and, where known, the field index and kind.
/// No partial message is ever returned alongside one of these.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(
        "message truncated at offset {offset}: need {needed} more bytes, {available} available"
    )]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("invalid MTI at offset {offset}: {msg}")]
    InvalidMti { offset: usize, msg: String },

    #[error("invalid bitmap at offset {offset}: {msg}")]
    InvalidBitmap { offset: usize, msg: String },

    #[error("no parse schema registered for MTI {mti:04X}")]
    NoSchema { mti: u16 },

    #[error("field {index} ({kind}) at offset {offset}: {msg}")]
    Field {
        index: u8,
        kind: IsoType,
        offset: usize,
        msg: String,
    },

    #[error("text decoding failed at offset {offset}: {source}")]
    Encoding {
        offset: usize,
        #[source]
        source: EncodingError,
    },
}

/// Errors raised while serializing a message.
///
/// A failure may leave the sink half-written; the caller discards it.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("I/O error writing message: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot encode header: {0}")]
    Header(#[source] EncodingError),

    #[error("cannot encode field {index}: {source}")]
    Field {
        index: u8,
        #[source]
        source: EncodingError,
    },

    #[error("field {index} ({kind}) value is {actual} bytes, maximum is {max}")]
    ValueTooLong {
        index: u8,
        kind: IsoType,
        max: usize,
        actual: usize,
    },

    #[error("field {index} amount does not fit in 12 digits")]
    AmountRange { index: u8 },

    #[error("field {index} has a custom value but no codec to encode it")]
    MissingCodec { index: u8 },
}

/// Errors raised synchronously from configuration-time setters and
/// value constructors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("field 1 is reserved for the secondary bitmap indicator")]
    ReservedField,

    #[error("field index {index} is outside 2..=128")]
    IndexOutOfRange { index: u8 },

    #[error("{kind} requires a positive declared length")]
    ZeroLength { kind: IsoType },

    #[error("value for {kind} field exceeds declared length {length}: {actual} bytes")]
    ValueTooLong {
        kind: IsoType,
        length: usize,
        actual: usize,
    },

    #[error("invalid value for {kind} field: {msg}")]
    InvalidValue { kind: IsoType, msg: String },

    #[error("invalid MTI {text:?}: expected four hex digits")]
    InvalidMti { text: String },

    #[error("template field {index} for MTI {mti:04X} conflicts with parse schema: {msg}")]
    TemplateMismatch { mti: u16, index: u8, msg: String },
}

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum Iso8583Error {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
