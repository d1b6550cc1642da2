//! Error taxonomy for the protocol engine (spec.md §7).
//!
//! Four families, none of which swallow detail: transport failures from the
//! reader driver, card-level status words (not treated as errors), handler
//! logic errors, and codec errors. The TLV parser in particular prefers a
//! partial result over a `CodecError`; see [`crate::codec::tlv`].

use thiserror::Error;

/// Failure surfaced by the reader driver boundary (spec.md §4.2, §7).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("reader disconnected")]
    Disconnected,

    #[error("reader protocol error: {detail}")]
    ProtocolError { detail: String },

    #[error("APDU exchange timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,
}

/// Handler-internal logical errors (spec.md §4.3, §7).
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid parameter {name}: {detail}")]
    InvalidParameter { name: String, detail: String },

    #[error("detection failed: {0}")]
    DetectionFailed(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Codec-layer errors (spec.md §4.1, §7). The BER-TLV parser is tolerant and
/// only ever returns [`CodecError::TruncatedTlv`] in contexts that demand a
/// strict parse; `parse_tlv` itself never fails.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CodecError {
    #[error("truncated TLV data")]
    TruncatedTlv,

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("hex string has odd length")]
    OddLengthHex,

    #[error("invalid DOL encoding")]
    InvalidDol,
}

/// Umbrella error returned by `executeCommand`/`interrogate` call sites that
/// need to unify the three families above (spec.md §7: "Unknown commands,
/// bad parameters, and bad hex are user-visible errors").
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
