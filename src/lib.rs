//! Reader-agnostic smart-card protocol engine.
//!
//! Four layers, each usable on its own:
//!
//! - [`codec`]: BER-TLV/EMV parsing, status words, ATR, BCD/hex helpers.
//! - [`transport`]: APDU chaining over an injected [`transport::ReaderDriver`].
//! - [`handler`]: per-card-family plugins (EMV, PIV, OpenPGP, FIDO, eID,
//!   health, PKCS#15, SIM, DESFire, MIFARE Classic, generic Java Card) behind
//!   one [`handler::Handler`] trait, looked up through [`registry`].
//! - [`reducer`]: a pure fold of transport/handler events into session state.
//!
//! The optional `pcsc-adapter` feature adds a reference
//! [`pcsc_adapter::PcscReaderDriver`] and the `cardspy-cli` demo binary; the
//! core crate itself never depends on a concrete reader.

pub mod codec;
pub mod error;
pub mod handler;
pub mod model;
pub mod reducer;
pub mod registry;
pub mod transport;

#[cfg(feature = "pcsc-adapter")]
pub mod pcsc_adapter;

pub use error::CoreError;
pub use model::{Card, CardProtocol, Device};
pub use reducer::{reduce, Action, AppState};
pub use registry::HandlerRegistry;
pub use transport::{ReaderDriver, Transport, TransportEvent};
