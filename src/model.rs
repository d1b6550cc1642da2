//! Core data model shared by transport, handlers and the reducer
//! (spec.md §3).

use serde::{Deserialize, Serialize};

/// Communication protocol negotiated with the card, decoded from its ATR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardProtocol {
    T0,
    T1,
    Unknown,
}

/// A PC/SC reader, as reported by the external driver (spec.md §3).
///
/// Uniqueness is per-process and keyed on `name`, matching the source
/// reader-assigned identifier semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub is_activated: bool,
}

/// A card present in a device, created on card-insert and destroyed on
/// card-remove (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub device_name: String,
    /// Upper-case hex, no separators (spec.md §6).
    pub atr: String,
    pub protocol: CardProtocol,
}
