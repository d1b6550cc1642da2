//! Codec layer: BER-TLV, DOL/AFL, CVM lists, ATR, status words, BCD/hex
//! (spec.md §4.1).

pub mod atr;
pub mod bcd;
pub mod cvm;
pub mod dol;
pub mod sw;
pub mod tags;
pub mod tlv;

pub use atr::{parse_atr, AtrInfo};
pub use bcd::{bytes_to_hex, clean_hex_input, hex_to_bytes};
pub use cvm::{evaluate_cvm, parse_cvm_list, CvmCondition, CvmMethod, CvmRule};
pub use dol::{build_dol, parse_afl, parse_dol, AflEntry, DolEntry};
pub use sw::{is_sw_success, sw_description};
pub use tlv::{find, find_all, parse_tlv, TlvNode};
