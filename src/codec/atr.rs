//! ATR (Answer-To-Reset) parsing (spec.md §4.1, §3).
//!
//! Structure follows the interface-byte walk in
//! `examples/other_examples/e28dfdf2_liclac-cardinal__src-atr.rs.rs`, adapted
//! to a tolerant, allocation-light decode (no `nom`) in the style of the
//! teacher's `smart_card::parse_atr_and_get_protocol`, which this supersedes
//! with the full structure spec.md §4.1 calls for: convention, historical
//! byte count, interface byte presence, protocol list and a summary string.

use crate::model::CardProtocol;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    Direct,
    Inverse,
    Unknown(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtrInfo {
    pub convention: Convention,
    pub historical_byte_count: usize,
    /// Every protocol named by a TDi byte, in the order encountered.
    pub protocols: Vec<CardProtocol>,
    pub summary: String,
}

/// Parses an ATR byte sequence. Tolerant: truncated or historical-byte-free
/// ATRs still produce the information that could be recovered, never an
/// error (contactless cards in particular often carry minimal ATRs).
pub fn parse_atr(atr: &[u8]) -> AtrInfo {
    let convention = match atr.first() {
        Some(0x3B) => Convention::Direct,
        Some(0x3F) => Convention::Inverse,
        Some(other) => Convention::Unknown(*other),
        None => Convention::Unknown(0),
    };

    let mut protocols = Vec::new();
    let mut index = 1;

    let Some(&t0) = atr.get(index) else {
        return AtrInfo {
            convention,
            historical_byte_count: 0,
            protocols,
            summary: "empty ATR".to_string(),
        };
    };
    index += 1;
    let historical_byte_count = (t0 & 0x0F) as usize;
    let mut y = t0 >> 4;

    // Walk TDi chain: each group's Y nibble tells us which of TAi/TBi/TCi/TDi
    // follow; TDi's low nibble names the protocol for the *next* group and
    // its own Y nibble continues the chain.
    loop {
        if y & 0x1 != 0 {
            index += 1;
        } // TAi
        if y & 0x2 != 0 {
            index += 1;
        } // TBi
        if y & 0x4 != 0 {
            index += 1;
        } // TCi
        if y & 0x8 != 0 {
            let Some(&tdi) = atr.get(index) else { break };
            index += 1;
            protocols.push(protocol_from_nibble(tdi & 0x0F));
            y = tdi >> 4;
        } else {
            break;
        }
    }

    if protocols.is_empty() {
        // No TD bytes at all: ISO 7816 defaults to T=0.
        protocols.push(CardProtocol::T0);
    }

    let summary = format!(
        "{} convention, {} historical byte(s), protocol(s): {}",
        match convention {
            Convention::Direct => "direct",
            Convention::Inverse => "inverse",
            Convention::Unknown(_) => "unknown",
        },
        historical_byte_count,
        protocols
            .iter()
            .map(protocol_label)
            .collect::<Vec<_>>()
            .join(", ")
    );

    AtrInfo {
        convention,
        historical_byte_count,
        protocols,
        summary,
    }
}

fn protocol_from_nibble(nibble: u8) -> CardProtocol {
    match nibble {
        0x00 => CardProtocol::T0,
        0x01 => CardProtocol::T1,
        _ => CardProtocol::Unknown,
    }
}

fn protocol_label(p: &CardProtocol) -> &'static str {
    match p {
        CardProtocol::T0 => "T=0",
        CardProtocol::T1 => "T=1",
        CardProtocol::Unknown => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_direct_convention_t0_and_t1() {
        // 2018 Curve (UK, Gemalto) ATR, also used in liclac-cardinal's test.
        let atr = [
            0x3B, 0x8E, 0x80, 0x01, 0x80, 0x31, 0x80, 0x66, 0xB1, 0x84, 0x0C, 0x01, 0x6E, 0x01,
            0x83, 0x00, 0x90, 0x00, 0x1C,
        ];
        let info = parse_atr(&atr);
        assert_eq!(info.convention, Convention::Direct);
        assert_eq!(info.historical_byte_count, 14);
        assert_eq!(info.protocols, vec![CardProtocol::T0, CardProtocol::T1]);
    }

    #[test]
    fn empty_atr_does_not_panic() {
        let info = parse_atr(&[]);
        assert_eq!(info.historical_byte_count, 0);
    }

    #[test]
    fn missing_td_defaults_to_t0() {
        // TS + T0 with Y1=0 (no interface bytes at all), K=0.
        let info = parse_atr(&[0x3B, 0x00]);
        assert_eq!(info.protocols, vec![CardProtocol::T0]);
    }
}
