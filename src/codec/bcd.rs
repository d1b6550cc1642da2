//! Hex string surface forms and BCD helpers (spec.md §4.1, §6).

use crate::error::CodecError;

/// Strips `0x` prefixes, commas and whitespace, keeping only hex-digit
/// pairs, per spec.md §6's hex string format.
pub fn clean_hex_input(input: &str) -> String {
    input
        .replace("0x", "")
        .replace("0X", "")
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect()
}

/// Decodes a (possibly decorated) hex string into bytes. Odd length after
/// cleaning is an error (spec.md §6).
pub fn hex_to_bytes(input: &str) -> Result<Vec<u8>, CodecError> {
    let cleaned = clean_hex_input(input);
    if cleaned.len() % 2 != 0 {
        return Err(CodecError::OddLengthHex);
    }
    hex::decode(&cleaned).map_err(|e| CodecError::InvalidHex(e.to_string()))
}

/// Upper-case hex, no separators.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Encodes an amount (in minor currency units) as 6-byte big-endian BCD,
/// e.g. `12345 -> 00 00 00 01 23 45` (spec.md §4.1).
pub fn amount_to_bcd(amount: u64) -> [u8; 6] {
    let digits = format!("{:012}", amount % 1_000_000_000_000);
    let mut out = [0u8; 6];
    let bytes = digits.as_bytes();
    for i in 0..6 {
        let hi = bytes[i * 2] - b'0';
        let lo = bytes[i * 2 + 1] - b'0';
        out[i] = (hi << 4) | lo;
    }
    out
}

/// Encodes a date as 3-byte BCD `YY MM DD`, two-digit year modulo 100.
pub fn date_to_bcd(year: u32, month: u32, day: u32) -> [u8; 3] {
    let yy = (year % 100) as u8;
    [bcd_byte(yy), bcd_byte(month as u8), bcd_byte(day as u8)]
}

fn bcd_byte(value: u8) -> u8 {
    let hi = (value / 10) % 10;
    let lo = value % 10;
    (hi << 4) | lo
}

/// Packs a numeric PIN two digits per byte, padding the final nibble with
/// `F` when the PIN has an odd number of digits.
pub fn pin_to_bcd(pin: &str) -> Vec<u8> {
    let digits: Vec<u8> = pin.bytes().filter(|b| b.is_ascii_digit()).collect();
    let mut out = Vec::with_capacity(digits.len().div_ceil(2));
    let mut chunks = digits.chunks(2);
    for chunk in &mut chunks {
        let hi = chunk[0] - b'0';
        let lo = if chunk.len() == 2 { chunk[1] - b'0' } else { 0xF };
        out.push((hi << 4) | lo);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_decorated_hex() {
        assert_eq!(clean_hex_input("0x00, A4 04 00"), "00A40400");
    }

    #[test]
    fn odd_length_is_an_error() {
        assert_eq!(hex_to_bytes("ABC").unwrap_err(), CodecError::OddLengthHex);
    }

    #[test]
    fn hex_bijection() {
        let h = "00A4040E315041592E5359532E4444463031"; // SELECT 1PAY.SYS.DDF01
        let bytes = hex_to_bytes(h).unwrap();
        assert_eq!(bytes_to_hex(&bytes), h.to_uppercase());
        assert_eq!(hex_to_bytes(&bytes_to_hex(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn amount_encodes_as_padded_bcd() {
        assert_eq!(amount_to_bcd(12345), [0x00, 0x00, 0x00, 0x01, 0x23, 0x45]);
    }

    #[test]
    fn date_encodes_year_modulo_100() {
        assert_eq!(date_to_bcd(2026, 8, 1), [0x26, 0x08, 0x01]);
    }

    #[test]
    fn pin_pads_with_f_nibble() {
        assert_eq!(pin_to_bcd("1234"), vec![0x12, 0x34]);
        assert_eq!(pin_to_bcd("123"), vec![0x12, 0x3F]);
    }
}
