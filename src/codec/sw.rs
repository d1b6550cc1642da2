//! Status-word interpretation (spec.md §4.1, §8).

/// `true` iff `sw1` is `0x90` (normal) or `0x61` (more data available)
/// (spec.md §8).
pub fn is_sw_success(sw1: u8) -> bool {
    matches!(sw1, 0x90 | 0x61)
}

/// Short human description for a `(sw1, sw2)` pair, falling back to
/// `sw1`-range entries (`61xx`, `6Cxx`, …) before giving up.
pub fn sw_description(sw1: u8, sw2: u8) -> String {
    match (sw1, sw2) {
        (0x90, 0x00) => "Normal processing".to_string(),
        (0x63, 0x00) => "Authentication failed".to_string(),
        (0x69, 0x82) => "Security status not satisfied".to_string(),
        (0x69, 0x83) => "Authentication method blocked".to_string(),
        (0x69, 0x84) => "Referenced data invalidated".to_string(),
        (0x69, 0x85) => "Conditions of use not satisfied".to_string(),
        (0x69, 0x86) => "Command not allowed (no current EF)".to_string(),
        (0x6A, 0x80) => "Incorrect parameters in data field".to_string(),
        (0x6A, 0x81) => "Function not supported".to_string(),
        (0x6A, 0x82) => "File not found".to_string(),
        (0x6A, 0x83) => "Record not found".to_string(),
        (0x6A, 0x84) => "Not enough memory space".to_string(),
        (0x6A, 0x86) => "Wrong P1/P2".to_string(),
        (0x6A, 0x88) => "Referenced data not found".to_string(),
        (0x6D, 0x00) => "Instruction code not supported or invalid".to_string(),
        (0x6E, 0x00) => "Class not supported".to_string(),
        (0x6F, 0x00) => "No precise diagnosis".to_string(),
        (0x67, 0x00) => "Wrong length".to_string(),
        _ => match sw1 {
            0x61 => format!("Normal, {} more byte(s) available", sw2),
            0x6C => format!("Wrong length; correct length is {}", sw2),
            0x63 if sw2 & 0xF0 == 0xC0 => {
                format!("Verification failed, {} tries remaining", sw2 & 0x0F)
            }
            0x90 => "Normal processing".to_string(),
            _ => format!("Unrecognised status word {:02X}{:02X}", sw1, sw2),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_90_or_61() {
        for sw1 in 0u8..=255 {
            assert_eq!(is_sw_success(sw1), sw1 == 0x90 || sw1 == 0x61);
        }
    }

    #[test]
    fn known_entries_resolve() {
        assert_eq!(sw_description(0x90, 0x00), "Normal processing");
        assert_eq!(sw_description(0x61, 0x0A), "Normal, 10 more byte(s) available");
        assert_eq!(
            sw_description(0x6C, 0x05),
            "Wrong length; correct length is 5"
        );
        assert_eq!(sw_description(0x6A, 0x82), "File not found");
        assert_eq!(sw_description(0x6A, 0x86), "Wrong P1/P2");
        assert_eq!(sw_description(0x69, 0x85), "Conditions of use not satisfied");
    }
}
