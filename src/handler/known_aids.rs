//! Known EMV AID → human-readable name table (spec.md §4.4: "~25 entries").

use once_cell::sync::Lazy;
use std::collections::HashMap;

static KNOWN_AIDS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("A0000000031010", "Visa Credit/Debit"),
        ("A0000000032010", "Visa Electron"),
        ("A0000000032020", "Visa V Pay"),
        ("A0000000033010", "Visa Interlink"),
        ("A0000000980840", "Visa Common Debit"),
        ("A0000000041010", "Mastercard Credit/Debit"),
        ("A0000000042203", "Mastercard Maestro (US)"),
        ("A0000000043060", "Mastercard Maestro"),
        ("A0000000044030", "Mastercard Cirrus"),
        ("A0000000046000", "Mastercard Cash"),
        ("A00000002501", "Amex"),
        ("A000000025010402", "American Express"),
        ("A0000001523010", "Discover"),
        ("A0000001524010", "Discover Zip"),
        ("A0000003241010", "Discover Common Debit"),
        ("A0000000651010", "JCB"),
        ("A0000002771010", "Interac"),
        ("A0000003330101", "UnionPay Debit"),
        ("A0000003330102", "UnionPay Credit"),
        ("A0000003330103", "UnionPay Quasi Credit"),
        ("A0000005241010", "RuPay"),
        ("A0000003159010", "Diners Club / Discover"),
        ("A0000006200", "Girocard"),
        ("A0000003159010101001", "Diners Club International"),
        ("D27600012401", "OpenPGP"),
        ("A000000308000010000100", "PIV"),
        ("A0000006472F0001", "FIDO U2F"),
    ])
});

/// Looks up a human-readable name for a 7816-style hex AID. Case-sensitive
/// on the canonical upper-case hex form the caller is expected to pass.
pub fn known_aid_name(aid_hex: &str) -> Option<&'static str> {
    KNOWN_AIDS.get(aid_hex.to_uppercase().as_str()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_visa_and_mastercard() {
        assert_eq!(known_aid_name("a0000000041010"), Some("Mastercard Credit/Debit"));
        assert_eq!(known_aid_name("A0000000031010"), Some("Visa Credit/Debit"));
    }

    #[test]
    fn unknown_aid_is_none() {
        assert_eq!(known_aid_name("FFFFFFFFFFFFFF"), None);
    }

    #[test]
    fn maestro_resolves_without_being_shadowed_by_a_duplicate_key() {
        assert_eq!(known_aid_name("A0000000043060"), Some("Mastercard Maestro"));
    }

    #[test]
    fn no_two_entries_share_an_aid() {
        let mut aids: Vec<&str> = KNOWN_AIDS.keys().copied().collect();
        let before = aids.len();
        aids.sort_unstable();
        aids.dedup();
        assert_eq!(aids.len(), before, "duplicate AID key found in KNOWN_AIDS");
    }
}
