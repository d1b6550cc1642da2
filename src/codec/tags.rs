//! Human-readable EMV/ISO 7816 tag names (spec.md §4.1).
//!
//! Decoration is optional: `tag_name` returns `None` for anything not in the
//! table and callers pass the tag through unnamed. The entries below are
//! trimmed from the ~140-tag catalogue in
//! `examples/other_examples/8515aaaf_zedseven-pemv__src-emv-tlv_parsing-process_emv_tag.rs.rs`
//! down to the tags this crate's codec and handlers actually reference.

use once_cell::sync::Lazy;
use std::collections::HashMap;

static TAG_NAMES: Lazy<HashMap<u32, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (0x42, "ISSUER_IDENTIFICATION_NUMBER"),
        (0x4F, "AID"),
        (0x50, "APPLICATION_LABEL"),
        (0x57, "TRACK2_EQUIVALENT_DATA"),
        (0x5A, "PAN"),
        (0x5F20, "CARDHOLDER_NAME"),
        (0x5F24, "APPLICATION_EXPIRATION_DATE"),
        (0x5F25, "APPLICATION_EFFECTIVE_DATE"),
        (0x5F28, "ISSUER_COUNTRY_CODE"),
        (0x5F2A, "TRANSACTION_CURRENCY_CODE"),
        (0x5F2D, "LANGUAGE_PREFERENCE"),
        (0x5F30, "SERVICE_CODE"),
        (0x5F34, "PAN_SEQUENCE_NUMBER"),
        (0x61, "APPLICATION_TEMPLATE"),
        (0x6F, "FCI_TEMPLATE"),
        (0x70, "READ_RECORD_RESPONSE_TEMPLATE"),
        (0x77, "RESPONSE_MESSAGE_TEMPLATE_FORMAT_2"),
        (0x80, "RESPONSE_MESSAGE_TEMPLATE_FORMAT_1"),
        (0x81, "AMOUNT_AUTHORISED_BINARY"),
        (0x82, "APPLICATION_INTERCHANGE_PROFILE"),
        (0x83, "COMMAND_TEMPLATE"),
        (0x84, "DF_NAME"),
        (0x87, "APPLICATION_PRIORITY_INDICATOR"),
        (0x88, "SFI"),
        (0x8A, "AUTHORISATION_RESPONSE_CODE"),
        (0x8C, "CDOL1"),
        (0x8D, "CDOL2"),
        (0x8E, "CVM_LIST"),
        (0x8F, "CA_PUBLIC_KEY_INDEX_ICC"),
        (0x90, "ISSUER_PUBLIC_KEY_CERTIFICATE"),
        (0x92, "ISSUER_PUBLIC_KEY_REMAINDER"),
        (0x93, "SIGNED_STATIC_APPLICATION_DATA"),
        (0x94, "AFL"),
        (0x95, "TERMINAL_VERIFICATION_RESULTS"),
        (0x9A, "TRANSACTION_DATE"),
        (0x9B, "TRANSACTION_STATUS_INFORMATION"),
        (0x9C, "TRANSACTION_TYPE"),
        (0x9D, "DDF_NAME"),
        (0x9F02, "AUTH_AMOUNT_NUM"),
        (0x9F03, "AMOUNT_OTHER_NUM"),
        (0x9F06, "AID_TERMINAL"),
        (0x9F07, "APPLICATION_USAGE_CONTROL"),
        (0x9F08, "APPLICATION_VERSION_NUMBER_ICC"),
        (0x9F0D, "ISSUER_ACTION_CODE_DEFAULT"),
        (0x9F0E, "ISSUER_ACTION_CODE_DENIAL"),
        (0x9F0F, "ISSUER_ACTION_CODE_ONLINE"),
        (0x9F10, "ISSUER_APPLICATION_DATA"),
        (0x9F12, "APPLICATION_PREFERRED_NAME"),
        (0x9F1A, "TERMINAL_COUNTRY_CODE"),
        (0x9F17, "PIN_TRY_COUNTER"),
        (0x9F1C, "TERMINAL_ID"),
        (0x9F21, "TRANSACTION_TIME"),
        (0x9F26, "APPLICATION_CRYPTOGRAM"),
        (0x9F27, "CID"),
        (0x9F32, "ISSUER_PUBLIC_KEY_EXPONENT"),
        (0x9F33, "TERMINAL_CAPABILITIES"),
        (0x9F34, "CVM_RESULTS"),
        (0x9F35, "TERMINAL_TYPE"),
        (0x9F36, "ATC"),
        (0x9F37, "UNPREDICTABLE_NUMBER"),
        (0x9F38, "PDOL"),
        (0x9F40, "ADDITIONAL_TERMINAL_CAPABILITIES"),
        (0x9F42, "APPLICATION_CURRENCY_CODE"),
        (0xA5, "FCI_PROPRIETARY_TEMPLATE"),
        (0xBF0C, "FCI_ISSUER_DISCRETIONARY_DATA"),
    ])
});

/// Looks up a human-readable name for a BER-TLV tag. Returns `None` for
/// unrecognised tags; the caller passes them through undecorated.
pub fn tag_name(tag: u32) -> Option<&'static str> {
    TAG_NAMES.get(&tag).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags_resolve() {
        assert_eq!(tag_name(0x5A), Some("PAN"));
        assert_eq!(tag_name(0x9F02), Some("AUTH_AMOUNT_NUM"));
    }

    #[test]
    fn unknown_tags_pass_through_unnamed() {
        assert_eq!(tag_name(0x1234_5678), None);
    }
}
