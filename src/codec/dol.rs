//! Data Object List parse/build and AFL parse (spec.md §4.1, §8).

use std::collections::HashMap;

use super::tlv::parse_tag_for_dol;

/// One `tag length` pair from a PDOL/CDOL entry list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DolEntry {
    pub tag: u32,
    pub length: usize,
}

/// Parses a DOL: a byte sequence of `tag length` pairs, no values
/// (spec.md §4.1). Tags are parsed with the same BER tag rule as TLV.
pub fn parse_dol(data: &[u8]) -> Vec<DolEntry> {
    let mut entries = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let Some((tag, next)) = parse_tag_for_dol(data, offset) else {
            break;
        };
        let Some(&length_byte) = data.get(next) else {
            break;
        };
        entries.push(DolEntry {
            tag,
            length: length_byte as usize,
        });
        offset = next + 1;
    }
    entries
}

/// Builds the concatenated value for a DOL entry list, given a tag->bytes
/// map. Missing tags are zero-padded; present values are right-truncated or
/// left-zero-padded to the declared length (spec.md §4.1, §8:
/// `|build(entries, values)| == sum(entry.length)`).
pub fn build_dol(entries: &[DolEntry], values: &HashMap<u32, Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.iter().map(|e| e.length).sum());
    for entry in entries {
        let mut field = vec![0u8; entry.length];
        if let Some(value) = values.get(&entry.tag) {
            if value.len() >= entry.length {
                // Right-truncate: keep the trailing `length` bytes.
                field.copy_from_slice(&value[value.len() - entry.length..]);
            } else {
                // Left-zero-pad.
                let pad = entry.length - value.len();
                field[pad..].copy_from_slice(value);
            }
        }
        out.extend_from_slice(&field);
    }
    out
}

/// One entry of a parsed Application File Locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AflEntry {
    pub sfi: u8,
    pub first_record: u8,
    pub last_record: u8,
    pub offline_data_auth_records: u8,
}

/// Parses an AFL: every four bytes become one entry. A length that is not a
/// multiple of four yields an empty list (spec.md §4.1, §8).
pub fn parse_afl(data: &[u8]) -> Vec<AflEntry> {
    if data.is_empty() || data.len() % 4 != 0 {
        return Vec::new();
    }
    data.chunks_exact(4)
        .map(|chunk| AflEntry {
            sfi: extract_sfi_from_afl_byte(chunk[0]),
            first_record: chunk[1],
            last_record: chunk[2],
            offline_data_auth_records: chunk[3],
        })
        .collect()
}

/// `extractSfiFromAflByte(x) == x >> 3` for all `x` (spec.md §8).
pub fn extract_sfi_from_afl_byte(byte: u8) -> u8 {
    byte >> 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dol_entries() {
        // PDOL: 9F02/06, 5F2A/02
        let data = [0x9F, 0x02, 0x06, 0x5F, 0x2A, 0x02];
        let entries = parse_dol(&data);
        assert_eq!(
            entries,
            vec![
                DolEntry { tag: 0x9F02, length: 6 },
                DolEntry { tag: 0x5F2A, length: 2 },
            ]
        );
    }

    #[test]
    fn build_dol_produces_declared_total_length() {
        let entries = vec![
            DolEntry { tag: 0x9F02, length: 6 },
            DolEntry { tag: 0x5F2A, length: 2 },
        ];
        let mut values = HashMap::new();
        values.insert(0x9F02, vec![0x00, 0x00, 0x00, 0x01, 0x23, 0x45]);
        let built = build_dol(&entries, &values);
        assert_eq!(built.len(), 8);
        assert_eq!(&built[0..6], &[0x00, 0x00, 0x00, 0x01, 0x23, 0x45]);
        assert_eq!(&built[6..8], &[0x00, 0x00]); // missing tag -> zero padding
    }

    #[test]
    fn build_dol_truncates_oversized_values() {
        let entries = vec![DolEntry { tag: 0x9F37, length: 2 }];
        let mut values = HashMap::new();
        values.insert(0x9F37, vec![0xAA, 0xBB, 0xCC]);
        assert_eq!(build_dol(&entries, &values), vec![0xBB, 0xCC]);
    }

    #[test]
    fn afl_parse_scenario() {
        // GPO tag 94: 08 01 03 02 -> sfi=1, first=1, last=3, offline=2
        let afl = parse_afl(&[0x08, 0x01, 0x03, 0x02]);
        assert_eq!(
            afl,
            vec![AflEntry {
                sfi: 1,
                first_record: 1,
                last_record: 3,
                offline_data_auth_records: 2,
            }]
        );
    }

    #[test]
    fn afl_parse_non_multiple_of_four_is_empty() {
        assert!(parse_afl(&[0x08, 0x01, 0x03]).is_empty());
    }

    #[test]
    fn extract_sfi_matches_shift() {
        for x in 0u8..=255 {
            assert_eq!(extract_sfi_from_afl_byte(x), x >> 3);
        }
    }
}
