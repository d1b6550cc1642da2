//! BER-TLV parser/emitter (spec.md §4.1, §8).
//!
//! Tolerant by design: a length that overruns the remaining buffer is
//! truncated rather than rejected, because real cards routinely return
//! slightly malformed data (spec.md §4.1). `parse_tlv` therefore never fails.

use serde::{Deserialize, Serialize};

use super::tags::tag_name;

/// A node in a BER-TLV tree. Constructed nodes hold child nodes; primitive
/// nodes hold raw bytes. `is_constructed` and the shape of `value` always
/// agree (spec.md §3 invariant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlvNode {
    pub tag: u32,
    pub tag_hex: String,
    pub length: usize,
    pub is_constructed: bool,
    pub value: TlvValue,
    #[serde(skip)]
    pub description: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlvValue {
    Primitive(Vec<u8>),
    Constructed(Vec<TlvNode>),
}

impl TlvNode {
    /// Raw bytes for a primitive node, `None` for a constructed one.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.value {
            TlvValue::Primitive(b) => Some(b),
            TlvValue::Constructed(_) => None,
        }
    }

    /// Child nodes for a constructed node, `None` for a primitive one.
    pub fn children(&self) -> Option<&[TlvNode]> {
        match &self.value {
            TlvValue::Constructed(c) => Some(c),
            TlvValue::Primitive(_) => None,
        }
    }
}

/// Parses a byte sequence into an ordered list of top-level TLV nodes.
/// Empty input produces an empty list (spec.md §8).
pub fn parse_tlv(data: &[u8]) -> Vec<TlvNode> {
    let mut nodes = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        match parse_one(data, offset) {
            Some((node, next)) => {
                nodes.push(node);
                offset = next;
            }
            None => break,
        }
    }
    nodes
}

fn parse_one(data: &[u8], start: usize) -> Option<(TlvNode, usize)> {
    let (tag, is_constructed, mut offset) = parse_tag(data, start)?;
    let (length, value_offset) = parse_length(data, offset)?;
    offset = value_offset;

    let available = data.len().saturating_sub(offset);
    let actual_length = length.min(available);
    let value_bytes = &data[offset..offset + actual_length];
    let next_offset = offset + actual_length;

    let tag_hex = tag_to_hex(tag);
    let value = if is_constructed {
        TlvValue::Constructed(parse_tlv(value_bytes))
    } else {
        TlvValue::Primitive(value_bytes.to_vec())
    };

    Some((
        TlvNode {
            tag,
            description: tag_name(tag),
            tag_hex,
            length: actual_length,
            is_constructed,
            value,
        },
        next_offset,
    ))
}

/// Returns `(tag, is_constructed, offset_after_tag)`.
fn parse_tag(data: &[u8], start: usize) -> Option<(u32, bool, usize)> {
    let first = *data.get(start)?;
    let is_constructed = first & 0x20 != 0;
    let mut tag = first as u32;
    let mut offset = start + 1;

    if first & 0x1F == 0x1F {
        loop {
            let b = *data.get(offset)?;
            tag = (tag << 8) | b as u32;
            offset += 1;
            if b & 0x80 == 0 {
                break;
            }
        }
    }

    Some((tag, is_constructed, offset))
}

/// Returns `(length, offset_after_length)`.
fn parse_length(data: &[u8], start: usize) -> Option<(usize, usize)> {
    let first = *data.get(start)?;
    if first & 0x80 == 0 {
        return Some((first as usize, start + 1));
    }

    let count = (first & 0x7F) as usize;
    if count == 0 {
        // Indefinite form; not used by card protocols in scope, treat as
        // "rest of buffer" tolerantly rather than failing.
        return Some((data.len() - (start + 1), start + 1));
    }

    let mut offset = start + 1;
    let mut length = 0usize;
    for _ in 0..count {
        let b = *data.get(offset)?;
        length = (length << 8) | b as usize;
        offset += 1;
    }
    Some((length, offset))
}

/// Parses a single BER tag (no length/value), for DOL entries which are
/// `tag length` pairs with no value bytes. Returns `(tag, offset_after_tag)`.
pub fn parse_tag_for_dol(data: &[u8], start: usize) -> Option<(u32, usize)> {
    parse_tag(data, start).map(|(tag, _, offset)| (tag, offset))
}

fn tag_to_hex(tag: u32) -> String {
    if tag <= 0xFF {
        format!("{:02X}", tag)
    } else if tag <= 0xFFFF {
        format!("{:04X}", tag)
    } else {
        format!("{:06X}", tag)
    }
}

/// Depth-first search for the first node with the given tag.
pub fn find(nodes: &[TlvNode], tag: u32) -> Option<&TlvNode> {
    for node in nodes {
        if node.tag == tag {
            return Some(node);
        }
        if let Some(children) = node.children() {
            if let Some(found) = find(children, tag) {
                return Some(found);
            }
        }
    }
    None
}

/// Depth-first search returning every match, in document order.
pub fn find_all(nodes: &[TlvNode], tag: u32) -> Vec<&TlvNode> {
    let mut out = Vec::new();
    find_all_into(nodes, tag, &mut out);
    out
}

fn find_all_into<'a>(nodes: &'a [TlvNode], tag: u32, out: &mut Vec<&'a TlvNode>) {
    for node in nodes {
        if node.tag == tag {
            out.push(node);
        }
        if let Some(children) = node.children() {
            find_all_into(children, tag, out);
        }
    }
}

/// Re-emits a parsed tree to bytes. For any valid BER-TLV input `B`,
/// `emit(parse_tlv(B)) == B` (spec.md §8).
pub fn emit(nodes: &[TlvNode]) -> Vec<u8> {
    let mut out = Vec::new();
    for node in nodes {
        emit_tag(node.tag, &mut out);
        let value_bytes = match &node.value {
            TlvValue::Primitive(bytes) => bytes.clone(),
            TlvValue::Constructed(children) => emit(children),
        };
        emit_length(value_bytes.len(), &mut out);
        out.extend_from_slice(&value_bytes);
    }
    out
}

fn emit_tag(tag: u32, out: &mut Vec<u8>) {
    let bytes_needed = if tag <= 0xFF {
        1
    } else if tag <= 0xFFFF {
        2
    } else {
        3
    };
    for i in (0..bytes_needed).rev() {
        out.push(((tag >> (8 * i)) & 0xFF) as u8);
    }
}

fn emit_length(length: usize, out: &mut Vec<u8>) {
    if length <= 0x7F {
        out.push(length as u8);
        return;
    }
    let mut bytes = Vec::new();
    let mut remaining = length;
    while remaining > 0 {
        bytes.push((remaining & 0xFF) as u8);
        remaining >>= 8;
    }
    bytes.reverse();
    out.push(0x80 | bytes.len() as u8);
    out.extend_from_slice(&bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_empty_list() {
        assert!(parse_tlv(&[]).is_empty());
    }

    #[test]
    fn overrunning_length_truncates_tolerantly() {
        let nodes = parse_tlv(&[0x80, 0x05, 0x01]);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].bytes(), Some(&[0x01][..]));
        assert_eq!(nodes[0].length, 1);
    }

    #[test]
    fn parses_constructed_application_template() {
        // 61 0F 4F 07 A0000000041010 50 04 56495341
        let mut bytes = vec![0x61, 0x0F, 0x4F, 0x07];
        bytes.extend_from_slice(&[0xA0, 0x00, 0x00, 0x00, 0x04, 0x10, 0x10]);
        bytes.extend_from_slice(&[0x50, 0x04]);
        bytes.extend_from_slice(b"VISA");

        let nodes = parse_tlv(&bytes);
        assert_eq!(nodes.len(), 1);
        let template = &nodes[0];
        assert_eq!(template.tag, 0x61);
        assert!(template.is_constructed);
        let children = template.children().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].tag, 0x4F);
        assert_eq!(
            children[0].bytes(),
            Some(&[0xA0, 0x00, 0x00, 0x00, 0x04, 0x10, 0x10][..])
        );
        assert_eq!(children[1].tag, 0x50);
        assert_eq!(children[1].bytes(), Some(b"VISA".as_slice()));
    }

    #[test]
    fn round_trips_multi_byte_tag_and_long_length() {
        let mut long_value = vec![0xAAu8; 200];
        let mut inner = Vec::new();
        inner.push(0x9F);
        inner.push(0x37); // 9F37 multi-byte tag
        inner.push(0x81); // long-form length, 1 following byte
        inner.push(200);
        inner.append(&mut long_value);

        let nodes = parse_tlv(&inner);
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].tag, 0x9F37);
        assert_eq!(nodes[0].length, 200);
        assert_eq!(emit(&nodes), inner);
    }

    #[test]
    fn find_and_find_all_are_depth_first() {
        let mut bytes = vec![0x70, 0x08]; // constructed record template
        bytes.extend_from_slice(&[0x5A, 0x02, 0x12, 0x34]);
        bytes.extend_from_slice(&[0x5A, 0x02, 0x56, 0x78]);
        let nodes = parse_tlv(&bytes);
        assert_eq!(find(&nodes, 0x5A).unwrap().bytes(), Some(&[0x12, 0x34][..]));
        assert_eq!(find_all(&nodes, 0x5A).len(), 2);
    }
}
