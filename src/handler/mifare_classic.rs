//! MIFARE Classic handler, addressed with PC/SC pseudo-APDUs (spec.md §4.5).
//!
//! MIFARE Classic has no native ISO 7816 command set; readers expose it
//! through the PC/SC Part 3 pseudo-APDU convention (class `FF`) instead.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::codec::{bytes_to_hex, hex_to_bytes, is_sw_success};
use crate::error::HandlerError;
use crate::transport::Response;

use super::{
    BoxedSend, CommandContext, CommandDescriptor, DetectionResult, DiscoveredApp, Handler,
    InterrogationResult, Parameter, ParameterKind,
};

pub struct MifareClassicHandler;

fn get_uid() -> Vec<u8> {
    vec![0xFF, 0xCA, 0x00, 0x00, 0x00]
}

fn load_authentication_key(slot: u8, key: &[u8; 6]) -> Vec<u8> {
    let mut apdu = vec![0xFF, 0x82, 0x00, slot, 0x06];
    apdu.extend_from_slice(key);
    apdu
}

fn authenticate(block: u8, key_type: KeyType, slot: u8) -> Vec<u8> {
    vec![0xFF, 0x86, 0x00, 0x00, 0x05, 0x01, 0x00, block, key_type.byte(), slot]
}

fn read_block(block: u8, length: u8) -> Vec<u8> {
    vec![0xFF, 0xB0, 0x00, block, length]
}

fn write_block(block: u8, data: &[u8]) -> Vec<u8> {
    let mut apdu = vec![0xFF, 0xD6, 0x00, block, data.len() as u8];
    apdu.extend_from_slice(data);
    apdu
}

#[derive(Debug, Clone, Copy)]
enum KeyType {
    A,
    B,
}

impl KeyType {
    fn byte(self) -> u8 {
        match self {
            KeyType::A => 0x60,
            KeyType::B => 0x61,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_uppercase().as_str() {
            "A" => Some(KeyType::A),
            "B" => Some(KeyType::B),
            _ => None,
        }
    }
}

/// A 16-byte block is a MIFARE value block iff its value is stored twice
/// (once inverted) and its address byte is stored twice inverted too:
/// `bytes[0..4] == bytes[8..12]` and `bytes[4..8]` is `bytes[0..4]` inverted
/// (spec.md §4.5). Returns the little-endian value on a match.
fn parse_value_block(bytes: &[u8; 16]) -> Option<i32> {
    let value = &bytes[0..4];
    let inverted = &bytes[4..8];
    let value_repeat = &bytes[8..12];
    if value != value_repeat {
        return None;
    }
    if !inverted.iter().zip(value).all(|(inv, v)| *inv == !v) {
        return None;
    }
    Some(i32::from_le_bytes(value.try_into().unwrap()))
}

/// PC/SC historical bytes commonly emitted for Mifare Classic 1K/4K ATRs
/// (final two bytes `00 01` or `00 02`), used as a weak ATR-only fallback
/// when the reader cannot be probed for a UID yet.
fn atr_suggests_mifare_classic(atr: &[u8]) -> bool {
    atr.len() >= 2 && matches!(&atr[atr.len() - 2..], [0x00, 0x01] | [0x00, 0x02])
}

#[async_trait]
impl Handler for MifareClassicHandler {
    fn id(&self) -> &'static str {
        "mifare-classic"
    }

    fn name(&self) -> &'static str {
        "MIFARE Classic"
    }

    fn description(&self) -> &'static str {
        "MIFARE Classic 1K/4K memory card, addressed via PC/SC pseudo-APDUs"
    }

    fn workflow(&self) -> Option<&'static str> {
        Some("mifare-classic")
    }

    async fn detect(
        &self,
        atr: &[u8],
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> DetectionResult {
        match send(get_uid()).await {
            Ok(response) if is_sw_success(response.sw1) && !response.data.is_empty() => {
                return DetectionResult::detected(85, "mifare-classic")
                    .with_metadata("uid", bytes_to_hex(&response.data));
            }
            _ => {}
        }

        if atr_suggests_mifare_classic(atr) {
            return DetectionResult::detected(30, "mifare-classic");
        }

        DetectionResult::not_detected()
    }

    fn get_commands(&self, _metadata: Option<&HashMap<String, Value>>) -> Vec<CommandDescriptor> {
        vec![
            CommandDescriptor::new("get-uid", "Get UID", "Retrieve the card's UID", "discovery"),
            CommandDescriptor::new(
                "load-authentication-key",
                "Load Authentication Key",
                "Load a 6-byte key into a reader key slot",
                "security",
            )
            .with_params(vec![
                Parameter::new("slot", ParameterKind::Number, "Reader key slot, 0 or 1").required(),
                Parameter::new("key", ParameterKind::Hex, "6-byte key").required(),
            ]),
            CommandDescriptor::new("authenticate", "Authenticate", "Authenticate a sector with a loaded key", "security")
                .with_params(vec![
                    Parameter::new("block", ParameterKind::Number, "Block number").required(),
                    Parameter::new(
                        "keyType",
                        ParameterKind::Select {
                            options: vec!["A".into(), "B".into()],
                        },
                        "Key A or key B",
                    )
                    .required(),
                    Parameter::new("slot", ParameterKind::Number, "Reader key slot used in load-authentication-key")
                        .required(),
                ]),
            CommandDescriptor::new("read-block", "Read Block", "Read a 16-byte block", "file access")
                .with_params(vec![
                    Parameter::new("block", ParameterKind::Number, "Block number").required()
                ]),
            CommandDescriptor::new("write-block", "Write Block", "Write a 16-byte block", "file access")
                .destructive()
                .with_params(vec![
                    Parameter::new("block", ParameterKind::Number, "Block number").required(),
                    Parameter::new("data", ParameterKind::Hex, "16 bytes to write").required(),
                ]),
        ]
    }

    async fn execute_command(
        &self,
        command_id: &str,
        context: &mut CommandContext<'_>,
    ) -> Result<Response, HandlerError> {
        let params = &context.parameters;
        let apdu = match command_id {
            "get-uid" => get_uid(),
            "load-authentication-key" => {
                let slot = require_number(params, "slot")? as u8;
                let key = require_hex(params, "key")?;
                let key: [u8; 6] = key
                    .try_into()
                    .map_err(|_| invalid("key", "must be exactly 6 bytes"))?;
                load_authentication_key(slot, &key)
            }
            "authenticate" => {
                let block = require_number(params, "block")? as u8;
                let key_type = KeyType::parse(&require_string(params, "keyType")?)
                    .ok_or_else(|| invalid("keyType", "must be A or B"))?;
                let slot = require_number(params, "slot")? as u8;
                authenticate(block, key_type, slot)
            }
            "read-block" => {
                let block = require_number(params, "block")? as u8;
                let response = context.send_command(read_block(block, 16)).await?;
                if let Ok(bytes) = <[u8; 16]>::try_from(response.data.as_slice()) {
                    if let Some(value) = parse_value_block(&bytes) {
                        context
                            .state
                            .extra
                            .insert("lastValueBlock".to_string(), Value::from(value));
                    }
                }
                return Ok(response);
            }
            "write-block" => {
                let block = require_number(params, "block")? as u8;
                let data = require_hex(params, "data")?;
                write_block(block, &data)
            }
            other => return Err(HandlerError::UnknownCommand(other.to_string())),
        };

        context.send_command(apdu).await
    }

    async fn interrogate(
        &self,
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> InterrogationResult {
        match send(get_uid()).await {
            Ok(r) if is_sw_success(r.sw1) => InterrogationResult::ok(vec![DiscoveredApp {
                aid: bytes_to_hex(&r.data),
                name: Some("MIFARE Classic".to_string()),
                label: Some("UID".to_string()),
                priority: None,
                handler_id: "mifare-classic".to_string(),
            }]),
            Ok(r) => InterrogationResult::failed(format!(
                "Get UID returned {:02X}{:02X}",
                r.sw1, r.sw2
            )),
            Err(e) => InterrogationResult::failed(e.to_string()),
        }
    }
}

fn require_hex(params: &super::CommandParameters, key: &str) -> Result<Vec<u8>, HandlerError> {
    let raw = params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(key, "required hex parameter missing"))?;
    hex_to_bytes(raw).map_err(|e| invalid(key, &e.to_string()))
}

fn require_string(params: &super::CommandParameters, key: &str) -> Result<String, HandlerError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| invalid(key, "required string parameter missing"))
}

fn require_number(params: &super::CommandParameters, key: &str) -> Result<u64, HandlerError> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| invalid(key, "required numeric parameter missing"))
}

fn invalid(name: &str, detail: &str) -> HandlerError {
    HandlerError::InvalidParameter {
        name: name.to_string(),
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_uid_is_the_ff_ca_pseudo_apdu() {
        assert_eq!(get_uid(), vec![0xFF, 0xCA, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn authenticate_encodes_key_type_byte() {
        assert_eq!(authenticate(4, KeyType::A, 0).last(), Some(&0));
        assert_eq!(authenticate(4, KeyType::A, 0)[8], 0x60);
        assert_eq!(authenticate(4, KeyType::B, 0)[8], 0x61);
    }

    #[test]
    fn parse_value_block_recognises_the_triple_redundant_encoding() {
        let mut block = [0u8; 16];
        block[0..4].copy_from_slice(&100i32.to_le_bytes());
        block[4..8].copy_from_slice(&(!100i32).to_le_bytes());
        block[8..12].copy_from_slice(&100i32.to_le_bytes());
        assert_eq!(parse_value_block(&block), Some(100));
    }

    #[test]
    fn parse_value_block_rejects_plain_data() {
        let block = [0xAAu8; 16];
        assert_eq!(parse_value_block(&block), None);
    }

    #[test]
    fn atr_suffix_heuristic_matches_1k_and_4k() {
        assert!(atr_suggests_mifare_classic(&[0x3B, 0x00, 0x01]));
        assert!(atr_suggests_mifare_classic(&[0x3B, 0x00, 0x02]));
        assert!(!atr_suggests_mifare_classic(&[0x3B, 0x00, 0x03]));
    }
}
