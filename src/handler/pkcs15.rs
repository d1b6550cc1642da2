//! PKCS#15 (ISO 7816-15) cryptographic token handler (spec.md §4.5).
//!
//! Only file navigation and raw record/binary access are implemented here;
//! decoding the ASN.1 DER object directory files is left to callers (the
//! BER-TLV codec parses the outer tag/length/value shape of DER too, since
//! DER is a canonical subset of BER).

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

const PKCS15_AID: [u8; 12] = [
    0xA0, 0x00, 0x00, 0x00, 0x63, 0x50, 0x4B, 0x43, 0x53, 0x2D, 0x31, 0x35,
];
const DIR_FILE: [u8; 2] = [0x2F, 0x00];

pub struct Pkcs15Handler;

fn select_pkcs15() -> Vec<u8> {
    let mut apdu = vec![0x00, 0xA4, 0x04, 0x00, PKCS15_AID.len() as u8];
    apdu.extend_from_slice(&PKCS15_AID);
    apdu.push(0x00);
    apdu
}

fn select_ef(file_id: &[u8; 2]) -> Vec<u8> {
    vec![0x00, 0xA4, 0x02, 0x0C, 0x02, file_id[0], file_id[1]]
}

fn read_binary(offset: u16, length: u8) -> Vec<u8> {
    vec![0x00, 0xB0, (offset >> 8) as u8, (offset & 0xFF) as u8, length]
}

fn read_record(record: u8, length: u8) -> Vec<u8> {
    vec![0x00, 0xB2, record, 0x04, length]
}

#[async_trait]
impl Handler for Pkcs15Handler {
    fn id(&self) -> &'static str {
        "pkcs15"
    }

    fn name(&self) -> &'static str {
        "PKCS#15"
    }

    fn description(&self) -> &'static str {
        "ISO 7816-15 / PKCS#15 cryptographic token application"
    }

    fn workflow(&self) -> Option<&'static str> {
        Some("pkcs15")
    }

    async fn detect(
        &self,
        _atr: &[u8],
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> DetectionResult {
        match send(select_pkcs15()).await {
            Ok(response) if is_sw_success(response.sw1) => {
                DetectionResult::detected(80, "pkcs15")
            }
            _ => DetectionResult::not_detected(),
        }
    }

    fn get_commands(&self, _metadata: Option<&HashMap<String, Value>>) -> Vec<CommandDescriptor> {
        vec![
            CommandDescriptor::new("select-pkcs15-application", "Select", "SELECT the PKCS#15 AID", "discovery"),
            CommandDescriptor::new("select-dir", "Select DIR", "SELECT EF(DIR), 2F00", "discovery"),
            CommandDescriptor::new("select-ef", "Select EF", "SELECT an elementary file by identifier", "discovery")
                .with_params(vec![
                    Parameter::new("fileId", ParameterKind::Hex, "2-byte file identifier").required()
                ]),
            CommandDescriptor::new("read-binary", "Read Binary", "READ BINARY on the currently selected EF", "file access")
                .with_params(vec![
                    Parameter::new("offset", ParameterKind::Number, "Byte offset").required(),
                    Parameter::new("length", ParameterKind::Number, "Number of bytes to read").required(),
                ]),
            CommandDescriptor::new("read-record", "Read Record", "READ RECORD on the currently selected EF", "file access")
                .with_params(vec![
                    Parameter::new("record", ParameterKind::Number, "Record number").required(),
                    Parameter::new("length", ParameterKind::Number, "Expected record length").required(),
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
            "select-pkcs15-application" => select_pkcs15(),
            "select-dir" => select_ef(&DIR_FILE),
            "select-ef" => {
                let file_id = require_hex(params, "fileId")?;
                let file_id: [u8; 2] = file_id
                    .try_into()
                    .map_err(|_| invalid("fileId", "must be exactly 2 bytes"))?;
                select_ef(&file_id)
            }
            "read-binary" => {
                let offset = require_number(params, "offset")? as u16;
                let length = require_number(params, "length")? as u8;
                read_binary(offset, length)
            }
            "read-record" => {
                let record = require_number(params, "record")? as u8;
                let length = require_number(params, "length")? as u8;
                read_record(record, length)
            }
            other => return Err(HandlerError::UnknownCommand(other.to_string())),
        };

        context.send_command(apdu).await
    }

    async fn interrogate(
        &self,
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> InterrogationResult {
        match send(select_pkcs15()).await {
            Ok(r) if is_sw_success(r.sw1) => {}
            Ok(r) => {
                return InterrogationResult::failed(format!(
                    "SELECT PKCS#15 returned {:02X}{:02X}",
                    r.sw1, r.sw2
                ))
            }
            Err(e) => return InterrogationResult::failed(e.to_string()),
        };

        let label = match send(select_ef(&DIR_FILE)).await {
            Ok(r) if is_sw_success(r.sw1) => Some("EF(DIR) selected".to_string()),
            _ => None,
        };

        InterrogationResult::ok(vec![DiscoveredApp {
            aid: bytes_to_hex(&PKCS15_AID),
            name: Some("PKCS#15".to_string()),
            label,
            priority: None,
            handler_id: "pkcs15".to_string(),
        }])
    }
}

fn require_hex(params: &super::CommandParameters, key: &str) -> Result<Vec<u8>, HandlerError> {
    let raw = params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(key, "required hex parameter missing"))?;
    hex_to_bytes(raw).map_err(|e| invalid(key, &e.to_string()))
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
    fn select_pkcs15_uses_registered_aid() {
        let apdu = select_pkcs15();
        assert_eq!(apdu[0..4], [0x00, 0xA4, 0x04, 0x00]);
        assert_eq!(apdu[5..5 + PKCS15_AID.len()], PKCS15_AID);
    }

    #[test]
    fn select_ef_uses_p1_p2_02_0c() {
        let apdu = select_ef(&DIR_FILE);
        assert_eq!(apdu, vec![0x00, 0xA4, 0x02, 0x0C, 0x02, 0x2F, 0x00]);
    }
}
