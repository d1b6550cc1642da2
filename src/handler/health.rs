//! Health insurance smart-card handler (spec.md §4.5).
//!
//! Covers the SELECT-then-read-binary shape shared by European health
//! insurance cards (e.g. the German elektronische Gesundheitskarte). No
//! cryptographic authentication is performed (spec.md §1 Non-goals).

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

const KNOWN_HEALTH_AIDS: &[(&[u8], &str)] = &[
    (&[0xD2, 0x76, 0x00, 0x01, 0x02], "German eGK (HCA)"),
];

const MASTER_FILE: [u8; 2] = [0x3F, 0x00];

pub struct HealthCardHandler;

fn select_by_aid(aid: &[u8]) -> Vec<u8> {
    let mut apdu = vec![0x00, 0xA4, 0x04, 0x00, aid.len() as u8];
    apdu.extend_from_slice(aid);
    apdu.push(0x00);
    apdu
}

fn select_ef(file_id: &[u8; 2]) -> Vec<u8> {
    vec![0x00, 0xA4, 0x02, 0x0C, 0x02, file_id[0], file_id[1]]
}

fn read_binary(offset: u16, length: u8) -> Vec<u8> {
    vec![0x00, 0xB0, (offset >> 8) as u8, (offset & 0xFF) as u8, length]
}

#[async_trait]
impl Handler for HealthCardHandler {
    fn id(&self) -> &'static str {
        "health"
    }

    fn name(&self) -> &'static str {
        "Health Insurance Card"
    }

    fn description(&self) -> &'static str {
        "Health insurance smart-card applet (insurant master data files)"
    }

    fn workflow(&self) -> Option<&'static str> {
        Some("health")
    }

    async fn detect(
        &self,
        _atr: &[u8],
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> DetectionResult {
        for (aid, name) in KNOWN_HEALTH_AIDS {
            if let Ok(response) = send(select_by_aid(aid)).await {
                if is_sw_success(response.sw1) {
                    return DetectionResult::detected(75, "health")
                        .with_metadata("aid", bytes_to_hex(aid))
                        .with_metadata("scheme", *name);
                }
            }
        }
        DetectionResult::not_detected()
    }

    fn get_commands(&self, _metadata: Option<&HashMap<String, Value>>) -> Vec<CommandDescriptor> {
        vec![
            CommandDescriptor::new("select-application", "Select Application", "SELECT by AID", "discovery")
                .with_params(vec![
                    Parameter::new("aid", ParameterKind::Hex, "Health card applet AID").required()
                ]),
            CommandDescriptor::new("select-mf", "Select Master File", "SELECT 3F00", "discovery"),
            CommandDescriptor::new("select-ef", "Select EF", "SELECT an elementary file by identifier", "discovery")
                .with_params(vec![
                    Parameter::new("fileId", ParameterKind::Hex, "2-byte file identifier").required()
                ]),
            CommandDescriptor::new("read-binary", "Read Binary", "READ BINARY on the currently selected EF", "file access")
                .with_params(vec![
                    Parameter::new("offset", ParameterKind::Number, "Byte offset").required(),
                    Parameter::new("length", ParameterKind::Number, "Number of bytes to read").required(),
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
            "select-application" => {
                let aid = require_hex(params, "aid")?;
                context.state.selected_aid = Some(bytes_to_hex(&aid));
                select_by_aid(&aid)
            }
            "select-mf" => select_ef(&MASTER_FILE),
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
            other => return Err(HandlerError::UnknownCommand(other.to_string())),
        };

        context.send_command(apdu).await
    }

    async fn interrogate(
        &self,
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> InterrogationResult {
        for (aid, name) in KNOWN_HEALTH_AIDS {
            match send(select_by_aid(aid)).await {
                Ok(r) if is_sw_success(r.sw1) => {
                    return InterrogationResult::ok(vec![DiscoveredApp {
                        aid: bytes_to_hex(aid),
                        name: Some((*name).to_string()),
                        label: None,
                        priority: None,
                        handler_id: "health".to_string(),
                    }])
                }
                _ => continue,
            }
        }
        InterrogationResult::failed("no known health card applet could be selected")
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
    fn select_mf_apdu_shape() {
        assert_eq!(select_ef(&MASTER_FILE), vec![0x00, 0xA4, 0x02, 0x0C, 0x02, 0x3F, 0x00]);
    }

    #[test]
    fn known_health_aid_is_egk() {
        assert_eq!(KNOWN_HEALTH_AIDS[0].1, "German eGK (HCA)");
    }
}
