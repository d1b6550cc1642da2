//! FIDO U2F / CTAP2-over-NFC handler (spec.md §4.5).

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

const FIDO_AID: [u8; 8] = [0xA0, 0x00, 0x00, 0x06, 0x47, 0x2F, 0x00, 0x01];

pub struct FidoHandler;

fn select_fido() -> Vec<u8> {
    let mut apdu = vec![0x00, 0xA4, 0x04, 0x00, FIDO_AID.len() as u8];
    apdu.extend_from_slice(&FIDO_AID);
    apdu.push(0x00);
    apdu
}

fn u2f_version() -> Vec<u8> {
    vec![0x00, 0x03, 0x00, 0x00, 0x00]
}

fn u2f_register(challenge: &[u8], application: &[u8]) -> Vec<u8> {
    let mut data = challenge.to_vec();
    data.extend_from_slice(application);
    let mut apdu = vec![0x00, 0x01, 0x00, 0x00, data.len() as u8];
    apdu.extend_from_slice(&data);
    apdu.push(0x00);
    apdu
}

fn u2f_authenticate(control: u8, challenge: &[u8], application: &[u8], key_handle: &[u8]) -> Vec<u8> {
    let mut data = challenge.to_vec();
    data.extend_from_slice(application);
    data.push(key_handle.len() as u8);
    data.extend_from_slice(key_handle);
    let mut apdu = vec![0x00, 0x02, control, 0x00, data.len() as u8];
    apdu.extend_from_slice(&data);
    apdu.push(0x00);
    apdu
}

/// Wraps a CTAP2 command byte plus CBOR payload as CTAP2_CBOR (INS=`11`).
/// Full CBOR encoding isn't attempted here: callers pass an already-encoded
/// command byte + parameter map (spec.md §4.5 "a simplified map template is
/// acceptable").
fn ctap2_command(cbor: &[u8]) -> Vec<u8> {
    let mut apdu = vec![0x00, 0x11, 0x00, 0x00, cbor.len() as u8];
    apdu.extend_from_slice(cbor);
    apdu.push(0x00);
    apdu
}

#[async_trait]
impl Handler for FidoHandler {
    fn id(&self) -> &'static str {
        "fido"
    }

    fn name(&self) -> &'static str {
        "FIDO"
    }

    fn description(&self) -> &'static str {
        "FIDO U2F and CTAP2-over-NFC security key application"
    }

    fn workflow(&self) -> Option<&'static str> {
        Some("fido")
    }

    async fn detect(
        &self,
        _atr: &[u8],
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> DetectionResult {
        match send(select_fido()).await {
            Ok(response) if is_sw_success(response.sw1) => {
                DetectionResult::detected(90, "fido")
            }
            _ => DetectionResult::not_detected(),
        }
    }

    fn get_commands(&self, _metadata: Option<&HashMap<String, Value>>) -> Vec<CommandDescriptor> {
        vec![
            CommandDescriptor::new("select-fido-application", "Select", "SELECT the FIDO AID", "discovery"),
            CommandDescriptor::new("u2f-version", "U2F Version", "U2F_VERSION", "discovery"),
            CommandDescriptor::new("u2f-register", "U2F Register", "U2F_REGISTER", "security")
                .with_params(vec![
                    Parameter::new("challenge", ParameterKind::Hex, "32-byte challenge parameter").required(),
                    Parameter::new("application", ParameterKind::Hex, "32-byte application parameter").required(),
                ]),
            CommandDescriptor::new("u2f-authenticate", "U2F Authenticate", "U2F_AUTHENTICATE", "security")
                .with_params(vec![
                    Parameter::new(
                        "control",
                        ParameterKind::Select {
                            options: vec!["check-only".into(), "enforce-user-presence".into()],
                        },
                        "Control byte semantics",
                    )
                    .required(),
                    Parameter::new("challenge", ParameterKind::Hex, "32-byte challenge parameter").required(),
                    Parameter::new("application", ParameterKind::Hex, "32-byte application parameter").required(),
                    Parameter::new("keyHandle", ParameterKind::Hex, "Key handle returned at registration")
                        .required(),
                ]),
            CommandDescriptor::new(
                "ctap2-command",
                "CTAP2 Command",
                "Send a raw CBOR-encoded CTAP2 command over NFC",
                "security",
            )
            .with_params(vec![
                Parameter::new("cbor", ParameterKind::Hex, "CBOR-encoded command and parameters").required()
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
            "select-fido-application" => select_fido(),
            "u2f-version" => u2f_version(),
            "u2f-register" => {
                let challenge = require_hex(params, "challenge")?;
                let application = require_hex(params, "application")?;
                u2f_register(&challenge, &application)
            }
            "u2f-authenticate" => {
                let control = match require_string(params, "control")?.as_str() {
                    "check-only" => 0x07,
                    "enforce-user-presence" => 0x03,
                    other => return Err(invalid("control", &format!("unknown control mode {other}"))),
                };
                let challenge = require_hex(params, "challenge")?;
                let application = require_hex(params, "application")?;
                let key_handle = require_hex(params, "keyHandle")?;
                u2f_authenticate(control, &challenge, &application, &key_handle)
            }
            "ctap2-command" => {
                let cbor = require_hex(params, "cbor")?;
                ctap2_command(&cbor)
            }
            other => return Err(HandlerError::UnknownCommand(other.to_string())),
        };

        context.send_command(apdu).await
    }

    async fn interrogate(
        &self,
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> InterrogationResult {
        match send(select_fido()).await {
            Ok(r) if is_sw_success(r.sw1) => {}
            Ok(r) => {
                return InterrogationResult::failed(format!(
                    "SELECT FIDO returned {:02X}{:02X}",
                    r.sw1, r.sw2
                ))
            }
            Err(e) => return InterrogationResult::failed(e.to_string()),
        };

        let version = send(u2f_version()).await.ok();
        let label = version
            .filter(|r| is_sw_success(r.sw1))
            .map(|r| String::from_utf8_lossy(&r.data).to_string());

        InterrogationResult::ok(vec![DiscoveredApp {
            aid: bytes_to_hex(&FIDO_AID),
            name: Some("FIDO".to_string()),
            label,
            priority: None,
            handler_id: "fido".to_string(),
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

fn require_string(params: &super::CommandParameters, key: &str) -> Result<String, HandlerError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| invalid(key, "required string parameter missing"))
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
    fn u2f_register_concatenates_challenge_and_application() {
        let apdu = u2f_register(&[0xAA; 32], &[0xBB; 32]);
        assert_eq!(apdu[0..4], [0x00, 0x01, 0x00, 0x00]);
        assert_eq!(apdu[4], 64);
        assert_eq!(apdu.len(), 5 + 64 + 1);
    }

    #[test]
    fn u2f_authenticate_appends_key_handle_length_prefix() {
        let apdu = u2f_authenticate(0x03, &[0; 32], &[0; 32], &[0x01, 0x02, 0x03]);
        assert_eq!(apdu[2], 0x03);
        let key_handle_len_offset = 5 + 32 + 32;
        assert_eq!(apdu[key_handle_len_offset], 3);
    }

    #[test]
    fn ctap2_command_uses_ins_11() {
        let apdu = ctap2_command(&[0x04]);
        assert_eq!(apdu[0], 0x00);
        assert_eq!(apdu[1], 0x11);
    }
}
