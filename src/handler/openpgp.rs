//! OpenPGP card application handler (spec.md §4.5).

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

const OPENPGP_AID_PREFIX: [u8; 6] = [0xD2, 0x76, 0x00, 0x01, 0x24, 0x01];

pub struct OpenPgpHandler;

fn select_openpgp() -> Vec<u8> {
    let mut apdu = vec![0x00, 0xA4, 0x04, 0x00, OPENPGP_AID_PREFIX.len() as u8];
    apdu.extend_from_slice(&OPENPGP_AID_PREFIX);
    apdu.push(0x00);
    apdu
}

fn get_data(tag: u16) -> Vec<u8> {
    vec![0x00, 0xCA, (tag >> 8) as u8, (tag & 0xFF) as u8, 0x00]
}

fn verify(pin_reference: u8, pin: &[u8]) -> Vec<u8> {
    let mut apdu = vec![0x00, 0x20, 0x00, pin_reference, pin.len() as u8];
    apdu.extend_from_slice(pin);
    apdu
}

fn compute_digital_signature(data: &[u8]) -> Vec<u8> {
    let mut apdu = vec![0x00, 0x2A, 0x9E, 0x9A, data.len() as u8];
    apdu.extend_from_slice(data);
    apdu.push(0x00);
    apdu
}

fn decipher(data: &[u8]) -> Vec<u8> {
    let mut apdu = vec![0x00, 0x2A, 0x80, 0x86, data.len() as u8];
    apdu.extend_from_slice(data);
    apdu.push(0x00);
    apdu
}

fn get_challenge(length: u8) -> Vec<u8> {
    vec![0x00, 0x84, 0x00, 0x00, length]
}

fn internal_authenticate(data: &[u8]) -> Vec<u8> {
    let mut apdu = vec![0x00, 0x88, 0x00, 0x00, data.len() as u8];
    apdu.extend_from_slice(data);
    apdu.push(0x00);
    apdu
}

fn pin_reference_for(which: &str) -> Option<u8> {
    match which {
        "pw1-sign" => Some(0x81),
        "pw1-decrypt" => Some(0x82),
        "pw3-admin" => Some(0x83),
        _ => None,
    }
}

#[async_trait]
impl Handler for OpenPgpHandler {
    fn id(&self) -> &'static str {
        "openpgp"
    }

    fn name(&self) -> &'static str {
        "OpenPGP Card"
    }

    fn description(&self) -> &'static str {
        "OpenPGP smart-card application (signature, decryption, authentication keys)"
    }

    fn workflow(&self) -> Option<&'static str> {
        Some("openpgp")
    }

    async fn detect(
        &self,
        _atr: &[u8],
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> DetectionResult {
        match send(select_openpgp()).await {
            Ok(response) if is_sw_success(response.sw1) => {
                DetectionResult::detected(90, "openpgp")
            }
            _ => DetectionResult::not_detected(),
        }
    }

    fn get_commands(&self, _metadata: Option<&HashMap<String, Value>>) -> Vec<CommandDescriptor> {
        vec![
            CommandDescriptor::new("select-openpgp-application", "Select", "SELECT the OpenPGP AID", "discovery"),
            CommandDescriptor::new(
                "get-data",
                "Get Data",
                "GET DATA by two-byte tag, e.g. 006E (Application Related Data)",
                "file access",
            )
            .with_params(vec![
                Parameter::new("tag", ParameterKind::Hex, "Two-byte data object tag").required()
            ]),
            CommandDescriptor::new("verify-pin", "Verify PIN", "VERIFY one of the three PW references", "security")
                .with_params(vec![
                    Parameter::new(
                        "which",
                        ParameterKind::Select {
                            options: vec!["pw1-sign".into(), "pw1-decrypt".into(), "pw3-admin".into()],
                        },
                        "PW1 sign (81), PW1 decrypt (82), or PW3 admin (83)",
                    )
                    .required(),
                    Parameter::new("pin", ParameterKind::String, "PIN digits").required(),
                ]),
            CommandDescriptor::new(
                "internal-authenticate",
                "Internal Authenticate",
                "INTERNAL AUTHENTICATE with the authentication key",
                "cryptography",
            )
            .with_params(vec![
                Parameter::new("data", ParameterKind::Hex, "Data to authenticate").required()
            ]),
            CommandDescriptor::new(
                "compute-digital-signature",
                "Compute Digital Signature",
                "Sign a digest with the signature key",
                "cryptography",
            )
            .with_params(vec![
                Parameter::new("data", ParameterKind::Hex, "Digest to sign").required()
            ]),
            CommandDescriptor::new("decipher", "Decipher", "Decrypt with the decryption key", "cryptography")
                .with_params(vec![
                    Parameter::new("data", ParameterKind::Hex, "Ciphertext").required()
                ]),
            CommandDescriptor::new("get-challenge", "Get Challenge", "Request random bytes from the card", "utility")
                .with_params(vec![
                    Parameter::new("length", ParameterKind::Number, "Number of bytes requested").required()
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
            "select-openpgp-application" => select_openpgp(),
            "get-data" => {
                let tag = require_hex(params, "tag")?;
                let tag: [u8; 2] = tag
                    .try_into()
                    .map_err(|_| invalid("tag", "must be exactly 2 bytes"))?;
                get_data(u16::from_be_bytes(tag))
            }
            "verify-pin" => {
                let which = require_string(params, "which")?;
                let pin_reference = pin_reference_for(&which)
                    .ok_or_else(|| invalid("which", "must be pw1-sign, pw1-decrypt, or pw3-admin"))?;
                let pin = require_string(params, "pin")?;
                context.state.pin_verified = true;
                verify(pin_reference, pin.as_bytes())
            }
            "compute-digital-signature" => {
                let data = require_hex(params, "data")?;
                compute_digital_signature(&data)
            }
            "decipher" => {
                let data = require_hex(params, "data")?;
                decipher(&data)
            }
            "internal-authenticate" => {
                let data = require_hex(params, "data")?;
                internal_authenticate(&data)
            }
            "get-challenge" => {
                let length = require_number(params, "length")? as u8;
                get_challenge(length)
            }
            other => return Err(HandlerError::UnknownCommand(other.to_string())),
        };

        context.send_command(apdu).await
    }

    async fn interrogate(
        &self,
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> InterrogationResult {
        match send(select_openpgp()).await {
            Ok(r) if is_sw_success(r.sw1) => {}
            Ok(r) => {
                return InterrogationResult::failed(format!(
                    "SELECT OpenPGP returned {:02X}{:02X}",
                    r.sw1, r.sw2
                ))
            }
            Err(e) => return InterrogationResult::failed(e.to_string()),
        };

        let app = match send(get_data(0x006E)).await {
            Ok(r) if is_sw_success(r.sw1) => DiscoveredApp {
                aid: bytes_to_hex(&OPENPGP_AID_PREFIX),
                name: Some("OpenPGP".to_string()),
                label: Some("Application Related Data".to_string()),
                priority: None,
                handler_id: "openpgp".to_string(),
            },
            _ => DiscoveredApp {
                aid: bytes_to_hex(&OPENPGP_AID_PREFIX),
                name: Some("OpenPGP".to_string()),
                label: None,
                priority: None,
                handler_id: "openpgp".to_string(),
            },
        };

        InterrogationResult::ok(vec![app])
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
    fn get_data_splits_tag_across_p1_p2() {
        assert_eq!(get_data(0x006E), vec![0x00, 0xCA, 0x00, 0x6E, 0x00]);
    }

    #[test]
    fn verify_uses_pin_reference_as_p2() {
        let apdu = verify(0x81, b"123456");
        assert_eq!(apdu[0..4], [0x00, 0x20, 0x00, 0x81]);
        assert_eq!(&apdu[5..], b"123456");
    }

    #[test]
    fn compute_digital_signature_uses_9e9a() {
        let apdu = compute_digital_signature(&[0xAA; 4]);
        assert_eq!(apdu[0..4], [0x00, 0x2A, 0x9E, 0x9A]);
    }

    #[test]
    fn pin_reference_maps_all_three_variants() {
        assert_eq!(pin_reference_for("pw1-sign"), Some(0x81));
        assert_eq!(pin_reference_for("pw1-decrypt"), Some(0x82));
        assert_eq!(pin_reference_for("pw3-admin"), Some(0x83));
        assert_eq!(pin_reference_for("other"), None);
    }

    #[test]
    fn internal_authenticate_uses_ins_88() {
        let apdu = internal_authenticate(&[0x01, 0x02]);
        assert_eq!(apdu[0..4], [0x00, 0x88, 0x00, 0x00]);
    }
}
