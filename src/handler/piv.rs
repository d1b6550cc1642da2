//! PIV (Personal Identity Verification, NIST SP 800-73-4) handler
//! (spec.md §4.5).

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

const PIV_AID: [u8; 11] = [0xA0, 0x00, 0x00, 0x03, 0x08, 0x00, 0x00, 0x10, 0x00, 0x01, 0x00];

pub struct PivHandler;

fn select_piv() -> Vec<u8> {
    let mut apdu = vec![0x00, 0xA4, 0x04, 0x00, PIV_AID.len() as u8];
    apdu.extend_from_slice(&PIV_AID);
    apdu.push(0x00);
    apdu
}

fn get_data(tag: &[u8]) -> Vec<u8> {
    let mut body = vec![0x5C, tag.len() as u8];
    body.extend_from_slice(tag);
    let mut apdu = vec![0x00, 0xCB, 0x3F, 0xFF, body.len() as u8];
    apdu.extend_from_slice(&body);
    apdu.push(0x00);
    apdu
}

/// NIST SP 800-73-4 Part 1 Table 3 data object tags for the objects named
/// directly in command descriptors, alongside the generic `get-data(tag)`
/// escape hatch. CHUID is mandatory on every conformant card; the rest are
/// the commonly-populated ones worth a dedicated shortcut.
const TAG_CCC: [u8; 3] = [0x5F, 0xC1, 0x07];
const TAG_CHUID: [u8; 3] = [0x5F, 0xC1, 0x02];
const TAG_DISCOVERY: [u8; 1] = [0x7E];
const TAG_PRINTED_INFORMATION: [u8; 3] = [0x5F, 0xC1, 0x09];
const TAG_CERT_PIV_AUTHENTICATION: [u8; 3] = [0x5F, 0xC1, 0x05];
const TAG_CERT_DIGITAL_SIGNATURE: [u8; 3] = [0x5F, 0xC1, 0x0A];
const TAG_CERT_KEY_MANAGEMENT: [u8; 3] = [0x5F, 0xC1, 0x0B];
const TAG_CERT_CARD_AUTHENTICATION: [u8; 3] = [0x5F, 0xC1, 0x01];

fn verify_pin(pin: &str) -> Vec<u8> {
    let mut block = pin.bytes().collect::<Vec<u8>>();
    block.resize(8, 0xFF);
    let mut apdu = vec![0x00, 0x20, 0x00, 0x80, 0x08];
    apdu.extend_from_slice(&block);
    apdu
}

/// Requests a witness from the card's internal authenticate key, via the
/// fixed empty-witness dynamic authentication template `7C 02 81 00`
/// (algorithm in P1, key reference in P2; spec.md §4.5).
fn general_authenticate(algorithm: u8, key_reference: u8) -> Vec<u8> {
    vec![0x00, 0x87, algorithm, key_reference, 0x04, 0x7C, 0x02, 0x81, 0x00, 0x00]
}

#[async_trait]
impl Handler for PivHandler {
    fn id(&self) -> &'static str {
        "piv"
    }

    fn name(&self) -> &'static str {
        "PIV"
    }

    fn description(&self) -> &'static str {
        "NIST SP 800-73-4 Personal Identity Verification application"
    }

    fn workflow(&self) -> Option<&'static str> {
        Some("piv")
    }

    async fn detect(
        &self,
        _atr: &[u8],
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> DetectionResult {
        match send(select_piv()).await {
            Ok(response) if is_sw_success(response.sw1) => {
                DetectionResult::detected(90, "piv")
            }
            _ => DetectionResult::not_detected(),
        }
    }

    fn get_commands(&self, _metadata: Option<&HashMap<String, Value>>) -> Vec<CommandDescriptor> {
        vec![
            CommandDescriptor::new("select-piv-application", "Select", "SELECT the PIV AID", "discovery"),
            CommandDescriptor::new("get-data", "Get Data", "GET DATA by BER-TLV tag", "file access")
                .with_params(vec![
                    Parameter::new("tag", ParameterKind::Hex, "3-byte data object tag, e.g. 5FC102")
                        .required(),
                ]),
            CommandDescriptor::new("get-chuid", "Get CHUID", "GET DATA, Card Holder Unique Identifier (5FC102)", "file access"),
            CommandDescriptor::new("get-ccc", "Get CCC", "GET DATA, Card Capability Container (5FC107)", "file access"),
            CommandDescriptor::new("get-discovery", "Get Discovery Object", "GET DATA, Discovery Object (7E)", "file access"),
            CommandDescriptor::new(
                "get-printed-information",
                "Get Printed Information",
                "GET DATA, Printed Information (5FC109)",
                "file access",
            ),
            CommandDescriptor::new(
                "get-certificate-piv-authentication",
                "Get PIV Authentication Certificate",
                "GET DATA, X.509 Certificate for PIV Authentication (5FC105)",
                "file access",
            ),
            CommandDescriptor::new(
                "get-certificate-digital-signature",
                "Get Digital Signature Certificate",
                "GET DATA, X.509 Certificate for Digital Signature (5FC10A)",
                "file access",
            ),
            CommandDescriptor::new(
                "get-certificate-key-management",
                "Get Key Management Certificate",
                "GET DATA, X.509 Certificate for Key Management (5FC10B)",
                "file access",
            ),
            CommandDescriptor::new(
                "get-certificate-card-authentication",
                "Get Card Authentication Certificate",
                "GET DATA, X.509 Certificate for Card Authentication (5FC101)",
                "file access",
            ),
            CommandDescriptor::new("verify-pin", "Verify PIN", "VERIFY the application PIN", "security")
                .with_params(vec![
                    Parameter::new("pin", ParameterKind::String, "PIN digits").required()
                ]),
            CommandDescriptor::new(
                "general-authenticate",
                "General Authenticate",
                "Request a witness from a PIV key slot (empty-witness dynamic auth template)",
                "security",
            )
            .with_params(vec![
                Parameter::new("algorithm", ParameterKind::Hex, "Algorithm identifier, e.g. 07").required(),
                Parameter::new("keyReference", ParameterKind::Hex, "Key reference, e.g. 9A").required(),
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
            "select-piv-application" => select_piv(),
            "get-data" => {
                let tag = require_hex(params, "tag")?;
                get_data(&tag)
            }
            "get-chuid" => get_data(&TAG_CHUID),
            "get-ccc" => get_data(&TAG_CCC),
            "get-discovery" => get_data(&TAG_DISCOVERY),
            "get-printed-information" => get_data(&TAG_PRINTED_INFORMATION),
            "get-certificate-piv-authentication" => get_data(&TAG_CERT_PIV_AUTHENTICATION),
            "get-certificate-digital-signature" => get_data(&TAG_CERT_DIGITAL_SIGNATURE),
            "get-certificate-key-management" => get_data(&TAG_CERT_KEY_MANAGEMENT),
            "get-certificate-card-authentication" => get_data(&TAG_CERT_CARD_AUTHENTICATION),
            "verify-pin" => {
                let pin = require_string(params, "pin")?;
                context.state.pin_verified = true;
                verify_pin(&pin)
            }
            "general-authenticate" => {
                let algorithm = require_hex(params, "algorithm")?;
                let key_reference = require_hex(params, "keyReference")?;
                let algorithm = *algorithm
                    .first()
                    .ok_or_else(|| invalid("algorithm", "must be one byte"))?;
                let key_reference = *key_reference
                    .first()
                    .ok_or_else(|| invalid("keyReference", "must be one byte"))?;
                general_authenticate(algorithm, key_reference)
            }
            other => return Err(HandlerError::UnknownCommand(other.to_string())),
        };

        context.send_command(apdu).await
    }

    async fn interrogate(
        &self,
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> InterrogationResult {
        let select = match send(select_piv()).await {
            Ok(r) if is_sw_success(r.sw1) => r,
            Ok(r) => return InterrogationResult::failed(format!(
                "SELECT PIV returned {:02X}{:02X}",
                r.sw1, r.sw2
            )),
            Err(e) => return InterrogationResult::failed(e.to_string()),
        };
        let _ = select;

        // Card Holder Unique Identifier, present on every conformant card.
        let app = match send(get_data(&TAG_CHUID)).await {
            Ok(r) if is_sw_success(r.sw1) => DiscoveredApp {
                aid: bytes_to_hex(&PIV_AID),
                name: Some("PIV".to_string()),
                label: Some("PIV Card Application".to_string()),
                priority: None,
                handler_id: "piv".to_string(),
            },
            _ => DiscoveredApp {
                aid: bytes_to_hex(&PIV_AID),
                name: Some("PIV".to_string()),
                label: None,
                priority: None,
                handler_id: "piv".to_string(),
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
    fn select_piv_uses_the_full_eleven_byte_aid() {
        let apdu = select_piv();
        assert_eq!(apdu[0..4], [0x00, 0xA4, 0x04, 0x00]);
        assert_eq!(apdu[4], 11);
        assert_eq!(apdu[5..5 + PIV_AID.len()], PIV_AID);
    }

    #[test]
    fn get_data_wraps_tag_in_5c() {
        let apdu = get_data(&[0x5F, 0xC1, 0x02]);
        assert_eq!(&apdu[5..10], &[0x5C, 0x03, 0x5F, 0xC1, 0x02]);
    }

    #[test]
    fn verify_pin_pads_to_eight_bytes_with_ff() {
        let apdu = verify_pin("123456");
        assert_eq!(apdu.len(), 13);
        assert_eq!(&apdu[5..11], b"123456");
        assert_eq!(&apdu[11..13], &[0xFF, 0xFF]);
    }

    #[test]
    fn general_authenticate_sends_the_empty_witness_template() {
        let apdu = general_authenticate(0x07, 0x9A);
        assert_eq!(apdu, vec![0x00, 0x87, 0x07, 0x9A, 0x04, 0x7C, 0x02, 0x81, 0x00, 0x00]);
    }

    #[test]
    fn get_chuid_matches_the_literal_scenario_bytes() {
        let apdu = get_data(&TAG_CHUID);
        assert_eq!(
            apdu,
            vec![0x00, 0xCB, 0x3F, 0xFF, 0x05, 0x5C, 0x03, 0x5F, 0xC1, 0x02, 0x00]
        );
    }

    #[tokio::test]
    async fn execute_command_get_chuid_emits_the_literal_scenario_bytes() {
        use std::sync::Arc;
        use tokio::sync::Mutex;

        let seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let send = move |apdu: Vec<u8>| -> BoxedSend {
            let seen = seen_clone.clone();
            Box::pin(async move {
                seen.lock().await.push(apdu);
                Ok(Response {
                    id: "t".to_string(),
                    sw1: 0x90,
                    sw2: 0x00,
                    data: Vec::new(),
                    timestamp: chrono::Utc::now(),
                    hex: String::new(),
                    meaning: None,
                })
            })
        };

        let mut state = super::super::HandlerSessionState::default();
        let mut context = CommandContext {
            send: &send,
            state: &mut state,
            parameters: HashMap::new(),
        };

        PivHandler
            .execute_command("get-chuid", &mut context)
            .await
            .unwrap();

        let sent = seen.lock().await;
        assert_eq!(
            sent[0],
            vec![0x00, 0xCB, 0x3F, 0xFF, 0x05, 0x5C, 0x03, 0x5F, 0xC1, 0x02, 0x00]
        );
    }
}
