//! GSM SIM / 3G USIM handler (spec.md §4.5). SIM cards answer class `A0`;
//! USIM applications answer the plain ISO class `00`. Detection tries both.

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

pub const MASTER_FILE: [u8; 2] = [0x3F, 0x00];
pub const DF_GSM: [u8; 2] = [0x7F, 0x20];
pub const EF_ICCID: [u8; 2] = [0x2F, 0xE2];
pub const EF_IMSI: [u8; 2] = [0x6F, 0x07];
pub const EF_SPN: [u8; 2] = [0x6F, 0x46];
pub const EF_MSISDN: [u8; 2] = [0x6F, 0x40];
pub const EF_LOCI: [u8; 2] = [0x6F, 0x7E];

pub struct SimHandler;

/// `0xA0` for SIM, `0x00` for USIM; every command below takes the class
/// byte the caller's prior SELECT succeeded with.
fn select_path(class: u8, path: &[u8]) -> Vec<u8> {
    let mut apdu = vec![class, 0xA4, 0x00, 0x00, path.len() as u8];
    apdu.extend_from_slice(path);
    apdu
}

fn read_binary(class: u8, offset: u16, length: u8) -> Vec<u8> {
    vec![class, 0xB0, (offset >> 8) as u8, (offset & 0xFF) as u8, length]
}

fn read_record(class: u8, record: u8, mode: u8, length: u8) -> Vec<u8> {
    vec![class, 0xB2, record, mode, length]
}

fn run_gsm_algorithm(class: u8, rand: &[u8; 16]) -> Vec<u8> {
    let mut apdu = vec![class, 0x88, 0x00, 0x00, 0x10];
    apdu.extend_from_slice(rand);
    apdu
}

fn get_response(class: u8, length: u8) -> Vec<u8> {
    vec![class, 0xC0, 0x00, 0x00, length]
}

/// VERIFY CHV1: each PIN digit is ASCII-shifted (`0x30 + digit`), padded
/// with `FF` to 8 bytes (spec.md §4.5).
fn verify_chv1(class: u8, pin: &str) -> Result<Vec<u8>, HandlerError> {
    let mut block = Vec::with_capacity(8);
    for c in pin.chars() {
        let digit = c.to_digit(10).ok_or_else(|| invalid("pin", "must be decimal digits"))?;
        block.push(0x30 + digit as u8);
    }
    if block.len() > 8 {
        return Err(invalid("pin", "must be at most 8 digits"));
    }
    block.resize(8, 0xFF);
    let mut apdu = vec![class, 0x20, 0x00, 0x01, 0x08];
    apdu.extend_from_slice(&block);
    Ok(apdu)
}

/// ICCID is BCD-encoded with swapped nibbles: each byte's low nibble is the
/// first digit, high nibble the second (spec.md §4.5). `F` nibbles are
/// trailing padding and dropped.
pub fn decode_iccid(bytes: &[u8]) -> String {
    let mut digits = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let low = byte & 0x0F;
        let high = byte >> 4;
        if low <= 9 {
            digits.push((b'0' + low) as char);
        }
        if high <= 9 {
            digits.push((b'0' + high) as char);
        }
    }
    digits
}

fn class_label(class: u8) -> &'static str {
    if class == 0x00 { "usim" } else { "sim" }
}

#[async_trait]
impl Handler for SimHandler {
    fn id(&self) -> &'static str {
        "sim"
    }

    fn name(&self) -> &'static str {
        "SIM/USIM"
    }

    fn description(&self) -> &'static str {
        "GSM SIM (class A0) or 3G USIM (class 00) application"
    }

    fn workflow(&self) -> Option<&'static str> {
        Some("sim")
    }

    async fn detect(
        &self,
        _atr: &[u8],
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> DetectionResult {
        for class in [0xA0u8, 0x00u8] {
            if let Ok(response) = send(select_path(class, &MASTER_FILE)).await {
                if is_sw_success(response.sw1) {
                    return DetectionResult::detected(80, "sim")
                        .with_metadata("class", format!("{:02X}", class))
                        .with_metadata("application", class_label(class));
                }
            }
        }
        DetectionResult::not_detected()
    }

    fn get_commands(&self, metadata: Option<&HashMap<String, Value>>) -> Vec<CommandDescriptor> {
        let _ = metadata;
        vec![
            CommandDescriptor::new("select-mf", "Select Master File", "SELECT 3F00", "discovery")
                .with_params(vec![class_parameter()]),
            CommandDescriptor::new("select-path", "Select Path", "SELECT a DF/EF path", "discovery")
                .with_params(vec![
                    class_parameter(),
                    Parameter::new("path", ParameterKind::Hex, "File identifier path, 2 bytes per component")
                        .required(),
                ]),
            CommandDescriptor::new("read-binary", "Read Binary", "READ BINARY on the currently selected EF", "file access")
                .with_params(vec![
                    class_parameter(),
                    Parameter::new("offset", ParameterKind::Number, "Byte offset").required(),
                    Parameter::new("length", ParameterKind::Number, "Number of bytes to read").required(),
                ]),
            CommandDescriptor::new("read-record", "Read Record", "READ RECORD on the currently selected EF", "file access")
                .with_params(vec![
                    class_parameter(),
                    Parameter::new("record", ParameterKind::Number, "Record number").required(),
                    Parameter::new(
                        "mode",
                        ParameterKind::Select {
                            options: vec!["absolute".into(), "next".into(), "previous".into()],
                        },
                        "Record addressing mode",
                    )
                    .required(),
                    Parameter::new("length", ParameterKind::Number, "Expected record length").required(),
                ]),
            CommandDescriptor::new(
                "run-gsm-algorithm",
                "Run GSM Algorithm",
                "RUN GSM ALGORITHM with a 16-byte RAND",
                "security",
            )
            .with_params(vec![
                class_parameter(),
                Parameter::new("rand", ParameterKind::Hex, "16-byte RAND challenge").required(),
            ]),
            CommandDescriptor::new("verify-chv1", "Verify CHV1", "VERIFY the first CHV (PIN)", "security")
                .with_params(vec![
                    class_parameter(),
                    Parameter::new("pin", ParameterKind::String, "Up to 8 decimal digits").required(),
                ]),
            CommandDescriptor::new("get-response", "Get Response", "GET RESPONSE for chaining", "discovery")
                .with_params(vec![
                    class_parameter(),
                    Parameter::new("length", ParameterKind::Number, "Number of bytes to fetch").required(),
                ]),
        ]
    }

    async fn execute_command(
        &self,
        command_id: &str,
        context: &mut CommandContext<'_>,
    ) -> Result<Response, HandlerError> {
        let params = &context.parameters;
        let class = optional_class(params);
        let apdu = match command_id {
            "select-mf" => select_path(class, &MASTER_FILE),
            "select-path" => {
                let path = require_hex(params, "path")?;
                select_path(class, &path)
            }
            "read-binary" => {
                let offset = require_number(params, "offset")? as u16;
                let length = require_number(params, "length")? as u8;
                read_binary(class, offset, length)
            }
            "read-record" => {
                let record = require_number(params, "record")? as u8;
                let mode = match require_string(params, "mode")?.as_str() {
                    "absolute" => 0x04,
                    "next" => 0x02,
                    "previous" => 0x03,
                    other => return Err(invalid("mode", &format!("unknown mode {other}"))),
                };
                let length = require_number(params, "length")? as u8;
                read_record(class, record, mode, length)
            }
            "run-gsm-algorithm" => {
                let rand = require_hex(params, "rand")?;
                let rand: [u8; 16] = rand
                    .try_into()
                    .map_err(|_| invalid("rand", "must be exactly 16 bytes"))?;
                run_gsm_algorithm(class, &rand)
            }
            "verify-chv1" => {
                let pin = require_string(params, "pin")?;
                context.state.pin_verified = true;
                verify_chv1(class, &pin)?
            }
            "get-response" => {
                let length = require_number(params, "length")? as u8;
                get_response(class, length)
            }
            other => return Err(HandlerError::UnknownCommand(other.to_string())),
        };

        context.send_command(apdu).await
    }

    async fn interrogate(
        &self,
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> InterrogationResult {
        let mut class = 0xA0u8;
        let mf_ok = match send(select_path(class, &MASTER_FILE)).await {
            Ok(r) if is_sw_success(r.sw1) => true,
            _ => {
                class = 0x00;
                match send(select_path(class, &MASTER_FILE)).await {
                    Ok(r) if is_sw_success(r.sw1) => true,
                    Ok(r) => return InterrogationResult::failed(format!(
                        "SELECT MF returned {:02X}{:02X}",
                        r.sw1, r.sw2
                    )),
                    Err(e) => return InterrogationResult::failed(e.to_string()),
                }
            }
        };
        if !mf_ok {
            return InterrogationResult::failed("SELECT MF failed");
        }

        let mut app = DiscoveredApp {
            aid: "3F00".to_string(),
            name: Some(if class == 0x00 { "USIM" } else { "SIM" }.to_string()),
            label: Some("Master File".to_string()),
            priority: None,
            handler_id: "sim".to_string(),
        };

        if let Ok(select) = send(select_path(class, &EF_ICCID)).await {
            if is_sw_success(select.sw1) {
                if let Ok(read) = send(read_binary(class, 0, 10)).await {
                    if is_sw_success(read.sw1) {
                        app.label = Some(format!("ICCID {}", decode_iccid(&read.data)));
                    }
                }
            }
        }

        InterrogationResult::ok(vec![app])
    }
}

fn class_parameter() -> Parameter {
    Parameter::new(
        "class",
        ParameterKind::Select { options: vec!["sim".into(), "usim".into()] },
        "Class byte: A0 for SIM, 00 for USIM (defaults to sim)",
    )
}

fn optional_class(params: &super::CommandParameters) -> u8 {
    match params.get("class").and_then(Value::as_str) {
        Some("usim") => 0x00,
        _ => 0xA0,
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
    fn select_mf_uses_class_a0() {
        assert_eq!(select_path(0xA0, &MASTER_FILE), vec![0xA0, 0xA4, 0x00, 0x00, 0x02, 0x3F, 0x00]);
    }

    #[test]
    fn select_mf_uses_class_00_for_usim() {
        assert_eq!(select_path(0x00, &MASTER_FILE)[0], 0x00);
    }

    #[test]
    fn read_record_modes_map_to_p2() {
        assert_eq!(read_record(0xA0, 1, 0x04, 20)[3], 0x04);
        assert_eq!(read_record(0xA0, 1, 0x02, 20)[3], 0x02);
    }

    #[test]
    fn run_gsm_algorithm_sends_sixteen_byte_rand() {
        let apdu = run_gsm_algorithm(0xA0, &[0x11; 16]);
        assert_eq!(apdu[4], 0x10);
        assert_eq!(apdu.len(), 21);
    }

    #[test]
    fn verify_chv1_shifts_digits_and_pads_with_ff() {
        let apdu = verify_chv1(0xA0, "1234").unwrap();
        assert_eq!(apdu, vec![0xA0, 0x20, 0x00, 0x01, 0x08, 0x31, 0x32, 0x33, 0x34, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn decode_iccid_swaps_nibbles_and_drops_f_padding() {
        // Byte 0x89 -> digits '9','8'; trailing 0xFF is padding, dropped.
        assert_eq!(decode_iccid(&[0x89, 0x86, 0xFF]), "9868");
    }
}
