//! MIFARE DESFire handler: native commands wrapped in ISO 7816 class `90`
//! APDUs, multi-frame continuation handled by the transport layer
//! (spec.md §4.2, §4.5).

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

pub struct DesfireHandler;

/// PC/SC pseudo-APDU (not a DESFire native command): the only way to read a
/// card's UID before any application is selected (spec.md §4.5).
fn get_uid() -> Vec<u8> {
    vec![0xFF, 0xCA, 0x00, 0x00, 0x00]
}

fn native(ins: u8, data: &[u8]) -> Vec<u8> {
    let mut apdu = vec![0x90, ins, 0x00, 0x00, data.len() as u8];
    apdu.extend_from_slice(data);
    apdu.push(0x00);
    apdu
}

fn get_version() -> Vec<u8> {
    native(0x60, &[])
}

fn get_application_ids() -> Vec<u8> {
    native(0x6A, &[])
}

fn select_application(aid: &[u8; 3]) -> Vec<u8> {
    native(0x5A, aid)
}

fn get_file_ids() -> Vec<u8> {
    native(0x6F, &[])
}

fn get_file_settings(file_id: u8) -> Vec<u8> {
    native(0xF5, &[file_id])
}

fn read_data(file_id: u8, offset: u32, length: u32) -> Vec<u8> {
    let mut data = vec![file_id];
    data.extend_from_slice(&offset.to_le_bytes()[..3]);
    data.extend_from_slice(&length.to_le_bytes()[..3]);
    native(0xBD, &data)
}

fn get_key_settings() -> Vec<u8> {
    native(0x45, &[])
}

fn free_memory() -> Vec<u8> {
    native(0x6E, &[])
}

fn format_picc() -> Vec<u8> {
    native(0xFC, &[])
}

fn authenticate_aes(key_number: u8) -> Vec<u8> {
    native(0xAA, &[key_number])
}

#[async_trait]
impl Handler for DesfireHandler {
    fn id(&self) -> &'static str {
        "desfire"
    }

    fn name(&self) -> &'static str {
        "MIFARE DESFire"
    }

    fn description(&self) -> &'static str {
        "MIFARE DESFire EV1/EV2/EV3 native command set"
    }

    fn workflow(&self) -> Option<&'static str> {
        Some("desfire")
    }

    async fn detect(
        &self,
        _atr: &[u8],
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> DetectionResult {
        match send(get_version()).await {
            Ok(response) if is_sw_success(response.sw1) && !response.data.is_empty() => {
                DetectionResult::detected(90, "desfire")
            }
            _ => DetectionResult::not_detected(),
        }
    }

    fn get_commands(&self, _metadata: Option<&HashMap<String, Value>>) -> Vec<CommandDescriptor> {
        vec![
            CommandDescriptor::new("get-uid", "Get UID", "Retrieve the card's UID via the PC/SC pseudo-APDU", "discovery"),
            CommandDescriptor::new("get-version", "Get Version", "GetVersion (hardware/software/UID parts)", "discovery"),
            CommandDescriptor::new("get-application-ids", "Get Application IDs", "GetApplicationIDs", "discovery"),
            CommandDescriptor::new("select-application", "Select Application", "SelectApplication", "discovery")
                .with_params(vec![
                    Parameter::new("aid", ParameterKind::Hex, "3-byte application identifier").required()
                ]),
            CommandDescriptor::new("get-file-ids", "Get File IDs", "GetFileIDs in the selected application", "file access"),
            CommandDescriptor::new("get-file-settings", "Get File Settings", "GetFileSettings", "file access")
                .with_params(vec![
                    Parameter::new("fileId", ParameterKind::Number, "File identifier").required()
                ]),
            CommandDescriptor::new("read-data", "Read Data", "ReadData from a standard data file", "file access")
                .with_params(vec![
                    Parameter::new("fileId", ParameterKind::Number, "File identifier").required(),
                    Parameter::new("offset", ParameterKind::Number, "Byte offset").required(),
                    Parameter::new("length", ParameterKind::Number, "Number of bytes to read").required(),
                ]),
            CommandDescriptor::new("get-key-settings", "Get Key Settings", "GetKeySettings", "security"),
            CommandDescriptor::new("free-memory", "Free Memory", "FreeMemory", "discovery"),
            CommandDescriptor::new("format-picc", "Format PICC", "FormatPICC: erases all applications and files", "file access")
                .destructive(),
            CommandDescriptor::new("authenticate-aes", "Authenticate (AES)", "AuthenticateAES, first step only", "security")
                .with_params(vec![
                    Parameter::new("keyNumber", ParameterKind::Number, "Key number to authenticate with").required()
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
            "get-version" => get_version(),
            "get-application-ids" => get_application_ids(),
            "select-application" => {
                let aid = require_hex(params, "aid")?;
                let aid: [u8; 3] = aid
                    .try_into()
                    .map_err(|_| invalid("aid", "must be exactly 3 bytes"))?;
                context.state.selected_aid = Some(bytes_to_hex(&aid));
                select_application(&aid)
            }
            "get-file-ids" => get_file_ids(),
            "get-file-settings" => {
                let file_id = require_number(params, "fileId")? as u8;
                get_file_settings(file_id)
            }
            "read-data" => {
                let file_id = require_number(params, "fileId")? as u8;
                let offset = require_number(params, "offset")? as u32;
                let length = require_number(params, "length")? as u32;
                read_data(file_id, offset, length)
            }
            "get-key-settings" => get_key_settings(),
            "free-memory" => free_memory(),
            "format-picc" => format_picc(),
            "authenticate-aes" => {
                let key_number = require_number(params, "keyNumber")? as u8;
                authenticate_aes(key_number)
            }
            other => return Err(HandlerError::UnknownCommand(other.to_string())),
        };

        context.send_command(apdu).await
    }

    async fn interrogate(
        &self,
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> InterrogationResult {
        let uid = send(get_uid()).await.ok().filter(|r| is_sw_success(r.sw1));

        let version = match send(get_version()).await {
            Ok(r) if is_sw_success(r.sw1) => r,
            Ok(r) => {
                return InterrogationResult::failed(format!(
                    "GetVersion returned {:02X}{:02X}",
                    r.sw1, r.sw2
                ))
            }
            Err(e) => return InterrogationResult::failed(e.to_string()),
        };

        let mut applications = vec![DiscoveredApp {
            aid: bytes_to_hex(&version.data),
            name: Some("MIFARE DESFire".to_string()),
            label: uid
                .map(|r| format!("UID {}", bytes_to_hex(&r.data)))
                .or_else(|| Some("GetVersion response".to_string())),
            priority: None,
            handler_id: "desfire".to_string(),
        }];

        if let Ok(response) = send(get_application_ids()).await {
            if is_sw_success(response.sw1) {
                for aid_bytes in response.data.chunks_exact(3) {
                    applications.push(DiscoveredApp {
                        aid: bytes_to_hex(aid_bytes),
                        name: None,
                        label: None,
                        priority: None,
                        handler_id: "desfire".to_string(),
                    });
                }
            }
        }

        InterrogationResult::ok(applications)
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
    fn get_uid_is_the_pcsc_pseudo_apdu() {
        assert_eq!(get_uid(), vec![0xFF, 0xCA, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn native_wraps_in_class_90() {
        let apdu = get_version();
        assert_eq!(apdu, vec![0x90, 0x60, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn read_data_encodes_offset_and_length_as_three_byte_le() {
        let apdu = read_data(1, 0x000102, 0x000304);
        assert_eq!(apdu[5], 1); // file id
        assert_eq!(&apdu[6..9], &[0x02, 0x01, 0x00]); // offset LE
        assert_eq!(&apdu[9..12], &[0x04, 0x03, 0x00]); // length LE
    }

    #[test]
    fn select_application_sends_three_byte_aid() {
        let apdu = select_application(&[0x01, 0x02, 0x03]);
        assert_eq!(apdu[4], 3);
        assert_eq!(&apdu[5..8], &[0x01, 0x02, 0x03]);
    }
}
