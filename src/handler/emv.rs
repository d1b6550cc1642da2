//! EMV payment application handler (spec.md §4.4).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Datelike;
use serde_json::Value;

use crate::codec::{
    build_dol, find, find_all, is_sw_success, parse_afl, parse_dol, parse_tlv, tlv::TlvValue,
};
use crate::codec::bcd::{amount_to_bcd, date_to_bcd, hex_to_bytes};
use crate::error::HandlerError;
use crate::transport::Response;

use super::known_aids::known_aid_name;
use super::{
    BoxedSend, CommandContext, CommandDescriptor, DetectionResult, DiscoveredApp, Handler,
    InterrogationResult, Parameter, ParameterKind,
};

const PSE_NAME: &[u8] = b"1PAY.SYS.DDF01";
const PPSE_NAME: &[u8] = b"2PAY.SYS.DDF01";

pub struct EmvHandler;

fn select_by_name(name: &[u8]) -> Vec<u8> {
    let mut apdu = vec![0x00, 0xA4, 0x04, 0x00, name.len() as u8];
    apdu.extend_from_slice(name);
    apdu.push(0x00);
    apdu
}

fn select_by_aid(aid: &[u8]) -> Vec<u8> {
    select_by_name(aid)
}

pub fn calculate_read_record_p2(sfi: u8) -> u8 {
    (sfi << 3) | 0x04
}

fn read_record(sfi: u8, record: u8) -> Vec<u8> {
    vec![0x00, 0xB2, record, calculate_read_record_p2(sfi), 0x00]
}

fn gpo_empty_pdol() -> Vec<u8> {
    vec![0x80, 0xA8, 0x00, 0x00, 0x02, 0x83, 0x00]
}

fn gpo_with_amount(amount_minor: u64, currency: &[u8; 2]) -> Vec<u8> {
    let entries = parse_dol(&[
        0x9F, 0x02, 0x06, // Amount, Authorised
        0x9F, 0x03, 0x06, // Amount, Other
        0x9F, 0x1A, 0x02, // Terminal Country Code
        0x5F, 0x2A, 0x02, // Transaction Currency Code
        0x9A, 0x03, // Transaction Date
        0x9C, 0x01, // Transaction Type
        0x9F, 0x37, 0x04, // Unpredictable Number
    ]);

    let today = chrono::Utc::now();
    let mut values: HashMap<u32, Vec<u8>> = HashMap::new();
    values.insert(0x9F02, amount_to_bcd(amount_minor).to_vec());
    values.insert(0x9F03, [0u8; 6].to_vec());
    values.insert(0x9F1A, vec![0x08, 0x26]); // arbitrary terminal country code
    values.insert(0x5F2A, currency.to_vec());
    values.insert(
        0x9A,
        date_to_bcd(today.year() as u32, today.month(), today.day()).to_vec(),
    );
    values.insert(0x9C, vec![0x00]); // purchase
    values.insert(0x9F37, pseudorandom_bytes(4));

    let dol_value = build_dol(&entries, &values);
    let mut data = vec![0x83, dol_value.len() as u8];
    data.extend_from_slice(&dol_value);

    let mut apdu = vec![0x80, 0xA8, 0x00, 0x00, data.len() as u8];
    apdu.extend_from_slice(&data);
    apdu.push(0x00);
    apdu
}

/// Not a CSPRNG: the unpredictable number only needs to vary between
/// transactions for this engine's purposes (no cryptography is performed
/// here, per spec.md §1 Non-goals).
fn pseudorandom_bytes(n: usize) -> Vec<u8> {
    let nanos = chrono::Utc::now().timestamp_subsec_nanos();
    (0..n)
        .map(|i| ((nanos >> (i * 8)) & 0xFF) as u8)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptogramType {
    Aac,
    Tc,
    Arqc,
}

impl CryptogramType {
    fn p1(self) -> u8 {
        match self {
            CryptogramType::Aac => 0x00,
            CryptogramType::Tc => 0x40,
            CryptogramType::Arqc => 0x80,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_uppercase().as_str() {
            "AAC" => Some(CryptogramType::Aac),
            "TC" => Some(CryptogramType::Tc),
            "ARQC" => Some(CryptogramType::Arqc),
            _ => None,
        }
    }
}

fn generate_ac(cryptogram: CryptogramType, amount_minor: u64, currency: &[u8; 2]) -> Vec<u8> {
    let today = chrono::Utc::now();
    let mut data = Vec::with_capacity(29);
    data.extend_from_slice(&amount_to_bcd(amount_minor)); // amount (6)
    data.extend_from_slice(&[0u8; 6]); // other amount (6)
    data.extend_from_slice(&[0x08, 0x26]); // terminal country code (2)
    data.extend_from_slice(&[0u8; 5]); // TVR (5, zero)
    data.extend_from_slice(currency); // currency (2)
    data.extend_from_slice(&date_to_bcd(today.year() as u32, today.month(), today.day())); // date (3)
    data.push(0x00); // transaction type (1)
    data.extend_from_slice(&pseudorandom_bytes(4)); // unpredictable number (4)

    let mut apdu = vec![0x80, 0xAE, cryptogram.p1(), 0x00, data.len() as u8];
    apdu.extend_from_slice(&data);
    apdu.push(0x00);
    apdu
}

/// ISO 9564-1 Format 2 PIN block.
pub fn pin_block_format2(pin: &str) -> [u8; 8] {
    let mut nibbles = vec![0x2u8, pin.len() as u8];
    nibbles.extend(pin.bytes().filter(|b| b.is_ascii_digit()).map(|b| b - b'0'));
    while nibbles.len() < 16 {
        nibbles.push(0xF);
    }
    nibbles.truncate(16);
    let mut block = [0u8; 8];
    for i in 0..8 {
        block[i] = (nibbles[i * 2] << 4) | nibbles[i * 2 + 1];
    }
    block
}

async fn run(
    send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    apdu: Vec<u8>,
) -> Result<Response, HandlerError> {
    send(apdu).await
}

fn application_templates_in(records: &[u8]) -> Vec<DiscoveredApp> {
    let mut apps = Vec::new();
    let nodes = parse_tlv(records);
    for template in find_all(&nodes, 0x61) {
        if let Some(TlvValue::Constructed(children)) = Some(&template.value) {
            let aid = children
                .iter()
                .find(|n| n.tag == 0x4F)
                .and_then(|n| n.bytes())
                .map(|b| crate::codec::bytes_to_hex(b));
            let Some(aid) = aid else { continue };
            let label = children
                .iter()
                .find(|n| n.tag == 0x50)
                .and_then(|n| n.bytes())
                .map(|b| String::from_utf8_lossy(b).to_string());
            let priority = children
                .iter()
                .find(|n| n.tag == 0x87)
                .and_then(|n| n.bytes())
                .and_then(|b| b.first().copied());
            let name = known_aid_name(&aid).map(|s| s.to_string());
            apps.push(DiscoveredApp {
                aid,
                name,
                label,
                priority,
                handler_id: "emv".to_string(),
            });
        }
    }
    apps
}

#[async_trait]
impl Handler for EmvHandler {
    fn id(&self) -> &'static str {
        "emv"
    }

    fn name(&self) -> &'static str {
        "EMV Payment"
    }

    fn description(&self) -> &'static str {
        "ISO 7816 / EMV contact and contactless payment application"
    }

    fn workflow(&self) -> Option<&'static str> {
        Some("emv")
    }

    async fn detect(
        &self,
        atr: &[u8],
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> DetectionResult {
        if let Ok(response) = run(send, select_by_name(PSE_NAME)).await {
            if is_sw_success(response.sw1) {
                return DetectionResult::detected(95, "emv").with_metadata("environment", "pse");
            }
        }

        if let Ok(response) = run(send, select_by_name(PPSE_NAME)).await {
            if is_sw_success(response.sw1) {
                return DetectionResult::detected(95, "emv").with_metadata("environment", "ppse");
            }
        }

        if !atr.is_empty() {
            return DetectionResult::detected(30, "emv").with_metadata("environment", "unknown");
        }

        DetectionResult::not_detected()
    }

    fn get_commands(&self, _metadata: Option<&HashMap<String, Value>>) -> Vec<CommandDescriptor> {
        vec![
            CommandDescriptor::new("select-pse", "Select PSE", "SELECT 1PAY.SYS.DDF01", "discovery"),
            CommandDescriptor::new("select-ppse", "Select PPSE", "SELECT 2PAY.SYS.DDF01", "discovery"),
            CommandDescriptor::new(
                "select-application",
                "Select Application",
                "SELECT by AID",
                "discovery",
            )
            .with_params(vec![
                Parameter::new("aid", ParameterKind::Hex, "Application identifier").required()
            ]),
            CommandDescriptor::new(
                "get-processing-options",
                "Get Processing Options",
                "GPO with an empty PDOL response",
                "transaction",
            ),
            CommandDescriptor::new(
                "get-processing-options-with-amount",
                "Get Processing Options (amount)",
                "GPO with a populated PDOL response",
                "transaction",
            )
            .with_params(vec![
                Parameter::new("amount", ParameterKind::Number, "Amount in minor units").required(),
                Parameter::new("currency", ParameterKind::Hex, "ISO 4217 numeric currency code")
                    .required(),
            ]),
            CommandDescriptor::new("read-record", "Read Record", "READ RECORD", "file access")
                .with_params(vec![
                    Parameter::new("sfi", ParameterKind::Number, "Short file identifier").required(),
                    Parameter::new("record", ParameterKind::Number, "Record number").required(),
                ]),
            CommandDescriptor::new("get-data", "Get Data", "GET DATA by tag", "file access")
                .with_params(vec![
                    Parameter::new("tag", ParameterKind::Hex, "BER-TLV tag").required()
                ]),
            CommandDescriptor::new("verify-pin", "Verify PIN", "Offline plaintext PIN verify", "security")
                .with_params(vec![
                    Parameter::new("pin", ParameterKind::String, "PIN digits").required()
                ]),
            CommandDescriptor::new(
                "change-pin",
                "Change PIN",
                "CHANGE REFERENCE DATA with old/new PIN blocks",
                "security",
            )
            .with_params(vec![
                Parameter::new("oldPin", ParameterKind::String, "Current PIN").required(),
                Parameter::new("newPin", ParameterKind::String, "New PIN").required(),
            ]),
            CommandDescriptor::new("generate-ac", "Generate AC", "GENERATE APPLICATION CRYPTOGRAM", "transaction")
                .with_params(vec![
                    Parameter::new(
                        "type",
                        ParameterKind::Select {
                            options: vec!["AAC".into(), "TC".into(), "ARQC".into()],
                        },
                        "Cryptogram type",
                    )
                    .required(),
                    Parameter::new("amount", ParameterKind::Number, "Amount in minor units").required(),
                    Parameter::new("currency", ParameterKind::Hex, "ISO 4217 numeric currency code")
                        .required(),
                ]),
            CommandDescriptor::new(
                "internal-authenticate",
                "Internal Authenticate",
                "INTERNAL AUTHENTICATE",
                "security",
            )
            .with_params(vec![
                Parameter::new("data", ParameterKind::Hex, "Authentication-related data").required()
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
            "select-pse" => select_by_name(PSE_NAME),
            "select-ppse" => select_by_name(PPSE_NAME),
            "select-application" => {
                let aid = require_hex(params, "aid")?;
                context.state.selected_aid = Some(crate::codec::bytes_to_hex(&aid));
                select_by_aid(&aid)
            }
            "get-processing-options" => gpo_empty_pdol(),
            "get-processing-options-with-amount" => {
                let amount = require_number(params, "amount")?;
                let currency = require_hex(params, "currency")?;
                let currency: [u8; 2] = currency
                    .try_into()
                    .map_err(|_| invalid("currency", "must be exactly 2 bytes"))?;
                gpo_with_amount(amount, &currency)
            }
            "read-record" => {
                let sfi = require_number(params, "sfi")? as u8;
                let record = require_number(params, "record")? as u8;
                read_record(sfi, record)
            }
            "get-data" => {
                let tag = require_hex(params, "tag")?;
                let (p1, p2) = match tag.as_slice() {
                    [p1, p2] => (*p1, *p2),
                    [p2] => (0x00, *p2),
                    _ => return Err(invalid("tag", "must be 1 or 2 bytes")),
                };
                vec![0x80, 0xCA, p1, p2, 0x00]
            }
            "verify-pin" => {
                let pin = require_string(params, "pin")?;
                let block = pin_block_format2(&pin);
                let mut apdu = vec![0x00, 0x20, 0x00, 0x80, 0x08];
                apdu.extend_from_slice(&block);
                apdu
            }
            "change-pin" => {
                let old = require_string(params, "oldPin")?;
                let new = require_string(params, "newPin")?;
                let old_block = pin_block_format2(&old);
                let new_block = pin_block_format2(&new);
                let mut apdu = vec![0x00, 0x24, 0x00, 0x80, 0x10];
                apdu.extend_from_slice(&old_block);
                apdu.extend_from_slice(&new_block);
                apdu
            }
            "generate-ac" => {
                let kind = require_string(params, "type")?;
                let cryptogram = CryptogramType::parse(&kind)
                    .ok_or_else(|| invalid("type", "must be AAC, TC or ARQC"))?;
                let amount = require_number(params, "amount")?;
                let currency = require_hex(params, "currency")?;
                let currency: [u8; 2] = currency
                    .try_into()
                    .map_err(|_| invalid("currency", "must be exactly 2 bytes"))?;
                generate_ac(cryptogram, amount, &currency)
            }
            "internal-authenticate" => {
                let data = require_hex(params, "data")?;
                let mut apdu = vec![0x00, 0x88, 0x00, 0x00, data.len() as u8];
                apdu.extend_from_slice(&data);
                apdu.push(0x00);
                apdu
            }
            other => return Err(HandlerError::UnknownCommand(other.to_string())),
        };

        context.send_command(apdu).await
    }

    async fn interrogate(
        &self,
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> InterrogationResult {
        let environment = match run(send, select_by_name(PSE_NAME)).await {
            Ok(r) if is_sw_success(r.sw1) => Some(r),
            _ => match run(send, select_by_name(PPSE_NAME)).await {
                Ok(r) if is_sw_success(r.sw1) => Some(r),
                _ => None,
            },
        };

        let Some(fci_response) = environment else {
            return InterrogationResult::failed("neither PSE nor PPSE could be selected");
        };

        let fci_nodes = parse_tlv(&fci_response.data);
        let sfi = find(&fci_nodes, 0x88)
            .and_then(|n| n.bytes())
            .and_then(|b| b.first().copied())
            .unwrap_or(1);

        let mut applications = Vec::new();
        for record_number in 1u8..=10 {
            match run(send, read_record(sfi, record_number)).await {
                Ok(response) if is_sw_success(response.sw1) => {
                    applications.extend(application_templates_in(&response.data));
                }
                _ => break,
            }
        }

        for app in applications.clone() {
            let Ok(aid_bytes) = hex_to_bytes(&app.aid) else {
                continue;
            };
            if run(send, select_by_aid(&aid_bytes)).await.is_err() {
                continue;
            }

            let Ok(gpo_response) = run(send, gpo_empty_pdol()).await else {
                continue;
            };
            if !is_sw_success(gpo_response.sw1) {
                continue;
            }

            let gpo_nodes = parse_tlv(&gpo_response.data);
            let afl_bytes = find(&gpo_nodes, 0x94)
                .and_then(|n| n.bytes())
                .map(|b| b.to_vec())
                .or_else(|| {
                    find(&gpo_nodes, 0x80)
                        .and_then(|n| n.bytes())
                        .and_then(|b| b.get(2..))
                        .map(|b| b.to_vec())
                });

            let afl = afl_bytes.map(|b| parse_afl(&b)).unwrap_or_default();
            if afl.is_empty() {
                for sfi in 1u8..=3 {
                    for record in 1u8..=5 {
                        let _ = run(send, read_record(sfi, record)).await;
                    }
                }
            } else {
                for entry in afl {
                    for record in entry.first_record..=entry.last_record {
                        let _ = run(send, read_record(entry.sfi, record)).await;
                    }
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
    fn builds_select_pse_apdu_per_spec_scenario_1() {
        let apdu = select_by_name(PSE_NAME);
        assert_eq!(
            apdu,
            vec![
                0x00, 0xA4, 0x04, 0x00, 0x0E, 0x31, 0x50, 0x41, 0x59, 0x2E, 0x53, 0x59, 0x53,
                0x2E, 0x44, 0x44, 0x46, 0x30, 0x31, 0x00
            ]
        );
    }

    #[test]
    fn extracts_application_templates() {
        let mut record = vec![0x61, 0x0F, 0x4F, 0x07];
        record.extend_from_slice(&[0xA0, 0x00, 0x00, 0x00, 0x04, 0x10, 0x10]);
        record.extend_from_slice(&[0x50, 0x04]);
        record.extend_from_slice(b"VISA");

        let apps = application_templates_in(&record);
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].aid, "A0000000041010");
        assert_eq!(apps[0].label.as_deref(), Some("VISA"));
        assert_eq!(apps[0].name.as_deref(), Some("Mastercard Credit/Debit"));
    }

    #[test]
    fn read_record_p2_always_has_low_bits_0100() {
        for sfi in 0u8..32 {
            assert_eq!(calculate_read_record_p2(sfi) & 0x07, 0x04);
        }
    }

    #[test]
    fn pin_block_format2_pads_with_f() {
        let block = pin_block_format2("1234");
        assert_eq!(block, [0x24, 0x12, 0x34, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn generate_ac_places_cryptogram_type_in_p1() {
        let apdu = generate_ac(CryptogramType::Arqc, 100, &[0x08, 0x26]);
        assert_eq!(apdu[0], 0x80);
        assert_eq!(apdu[1], 0xAE);
        assert_eq!(apdu[2], 0x80); // ARQC
        assert_eq!(apdu[4], 29); // Lc
    }

    #[test]
    fn gpo_empty_pdol_matches_spec_literal_bytes() {
        assert_eq!(gpo_empty_pdol(), vec![0x80, 0xA8, 0x00, 0x00, 0x02, 0x83, 0x00]);
    }

    fn mock_response(data: Vec<u8>, sw1: u8, sw2: u8) -> Response {
        Response {
            id: "t".to_string(),
            sw1,
            sw2,
            data,
            timestamp: chrono::Utc::now(),
            hex: String::new(),
            meaning: None,
        }
    }

    #[tokio::test]
    async fn interrogate_pse_discovery_yields_the_visa_application() {
        // PSE FCI carries SFI tag 88 01 01; READ RECORD(1, sfi=1) returns one
        // Application Template for the Visa Credit/Debit AID (spec.md §8
        // scenario 1). Everything beyond the SFI record loop is made to fail
        // so only that loop's result reaches `applications`.
        let visa_record = vec![
            0x61, 0x0F, 0x4F, 0x07, 0xA0, 0x00, 0x00, 0x00, 0x04, 0x10, 0x10, 0x50, 0x04, 0x56,
            0x49, 0x53, 0x41,
        ];

        let send = move |apdu: Vec<u8>| -> BoxedSend {
            let visa_record = visa_record.clone();
            Box::pin(async move {
                if apdu == select_by_name(PSE_NAME) {
                    Ok(mock_response(vec![0x88, 0x01, 0x01], 0x90, 0x00))
                } else if apdu == read_record(1, 1) {
                    Ok(mock_response(visa_record, 0x90, 0x00))
                } else {
                    Ok(mock_response(Vec::new(), 0x6A, 0x82))
                }
            })
        };

        let result = EmvHandler.interrogate(&send).await;
        assert!(result.success);
        assert_eq!(result.applications.len(), 1);
        assert_eq!(result.applications[0].aid, "A0000000041010");
        assert_eq!(result.applications[0].label.as_deref(), Some("VISA"));
        assert_eq!(
            result.applications[0].name.as_deref(),
            Some("Mastercard Credit/Debit")
        );
    }

    #[tokio::test]
    async fn interrogate_afl_drives_sfi_record_reads_with_p2_0c() {
        // Same PSE/app-template setup as above, but GPO for the discovered
        // application carries AFL tag 94 04 08 01 03 02 (one entry: sfi=1,
        // first_record=1, last_record=3). Expected: READ RECORD(sfi=1,
        // record) for record 1, 2, 3 in that order, each with P2 = 0x0C
        // (spec.md §8 scenario 2).
        use std::sync::Arc;
        use tokio::sync::Mutex;

        let visa_record = vec![
            0x61, 0x0F, 0x4F, 0x07, 0xA0, 0x00, 0x00, 0x00, 0x04, 0x10, 0x10, 0x50, 0x04, 0x56,
            0x49, 0x53, 0x41,
        ];
        let aid_bytes = vec![0xA0, 0x00, 0x00, 0x00, 0x04, 0x10, 0x10];
        let gpo_response = vec![0x94, 0x04, 0x08, 0x01, 0x03, 0x02];

        let read_record_calls: Arc<Mutex<Vec<(u8, u8)>>> = Arc::new(Mutex::new(Vec::new()));
        let read_record_calls_clone = read_record_calls.clone();

        // The SFI discovery loop's READ RECORD(sfi=1, record=1) and the
        // AFL-driven loop's first read share the exact same APDU bytes, so
        // calls are told apart by position: call 1 is the discovery read
        // (answered with the Visa template), call 2 breaks the discovery
        // loop, and calls 3-5 are the AFL-driven reads this test asserts on.
        let send = move |apdu: Vec<u8>| -> BoxedSend {
            let visa_record = visa_record.clone();
            let aid_bytes = aid_bytes.clone();
            let gpo_response = gpo_response.clone();
            let read_record_calls = read_record_calls_clone.clone();
            Box::pin(async move {
                if apdu == select_by_name(PSE_NAME) {
                    Ok(mock_response(vec![0x88, 0x01, 0x01], 0x90, 0x00))
                } else if apdu[0] == 0x00 && apdu[1] == 0xB2 {
                    let record = apdu[2];
                    let p2 = apdu[3];
                    let mut calls = read_record_calls.lock().await;
                    calls.push((record, p2));
                    match calls.len() {
                        1 => Ok(mock_response(visa_record, 0x90, 0x00)),
                        2 => Ok(mock_response(Vec::new(), 0x6A, 0x83)),
                        _ => Ok(mock_response(Vec::new(), 0x90, 0x00)),
                    }
                } else if apdu == select_by_aid(&aid_bytes) {
                    Ok(mock_response(Vec::new(), 0x90, 0x00))
                } else if apdu == gpo_empty_pdol() {
                    Ok(mock_response(gpo_response, 0x90, 0x00))
                } else {
                    Ok(mock_response(Vec::new(), 0x6A, 0x82))
                }
            })
        };

        let result = EmvHandler.interrogate(&send).await;
        assert!(result.success);

        let calls = read_record_calls.lock().await;
        // calls[0..2] are the SFI discovery loop (record 1 succeeds, record 2
        // fails and ends the loop); calls[2..] are the AFL-driven reads for
        // records 1, 2 and 3, each addressing sfi=1 via P2 = 0x0C.
        assert_eq!(calls[2..], [(1, 0x0C), (2, 0x0C), (3, 0x0C)]);
    }
}
