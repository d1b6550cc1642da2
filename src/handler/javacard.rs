//! Generic Java Card / GlobalPlatform applet handler (spec.md §4.5).
//!
//! The lowest-confidence, most generic handler: it never claims a card
//! strongly, since almost anything ISO 7816-compliant answers a bare
//! SELECT. GlobalPlatform's GET STATUS is the one command that actually
//! distinguishes a GlobalPlatform-managed card from a plain one.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::codec::{hex_to_bytes, is_sw_success};
use crate::error::HandlerError;
use crate::transport::Response;

use super::{
    BoxedSend, CommandContext, CommandDescriptor, DetectionResult, DiscoveredApp, Handler,
    InterrogationResult, Parameter, ParameterKind,
};

pub struct JavaCardHandler;

fn select_default() -> Vec<u8> {
    vec![0x00, 0xA4, 0x04, 0x00, 0x00]
}

fn select_applet(aid: &[u8]) -> Vec<u8> {
    let mut apdu = vec![0x00, 0xA4, 0x04, 0x00, aid.len() as u8];
    apdu.extend_from_slice(aid);
    apdu.push(0x00);
    apdu
}

fn get_status(scope: u8, p2: u8) -> Vec<u8> {
    vec![0x80, 0xF2, scope, p2, 0x02, 0x4F, 0x00, 0x00]
}

/// Runs GlobalPlatform GET STATUS to completion: SW `6310` means "more
/// data, call again with P2=`01`" (spec.md §4.5). Aggregates every frame's
/// data into one buffer and returns the final response's status word.
async fn get_status_all(
    scope: u8,
    send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
) -> Result<Response, HandlerError> {
    let mut response = send(get_status(scope, 0x00)).await?;
    let mut data = response.data.clone();
    while response.sw1 == 0x63 && response.sw2 == 0x10 {
        response = send(get_status(scope, 0x01)).await?;
        data.extend_from_slice(&response.data);
    }
    response.data = data;
    Ok(response)
}

#[async_trait]
impl Handler for JavaCardHandler {
    fn id(&self) -> &'static str {
        "javacard"
    }

    fn name(&self) -> &'static str {
        "Java Card"
    }

    fn description(&self) -> &'static str {
        "Generic Java Card / GlobalPlatform-managed applet"
    }

    fn workflow(&self) -> Option<&'static str> {
        Some("javacard")
    }

    async fn detect(
        &self,
        _atr: &[u8],
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> DetectionResult {
        if let Ok(response) = get_status_all(0x40, send).await {
            if is_sw_success(response.sw1) {
                return DetectionResult::detected(70, "javacard")
                    .with_metadata("globalplatform", true);
            }
        }

        match send(select_default()).await {
            Ok(response) if is_sw_success(response.sw1) => {
                DetectionResult::detected(20, "javacard")
            }
            _ => DetectionResult::not_detected(),
        }
    }

    fn get_commands(&self, _metadata: Option<&HashMap<String, Value>>) -> Vec<CommandDescriptor> {
        vec![
            CommandDescriptor::new("select-default", "Select Default", "SELECT with no AID (implicit selection)", "discovery"),
            CommandDescriptor::new("select-applet", "Select Applet", "SELECT by AID", "discovery")
                .with_params(vec![
                    Parameter::new("aid", ParameterKind::Hex, "Applet AID").required()
                ]),
            CommandDescriptor::new(
                "get-status-applications",
                "Get Status (Applications)",
                "GlobalPlatform GET STATUS, application scope",
                "discovery",
            ),
            CommandDescriptor::new(
                "get-status-issuer-domain",
                "Get Status (Issuer Security Domain)",
                "GlobalPlatform GET STATUS, ISD scope",
                "discovery",
            ),
            CommandDescriptor::new("send-raw-apdu", "Send Raw APDU", "Send an arbitrary APDU", "utility")
                .with_params(vec![
                    Parameter::new("apdu", ParameterKind::Hex, "Complete APDU bytes").required()
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
            "select-default" => select_default(),
            "select-applet" => {
                let aid = require_hex(params, "aid")?;
                select_applet(&aid)
            }
            "get-status-applications" => return get_status_all(0x40, context.send).await,
            "get-status-issuer-domain" => return get_status_all(0x80, context.send).await,
            "send-raw-apdu" => require_hex(params, "apdu")?,
            other => return Err(HandlerError::UnknownCommand(other.to_string())),
        };

        context.send_command(apdu).await
    }

    async fn interrogate(
        &self,
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> InterrogationResult {
        match get_status_all(0x40, send).await {
            Ok(r) if is_sw_success(r.sw1) => InterrogationResult::ok(vec![DiscoveredApp {
                aid: String::new(),
                name: Some("Java Card".to_string()),
                label: Some(format!("GET STATUS (applications), {} bytes", r.data.len())),
                priority: None,
                handler_id: "javacard".to_string(),
            }]),
            _ => InterrogationResult::failed("GET STATUS not supported; not a GlobalPlatform card"),
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
    fn select_default_has_empty_data_field() {
        assert_eq!(select_default(), vec![0x00, 0xA4, 0x04, 0x00, 0x00]);
    }

    #[test]
    fn get_status_uses_globalplatform_class() {
        let apdu = get_status(0x40, 0x00);
        assert_eq!(apdu[0], 0x80);
        assert_eq!(apdu[1], 0xF2);
        assert_eq!(apdu[2], 0x40);
        assert_eq!(apdu[3], 0x00);
    }

    #[test]
    fn get_status_continuation_sets_p2_to_one() {
        let apdu = get_status(0x40, 0x01);
        assert_eq!(apdu[3], 0x01);
    }

    #[tokio::test]
    async fn get_status_all_aggregates_6310_continuations() {
        use chrono::Utc;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let call = Arc::new(AtomicUsize::new(0));
        let call_clone = call.clone();
        let send = move |_apdu: Vec<u8>| -> BoxedSend {
            let n = call_clone.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let (data, sw1, sw2) = if n == 0 {
                    (vec![0xAA], 0x63, 0x10)
                } else {
                    (vec![0xBB], 0x90, 0x00)
                };
                Ok(Response {
                    id: "t".to_string(),
                    sw1,
                    sw2,
                    data,
                    timestamp: Utc::now(),
                    hex: String::new(),
                    meaning: None,
                })
            })
        };

        let result = get_status_all(0x40, &send).await.unwrap();
        assert_eq!(result.sw1, 0x90);
        assert_eq!(result.data, vec![0xAA, 0xBB]);
    }
}
