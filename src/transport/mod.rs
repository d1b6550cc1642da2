//! APDU transport/session layer (spec.md §4.2, §5, §8).
//!
//! Wraps a raw `transmit(bytes) -> bytes` reader primitive into
//! `Transport::send`, handling GET RESPONSE chaining, SIM-class chaining and
//! DESFire multi-frame continuation, and emitting a paired
//! `CommandIssued`/`ResponseReceived` event per external call so a reducer
//! can log request/response as one unit (spec.md §4.2 "Correlation").

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::bytes_to_hex;
use crate::error::TransportError;

/// The reader-agnostic primitive the core requires from its driver
/// (spec.md §6, "Downward — reader driver"). Implementations surface
/// physical/driver failures as [`TransportError`]; any non-success status
/// word the card returns is NOT an error (spec.md §7: `ApduStatus`).
#[async_trait]
pub trait ReaderDriver: Send + Sync {
    async fn transmit(&self, apdu: &[u8]) -> Result<Vec<u8>, TransportError>;
}

/// An outgoing APDU, correlated with its eventual [`Response`] by `id`
/// (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub apdu: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub hex: String,
}

/// The (possibly chained/reassembled) response to a [`Command`]
/// (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,
    pub sw1: u8,
    pub sw2: u8,
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub hex: String,
    pub meaning: Option<String>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }
}

/// Per-card-session transport wrapper (spec.md §4.2). Stateless beyond a
/// correlation-id counter; the driver and the session-event callback are
/// injected, matching the "global mutable state" re-architecture note in
/// spec.md §9.
pub struct Transport<D: ReaderDriver> {
    driver: D,
    next_id: AtomicU64,
    on_event: Option<Arc<dyn Fn(TransportEvent) + Send + Sync>>,
}

/// Events a [`Transport`] emits around every `send` call, for a reducer to
/// fold into session state (spec.md §4.7 `CommandIssued`/`ResponseReceived`).
#[derive(Debug, Clone)]
pub enum TransportEvent {
    CommandIssued(Command),
    ResponseReceived(Response),
}

impl<D: ReaderDriver> Transport<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            next_id: AtomicU64::new(1),
            on_event: None,
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn Fn(TransportEvent) + Send + Sync>) -> Self {
        self.on_event = Some(sink);
        self
    }

    fn next_correlation_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("cmd-{n}")
    }

    fn emit(&self, event: TransportEvent) {
        if let Some(sink) = &self.on_event {
            sink(event);
        }
    }

    /// Sends one logical APDU, transparently following any chaining the
    /// card requests, and returns the single reassembled [`Response]`
    /// (spec.md §4.2).
    pub async fn send(&self, apdu: &[u8]) -> Result<Response, TransportError> {
        let id = self.next_correlation_id();
        let command = Command {
            id: id.clone(),
            apdu: apdu.to_vec(),
            timestamp: Utc::now(),
            hex: bytes_to_hex(apdu),
        };
        self.emit(TransportEvent::CommandIssued(command.clone()));

        let raw = self.driver.transmit(apdu).await?;
        let response = self.chain(&id, apdu, raw).await?;

        self.emit(TransportEvent::ResponseReceived(response.clone()));
        Ok(response)
    }

    async fn chain(
        &self,
        id: &str,
        original_apdu: &[u8],
        mut raw: Vec<u8>,
    ) -> Result<Response, TransportError> {
        let mut accumulated = Vec::new();
        let sim_class = original_apdu.first() == Some(&0xA0);

        loop {
            let (data, sw1, sw2) = split_raw(&raw)?;
            accumulated.extend_from_slice(data);

            match (sw1, sw2) {
                (0x61, le) if sim_class => {
                    let get_response = [0xA0, 0xC0, 0x00, 0x00, le];
                    raw = self.driver.transmit(&get_response).await?;
                }
                (0x9F, le) if sim_class => {
                    let get_response = [0xA0, 0xC0, 0x00, 0x00, le];
                    raw = self.driver.transmit(&get_response).await?;
                }
                (0x61, le) => {
                    let get_response = [0x00, 0xC0, 0x00, 0x00, le];
                    raw = self.driver.transmit(&get_response).await?;
                }
                (0x6C, le) => {
                    let mut retry = original_apdu.to_vec();
                    if let Some(last) = retry.last_mut() {
                        *last = le;
                    }
                    let retried = self.driver.transmit(&retry).await?;
                    let (data, sw1, sw2) = split_raw(&retried)?;
                    accumulated.extend_from_slice(data);
                    return Ok(self.finish(id, sw1, sw2, accumulated));
                }
                (0x91, 0xAF) => {
                    let additional_frame = [0x90, 0xAF, 0x00, 0x00, 0x00];
                    raw = self.driver.transmit(&additional_frame).await?;
                }
                (sw1, sw2) => {
                    return Ok(self.finish(id, sw1, sw2, accumulated));
                }
            }
        }
    }

    fn finish(&self, id: &str, sw1: u8, sw2: u8, data: Vec<u8>) -> Response {
        let mut hex = bytes_to_hex(&data);
        hex.push_str(&format!("{:02X}{:02X}", sw1, sw2));
        Response {
            id: id.to_string(),
            sw1,
            sw2,
            data,
            timestamp: Utc::now(),
            hex,
            meaning: Some(crate::codec::sw_description(sw1, sw2)),
        }
    }
}

fn split_raw(raw: &[u8]) -> Result<(&[u8], u8, u8), TransportError> {
    if raw.len() < 2 {
        return Err(TransportError::ProtocolError {
            detail: "response shorter than two status-word bytes".to_string(),
        });
    }
    let (data, sw) = raw.split_at(raw.len() - 2);
    Ok((data, sw[0], sw[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedDriver {
        responses: Mutex<Vec<Vec<u8>>>,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl ScriptedDriver {
        fn new(responses: Vec<Vec<u8>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReaderDriver for ScriptedDriver {
        async fn transmit(&self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
            self.sent.lock().unwrap().push(apdu.to_vec());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(TransportError::ProtocolError {
                    detail: "driver exhausted".to_string(),
                });
            }
            Ok(responses.remove(0))
        }
    }

    #[tokio::test]
    async fn get_response_chain() {
        // Scenario 4: driver returns 61 0A, then 10 bytes + 9000.
        let mut ten_bytes = vec![0xAAu8; 10];
        ten_bytes.extend_from_slice(&[0x90, 0x00]);
        let driver = ScriptedDriver::new(vec![vec![0x61, 0x0A], ten_bytes]);
        let transport = Transport::new(driver);

        let response = transport.send(&[0x00, 0xA4, 0x04, 0x00]).await.unwrap();
        assert_eq!(response.sw1, 0x90);
        assert_eq!(response.sw2, 0x00);
        assert_eq!(response.data, vec![0xAAu8; 10]);
        assert_eq!(
            transport.driver.sent.lock().unwrap()[1],
            vec![0x00, 0xC0, 0x00, 0x00, 0x0A]
        );
    }

    #[tokio::test]
    async fn wrong_length_retries_once_with_corrected_le() {
        let driver = ScriptedDriver::new(vec![
            vec![0x6C, 0x1A],
            vec![0x01, 0x02, 0x90, 0x00],
        ]);
        let transport = Transport::new(driver);
        let response = transport
            .send(&[0x00, 0xB2, 0x01, 0x0C, 0x00])
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(response.data, vec![0x01, 0x02]);
        assert_eq!(
            transport.driver.sent.lock().unwrap()[1],
            vec![0x00, 0xB2, 0x01, 0x0C, 0x1A]
        );
    }

    #[tokio::test]
    async fn desfire_additional_frame_chain() {
        // Scenario 3: three frames, 91AF, 91AF, 91 00.
        let driver = ScriptedDriver::new(vec![
            vec![0x01, 0x91, 0xAF],
            vec![0x02, 0x91, 0xAF],
            vec![0x03, 0x91, 0x00],
        ]);
        let transport = Transport::new(driver);
        let response = transport.send(&[0x90, 0x60, 0x00, 0x00, 0x00]).await.unwrap();
        assert_eq!(response.sw1, 0x91);
        assert_eq!(response.sw2, 0x00);
        assert_eq!(response.data, vec![0x01, 0x02, 0x03]);
        let sent = transport.driver.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1], vec![0x90, 0xAF, 0x00, 0x00, 0x00]);
        assert_eq!(sent[2], vec![0x90, 0xAF, 0x00, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn sim_class_chains_on_9f_status() {
        let driver = ScriptedDriver::new(vec![vec![0x9F, 0x11], vec![0xAB; 17].into_iter().chain([0x90, 0x00]).collect()]);
        let transport = Transport::new(driver);
        let response = transport.send(&[0xA0, 0xB0, 0x00, 0x00, 0x00]).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.data.len(), 17);
        assert_eq!(
            transport.driver.sent.lock().unwrap()[1],
            vec![0xA0, 0xC0, 0x00, 0x00, 0x11]
        );
    }

    #[tokio::test]
    async fn command_and_response_are_paired_by_id() {
        let events: Arc<Mutex<Vec<TransportEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        let driver = ScriptedDriver::new(vec![vec![0x90, 0x00]]);
        let transport = Transport::new(driver).with_event_sink(Arc::new(move |event| {
            events_clone.lock().unwrap().push(event);
        }));

        transport.send(&[0x00, 0xA4, 0x04, 0x00]).await.unwrap();
        let recorded = events.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        match (&recorded[0], &recorded[1]) {
            (TransportEvent::CommandIssued(cmd), TransportEvent::ResponseReceived(resp)) => {
                assert_eq!(cmd.id, resp.id);
            }
            _ => panic!("expected CommandIssued followed by ResponseReceived"),
        }
    }
}
