//! Reference `ReaderDriver` over the system PC/SC service, gated behind the
//! `pcsc-adapter` feature (spec.md §6 "Downward — reader driver"; grounded
//! on the teacher's `smart_card.rs` `apdu_transmit`/`spawn_blocking` pattern,
//! adapted from a Tauri async runtime to bare `tokio`).

use std::ffi::CString;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error};
use pcsc::{Card, Context, Protocols, ShareMode};
use tokio::sync::Mutex;

use crate::error::TransportError;
use crate::transport::ReaderDriver;

const MAX_BUFFER_SIZE: usize = 260;

pub struct PcscReaderDriver {
    reader_name: CString,
    card: Arc<Mutex<Card>>,
}

impl PcscReaderDriver {
    /// Connects to a named reader in shared mode, negotiating T=0 or T=1
    /// (spec.md §3 `CardProtocol`).
    pub fn connect(reader_name: &str) -> Result<Self, TransportError> {
        let reader_name = CString::new(reader_name)
            .map_err(|e| TransportError::ProtocolError { detail: e.to_string() })?;

        let ctx = Context::establish(pcsc::Scope::User).map_err(|e| {
            error!("failed to establish PC/SC context: {e}");
            TransportError::ProtocolError { detail: e.to_string() }
        })?;

        let card = ctx
            .connect(&reader_name, ShareMode::Shared, Protocols::ANY)
            .map_err(|e| {
                error!("failed to connect to reader {:?}: {e}", reader_name);
                TransportError::ProtocolError { detail: e.to_string() }
            })?;

        Ok(Self {
            reader_name,
            card: Arc::new(Mutex::new(card)),
        })
    }

    /// Connects to the first reader the PC/SC service reports, for quick
    /// single-reader demos (the `cardspy-cli` binary).
    pub fn connect_first_available() -> Result<Self, TransportError> {
        let ctx = Context::establish(pcsc::Scope::User)
            .map_err(|e| TransportError::ProtocolError { detail: e.to_string() })?;

        let mut buf = vec![0u8; 2048];
        let first_name = ctx
            .list_readers(&mut buf)
            .map_err(|e| TransportError::ProtocolError { detail: e.to_string() })?
            .next()
            .map(|name| name.to_owned());

        match first_name {
            Some(name) => Self::connect(&name.to_string_lossy()),
            None => Err(TransportError::Disconnected),
        }
    }
}

#[async_trait]
impl ReaderDriver for PcscReaderDriver {
    async fn transmit(&self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        debug!(
            "apdu_transmit() reader={:?} apdu={}",
            self.reader_name,
            crate::codec::bytes_to_hex(apdu)
        );

        let card = self.card.clone();
        let apdu = apdu.to_vec();

        let result = tokio::task::spawn_blocking(move || {
            let mut buffer = [0u8; MAX_BUFFER_SIZE];
            let locked = card.blocking_lock();
            locked
                .transmit(&apdu, &mut buffer)
                .map(|response| response.to_vec())
                .map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| TransportError::ProtocolError { detail: e.to_string() })?;

        result.map_err(|detail| {
            error!("APDU transmit failed: {detail}");
            TransportError::ProtocolError { detail }
        })
    }
}
