//! Handler registry: priority-ordered lookup across the card-family plugins
//! (spec.md §4.6).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::handler::{BoxedSend, DetectionResult, Handler};

/// One registered handler plus the priority it was registered with. Higher
/// numbers run first (spec.md §4.6 "re-sorts descending by priority").
struct Entry {
    priority: u32,
    handler: Arc<dyn Handler>,
}

/// Holds every known card-family handler, in priority order (spec.md §4.6).
/// `register` keeps the list sorted descending by priority so
/// `detect_handlers` never has to re-sort on the hot path.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<Entry>,
}

/// One handler's detection outcome, attributed back to its `handlerId`
/// (spec.md §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub handler_id: String,
    pub result: DetectionResult,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every handler built into this crate, at the priority order
    /// spec.md §4.6 calls for: protocol-specific payment/identity handlers
    /// before memory-card handlers, with the fully generic Java Card handler
    /// last so it never shadows a more specific match. Priorities descend
    /// from the most specific handler to the most generic.
    pub fn with_default_handlers() -> Self {
        let mut registry = Self::new();
        registry.register(110, Arc::new(crate::handler::emv::EmvHandler));
        registry.register(100, Arc::new(crate::handler::piv::PivHandler));
        registry.register(90, Arc::new(crate::handler::openpgp::OpenPgpHandler));
        registry.register(80, Arc::new(crate::handler::fido::FidoHandler));
        registry.register(70, Arc::new(crate::handler::eid::EidHandler));
        registry.register(60, Arc::new(crate::handler::health::HealthCardHandler));
        registry.register(50, Arc::new(crate::handler::pkcs15::Pkcs15Handler));
        registry.register(40, Arc::new(crate::handler::sim::SimHandler));
        registry.register(30, Arc::new(crate::handler::desfire::DesfireHandler));
        registry.register(20, Arc::new(crate::handler::mifare_classic::MifareClassicHandler));
        registry.register(10, Arc::new(crate::handler::javacard::JavaCardHandler));
        registry
    }

    /// Registers a handler at the given priority; higher runs earlier.
    /// Re-registering the same `id()` replaces the existing entry in place
    /// and re-sorts (spec.md §4.6 `register`/`unregister`).
    pub fn register(&mut self, priority: u32, handler: Arc<dyn Handler>) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.handler.id() == handler.id()) {
            existing.priority = priority;
            existing.handler = handler;
            self.entries.sort_by_key(|e| std::cmp::Reverse(e.priority));
            return;
        }
        self.entries.push(Entry { priority, handler });
        self.entries.sort_by_key(|e| std::cmp::Reverse(e.priority));
    }

    pub fn unregister(&mut self, handler_id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.handler.id() != handler_id);
        self.entries.len() != before
    }

    pub fn get(&self, handler_id: &str) -> Option<Arc<dyn Handler>> {
        self.entries
            .iter()
            .find(|e| e.handler.id() == handler_id)
            .map(|e| e.handler.clone())
    }

    pub fn handlers(&self) -> impl Iterator<Item = &Arc<dyn Handler>> {
        self.entries.iter().map(|e| &e.handler)
    }

    /// Runs every registered handler's `detect` in priority order, against
    /// the same ATR and send callback, and returns every result that claims
    /// detection (spec.md §4.6 `detectHandlers`), sorted by confidence
    /// descending so the caller can read the best match off the front.
    pub async fn detect_handlers(
        &self,
        atr: &[u8],
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> Vec<Detection> {
        let mut detections = Vec::new();
        for entry in &self.entries {
            let result = entry.handler.detect(atr, send).await;
            if result.detected {
                detections.push(Detection {
                    handler_id: entry.handler.id().to_string(),
                    result,
                });
            }
        }
        detections.sort_by(|a, b| b.result.confidence.cmp(&a.result.confidence));
        detections
    }

    /// The single best detection, i.e. the highest-confidence entry of
    /// [`Self::detect_handlers`], ties broken by priority order (spec.md
    /// §4.6 `detectBestHandler`).
    pub async fn detect_best_handler(
        &self,
        atr: &[u8],
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> Option<Detection> {
        self.detect_handlers(atr, send).await.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{CommandContext, CommandDescriptor, HandlerSessionState, InterrogationResult};
    use crate::error::HandlerError;
    use crate::transport::Response;
    use async_trait::async_trait;
    use chrono::Utc;

    struct StubHandler {
        id: &'static str,
        confidence: u8,
    }

    #[async_trait]
    impl Handler for StubHandler {
        fn id(&self) -> &'static str {
            self.id
        }

        fn name(&self) -> &'static str {
            self.id
        }

        fn description(&self) -> &'static str {
            "stub"
        }

        async fn detect(&self, _atr: &[u8], _send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync)) -> DetectionResult {
            if self.confidence == 0 {
                DetectionResult::not_detected()
            } else {
                DetectionResult::detected(self.confidence, self.id)
            }
        }

        fn get_commands(&self, _metadata: Option<&std::collections::HashMap<String, serde_json::Value>>) -> Vec<CommandDescriptor> {
            Vec::new()
        }

        async fn execute_command(
            &self,
            _command_id: &str,
            _context: &mut CommandContext<'_>,
        ) -> Result<Response, HandlerError> {
            Ok(Response {
                id: "test".to_string(),
                sw1: 0x90,
                sw2: 0x00,
                data: Vec::new(),
                timestamp: Utc::now(),
                hex: "9000".to_string(),
                meaning: None,
            })
        }

        async fn interrogate(&self, _send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync)) -> InterrogationResult {
            InterrogationResult::ok(Vec::new())
        }
    }

    fn noop_send() -> impl Fn(Vec<u8>) -> BoxedSend + Send + Sync {
        |_apdu| {
            Box::pin(async {
                Ok(Response {
                    id: "noop".to_string(),
                    sw1: 0x6A,
                    sw2: 0x82,
                    data: Vec::new(),
                    timestamp: Utc::now(),
                    hex: "6A82".to_string(),
                    meaning: None,
                })
            })
        }
    }

    #[tokio::test]
    async fn detect_handlers_sorts_by_confidence_descending() {
        let mut registry = HandlerRegistry::new();
        registry.register(10, Arc::new(StubHandler { id: "low", confidence: 20 }));
        registry.register(20, Arc::new(StubHandler { id: "high", confidence: 90 }));
        registry.register(30, Arc::new(StubHandler { id: "none", confidence: 0 }));

        let send = noop_send();
        let detections = registry.detect_handlers(&[], &send).await;
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].handler_id, "high");
        assert_eq!(detections[1].handler_id, "low");
    }

    #[tokio::test]
    async fn detect_best_handler_returns_the_top_entry() {
        let mut registry = HandlerRegistry::new();
        registry.register(10, Arc::new(StubHandler { id: "a", confidence: 40 }));
        registry.register(20, Arc::new(StubHandler { id: "b", confidence: 60 }));

        let send = noop_send();
        let best = registry.detect_best_handler(&[], &send).await.unwrap();
        assert_eq!(best.handler_id, "b");
    }

    #[test]
    fn register_with_existing_id_replaces_in_place() {
        let mut registry = HandlerRegistry::new();
        registry.register(10, Arc::new(StubHandler { id: "a", confidence: 10 }));
        registry.register(10, Arc::new(StubHandler { id: "a", confidence: 50 }));
        assert_eq!(registry.entries.len(), 1);
    }

    #[test]
    fn unregister_removes_by_id() {
        let mut registry = HandlerRegistry::new();
        registry.register(10, Arc::new(StubHandler { id: "a", confidence: 10 }));
        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert!(registry.get("a").is_none());
    }
}
