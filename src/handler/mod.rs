//! Handler plugin contract (spec.md §4.3) and the per-card-family handlers
//! built on top of it (spec.md §4.4, §4.5).

pub mod desfire;
pub mod eid;
pub mod emv;
pub mod fido;
pub mod health;
pub mod javacard;
pub mod known_aids;
pub mod mifare_classic;
pub mod openpgp;
pub mod pkcs15;
pub mod piv;
pub mod sim;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::TlvNode;
use crate::error::HandlerError;
use crate::transport::Response;

/// A card application discovered during interrogation (spec.md §3).
/// Uniqueness: `(reader, aid)`, enforced by the reducer, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredApp {
    pub aid: String,
    pub name: Option<String>,
    pub label: Option<String>,
    pub priority: Option<u8>,
    pub handler_id: String,
}

/// Result of a handler's detection probe (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detected: bool,
    pub confidence: u8,
    pub card_type: Option<String>,
    pub metadata: HashMap<String, Value>,
}

impl DetectionResult {
    pub fn not_detected() -> Self {
        Self {
            detected: false,
            confidence: 0,
            card_type: None,
            metadata: HashMap::new(),
        }
    }

    pub fn detected(confidence: u8, card_type: impl Into<String>) -> Self {
        Self {
            detected: true,
            confidence: confidence.min(100),
            card_type: Some(card_type.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Result of a full discovery pass (spec.md §4.3). Partial results are
/// `success: true` as long as at least one artefact was obtained
/// (spec.md §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterrogationResult {
    pub success: bool,
    pub applications: Vec<DiscoveredApp>,
    pub error: Option<String>,
}

impl InterrogationResult {
    pub fn ok(applications: Vec<DiscoveredApp>) -> Self {
        Self {
            success: true,
            applications,
            error: None,
        }
    }

    pub fn partial(applications: Vec<DiscoveredApp>, error: impl Into<String>) -> Self {
        let success = !applications.is_empty();
        Self {
            success,
            applications,
            error: Some(error.into()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            applications: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Typed command parameter kinds, a closed set (spec.md §4.3, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParameterKind {
    String,
    Number,
    Hex,
    Boolean,
    Select { options: Vec<String> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    pub description: String,
    pub required: bool,
    pub default_value: Option<Value>,
    /// Regex validation, applicable to `String`/`Hex` parameters.
    pub validation: Option<String>,
}

impl Parameter {
    pub fn new(name: &str, kind: ParameterKind, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            required: false,
            default_value: None,
            validation: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A single command a handler advertises (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub requires_confirmation: bool,
    pub is_destructive: bool,
    pub parameters: Vec<Parameter>,
}

impl CommandDescriptor {
    pub fn new(id: &str, name: &str, description: &str, category: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            requires_confirmation: false,
            is_destructive: false,
            parameters: Vec::new(),
        }
    }

    pub fn destructive(mut self) -> Self {
        self.is_destructive = true;
        self.requires_confirmation = true;
        self
    }

    pub fn with_params(mut self, params: Vec<Parameter>) -> Self {
        self.parameters = params;
        self
    }
}

/// Per-card state a handler may need across calls, explicitly threaded in
/// by the caller instead of cached on the handler instance (spec.md §9 open
/// question, resolved in favour of stateless handlers: `SPEC_FULL.md` §4.3).
#[derive(Debug, Clone, Default)]
pub struct HandlerSessionState {
    pub selected_aid: Option<String>,
    pub discovered_applications: Vec<DiscoveredApp>,
    pub pin_verified: bool,
    pub extra: HashMap<String, Value>,
}

/// Parameters supplied by the caller of `executeCommand`, by name.
pub type CommandParameters = HashMap<String, Value>;

/// Everything a handler needs to execute one command: the outbound APDU
/// sink plus the mutable per-card state (spec.md §4.3).
pub struct CommandContext<'a> {
    pub send: &'a (dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    pub state: &'a mut HandlerSessionState,
    pub parameters: CommandParameters,
}

/// Boxed future for `sendCommand`, since `Handler` is used as `dyn Handler`
/// and trait object safety rules out a generic associated future type here.
pub type BoxedSend =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, HandlerError>> + Send>>;

impl<'a> CommandContext<'a> {
    pub async fn send_command(&self, apdu: Vec<u8>) -> Result<Response, HandlerError> {
        (self.send)(apdu).await
    }
}

/// The capability contract every card-family plugin implements
/// (spec.md §4.3). No inheritance: a flat set of operations a registry can
/// call on any `dyn Handler`, matching the re-architecture note in
/// spec.md §9 ("Class hierarchy of handlers").
#[async_trait]
pub trait Handler: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Opt-in UI tag; the core never branches on it.
    fn workflow(&self) -> Option<&'static str> {
        None
    }

    /// Cheap, idempotent, side-effect-free-beyond-SELECT detection probe.
    /// Never panics/propagates on unexpected responses: a probe failure is
    /// `detected = false`, not an error (spec.md §4.3, §9).
    async fn detect(
        &self,
        atr: &[u8],
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> DetectionResult;

    /// Static or metadata-derived command catalogue (spec.md §4.3).
    fn get_commands(&self, metadata: Option<&HashMap<String, Value>>) -> Vec<CommandDescriptor>;

    /// Dispatches to handler-internal logic building one APDU (or a short
    /// fixed sequence of them) from `commandId` and `context.parameters`.
    async fn execute_command(
        &self,
        command_id: &str,
        context: &mut CommandContext<'_>,
    ) -> Result<Response, HandlerError>;

    /// Full discovery sequence over the handler's safe, non-destructive,
    /// no-PIN data objects/files (spec.md §4.3).
    async fn interrogate(
        &self,
        send: &(dyn Fn(Vec<u8>) -> BoxedSend + Send + Sync),
    ) -> InterrogationResult;
}

/// Wraps a [`crate::transport::Transport`] `send` call as the
/// `Fn(Vec<u8>) -> BoxedSend` shape handlers are given, so callers don't
/// need to hand-write the boxing at every call site.
pub fn boxed_sender<F, Fut>(f: Arc<F>) -> impl Fn(Vec<u8>) -> BoxedSend + Send + Sync
where
    F: Fn(Vec<u8>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    move |apdu| {
        let f = f.clone();
        Box::pin(async move { f(apdu).await })
    }
}
