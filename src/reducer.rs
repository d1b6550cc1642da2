//! Pure `(state, action) -> state` session reducer (spec.md §4.7).
//!
//! Nothing here touches a reader or the clock: every [`Action`] carries
//! whatever timestamped data it needs, so `reduce` stays a plain function
//! and is trivial to unit test (spec.md §4.7, §9 "global mutable state").

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::handler::DiscoveredApp;
use crate::model::{Card, Device};
use crate::registry::Detection;
use crate::transport::{Command, Response};

/// One line of a device's activity log: either a card-lifecycle event or a
/// command paired with its eventual response (spec.md §4.7 `CommandIssued`,
/// `ResponseReceived`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogEntry {
    CardInserted { atr: String },
    Command { command: Command, response: Option<Response> },
}

/// Per-device session: everything that resets when the card in that device
/// is removed or the device itself is deactivated (spec.md §4.7).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub card: Option<Card>,
    pub log: Vec<LogEntry>,
    pub applications: Vec<DiscoveredApp>,
    pub handlers: Vec<Detection>,
}

/// The full session state a UI or CLI would render (spec.md §3, §4.7).
/// Keyed by device name, matching `Device::name`'s per-process uniqueness.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppState {
    pub devices: Vec<Device>,
    pub sessions: HashMap<String, Session>,
    pub active_device: Option<String>,
    pub active_handler_id: Option<String>,
    pub selected_application: Option<DiscoveredApp>,
    pub show_shortcut_help: bool,
}

impl AppState {
    fn session(&self, device: &str) -> Option<&Session> {
        self.sessions.get(device)
    }

    fn session_mut(&mut self, device: &str) -> &mut Session {
        self.sessions.entry(device.to_string()).or_default()
    }

    fn is_active(&self, device: &str) -> bool {
        self.active_device.as_deref() == Some(device)
    }
}

/// Every event the session can fold into state (spec.md §4.7).
#[derive(Debug, Clone)]
pub enum Action {
    Initialize,
    SetActiveDevice { device: String },
    DeviceActivated { device: Device },
    DeviceDeactivated { device: String },
    CardInserted { device: String, card: Card },
    CardRemoved { device: String },
    CommandIssued { device: String, command: Command },
    ResponseReceived { device: String, response: Response },
    ApplicationFound { device: String, application: DiscoveredApp },
    ApplicationSelected { application: Option<DiscoveredApp> },
    HandlersDetected { device: String, handlers: Vec<Detection> },
    ActiveHandlerChanged { device: String, handler_id: String },
    ClearLog { device: String },
    ToggleShortcutHelp,
    HideShortcutHelp,
}

/// Folds one [`Action`] into `state`, returning a new [`AppState`] (spec.md
/// §4.7). Never panics: unrecognised or out-of-order actions degrade to the
/// closest sensible state rather than erroring (spec.md §9).
pub fn reduce(state: &AppState, action: Action) -> AppState {
    let mut next = state.clone();

    match action {
        Action::Initialize => next = AppState::default(),

        Action::SetActiveDevice { device } => next.active_device = Some(device),

        // Idempotent on device name: no duplicate device entries, and a
        // session is created if one doesn't already exist (spec.md §4.7).
        Action::DeviceActivated { device } => {
            let device_name = device.name.clone();
            if let Some(existing) = next.devices.iter_mut().find(|d| d.name == device.name) {
                *existing = device;
            } else {
                next.devices.push(device.clone());
            }
            next.sessions.entry(device_name).or_default();
        }

        // Removes device, session, and card for that device; if it was the
        // active device, also clears the active-handler/selection state that
        // pointed at it (spec.md §4.7; the latter isn't spelled out in the
        // spec text but follows from "leaves other state untouched" applying
        // to *other devices'* state, not to dangling pointers at this one).
        Action::DeviceDeactivated { device } => {
            let was_active = next.is_active(&device);
            next.devices.retain(|d| d.name != device);
            next.sessions.remove(&device);
            if was_active {
                next.active_device = None;
                next.active_handler_id = None;
                next.selected_application = None;
            }
        }

        Action::CardInserted { device, card } => {
            let atr = card.atr.clone();
            let session = next.session_mut(&device);
            session.card = Some(card);
            session.log.push(LogEntry::CardInserted { atr });
        }

        // Clears the card and everything derived from it; if this was the
        // active device, also clears the active-handler selection (spec.md
        // §4.7).
        Action::CardRemoved { device } => {
            let was_active = next.is_active(&device);
            {
                let session = next.session_mut(&device);
                session.card = None;
                session.applications.clear();
                session.handlers.clear();
            }
            if was_active {
                next.active_handler_id = None;
                next.selected_application = None;
            }
        }

        Action::CommandIssued { device, command } => {
            next.session_mut(&device)
                .log
                .push(LogEntry::Command { command, response: None });
        }

        // Finds the pending `Command` entry with a matching id and attaches
        // the response; a no-op if none is pending (spec.md §4.7).
        Action::ResponseReceived { device, response } => {
            if let Some(session) = next.sessions.get_mut(&device) {
                for entry in session.log.iter_mut().rev() {
                    if let LogEntry::Command { command, response: slot } = entry {
                        if command.id == response.id && slot.is_none() {
                            *slot = Some(response);
                            break;
                        }
                    }
                }
            }
        }

        // Dedupes by `aid` per device (spec.md §4.7).
        Action::ApplicationFound { device, application } => {
            let session = next.session_mut(&device);
            if !session.applications.iter().any(|a| a.aid == application.aid) {
                session.applications.push(application);
            }
        }

        Action::ApplicationSelected { application } => next.selected_application = application,

        // Stores the list and, if `device` is active and it's non-empty,
        // promotes the top entry to `activeHandlerId` (spec.md §4.7).
        Action::HandlersDetected { device, handlers } => {
            let is_active = next.is_active(&device);
            let first_id = handlers.first().map(|d| d.handler_id.clone());
            next.session_mut(&device).handlers = handlers;
            if is_active {
                if let Some(id) = first_id {
                    next.active_handler_id = Some(id);
                }
            }
        }

        // No-op if `device` is not currently active (spec.md §4.7).
        Action::ActiveHandlerChanged { device, handler_id } => {
            if next.is_active(&device) {
                next.active_handler_id = Some(handler_id);
            }
        }

        Action::ClearLog { device } => {
            if let Some(session) = next.sessions.get_mut(&device) {
                session.log.clear();
            }
        }

        Action::ToggleShortcutHelp => next.show_shortcut_help = !next.show_shortcut_help,
        Action::HideShortcutHelp => next.show_shortcut_help = false,
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::DetectionResult;
    use crate::model::CardProtocol;
    use chrono::Utc;

    fn device(name: &str) -> Device {
        Device { name: name.to_string(), is_activated: true }
    }

    fn card(device_name: &str, atr: &str) -> Card {
        Card { device_name: device_name.to_string(), atr: atr.to_string(), protocol: CardProtocol::T1 }
    }

    fn command(id: &str) -> Command {
        Command { id: id.to_string(), apdu: vec![0x00, 0xA4], timestamp: Utc::now(), hex: "00A4".to_string() }
    }

    fn response(id: &str) -> Response {
        Response {
            id: id.to_string(),
            sw1: 0x90,
            sw2: 0x00,
            data: Vec::new(),
            timestamp: Utc::now(),
            hex: "9000".to_string(),
            meaning: None,
        }
    }

    fn sample_app(aid: &str, handler_id: &str) -> DiscoveredApp {
        DiscoveredApp { aid: aid.to_string(), name: None, label: None, priority: None, handler_id: handler_id.to_string() }
    }

    #[test]
    fn device_activated_is_idempotent_and_creates_a_session() {
        let state = AppState::default();
        let once = reduce(&state, Action::DeviceActivated { device: device("reader-0") });
        let twice = reduce(&once, Action::DeviceActivated { device: device("reader-0") });
        assert_eq!(twice.devices.len(), 1);
        assert!(twice.sessions.contains_key("reader-0"));
    }

    #[test]
    fn device_deactivated_removes_device_session_and_card() {
        let state = reduce(&AppState::default(), Action::DeviceActivated { device: device("reader-0") });
        let with_card = reduce(
            &state,
            Action::CardInserted { device: "reader-0".to_string(), card: card("reader-0", "3B00") },
        );
        let gone = reduce(&with_card, Action::DeviceDeactivated { device: "reader-0".to_string() });
        assert!(gone.devices.is_empty());
        assert!(!gone.sessions.contains_key("reader-0"));
    }

    #[test]
    fn card_removed_clears_active_handler_only_for_the_active_device() {
        let state = reduce(&AppState::default(), Action::DeviceActivated { device: device("reader-0") });
        let state = reduce(&state, Action::SetActiveDevice { device: "reader-0".to_string() });
        let state = reduce(
            &state,
            Action::HandlersDetected {
                device: "reader-0".to_string(),
                handlers: vec![Detection { handler_id: "emv".to_string(), result: DetectionResult::detected(90, "emv") }],
            },
        );
        assert_eq!(state.active_handler_id.as_deref(), Some("emv"));

        let cleared = reduce(&state, Action::CardRemoved { device: "reader-0".to_string() });
        assert!(cleared.active_handler_id.is_none());
        assert!(cleared.sessions["reader-0"].handlers.is_empty());
    }

    #[test]
    fn response_received_attaches_to_matching_pending_command() {
        let state = reduce(&AppState::default(), Action::DeviceActivated { device: device("reader-0") });
        let state = reduce(
            &state,
            Action::CommandIssued { device: "reader-0".to_string(), command: command("cmd-1") },
        );
        let state = reduce(
            &state,
            Action::ResponseReceived { device: "reader-0".to_string(), response: response("cmd-1") },
        );
        match &state.sessions["reader-0"].log[0] {
            LogEntry::Command { command, response } => {
                assert_eq!(command.id, "cmd-1");
                assert_eq!(response.as_ref().map(|r| r.id.as_str()), Some("cmd-1"));
            }
            _ => panic!("expected a Command log entry"),
        }
    }

    #[test]
    fn response_received_is_a_no_op_without_a_pending_command() {
        let state = reduce(&AppState::default(), Action::DeviceActivated { device: device("reader-0") });
        let state = reduce(
            &state,
            Action::ResponseReceived { device: "reader-0".to_string(), response: response("cmd-1") },
        );
        assert!(state.sessions["reader-0"].log.is_empty());
    }

    #[test]
    fn application_found_dedupes_by_aid_per_device() {
        let state = reduce(&AppState::default(), Action::DeviceActivated { device: device("reader-0") });
        let state = reduce(
            &state,
            Action::ApplicationFound { device: "reader-0".to_string(), application: sample_app("A0000000031010", "emv") },
        );
        let state = reduce(
            &state,
            Action::ApplicationFound { device: "reader-0".to_string(), application: sample_app("A0000000031010", "emv") },
        );
        assert_eq!(state.sessions["reader-0"].applications.len(), 1);
    }

    #[test]
    fn handlers_detected_promotes_top_entry_only_when_device_is_active() {
        let state = reduce(&AppState::default(), Action::DeviceActivated { device: device("reader-0") });
        let inactive = reduce(
            &state,
            Action::HandlersDetected {
                device: "reader-0".to_string(),
                handlers: vec![Detection { handler_id: "emv".to_string(), result: DetectionResult::detected(90, "emv") }],
            },
        );
        assert!(inactive.active_handler_id.is_none());

        let active = reduce(&state, Action::SetActiveDevice { device: "reader-0".to_string() });
        let with_handlers = reduce(
            &active,
            Action::HandlersDetected {
                device: "reader-0".to_string(),
                handlers: vec![Detection { handler_id: "piv".to_string(), result: DetectionResult::detected(90, "piv") }],
            },
        );
        assert_eq!(with_handlers.active_handler_id.as_deref(), Some("piv"));
    }

    #[test]
    fn active_handler_changed_is_a_no_op_for_an_inactive_device() {
        let state = reduce(&AppState::default(), Action::DeviceActivated { device: device("reader-0") });
        let state = reduce(&state, Action::SetActiveDevice { device: "reader-1".to_string() });
        let unchanged = reduce(
            &state,
            Action::ActiveHandlerChanged { device: "reader-0".to_string(), handler_id: "piv".to_string() },
        );
        assert!(unchanged.active_handler_id.is_none());
    }

    #[test]
    fn toggle_and_hide_shortcut_help() {
        let state = AppState::default();
        let shown = reduce(&state, Action::ToggleShortcutHelp);
        assert!(shown.show_shortcut_help);
        let hidden = reduce(&shown, Action::HideShortcutHelp);
        assert!(!hidden.show_shortcut_help);
    }

    #[test]
    fn initialize_returns_default_state() {
        let state = reduce(&AppState::default(), Action::ToggleShortcutHelp);
        let reset = reduce(&state, Action::Initialize);
        assert!(!reset.show_shortcut_help);
    }
}
