//! Command-bus surface.
//!
//! The hub itself (transport, reconnection, auth) is an external
//! collaborator; the bridge only defines the message shapes and two
//! seams. `BusHandler` is implemented by the orchestrator and
//! registered once with whatever client drives it, so connection state
//! lives on the orchestrator instead of in free-floating callbacks.
//! `BusPublisher` is the outbound side; publishes are best-effort.

use std::sync::Mutex;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Inbound commands from the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum BusCommand {
    Prompt {
        text: String,
        /// Address a specific session; absent means the active one
        /// (discovering or launching a target if none is known yet).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
    },
    ListSessions,
    SwitchSession { pid: u32 },
}

/// Outbound events to the hub. Responses are events, never return
/// values; ordering across sessions follows turn completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BusEvent {
    /// `None` clears any previously published status.
    Status { text: Option<String> },
    Response { text: String },
    Sessions { pids: Vec<u32> },
    History { data: String },
    EmbeddedCommand { name: String, payload: Value },
}

pub trait BusPublisher: Send + Sync {
    fn publish(&self, event: &BusEvent) -> std::io::Result<()>;
}

/// Publish without letting a hub hiccup disturb the turn; the hub has
/// its own reconnection policy.
pub fn publish_best_effort(publisher: &dyn BusPublisher, event: &BusEvent) {
    if let Err(err) = publisher.publish(event) {
        warn!(error = %err, ?event, "failed to publish bus event");
    }
}

/// Connection lifecycle interface the bus client drives.
pub trait BusHandler: Send + Sync {
    fn on_open(&self);
    fn on_close(&self);
    fn on_error(&self, error: &str);
    fn on_message(&self, command: BusCommand);
}

/// Publisher that records events in memory, for tests and dry runs.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<BusEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BusEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl BusPublisher for RecordingPublisher {
    fn publish(&self, event: &BusEvent) -> std::io::Result<()> {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_shapes() {
        let prompt: BusCommand = serde_json::from_str(r#"{"command":"prompt","text":"hi"}"#)
            .unwrap();
        assert_eq!(
            prompt,
            BusCommand::Prompt {
                text: "hi".to_string(),
                pid: None,
            }
        );

        let addressed: BusCommand =
            serde_json::from_str(r#"{"command":"prompt","text":"hi","pid":12}"#).unwrap();
        assert_eq!(
            addressed,
            BusCommand::Prompt {
                text: "hi".to_string(),
                pid: Some(12),
            }
        );

        // Unaddressed prompts serialize without the pid key.
        let json = serde_json::to_string(&BusCommand::Prompt {
            text: "hi".to_string(),
            pid: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"command":"prompt","text":"hi"}"#);

        let switch: BusCommand =
            serde_json::from_str(r#"{"command":"switchSession","pid":42}"#).unwrap();
        assert_eq!(switch, BusCommand::SwitchSession { pid: 42 });

        let list: BusCommand = serde_json::from_str(r#"{"command":"listSessions"}"#).unwrap();
        assert_eq!(list, BusCommand::ListSessions);
    }

    #[test]
    fn test_event_wire_shapes() {
        let json = serde_json::to_string(&BusEvent::Status {
            text: Some("thinking".to_string()),
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"status","text":"thinking"}"#);

        let json = serde_json::to_string(&BusEvent::Status { text: None }).unwrap();
        assert_eq!(json, r#"{"event":"status","text":null}"#);

        let json = serde_json::to_string(&BusEvent::EmbeddedCommand {
            name: "Foo".to_string(),
            payload: serde_json::json!({"x": 1}),
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"event":"embeddedCommand","name":"Foo","payload":{"x":1}}"#
        );
    }

    #[test]
    fn test_recording_publisher_keeps_order() {
        let publisher = RecordingPublisher::new();
        publish_best_effort(&publisher, &BusEvent::Status { text: None });
        publish_best_effort(
            &publisher,
            &BusEvent::Response {
                text: "a".to_string(),
            },
        );
        assert_eq!(publisher.events().len(), 2);
        assert!(matches!(publisher.events()[0], BusEvent::Status { .. }));
    }
}
