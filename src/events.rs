//! Events published while a turn is processed, and the bus that carries them.
//!
//! Within one turn the order is: optional tool start, text, tool completions
//! in call order, at most one scene change, then the next turn or `Finished`.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::scene::{CompiledScene, Scene};
use crate::tools::ToolRequest;

pub const AGENT_TEXT: &str = "agent:text";
pub const AGENT_TOOL_STARTED: &str = "agent:tool_started";
pub const AGENT_TOOL_COMPLETED: &str = "agent:tool_completed";
pub const AGENT_UNKNOWN_TOOL: &str = "agent:unknown_tool";
pub const AGENT_SCENE_CHANGED: &str = "agent:scene_changed";
pub const AGENT_ERROR: &str = "agent:error";
pub const AGENT_FINISHED: &str = "agent:finished";

/// How a `process_turn` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The model answered without calling tools.
    Completed,
    TurnLimitReached,
    Cancelled,
    Failed,
}

/// Completion record for one tool execution.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCompletion {
    /// `<tool>-<nanos>`; matches the start event for the same call.
    pub correlation_id: String,
    pub request: ToolRequest,
    pub success: bool,
    pub errors: Vec<String>,
    pub duration_ms: u64,
    /// PNG bytes, only for `render_scene`.
    #[serde(skip_serializing_if = "Option::is_none", with = "crate::util::base64_opt")]
    pub image: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Text {
        text: String,
        thought: bool,
    },
    ToolStarted {
        correlation_id: String,
        tool: String,
        target_id: Option<String>,
    },
    ToolCompleted(ToolCompletion),
    /// The model called a tool that doesn't exist.
    UnknownTool {
        call_id: String,
        name: String,
    },
    SceneChanged {
        scene: Scene,
        compiled: CompiledScene,
    },
    Error {
        message: String,
    },
    Finished {
        turns: usize,
        outcome: TurnOutcome,
    },
}

impl AgentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::Text { .. } => AGENT_TEXT,
            AgentEvent::ToolStarted { .. } => AGENT_TOOL_STARTED,
            AgentEvent::ToolCompleted(_) => AGENT_TOOL_COMPLETED,
            AgentEvent::UnknownTool { .. } => AGENT_UNKNOWN_TOOL,
            AgentEvent::SceneChanged { .. } => AGENT_SCENE_CHANGED,
            AgentEvent::Error { .. } => AGENT_ERROR,
            AgentEvent::Finished { .. } => AGENT_FINISHED,
        }
    }
}

/// Bounded fan-out of [`AgentEvent`]s.
///
/// Publishing never blocks. A subscriber that falls more than `capacity`
/// events behind loses the oldest ones and gets `RecvError::Lagged(n)` on
/// its next receive.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: AgentEvent) {
        trace!(event = event.name(), "publish");
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Correlation id pairing a tool's start and completion events.
pub fn correlation_id(tool: &str) -> String {
    format!("{tool}-{}", crate::util::timestamp_nanos())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    fn text(s: &str) -> AgentEvent {
        AgentEvent::Text {
            text: s.to_string(),
            thought: false,
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::new(4);
        bus.publish(text("nobody listening"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_loses_oldest_events() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(text(&i.to_string()));
        }
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(3))));
        let AgentEvent::Text { text, .. } = rx.recv().await.unwrap() else {
            unreachable!()
        };
        assert_eq!(text, "3");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = AgentEvent::Finished {
            turns: 2,
            outcome: TurnOutcome::TurnLimitReached,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "finished");
        assert_eq!(value["outcome"], "turn_limit_reached");
        assert_eq!(event.name(), AGENT_FINISHED);
    }

    #[test]
    fn completion_image_is_base64() {
        let event = AgentEvent::ToolCompleted(ToolCompletion {
            correlation_id: correlation_id("render_scene"),
            request: ToolRequest::RenderScene,
            success: true,
            errors: vec![],
            duration_ms: 12,
            image: Some(vec![0xff, 0x00]),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool_completed");
        assert_eq!(value["image"], "/wA=");
        assert_eq!(value["request"]["tool"], "render_scene");
        assert!(value["correlation_id"].as_str().unwrap().starts_with("render_scene-"));
    }
}
