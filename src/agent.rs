//! The tool-calling loop: send the transcript to the model, run whatever tools
//! it asks for against the scene, feed the results back, repeat.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::audit::AuditLog;
use crate::cancel::CancelFlag;
use crate::conversation::{Message, Part, Role, ToolCall, ToolResult};
use crate::error::AgentError;
use crate::events::{correlation_id, AgentEvent, EventBus, ToolCompletion, TurnOutcome};
use crate::llm::{ModelResponse, Provider, ProviderError};
use crate::render::Renderer;
use crate::scene::{Scene, SceneModel};
use crate::settings::{AgentSettings, RetrySettings};
use crate::tools::{tool_declarations, ToolDeclaration, ToolExecutor, ToolKind, ToolRequest};

pub const TURN_LIMIT_MESSAGE: &str =
    "I reached the step limit for this request. The scene keeps every change made so far; send another message to continue.";

const SCENE_SUMMARY_HEADER: &str = "Current scene state:\n";

/// How a successful `process_turn` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TurnSummary {
    /// Model round trips that led to tool execution.
    pub turns: usize,
    pub tool_calls: usize,
    pub outcome: TurnOutcome,
}

/// One conversation's agent. Owns the scene; a single writer drives it.
pub struct SceneAgent {
    provider: Arc<dyn Provider>,
    scene: SceneModel,
    executor: ToolExecutor,
    events: EventBus,
    tools: Vec<ToolDeclaration>,
    max_turns: usize,
    retry: RetrySettings,
    include_scene_summary: bool,
    audit: Option<Arc<AuditLog>>,
}

impl std::fmt::Debug for SceneAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneAgent")
            .field("provider", &self.provider.name())
            .field("executor", &self.executor)
            .field("max_turns", &self.max_turns)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl SceneAgent {
    pub fn new(provider: Arc<dyn Provider>, settings: &AgentSettings) -> Self {
        Self {
            provider,
            scene: SceneModel::new(),
            executor: ToolExecutor::new(settings.render),
            events: EventBus::new(settings.event_buffer),
            tools: tool_declarations(),
            max_turns: settings.max_turns.max(1),
            retry: settings.retry,
            include_scene_summary: settings.include_scene_summary,
            audit: settings.audit_dir.as_ref().map(|dir| Arc::new(AuditLog::new(dir))),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.executor = self.executor.with_renderer(renderer);
        self
    }

    /// Share one audit log between agents.
    pub fn with_audit_log(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn scene(&self) -> &SceneModel {
        &self.scene
    }

    pub fn snapshot(&self) -> Scene {
        self.scene.snapshot()
    }

    pub fn clear_scene(&mut self) {
        self.scene.clear();
    }

    /// Run the loop for the newest user message in `conversation`, appending
    /// assistant turns and tool results as they happen. The transcript keeps
    /// whatever was appended even when an error is returned.
    pub async fn process_turn(&mut self, conversation: &mut Vec<Message>, cancel: &CancelFlag) -> Result<TurnSummary, AgentError> {
        if self.include_scene_summary {
            attach_scene_summary(conversation, &self.scene.summary());
        }

        let mut turns = 0;
        let mut tool_calls = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(self.fail(turns, AgentError::Cancelled));
            }
            if turns >= self.max_turns {
                info!(turns, "turn limit reached");
                self.events.publish(AgentEvent::Text {
                    text: TURN_LIMIT_MESSAGE.to_string(),
                    thought: false,
                });
                conversation.push(Message::assistant(vec![Part::text(TURN_LIMIT_MESSAGE)]));
                return Ok(self.finish(turns, tool_calls, TurnOutcome::TurnLimitReached));
            }

            let response = match self.generate(conversation, cancel).await {
                Ok(response) => response,
                Err(e) => return Err(self.fail(turns, e.into())),
            };
            if response.is_empty() {
                return Err(self.fail(turns, AgentError::EmptyResponse));
            }

            let calls: Vec<ToolCall> = response.tool_calls().cloned().collect();
            let started: Vec<Option<String>> = calls.iter().map(|call| self.announce(call)).collect();
            self.publish_text(&response);
            conversation.push(Message::assistant(response.parts));

            if calls.is_empty() {
                return Ok(self.finish(turns, tool_calls, TurnOutcome::Completed));
            }

            turns += 1;
            tool_calls += calls.len();
            debug!(turn = turns, calls = calls.len(), "executing tool calls");

            let mut results = Vec::with_capacity(calls.len());
            let mut mutated = false;
            let mut cancelled = false;
            for (call, started) in calls.iter().zip(started) {
                if cancelled || cancel.is_cancelled() {
                    results.push(Part::ToolResult(failed_result(call, "cancelled before execution")));
                    continue;
                }
                let effect = self.run_call(call, started, cancel, &mut results).await;
                mutated |= effect.mutated;
                cancelled |= effect.cancelled;
            }

            // One compile and one notification per turn.
            let compile_error = if mutated {
                match self.scene.compile() {
                    Ok(compiled) => {
                        self.events.publish(AgentEvent::SceneChanged {
                            scene: self.scene.snapshot(),
                            compiled,
                        });
                        None
                    }
                    Err(e) => Some(e.to_string()),
                }
            } else {
                None
            };

            conversation.push(Message::tool_results(results));

            if let Some(message) = compile_error {
                return Err(self.fail(turns, AgentError::Compile { message }));
            }
            if cancelled {
                return Err(self.fail(turns, AgentError::Cancelled));
            }
        }
    }

    /// Call the provider, retrying transient failures with doubling backoff.
    /// Cancellation interrupts both the call and the sleep.
    async fn generate(&self, conversation: &[Message], cancel: &CancelFlag) -> Result<ModelResponse, ProviderError> {
        let mut attempt = 1;
        loop {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ProviderError::Cancelled),
                result = self.provider.generate(conversation, &self.tools) => result,
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        provider = self.provider.name(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "transient provider error, retrying"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(ProviderError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn publish_text(&self, response: &ModelResponse) {
        for part in &response.parts {
            if let Part::Text { text, thought } = part {
                if !text.is_empty() {
                    self.events.publish(AgentEvent::Text {
                        text: text.clone(),
                        thought: *thought,
                    });
                }
            }
        }
    }

    /// Publish `ToolStarted` for a render call. Returns the correlation id its
    /// completion must carry.
    fn announce(&self, call: &ToolCall) -> Option<String> {
        let kind = ToolKind::from_name(call.name.trim()).filter(|k| *k == ToolKind::RenderScene)?;
        let correlation_id = correlation_id(kind.name());
        self.events.publish(AgentEvent::ToolStarted {
            correlation_id: correlation_id.clone(),
            tool: kind.name().to_string(),
            target_id: None,
        });
        Some(correlation_id)
    }

    /// Execute one call and push its result part (plus an image part for
    /// renders).
    async fn run_call(
        &mut self,
        call: &ToolCall,
        started: Option<String>,
        cancel: &CancelFlag,
        results: &mut Vec<Part>,
    ) -> CallEffect {
        let Some(request) = ToolRequest::from_tool_call(&call.name, &call.arguments) else {
            warn!(tool = %call.name, "model called an unknown tool");
            self.events.publish(AgentEvent::UnknownTool {
                call_id: call.id.clone(),
                name: call.name.clone(),
            });
            let available: Vec<&str> = ToolKind::all().iter().map(ToolKind::name).collect();
            let message = format!("unknown tool \"{}\"; available tools: {}", call.name, available.join(", "));
            results.push(Part::ToolResult(failed_result(call, &message)));
            return CallEffect::default();
        };

        let correlation_id = started.unwrap_or_else(|| correlation_id(request.name()));

        let started = Instant::now();
        let outcome = self.executor.execute(&mut self.scene, request, cancel).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(
            tool = outcome.request.name(),
            success = outcome.success(),
            duration_ms,
            "tool executed"
        );

        results.push(Part::ToolResult(ToolResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            response: outcome.envelope(),
        }));
        if let Some(png) = &outcome.image {
            results.push(Part::Image {
                mime_type: "image/png".to_string(),
                data: png.clone(),
            });
        }

        let effect = CallEffect {
            mutated: outcome.mutated,
            cancelled: outcome.cancelled,
        };
        let completion = ToolCompletion {
            correlation_id,
            success: outcome.success(),
            errors: outcome.errors().to_vec(),
            duration_ms,
            image: outcome.image,
            request: outcome.request,
        };
        if let Some(audit) = &self.audit {
            audit.record(&completion);
        }
        self.events.publish(AgentEvent::ToolCompleted(completion));
        effect
    }

    fn finish(&self, turns: usize, tool_calls: usize, outcome: TurnOutcome) -> TurnSummary {
        info!(turns, tool_calls, ?outcome, "turn finished");
        self.events.publish(AgentEvent::Finished { turns, outcome });
        TurnSummary {
            turns,
            tool_calls,
            outcome,
        }
    }

    fn fail(&self, turns: usize, error: AgentError) -> AgentError {
        let outcome = if error == AgentError::Cancelled {
            info!(turns, "turn cancelled");
            TurnOutcome::Cancelled
        } else {
            warn!(turns, error = %error, "turn failed");
            self.events.publish(AgentEvent::Error {
                message: error.to_string(),
            });
            TurnOutcome::Failed
        };
        self.events.publish(AgentEvent::Finished { turns, outcome });
        error
    }
}

/// What one executed call did to the turn.
#[derive(Debug, Default, Clone, Copy)]
struct CallEffect {
    mutated: bool,
    cancelled: bool,
}

fn failed_result(call: &ToolCall, message: &str) -> ToolResult {
    ToolResult {
        call_id: call.id.clone(),
        name: call.name.clone(),
        response: json!({ "success": false, "errors": [message] }),
    }
}

/// Append the scene summary to the latest user message as an extra text part.
fn attach_scene_summary(conversation: &mut [Message], summary: &str) {
    if let Some(message) = conversation.iter_mut().rev().find(|m| m.role == Role::User) {
        message.parts.push(Part::text(format!("{SCENE_SUMMARY_HEADER}{summary}")));
    }
}
