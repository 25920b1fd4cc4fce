use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::cancel::CancelFlag;
use crate::error::{SceneError, ValidationErrors};
use crate::render::{RenderError, RenderSettings, Renderer};
use crate::scene::SceneModel;

use super::ToolRequest;

/// Result of running one request.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// The request, annotated with before/after state where it applies.
    pub request: ToolRequest,
    pub result: Result<Value, Vec<String>>,
    /// True when the call succeeded and the tool can change the scene.
    pub mutated: bool,
    /// PNG bytes from `render_scene`.
    pub image: Option<Vec<u8>>,
    /// The renderer stopped because the turn was cancelled.
    pub cancelled: bool,
}

impl ToolOutcome {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn errors(&self) -> &[String] {
        match &self.result {
            Ok(_) => &[],
            Err(errors) => errors,
        }
    }

    /// `{success, result}` or `{success: false, errors}` as sent back to the model.
    pub fn envelope(&self) -> Value {
        match &self.result {
            Ok(result) => json!({ "success": true, "result": result }),
            Err(errors) => json!({ "success": false, "errors": errors }),
        }
    }
}

/// Runs tool requests against a scene.
#[derive(Clone, Default)]
pub struct ToolExecutor {
    renderer: Option<Arc<dyn Renderer>>,
    render: RenderSettings,
}

impl std::fmt::Debug for ToolExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolExecutor")
            .field("renderer", &self.renderer.is_some())
            .field("render", &self.render)
            .finish()
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl ToolExecutor {
    pub fn new(render: RenderSettings) -> Self {
        Self {
            renderer: None,
            render,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub async fn execute(&self, scene: &mut SceneModel, request: ToolRequest, cancel: &CancelFlag) -> ToolOutcome {
        let mutates = request.mutates();
        let mut cancelled = false;
        let (request, result, image) = match request {
            ToolRequest::RenderScene => match self.render_scene(scene, cancel).await {
                Ok((summary, png)) => (ToolRequest::RenderScene, Ok(summary), Some(png)),
                Err(RenderFailure::Cancelled) => {
                    cancelled = true;
                    (ToolRequest::RenderScene, Err(vec![RenderError::Cancelled.to_string()]), None)
                }
                Err(RenderFailure::Rejected(errors)) => (ToolRequest::RenderScene, Err(errors), None),
            },
            other => {
                let (request, result) = apply(scene, other);
                (request, result.map_err(|e| e.messages()), None)
            }
        };
        if let Err(errors) = &result {
            debug!(tool = request.name(), ?errors, "tool rejected");
        }
        ToolOutcome {
            mutated: mutates && result.is_ok(),
            request,
            result,
            image,
            cancelled,
        }
    }

    async fn render_scene(&self, scene: &SceneModel, cancel: &CancelFlag) -> Result<(Value, Vec<u8>), RenderFailure> {
        if scene.shape_count() == 0 {
            return Err(RenderFailure::rejected("cannot render: the scene has no shapes"));
        }
        let Some(renderer) = self.renderer.clone() else {
            return Err(RenderFailure::rejected("rendering is not available: no renderer is configured"));
        };
        let compiled = scene.compile().map_err(|e| RenderFailure::Rejected(e.messages()))?;
        let settings = self.render;
        let flag = cancel.clone();

        debug!(width = settings.width, height = settings.height, "rendering");
        let pixels = tokio::task::spawn_blocking(move || renderer.render(&compiled, &settings, &flag))
            .await
            .map_err(|e| {
                warn!(error = %e, "render task failed");
                RenderFailure::rejected(format!("render failed: {e}"))
            })??;
        let png = pixels.to_png()?;
        let summary = json!({
            "width": pixels.width,
            "height": pixels.height,
            "bytes": png.len(),
        });
        Ok((summary, png))
    }
}

enum RenderFailure {
    Rejected(Vec<String>),
    Cancelled,
}

impl RenderFailure {
    fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(vec![message.into()])
    }
}

impl From<RenderError> for RenderFailure {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::Cancelled => Self::Cancelled,
            RenderError::Failed(_) => Self::rejected(e.to_string()),
        }
    }
}

/// Run a non-render request and annotate it with the state it changed.
fn apply(scene: &mut SceneModel, request: ToolRequest) -> (ToolRequest, Result<Value, SceneError>) {
    match request {
        ToolRequest::CreateShape { shapes, .. } => match scene.add_shapes(&shapes) {
            Ok(created) => {
                let result = json!({ "created": to_json(&created) });
                (ToolRequest::CreateShape { shapes, created: Some(created) }, Ok(result))
            }
            Err(e) => (ToolRequest::CreateShape { shapes, created: None }, Err(e)),
        },
        ToolRequest::UpdateShape { id, updates, .. } => match scene.update_shape(&id, &updates) {
            Ok(change) => {
                let result = to_json(&change);
                (
                    ToolRequest::UpdateShape { id, updates, before: Some(change.before), after: Some(change.after) },
                    Ok(result),
                )
            }
            Err(e) => (ToolRequest::UpdateShape { id, updates, before: None, after: None }, Err(e)),
        },
        ToolRequest::RemoveShape { id, .. } => match scene.remove_shape(&id) {
            Ok(removed) => {
                let result = json!({ "removed": to_json(&removed) });
                (ToolRequest::RemoveShape { id, removed: Some(removed) }, Ok(result))
            }
            Err(e) => (ToolRequest::RemoveShape { id, removed: None }, Err(e)),
        },
        ToolRequest::CreateLight { lights, .. } => match scene.add_lights(&lights) {
            Ok(created) => {
                let result = json!({ "created": to_json(&created) });
                (ToolRequest::CreateLight { lights, created: Some(created) }, Ok(result))
            }
            Err(e) => (ToolRequest::CreateLight { lights, created: None }, Err(e)),
        },
        ToolRequest::UpdateLight { id, updates, .. } => match scene.update_light(&id, &updates) {
            Ok(change) => {
                let result = to_json(&change);
                (
                    ToolRequest::UpdateLight { id, updates, before: Some(change.before), after: Some(change.after) },
                    Ok(result),
                )
            }
            Err(e) => (ToolRequest::UpdateLight { id, updates, before: None, after: None }, Err(e)),
        },
        ToolRequest::RemoveLight { id, .. } => match scene.remove_light(&id) {
            Ok(removed) => {
                let result = json!({ "removed": to_json(&removed) });
                (ToolRequest::RemoveLight { id, removed: Some(removed) }, Ok(result))
            }
            Err(e) => (ToolRequest::RemoveLight { id, removed: None }, Err(e)),
        },
        ToolRequest::SetCamera { camera, .. } => match scene.set_camera(&camera) {
            Ok(change) => {
                let result = to_json(&change);
                (
                    ToolRequest::SetCamera { camera, before: Some(change.before), after: Some(change.after) },
                    Ok(result),
                )
            }
            Err(e) => (ToolRequest::SetCamera { camera, before: None, after: None }, Err(e)),
        },
        ToolRequest::SetEnvironmentLighting { lighting, .. } => match scene.set_environment_lighting(&lighting) {
            Ok(change) => {
                let result = to_json(&change);
                (
                    ToolRequest::SetEnvironmentLighting { lighting, removed: Some(change.removed), added: change.added },
                    Ok(result),
                )
            }
            Err(e) => (ToolRequest::SetEnvironmentLighting { lighting, removed: None, added: None }, Err(e)),
        },
        ToolRequest::GetSceneState => {
            let result = json!({
                "scene": to_json(&scene.snapshot()),
                "summary": scene.summary(),
            });
            (ToolRequest::GetSceneState, Ok(result))
        }
        // Rendering needs the executor's renderer; `ToolExecutor::execute` routes it there.
        ToolRequest::RenderScene => (
            ToolRequest::RenderScene,
            Err(ValidationErrors::from("render_scene is not a scene mutation".to_string()).into()),
        ),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::render::PixelBuffer;
    use crate::scene::CompiledScene;
    use serde_json::json;

    struct SolidRenderer;

    impl Renderer for SolidRenderer {
        fn render(&self, _scene: &CompiledScene, settings: &RenderSettings, cancel: &CancelFlag) -> Result<PixelBuffer, RenderError> {
            if cancel.is_cancelled() {
                return Err(RenderError::Cancelled);
            }
            let pixels = (settings.width * settings.height) as usize;
            Ok(PixelBuffer {
                width: settings.width,
                height: settings.height,
                rgba: [30, 60, 90, 255].repeat(pixels),
            })
        }
    }

    fn request(name: &str, args: Value) -> ToolRequest {
        ToolRequest::from_tool_call(name, &args).unwrap()
    }

    fn small() -> RenderSettings {
        RenderSettings { width: 4, height: 3, samples_per_pixel: 1 }
    }

    fn sphere_call() -> ToolRequest {
        request(
            "create_shape",
            json!({ "shapes": [{ "id": "s1", "type": "sphere", "properties": { "center": [0, 0, 0], "radius": 1 } }] }),
        )
    }

    #[tokio::test]
    async fn create_success_envelope() {
        let executor = ToolExecutor::default();
        let mut scene = SceneModel::new();
        let outcome = executor.execute(&mut scene, sphere_call(), &CancelFlag::new()).await;
        assert!(outcome.mutated);
        let envelope = outcome.envelope();
        assert_eq!(envelope["success"], true);
        assert_eq!(envelope["result"]["created"][0]["id"], "s1");
        let ToolRequest::CreateShape { created, .. } = &outcome.request else { unreachable!() };
        assert_eq!(created.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn validation_failure_envelope_lists_errors() {
        let executor = ToolExecutor::default();
        let mut scene = SceneModel::new();
        let outcome = executor
            .execute(&mut scene, request("set_camera", json!({ "center": [0, 0], "vfov": 500 })), &CancelFlag::new())
            .await;
        assert!(!outcome.mutated);
        let envelope = outcome.envelope();
        assert_eq!(envelope["success"], false);
        assert_eq!(envelope["errors"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn update_is_annotated_with_before_and_after() {
        let executor = ToolExecutor::default();
        let mut scene = SceneModel::new();
        executor.execute(&mut scene, sphere_call(), &CancelFlag::new()).await;
        let outcome = executor
            .execute(
                &mut scene,
                request("update_shape", json!({ "id": "s1", "updates": { "properties": { "radius": 2 } } })),
                &CancelFlag::new(),
            )
            .await;
        let value = serde_json::to_value(&outcome.request).unwrap();
        assert_eq!(value["tool"], "update_shape");
        assert_eq!(value["before"]["radius"], 1.0);
        assert_eq!(value["after"]["radius"], 2.0);
    }

    #[tokio::test]
    async fn render_fails_closed_on_empty_scene() {
        let executor = ToolExecutor::new(small()).with_renderer(Arc::new(SolidRenderer));
        let mut scene = SceneModel::new();
        let outcome = executor.execute(&mut scene, ToolRequest::RenderScene, &CancelFlag::new()).await;
        assert!(!outcome.success());
        assert!(outcome.errors()[0].contains("no shapes"));
        assert!(outcome.image.is_none());
    }

    #[tokio::test]
    async fn render_without_renderer_is_an_error() {
        let executor = ToolExecutor::new(small());
        let mut scene = SceneModel::new();
        executor.execute(&mut scene, sphere_call(), &CancelFlag::new()).await;
        let outcome = executor.execute(&mut scene, ToolRequest::RenderScene, &CancelFlag::new()).await;
        assert!(outcome.errors()[0].contains("no renderer"));
    }

    #[tokio::test]
    async fn render_produces_png() {
        let executor = ToolExecutor::new(small()).with_renderer(Arc::new(SolidRenderer));
        let mut scene = SceneModel::new();
        executor.execute(&mut scene, sphere_call(), &CancelFlag::new()).await;
        let outcome = executor.execute(&mut scene, ToolRequest::RenderScene, &CancelFlag::new()).await;
        assert!(outcome.success());
        assert!(!outcome.mutated);
        assert!(!outcome.cancelled);
        let png = outcome.image.as_ref().unwrap();
        assert_eq!(&png[1..4], b"PNG");
        assert_eq!(outcome.envelope()["result"]["width"], 4);
    }

    #[tokio::test]
    async fn cancelled_render_reports_cancellation() {
        let executor = ToolExecutor::new(small()).with_renderer(Arc::new(SolidRenderer));
        let mut scene = SceneModel::new();
        executor.execute(&mut scene, sphere_call(), &CancelFlag::new()).await;
        let cancel = CancelFlag::new();
        cancel.cancel();
        let outcome = executor.execute(&mut scene, ToolRequest::RenderScene, &cancel).await;
        assert_eq!(outcome.errors(), ["render cancelled".to_string()]);
        assert!(outcome.cancelled);
    }

    #[tokio::test]
    async fn scene_state_includes_summary() {
        let executor = ToolExecutor::default();
        let mut scene = SceneModel::new();
        let outcome = executor.execute(&mut scene, ToolRequest::GetSceneState, &CancelFlag::new()).await;
        assert!(outcome.envelope()["result"]["summary"].as_str().unwrap().contains("Shapes: none"));
        assert!(!outcome.mutated);
    }
}
