//! The closed set of operations the model can call.
//!
//! Raw tool calls are mapped to [`ToolRequest`] leniently; every field
//! problem is left for the scene model to report when the request runs.

pub mod catalog;
pub mod execute;
pub mod params;

use serde::Serialize;
use serde_json::Value;

use crate::lenient;
use crate::scene::{
    Camera, CameraSpec, EnvironmentSpec, Light, LightSpec, LightUpdate, Shape, ShapeSpec,
    ShapeUpdate,
};

pub use catalog::{tool_declarations, ToolDeclaration};
pub use execute::{ToolExecutor, ToolOutcome};

use params::{CreateLightParams, CreateShapeParams, RemoveParams, UpdateLightParams, UpdateShapeParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    CreateShape,
    UpdateShape,
    RemoveShape,
    CreateLight,
    UpdateLight,
    RemoveLight,
    SetCamera,
    SetEnvironmentLighting,
    RenderScene,
    GetSceneState,
}

impl ToolKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateShape => "create_shape",
            Self::UpdateShape => "update_shape",
            Self::RemoveShape => "remove_shape",
            Self::CreateLight => "create_light",
            Self::UpdateLight => "update_light",
            Self::RemoveLight => "remove_light",
            Self::SetCamera => "set_camera",
            Self::SetEnvironmentLighting => "set_environment_lighting",
            Self::RenderScene => "render_scene",
            Self::GetSceneState => "get_scene_state",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::CreateShape => "Add one or more shapes to the scene. The whole batch is rejected if any shape is invalid or reuses an existing id. The camera is moved to frame the first new shape.",
            Self::UpdateShape => "Change an existing shape: rename it, change its type, overwrite some of its properties, or replace its material. Properties you don't mention keep their values.",
            Self::RemoveShape => "Remove a shape by id.",
            Self::CreateLight => "Add one or more lights. Only one infinite (background) light may exist; prefer set_environment_lighting for backgrounds.",
            Self::UpdateLight => "Change an existing light: rename it, change its type, or overwrite some of its properties.",
            Self::RemoveLight => "Remove a light by id.",
            Self::SetCamera => "Position the camera. center and look_at are required and must differ; vfov and aperture keep their current values when omitted.",
            Self::SetEnvironmentLighting => "Replace the background lighting: a sky gradient, a uniform color, or none.",
            Self::RenderScene => "Render the current scene to an image so you can check your work. Fails if the scene has no shapes.",
            Self::GetSceneState => "Return the full current scene: shapes, lights and camera.",
        }
    }

    /// Whether a successful call can change the scene.
    pub fn mutates(&self) -> bool {
        !matches!(self, Self::RenderScene | Self::GetSceneState)
    }

    pub fn from_name(name: &str) -> Option<ToolKind> {
        Self::all().iter().copied().find(|k| k.name() == name)
    }

    pub fn all() -> &'static [ToolKind] {
        &[
            Self::CreateShape,
            Self::UpdateShape,
            Self::RemoveShape,
            Self::CreateLight,
            Self::UpdateLight,
            Self::RemoveLight,
            Self::SetCamera,
            Self::SetEnvironmentLighting,
            Self::RenderScene,
            Self::GetSceneState,
        ]
    }
}

/// One parsed tool call. The `before`/`after`/`created`/`removed` fields are
/// empty when parsed and filled in by execution for the completion event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolRequest {
    CreateShape {
        shapes: Vec<ShapeSpec>,
        #[serde(skip_serializing_if = "Option::is_none")]
        created: Option<Vec<Shape>>,
    },
    UpdateShape {
        id: String,
        updates: ShapeUpdate,
        #[serde(skip_serializing_if = "Option::is_none")]
        before: Option<Shape>,
        #[serde(skip_serializing_if = "Option::is_none")]
        after: Option<Shape>,
    },
    RemoveShape {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        removed: Option<Shape>,
    },
    CreateLight {
        lights: Vec<LightSpec>,
        #[serde(skip_serializing_if = "Option::is_none")]
        created: Option<Vec<Light>>,
    },
    UpdateLight {
        id: String,
        updates: LightUpdate,
        #[serde(skip_serializing_if = "Option::is_none")]
        before: Option<Light>,
        #[serde(skip_serializing_if = "Option::is_none")]
        after: Option<Light>,
    },
    RemoveLight {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        removed: Option<Light>,
    },
    SetCamera {
        camera: CameraSpec,
        #[serde(skip_serializing_if = "Option::is_none")]
        before: Option<Camera>,
        #[serde(skip_serializing_if = "Option::is_none")]
        after: Option<Camera>,
    },
    SetEnvironmentLighting {
        lighting: EnvironmentSpec,
        #[serde(skip_serializing_if = "Option::is_none")]
        removed: Option<Vec<Light>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        added: Option<Light>,
    },
    RenderScene,
    GetSceneState,
}

impl ToolRequest {
    /// Map a raw tool call to a request. Unknown names give `None`; malformed
    /// arguments never do.
    pub fn from_tool_call(name: &str, arguments: &Value) -> Option<ToolRequest> {
        let kind = ToolKind::from_name(name.trim())?;
        Some(match kind {
            ToolKind::CreateShape => {
                let params: CreateShapeParams = lenient::from_args(&batch_args(arguments, "shapes"));
                ToolRequest::CreateShape {
                    shapes: params.shapes,
                    created: None,
                }
            }
            ToolKind::UpdateShape => {
                let params: UpdateShapeParams = lenient::from_args(arguments);
                ToolRequest::UpdateShape {
                    id: params.id,
                    updates: params.updates,
                    before: None,
                    after: None,
                }
            }
            ToolKind::RemoveShape => ToolRequest::RemoveShape {
                id: lenient::from_args::<RemoveParams>(arguments).id,
                removed: None,
            },
            ToolKind::CreateLight => {
                let params: CreateLightParams = lenient::from_args(&batch_args(arguments, "lights"));
                ToolRequest::CreateLight {
                    lights: params.lights,
                    created: None,
                }
            }
            ToolKind::UpdateLight => {
                let params: UpdateLightParams = lenient::from_args(arguments);
                ToolRequest::UpdateLight {
                    id: params.id,
                    updates: params.updates,
                    before: None,
                    after: None,
                }
            }
            ToolKind::RemoveLight => ToolRequest::RemoveLight {
                id: lenient::from_args::<RemoveParams>(arguments).id,
                removed: None,
            },
            ToolKind::SetCamera => ToolRequest::SetCamera {
                camera: lenient::from_args(arguments),
                before: None,
                after: None,
            },
            ToolKind::SetEnvironmentLighting => ToolRequest::SetEnvironmentLighting {
                lighting: lenient::from_args(arguments),
                removed: None,
                added: None,
            },
            ToolKind::RenderScene => ToolRequest::RenderScene,
            ToolKind::GetSceneState => ToolRequest::GetSceneState,
        })
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolRequest::CreateShape { .. } => ToolKind::CreateShape,
            ToolRequest::UpdateShape { .. } => ToolKind::UpdateShape,
            ToolRequest::RemoveShape { .. } => ToolKind::RemoveShape,
            ToolRequest::CreateLight { .. } => ToolKind::CreateLight,
            ToolRequest::UpdateLight { .. } => ToolKind::UpdateLight,
            ToolRequest::RemoveLight { .. } => ToolKind::RemoveLight,
            ToolRequest::SetCamera { .. } => ToolKind::SetCamera,
            ToolRequest::SetEnvironmentLighting { .. } => ToolKind::SetEnvironmentLighting,
            ToolRequest::RenderScene => ToolKind::RenderScene,
            ToolRequest::GetSceneState => ToolKind::GetSceneState,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// The entity the request addresses, when there is exactly one.
    pub fn target_id(&self) -> Option<&str> {
        match self {
            ToolRequest::UpdateShape { id, .. }
            | ToolRequest::RemoveShape { id, .. }
            | ToolRequest::UpdateLight { id, .. }
            | ToolRequest::RemoveLight { id, .. } => Some(id.as_str()),
            ToolRequest::CreateShape { shapes, .. } => match shapes.as_slice() {
                [only] => Some(only.id.as_str()),
                _ => None,
            },
            ToolRequest::CreateLight { lights, .. } => match lights.as_slice() {
                [only] => Some(only.id.as_str()),
                _ => None,
            },
            ToolRequest::SetCamera { .. }
            | ToolRequest::SetEnvironmentLighting { .. }
            | ToolRequest::RenderScene
            | ToolRequest::GetSceneState => None,
        }
    }

    pub fn mutates(&self) -> bool {
        self.kind().mutates()
    }
}

/// Models sometimes send a single entity object instead of `{ "<key>": [...] }`.
fn batch_args(arguments: &Value, key: &str) -> Value {
    let wrap = |list: Value| {
        let mut map = serde_json::Map::new();
        map.insert(key.to_string(), list);
        Value::Object(map)
    };
    match arguments {
        Value::Object(map) if !map.contains_key(key) && (map.contains_key("id") || map.contains_key("type")) => {
            wrap(Value::Array(vec![arguments.clone()]))
        }
        Value::Array(_) => wrap(arguments.clone()),
        _ => arguments.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_round_trip() {
        for kind in ToolKind::all() {
            assert_eq!(ToolKind::from_name(kind.name()), Some(*kind));
            assert_eq!(crate::util::serde_variant_name(kind).as_deref(), Some(kind.name()));
        }
        assert_eq!(ToolKind::from_name("delete_everything"), None);
    }

    #[test]
    fn unknown_tool_gives_no_request() {
        assert!(ToolRequest::from_tool_call("teleport", &json!({})).is_none());
    }

    #[test]
    fn malformed_arguments_still_parse() {
        let request = ToolRequest::from_tool_call("create_shape", &json!({ "shapes": "lots" })).unwrap();
        assert_eq!(request, ToolRequest::CreateShape { shapes: vec![], created: None });

        let request = ToolRequest::from_tool_call("set_camera", &json!("look left")).unwrap();
        assert_eq!(
            request,
            ToolRequest::SetCamera { camera: CameraSpec::default(), before: None, after: None }
        );

        let request = ToolRequest::from_tool_call("remove_shape", &json!({ "id": 12 })).unwrap();
        assert_eq!(request.target_id(), Some("12"));
    }

    #[test]
    fn single_shape_object_is_wrapped() {
        let request = ToolRequest::from_tool_call(
            "create_shape",
            &json!({ "id": "s1", "type": "sphere", "properties": { "center": [0, 0, 0], "radius": 1 } }),
        )
        .unwrap();
        let ToolRequest::CreateShape { shapes, .. } = &request else {
            panic!("expected create_shape");
        };
        assert_eq!(shapes.len(), 1);
        assert_eq!(shapes[0].properties.radius, Some(1.0));
        assert_eq!(request.target_id(), Some("s1"));
    }

    #[test]
    fn stringified_vectors_are_accepted() {
        let request = ToolRequest::from_tool_call(
            "update_shape",
            &json!({ "id": "s1", "updates": { "properties": { "center": "[1, 2, 3]" } } }),
        )
        .unwrap();
        let ToolRequest::UpdateShape { updates, .. } = request else {
            panic!("expected update_shape");
        };
        assert_eq!(updates.properties.unwrap().center, Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn request_serializes_with_tool_tag() {
        let value = serde_json::to_value(ToolRequest::RenderScene).unwrap();
        assert_eq!(value, json!({ "tool": "render_scene" }));
        assert!(ToolKind::CreateShape.mutates());
        assert!(!ToolKind::GetSceneState.mutates());
    }
}
