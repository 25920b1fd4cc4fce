//! Argument shapes for tools whose arguments aren't a scene type directly.
//! `set_camera` takes [`CameraSpec`](crate::scene::CameraSpec) and
//! `set_environment_lighting` takes [`EnvironmentSpec`](crate::scene::EnvironmentSpec).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::lenient;
use crate::scene::{LightSpec, LightUpdate, ShapeSpec, ShapeUpdate};

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CreateShapeParams {
    /// Shapes to add, in order.
    #[serde(default, deserialize_with = "lenient::list")]
    pub shapes: Vec<ShapeSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct UpdateShapeParams {
    /// Id of the shape to change.
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::object")]
    pub updates: ShapeUpdate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CreateLightParams {
    /// Lights to add, in order.
    #[serde(default, deserialize_with = "lenient::list")]
    pub lights: Vec<LightSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct UpdateLightParams {
    /// Id of the light to change.
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::object")]
    pub updates: LightUpdate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RemoveParams {
    /// Id of the entity to remove.
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
}
