//! The authoritative in-memory scene for one conversation.
//!
//! Every mutation validates first and commits only when the whole request is
//! valid, so a failed call leaves the scene exactly as it was.

pub mod camera;
pub mod compile;
mod describe;
pub mod light;
pub mod material;
pub mod math;
pub mod shape;
mod validation;

use std::collections::HashSet;

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EntityKind, SceneError, ValidationErrors};
use crate::lenient;
use crate::util::{from_serde_str, serde_variant_name, serde_variant_names, string_enum_schema};

pub use camera::{Camera, CameraSpec};
pub use compile::{CompiledCamera, CompiledScene, CompiledShape};
pub use light::{Light, LightGeometry, LightProperties, LightSpec, LightType, LightUpdate};
pub use material::{Material, MaterialKind, MaterialSpec};
pub use shape::{Shape, ShapeGeometry, ShapeProperties, ShapeSpec, ShapeType, ShapeUpdate};

use validation::Checker;

/// Plain scene data. Values handed out by [`SceneModel::snapshot`] are independent copies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub shapes: Vec<Shape>,
    pub lights: Vec<Light>,
    pub camera: Camera,
}

/// Before/after pair returned by in-place mutations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change<T> {
    pub before: T,
    pub after: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentKind {
    Gradient,
    Uniform,
    #[serde(rename = "none")]
    Off,
}

impl EnvironmentKind {
    pub const ALL: &'static [EnvironmentKind] = &[
        EnvironmentKind::Gradient,
        EnvironmentKind::Uniform,
        EnvironmentKind::Off,
    ];
}

fn environment_kind_schema(_gen: &mut SchemaGenerator) -> Schema {
    string_enum_schema(serde_variant_names(EnvironmentKind::ALL))
}

/// Background lighting request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentSpec {
    /// gradient (sky from bottom_color to top_color), uniform (constant emission) or none.
    #[serde(default, deserialize_with = "lenient::string")]
    #[schemars(schema_with = "environment_kind_schema")]
    pub kind: String,
    /// Overhead sky color, components >= 0. Required for gradient.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub top_color: Option<Vec<f64>>,
    /// Horizon color, components >= 0. Required for gradient.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub bottom_color: Option<Vec<f64>>,
    /// Constant background radiance, components >= 0. Required for uniform.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub emission: Option<Vec<f64>>,
}

/// Infinite lights dropped and the one that replaced them, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentChange {
    pub removed: Vec<Light>,
    pub added: Option<Light>,
}

const ENVIRONMENT_LIGHT_ID: &str = "environment";

/// Owns one [`Scene`] and is the only way to change it.
#[derive(Debug, Default)]
pub struct SceneModel {
    scene: Scene,
}

impl SceneModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep copy of the current scene.
    pub fn snapshot(&self) -> Scene {
        self.scene.clone()
    }

    /// Drop all shapes and lights and reset the camera.
    pub fn clear(&mut self) {
        self.scene = Scene::default();
    }

    pub fn shape_count(&self) -> usize {
        self.scene.shapes.len()
    }

    pub fn light_count(&self) -> usize {
        self.scene.lights.len()
    }

    pub fn camera(&self) -> Camera {
        self.scene.camera
    }

    pub fn summary(&self) -> String {
        describe::summarize(&self.scene)
    }

    pub fn compile(&self) -> Result<CompiledScene, SceneError> {
        compile::compile(&self.scene)
    }

    #[cfg(test)]
    pub(crate) fn replace_camera(&mut self, camera: Camera) {
        self.scene.camera = camera;
    }

    // ── Shapes ──────────────────────────────────────────────────

    pub fn find_shape(&self, id: &str) -> Option<Shape> {
        self.scene.shapes.iter().find(|s| s.id == id).cloned()
    }

    fn shape_index(&self, id: &str) -> Option<usize> {
        self.scene.shapes.iter().position(|s| s.id == id)
    }

    /// Validate the whole batch and append it, or change nothing.
    /// On success the camera is moved to frame the first new shape.
    pub fn add_shapes(&mut self, specs: &[ShapeSpec]) -> Result<Vec<Shape>, SceneError> {
        if specs.is_empty() {
            return Err(ValidationErrors::from("shapes must contain at least one shape".to_string()).into());
        }
        let mut errors = ValidationErrors::new();
        let mut accepted: Vec<Shape> = Vec::with_capacity(specs.len());
        let mut batch_ids = HashSet::new();
        for (index, spec) in specs.iter().enumerate() {
            match shape::validate_shape(spec, index) {
                Ok(shape) => {
                    if self.shape_index(&shape.id).is_some() {
                        errors.push(format!("shape ID \"{}\" already exists", shape.id));
                    } else if !batch_ids.insert(shape.id.clone()) {
                        errors.push(format!("shape ID \"{}\" appears more than once in this request", shape.id));
                    } else {
                        accepted.push(shape);
                    }
                }
                Err(e) => errors.extend(e),
            }
        }
        errors.into_result()?;

        if let Some(first) = accepted.first() {
            let distance = first.geometry.representative_size() * 3.0 + 5.0;
            if !self.scene.camera.reframe(first.geometry.anchor(), distance) {
                debug!(shape = %first.id, "shape too large or too far away to frame; camera left as is");
            }
        }
        self.scene.shapes.extend(accepted.iter().cloned());
        Ok(accepted)
    }

    /// Merge `update` into the shape and re-validate the result. Nothing is
    /// committed unless the merged shape is valid.
    pub fn update_shape(&mut self, id: &str, update: &ShapeUpdate) -> Result<Change<Shape>, SceneError> {
        let index = self
            .shape_index(id)
            .ok_or_else(|| SceneError::not_found(EntityKind::Shape, id))?;
        let before = self
            .scene
            .shapes
            .get(index)
            .cloned()
            .ok_or_else(|| SceneError::not_found(EntityKind::Shape, id))?;

        let mut properties = before.geometry.to_properties();
        if let Some(patch) = &update.properties {
            properties.merge(patch);
        }
        let spec = ShapeSpec {
            id: update.id.clone().unwrap_or_else(|| before.id.clone()),
            shape_type: update
                .shape_type
                .clone()
                .or_else(|| serde_variant_name(&before.shape_type()))
                .unwrap_or_default(),
            properties,
            material: update.material.clone(),
        };

        let (mut errors, candidate) = match shape::validate_shape(&spec, index) {
            Ok(shape) => (ValidationErrors::new(), Some(shape)),
            Err(e) => (e, None),
        };
        let new_id = spec.id.trim();
        if new_id != before.id && self.shape_index(new_id).is_some() {
            errors.push(format!("shape ID \"{new_id}\" already exists"));
        }
        let mut after = match candidate {
            Some(shape) if errors.is_empty() => shape,
            _ => return Err(errors.into()),
        };
        if update.material.is_none() {
            after.material.clone_from(&before.material);
        }
        if let Some(slot) = self.scene.shapes.get_mut(index) {
            *slot = after.clone();
        }
        Ok(Change { before, after })
    }

    pub fn remove_shape(&mut self, id: &str) -> Result<Shape, SceneError> {
        let index = self
            .shape_index(id)
            .ok_or_else(|| SceneError::not_found(EntityKind::Shape, id))?;
        Ok(self.scene.shapes.remove(index))
    }

    // ── Lights ──────────────────────────────────────────────────

    pub fn find_light(&self, id: &str) -> Option<Light> {
        self.scene.lights.iter().find(|l| l.id == id).cloned()
    }

    fn light_index(&self, id: &str) -> Option<usize> {
        self.scene.lights.iter().position(|l| l.id == id)
    }

    fn infinite_light_id(&self, except: Option<&str>) -> Option<String> {
        self.scene
            .lights
            .iter()
            .find(|l| l.is_infinite() && Some(l.id.as_str()) != except)
            .map(|l| l.id.clone())
    }

    /// Validate the whole batch and append it, or change nothing. At most one
    /// infinite light may exist across the scene and the batch.
    pub fn add_lights(&mut self, specs: &[LightSpec]) -> Result<Vec<Light>, SceneError> {
        if specs.is_empty() {
            return Err(ValidationErrors::from("lights must contain at least one light".to_string()).into());
        }
        let mut errors = ValidationErrors::new();
        let mut accepted: Vec<Light> = Vec::with_capacity(specs.len());
        let mut batch_ids = HashSet::new();
        let mut infinite = self.infinite_light_id(None);
        for (index, spec) in specs.iter().enumerate() {
            match light::validate_light(spec, index) {
                Ok(light) => {
                    if self.light_index(&light.id).is_some() {
                        errors.push(format!("light ID \"{}\" already exists", light.id));
                    } else if !batch_ids.insert(light.id.clone()) {
                        errors.push(format!("light ID \"{}\" appears more than once in this request", light.id));
                    } else if let (true, Some(existing)) = (light.is_infinite(), &infinite) {
                        errors.push(infinite_conflict(&light.id, existing));
                    } else {
                        if light.is_infinite() {
                            infinite = Some(light.id.clone());
                        }
                        accepted.push(light);
                    }
                }
                Err(e) => errors.extend(e),
            }
        }
        errors.into_result()?;
        self.scene.lights.extend(accepted.iter().cloned());
        Ok(accepted)
    }

    pub fn update_light(&mut self, id: &str, update: &LightUpdate) -> Result<Change<Light>, SceneError> {
        let index = self
            .light_index(id)
            .ok_or_else(|| SceneError::not_found(EntityKind::Light, id))?;
        let before = self
            .scene
            .lights
            .get(index)
            .cloned()
            .ok_or_else(|| SceneError::not_found(EntityKind::Light, id))?;

        let mut properties = before.geometry.to_properties();
        if let Some(patch) = &update.properties {
            properties.merge(patch);
        }
        let spec = LightSpec {
            id: update.id.clone().unwrap_or_else(|| before.id.clone()),
            light_type: update
                .light_type
                .clone()
                .or_else(|| serde_variant_name(&before.light_type()))
                .unwrap_or_default(),
            properties,
        };

        let (mut errors, candidate) = match light::validate_light(&spec, index) {
            Ok(light) => (ValidationErrors::new(), Some(light)),
            Err(e) => (e, None),
        };
        let new_id = spec.id.trim();
        if new_id != before.id && self.light_index(new_id).is_some() {
            errors.push(format!("light ID \"{new_id}\" already exists"));
        }
        if let Some(light) = &candidate {
            if light.is_infinite() {
                if let Some(other) = self.infinite_light_id(Some(&before.id)) {
                    errors.push(infinite_conflict(&light.id, &other));
                }
            }
        }
        let after = match candidate {
            Some(light) if errors.is_empty() => light,
            _ => return Err(errors.into()),
        };
        if let Some(slot) = self.scene.lights.get_mut(index) {
            *slot = after.clone();
        }
        Ok(Change { before, after })
    }

    pub fn remove_light(&mut self, id: &str) -> Result<Light, SceneError> {
        let index = self
            .light_index(id)
            .ok_or_else(|| SceneError::not_found(EntityKind::Light, id))?;
        Ok(self.scene.lights.remove(index))
    }

    // ── Camera & environment ────────────────────────────────────

    /// Replace the camera. Every violated rule is reported in one error.
    pub fn set_camera(&mut self, spec: &CameraSpec) -> Result<Change<Camera>, SceneError> {
        let before = self.scene.camera;
        let after = camera::validate_camera(spec, &before)?;
        self.scene.camera = after;
        Ok(Change { before, after })
    }

    /// Replace all background lighting with the requested kind. `none` only removes.
    pub fn set_environment_lighting(&mut self, spec: &EnvironmentSpec) -> Result<EnvironmentChange, SceneError> {
        let mut c = Checker::new("environment");
        let geometry = if spec.kind.trim().is_empty() {
            c.fail("kind is required");
            None
        } else {
            match from_serde_str::<EnvironmentKind>(&spec.kind) {
                None => {
                    c.fail(format!(
                        "unsupported environment kind \"{}\" (expected one of: {})",
                        spec.kind,
                        serde_variant_names(EnvironmentKind::ALL).join(", ")
                    ));
                    None
                }
                Some(EnvironmentKind::Gradient) => {
                    let top = c.radiance("top_color", spec.top_color.as_deref());
                    let bottom = c.radiance("bottom_color", spec.bottom_color.as_deref());
                    top.zip(bottom).map(|(top_color, bottom_color)| {
                        Some(LightGeometry::InfiniteGradientLight { top_color, bottom_color })
                    })
                }
                Some(EnvironmentKind::Uniform) => c
                    .radiance("emission", spec.emission.as_deref())
                    .map(|emission| Some(LightGeometry::InfiniteUniformLight { emission })),
                Some(EnvironmentKind::Off) => Some(None),
            }
        };
        let errors = c.finish();
        let geometry = match geometry {
            Some(g) if errors.is_empty() => g,
            _ => return Err(errors.into()),
        };

        let (removed, kept): (Vec<Light>, Vec<Light>) =
            std::mem::take(&mut self.scene.lights).into_iter().partition(Light::is_infinite);
        self.scene.lights = kept;
        let added = geometry.map(|geometry| Light {
            id: self.unused_light_id(ENVIRONMENT_LIGHT_ID),
            geometry,
        });
        if let Some(light) = &added {
            self.scene.lights.push(light.clone());
        }
        Ok(EnvironmentChange { removed, added })
    }

    fn unused_light_id(&self, base: &str) -> String {
        if self.light_index(base).is_none() {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| self.light_index(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }
}

fn infinite_conflict(id: &str, existing: &str) -> String {
    format!(
        "light \"{id}\": infinite light \"{existing}\" is already active; use set_environment_lighting to replace background lighting"
    )
}
