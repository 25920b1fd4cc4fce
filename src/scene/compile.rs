//! Lowering of a validated scene into the form a renderer consumes.

use serde::{Deserialize, Serialize};

use crate::error::SceneError;

use super::light::{Light, LightGeometry, LightProperties};
use super::material::Material;
use super::math::{self, Vec3};
use super::shape::{ShapeGeometry, ShapeProperties};
use super::Scene;

/// Sky used when the scene has no lights at all.
pub const DEFAULT_SKY: LightGeometry = LightGeometry::InfiniteGradientLight {
    top_color: [0.5, 0.7, 1.0],
    bottom_color: [1.0, 1.0, 1.0],
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledCamera {
    pub center: Vec3,
    pub look_at: Vec3,
    pub up: Vec3,
    pub vfov: f64,
    pub aperture: f64,
    pub focus_distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledShape {
    pub id: String,
    #[serde(flatten)]
    pub geometry: ShapeGeometry,
    pub material: Material,
}

/// Renderer-ready scene: every shape has a material and there is at least one light.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledScene {
    pub camera: CompiledCamera,
    pub shapes: Vec<CompiledShape>,
    pub lights: Vec<Light>,
}

pub(crate) fn compile(scene: &Scene) -> Result<CompiledScene, SceneError> {
    let camera = &scene.camera;
    let view = math::sub(camera.look_at, camera.center);
    let numbers = [camera.vfov, camera.aperture];
    if !math::all_finite(&camera.center) || !math::all_finite(&camera.look_at) || !math::all_finite(&numbers) {
        return Err(compile_error("camera has non-finite values"));
    }
    let Some(forward) = math::normalize(view) else {
        return Err(compile_error("camera center and look_at coincide"));
    };
    // Looking straight up or down makes world-up degenerate.
    let up = if math::parallel(forward, [0.0, 1.0, 0.0]) {
        [0.0, 0.0, -1.0]
    } else {
        [0.0, 1.0, 0.0]
    };

    let mut shapes = Vec::with_capacity(scene.shapes.len());
    for shape in &scene.shapes {
        if !shape_numbers(&shape.geometry.to_properties()).all(f64::is_finite) {
            return Err(compile_error(&format!("shape \"{}\" has non-finite geometry", shape.id)));
        }
        shapes.push(CompiledShape {
            id: shape.id.clone(),
            geometry: shape.geometry.clone(),
            material: shape.material.clone().unwrap_or_else(Material::neutral),
        });
    }

    let mut lights = Vec::with_capacity(scene.lights.len().max(1));
    for light in &scene.lights {
        if !light_numbers(&light.geometry.to_properties()).all(f64::is_finite) {
            return Err(compile_error(&format!("light \"{}\" has non-finite values", light.id)));
        }
        lights.push(light.clone());
    }
    if lights.is_empty() {
        lights.push(Light {
            id: "default_sky".to_string(),
            geometry: DEFAULT_SKY,
        });
    }

    Ok(CompiledScene {
        camera: CompiledCamera {
            center: camera.center,
            look_at: camera.look_at,
            up,
            vfov: camera.vfov,
            aperture: camera.aperture,
            focus_distance: math::length(view),
        },
        shapes,
        lights,
    })
}

fn compile_error(message: &str) -> SceneError {
    SceneError::Compile {
        message: message.to_string(),
    }
}

fn shape_numbers(p: &ShapeProperties) -> impl Iterator<Item = f64> + '_ {
    [&p.center, &p.size, &p.rotation, &p.corner, &p.u, &p.v, &p.normal, &p.base_center, &p.top_center]
        .into_iter()
        .flatten()
        .flatten()
        .copied()
        .chain([p.radius, p.base_radius, p.top_radius].into_iter().flatten())
}

fn light_numbers(p: &LightProperties) -> impl Iterator<Item = f64> + '_ {
    [&p.center, &p.corner, &p.u, &p.v, &p.normal, &p.emission, &p.direction, &p.top_color, &p.bottom_color]
        .into_iter()
        .flatten()
        .flatten()
        .copied()
        .chain([p.radius, p.cutoff_angle, p.falloff_angle].into_iter().flatten())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::scene::{Camera, Shape};

    fn sphere(id: &str, radius: f64) -> Shape {
        Shape {
            id: id.into(),
            geometry: ShapeGeometry::Sphere { center: [0.0; 3], radius },
            material: None,
        }
    }

    #[test]
    fn defaults_material_and_sky() {
        let scene = Scene {
            shapes: vec![sphere("s1", 1.0)],
            ..Scene::default()
        };
        let compiled = compile(&scene).unwrap();
        assert_eq!(compiled.shapes.len(), 1);
        assert_eq!(compiled.shapes[0].material, Material::neutral());
        assert_eq!(compiled.lights.len(), 1);
        assert_eq!(compiled.lights[0].geometry, DEFAULT_SKY);
        assert_eq!(compiled.camera.focus_distance, 5.0);
        // Defaults are supplied at compile time only.
        assert!(scene.shapes[0].material.is_none());
        assert!(scene.lights.is_empty());
    }

    #[test]
    fn non_finite_geometry_fails() {
        let scene = Scene {
            shapes: vec![sphere("bad", f64::NAN)],
            ..Scene::default()
        };
        let err = compile(&scene).unwrap_err();
        assert!(err.to_string().contains("shape \"bad\""));
    }

    #[test]
    fn degenerate_camera_fails() {
        let scene = Scene {
            camera: Camera {
                center: [1.0, 1.0, 1.0],
                look_at: [1.0, 1.0, 1.0],
                ..Camera::default()
            },
            ..Scene::default()
        };
        assert!(matches!(compile(&scene), Err(SceneError::Compile { .. })));
    }

    #[test]
    fn top_down_camera_gets_a_valid_up_vector() {
        let scene = Scene {
            camera: Camera {
                center: [0.0, 10.0, 0.0],
                look_at: [0.0, 0.0, 0.0],
                ..Camera::default()
            },
            ..Scene::default()
        };
        assert_eq!(compile(&scene).unwrap().camera.up, [0.0, 0.0, -1.0]);
    }
}
