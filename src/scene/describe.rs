//! Compact plain-text summary of a scene, merged into the prompt so the model
//! knows the current state without calling `get_scene_state`.

use std::fmt::Write;

use super::light::{Light, LightGeometry};
use super::material::Material;
use super::math::fmt_vec;
use super::shape::{Shape, ShapeGeometry};
use super::Scene;

pub(crate) fn summarize(scene: &Scene) -> String {
    let mut out = String::new();
    let cam = &scene.camera;
    let _ = writeln!(
        out,
        "Camera: center {}, look_at {}, vfov {}, aperture {}",
        fmt_vec(&cam.center),
        fmt_vec(&cam.look_at),
        cam.vfov,
        cam.aperture
    );

    if scene.shapes.is_empty() {
        let _ = writeln!(out, "Shapes: none");
    } else {
        let _ = writeln!(out, "Shapes ({}):", scene.shapes.len());
        for shape in &scene.shapes {
            let _ = writeln!(out, "- {}", describe_shape(shape));
        }
    }

    if scene.lights.is_empty() {
        let _ = writeln!(out, "Lights: none (default sky gradient)");
    } else {
        let _ = writeln!(out, "Lights ({}):", scene.lights.len());
        for light in &scene.lights {
            let _ = writeln!(out, "- {}", describe_light(light));
        }
    }
    out.trim_end().to_string()
}

fn describe_shape(shape: &Shape) -> String {
    let geometry = match &shape.geometry {
        ShapeGeometry::Sphere { center, radius } => {
            format!("sphere center {} radius {radius}", fmt_vec(center))
        }
        ShapeGeometry::Box { center, size, rotation } => {
            let mut s = format!("box center {} size {}", fmt_vec(center), fmt_vec(size));
            if let Some(r) = rotation {
                let _ = write!(s, " rotation {}", fmt_vec(r));
            }
            s
        }
        ShapeGeometry::Quad { corner, u, v } => {
            format!("quad corner {} u {} v {}", fmt_vec(corner), fmt_vec(u), fmt_vec(v))
        }
        ShapeGeometry::Disc { center, normal, radius } => format!(
            "disc center {} normal {} radius {radius}",
            fmt_vec(center),
            fmt_vec(normal)
        ),
        ShapeGeometry::Cylinder { base_center, top_center, radius, capped } => format!(
            "cylinder {} -> {} radius {radius}{}",
            fmt_vec(base_center),
            fmt_vec(top_center),
            if *capped { "" } else { " (open)" }
        ),
        ShapeGeometry::Cone { base_center, top_center, base_radius, top_radius, capped } => format!(
            "cone {} -> {} radius {base_radius} to {top_radius}{}",
            fmt_vec(base_center),
            fmt_vec(top_center),
            if *capped { "" } else { " (open)" }
        ),
    };
    let material = match &shape.material {
        None => "default material".to_string(),
        Some(Material::Lambertian { albedo }) => format!("lambertian {}", fmt_vec(albedo)),
        Some(Material::Metal { albedo, fuzz }) => format!("metal {} fuzz {fuzz}", fmt_vec(albedo)),
        Some(Material::Dielectric { refractive_index }) => format!("dielectric ior {refractive_index}"),
    };
    format!("\"{}\": {geometry}, {material}", shape.id)
}

fn describe_light(light: &Light) -> String {
    let detail = match &light.geometry {
        LightGeometry::PointSpotLight { center, direction, cutoff_angle, .. } => {
            let mut s = format!("point light at {}", fmt_vec(center));
            if let (Some(d), Some(c)) = (direction, cutoff_angle) {
                let _ = write!(s, " aimed {} cutoff {c}", fmt_vec(d));
            }
            s
        }
        LightGeometry::AreaQuadLight { corner, .. } => format!("area quad light at {}", fmt_vec(corner)),
        LightGeometry::AreaDiscLight { center, radius, .. } => {
            format!("area disc light at {} radius {radius}", fmt_vec(center))
        }
        LightGeometry::AreaSphereLight { center, radius, .. } => {
            format!("area sphere light at {} radius {radius}", fmt_vec(center))
        }
        LightGeometry::AreaDiscSpotLight { center, cutoff_angle, .. } => {
            format!("disc spot light at {} cutoff {cutoff_angle}", fmt_vec(center))
        }
        LightGeometry::InfiniteGradientLight { top_color, bottom_color } => format!(
            "sky gradient top {} bottom {}",
            fmt_vec(top_color),
            fmt_vec(bottom_color)
        ),
        LightGeometry::InfiniteUniformLight { .. } => "uniform environment light".to_string(),
    };
    match light.geometry.emission() {
        Some(e) => format!("\"{}\": {detail}, emission {}", light.id, fmt_vec(&e)),
        None => format!("\"{}\": {detail}", light.id),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn empty_scene_summary() {
        let text = summarize(&Scene::default());
        assert_eq!(
            text,
            "Camera: center [0, 0, 5], look_at [0, 0, 0], vfov 40, aperture 0\nShapes: none\nLights: none (default sky gradient)"
        );
    }

    #[test]
    fn lists_shapes_with_materials() {
        let scene = Scene {
            shapes: vec![Shape {
                id: "ball".into(),
                geometry: ShapeGeometry::Sphere { center: [0.0, 1.0, 0.0], radius: 0.5 },
                material: Some(Material::Metal { albedo: [0.9, 0.9, 0.9], fuzz: 0.1 }),
            }],
            lights: vec![Light {
                id: "sun".into(),
                geometry: LightGeometry::AreaSphereLight {
                    center: [0.0, 5.0, 0.0],
                    radius: 1.0,
                    emission: [8.0, 8.0, 8.0],
                },
            }],
            ..Scene::default()
        };
        let text = summarize(&scene);
        assert!(text.contains("- \"ball\": sphere center [0, 1, 0] radius 0.5, metal [0.9, 0.9, 0.9] fuzz 0.1"));
        assert!(text.contains("- \"sun\": area sphere light at [0, 5, 0] radius 1, emission [8, 8, 8]"));
    }
}
