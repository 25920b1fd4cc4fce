use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ValidationErrors;
use crate::lenient;
use crate::util::{from_serde_str, serde_variant_names, string_enum_schema};

use super::material::{validate_material, Material, MaterialSpec};
use super::math::{self, Vec3};
use super::validation::{entity_label, Checker};

/// Geometric primitive kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeType {
    Sphere,
    Box,
    Quad,
    Disc,
    Cylinder,
    Cone,
}

impl ShapeType {
    pub const ALL: &'static [ShapeType] = &[
        ShapeType::Sphere,
        ShapeType::Box,
        ShapeType::Quad,
        ShapeType::Disc,
        ShapeType::Cylinder,
        ShapeType::Cone,
    ];
}

fn default_capped() -> bool {
    true
}

/// Validated geometry, one variant per [`ShapeType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeGeometry {
    Sphere {
        center: Vec3,
        radius: f64,
    },
    Box {
        center: Vec3,
        size: Vec3,
        /// Euler angles in degrees.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rotation: Option<Vec3>,
    },
    Quad {
        corner: Vec3,
        u: Vec3,
        v: Vec3,
    },
    Disc {
        center: Vec3,
        normal: Vec3,
        radius: f64,
    },
    Cylinder {
        base_center: Vec3,
        top_center: Vec3,
        radius: f64,
        #[serde(default = "default_capped")]
        capped: bool,
    },
    Cone {
        base_center: Vec3,
        top_center: Vec3,
        base_radius: f64,
        top_radius: f64,
        #[serde(default = "default_capped")]
        capped: bool,
    },
}

impl ShapeGeometry {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            ShapeGeometry::Sphere { .. } => ShapeType::Sphere,
            ShapeGeometry::Box { .. } => ShapeType::Box,
            ShapeGeometry::Quad { .. } => ShapeType::Quad,
            ShapeGeometry::Disc { .. } => ShapeType::Disc,
            ShapeGeometry::Cylinder { .. } => ShapeType::Cylinder,
            ShapeGeometry::Cone { .. } => ShapeType::Cone,
        }
    }

    /// Flatten into the loosely typed properties view used for patches.
    pub fn to_properties(&self) -> ShapeProperties {
        let v = |a: &Vec3| Some(a.to_vec());
        let mut p = ShapeProperties::default();
        match self {
            ShapeGeometry::Sphere { center, radius } => {
                p.center = v(center);
                p.radius = Some(*radius);
            }
            ShapeGeometry::Box { center, size, rotation } => {
                p.center = v(center);
                p.size = v(size);
                p.rotation = rotation.as_ref().and_then(v);
            }
            ShapeGeometry::Quad { corner, u, v: edge } => {
                p.corner = v(corner);
                p.u = v(u);
                p.v = v(edge);
            }
            ShapeGeometry::Disc { center, normal, radius } => {
                p.center = v(center);
                p.normal = v(normal);
                p.radius = Some(*radius);
            }
            ShapeGeometry::Cylinder { base_center, top_center, radius, capped } => {
                p.base_center = v(base_center);
                p.top_center = v(top_center);
                p.radius = Some(*radius);
                p.capped = Some(*capped);
            }
            ShapeGeometry::Cone { base_center, top_center, base_radius, top_radius, capped } => {
                p.base_center = v(base_center);
                p.top_center = v(top_center);
                p.base_radius = Some(*base_radius);
                p.top_radius = Some(*top_radius);
                p.capped = Some(*capped);
            }
        }
        p
    }

    /// The point the camera frames: center, else base center, else corner.
    pub fn anchor(&self) -> Vec3 {
        match self {
            ShapeGeometry::Sphere { center, .. }
            | ShapeGeometry::Box { center, .. }
            | ShapeGeometry::Disc { center, .. } => *center,
            ShapeGeometry::Cylinder { base_center, .. }
            | ShapeGeometry::Cone { base_center, .. } => *base_center,
            ShapeGeometry::Quad { corner, .. } => *corner,
        }
    }

    /// Rough extent used to pick a camera distance: radius, then base radius,
    /// then first box dimension, then first edge length.
    pub fn representative_size(&self) -> f64 {
        match self {
            ShapeGeometry::Sphere { radius, .. }
            | ShapeGeometry::Disc { radius, .. }
            | ShapeGeometry::Cylinder { radius, .. } => *radius,
            ShapeGeometry::Cone { base_radius, .. } => *base_radius,
            ShapeGeometry::Box { size, .. } => size[0],
            ShapeGeometry::Quad { u, .. } => math::length(*u),
        }
    }
}

/// A validated shape as stored in the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: String,
    #[serde(flatten)]
    pub geometry: ShapeGeometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<Material>,
}

impl Shape {
    pub fn shape_type(&self) -> ShapeType {
        self.geometry.shape_type()
    }
}

fn shape_type_schema(_gen: &mut SchemaGenerator) -> Schema {
    string_enum_schema(serde_variant_names(ShapeType::ALL))
}

/// Geometry fields as supplied by the model. Which ones are required depends on the shape type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShapeProperties {
    /// Center point [x, y, z]. sphere, box, disc.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub center: Option<Vec<f64>>,
    /// Radius, > 0. sphere, disc, cylinder.
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    /// Box dimensions [width, height, depth], each > 0.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub size: Option<Vec<f64>>,
    /// Optional box rotation in degrees [x, y, z].
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Vec<f64>>,
    /// Quad corner point [x, y, z].
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub corner: Option<Vec<f64>>,
    /// First quad edge vector, non-zero.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub u: Option<Vec<f64>>,
    /// Second quad edge vector, non-zero and not parallel to u.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub v: Option<Vec<f64>>,
    /// Disc facing direction, non-zero.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub normal: Option<Vec<f64>>,
    /// Bottom cap center. cylinder, cone.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub base_center: Option<Vec<f64>>,
    /// Top cap center, distinct from base_center. cylinder, cone.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub top_center: Option<Vec<f64>>,
    /// Cone radius at the base, > 0 and greater than top_radius.
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub base_radius: Option<f64>,
    /// Cone radius at the top, >= 0 (0 for a pointed cone).
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub top_radius: Option<f64>,
    /// Whether cylinder/cone ends are closed. Defaults to true.
    #[serde(default, deserialize_with = "lenient::opt_bool", skip_serializing_if = "Option::is_none")]
    pub capped: Option<bool>,
}

macro_rules! merge_fields {
    ($dst:expr, $src:expr, $($field:ident),+) => {
        $( if $src.$field.is_some() { $dst.$field = $src.$field.clone(); } )+
    };
}

impl ShapeProperties {
    /// Overlay every field present in `patch`; absent fields keep their current value.
    pub fn merge(&mut self, patch: &ShapeProperties) {
        merge_fields!(
            self, patch, center, radius, size, rotation, corner, u, v, normal, base_center,
            top_center, base_radius, top_radius, capped
        );
    }
}

/// One shape in a create request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShapeSpec {
    /// Unique, non-empty identifier.
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    /// Shape type.
    #[serde(rename = "type", default, deserialize_with = "lenient::string")]
    #[schemars(schema_with = "shape_type_schema")]
    pub shape_type: String,
    /// Type-specific geometry.
    #[serde(default, deserialize_with = "lenient::object")]
    pub properties: ShapeProperties,
    /// Optional surface material. Omit for neutral grey diffuse.
    #[serde(default, deserialize_with = "lenient::opt_object", skip_serializing_if = "Option::is_none")]
    pub material: Option<MaterialSpec>,
}

/// Partial update for an existing shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ShapeUpdate {
    /// New id, to rename the shape.
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// New shape type. Properties the new type needs must be supplied.
    #[serde(rename = "type", default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "shape_type_schema")]
    pub shape_type: Option<String>,
    /// Properties to overwrite. Unlisted properties keep their values.
    #[serde(default, deserialize_with = "lenient::opt_object", skip_serializing_if = "Option::is_none")]
    pub properties: Option<ShapeProperties>,
    /// Replacement material.
    #[serde(default, deserialize_with = "lenient::opt_object", skip_serializing_if = "Option::is_none")]
    pub material: Option<MaterialSpec>,
}

/// Validate one shape spec. `index` is its position in the batch, used when the id is empty.
pub(crate) fn validate_shape(spec: &ShapeSpec, index: usize) -> Result<Shape, ValidationErrors> {
    let mut checker = Checker::new(entity_label("shape", &spec.id, index));
    if spec.id.trim().is_empty() {
        checker.fail("shape ID cannot be empty");
    }
    let geometry = shape_geometry(&spec.shape_type, &spec.properties, &mut checker);
    let material = spec
        .material
        .as_ref()
        .map(|m| validate_material(m, &mut checker));

    match (checker.is_clean(), geometry) {
        (true, Some(geometry)) => Ok(Shape {
            id: spec.id.trim().to_string(),
            geometry,
            material: material.flatten(),
        }),
        _ => Err(checker.finish()),
    }
}

fn shape_geometry(type_name: &str, p: &ShapeProperties, c: &mut Checker) -> Option<ShapeGeometry> {
    if type_name.trim().is_empty() {
        c.fail("type is required");
        return None;
    }
    let Some(shape_type) = from_serde_str::<ShapeType>(type_name) else {
        c.fail(format!(
            "unsupported shape type \"{type_name}\" (expected one of: {})",
            serde_variant_names(ShapeType::ALL).join(", ")
        ));
        return None;
    };

    match shape_type {
        ShapeType::Sphere => {
            let center = c.vector("center", p.center.as_deref());
            let radius = c.positive("radius", p.radius);
            Some(ShapeGeometry::Sphere {
                center: center?,
                radius: radius?,
            })
        }
        ShapeType::Box => {
            let center = c.vector("center", p.center.as_deref());
            let size = c.positive_vector("size", p.size.as_deref());
            let rotation = c.opt_vector("rotation", p.rotation.as_deref());
            if p.rotation.is_some() && rotation.is_none() {
                return None;
            }
            Some(ShapeGeometry::Box {
                center: center?,
                size: size?,
                rotation,
            })
        }
        ShapeType::Quad => {
            let corner = c.vector("corner", p.corner.as_deref());
            let (u, v) = edge_pair(c, p.u.as_deref(), p.v.as_deref());
            Some(ShapeGeometry::Quad {
                corner: corner?,
                u: u?,
                v: v?,
            })
        }
        ShapeType::Disc => {
            let center = c.vector("center", p.center.as_deref());
            let normal = c.nonzero_vector("normal", p.normal.as_deref());
            let radius = c.positive("radius", p.radius);
            Some(ShapeGeometry::Disc {
                center: center?,
                normal: normal?,
                radius: radius?,
            })
        }
        ShapeType::Cylinder => {
            let (base_center, top_center) = axis(c, p);
            let radius = c.positive("radius", p.radius);
            Some(ShapeGeometry::Cylinder {
                base_center: base_center?,
                top_center: top_center?,
                radius: radius?,
                capped: p.capped.unwrap_or(true),
            })
        }
        ShapeType::Cone => {
            let (base_center, top_center) = axis(c, p);
            let base_radius = c.positive("base_radius", p.base_radius);
            let top_radius = c.non_negative("top_radius", p.top_radius);
            if let (Some(base), Some(top)) = (base_radius, top_radius) {
                if base <= top {
                    c.fail(format!(
                        "base_radius must be greater than top_radius (got {base} <= {top})"
                    ));
                    return None;
                }
            }
            Some(ShapeGeometry::Cone {
                base_center: base_center?,
                top_center: top_center?,
                base_radius: base_radius?,
                top_radius: top_radius?,
                capped: p.capped.unwrap_or(true),
            })
        }
    }
}

/// Two non-zero, non-parallel edge vectors spanning a planar patch.
pub(crate) fn edge_pair(c: &mut Checker, u: Option<&[f64]>, v: Option<&[f64]>) -> (Option<Vec3>, Option<Vec3>) {
    let u = c.nonzero_vector("u", u);
    let v = c.nonzero_vector("v", v);
    if let (Some(a), Some(b)) = (u, v) {
        if math::parallel(a, b) {
            c.fail("u and v must not be parallel");
            return (None, None);
        }
    }
    (u, v)
}

fn axis(c: &mut Checker, p: &ShapeProperties) -> (Option<Vec3>, Option<Vec3>) {
    let base = c.vector("base_center", p.base_center.as_deref());
    let top = c.vector("top_center", p.top_center.as_deref());
    if let (Some(a), Some(b)) = (base, top) {
        if math::same_point(a, b) {
            c.fail("base_center and top_center must differ");
            return (None, None);
        }
    }
    (base, top)
}
