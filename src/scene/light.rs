use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ValidationErrors;
use crate::lenient;
use crate::util::{from_serde_str, serde_variant_names, string_enum_schema};

use super::math::Vec3;
use super::shape::edge_pair;
use super::validation::{entity_label, Checker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightType {
    PointSpotLight,
    AreaQuadLight,
    AreaDiscLight,
    AreaSphereLight,
    AreaDiscSpotLight,
    InfiniteGradientLight,
    InfiniteUniformLight,
}

impl LightType {
    pub const ALL: &'static [LightType] = &[
        LightType::PointSpotLight,
        LightType::AreaQuadLight,
        LightType::AreaDiscLight,
        LightType::AreaSphereLight,
        LightType::AreaDiscSpotLight,
        LightType::InfiniteGradientLight,
        LightType::InfiniteUniformLight,
    ];

    /// Background lights that affect every escaping ray.
    pub fn is_infinite(self) -> bool {
        matches!(
            self,
            LightType::InfiniteGradientLight | LightType::InfiniteUniformLight
        )
    }
}

/// Validated light geometry, one variant per [`LightType`]. Angles are degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LightGeometry {
    PointSpotLight {
        center: Vec3,
        emission: Vec3,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        direction: Option<Vec3>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cutoff_angle: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        falloff_angle: Option<f64>,
    },
    AreaQuadLight {
        corner: Vec3,
        u: Vec3,
        v: Vec3,
        emission: Vec3,
    },
    AreaDiscLight {
        center: Vec3,
        normal: Vec3,
        radius: f64,
        emission: Vec3,
    },
    AreaSphereLight {
        center: Vec3,
        radius: f64,
        emission: Vec3,
    },
    AreaDiscSpotLight {
        center: Vec3,
        normal: Vec3,
        radius: f64,
        emission: Vec3,
        cutoff_angle: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        falloff_angle: Option<f64>,
    },
    InfiniteGradientLight {
        top_color: Vec3,
        bottom_color: Vec3,
    },
    InfiniteUniformLight {
        emission: Vec3,
    },
}

impl LightGeometry {
    pub fn light_type(&self) -> LightType {
        match self {
            LightGeometry::PointSpotLight { .. } => LightType::PointSpotLight,
            LightGeometry::AreaQuadLight { .. } => LightType::AreaQuadLight,
            LightGeometry::AreaDiscLight { .. } => LightType::AreaDiscLight,
            LightGeometry::AreaSphereLight { .. } => LightType::AreaSphereLight,
            LightGeometry::AreaDiscSpotLight { .. } => LightType::AreaDiscSpotLight,
            LightGeometry::InfiniteGradientLight { .. } => LightType::InfiniteGradientLight,
            LightGeometry::InfiniteUniformLight { .. } => LightType::InfiniteUniformLight,
        }
    }

    /// Emitted radiance, if the light has a single emission color.
    pub fn emission(&self) -> Option<Vec3> {
        match self {
            LightGeometry::PointSpotLight { emission, .. }
            | LightGeometry::AreaQuadLight { emission, .. }
            | LightGeometry::AreaDiscLight { emission, .. }
            | LightGeometry::AreaSphereLight { emission, .. }
            | LightGeometry::AreaDiscSpotLight { emission, .. }
            | LightGeometry::InfiniteUniformLight { emission } => Some(*emission),
            LightGeometry::InfiniteGradientLight { .. } => None,
        }
    }

    pub fn to_properties(&self) -> LightProperties {
        let v = |a: &Vec3| Some(a.to_vec());
        let mut p = LightProperties::default();
        match self {
            LightGeometry::PointSpotLight { center, emission, direction, cutoff_angle, falloff_angle } => {
                p.center = v(center);
                p.emission = v(emission);
                p.direction = direction.as_ref().and_then(v);
                p.cutoff_angle = *cutoff_angle;
                p.falloff_angle = *falloff_angle;
            }
            LightGeometry::AreaQuadLight { corner, u, v: edge, emission } => {
                p.corner = v(corner);
                p.u = v(u);
                p.v = v(edge);
                p.emission = v(emission);
            }
            LightGeometry::AreaDiscLight { center, normal, radius, emission } => {
                p.center = v(center);
                p.normal = v(normal);
                p.radius = Some(*radius);
                p.emission = v(emission);
            }
            LightGeometry::AreaSphereLight { center, radius, emission } => {
                p.center = v(center);
                p.radius = Some(*radius);
                p.emission = v(emission);
            }
            LightGeometry::AreaDiscSpotLight { center, normal, radius, emission, cutoff_angle, falloff_angle } => {
                p.center = v(center);
                p.normal = v(normal);
                p.radius = Some(*radius);
                p.emission = v(emission);
                p.cutoff_angle = Some(*cutoff_angle);
                p.falloff_angle = *falloff_angle;
            }
            LightGeometry::InfiniteGradientLight { top_color, bottom_color } => {
                p.top_color = v(top_color);
                p.bottom_color = v(bottom_color);
            }
            LightGeometry::InfiniteUniformLight { emission } => {
                p.emission = v(emission);
            }
        }
        p
    }
}

/// A validated light as stored in the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub id: String,
    #[serde(flatten)]
    pub geometry: LightGeometry,
}

impl Light {
    pub fn light_type(&self) -> LightType {
        self.geometry.light_type()
    }

    pub fn is_infinite(&self) -> bool {
        self.light_type().is_infinite()
    }
}

fn light_type_schema(_gen: &mut SchemaGenerator) -> Schema {
    string_enum_schema(serde_variant_names(LightType::ALL))
}

/// Light fields as supplied by the model. Which ones are required depends on the light type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LightProperties {
    /// Position [x, y, z]. point, disc, sphere and disc-spot lights.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub center: Option<Vec<f64>>,
    /// Quad light corner [x, y, z].
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub corner: Option<Vec<f64>>,
    /// First quad light edge, non-zero.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub u: Option<Vec<f64>>,
    /// Second quad light edge, non-zero and not parallel to u.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub v: Option<Vec<f64>>,
    /// Facing direction of disc lights, non-zero.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub normal: Option<Vec<f64>>,
    /// Radius of disc and sphere lights, > 0.
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    /// Emitted RGB radiance, components >= 0 (may exceed 1).
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub emission: Option<Vec<f64>>,
    /// Spot direction for point lights, non-zero. Required when cutoff_angle is set.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub direction: Option<Vec<f64>>,
    /// Spot cone half-angle in degrees, in (0, 180).
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub cutoff_angle: Option<f64>,
    /// Angle where intensity starts falling off, in (0, cutoff_angle].
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub falloff_angle: Option<f64>,
    /// Sky color overhead, components >= 0. Gradient lights.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub top_color: Option<Vec<f64>>,
    /// Sky color at the horizon and below, components >= 0. Gradient lights.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub bottom_color: Option<Vec<f64>>,
}

macro_rules! merge_fields {
    ($dst:expr, $src:expr, $($field:ident),+) => {
        $( if $src.$field.is_some() { $dst.$field = $src.$field.clone(); } )+
    };
}

impl LightProperties {
    /// Overlay every field present in `patch`; absent fields keep their current value.
    pub fn merge(&mut self, patch: &LightProperties) {
        merge_fields!(
            self, patch, center, corner, u, v, normal, radius, emission, direction, cutoff_angle,
            falloff_angle, top_color, bottom_color
        );
    }
}

/// One light in a create request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LightSpec {
    /// Unique, non-empty identifier.
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    /// Light type.
    #[serde(rename = "type", default, deserialize_with = "lenient::string")]
    #[schemars(schema_with = "light_type_schema")]
    pub light_type: String,
    /// Type-specific geometry and emission.
    #[serde(default, deserialize_with = "lenient::object")]
    pub properties: LightProperties,
}

/// Partial update for an existing light.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LightUpdate {
    /// New id, to rename the light.
    #[serde(default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// New light type. Properties the new type needs must be supplied.
    #[serde(rename = "type", default, deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "light_type_schema")]
    pub light_type: Option<String>,
    /// Properties to overwrite. Unlisted properties keep their values.
    #[serde(default, deserialize_with = "lenient::opt_object", skip_serializing_if = "Option::is_none")]
    pub properties: Option<LightProperties>,
}

pub(crate) fn validate_light(spec: &LightSpec, index: usize) -> Result<Light, ValidationErrors> {
    let mut checker = Checker::new(entity_label("light", &spec.id, index));
    if spec.id.trim().is_empty() {
        checker.fail("light ID cannot be empty");
    }
    let geometry = light_geometry(&spec.light_type, &spec.properties, &mut checker);
    match (checker.is_clean(), geometry) {
        (true, Some(geometry)) => Ok(Light {
            id: spec.id.trim().to_string(),
            geometry,
        }),
        _ => Err(checker.finish()),
    }
}

fn light_geometry(type_name: &str, p: &LightProperties, c: &mut Checker) -> Option<LightGeometry> {
    if type_name.trim().is_empty() {
        c.fail("type is required");
        return None;
    }
    let Some(light_type) = from_serde_str::<LightType>(type_name) else {
        c.fail(format!(
            "unsupported light type \"{type_name}\" (expected one of: {})",
            serde_variant_names(LightType::ALL).join(", ")
        ));
        return None;
    };

    match light_type {
        LightType::PointSpotLight => {
            let center = c.vector("center", p.center.as_deref());
            let emission = c.radiance("emission", p.emission.as_deref());
            let direction = c.opt_nonzero_vector("direction", p.direction.as_deref());
            let bad_direction = p.direction.is_some() && direction.is_none();
            let (cutoff, falloff) = spot_angles(c, p.cutoff_angle, p.falloff_angle, false);
            if p.cutoff_angle.is_some() && p.direction.is_none() {
                c.fail("direction is required when cutoff_angle is set");
                return None;
            }
            if bad_direction {
                return None;
            }
            Some(LightGeometry::PointSpotLight {
                center: center?,
                emission: emission?,
                direction,
                cutoff_angle: cutoff?,
                falloff_angle: falloff?,
            })
        }
        LightType::AreaQuadLight => {
            let corner = c.vector("corner", p.corner.as_deref());
            let (u, v) = edge_pair(c, p.u.as_deref(), p.v.as_deref());
            let emission = c.radiance("emission", p.emission.as_deref());
            Some(LightGeometry::AreaQuadLight {
                corner: corner?,
                u: u?,
                v: v?,
                emission: emission?,
            })
        }
        LightType::AreaDiscLight => {
            let center = c.vector("center", p.center.as_deref());
            let normal = c.nonzero_vector("normal", p.normal.as_deref());
            let radius = c.positive("radius", p.radius);
            let emission = c.radiance("emission", p.emission.as_deref());
            Some(LightGeometry::AreaDiscLight {
                center: center?,
                normal: normal?,
                radius: radius?,
                emission: emission?,
            })
        }
        LightType::AreaSphereLight => {
            let center = c.vector("center", p.center.as_deref());
            let radius = c.positive("radius", p.radius);
            let emission = c.radiance("emission", p.emission.as_deref());
            Some(LightGeometry::AreaSphereLight {
                center: center?,
                radius: radius?,
                emission: emission?,
            })
        }
        LightType::AreaDiscSpotLight => {
            let center = c.vector("center", p.center.as_deref());
            let normal = c.nonzero_vector("normal", p.normal.as_deref());
            let radius = c.positive("radius", p.radius);
            let emission = c.radiance("emission", p.emission.as_deref());
            let (cutoff, falloff) = spot_angles(c, p.cutoff_angle, p.falloff_angle, true);
            Some(LightGeometry::AreaDiscSpotLight {
                center: center?,
                normal: normal?,
                radius: radius?,
                emission: emission?,
                cutoff_angle: cutoff.flatten()?,
                falloff_angle: falloff?,
            })
        }
        LightType::InfiniteGradientLight => {
            let top = c.radiance("top_color", p.top_color.as_deref());
            let bottom = c.radiance("bottom_color", p.bottom_color.as_deref());
            Some(LightGeometry::InfiniteGradientLight {
                top_color: top?,
                bottom_color: bottom?,
            })
        }
        LightType::InfiniteUniformLight => {
            let emission = c.radiance("emission", p.emission.as_deref());
            Some(LightGeometry::InfiniteUniformLight {
                emission: emission?,
            })
        }
    }
}

/// Check cutoff/falloff angles. The outer `Option` is `None` on failure; the
/// inner one carries an absent optional angle.
fn spot_angles(
    c: &mut Checker,
    cutoff: Option<f64>,
    falloff: Option<f64>,
    cutoff_required: bool,
) -> (Option<Option<f64>>, Option<Option<f64>>) {
    let checked_cutoff = if cutoff_required {
        c.angle("cutoff_angle", cutoff).map(Some)
    } else {
        match cutoff {
            None => Some(None),
            Some(_) => c.opt_angle("cutoff_angle", cutoff).map(Some),
        }
    };

    let checked_falloff = match falloff {
        None => Some(None),
        Some(f) => match cutoff {
            None => {
                c.fail("cutoff_angle is required when falloff_angle is set");
                None
            }
            Some(limit) => {
                let within = c.scalar("falloff_angle", Some(f));
                match within {
                    Some(f) if f <= 0.0 || f > limit => {
                        c.fail(format!(
                            "falloff_angle must be greater than 0 and at most cutoff_angle {limit} (got {f})"
                        ));
                        None
                    }
                    Some(f) => Some(Some(f)),
                    None => None,
                }
            }
        },
    };
    (checked_cutoff, checked_falloff)
}
