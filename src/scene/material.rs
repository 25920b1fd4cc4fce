use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::lenient;
use crate::util::{from_serde_str, serde_variant_names, string_enum_schema};

use super::math::Vec3;
use super::validation::Checker;

/// Surface response model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    Lambertian,
    Metal,
    Dielectric,
}

impl MaterialKind {
    pub const ALL: &'static [MaterialKind] = &[
        MaterialKind::Lambertian,
        MaterialKind::Metal,
        MaterialKind::Dielectric,
    ];
}

/// A validated material as stored on a shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Material {
    Lambertian { albedo: Vec3 },
    Metal { albedo: Vec3, fuzz: f64 },
    Dielectric { refractive_index: f64 },
}

impl Material {
    /// Neutral grey diffuse, substituted at compile time for shapes without a material.
    pub fn neutral() -> Self {
        Material::Lambertian {
            albedo: [0.5, 0.5, 0.5],
        }
    }

    pub fn kind(&self) -> MaterialKind {
        match self {
            Material::Lambertian { .. } => MaterialKind::Lambertian,
            Material::Metal { .. } => MaterialKind::Metal,
            Material::Dielectric { .. } => MaterialKind::Dielectric,
        }
    }
}

fn material_kind_schema(_gen: &mut SchemaGenerator) -> Schema {
    string_enum_schema(serde_variant_names(MaterialKind::ALL))
}

/// Material as supplied by the model, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MaterialSpec {
    /// Material kind.
    #[serde(default, deserialize_with = "lenient::string")]
    #[schemars(schema_with = "material_kind_schema")]
    pub kind: String,
    /// RGB reflectance, each component in [0, 1]. Required for lambertian and metal.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub albedo: Option<Vec<f64>>,
    /// Surface roughness in [0, 1]. Required for metal.
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub fuzz: Option<f64>,
    /// Index of refraction, at least 1.0. Required for dielectric.
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub refractive_index: Option<f64>,
}

/// Validate a material spec into `checker`, using `material.` field names.
pub(crate) fn validate_material(spec: &MaterialSpec, checker: &mut Checker) -> Option<Material> {
    if spec.kind.trim().is_empty() {
        checker.fail("material.kind is required");
        return None;
    }
    let Some(kind) = from_serde_str::<MaterialKind>(&spec.kind) else {
        checker.fail(format!(
            "unsupported material kind \"{}\" (expected one of: {})",
            spec.kind,
            serde_variant_names(MaterialKind::ALL).join(", ")
        ));
        return None;
    };
    match kind {
        MaterialKind::Lambertian => {
            let albedo = checker.unit_color("material.albedo", spec.albedo.as_deref())?;
            Some(Material::Lambertian { albedo })
        }
        MaterialKind::Metal => {
            let albedo = checker.unit_color("material.albedo", spec.albedo.as_deref());
            let fuzz = checker.within("material.fuzz", spec.fuzz, 0.0, 1.0);
            Some(Material::Metal {
                albedo: albedo?,
                fuzz: fuzz?,
            })
        }
        MaterialKind::Dielectric => {
            let ior = checker.scalar("material.refractive_index", spec.refractive_index)?;
            if ior < 1.0 {
                checker.fail(format!(
                    "material.refractive_index must be >= 1.0 (got {ior})"
                ));
                return None;
            }
            Some(Material::Dielectric {
                refractive_index: ior,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn check(spec: &MaterialSpec) -> (Option<Material>, Vec<String>) {
        let mut checker = Checker::new("shape \"s1\"");
        let material = validate_material(spec, &mut checker);
        (material, checker.finish().into_messages())
    }

    #[test]
    fn metal_reports_albedo_and_fuzz_together() {
        let (material, errors) = check(&MaterialSpec {
            kind: "metal".into(),
            albedo: Some(vec![1.5, 0.0, 0.0]),
            fuzz: Some(2.0),
            refractive_index: None,
        });
        assert!(material.is_none());
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("material.albedo"));
        assert!(errors[1].contains("material.fuzz must be between 0 and 1"));
    }

    #[test]
    fn dielectric_below_one_is_rejected() {
        let (material, errors) = check(&MaterialSpec {
            kind: "Dielectric".into(),
            refractive_index: Some(0.9),
            ..Default::default()
        });
        assert!(material.is_none());
        assert!(errors[0].contains(">= 1.0"));
    }

    #[test]
    fn unknown_kind_lists_the_options() {
        let (_, errors) = check(&MaterialSpec {
            kind: "glass".into(),
            ..Default::default()
        });
        assert_eq!(
            errors,
            vec!["shape \"s1\": unsupported material kind \"glass\" (expected one of: lambertian, metal, dielectric)"]
        );
    }

    #[test]
    fn lambertian_is_accepted() {
        let (material, errors) = check(&MaterialSpec {
            kind: "lambertian".into(),
            albedo: Some(vec![0.8, 0.1, 0.1]),
            ..Default::default()
        });
        assert!(errors.is_empty());
        assert_eq!(material.unwrap().kind(), MaterialKind::Lambertian);
    }
}
