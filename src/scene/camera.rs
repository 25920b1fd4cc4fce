use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ValidationErrors;
use crate::lenient;

use super::math::{self, Vec3};
use super::validation::Checker;

/// Pinhole/thin-lens camera. `vfov` is the vertical field of view in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub center: Vec3,
    pub look_at: Vec3,
    pub vfov: f64,
    pub aperture: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            center: [0.0, 0.0, 5.0],
            look_at: [0.0, 0.0, 0.0],
            vfov: 40.0,
            aperture: 0.0,
        }
    }
}

impl Camera {
    /// Move the camera to look at `anchor` from `distance` away, keeping the current viewing direction.
    /// Returns false and leaves the camera alone when the new position would overflow or
    /// collapse onto `anchor`.
    pub fn reframe(&mut self, anchor: Vec3, distance: f64) -> bool {
        let axis = math::normalize(math::sub(self.center, self.look_at)).unwrap_or([0.0, 0.0, 1.0]);
        let center = math::add(anchor, math::scale(axis, distance));
        if !math::all_finite(&center) || math::same_point(center, anchor) {
            return false;
        }
        self.center = center;
        self.look_at = anchor;
        true
    }
}

/// Camera settings as supplied by the model. `center` and `look_at` are
/// required; an omitted `vfov` or `aperture` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CameraSpec {
    /// Camera position [x, y, z].
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub center: Option<Vec<f64>>,
    /// Point the camera looks at [x, y, z]. Must differ from center.
    #[serde(default, deserialize_with = "lenient::opt_vector", skip_serializing_if = "Option::is_none")]
    pub look_at: Option<Vec<f64>>,
    /// Vertical field of view in degrees, strictly between 0 and 180.
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub vfov: Option<f64>,
    /// Lens aperture for depth of field, >= 0. 0 is a pinhole.
    #[serde(default, deserialize_with = "lenient::opt_f64", skip_serializing_if = "Option::is_none")]
    pub aperture: Option<f64>,
}

/// Validate `spec` against `current`, accumulating one error per violated rule.
pub(crate) fn validate_camera(spec: &CameraSpec, current: &Camera) -> Result<Camera, ValidationErrors> {
    let mut c = Checker::new("camera");
    let center = c.vector("center", spec.center.as_deref());
    let look_at = c.vector("look_at", spec.look_at.as_deref());
    if let (Some(a), Some(b)) = (center, look_at) {
        if math::same_point(a, b) {
            c.fail("center and look_at must differ");
        } else if !math::all_finite(&math::sub(a, b)) {
            c.fail("center and look_at are too far apart");
        }
    }
    let vfov = match spec.vfov {
        Some(v) => c.angle("vfov", Some(v)),
        None => Some(current.vfov),
    };
    let aperture = match spec.aperture {
        Some(a) => c.non_negative("aperture", Some(a)),
        None => Some(current.aperture),
    };

    match (center, look_at, vfov, aperture) {
        (Some(center), Some(look_at), Some(vfov), Some(aperture)) if c.is_clean() => Ok(Camera {
            center,
            look_at,
            vfov,
            aperture,
        }),
        _ => Err(c.finish()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn four_violations_give_four_errors() {
        let spec = CameraSpec {
            center: Some(vec![0.0, 0.0]),
            look_at: None,
            vfov: Some(200.0),
            aperture: Some(-1.0),
        };
        let errors = validate_camera(&spec, &Camera::default()).unwrap_err().into_messages();
        assert_eq!(
            errors,
            vec![
                "camera: center must have exactly 3 components (got 2)",
                "camera: look_at is required",
                "camera: vfov must be between 0 and 180 degrees exclusive (got 200)",
                "camera: aperture must be >= 0 (got -1)",
            ]
        );
    }

    #[test]
    fn coincident_center_and_look_at_are_rejected() {
        let spec = CameraSpec {
            center: Some(vec![1.0, 1.0, 1.0]),
            look_at: Some(vec![1.0, 1.0, 1.0]),
            ..Default::default()
        };
        let errors = validate_camera(&spec, &Camera::default()).unwrap_err().into_messages();
        assert_eq!(errors, vec!["camera: center and look_at must differ"]);
    }

    #[test]
    fn omitted_lens_settings_keep_current_values() {
        let current = Camera {
            vfov: 60.0,
            aperture: 0.1,
            ..Camera::default()
        };
        let spec = CameraSpec {
            center: Some(vec![0.0, 1.0, 8.0]),
            look_at: Some(vec![0.0, 0.0, 0.0]),
            ..Default::default()
        };
        let camera = validate_camera(&spec, &current).unwrap();
        assert_eq!(camera.vfov, 60.0);
        assert_eq!(camera.aperture, 0.1);
    }

    #[test]
    fn reframe_keeps_viewing_direction() {
        let mut camera = Camera::default();
        assert!(camera.reframe([2.0, 0.0, 0.0], 8.0));
        assert_eq!(camera.look_at, [2.0, 0.0, 0.0]);
        assert_eq!(camera.center, [2.0, 0.0, 8.0]);
    }

    #[test]
    fn reframe_refuses_unusable_positions() {
        let mut camera = Camera::default();
        assert!(!camera.reframe([0.0, 0.0, 0.0], f64::INFINITY));
        assert!(!camera.reframe([0.0, 0.0, 1e20], 5.0));
        assert_eq!(camera, Camera::default());
    }

    #[test]
    fn overflowing_view_vector_is_rejected() {
        let spec = CameraSpec {
            center: Some(vec![1e308, 0.0, 0.0]),
            look_at: Some(vec![-1e308, 0.0, 0.0]),
            ..Default::default()
        };
        let errors = validate_camera(&spec, &Camera::default()).unwrap_err().into_messages();
        assert_eq!(errors, vec!["camera: center and look_at are too far apart"]);
    }
}
