//! Field-level checks shared by shape, light, material and camera validation.
//!
//! Each field runs presence, then shape (component count, finiteness), then
//! range. A field stops at its first failure, but the checker keeps going
//! across fields so one call reports every broken rule of an entity.

use crate::error::ValidationErrors;

use super::math::{self, Vec3};

/// Collects prefixed violations for one entity.
pub(crate) struct Checker {
    prefix: String,
    errors: ValidationErrors,
}

impl Checker {
    /// `label` is prepended to every message, e.g. `shape "s1"`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            prefix: label.into(),
            errors: ValidationErrors::new(),
        }
    }

    pub fn fail(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        if self.prefix.is_empty() {
            self.errors.push(message);
        } else {
            self.errors.push(format!("{}: {message}", self.prefix));
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> ValidationErrors {
        self.errors
    }

    // ── Vectors ─────────────────────────────────────────────────

    /// A required 3-vector of finite numbers.
    pub fn vector(&mut self, name: &str, value: Option<&[f64]>) -> Option<Vec3> {
        match value {
            None => {
                self.fail(format!("{name} is required"));
                None
            }
            Some(v) => self.shaped_vector(name, v),
        }
    }

    /// An optional 3-vector; absence is fine, a malformed value is not.
    pub fn opt_vector(&mut self, name: &str, value: Option<&[f64]>) -> Option<Vec3> {
        value.and_then(|v| self.shaped_vector(name, v))
    }

    fn shaped_vector(&mut self, name: &str, value: &[f64]) -> Option<Vec3> {
        let Some(v) = math::to_vec3(value) else {
            self.fail(format!(
                "{name} must have exactly 3 components (got {})",
                value.len()
            ));
            return None;
        };
        if !math::all_finite(&v) {
            self.fail(format!("{name} must contain only finite numbers"));
            return None;
        }
        Some(v)
    }

    /// A required direction-like vector that must not be zero length.
    pub fn nonzero_vector(&mut self, name: &str, value: Option<&[f64]>) -> Option<Vec3> {
        let v = self.vector(name, value)?;
        self.require_nonzero(name, v)
    }

    pub fn opt_nonzero_vector(&mut self, name: &str, value: Option<&[f64]>) -> Option<Vec3> {
        let v = self.opt_vector(name, value)?;
        self.require_nonzero(name, v)
    }

    fn require_nonzero(&mut self, name: &str, v: Vec3) -> Option<Vec3> {
        if math::is_zero(v) {
            self.fail(format!("{name} must be a non-zero vector"));
            None
        } else {
            Some(v)
        }
    }

    /// Albedo-style color: every component in [0, 1].
    pub fn unit_color(&mut self, name: &str, value: Option<&[f64]>) -> Option<Vec3> {
        let v = self.vector(name, value)?;
        if v.iter().any(|c| !(0.0..=1.0).contains(c)) {
            self.fail(format!(
                "{name} components must be between 0 and 1 (got {})",
                math::fmt_vec(&v)
            ));
            return None;
        }
        Some(v)
    }

    /// Emission-style color: every component >= 0, no upper bound.
    pub fn radiance(&mut self, name: &str, value: Option<&[f64]>) -> Option<Vec3> {
        let v = self.vector(name, value)?;
        if v.iter().any(|c| *c < 0.0) {
            self.fail(format!(
                "{name} components must be >= 0 (got {})",
                math::fmt_vec(&v)
            ));
            return None;
        }
        Some(v)
    }

    /// Box dimensions: every component > 0.
    pub fn positive_vector(&mut self, name: &str, value: Option<&[f64]>) -> Option<Vec3> {
        let v = self.vector(name, value)?;
        if v.iter().any(|c| *c <= 0.0) {
            self.fail(format!(
                "{name} components must all be greater than 0 (got {})",
                math::fmt_vec(&v)
            ));
            return None;
        }
        Some(v)
    }

    // ── Scalars ─────────────────────────────────────────────────

    pub fn scalar(&mut self, name: &str, value: Option<f64>) -> Option<f64> {
        match value {
            None => {
                self.fail(format!("{name} is required"));
                None
            }
            Some(v) if !v.is_finite() => {
                self.fail(format!("{name} must be a finite number"));
                None
            }
            Some(v) => Some(v),
        }
    }

    pub fn positive(&mut self, name: &str, value: Option<f64>) -> Option<f64> {
        let v = self.scalar(name, value)?;
        if v <= 0.0 {
            self.fail(format!("{name} must be greater than 0 (got {v})"));
            return None;
        }
        Some(v)
    }

    pub fn non_negative(&mut self, name: &str, value: Option<f64>) -> Option<f64> {
        let v = self.scalar(name, value)?;
        if v < 0.0 {
            self.fail(format!("{name} must be >= 0 (got {v})"));
            return None;
        }
        Some(v)
    }

    /// Inclusive range check.
    pub fn within(&mut self, name: &str, value: Option<f64>, min: f64, max: f64) -> Option<f64> {
        let v = self.scalar(name, value)?;
        if !(min..=max).contains(&v) {
            self.fail(format!("{name} must be between {min} and {max} (got {v})"));
            return None;
        }
        Some(v)
    }

    /// Angle in degrees, strictly inside (0, 180).
    pub fn angle(&mut self, name: &str, value: Option<f64>) -> Option<f64> {
        let v = self.scalar(name, value)?;
        if v <= 0.0 || v >= 180.0 {
            self.fail(format!(
                "{name} must be between 0 and 180 degrees exclusive (got {v})"
            ));
            return None;
        }
        Some(v)
    }

    pub fn opt_angle(&mut self, name: &str, value: Option<f64>) -> Option<f64> {
        value.and_then(|v| self.angle(name, Some(v)))
    }
}

/// Label for an entity in error messages: by id when it has one, else by batch position.
pub(crate) fn entity_label(kind: &str, id: &str, index: usize) -> String {
    if id.trim().is_empty() {
        format!("{kind} at index {index}")
    } else {
        format!("{kind} \"{id}\"")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn presence_is_checked_before_shape_and_range() {
        let mut c = Checker::new("shape \"s1\"");
        assert!(c.positive("radius", None).is_none());
        assert!(c.vector("center", Some(&[1.0, 2.0])).is_none());
        assert!(c.positive("radius", Some(-1.0)).is_none());
        let errors = c.finish().into_messages();
        assert_eq!(
            errors,
            vec![
                "shape \"s1\": radius is required",
                "shape \"s1\": center must have exactly 3 components (got 2)",
                "shape \"s1\": radius must be greater than 0 (got -1)",
            ]
        );
    }

    #[test]
    fn one_error_per_field() {
        let mut c = Checker::new("");
        // Wrong length short-circuits the finiteness check for the same field.
        assert!(c.vector("u", Some(&[f64::NAN, 1.0])).is_none());
        assert_eq!(c.finish().len(), 1);
    }

    #[test]
    fn colors_and_angles_check_ranges() {
        let mut c = Checker::new("light \"l\"");
        assert!(c.unit_color("albedo", Some(&[0.2, 1.2, 0.0])).is_none());
        assert!(c.radiance("emission", Some(&[4.0, 4.0, 4.0])).is_some());
        assert!(c.angle("cutoff_angle", Some(180.0)).is_none());
        assert!(c.nonzero_vector("normal", Some(&[0.0, 0.0, 0.0])).is_none());
        let errors = c.finish().into_messages();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("between 0 and 1"));
        assert!(errors[1].contains("exclusive"));
        assert!(errors[2].contains("non-zero"));
    }

    #[test]
    fn label_falls_back_to_index() {
        assert_eq!(entity_label("shape", "", 2), "shape at index 2");
        assert_eq!(entity_label("light", "key", 0), "light \"key\"");
    }
}
