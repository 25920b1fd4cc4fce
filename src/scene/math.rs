//! Small fixed-size vector helpers used by validation, reframing and compile.

pub type Vec3 = [f64; 3];

const EPSILON: f64 = 1e-9;

pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub fn scale(a: Vec3, s: f64) -> Vec3 {
    [a[0] * s, a[1] * s, a[2] * s]
}

pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn length(a: Vec3) -> f64 {
    (a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sqrt()
}

pub fn is_zero(a: Vec3) -> bool {
    length(a) < EPSILON
}

/// Unit vector in the direction of `a`, or `None` for a zero vector.
pub fn normalize(a: Vec3) -> Option<Vec3> {
    let len = length(a);
    if len < EPSILON || !len.is_finite() {
        None
    } else {
        Some(scale(a, 1.0 / len))
    }
}

/// `a` rescaled so its largest component magnitude is 1. None for zero or non-finite vectors.
fn unit_max(a: Vec3) -> Option<Vec3> {
    let m = a.iter().fold(0.0_f64, |m, c| m.max(c.abs()));
    if m == 0.0 || !m.is_finite() {
        return None;
    }
    Some(a.map(|c| c / m))
}

/// Direction-only test, independent of magnitude. A zero vector counts as parallel to anything.
pub fn parallel(a: Vec3, b: Vec3) -> bool {
    match (unit_max(a).and_then(normalize), unit_max(b).and_then(normalize)) {
        (Some(a), Some(b)) => is_zero(cross(a, b)),
        _ => true,
    }
}

pub fn same_point(a: Vec3, b: Vec3) -> bool {
    is_zero(sub(a, b))
}

pub fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// Exactly-three-component slice to a fixed vector.
pub fn to_vec3(values: &[f64]) -> Option<Vec3> {
    match values {
        [x, y, z] => Some([*x, *y, *z]),
        _ => None,
    }
}

/// Render as `[x, y, z]` with shortest float formatting.
pub fn fmt_vec(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v}")).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rejects_zero() {
        assert!(normalize([0.0, 0.0, 0.0]).is_none());
        let n = normalize([0.0, 3.0, 4.0]).unwrap();
        assert!((length(n) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn parallel_detects_scaled_vectors() {
        assert!(parallel([1.0, 0.0, 0.0], [-2.0, 0.0, 0.0]));
        assert!(!parallel([1.0, 0.0, 0.0], [0.0, 1.0, 0.0]));
    }

    #[test]
    fn parallel_ignores_magnitude() {
        assert!(!parallel([1e-5, 0.0, 0.0], [0.0, 1e-5, 0.0]));
        assert!(!parallel([1e200, 0.0, 0.0], [0.0, 0.0, 1e200]));
        assert!(parallel([1e-7, 1e-7, 0.0], [3e-7, 3e-7, 0.0]));
        assert!(parallel([0.0, 0.0, 0.0], [1.0, 0.0, 0.0]));
    }

    #[test]
    fn to_vec3_requires_three_components() {
        assert_eq!(to_vec3(&[1.0, 2.0, 3.0]), Some([1.0, 2.0, 3.0]));
        assert_eq!(to_vec3(&[1.0, 2.0]), None);
        assert_eq!(fmt_vec(&[0.0, 1.5, -2.0]), "[0, 1.5, -2]");
    }
}
