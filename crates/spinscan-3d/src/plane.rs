use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Smallest normal magnitude accepted for planes and unit vectors.
pub const NORMAL_EPSILON: f64 = 1e-12;

/// Error types for the plane module.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PlaneError {
    /// The normal vector (a, b, c) is zero or not finite.
    #[error("Plane normal must be a non-zero finite vector, got [{0}, {1}, {2}]")]
    ZeroNormal(f64, f64, f64),
}

/// A unit-length 3D direction.
///
/// The invariant `|v| = 1` holds within floating point tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 3]", into = "[f64; 3]")]
pub struct UnitVector([f64; 3]);

impl UnitVector {
    /// Normalize a vector, failing on a zero or non-finite input.
    pub fn new(v: [f64; 3]) -> Result<Self, PlaneError> {
        let n = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        if !n.is_finite() || n < NORMAL_EPSILON {
            return Err(PlaneError::ZeroNormal(v[0], v[1], v[2]));
        }
        Ok(Self([v[0] / n, v[1] / n, v[2] / n]))
    }

    /// The +Z direction, the canonical world "up".
    pub const Z: UnitVector = UnitVector([0.0, 0.0, 1.0]);

    /// The components of the vector.
    #[inline]
    pub fn as_array(&self) -> [f64; 3] {
        self.0
    }

    /// The vector as a glam double precision vector.
    #[inline]
    pub fn as_dvec3(&self) -> DVec3 {
        DVec3::from_array(self.0)
    }

    /// Dot product with another vector.
    #[inline]
    pub fn dot(&self, other: &[f64; 3]) -> f64 {
        self.0[0] * other[0] + self.0[1] * other[1] + self.0[2] * other[2]
    }

    /// The opposite direction.
    #[inline]
    pub fn flipped(&self) -> Self {
        Self([-self.0[0], -self.0[1], -self.0[2]])
    }
}

impl TryFrom<[f64; 3]> for UnitVector {
    type Error = PlaneError;

    fn try_from(v: [f64; 3]) -> Result<Self, Self::Error> {
        Self::new(v)
    }
}

impl From<UnitVector> for [f64; 3] {
    fn from(v: UnitVector) -> Self {
        v.0
    }
}

/// A plane `ax + by + cz + d = 0`.
///
/// The normal `(a, b, c)` is not necessarily unit length but never zero.
/// Serialized as `[a, b, c, d]`, deserialization runs the same checks as [`Plane::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct Plane {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

impl Plane {
    /// Create a plane from its coefficients.
    pub fn new(a: f64, b: f64, c: f64, d: f64) -> Result<Self, PlaneError> {
        let n = (a * a + b * b + c * c).sqrt();
        if !n.is_finite() || n < NORMAL_EPSILON || !d.is_finite() {
            return Err(PlaneError::ZeroNormal(a, b, c));
        }
        Ok(Self { a, b, c, d })
    }

    /// Create a plane from a normal direction and a point lying on it.
    pub fn from_normal_and_point(normal: &[f64; 3], point: &[f64; 3]) -> Result<Self, PlaneError> {
        let d = -(normal[0] * point[0] + normal[1] * point[1] + normal[2] * point[2]);
        Self::new(normal[0], normal[1], normal[2], d)
    }

    /// Fit the plane through three points.
    ///
    /// Returns `None` when the points are collinear or coincident.
    pub fn from_points(p0: &[f64; 3], p1: &[f64; 3], p2: &[f64; 3]) -> Option<Self> {
        let v0 = DVec3::from_array(*p0);
        let n = (DVec3::from_array(*p1) - v0).cross(DVec3::from_array(*p2) - v0);
        let len = n.length();
        if !len.is_finite() || len < NORMAL_EPSILON {
            return None;
        }
        let n = n / len;
        Some(Self {
            a: n.x,
            b: n.y,
            c: n.z,
            d: -n.dot(v0),
        })
    }

    /// Coefficient of x.
    #[inline]
    pub fn a(&self) -> f64 {
        self.a
    }

    /// Coefficient of y.
    #[inline]
    pub fn b(&self) -> f64 {
        self.b
    }

    /// Coefficient of z.
    #[inline]
    pub fn c(&self) -> f64 {
        self.c
    }

    /// Constant term.
    #[inline]
    pub fn d(&self) -> f64 {
        self.d
    }

    /// The coefficients as `[a, b, c, d]`.
    pub fn coefficients(&self) -> [f64; 4] {
        [self.a, self.b, self.c, self.d]
    }

    /// The (possibly non-unit) normal vector.
    pub fn normal(&self) -> [f64; 3] {
        [self.a, self.b, self.c]
    }

    /// The unit normal of the plane.
    pub fn unit_normal(&self) -> Result<UnitVector, PlaneError> {
        UnitVector::new(self.normal())
    }

    /// The same plane with unit normal, `a² + b² + c² = 1`.
    pub fn normalized(&self) -> Self {
        let n = (self.a * self.a + self.b * self.b + self.c * self.c).sqrt();
        Self {
            a: self.a / n,
            b: self.b / n,
            c: self.c / n,
            d: self.d / n,
        }
    }

    /// The same plane with the normal pointing the opposite way.
    pub fn flipped(&self) -> Self {
        Self {
            a: -self.a,
            b: -self.b,
            c: -self.c,
            d: -self.d,
        }
    }

    /// Signed perpendicular distance from a point to the plane.
    #[inline]
    pub fn signed_distance(&self, p: &[f64; 3]) -> f64 {
        let n = (self.a * self.a + self.b * self.b + self.c * self.c).sqrt();
        (self.a * p[0] + self.b * p[1] + self.c * p[2] + self.d) / n
    }

    /// Perpendicular distance from a point to the plane.
    #[inline]
    pub fn distance(&self, p: &[f64; 3]) -> f64 {
        self.signed_distance(p).abs()
    }

    /// Angle in radians between the normals of two planes, ignoring orientation.
    pub fn angle_to(&self, other: &Plane) -> Result<f64, PlaneError> {
        let cos = self.unit_normal()?.dot(&other.unit_normal()?.as_array()).abs();
        Ok(cos.min(1.0).acos())
    }
}

impl TryFrom<[f64; 4]> for Plane {
    type Error = PlaneError;

    fn try_from(v: [f64; 4]) -> Result<Self, Self::Error> {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Plane> for [f64; 4] {
    fn from(plane: Plane) -> Self {
        plane.coefficients()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_unit_vector() -> Result<(), PlaneError> {
        let v = UnitVector::new([0.0, 3.0, 4.0])?;
        assert_relative_eq!(v.as_array()[1], 0.6);
        assert_relative_eq!(v.as_array()[2], 0.8);
        assert_eq!(
            UnitVector::new([0.0, 0.0, 0.0]),
            Err(PlaneError::ZeroNormal(0.0, 0.0, 0.0))
        );
        Ok(())
    }

    #[test]
    fn test_plane_rejects_zero_normal() {
        assert!(Plane::new(0.0, 0.0, 0.0, 1.0).is_err());
        assert!(Plane::new(0.0, 0.0, 1.0, f64::NAN).is_err());
    }

    #[test]
    fn test_plane_from_points() -> Result<(), PlaneError> {
        let plane = Plane::from_points(&[0.0, 0.0, 1.0], &[1.0, 0.0, 1.0], &[0.0, 1.0, 1.0])
            .ok_or(PlaneError::ZeroNormal(0.0, 0.0, 0.0))?;
        assert_relative_eq!(plane.c(), 1.0);
        assert_relative_eq!(plane.d(), -1.0);
        assert_relative_eq!(plane.distance(&[5.0, -3.0, 3.0]), 2.0);

        // collinear points do not define a plane
        assert!(Plane::from_points(&[0.0; 3], &[1.0, 1.0, 1.0], &[2.0, 2.0, 2.0]).is_none());
        Ok(())
    }

    #[test]
    fn test_plane_distance_non_unit() -> Result<(), PlaneError> {
        let plane = Plane::new(0.0, 2.0, 0.0, -4.0)?;
        assert_relative_eq!(plane.signed_distance(&[0.0, 3.0, 0.0]), 1.0);
        assert_relative_eq!(plane.normalized().d(), -2.0);
        assert_relative_eq!(plane.angle_to(&plane.flipped())?, 0.0);
        Ok(())
    }

    #[test]
    fn test_plane_json_checks_normal() -> Result<(), Box<dyn std::error::Error>> {
        let plane = Plane::new(0.0, -1.0, 0.0, 0.2)?;
        let json = serde_json::to_string(&plane)?;
        assert_eq!(json, "[0.0,-1.0,0.0,0.2]");
        assert_eq!(serde_json::from_str::<Plane>(&json)?, plane);

        assert!(serde_json::from_str::<Plane>("[0.0,0.0,0.0,1.0]").is_err());
        assert!(serde_json::from_str::<Plane>(r#"{"a":0,"b":0,"c":0,"d":1}"#).is_err());
        Ok(())
    }
}
