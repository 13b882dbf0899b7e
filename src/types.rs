/*!
Core math aliases and extended-precision world types.

This module intentionally contains no algorithms. It defines the data types
exchanged between:
- the scene gathering layer (touched-geometry records, query bounds)
- the narrow phase (parry3d shape casts)
- the sweep-and-slide resolver
- the controller facade

Conventions:
- Distances are in meters.
- Character positions live in double precision (`ExtendedVec3`) so large
  worlds keep sub-millimeter resolution far from the origin. Everything the
  narrow phase consumes is re-based to a nearby local origin and narrowed to
  f32 (`to_local`), and impact points are offset back (`to_world`).
*/

use nalgebra as na;

/// Common math aliases for clarity and consistency.
pub type Vec3 = na::Vector3<f32>;
pub type Point3 = na::Point3<f32>;
pub type Quat = na::UnitQuaternion<f32>;
pub type Iso = na::Isometry3<f32>;

/// Double-precision world-space vector.
pub type ExtendedVec3 = na::Vector3<f64>;

/// A rigid transform (isometry) in world space.
#[derive(Clone, Copy, Debug)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Transform {
    #[inline]
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            rotation: Quat::identity(),
        }
    }

    /// Convert to nalgebra `Isometry3` for use with parry3d queries.
    #[inline]
    pub fn iso(&self) -> Iso {
        Iso::from_parts(
            na::Translation3::new(self.translation.x, self.translation.y, self.translation.z),
            self.rotation,
        )
    }
}

/// Re-base an extended world position to a local origin, narrowing to f32.
#[inline]
pub fn to_local(world: ExtendedVec3, origin: ExtendedVec3) -> Vec3 {
    Vec3::new(
        (world.x - origin.x) as f32,
        (world.y - origin.y) as f32,
        (world.z - origin.z) as f32,
    )
}

/// Offset a local-space point back into extended world space.
#[inline]
pub fn to_world(local: Vec3, origin: ExtendedVec3) -> ExtendedVec3 {
    ExtendedVec3::new(
        local.x as f64 + origin.x,
        local.y as f64 + origin.y,
        local.z as f64 + origin.z,
    )
}

/// Widen an f32 vector to extended precision.
#[inline]
pub fn widen(v: Vec3) -> ExtendedVec3 {
    ExtendedVec3::new(v.x as f64, v.y as f64, v.z as f64)
}

/// Narrow an extended vector to f32, for local-space deltas only.
#[inline]
pub fn narrow(v: ExtendedVec3) -> Vec3 {
    Vec3::new(v.x as f32, v.y as f32, v.z as f32)
}

/// Axis-aligned bounds in extended (f64) world space.
///
/// An empty bounds has `minimum > maximum` on every axis; `include` of an
/// empty bounds with a point-set bounds yields that bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExtendedBounds {
    pub minimum: ExtendedVec3,
    pub maximum: ExtendedVec3,
}

impl ExtendedBounds {
    /// The canonical empty bounds.
    #[inline]
    pub fn empty() -> Self {
        Self {
            minimum: ExtendedVec3::repeat(f64::MAX),
            maximum: ExtendedVec3::repeat(-f64::MAX),
        }
    }

    #[inline]
    pub fn set_empty(&mut self) {
        *self = Self::empty();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.minimum.x > self.maximum.x
            || self.minimum.y > self.maximum.y
            || self.minimum.z > self.maximum.z
    }

    /// Build from a center and (f32) half-extents.
    #[inline]
    pub fn from_center_extents(center: ExtendedVec3, extents: Vec3) -> Self {
        let e = ExtendedVec3::new(extents.x as f64, extents.y as f64, extents.z as f64);
        Self {
            minimum: center - e,
            maximum: center + e,
        }
    }

    #[inline]
    pub fn center(&self) -> ExtendedVec3 {
        (self.minimum + self.maximum) * 0.5
    }

    #[inline]
    pub fn extents(&self) -> ExtendedVec3 {
        (self.maximum - self.minimum) * 0.5
    }

    /// Grow to include `other`.
    #[inline]
    pub fn include(&mut self, other: &ExtendedBounds) {
        self.minimum = self.minimum.inf(&other.minimum);
        self.maximum = self.maximum.sup(&other.maximum);
    }

    /// True when `self` lies entirely inside `container`.
    #[inline]
    pub fn is_inside(&self, container: &ExtendedBounds) -> bool {
        self.minimum.x >= container.minimum.x
            && self.minimum.y >= container.minimum.y
            && self.minimum.z >= container.minimum.z
            && self.maximum.x <= container.maximum.x
            && self.maximum.y <= container.maximum.y
            && self.maximum.z <= container.maximum.z
    }

    #[inline]
    pub fn intersects(&self, other: &ExtendedBounds) -> bool {
        !(self.maximum.x < other.minimum.x
            || self.minimum.x > other.maximum.x
            || self.maximum.y < other.minimum.y
            || self.minimum.y > other.maximum.y
            || self.maximum.z < other.minimum.z
            || self.minimum.z > other.maximum.z)
    }

    /// Scale about the center by `factor`.
    #[inline]
    pub fn scale(&mut self, factor: f64) {
        let center = self.center();
        let extents = self.extents() * factor;
        self.minimum = center - extents;
        self.maximum = center + extents;
    }
}

/// A capsule in extended world space: a segment plus a radius.
#[derive(Clone, Copy, Debug)]
pub struct ExtendedCapsule {
    pub p0: ExtendedVec3,
    pub p1: ExtendedVec3,
    pub radius: f32,
}

impl ExtendedCapsule {
    /// Conservative world bounds of the capsule.
    pub fn bounds(&self) -> ExtendedBounds {
        let r = self.radius as f64;
        let r = ExtendedVec3::repeat(r);
        ExtendedBounds {
            minimum: self.p0.inf(&self.p1) - r,
            maximum: self.p0.sup(&self.p1) + r,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bounds_include_yields_other() {
        let mut b = ExtendedBounds::empty();
        assert!(b.is_empty());
        let other = ExtendedBounds::from_center_extents(
            ExtendedVec3::new(1.0, 2.0, 3.0),
            Vec3::new(0.5, 0.5, 0.5),
        );
        b.include(&other);
        assert_eq!(b, other);
        assert!(!b.is_empty());
    }

    #[test]
    fn is_inside_strict_containment() {
        let outer = ExtendedBounds::from_center_extents(ExtendedVec3::zeros(), Vec3::repeat(2.0));
        let inner = ExtendedBounds::from_center_extents(ExtendedVec3::zeros(), Vec3::repeat(1.0));
        assert!(inner.is_inside(&outer));
        assert!(!outer.is_inside(&inner));
        // Nothing is inside an empty bounds.
        assert!(!inner.is_inside(&ExtendedBounds::empty()));
    }

    #[test]
    fn scale_preserves_center() {
        let mut b = ExtendedBounds::from_center_extents(
            ExtendedVec3::new(10.0, -4.0, 2.0),
            Vec3::new(1.0, 2.0, 3.0),
        );
        b.scale(1.5);
        let c = b.center();
        assert!((c.x - 10.0).abs() < 1e-9);
        assert!((c.y + 4.0).abs() < 1e-9);
        assert!((b.extents().x - 1.5).abs() < 1e-6);
        assert!((b.extents().z - 4.5).abs() < 1e-6);
    }

    #[test]
    fn rebase_round_trip_far_from_origin() {
        let origin = ExtendedVec3::new(1.0e7, 0.0, -1.0e7);
        let world = ExtendedVec3::new(1.0e7 + 1.25, 3.5, -1.0e7 + 0.75);
        let local = to_local(world, origin);
        assert!((local.x - 1.25).abs() < 1e-5);
        assert!((local.z - 0.75).abs() < 1e-5);
        let back = to_world(local, origin);
        assert!((back.x - world.x).abs() < 1e-4);
    }
}
