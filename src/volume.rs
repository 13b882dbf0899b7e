/*!
The swept volume: the character shape driven through the world.

A volume is either a box or a capsule. Its center lives in extended
precision; `half_height` is the half-size along the up axis and is what the
passes use to find the bottom point. Capsules are parry `Capsule::new_y`
shapes rotated onto the configured up axis.
*/

use std::f32::consts::FRAC_PI_2;

use nalgebra as na;

use crate::params::{CctParams, UpAxis};
use crate::types::{ExtendedBounds, ExtendedVec3, Quat, Vec3};

/// Discriminant of a swept volume, used by the narrow-phase dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeKind {
    Box,
    Capsule,
}

/// Shape payload of a swept volume, in volume-local terms.
#[derive(Clone, Copy, Debug)]
pub enum VolumeShape {
    Box {
        /// Half-extents in world axes (meters).
        extents: Vec3,
    },
    Capsule {
        radius: f32,
        /// Cylinder section length; total height is `height + 2 * radius`.
        height: f32,
    },
}

/// A character volume being swept through the world.
#[derive(Clone, Copy, Debug)]
pub struct SweptVolume {
    /// Center position in extended world space.
    pub center: ExtendedVec3,
    /// Half-size along the up axis (meters).
    pub half_height: f32,
    pub shape: VolumeShape,
}

impl SweptVolume {
    pub fn new_box(center: ExtendedVec3, extents: Vec3, up: UpAxis) -> Self {
        Self {
            center,
            half_height: extents[up.index()],
            shape: VolumeShape::Box { extents },
        }
    }

    pub fn new_capsule(center: ExtendedVec3, radius: f32, height: f32) -> Self {
        Self {
            center,
            half_height: height * 0.5 + radius,
            shape: VolumeShape::Capsule { radius, height },
        }
    }

    #[inline]
    pub fn kind(&self) -> VolumeKind {
        match self.shape {
            VolumeShape::Box { .. } => VolumeKind::Box,
            VolumeShape::Capsule { .. } => VolumeKind::Capsule,
        }
    }

    /// Conservative axis-aligned half-extents of the volume in world axes.
    pub fn local_extents(&self, up: UpAxis) -> Vec3 {
        match self.shape {
            VolumeShape::Box { extents } => extents,
            VolumeShape::Capsule { radius, height } => {
                let mut e = Vec3::repeat(radius);
                e[up.index()] = height * 0.5 + radius;
                e
            }
        }
    }

    /// Bounds covering the volume over a whole sweep from `center` to
    /// `center + direction`, inflated by the contact offset and extended
    /// down by the max jump height so a full jump arc stays cached.
    pub fn compute_temporal_bounds(
        &self,
        params: &CctParams,
        center: ExtendedVec3,
        direction: Vec3,
    ) -> ExtendedBounds {
        let extents = self.local_extents(params.up_axis) + Vec3::repeat(params.contact_offset);
        let target = center + crate::types::widen(direction);

        let mut bounds = ExtendedBounds::from_center_extents(center, extents);
        bounds.include(&ExtendedBounds::from_center_extents(target, extents));
        bounds.minimum[params.up_axis.index()] -= params.max_jump_height as f64;
        bounds
    }
}

/// Rotation taking the parry capsule axis (+Y) onto the configured up axis.
pub fn up_axis_rotation(up: UpAxis) -> Quat {
    match up {
        UpAxis::X => Quat::from_axis_angle(&na::Vector3::z_axis(), -FRAC_PI_2),
        UpAxis::Y => Quat::identity(),
        UpAxis::Z => Quat::from_axis_angle(&na::Vector3::x_axis(), FRAC_PI_2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(up: UpAxis) -> CctParams {
        CctParams {
            up_axis: up,
            slope_limit: 0.0,
            contact_offset: 0.1,
            step_offset: 0.5,
            invisible_wall_height: 0.0,
            max_jump_height: 0.0,
            handle_slope: false,
        }
    }

    #[test]
    fn capsule_half_height_spans_caps() {
        let v = SweptVolume::new_capsule(ExtendedVec3::zeros(), 0.4, 1.2);
        assert!((v.half_height - 1.0).abs() < 1e-6);
        let e = v.local_extents(UpAxis::Y);
        assert!((e.x - 0.4).abs() < 1e-6);
        assert!((e.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn temporal_bounds_cover_start_and_target() {
        let v = SweptVolume::new_box(ExtendedVec3::zeros(), Vec3::new(0.5, 1.0, 0.5), UpAxis::Y);
        let p = params(UpAxis::Y);
        let b = v.compute_temporal_bounds(&p, v.center, Vec3::new(2.0, 0.0, 0.0));
        // Start side: -0.5 - 0.1 offset. Target side: 2 + 0.5 + 0.1.
        assert!((b.minimum.x + 0.6).abs() < 1e-6);
        assert!((b.maximum.x - 2.6).abs() < 1e-6);
        assert!((b.minimum.y + 1.1).abs() < 1e-6);
    }

    #[test]
    fn temporal_bounds_extend_down_by_jump_height() {
        let v = SweptVolume::new_box(ExtendedVec3::zeros(), Vec3::repeat(0.5), UpAxis::Z);
        let mut p = params(UpAxis::Z);
        p.max_jump_height = 2.0;
        let b = v.compute_temporal_bounds(&p, v.center, Vec3::zeros());
        assert!((b.minimum.z + 2.6).abs() < 1e-6);
        assert!((b.maximum.z - 0.6).abs() < 1e-6);
    }

    #[test]
    fn up_rotation_maps_y_onto_up() {
        for (up, expect) in [
            (UpAxis::X, Vec3::new(1.0, 0.0, 0.0)),
            (UpAxis::Y, Vec3::new(0.0, 1.0, 0.0)),
            (UpAxis::Z, Vec3::new(0.0, 0.0, 1.0)),
        ] {
            let rotated = up_axis_rotation(up) * Vec3::new(0.0, 1.0, 0.0);
            assert!((rotated - expect).norm() < 1e-6, "up {:?}", up);
        }
    }
}
