/*!
User-facing controller parameters, descriptors, and result flags.

Everything here is plain data validated once at creation time; the sweep
core trusts it afterwards.
*/

use thiserror::Error;

use crate::settings::{DEFAULT_CONTACT_OFFSET, DEFAULT_STEP_OFFSET};
use crate::types::{ExtendedVec3, Vec3};

/// World up axis for a controller. All controllers moved together should
/// share the same up axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpAxis {
    X,
    Y,
    Z,
}

impl UpAxis {
    /// Component index of the up axis (0, 1 or 2).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            UpAxis::X => 0,
            UpAxis::Y => 1,
            UpAxis::Z => 2,
        }
    }
}

/// Per-controller tuning shared by the whole sweep pipeline.
#[derive(Clone, Copy, Debug)]
pub struct CctParams {
    pub up_axis: UpAxis,
    /// Cosine of the steepest walkable slope angle. 0 disables slope
    /// handling entirely.
    pub slope_limit: f32,
    /// Skin distance kept between the volume and touched shapes (meters).
    pub contact_offset: f32,
    /// Maximum ledge height automatically climbed by the up/down passes.
    pub step_offset: f32,
    /// Height of the walls extruded over non-walkable triangles during
    /// gathering. 0 disables invisible walls.
    pub invisible_wall_height: f32,
    /// Maximum height of a jump, used to extend cached bounds downward so a
    /// full jump arc stays inside the cache.
    pub max_jump_height: f32,
    /// True to reject non-walkable slopes; derived from `slope_limit`.
    pub handle_slope: bool,
}

impl CctParams {
    /// Slope test against a unit surface normal. A surface is walkable when
    /// the up component of its normal reaches the slope-limit cosine.
    #[inline]
    pub fn is_walkable(&self, unit_normal: Vec3) -> bool {
        !self.handle_slope || unit_normal[self.up_axis.index()] >= self.slope_limit
    }
}

/// How a moving controller interacts with other controllers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InteractionMode {
    /// Collide with every other controller.
    Include,
    /// Ignore all other controllers.
    Exclude,
    /// Collide only with controllers whose group bit is in the move's
    /// active-group mask.
    UseFilter,
}

/// Capsule landing behavior on ledges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClimbingMode {
    /// The capsule may climb any ledge its step offset reaches.
    Easy,
    /// Landing above `bottom + step_offset` aborts the move and triggers
    /// the recovery pass.
    Constrained,
}

/// Which sides of the volume collided during a move.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollisionFlags(u8);

impl CollisionFlags {
    pub const SIDES: CollisionFlags = CollisionFlags(1 << 0);
    pub const UP: CollisionFlags = CollisionFlags(1 << 1);
    pub const DOWN: CollisionFlags = CollisionFlags(1 << 2);

    #[inline]
    pub fn empty() -> Self {
        CollisionFlags(0)
    }

    #[inline]
    pub fn insert(&mut self, other: CollisionFlags) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn contains(self, other: CollisionFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }
}

/// Shape of a controller being created.
#[derive(Clone, Copy, Debug)]
pub enum ControllerShapeDesc {
    Box {
        /// Half-extents of the volume (meters).
        half_extents: Vec3,
    },
    Capsule {
        radius: f32,
        /// Length of the cylindrical section; total capsule height is
        /// `height + 2 * radius`.
        height: f32,
        climbing_mode: ClimbingMode,
    },
}

/// Descriptor for creating a controller.
#[derive(Clone, Copy, Debug)]
pub struct ControllerDesc {
    /// Initial center position in extended world space.
    pub position: ExtendedVec3,
    pub up_axis: UpAxis,
    /// Cosine of the steepest walkable slope; 0 disables slope handling.
    pub slope_limit: f32,
    pub contact_offset: f32,
    pub step_offset: f32,
    pub invisible_wall_height: f32,
    pub max_jump_height: f32,
    pub interaction: InteractionMode,
    /// Group bit index (0..32) tested against active-group masks when the
    /// interaction mode is `UseFilter`.
    pub group_word: u32,
    pub shape: ControllerShapeDesc,
}

impl ControllerDesc {
    /// A descriptor with conservative defaults for the given shape.
    pub fn new(position: ExtendedVec3, shape: ControllerShapeDesc) -> Self {
        Self {
            position,
            up_axis: UpAxis::Y,
            slope_limit: 0.0,
            contact_offset: DEFAULT_CONTACT_OFFSET,
            step_offset: DEFAULT_STEP_OFFSET,
            invisible_wall_height: 0.0,
            max_jump_height: 0.0,
            interaction: InteractionMode::Include,
            group_word: 0,
            shape,
        }
    }

    pub fn validate(&self) -> Result<(), DescError> {
        if !(self.contact_offset > 0.0) {
            return Err(DescError::ContactOffset(self.contact_offset));
        }
        if self.step_offset < 0.0 {
            return Err(DescError::StepOffset(self.step_offset));
        }
        if !(0.0..1.0).contains(&self.slope_limit) {
            return Err(DescError::SlopeLimit(self.slope_limit));
        }
        if self.invisible_wall_height < 0.0 || self.max_jump_height < 0.0 {
            return Err(DescError::NegativeHeight);
        }
        if self.group_word >= 32 {
            return Err(DescError::GroupWord(self.group_word));
        }
        match self.shape {
            ControllerShapeDesc::Box { half_extents } => {
                if !(half_extents.x > 0.0 && half_extents.y > 0.0 && half_extents.z > 0.0) {
                    return Err(DescError::BoxExtents);
                }
            }
            ControllerShapeDesc::Capsule { radius, height, .. } => {
                if !(radius > 0.0) || !(height > 0.0) {
                    return Err(DescError::CapsuleSize);
                }
            }
        }
        Ok(())
    }
}

/// Validation failures for controller descriptors and setters.
#[derive(Debug, Error, PartialEq)]
pub enum DescError {
    #[error("contact offset must be positive, got {0}")]
    ContactOffset(f32),
    #[error("step offset must be non-negative, got {0}")]
    StepOffset(f32),
    #[error("slope limit must be a cosine in [0, 1), got {0}")]
    SlopeLimit(f32),
    #[error("wall/jump heights must be non-negative")]
    NegativeHeight,
    #[error("group word must be a bit index below 32, got {0}")]
    GroupWord(u32),
    #[error("box half-extents must be positive on every axis")]
    BoxExtents,
    #[error("capsule radius and height must be positive")]
    CapsuleSize,
}
