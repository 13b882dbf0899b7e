/*!
The controller facade: one character, its shape, and its three positions.

A controller tracks a raw position (where the sweep core left it), a
filtered position (raw position smoothed along the up axis by an
exponential feedback filter, so stepping up stairs renders smoothly) and an
exposed position (the filtered position frozen until the manager's
`update_controllers`, so all observers inside one tick read the same
value).

The backing physics body, when there is one, sits behind the
[`KinematicActor`] trait and is teleported after each move. Its proxy shape
is slightly smaller than the controller volume so the contact offset stays
the sweep core's business.
*/

use crate::params::{
    CctParams, ClimbingMode, CollisionFlags, ControllerDesc, ControllerShapeDesc, DescError,
    InteractionMode, UpAxis,
};
use crate::scene::{QueryFilter, SceneQuery};
use crate::settings::PROXY_SCALE;
use crate::sweep_test::{MoveContext, Siblings, SlopeMode, SweepStats, SweepTest};
use crate::touched::{ControllerId, ShapeId};
use crate::types::{ExtendedBounds, ExtendedCapsule, ExtendedVec3, Vec3};
use crate::volume::SweptVolume;

/// A contact between a moving controller and a scene shape.
#[derive(Clone, Copy, Debug)]
pub struct ShapeHit {
    pub controller: ControllerId,
    pub shape: ShapeId,
    pub world_pos: ExtendedVec3,
    pub world_normal: Vec3,
    /// Unit sweep direction at the time of the hit.
    pub dir: Vec3,
    /// Sweep distance to the contact (meters).
    pub length: f32,
    /// Source triangle for mesh and heightfield hits.
    pub triangle_index: Option<u32>,
}

/// A contact between two controllers.
#[derive(Clone, Copy, Debug)]
pub struct ControllersHit {
    pub controller: ControllerId,
    pub other: ControllerId,
}

/// User callbacks fired as contacts are resolved, in resolution order.
/// Suppressed during the auto-step up pass.
pub trait ControllerHitReport {
    fn on_shape_hit(&mut self, hit: &ShapeHit);
    fn on_controller_hit(&mut self, hit: &ControllersHit);
}

/// Shape handed to the backing kinematic body, already scaled by the proxy
/// margin.
#[derive(Clone, Copy, Debug)]
pub enum ProxyShape {
    Box { half_extents: Vec3 },
    Capsule { radius: f32, half_height: f32 },
}

/// The backing kinematic body of a controller. Both calls are teleports;
/// the sweep core has already resolved collisions.
pub trait KinematicActor {
    fn move_kinematic(&mut self, position: ExtendedVec3);
    fn set_shape(&mut self, shape: &ProxyShape);
}

/// Current shape of a controller.
#[derive(Clone, Copy, Debug)]
pub enum ControllerShape {
    Box {
        half_extents: Vec3,
    },
    Capsule {
        radius: f32,
        height: f32,
        climbing_mode: ClimbingMode,
    },
}

/// One kinematic character controller.
pub struct Controller {
    id: ControllerId,
    shape: ControllerShape,
    interaction: InteractionMode,
    group_word: u32,
    cct_module: SweepTest,

    position: ExtendedVec3,
    filtered_position: ExtendedVec3,
    exposed_position: ExtendedVec3,
    /// Feedback filter state for the up axis.
    memory: f64,

    actor: Option<Box<dyn KinematicActor>>,
}

impl Controller {
    pub(crate) fn new(
        id: ControllerId,
        desc: &ControllerDesc,
        mut actor: Option<Box<dyn KinematicActor>>,
    ) -> Result<Self, DescError> {
        desc.validate()?;

        let shape = match desc.shape {
            ControllerShapeDesc::Box { half_extents } => ControllerShape::Box { half_extents },
            ControllerShapeDesc::Capsule {
                radius,
                height,
                climbing_mode,
            } => ControllerShape::Capsule {
                radius,
                height,
                climbing_mode,
            },
        };
        let params = CctParams {
            up_axis: desc.up_axis,
            slope_limit: desc.slope_limit,
            contact_offset: desc.contact_offset,
            step_offset: desc.step_offset,
            invisible_wall_height: desc.invisible_wall_height,
            max_jump_height: desc.max_jump_height,
            handle_slope: desc.slope_limit != 0.0,
        };

        if let Some(actor) = actor.as_deref_mut() {
            actor.set_shape(&proxy_shape(&shape));
            actor.move_kinematic(desc.position);
        }
        log::debug!("controller {:?} created at {:?}", id, desc.position);

        Ok(Self {
            id,
            shape,
            interaction: desc.interaction,
            group_word: desc.group_word,
            cct_module: SweepTest::new(params),
            position: desc.position,
            filtered_position: desc.position,
            exposed_position: desc.position,
            memory: desc.position[desc.up_axis.index()],
            actor,
        })
    }

    #[inline]
    pub fn id(&self) -> ControllerId {
        self.id
    }

    #[inline]
    pub fn shape(&self) -> ControllerShape {
        self.shape
    }

    #[inline]
    pub fn up_axis(&self) -> UpAxis {
        self.cct_module.user_params.up_axis
    }

    /// Raw position: where the last move left the volume center.
    #[inline]
    pub fn position(&self) -> ExtendedVec3 {
        self.position
    }

    /// Raw position smoothed along the up axis.
    #[inline]
    pub fn filtered_position(&self) -> ExtendedVec3 {
        self.filtered_position
    }

    /// Filtered position as of the last `update_controllers`.
    #[inline]
    pub fn exposed_position(&self) -> ExtendedVec3 {
        self.exposed_position
    }

    #[inline]
    pub fn interaction(&self) -> InteractionMode {
        self.interaction
    }

    pub fn set_interaction(&mut self, interaction: InteractionMode) {
        self.interaction = interaction;
    }

    #[inline]
    pub fn group_word(&self) -> u32 {
        self.group_word
    }

    pub fn stats(&self) -> SweepStats {
        self.cct_module.stats()
    }

    pub fn reset_stats(&mut self) {
        self.cct_module.reset_stats();
    }

    /// Teleport, resetting all three positions and the filter memory.
    pub fn set_position(&mut self, position: ExtendedVec3) {
        self.position = position;
        self.filtered_position = position;
        self.exposed_position = position;
        self.memory = position[self.up_axis().index()];
        if let Some(actor) = self.actor.as_deref_mut() {
            actor.move_kinematic(position);
        }
    }

    /// The scene's static set changed: cached geometry may be stale.
    pub fn report_scene_changed(&mut self) {
        self.cct_module.void_test_cache();
    }

    pub fn climbing_mode(&self) -> Option<ClimbingMode> {
        match self.shape {
            ControllerShape::Capsule { climbing_mode, .. } => Some(climbing_mode),
            ControllerShape::Box { .. } => None,
        }
    }

    /// Set the climbing mode; fails on box controllers.
    pub fn set_climbing_mode(&mut self, mode: ClimbingMode) -> bool {
        match &mut self.shape {
            ControllerShape::Capsule { climbing_mode, .. } => {
                *climbing_mode = mode;
                true
            }
            ControllerShape::Box { .. } => false,
        }
    }

    /// Resize a box controller, keeping its bottom point fixed.
    pub fn set_extents(&mut self, half_extents: Vec3) -> Result<(), DescError> {
        if !(half_extents.x > 0.0 && half_extents.y > 0.0 && half_extents.z > 0.0) {
            return Err(DescError::BoxExtents);
        }
        let up = self.up_axis().index();
        match &mut self.shape {
            ControllerShape::Box {
                half_extents: current,
            } => {
                let old_proxy_half = current[up] * PROXY_SCALE;
                *current = half_extents;
                let new_proxy_half = half_extents[up] * PROXY_SCALE;
                let mut pos = self.position;
                pos[up] += ((new_proxy_half - old_proxy_half) / PROXY_SCALE) as f64;
                self.sync_proxy();
                self.set_position(pos);
                Ok(())
            }
            ControllerShape::Capsule { .. } => Err(DescError::BoxExtents),
        }
    }

    /// Change a capsule controller's radius.
    pub fn set_radius(&mut self, radius: f32) -> Result<(), DescError> {
        if !(radius > 0.0) {
            return Err(DescError::CapsuleSize);
        }
        match &mut self.shape {
            ControllerShape::Capsule { radius: current, .. } => {
                *current = radius;
                self.sync_proxy();
                Ok(())
            }
            ControllerShape::Box { .. } => Err(DescError::CapsuleSize),
        }
    }

    /// Change a capsule controller's cylinder height, keeping its bottom
    /// point fixed.
    pub fn set_height(&mut self, height: f32) -> Result<(), DescError> {
        if !(height > 0.0) {
            return Err(DescError::CapsuleSize);
        }
        let up = self.up_axis().index();
        match &mut self.shape {
            ControllerShape::Capsule {
                height: current, ..
            } => {
                let old_proxy_half = 0.5 * *current * PROXY_SCALE;
                *current = height;
                let new_proxy_half = 0.5 * height * PROXY_SCALE;
                let mut pos = self.position;
                pos[up] += ((new_proxy_half - old_proxy_half) / PROXY_SCALE) as f64;
                self.sync_proxy();
                self.set_position(pos);
                Ok(())
            }
            ControllerShape::Box { .. } => Err(DescError::CapsuleSize),
        }
    }

    /// Conservative world bounds of the controller volume.
    pub fn world_bounds(&self) -> ExtendedBounds {
        let up = self.up_axis().index();
        let extents = match self.shape {
            ControllerShape::Box { half_extents } => half_extents,
            ControllerShape::Capsule { radius, height, .. } => {
                let mut e = Vec3::repeat(radius);
                e[up] = radius + height * 0.5;
                e
            }
        };
        ExtendedBounds::from_center_extents(self.position, extents)
    }

    /// The capsule segment in world space, for capsule controllers.
    pub fn world_capsule(&self) -> Option<ExtendedCapsule> {
        match self.shape {
            ControllerShape::Capsule { radius, height, .. } => {
                let up = self.up_axis().index();
                let mut half = ExtendedVec3::zeros();
                half[up] = height as f64 * 0.5;
                Some(ExtendedCapsule {
                    p0: self.position - half,
                    p1: self.position + half,
                    radius,
                })
            }
            ControllerShape::Box { .. } => None,
        }
    }

    fn swept_volume(&self) -> SweptVolume {
        let up = self.up_axis();
        match self.shape {
            ControllerShape::Box { half_extents } => {
                SweptVolume::new_box(self.position, half_extents, up)
            }
            ControllerShape::Capsule { radius, height, .. } => {
                SweptVolume::new_capsule(self.position, radius, height)
            }
        }
    }

    fn sync_proxy(&mut self) {
        let proxy = proxy_shape(&self.shape);
        if let Some(actor) = self.actor.as_deref_mut() {
            actor.set_shape(&proxy);
        }
    }

    pub(crate) fn set_exposed_position(&mut self, position: ExtendedVec3) {
        self.exposed_position = position;
    }

    /// Resolve one move. Called by the manager with the sibling volumes
    /// already gathered. One lifetime ties the scene, siblings, filter and
    /// callbacks together so they can share a `MoveContext`.
    pub(crate) fn move_internal<'a>(
        &mut self,
        scene: &'a dyn SceneQuery,
        siblings: Siblings<'a>,
        displacement: Vec3,
        min_dist: f32,
        sharpness: f32,
        filter: QueryFilter<'a>,
        events: Option<&'a mut dyn ControllerHitReport>,
    ) -> CollisionFlags {
        let up = self.up_axis().index();
        let backup = self.position;
        let constrained = matches!(
            self.shape,
            ControllerShape::Capsule {
                climbing_mode: ClimbingMode::Constrained,
                ..
            }
        );

        let mut ctx = MoveContext {
            scene,
            siblings,
            filter,
            events,
            controller: self.id,
        };
        let mut volume = self.swept_volume();
        self.cct_module.first_update = true;

        let mut flags = self.cct_module.move_character(
            &mut ctx,
            &mut volume,
            displacement,
            min_dist,
            constrained,
            SlopeMode::Normal,
        );
        if self.cct_module.hit_non_walkable {
            // Retry from the start with up motion banned so the volume is
            // pushed off the slope instead of up it.
            volume.center = backup;
            flags = self.cct_module.move_character(
                &mut ctx,
                &mut volume,
                displacement,
                min_dist,
                constrained,
                SlopeMode::Recovery,
            );
        }

        if sharpness < 0.0 {
            // Probe move: resolve, then discard.
            volume.center = backup;
        }
        self.position = volume.center;

        if (self.position - backup).norm_squared() != 0.0 {
            if let Some(actor) = self.actor.as_deref_mut() {
                actor.move_kinematic(self.position);
            }
        }

        self.filtered_position = self.position;
        let sharpness = sharpness.abs();
        if sharpness < 1.0 {
            self.filtered_position[up] =
                feedback_filter(self.position[up], &mut self.memory, sharpness as f64);
        }

        flags
    }
}

fn proxy_shape(shape: &ControllerShape) -> ProxyShape {
    match *shape {
        ControllerShape::Box { half_extents } => ProxyShape::Box {
            half_extents: half_extents * PROXY_SCALE,
        },
        ControllerShape::Capsule { radius, height, .. } => ProxyShape::Capsule {
            radius: radius * PROXY_SCALE,
            half_height: 0.5 * height * PROXY_SCALE,
        },
    }
}

/// Exponential filter along the up axis:
/// `memory = value * sharpness + memory * (1 - sharpness)`.
fn feedback_filter(value: f64, memory: &mut f64, sharpness: f64) -> f64 {
    let sharpness = sharpness.clamp(0.0, 1.0);
    *memory = value * sharpness + *memory * (1.0 - sharpness);
    *memory
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ControllerShapeDesc;

    fn capsule_desc() -> ControllerDesc {
        ControllerDesc::new(
            ExtendedVec3::new(0.0, 2.0, 0.0),
            ControllerShapeDesc::Capsule {
                radius: 0.4,
                height: 1.2,
                climbing_mode: ClimbingMode::Easy,
            },
        )
    }

    #[test]
    fn feedback_filter_converges_to_value() {
        let mut memory = 0.0;
        let mut last = 0.0;
        for _ in 0..200 {
            last = feedback_filter(10.0, &mut memory, 0.2);
        }
        assert!((last - 10.0).abs() < 1e-3);
    }

    #[test]
    fn feedback_filter_full_sharpness_is_identity() {
        let mut memory = 3.0;
        assert!((feedback_filter(7.0, &mut memory, 1.0) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn set_height_keeps_bottom_point_fixed() {
        let mut controller =
            Controller::new(ControllerId(0), &capsule_desc(), None).unwrap();
        let bottom_before = {
            let b = controller.world_bounds();
            b.minimum.y
        };
        controller.set_height(2.0).unwrap();
        let bottom_after = controller.world_bounds().minimum.y;
        assert!(
            (bottom_before - bottom_after).abs() < 1e-6,
            "{} vs {}",
            bottom_before,
            bottom_after
        );
    }

    #[test]
    fn set_extents_rejected_on_capsules() {
        let mut controller =
            Controller::new(ControllerId(0), &capsule_desc(), None).unwrap();
        assert!(controller.set_extents(Vec3::repeat(1.0)).is_err());
        assert!(controller.set_radius(0.5).is_ok());
    }

    #[test]
    fn teleport_resets_all_positions() {
        let mut controller =
            Controller::new(ControllerId(0), &capsule_desc(), None).unwrap();
        let target = ExtendedVec3::new(5.0, 1.0, -3.0);
        controller.set_position(target);
        assert_eq!(controller.position(), target);
        assert_eq!(controller.filtered_position(), target);
        assert_eq!(controller.exposed_position(), target);
    }

    #[test]
    fn world_capsule_spans_cylinder_section() {
        let controller = Controller::new(ControllerId(0), &capsule_desc(), None).unwrap();
        let capsule = controller.world_capsule().unwrap();
        // The endpoints inherit f32 rounding from the descriptor's height.
        assert!((capsule.p0.y - 1.4).abs() < 1e-6);
        assert!((capsule.p1.y - 2.6).abs() < 1e-6);
        assert!((capsule.radius - 0.4).abs() < 1e-9);
    }
}
