/*!
Ownership and orchestration of a set of controllers.

The manager hands out stable ids, gathers the other controllers' volumes
before each move (so controllers collide with each other without the scene
knowing about them) and advances the exposed positions once per tick.
*/

use crate::controller::{Controller, ControllerHitReport, KinematicActor};
use crate::params::{CollisionFlags, ControllerDesc, DescError, InteractionMode};
use crate::scene::{FilterData, QueryFilter, QueryFilterCallback, SceneQuery};
use crate::settings::DEFAULT_MIN_DIST;
use crate::sweep_test::{Siblings, SweepStats};
use crate::touched::ControllerId;
use crate::types::Vec3;

/// Parameters for one controller move.
#[derive(Clone, Copy, Debug)]
pub struct MoveRequest {
    /// Displacement for this move (meters). Motion, not a velocity.
    pub displacement: Vec3,
    /// Displacements shorter than this are not swept.
    pub min_dist: f32,
    /// Up-axis filter sharpness in (0, 1]; 1 disables smoothing, negative
    /// values resolve the move and then discard it (probe).
    pub sharpness: f32,
    /// Group mask matched against other controllers' group bits when the
    /// mover's interaction mode is `UseFilter`.
    pub active_groups: u32,
    /// Filter data forwarded to the scene query.
    pub filter_data: Option<FilterData>,
}

impl MoveRequest {
    pub fn new(displacement: Vec3) -> Self {
        Self {
            displacement,
            min_dist: DEFAULT_MIN_DIST,
            sharpness: 1.0,
            active_groups: u32::MAX,
            filter_data: None,
        }
    }
}

/// Owns controllers and drives their moves.
#[derive(Default)]
pub struct ControllerManager {
    controllers: Vec<Controller>,
    next_id: u32,
}

impl ControllerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_controller(
        &mut self,
        desc: &ControllerDesc,
        actor: Option<Box<dyn KinematicActor>>,
    ) -> Result<ControllerId, DescError> {
        let id = ControllerId(self.next_id);
        let controller = Controller::new(id, desc, actor)?;
        self.next_id += 1;
        self.controllers.push(controller);
        Ok(id)
    }

    /// Release one controller. Order is not preserved; ids stay stable.
    pub fn release_controller(&mut self, id: ControllerId) -> bool {
        let Some(pos) = self.controllers.iter().position(|c| c.id() == id) else {
            return false;
        };
        self.controllers.swap_remove(pos);
        log::debug!("controller {:?} released", id);
        true
    }

    pub fn purge_controllers(&mut self) {
        self.controllers.clear();
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    pub fn get(&self, id: ControllerId) -> Option<&Controller> {
        self.controllers.iter().find(|c| c.id() == id)
    }

    pub fn get_mut(&mut self, id: ControllerId) -> Option<&mut Controller> {
        self.controllers.iter_mut().find(|c| c.id() == id)
    }

    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    /// Publish every controller's filtered position as its exposed
    /// position. Call once per tick, after all moves.
    pub fn update_controllers(&mut self) {
        for c in &mut self.controllers {
            let filtered = c.filtered_position();
            c.set_exposed_position(filtered);
        }
    }

    /// The scene's static set changed: drop every cached region.
    pub fn report_scene_changed(&mut self) {
        for c in &mut self.controllers {
            c.report_scene_changed();
        }
    }

    /// Move one controller through `scene`, colliding against the scene
    /// and against the other controllers. Returns `None` for unknown ids.
    pub fn move_controller(
        &mut self,
        scene: &dyn SceneQuery,
        id: ControllerId,
        request: &MoveRequest,
        filter_callback: Option<&mut dyn QueryFilterCallback>,
        events: Option<&mut dyn ControllerHitReport>,
    ) -> Option<CollisionFlags> {
        let idx = self.controllers.iter().position(|c| c.id() == id)?;
        let interaction = self.controllers[idx].interaction();

        // Sibling volumes are snapshotted before the mutable borrow of the
        // mover, so a controller never collides against its own volume.
        let mut boxes = Vec::new();
        let mut capsules = Vec::new();
        for other in &self.controllers {
            if other.id() == id {
                continue;
            }
            let include = match interaction {
                InteractionMode::Include => true,
                InteractionMode::Exclude => false,
                InteractionMode::UseFilter => {
                    request.active_groups & (1 << other.group_word()) != 0
                }
            };
            if !include {
                continue;
            }
            match other.world_capsule() {
                Some(capsule) => capsules.push((capsule, other.id())),
                None => boxes.push((other.world_bounds(), other.id())),
            }
        }

        let siblings = Siblings {
            boxes: &boxes,
            capsules: &capsules,
        };
        // Reborrow the caller's trait objects so their lifetimes can shrink
        // to the sibling buffers' scope.
        let filter = QueryFilter {
            data: request.filter_data,
            callback: filter_callback.map(|c| c as &mut dyn QueryFilterCallback),
        };
        Some(self.controllers[idx].move_internal(
            scene,
            siblings,
            request.displacement,
            request.min_dist,
            request.sharpness,
            filter,
            events.map(|e| e as &mut dyn ControllerHitReport),
        ))
    }

    /// Aggregate sweep counters across all controllers.
    pub fn stats(&self) -> SweepStats {
        let mut total = SweepStats::default();
        for c in &self.controllers {
            let s = c.stats();
            total.nb_iterations += s.nb_iterations;
            total.nb_full_updates += s.nb_full_updates;
            total.nb_partial_updates += s.nb_partial_updates;
        }
        total
    }

    pub fn reset_stats(&mut self) {
        for c in &mut self.controllers {
            c.reset_stats();
        }
    }

    /// Log per-controller counters at debug level.
    pub fn log_stats(&self) {
        for c in &self.controllers {
            log::debug!("controller {:?} stats: {:?}", c.id(), c.stats());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllersHit;
    use crate::params::ControllerShapeDesc;
    use crate::touched::ShapeId;
    use crate::types::ExtendedVec3;
    use crate::world::CollisionScene;

    struct AllowAll;

    impl QueryFilterCallback for AllowAll {
        fn pre_filter(&mut self, _data: Option<&FilterData>, _shape: ShapeId) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct ControllerHits(Vec<ControllerId>);

    impl ControllerHitReport for ControllerHits {
        fn on_shape_hit(&mut self, _hit: &crate::controller::ShapeHit) {}
        fn on_controller_hit(&mut self, hit: &ControllersHit) {
            self.0.push(hit.other);
        }
    }

    fn box_desc(position: ExtendedVec3) -> ControllerDesc {
        ControllerDesc::new(
            position,
            ControllerShapeDesc::Box {
                half_extents: Vec3::new(0.5, 1.0, 0.5),
            },
        )
    }

    #[test]
    fn ids_stay_stable_across_release() {
        let mut manager = ControllerManager::new();
        let a = manager
            .create_controller(&box_desc(ExtendedVec3::zeros()), None)
            .unwrap();
        let b = manager
            .create_controller(&box_desc(ExtendedVec3::new(5.0, 0.0, 0.0)), None)
            .unwrap();
        let c = manager
            .create_controller(&box_desc(ExtendedVec3::new(10.0, 0.0, 0.0)), None)
            .unwrap();
        assert_eq!(manager.len(), 3);
        assert!(manager.release_controller(a));
        assert!(!manager.release_controller(a));
        assert!(manager.get(b).is_some());
        assert!(manager.get(c).is_some());
        assert_eq!(manager.len(), 2);
        assert!((manager.get(c).unwrap().position().x - 10.0).abs() < 1e-9);
    }

    #[test]
    fn controllers_collide_with_each_other() {
        let scene = CollisionScene::new();
        let mut manager = ControllerManager::new();
        let mover = manager
            .create_controller(&box_desc(ExtendedVec3::zeros()), None)
            .unwrap();
        let _wall = manager
            .create_controller(&box_desc(ExtendedVec3::new(3.0, 0.0, 0.0)), None)
            .unwrap();

        let flags = manager
            .move_controller(
                &scene,
                mover,
                &MoveRequest::new(Vec3::new(5.0, 0.0, 0.0)),
                None,
                None,
            )
            .unwrap();
        assert!(flags.contains(CollisionFlags::SIDES));
        let x = manager.get(mover).unwrap().position().x;
        // Faces at 2.5 and 0.5, minus the contact offset.
        assert!((x - 1.9).abs() < 1e-3, "{}", x);
    }

    #[test]
    fn exclude_interaction_ignores_other_controllers() {
        let scene = CollisionScene::new();
        let mut manager = ControllerManager::new();
        let mover = manager
            .create_controller(&box_desc(ExtendedVec3::zeros()), None)
            .unwrap();
        let _wall = manager
            .create_controller(&box_desc(ExtendedVec3::new(3.0, 0.0, 0.0)), None)
            .unwrap();
        manager
            .get_mut(mover)
            .unwrap()
            .set_interaction(InteractionMode::Exclude);

        let flags = manager
            .move_controller(
                &scene,
                mover,
                &MoveRequest::new(Vec3::new(5.0, 0.0, 0.0)),
                None,
                None,
            )
            .unwrap();
        assert!(flags.is_empty());
        let x = manager.get(mover).unwrap().position().x;
        assert!((x - 5.0).abs() < 1e-3, "{}", x);
    }

    #[test]
    fn group_filter_masks_out_unselected_controllers() {
        let scene = CollisionScene::new();
        let mut manager = ControllerManager::new();
        let mover = manager
            .create_controller(&box_desc(ExtendedVec3::zeros()), None)
            .unwrap();
        let mut wall_desc = box_desc(ExtendedVec3::new(3.0, 0.0, 0.0));
        wall_desc.group_word = 5;
        let _wall = manager.create_controller(&wall_desc, None).unwrap();
        manager
            .get_mut(mover)
            .unwrap()
            .set_interaction(InteractionMode::UseFilter);

        let mut request = MoveRequest::new(Vec3::new(5.0, 0.0, 0.0));
        request.active_groups = !(1 << 5);
        let flags = manager
            .move_controller(&scene, mover, &request, None, None)
            .unwrap();
        assert!(flags.is_empty());

        // Same move with the wall's group selected.
        manager
            .get_mut(mover)
            .unwrap()
            .set_position(ExtendedVec3::zeros());
        request.active_groups = 1 << 5;
        let flags = manager
            .move_controller(&scene, mover, &request, None, None)
            .unwrap();
        assert!(flags.contains(CollisionFlags::SIDES));
    }

    #[test]
    fn filter_callback_and_hit_report_flow_through_a_move() {
        let scene = CollisionScene::new();
        let mut manager = ControllerManager::new();
        let mover = manager
            .create_controller(&box_desc(ExtendedVec3::zeros()), None)
            .unwrap();
        let wall = manager
            .create_controller(&box_desc(ExtendedVec3::new(3.0, 0.0, 0.0)), None)
            .unwrap();

        let mut callback = AllowAll;
        let mut hits = ControllerHits::default();
        let flags = manager
            .move_controller(
                &scene,
                mover,
                &MoveRequest::new(Vec3::new(5.0, 0.0, 0.0)),
                Some(&mut callback),
                Some(&mut hits),
            )
            .unwrap();
        assert!(flags.contains(CollisionFlags::SIDES));
        assert_eq!(hits.0, vec![wall]);
    }

    #[test]
    fn exposed_position_lags_until_update() {
        let scene = CollisionScene::new();
        let mut manager = ControllerManager::new();
        let id = manager
            .create_controller(&box_desc(ExtendedVec3::zeros()), None)
            .unwrap();
        manager
            .move_controller(
                &scene,
                id,
                &MoveRequest::new(Vec3::new(1.0, 0.0, 0.0)),
                None,
                None,
            )
            .unwrap();
        let c = manager.get(id).unwrap();
        assert!((c.position().x - 1.0).abs() < 1e-6);
        assert!(c.exposed_position().x.abs() < 1e-9);

        manager.update_controllers();
        let c = manager.get(id).unwrap();
        assert!((c.exposed_position().x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_id_returns_none() {
        let scene = CollisionScene::new();
        let mut manager = ControllerManager::new();
        assert!(manager
            .move_controller(
                &scene,
                ControllerId(42),
                &MoveRequest::new(Vec3::zeros()),
                None,
                None,
            )
            .is_none());
    }
}
