/*!
Kinematic character controllers: swept volumes moved through a collision
scene with iterative sweep-and-slide resolution, auto-stepping and slope
handling.

The crate splits into three layers:
- scene gathering ([`world`], [`scene`], [`touched`]): collect the geometry
  a move may touch into a cached, re-based record stream
- the sweep core ([`sweep_test`], [`volume`]): shape casts over that stream
  and the three-pass move resolver
- the user surface ([`controller`], [`manager`], [`params`]): descriptors,
  the controller facade and the manager that owns them
*/

pub mod controller;
pub mod manager;
pub mod params;
pub mod scene;
pub mod settings;
mod sweep;
pub mod touched;
pub mod types;
pub mod volume;
pub mod world;

pub use controller::{
    Controller, ControllerHitReport, ControllerShape, ControllersHit, KinematicActor, ProxyShape,
    ShapeHit,
};
pub use manager::{ControllerManager, MoveRequest};
pub use params::{
    ClimbingMode, CollisionFlags, ControllerDesc, ControllerShapeDesc, DescError, InteractionMode,
    UpAxis,
};
pub use scene::{CollectionMode, FilterData, QueryFilter, QueryFilterCallback, SceneQuery};
pub use sweep_test::SweepStats;
pub use touched::{ControllerId, ShapeId};
pub use types::{ExtendedBounds, ExtendedCapsule, ExtendedVec3, Transform, Vec3};
pub use world::{CollisionScene, Motion, SceneError, SceneShape};
