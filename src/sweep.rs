/*!
Narrow phase: sweeping the character volume against cached records.

`collide_geoms` scans a geometry stream and keeps the closest contact. Each
(volume kind, record kind) pair goes through a parry shape cast with the
unit sweep direction as the velocity, so the reported time of impact is an
absolute distance in meters. Everything runs in stream-local f32 space; the
record's offset turns impact points back into extended world space.

Zero-distance hits from pair sweeps are dropped so a volume resting exactly
against a shape can still move away from it; the cost is that an exactly
touching obstacle does not block the very first step toward it. Box-vs-box
pairs and mesh triangles report zero-distance hits normally.
*/

use nalgebra as na;
use parry3d::{
    query::{self, ShapeCastOptions},
    shape as pshape,
    shape::Triangle,
};

use crate::params::UpAxis;
use crate::touched::{GeomBuffers, SweptContact, TouchedGeom};
use crate::types::{to_local, ExtendedVec3, Iso, Point3, Vec3};
use crate::volume::{up_axis_rotation, SweptVolume, VolumeKind, VolumeShape};

/// The moving volume as a concrete parry shape.
enum MovingShape {
    Box(pshape::Cuboid),
    Capsule(pshape::Capsule),
}

impl MovingShape {
    fn new(volume: &SweptVolume) -> Self {
        match volume.shape {
            VolumeShape::Box { extents } => MovingShape::Box(pshape::Cuboid::new(extents)),
            VolumeShape::Capsule { radius, height } => {
                MovingShape::Capsule(pshape::Capsule::new_y(height * 0.5, radius))
            }
        }
    }

    fn as_shape(&self) -> &dyn pshape::Shape {
        match self {
            MovingShape::Box(c) => c,
            MovingShape::Capsule(c) => c,
        }
    }
}

/// One cast result in stream-local space.
#[derive(Clone, Copy)]
struct CastHit {
    distance: f32,
    /// World normal, flipped to oppose the sweep direction.
    normal: Vec3,
    /// Impact point in stream-local space.
    impact: Vec3,
}

/// Cast `moving` along the unit direction `dir` against one obstacle.
/// `max_dist` caps the scan so far hits are rejected by parry itself.
fn cast(
    moving: &dyn pshape::Shape,
    pose: &Iso,
    dir: Vec3,
    max_dist: f32,
    obstacle: &dyn pshape::Shape,
    obstacle_pose: &Iso,
) -> Option<CastHit> {
    let mut opts = ShapeCastOptions::with_max_time_of_impact(max_dist);
    opts.stop_at_penetration = true;
    if let Ok(Some(hit)) = query::cast_shapes(
        pose,
        &dir,
        moving,
        obstacle_pose,
        &na::Vector3::zeros(),
        obstacle,
        opts,
    ) {
        let mut n = pose.rotation * hit.normal1.into_inner();
        if n.dot(&dir) > 0.0 {
            n = -n;
        }
        let impact = obstacle_pose.transform_point(&hit.witness2);
        return Some(CastHit {
            distance: hit.time_of_impact,
            normal: n,
            impact: impact.coords,
        });
    }
    None
}

/// Sweep against a single convex obstacle; update `contact` when strictly
/// closer than the current best.
fn sweep_pair(
    moving: &dyn pshape::Shape,
    pose: &Iso,
    dir: Vec3,
    obstacle: &dyn pshape::Shape,
    obstacle_pose: &Iso,
    keep_zero: bool,
    offset: ExtendedVec3,
    contact: &mut SweptContact,
) -> bool {
    let Some(hit) = cast(moving, pose, dir, contact.distance, obstacle, obstacle_pose) else {
        return false;
    };
    if hit.distance >= contact.distance {
        return false;
    }
    if !keep_zero && hit.distance == 0.0 {
        return false;
    }
    contact.distance = hit.distance;
    contact.world_normal = hit.normal;
    contact.set_world_pos(hit.impact, offset);
    true
}

/// Sweep against one mesh record's triangle range. The cached-triangle hint
/// is tested first so its distance caps the rest of the scan, then written
/// back on a hit.
#[allow(clippy::too_many_arguments)]
fn sweep_vs_mesh(
    moving: &dyn pshape::Shape,
    pose: &Iso,
    dir: Vec3,
    buffers: &GeomBuffers,
    nb_tris: u32,
    index_world_triangles: u32,
    index_edge_flags: u32,
    offset: ExtendedVec3,
    tri_hint: &mut u32,
    contact: &mut SweptContact,
) -> bool {
    if nb_tris == 0 {
        return false;
    }
    let start = index_world_triangles as usize;
    let tris: &[Triangle] = &buffers.world_triangles[start..start + nb_tris as usize];
    let mut cached = *tri_hint as usize;
    if cached >= tris.len() {
        cached = 0;
    }

    let identity = Iso::identity();
    let mut best: Option<(usize, CastHit)> = None;
    let order = std::iter::once(cached).chain((0..tris.len()).filter(|&i| i != cached));
    for i in order {
        let max = best.as_ref().map_or(contact.distance, |(_, h)| h.distance);
        if let Some(hit) = cast(moving, pose, dir, max, &tris[i], &identity) {
            if hit.distance < max {
                best = Some((i, hit));
            }
        }
    }

    let Some((i, hit)) = best else {
        return false;
    };
    contact.distance = hit.distance;
    contact.world_normal = hit.normal;
    contact.set_world_pos(hit.impact, offset);
    contact.internal_index = Some(index_world_triangles + i as u32);
    contact.triangle_index = buffers.triangle_indices[index_edge_flags as usize + i];
    *tri_hint = i as u32;
    true
}

/// Scan the whole geometry stream for the closest contact along `dir`.
///
/// `contact.distance` must be seeded with the maximum sweep length; on
/// return it holds the closest hit distance. The scan stops early once a
/// zero-distance contact is found, nothing can beat it.
#[allow(clippy::too_many_arguments)]
pub(crate) fn collide_geoms(
    buffers: &GeomBuffers,
    volume: &SweptVolume,
    up: UpAxis,
    center: ExtendedVec3,
    dir: Vec3,
    tri_hint: &mut u32,
    contact: &mut SweptContact,
) -> bool {
    let moving = MovingShape::new(volume);
    let rotation = match volume.kind() {
        VolumeKind::Box => na::UnitQuaternion::identity(),
        VolumeKind::Capsule => up_axis_rotation(up),
    };

    let mut status = false;
    for (i, geom) in buffers.geom_stream.iter().enumerate() {
        let offset = geom.offset();
        let pose = Iso::from_parts(
            na::Translation3::from(to_local(center, offset)),
            rotation,
        );

        let mut candidate = SweptContact::with_max_distance(contact.distance);
        let hit = match *geom {
            TouchedGeom::UserBox { bounds, .. } => {
                let cuboid = pshape::Cuboid::new(Vec3::new(
                    bounds.extents().x as f32,
                    bounds.extents().y as f32,
                    bounds.extents().z as f32,
                ));
                let obstacle_pose =
                    Iso::from_parts(na::Translation3::from(to_local(bounds.center(), offset)),
                        na::UnitQuaternion::identity());
                let keep_zero = volume.kind() == VolumeKind::Box;
                sweep_pair(
                    moving.as_shape(),
                    &pose,
                    dir,
                    &cuboid,
                    &obstacle_pose,
                    keep_zero,
                    offset,
                    &mut candidate,
                )
            }
            TouchedGeom::UserCapsule { capsule, .. } => {
                let obstacle = pshape::Capsule::new(
                    Point3::from(to_local(capsule.p0, offset)),
                    Point3::from(to_local(capsule.p1, offset)),
                    capsule.radius,
                );
                sweep_pair(
                    moving.as_shape(),
                    &pose,
                    dir,
                    &obstacle,
                    &Iso::identity(),
                    false,
                    offset,
                    &mut candidate,
                )
            }
            TouchedGeom::Mesh {
                nb_tris,
                index_world_triangles,
                index_edge_flags,
                ..
            } => sweep_vs_mesh(
                moving.as_shape(),
                &pose,
                dir,
                buffers,
                nb_tris,
                index_world_triangles,
                index_edge_flags,
                offset,
                tri_hint,
                &mut candidate,
            ),
            TouchedGeom::Box {
                center: box_center,
                extents,
                rotation: box_rotation,
                ..
            } => {
                let cuboid = pshape::Cuboid::new(extents);
                let obstacle_pose =
                    Iso::from_parts(na::Translation3::from(box_center), box_rotation);
                let keep_zero = volume.kind() == VolumeKind::Box;
                sweep_pair(
                    moving.as_shape(),
                    &pose,
                    dir,
                    &cuboid,
                    &obstacle_pose,
                    keep_zero,
                    offset,
                    &mut candidate,
                )
            }
            TouchedGeom::Sphere {
                center: sphere_center,
                radius,
                ..
            } => {
                let ball = pshape::Ball::new(radius);
                let obstacle_pose = Iso::from_parts(
                    na::Translation3::from(sphere_center),
                    na::UnitQuaternion::identity(),
                );
                sweep_pair(
                    moving.as_shape(),
                    &pose,
                    dir,
                    &ball,
                    &obstacle_pose,
                    false,
                    offset,
                    &mut candidate,
                )
            }
            TouchedGeom::Capsule { p0, p1, radius, .. } => {
                let obstacle =
                    pshape::Capsule::new(Point3::from(p0), Point3::from(p1), radius);
                sweep_pair(
                    moving.as_shape(),
                    &pose,
                    dir,
                    &obstacle,
                    &Iso::identity(),
                    false,
                    offset,
                    &mut candidate,
                )
            }
        };

        if hit {
            candidate.geom = Some(i);
            *contact = candidate;
            status = true;
            if contact.distance <= 0.0 {
                break;
            }
        }
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::touched::ShapeId;
    use crate::volume::SweptVolume;

    fn box_volume() -> SweptVolume {
        SweptVolume::new_box(ExtendedVec3::zeros(), Vec3::repeat(0.5), UpAxis::Y)
    }

    fn sphere_record(x: f32, radius: f32, id: u32) -> TouchedGeom {
        TouchedGeom::Sphere {
            shape: ShapeId(id),
            offset: ExtendedVec3::zeros(),
            center: Vec3::new(x, 0.0, 0.0),
            radius,
        }
    }

    #[test]
    fn closest_record_wins_regardless_of_stream_order() {
        let mut buffers = GeomBuffers::default();
        buffers.geom_stream.push(sphere_record(5.0, 0.5, 0));
        buffers.geom_stream.push(sphere_record(3.0, 0.5, 1));

        let volume = box_volume();
        let mut hint = 0;
        let mut contact = SweptContact::with_max_distance(10.0);
        let hit = collide_geoms(
            &buffers,
            &volume,
            UpAxis::Y,
            volume.center,
            Vec3::new(1.0, 0.0, 0.0),
            &mut hint,
            &mut contact,
        );
        assert!(hit);
        // Box face at 0.5, nearer sphere surface at 2.5.
        assert!((contact.distance - 2.0).abs() < 1e-3, "{}", contact.distance);
        assert_eq!(contact.geom, Some(1));
        assert!(contact.world_normal.x < -0.99);
    }

    #[test]
    fn overlapping_sphere_is_dropped_as_zero_distance() {
        let mut buffers = GeomBuffers::default();
        buffers.geom_stream.push(sphere_record(0.9, 0.5, 0));

        let volume = box_volume();
        let mut hint = 0;
        let mut contact = SweptContact::with_max_distance(10.0);
        let hit = collide_geoms(
            &buffers,
            &volume,
            UpAxis::Y,
            volume.center,
            Vec3::new(1.0, 0.0, 0.0),
            &mut hint,
            &mut contact,
        );
        assert!(!hit);
        assert!((contact.distance - 10.0).abs() < 1e-6);
    }

    #[test]
    fn overlapping_box_pair_reports_zero_distance() {
        let mut buffers = GeomBuffers::default();
        buffers.geom_stream.push(TouchedGeom::Box {
            shape: ShapeId(0),
            offset: ExtendedVec3::zeros(),
            center: Vec3::new(0.8, 0.0, 0.0),
            extents: Vec3::repeat(0.5),
            rotation: na::UnitQuaternion::identity(),
        });

        let volume = box_volume();
        let mut hint = 0;
        let mut contact = SweptContact::with_max_distance(10.0);
        let hit = collide_geoms(
            &buffers,
            &volume,
            UpAxis::Y,
            volume.center,
            Vec3::new(1.0, 0.0, 0.0),
            &mut hint,
            &mut contact,
        );
        assert!(hit);
        assert!(contact.distance <= 1e-6);
    }

    #[test]
    fn mesh_hit_sets_indices_and_hint() {
        let mut buffers = GeomBuffers::default();
        // Far wall at x = 5, near wall at x = 2, both facing the volume.
        for (i, x) in [(0u32, 5.0f32), (1u32, 2.0f32)] {
            buffers.world_triangles.push(Triangle::new(
                Point3::new(x, -2.0, -2.0),
                Point3::new(x, 2.0, -2.0),
                Point3::new(x, 0.0, 2.0),
            ));
            buffers.edge_flags.push(crate::touched::EdgeFlags::ALL);
            buffers.triangle_indices.push(Some(i));
        }
        buffers.geom_stream.push(TouchedGeom::Mesh {
            shape: ShapeId(0),
            offset: ExtendedVec3::zeros(),
            nb_tris: 2,
            index_world_triangles: 0,
            index_world_edge_normals: None,
            index_edge_flags: 0,
        });

        let volume = box_volume();
        let mut hint = 0;
        let mut contact = SweptContact::with_max_distance(10.0);
        let hit = collide_geoms(
            &buffers,
            &volume,
            UpAxis::Y,
            volume.center,
            Vec3::new(1.0, 0.0, 0.0),
            &mut hint,
            &mut contact,
        );
        assert!(hit);
        assert!((contact.distance - 1.5).abs() < 1e-3, "{}", contact.distance);
        assert_eq!(contact.internal_index, Some(1));
        assert_eq!(contact.triangle_index, Some(1));
        assert_eq!(hint, 1);
    }

    #[test]
    fn capsule_volume_hits_sphere_at_cap_distance() {
        let mut buffers = GeomBuffers::default();
        buffers.geom_stream.push(sphere_record(4.0, 1.0, 0));

        let volume = SweptVolume::new_capsule(ExtendedVec3::zeros(), 0.5, 1.0);
        let mut hint = 0;
        let mut contact = SweptContact::with_max_distance(10.0);
        let hit = collide_geoms(
            &buffers,
            &volume,
            UpAxis::Y,
            volume.center,
            Vec3::new(1.0, 0.0, 0.0),
            &mut hint,
            &mut contact,
        );
        assert!(hit);
        // Capsule side at 0.5, sphere surface at 3.0.
        assert!((contact.distance - 2.5).abs() < 1e-3, "{}", contact.distance);
    }

    #[test]
    fn contact_point_offsets_back_to_world() {
        let origin = ExtendedVec3::new(1000.0, 0.0, 0.0);
        let mut buffers = GeomBuffers::default();
        buffers.geom_stream.push(TouchedGeom::Sphere {
            shape: ShapeId(0),
            offset: origin,
            center: Vec3::new(3.0, 0.0, 0.0),
            radius: 0.5,
        });

        let volume = SweptVolume::new_box(origin, Vec3::repeat(0.5), UpAxis::Y);
        let mut hint = 0;
        let mut contact = SweptContact::with_max_distance(10.0);
        assert!(collide_geoms(
            &buffers,
            &volume,
            UpAxis::Y,
            volume.center,
            Vec3::new(1.0, 0.0, 0.0),
            &mut hint,
            &mut contact,
        ));
        assert!((contact.world_pos.x - 1002.5).abs() < 1e-2, "{}", contact.world_pos.x);
    }
}
