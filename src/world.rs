/*!
A concrete collision scene implementing [`SceneQuery`].

Shapes are registered with a pose, a motion class and an optional trigger /
filter-data marking. Static shapes are indexed by a BVH over their world
AABBs (rebuilt on static mutation); dynamic shapes are scanned linearly.
Meshes and heightfields are broken into world-space triangles at gather
time, re-based to the query origin, with invisible walls extruded over
non-walkable triangles when enabled.
*/

use nalgebra as na;
use thiserror::Error;

use parry3d::{
    bounding_volume::Aabb,
    partitioning::{Bvh, BvhBuildStrategy},
    shape as pshape,
    shape::Triangle,
};

use crate::params::CctParams;
use crate::scene::{CollectionMode, FilterData, QueryFilter, SceneQuery};
use crate::touched::{EdgeFlags, GeomBuffers, ShapeId, TouchedGeom};
use crate::types::{ExtendedBounds, ExtendedVec3, Point3, Transform, Vec3};
use crate::volume::VolumeKind;

/// Collision shapes supported by the scene.
#[derive(Clone, Debug)]
pub enum SceneShape {
    Box {
        /// Local-space half-extents (hx, hy, hz).
        half_extents: Vec3,
    },
    Sphere {
        radius: f32,
    },
    Capsule {
        radius: f32,
        /// Half of the cylinder length along the local +Y axis.
        half_height: f32,
    },
    Mesh {
        vertices: Vec<Point3>,
        indices: Vec<[u32; 3]>,
    },
    /// Regular-grid heightfield. Sample `(row, col)` sits at local
    /// `(col * col_spacing, height, row * row_spacing)`; each cell is
    /// triangulated into two triangles at gather time.
    HeightField {
        heights: Vec<f32>,
        nb_rows: u32,
        nb_cols: u32,
        row_spacing: f32,
        col_spacing: f32,
    },
}

/// Whether a shape may move between queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Motion {
    Static,
    Dynamic,
}

/// Shape registration failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("heightfield of {rows}x{cols} needs {expected} samples, got {got}")]
    HeightFieldSamples {
        rows: u32,
        cols: u32,
        expected: usize,
        got: usize,
    },
}

struct SceneEntry {
    id: ShapeId,
    shape: SceneShape,
    transform: Transform,
    motion: Motion,
    is_trigger: bool,
    filter_data: Option<FilterData>,
}

/// A shape registry with a static-shape BVH, usable as the world behind a
/// controller manager.
pub struct CollisionScene {
    entries: Vec<SceneEntry>,
    next_id: u32,
    /// BVH over static entries; `static_indices[leaf]` maps back into
    /// `entries`.
    bvh: Bvh,
    static_indices: Vec<usize>,
}

impl Default for CollisionScene {
    fn default() -> Self {
        Self::new()
    }
}

impl CollisionScene {
    pub fn new() -> Self {
        let empty: Vec<Aabb> = Vec::new();
        Self {
            entries: Vec::new(),
            next_id: 0,
            bvh: Bvh::from_leaves(BvhBuildStrategy::Binned, &empty),
            static_indices: Vec::new(),
        }
    }

    /// Register a shape and return its stable handle. Heightfields must
    /// carry exactly `nb_rows * nb_cols` samples.
    pub fn add_shape(
        &mut self,
        shape: SceneShape,
        transform: Transform,
        motion: Motion,
    ) -> Result<ShapeId, SceneError> {
        if let SceneShape::HeightField {
            heights,
            nb_rows,
            nb_cols,
            ..
        } = &shape
        {
            let expected = *nb_rows as usize * *nb_cols as usize;
            if heights.len() != expected {
                return Err(SceneError::HeightFieldSamples {
                    rows: *nb_rows,
                    cols: *nb_cols,
                    expected,
                    got: heights.len(),
                });
            }
        }
        let id = ShapeId(self.next_id);
        self.next_id += 1;
        self.entries.push(SceneEntry {
            id,
            shape,
            transform,
            motion,
            is_trigger: false,
            filter_data: None,
        });
        if motion == Motion::Static {
            self.rebuild_accel();
        }
        Ok(id)
    }

    pub fn remove_shape(&mut self, id: ShapeId) -> bool {
        let Some(pos) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };
        // The swap shifts indices into `entries`, so the accelerator must
        // be rebuilt whichever motion class was removed.
        self.entries.swap_remove(pos);
        self.rebuild_accel();
        true
    }

    /// Mark a shape as a trigger; triggers are never gathered.
    pub fn set_trigger(&mut self, id: ShapeId, is_trigger: bool) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.id == id) {
            e.is_trigger = is_trigger;
        }
    }

    pub fn set_filter_data(&mut self, id: ShapeId, data: FilterData) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.id == id) {
            e.filter_data = Some(data);
        }
    }

    /// Move a shape. Static shapes trigger an accelerator rebuild; callers
    /// moving statics should also invalidate controller caches.
    pub fn set_transform(&mut self, id: ShapeId, transform: Transform) {
        let mut rebuild = false;
        if let Some(e) = self.entries.iter_mut().find(|e| e.id == id) {
            e.transform = transform;
            rebuild = e.motion == Motion::Static;
        }
        if rebuild {
            self.rebuild_accel();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn rebuild_accel(&mut self) {
        let mut aabbs: Vec<Aabb> = Vec::new();
        self.static_indices.clear();
        for (i, e) in self.entries.iter().enumerate() {
            if e.motion == Motion::Static {
                aabbs.push(entry_aabb(e));
                self.static_indices.push(i);
            }
        }
        self.bvh = Bvh::from_leaves(BvhBuildStrategy::Binned, &aabbs);
        log::trace!("scene accel rebuilt over {} static shapes", aabbs.len());
    }
}

impl SceneQuery for CollisionScene {
    fn find_touched_geometry(
        &self,
        bounds: &ExtendedBounds,
        mode: CollectionMode,
        volume_kind: VolumeKind,
        filter: &mut QueryFilter<'_>,
        params: &CctParams,
        buffers: &mut GeomBuffers,
    ) {
        // All gathered data is expressed relative to the center of the
        // query bounds so f32 stays accurate far from the world origin.
        let origin = bounds.center();
        let query_aabb = narrow_bounds(bounds);

        let candidates: Vec<usize> = match mode {
            CollectionMode::Static => self
                .bvh
                .intersect_aabb(&query_aabb)
                .map(|leaf| self.static_indices[leaf as usize])
                .collect(),
            CollectionMode::Dynamic => self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| {
                    e.motion == Motion::Dynamic && aabb_intersects(&entry_aabb(e), &query_aabb)
                })
                .map(|(i, _)| i)
                .collect(),
        };

        for idx in candidates {
            let entry = &self.entries[idx];
            if entry.is_trigger {
                continue;
            }
            if !passes_filter(filter, entry) {
                continue;
            }
            emit_entry(entry, origin, &query_aabb, volume_kind, params, buffers);
        }
    }
}

fn passes_filter(filter: &mut QueryFilter<'_>, entry: &SceneEntry) -> bool {
    if let Some(cb) = filter.callback.as_deref_mut() {
        return cb.pre_filter(filter.data.as_ref(), entry.id);
    }
    match (filter.data, entry.filter_data) {
        (Some(FilterData(q)), Some(FilterData(s))) => {
            (q[0] & s[0]) | (q[1] & s[1]) | (q[2] & s[2]) | (q[3] & s[3]) != 0
        }
        _ => true,
    }
}

fn emit_entry(
    entry: &SceneEntry,
    origin: ExtendedVec3,
    query_aabb: &Aabb,
    volume_kind: VolumeKind,
    params: &CctParams,
    buffers: &mut GeomBuffers,
) {
    let t = entry.transform;
    match &entry.shape {
        SceneShape::Box { half_extents } => {
            buffers.geom_stream.push(TouchedGeom::Box {
                shape: entry.id,
                offset: origin,
                center: rebase(t.translation, origin),
                extents: *half_extents,
                rotation: t.rotation,
            });
        }
        SceneShape::Sphere { radius } => {
            buffers.geom_stream.push(TouchedGeom::Sphere {
                shape: entry.id,
                offset: origin,
                center: rebase(t.translation, origin),
                radius: *radius,
            });
        }
        SceneShape::Capsule {
            radius,
            half_height,
        } => {
            let axis = t.rotation * Vec3::new(0.0, *half_height, 0.0);
            buffers.geom_stream.push(TouchedGeom::Capsule {
                shape: entry.id,
                offset: origin,
                p0: rebase(t.translation - axis, origin),
                p1: rebase(t.translation + axis, origin),
                radius: *radius,
            });
        }
        SceneShape::Mesh { vertices, indices } => {
            let iso = t.iso();
            let tris = indices.iter().enumerate().map(|(i, idx)| {
                let a = iso.transform_point(&vertices[idx[0] as usize]);
                let b = iso.transform_point(&vertices[idx[1] as usize]);
                let c = iso.transform_point(&vertices[idx[2] as usize]);
                (Triangle::new(a, b, c), i as u32)
            });
            emit_mesh_record(entry.id, tris, origin, query_aabb, volume_kind, params, buffers);
        }
        SceneShape::HeightField {
            heights,
            nb_rows,
            nb_cols,
            row_spacing,
            col_spacing,
        } => {
            let iso = t.iso();
            let (rows, cols) = (*nb_rows as usize, *nb_cols as usize);
            if rows < 2 || cols < 2 {
                return;
            }
            let vertex = |r: usize, c: usize| -> Point3 {
                let local = Point3::new(
                    c as f32 * col_spacing,
                    heights[r * cols + c],
                    r as f32 * row_spacing,
                );
                iso.transform_point(&local)
            };
            let vertex = &vertex;
            let tris = (0..rows - 1).flat_map(move |r| {
                (0..cols - 1).flat_map(move |c| {
                    let v00 = vertex(r, c);
                    let v01 = vertex(r, c + 1);
                    let v10 = vertex(r + 1, c);
                    let v11 = vertex(r + 1, c + 1);
                    let cell = (r * (cols - 1) + c) as u32;
                    [
                        (Triangle::new(v00, v10, v11), cell * 2),
                        (Triangle::new(v00, v11, v01), cell * 2 + 1),
                    ]
                })
            });
            emit_mesh_record(entry.id, tris, origin, query_aabb, volume_kind, params, buffers);
        }
    }
}

/// Append one mesh record from an iterator of world-space triangles.
///
/// Triangles outside the query region are skipped; survivors are re-based
/// to `origin`. Non-walkable triangles grow invisible walls when the wall
/// height is set.
fn emit_mesh_record(
    id: ShapeId,
    tris: impl Iterator<Item = (Triangle, u32)>,
    origin: ExtendedVec3,
    query_aabb: &Aabb,
    volume_kind: VolumeKind,
    params: &CctParams,
    buffers: &mut GeomBuffers,
) {
    let want_edge_normals = volume_kind == VolumeKind::Box;
    let tri_base = buffers.world_triangles.len() as u32;
    let flags_base = buffers.edge_flags.len() as u32;
    let en_base = buffers.world_edge_normals.len() as u32;
    let mut nb_tris: u32 = 0;

    for (world_tri, tri_index) in tris {
        if !aabb_intersects(&triangle_aabb(&world_tri), query_aabb) {
            continue;
        }
        let local = Triangle::new(
            rebase_point(world_tri.a, origin),
            rebase_point(world_tri.b, origin),
            rebase_point(world_tri.c, origin),
        );
        let normal = local
            .normal()
            .map(|n| n.into_inner())
            .unwrap_or_else(Vec3::zeros);

        push_triangle(
            buffers,
            local,
            normal,
            EdgeFlags::ALL,
            Some(tri_index),
            want_edge_normals,
        );
        nb_tris += 1;

        if params.invisible_wall_height > 0.0
            && params.handle_slope
            && !params.is_walkable(normal)
        {
            nb_tris += extrude_invisible_walls(buffers, &local, params, want_edge_normals);
        }
    }

    if nb_tris > 0 {
        buffers.geom_stream.push(TouchedGeom::Mesh {
            shape: id,
            offset: origin,
            nb_tris,
            index_world_triangles: tri_base,
            index_world_edge_normals: want_edge_normals.then_some(en_base),
            index_edge_flags: flags_base,
        });
    }
}

fn push_triangle(
    buffers: &mut GeomBuffers,
    tri: Triangle,
    normal: Vec3,
    flags: EdgeFlags,
    tri_index: Option<u32>,
    want_edge_normals: bool,
) {
    buffers.world_triangles.push(tri);
    buffers.edge_flags.push(flags);
    buffers.triangle_indices.push(tri_index);
    if want_edge_normals {
        buffers.world_edge_normals.push([normal, normal, normal]);
    }
}

/// Extrude two wall triangles per edge of a non-walkable triangle so steep
/// surfaces behave like hard walls. Returns the number of triangles added.
fn extrude_invisible_walls(
    buffers: &mut GeomBuffers,
    tri: &Triangle,
    params: &CctParams,
    want_edge_normals: bool,
) -> u32 {
    let mut up = Vec3::zeros();
    up[params.up_axis.index()] = params.invisible_wall_height;

    let verts = [tri.a, tri.b, tri.c];
    for edge in 0..3 {
        let v0 = verts[edge];
        let v1 = verts[(edge + 1) % 3];
        for wall in [
            Triangle::new(v0, v1, v0 + up),
            Triangle::new(v0 + up, v1, v1 + up),
        ] {
            let n = wall
                .normal()
                .map(|n| n.into_inner())
                .unwrap_or_else(Vec3::zeros);
            push_triangle(buffers, wall, n, EdgeFlags::ALL, None, want_edge_normals);
        }
    }
    6
}

#[inline]
fn rebase(world: Vec3, origin: ExtendedVec3) -> Vec3 {
    Vec3::new(
        (world.x as f64 - origin.x) as f32,
        (world.y as f64 - origin.y) as f32,
        (world.z as f64 - origin.z) as f32,
    )
}

#[inline]
fn rebase_point(world: Point3, origin: ExtendedVec3) -> Point3 {
    Point3::from(rebase(world.coords, origin))
}

/// Narrow extended bounds to an f32 AABB for broad-phase tests.
fn narrow_bounds(bounds: &ExtendedBounds) -> Aabb {
    Aabb {
        mins: na::Point3::new(
            bounds.minimum.x as f32,
            bounds.minimum.y as f32,
            bounds.minimum.z as f32,
        ),
        maxs: na::Point3::new(
            bounds.maximum.x as f32,
            bounds.maximum.y as f32,
            bounds.maximum.z as f32,
        ),
    }
}

fn triangle_aabb(tri: &Triangle) -> Aabb {
    let mins = na::Point3::new(
        tri.a.x.min(tri.b.x).min(tri.c.x),
        tri.a.y.min(tri.b.y).min(tri.c.y),
        tri.a.z.min(tri.b.z).min(tri.c.z),
    );
    let maxs = na::Point3::new(
        tri.a.x.max(tri.b.x).max(tri.c.x),
        tri.a.y.max(tri.b.y).max(tri.c.y),
        tri.a.z.max(tri.b.z).max(tri.c.z),
    );
    Aabb { mins, maxs }
}

fn aabb_intersects(a: &Aabb, b: &Aabb) -> bool {
    !(a.maxs.x < b.mins.x
        || a.mins.x > b.maxs.x
        || a.maxs.y < b.mins.y
        || a.mins.y > b.maxs.y
        || a.maxs.z < b.mins.z
        || a.mins.z > b.maxs.z)
}

fn entry_aabb(entry: &SceneEntry) -> Aabb {
    let iso = entry.transform.iso();
    match &entry.shape {
        SceneShape::Box { half_extents } => pshape::Cuboid::new(*half_extents).aabb(&iso),
        SceneShape::Sphere { radius } => pshape::Ball::new(*radius).aabb(&iso),
        SceneShape::Capsule {
            radius,
            half_height,
        } => pshape::Capsule::new_y(*half_height, *radius).aabb(&iso),
        SceneShape::Mesh { vertices, .. } => {
            points_aabb(vertices.iter().map(|v| iso.transform_point(v)))
        }
        SceneShape::HeightField {
            heights,
            nb_cols,
            row_spacing,
            col_spacing,
            ..
        } => {
            let cols = *nb_cols as usize;
            points_aabb(heights.iter().enumerate().map(|(i, h)| {
                let r = i / cols;
                let c = i % cols;
                iso.transform_point(&Point3::new(
                    c as f32 * col_spacing,
                    *h,
                    r as f32 * row_spacing,
                ))
            }))
        }
    }
}

fn points_aabb(points: impl Iterator<Item = Point3>) -> Aabb {
    let mut mins = na::Point3::new(f32::MAX, f32::MAX, f32::MAX);
    let mut maxs = na::Point3::new(-f32::MAX, -f32::MAX, -f32::MAX);
    for p in points {
        mins = na::Point3::new(mins.x.min(p.x), mins.y.min(p.y), mins.z.min(p.z));
        maxs = na::Point3::new(maxs.x.max(p.x), maxs.y.max(p.y), maxs.z.max(p.z));
    }
    Aabb { mins, maxs }
}
