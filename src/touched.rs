/*!
The touched-geometry cache: everything the scene gathering produces and the
narrow phase consumes.

Gathered shapes become `TouchedGeom` records appended to a stream. Mesh and
heightfield records do not own their triangles; they index into flat side
buffers (`GeomBuffers`) shared by the whole stream. Every record carries the
stream origin it was re-based to, so contact points can be offset back into
extended world space.
*/

use parry3d::shape::Triangle;

use crate::types::{ExtendedBounds, ExtendedCapsule, ExtendedVec3, Quat, Vec3, to_world};

/// Stable handle of a shape registered in a collision scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShapeId(pub u32);

/// Stable handle of a controller owned by a manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ControllerId(pub u32);

/// Per-triangle edge activity bits. Walls extruded over non-walkable
/// triangles mark every edge active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EdgeFlags(pub u8);

impl EdgeFlags {
    pub const EDGE01: EdgeFlags = EdgeFlags(1 << 0);
    pub const EDGE12: EdgeFlags = EdgeFlags(1 << 1);
    pub const EDGE20: EdgeFlags = EdgeFlags(1 << 2);
    pub const ALL: EdgeFlags = EdgeFlags(0b111);
}

/// One gathered shape, re-based to `offset` (the stream origin).
///
/// `User*` variants are other controllers; the rest are scene shapes. Mesh
/// records cover triangle meshes and heightfields alike and point into the
/// shared triangle buffers.
#[derive(Clone, Copy, Debug)]
pub enum TouchedGeom {
    UserBox {
        controller: ControllerId,
        offset: ExtendedVec3,
        /// World bounds of the other controller.
        bounds: ExtendedBounds,
    },
    UserCapsule {
        controller: ControllerId,
        offset: ExtendedVec3,
        capsule: ExtendedCapsule,
    },
    Mesh {
        shape: ShapeId,
        offset: ExtendedVec3,
        nb_tris: u32,
        /// Start index into `GeomBuffers::world_triangles`.
        index_world_triangles: u32,
        /// Start index into `GeomBuffers::world_edge_normals`, when edge
        /// normals were gathered for this volume kind.
        index_world_edge_normals: Option<u32>,
        /// Start index into `edge_flags` and `triangle_indices`.
        index_edge_flags: u32,
    },
    Box {
        shape: ShapeId,
        offset: ExtendedVec3,
        /// Center in stream-local space.
        center: Vec3,
        extents: Vec3,
        rotation: Quat,
    },
    Sphere {
        shape: ShapeId,
        offset: ExtendedVec3,
        /// Center in stream-local space.
        center: Vec3,
        radius: f32,
    },
    Capsule {
        shape: ShapeId,
        offset: ExtendedVec3,
        /// Segment endpoints in stream-local space.
        p0: Vec3,
        p1: Vec3,
        radius: f32,
    },
}

impl TouchedGeom {
    /// The stream origin this record was re-based to.
    #[inline]
    pub fn offset(&self) -> ExtendedVec3 {
        match *self {
            TouchedGeom::UserBox { offset, .. }
            | TouchedGeom::UserCapsule { offset, .. }
            | TouchedGeom::Mesh { offset, .. }
            | TouchedGeom::Box { offset, .. }
            | TouchedGeom::Sphere { offset, .. }
            | TouchedGeom::Capsule { offset, .. } => offset,
        }
    }

    /// True for records describing another controller.
    #[inline]
    pub fn is_user(&self) -> bool {
        matches!(
            self,
            TouchedGeom::UserBox { .. } | TouchedGeom::UserCapsule { .. }
        )
    }

    /// The scene shape behind this record, if it is not a controller.
    #[inline]
    pub fn shape_id(&self) -> Option<ShapeId> {
        match *self {
            TouchedGeom::Mesh { shape, .. }
            | TouchedGeom::Box { shape, .. }
            | TouchedGeom::Sphere { shape, .. }
            | TouchedGeom::Capsule { shape, .. } => Some(shape),
            _ => None,
        }
    }

    /// The controller behind this record, if it is one.
    #[inline]
    pub fn controller_id(&self) -> Option<ControllerId> {
        match *self {
            TouchedGeom::UserBox { controller, .. }
            | TouchedGeom::UserCapsule { controller, .. } => Some(controller),
            _ => None,
        }
    }
}

/// Flat buffers backing a geometry stream.
///
/// Static records occupy a stable prefix of every buffer; dynamic records
/// are appended after them and rebuilt more often.
#[derive(Default)]
pub struct GeomBuffers {
    pub world_triangles: Vec<Triangle>,
    /// One normal triplet per triangle, parallel to `world_triangles`,
    /// gathered only for box volumes.
    pub world_edge_normals: Vec<[Vec3; 3]>,
    pub edge_flags: Vec<EdgeFlags>,
    /// Source triangle index in the owning mesh; `None` for generated wall
    /// triangles.
    pub triangle_indices: Vec<Option<u32>>,
    pub geom_stream: Vec<TouchedGeom>,
}

impl GeomBuffers {
    pub fn clear(&mut self) {
        self.world_triangles.clear();
        self.world_edge_normals.clear();
        self.edge_flags.clear();
        self.triangle_indices.clear();
        self.geom_stream.clear();
    }

    /// Drop everything past the static prefix described by `counts`.
    pub fn truncate_to(&mut self, counts: &CacheCounts) {
        self.geom_stream.truncate(counts.nb_geoms);
        self.world_triangles.truncate(counts.nb_triangles);
        self.world_edge_normals.truncate(counts.nb_edge_normals);
        self.edge_flags.truncate(counts.nb_edge_flags);
        self.triangle_indices.truncate(counts.nb_edge_flags);
    }

    /// Snapshot of current buffer sizes, taken after the static pass.
    pub fn counts(&self) -> CacheCounts {
        CacheCounts {
            nb_geoms: self.geom_stream.len(),
            nb_triangles: self.world_triangles.len(),
            nb_edge_normals: self.world_edge_normals.len(),
            nb_edge_flags: self.edge_flags.len(),
        }
    }
}

/// Sizes of the static prefix of each cache buffer.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheCounts {
    pub nb_geoms: usize,
    pub nb_triangles: usize,
    pub nb_edge_normals: usize,
    pub nb_edge_flags: usize,
}

/// Closest contact found by a narrow-phase scan.
#[derive(Clone, Copy, Debug)]
pub struct SweptContact {
    /// Contact position in extended world space.
    pub world_pos: ExtendedVec3,
    /// Contact normal in world space, opposing the motion.
    pub world_normal: Vec3,
    /// Absolute distance along the sweep direction (meters). Doubles as
    /// the running upper bound during a stream scan.
    pub distance: f32,
    /// Index into `GeomBuffers::world_triangles` for mesh hits.
    pub internal_index: Option<u32>,
    /// Source triangle index in the owning mesh, for mesh hits on real
    /// (non-wall) triangles.
    pub triangle_index: Option<u32>,
    /// Index of the touched record in the geometry stream.
    pub geom: Option<usize>,
}

impl SweptContact {
    /// A miss with the given initial distance bound.
    pub fn with_max_distance(distance: f32) -> Self {
        Self {
            world_pos: ExtendedVec3::zeros(),
            world_normal: Vec3::zeros(),
            distance,
            internal_index: None,
            triangle_index: None,
            geom: None,
        }
    }

    /// Store a stream-local impact point, offset back to world space.
    #[inline]
    pub fn set_world_pos(&mut self, local_impact: Vec3, offset: ExtendedVec3) {
        self.world_pos = to_world(local_impact, offset);
    }
}
