/*!
The seam between the sweep core and whatever owns the world's shapes.

The resolver never walks a scene itself; it hands a query region to a
`SceneQuery` implementation which appends touched records to the cache
buffers. `CollisionScene` in this crate is one such implementation; an
engine with its own spatial structures can provide another.
*/

use crate::params::CctParams;
use crate::touched::{GeomBuffers, ShapeId};
use crate::types::ExtendedBounds;
use crate::volume::VolumeKind;

/// Four words of user filter data attached to queries and shapes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FilterData(pub [u32; 4]);

/// User hook deciding whether a candidate shape takes part in a query.
pub trait QueryFilterCallback {
    /// Return false to drop `shape` from the gather.
    fn pre_filter(&mut self, data: Option<&FilterData>, shape: ShapeId) -> bool;
}

/// Filtering state for one move. When `callback` is present it decides
/// alone; otherwise `data` is matched against per-shape filter data by the
/// scene implementation.
pub struct QueryFilter<'a> {
    pub data: Option<FilterData>,
    pub callback: Option<&'a mut dyn QueryFilterCallback>,
}

impl<'a> QueryFilter<'a> {
    pub fn none() -> Self {
        Self {
            data: None,
            callback: None,
        }
    }
}

/// Which subset of the scene a gather pass wants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectionMode {
    /// Shapes that never move. Cached across frames.
    Static,
    /// Shapes that may move between queries. Refreshed every update.
    Dynamic,
}

/// Scene-side interface consumed by the sweep core.
///
/// Implementations must append records for every non-trigger shape of the
/// requested subset overlapping `bounds`, re-based to the center of
/// `bounds`, honoring `filter`. Edge normals are gathered only when
/// `volume_kind` is `Box`.
pub trait SceneQuery {
    fn find_touched_geometry(
        &self,
        bounds: &ExtendedBounds,
        mode: CollectionMode,
        volume_kind: VolumeKind,
        filter: &mut QueryFilter<'_>,
        params: &CctParams,
        buffers: &mut GeomBuffers,
    );
}
