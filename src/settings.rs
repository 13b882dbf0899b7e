/*!
Sweep pipeline tolerances and defaults.

These constants centralize the parameters used by the touched-geometry cache,
the sweep-and-slide resolver, and the controller facade. Keeping them
together makes tuning easier and helps ensure deterministic behavior across
platforms.

Notes
- Distances are in meters.
- Favor practical world-space tolerances over machine epsilon.
*/

/// Maximum iterations per sweep pass. The down pass always runs one.
pub const MAX_ITER: u32 = 10;

/// Extra iterations granted when the first down-pass hit is another
/// controller, so stacked controllers can still settle.
pub const STACKING_EXTRA_ITER: u32 = 9;

/// Growth factor applied to the cached bounds on a cache miss. Must be
/// above 1 and not too big: larger values trade gather cost for cache hits.
pub const VOLUME_GROWTH: f64 = 1.5;

/// Fraction of the nominal controller dimensions used for the kinematic
/// proxy shape, leaving the contact offset to the sweep core.
pub const PROXY_SCALE: f32 = 0.8;

/// Default skin distance kept between the volume and touched shapes.
pub const DEFAULT_CONTACT_OFFSET: f32 = 0.1;

/// Default maximum ledge height climbed automatically.
pub const DEFAULT_STEP_OFFSET: f32 = 0.5;

/// Default smallest displacement length worth sweeping (meters).
pub const DEFAULT_MIN_DIST: f32 = 0.001;

/// Squared length below which a vector is treated as zero when normalizing.
pub const ZERO_LEN_SQ: f32 = 1.0e-12;
