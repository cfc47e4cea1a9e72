//! Engine-wide constants
//!
//! Grouped by concern so call sites read as `constants::sort::DEFAULT_BIN_COUNT`.

/// Device limits the point store and buffer pool clamp against
pub mod gpu_limits {
    /// Largest single buffer allocation we assume a device accepts (1 GiB)
    pub const MAX_BUFFER_SIZE: u64 = 1024 * 1024 * 1024;

    /// Smallest limit a configuration may declare (1 MiB)
    pub const MIN_BUFFER_SIZE: u64 = 1024 * 1024;
}

/// Point store layout
pub mod points {
    /// Bytes for position (3 x f32) and color (4 x f32)
    pub const BASE_BYTES_PER_POINT: u64 = 12 + 16;

    /// Bytes for an optional bounding radius
    pub const RADIUS_BYTES: u64 = 4;

    /// Bytes for one RGB spherical-harmonics coefficient
    pub const SH_COEFFICIENT_BYTES: u64 = 12;

    /// Highest spherical-harmonics degree we accept
    pub const MAX_SH_DEGREE: u8 = 3;

    /// Capacity of the first staging allocation
    pub const MIN_CAPACITY: usize = 1024;

    /// Default batch size for streamed ingestion
    pub const DEFAULT_STREAM_BATCH: usize = 64 * 1024;
}

/// Sort scheduling and key computation
pub mod sort {
    /// Default number of bins for binned keys
    pub const DEFAULT_BIN_COUNT: u32 = 32;

    /// Upper bound on bins so counting sort stays cheap
    pub const MAX_BIN_COUNT: u32 = 1 << 16;

    /// Camera translation (world units) that triggers a re-sort
    pub const DEFAULT_POSITION_EPSILON: f32 = 0.01;

    /// 1 - cos(angle) that triggers a re-sort (about 0.8 degrees)
    pub const DEFAULT_DIRECTION_EPSILON: f32 = 0.0001;

    /// Minimum seconds between two sorts when nothing is dirty
    pub const DEFAULT_MIN_SORT_INTERVAL_SECS: f64 = 0.0;

    /// Default bound on concurrently running sort jobs
    pub const DEFAULT_MAX_CONCURRENT_SORTS: u32 = 1;

    /// Below this many points the comparison sort beats radix
    pub const RADIX_THRESHOLD: usize = 2048;

    /// Chunk length for parallel key computation
    pub const KEY_CHUNK_SIZE: usize = 4096;

    /// Guards divisions when the distance range collapses
    pub const DIVISION_EPSILON: f32 = 1e-6;
}

/// Level of detail
pub mod lod {
    /// Near/mid/far band boundaries (world units); beyond the last is very far
    pub const DEFAULT_LOD_THRESHOLDS: [f32; 3] = [10.0, 30.0, 80.0];

    /// Number of LOD bands
    pub const BAND_COUNT: usize = 4;
}

/// Scratch buffer pool
pub mod pool {
    /// Capacities are rounded up to a multiple of this many elements
    pub const DEFAULT_GROWTH_QUANTUM: usize = 4096;

    /// Moderate memory pressure trims idle buffers older than this many frames
    pub const DEFAULT_TRIM_AGE_FRAMES: u64 = 120;

    /// Default byte budget across all pooled buffers (512 MiB)
    pub const DEFAULT_MAX_POOL_BYTES: u64 = 512 * 1024 * 1024;

    /// Every pooled element is a 4-byte word (u32 or f32)
    pub const ELEMENT_SIZE: usize = 4;
}

/// Telemetry
pub mod telemetry {
    /// Frames kept in the rolling statistics history
    pub const HISTORY_FRAMES: usize = 120;
}
