//! Sort core configuration
//!
//! Every field has a default, so a TOML file only needs the options it
//! changes.

use crate::camera::CameraPose;
use crate::constants::gpu_limits::{MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};
use crate::constants::lod::DEFAULT_LOD_THRESHOLDS;
use crate::constants::pool::{
    DEFAULT_GROWTH_QUANTUM, DEFAULT_MAX_POOL_BYTES, DEFAULT_TRIM_AGE_FRAMES, ELEMENT_SIZE,
};
use crate::constants::sort::{
    DEFAULT_BIN_COUNT, DEFAULT_DIRECTION_EPSILON, DEFAULT_MAX_CONCURRENT_SORTS,
    DEFAULT_MIN_SORT_INTERVAL_SECS, DEFAULT_POSITION_EPSILON, MAX_BIN_COUNT,
};
use crate::point::StoreLimits;
use crate::scheduler::SchedulerSettings;
use crate::sort::{
    default_bin_tiers, validate_bin_tiers, BinTier, BoundsSource, KeyParams, OrderAlgorithm,
    SortMode, SortOrder,
};
use crate::thread_pool::SortThreadPoolConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const MAX_CONCURRENT_SORTS_LIMIT: u32 = 16;
const MAX_SORT_THREADS: usize = 256;

/// Errors loading or saving a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Where sort jobs run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortExecution {
    /// On the dedicated worker pool; results arrive on a later frame
    Async,
    /// On the calling thread, inside `update`
    Inline,
}

/// Sort core configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplatConfig {
    pub sort_mode: SortMode,

    /// Camera translation that triggers a re-sort (world units)
    pub sort_position_epsilon: f32,

    /// `1 - cos(angle)` of camera rotation that triggers a re-sort
    pub sort_direction_epsilon: f32,

    /// Seconds between sorts when the data is not dirty
    pub minimum_sort_interval: f64,

    pub max_concurrent_sorts: u32,

    /// Points beyond this distance are culled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_render_distance: Option<f32>,

    pub bin_count: u32,
    pub sort_order: SortOrder,
    pub order_algorithm: OrderAlgorithm,
    pub bin_tiers: Vec<BinTier>,
    pub bounds_source: BoundsSource,

    /// Near/mid/far band boundaries (world units)
    pub lod_thresholds: [f32; 3],

    /// Largest single point-buffer allocation
    pub max_allocation_bytes: u64,

    /// Pool capacities are rounded up to this many elements
    pub pool_growth_quantum: usize,
    pub pool_max_bytes: u64,
    pub pool_trim_age_frames: u64,

    /// Sort worker threads; 0 picks one fewer than the CPU count
    pub sort_threads: usize,
    pub execution: SortExecution,
}

impl Default for SplatConfig {
    fn default() -> Self {
        Self {
            sort_mode: SortMode::Radial,
            sort_position_epsilon: DEFAULT_POSITION_EPSILON,
            sort_direction_epsilon: DEFAULT_DIRECTION_EPSILON,
            minimum_sort_interval: DEFAULT_MIN_SORT_INTERVAL_SECS,
            max_concurrent_sorts: DEFAULT_MAX_CONCURRENT_SORTS,
            max_render_distance: None,
            bin_count: DEFAULT_BIN_COUNT,
            // Back-to-front for alpha blending
            sort_order: SortOrder::Descending,
            order_algorithm: OrderAlgorithm::Auto,
            bin_tiers: default_bin_tiers(),
            bounds_source: BoundsSource::Reduction,
            lod_thresholds: DEFAULT_LOD_THRESHOLDS,
            max_allocation_bytes: MAX_BUFFER_SIZE,
            pool_growth_quantum: DEFAULT_GROWTH_QUANTUM,
            pool_max_bytes: DEFAULT_MAX_POOL_BYTES,
            pool_trim_age_frames: DEFAULT_TRIM_AGE_FRAMES,
            sort_threads: 0,
            execution: SortExecution::Async,
        }
    }
}

impl SplatConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.sort_position_epsilon.is_finite() && self.sort_position_epsilon >= 0.0) {
            return Err(anyhow::anyhow!(
                "SplatConfig: sort_position_epsilon must be a non-negative number, got {}",
                self.sort_position_epsilon
            ));
        }

        if !(0.0..=2.0).contains(&self.sort_direction_epsilon) {
            return Err(anyhow::anyhow!(
                "SplatConfig: sort_direction_epsilon {} is outside [0, 2]",
                self.sort_direction_epsilon
            ));
        }

        if !(self.minimum_sort_interval.is_finite() && self.minimum_sort_interval >= 0.0) {
            return Err(anyhow::anyhow!(
                "SplatConfig: minimum_sort_interval must be a non-negative number of seconds, got {}",
                self.minimum_sort_interval
            ));
        }

        if self.max_concurrent_sorts == 0 || self.max_concurrent_sorts > MAX_CONCURRENT_SORTS_LIMIT {
            return Err(anyhow::anyhow!(
                "SplatConfig: max_concurrent_sorts {} must be between 1 and {}",
                self.max_concurrent_sorts,
                MAX_CONCURRENT_SORTS_LIMIT
            ));
        }

        if let Some(distance) = self.max_render_distance {
            if !(distance.is_finite() && distance > 0.0) {
                return Err(anyhow::anyhow!(
                    "SplatConfig: max_render_distance must be positive, got {}",
                    distance
                ));
            }
        }

        if self.bin_count == 0 || self.bin_count > MAX_BIN_COUNT {
            return Err(anyhow::anyhow!(
                "SplatConfig: bin_count {} must be between 1 and {}",
                self.bin_count,
                MAX_BIN_COUNT
            ));
        }

        validate_bin_tiers(&self.bin_tiers).map_err(|e| anyhow::anyhow!("SplatConfig: {}", e))?;

        let [near, mid, far] = self.lod_thresholds;
        if !(near > 0.0 && near < mid && mid < far && far.is_finite()) {
            return Err(anyhow::anyhow!(
                "SplatConfig: lod_thresholds {:?} must be positive and strictly increasing",
                self.lod_thresholds
            ));
        }

        if self.max_allocation_bytes < MIN_BUFFER_SIZE {
            return Err(anyhow::anyhow!(
                "SplatConfig: max_allocation_bytes {} is below the minimum of {}. {}",
                self.max_allocation_bytes,
                MIN_BUFFER_SIZE,
                self.suggest_safe_config()
            ));
        }

        if self.pool_growth_quantum == 0 {
            return Err(anyhow::anyhow!("SplatConfig: pool_growth_quantum cannot be 0"));
        }

        let quantum_bytes = (self.pool_growth_quantum * ELEMENT_SIZE) as u64;
        if self.pool_max_bytes < quantum_bytes {
            return Err(anyhow::anyhow!(
                "SplatConfig: pool_max_bytes {} cannot hold a single {}-element buffer. {}",
                self.pool_max_bytes,
                self.pool_growth_quantum,
                self.suggest_safe_config()
            ));
        }

        if self.sort_threads > MAX_SORT_THREADS {
            return Err(anyhow::anyhow!(
                "SplatConfig: sort_threads {} exceeds maximum of {}",
                self.sort_threads,
                MAX_SORT_THREADS
            ));
        }

        log::info!(
            "[SplatConfig] Validation: mode={:?}, order={:?}, max_points(degree 0)={}, pool budget={}MB",
            self.sort_mode,
            self.sort_order,
            crate::point::max_points(&self.store_limits(), 0),
            self.pool_max_bytes / 1024 / 1024
        );
        Ok(())
    }

    /// Suggest safe configuration parameters
    pub fn suggest_safe_config(&self) -> String {
        let mut suggestions = Vec::new();

        let points = crate::point::max_points(&self.store_limits(), 3);
        suggestions.push(format!(
            "With max_allocation_bytes={} a buffer holds at most {} degree-3 points",
            self.max_allocation_bytes, points
        ));

        // A full sort needs keys, indices and two ping-pong buffers
        let per_point_scratch = 5 * ELEMENT_SIZE as u64;
        suggestions.push(format!(
            "pool_max_bytes={} sorts about {} points per job",
            self.pool_max_bytes,
            self.pool_max_bytes / per_point_scratch
        ));

        suggestions.push("Common safe configurations:".to_string());
        suggestions.push(format!(
            "  - max_allocation_bytes={} ({}MB), pool_max_bytes={} ({}MB)",
            MAX_BUFFER_SIZE,
            MAX_BUFFER_SIZE / 1024 / 1024,
            DEFAULT_MAX_POOL_BYTES,
            DEFAULT_MAX_POOL_BYTES / 1024 / 1024
        ));
        suggestions.push("  - mobile: max_allocation_bytes=268435456 (256MB), pool_max_bytes=134217728 (128MB)".to_string());

        suggestions.join("\n")
    }

    pub fn minimum_sort_interval_duration(&self) -> Duration {
        Duration::from_secs_f64(self.minimum_sort_interval.max(0.0))
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            position_epsilon: self.sort_position_epsilon,
            direction_epsilon: self.sort_direction_epsilon,
            minimum_sort_interval: self.minimum_sort_interval_duration(),
            max_concurrent_sorts: self.max_concurrent_sorts,
        }
    }

    pub fn store_limits(&self) -> StoreLimits {
        StoreLimits {
            max_allocation_bytes: self.max_allocation_bytes,
        }
    }

    pub fn thread_pool_config(&self) -> SortThreadPoolConfig {
        SortThreadPoolConfig {
            threads: self.sort_threads,
            ..Default::default()
        }
    }

    pub fn key_params(&self, camera: CameraPose) -> KeyParams {
        KeyParams {
            mode: self.sort_mode,
            camera,
            bin_count: self.bin_count,
            bin_tiers: self.bin_tiers.clone(),
            bounds_source: self.bounds_source,
            max_render_distance: self.max_render_distance,
            lod_thresholds: self.lod_thresholds,
        }
    }
}

/// Parse a configuration from TOML text
pub fn from_toml_str(text: &str) -> std::result::Result<SplatConfig, ConfigError> {
    Ok(toml::from_str(text)?)
}

pub fn to_toml_string(config: &SplatConfig) -> std::result::Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

/// Read and parse a TOML configuration file
pub fn load_config_file(path: impl AsRef<Path>) -> std::result::Result<SplatConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config = from_toml_str(&text)?;
    log::info!("[SplatConfig] Loaded {}", path.display());
    Ok(config)
}
