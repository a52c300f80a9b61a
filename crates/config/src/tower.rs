//! Control tower configuration

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Configuration for one control tower
///
/// All fields have defaults; a tower started from `TowerConfig::default()`
/// runs with two readers per room and a disabled record cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TowerConfig {
    /// Number of rooms (shards) per tower
    /// Default: number of CPU cores
    pub num_rooms: usize,

    /// Physical log readers per room. With 1, subscription rewinds are
    /// unavoidable and accepted.
    /// Default: 2
    pub readers_per_room: usize,

    /// Maximum sequence numbers a subscription may lag behind the log head
    /// before it is bumped forward with a benign gap
    /// Default: 10000
    pub max_subscription_lag: u64,

    /// Record cache capacity per room, in payload bytes. 0 disables caching.
    /// Default: 0
    pub cache_size_per_room: usize,

    /// Whether records from reserved (`_`-prefixed) namespaces are cached
    /// Default: false
    pub cache_system_namespaces: bool,

    /// First log id in the routed range (inclusive)
    /// Default: 1
    pub first_log: u64,

    /// Last log id in the routed range (inclusive)
    /// Default: 100000
    pub last_log: u64,

    /// Capacity of each room's event queue
    /// Default: 1024
    pub room_queue_size: usize,

    /// Cost heuristic for opening a log on an idle reader. A reader already
    /// on the log within this many seqnos of the subscription wins over
    /// opening a fresh reader.
    /// Default: 1000
    pub subscription_cost_start: u64,
}

impl Default for TowerConfig {
    fn default() -> Self {
        Self {
            num_rooms: num_cpus(),
            readers_per_room: 2,
            max_subscription_lag: 10_000,
            cache_size_per_room: 0,
            cache_system_namespaces: false,
            first_log: 1,
            last_log: 100_000,
            room_queue_size: 1024,
            subscription_cost_start: 1000,
        }
    }
}

impl TowerConfig {
    /// Validate field ranges and cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.num_rooms == 0 {
            return Err(ConfigError::invalid("num_rooms", "must be at least 1"));
        }
        if self.readers_per_room == 0 {
            return Err(ConfigError::invalid(
                "readers_per_room",
                "must be at least 1",
            ));
        }
        if self.first_log > self.last_log {
            return Err(ConfigError::invalid(
                "first_log",
                format!("first_log {} > last_log {}", self.first_log, self.last_log),
            ));
        }
        if self.room_queue_size == 0 {
            return Err(ConfigError::invalid(
                "room_queue_size",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Get the number of available CPUs, defaulting to 4 if detection fails
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
