//! `[queue]` section configuration.
//!
//! ```toml
//! [queue]
//! history_capacity = 50       # Build records kept for status and metrics
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of finished build records retained (oldest evicted first).
    pub history_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            history_capacity: 50,
        }
    }
}
