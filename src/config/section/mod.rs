//! Configuration section definitions.
//!
//! Each module corresponds to a section in `sitekeeper.toml`:
//!
//! | Module      | TOML Section   | Purpose                                  |
//! |-------------|----------------|------------------------------------------|
//! | `watch`     | `[watch]`      | Watch roots, debounce timing, categories |
//! | `generator` | `[generator]`  | External generator command and timeouts  |
//! | `queue`     | `[queue]`      | Build history retention                  |
//! | `live`      | `[live]`       | Live status WebSocket channel            |
//! | `validate`  | `[validate]`   | Front matter schema and locales          |

mod generator;
mod live;
mod queue;
mod validate;
mod watch;

pub use generator::GeneratorConfig;
pub use live::LiveConfig;
pub use queue::QueueConfig;
pub use validate::ValidateConfig;
pub use watch::{CategoryConfig, WatchConfig};
