//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (expand ${VAR} from the environment, parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared by reference with every component factory
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AccessLogConfig, GatewayConfig, ListenerConfig, LoggerConfig, ReporterKind,
    RuntimeStatsConfig, ServerConfig, StatsConfig, TimeoutOverride, TimeoutsConfig,
};
pub use validation::{validate_config, ValidationError};
