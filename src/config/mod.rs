//! Configuration module

pub mod settings;

pub use settings::{
    EngineConfig, LimitsConfig, LoggingConfig, RateLimitConfig, ResourceLocations,
    ResourcesConfig, ServerConfig, Settings, StorageConfig, TimeoutsConfig,
};
