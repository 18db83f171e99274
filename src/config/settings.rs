//! Application settings and configuration management

use crate::error::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub resources: ResourcesConfig,
    #[serde(default = "default_allowed_styles")]
    pub allowed_styles: Vec<String>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Request validation limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_prompt_length")]
    pub max_prompt_length: usize,
    #[serde(default = "default_max_image_size_mb")]
    pub max_image_size_mb: u64,
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,
}

fn default_max_prompt_length() -> usize {
    500
}

fn default_max_image_size_mb() -> u64 {
    10
}

fn default_max_image_dimension() -> u32 {
    4096
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_prompt_length: default_max_prompt_length(),
            max_image_size_mb: default_max_image_size_mb(),
            max_image_dimension: default_max_image_dimension(),
        }
    }
}

impl LimitsConfig {
    pub fn max_image_bytes(&self) -> u64 {
        self.max_image_size_mb * 1024 * 1024
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutsConfig {
    /// Hard wall-clock bound on a unit of device work
    #[serde(default = "default_processing_timeout")]
    pub processing_secs: u64,
    #[serde(default = "default_download_timeout")]
    pub download_secs: u64,
    #[serde(default = "default_upload_timeout")]
    pub upload_secs: u64,
}

fn default_processing_timeout() -> u64 {
    240
}

fn default_download_timeout() -> u64 {
    30
}

fn default_upload_timeout() -> u64 {
    30
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            processing_secs: default_processing_timeout(),
            download_secs: default_download_timeout(),
            upload_secs: default_upload_timeout(),
        }
    }
}

/// Engine runtime configuration. The sampling parameters are fixed service
/// constants, not request-controlled, to keep quality and latency predictable.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default = "default_sidecar_url")]
    pub sidecar_url: String,
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f32,
    #[serde(default = "default_inference_steps")]
    pub inference_steps: u32,
    #[serde(default = "default_conditioning_scale")]
    pub conditioning_scale: f32,
    #[serde(default = "default_adapter_scale")]
    pub adapter_scale: f32,
    #[serde(default = "default_modifier_scale")]
    pub modifier_scale: f32,
}

fn default_sidecar_url() -> String {
    "http://127.0.0.1:9090".to_string()
}

fn default_guidance_scale() -> f32 {
    5.0
}

fn default_inference_steps() -> u32 {
    15
}

fn default_conditioning_scale() -> f32 {
    0.8
}

fn default_adapter_scale() -> f32 {
    0.8
}

fn default_modifier_scale() -> f32 {
    0.8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sidecar_url: default_sidecar_url(),
            guidance_scale: default_guidance_scale(),
            inference_steps: default_inference_steps(),
            conditioning_scale: default_conditioning_scale(),
            adapter_scale: default_adapter_scale(),
            modifier_scale: default_modifier_scale(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,
    #[serde(default = "default_burst")]
    pub burst_size: u32,
}

fn default_true() -> bool {
    true
}

fn default_rpm() -> u32 {
    10
}

fn default_burst() -> u32 {
    5
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: default_rpm(),
            burst_size: default_burst(),
        }
    }
}

/// Object storage and local scratch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: String,
    /// Base URL of the object store the results are uploaded to
    #[serde(default = "default_output_base_url")]
    pub output_base_url: String,
    /// Object key prefix for generated images
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,
    /// Hosts the input image URL may point at
    #[serde(default = "default_allowed_hosts")]
    pub allowed_image_hosts: Vec<String>,
}

fn default_tmp_dir() -> String {
    "/tmp/stylize".to_string()
}

fn default_output_base_url() -> String {
    "http://127.0.0.1:9000/stylize-images".to_string()
}

fn default_output_prefix() -> String {
    "generated".to_string()
}

fn default_allowed_hosts() -> Vec<String> {
    vec![
        "storage.googleapis.com".to_string(),
        "storage.cloud.google.com".to_string(),
    ]
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            tmp_dir: default_tmp_dir(),
            output_base_url: default_output_base_url(),
            output_prefix: default_output_prefix(),
            allowed_image_hosts: default_allowed_hosts(),
        }
    }
}

/// Candidate weight locations for one loadable unit, in preference order
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResourceLocations {
    pub locations: Vec<String>,
}

/// Weight artifact location tables, loaded once at startup and never mutated
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourcesConfig {
    /// Fast local cache directory; always the first candidate
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_engine_locations")]
    pub engines: HashMap<String, ResourceLocations>,
    #[serde(default = "default_modifier_locations")]
    pub modifiers: HashMap<String, ResourceLocations>,
}

fn default_cache_dir() -> String {
    "/tmp/stylize/weights".to_string()
}

fn default_engine_locations() -> HashMap<String, ResourceLocations> {
    let mut engines = HashMap::new();
    engines.insert(
        "primary_identity".to_string(),
        ResourceLocations {
            locations: vec![
                "/gcs/models/primary-identity".to_string(),
                "https://registry.example.com/engines/primary-identity.safetensors".to_string(),
            ],
        },
    );
    engines.insert(
        "generic_adapter".to_string(),
        ResourceLocations {
            locations: vec![
                "/gcs/models/generic-adapter".to_string(),
                "https://registry.example.com/engines/generic-adapter.safetensors".to_string(),
            ],
        },
    );
    engines
}

fn default_modifier_locations() -> HashMap<String, ResourceLocations> {
    let mut modifiers = HashMap::new();
    for style in ["anime", "cartoon", "pixar"] {
        modifiers.insert(
            style.to_string(),
            ResourceLocations {
                locations: vec![
                    format!("/gcs/models/style_modifiers/{style}"),
                    format!("https://registry.example.com/modifiers/{style}.safetensors"),
                ],
            },
        );
    }
    modifiers
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            engines: default_engine_locations(),
            modifiers: default_modifier_locations(),
        }
    }
}

fn default_allowed_styles() -> Vec<String> {
    [
        "natural",
        "anime",
        "cartoon",
        "bollywood",
        "cinematic",
        "vintage",
        "glamour",
        "corporate",
        "artistic",
        "pixar",
        "yearbook",
        "kpop",
        "y2k",
        "mermaid",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Settings {
    /// Load settings from configuration files and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/default.toml")
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(
                File::with_name(path.as_ref().to_str().unwrap_or("config/default")).required(false),
            )
            // Override with environment variables (prefixed with STYLIZE__)
            .add_source(
                Environment::with_prefix("STYLIZE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "Server port cannot be 0".to_string(),
            )));
        }

        if self.limits.max_prompt_length == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "max_prompt_length cannot be 0".to_string(),
            )));
        }

        if self.timeouts.processing_secs == 0 {
            return Err(AppError::Config(config::ConfigError::Message(
                "processing timeout cannot be 0".to_string(),
            )));
        }

        if self.allowed_styles.is_empty() {
            return Err(AppError::Config(config::ConfigError::Message(
                "allowed_styles cannot be empty".to_string(),
            )));
        }

        for (name, locs) in self.resources.engines.iter() {
            if locs.locations.is_empty() {
                return Err(AppError::Config(config::ConfigError::Message(format!(
                    "Engine '{}' must have at least one candidate location",
                    name
                ))));
            }
        }

        // A modifier for a style outside the allowed set can never be reached
        for style in self.resources.modifiers.keys() {
            if !self.allowed_styles.iter().any(|s| s == style) {
                return Err(AppError::Config(config::ConfigError::Message(format!(
                    "Modifier configured for unknown style '{}'",
                    style
                ))));
            }
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            limits: LimitsConfig::default(),
            timeouts: TimeoutsConfig::default(),
            engine: EngineConfig::default(),
            rate_limit: RateLimitConfig::default(),
            storage: StorageConfig::default(),
            resources: ResourcesConfig::default(),
            allowed_styles: default_allowed_styles(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.limits.max_prompt_length, 500);
        assert_eq!(settings.timeouts.processing_secs, 240);
        assert!(settings.allowed_styles.iter().any(|s| s == "natural"));
        settings.validate().unwrap();
    }

    #[test]
    fn test_default_modifier_table() {
        let settings = Settings::default();
        assert!(settings.resources.modifiers.contains_key("anime"));
        assert!(settings.resources.modifiers.contains_key("cartoon"));
        // Prompt-only styles carry no modifier entry
        assert!(!settings.resources.modifiers.contains_key("natural"));
    }

    #[test]
    fn test_validate_rejects_unknown_modifier_style() {
        let mut settings = Settings::default();
        settings.resources.modifiers.insert(
            "oilpaint".to_string(),
            ResourceLocations {
                locations: vec!["/nowhere".to_string()],
            },
        );
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_max_image_bytes() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.max_image_bytes(), 10 * 1024 * 1024);
    }
}
