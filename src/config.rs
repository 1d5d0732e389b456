use crate::error::AppError;
use serde::Deserialize;
use std::time::Duration;

const ENV_PREFIX: &str = "SCAN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub max_edge_px: u32,
    pub jpeg_quality: u8,
    pub preprocess_timeout_ms: u64,
    pub identify_timeout_ms: u64,
    pub enrich_timeout_ms: u64,
    pub market_timeout_ms: u64,
    pub watchdog_ms: u64,
    pub update_buffer_size: usize,
    pub default_condition: String,
    pub platform: String,
    pub log_level: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            max_edge_px: 1024,
            jpeg_quality: 70,
            preprocess_timeout_ms: 3_000,
            identify_timeout_ms: 12_000,
            enrich_timeout_ms: 25_000,
            market_timeout_ms: 20_000,
            watchdog_ms: 15_000,
            update_buffer_size: 64,
            default_condition: "Used".to_string(),
            platform: "ebay".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Configuration {
    /// Layers an optional config file and `SCAN_*` environment variables over the defaults.
    pub fn load(path: Option<&str>) -> Result<Self, AppError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let configuration: Configuration = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let timeouts = [
            ("preprocess_timeout_ms", self.preprocess_timeout_ms),
            ("identify_timeout_ms", self.identify_timeout_ms),
            ("enrich_timeout_ms", self.enrich_timeout_ms),
            ("market_timeout_ms", self.market_timeout_ms),
            ("watchdog_ms", self.watchdog_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, value)| *value == 0) {
            return Err(AppError::InvalidConfig(format!("{} must be non-zero", name)));
        }
        if self.max_edge_px == 0 {
            return Err(AppError::InvalidConfig("max_edge_px must be non-zero".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(AppError::InvalidConfig(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.update_buffer_size == 0 {
            return Err(AppError::InvalidConfig(
                "update_buffer_size must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn preprocess_timeout(&self) -> Duration {
        Duration::from_millis(self.preprocess_timeout_ms)
    }

    pub fn identify_timeout(&self) -> Duration {
        Duration::from_millis(self.identify_timeout_ms)
    }

    pub fn enrich_timeout(&self) -> Duration {
        Duration::from_millis(self.enrich_timeout_ms)
    }

    pub fn market_timeout(&self) -> Duration {
        Duration::from_millis(self.market_timeout_ms)
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_millis(self.watchdog_ms)
    }
}
