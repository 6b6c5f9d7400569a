use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, provider::Provider};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub generation: GenerationConfig,
    pub chunking: ChunkingConfig,
    pub assembly: AssemblyConfig,
    pub scripts: ScriptsConfig,
    pub pipeline: ConcurrencyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub provider: Provider,
    /// Overrides the provider's default model.
    pub model: Option<String>,
    /// Overrides the provider's default endpoint.
    pub api_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub chunk_max_tokens: u32,
    pub script_max_tokens: u32,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_words_per_chunk: usize,
    pub auto_chunk_threshold_words: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Relative deviation from an explicit slide target that triggers a warning.
    pub slide_count_tolerance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScriptsConfig {
    pub group_size: usize,
    pub auto_chunk_threshold_slides: usize,
    /// Relative drift of the summed durations that triggers a warning.
    pub duration_tolerance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub max_in_flight: usize,
    pub overall_timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            api_url: None,
            temperature: 0.7,
            max_tokens: 3000,
            chunk_max_tokens: 2000,
            script_max_tokens: 4000,
            request_timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_words_per_chunk: 1500,
            auto_chunk_threshold_words: 3500,
        }
    }
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            slide_count_tolerance: 0.20,
        }
    }
}

impl Default for ScriptsConfig {
    fn default() -> Self {
        Self {
            group_size: 8,
            auto_chunk_threshold_slides: 15,
            duration_tolerance: 0.05,
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 3,
            overall_timeout_secs: 300,
        }
    }
}

impl GenerationConfig {
    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.config().model.to_string())
    }

    pub fn api_url(&self) -> String {
        self.api_url
            .clone()
            .unwrap_or_else(|| self.provider.config().api_url.to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

impl ConcurrencyConfig {
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_secs)
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("slidewright")
        .join("config.toml")
}

impl PipelineConfig {
    /// Load configuration from a TOML file. Missing fields use defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PipelineConfig = toml::from_str(&contents).map_err(|source| {
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`PipelineConfig::load`], but a missing file yields defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// - SLIDEWRIGHT_PROVIDER → generation.provider
    /// - SLIDEWRIGHT_MODEL → generation.model
    /// - SLIDEWRIGHT_MAX_IN_FLIGHT → pipeline.max_in_flight
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(provider) = std::env::var("SLIDEWRIGHT_PROVIDER") {
            if !provider.is_empty() {
                self.generation.provider =
                    provider
                        .parse()
                        .map_err(|message| ConfigError::InvalidValue {
                            key: "SLIDEWRIGHT_PROVIDER".to_string(),
                            message,
                        })?;
            }
        }
        if let Ok(model) = std::env::var("SLIDEWRIGHT_MODEL") {
            if !model.is_empty() {
                self.generation.model = Some(model);
            }
        }
        if let Ok(max) = std::env::var("SLIDEWRIGHT_MAX_IN_FLIGHT") {
            self.pipeline.max_in_flight =
                max.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "SLIDEWRIGHT_MAX_IN_FLIGHT".to_string(),
                    message: format!("expected a positive integer, got '{max}'"),
                })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };

        if self.chunking.max_words_per_chunk == 0 {
            return invalid("chunking.max_words_per_chunk", "must be greater than 0");
        }
        if self.scripts.group_size == 0 {
            return invalid("scripts.group_size", "must be greater than 0");
        }
        if self.pipeline.max_in_flight == 0 {
            return invalid("pipeline.max_in_flight", "must be greater than 0");
        }
        if self.pipeline.overall_timeout_secs == 0 {
            return invalid("pipeline.overall_timeout_secs", "must be greater than 0");
        }
        if !(self.assembly.slide_count_tolerance > 0.0
            && self.assembly.slide_count_tolerance <= 1.0)
        {
            return invalid("assembly.slide_count_tolerance", "must be in (0, 1]");
        }
        if !(self.scripts.duration_tolerance > 0.0 && self.scripts.duration_tolerance <= 1.0) {
            return invalid("scripts.duration_tolerance", "must be in (0, 1]");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.generation.provider, Provider::Groq);
        assert_eq!(config.generation.model(), "llama-3.1-8b-instant");
        assert_eq!(config.scripts.group_size, 8);
        assert_eq!(config.assembly.slide_count_tolerance, 0.20);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [generation]
            provider = "openai"
            model = "gpt-4o-mini"

            [pipeline]
            max_in_flight = 6
            "#,
        )
        .unwrap();

        assert_eq!(config.generation.provider, Provider::Openai);
        assert_eq!(config.generation.model(), "gpt-4o-mini");
        assert_eq!(
            config.generation.api_url(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(config.pipeline.max_in_flight, 6);
        assert_eq!(config.chunking.max_words_per_chunk, 1500);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[chunking\nmax_words_per_chunk = ").unwrap();
        let err = PipelineConfig::load_or_default(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn zero_budgets_are_rejected() {
        let mut config = PipelineConfig::default();
        config.scripts.group_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut config = PipelineConfig::default();
        config.assembly.slide_count_tolerance = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn backoff_grows_linearly() {
        let generation = GenerationConfig::default();
        assert_eq!(generation.retry_backoff(1), Duration::from_millis(500));
        assert_eq!(generation.retry_backoff(3), Duration::from_millis(1500));
    }
}
