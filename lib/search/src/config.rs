// Engine configuration; every tuned constant lives here
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use panelx_core::{Error, Result, SearchMode};
use panelx_router::RouterConfig;

use crate::source::Source;
use crate::threshold::{default_bands, validate_bands, ThresholdBand};

/// Base weight of each source before normalization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceWeights {
    pub structured: f32,
    pub free_text: f32,
    pub poll: f32,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            structured: 1.5,
            free_text: 1.0,
            poll: 1.2,
        }
    }
}

impl SourceWeights {
    pub fn get(&self, source: Source) -> f32 {
        match source {
            Source::Structured => self.structured,
            Source::FreeText => self.free_text,
            Source::Poll => self.poll,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub router: RouterConfig,
    /// Minimum similarity for hits in the free-text answers index
    pub free_text_threshold: f32,
    /// Minimum similarity for hits in the survey-poll index
    pub poll_threshold: f32,
    /// Maximum hits requested per vector search
    pub semantic_top_k: usize,
    /// Candidates at or above this similarity to an excluded intent are removed
    pub negative_threshold: f32,
    pub threshold_bands: Vec<ThresholdBand>,
    pub weights: SourceWeights,
    /// Upper bound on each concurrent sub-search
    pub task_timeout_ms: u64,
    /// Cap on concurrently running sub-searches
    pub max_workers: usize,
    /// Mode applied to classifier output that names none
    pub default_mode: SearchMode,
    /// Year used for age arithmetic; the current year when unset
    pub reference_year: Option<i32>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            free_text_threshold: 0.38,
            poll_threshold: 0.35,
            semantic_top_k: 1000,
            negative_threshold: 0.55,
            threshold_bands: default_bands(),
            weights: SourceWeights::default(),
            task_timeout_ms: 20_000,
            max_workers: 3,
            default_mode: SearchMode::Weighted,
            reference_year: None,
        }
    }
}

impl SearchConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: SearchConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f32| {
            if v.is_finite() && (-1.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(Error::InvalidConfig(format!("{name} must be a similarity in [-1, 1], got {v}")))
            }
        };
        unit("router.threshold", self.router.threshold)?;
        unit("free_text_threshold", self.free_text_threshold)?;
        unit("poll_threshold", self.poll_threshold)?;
        unit("negative_threshold", self.negative_threshold)?;

        if self.semantic_top_k == 0 {
            return Err(Error::InvalidConfig("semantic_top_k must be positive".into()));
        }
        if self.max_workers == 0 {
            return Err(Error::InvalidConfig("max_workers must be positive".into()));
        }
        if self.task_timeout_ms == 0 {
            return Err(Error::InvalidConfig("task_timeout_ms must be positive".into()));
        }
        for source in Source::ALL {
            let w = self.weights.get(source);
            if !w.is_finite() || w < 0.0 {
                return Err(Error::InvalidConfig(format!("weight of {source} must be non-negative")));
            }
        }
        validate_bands(&self.threshold_bands).map_err(Error::InvalidConfig)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn score_threshold(&self, source: Source) -> f32 {
        match source {
            Source::Poll => self.poll_threshold,
            _ => self.free_text_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = SearchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.router.threshold, 0.4);
        assert_eq!(config.negative_threshold, 0.55);
        assert_eq!(config.task_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"negative_threshold": 0.6, "router": {{"threshold": 0.5}}}}"#).unwrap();
        let config = SearchConfig::from_path(file.path()).unwrap();
        assert_eq!(config.negative_threshold, 0.6);
        assert_eq!(config.router.threshold, 0.5);
        assert_eq!(config.router.memo_capacity, 1024);
        assert_eq!(config.semantic_top_k, 1000);
        assert_eq!(config.default_mode, SearchMode::Weighted);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SearchConfig::default();
        config.max_workers = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = SearchConfig::default();
        config.weights.poll = -1.0;
        assert!(config.validate().is_err());

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(SearchConfig::from_path(file.path()).is_err());
    }
}
