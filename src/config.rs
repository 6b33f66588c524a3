//! Export configuration – JSON-loadable, every field defaulted.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};
use crate::native::{Readiness, DEFAULT_POLL_INTERVAL, DEFAULT_READINESS_TIMEOUT};
use crate::raster::{CaptureStyle, RasterOptions, CAPTURE_PADDING_PX, RASTER_SCALE};
use crate::strategy::StrategyKind;

/// Extra time the browser may sit idle beyond the readiness timeout.
const IDLE_GRACE: Duration = Duration::from_secs(10);

/// Browser engine launch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromeConfig {
    /// Chrome/Chromium binary; `None` lets the launcher search for one.
    pub executable: Option<PathBuf>,
    pub args: Vec<String>,
    pub headless: bool,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            executable: None,
            args: [
                "--no-sandbox",
                "--disable-dev-shm-usage",
                "--disable-setuid-sandbox",
                "--disable-gpu",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            headless: true,
        }
    }
}

/// Bounds on the export request endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_markdown_bytes: usize,
    /// Each export provisions a whole engine process.
    pub max_concurrent_exports: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_markdown_bytes: 1024 * 1024, max_concurrent_exports: 2 }
    }
}

/// Raster capture settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    pub scale: f64,
    pub padding_px: u32,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self { scale: RASTER_SCALE, padding_px: CAPTURE_PADDING_PX }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub strategy: StrategyKind,
    pub chrome: ChromeConfig,
    pub readiness_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub limits: Limits,
    pub raster: RasterConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            chrome: ChromeConfig::default(),
            readiness_timeout_ms: DEFAULT_READINESS_TIMEOUT.as_millis() as u64,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            limits: Limits::default(),
            raster: RasterConfig::default(),
        }
    }
}

impl ExportConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| RenderError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| RenderError::Config(format!("reading '{}': {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.readiness_timeout_ms == 0 {
            return Err(RenderError::Config("readiness_timeout_ms must be > 0".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(RenderError::Config("poll_interval_ms must be > 0".to_string()));
        }
        if self.limits.max_concurrent_exports == 0 {
            return Err(RenderError::Config("max_concurrent_exports must be > 0".to_string()));
        }
        if !(self.raster.scale > 0.0 && self.raster.scale <= 4.0) {
            return Err(RenderError::Config(format!(
                "raster scale must be in (0, 4], got {}",
                self.raster.scale
            )));
        }
        Ok(())
    }

    pub fn readiness(&self) -> Readiness {
        Readiness {
            timeout: Duration::from_millis(self.readiness_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    /// How long a launched browser may stay idle before closing itself.
    pub fn idle_timeout(&self) -> Duration {
        self.readiness().timeout + IDLE_GRACE
    }

    pub fn raster_options(&self) -> RasterOptions {
        RasterOptions {
            scale: self.raster.scale,
            style: CaptureStyle { padding_px: self.raster.padding_px, ..CaptureStyle::default() },
            ..RasterOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_flags() {
        let cfg = ExportConfig::default();
        assert!(cfg.chrome.args.iter().any(|a| a == "--no-sandbox"));
        assert_eq!(cfg.readiness().timeout, Duration::from_secs(30));
        assert_eq!(cfg.raster.scale, 0.75);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = ExportConfig::from_json(r#"{ "strategy": "raster-slice", "limits": { "max_concurrent_exports": 5 } }"#)
            .unwrap();
        assert_eq!(cfg.strategy, StrategyKind::RasterSlice);
        assert_eq!(cfg.limits.max_concurrent_exports, 5);
        assert_eq!(cfg.limits.max_markdown_bytes, 1024 * 1024);
        assert!(cfg.chrome.headless);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(ExportConfig::from_json(r#"{ "readiness_timeout_ms": 0 }"#).is_err());
        assert!(ExportConfig::from_json(r#"{ "raster": { "scale": -1.0 } }"#).is_err());
        assert!(ExportConfig::from_json("not json").is_err());
    }

    #[test]
    fn json_roundtrip() {
        let cfg = ExportConfig::default();
        assert_eq!(ExportConfig::from_json(&cfg.to_json()).unwrap(), cfg);
    }
}
