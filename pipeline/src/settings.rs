//! Settings and profiles.
//!
//! Field names are snake_case. The PascalCase names used by
//! `appsettings.json`-style documents are accepted as aliases.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dimension::SizeSpec;
use crate::error::{PipelineError, Result};

/// Complete pipeline configuration: global settings plus the ordered
/// profile list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Global settings.
    #[serde(alias = "Settings")]
    pub settings: Settings,

    /// Profiles applied to every input file, in order.
    #[serde(alias = "Profiles")]
    pub profiles: Vec<Profile>,
}

impl Config {
    /// Create a configuration from settings and profiles.
    pub fn new(settings: Settings, profiles: Vec<Profile>) -> Self {
        Self { settings, profiles }
    }

    /// Check the configuration before the pipeline starts.
    pub fn validate(&self) -> Result<()> {
        self.settings.validate()?;

        if self.profiles.is_empty() {
            return Err(PipelineError::Config(
                "at least one profile is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for profile in &self.profiles {
            profile.validate()?;
            if !names.insert(profile.name.as_str()) {
                return Err(PipelineError::Config(format!(
                    "duplicate profile name: {}",
                    profile.name
                )));
            }
        }

        Ok(())
    }
}

/// What happens to a source file once every profile has been attempted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessedFileOption {
    /// Leave the source where it is.
    #[default]
    #[serde(alias = "None")]
    None,

    /// Remove the source.
    #[serde(alias = "Delete")]
    Delete,

    /// Move the source into the processed directory.
    #[serde(alias = "Move")]
    Move,
}

/// Global settings, fixed for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory watched for new images.
    #[serde(alias = "InputDirectory")]
    pub input_directory: PathBuf,

    /// Root of the per-profile output folders.
    #[serde(alias = "OutputDirectory")]
    pub output_directory: PathBuf,

    /// Destination for `move`.
    #[serde(default, alias = "ProcessedDirectory")]
    pub processed_directory: Option<PathBuf>,

    /// Disposition of processed sources.
    #[serde(default, alias = "ProcessedFileOption")]
    pub processed_file_option: ProcessedFileOption,

    /// Maximum number of files in the pipeline at once.
    #[serde(default = "default_max_concurrency", alias = "MaxConcurrency")]
    pub max_concurrency: usize,

    /// Interval between full re-scans of the input directory (0 = off).
    #[serde(default = "default_rescan_interval_ms", alias = "RescanIntervalMs")]
    pub rescan_interval_ms: u64,

    /// Delay between readiness probes.
    #[serde(
        default = "default_readiness_interval_ms",
        alias = "ReadinessIntervalMs"
    )]
    pub readiness_interval_ms: u64,

    /// Give up on a file that stays locked this long.
    #[serde(default = "default_readiness_timeout_ms", alias = "ReadinessTimeoutMs")]
    pub readiness_timeout_ms: u64,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_rescan_interval_ms() -> u64 {
    1_000
}

fn default_readiness_interval_ms() -> u64 {
    500
}

fn default_readiness_timeout_ms() -> u64 {
    60_000
}

impl Settings {
    /// Create settings with default values.
    pub fn new(input_directory: impl Into<PathBuf>, output_directory: impl Into<PathBuf>) -> Self {
        Self {
            input_directory: input_directory.into(),
            output_directory: output_directory.into(),
            processed_directory: None,
            processed_file_option: ProcessedFileOption::None,
            max_concurrency: default_max_concurrency(),
            rescan_interval_ms: default_rescan_interval_ms(),
            readiness_interval_ms: default_readiness_interval_ms(),
            readiness_timeout_ms: default_readiness_timeout_ms(),
        }
    }

    /// Delete sources after processing.
    pub fn delete_processed(mut self) -> Self {
        self.processed_file_option = ProcessedFileOption::Delete;
        self
    }

    /// Move sources into `directory` after processing.
    pub fn move_processed(mut self, directory: impl Into<PathBuf>) -> Self {
        self.processed_file_option = ProcessedFileOption::Move;
        self.processed_directory = Some(directory.into());
        self
    }

    /// Set the concurrency bound.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the re-scan interval.
    pub fn with_rescan_interval(mut self, interval: Duration) -> Self {
        self.rescan_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the readiness probe timing.
    pub fn with_readiness(mut self, interval: Duration, timeout: Duration) -> Self {
        self.readiness_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.readiness_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Re-scan interval, or `None` when disabled.
    pub fn rescan_interval(&self) -> Option<Duration> {
        (self.rescan_interval_ms > 0).then(|| Duration::from_millis(self.rescan_interval_ms))
    }

    /// Delay between readiness probes.
    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_interval_ms)
    }

    /// Readiness give-up threshold.
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.input_directory.as_os_str().is_empty() {
            return Err(PipelineError::Config(
                "input_directory is required".to_string(),
            ));
        }

        if self.output_directory.as_os_str().is_empty() {
            return Err(PipelineError::Config(
                "output_directory is required".to_string(),
            ));
        }

        if self.max_concurrency == 0 {
            return Err(PipelineError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }

        if self.readiness_interval_ms == 0 {
            return Err(PipelineError::Config(
                "readiness_interval_ms must be positive".to_string(),
            ));
        }

        let has_processed_dir = self
            .processed_directory
            .as_ref()
            .is_some_and(|dir| !dir.as_os_str().is_empty());
        if self.processed_file_option == ProcessedFileOption::Move && !has_processed_dir {
            return Err(PipelineError::Config(
                "processed_directory is required when processed_file_option is move".to_string(),
            ));
        }

        Ok(())
    }
}

/// A named set of transforms producing one output per input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawProfile")]
pub struct Profile {
    /// Unique name; also the output subfolder and filename suffix.
    pub name: String,

    /// Border fill as `#RRGGBB` or `#RRGGBBAA`; white when unset.
    pub border_colour: Option<String>,

    /// Border width spec, resolved against the resized width.
    pub border: SizeSpec,

    /// JPEG quality, 0-100. Ignored for lossless formats.
    pub quality: u8,

    /// Bounding width spec, resolved against the source width.
    pub resize_width: Option<SizeSpec>,

    /// Bounding height spec, resolved against the source height.
    pub resize_height: Option<SizeSpec>,
}

/// Profile as written in configuration, including the legacy
/// `ResizeWidthPercentage`/`ResizeHeightPercentage` keys. A percentage
/// key overrides the matching pixel spec.
#[derive(Deserialize)]
struct RawProfile {
    #[serde(alias = "Name")]
    name: String,

    #[serde(default, alias = "BorderColour", alias = "border_color")]
    border_colour: Option<String>,

    #[serde(
        default,
        alias = "BorderSpec",
        alias = "BorderWidth",
        alias = "border_width"
    )]
    border: SizeSpec,

    #[serde(default = "default_quality", alias = "Quality")]
    quality: u8,

    #[serde(default, alias = "ResizeWidthSpec", alias = "ResizeWidth")]
    resize_width: Option<SizeSpec>,

    #[serde(default, alias = "ResizeHeightSpec", alias = "ResizeHeight")]
    resize_height: Option<SizeSpec>,

    #[serde(default, alias = "ResizeWidthPercentage")]
    resize_width_percentage: Option<i64>,

    #[serde(default, alias = "ResizeHeightPercentage")]
    resize_height_percentage: Option<i64>,
}

impl From<RawProfile> for Profile {
    fn from(raw: RawProfile) -> Self {
        let percent = |value: i64| SizeSpec::from(format!("{value}%"));
        Self {
            name: raw.name,
            border_colour: raw.border_colour,
            border: raw.border,
            quality: raw.quality,
            resize_width: raw.resize_width_percentage.map(percent).or(raw.resize_width),
            resize_height: raw
                .resize_height_percentage
                .map(percent)
                .or(raw.resize_height),
        }
    }
}

fn default_quality() -> u8 {
    90
}

impl Profile {
    /// Create a profile with no border and no resize.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            border_colour: None,
            border: SizeSpec::default(),
            quality: default_quality(),
            resize_width: None,
            resize_height: None,
        }
    }

    /// Set the border spec.
    pub fn with_border(mut self, spec: impl Into<SizeSpec>) -> Self {
        self.border = spec.into();
        self
    }

    /// Set the border colour.
    pub fn with_border_colour(mut self, colour: impl Into<String>) -> Self {
        self.border_colour = Some(colour.into());
        self
    }

    /// Set the JPEG quality.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Set the bounding width spec.
    pub fn with_resize_width(mut self, spec: impl Into<SizeSpec>) -> Self {
        self.resize_width = Some(spec.into());
        self
    }

    /// Set the bounding height spec.
    pub fn with_resize_height(mut self, spec: impl Into<SizeSpec>) -> Self {
        self.resize_height = Some(spec.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::Config(
                "profile name must not be empty".to_string(),
            ));
        }

        if self.name.contains(['/', '\\']) || self.name == "." || self.name == ".." {
            return Err(PipelineError::Config(format!(
                "profile name is not a valid folder name: {}",
                self.name
            )));
        }

        if self.quality > 100 {
            return Err(PipelineError::Config(format!(
                "profile {}: quality must be between 0 and 100",
                self.name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(profiles: Vec<Profile>) -> Config {
        Config::new(Settings::new("/in", "/out"), profiles)
    }

    #[test]
    fn test_valid_config() {
        let config = config(vec![Profile::new("thumb"), Profile::new("web")]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_duplicate_profile_names() {
        let config = config(vec![Profile::new("thumb"), Profile::new("thumb")]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate profile name"));
    }

    #[test]
    fn test_rejects_missing_profiles() {
        assert!(config(Vec::new()).validate().is_err());
    }

    #[test]
    fn test_rejects_bad_profile_names() {
        assert!(config(vec![Profile::new("")]).validate().is_err());
        assert!(config(vec![Profile::new("a/b")]).validate().is_err());
        assert!(config(vec![Profile::new("..")]).validate().is_err());
    }

    #[test]
    fn test_rejects_quality_over_100() {
        let config = config(vec![Profile::new("q").with_quality(101)]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let config = Config::new(
            Settings::new("/in", "/out").with_max_concurrency(0),
            vec![Profile::new("thumb")],
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_move_requires_processed_directory() {
        let mut settings = Settings::new("/in", "/out");
        settings.processed_file_option = ProcessedFileOption::Move;
        let config = Config::new(settings, vec![Profile::new("thumb")]);
        assert!(config.validate().is_err());

        let config = Config::new(
            Settings::new("/in", "/out").move_processed("/done"),
            vec![Profile::new("thumb")],
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rescan_interval_zero_disables() {
        let mut settings = Settings::new("/in", "/out");
        assert_eq!(settings.rescan_interval(), Some(Duration::from_secs(1)));

        settings.rescan_interval_ms = 0;
        assert_eq!(settings.rescan_interval(), None);
    }

    #[test]
    fn test_deserialize_appsettings_style() {
        let json = r##"{
            "Settings": {
                "InputDirectory": "/in",
                "OutputDirectory": "/out",
                "ProcessedDirectory": "/done",
                "ProcessedFileOption": "Move",
                "MaxConcurrency": 2
            },
            "Profiles": [
                {
                    "Name": "thumb",
                    "BorderColour": "#000000",
                    "BorderWidth": 10,
                    "Quality": 80,
                    "ResizeWidth": "50%",
                    "ResizeHeightPercentage": 40
                }
            ]
        }"##;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.settings.processed_file_option,
            ProcessedFileOption::Move
        );
        assert_eq!(config.settings.max_concurrency, 2);
        assert_eq!(config.settings.readiness_timeout(), Duration::from_secs(60));

        let profile = &config.profiles[0];
        assert_eq!(profile.border, SizeSpec::from("10"));
        assert_eq!(profile.resize_width, Some(SizeSpec::from("50%")));
        assert_eq!(profile.resize_height, Some(SizeSpec::from("40%")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_legacy_percentage_keys_override_pixels() {
        let json = r#"{
            "Name": "legacy",
            "BorderWidth": 4,
            "ResizeWidth": 800,
            "ResizeWidthPercentage": 25,
            "ResizeHeightPercentage": 50
        }"#;

        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.resize_width, Some(SizeSpec::from("25%")));
        assert_eq!(profile.resize_height, Some(SizeSpec::from("50%")));
        assert_eq!(profile.border, SizeSpec::from("4"));

        let profile: Profile =
            serde_json::from_str(r#"{"Name": "px", "ResizeWidth": 800}"#).unwrap();
        assert_eq!(profile.resize_width, Some(SizeSpec::from("800")));
    }

    #[test]
    fn test_profile_defaults() {
        let profile: Profile = serde_json::from_str(r#"{"name": "plain"}"#).unwrap();
        assert_eq!(profile, Profile::new("plain"));
        assert_eq!(profile.quality, 90);
    }
}
