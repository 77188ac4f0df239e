//! # Settings
//!
//! Runtime configuration, loaded once at startup from TOML. Every section is
//! optional; missing sections and fields fall back to the canonical values in
//! [`sightline_shared::constants`].
//!
//! ```toml
//! [cache]
//! refresh_interval_ms = 100
//!
//! [visibility]
//! memo_ttl_ms = 100
//!
//! [root]
//! base = 0x7ff6_0000_0000
//! hops = [0x5f0_1a8, 0x1c0]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sightline_shared::constants::{
    ENTITY_MEMO_CLEAR_THRESHOLD, GEOMETRY_REBUILD_INTERVAL, GRAZING_TOLERANCE,
    LARGE_PART_VOLUME, MAX_OCCLUDER_TRANSPARENCY, MAX_OCCLUDER_VOLUME, MEMO_STALE_AFTER,
    MEMO_SWEEP_THRESHOLD, MEMO_TTL, MIN_OCCLUDER_VOLUME, MIN_REFRESH_INTERVAL,
    REQUIRED_CLEAR_RAYS, SAMPLE_POINTS, SMALL_PART_VOLUME,
};

use crate::error::{ConfigError, ConfigResult};
use crate::layout::{GraphLayout, SchemaNames};
use crate::root::PointerChain;

/// Top-level settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Field offsets.
    pub layout: GraphLayout,
    /// Structural names and type tags.
    pub schema: SchemaNames,
    /// Pointer chain locating the scene root, if known.
    pub root: Option<PointerChain>,
    /// Entity snapshot cache.
    pub cache: CacheSettings,
    /// Occlusion model rebuild filters.
    pub occlusion: OcclusionSettings,
    /// Visibility engine and memo.
    pub visibility: VisibilitySettings,
    /// Scene monitor cadence.
    pub monitor: MonitorSettings,
}

impl Settings {
    /// Parses and validates settings from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] when a value violates a constraint.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads and validates settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise
    /// the errors of [`Settings::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.layout.child_stride == 0 {
            return Err(ConfigError::Invalid("layout.child_stride must be non-zero".into()));
        }
        if self.schema.modern_anchors.is_empty() {
            return Err(ConfigError::Invalid(
                "schema.modern_anchors must name at least one part".into(),
            ));
        }
        if self.schema.geometry_classes.is_empty() {
            return Err(ConfigError::Invalid(
                "schema.geometry_classes must name at least one class".into(),
            ));
        }
        if self.occlusion.min_volume >= self.occlusion.max_volume {
            return Err(ConfigError::Invalid(format!(
                "occlusion.min_volume ({}) must be below occlusion.max_volume ({})",
                self.occlusion.min_volume, self.occlusion.max_volume
            )));
        }
        if self.visibility.memo_ttl_ms > self.visibility.memo_stale_after_ms {
            return Err(ConfigError::Invalid(format!(
                "visibility.memo_ttl_ms ({}) exceeds visibility.memo_stale_after_ms ({})",
                self.visibility.memo_ttl_ms, self.visibility.memo_stale_after_ms
            )));
        }
        if self.visibility.required_clear_rays == 0
            || self.visibility.required_clear_rays > SAMPLE_POINTS
        {
            return Err(ConfigError::Invalid(format!(
                "visibility.required_clear_rays must be within 1..={SAMPLE_POINTS}"
            )));
        }
        Ok(())
    }
}

/// Entity snapshot cache settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Minimum time between refreshes (ms).
    pub refresh_interval_ms: u64,
    /// Container population above which the identity memo is discarded.
    pub memo_clear_threshold: usize,
}

impl CacheSettings {
    /// Minimum time between refreshes.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            refresh_interval_ms: duration_ms(MIN_REFRESH_INTERVAL),
            memo_clear_threshold: ENTITY_MEMO_CLEAR_THRESHOLD,
        }
    }
}

/// Filters applied while rebuilding the occlusion model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcclusionSettings {
    /// Parts more transparent than this are skipped.
    pub max_transparency: f32,
    /// Parts below this volume are skipped.
    pub min_volume: f32,
    /// Parts above this volume are skipped.
    pub max_volume: f32,
    /// Parts above this volume are flagged large.
    pub large_volume: f32,
}

impl Default for OcclusionSettings {
    fn default() -> Self {
        Self {
            max_transparency: MAX_OCCLUDER_TRANSPARENCY,
            min_volume: MIN_OCCLUDER_VOLUME,
            max_volume: MAX_OCCLUDER_VOLUME,
            large_volume: LARGE_PART_VOLUME,
        }
    }
}

/// Visibility engine settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilitySettings {
    /// Age below which a memoized result is trusted (ms).
    pub memo_ttl_ms: u64,
    /// Age above which a memo entry is swept (ms).
    pub memo_stale_after_ms: u64,
    /// Memo size above which a sweep runs.
    pub memo_sweep_threshold: usize,
    /// Hits within this distance of the target are ignored.
    pub grazing_tolerance: f32,
    /// Non-large parts below this volume are skipped by the ray pre-filter.
    pub small_part_volume: f32,
    /// Clear rays needed to call a target visible.
    pub required_clear_rays: usize,
}

impl VisibilitySettings {
    /// Memo trust window.
    #[must_use]
    pub fn memo_ttl(&self) -> Duration {
        Duration::from_millis(self.memo_ttl_ms)
    }

    /// Memo sweep age.
    #[must_use]
    pub fn memo_stale_after(&self) -> Duration {
        Duration::from_millis(self.memo_stale_after_ms)
    }
}

impl Default for VisibilitySettings {
    fn default() -> Self {
        Self {
            memo_ttl_ms: duration_ms(MEMO_TTL),
            memo_stale_after_ms: duration_ms(MEMO_STALE_AFTER),
            memo_sweep_threshold: MEMO_SWEEP_THRESHOLD,
            grazing_tolerance: GRAZING_TOLERANCE,
            small_part_volume: SMALL_PART_VOLUME,
            required_clear_rays: REQUIRED_CLEAR_RAYS,
        }
    }
}

/// Scene monitor cadence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Time between geometry rebuilds (ms).
    pub rebuild_interval_ms: u64,
}

impl MonitorSettings {
    /// Time between geometry rebuilds.
    #[must_use]
    pub fn rebuild_interval(&self) -> Duration {
        Duration::from_millis(self.rebuild_interval_ms)
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            rebuild_interval_ms: duration_ms(GEOMETRY_REBUILD_INTERVAL),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.cache.refresh_interval(), Duration::from_millis(100));
        assert_eq!(settings.visibility.memo_ttl(), Duration::from_millis(100));
        assert_eq!(settings.visibility.memo_stale_after(), Duration::from_millis(1000));
        assert_eq!(settings.monitor.rebuild_interval(), Duration::from_secs(5));
        assert!(settings.root.is_none());
    }

    #[test]
    fn test_partial_sections_override() {
        let text = r#"
            [cache]
            refresh_interval_ms = 250

            [schema]
            head = "Skull"

            [schema.modern_parts]
            left_foot = "FootL"

            [root]
            base = 0x140000000
            hops = [0x10, 0x20]
        "#;
        let settings = Settings::from_toml_str(text).unwrap();
        assert_eq!(settings.cache.refresh_interval_ms, 250);
        assert_eq!(settings.cache.memo_clear_threshold, 50);
        assert_eq!(settings.schema.head, "Skull");
        assert_eq!(settings.schema.classic_anchor, "Torso");
        assert_eq!(settings.schema.modern_parts.left_foot, "FootL");
        assert_eq!(settings.schema.modern_parts.right_foot, "RightFoot");
        assert_eq!(settings.schema.classic_parts.left_arm, "Left Arm");
        let root = settings.root.unwrap();
        assert_eq!(root.base, 0x1_4000_0000);
        assert_eq!(root.hops, vec![0x10, 0x20]);
    }

    #[test]
    fn test_zero_stride_rejected() {
        let err = Settings::from_toml_str("[layout]\nchild_stride = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_inverted_memo_ages_rejected() {
        let text = "[visibility]\nmemo_ttl_ms = 2000\nmemo_stale_after_ms = 1000";
        assert!(matches!(
            Settings::from_toml_str(text),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        assert!(matches!(
            Settings::from_toml_str("[cache"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let path = std::env::temp_dir().join("sightline_missing_settings_file.toml");
        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("sightline_missing_settings_file"));
    }
}
