//! Post-processing options with TOML preset support.
//!
//! All tweakable effect settings are consolidated here. Options serialize
//! to/from TOML so presets can live next to the application's assets.

mod post_processing;

use std::path::Path;

pub use post_processing::{
    BloomOptions, FxaaOptions, PostProcessingOptions, SsaoOptions,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::PostFxError;

/// Top-level options container. All sub-structs use `#[serde(default)]` so
/// partial TOML files (e.g. only overriding `[post_processing.bloom]`) work
/// correctly.
#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema,
)]
#[serde(default)]
pub struct Options {
    /// Post-processing effect parameters.
    pub post_processing: PostProcessingOptions,
}

impl Options {
    /// Generate JSON Schema describing the exposed options.
    #[must_use]
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(Options)
    }

    /// Load options from a TOML file. Missing fields use defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PostFxError::Io`] if the file cannot be read and
    /// [`PostFxError::OptionsParse`] if it is not valid options TOML.
    pub fn load(path: &Path) -> Result<Self, PostFxError> {
        let content = std::fs::read_to_string(path).map_err(PostFxError::Io)?;
        toml::from_str(&content)
            .map_err(|e| PostFxError::OptionsParse(e.to_string()))
    }

    /// Save options to a TOML file (pretty-printed).
    ///
    /// # Errors
    ///
    /// Returns [`PostFxError::OptionsParse`] if serialization fails and
    /// [`PostFxError::Io`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), PostFxError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PostFxError::OptionsParse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(PostFxError::Io)?;
        }
        std::fs::write(path, content).map_err(PostFxError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let opts = Options::default();
        let toml_str = toml::to_string_pretty(&opts).unwrap();
        let parsed: Options = toml::from_str(&toml_str).unwrap();
        assert_eq!(opts, parsed);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r"
[post_processing.bloom]
intensity = 0.35
use_kawase_blur = true
";
        let opts: Options = toml::from_str(toml_str).unwrap();
        let bloom = &opts.post_processing.bloom;
        assert_eq!(bloom.intensity, 0.35);
        assert!(bloom.use_kawase_blur);
        // Everything else should be default
        assert_eq!(bloom.threshold, 4.0);
        assert_eq!(bloom.blur_iterations, 4);
        assert_eq!(opts.post_processing.ssao.sample_amount, 64);
        assert!(opts.post_processing.fxaa.enabled);
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir()
            .join(format!("postfx-options-{}", std::process::id()));
        let path = dir.join("preset.toml");
        let mut opts = Options::default();
        opts.post_processing.bloom.half_resolution = true;
        opts.post_processing.ssao.sample_radius = 1.5;
        opts.save(&path).unwrap();
        let loaded = Options::load(&path).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
        assert_eq!(loaded, opts);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let dir = std::env::temp_dir()
            .join(format!("postfx-bad-options-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "[post_processing.bloom]\nthreshold = \"high\"")
            .unwrap();
        let err = Options::load(&path).unwrap_err();
        std::fs::remove_dir_all(&dir).unwrap();
        assert!(matches!(err, PostFxError::OptionsParse(_)));
    }

    #[test]
    fn schema_has_expected_properties() {
        let schema_value =
            serde_json::to_value(Options::json_schema()).unwrap();
        let pp = &schema_value["properties"]["post_processing"]["properties"];
        assert!(pp.get("bloom").is_some());
        assert!(pp.get("ssao").is_some());
        assert!(pp.get("fxaa").is_some());

        let bloom = &pp["bloom"]["properties"];
        assert!(bloom.get("threshold").is_some());
        assert!(bloom.get("scattering").is_some());
        assert!(bloom.get("half_resolution").is_some());

        // Skipped fields should be absent
        let ssao = &pp["ssao"]["properties"];
        assert!(ssao.get("color").is_none());
        assert!(ssao.get("bias").is_none());
    }
}
