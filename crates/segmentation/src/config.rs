use std::{fs, path::Path};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, SegmentationError},
    fingerprint::ClusteringParams,
    landmarks::LandmarkParams,
};

/// Tuning of the pyramid segmenter and the contour finder.
///
/// Every field has a default, so configuration files only need to list the
/// values they change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Number of halvings below full resolution.
    pub pyramid_layers: u32,
    /// Odd box size of the smoothing filter applied before fingerprinting.
    pub mean_filter_size: u32,
    /// Sample a fingerprint at every n-th position of the rough contour.
    pub fingerprint_step: usize,
    /// Fingerprints are taken this many pixels outside the rough contour,
    /// along its outward normal. Keep it past the smoothing radius so the
    /// samples hold no blurred object color; 0 samples on the contour itself.
    pub fingerprint_offset: u32,
    /// Similar fingerprints needed to call a candidate pixel background.
    pub similarity_quorum: usize,
    /// Keep only the largest connected object region.
    pub single_object: bool,
    /// Dilations of the final mask before the outline is traced.
    pub outline_dilation_iterations: u32,
    /// Douglas-Peucker tolerance for the rough contour.
    pub contour_tolerance: f32,
    /// Seed of every randomized step.
    pub seed: u64,
    pub clustering: ClusteringParams,
    pub landmarks: LandmarkParams,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            pyramid_layers: 2,
            mean_filter_size: 3,
            fingerprint_step: 2,
            fingerprint_offset: 2,
            similarity_quorum: 7,
            single_object: true,
            outline_dilation_iterations: 1,
            contour_tolerance: 1.0,
            seed: 0,
            clustering: ClusteringParams::default(),
            landmarks: LandmarkParams::default(),
        }
    }
}

impl SegmentationConfig {
    /// Rejects values no algorithm can work with.
    pub fn validate(&self) -> Result<()> {
        if self.mean_filter_size % 2 == 0 {
            return Err(SegmentationError::invalid(format!(
                "mean_filter_size must be odd, got {}",
                self.mean_filter_size
            )));
        }
        if self.fingerprint_step == 0 {
            return Err(SegmentationError::invalid("fingerprint_step must be at least 1"));
        }
        if self.similarity_quorum == 0 {
            return Err(SegmentationError::invalid("similarity_quorum must be at least 1"));
        }
        if self.landmarks.step == 0 || self.landmarks.samples == 0 {
            return Err(SegmentationError::invalid("landmark step and samples must be at least 1"));
        }
        if self.contour_tolerance.is_nan() || self.contour_tolerance < 0.0 {
            return Err(SegmentationError::invalid("contour_tolerance must be non-negative"));
        }
        Ok(())
    }

    /// Load the configuration from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load the configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SegmentationConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load the configuration from a JSON string
    pub fn from_json(content: &str) -> Result<Self> {
        let config: SegmentationConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Auto-detect file format and load configuration
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path_ref),
            Some("json") => Self::from_json_file(path_ref),
            _ => Err(SegmentationError::UnsupportedFileFormat),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SegmentationConfig::from_toml(
            r#"
            pyramid_layers = 3
            seed = 42

            [landmarks]
            iterations = 5
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.pyramid_layers, 3);
        assert_eq!(config.seed, 42);
        assert_eq!(config.landmarks.iterations, 5);
        assert_eq!(config.landmarks.samples, 41);
        assert_eq!(config.mean_filter_size, 3);
        assert_eq!(config.fingerprint_offset, 2);
        assert_eq!(config.clustering, ClusteringParams::default());
    }

    #[test]
    fn toml_and_json_round_trip() {
        let config = SegmentationConfig {
            single_object: false,
            similarity_quorum: 4,
            ..Default::default()
        };

        let from_toml = SegmentationConfig::from_toml(&config.to_toml().expect("toml")).expect("parse toml");
        let from_json = SegmentationConfig::from_json(&config.to_json().expect("json")).expect("parse json");
        assert_eq!(from_toml, config);
        assert_eq!(from_json, config);
    }

    #[test]
    fn even_filter_size_is_rejected() {
        let result = SegmentationConfig::from_json(r#"{ "mean_filter_size": 4 }"#);
        assert!(matches!(result, Err(SegmentationError::InvalidArgument(_))));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(matches!(
            SegmentationConfig::from_file("config.yaml"),
            Err(SegmentationError::UnsupportedFileFormat)
        ));
    }
}
