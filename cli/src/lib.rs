use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use segmentation::{PixelContour, SegmentationConfig, SegmentationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    Segmentation(#[from] SegmentationError),
    #[error("Object '{0}' is defined more than once")]
    DuplicateObject(String),
    #[error("Object '{0}' needs a rough outline of at least 3 points")]
    RoughOutlineTooShort(String),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// One object to cut out of the batch image.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ObjectSpec {
    pub name: String,
    pub description: Option<String>,
    /// Rough outline drawn around the object.
    pub rough: PixelContour,
}

/// Batch definition: several objects of the same image.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SegmentationBatch {
    pub image: String,
    pub output_dir: String,
    #[serde(default)]
    pub config: SegmentationConfig,
    pub objects: Vec<ObjectSpec>,
}

impl SegmentationBatch {
    /// Load a batch from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, BatchError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load a batch from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, BatchError> {
        let batch: SegmentationBatch = toml::from_str(content)?;
        batch.validate()?;
        Ok(batch)
    }

    /// Load a batch from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, BatchError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load a batch from a JSON string
    pub fn from_json(content: &str) -> Result<Self, BatchError> {
        let batch: SegmentationBatch = serde_json::from_str(content)?;
        batch.validate()?;
        Ok(batch)
    }

    /// Auto-detect file format and load the batch
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BatchError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(BatchError::UnsupportedFileFormat),
        }
    }

    /// Convert the batch to a TOML string
    pub fn to_toml(&self) -> Result<String, BatchError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    /// Convert the batch to a JSON string
    pub fn to_json(&self) -> Result<String, BatchError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        self.config.validate()?;
        let mut names = HashSet::new();
        for object in &self.objects {
            if !names.insert(object.name.as_str()) {
                return Err(BatchError::DuplicateObject(object.name.clone()));
            }
            if object.rough.len() < 3 {
                return Err(BatchError::RoughOutlineTooShort(object.name.clone()));
            }
        }
        Ok(())
    }

    /// GeoJSON output path of `object`
    pub fn output_path(&self, object: &ObjectSpec) -> PathBuf {
        Path::new(&self.output_dir).join(format!("{}.geojson", object.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BATCH: &str = r#"
image = "frames/0001.png"
output_dir = "out"

[config]
pyramid_layers = 3

[[objects]]
name = "cup"
rough = [{ x = 10, y = 10 }, { x = 40, y = 10 }, { x = 40, y = 40 }, { x = 10, y = 40 }]

[[objects]]
name = "plate"
description = "left of the cup"
rough = [{ x = 50, y = 10 }, { x = 90, y = 10 }, { x = 70, y = 40 }]
"#;

    #[test]
    fn loads_toml_batches_with_default_config_values() {
        let batch = SegmentationBatch::from_toml(BATCH).expect("batch");
        assert_eq!(batch.objects.len(), 2);
        assert_eq!(batch.config.pyramid_layers, 3);
        assert_eq!(batch.config.mean_filter_size, SegmentationConfig::default().mean_filter_size);
        assert_eq!(batch.output_path(&batch.objects[1]), Path::new("out").join("plate.geojson"));
    }

    #[test]
    fn json_round_trip_keeps_the_batch() {
        let batch = SegmentationBatch::from_toml(BATCH).expect("batch");
        let restored = SegmentationBatch::from_json(&batch.to_json().expect("json")).expect("parse");
        assert_eq!(restored, batch);
    }

    #[test]
    fn rejects_duplicate_names_and_short_outlines() {
        let duplicate = BATCH.replace("\"plate\"", "\"cup\"");
        assert!(matches!(
            SegmentationBatch::from_toml(&duplicate),
            Err(BatchError::DuplicateObject(name)) if name == "cup"
        ));

        let short = BATCH.replace(", { x = 70, y = 40 }", "");
        assert!(matches!(
            SegmentationBatch::from_toml(&short),
            Err(BatchError::RoughOutlineTooShort(name)) if name == "plate"
        ));
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        assert!(matches!(
            SegmentationBatch::from_file("batch.yaml"),
            Err(BatchError::UnsupportedFileFormat)
        ));
    }
}
