//! # Object Segmentation Library
//!
//! Separates an object from its surroundings in a frame, starting from a
//! rough outline drawn around it, and returns a dense, pixel-accurate contour.
//!
//! ## Core Features
//!
//! - **Pyramid Segmentation**: Colour fingerprints sampled along the rough outline
//!   classify pixels coarse-to-fine over a resolution pyramid
//! - **Landmark Refinement**: Edge probes along the contour normals snap the outline to the object
//! - **Binary Morphology**: Erode, dilate, open and close masks, optionally row-parallel
//! - **Hole Inpainting**: Fill masked regions of a frame from the surrounding content
//! - **GeoJSON Support**: Export/import segmentation results as GeoJSON
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use segmentation::{Frame, PixelContour, Pipeline};
//!
//! let image = image::open("frame.png")?;
//! let frame = Frame::from_dynamic_image(&image);
//! let rough = PixelContour::from_xy(&[(40, 30), (200, 30), (200, 180), (40, 180)]);
//!
//! let pipeline = Pipeline::builder().build();
//! let outcome = pipeline.process(&frame, &rough, None)?;
//!
//! outcome.save_geojson("object.geojson")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Custom Pipeline
//!
//! ```rust,no_run
//! use segmentation::{Pipeline, SegmentationConfig, Worker};
//!
//! let config = SegmentationConfig {
//!     pyramid_layers: 3,
//!     ..Default::default()
//! };
//! let pipeline = Pipeline::builder()
//!     .with_config(config)
//!     .with_hole_closing()
//!     .build();
//! let worker = Worker::new(4)?;
//! # let _ = (pipeline, worker);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod border;
pub mod config;
pub mod contour;
pub mod error;
pub mod filter;
pub mod fingerprint;
pub mod frame;
pub mod geometry;
pub mod inpainting;
pub mod io;
pub mod landmarks;
pub mod manager;
pub mod morphology;
pub mod outline;
pub mod pipeline;
pub mod pyramid;
pub mod segmenter;
pub mod traits;
pub mod types;
pub mod worker;

/// Byte values of a segmentation mask.
pub mod mask {
    /// Pixel belongs to the object.
    pub const OBJECT: u8 = 0x00;
    /// Pixel belongs to the surroundings.
    pub const BACKGROUND: u8 = 0xFF;
}

// Re-exports for convenience
pub use config::SegmentationConfig;
pub use contour::PixelContour;
pub use error::{Result, SegmentationError};
pub use fingerprint::{ClusteringParams, Fingerprint, Thresholds};
pub use frame::Frame;
pub use geometry::{PixelBoundingBox, PixelPosition};
pub use inpainting::{FrontierInpainter, InpaintStrategy, InpaintingStats, ScanlineInpainter};
pub use landmarks::LandmarkParams;
pub use manager::{CommandOutput, SegmentationCommand, SegmentationManager};
pub use morphology::{MorphologyFilter, MorphologyOperation, Neighborhood};
pub use pipeline::{Pipeline, builder::PipelineBuilder};
pub use segmenter::{ContourFinder, PyramidSegmenter};
pub use traits::*;
pub use types::SegmentationOutcome;
pub use worker::Worker;
