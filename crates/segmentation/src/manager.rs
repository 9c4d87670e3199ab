use std::{path::Path, sync::Arc};

use rand::{SeedableRng, rngs::StdRng};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::info;

use crate::{
    config::SegmentationConfig,
    contour::PixelContour,
    error::{Result, SegmentationError},
    frame::Frame,
    inpainting::{InpaintStrategy, InpaintingStats},
    morphology::{MorphologyFilter, MorphologyOperation, Neighborhood},
    pipeline::Pipeline,
    segmenter::PyramidSegmenter,
    traits::MaskFilter,
    types::SegmentationOutcome,
    worker::Worker,
};

#[derive(
    Debug, Clone,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq
)]
#[serde(tag = "type", content = "params")]
#[strum(serialize_all = "snake_case")]
pub enum SegmentationCommand {
    /// Refine a rough outline into an accurate object contour
    #[serde(rename = "find_contour")]
    FindContour { rough: PixelContour },

    /// Compute the object mask inside a rough outline
    #[serde(rename = "segment_mask")]
    SegmentMask { rough: PixelContour },

    /// Apply a morphology operation to the loaded mask
    #[serde(rename = "morphology")]
    Morphology {
        operation: MorphologyOperation,
        neighborhood: Neighborhood,
        #[serde(default)]
        mask_value: u8,
        #[schemars(range(min = 1, max = 64))]
        iterations: u32,
    },

    /// Fill the holes (zero pixels) of the loaded mask in the loaded frame
    #[serde(rename = "inpaint")]
    Inpaint {
        strategy: InpaintStrategy,
        neighborhood: Neighborhood,
        #[serde(default)]
        noise: u8,
    },
}

impl SegmentationCommand {
    /// Get the JSON schema for all commands
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(SegmentationCommand)
    }

    /// Get a list of all available command names
    pub fn command_names() -> &'static [&'static str] {
        <Self as VariantNames>::VARIANTS
    }

    /// Get a description of the command
    pub fn description(&self) -> &'static str {
        match self {
            Self::FindContour { .. } => "Refine a rough outline into a dense, pixel-accurate object contour",
            Self::SegmentMask { .. } => "Classify the pixels inside a rough outline into object and background",
            Self::Morphology { .. } => "Erode, dilate, open or close one value of the loaded mask",
            Self::Inpaint { .. } => "Synthesize content for the zero pixels of the loaded mask",
        }
    }

    /// Get parameter information as (name, description, required)
    pub fn parameters_info(&self) -> Vec<(&'static str, &'static str, bool)> {
        match self {
            Self::FindContour { .. } | Self::SegmentMask { .. } => vec![
                ("rough", "Rough outline around the object, as a list of {x, y} pixel positions", true),
            ],
            Self::Morphology { .. } => vec![
                ("operation", "One of erode, dilate, open, close", true),
                ("neighborhood", "four or eight", true),
                ("mask_value", "Mask value the operation acts on (default 0)", false),
                ("iterations", "Number of times the operation is applied", true),
            ],
            Self::Inpaint { .. } => vec![
                ("strategy", "scanline or frontier", true),
                ("neighborhood", "four or eight, used by the scanline strategy", true),
                ("noise", "Uniform noise amplitude added to synthesized values (default 0)", false),
            ],
        }
    }
}

/// What a command produced.
#[derive(Debug, Clone)]
pub enum CommandOutput {
    Contour(SegmentationOutcome),
    Mask(Frame),
    Inpainted { frame: Frame, stats: InpaintingStats },
}

/// Holds the working frame and mask and executes [`SegmentationCommand`]s on them.
#[derive(Clone, Default)]
pub struct SegmentationManager {
    frame: Option<Frame>,
    mask: Option<Frame>,
    config: SegmentationConfig,
    worker: Option<Arc<Worker>>,
}

impl SegmentationManager {
    pub fn new(config: SegmentationConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Run row-parallel kernels on `worker`
    pub fn with_worker(mut self, worker: Worker) -> Self {
        self.worker = Some(Arc::new(worker));
        self
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Load the frame from an image file
    pub fn load_image<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let image = image::open(path)?;
        self.frame = Some(Frame::from_dynamic_image(&image));
        Ok(())
    }

    /// Load the mask from an image file; only the luminance is kept
    pub fn load_mask<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let image = image::open(path)?;
        self.mask = Some(Frame::from_gray_image(&image.to_luma8()));
        Ok(())
    }

    /// Set the frame directly
    pub fn set_frame(&mut self, frame: Frame) {
        self.frame = Some(frame);
    }

    /// Set the mask directly
    pub fn set_mask(&mut self, mask: Frame) {
        self.mask = Some(mask);
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn mask(&self) -> Option<&Frame> {
        self.mask.as_ref()
    }

    pub fn execute(&self, command: SegmentationCommand) -> Result<CommandOutput> {
        let worker = self.worker.as_deref();
        info!(command = %command, "executing command");

        match command {
            SegmentationCommand::FindContour { rough } => {
                let frame = self.frame.as_ref().ok_or(SegmentationError::NoFrameLoaded)?;
                let pipeline = Pipeline::builder().with_config(self.config.clone()).build();
                Ok(CommandOutput::Contour(pipeline.process(frame, &rough, worker)?))
            }
            SegmentationCommand::SegmentMask { rough } => {
                let frame = self.frame.as_ref().ok_or(SegmentationError::NoFrameLoaded)?;
                let segmenter = PyramidSegmenter::new(self.config.clone());
                Ok(CommandOutput::Mask(segmenter.segment_mask(frame, &rough, worker)?))
            }
            SegmentationCommand::Morphology {
                operation,
                neighborhood,
                mask_value,
                iterations,
            } => {
                let mut mask = self.mask.as_ref().ok_or(SegmentationError::NoMaskLoaded)?.try_clone()?;
                let filter = MorphologyFilter {
                    operation,
                    neighborhood,
                    mask_value,
                    iterations,
                };
                filter.apply(&mut mask, worker)?;
                Ok(CommandOutput::Mask(mask))
            }
            SegmentationCommand::Inpaint {
                strategy,
                neighborhood,
                noise,
            } => {
                let mut frame = self.frame.as_ref().ok_or(SegmentationError::NoFrameLoaded)?.try_clone()?;
                let mut mask = self.mask.as_ref().ok_or(SegmentationError::NoMaskLoaded)?.try_clone()?;
                let mut rng = StdRng::seed_from_u64(self.config.seed);
                let stats = strategy.inpainter(neighborhood, noise).inpaint(&mut frame, &mut mask, &mut rng)?;
                Ok(CommandOutput::Inpainted { frame, stats })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::{BACKGROUND, OBJECT};

    #[test]
    fn commands_use_tagged_json() {
        let command = SegmentationCommand::Morphology {
            operation: MorphologyOperation::Close,
            neighborhood: Neighborhood::Four,
            mask_value: 0,
            iterations: 1,
        };
        let json = serde_json::to_value(&command).expect("serialize");
        assert_eq!(json["type"], "morphology");
        assert_eq!(json["params"]["operation"], "close");
        assert_eq!(json["params"]["neighborhood"], "four");

        let parsed: SegmentationCommand = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed, command);
    }

    #[test]
    fn rough_contours_parse_from_point_lists() {
        let json = r#"{ "type": "find_contour", "params": { "rough": [{ "x": 1, "y": 2 }, { "x": 5, "y": 2 }, { "x": 5, "y": 6 }] } }"#;
        let command: SegmentationCommand = serde_json::from_str(json).expect("deserialize");
        assert_eq!(
            command,
            SegmentationCommand::FindContour {
                rough: PixelContour::from_xy(&[(1, 2), (5, 2), (5, 6)])
            }
        );
        assert_eq!(command.to_string(), "find_contour");
    }

    #[test]
    fn names_and_schema_cover_every_command() {
        assert_eq!(
            SegmentationCommand::command_names(),
            &["find_contour", "segment_mask", "morphology", "inpaint"]
        );
        let schema = serde_json::to_string(&SegmentationCommand::schema()).expect("schema");
        assert!(schema.contains("find_contour"));
        assert!(schema.contains("inpaint"));

        let inpaint = SegmentationCommand::Inpaint {
            strategy: InpaintStrategy::Scanline,
            neighborhood: Neighborhood::Four,
            noise: 0,
        };
        let required: Vec<_> = inpaint
            .parameters_info()
            .into_iter()
            .filter(|(_, _, required)| *required)
            .map(|(name, _, _)| name)
            .collect();
        assert_eq!(required, ["strategy", "neighborhood"]);
    }

    #[test]
    fn missing_inputs_are_reported() {
        let manager = SegmentationManager::default();
        assert!(matches!(
            manager.execute(SegmentationCommand::SegmentMask { rough: PixelContour::default() }),
            Err(SegmentationError::NoFrameLoaded)
        ));
        assert!(matches!(
            manager.execute(SegmentationCommand::Morphology {
                operation: MorphologyOperation::Open,
                neighborhood: Neighborhood::Eight,
                mask_value: 0,
                iterations: 1,
            }),
            Err(SegmentationError::NoMaskLoaded)
        ));
    }

    #[test]
    fn morphology_runs_on_a_copy_of_the_mask() {
        let mut mask = Frame::new_mask(8, 8, BACKGROUND).expect("mask");
        mask.set_value(3, 3, OBJECT);
        let mut manager = SegmentationManager::default();
        manager.set_mask(mask.clone());

        let output = manager
            .execute(SegmentationCommand::Morphology {
                operation: MorphologyOperation::Dilate,
                neighborhood: Neighborhood::Eight,
                mask_value: OBJECT,
                iterations: 1,
            })
            .expect("morphology");

        let CommandOutput::Mask(dilated) = output else {
            panic!("expected a mask");
        };
        assert_eq!(dilated.count_value(OBJECT), 9);
        assert_eq!(manager.mask(), Some(&mask));
    }

    #[test]
    fn inpaint_fills_the_hole() {
        let mut frame = Frame::new(10, 10, 3, 0, 120).expect("frame");
        let mut mask = Frame::new_mask(10, 10, 0xFF).expect("mask");
        for y in 4..6 {
            for x in 4..6 {
                frame.pixel_mut(x, y).expect("in bounds").fill(0);
                mask.set_value(x, y, 0);
            }
        }
        let mut manager = SegmentationManager::default();
        manager.set_frame(frame);
        manager.set_mask(mask);

        let output = manager
            .execute(SegmentationCommand::Inpaint {
                strategy: InpaintStrategy::Frontier,
                neighborhood: Neighborhood::Eight,
                noise: 0,
            })
            .expect("inpaint");
        let CommandOutput::Inpainted { frame, stats } = output else {
            panic!("expected an inpainted frame");
        };
        assert_eq!(stats.resolved, 4);
        assert_eq!(frame.pixel(4, 5), Some(&[120u8, 120, 120][..]));
    }
}
