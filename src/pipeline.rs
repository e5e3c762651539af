//! Single-image detection run: decode, predict, annotate, save image and report.

use std::path::PathBuf;
use std::time::Instant;

use crate::{
    annotate::Annotator, models::SsdModel, report::save_report, utils::ensure_parent_dir,
    Detection, Result,
};

/// File locations for one run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineConfig {
    pub image: PathBuf,
    pub output_image: PathBuf,
    pub report: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_output("images/input.jpg", "images/output_10.jpg")
    }
}

impl PipelineConfig {
    /// The report is written next to the output image, as `<output file name>.txt`.
    pub fn for_output(image: impl Into<PathBuf>, output_image: impl Into<PathBuf>) -> Self {
        let output_image = output_image.into();
        let mut report = output_image.clone().into_os_string();
        report.push(".txt");

        Self {
            image: image.into(),
            output_image,
            report: report.into(),
        }
    }
}

pub struct Pipeline {
    model: SsdModel,
    annotator: Annotator,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(model: SsdModel, annotator: Annotator, config: PipelineConfig) -> Self {
        Self {
            model,
            annotator,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn model(&self) -> &SsdModel {
        &self.model
    }

    /// Runs every stage once and returns the detections above the model's threshold.
    pub fn run(&self) -> Result<Vec<Detection>> {
        let started = Instant::now();

        tracing::info!("reading image {}", self.config.image.display());
        let img = image::open(&self.config.image)?;

        tracing::info!("predicting with {}", self.model.name());
        let detections = self.model.predict(&img)?;
        tracing::info!(
            "{} detections above {} after {:?}",
            detections.len(),
            self.model.confidence_threshold(),
            started.elapsed()
        );

        let annotated = self.annotator.annotate(&img, &detections);
        ensure_parent_dir(&self.config.output_image)?;
        annotated.save(&self.config.output_image)?;
        tracing::info!(
            "processed image is saved as {}",
            self.config.output_image.display()
        );

        save_report(&self.config.report, &detections)?;

        tracing::info!("all done after {:?}", started.elapsed());
        Ok(detections)
    }
}
