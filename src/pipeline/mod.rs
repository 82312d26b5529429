//! The blur pipeline generated for the vision co-processor.
//!
//! Two steps run in order: a box blur over the camera frame, then a Gaussian blur
//! over the box blur's output. Radii come from the named parameter store so they
//! can be tuned at runtime without rebuilding.

pub mod blur;

use crate::errors::PipelineError;
use blur::{blur, BlurType};
use log::debug;
use opencv::{core::Mat, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// A camera frame: 8-bit, any channel count OpenCV's filters accept.
pub type Frame = Mat;

pub const BLUR0_RADIUS: &str = "blur0Radius";
pub const BLUR1_RADIUS: &str = "blur1Radius";
pub const DEFAULT_BLUR0_RADIUS: f64 = 9.649122807017552;
pub const DEFAULT_BLUR1_RADIUS: f64 = 69.2982456140351;

const BLUR0_TYPE: &str = "Box Blur";
const BLUR1_TYPE: &str = "Gaussian Blur";

/// A stored pipeline parameter. Consumers pick the accessor matching the type they expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Flag(value)
    }
}

fn number_param(params: &HashMap<String, ParamValue>, name: &str) -> Result<f64, PipelineError> {
    params
        .get(name)
        .ok_or_else(|| PipelineError::MissingParam(name.to_string()))?
        .as_f64()
        .ok_or_else(|| PipelineError::ParamType {
            name: name.to_string(),
            expected: "number",
        })
}

pub struct BlurPipeline {
    params: HashMap<String, ParamValue>,
    blur0_output: Option<Frame>,
    blur1_output: Option<Frame>,
}

impl Default for BlurPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl BlurPipeline {
    pub fn new() -> Self {
        let mut pipeline = BlurPipeline {
            params: HashMap::new(),
            blur0_output: None,
            blur1_output: None,
        };
        pipeline.set_param(BLUR0_RADIUS, DEFAULT_BLUR0_RADIUS);
        pipeline.set_param(BLUR1_RADIUS, DEFAULT_BLUR1_RADIUS);
        pipeline
    }

    pub fn set_param(&mut self, name: &str, value: impl Into<ParamValue>) {
        self.params.insert(name.to_string(), value.into());
    }

    pub fn get_param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn param_names(&self) -> HashSet<&str> {
        self.params.keys().map(String::as_str).collect()
    }

    /// Runs both blur steps over `source0`.
    ///
    /// Each output is replaced as soon as its step finishes, so a failing second
    /// step still leaves the fresh box-blur output in place.
    pub fn process(&mut self, source0: &Frame) -> Result<(), PipelineError> {
        let start_time = Instant::now();
        if source0.empty() {
            return Err(PipelineError::Frame("input frame is empty".to_string()));
        }

        // Step Blur0
        let blur0_radius = number_param(&self.params, BLUR0_RADIUS)?;
        let blur0_output = blur(source0, BlurType::from_label(BLUR0_TYPE), blur0_radius)?;
        let blur0_output = &*self.blur0_output.insert(blur0_output);

        // Step Blur1
        let blur1_radius = number_param(&self.params, BLUR1_RADIUS)?;
        self.blur1_output = Some(blur(blur0_output, BlurType::from_label(BLUR1_TYPE), blur1_radius)?);

        debug!(
            "Processed {}x{} frame in {:?}",
            source0.cols(),
            source0.rows(),
            start_time.elapsed()
        );
        Ok(())
    }

    pub fn blur0_output(&self) -> Option<&Frame> {
        self.blur0_output.as_ref()
    }

    pub fn blur1_output(&self) -> Option<&Frame> {
        self.blur1_output.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC1, CV_8UC3};

    fn bytes(mat: &Mat) -> Vec<u8> {
        mat.data_bytes().unwrap().to_vec()
    }

    #[test]
    fn defaults_are_registered() {
        let pipeline = BlurPipeline::new();
        let names = pipeline.param_names();
        assert_eq!(names.len(), 2);
        assert!(names.contains(BLUR0_RADIUS) && names.contains(BLUR1_RADIUS));
        assert_eq!(
            pipeline.get_param(BLUR0_RADIUS).and_then(ParamValue::as_f64),
            Some(DEFAULT_BLUR0_RADIUS)
        );
        assert!(pipeline.get_param("threshold").is_none());
        assert!(pipeline.blur0_output().is_none());
        assert!(pipeline.blur1_output().is_none());
    }

    #[test]
    fn set_param_overwrites() {
        let mut pipeline = BlurPipeline::new();
        pipeline.set_param(BLUR1_RADIUS, 2.0);
        pipeline.set_param(BLUR1_RADIUS, 3.0);
        pipeline.set_param("label", "front");
        assert_eq!(pipeline.get_param(BLUR1_RADIUS), Some(&ParamValue::Number(3.0)));
        assert_eq!(pipeline.get_param("label").and_then(ParamValue::as_str), Some("front"));
        assert_eq!(pipeline.param_names().len(), 3);
    }

    #[test]
    fn uniform_frame_stays_uniform_with_default_radii() {
        let mut pipeline = BlurPipeline::new();
        let frame =
            Mat::new_rows_cols_with_default(30, 40, CV_8UC3, Scalar::new(130.0, 64.0, 200.0, 0.0)).unwrap();
        pipeline.process(&frame).unwrap();

        for out in [pipeline.blur0_output().unwrap(), pipeline.blur1_output().unwrap()] {
            assert_eq!(out.size().unwrap(), frame.size().unwrap());
            assert_eq!(out.typ(), CV_8UC3);
            assert!(bytes(out).chunks(3).all(|px| px == [130, 64, 200]));
        }
    }

    #[test]
    fn outputs_chain_box_then_gaussian() {
        let mut pipeline = BlurPipeline::new();
        pipeline.set_param(BLUR0_RADIUS, 1.0);
        pipeline.set_param(BLUR1_RADIUS, 1.0);
        let mut frame = Mat::new_rows_cols_with_default(9, 9, CV_8UC1, Scalar::all(0.0)).unwrap();
        *frame.at_2d_mut::<u8>(4, 4).unwrap() = 255;
        pipeline.process(&frame).unwrap();

        let expected0 = blur(&frame, BlurType::Box, 1.0).unwrap();
        let expected1 = blur(&expected0, BlurType::Gaussian, 1.0).unwrap();
        assert_eq!(bytes(pipeline.blur0_output().unwrap()), bytes(&expected0));
        assert_eq!(bytes(pipeline.blur1_output().unwrap()), bytes(&expected1));
        // the speck is spread out, and spread further by the second step
        assert!(*expected0.at_2d::<u8>(4, 4).unwrap() < 255);
        assert!(*expected1.at_2d::<u8>(4, 4).unwrap() < *expected0.at_2d::<u8>(4, 4).unwrap());
    }

    #[test]
    fn missing_second_radius_keeps_first_output() {
        let mut pipeline = BlurPipeline::new();
        pipeline.set_param(BLUR0_RADIUS, 0.0);
        pipeline.set_param(BLUR1_RADIUS, "wide");
        let frame = Mat::new_rows_cols_with_default(3, 3, CV_8UC1, Scalar::all(9.0)).unwrap();
        let err = pipeline.process(&frame).unwrap_err();
        assert!(matches!(err, PipelineError::ParamType { .. }));
        assert_eq!(bytes(pipeline.blur0_output().unwrap()), bytes(&frame));
        assert!(pipeline.blur1_output().is_none());
    }

    #[test]
    fn oversized_radius_from_the_command_line_is_an_error() {
        let mut pipeline = BlurPipeline::new();
        pipeline.set_param(BLUR1_RADIUS, 2.0e18);
        let frame = Mat::new_rows_cols_with_default(4, 4, CV_8UC3, Scalar::all(40.0)).unwrap();
        let err = pipeline.process(&frame).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidKernel { .. }));
        assert!(pipeline.blur0_output().is_some());
        assert!(pipeline.blur1_output().is_none());
    }

    #[test]
    fn empty_frame_is_rejected() {
        let mut pipeline = BlurPipeline::new();
        let err = pipeline.process(&Mat::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Frame(_)));
        assert!(pipeline.blur0_output().is_none());
    }

    #[test]
    fn param_values_parse_from_json() {
        let v: ParamValue = serde_json::from_str("12.5").unwrap();
        assert_eq!(v, ParamValue::Number(12.5));
        let v: ParamValue = serde_json::from_str("\"Box Blur\"").unwrap();
        assert_eq!(v, ParamValue::Text("Box Blur".to_string()));
        let v: ParamValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, ParamValue::Flag(true));
    }
}
