//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::{diagonal_affine, file_checksum, ImageData};
pub use crate::{ErrorKind, LoadError, PipelineError, PipelineResult};

pub use crate::config::{ProcessingConfig, SliceAxis, VisualizationConfig};

pub use crate::validate::{inspect, validate, CheckCategory, Severity, ValidationReport, Validator};

pub use crate::segment::{identify_target, BoundingBox, TargetRegion};

pub use crate::metrics::{compute_metrics, Metrics, Point3};

pub use crate::pipeline::{run, RunOutcome, Stage, StageFailure};

pub use crate::render::{render_slices, save_mask_npy, save_slices, IntensityWindow, RenderError};
