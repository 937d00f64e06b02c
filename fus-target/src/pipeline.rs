//! 单次运行的流水线编排.
//!
//! 唯一的成功路径是 `Loaded -> Validated -> Processed -> Measured`.
//! 任何一步失败都立即终止本次运行, 不重试, 不降级.

use std::fmt;

use log::info;
use thiserror::Error;

use crate::config::ProcessingConfig;
use crate::metrics::{compute_metrics, Metrics};
use crate::segment::{identify_target, TargetRegion};
use crate::validate::{validate, ValidationReport};
use crate::{ImageData, PipelineError};

/// 流水线阶段.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum Stage {
    /// 体数据已载入.
    Loaded,

    /// 输入校验.
    Validated,

    /// 靶区识别.
    Processed,

    /// 度量计算.
    Measured,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Loaded => "loaded",
            Stage::Validated => "validation",
            Stage::Processed => "processing",
            Stage::Measured => "metrics",
        })
    }
}

/// 某一阶段失败导致运行终止.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("pipeline halted at stage `{stage}`: {error}")]
pub struct StageFailure {
    stage: Stage,
    #[source]
    error: PipelineError,
}

impl StageFailure {
    /// 以阶段和原因构建.
    #[inline]
    pub fn new(stage: Stage, error: PipelineError) -> Self {
        Self { stage, error }
    }

    fn at(stage: Stage) -> impl FnOnce(PipelineError) -> StageFailure {
        move |error| StageFailure { stage, error }
    }

    /// 失败的阶段.
    #[inline]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// 失败原因.
    #[inline]
    pub fn error(&self) -> &PipelineError {
        &self.error
    }

    /// 取得失败原因.
    #[inline]
    pub fn into_error(self) -> PipelineError {
        self.error
    }
}

/// 一次成功运行的全部产物.
#[derive(Clone, Debug, PartialEq)]
pub struct RunOutcome {
    report: ValidationReport,
    region: TargetRegion,
    metrics: Metrics,
}

impl RunOutcome {
    /// 校验报告 (可能包含警告).
    #[inline]
    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    /// 靶区.
    #[inline]
    pub fn region(&self) -> &TargetRegion {
        &self.region
    }

    /// 度量.
    #[inline]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// 拆分为 `(报告, 靶区, 度量)`.
    pub fn into_parts(self) -> (ValidationReport, TargetRegion, Metrics) {
        (self.report, self.region, self.metrics)
    }
}

/// 对单个体数据依次执行校验, 靶区识别与度量计算.
///
/// 该函数是单线程的, 对相同输入给出相同输出.
pub fn run(image: &ImageData, config: &ProcessingConfig) -> Result<RunOutcome, StageFailure> {
    info!(
        "run_start seed={} percentile={} min_volume_mm3={} {}",
        config.random_seed(),
        config.intensity_threshold_percentile(),
        config.minimum_component_volume_mm3(),
        image.metadata_summary()
    );

    info!("stage_start stage={}", Stage::Validated);
    let report = validate(image).map_err(StageFailure::at(Stage::Validated))?;
    info!(
        "stage_complete stage={} checks={} warnings={}",
        Stage::Validated,
        report.checks().len(),
        report.warnings().count()
    );

    info!("stage_start stage={}", Stage::Processed);
    let region = identify_target(image, config).map_err(StageFailure::at(Stage::Processed))?;
    info!(
        "stage_complete stage={} threshold={} components={} voxel_count={}",
        Stage::Processed,
        region.threshold(),
        region.component_count(),
        region.voxel_count()
    );

    info!("stage_start stage={}", Stage::Measured);
    let metrics = compute_metrics(&region, image).map_err(StageFailure::at(Stage::Measured))?;
    info!(
        "stage_complete stage={} volume_mm3={:.3}",
        Stage::Measured,
        metrics.volume_mm3()
    );

    Ok(RunOutcome {
        report,
        region,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{cube_image, cube_volume, image_of};
    use crate::ErrorKind;
    use ndarray::Array2;

    fn cube_config() -> ProcessingConfig {
        ProcessingConfig::new(99.7, 100.0, 42).unwrap()
    }

    #[test]
    fn test_success_path() {
        let outcome = run(&cube_image(), &cube_config()).unwrap();
        assert!(outcome.report().is_valid());
        assert_eq!(outcome.region().voxel_count(), 1000);
        assert_eq!(outcome.metrics().volume_mm3(), 1000.0);
        let (_, region, metrics) = outcome.into_parts();
        assert_eq!(region.voxel_count(), metrics.voxel_count());
    }

    #[test]
    fn test_validation_failure_halts() {
        let mut data = cube_volume(64, 20, 10, 100.0);
        data[(0, 0, 0)] = f32::NAN;
        let failure = run(&image_of(data), &cube_config()).unwrap_err();
        assert_eq!(failure.stage(), Stage::Validated);
        assert_eq!(failure.error().kind(), ErrorKind::DataQuality);
        assert!(failure.to_string().starts_with("pipeline halted at stage `validation`"));
    }

    #[test]
    fn test_singular_affine_halts_valid_data() {
        let image =
            ImageData::from_volume(cube_volume(64, 20, 10, 100.0), Array2::zeros((4, 4)), [1.0; 3]);
        let failure = run(&image, &cube_config()).unwrap_err();
        assert_eq!(failure.stage(), Stage::Validated);
        assert_eq!(failure.into_error().kind(), ErrorKind::Metadata);
    }

    #[test]
    fn test_processing_failure_halts() {
        let mut data = cube_volume(16, 4, 4, 10.0);
        data[(15, 15, 15)] = 99.0;
        let cfg = ProcessingConfig::new(100.0, 100.0, 42).unwrap();
        let failure = run(&image_of(data), &cfg).unwrap_err();
        assert_eq!(failure.stage(), Stage::Processed);
        assert_eq!(failure.error().kind(), ErrorKind::Processing);
    }

    #[test]
    fn test_stage_order() {
        assert!(Stage::Loaded < Stage::Validated);
        assert!(Stage::Processed < Stage::Measured);
        assert_eq!(Stage::Measured.to_string(), "metrics");
    }
}
