//! 分层输入校验.
//!
//! 检查按固定顺序分层进行, 后一层依赖前一层建立的结构性前提:
//!
//! 1. 维数与轴长 ([`CheckCategory::Dimensionality`]);
//! 2. 仿射矩阵 ([`CheckCategory::Affine`]);
//! 3. 体素间距 ([`CheckCategory::Spacing`]);
//! 4. 数据质量 ([`CheckCategory::DataQuality`]).
//!
//! 同一层内相互独立的检查全部执行, 其失败信息被汇总成一个错误.
//! [`validate`] 在第一个失败的层停止, [`inspect`] 只在维数失败时停止,
//! 其余各层全部执行, 便于一次性看到所有问题.

use itertools::Itertools;
use log::{debug, warn};
use ndarray::ArrayView2;

use crate::consts::{limits, NDIM};
use crate::{ImageData, PipelineError, PipelineResult};

mod report;

pub use report::{CheckCategory, CheckResult, Severity, ValidationReport};

const AXIS_CHECKS: [&str; NDIM] = [
    "dimensionality.axis_x",
    "dimensionality.axis_y",
    "dimensionality.axis_z",
];
const AXIS_KEYS: [&str; NDIM] = ["axis_len_x", "axis_len_y", "axis_len_z"];
const SPACING_CHECKS: [&str; NDIM] = ["spacing.x", "spacing.y", "spacing.z"];
const SPACING_KEYS: [&str; NDIM] = ["spacing_x", "spacing_y", "spacing_z"];

/// 以默认阈值校验 `image`. 见 [`Validator::validate`].
#[inline]
pub fn validate(image: &ImageData) -> PipelineResult<ValidationReport> {
    Validator::default().validate(image)
}

/// 以默认阈值检查 `image`. 见 [`Validator::inspect`].
#[inline]
pub fn inspect(image: &ImageData) -> ValidationReport {
    Validator::default().inspect(image)
}

/// 输入校验器. 只读取体数据, 不修改它.
#[derive(Clone, Debug, PartialEq)]
pub struct Validator {
    min_axis_len: usize,
    max_axis_len: usize,
    expected_range: Option<(f32, f32)>,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            min_axis_len: limits::MIN_AXIS_LEN,
            max_axis_len: limits::MAX_AXIS_LEN,
            expected_range: None,
        }
    }
}

impl Validator {
    /// 修改允许的轴长范围 (闭区间). 要求 `1 <= min <= max`, 否则返回 `None`.
    #[must_use]
    pub fn with_axis_len(self, min: usize, max: usize) -> Option<Self> {
        (1 <= min && min <= max).then_some(Self {
            min_axis_len: min,
            max_axis_len: max,
            ..self
        })
    }

    /// 设置期望的强度范围. 超出范围只产生警告.
    #[must_use]
    pub fn with_expected_range(mut self, lo: f32, hi: f32) -> Self {
        self.expected_range = Some((lo, hi));
        self
    }

    /// 执行校验, 在第一个出现阻断性失败的层返回对应类别的错误.
    ///
    /// 错误信息由该层全部失败信息以 `"; "` 连接而成, 上下文包含该层的实测值.
    pub fn validate(&self, image: &ImageData) -> PipelineResult<ValidationReport> {
        let mut report = ValidationReport::default();
        self.run(image, &mut report, true)?;
        log_warnings(&report);
        debug!(
            "validation_passed checks={} warnings={}",
            report.checks().len(),
            report.warnings().count()
        );
        Ok(report)
    }

    /// 执行全部检查并返回报告, 不返回错误. 维数检查失败时不再执行后续各层.
    pub fn inspect(&self, image: &ImageData) -> ValidationReport {
        let mut report = ValidationReport::default();
        if let Err(e) = self.run(image, &mut report, false) {
            debug!("inspection_stopped reason={e}");
        }
        log_warnings(&report);
        report
    }

    fn run(
        &self,
        image: &ImageData,
        report: &mut ValidationReport,
        fail_fast: bool,
    ) -> PipelineResult<()> {
        // 形状不对时其余检查都没有意义.
        self.check_dimensionality(image, report)?;

        let layers: [fn(&Self, &ImageData, &mut ValidationReport) -> PipelineResult<()>; 3] = [
            Self::check_affine,
            Self::check_spacing,
            Self::check_data_quality,
        ];
        for layer in layers {
            let outcome = layer(self, image, report);
            if fail_fast {
                outcome?;
            }
        }
        Ok(())
    }

    fn check_dimensionality(
        &self,
        image: &ImageData,
        report: &mut ValidationReport,
    ) -> PipelineResult<()> {
        let cat = CheckCategory::Dimensionality;
        let shape = image.shape();
        if image.ndim() != NDIM {
            report.fail(
                cat,
                "dimensionality.rank",
                format!(
                    "Pipeline requires 3D volumetric data, got {}D array. Shape: {shape:?}",
                    image.ndim()
                ),
            );
            return layer_outcome(report, cat, &[("ndim", image.ndim() as f64)]);
        }
        report.pass(
            cat,
            "dimensionality.rank",
            format!("Dimensionality check: 3D (shape: {shape:?})"),
        );

        let mut context = Vec::new();
        for (i, (&n, (name, key))) in shape
            .iter()
            .zip(AXIS_CHECKS.into_iter().zip(AXIS_KEYS))
            .enumerate()
        {
            if n < self.min_axis_len {
                report.fail(
                    cat,
                    name,
                    format!(
                        "Dimension {i} size ({n}) below minimum threshold ({} voxels)",
                        self.min_axis_len
                    ),
                );
                context.push((key, n as f64));
            } else if n > self.max_axis_len {
                report.fail(
                    cat,
                    name,
                    format!(
                        "Dimension {i} size ({n}) exceeds maximum threshold ({} voxels)",
                        self.max_axis_len
                    ),
                );
                context.push((key, n as f64));
            } else {
                report.pass(cat, name, format!("Dimension {i} size valid: {n} voxels"));
            }
        }
        layer_outcome(report, cat, &context)
    }

    fn check_affine(&self, image: &ImageData, report: &mut ValidationReport) -> PipelineResult<()> {
        let cat = CheckCategory::Affine;
        let affine = image.affine();
        let (rows, cols) = affine.dim();
        if (rows, cols) != (4, 4) {
            report.fail(
                cat,
                "affine.shape",
                format!("Affine matrix must be 4x4, got shape ({rows}, {cols})"),
            );
            return layer_outcome(report, cat, &[("rows", rows as f64), ("cols", cols as f64)]);
        }
        report.pass(cat, "affine.shape", "Affine matrix is 4x4");

        if !affine.iter().all(|v| v.is_finite()) {
            report.fail(
                cat,
                "affine.finite",
                "Affine matrix contains non-finite values (NaN or Inf)",
            );
            return layer_outcome(report, cat, &[]);
        }
        report.pass(cat, "affine.finite", "Affine matrix contains only finite values");

        let bottom = affine.row(3);
        if bottom.iter().ne([0.0, 0.0, 0.0, 1.0].iter()) {
            report.fail(
                cat,
                "affine.bottom_row",
                format!(
                    "Affine matrix bottom row must be [0, 0, 0, 1], got {:?}",
                    bottom.to_vec()
                ),
            );
        } else {
            report.pass(cat, "affine.bottom_row", "Affine matrix bottom row is [0, 0, 0, 1]");
        }

        let det = det3(&affine);
        if det.abs() <= limits::AFFINE_DET_EPSILON {
            report.fail(
                cat,
                "affine.determinant",
                format!("Affine rotation/scale submatrix is singular (det={det:.2e})"),
            );
        } else {
            report.pass(
                cat,
                "affine.determinant",
                format!("Affine rotation/scale submatrix is non-singular (det={det:.4})"),
            );
            if det < 0.0 {
                report.warn(
                    cat,
                    "affine.orientation",
                    format!(
                        "Affine matrix has negative determinant ({det:.4}), \
                         indicating coordinate system reflection"
                    ),
                );
            }
        }
        layer_outcome(
            report,
            cat,
            &[
                ("determinant", det),
                ("epsilon", limits::AFFINE_DET_EPSILON),
            ],
        )
    }

    fn check_spacing(&self, image: &ImageData, report: &mut ValidationReport) -> PipelineResult<()> {
        let cat = CheckCategory::Spacing;
        let spacing = image.spacing();
        for (i, (&sp, name)) in spacing.iter().zip(SPACING_CHECKS).enumerate() {
            if sp <= 0.0 {
                report.fail(
                    cat,
                    name,
                    format!("Voxel spacing dimension {i} must be positive, got {sp} mm"),
                );
            } else if !sp.is_finite() {
                report.fail(
                    cat,
                    name,
                    format!("Voxel spacing dimension {i} must be finite, got {sp}"),
                );
            } else if sp < limits::MIN_SPACING_MM {
                report.fail(
                    cat,
                    name,
                    format!(
                        "Voxel spacing dimension {i} ({sp} mm) below minimum threshold ({} mm)",
                        limits::MIN_SPACING_MM
                    ),
                );
            } else if sp > limits::MAX_SPACING_MM {
                report.fail(
                    cat,
                    name,
                    format!(
                        "Voxel spacing dimension {i} ({sp} mm) exceeds maximum threshold ({} mm)",
                        limits::MAX_SPACING_MM
                    ),
                );
            } else if !(limits::TYPICAL_MIN_SPACING_MM..=limits::TYPICAL_MAX_SPACING_MM)
                .contains(&sp)
            {
                report.warn(
                    cat,
                    name,
                    format!(
                        "Unusual voxel spacing dimension {i}: {sp:.3} mm (typical range: {}-{} mm)",
                        limits::TYPICAL_MIN_SPACING_MM,
                        limits::TYPICAL_MAX_SPACING_MM
                    ),
                );
            } else {
                report.pass(cat, name, format!("Voxel spacing dimension {i}: {sp:.3} mm"));
            }
        }
        let context: Vec<_> = SPACING_KEYS.into_iter().zip(spacing).collect();
        layer_outcome(report, cat, &context)
    }

    fn check_data_quality(
        &self,
        image: &ImageData,
        report: &mut ValidationReport,
    ) -> PipelineResult<()> {
        let cat = CheckCategory::DataQuality;
        let stats = IntensityStats::collect(image.data().iter().copied());
        let total = stats.len.max(1) as f64;

        if stats.nan_count > 0 {
            report.fail(
                cat,
                "data.nan",
                format!(
                    "Data contains {} NaN values ({:.4}% of total voxels)",
                    stats.nan_count,
                    100.0 * stats.nan_count as f64 / total
                ),
            );
        } else {
            report.pass(cat, "data.nan", "No NaN values detected");
        }

        if stats.inf_count > 0 {
            report.fail(
                cat,
                "data.inf",
                format!(
                    "Data contains {} infinite values ({:.4}% of total voxels)",
                    stats.inf_count,
                    100.0 * stats.inf_count as f64 / total
                ),
            );
        } else {
            report.pass(cat, "data.inf", "No infinite values detected");
        }

        let mut context = vec![
            ("nan_count", stats.nan_count as f64),
            ("inf_count", stats.inf_count as f64),
        ];
        match stats.std() {
            None => report.fail(cat, "data.variance", "Data contains no finite values"),
            Some(std) if std < limits::MIN_INTENSITY_STD => {
                report.fail(
                    cat,
                    "data.variance",
                    format!(
                        "Data has zero variance (std={std:.2e}), \
                         indicating constant values or numerical precision issues"
                    ),
                );
                context.push(("std", std));
            }
            Some(std) => {
                report.pass(
                    cat,
                    "data.variance",
                    format!("Data has non-zero variance (std={std:.4})"),
                );
                context.push(("std", std));
            }
        }

        if stats.finite > 0 {
            let (lo, hi) = (stats.min, stats.max);
            match self.expected_range {
                Some((elo, ehi)) if lo < elo || hi > ehi => report.warn(
                    cat,
                    "data.range",
                    format!(
                        "Data range [{lo:.2}, {hi:.2}] outside expected range [{elo:.2}, {ehi:.2}]"
                    ),
                ),
                Some(_) => report.pass(
                    cat,
                    "data.range",
                    format!("Value range [{lo:.2}, {hi:.2}] within expected bounds"),
                ),
                None => report.pass(cat, "data.range", format!("Value range: [{lo:.2}, {hi:.2}]")),
            }
        }
        layer_outcome(report, cat, &context)
    }
}

/// 将某一层的阻断性失败汇总成一个错误.
fn layer_outcome(
    report: &ValidationReport,
    category: CheckCategory,
    context: &[(&'static str, f64)],
) -> PipelineResult<()> {
    if report.errors_in(category).next().is_none() {
        return Ok(());
    }
    let message = report.errors_in(category).map(|c| &c.message).join("; ");
    let err = context.iter().fold(
        PipelineError::new(category.error_kind(), message),
        |e, &(key, value)| e.with_context(key, value),
    );
    Err(err)
}

fn log_warnings(report: &ValidationReport) {
    for w in report.warnings() {
        warn!("validation_warning check={} message={}", w.name, w.message);
    }
}

/// 仿射矩阵左上 3x3 子矩阵的行列式.
pub(crate) fn det3(m: &ArrayView2<'_, f64>) -> f64 {
    let a = |i: usize, j: usize| m[(i, j)];
    a(0, 0) * (a(1, 1) * a(2, 2) - a(1, 2) * a(2, 1))
        - a(0, 1) * (a(1, 0) * a(2, 2) - a(1, 2) * a(2, 0))
        + a(0, 2) * (a(1, 0) * a(2, 1) - a(1, 1) * a(2, 0))
}

/// 单次遍历得到的强度统计. 均值与方差只统计有限值, 使用 Welford 算法.
#[derive(Debug, Default)]
struct IntensityStats {
    len: usize,
    nan_count: usize,
    inf_count: usize,
    finite: usize,
    mean: f64,
    m2: f64,
    min: f32,
    max: f32,
}

impl IntensityStats {
    fn collect(values: impl IntoIterator<Item = f32>) -> Self {
        let mut s = Self {
            min: f32::INFINITY,
            max: f32::NEG_INFINITY,
            ..Self::default()
        };
        for v in values {
            s.len += 1;
            if v.is_nan() {
                s.nan_count += 1;
                continue;
            }
            if v.is_infinite() {
                s.inf_count += 1;
                continue;
            }
            s.finite += 1;
            s.min = s.min.min(v);
            s.max = s.max.max(v);
            let x = f64::from(v);
            let delta = x - s.mean;
            s.mean += delta / s.finite as f64;
            s.m2 += delta * (x - s.mean);
        }
        s
    }

    /// 总体标准差. 不存在有限值时返回 `None`.
    fn std(&self) -> Option<f64> {
        match self.finite {
            0 => None,
            // 常量体数据的方差严格为零, 不受舍入误差影响.
            _ if self.min == self.max => Some(0.0),
            n => Some((self.m2 / n as f64).sqrt()),
        }
    }
}
