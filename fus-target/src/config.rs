//! 处理参数与可视化参数.
//!
//! 所有参数在构造时一次性校验. 通过 `serde` 反序列化得到的实例同样经过校验,
//! 因此持有一个配置实例就意味着它的每个字段都合法.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::consts::defaults;
use crate::{PipelineError, PipelineResult};

/// 靶区识别参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "RawProcessingConfig")
)]
pub struct ProcessingConfig {
    intensity_threshold_percentile: f64,
    minimum_component_volume_mm3: f64,
    random_seed: u64,
}

impl ProcessingConfig {
    /// 构建处理参数.
    ///
    /// - `percentile` 必须是 `[0, 100]` 内的有限值;
    /// - `min_volume_mm3` 必须是正的有限值;
    /// - `random_seed` 只作审计记录, 算法本身不使用随机数.
    pub fn new(percentile: f64, min_volume_mm3: f64, random_seed: u64) -> PipelineResult<Self> {
        if !percentile.is_finite() || !(0.0..=100.0).contains(&percentile) {
            return Err(PipelineError::configuration(format!(
                "Percentile must be between 0 and 100, got {percentile}"
            ))
            .with_context("intensity_threshold_percentile", percentile));
        }
        if !min_volume_mm3.is_finite() || min_volume_mm3 <= 0.0 {
            return Err(PipelineError::configuration(format!(
                "Minimum component volume must be a positive finite number of mm³, got {min_volume_mm3}"
            ))
            .with_context("minimum_component_volume_mm3", min_volume_mm3));
        }
        Ok(Self {
            intensity_threshold_percentile: percentile,
            minimum_component_volume_mm3: min_volume_mm3,
            random_seed,
        })
    }

    /// 强度阈值百分位, `[0, 100]`.
    #[inline]
    pub fn intensity_threshold_percentile(&self) -> f64 {
        self.intensity_threshold_percentile
    }

    /// 最小连通域体积, 立方毫米.
    #[inline]
    pub fn minimum_component_volume_mm3(&self) -> f64 {
        self.minimum_component_volume_mm3
    }

    /// 随机种子.
    #[inline]
    pub fn random_seed(&self) -> u64 {
        self.random_seed
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            intensity_threshold_percentile: defaults::INTENSITY_THRESHOLD_PERCENTILE,
            minimum_component_volume_mm3: defaults::MINIMUM_COMPONENT_VOLUME_MM3,
            random_seed: defaults::RANDOM_SEED,
        }
    }
}

/// 反序列化的中间形态, 缺省字段取默认值.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawProcessingConfig {
    intensity_threshold_percentile: f64,
    minimum_component_volume_mm3: f64,
    random_seed: u64,
}

#[cfg(feature = "serde")]
impl Default for RawProcessingConfig {
    fn default() -> Self {
        let d = ProcessingConfig::default();
        Self {
            intensity_threshold_percentile: d.intensity_threshold_percentile,
            minimum_component_volume_mm3: d.minimum_component_volume_mm3,
            random_seed: d.random_seed,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<RawProcessingConfig> for ProcessingConfig {
    type Error = PipelineError;

    fn try_from(raw: RawProcessingConfig) -> Result<Self, Self::Error> {
        Self::new(
            raw.intensity_threshold_percentile,
            raw.minimum_component_volume_mm3,
            raw.random_seed,
        )
    }
}

/// 切片方向. 名字沿用常见的解剖学叫法.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum SliceAxis {
    /// 固定 x, 在 (y, z) 平面成像.
    Sagittal,

    /// 固定 y, 在 (x, z) 平面成像.
    Coronal,

    /// 固定 z, 在 (x, y) 平面成像.
    Axial,
}

impl SliceAxis {
    /// 被固定的体素轴.
    #[inline]
    pub const fn fixed_axis(self) -> usize {
        match self {
            SliceAxis::Sagittal => 0,
            SliceAxis::Coronal => 1,
            SliceAxis::Axial => 2,
        }
    }
}

impl fmt::Display for SliceAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SliceAxis::Sagittal => "sagittal",
            SliceAxis::Coronal => "coronal",
            SliceAxis::Axial => "axial",
        })
    }
}

/// 可视化参数.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "RawVisualizationConfig")
)]
pub struct VisualizationConfig {
    generate_slice_views: bool,
    axes: Vec<SliceAxis>,
    scale: u32,
}

impl VisualizationConfig {
    /// 构建可视化参数. `axes` 不能为空, `scale` 必须在 `[1, 8]` 内.
    pub fn new(generate_slice_views: bool, axes: Vec<SliceAxis>, scale: u32) -> PipelineResult<Self> {
        if axes.is_empty() {
            return Err(PipelineError::configuration(
                "At least one slice axis must be configured",
            ));
        }
        if !(1..=defaults::MAX_SLICE_SCALE).contains(&scale) {
            return Err(PipelineError::configuration(format!(
                "Slice scale must be between 1 and {}, got {scale}",
                defaults::MAX_SLICE_SCALE
            ))
            .with_context("scale", f64::from(scale)));
        }
        Ok(Self {
            generate_slice_views,
            axes,
            scale,
        })
    }

    /// 返回一个关闭了切片输出的副本.
    #[must_use]
    pub fn disabled(&self) -> Self {
        Self {
            generate_slice_views: false,
            ..self.clone()
        }
    }

    /// 是否生成切片图像.
    #[inline]
    pub fn generate_slice_views(&self) -> bool {
        self.generate_slice_views
    }

    /// 切片方向, 按面板从左到右的顺序.
    #[inline]
    pub fn axes(&self) -> &[SliceAxis] {
        &self.axes
    }

    /// 每个体素放大成 `scale * scale` 个像素.
    #[inline]
    pub fn scale(&self) -> u32 {
        self.scale
    }
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            generate_slice_views: true,
            axes: vec![SliceAxis::Axial, SliceAxis::Sagittal, SliceAxis::Coronal],
            scale: defaults::SLICE_SCALE,
        }
    }
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawVisualizationConfig {
    generate_slice_views: bool,
    axes: Vec<SliceAxis>,
    scale: u32,
}

#[cfg(feature = "serde")]
impl Default for RawVisualizationConfig {
    fn default() -> Self {
        let VisualizationConfig {
            generate_slice_views,
            axes,
            scale,
        } = VisualizationConfig::default();
        Self {
            generate_slice_views,
            axes,
            scale,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<RawVisualizationConfig> for VisualizationConfig {
    type Error = PipelineError;

    fn try_from(raw: RawVisualizationConfig) -> Result<Self, Self::Error> {
        Self::new(raw.generate_slice_views, raw.axes, raw.scale)
    }
}
