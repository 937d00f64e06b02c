//! 靶区识别: 百分位强度阈值 -> 26-邻域连通域 -> 最大连通域.

use log::debug;
use ndarray::{Array3, ArrayView3};

#[cfg(feature = "serde")]
use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::config::ProcessingConfig;
use crate::{Idx3d, ImageData, PipelineError, PipelineResult};

mod label;
mod threshold;

pub use label::{label_components, Component, ComponentLabels};
pub use threshold::{foreground_mask, percentile, percentiles};

/// 轴对齐包围盒. 各轴的 `min`, `max` 均为闭区间端点.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct BoundingBox {
    min: [usize; 3],
    max: [usize; 3],
}

impl BoundingBox {
    /// 由两个角点构建包围盒. 若某轴上 `min > max` 则返回 `None`.
    pub fn new(min: [usize; 3], max: [usize; 3]) -> Option<Self> {
        min.iter()
            .zip(&max)
            .all(|(lo, hi)| lo <= hi)
            .then_some(Self { min, max })
    }

    /// 各轴最小索引.
    #[inline]
    pub fn min(&self) -> [usize; 3] {
        self.min
    }

    /// 各轴最大索引.
    #[inline]
    pub fn max(&self) -> [usize; 3] {
        self.max
    }

    /// 各轴跨越的体素个数, 即 `max - min + 1`.
    pub fn extent(&self) -> [usize; 3] {
        [0, 1, 2].map(|axis| self.max[axis] - self.min[axis] + 1)
    }

    /// `pos` 是否位于包围盒内.
    pub fn contains(&self, (x, y, z): Idx3d) -> bool {
        [x, y, z]
            .iter()
            .zip(self.min.iter().zip(&self.max))
            .all(|(v, (lo, hi))| lo <= v && v <= hi)
    }
}

/// 序列化为 `{"x": [min, max], "y": [min, max], "z": [min, max]}`.
#[cfg(feature = "serde")]
impl Serialize for BoundingBox {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("BoundingBox", 3)?;
        s.serialize_field("x", &[self.min[0], self.max[0]])?;
        s.serialize_field("y", &[self.min[1], self.max[1]])?;
        s.serialize_field("z", &[self.min[2], self.max[2]])?;
        s.end()
    }
}

/// 被选中的靶区: 与源体数据同形状的掩码, 只包含一个连通域.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetRegion {
    mask: Array3<bool>,
    voxel_count: usize,
    bounding_box: BoundingBox,
    label: u32,
    component_count: usize,
    threshold: f64,
}

impl TargetRegion {
    /// 靶区掩码.
    #[inline]
    pub fn mask(&self) -> ArrayView3<'_, bool> {
        self.mask.view()
    }

    /// 取得掩码所有权.
    #[inline]
    pub fn into_mask(self) -> Array3<bool> {
        self.mask
    }

    /// 靶区体素个数.
    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.voxel_count
    }

    /// 靶区包围盒.
    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    /// 靶区在标号结果中的标号.
    #[inline]
    pub fn label(&self) -> u32 {
        self.label
    }

    /// 前景中连通域的总个数.
    #[inline]
    pub fn component_count(&self) -> usize {
        self.component_count
    }

    /// 实际使用的强度阈值.
    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// 逐个访问靶区体素, 按行优先线性索引升序.
    pub fn voxels(&self) -> impl Iterator<Item = Idx3d> + '_ {
        self.mask
            .indexed_iter()
            .filter_map(|(pos, &inside)| inside.then_some(pos))
    }

    #[cfg(test)]
    pub(crate) fn from_parts(mask: Array3<bool>, voxel_count: usize, bounding_box: BoundingBox) -> Self {
        Self {
            mask,
            voxel_count,
            bounding_box,
            label: 1,
            component_count: 1,
            threshold: 0.0,
        }
    }
}

/// 在 `image` 中识别靶区.
///
/// 对相同的 `(image, config)`, 返回值逐位相同. `config.random_seed()` 不参与计算.
///
/// # 错误
///
/// - `image` 不是三维数据: [`crate::ErrorKind::Dimensionality`];
/// - 阈值后前景为空, 或最大连通域的物理体积低于
///   `config.minimum_component_volume_mm3()`: [`crate::ErrorKind::Processing`].
pub fn identify_target(image: &ImageData, config: &ProcessingConfig) -> PipelineResult<TargetRegion> {
    let volume = image.volume().ok_or_else(|| {
        PipelineError::dimensionality(format!(
            "Target identification requires 3D data, got {}D array",
            image.ndim()
        ))
        .with_context("ndim", image.ndim() as f64)
    })?;

    let q = config.intensity_threshold_percentile();
    let threshold = percentile(volume.iter().copied(), q).ok_or_else(|| {
        PipelineError::processing("Cannot compute an intensity threshold of an empty volume")
            .with_context("percentile", q)
    })?;
    let mask = foreground_mask(volume, threshold)
        .map_err(|e| e.with_context("percentile", q))?;

    let labels = label_components(mask.view())?;
    let largest = labels.largest().ok_or_else(|| {
        PipelineError::invariant("Non-empty foreground produced no connected component")
    })?;
    debug!(
        "segmentation threshold={threshold} percentile={q} components={} largest_voxels={}",
        labels.len(),
        largest.voxel_count()
    );

    let volume_mm3 = largest.voxel_count() as f64 * image.voxel_volume_mm3();
    let min_volume = config.minimum_component_volume_mm3();
    if volume_mm3 < min_volume {
        return Err(PipelineError::processing(format!(
            "Largest connected component volume {volume_mm3:.2} mm³ is below the minimum of \
             {min_volume:.2} mm³ (intensity threshold {threshold:.4} at percentile {q})"
        ))
        .with_context("volume_mm3", volume_mm3)
        .with_context("minimum_component_volume_mm3", min_volume)
        .with_context("threshold", threshold)
        .with_context("voxel_count", largest.voxel_count() as f64));
    }

    let bounding_box = BoundingBox::new(largest.min(), largest.max()).ok_or_else(|| {
        PipelineError::invariant("Connected component has an inverted bounding box")
    })?;
    Ok(TargetRegion {
        mask: labels.mask_of(largest.label()),
        voxel_count: largest.voxel_count(),
        bounding_box,
        label: largest.label(),
        component_count: labels.len(),
        threshold,
    })
}
