use std::path::{Path, PathBuf};

use itertools::{Itertools, MinMaxResult};
use ndarray::{Array2, Array3, ArrayD, ArrayView2, ArrayView3, ArrayViewD, Ix3};

mod load;

pub use load::file_checksum;

/// 一次流水线运行的输入体数据: 采样值, 仿射矩阵, 体素间距.
///
/// 该结构构造后不可变. 构造时 **不做** 任何校验, 各项不变量 (三维, 4x4 仿射,
/// 正的有限间距) 统一由 [`crate::validate::validate`] 检查. 因此 `data` 以动态维数存储,
/// 仿射矩阵以动态形状存储, 使错误的维数/形状能够被观测并报告.
#[derive(Debug, Clone)]
pub struct ImageData {
    data: ArrayD<f32>,
    affine: Array2<f64>,
    spacing: [f64; 3],
    checksum: String,
    source: Option<PathBuf>,
}

impl ImageData {
    /// 由裸数据创建体数据. `spacing` 以毫米为单位, 按 `(x, y, z)` 排列.
    pub fn new(data: ArrayD<f32>, affine: Array2<f64>, spacing: [f64; 3]) -> Self {
        Self {
            data,
            affine,
            spacing,
            checksum: String::new(),
            source: None,
        }
    }

    /// 由三维数据创建体数据.
    #[inline]
    pub fn from_volume(data: Array3<f32>, affine: Array2<f64>, spacing: [f64; 3]) -> Self {
        Self::new(data.into_dyn(), affine, spacing)
    }

    /// 附加不透明的校验和字符串. 流水线只记录它, 不检查它.
    #[must_use]
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = checksum.into();
        self
    }

    /// 附加来源文件路径.
    #[must_use]
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayViewD<'_, f32> {
        self.data.view()
    }

    /// 以三维视图访问数据. 数据不是三维时返回 `None`.
    #[inline]
    pub fn volume(&self) -> Option<ArrayView3<'_, f32>> {
        self.data.view().into_dimensionality::<Ix3>().ok()
    }

    /// 仿射矩阵.
    #[inline]
    pub fn affine(&self) -> ArrayView2<'_, f64> {
        self.affine.view()
    }

    /// 体素间距, 毫米.
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// 校验和. 未提供时为空串.
    #[inline]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// 来源文件路径.
    #[inline]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// 数据维数.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// 数据形状.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// 体素个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 是否不含任何体素.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 单个体素的实际体积, 以立方毫米为单位.
    #[inline]
    pub fn voxel_volume_mm3(&self) -> f64 {
        self.spacing.iter().product()
    }

    /// 有限采样值的 `(最小值, 最大值)`. 不存在有限值时返回 `None`.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        match self.data.iter().copied().filter(|v| v.is_finite()).minmax() {
            MinMaxResult::NoElements => None,
            MinMaxResult::OneElement(v) => Some((v, v)),
            MinMaxResult::MinMax(lo, hi) => Some((lo, hi)),
        }
    }

    /// 用于审计日志的单行元数据摘要.
    pub fn metadata_summary(&self) -> String {
        let source = self
            .source()
            .map_or_else(|| "<memory>".to_string(), |p| p.display().to_string());
        let range = self
            .value_range()
            .map_or_else(|| "none".to_string(), |(lo, hi)| format!("[{lo}, {hi}]"));
        let checksum = if self.checksum.is_empty() {
            "none"
        } else {
            self.checksum.as_str()
        };
        format!(
            "source={source} checksum={checksum} shape={:?} spacing_mm={:?} value_range={range}",
            self.shape(),
            self.spacing,
        )
    }
}

/// 构造 `diag(sx, sy, sz, 1)` 仿射矩阵.
pub fn diagonal_affine(spacing: [f64; 3]) -> Array2<f64> {
    let [sx, sy, sz] = spacing;
    Array2::from_diag(&ndarray::arr1(&[sx, sy, sz, 1.0]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn test_volume_view_requires_three_axes() {
        let img = ImageData::from_volume(
            Array3::zeros((8, 9, 10)),
            diagonal_affine([1.0; 3]),
            [1.0; 3],
        );
        assert_eq!(img.ndim(), 3);
        assert_eq!(img.volume().unwrap().dim(), (8, 9, 10));

        let img = ImageData::new(
            ArrayD::zeros(IxDyn(&[8, 8, 8, 2])),
            diagonal_affine([1.0; 3]),
            [1.0; 3],
        );
        assert!(img.volume().is_none());
        assert_eq!(img.shape(), &[8, 8, 8, 2]);
    }

    #[test]
    fn test_voxel_volume() {
        let img = ImageData::from_volume(
            Array3::zeros((8, 8, 8)),
            diagonal_affine([1.0, 1.5, 2.0]),
            [1.0, 1.5, 2.0],
        );
        assert_eq!(img.voxel_volume_mm3(), 3.0);
        assert_eq!(img.len(), 512);
        assert!(!img.is_empty());
    }

    #[test]
    fn test_value_range_skips_non_finite() {
        let mut data = Array3::<f32>::zeros((8, 8, 8));
        data[(0, 0, 0)] = f32::NAN;
        data[(1, 0, 0)] = f32::INFINITY;
        data[(2, 0, 0)] = -3.0;
        data[(3, 0, 0)] = 7.5;
        let img = ImageData::from_volume(data, diagonal_affine([1.0; 3]), [1.0; 3]);
        assert_eq!(img.value_range(), Some((-3.0, 7.5)));

        let all_nan = Array3::<f32>::from_elem((8, 8, 8), f32::NAN);
        let img = ImageData::from_volume(all_nan, diagonal_affine([1.0; 3]), [1.0; 3]);
        assert_eq!(img.value_range(), None);
    }

    #[test]
    fn test_diagonal_affine() {
        let a = diagonal_affine([0.5, 2.0, 3.0]);
        assert_eq!(a.dim(), (4, 4));
        assert_eq!(a[(0, 0)], 0.5);
        assert_eq!(a[(1, 1)], 2.0);
        assert_eq!(a[(2, 2)], 3.0);
        assert_eq!(a[(3, 3)], 1.0);
        assert_eq!(a[(0, 3)], 0.0);
    }

    #[test]
    fn test_metadata_summary() {
        let img = ImageData::from_volume(
            Array3::zeros((8, 8, 8)),
            diagonal_affine([1.0; 3]),
            [1.0; 3],
        )
        .with_checksum("abc123")
        .with_source("/tmp/volume.nii.gz");
        let s = img.metadata_summary();
        assert!(s.contains("checksum=abc123"));
        assert!(s.contains("shape=[8, 8, 8]"));
        assert!(s.contains("/tmp/volume.nii.gz"));
        assert_eq!(img.checksum(), "abc123");
    }
}
