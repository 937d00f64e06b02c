//! 带物理单位的靶区度量.

use std::fmt;

use log::debug;
use ndarray::arr1;
use num::ToPrimitive;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::segment::{BoundingBox, TargetRegion};
use crate::{Idx3d, ImageData, PipelineError, PipelineResult};

/// 三维实数坐标.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Point3 {
    /// x 分量.
    pub x: f64,
    /// y 分量.
    pub y: f64,
    /// z 分量.
    pub z: f64,
}

impl Point3 {
    /// 由 `[x, y, z]` 构建.
    #[inline]
    pub const fn from_array([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }

    /// 转为 `[x, y, z]`.
    #[inline]
    pub const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// 靶区度量. 所有长度以毫米为单位, 体积以立方毫米为单位.
///
/// 启用 `serde` feature 时序列化为
///
/// ```text
/// {
///   "volume_mm3": f64, "voxel_count": usize,
///   "centroid_voxel": {"x", "y", "z"}, "centroid_physical_mm": {"x", "y", "z"},
///   "bounding_box_voxel": {"x": [min, max], "y": [min, max], "z": [min, max]},
///   "spacing_mm": {"x", "y", "z"}, "extent_voxels": [x, y, z], "extent_mm": [x, y, z]
/// }
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Metrics {
    volume_mm3: f64,
    voxel_count: usize,
    centroid_voxel: Point3,
    centroid_physical_mm: Point3,
    bounding_box_voxel: BoundingBox,
    spacing_mm: Point3,
    extent_voxels: [usize; 3],
    extent_mm: [f64; 3],
}

impl Metrics {
    /// 体积, 立方毫米.
    #[inline]
    pub fn volume_mm3(&self) -> f64 {
        self.volume_mm3
    }

    /// 体素个数.
    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.voxel_count
    }

    /// 体素空间中的质心.
    #[inline]
    pub fn centroid_voxel(&self) -> Point3 {
        self.centroid_voxel
    }

    /// 经仿射变换后的物理质心, 毫米.
    #[inline]
    pub fn centroid_physical_mm(&self) -> Point3 {
        self.centroid_physical_mm
    }

    /// 体素空间包围盒.
    #[inline]
    pub fn bounding_box_voxel(&self) -> BoundingBox {
        self.bounding_box_voxel
    }

    /// 体素间距, 毫米.
    #[inline]
    pub fn spacing_mm(&self) -> Point3 {
        self.spacing_mm
    }

    /// 包围盒各轴跨越的体素个数.
    #[inline]
    pub fn extent_voxels(&self) -> [usize; 3] {
        self.extent_voxels
    }

    /// 包围盒各轴的物理长度, 毫米.
    #[inline]
    pub fn extent_mm(&self) -> [f64; 3] {
        self.extent_mm
    }

    /// 质心向下取整得到的体素索引.
    pub fn centroid_index(&self) -> Option<Idx3d> {
        let Point3 { x, y, z } = self.centroid_voxel;
        Some((
            x.floor().to_usize()?,
            y.floor().to_usize()?,
            z.floor().to_usize()?,
        ))
    }
}

/// 计算 `region` 的度量. `image` 提供间距与仿射矩阵.
///
/// # 错误
///
/// `region` 不是由 `image` 正确得到时 (体素数为零, 掩码形状不符,
/// 掩码中的体素数与记录不符, 或仿射矩阵不是 4x4), 返回
/// [`crate::ErrorKind::Invariant`] 错误. 该函数从不修正输入.
pub fn compute_metrics(region: &TargetRegion, image: &ImageData) -> PipelineResult<Metrics> {
    let voxel_count = region.voxel_count();
    if voxel_count == 0 {
        return Err(PipelineError::invariant(
            "Target region must contain at least one voxel",
        )
        .with_context("voxel_count", 0.0));
    }
    let (nx, ny, nz) = region.mask().dim();
    if image.shape() != [nx, ny, nz].as_slice() {
        return Err(PipelineError::invariant(format!(
            "Target mask shape {:?} does not match image shape {:?}",
            [nx, ny, nz],
            image.shape()
        )));
    }
    let affine = image.affine();
    if affine.dim() != (4, 4) {
        return Err(PipelineError::invariant(format!(
            "Affine matrix must be 4x4, got shape {:?}",
            affine.shape()
        )));
    }

    let mut counted = 0usize;
    let mut sums = [0u64; 3];
    for (x, y, z) in region.voxels() {
        counted += 1;
        for (s, v) in sums.iter_mut().zip([x, y, z]) {
            *s += v as u64;
        }
    }
    if counted != voxel_count {
        return Err(PipelineError::invariant(format!(
            "Target region records {voxel_count} voxels but its mask contains {counted}"
        ))
        .with_context("voxel_count", voxel_count as f64)
        .with_context("mask_voxels", counted as f64));
    }

    let n = voxel_count as f64;
    let centroid = sums.map(|s| s as f64 / n);
    let [cx, cy, cz] = centroid;
    let physical = affine.dot(&arr1(&[cx, cy, cz, 1.0]));

    let spacing = image.spacing();
    let bbox = region.bounding_box();
    let extent_voxels = bbox.extent();
    let extent_mm = [0, 1, 2].map(|axis| extent_voxels[axis] as f64 * spacing[axis]);

    let metrics = Metrics {
        volume_mm3: n * image.voxel_volume_mm3(),
        voxel_count,
        centroid_voxel: Point3::from_array(centroid),
        centroid_physical_mm: Point3::from_array([physical[0], physical[1], physical[2]]),
        bounding_box_voxel: bbox,
        spacing_mm: Point3::from_array(spacing),
        extent_voxels,
        extent_mm,
    };
    debug!(
        "metrics volume_mm3={:.3} voxel_count={} centroid_voxel={:?}",
        metrics.volume_mm3, metrics.voxel_count, centroid
    );
    Ok(metrics)
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        let Point3 { x: cx, y: cy, z: cz } = self.centroid_voxel;
        let Point3 { x: px, y: py, z: pz } = self.centroid_physical_mm;
        let Point3 { x: sx, y: sy, z: sz } = self.spacing_mm;
        let (lo, hi) = (self.bounding_box_voxel.min(), self.bounding_box_voxel.max());
        let [ex, ey, ez] = self.extent_voxels;
        let [mx, my, mz] = self.extent_mm;

        writeln!(f, "{rule}")?;
        writeln!(f, "TARGET REGION METRICS REPORT")?;
        writeln!(f, "{rule}")?;
        writeln!(f)?;
        writeln!(f, "VOLUME:")?;
        writeln!(f, "  Total volume: {:.2} mm³", self.volume_mm3)?;
        writeln!(f, "  Voxel count: {}", self.voxel_count)?;
        writeln!(f)?;
        writeln!(f, "CENTROID (Voxel Coordinates):")?;
        writeln!(f, "  X: {cx:.2}")?;
        writeln!(f, "  Y: {cy:.2}")?;
        writeln!(f, "  Z: {cz:.2}")?;
        writeln!(f)?;
        writeln!(f, "CENTROID (Physical Coordinates):")?;
        writeln!(f, "  X: {px:.2} mm")?;
        writeln!(f, "  Y: {py:.2} mm")?;
        writeln!(f, "  Z: {pz:.2} mm")?;
        writeln!(f)?;
        writeln!(f, "BOUNDING BOX (Voxel Space):")?;
        writeln!(f, "  X: [{}, {}]", lo[0], hi[0])?;
        writeln!(f, "  Y: [{}, {}]", lo[1], hi[1])?;
        writeln!(f, "  Z: [{}, {}]", lo[2], hi[2])?;
        writeln!(f)?;
        writeln!(f, "BOUNDING BOX DIMENSIONS:")?;
        writeln!(f, "  Width:  {ex} voxels ({mx:.2} mm)")?;
        writeln!(f, "  Height: {ey} voxels ({my:.2} mm)")?;
        writeln!(f, "  Depth:  {ez} voxels ({mz:.2} mm)")?;
        writeln!(f)?;
        writeln!(f, "VOXEL SPACING:")?;
        writeln!(f, "  X: {sx:.3} mm")?;
        writeln!(f, "  Y: {sy:.3} mm")?;
        writeln!(f, "  Z: {sz:.3} mm")?;
        write!(f, "{rule}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessingConfig;
    use crate::segment::identify_target;
    use crate::test_utils::{affine_from_rows, cube_image, cube_volume, image_of};
    use crate::ErrorKind;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    fn cube_metrics(image: &ImageData) -> Metrics {
        let cfg = ProcessingConfig::new(99.7, 100.0, 42).unwrap();
        let region = identify_target(image, &cfg).unwrap();
        compute_metrics(&region, image).unwrap()
    }

    #[test]
    fn test_cube_scenario() {
        let m = cube_metrics(&cube_image());
        assert_eq!(m.volume_mm3(), 1000.0);
        assert_eq!(m.voxel_count(), 1000);
        assert_eq!(m.centroid_voxel().to_array(), [24.5; 3]);
        assert_eq!(m.centroid_physical_mm().to_array(), [24.5; 3]);
        assert_eq!(m.bounding_box_voxel().min(), [20; 3]);
        assert_eq!(m.bounding_box_voxel().max(), [29; 3]);
        assert_eq!(m.extent_voxels(), [10; 3]);
        assert_eq!(m.extent_mm(), [10.0; 3]);
        assert_eq!(m.centroid_index(), Some((24, 24, 24)));
    }

    #[test]
    fn test_physical_centroid_uses_affine() {
        let affine = affine_from_rows([
            [2.0, 0.0, 0.0, -10.0],
            [0.0, 2.0, 0.0, 5.0],
            [0.0, 0.0, 3.0, 0.0],
        ]);
        let image = ImageData::from_volume(cube_volume(64, 20, 10, 100.0), affine, [2.0, 2.0, 3.0]);
        let m = cube_metrics(&image);
        assert_relative_eq!(m.volume_mm3(), 12_000.0);
        let p = m.centroid_physical_mm();
        assert_relative_eq!(p.x, 39.0);
        assert_relative_eq!(p.y, 54.0);
        assert_relative_eq!(p.z, 73.5);
        assert_eq!(m.extent_mm(), [20.0, 20.0, 30.0]);
        assert_eq!(m.spacing_mm().to_array(), [2.0, 2.0, 3.0]);
    }

    #[test]
    fn test_asymmetric_centroid() {
        let mut mask = Array3::from_elem((8, 8, 8), false);
        for p in [(0usize, 0, 0), (1, 0, 0), (0, 2, 0)] {
            mask[p] = true;
        }
        let bbox = BoundingBox::new([0, 0, 0], [1, 2, 0]).unwrap();
        let region = TargetRegion::from_parts(mask, 3, bbox);
        let m = compute_metrics(&region, &image_of(Array3::zeros((8, 8, 8)))).unwrap();
        let c = m.centroid_voxel();
        assert_relative_eq!(c.x, 1.0 / 3.0);
        assert_relative_eq!(c.y, 2.0 / 3.0);
        assert_eq!(c.z, 0.0);
        assert_eq!(m.centroid_index(), Some((0, 0, 0)));
    }

    #[test]
    fn test_broken_region_is_invariant_error() {
        let image = image_of(Array3::zeros((8, 8, 8)));
        let bbox = BoundingBox::new([0; 3], [0; 3]).unwrap();

        let empty = TargetRegion::from_parts(Array3::from_elem((8, 8, 8), false), 0, bbox);
        let err = compute_metrics(&empty, &image).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invariant);

        let mut mask = Array3::from_elem((8, 8, 8), false);
        mask[(0, 0, 0)] = true;
        let miscounted = TargetRegion::from_parts(mask, 2, bbox);
        let err = compute_metrics(&miscounted, &image).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invariant);
        assert_eq!(err.context_value("mask_voxels"), Some(1.0));

        let mut mask = Array3::from_elem((8, 8, 9), false);
        mask[(0, 0, 0)] = true;
        let misshaped = TargetRegion::from_parts(mask, 1, bbox);
        let err = compute_metrics(&misshaped, &image).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invariant);
        assert!(err.message().contains("does not match"));
    }

    #[test]
    fn test_report_format() {
        let report = cube_metrics(&cube_image()).to_string();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "=".repeat(60));
        assert_eq!(lines[1], "TARGET REGION METRICS REPORT");
        assert!(lines.contains(&"  Total volume: 1000.00 mm³"));
        assert!(lines.contains(&"  Voxel count: 1000"));
        assert!(lines.contains(&"  X: 24.50 mm"));
        assert!(lines.contains(&"  Z: [20, 29]"));
        assert!(lines.contains(&"  Width:  10 voxels (10.00 mm)"));
        assert!(lines.contains(&"  Y: 1.000 mm"));
        assert_eq!(lines.last().copied(), Some("=".repeat(60).as_str()));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_json_shape() {
        let value = serde_json::to_value(cube_metrics(&cube_image())).unwrap();
        assert_eq!(value["volume_mm3"], 1000.0);
        assert_eq!(value["voxel_count"], 1000);
        assert_eq!(
            value["centroid_voxel"],
            serde_json::json!({"x": 24.5, "y": 24.5, "z": 24.5})
        );
        assert_eq!(value["centroid_physical_mm"]["z"], 24.5);
        assert_eq!(
            value["bounding_box_voxel"],
            serde_json::json!({"x": [20, 29], "y": [20, 29], "z": [20, 29]})
        );
        assert_eq!(value["extent_voxels"], serde_json::json!([10, 10, 10]));
    }
}
