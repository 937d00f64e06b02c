//! 正交切片可视化与靶区掩码导出.
//!
//! 切片经过质心 (向下取整), 每个方向一幅面板, 从左到右排列.
//! 面板中横轴为剩余两轴中的前一个, 纵轴为后一个且向上增长.

use std::path::Path;

use image::{Rgb, RgbImage};
use ndarray::{ArrayView2, ArrayView3, Axis};
use ndarray_npy::write_npy;
use num::ToPrimitive;
use thiserror::Error;

use crate::config::VisualizationConfig;
use crate::consts::{color, defaults};
use crate::metrics::Metrics;
use crate::segment::{percentiles, TargetRegion};
use crate::{ImageData, PipelineError, PipelineResult};

/// 输出可视化产物时的错误.
#[derive(Debug, Error)]
pub enum RenderError {
    /// 输入不一致.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// 图像编码或写入失败.
    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),

    /// npy 写入失败.
    #[error("failed to write mask: {0}")]
    Npy(#[from] ndarray_npy::WriteNpyError),
}

/// 灰度显示窗口. `[lower, upper]` 线性映射到 `[0, 255]`.
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntensityWindow {
    lower: f32,
    upper: f32,
}

impl IntensityWindow {
    /// 构建窗口. 要求两端有限且 `lower <= upper`, 否则返回 `None`.
    ///
    /// 允许 `lower == upper`, 此时窗口退化为二值化.
    pub fn new(lower: f32, upper: f32) -> Option<Self> {
        (lower.is_finite() && upper.is_finite() && lower <= upper)
            .then_some(Self { lower, upper })
    }

    /// 以 `volume` 的第 `lo` 与第 `hi` 百分位作为窗口两端.
    pub fn from_percentiles(volume: ArrayView3<'_, f32>, lo: f64, hi: f64) -> Option<Self> {
        let [lower, upper] = percentiles(volume.iter().copied(), [lo, hi])?;
        Self::new(lower.to_f32()?, upper.to_f32()?)
    }

    /// 窗下限.
    #[inline]
    pub fn lower(&self) -> f32 {
        self.lower
    }

    /// 窗上限.
    #[inline]
    pub fn upper(&self) -> f32 {
        self.upper
    }

    /// 求 `v` 对应的灰度值. `v` 无意义 (inf, NaN) 时返回 `None`.
    pub fn eval(&self, v: f32) -> Option<u8> {
        if !v.is_finite() {
            return None;
        }
        if v <= self.lower {
            Some(u8::MIN)
        } else if v >= self.upper {
            Some(u8::MAX)
        } else {
            // 255, not 256.
            Some(((v - self.lower) / (self.upper - self.lower) * 255.0) as u8)
        }
    }
}

/// 一幅面板: 同一平面上的扫描与掩码.
struct Panel<'a> {
    scan: ArrayView2<'a, f32>,
    mask: ArrayView2<'a, bool>,
}

impl Panel<'_> {
    /// 像素宽高 (放大前).
    fn size(&self) -> PipelineResult<(u32, u32)> {
        let (w, h) = self.scan.dim();
        Ok((to_px(w)?, to_px(h)?))
    }

    /// `(u, v)` 是否位于靶区轮廓上: 在掩码内且至少一个 4-邻居在掩码外 (或越界).
    fn on_contour(&self, (u, v): (usize, usize)) -> bool {
        let inside = |p: (usize, usize)| matches!(self.mask.get(p), Some(&true));
        inside((u, v))
            && [
                (u.wrapping_sub(1), v),
                (u.saturating_add(1), v),
                (u, v.wrapping_sub(1)),
                (u, v.saturating_add(1)),
            ]
            .into_iter()
            .any(|p| !inside(p))
    }

    fn draw(&self, canvas: &mut RgbImage, left: u32, window: &IntensityWindow, scale: u32) -> PipelineResult<()> {
        let (_, height) = self.size()?;
        for ((u, v), &value) in self.scan.indexed_iter() {
            let rgb = if self.on_contour((u, v)) {
                color::CONTOUR
            } else {
                let g = window.eval(value).unwrap_or(u8::MIN);
                [g, g, g]
            };
            let x = (left + to_px(u)?) * scale;
            let y = (height - 1 - to_px(v)?) * scale;
            for dy in 0..scale {
                for dx in 0..scale {
                    canvas.put_pixel(x + dx, y + dy, Rgb(rgb));
                }
            }
        }
        Ok(())
    }
}

fn to_px(n: usize) -> PipelineResult<u32> {
    n.to_u32().ok_or_else(|| {
        PipelineError::invariant("Slice is too large to render").with_context("pixels", n as f64)
    })
}

/// 绘制经过靶区质心的正交切片.
///
/// 强度以体数据第 1 与第 99 百分位为窗口映射到灰度, 靶区轮廓以红色绘制.
/// 面板之间以黑色分隔, 最后每个体素放大为 `scale * scale` 个像素.
///
/// # 错误
///
/// `image` 不是三维数据, 或 `region`, `metrics` 与 `image` 不一致时返回错误.
pub fn render_slices(
    image: &ImageData,
    region: &TargetRegion,
    metrics: &Metrics,
    config: &VisualizationConfig,
) -> PipelineResult<RgbImage> {
    let volume = image.volume().ok_or_else(|| {
        PipelineError::dimensionality(format!(
            "Slice rendering requires 3D data, got {}D array",
            image.ndim()
        ))
    })?;
    let mask = region.mask();
    if volume.dim() != mask.dim() {
        return Err(PipelineError::invariant(format!(
            "Target mask shape {:?} does not match image shape {:?}",
            mask.dim(),
            volume.dim()
        )));
    }
    let (cx, cy, cz) = metrics
        .centroid_index()
        .ok_or_else(|| PipelineError::invariant("Centroid is not a valid voxel index"))?;
    let center = [cx, cy, cz];
    let window = IntensityWindow::from_percentiles(
        volume,
        defaults::WINDOW_LOW_PERCENTILE,
        defaults::WINDOW_HIGH_PERCENTILE,
    )
    .ok_or_else(|| PipelineError::invariant("Cannot derive a display window from the volume"))?;

    let panels = config
        .axes()
        .iter()
        .map(|axis| {
            let k = axis.fixed_axis();
            let idx = center[k];
            if idx >= volume.len_of(Axis(k)) {
                return Err(PipelineError::invariant(format!(
                    "Centroid index {idx} is outside the {axis} axis"
                )));
            }
            Ok(Panel {
                scan: volume.index_axis(Axis(k), idx),
                mask: mask.index_axis(Axis(k), idx),
            })
        })
        .collect::<PipelineResult<Vec<_>>>()?;

    let sizes = panels
        .iter()
        .map(Panel::size)
        .collect::<PipelineResult<Vec<_>>>()?;
    let gutters = to_px(panels.len().saturating_sub(1))? * color::GUTTER_WIDTH;
    let width = sizes.iter().map(|(w, _)| w).sum::<u32>() + gutters;
    let height = sizes.iter().map(|&(_, h)| h).max().unwrap_or(0);

    let scale = config.scale();
    let mut canvas = RgbImage::from_pixel(width * scale, height * scale, Rgb(color::GUTTER));
    let mut left = 0;
    for (panel, (w, _)) in panels.iter().zip(&sizes) {
        panel.draw(&mut canvas, left, &window, scale)?;
        left += w + color::GUTTER_WIDTH;
    }
    Ok(canvas)
}

/// 绘制正交切片并以 PNG 等格式 (由扩展名决定) 保存到 `path`.
pub fn save_slices<P: AsRef<Path>>(
    image: &ImageData,
    region: &TargetRegion,
    metrics: &Metrics,
    config: &VisualizationConfig,
    path: P,
) -> Result<(), RenderError> {
    render_slices(image, region, metrics, config)?.save(path)?;
    Ok(())
}

/// 将靶区掩码以 `u8` (0/1) 写入 `.npy` 文件.
pub fn save_mask_npy<P: AsRef<Path>>(region: &TargetRegion, path: P) -> Result<(), RenderError> {
    write_npy(path, &region.mask().mapv(u8::from))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProcessingConfig, SliceAxis};
    use crate::pipeline::run;
    use crate::test_utils::cube_image;
    use ndarray::{Array3, Axis};
    use ndarray_npy::read_npy;

    fn cube_outcome() -> (ImageData, TargetRegion, Metrics) {
        let image = cube_image();
        let cfg = ProcessingConfig::new(99.7, 100.0, 42).unwrap();
        let (_, region, metrics) = run(&image, &cfg).unwrap().into_parts();
        (image, region, metrics)
    }

    #[test]
    fn test_window_invalid_input() {
        assert!(IntensityWindow::new(1.0, 0.0).is_none());
        assert!(IntensityWindow::new(f32::NAN, 1.0).is_none());
        assert!(IntensityWindow::new(0.0, f32::INFINITY).is_none());
        assert!(IntensityWindow::new(3.0, 3.0).is_some());
    }

    #[test]
    fn test_window_eval() {
        let w = IntensityWindow::new(60.0, 100.0).unwrap();
        assert_eq!(w.eval(f32::NAN), None);
        assert_eq!(w.eval(f32::MIN), Some(0));
        assert_eq!(w.eval(f32::MAX), Some(255));
        assert_eq!(w.eval(60.0), Some(0));
        assert_eq!(w.eval(80.0), Some(127));
        assert_eq!(w.eval(100.0), Some(255));

        // 退化窗口.
        let w = IntensityWindow::new(0.0, 0.0).unwrap();
        assert_eq!(w.eval(0.0), Some(0));
        assert_eq!(w.eval(0.5), Some(255));
    }

    #[test]
    fn test_window_from_percentiles() {
        let ramp = Array3::from_shape_fn((5, 5, 4), |(x, y, z)| ((x * 5 + y) * 4 + z) as f32);
        let w = IntensityWindow::from_percentiles(ramp.view(), 1.0, 99.0).unwrap();
        assert!((w.lower() - 0.99).abs() < 1e-5);
        assert!((w.upper() - 98.01).abs() < 1e-4);
        assert!(IntensityWindow::from_percentiles(ramp.view(), 99.0, 1.0).is_none());
        assert!(IntensityWindow::from_percentiles(ramp.view(), 1.0, 120.0).is_none());
    }

    #[test]
    fn test_render_single_axial_panel() {
        let (image, region, metrics) = cube_outcome();
        let cfg = VisualizationConfig::new(true, vec![SliceAxis::Axial], 1).unwrap();
        let img = render_slices(&image, &region, &metrics, &cfg).unwrap();
        assert_eq!(img.dimensions(), (64, 64));
        // 纵轴向上增长: y 体素索引 v 对应像素行 63 - v.
        assert_eq!(img.get_pixel(24, 63 - 24).0, [255, 255, 255]);
        assert_eq!(img.get_pixel(20, 63 - 24).0, color::CONTOUR);
        assert_eq!(img.get_pixel(24, 63 - 29).0, color::CONTOUR);
        assert_eq!(img.get_pixel(5, 5).0, [0, 0, 0]);
    }

    #[test]
    fn test_render_default_layout() {
        let (image, region, metrics) = cube_outcome();
        let cfg = VisualizationConfig::default();
        let img = render_slices(&image, &region, &metrics, &cfg).unwrap();
        let gutter = color::GUTTER_WIDTH;
        assert_eq!(img.dimensions(), ((64 * 3 + gutter * 2) * 2, 64 * 2));
        // 第二幅面板从 (64 + gutter) * 2 开始, 放大后同一体素占 2x2 像素.
        let left = (64 + gutter) * 2;
        let (x, y) = (left + 24 * 2, (63 - 24) * 2);
        assert_eq!(img.get_pixel(x, y), img.get_pixel(x + 1, y + 1));
        assert_eq!(img.get_pixel(x, y).0, [255, 255, 255]);
        assert_eq!(img.get_pixel(64 * 2, 0).0, color::GUTTER);
    }

    #[test]
    fn test_render_rejects_foreign_region() {
        let (_, region, metrics) = cube_outcome();
        let other = crate::test_utils::image_of(Array3::zeros((32, 32, 32)));
        let err = render_slices(&other, &region, &metrics, &VisualizationConfig::default())
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Invariant);
    }

    #[test]
    fn test_save_artifacts() {
        let (image, region, metrics) = cube_outcome();
        let dir = tempfile::tempdir().unwrap();

        let mask_path = dir.path().join("target_mask.npy");
        save_mask_npy(&region, &mask_path).unwrap();
        let mask: Array3<u8> = read_npy(&mask_path).unwrap();
        assert_eq!(mask.dim(), (64, 64, 64));
        assert_eq!(mask.iter().map(|&v| usize::from(v)).sum::<usize>(), 1000);
        assert_eq!(mask.index_axis(Axis(0), 25)[(25, 25)], 1);

        let png_path = dir.path().join("target_slices.png");
        let cfg = VisualizationConfig::new(true, vec![SliceAxis::Coronal], 1).unwrap();
        save_slices(&image, &region, &metrics, &cfg, &png_path).unwrap();
        let decoded = image::open(&png_path).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (64, 64));
    }
}
