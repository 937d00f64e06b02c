//! 单元测试共用的合成体数据.

use ndarray::{s, Array2, Array3};

use crate::{diagonal_affine, ImageData};

/// `dim^3` 的零值体数据, 其中 `[start, start + side)^3` 的立方体取值 `value`.
pub(crate) fn cube_volume(dim: usize, start: usize, side: usize, value: f32) -> Array3<f32> {
    let mut data = Array3::<f32>::zeros((dim, dim, dim));
    let end = start + side;
    data.slice_mut(s![start..end, start..end, start..end]).fill(value);
    data
}

/// 以 `spacing` 构造对角仿射矩阵的体数据.
pub(crate) fn image_with_spacing(data: Array3<f32>, spacing: [f64; 3]) -> ImageData {
    ImageData::from_volume(data, diagonal_affine(spacing), spacing)
}

/// 各向同性 1 mm 体数据.
pub(crate) fn image_of(data: Array3<f32>) -> ImageData {
    image_with_spacing(data, [1.0; 3])
}

/// `64^3` 零值体数据, 中间 `(20..=29)^3` 为 100 的立方体, 间距 1 mm.
pub(crate) fn cube_image() -> ImageData {
    image_of(cube_volume(64, 20, 10, 100.0))
}

/// 沿线性索引递增的体数据, 方差非零.
pub(crate) fn ramp_volume(dim: usize) -> Array3<f32> {
    Array3::from_shape_fn((dim, dim, dim), |(x, y, z)| {
        ((x * dim + y) * dim + z) as f32
    })
}

/// 以 `rows` 为前三行, `[0, 0, 0, 1]` 为末行的仿射矩阵.
pub(crate) fn affine_from_rows(rows: [[f64; 4]; 3]) -> Array2<f64> {
    let mut a = Array2::<f64>::eye(4);
    for (i, row) in rows.iter().enumerate() {
        for (j, v) in row.iter().enumerate() {
            a[(i, j)] = *v;
        }
    }
    a
}
