//! 百分位强度阈值与前景掩码.

use ndarray::{Array3, ArrayView3};
use num::ToPrimitive;
use ordered_float::OrderedFloat;

use crate::{PipelineError, PipelineResult};

/// 计算 `values` 的第 `q` 百分位数 (`0 <= q <= 100`), 在相邻两个次序统计量之间线性插值.
///
/// 与常见数值库的默认 (`linear`) 定义一致: 排序后秩为 `q / 100 * (n - 1)`.
/// `values` 为空, 或 `q` 不在 `[0, 100]` 内时返回 `None`.
///
/// 使用选择算法而不是完整排序, 期望复杂度 `O(n)`.
pub fn percentile<I>(values: I, q: f64) -> Option<f64>
where
    I: IntoIterator<Item = f32>,
{
    percentiles(values, [q]).map(|[v]| v)
}

/// 一次性计算多个百分位数. `values` 只被收集一次, 每个 `q` 各做一次选择.
///
/// 任一 `q` 不在 `[0, 100]` 内, 或 `values` 为空时返回 `None`.
pub fn percentiles<I, const N: usize>(values: I, qs: [f64; N]) -> Option<[f64; N]>
where
    I: IntoIterator<Item = f32>,
{
    if qs.iter().any(|q| !(0.0..=100.0).contains(q)) {
        return None;
    }
    let mut buf: Vec<OrderedFloat<f32>> = values.into_iter().map(OrderedFloat).collect();
    if buf.is_empty() {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, &q) in out.iter_mut().zip(&qs) {
        *slot = select_percentile(&mut buf, q)?;
    }
    Some(out)
}

/// 选择只会重排 `buf`, 不改变其中的值, 所以同一缓冲区可以反复使用.
fn select_percentile(buf: &mut [OrderedFloat<f32>], q: f64) -> Option<f64> {
    let n = buf.len();
    let rank = q / 100.0 * (n - 1) as f64;
    let lo = rank.floor().to_usize()?.min(n - 1);
    let frac = rank - lo as f64;

    let (_, lo_value, right) = buf.select_nth_unstable(lo);
    let lo_value = f64::from(lo_value.0);
    if frac == 0.0 {
        return Some(lo_value);
    }
    // 第 `lo + 1` 小的值是右半部分的最小值.
    let hi_value = right.iter().min().map_or(lo_value, |v| f64::from(v.0));
    Some(lo_value + (hi_value - lo_value) * frac)
}

/// 构建前景掩码: 强度不低于 `threshold` 的体素为前景.
///
/// 前景为空时返回 [`crate::ErrorKind::Processing`] 错误.
pub fn foreground_mask(volume: ArrayView3<'_, f32>, threshold: f64) -> PipelineResult<Array3<bool>> {
    let mask = volume.mapv(|v| f64::from(v) >= threshold);
    if !mask.iter().any(|&p| p) {
        return Err(PipelineError::processing(format!(
            "Foreground mask is empty: no voxel meets intensity threshold {threshold:.4}"
        ))
        .with_context("threshold", threshold)
        .with_context("foreground_voxels", 0.0));
    }
    Ok(mask)
}
