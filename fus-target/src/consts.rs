//! 通用常量.

/// 空间维数. 流水线只接受三维体数据.
pub const NDIM: usize = 3;

/// 输入校验阈值.
pub mod limits {
    /// 单个轴向上允许的最小体素个数.
    pub const MIN_AXIS_LEN: usize = 8;

    /// 单个轴向上允许的最大体素个数.
    pub const MAX_AXIS_LEN: usize = 2048;

    /// 体素间距硬下限 (毫米). 10 微米.
    pub const MIN_SPACING_MM: f64 = 0.01;

    /// 体素间距硬上限 (毫米). 5 厘米.
    pub const MAX_SPACING_MM: f64 = 50.0;

    /// 常见体素间距下限 (毫米). 低于它只产生警告.
    pub const TYPICAL_MIN_SPACING_MM: f64 = 0.1;

    /// 常见体素间距上限 (毫米). 高于它只产生警告.
    pub const TYPICAL_MAX_SPACING_MM: f64 = 10.0;

    /// 仿射矩阵左上 3x3 子矩阵行列式绝对值的下限. 不超过该值即视为奇异.
    pub const AFFINE_DET_EPSILON: f64 = 1e-10;

    /// 标准差下限. 低于它的体数据被视为常量 (或已损坏).
    pub const MIN_INTENSITY_STD: f64 = 1e-10;
}

/// 处理参数默认值.
pub mod defaults {
    /// 默认强度阈值百分位.
    pub const INTENSITY_THRESHOLD_PERCENTILE: f64 = 70.0;

    /// 默认最小连通域体积 (立方毫米).
    pub const MINIMUM_COMPONENT_VOLUME_MM3: f64 = 100.0;

    /// 默认随机种子. 仅作审计记录.
    pub const RANDOM_SEED: u64 = 42;

    /// 切片图像默认放大倍率.
    pub const SLICE_SCALE: u32 = 2;

    /// 切片图像允许的最大放大倍率.
    pub const MAX_SLICE_SCALE: u32 = 8;

    /// 切片可视化窗口下限百分位.
    pub const WINDOW_LOW_PERCENTILE: f64 = 1.0;

    /// 切片可视化窗口上限百分位.
    pub const WINDOW_HIGH_PERCENTILE: f64 = 99.0;
}

/// 单通道/三通道颜色.
pub mod color {
    /// 靶区轮廓颜色.
    pub const CONTOUR: [u8; 3] = [0xff, 0x20, 0x20];

    /// 切片面板之间的分隔颜色.
    pub const GUTTER: [u8; 3] = [0x00, 0x00, 0x00];

    /// 切片面板之间的分隔宽度 (像素, 放大前).
    pub const GUTTER_WIDTH: u32 = 2;
}
