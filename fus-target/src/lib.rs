#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 对单个 3D 医学影像体数据进行校验, 识别聚焦超声候选治疗靶区,
//! 并输出带物理单位的度量结果.
//!
//! 该 crate 目前仅提供 `safe` 接口. 所有非法输入都通过 [`PipelineError`]
//! 显式返回, 不会被静默修正.
//!
//! # 注意
//!
//! 1. 输入体数据以 `[x, y, z]` 体素索引组织, 与 NIfTI 文件的存储顺序一致.
//!   仿射矩阵将 `(x, y, z, 1)` 映射到以毫米为单位的物理坐标.
//! 2. 单次运行内的所有步骤都是单线程、确定性的. 相同输入必然得到逐位相同的结果.
//!
//! # 开发计划
//!
//! ### 分层输入校验 ✅
//!
//! 维度 -> 仿射矩阵 -> 体素间距 -> 数据质量, 结构性错误立即终止,
//! 数据质量问题一次性汇总报告.
//!
//! 实现位于 `fus-target/src/validate`.
//!
//! ### 靶区识别 ✅
//!
//! 百分位强度阈值 -> 26-邻域连通域标记 (并查集, 非递归) -> 最大连通域.
//! 并列时选取首个体素 (行优先线性索引) 最靠前的连通域.
//!
//! 实现位于 `fus-target/src/segment`.
//!
//! ### 物理度量 ✅
//!
//! 体积 (立方毫米), 体素质心, 物理质心 (经仿射变换), 包围盒.
//!
//! 实现位于 `fus-target/src/metrics.rs`.
//!
//! ### 数据加载 ✅
//!
//! NIfTI (`.nii`, `.nii.gz`) 与 `.npy` 体数据, 附带 SHA-256 校验和.
//!
//! 实现位于 `fus-target/src/data/load.rs`.
//!
//! ### 正交切片可视化 ✅
//!
//! 实现位于 `fus-target/src/render.rs`.

/// 三维索引, 同时也可一定程度上用作非负整数向量. 顺序为 `(x, y, z)`.
pub type Idx3d = (usize, usize, usize);

pub mod consts;

pub mod config;

/// 体数据基础结构与加载.
mod data;

pub use data::{diagonal_affine, file_checksum, ImageData};

pub mod error;

pub use error::{ErrorKind, LoadError, PipelineError, PipelineResult};

pub mod metrics;
pub mod pipeline;
pub mod prelude;
pub mod render;
pub mod segment;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_utils;
