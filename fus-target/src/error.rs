//! 流水线运行时错误.
//!
//! 所有致命错误都是同一个 [`PipelineError`], 通过 [`ErrorKind`] 区分类别,
//! 并携带可读信息和结构化上下文 (计数, 实测值, 被突破的阈值).

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// 流水线运行结果.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// 错误类别.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ErrorKind {
    /// 维数或轴长不合法.
    Dimensionality,

    /// 仿射矩阵或体素间距不合法.
    Metadata,

    /// 体数据包含 NaN, 无穷值, 或方差为零.
    DataQuality,

    /// 阈值后前景为空, 或最大连通域体积不足.
    Processing,

    /// 无法读取或解码输入文件.
    ImageLoad,

    /// 配置参数不合法.
    Configuration,

    /// 内部不变量被破坏. 正确构造的数据不会触发它.
    Invariant,
}

impl ErrorKind {
    /// 错误类别名.
    pub const fn name(self) -> &'static str {
        match self {
            ErrorKind::Dimensionality => "DimensionalityError",
            ErrorKind::Metadata => "MetadataError",
            ErrorKind::DataQuality => "DataQualityError",
            ErrorKind::Processing => "ProcessingError",
            ErrorKind::ImageLoad => "ImageLoadError",
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::Invariant => "InvariantError",
        }
    }

    /// 是否属于输入校验阶段的错误.
    #[inline]
    pub const fn is_validation(self) -> bool {
        matches!(
            self,
            ErrorKind::Dimensionality | ErrorKind::Metadata | ErrorKind::DataQuality
        )
    }

    /// 命令行入口使用的非零退出码. 每个类别一个, 保持稳定.
    pub const fn exit_code(self) -> u8 {
        match self {
            ErrorKind::ImageLoad => 2,
            ErrorKind::Configuration => 3,
            ErrorKind::Dimensionality => 4,
            ErrorKind::Metadata => 5,
            ErrorKind::DataQuality => 6,
            ErrorKind::Processing => 7,
            ErrorKind::Invariant => 70,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 流水线错误.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct PipelineError {
    kind: ErrorKind,
    message: String,
    context: Vec<(&'static str, f64)>,
}

impl PipelineError {
    /// 以类别和可读信息创建错误.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// 创建 [`ErrorKind::Dimensionality`] 错误.
    #[inline]
    pub fn dimensionality(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dimensionality, message)
    }

    /// 创建 [`ErrorKind::Metadata`] 错误.
    #[inline]
    pub fn metadata(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Metadata, message)
    }

    /// 创建 [`ErrorKind::DataQuality`] 错误.
    #[inline]
    pub fn data_quality(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DataQuality, message)
    }

    /// 创建 [`ErrorKind::Processing`] 错误.
    #[inline]
    pub fn processing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Processing, message)
    }

    /// 创建 [`ErrorKind::Configuration`] 错误.
    #[inline]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// 创建 [`ErrorKind::Invariant`] 错误.
    #[inline]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invariant, message)
    }

    /// 追加一条结构化上下文.
    #[must_use]
    pub fn with_context(mut self, key: &'static str, value: f64) -> Self {
        self.context.push((key, value));
        self
    }

    /// 错误类别.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 可读信息 (不含类别名).
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 全部结构化上下文, 按追加顺序排列.
    #[inline]
    pub fn context(&self) -> &[(&'static str, f64)] {
        &self.context
    }

    /// 按键名查找上下文值. 同名时返回最先追加的那个.
    pub fn context_value(&self, key: &str) -> Option<f64> {
        self.context
            .iter()
            .find_map(|(k, v)| (*k == key).then_some(*v))
    }
}

/// 加载体数据文件时的错误.
#[derive(Debug, Error)]
pub enum LoadError {
    /// 文件不存在.
    #[error("file does not exist: {}", .0.display())]
    Missing(PathBuf),

    /// 不支持的文件扩展名.
    #[error("unsupported file extension of `{}`, expected .nii, .nii.gz or .npy", .0.display())]
    Extension(PathBuf),

    /// `.npy` 文件不携带体素间距, 必须由调用方提供.
    #[error("voxel spacing must be supplied for `{}`", .0.display())]
    MissingSpacing(PathBuf),

    /// 底层 I/O 错误.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// NIfTI 解码错误.
    #[error("failed to decode NIfTI volume: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// npy 解码错误.
    #[error("failed to decode npy volume: {0}")]
    Npy(#[from] ndarray_npy::ReadNpyError),
}

impl From<LoadError> for PipelineError {
    fn from(e: LoadError) -> Self {
        PipelineError::new(ErrorKind::ImageLoad, e.to_string())
    }
}
