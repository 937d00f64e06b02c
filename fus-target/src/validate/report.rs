//! 校验报告.

use std::fmt;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::ErrorKind;

/// 单项检查的严重程度.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "lowercase"))]
pub enum Severity {
    /// 未通过即阻断流水线.
    Error,

    /// 仅提示, 永不阻断.
    Warning,
}

/// 检查所属的校验层. 顺序即执行顺序.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize), serde(rename_all = "snake_case"))]
pub enum CheckCategory {
    /// 维数与轴长.
    Dimensionality,

    /// 仿射矩阵.
    Affine,

    /// 体素间距.
    Spacing,

    /// NaN / 无穷值 / 方差.
    DataQuality,
}

impl CheckCategory {
    /// 该层失败时对应的错误类别.
    pub const fn error_kind(self) -> ErrorKind {
        match self {
            CheckCategory::Dimensionality => ErrorKind::Dimensionality,
            CheckCategory::Affine | CheckCategory::Spacing => ErrorKind::Metadata,
            CheckCategory::DataQuality => ErrorKind::DataQuality,
        }
    }
}

/// 单项检查结果.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CheckResult {
    /// 检查名, 形如 `affine.determinant`.
    pub name: &'static str,

    /// 所属校验层.
    pub category: CheckCategory,

    /// 是否通过.
    pub passed: bool,

    /// 未通过时的严重程度.
    pub severity: Severity,

    /// 可读信息.
    pub message: String,
}

impl CheckResult {
    /// 是否是阻断性的失败.
    #[inline]
    pub fn is_error(&self) -> bool {
        !self.passed && self.severity == Severity::Error
    }

    /// 是否是警告.
    #[inline]
    pub fn is_warning(&self) -> bool {
        !self.passed && self.severity == Severity::Warning
    }
}

/// 按执行顺序排列的检查结果序列.
///
/// 两次校验同一个体数据得到的报告逐项相等.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ValidationReport {
    checks: Vec<CheckResult>,
}

impl ValidationReport {
    /// 记录一项通过的检查.
    pub(crate) fn pass(
        &mut self,
        category: CheckCategory,
        name: &'static str,
        message: impl Into<String>,
    ) {
        self.push(category, name, true, Severity::Error, message);
    }

    /// 记录一项阻断性失败.
    pub(crate) fn fail(
        &mut self,
        category: CheckCategory,
        name: &'static str,
        message: impl Into<String>,
    ) {
        self.push(category, name, false, Severity::Error, message);
    }

    /// 记录一项警告.
    pub(crate) fn warn(
        &mut self,
        category: CheckCategory,
        name: &'static str,
        message: impl Into<String>,
    ) {
        self.push(category, name, false, Severity::Warning, message);
    }

    fn push(
        &mut self,
        category: CheckCategory,
        name: &'static str,
        passed: bool,
        severity: Severity,
        message: impl Into<String>,
    ) {
        self.checks.push(CheckResult {
            name,
            category,
            passed,
            severity,
            message: message.into(),
        });
    }

    /// 不存在阻断性失败时为 `true`. 警告不影响结果.
    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.checks.iter().any(CheckResult::is_error)
    }

    /// 全部检查结果.
    #[inline]
    pub fn checks(&self) -> &[CheckResult] {
        &self.checks
    }

    /// 通过的检查.
    pub fn passed(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| c.passed)
    }

    /// 警告.
    pub fn warnings(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| c.is_warning())
    }

    /// 阻断性失败.
    pub fn errors(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| c.is_error())
    }

    /// 某一校验层中的阻断性失败.
    pub fn errors_in(&self, category: CheckCategory) -> impl Iterator<Item = &CheckResult> {
        self.errors().filter(move |c| c.category == category)
    }

    /// 第一个出现阻断性失败的校验层.
    pub fn first_failed_category(&self) -> Option<CheckCategory> {
        self.errors().map(|c| c.category).min()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Validation Summary:")?;
        writeln!(f, "  Checks passed: {}", self.passed().count())?;
        writeln!(f, "  Warnings: {}", self.warnings().count())?;
        write!(f, "  Errors: {}", self.errors().count())?;
        if self.warnings().next().is_some() {
            write!(f, "\n\nWarnings:")?;
            for w in self.warnings() {
                write!(f, "\n  - {}", w.message)?;
            }
        }
        if self.errors().next().is_some() {
            write!(f, "\n\nErrors:")?;
            for e in self.errors() {
                write!(f, "\n  - {}", e.message)?;
            }
        }
        Ok(())
    }
}
