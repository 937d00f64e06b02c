//! 运行配置的查找, 解析与命令行覆盖.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use fus_target::prelude::*;
use serde::Deserialize;

use crate::cli::{Cli, LogLevel};

/// 指定配置文件的环境变量.
pub const CONFIG_ENV: &str = "FUS_RUN_CONFIG";

/// 用户配置目录下的默认配置文件.
const CONFIG_FILE: [&str; 2] = ["fus-run", "config.json"];

/// 一次运行的全部设置.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub output_directory: PathBuf,
    pub processing: ProcessingConfig,
    pub visualization: VisualizationConfig,
    pub log_level: LogLevel,
    pub write_mask: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("output"),
            processing: ProcessingConfig::default(),
            visualization: VisualizationConfig::default(),
            log_level: LogLevel::default(),
            write_mask: true,
        }
    }
}

impl Settings {
    /// 配置文件路径:
    ///
    /// 1. 如果给出了 `--config`, 返回它;
    /// 2. 如果设置了 `$FUS_RUN_CONFIG`, 返回它;
    /// 3. 如果用户配置目录下存在 `fus-run/config.json`, 返回它;
    /// 4. 否则返回 `None`, 使用默认设置.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        locate_with(explicit, env::var_os(CONFIG_ENV), dirs::config_dir())
    }

    /// 从 JSON 文件读取. 缺省字段取默认值, 未知字段视为错误.
    pub fn from_file<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::configuration(format!(
                "Cannot read configuration file {}: {e}",
                path.display()
            ))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            PipelineError::configuration(format!(
                "Invalid configuration file {}: {e}",
                path.display()
            ))
        })
    }

    /// 按查找顺序读取配置, 再用命令行参数覆盖.
    pub fn resolve(cli: &Cli) -> PipelineResult<(Self, Option<PathBuf>)> {
        let path = Self::locate(cli.config.as_deref());
        let settings = match &path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        Ok((settings.overridden_by(cli)?, path))
    }

    /// 命令行参数优先于配置文件.
    pub fn overridden_by(mut self, cli: &Cli) -> PipelineResult<Self> {
        if cli.overrides_processing() {
            let p = &self.processing;
            self.processing = ProcessingConfig::new(
                cli.percentile.unwrap_or(p.intensity_threshold_percentile()),
                cli.min_volume.unwrap_or(p.minimum_component_volume_mm3()),
                cli.seed.unwrap_or(p.random_seed()),
            )?;
        }
        if let Some(dir) = &cli.output_dir {
            self.output_directory = dir.clone();
        }
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        if cli.no_slices {
            self.visualization = self.visualization.disabled();
        }
        if cli.no_mask {
            self.write_mask = false;
        }
        Ok(self)
    }
}

fn locate_with(
    explicit: Option<&Path>,
    from_env: Option<OsString>,
    config_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_owned());
    }
    if let Some(p) = from_env.filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(p));
    }
    config_dir
        .map(|d| CONFIG_FILE.iter().fold(d, |acc, part| acc.join(part)))
        .filter(|p| p.is_file())
}
