//! 命令行参数.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(
    name = "fus-run",
    version,
    about = "Identify the focused ultrasound target region of a 3D volume"
)]
pub struct Cli {
    #[arg(help = "Input volume (.nii, .nii.gz or .npy)")]
    pub input: PathBuf,

    #[arg(help = "Directory receiving the run artifacts (overrides the config file)")]
    pub output_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "JSON configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Intensity threshold percentile in [0, 100]")]
    pub percentile: Option<f64>,

    #[arg(long, value_name = "MM3", help = "Minimum target volume in mm³")]
    pub min_volume: Option<f64>,

    #[arg(long, help = "Seed recorded for audit purposes")]
    pub seed: Option<u64>,

    #[arg(
        long,
        num_args = 3,
        value_names = ["X", "Y", "Z"],
        help = "Voxel spacing in mm, required for .npy input"
    )]
    pub spacing: Option<Vec<f64>>,

    #[arg(long, value_enum, help = "Log verbosity (overrides the config file)")]
    pub log_level: Option<LogLevel>,

    #[arg(long, default_value_t = false, help = "Skip the slice overview image")]
    pub no_slices: bool,

    #[arg(long, default_value_t = false, help = "Skip writing the target mask")]
    pub no_mask: bool,
}

impl Cli {
    /// `--spacing` 的三个分量.
    pub fn spacing(&self) -> Option<[f64; 3]> {
        self.spacing.as_deref().and_then(|s| s.try_into().ok())
    }

    /// 是否给出了任何处理参数.
    pub fn overrides_processing(&self) -> bool {
        self.percentile.is_some() || self.min_volume.is_some() || self.seed.is_some()
    }
}

/// 日志级别. 配置文件里大小写均可.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[serde(alias = "DEBUG")]
    Debug,
    #[default]
    #[serde(alias = "INFO")]
    Info,
    #[serde(alias = "WARNING", alias = "warn", alias = "WARN")]
    Warning,
    #[serde(alias = "ERROR")]
    Error,
}

impl LogLevel {
    pub fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}
