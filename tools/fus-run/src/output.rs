//! 运行产物的落盘.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use fus_target::prelude::*;
use log::info;

use crate::settings::Settings;

pub const METRICS_JSON: &str = "metrics.json";
pub const METRICS_REPORT: &str = "metrics_report.txt";
pub const TARGET_MASK: &str = "target_mask.npy";
pub const TARGET_SLICES: &str = "target_slices.png";
pub const AUDIT_LOG_PREFIX: &str = "pipeline_";

/// 审计日志文件名, 形如 `pipeline_20240131_235959.log`.
pub fn audit_log_name(at: DateTime<Utc>) -> String {
    format!("{AUDIT_LOG_PREFIX}{}.log", at.format("%Y%m%d_%H%M%S"))
}

/// 把一次成功运行的产物写入 `settings.output_directory` (须已存在), 返回写出的文件.
pub fn write_all(
    settings: &Settings,
    image: &ImageData,
    outcome: &RunOutcome,
) -> anyhow::Result<Vec<PathBuf>> {
    let dir = settings.output_directory.as_path();
    let mut written = Vec::with_capacity(4);

    let path = dir.join(METRICS_JSON);
    let json = serde_json::to_string_pretty(outcome.metrics())?;
    fs::write(&path, json + "\n").with_context(|| format!("cannot write {}", path.display()))?;
    written.push(logged(path)?);

    let path = dir.join(METRICS_REPORT);
    let report = format!("{}\n\n{}\n", outcome.metrics(), outcome.report());
    fs::write(&path, report).with_context(|| format!("cannot write {}", path.display()))?;
    written.push(logged(path)?);

    if settings.write_mask {
        let path = dir.join(TARGET_MASK);
        save_mask_npy(outcome.region(), &path)
            .with_context(|| format!("cannot write {}", path.display()))?;
        written.push(logged(path)?);
    }

    if settings.visualization.generate_slice_views() {
        let path = dir.join(TARGET_SLICES);
        save_slices(
            image,
            outcome.region(),
            outcome.metrics(),
            &settings.visualization,
            &path,
        )
        .with_context(|| format!("cannot write {}", path.display()))?;
        written.push(logged(path)?);
    }

    Ok(written)
}

fn logged(path: PathBuf) -> anyhow::Result<PathBuf> {
    let checksum = file_checksum(&path)?;
    info!(
        "file_io operation=write path={} checksum={checksum}",
        path.display()
    );
    Ok(path)
}

/// 记录一次输入读取.
pub fn log_read(path: &Path, image: &ImageData) {
    info!(
        "file_io operation=read path={} checksum={} {}",
        path.display(),
        image.checksum(),
        image.metadata_summary()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_audit_log_name() {
        let at = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 7).unwrap();
        assert_eq!(audit_log_name(at), "pipeline_20240131_235907.log");
    }
}
