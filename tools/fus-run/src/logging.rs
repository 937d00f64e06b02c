//! 日志初始化.
//!
//! 每条记录同时写到 stderr 与输出目录下的审计日志文件. stdout 只留给度量报告.

use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use log::{info, Log, Metadata, Record};
use simple_logger::SimpleLogger;

use crate::cli::LogLevel;
use crate::output::audit_log_name;

/// 先交给 `SimpleLogger` 写 stderr, 再把同一条记录追加到审计文件.
struct AuditLogger {
    console: SimpleLogger,
    file: Mutex<LineWriter<File>>,
}

impl AuditLogger {
    fn write_line(&self, record: &Record<'_>) -> std::io::Result<()> {
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        writeln!(
            file,
            "{} {:<5} [{}] {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl Log for AuditLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.console.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.console.log(record);
        // 审计文件写失败不终止运行, stderr 上仍有同一条记录.
        if let Err(e) = self.write_line(record) {
            eprintln!("cannot write audit log: {e}");
        }
    }

    fn flush(&self) {
        self.console.flush();
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

/// 安装全局 logger, 返回审计日志文件的路径. `output_dir` 必须已存在.
pub fn init(level: LogLevel, output_dir: &Path) -> anyhow::Result<PathBuf> {
    let path = output_dir.join(audit_log_name(Utc::now()));
    let file = File::create(&path)
        .with_context(|| format!("cannot create audit log {}", path.display()))?;
    let logger = AuditLogger {
        console: SimpleLogger::new()
            .with_level(level.filter())
            .with_utc_timestamps(),
        file: Mutex::new(LineWriter::new(file)),
    };
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(level.filter());
    Ok(path)
}

/// 记录运行环境, 便于复现.
pub fn environment() {
    info!(
        "environment fus_run={} os={} arch={} family={}",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH,
        std::env::consts::FAMILY
    );
}
