//! `fus-run`: 对单个体数据运行靶区识别流水线, 写出度量和可视化产物.
//!
//! 成功时退出码为 0, 度量报告打印到 stdout. 失败时退出码由错误类别决定,
//! 见 [`fus_target::ErrorKind::exit_code`].

use std::fs;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use fus_target::prelude::*;
use log::{error, info};

mod cli;
mod logging;
mod output;
mod settings;

use cli::Cli;
use settings::Settings;

/// 无法归类的失败 (例如产物写入失败).
const GENERIC_FAILURE: u8 = 1;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("run_failed {e:#}");
            log::logger().flush();
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn execute(cli: &Cli) -> anyhow::Result<()> {
    let (settings, config_path) = Settings::resolve(cli)?;
    let out_dir = &settings.output_directory;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("cannot create output directory {}", out_dir.display()))?;

    let audit_log = logging::init(settings.log_level, out_dir)?;
    logging::environment();
    info!("file_io operation=create path={}", audit_log.display());
    match &config_path {
        Some(p) => info!("configuration source={}", p.display()),
        None => info!("configuration source=defaults"),
    }

    let image = ImageData::open(&cli.input, cli.spacing())
        .map_err(|e| StageFailure::new(Stage::Loaded, e.into()))?;
    output::log_read(&cli.input, &image);

    let outcome = run(&image, &settings.processing)?;

    let written = output::write_all(&settings, &image, &outcome).with_context(|| {
        format!(
            "failed to write artifacts to {}",
            settings.output_directory.display()
        )
    })?;
    info!(
        "run_complete voxel_count={} artifacts={}",
        outcome.metrics().voxel_count(),
        written.len()
    );

    log::logger().flush();
    println!("{}", outcome.metrics());
    Ok(())
}

fn exit_code(e: &anyhow::Error) -> u8 {
    if let Some(f) = e.downcast_ref::<StageFailure>() {
        f.error().kind().exit_code()
    } else if let Some(p) = e.downcast_ref::<PipelineError>() {
        p.kind().exit_code()
    } else if e.downcast_ref::<LoadError>().is_some() {
        ErrorKind::ImageLoad.exit_code()
    } else {
        GENERIC_FAILURE
    }
}
