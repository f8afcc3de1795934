//! Local media tooling: subprocess execution, FFmpeg runs with log analysis,
//! and host capability inspection.

mod command;
mod error;
mod ffmpeg;
mod system;

pub use command::{CommandOutputSink, CommandResult, CommandSpec, run_command};
pub use error::MediaError;
pub use ffmpeg::{
    FfmpegDetails, FfmpegEvent, FfmpegReport, FfmpegRunner, FfmpegStats, ReportKind,
    analyze_failure, analyze_success, strip_banner,
};
pub use system::{FfmpegBuild, GpuInfo, HostInfo, SystemReport, inspect_system};
