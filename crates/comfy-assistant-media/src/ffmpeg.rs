//! FFmpeg execution and log analysis.
//!
//! FFmpeg writes its whole log to stderr, so both the success summary and the
//! failure classification are scraped from the captured text.

use crate::command::{CommandOutputSink, CommandResult, CommandSpec, run_command};
use crate::MediaError;
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::mpsc;

static OUTPUT_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Output #\d+, .+?, to ['"](.*?)['"]"#).expect("valid output regex")
});
static PROCESSED_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=(\d+:\d+:\d+\.\d+)").expect("valid time regex"));
static STREAM_SIZES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"video:(\d+)(kB|KiB) audio:(\d+)(kB|KiB)").expect("valid size regex")
});
static FPS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.?\d*) fps").expect("valid fps regex"));
static MUXING_OVERHEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"muxing overhead: ([\d.]+)%").expect("valid overhead regex")
});
static MISSING_FILE_QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"No such file or directory\s*['"](.*?)['"]"#).expect("valid missing regex")
});
static MISSING_FILE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:\[[^\]]*\]\s*)?(.+?): No such file or directory")
        .expect("valid missing prefix regex")
});
static UNKNOWN_ENCODER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Unknown encoder\s*['"](.*?)['"]"#).expect("valid encoder regex")
});
static INVALID_ARGUMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Invalid argument\s*['"](.*?)['"]"#).expect("valid argument regex")
});
static UNRECOGNIZED_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Unrecognized option\s*['"](.*?)['"]"#).expect("valid option regex")
});

/// Outcome category of an analysed run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Success,
    Error,
}

/// Statistics scraped from a successful run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct FfmpegStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muxing_overhead: Option<String>,
}

/// Success statistics or a failure explanation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FfmpegDetails {
    Stats(FfmpegStats),
    Text(String),
}

/// Analysed result of one FFmpeg run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FfmpegReport {
    pub success: bool,
    pub exit_code: Option<i32>,
    #[serde(rename = "type")]
    pub kind: ReportKind,
    /// Human readable one-line summary.
    pub message: String,
    /// Output file on success, captured stdout otherwise.
    pub output: String,
    /// Stderr without the version banner; empty on success.
    pub error: String,
    pub details: FfmpegDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
}

/// Event emitted while a command runs with progress reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FfmpegEvent {
    /// Latest `time=` position reported by FFmpeg.
    Progress { time: String },
    /// Terminal event carrying the analysed report.
    #[serde(rename = "result")]
    Finished { success: bool, report: FfmpegReport },
}

/// Runs FFmpeg command lines restricted to one configured program.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    program: String,
    timeout: Duration,
}

impl FfmpegRunner {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Configured program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Split a command line and check that it invokes the configured program.
    pub fn parse(&self, command_line: &str) -> Result<CommandSpec, MediaError> {
        let tokens = shell_words::split(command_line)
            .map_err(|err| MediaError::InvalidCommand(err.to_string()))?;
        let mut iter = tokens.into_iter();
        let Some(program) = iter.next() else {
            return Err(MediaError::InvalidCommand(
                "command cannot be empty".to_string(),
            ));
        };
        if program_stem(&program) != program_stem(&self.program) {
            return Err(MediaError::NotAllowed(format!(
                "only {} commands may be run (got {program})",
                self.program
            )));
        }
        Ok(CommandSpec::new(self.program.clone())
            .args(iter)
            .timeout(self.timeout))
    }

    /// Run a command line and analyse its log.
    pub async fn run(&self, command_line: &str) -> Result<FfmpegReport, MediaError> {
        let spec = self.parse(command_line)?;
        self.ensure_installed()?;
        info!("running ffmpeg (args_len={})", spec.args.len());
        let result = run_command(spec, &mut ()).await?;
        Ok(analyze(&result))
    }

    /// Run a command line, emitting progress events and a final result event.
    ///
    /// The returned report is the same one carried by the `Finished` event.
    pub async fn run_with_progress(
        &self,
        command_line: &str,
        events: mpsc::UnboundedSender<FfmpegEvent>,
    ) -> Result<FfmpegReport, MediaError> {
        let spec = self.parse(command_line)?;
        self.ensure_installed()?;
        info!(
            "running ffmpeg with progress (args_len={})",
            spec.args.len()
        );
        let mut sink = ProgressSink {
            events: events.clone(),
        };
        let result = run_command(spec, &mut sink).await?;
        let report = analyze(&result);
        let _ = events.send(FfmpegEvent::Finished {
            success: report.success,
            report: report.clone(),
        });
        Ok(report)
    }

    fn ensure_installed(&self) -> Result<(), MediaError> {
        which::which(&self.program)
            .map(|_| ())
            .map_err(|_| MediaError::DependencyMissing(format!("{} not found", self.program)))
    }
}

/// Compare programs by file stem so `ffmpeg`, `ffmpeg.exe` and full paths match.
fn program_stem(program: &str) -> String {
    Path::new(program)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Forwards the `time=` position of each stderr status line.
struct ProgressSink {
    events: mpsc::UnboundedSender<FfmpegEvent>,
}

impl CommandOutputSink for ProgressSink {
    fn stdout_line(&mut self, _line: &str) {}

    fn stderr_line(&mut self, line: &str) {
        if let Some(captures) = PROCESSED_TIME.captures(line) {
            let _ = self.events.send(FfmpegEvent::Progress {
                time: captures[1].to_string(),
            });
        }
    }
}

fn analyze(result: &CommandResult) -> FfmpegReport {
    debug!(
        "analysing ffmpeg result (status={:?}, stderr_len={})",
        result.status_code,
        result.stderr.len()
    );
    if result.success() {
        let combined = format!("{}\n{}", result.stdout, result.stderr);
        let (output, message, stats) = analyze_success(&combined);
        FfmpegReport {
            success: true,
            exit_code: result.status_code,
            kind: ReportKind::Success,
            message,
            output: output.unwrap_or_else(|| result.stdout.clone()),
            error: String::new(),
            details: FfmpegDetails::Stats(stats),
            solution: None,
        }
    } else {
        let error = strip_banner(&result.stderr);
        let (message, details, solution) =
            analyze_failure(&error, &result.stdout, result.status_code);
        FfmpegReport {
            success: false,
            exit_code: result.status_code,
            kind: ReportKind::Error,
            message,
            output: result.stdout.clone(),
            error,
            details: FfmpegDetails::Text(details),
            solution,
        }
    }
}

/// Drop the version banner and build configuration from an FFmpeg log.
pub fn strip_banner(log: &str) -> String {
    log.lines()
        .filter(|line| {
            !(line.starts_with("ffmpeg version")
                || line.starts_with("  configuration:")
                || line.starts_with("  built with")
                || line.starts_with("  lib"))
        })
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract the output file, a summary message and statistics from a success log.
pub fn analyze_success(log: &str) -> (Option<String>, String, FfmpegStats) {
    let output = OUTPUT_FILE
        .captures(log)
        .map(|captures| captures[1].to_string());
    let message = match &output {
        Some(file) => format!("created {file}"),
        None => "command completed".to_string(),
    };
    let mut stats = FfmpegStats {
        processed_time: PROCESSED_TIME
            .captures_iter(log)
            .last()
            .map(|captures| captures[1].to_string()),
        fps: FPS.captures(log).map(|captures| captures[1].to_string()),
        muxing_overhead: MUXING_OVERHEAD
            .captures(log)
            .map(|captures| format!("{}%", &captures[1])),
        ..FfmpegStats::default()
    };
    if let Some(captures) = STREAM_SIZES.captures_iter(log).last() {
        stats.video_size = Some(format!("{}{}", &captures[1], &captures[2]));
        stats.audio_size = Some(format!("{}{}", &captures[3], &captures[4]));
    }
    (output, message, stats)
}

/// Classify a failure log into a message, a detail line and a suggested fix.
pub fn analyze_failure(
    error: &str,
    output: &str,
    exit_code: Option<i32>,
) -> (String, String, Option<String>) {
    let combined = format!("{error}\n{output}");
    let exit = exit_code.map_or_else(|| "none".to_string(), |code| code.to_string());

    if combined.contains("No such file or directory") {
        let path = MISSING_FILE_QUOTED
            .captures(&combined)
            .or_else(|| MISSING_FILE_PREFIX.captures(&combined))
            .map(|captures| captures[1].trim().to_string())
            .unwrap_or_else(|| "unknown path".to_string());
        return (
            "file not found".to_string(),
            format!("missing file: {path}"),
            Some("check that the input path is correct and the file exists".to_string()),
        );
    }
    if combined.contains("Invalid data found when processing input") {
        return (
            "invalid input file".to_string(),
            "the file format is wrong or the file is damaged".to_string(),
            Some("make sure the input is a valid media file".to_string()),
        );
    }
    if combined.contains("Unknown encoder") {
        let codec = extract(&UNKNOWN_ENCODER, &combined, "unknown codec");
        return (
            "unknown encoder".to_string(),
            format!("encoder {codec} is not available"),
            Some("install the codec or pick an encoder this build supports".to_string()),
        );
    }
    if combined.contains("Permission denied") {
        return (
            "permission denied".to_string(),
            "cannot read the input or write the output file".to_string(),
            Some("check file permissions or run with sufficient rights".to_string()),
        );
    }
    if combined.contains("Output file is empty") {
        return (
            "output file is empty".to_string(),
            "processing produced no content".to_string(),
            Some("check the input parameters and file formats".to_string()),
        );
    }
    if combined.contains("Invalid argument") {
        let param = extract(&INVALID_ARGUMENT, &combined, "unrecognised argument");
        return (
            "invalid argument".to_string(),
            format!("bad argument: {param}"),
            Some("check the command arguments".to_string()),
        );
    }
    if combined.contains("Unrecognized option") {
        let option = extract(&UNRECOGNIZED_OPTION, &combined, "unrecognised option");
        return (
            "unrecognized option".to_string(),
            format!("invalid option: {option}"),
            Some("check the option spelling against the FFmpeg documentation".to_string()),
        );
    }
    (
        "command failed".to_string(),
        format!("exit code: {exit}"),
        None,
    )
}

fn extract(pattern: &Regex, text: &str, fallback: &str) -> String {
    pattern
        .captures(text)
        .map(|captures| captures[1].to_string())
        .unwrap_or_else(|| fallback.to_string())
}
