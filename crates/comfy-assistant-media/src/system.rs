//! Host capability report: OS, CPU, memory, NVIDIA GPUs and the FFmpeg build.

use crate::command::{CommandSpec, run_command};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;
use sysinfo::System;

const UNKNOWN: &str = "unknown";
const INSPECT_TIMEOUT: Duration = Duration::from_secs(5);
const CUDA_FLAGS: &[&str] = &[
    "--enable-cuda",
    "--enable-nvenc",
    "--enable-cuvid",
    "--enable-ffnvcodec",
];

/// Operating system and hardware summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostInfo {
    pub os: String,
    pub cpu: String,
    pub memory: String,
}

/// NVIDIA GPU details reported by `nvidia-smi`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GpuInfo {
    pub models: Vec<String>,
    pub driver_version: String,
    /// Total VRAM across devices, e.g. `24.00 GB`.
    pub vram: Option<String>,
}

/// FFmpeg build details reported by `ffmpeg -version`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FfmpegBuild {
    pub version_line: String,
    pub version: String,
    pub cuda: bool,
}

/// Combined inspection result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemReport {
    pub host: HostInfo,
    pub gpu: GpuInfo,
    pub ffmpeg: FfmpegBuild,
}

impl SystemReport {
    /// Render the report as markdown for inclusion in a system prompt.
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# System and media information\n\n");
        let _ = writeln!(out, "## System");
        let _ = writeln!(out, "- **OS**: {}", self.host.os);
        let _ = writeln!(out, "- **CPU**: {}", self.host.cpu);
        let _ = writeln!(out, "- **Memory**: {}\n", self.host.memory);

        let _ = writeln!(out, "## GPU");
        let models = if self.gpu.models.is_empty() {
            "no NVIDIA GPU detected".to_string()
        } else {
            self.gpu.models.join(", ")
        };
        let _ = writeln!(out, "- **Models**: {models}");
        let _ = writeln!(out, "- **Driver version**: {}", self.gpu.driver_version);
        if let Some(vram) = &self.gpu.vram {
            let _ = writeln!(out, "- **VRAM**: {vram}");
        }
        out.push('\n');

        let _ = writeln!(out, "## FFmpeg");
        let _ = writeln!(out, "- **Version line**: {}", self.ffmpeg.version_line);
        let _ = writeln!(out, "- **Version**: {}", self.ffmpeg.version);
        let _ = writeln!(
            out,
            "- **CUDA support**: {}",
            if self.ffmpeg.cuda { "yes" } else { "no" }
        );
        out
    }
}

/// Inspect the host. Missing tools degrade to `unknown` values.
pub async fn inspect_system(ffmpeg_program: &str) -> SystemReport {
    let host = host_info();
    let gpu = match capture("nvidia-smi", &[
        "--query-gpu=name,driver_version,memory.total",
        "--format=csv,noheader,nounits",
    ])
    .await
    {
        Some(output) => parse_nvidia_smi(&output),
        None => GpuInfo {
            models: Vec::new(),
            driver_version: UNKNOWN.to_string(),
            vram: None,
        },
    };
    let ffmpeg = match capture(ffmpeg_program, &["-version"]).await {
        Some(output) => parse_ffmpeg_version(&output),
        None => FfmpegBuild {
            version_line: format!("{ffmpeg_program} not installed or not found"),
            version: UNKNOWN.to_string(),
            cuda: false,
        },
    };
    debug!(
        "inspected system (gpus={}, ffmpeg_version={})",
        gpu.models.len(),
        ffmpeg.version
    );
    SystemReport { host, gpu, ffmpeg }
}

fn host_info() -> HostInfo {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu_all();
    let os = System::long_os_version()
        .or_else(System::name)
        .unwrap_or_else(|| UNKNOWN.to_string());
    let cpu = sys
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .filter(|brand| !brand.is_empty())
        .map(|brand| format!("{brand} ({} threads)", sys.cpus().len()))
        .unwrap_or_else(|| UNKNOWN.to_string());
    let memory = match sys.total_memory() {
        0 => UNKNOWN.to_string(),
        bytes => format!("{:.2} GB", bytes as f64 / 1024f64.powi(3)),
    };
    HostInfo { os, cpu, memory }
}

/// Run an inspection command and return stdout when it exits cleanly.
async fn capture(program: &str, args: &[&str]) -> Option<String> {
    if which::which(program).is_err() {
        debug!("inspection tool missing (program={program})");
        return None;
    }
    let spec = CommandSpec::new(program)
        .args(args.iter().copied())
        .timeout(INSPECT_TIMEOUT);
    match run_command(spec, &mut ()).await {
        Ok(result) if result.success() => Some(result.stdout),
        Ok(result) => {
            warn!(
                "inspection command failed (program={program}, status={:?})",
                result.status_code
            );
            None
        }
        Err(err) => {
            warn!("inspection command error (program={program}, err={err})");
            None
        }
    }
}

/// Parse `nvidia-smi --query-gpu=name,driver_version,memory.total` CSV output.
fn parse_nvidia_smi(output: &str) -> GpuInfo {
    let mut models = Vec::new();
    let mut driver_version = None;
    let mut total_mib = 0f64;
    for line in output.lines().filter(|line| !line.trim().is_empty()) {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if let Some(name) = fields.first().filter(|name| !name.is_empty()) {
            models.push(name.to_string());
        }
        if driver_version.is_none() {
            driver_version = fields.get(1).map(|version| version.to_string());
        }
        if let Some(mib) = fields.get(2).and_then(|value| value.parse::<f64>().ok()) {
            total_mib += mib;
        }
    }
    GpuInfo {
        models,
        driver_version: driver_version.unwrap_or_else(|| UNKNOWN.to_string()),
        vram: (total_mib > 0.0).then(|| format!("{:.2} GB", total_mib / 1024.0)),
    }
}

/// Parse `ffmpeg -version` output.
fn parse_ffmpeg_version(output: &str) -> FfmpegBuild {
    let version_line = output.lines().next().unwrap_or_default().trim().to_string();
    let version = version_line
        .strip_prefix("ffmpeg version ")
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or(UNKNOWN)
        .to_string();
    let cuda = CUDA_FLAGS.iter().any(|flag| output.contains(flag));
    FfmpegBuild {
        version_line,
        version,
        cuda,
    }
}
