/// Functions and structs for building tool command lines and running them

use std::fs::File;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::debug;
use tokio::process::Command;

use crate::config::RunConfig;
use crate::config::defs::PipelineError;
use crate::utils::task::StageFailure;


pub mod bowtie {
    use std::path::Path;
    use crate::config::RunConfig;
    use crate::config::defs::{PipelineError, BOWTIE_SAM_FLAGS};

    /// `<params…> [-S] <index> <fastq>`. `-S` is appended unless the params
    /// already ask for SAM output.
    pub fn arg_generator(config: &RunConfig, fastq: &Path) -> Result<Vec<String>, PipelineError> {
        let index = config.index()?;
        let mut args_vec = config.bowtie_params()?;
        if !args_vec.iter().any(|p| BOWTIE_SAM_FLAGS.contains(&p.as_str())) {
            args_vec.push("-S".to_string());
        }
        args_vec.push(index.to_string());
        args_vec.push(fastq.to_string_lossy().to_string());
        Ok(args_vec)
    }
}

pub mod htseq_count {
    use std::path::Path;
    use crate::config::RunConfig;
    use crate::config::defs::PipelineError;

    /// `<params…> <sam> <gff>`
    pub fn arg_generator(config: &RunConfig, sam: &Path) -> Result<Vec<String>, PipelineError> {
        let gff = config.gff()?;
        let mut args_vec = config.htseq_params()?;
        args_vec.push(sam.to_string_lossy().to_string());
        args_vec.push(gff.to_string_lossy().to_string());
        Ok(args_vec)
    }
}

pub mod fastx_clipper {
    use std::path::Path;

    pub fn arg_generator(fastq: &Path, clipped: &Path, adapter: &str) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-i".to_string());
        args_vec.push(fastq.to_string_lossy().to_string());
        args_vec.push("-o".to_string());
        args_vec.push(clipped.to_string_lossy().to_string());
        args_vec.push("-n".to_string()); // keep reads with Ns
        args_vec.push("-a".to_string());
        args_vec.push(adapter.to_string());
        args_vec.push("-v".to_string()); // clipping report on stdout
        args_vec
    }
}

pub mod samtools {
    use std::path::Path;
    use crate::config::defs::SamtoolsSubcommand;

    /// SAM in, BAM on stdout.
    pub fn sam_to_bam_args(sam: &Path) -> Vec<String> {
        vec![
            SamtoolsSubcommand::View.as_str().to_string(),
            "-S".to_string(),
            "-b".to_string(),
            sam.to_string_lossy().to_string(),
        ]
    }

    /// BAM in, SAM with header on stdout.
    pub fn bam_to_sam_args(bam: &Path) -> Vec<String> {
        vec![
            SamtoolsSubcommand::View.as_str().to_string(),
            "-h".to_string(),
            bam.to_string_lossy().to_string(),
        ]
    }
}

pub mod intersect_bed {
    use std::path::Path;
    use crate::config::RunConfig;
    use crate::config::defs::PipelineError;

    /// Keeps alignments in `bam` that do NOT overlap the configured regions.
    pub fn exclusion_args(config: &RunConfig, bam: &Path) -> Result<Vec<String>, PipelineError> {
        let bed = config.filter_bed()?;
        Ok(vec![
            "-abam".to_string(),
            bam.to_string_lossy().to_string(),
            "-b".to_string(),
            bed.to_string_lossy().to_string(),
            "-v".to_string(),
        ])
    }
}


/// Where a child's output stream goes.
#[derive(Debug, Clone)]
pub enum StreamTarget {
    File(PathBuf),
    Piped,
}

/// Outcome of one external process.
#[derive(Debug)]
pub struct ToolRun {
    pub tool: String,
    pub cmdline: String,
    pub status: Option<ExitStatus>,
    pub timed_out: Option<Duration>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

impl ToolRun {
    /// The failure this run represents, if any.
    pub fn failure(&self) -> Option<StageFailure> {
        if let Some(after) = self.timed_out {
            return Some(StageFailure::Timeout { tool: self.tool.clone(), after });
        }
        match self.status {
            Some(status) if status.success() => None,
            Some(status) => Some(StageFailure::ToolExecution {
                tool: self.tool.clone(),
                status: status.code(),
            }),
            None => Some(StageFailure::ToolExecution { tool: self.tool.clone(), status: None }),
        }
    }
}


pub fn render_cmdline(exe: &str, args: &[String]) -> String {
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(exe);
    parts.extend(args.iter().map(String::as_str));
    parts.join(" ")
}


fn stdio_for(target: &StreamTarget) -> Result<Stdio, PipelineError> {
    match target {
        StreamTarget::Piped => Ok(Stdio::piped()),
        StreamTarget::File(path) => {
            let file = File::create(path).map_err(|e| {
                PipelineError::IOError(format!("Failed to create {}: {}", path.display(), e))
            })?;
            Ok(Stdio::from(file))
        }
    }
}


/// Runs one external tool to completion.
///
/// The executable comes from the run config (`tools` override or default for
/// the tag). Redirect files are opened here and owned by the spawned command,
/// so they are closed however this function returns. With a timeout, the
/// child is killed when the limit passes and the run is marked timed out.
///
/// # Arguments
///
/// * `config` - RunConfig for executable lookup.
/// * `tool` - Tool tag, e.g. SAMTOOLS_TAG.
/// * `args` - Arguments after the executable.
/// * `stdout` / `stderr` - Stream targets.
/// * `timeout` - Optional wall-clock limit.
///
/// # Returns
/// ToolRun, or ToolSpawn/IOError when the process could not be started.
pub async fn run_tool(
    config: &RunConfig,
    tool: &str,
    args: &[String],
    stdout: StreamTarget,
    stderr: StreamTarget,
    timeout: Option<Duration>,
) -> Result<ToolRun, PipelineError> {
    let exe = config.executable(tool);
    let cmdline = render_cmdline(&exe, args);
    debug!("Running {}", cmdline);

    let child = Command::new(&exe)
        .args(args)
        .stdin(Stdio::null())
        .stdout(stdio_for(&stdout)?)
        .stderr(stdio_for(&stderr)?)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PipelineError::ToolSpawn {
            tool: tool.to_string(),
            error: format!("{}: {}. Is {} installed?", exe, e, tool),
        })?;

    let waiting = child.wait_with_output();
    let output = match timeout {
        // Dropping the future drops the child, which kills it.
        Some(limit) => match tokio::time::timeout(limit, waiting).await {
            Ok(output) => Some(output?),
            Err(_) => None,
        },
        None => Some(waiting.await?),
    };

    let Some(output) = output else {
        return Ok(ToolRun {
            tool: tool.to_string(),
            cmdline,
            status: None,
            timed_out: timeout,
            stdout: None,
            stderr: None,
        });
    };

    let captured = |target: &StreamTarget, bytes: &[u8]| match target {
        StreamTarget::Piped => Some(String::from_utf8_lossy(bytes).into_owned()),
        StreamTarget::File(_) => None,
    };

    Ok(ToolRun {
        tool: tool.to_string(),
        cmdline,
        status: Some(output.status),
        timed_out: None,
        stdout: captured(&stdout, &output.stdout),
        stderr: captured(&stderr, &output.stderr),
    })
}
