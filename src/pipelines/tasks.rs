// src/pipelines/tasks.rs: Stage wrappers around the external tools
//
// Every wrapper runs its tool(s) to completion and returns a TaskResult.
// Tool failures (non-zero exit, timeout, missing output) are recorded in the
// result; `Err` is reserved for setup problems such as a missing config key,
// an executable that cannot be spawned, or an output file that cannot be
// created.

use std::path::Path;
use std::time::Duration;

use log::debug;
use tempfile::{Builder, NamedTempFile};

use crate::config::RunConfig;
use crate::config::defs::{
    PipelineError, ALIGN_LOG_EXT, BOWTIE_TAG, CLIPPING_REPORT_EXT, FASTX_CLIPPER_TAG,
    HTSEQ_COUNT_TAG, INTERSECT_BED_TAG, SAMTOOLS_TAG,
};
use crate::utils::command::{
    bowtie, fastx_clipper, htseq_count, intersect_bed, run_tool, samtools, StreamTarget, ToolRun,
};
use crate::utils::file::append_to_path;
use crate::utils::task::TaskResult;


fn describe(stage: &str, input: &Path) -> String {
    format!("{} {}", stage, input.display())
}

/// Folds one tool run into a result: command line, captured streams, failure.
fn record_run(result: TaskResult, run: ToolRun) -> TaskResult {
    let failure = run.failure();
    result
        .with_cmd(run.cmdline)
        .with_stdout(run.stdout)
        .with_stderr(run.stderr)
        .with_failures(failure)
}


/// Aligns `fastq` with bowtie, writing SAM to `outfile` and bowtie's stderr
/// to `<outfile>.log`.
///
/// # Arguments
///
/// * `config` - Needs `index` and `bowtie params`.
/// * `fastq` - Reads to align.
/// * `outfile` - SAM output.
/// * `timeout` - Optional limit for the bowtie process.
///
/// # Returns
/// TaskResult; failed on non-zero exit, timeout or missing SAM. On failure
/// the log contents are also carried as stderr.
pub async fn align(
    config: &RunConfig,
    fastq: &Path,
    outfile: &Path,
    timeout: Option<Duration>,
) -> Result<TaskResult, PipelineError> {
    let args = bowtie::arg_generator(config, fastq)?;
    let logfn = append_to_path(outfile, ALIGN_LOG_EXT);

    let run = run_tool(
        config,
        BOWTIE_TAG,
        &args,
        StreamTarget::File(outfile.to_path_buf()),
        StreamTarget::File(logfn.clone()),
        timeout,
    )
        .await?;

    let mut result = record_run(
        TaskResult::new(fastq, outfile)
            .with_desc(describe("align", fastq))
            .with_log(&logfn),
        run,
    )
        .require_nonempty_output(outfile);

    if result.failed() {
        let log_text = tokio::fs::read_to_string(&logfn).await.ok();
        result = result.with_stderr(log_text);
    }
    Ok(result)
}


/// Counts reads per feature with htseq-count. The count table goes to
/// `countfile`; stderr is captured for the report.
pub async fn count(
    config: &RunConfig,
    samfile: &Path,
    countfile: &Path,
    timeout: Option<Duration>,
) -> Result<TaskResult, PipelineError> {
    let args = htseq_count::arg_generator(config, samfile)?;

    let run = run_tool(
        config,
        HTSEQ_COUNT_TAG,
        &args,
        StreamTarget::File(countfile.to_path_buf()),
        StreamTarget::Piped,
        timeout,
    )
        .await?;

    Ok(record_run(TaskResult::new(samfile, countfile).with_desc(describe("count", samfile)), run)
        .require_nonempty_output(countfile))
}


/// Clips the configured adapter from `fastq` into `clipped_fastq`, writing
/// fastx_clipper's verbose report to `<clipped_fastq>.clipping_report`.
///
/// Without an adapter the input is copied verbatim and the report says so;
/// no tool runs and the result always succeeds.
pub async fn clip(
    config: &RunConfig,
    fastq: &Path,
    clipped_fastq: &Path,
    timeout: Option<Duration>,
) -> Result<TaskResult, PipelineError> {
    let clipping_report = append_to_path(clipped_fastq, CLIPPING_REPORT_EXT);
    let outfiles = vec![clipped_fastq.to_path_buf(), clipping_report.clone()];
    let desc = describe("clip", fastq);

    let Some(adapter) = config.adapter() else {
        debug!("No adapter configured; copying {}", fastq.display());
        tokio::fs::copy(fastq, clipped_fastq).await.map_err(|e| {
            PipelineError::IOError(format!(
                "Failed to copy {} to {}: {}",
                fastq.display(),
                clipped_fastq.display(),
                e
            ))
        })?;
        tokio::fs::write(
            &clipping_report,
            format!(
                "No adapter specified; {} is a copy of {}",
                clipped_fastq.display(),
                fastq.display()
            ),
        )
            .await?;
        return Ok(TaskResult::new(fastq, outfiles).with_desc(desc));
    };

    // -o is written by the tool itself; clear output from an earlier run.
    remove_stale(clipped_fastq).await?;

    let args = fastx_clipper::arg_generator(fastq, clipped_fastq, adapter);
    let run = run_tool(
        config,
        FASTX_CLIPPER_TAG,
        &args,
        StreamTarget::File(clipping_report),
        StreamTarget::Piped,
        timeout,
    )
        .await?;

    Ok(record_run(TaskResult::new(fastq, outfiles).with_desc(desc), run).require_output(clipped_fastq))
}


async fn remove_stale(path: &Path) -> Result<(), PipelineError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed previous output {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PipelineError::IOError(format!("Failed to remove {}: {}", path.display(), e))),
    }
}


/// `samtools view -S -b`: SAM to BAM.
pub async fn sam_to_bam(
    config: &RunConfig,
    sam: &Path,
    bam: &Path,
    timeout: Option<Duration>,
) -> Result<TaskResult, PipelineError> {
    let args = samtools::sam_to_bam_args(sam);
    let run = run_tool(
        config,
        SAMTOOLS_TAG,
        &args,
        StreamTarget::File(bam.to_path_buf()),
        StreamTarget::Piped,
        timeout,
    )
        .await?;

    Ok(record_run(TaskResult::new(sam, bam).with_desc(describe("sam2bam", sam)), run).require_nonempty_output(bam))
}


/// `samtools view -h`: BAM to SAM, header included.
pub async fn bam_to_sam(
    config: &RunConfig,
    bam: &Path,
    sam: &Path,
    timeout: Option<Duration>,
) -> Result<TaskResult, PipelineError> {
    let args = samtools::bam_to_sam_args(bam);
    let run = run_tool(
        config,
        SAMTOOLS_TAG,
        &args,
        StreamTarget::File(sam.to_path_buf()),
        StreamTarget::Piped,
        timeout,
    )
        .await?;

    Ok(record_run(TaskResult::new(bam, sam).with_desc(describe("bam2sam", bam)), run).require_nonempty_output(sam))
}


fn scratch_file(config: &RunConfig, suffix: &str) -> Result<NamedTempFile, PipelineError> {
    let tmp_dir = config.tmp_dir();
    Builder::new()
        .prefix("seqtask-filter-")
        .suffix(suffix)
        .tempfile_in(&tmp_dir)
        .map_err(|e| PipelineError::IOError(format!("Failed to create temp file in {}: {}", tmp_dir.display(), e)))
}


/// Removes alignments overlapping the `filter bed` regions from `sam`.
///
/// Runs SAM→BAM, `intersectBed -v` against the regions, then BAM→SAM into
/// `outfile`, through two temporaries that are deleted when this function
/// returns, whatever the outcome. The result carries all three commands,
/// the joined stderr of each step, and fails if any step failed. The last
/// step's output check covers `outfile`.
pub async fn filter(
    config: &RunConfig,
    sam: &Path,
    outfile: &Path,
    timeout: Option<Duration>,
) -> Result<TaskResult, PipelineError> {
    // Checked before any process starts.
    config.filter_bed()?;

    let bam = scratch_file(config, ".bam")?;
    let filtered_bam = scratch_file(config, ".filtered.bam")?;

    let to_bam = sam_to_bam(config, sam, bam.path(), timeout).await?;

    let intersect_args = intersect_bed::exclusion_args(config, bam.path())?;
    let intersect = run_tool(
        config,
        INTERSECT_BED_TAG,
        &intersect_args,
        StreamTarget::File(filtered_bam.path().to_path_buf()),
        StreamTarget::Piped,
        timeout,
    )
        .await?;
    let intersect_failure = intersect.failure();

    let to_sam = bam_to_sam(config, filtered_bam.path(), outfile, timeout).await?;

    let stderr: Vec<&str> = [to_bam.stderr(), intersect.stderr.as_deref(), to_sam.stderr()]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect();
    let stderr = if stderr.is_empty() { None } else { Some(stderr.join("\n")) };

    let mut result = TaskResult::new(sam, outfile).with_desc(describe("filter", sam));
    for cmd in to_bam.cmds() {
        result = result.with_cmd(cmd.clone());
    }
    result = result.with_cmd(intersect.cmdline.clone());
    for cmd in to_sam.cmds() {
        result = result.with_cmd(cmd.clone());
    }

    Ok(result
        .with_stderr(stderr)
        .with_failures(to_bam.failures().iter().cloned())
        .with_failures(intersect_failure)
        .with_failures(to_sam.failures().iter().cloned()))
}
