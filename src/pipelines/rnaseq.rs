// src/pipelines/rnaseq.rs: Per-sample clip -> align -> filter -> count driver

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use futures::future::try_join_all;
use log::{info, warn};
use tokio::sync::Semaphore;

use crate::cli::Stage;
use crate::config::RunConfig;
use crate::config::defs::PipelineError;
use crate::pipelines::tasks;
use crate::utils::mapping::{fastq_to_files, SamplePaths};
use crate::utils::report::Reporter;

pub const CLIPPED_EXT: &str = "clipped.fastq";
pub const SAM_EXT: &str = "sam";
pub const FILTERED_SAM_EXT: &str = "filtered.sam";
pub const COUNTS_EXT: &str = "counts";


/// What happens to the run when a stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop every sample at the first failed stage.
    #[default]
    FailFast,
    /// Stop only the failing sample; report the failure count at the end.
    KeepGoing,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub stages: Vec<Stage>,
    pub policy: FailurePolicy,
    pub timeout: Option<Duration>,
    pub max_concurrent: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            stages: vec![Stage::Clip, Stage::Align, Stage::Filter, Stage::Count],
            policy: FailurePolicy::FailFast,
            timeout: None,
            max_concurrent: 1,
        }
    }
}


/// Output paths of one sample, one per stage.
struct StagePaths {
    label: String,
    fastq: PathBuf,
    clipped: PathBuf,
    sam: PathBuf,
    filtered: PathBuf,
    counts: PathBuf,
}

impl TryFrom<SamplePaths<Vec<PathBuf>>> for StagePaths {
    type Error = PipelineError;

    fn try_from(paths: SamplePaths<Vec<PathBuf>>) -> Result<Self, Self::Error> {
        let [clipped, sam, filtered, counts]: [PathBuf; 4] = paths
            .output
            .try_into()
            .map_err(|_| PipelineError::Other(anyhow!("Expected 4 output paths for sample {}", paths.label)))?;
        Ok(StagePaths { label: paths.label, fastq: paths.input, clipped, sam, filtered, counts })
    }
}


/// Runs the selected stages for one sample, reporting each result.
///
/// Stages run in pipeline order regardless of how they were listed. A skipped
/// clip or filter passes its input straight through; a skipped align or count
/// leaves its output path in place, so later stages pick up files from an
/// earlier run.
///
/// # Returns
/// Ok(0) when every stage succeeded, Ok(1) when a stage failed under
/// KeepGoing, or the StageFailed error under FailFast.
async fn run_sample(
    config: Arc<RunConfig>,
    reporter: Reporter,
    paths: StagePaths,
    options: Arc<RunOptions>,
) -> Result<usize, PipelineError> {
    let timeout = options.timeout;
    let mut current = paths.fastq.clone();

    let mut stages = options.stages.clone();
    stages.sort();
    stages.dedup();

    for stage in [Stage::Clip, Stage::Align, Stage::Filter, Stage::Count] {
        if !stages.contains(&stage) {
            if stage == Stage::Align {
                current = paths.sam.clone();
            }
            continue;
        }

        let started = Instant::now();
        let (result, next) = match stage {
            Stage::Clip => (tasks::clip(&config, &current, &paths.clipped, timeout).await?, &paths.clipped),
            Stage::Align => (tasks::align(&config, &current, &paths.sam, timeout).await?, &paths.sam),
            Stage::Filter => (tasks::filter(&config, &current, &paths.filtered, timeout).await?, &paths.filtered),
            Stage::Count => (tasks::count(&config, &current, &paths.counts, timeout).await?, &paths.counts),
        };
        let result = result.with_elapsed(started.elapsed());

        match reporter.report(&result) {
            Ok(()) => current = next.clone(),
            Err(e) => match options.policy {
                FailurePolicy::FailFast => return Err(e),
                FailurePolicy::KeepGoing => {
                    warn!("Skipping remaining stages for sample {}: {}", paths.label, e);
                    return Ok(1);
                }
            },
        }
    }
    Ok(0)
}


/// Run function for the per-sample stage pipeline
///
/// Samples run concurrently, at most `max_concurrent` at a time. Under
/// FailFast the first failed stage aborts the other samples and its
/// StageFailed error is returned; under KeepGoing every sample finishes and
/// `StagesFailed` carries the number of failed samples.
///
/// # Arguments
///
/// * `config` - Loaded run configuration.
/// * `reporter` - Shared reporter; its lock serializes all stage reports.
/// * `options` - Stage selection, failure policy, timeout and concurrency.
///
/// # Returns
/// Result<(), PipelineError>
pub async fn run(config: Arc<RunConfig>, reporter: Reporter, options: RunOptions) -> Result<(), PipelineError> {
    let samples: Vec<StagePaths> = fastq_to_files(&config, &[CLIPPED_EXT, SAM_EXT, FILTERED_SAM_EXT, COUNTS_EXT])?
        .map(|paths| paths.and_then(StagePaths::try_from))
        .collect::<Result<_, _>>()?;
    info!("Running {:?} for {} sample(s)", options.stages, samples.len());

    let options = Arc::new(options);
    let semaphore = Arc::new(Semaphore::new(options.max_concurrent.max(1)));

    let handles: Vec<_> = samples
        .into_iter()
        .map(|paths| {
            let config = config.clone();
            let reporter = reporter.clone();
            let options = options.clone();
            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::Other(e.into()))?;
                run_sample(config, reporter, paths, options).await
            })
        })
        .collect();
    let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

    let joined = try_join_all(handles.into_iter().map(|handle| async move {
        match handle.await {
            Ok(result) => result,
            Err(e) => Err(PipelineError::Other(e.into())),
        }
    }))
        .await;

    let failed_samples: usize = match joined {
        Ok(counts) => counts.into_iter().sum(),
        Err(e) => {
            for abort in aborts {
                abort.abort();
            }
            return Err(e);
        }
    };

    if failed_samples > 0 {
        return Err(PipelineError::StagesFailed { count: failed_samples });
    }
    Ok(())
}


#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::Mutex;
    use log::Level;
    use tempfile::{tempdir, TempDir};
    use crate::config::Sample;
    use crate::config::defs::{BOWTIE_TAG, HTSEQ_COUNT_TAG, INTERSECT_BED_TAG, SAMTOOLS_TAG};
    use crate::utils::report::MemorySink;

    const FASTQ: &str = "@r1\nACGTACGT\n+\nIIIIIIII\n";

    fn fake_tool(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path.to_string_lossy().to_string()
    }

    fn setup(labels: &[&str], count_body: &str) -> (TempDir, RunConfig) {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let samples = labels
            .iter()
            .map(|label| {
                let fastq = root.join(format!("{}.fastq", label));
                fs::write(&fastq, FASTQ).unwrap();
                Sample { label: label.to_string(), fastq }
            })
            .collect();

        let mut config = RunConfig {
            samples: Some(samples),
            output_dir: Some(root.join("out")),
            index: Some("idx".to_string()),
            bowtie_params: Some("".to_string()),
            htseq_params: Some("".to_string()),
            gff: Some(root.join("genes.gff")),
            filter_bed: Some(root.join("rrna.bed")),
            tmp_dir: Some(root.to_path_buf()),
            ..Default::default()
        };
        let tools = [
            (BOWTIE_TAG, r#"printf '@HD\tVN:1.6\n'"#),
            (SAMTOOLS_TAG, r#"for last; do :; done; cat "$last""#),
            (INTERSECT_BED_TAG, r#"cat "$2""#),
            (HTSEQ_COUNT_TAG, count_body),
        ];
        for (tag, body) in tools {
            let exe = fake_tool(root, &format!("fake-{}", tag), body);
            config.tools.insert(tag.to_string(), exe);
        }
        (dir, config)
    }

    fn reporter() -> (Reporter, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (Reporter::new(sink.clone(), Arc::new(Mutex::new(()))), sink)
    }

    #[tokio::test]
    async fn test_full_run_produces_counts() {
        let (dir, config) = setup(&["s1", "s2"], r#"printf 'gene1\t0\n'"#);
        let (reporter, sink) = reporter();
        let options = RunOptions { max_concurrent: 2, ..Default::default() };

        run(Arc::new(config), reporter, options).await.unwrap();

        for label in ["s1", "s2"] {
            let sample_dir = dir.path().join("out").join(label);
            assert_eq!(
                fs::read_to_string(sample_dir.join(format!("{}.clipped.fastq", label))).unwrap(),
                FASTQ
            );
            assert!(sample_dir.join(format!("{}.filtered.sam", label)).exists());
            assert_eq!(
                fs::read_to_string(sample_dir.join(format!("{}.counts", label))).unwrap(),
                "gene1\t0\n"
            );
        }
        let tasks = sink.lines().into_iter().filter(|(_, m)| m.starts_with(" Task: ")).count();
        assert_eq!(tasks, 8);
        assert!(sink.lines().iter().all(|(level, _)| *level != Level::Error));
    }

    #[tokio::test]
    async fn test_fail_fast_returns_stage_failure() {
        let (_dir, config) = setup(&["s1"], r#"echo "bad gff" >&2; exit 1"#);
        let (reporter, sink) = reporter();

        let err = run(Arc::new(config), reporter, RunOptions::default()).await.unwrap_err();

        match err {
            PipelineError::StageFailed { desc, .. } => assert!(desc.starts_with("count ")),
            other => panic!("Expected StageFailed, got {:?}", other),
        }
        assert!(sink.lines().iter().any(|(level, m)| *level == Level::Error && m == "bad gff\n"));
    }

    #[tokio::test]
    async fn test_keep_going_counts_failed_samples() {
        let (_dir, config) = setup(&["s1", "s2", "s3"], "exit 2");
        let (reporter, _sink) = reporter();
        let options = RunOptions { policy: FailurePolicy::KeepGoing, max_concurrent: 3, ..Default::default() };

        let err = run(Arc::new(config), reporter, options).await.unwrap_err();

        assert!(matches!(err, PipelineError::StagesFailed { count: 3 }));
    }

    #[tokio::test]
    async fn test_skipped_align_reuses_existing_sam() {
        let (dir, config) = setup(&["s1"], r#"for last; do :; done; echo "$last""#);
        let sample_dir = dir.path().join("out").join("s1");
        fs::create_dir_all(&sample_dir).unwrap();
        fs::write(sample_dir.join("s1.sam"), "@HD\tVN:1.6\n").unwrap();
        let (reporter, _sink) = reporter();
        let options = RunOptions { stages: vec![Stage::Count, Stage::Filter], ..Default::default() };

        run(Arc::new(config), reporter, options).await.unwrap();

        // The fake counter echoes its last argument, the gff.
        assert!(sample_dir.join("s1.filtered.sam").exists());
        assert!(!sample_dir.join("s1.clipped.fastq").exists());
        assert!(fs::read_to_string(sample_dir.join("s1.counts")).unwrap().contains("genes.gff"));
    }

    #[tokio::test]
    async fn test_missing_samples_is_config_error() {
        let config = RunConfig { output_dir: Some(PathBuf::from("out")), ..Default::default() };
        let (reporter, _sink) = reporter();

        let err = run(Arc::new(config), reporter, RunOptions::default()).await.unwrap_err();

        assert!(matches!(err, PipelineError::MissingConfig(_)));
    }
}
