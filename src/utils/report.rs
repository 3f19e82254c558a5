// src/utils/report.rs: Rendering TaskResults to a shared log sink

use std::sync::{Arc, Mutex};

use log::Level;

use crate::config::defs::{PipelineError, REPORT_RULE_WIDTH};
use crate::utils::file::relative_to_cwd;
use crate::utils::task::TaskResult;


/// Destination for leveled report lines.
pub trait LogSink: Send + Sync {
    fn emit(&self, level: Level, message: &str);
}

/// Forwards report lines to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn emit(&self, level: Level, message: &str) {
        log::log!(level, "{}", message);
    }
}

/// Keeps report lines in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, level: Level, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((level, message.to_string()));
    }
}


/// Writes TaskResult summaries to a sink shared by every concurrently running
/// stage. The lock is injected by whoever owns the run, and is held for a
/// whole report so blocks from different stages never interleave.
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn LogSink>,
    lock: Arc<Mutex<()>>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn LogSink>, lock: Arc<Mutex<()>>) -> Self {
        Reporter { sink, lock }
    }

    /// Reporter over the `log` facade with a fresh lock.
    pub fn log_crate() -> Self {
        Reporter::new(Arc::new(LogCrateSink), Arc::new(Mutex::new(())))
    }

    /// Emits the summary for `result`.
    ///
    /// Order: description, timestamp, elapsed time (if set), commands (debug),
    /// one line per output relative to the cwd, and the tool log (if any).
    /// A failed result additionally gets a ruled error block with the
    /// commands and any captured stderr/stdout, and comes back as
    /// `PipelineError::StageFailed` so the caller can decide whether the run
    /// stops. Absent or empty streams are left out of the block.
    pub fn report(&self, result: &TaskResult) -> Result<(), PipelineError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let sink = &self.sink;

        sink.emit(Level::Info, &format!(" Task: {}", result.desc()));
        sink.emit(
            Level::Info,
            &format!("     Time: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f")),
        );
        if let Some(elapsed) = result.elapsed() {
            sink.emit(Level::Info, &format!("     Elapsed:  {:.3}s", elapsed.as_secs_f64()));
        }
        if !result.cmds().is_empty() {
            sink.emit(Level::Debug, &format!("     Commands: {}", result.cmds_string()));
        }
        for output in result.outfiles() {
            sink.emit(Level::Info, &format!("     Output:   {}", relative_to_cwd(output).display()));
        }
        if let Some(log) = result.log() {
            sink.emit(Level::Info, &format!("     Log:      {}", log.display()));
        }

        if result.failed() {
            let rule = "=".repeat(REPORT_RULE_WIDTH);
            sink.emit(Level::Error, &rule);
            sink.emit(Level::Error, &format!("Error in {}", result.desc()));
            if !result.cmds().is_empty() {
                sink.emit(Level::Error, &result.cmds_string());
            }
            for failure in result.failures() {
                sink.emit(Level::Error, &format!("   Cause: {}", failure));
            }
            if let Some(stderr) = result.stderr().filter(|s| !s.is_empty()) {
                sink.emit(Level::Error, "====STDERR====");
                sink.emit(Level::Error, stderr);
            }
            if let Some(stdout) = result.stdout().filter(|s| !s.is_empty()) {
                sink.emit(Level::Error, "====STDOUT====");
                sink.emit(Level::Error, stdout);
            }
            if let Some(log) = result.log() {
                sink.emit(Level::Error, &format!("   Log: {}", log.display()));
            }
            sink.emit(Level::Error, &rule);
            return Err(PipelineError::StageFailed {
                desc: result.desc().to_string(),
                failures: result.failures().to_vec(),
            });
        }

        sink.emit(Level::Info, "");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::thread;
    use std::time::Duration;
    use crate::utils::task::StageFailure;

    fn reporter() -> (Reporter, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let reporter = Reporter::new(sink.clone(), Arc::new(Mutex::new(())));
        (reporter, sink)
    }

    fn messages(sink: &MemorySink) -> Vec<String> {
        sink.lines().into_iter().map(|(_, msg)| msg).collect()
    }

    #[test]
    fn test_success_report_order() {
        let (reporter, sink) = reporter();
        let result = TaskResult::new("s1.fastq", vec!["out/s1/s1.sam"])
            .with_desc("align s1")
            .with_cmd("bowtie -S idx s1.fastq")
            .with_log("out/s1/s1.sam.log");

        reporter.report(&result).unwrap();

        let lines = sink.lines();
        assert_eq!(lines[0], (Level::Info, " Task: align s1".to_string()));
        assert!(lines[1].1.starts_with("     Time: "));
        assert_eq!(lines[2], (Level::Debug, "     Commands: bowtie -S idx s1.fastq".to_string()));
        assert_eq!(lines[3], (Level::Info, "     Output:   out/s1/s1.sam".to_string()));
        assert_eq!(lines[4], (Level::Info, "     Log:      out/s1/s1.sam.log".to_string()));
        assert_eq!(lines[5], (Level::Info, String::new()));
        assert_eq!(lines.len(), 6);
        assert!(lines.iter().all(|(level, _)| *level != Level::Error));
    }

    #[test]
    fn test_outputs_rendered_relative_to_cwd() {
        let (reporter, sink) = reporter();
        let cwd = std::env::current_dir().unwrap();
        let result = TaskResult::new("in", cwd.join("out").join("s1.counts"));

        reporter.report(&result).unwrap();

        assert!(messages(&sink).contains(&"     Output:   out/s1.counts".to_string()));
    }

    #[test]
    fn test_failure_block() {
        let (reporter, sink) = reporter();
        let result = TaskResult::new("s1.sam", "s1.counts")
            .with_desc("count s1")
            .with_cmd("htseq-count s1.sam genes.gff")
            .with_stderr(Some("Error occured when processing SAM input".to_string()))
            .with_failure(StageFailure::ToolExecution { tool: "htseq-count".to_string(), status: Some(1) });

        let err = reporter.report(&result).unwrap_err();
        match err {
            PipelineError::StageFailed { desc, failures } => {
                assert_eq!(desc, "count s1");
                assert_eq!(failures.len(), 1);
            }
            other => panic!("Expected StageFailed, got {:?}", other),
        }

        let lines = sink.lines();
        let errors: Vec<&str> = lines
            .iter()
            .filter(|(level, _)| *level == Level::Error)
            .map(|(_, msg)| msg.as_str())
            .collect();
        let rule = "=".repeat(80);
        assert_eq!(errors.first(), Some(&rule.as_str()));
        assert_eq!(errors.last(), Some(&rule.as_str()));
        assert_eq!(errors[1], "Error in count s1");
        assert_eq!(errors[2], "htseq-count s1.sam genes.gff");
        assert!(errors.contains(&"====STDERR===="));
        assert!(errors.contains(&"Error occured when processing SAM input"));
        assert!(!errors.contains(&"====STDOUT===="));
        // No trailing blank separator after a failure.
        assert_ne!(lines.last().map(|(_, m)| m.as_str()), Some(""));
    }

    #[test]
    fn test_failure_without_streams_omits_sections() {
        let (reporter, sink) = reporter();
        let result = TaskResult::new("in", "out")
            .with_desc("align s1")
            .with_failure(StageFailure::MissingOutput { path: PathBuf::from("out") });

        assert!(reporter.report(&result).is_err());
        let msgs = messages(&sink);
        assert!(!msgs.contains(&"====STDERR====".to_string()));
        assert!(!msgs.contains(&"====STDOUT====".to_string()));
        assert!(msgs.contains(&"   Cause: expected output out is missing".to_string()));
    }

    #[test]
    fn test_elapsed_line() {
        let (reporter, sink) = reporter();
        let result = TaskResult::new("in", "out").with_elapsed(Duration::from_millis(1500));
        reporter.report(&result).unwrap();
        assert!(messages(&sink).contains(&"     Elapsed:  1.500s".to_string()));
    }

    /// Sink that yields between lines to give other threads a chance to
    /// interleave if the lock were not held.
    struct SlowSink(MemorySink);

    impl LogSink for SlowSink {
        fn emit(&self, level: Level, message: &str) {
            self.0.emit(level, message);
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_concurrent_reports_do_not_interleave() {
        let sink = Arc::new(SlowSink(MemorySink::new()));
        let reporter = Reporter::new(sink.clone(), Arc::new(Mutex::new(())));
        let workers = 6;
        let outputs = 8;

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let reporter = reporter.clone();
                thread::spawn(move || {
                    let outfiles: Vec<String> = (0..outputs).map(|i| format!("w{}/file{}", worker, i)).collect();
                    let result = TaskResult::new("in", outfiles).with_desc(format!("w{}", worker));
                    reporter.report(&result).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let msgs: Vec<String> = sink.0.lines().into_iter().map(|(_, m)| m).collect();
        let block_len = outputs + 3;
        assert_eq!(msgs.len(), workers * block_len);
        for block in msgs.chunks(block_len) {
            let worker = block[0].trim_start_matches(" Task: ").to_string();
            for line in &block[2..block_len - 1] {
                assert!(
                    line.starts_with(&format!("     Output:   {}/", worker)),
                    "line {:?} interleaved into block for {}",
                    line,
                    worker
                );
            }
            assert_eq!(block[block_len - 1], "");
        }
    }
}
