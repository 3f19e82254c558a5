// src/utils/task.rs: Outcome record for one stage invocation

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;


/// Why a stage is considered failed. A stage may record several.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageFailure {
    #[error("{tool} exited with {}", render_status(.status))]
    ToolExecution { tool: String, status: Option<i32> },

    #[error("expected output {} is missing", .path.display())]
    MissingOutput { path: PathBuf },

    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: String, after: Duration },
}

fn render_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}


/// Ordered list of file paths. Built from a single path or from a sequence,
/// so callers never have to wrap a lone path themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSet(Vec<PathBuf>);

impl FileSet {
    pub fn into_inner(self) -> Vec<PathBuf> {
        self.0
    }
}

impl From<&str> for FileSet {
    fn from(path: &str) -> Self {
        FileSet(vec![PathBuf::from(path)])
    }
}

impl From<String> for FileSet {
    fn from(path: String) -> Self {
        FileSet(vec![PathBuf::from(path)])
    }
}

impl From<&Path> for FileSet {
    fn from(path: &Path) -> Self {
        FileSet(vec![path.to_path_buf()])
    }
}

impl From<PathBuf> for FileSet {
    fn from(path: PathBuf) -> Self {
        FileSet(vec![path])
    }
}

impl From<&PathBuf> for FileSet {
    fn from(path: &PathBuf) -> Self {
        FileSet(vec![path.clone()])
    }
}

impl<P: AsRef<Path>> From<Vec<P>> for FileSet {
    fn from(paths: Vec<P>) -> Self {
        FileSet(paths.iter().map(|p| p.as_ref().to_path_buf()).collect())
    }
}

impl<P: AsRef<Path>> From<&[P]> for FileSet {
    fn from(paths: &[P]) -> Self {
        FileSet(paths.iter().map(|p| p.as_ref().to_path_buf()).collect())
    }
}

impl<P: AsRef<Path>, const N: usize> From<[P; N]> for FileSet {
    fn from(paths: [P; N]) -> Self {
        FileSet(paths.iter().map(|p| p.as_ref().to_path_buf()).collect())
    }
}


/// Structured outcome of one stage invocation.
///
/// Built once by the stage that ran the tools, using the consuming `with_*`
/// methods, and read-only afterwards. Whether the stage failed is decided by
/// the producer through `with_failure`/`require_output`; the record never
/// infers it.
#[derive(Debug, Clone, Default)]
pub struct TaskResult {
    infiles: Vec<PathBuf>,
    outfiles: Vec<PathBuf>,
    log: Option<PathBuf>,
    stdout: Option<String>,
    stderr: Option<String>,
    cmds: Vec<String>,
    desc: Option<String>,
    failures: Vec<StageFailure>,
    elapsed: Option<Duration>,
}

impl TaskResult {
    pub fn new(infiles: impl Into<FileSet>, outfiles: impl Into<FileSet>) -> Self {
        TaskResult {
            infiles: infiles.into().into_inner(),
            outfiles: outfiles.into().into_inner(),
            ..Default::default()
        }
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    pub fn with_log(mut self, log: impl Into<PathBuf>) -> Self {
        self.log = Some(log.into());
        self
    }

    pub fn with_stdout(mut self, stdout: Option<String>) -> Self {
        self.stdout = stdout;
        self
    }

    pub fn with_stderr(mut self, stderr: Option<String>) -> Self {
        self.stderr = stderr;
        self
    }

    pub fn with_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.cmds.push(cmd.into());
        self
    }

    pub fn with_failure(mut self, failure: StageFailure) -> Self {
        self.failures.push(failure);
        self
    }

    pub fn with_failures(mut self, failures: impl IntoIterator<Item = StageFailure>) -> Self {
        self.failures.extend(failures);
        self
    }

    /// Records a `MissingOutput` failure if `path` does not exist on disk.
    pub fn require_output(self, path: &Path) -> Self {
        if path.exists() {
            self
        } else {
            self.with_failure(StageFailure::MissingOutput { path: path.to_path_buf() })
        }
    }

    /// Like `require_output`, for outputs redirected from a tool's stdout:
    /// the file is created before the tool starts, so empty counts as missing.
    pub fn require_nonempty_output(self, path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > 0 => self,
            _ => self.with_failure(StageFailure::MissingOutput { path: path.to_path_buf() }),
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    pub fn infiles(&self) -> &[PathBuf] {
        &self.infiles
    }

    pub fn outfiles(&self) -> &[PathBuf] {
        &self.outfiles
    }

    pub fn log(&self) -> Option<&Path> {
        self.log.as_deref()
    }

    pub fn stdout(&self) -> Option<&str> {
        self.stdout.as_deref()
    }

    pub fn stderr(&self) -> Option<&str> {
        self.stderr.as_deref()
    }

    pub fn cmds(&self) -> &[String] {
        &self.cmds
    }

    /// Commands as one string, one command per line.
    pub fn cmds_string(&self) -> String {
        self.cmds.join("\n")
    }

    pub fn desc(&self) -> &str {
        self.desc.as_deref().unwrap_or("")
    }

    pub fn failures(&self) -> &[StageFailure] {
        &self.failures
    }

    pub fn failed(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }
}
