use std::collections::HashMap;
use lazy_static::lazy_static;
use thiserror::Error;
use crate::utils::task::StageFailure;

// External software
pub const BOWTIE_TAG: &str = "bowtie";
pub const HTSEQ_COUNT_TAG: &str = "htseq-count";
pub const FASTX_CLIPPER_TAG: &str = "fastx_clipper";
pub const SAMTOOLS_TAG: &str = "samtools";
pub const INTERSECT_BED_TAG: &str = "intersectBed";

lazy_static! {
    /// Executable used for each tool tag when the run config carries no override.
    pub static ref DEFAULT_EXECUTABLES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert(BOWTIE_TAG, "bowtie");
        m.insert(HTSEQ_COUNT_TAG, "htseq-count");
        m.insert(FASTX_CLIPPER_TAG, "fastx_clipper");
        m.insert(SAMTOOLS_TAG, "samtools");
        m.insert(INTERSECT_BED_TAG, "intersectBed");
        m
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamtoolsSubcommand {
    View,
}

impl SamtoolsSubcommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamtoolsSubcommand::View => "view",
        }
    }
}

// Run config keys
pub const SAMPLES_KEY: &str = "samples";
pub const OUTPUT_DIR_KEY: &str = "output dir";
pub const INDEX_KEY: &str = "index";
pub const BOWTIE_PARAMS_KEY: &str = "bowtie params";
pub const HTSEQ_PARAMS_KEY: &str = "htseq params";
pub const GFF_KEY: &str = "gff";
pub const FILTER_BED_KEY: &str = "filter bed";

// Static filename suffixes
pub const ALIGN_LOG_EXT: &str = ".log";
pub const CLIPPING_REPORT_EXT: &str = ".clipping_report";

// Bowtie flags that request SAM output
pub const BOWTIE_SAM_FLAGS: &[&'static str] = &["-S", "--sam"];

pub const REPORT_RULE_WIDTH: usize = 80;


#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Missing run config key: '{0}'")]
    MissingConfig(String),

    #[error("Invalid run config: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn {tool}: {error}")]
    ToolSpawn { tool: String, error: String },

    #[error("Stage '{desc}' failed: {}", render_failures(.failures))]
    StageFailed { desc: String, failures: Vec<StageFailure> },

    #[error("{count} stage(s) failed")]
    StagesFailed { count: usize },

    #[error("IO error: {0}")]
    IOError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}

fn render_failures(failures: &[StageFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
