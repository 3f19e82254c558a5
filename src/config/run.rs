// src/config/run.rs: YAML run configuration

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::config::defs::{
    PipelineError, BOWTIE_PARAMS_KEY, DEFAULT_EXECUTABLES, FILTER_BED_KEY, GFF_KEY,
    HTSEQ_PARAMS_KEY, INDEX_KEY, OUTPUT_DIR_KEY, SAMPLES_KEY,
};

/// One sequencing run: a label and its read file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Sample {
    pub label: String,
    pub fastq: PathBuf,
}

/// Run configuration as loaded from YAML. Read-only once loaded.
///
/// Stage-specific keys are optional at load time; the accessors return
/// `PipelineError::MissingConfig` when a stage asks for a key that is absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfig {
    pub samples: Option<Vec<Sample>>,

    #[serde(rename = "output dir")]
    pub output_dir: Option<PathBuf>,

    pub index: Option<String>,

    #[serde(rename = "bowtie params")]
    pub bowtie_params: Option<String>,

    #[serde(rename = "htseq params")]
    pub htseq_params: Option<String>,

    pub gff: Option<PathBuf>,

    pub adapter: Option<String>,

    #[serde(rename = "filter bed")]
    pub filter_bed: Option<PathBuf>,

    /// Tool tag -> executable override.
    #[serde(default)]
    pub tools: HashMap<String, String>,

    #[serde(rename = "tmp dir")]
    pub tmp_dir: Option<PathBuf>,

    /// Per-process timeout in seconds; 0 means no limit.
    pub timeout: Option<u64>,
}

impl RunConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, PipelineError> {
        serde_yaml::from_str(yaml).map_err(|e| PipelineError::InvalidConfig(e.to_string()))
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(path)
            .map_err(|e| PipelineError::IOError(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    pub fn samples(&self) -> Result<&[Sample], PipelineError> {
        self.samples
            .as_deref()
            .ok_or_else(|| PipelineError::MissingConfig(SAMPLES_KEY.to_string()))
    }

    pub fn output_dir(&self) -> Result<&Path, PipelineError> {
        required(self.output_dir.as_deref(), OUTPUT_DIR_KEY)
    }

    pub fn index(&self) -> Result<&str, PipelineError> {
        required(self.index.as_deref(), INDEX_KEY)
    }

    /// Bowtie parameter string split on whitespace.
    pub fn bowtie_params(&self) -> Result<Vec<String>, PipelineError> {
        required(self.bowtie_params.as_deref(), BOWTIE_PARAMS_KEY).map(split_params)
    }

    /// htseq-count parameter string split on whitespace.
    pub fn htseq_params(&self) -> Result<Vec<String>, PipelineError> {
        required(self.htseq_params.as_deref(), HTSEQ_PARAMS_KEY).map(split_params)
    }

    pub fn gff(&self) -> Result<&Path, PipelineError> {
        required(self.gff.as_deref(), GFF_KEY)
    }

    /// Adapter sequence for clipping. Absent or null means no clipping.
    pub fn adapter(&self) -> Option<&str> {
        self.adapter.as_deref()
    }

    pub fn filter_bed(&self) -> Result<&Path, PipelineError> {
        required(self.filter_bed.as_deref(), FILTER_BED_KEY)
    }

    /// Executable to run for a tool tag, honouring `tools` overrides.
    pub fn executable(&self, tool: &str) -> String {
        self.tools
            .get(tool)
            .cloned()
            .or_else(|| DEFAULT_EXECUTABLES.get(tool).map(|exe| exe.to_string()))
            .unwrap_or_else(|| tool.to_string())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.filter(|&secs| secs > 0).map(Duration::from_secs)
    }

    /// Scratch directory for temporaries, falling back to the system temp dir.
    pub fn tmp_dir(&self) -> PathBuf {
        self.tmp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn required<'a, T: ?Sized>(value: Option<&'a T>, key: &str) -> Result<&'a T, PipelineError> {
    value.ok_or_else(|| PipelineError::MissingConfig(key.to_string()))
}

fn split_params(params: &str) -> Vec<String> {
    params.split_whitespace().map(str::to_string).collect()
}
