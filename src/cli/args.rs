use std::path::PathBuf;
use clap::{Parser, ValueEnum};

/// Pipeline stages, in the order they run for a sample.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Clip,
    Align,
    Filter,
    Count,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "seqtask-pipelines", version, about = "Runs clip/align/filter/count stages for each sample in a run config")]
pub struct Arguments {

    #[arg(short = 'c', long = "config", help = "YAML run configuration")]
    pub config: PathBuf,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_value = "clip,align,filter,count",
        help = "Comma-separated stages to run. Skipped clip/filter pass reads through; skipped align/count reuse existing outputs"
    )]
    pub stages: Vec<Stage>,

    #[arg(long, help = "Samples processed concurrently; defaults to the physical core count")]
    pub threads: Option<usize>,

    #[arg(long, value_parser = clap::value_parser!(u64).range(1..), help = "Per-process timeout in seconds; overrides the run config")]
    pub timeout: Option<u64>,

    #[arg(long, default_value_t = false, help = "Finish other samples after a stage failure instead of stopping the run")]
    pub keep_going: bool,
}
