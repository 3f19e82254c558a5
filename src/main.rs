use std::env;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{LevelFilter, debug, error, info};
use env_logger::Builder;

use seqtask_pipelines::cli::parse;
use seqtask_pipelines::config::RunConfig;
use seqtask_pipelines::pipelines::rnaseq::{self, FailurePolicy, RunOptions};
use seqtask_pipelines::utils::report::Reporter;
use seqtask_pipelines::utils::system::detect_concurrency;


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    let dir = env::current_dir()?;
    info!("The current directory is {:?}", dir);

    let run_config = match RunConfig::from_yaml_file(&args.config) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Could not load run config {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };

    let max_concurrent = detect_concurrency(args.threads);
    debug!("Running up to {} samples at once", max_concurrent);

    let options = RunOptions {
        stages: args.stages.clone(),
        policy: if args.keep_going { FailurePolicy::KeepGoing } else { FailurePolicy::FailFast },
        timeout: args.timeout.map(Duration::from_secs).or_else(|| run_config.timeout()),
        max_concurrent,
    };

    if let Err(e) = rnaseq::run(run_config, Reporter::log_crate(), options).await {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    info!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}
