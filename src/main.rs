use std::env;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Local;
use env_logger::Builder;
use log::{LevelFilter, debug, error, info};

use crispresso_portal::cli::parse;
use crispresso_portal::config::defs::{RunConfig, PipelineError, ANALYZE_MODULE, PORTAL_MODULE, SUBMIT_MODULE};
use crispresso_portal::pipelines::{analyze, portal, submit};
use crispresso_portal::pipelines::analyze::JobOutcome;
use crispresso_portal::utils::file::absolutize;


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
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    let cwd = env::current_dir()?;
    debug!("The current directory is {:?}", cwd);

    let output_root = absolutize(&args.output_root, &cwd);
    debug!("Output root is {:?}", output_root);

    let module = args.module.clone();
    let run_config = Arc::new(RunConfig {
        cwd,
        output_root,
        args,
        timestamp: Local::now().naive_local(),
        log_level,
    });

    if let Err(e) = match module.as_str() {
        ANALYZE_MODULE => analyze_run(run_config).await,
        PORTAL_MODULE => portal::run(run_config).await,
        SUBMIT_MODULE => submit_run(run_config).await,
        _ => Err(PipelineError::InvalidConfig(format!("Invalid module: {}", module))),
    } {
        error!("{} failed: {} at {} milliseconds.", module, e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    debug!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


/// A non-zero exit of the wrapped tool still counts as a successful run here;
/// it is reported through the running log only.
async fn analyze_run(run_config: Arc<RunConfig>) -> Result<(), PipelineError> {
    match analyze::run(run_config).await? {
        JobOutcome::Completed => info!("Job Completed Successfully"),
        JobOutcome::ToolFailed(code) => info!("Job finished; wrapped tool exit status {:?} recorded in the running log", code),
    }
    Ok(())
}

async fn submit_run(run_config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let job = submit::run(run_config).await?;
    println!("job_id\t{}", job.job_id);
    println!("job_dir\t{}", job.job_dir.display());
    println!("log\t{}", job.log.display());
    println!("pid\t{}", job.pid.map_or_else(|| "unknown".to_string(), |p| p.to_string()));
    Ok(())
}
