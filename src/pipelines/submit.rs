use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use log::info;
use tokio::process::Command as TokioCommand;
use crate::config::defs::{PipelineError, RunConfig};
use crate::pipelines::analyze::{JobLog, JobPlan};
use crate::pipelines::portal;
use crate::utils::command::{format_command, runner};

#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedJob {
    pub job_id: String,
    pub job_dir: PathBuf,
    pub log: PathBuf,
    pub pid: Option<u32>,
}

/// Validates a submission and starts the job runner in the background,
/// re-invoking this executable.
pub async fn run(config: Arc<RunConfig>) -> Result<SubmittedJob, PipelineError> {
    let runner_exe = env::current_exe()?;
    submit(&config, &runner_exe)
}

/// Validates, creates the job directory and running log, and spawns `runner_exe`
/// in its own process group with output appended to the log. Does not wait for it.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
/// * `runner_exe` - Program that understands `--module analyze`.
///
/// # Returns
/// SubmittedJob with the job location and runner PID.
pub fn submit(config: &RunConfig, runner_exe: &Path) -> Result<SubmittedJob, PipelineError> {
    let plan = JobPlan::from_config(config)?;
    fs::create_dir_all(&plan.job_dir)?;

    let mut log = JobLog::open(&plan.job_dir)?;
    let runner_args = runner::arg_generator(&config.args, &config.output_root, &plan.job_dir, &plan.sample);
    log.record(&format!("[Submit] {}", format_command(runner_exe, &runner_args)))?;

    let mut command = TokioCommand::new(runner_exe);
    command
        .args(&runner_args)
        .current_dir(&config.cwd)
        .stdin(Stdio::null())
        .stdout(log.stdio()?)
        .stderr(log.stdio()?);
    #[cfg(unix)]
    command.process_group(0);

    let child = command.spawn().map_err(|e| PipelineError::ToolExecution {
        tool: runner_exe.display().to_string(),
        error: e.to_string(),
    })?;
    let pid = child.id();
    // Dropping the handle leaves the runner alive; its progress is only visible on disk.
    drop(child);

    let submitted = SubmittedJob {
        job_id: plan.job_id.clone(),
        job_dir: plan.job_dir.clone(),
        log: plan.log_path(),
        pid,
    };

    portal::refresh(&config.output_root);

    info!("Job {} started in the background. PID: {}", submitted.job_id,
        submitted.pid.map_or_else(|| "unknown".to_string(), |p| p.to_string()));
    info!("  Running log: {}", submitted.log.display());
    info!("  Job directory: {}", submitted.job_dir.display());
    Ok(submitted)
}
