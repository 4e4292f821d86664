use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use chrono::Local;
use log::{debug, error, info, warn};
use tokio::process::Command as TokioCommand;
use crate::config::defs::{PipelineError, RunConfig, CRISPRESSO_TAG, DISPLAY_TIMESTAMP_FORMAT, FAILURE_MARKER, RUNNING_LOG, SUCCESS_MARKER};
use crate::pipelines::portal;
use crate::pipelines::stitch::{stitch_paired_reads, stitched_amplicon, stitched_reads_path};
use crate::utils::command::crispresso::{self, CrispressoConfig};
use crate::utils::command::{format_command, resolve_executable};
use crate::utils::fastx::has_fastq_extension;
use crate::utils::file::{absolutize, job_dir_name, resolve_output_dir, sanitize_name};
use crate::utils::system::{cap_processes, detect_cores};

/// IUPAC nucleotide codes accepted in amplicon and guide sequences.
const SEQUENCE_ALPHABET: &str = "ACGTURYKMSWBDHVN";

/// How the wrapped tool finished. A non-zero exit is an outcome, not an error:
/// it is recorded in the running log for the status page to pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    ToolFailed(Option<i32>),
}

/// Everything needed to run one job, checked before any process is spawned.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPlan {
    pub job_id: String,
    pub job_dir: PathBuf,
    pub sample: String,
    pub fastq_r1: PathBuf,
    pub fastq_r2: Option<PathBuf>,
    pub amplicon: String,
    pub guide: String,
    pub n_padding: usize,
    pub pad_quality: u8,
    pub executable: PathBuf,
    pub min_base_quality: Option<u8>,
    pub n_processes: Option<usize>,
    pub plot_window_size: Option<u32>,
    pub gap_open: Option<i32>,
    pub warnings: Vec<String>,
}

fn required<'a>(value: &'a Option<String>, flag: &str) -> Result<&'a str, PipelineError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PipelineError::Validation(format!("--{} is required", flag)))
}

fn check_sequence(seq: &str, flag: &str) -> Result<(), PipelineError> {
    for part in seq.split(',') {
        if part.is_empty() {
            return Err(PipelineError::Validation(format!("--{} contains an empty sequence", flag)));
        }
        if let Some(bad) = part
            .chars()
            .find(|c| !SEQUENCE_ALPHABET.contains(c.to_ascii_uppercase()))
        {
            return Err(PipelineError::Validation(format!(
                "--{} contains '{}', expected nucleotide codes ({})",
                flag, bad, SEQUENCE_ALPHABET
            )));
        }
    }
    Ok(())
}

fn existing_file(path: &str, cwd: &Path, flag: &str) -> Result<PathBuf, PipelineError> {
    let path = absolutize(Path::new(path), cwd);
    if !path.is_file() {
        return Err(PipelineError::Validation(format!(
            "--{} file does not exist: {}",
            flag,
            path.display()
        )));
    }
    Ok(path)
}

impl JobPlan {
    /// Validates the arguments in `config` and resolves paths and the executable.
    /// Fails with `Validation` or `ExecutableNotFound`; nothing is written.
    pub fn from_config(config: &RunConfig) -> Result<Self, PipelineError> {
        let args = &config.args;
        let mut warnings = Vec::new();

        let fastq_r1 = existing_file(required(&args.fastq_r1, "fastq_r1")?, &config.cwd, "fastq_r1")?;
        let fastq_r2 = match args.fastq_r2.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(path) => Some(existing_file(path, &config.cwd, "fastq_r2")?),
            None => None,
        };
        for path in std::iter::once(&fastq_r1).chain(fastq_r2.iter()) {
            if !has_fastq_extension(path) {
                warnings.push(format!("{} does not have a FASTQ extension", path.display()));
            }
        }

        let amplicon = required(&args.amplicon, "amplicon")?.to_string();
        check_sequence(&amplicon, "amplicon")?;
        let guide = required(&args.guide, "guide")?.to_string();
        check_sequence(&guide, "guide")?;

        let name = required(&args.name, "name")?;
        let sample = sanitize_name(name);
        if sample.is_empty() {
            return Err(PipelineError::Validation(format!(
                "--name '{}' has no characters usable in a directory name (letters, digits, '-', '_')",
                name
            )));
        }

        if args.n_padding > 0 && fastq_r2.is_none() {
            return Err(PipelineError::Validation(
                "--n_padding requires --fastq_r2 (stitching needs both mates)".to_string(),
            ));
        }
        if !('!'..='~').contains(&args.pad_quality) {
            return Err(PipelineError::Validation(format!(
                "--pad_quality '{}' is not a printable ASCII quality character",
                args.pad_quality
            )));
        }

        if let Some(len) = args.min_read_length.filter(|l| *l > 0) {
            warnings.push(format!(
                "Argument --min_read_length {} ignored (no matching {} option)",
                len, CRISPRESSO_TAG
            ));
        }

        let cores = detect_cores();
        let (n_processes, capped) = cap_processes(args.n_processes, cores);
        if capped {
            warnings.push(format!(
                "--n_processes {} exceeds the {} available cores; using {}",
                args.n_processes.unwrap_or_default(),
                cores,
                cores
            ));
        }

        let executable = resolve_executable(&args.executable)?;

        let job_dir = match args.output.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
            Some(output) => resolve_output_dir(&config.output_root, Path::new(output)),
            None => config.output_root.join(job_dir_name(&config.timestamp, &sample)),
        };
        let job_id = job_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| job_dir_name(&config.timestamp, &sample));

        Ok(JobPlan {
            job_id,
            job_dir,
            sample,
            fastq_r1,
            fastq_r2,
            amplicon,
            guide,
            n_padding: args.n_padding,
            pad_quality: args.pad_quality as u8,
            executable,
            min_base_quality: args.min_base_quality,
            n_processes,
            plot_window_size: args.plot_window_size,
            gap_open: args.needleman_wunsch_gap_open,
            warnings,
        })
    }

    /// Padding to stitch with, or None when stitching is not requested.
    /// Zero padding means "no stitching", never a zero-length join.
    pub fn stitch_padding(&self) -> Option<usize> {
        match (&self.fastq_r2, self.n_padding) {
            (Some(_), n) if n > 0 => Some(n),
            _ => None,
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.job_dir.join(RUNNING_LOG)
    }
}


/// Append-only running log inside a job directory.
pub struct JobLog {
    path: PathBuf,
    file: File,
}

impl JobLog {
    pub fn open(job_dir: &Path) -> io::Result<Self> {
        let path = job_dir.join(RUNNING_LOG);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(JobLog { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one timestamped line.
    pub fn record(&mut self, line: &str) -> io::Result<()> {
        writeln!(
            self.file,
            "[{}] {}",
            Local::now().format(DISPLAY_TIMESTAMP_FORMAT),
            line
        )?;
        self.file.flush()
    }

    /// A handle on the log for a child's stdout or stderr.
    pub fn stdio(&self) -> io::Result<Stdio> {
        Ok(Stdio::from(self.file.try_clone()?))
    }
}


/// Runs one job end to end: validate, create the job directory, write the running
/// log, stitch if requested, run CRISPResso, then rebuild the status page.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
///
/// # Returns
/// JobOutcome of the wrapped tool. Errors only for problems that stopped the tool
/// from being run at all.
pub async fn run(config: Arc<RunConfig>) -> Result<JobOutcome, PipelineError> {
    info!("\n-------------\n CRISPResso job\n-------------\n");

    let plan = match JobPlan::from_config(&config) {
        Ok(plan) => plan,
        Err(e) => {
            record_start_failure(&config, &e);
            return Err(e);
        }
    };
    if let Err(e) = fs::create_dir_all(&plan.job_dir) {
        let e = PipelineError::from(e);
        record_start_failure(&config, &e);
        return Err(e);
    }
    info!("Job directory: {}", plan.job_dir.display());

    let outcome = execute(&config, &plan).await;

    portal::refresh(&config.output_root);
    outcome
}

/// A detached runner has nobody to report to. When `--output` names a job
/// directory that already exists, the failure goes into its running log so the
/// status page stops showing the job as running.
fn record_start_failure(config: &RunConfig, e: &PipelineError) {
    let Some(output) = config.args.output.as_deref().map(str::trim).filter(|o| !o.is_empty()) else {
        return;
    };
    let job_dir = resolve_output_dir(&config.output_root, Path::new(output));
    if !job_dir.is_dir() {
        return;
    }

    let recorded = JobLog::open(&job_dir)
        .and_then(|mut log| log.record(&format!("{} Job could not start: {}", FAILURE_MARKER, e)));
    match recorded {
        Ok(()) => portal::refresh(&config.output_root),
        Err(log_err) => warn!("Could not record failure in {}: {}", job_dir.display(), log_err),
    }
}

async fn execute(config: &RunConfig, plan: &JobPlan) -> Result<JobOutcome, PipelineError> {
    let mut log = JobLog::open(&plan.job_dir)?;
    log.record(&format!("[Start] Job {} (sample {})", plan.job_id, plan.sample))?;
    for warning in &plan.warnings {
        warn!("{}", warning);
        log.record(&format!("[Warning] {}", warning))?;
    }
    portal::refresh(&config.output_root);

    let (reads_r1, reads_r2, amplicon) = match plan.stitch_padding() {
        Some(n_padding) => {
            let r1 = plan.fastq_r1.clone();
            let r2 = plan.fastq_r2.clone().unwrap_or_default();
            let output = stitched_reads_path(&plan.job_dir, &plan.sample, n_padding, &config.timestamp);
            let pad_quality = plan.pad_quality;

            log.record(&format!("[Process] Stitching reads with {} N padding", n_padding))?;
            let stitched = tokio::task::spawn_blocking(move || {
                stitch_paired_reads(&r1, &r2, &output, n_padding, pad_quality)
            })
                .await
                .map_err(|e| PipelineError::IOError(format!("Stitching task failed: {}", e)))
                .and_then(|result| result);

            match stitched {
                Ok(summary) => {
                    log.record(&format!(
                        "[Process] Stitched {} reads into {}",
                        summary.records,
                        summary.output.display()
                    ))?;
                    (summary.output, None, stitched_amplicon(&plan.amplicon, n_padding))
                }
                Err(e) => {
                    error!("Stitching failed: {}", e);
                    log.record(&format!("{} Stitching failed: {}", FAILURE_MARKER, e))?;
                    return Err(e);
                }
            }
        }
        None => (plan.fastq_r1.clone(), plan.fastq_r2.clone(), plan.amplicon.clone()),
    };

    let crispresso_config = CrispressoConfig {
        fastq_r1: reads_r1,
        fastq_r2: reads_r2,
        amplicon,
        guide: plan.guide.clone(),
        output_dir: plan.job_dir.clone(),
        name: Some(plan.sample.clone()),
        min_base_quality: plan.min_base_quality,
        n_processes: plan.n_processes,
        plot_window_size: plan.plot_window_size,
        gap_open: plan.gap_open,
    };
    let crispresso_args = crispresso::arg_generator(&crispresso_config);
    let command_line = format_command(&plan.executable, &crispresso_args);
    info!("Running command: {}", command_line);
    log.record(&format!("[Exec] Running command: {}", command_line))?;

    let status = TokioCommand::new(&plan.executable)
        .args(&crispresso_args)
        .stdin(Stdio::null())
        .stdout(log.stdio()?)
        .stderr(log.stdio()?)
        .status()
        .await;

    match status {
        Ok(status) if status.success() => {
            info!("{} finished successfully", CRISPRESSO_TAG);
            log.record(SUCCESS_MARKER)?;
            Ok(JobOutcome::Completed)
        }
        Ok(status) => {
            let code = status.code();
            let shown = code.map_or_else(|| "none (killed by signal)".to_string(), |c| c.to_string());
            warn!("{} exited with return code {}", CRISPRESSO_TAG, shown);
            log.record(&format!("{} Job Failed with return code {}", FAILURE_MARKER, shown))?;
            Ok(JobOutcome::ToolFailed(code))
        }
        Err(e) => {
            log.record(&format!("{} Failed to launch {}: {}", FAILURE_MARKER, plan.executable.display(), e))?;
            debug!("Running log: {}", log.path().display());
            Err(PipelineError::ToolExecution {
                tool: CRISPRESSO_TAG.to_string(),
                error: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use log::LevelFilter;
    use tempfile::{tempdir, TempDir};
    use crate::cli::Arguments;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        r1: PathBuf,
        r2: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let root = dir.path().join("out");
        let r1 = dir.path().join("s_R1.fastq");
        let r2 = dir.path().join("s_R2.fastq");
        fs::write(&r1, "@a\nACGT\n+\nIIII\n").unwrap();
        fs::write(&r2, "@a\nACGT\n+\nIIII\n").unwrap();
        Fixture { _dir: dir, root, r1, r2 }
    }

    fn config(fx: &Fixture, edit: impl FnOnce(&mut Arguments)) -> RunConfig {
        let mut args = Arguments {
            module: "analyze".to_string(),
            output_root: fx.root.clone(),
            fastq_r1: Some(fx.r1.to_string_lossy().to_string()),
            amplicon: Some("ACGTACGTAC".to_string()),
            guide: Some("ACGTA".to_string()),
            name: Some("sample 1".to_string()),
            executable: "sh".to_string(),
            pad_quality: 'I',
            ..Default::default()
        };
        edit(&mut args);
        RunConfig {
            cwd: PathBuf::from("/"),
            output_root: fx.root.clone(),
            args,
            timestamp: NaiveDate::from_ymd_opt(2026, 1, 22).unwrap().and_hms_opt(9, 5, 7).unwrap(),
            log_level: LevelFilter::Info,
        }
    }

    fn validation_error(config: &RunConfig) -> String {
        match JobPlan::from_config(config) {
            Err(PipelineError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_default_job_dir_under_root() {
        let fx = fixture();
        let plan = JobPlan::from_config(&config(&fx, |_| {})).unwrap();
        assert_eq!(plan.sample, "sample1");
        assert_eq!(plan.job_id, "Job_20260122_090507_sample1");
        assert_eq!(plan.job_dir, fx.root.join("Job_20260122_090507_sample1"));
        assert_eq!(plan.stitch_padding(), None);
        assert!(plan.warnings.is_empty());
    }

    #[test]
    fn test_relative_and_absolute_output() {
        let fx = fixture();
        let relative = config(&fx, |a| a.output = Some("batch7/Job_x".to_string()));
        assert_eq!(JobPlan::from_config(&relative).unwrap().job_dir, fx.root.join("batch7/Job_x"));

        let absolute = config(&fx, |a| a.output = Some("/scratch/Job_y".to_string()));
        let plan = JobPlan::from_config(&absolute).unwrap();
        assert_eq!(plan.job_dir, PathBuf::from("/scratch/Job_y"));
        assert_eq!(plan.job_id, "Job_y");
    }

    #[test]
    fn test_missing_required_fields() {
        let fx = fixture();
        assert!(validation_error(&config(&fx, |a| a.fastq_r1 = None)).contains("fastq_r1"));
        assert!(validation_error(&config(&fx, |a| a.amplicon = Some("  ".to_string()))).contains("amplicon"));
        assert!(validation_error(&config(&fx, |a| a.guide = None)).contains("guide"));
        assert!(validation_error(&config(&fx, |a| a.name = None)).contains("name"));
        assert!(validation_error(&config(&fx, |a| a.name = Some("###".to_string()))).contains("name"));
    }

    #[test]
    fn test_missing_read_files() {
        let fx = fixture();
        assert!(validation_error(&config(&fx, |a| a.fastq_r1 = Some("/no/such/r1.fq".to_string()))).contains("does not exist"));
        assert!(validation_error(&config(&fx, |a| a.fastq_r2 = Some("/no/such/r2.fq".to_string()))).contains("fastq_r2"));
    }

    #[test]
    fn test_bad_sequence_alphabet() {
        let fx = fixture();
        assert!(validation_error(&config(&fx, |a| a.amplicon = Some("ACGTXX".to_string()))).contains("'X'"));
        assert!(JobPlan::from_config(&config(&fx, |a| a.amplicon = Some("acgtn,GGCC".to_string()))).is_ok());
    }

    #[test]
    fn test_padding_requires_r2() {
        let fx = fixture();
        assert!(validation_error(&config(&fx, |a| a.n_padding = 10)).contains("fastq_r2"));
    }

    #[test]
    fn test_zero_padding_disables_stitching() {
        let fx = fixture();
        let r2 = fx.r2.to_string_lossy().to_string();
        let paired = config(&fx, |a| a.fastq_r2 = Some(r2.clone()));
        assert_eq!(JobPlan::from_config(&paired).unwrap().stitch_padding(), None);

        let stitched = config(&fx, |a| {
            a.fastq_r2 = Some(r2.clone());
            a.n_padding = 15;
        });
        assert_eq!(JobPlan::from_config(&stitched).unwrap().stitch_padding(), Some(15));
    }

    #[test]
    fn test_executable_not_found() {
        let fx = fixture();
        let cfg = config(&fx, |a| a.executable = "no-such-crispresso-binary".to_string());
        assert!(matches!(JobPlan::from_config(&cfg), Err(PipelineError::ExecutableNotFound(_))));
    }

    #[test]
    fn test_min_read_length_warns() {
        let fx = fixture();
        let plan = JobPlan::from_config(&config(&fx, |a| a.min_read_length = Some(50))).unwrap();
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].contains("--min_read_length 50 ignored"));
    }

    #[test]
    fn test_job_log_appends_lines() -> io::Result<()> {
        let dir = tempdir()?;
        let mut log = JobLog::open(dir.path())?;
        log.record("first")?;
        let mut again = JobLog::open(dir.path())?;
        again.record(SUCCESS_MARKER)?;

        let text = fs::read_to_string(dir.path().join(RUNNING_LOG))?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("] first"));
        assert!(lines[1].ends_with(SUCCESS_MARKER));
        Ok(())
    }
}
