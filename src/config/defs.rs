use std::path::PathBuf;
use chrono::NaiveDateTime;
use log::LevelFilter;
use thiserror::Error;
use crate::cli::Arguments;

// External software
pub const CRISPRESSO_TAG: &str = "CRISPResso";
pub const GZIP_EXT: &str = "gz";

// Modules
pub const ANALYZE_MODULE: &str = "analyze";
pub const PORTAL_MODULE: &str = "portal";
pub const SUBMIT_MODULE: &str = "submit";

// Shared configuration
pub const OUTPUT_ROOT_ENV: &str = "CRISPRESSO_OUTPUT_ROOT";

// Static Filenames
pub const RUNNING_LOG: &str = "CRISPResso_RUNNING_LOG.txt";
pub const PORTAL_HTML: &str = "index.html";
pub const STITCH_DIR: &str = "stitched_reads";
pub const JOB_PREFIX: &str = "Job_";

// Timestamps
pub const JOB_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
pub const STITCH_TIMESTAMP_FORMAT: &str = "%H%M%S";
pub const DISPLAY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Running log markers. The failure signatures are matched against the
// wrapped tool's own output too, so they follow its wording.
pub const SUCCESS_MARKER: &str = "[Status] Job Completed Successfully";
pub const FAILURE_MARKER: &str = "[Error]";
pub const FAILURE_SIGNATURES: &[&str] = &["Error", "Exception", "Traceback"];
pub const LOG_TAIL_BYTES: u64 = 4096;

// Report discovery
pub const REPORT_TAG: &str = "report";
pub const CRISPRESSO_REPORT_TAG: &str = "crispresso_on";
pub const HTML_EXT: &str = "html";

// Static Parameters
pub const PAD_BASE: u8 = b'N';
pub const DEFAULT_PAD_QUALITY: char = 'I';
pub const STITCH_PROGRESS_INTERVAL: u64 = 100_000;
pub const PORTAL_REFRESH_MS: u64 = 60_000;

pub const FASTQ_EXTS: &[&'static str] = &["fastq", "fq"];


pub struct RunConfig  {
    pub cwd: PathBuf,
    pub output_root: PathBuf,
    pub args: Arguments,
    pub timestamp: NaiveDateTime,
    pub log_level: LevelFilter,
}


#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Executable not found or not executable: {0}")]
    ExecutableNotFound(String),

    #[error("Read files have different record counts: {r1_path} ran out after {r1_records} records, {r2_path} after {r2_records}")]
    MismatchedPair {
        r1_path: String,
        r2_path: String,
        r1_records: u64,
        r2_records: u64,
    },

    #[error("Malformed FASTQ record {record} in {path}: {reason}")]
    MalformedRecord {
        path: String,
        record: u64,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{tool} failed: {error}")]
    ToolExecution {
        tool: String,
        error: String,
    },

    #[error("I/O error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}
