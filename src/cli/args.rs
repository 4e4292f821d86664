use std::path::PathBuf;
use clap::Parser;
use crate::config::defs::{DEFAULT_PAD_QUALITY, OUTPUT_ROOT_ENV};

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "crispresso-portal", version, about = "Submit, run and monitor CRISPResso jobs",
    long_about = "Submit, run and monitor CRISPResso jobs.\n\nJobs are submitted from the command line with `--module submit`, which validates the inputs, starts the runner in the background and returns at once; there is no web form. `--module portal` rebuilds the static status page under --output_root.")]
pub struct Arguments {

    #[arg(short, long, help = "One of: analyze (run one job in the foreground), portal (rebuild the status page), submit (validate and start a job in the background; replaces a web submission form)")]
    pub module: String,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(long, env = OUTPUT_ROOT_ENV, help = "Shared results root. Relative --output paths and the status page live here.")]
    pub output_root: PathBuf,

    #[arg(short = 'i', long = "fastq_r1")]
    pub fastq_r1: Option<String>,

    #[arg(short = 'I', long = "fastq_r2")]
    pub fastq_r2: Option<String>,

    #[arg(short = 'a', long)]
    pub amplicon: Option<String>,

    #[arg(short = 'g', long)]
    pub guide: Option<String>,

    #[arg(short = 'o', long = "output", help = "Job directory. Absolute paths are used as given; relative ones are placed under --output_root. Defaults to 'Job_<YYYYmmdd_HHMMSS>_<name>'.")]
    pub output: Option<String>,

    #[arg(short = 'n', long = "name")]
    pub name: Option<String>,

    #[arg(long, default_value = "CRISPResso")]
    pub executable: String,

    #[arg(long, help = "Accepted for compatibility; CRISPResso has no matching option and the value is ignored")]
    pub min_read_length: Option<usize>,

    #[arg(short = 'q', long)]
    pub min_base_quality: Option<u8>,

    #[arg(short = 'p', long)]
    pub n_processes: Option<usize>,

    #[arg(long, default_value_t = 0, help = "Number of N bases placed between R1 and reverse-complemented R2. 0 disables stitching.")]
    pub n_padding: usize,

    #[arg(long, default_value_t = DEFAULT_PAD_QUALITY, help = "Quality character used for padding bases")]
    pub pad_quality: char,

    #[arg(long)]
    pub plot_window_size: Option<u32>,

    #[arg(long, allow_hyphen_values = true)]
    pub needleman_wunsch_gap_open: Option<i32>,
}
