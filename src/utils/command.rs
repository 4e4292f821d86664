/// Functions and structs for creating command-line arguments for child processes

use std::env;
use std::path::{Path, PathBuf};
use crate::config::defs::PipelineError;


pub mod crispresso {
    use std::path::PathBuf;

    /// Fully resolved inputs for one CRISPResso invocation.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct CrispressoConfig {
        pub fastq_r1: PathBuf,
        pub fastq_r2: Option<PathBuf>,
        pub amplicon: String,
        pub guide: String,
        pub output_dir: PathBuf,
        pub name: Option<String>,
        pub min_base_quality: Option<u8>,
        pub n_processes: Option<usize>,
        pub plot_window_size: Option<u32>,
        pub gap_open: Option<i32>,
    }

    pub fn arg_generator(config: &CrispressoConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-r1".to_string());
        args_vec.push(config.fastq_r1.to_string_lossy().to_string());
        args_vec.push("-a".to_string());
        args_vec.push(config.amplicon.clone());
        args_vec.push("-g".to_string());
        args_vec.push(config.guide.clone());
        args_vec.push("-o".to_string());
        args_vec.push(config.output_dir.to_string_lossy().to_string());

        if let Some(r2) = &config.fastq_r2 {
            args_vec.push("-r2".to_string());
            args_vec.push(r2.to_string_lossy().to_string());
        }
        if let Some(name) = &config.name {
            args_vec.push("-n".to_string());
            args_vec.push(name.clone());
        }
        if let Some(q) = config.min_base_quality.filter(|q| *q > 0) {
            args_vec.push("-q".to_string());
            args_vec.push(q.to_string());
        }
        if let Some(p) = config.n_processes {
            args_vec.push("-p".to_string());
            args_vec.push(p.to_string());
        }
        if let Some(w) = config.plot_window_size {
            args_vec.push("--plot_window_size".to_string());
            args_vec.push(w.to_string());
        }
        if let Some(gap) = config.gap_open {
            args_vec.push("--needleman_wunsch_gap_open".to_string());
            args_vec.push(gap.to_string());
        }
        args_vec
    }
}

pub mod runner {
    use std::path::Path;
    use crate::cli::Arguments;
    use crate::config::defs::ANALYZE_MODULE;

    /// Arguments that re-invoke this binary as the job runner for an already
    /// created job directory. Only explicitly given options are forwarded.
    pub fn arg_generator(args: &Arguments, output_root: &Path, job_dir: &Path, name: &str) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("--module".to_string());
        args_vec.push(ANALYZE_MODULE.to_string());
        args_vec.push("--output_root".to_string());
        args_vec.push(output_root.to_string_lossy().to_string());
        args_vec.push("--output".to_string());
        args_vec.push(job_dir.to_string_lossy().to_string());
        args_vec.push("--name".to_string());
        args_vec.push(name.to_string());
        args_vec.push("--executable".to_string());
        args_vec.push(args.executable.clone());

        if let Some(r1) = &args.fastq_r1 {
            args_vec.push("--fastq_r1".to_string());
            args_vec.push(r1.clone());
        }
        if let Some(r2) = &args.fastq_r2 {
            args_vec.push("--fastq_r2".to_string());
            args_vec.push(r2.clone());
        }
        if let Some(amplicon) = &args.amplicon {
            args_vec.push("--amplicon".to_string());
            args_vec.push(amplicon.trim().to_string());
        }
        if let Some(guide) = &args.guide {
            args_vec.push("--guide".to_string());
            args_vec.push(guide.trim().to_string());
        }
        if args.n_padding > 0 {
            args_vec.push("--n_padding".to_string());
            args_vec.push(args.n_padding.to_string());
            args_vec.push("--pad_quality".to_string());
            args_vec.push(args.pad_quality.to_string());
        }
        if let Some(len) = args.min_read_length.filter(|l| *l > 0) {
            args_vec.push("--min_read_length".to_string());
            args_vec.push(len.to_string());
        }
        if let Some(q) = args.min_base_quality.filter(|q| *q > 0) {
            args_vec.push("--min_base_quality".to_string());
            args_vec.push(q.to_string());
        }
        if let Some(p) = args.n_processes.filter(|p| *p > 0) {
            args_vec.push("--n_processes".to_string());
            args_vec.push(p.to_string());
        }
        if let Some(w) = args.plot_window_size {
            args_vec.push("--plot_window_size".to_string());
            args_vec.push(w.to_string());
        }
        if let Some(gap) = args.needleman_wunsch_gap_open {
            args_vec.push("--needleman_wunsch_gap_open".to_string());
            args_vec.push(gap.to_string());
        }
        if args.verbose {
            args_vec.push("--verbose".to_string());
        }
        args_vec
    }
}


/// Finds the executable for `tool`. Anything containing a path separator is
/// checked directly, bare names are looked up on PATH.
///
/// # Arguments
///
/// * `tool` - Executable name or path.
///
/// # Returns
/// Absolute or PATH-resolved location of an executable file.
pub fn resolve_executable(tool: &str) -> Result<PathBuf, PipelineError> {
    if tool.trim().is_empty() {
        return Err(PipelineError::ExecutableNotFound("<empty>".to_string()));
    }

    if tool.contains(std::path::MAIN_SEPARATOR) || tool.contains('/') {
        let path = PathBuf::from(tool);
        return if is_executable(&path) {
            Ok(path)
        } else {
            Err(PipelineError::ExecutableNotFound(tool.to_string()))
        };
    }

    env::var_os("PATH")
        .and_then(|paths| {
            env::split_paths(&paths)
                .map(|dir| dir.join(tool))
                .find(|candidate| is_executable(candidate))
        })
        .ok_or_else(|| PipelineError::ExecutableNotFound(format!("{} (not on PATH)", tool)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}


/// Renders a command line for the running log. Arguments with spaces are quoted.
pub fn format_command(program: &Path, args: &[String]) -> String {
    let mut parts = vec![program.to_string_lossy().to_string()];
    for arg in args {
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            parts.push(format!("\"{}\"", arg));
        } else {
            parts.push(arg.clone());
        }
    }
    parts.join(" ")
}
