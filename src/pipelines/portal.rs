//! Status page for every job under the results root.
//!
//! Job state is a pure function of what is on disk: the report files CRISPResso
//! leaves behind and the tail of the running log. The classification is a
//! heuristic. Failure detection matches strings in the wrapped tool's output, so
//! it follows whatever that tool prints and can misfire when its wording changes.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use chrono::{Local, NaiveDateTime};
use log::{debug, info, warn};
use crate::config::defs::{
    PipelineError, RunConfig, CRISPRESSO_REPORT_TAG, DISPLAY_TIMESTAMP_FORMAT, FAILURE_SIGNATURES,
    HTML_EXT, JOB_PREFIX, JOB_TIMESTAMP_FORMAT, LOG_TAIL_BYTES, PORTAL_HTML, PORTAL_REFRESH_MS,
    REPORT_TAG, RUNNING_LOG, SUCCESS_MARKER,
};
use crate::utils::file::{find_files_with_extension, write_atomically};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Done,
    LikelyError,
}

impl JobStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Running => "Running",
            JobStatus::Done => "Done",
            JobStatus::LikelyError => "Likely error",
        }
    }

    fn css_class(&self) -> &'static str {
        match self {
            JobStatus::Running => "status-running",
            JobStatus::Done => "status-done",
            JobStatus::LikelyError => "status-error",
        }
    }
}

/// Read-only view of one job directory, rebuilt on every scan.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEntry {
    pub name: String,
    pub dir: PathBuf,
    pub submitted: Option<NaiveDateTime>,
    pub status: JobStatus,
    pub report: Option<PathBuf>,
}

/// Submission time encoded in `Job_<YYYYmmdd_HHMMSS>_<sample>`.
pub fn parse_job_timestamp(name: &str) -> Option<NaiveDateTime> {
    let stamp = name.strip_prefix(JOB_PREFIX)?.get(..15)?;
    NaiveDateTime::parse_from_str(stamp, JOB_TIMESTAMP_FORMAT).ok()
}

/// Picks the CRISPResso report inside a job directory.
/// A file named like `*report*` wins outright; otherwise the last `CRISPResso_on_*`
/// page in path order. The status page itself is never a report.
pub fn find_report(job_dir: &Path) -> Option<PathBuf> {
    let candidates = match find_files_with_extension(job_dir, HTML_EXT) {
        Ok(candidates) => candidates,
        Err(e) => {
            debug!("Cannot scan {}: {}", job_dir.display(), e);
            return None;
        }
    };

    let mut best = None;
    for html in candidates {
        let name = match html.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_ascii_lowercase(),
            None => continue,
        };
        if name == PORTAL_HTML {
            continue;
        }
        if name.contains(REPORT_TAG) {
            return Some(html);
        }
        if name.contains(CRISPRESSO_REPORT_TAG) {
            best = Some(html);
        }
    }
    best
}

/// Last `LOG_TAIL_BYTES` of a log, decoded lossily.
pub fn read_log_tail(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(LOG_TAIL_BYTES)))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Three-way status from the evidence on disk.
/// A report means done whatever the log says. Without one, the success marker
/// also means done, a failure signature means a likely error, and anything else,
/// including no log at all, is treated as still running.
pub fn classify(has_report: bool, log_tail: Option<&str>) -> JobStatus {
    if has_report {
        return JobStatus::Done;
    }
    match log_tail {
        Some(tail) if tail.contains(SUCCESS_MARKER) => JobStatus::Done,
        Some(tail) if FAILURE_SIGNATURES.iter().any(|sig| tail.contains(sig)) => JobStatus::LikelyError,
        _ => JobStatus::Running,
    }
}

pub fn inspect_job(job_dir: &Path) -> StatusEntry {
    let name = job_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let report = find_report(job_dir);

    let log_path = job_dir.join(RUNNING_LOG);
    let log_tail = match read_log_tail(&log_path) {
        Ok(tail) => Some(tail),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Cannot read {}: {}", log_path.display(), e);
            None
        }
    };

    StatusEntry {
        submitted: parse_job_timestamp(&name),
        status: classify(report.is_some(), log_tail.as_deref()),
        dir: job_dir.to_path_buf(),
        name,
        report,
    }
}

/// Inspects every `Job_*` directory directly under `root`, newest first.
pub fn scan_jobs(root: &Path) -> Result<Vec<StatusEntry>, PipelineError> {
    if !root.is_dir() {
        return Err(PipelineError::InvalidConfig(format!(
            "Output root {} does not exist",
            root.display()
        )));
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        let is_job = path.is_dir()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with(JOB_PREFIX));
        if is_job {
            entries.push(inspect_job(&path));
        }
    }
    entries.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(entries)
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

fn relative_link(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("./{}", parts.join("/"))
}

fn render_row(root: &Path, entry: &StatusEntry, result: &str) -> String {
    let submitted = entry
        .submitted
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let log_link = relative_link(root, &entry.dir.join(RUNNING_LOG));
    format!(
        r#"        <tr>
            <td><strong>{name}</strong></td>
            <td>{submitted}</td>
            <td><span class="{class}">{label}</span></td>
            <td><a href="{log}" target="_blank">Log</a></td>
            <td>{result}</td>
        </tr>
"#,
        name = escape_html(&entry.name),
        submitted = submitted,
        class = entry.status.css_class(),
        label = entry.status.label(),
        log = escape_html(&log_link),
        result = result,
    )
}

fn render_table(rows: &str, result_header: &str) -> String {
    format!(
        r#"<table>
    <thead>
        <tr>
            <th style="width: 20%;">Job</th>
            <th style="width: 15%;">Submitted</th>
            <th style="width: 10%;">Status</th>
            <th style="width: 10%;">Log</th>
            <th style="width: 45%;">{header}</th>
        </tr>
    </thead>
    <tbody>
{rows}    </tbody>
</table>"#,
        header = result_header,
        rows = rows,
    )
}

/// Renders the whole page. `generated_at` appears on a single line of its own;
/// everything else depends only on `root` and `entries`.
pub fn render_portal(root: &Path, entries: &[StatusEntry], generated_at: &NaiveDateTime) -> String {
    let mut active_rows = String::new();
    let mut failed_rows = String::new();

    for entry in entries {
        match entry.status {
            JobStatus::Running | JobStatus::Done => {
                let result = match &entry.report {
                    Some(report) => {
                        let link = relative_link(root, report);
                        let file_name = report
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        format!(
                            r#"<a href="{link}" target="_blank">Open report ({name})</a><div class="path-info">{link}</div>"#,
                            link = escape_html(&link),
                            name = escape_html(&file_name),
                        )
                    }
                    None => r#"<span class="pending">Waiting for report...</span>"#.to_string(),
                };
                active_rows.push_str(&render_row(root, entry, &result));
            }
            JobStatus::LikelyError => {
                let cleanup = format!(
                    r#"<code class="cmd-code" title="Click to select, then run on the server">rm -rf {}</code>"#,
                    escape_html(&shell_quote(&entry.dir))
                );
                failed_rows.push_str(&render_row(root, entry, &cleanup));
            }
        }
    }

    let active_table = if active_rows.is_empty() {
        r#"<p class="empty">No active jobs.</p>"#.to_string()
    } else {
        render_table(&active_rows, "Report")
    };
    let failed_table = if failed_rows.is_empty() {
        r#"<p class="empty ok">No failed jobs.</p>"#.to_string()
    } else {
        render_table(&failed_rows, "Cleanup command (server)")
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>CRISPResso job portal</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif; margin: 20px; background-color: #f4f6f9; }}
        h1 {{ color: #333; }}
        h2 {{ margin-top: 0; }}
        .card {{ background: white; padding: 20px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); margin-bottom: 30px; }}
        table {{ width: 100%; border-collapse: collapse; margin-top: 10px; table-layout: fixed; }}
        th, td {{ text-align: left; padding: 12px; border-bottom: 1px solid #ddd; word-wrap: break-word; }}
        th {{ background-color: #f8f9fa; color: #333; font-weight: 600; border-top: 2px solid #ddd; }}
        tr:hover {{ background-color: #f1f1f1; }}
        .status-running {{ color: #e67e22; font-weight: bold; }}
        .status-done {{ color: #27ae60; font-weight: bold; }}
        .status-error {{ color: #c0392b; font-weight: bold; }}
        a {{ text-decoration: none; color: #007bff; }}
        a:hover {{ text-decoration: underline; }}
        .path-info {{ font-size: 0.85em; color: #666; font-family: monospace; margin-top: 4px; }}
        .pending {{ color: #999; }}
        .empty {{ padding: 20px; color: #666; }}
        .empty.ok {{ color: #27ae60; }}
        .cmd-code {{ background: #fff0f0; border: 1px solid #ffcccc; color: #d63031; padding: 4px 8px; border-radius: 4px; font-family: monospace; font-size: 0.85em; display: inline-block; user-select: all; }}
        .header-success {{ border-left: 5px solid #27ae60; padding-left: 10px; color: #2c3e50; }}
        .header-error {{ border-left: 5px solid #c0392b; padding-left: 10px; color: #c0392b; }}
    </style>
    <script>
        setTimeout(function() {{ location.reload(); }}, {refresh_ms});
    </script>
</head>
<body>
    <h1>CRISPResso jobs</h1>
    <p>Data root: <code>{root}</code></p>
    <p class="generated">Generated at: {generated_at}</p>
    <p class="note">Status is inferred from files on disk and may lag or misjudge a job.</p>

    <div class="card">
        <h2 class="header-success">Running &amp; finished</h2>
        {active_table}
    </div>

    <div class="card">
        <h2 class="header-error">Failed / errors</h2>
        <p>Cleanup commands are shown for copying only; nothing is deleted from this page.</p>
        {failed_table}
    </div>
</body>
</html>
"#,
        refresh_ms = PORTAL_REFRESH_MS,
        root = escape_html(&root.to_string_lossy()),
        generated_at = generated_at.format(DISPLAY_TIMESTAMP_FORMAT),
        active_table = active_table,
        failed_table = failed_table,
    )
}

/// Scans `root` and atomically replaces `<root>/index.html`.
///
/// # Returns
/// Path of the written page.
pub fn generate_portal(root: &Path, generated_at: &NaiveDateTime) -> Result<PathBuf, PipelineError> {
    let entries = scan_jobs(root)?;
    let html = render_portal(root, &entries, generated_at);
    let target = root.join(PORTAL_HTML);
    write_atomically(&target, html.as_bytes())?;
    debug!("Status page lists {} jobs", entries.len());
    Ok(target)
}

/// Best-effort rebuild used by the runner and the submission surface; a failure
/// is logged and never interrupts the caller.
pub fn refresh(root: &Path) {
    match generate_portal(root, &Local::now().naive_local()) {
        Ok(path) => info!("Portal updated at: {}", path.display()),
        Err(e) => warn!("Failed to update portal: {}", e),
    }
}

pub async fn run(config: Arc<RunConfig>) -> Result<(), PipelineError> {
    let path = generate_portal(&config.output_root, &config.timestamp)?;
    info!("Portal updated at: {}", path.display());
    Ok(())
}
