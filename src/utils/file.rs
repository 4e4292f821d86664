use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use chrono::NaiveDateTime;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use tempfile::NamedTempFile;
use crate::config::defs::{JOB_PREFIX, JOB_TIMESTAMP_FORMAT};

pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]), // Gzip magic bytes
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Enum to hold either an uncompressed or gzipped file reader
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(MultiGzDecoder<File>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

impl FileReader {
    pub fn open(path: &Path) -> io::Result<Self> {
        let is_gz = is_gzipped(path)?;
        let file = File::open(path)?;
        Ok(if is_gz {
            // Concatenated members (pigz, bgzip, `cat a.gz b.gz`) are read through to the end.
            FileReader::Gzipped(MultiGzDecoder::new(file))
        } else {
            FileReader::Uncompressed(BufReader::new(file))
        })
    }
}

/// Enum to hold either an uncompressed or gzipped file writer
pub enum FileWriter {
    Uncompressed(BufWriter<File>),
    Gzipped(GzEncoder<BufWriter<File>>),
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileWriter::Uncompressed(w) => w.write(buf),
            FileWriter::Gzipped(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileWriter::Uncompressed(w) => w.flush(),
            FileWriter::Gzipped(w) => w.flush(),
        }
    }
}

impl FileWriter {
    /// Flushes buffers and, for gzip output, writes the stream trailer.
    pub fn finish(self) -> io::Result<()> {
        match self {
            FileWriter::Uncompressed(mut w) => w.flush(),
            FileWriter::Gzipped(w) => {
                let mut inner = w.finish()?;
                inner.flush()
            }
        }
    }
}


/// Keeps only characters that are safe in a directory name:
/// ASCII alphanumerics, '-' and '_'.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Builds `Job_<YYYYmmdd_HHMMSS>_<sample>`. `sample` must already be sanitized.
pub fn job_dir_name(timestamp: &NaiveDateTime, sample: &str) -> String {
    format!("{}{}_{}", JOB_PREFIX, timestamp.format(JOB_TIMESTAMP_FORMAT), sample)
}

/// Resolves a job output path against the shared results root.
/// Absolute paths are returned verbatim; relative ones are joined onto `output_root`.
///
/// # Arguments
///
/// * `output_root` - The configured results root.
/// * `output` - Caller supplied path.
///
/// # Returns
/// PathBuf of the job directory.
pub fn resolve_output_dir(output_root: &Path, output: &Path) -> PathBuf {
    if output.is_absolute() {
        output.to_path_buf()
    } else {
        output_root.join(output)
    }
}

/// Makes a path absolute against `cwd` without touching the filesystem.
pub fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

/// Mode of published files; temp files start out owner-only.
#[cfg(unix)]
const PUBLISHED_MODE: u32 = 0o644;

/// Replaces `target` with `contents` through a temp file in the same
/// directory, so readers see either the old file or the new one.
/// The result is world-readable so a static file server can serve it.
pub fn write_atomically(target: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file().set_permissions(fs::Permissions::from_mode(PUBLISHED_MODE))?;
    }
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Recursively collects files under `dir` with the given extension
/// (case-insensitive). Result is sorted so repeated scans agree.
pub fn find_files_with_extension(dir: &Path, ext: &str) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e.eq_ignore_ascii_case(ext))
            {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 22)
            .unwrap()
            .and_hms_opt(9, 5, 7)
            .unwrap()
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Tomato mutant #1"), "Tomatomutant1");
        assert_eq!(sanitize_name("a-b_c"), "a-b_c");
        assert_eq!(sanitize_name("../../etc"), "etc");
        assert_eq!(sanitize_name("样本"), "");
    }

    #[test]
    fn test_job_dir_name() {
        assert_eq!(job_dir_name(&ts(), "s1"), "Job_20260122_090507_s1");
    }

    #[test]
    fn test_resolve_relative_output() {
        let resolved = resolve_output_dir(Path::new("/data/out"), Path::new("Job_20260122_090507_s1"));
        assert_eq!(resolved, PathBuf::from("/data/out/Job_20260122_090507_s1"));
    }

    #[test]
    fn test_resolve_absolute_output_ignores_root() {
        let resolved = resolve_output_dir(Path::new("/data/out"), Path::new("/scratch/run7"));
        assert_eq!(resolved, PathBuf::from("/scratch/run7"));
    }

    #[test]
    fn test_is_gzipped() -> io::Result<()> {
        let dir = tempdir()?;
        let plain = dir.path().join("plain.fq");
        fs::write(&plain, "@r\nA\n+\nI\n")?;
        assert!(!is_gzipped(&plain)?);

        let empty = dir.path().join("empty.fq");
        fs::write(&empty, "")?;
        assert!(!is_gzipped(&empty)?);

        let gz = dir.path().join("reads.fq.gz");
        let mut enc = GzEncoder::new(File::create(&gz)?, flate2::Compression::default());
        enc.write_all(b"@r\nA\n+\nI\n")?;
        enc.finish()?;
        assert!(is_gzipped(&gz)?);
        Ok(())
    }

    #[test]
    fn test_write_atomically_replaces() -> io::Result<()> {
        let dir = tempdir()?;
        let target = dir.path().join("index.html");
        write_atomically(&target, b"first")?;
        write_atomically(&target, b"second")?;
        assert_eq!(fs::read_to_string(&target)?, "second");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomically_is_world_readable() -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let target = dir.path().join("index.html");
        write_atomically(&target, b"<html></html>")?;
        let mode = fs::metadata(&target)?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
        Ok(())
    }

    #[test]
    fn test_gzip_reader_reads_every_member() -> io::Result<()> {
        let dir = tempdir()?;
        let gz = dir.path().join("multi.fq.gz");
        let mut file = File::create(&gz)?;
        for record in [&b"@a\nAC\n+\nII\n"[..], &b"@b\nGT\n+\nII\n"[..]] {
            let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(record)?;
            file.write_all(&enc.finish()?)?;
        }
        drop(file);

        let mut text = String::new();
        FileReader::open(&gz)?.read_to_string(&mut text)?;
        assert_eq!(text, "@a\nAC\n+\nII\n@b\nGT\n+\nII\n");
        Ok(())
    }

    #[test]
    fn test_find_files_with_extension_sorted() -> io::Result<()> {
        let dir = tempdir()?;
        fs::create_dir_all(dir.path().join("b/c"))?;
        fs::write(dir.path().join("z.html"), "")?;
        fs::write(dir.path().join("b/c/a.HTML"), "")?;
        fs::write(dir.path().join("b/notes.txt"), "")?;

        let found = find_files_with_extension(dir.path(), "html")?;
        assert_eq!(found, vec![dir.path().join("b/c/a.HTML"), dir.path().join("z.html")]);
        Ok(())
    }
}
