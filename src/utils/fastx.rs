use seq_io::fastq::Reader as FastqReader;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use flate2::Compression;
use flate2::write::GzEncoder;
use crate::config::defs::{FASTQ_EXTS, GZIP_EXT};
use crate::utils::file::{FileReader, FileWriter};

/// Creates a FASTQ reader over a plain or gzipped file.
/// Compression is sniffed from the magic bytes, not the extension.
///
/// # Arguments
///
/// * `path` - Valid path to a FASTQ file.
///
/// # Returns
/// io::Result<FastqReader>
pub fn fastq_reader(path: &Path) -> io::Result<FastqReader<FileReader>> {
    Ok(FastqReader::new(FileReader::open(path)?))
}

/// Wraps an already opened file in a FASTQ writer, gzipped when `gzip` is set.
pub fn fastq_writer(file: File, gzip: bool) -> FileWriter {
    let buffered = BufWriter::new(file);
    if gzip {
        FileWriter::Gzipped(GzEncoder::new(buffered, Compression::default()))
    } else {
        FileWriter::Uncompressed(buffered)
    }
}

/// Writes one 4-line FASTQ record. `head` is the header without the leading '@'.
pub fn write_fastq_record<W: Write>(
    writer: &mut W,
    head: &[u8],
    seq: &[u8],
    qual: &[u8],
) -> io::Result<()> {
    writer.write_all(b"@")?;
    writer.write_all(head)?;
    writer.write_all(b"\n")?;

    writer.write_all(seq)?;
    writer.write_all(b"\n")?;

    writer.write_all(b"+\n")?;

    writer.write_all(qual)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// True when the file name looks like FASTQ, optionally gzipped.
pub fn has_fastq_extension(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_ascii_lowercase(),
        None => return false,
    };
    let name = name
        .strip_suffix(&format!(".{}", GZIP_EXT))
        .unwrap_or(&name);
    FASTQ_EXTS
        .iter()
        .any(|ext| name.ends_with(&format!(".{}", ext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use seq_io::fastq::Record;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_fastq_reader_plain_and_gzipped() -> anyhow::Result<()> {
        let dir = tempdir()?;

        for (name, gzip) in [("reads.fastq", false), ("reads.fastq.gz", true)] {
            let path = dir.path().join(name);
            let mut writer = fastq_writer(File::create(&path)?, gzip);
            write_fastq_record(&mut writer, b"read1 1:N:0", b"ACGT", b"IIII")?;
            writer.finish()?;

            let mut reader = fastq_reader(&path)?;
            let record = reader.next().expect("one record")?;
            assert_eq!(record.head(), b"read1 1:N:0");
            assert_eq!(record.seq(), b"ACGT");
            assert_eq!(record.qual(), b"IIII");
            assert!(reader.next().is_none());
        }
        Ok(())
    }

    #[test]
    fn test_has_fastq_extension() {
        assert!(has_fastq_extension(&PathBuf::from("/x/sample_R1.fastq.gz")));
        assert!(has_fastq_extension(&PathBuf::from("sample.FQ")));
        assert!(!has_fastq_extension(&PathBuf::from("sample.fasta")));
        assert!(!has_fastq_extension(&PathBuf::from("sample.gz")));
    }
}
