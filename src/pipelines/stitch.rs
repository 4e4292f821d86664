//! Merges non-overlapping read pairs into single reads so CRISPResso can run
//! in single-end mode: R1 + N padding + reverse complement of R2.

use std::path::{Path, PathBuf};
use chrono::NaiveDateTime;
use log::{debug, info};
use seq_io::fastq::{self, Reader as FastqReader, RefRecord, Record};
use tempfile::NamedTempFile;
use crate::config::defs::{PipelineError, GZIP_EXT, PAD_BASE, STITCH_DIR, STITCH_PROGRESS_INTERVAL, STITCH_TIMESTAMP_FORMAT};
use crate::utils::fastx::{fastq_reader, fastq_writer, write_fastq_record};
use crate::utils::file::FileReader;
use crate::utils::sequence::{padding_run, reverse_complement};

#[derive(Debug, Clone, PartialEq)]
pub struct StitchSummary {
    pub records: u64,
    pub output: PathBuf,
}

/// Reference matching stitched reads: the amplicon followed by the same N run.
/// Comma-separated amplicon lists are padded one by one.
pub fn stitched_amplicon(amplicon: &str, n_padding: usize) -> String {
    let pad = String::from_utf8(padding_run(PAD_BASE, n_padding)).unwrap_or_default();
    amplicon
        .split(',')
        .map(|seq| format!("{}{}", seq, pad))
        .collect::<Vec<_>>()
        .join(",")
}

/// `<job_dir>/stitched_reads/<sample>_stitched_pad<N>_<HHMMSS>.fastq.gz`
pub fn stitched_reads_path(job_dir: &Path, sample: &str, n_padding: usize, timestamp: &NaiveDateTime) -> PathBuf {
    job_dir.join(STITCH_DIR).join(format!(
        "{}_stitched_pad{}_{}.fastq.{}",
        sample,
        n_padding,
        timestamp.format(STITCH_TIMESTAMP_FORMAT),
        GZIP_EXT
    ))
}

fn next_record<'a>(
    reader: &'a mut FastqReader<FileReader>,
    path: &Path,
    record: u64,
) -> Result<Option<RefRecord<'a>>, PipelineError> {
    match reader.next() {
        None => Ok(None),
        Some(Ok(rec)) => Ok(Some(rec)),
        Some(Err(fastq::Error::Io(e))) => Err(PipelineError::IOError(format!("{}: {}", path.display(), e))),
        Some(Err(e)) => Err(PipelineError::MalformedRecord {
            path: path.display().to_string(),
            record,
            reason: e.to_string(),
        }),
    }
}

/// Counts what is left in a reader, validating framing on the way.
fn count_remaining(reader: &mut FastqReader<FileReader>, path: &Path, consumed: u64) -> Result<u64, PipelineError> {
    let mut total = consumed;
    while next_record(reader, path, total + 1)?.is_some() {
        total += 1;
    }
    Ok(total)
}

/// Stitches each R1/R2 pair at the same position into one record.
/// Sequence: R1 + N * `n_padding` + revcomp(R2).
/// Quality: Q1 + `pad_quality` * `n_padding` + reversed Q2.
///
/// The output is written to a temp file next to `output` and only moved into place
/// once every pair has been written, so failures leave no output behind.
/// A `.gz` output path is gzip-compressed.
///
/// # Arguments
///
/// * `r1_path` - Forward reads (plain or gzipped FASTQ).
/// * `r2_path` - Reverse reads in the same record order.
/// * `output` - Destination of the stitched FASTQ.
/// * `n_padding` - Number of N bases between the mates. 0 concatenates directly.
/// * `pad_quality` - Quality character for the padding bases.
///
/// # Returns
/// StitchSummary with the number of stitched records.
pub fn stitch_paired_reads(
    r1_path: &Path,
    r2_path: &Path,
    output: &Path,
    n_padding: usize,
    pad_quality: u8,
) -> Result<StitchSummary, PipelineError> {
    info!("Stitching reads with {} N padding", n_padding);
    info!("  Source R1: {}", r1_path.display());
    info!("  Source R2: {}", r2_path.display());
    info!("  Target:    {}", output.display());

    let out_dir = output
        .parent()
        .ok_or_else(|| PipelineError::InvalidConfig(format!("No parent directory for {}", output.display())))?;
    std::fs::create_dir_all(out_dir)?;

    let gzip = output
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case(GZIP_EXT));

    let mut reader1 = fastq_reader(r1_path)?;
    let mut reader2 = fastq_reader(r2_path)?;

    let tmp = NamedTempFile::new_in(out_dir)?;
    let mut writer = fastq_writer(tmp.reopen()?, gzip);

    let pad_seq = padding_run(PAD_BASE, n_padding);
    let pad_qual = padding_run(pad_quality, n_padding);
    let mut seq = Vec::new();
    let mut qual = Vec::new();
    let mut count: u64 = 0;
    // Set when one file runs out first; true if R1 is the longer one.
    let mut r1_longer: Option<bool> = None;

    loop {
        let rec1 = next_record(&mut reader1, r1_path, count + 1)?;
        let rec2 = next_record(&mut reader2, r2_path, count + 1)?;

        let (rec1, rec2) = match (rec1, rec2) {
            (Some(rec1), Some(rec2)) => (rec1, rec2),
            (None, None) => break,
            (extra, _) => {
                r1_longer = Some(extra.is_some());
                break;
            }
        };

        seq.clear();
        seq.extend_from_slice(rec1.seq());
        seq.extend_from_slice(&pad_seq);
        seq.extend_from_slice(&reverse_complement(rec2.seq()));

        qual.clear();
        qual.extend_from_slice(rec1.qual());
        qual.extend_from_slice(&pad_qual);
        qual.extend(rec2.qual().iter().rev());

        write_fastq_record(&mut writer, rec1.head(), &seq, &qual)?;

        count += 1;
        if count % STITCH_PROGRESS_INTERVAL == 0 {
            info!("  Processed {} reads...", count);
        }
    }

    if let Some(r1_longer) = r1_longer {
        let (r1_records, r2_records) = if r1_longer {
            (count_remaining(&mut reader1, r1_path, count + 1)?, count)
        } else {
            (count, count_remaining(&mut reader2, r2_path, count + 1)?)
        };
        return Err(PipelineError::MismatchedPair {
            r1_path: r1_path.display().to_string(),
            r2_path: r2_path.display().to_string(),
            r1_records,
            r2_records,
        });
    }

    writer.finish()?;
    tmp.persist(output).map_err(|e| PipelineError::IOError(e.error.to_string()))?;
    debug!("Persisted stitched reads to {}", output.display());
    info!("Stitched {} reads total.", count);

    Ok(StitchSummary {
        records: count,
        output: output.to_path_buf(),
    })
}
