use flate2::read::MultiGzDecoder;
use hashbrown::HashSet;
use log::info;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use config::{
    PipelineVersion, CLASSIFY_REPORT, GATHERED_CSV, GATHER_CSV_TASK, MAPPED_FASTQ, MAPPED_GFF,
    OUT_MAPPED_FASTQ, OUT_MAPPED_GFF, OUT_READ_STAT, READ_STAT, TASKS,
};

use crate::core::DemuxError;

/// Read a whole input file into memory, decoding gzip when the path ends
/// in .gz. The handle is released before the next file is opened.
pub fn reader<P: AsRef<Path>>(path: P) -> Result<String, DemuxError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DemuxError::MissingFile(path.to_owned()));
    }

    let file = File::open(path)?;
    let mut contents = String::new();

    if path.extension().is_some_and(|ext| ext == "gz") {
        BufReader::new(MultiGzDecoder::new(file)).read_to_string(&mut contents)?;
    } else {
        BufReader::new(file).read_to_string(&mut contents)?;
    }

    Ok(contents)
}

/// Isoform ids in mapped-FASTQ record order, first appearance kept.
///
/// A record id reads `PB.X.Y|<rest>`; the pbid is the segment before the
/// first '|', and the id ends at the first whitespace of the header line.
pub fn isoform_order(contents: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();

    let mut lines = contents.lines();
    while let Some(header) = lines.next() {
        let id = header
            .strip_prefix('@')
            .unwrap_or(header)
            .split_whitespace()
            .next()
            .unwrap_or_default();
        let pbid = id.split('|').next().unwrap_or_default();

        if !pbid.is_empty() && seen.insert(pbid.to_owned()) {
            order.push(pbid.to_owned());
        }

        // sequence, separator, quality
        lines.next();
        lines.next();
        lines.next();
    }

    order
}

/// Parse the primer name override: one `<primer> <name>` pair per line,
/// file order fixing the output column order.
pub fn parse_primer_names(contents: &str) -> Result<Vec<(String, String)>, DemuxError> {
    let mut names = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next(), fields.next()) {
            (Some(primer), Some(name), None) => names.push((primer.to_owned(), name.to_owned())),
            _ => return Err(DemuxError::InvalidPrimerName(line.to_owned())),
        }
    }

    Ok(names)
}

/// inputs resolved out of a job directory
#[derive(Debug)]
pub struct JobInputs {
    pub mapped_fastq: PathBuf,
    pub read_stat: PathBuf,
    pub classify_csv: PathBuf,
    pub version: PipelineVersion,
}

/// Resolve an IsoSeq job directory into the three inputs.
///
/// The mapping task path differs between IsoSeq1 and IsoSeq2; presence of
/// the IsoSeq1 mapped FASTQ decides the version. The resolved files are
/// symlinked next to the output under stable names and the links become
/// the run's inputs. Stale links from a previous run are replaced.
pub fn link_job_files(job_dir: &Path, out_dir: &Path) -> Result<JobInputs, DemuxError> {
    let job_dir = job_dir
        .canonicalize()
        .map_err(|_| DemuxError::MissingFile(job_dir.to_owned()))?;
    let tasks = job_dir.join(TASKS);

    let isoseq1 = tasks.join(PipelineVersion::IsoSeq1.mapping_task());
    let isoseq2 = tasks.join(PipelineVersion::IsoSeq2.mapping_task());

    let (task_dir, version) = if isoseq1.join(OUT_MAPPED_FASTQ).exists() {
        (isoseq1, PipelineVersion::IsoSeq1)
    } else if isoseq2.join(OUT_MAPPED_FASTQ).exists() {
        (isoseq2, PipelineVersion::IsoSeq2)
    } else {
        return Err(DemuxError::MissingFile(isoseq2.join(OUT_MAPPED_FASTQ)));
    };
    info!("Detected {} task directories...", version);

    let mapped_fastq = relink(&task_dir.join(OUT_MAPPED_FASTQ), &out_dir.join(MAPPED_FASTQ))?;
    relink(&task_dir.join(OUT_MAPPED_GFF), &out_dir.join(MAPPED_GFF))?;
    let read_stat = relink(&task_dir.join(OUT_READ_STAT), &out_dir.join(READ_STAT))?;
    let classify_csv = relink(
        &tasks.join(GATHER_CSV_TASK).join(GATHERED_CSV),
        &out_dir.join(CLASSIFY_REPORT),
    )?;

    Ok(JobInputs {
        mapped_fastq,
        read_stat,
        classify_csv,
        version,
    })
}

fn relink(src: &Path, dst: &Path) -> Result<PathBuf, DemuxError> {
    if !src.exists() {
        return Err(DemuxError::MissingFile(src.to_owned()));
    }

    if dst.symlink_metadata().is_ok() {
        std::fs::remove_file(dst)?;
    }
    std::os::unix::fs::symlink(src, dst)?;

    Ok(dst.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_missing_file() {
        let err = reader("does/not/exist.csv").unwrap_err();

        assert!(matches!(err, DemuxError::MissingFile(_)));
    }

    #[test]
    fn test_reader_gzip() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapped.fastq.gz");

        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"@PB.1.1|r1\nACGT\n+\nIIII\n").unwrap();
        encoder.finish().unwrap();

        let contents = reader(&path).unwrap();
        assert_eq!(contents, "@PB.1.1|r1\nACGT\n+\nIIII\n");
    }

    #[test]
    fn test_isoform_order_dedups_in_file_order() {
        let fastq = "\
@PB.2.1|chr1:100-200(+)|r1 descr
ACGT
+
IIII
@PB.1.1|chr2:5-50(-)|r2
ACGT
+
IIII
@PB.2.1|chr1:100-200(+)|r3
ACGT
+
IIII
";
        let order = isoform_order(fastq);

        assert_eq!(order, vec!["PB.2.1", "PB.1.1"]);
    }

    #[test]
    fn test_parse_primer_names() {
        let names = parse_primer_names("2 SampleA\n3\tSampleB\n\n").unwrap();

        assert_eq!(
            names,
            vec![
                ("2".to_string(), "SampleA".to_string()),
                ("3".to_string(), "SampleB".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_primer_names_malformed() {
        let err = parse_primer_names("2 SampleA Extra\n").unwrap_err();

        assert!(matches!(err, DemuxError::InvalidPrimerName(_)));
    }

    fn fake_job_dir(task: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mapping = dir.path().join(TASKS).join(task);
        let gather = dir.path().join(TASKS).join(GATHER_CSV_TASK);

        std::fs::create_dir_all(&mapping).unwrap();
        std::fs::create_dir_all(&gather).unwrap();

        std::fs::write(mapping.join(OUT_MAPPED_FASTQ), "@PB.1.1|r1\nA\n+\nI\n").unwrap();
        std::fs::write(mapping.join(OUT_MAPPED_GFF), "").unwrap();
        std::fs::write(mapping.join(OUT_READ_STAT), "id\tis_fl\tpbid\n").unwrap();
        std::fs::write(gather.join(GATHERED_CSV), "id,primer\n").unwrap();

        dir
    }

    #[test]
    fn test_link_job_files_isoseq1() {
        let job = fake_job_dir(config::ISOSEQ1_MAPPING_TASK);
        let out = tempfile::tempdir().unwrap();

        let inputs = link_job_files(job.path(), out.path()).unwrap();

        assert_eq!(inputs.version, PipelineVersion::IsoSeq1);
        assert_eq!(inputs.mapped_fastq, out.path().join(MAPPED_FASTQ));
        assert!(reader(&inputs.mapped_fastq).is_ok());
        assert!(out.path().join(MAPPED_GFF).symlink_metadata().is_ok());
    }

    #[test]
    fn test_link_job_files_isoseq2_and_rerun() {
        let job = fake_job_dir(config::ISOSEQ2_MAPPING_TASK);
        let out = tempfile::tempdir().unwrap();

        let first = link_job_files(job.path(), out.path()).unwrap();
        assert_eq!(first.version, PipelineVersion::IsoSeq2);

        // stale links from the first run must be replaced, not fatal
        let second = link_job_files(job.path(), out.path()).unwrap();
        assert_eq!(second.classify_csv, out.path().join(CLASSIFY_REPORT));
    }

    #[test]
    fn test_link_job_files_unknown_layout() {
        let job = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(job.path().join(TASKS)).unwrap();
        let out = tempfile::tempdir().unwrap();

        let err = link_job_files(job.path(), out.path()).unwrap_err();
        assert!(matches!(err, DemuxError::MissingFile(_)));
    }
}
