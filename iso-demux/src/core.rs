use anyhow::Result;
use hashbrown::{HashMap, HashSet};
use log::info;
use thiserror::Error;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use config::{
    get_progress_bar, FIELD_ID, FIELD_IS_FL, FIELD_PBID, FIELD_PRIMER, FIELD_PRIMER_INDEX,
    FULL_LENGTH, NOT_FL,
};

use crate::cli::Args;
use crate::utils::{self, reader};

pub const CLASSIFY_TABLE: &str = "classify report";
pub const READ_STAT_TABLE: &str = "read stat";

#[derive(Debug, Error)]
pub enum DemuxError {
    #[error("missing input file: {0}")]
    MissingFile(PathBuf),

    #[error("{table} lacks required field '{field}'")]
    MissingField {
        table: &'static str,
        field: &'static str,
    },

    #[error(
        "read '{0}' is full-length in the read stat but absent from the classify report \
         [inputs look like they come from different pipeline stages]"
    )]
    MissingRead(String),

    #[error("malformed primer name line: '{0}' [expected '<primer> <name>']")]
    InvalidPrimerName(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// primer assignments from the classify report: the set of primers seen
/// across all full-length reads plus a read id -> primer lookup
#[derive(Debug, Default)]
pub struct ClassifyIndex {
    pub primers: HashSet<String>,
    pub lookup: HashMap<String, String>,
}

impl ClassifyIndex {
    /// Build the index from the raw classify report.
    ///
    /// Rows whose primer is "NA" are non-full-length reads and are skipped
    /// entirely. Newer pipelines carry a `primer_index` column with the
    /// compound pool--index token; when the header has one it takes
    /// precedence over `primer`. Duplicate read ids keep the last row.
    pub fn from_report(contents: &str) -> Result<Self, DemuxError> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(contents.as_bytes());

        let headers = rdr.headers()?.clone();
        let position = |field: &str| headers.iter().position(|h| h == field);

        let id_col = position(FIELD_ID).ok_or(DemuxError::MissingField {
            table: CLASSIFY_TABLE,
            field: FIELD_ID,
        })?;
        let primer_col = position(FIELD_PRIMER).ok_or(DemuxError::MissingField {
            table: CLASSIFY_TABLE,
            field: FIELD_PRIMER,
        })?;
        let index_col = position(FIELD_PRIMER_INDEX);

        let mut index = ClassifyIndex::default();
        for record in rdr.records() {
            let record = record?;

            let (Some(id), Some(primer)) = (record.get(id_col), record.get(primer_col)) else {
                continue;
            };
            if primer == NOT_FL {
                continue;
            }

            let token = index_col.and_then(|col| record.get(col)).unwrap_or(primer);

            index.primers.insert(token.to_owned());
            index.lookup.insert(id.to_owned(), token.to_owned());
        }

        Ok(index)
    }

    /// distinct primers in lexicographic order, the default column order
    pub fn sorted_primers(&self) -> Vec<String> {
        let mut primers: Vec<String> = self.primers.iter().cloned().collect();
        primers.sort();

        primers
    }
}

/// isoform -> primer -> FL read count; pairs never touched read as zero
#[derive(Debug, Default)]
pub struct FlCountMatrix {
    counts: HashMap<String, HashMap<String, u64>>,
}

impl FlCountMatrix {
    pub fn bump(&mut self, isoform: &str, primer: &str) {
        *self
            .counts
            .entry(isoform.to_owned())
            .or_default()
            .entry(primer.to_owned())
            .or_insert(0) += 1;
    }

    pub fn get(&self, isoform: &str, primer: &str) -> u64 {
        self.counts
            .get(isoform)
            .and_then(|row| row.get(primer))
            .copied()
            .unwrap_or(0)
    }

    pub fn num_isoforms(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().flat_map(|row| row.values()).sum()
    }
}

/// Fold the read stat into per-isoform, per-primer FL counts.
///
/// Only rows flagged `is_fl == "Y"` contribute. A full-length read with no
/// classify entry aborts the run with [`DemuxError::MissingRead`]; it is
/// never skipped.
pub fn aggregate_fl_counts(
    contents: &str,
    index: &ClassifyIndex,
) -> Result<FlCountMatrix, DemuxError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_reader(contents.as_bytes());

    let headers = rdr.headers()?.clone();
    let position = |field: &str| headers.iter().position(|h| h == field);

    let id_col = position(FIELD_ID).ok_or(DemuxError::MissingField {
        table: READ_STAT_TABLE,
        field: FIELD_ID,
    })?;
    let is_fl_col = position(FIELD_IS_FL).ok_or(DemuxError::MissingField {
        table: READ_STAT_TABLE,
        field: FIELD_IS_FL,
    })?;
    let pbid_col = position(FIELD_PBID).ok_or(DemuxError::MissingField {
        table: READ_STAT_TABLE,
        field: FIELD_PBID,
    })?;

    let pb = get_progress_bar(
        contents.lines().count().saturating_sub(1) as u64,
        "Aggregating FL counts...",
    );

    let mut counts = FlCountMatrix::default();
    for record in rdr.records() {
        let record = record?;
        pb.inc(1);

        let (Some(id), Some(is_fl), Some(pbid)) = (
            record.get(id_col),
            record.get(is_fl_col),
            record.get(pbid_col),
        ) else {
            continue;
        };
        if is_fl != FULL_LENGTH {
            continue;
        }

        let primer = index
            .lookup
            .get(id)
            .ok_or_else(|| DemuxError::MissingRead(id.to_owned()))?;

        counts.bump(pbid, primer);
    }

    pb.finish_and_clear();

    Ok(counts)
}

/// Output columns as (primer, display label) pairs.
///
/// With no override the observed primers label themselves, sorted. An
/// override fixes both the labels and the column order; observed primers
/// it omits are appended as trailing self-labeled columns.
pub fn primer_columns(
    overrides: Option<Vec<(String, String)>>,
    observed: Vec<String>,
) -> Vec<(String, String)> {
    match overrides {
        None => observed.into_iter().map(|p| (p.clone(), p)).collect(),
        Some(mut columns) => {
            let named: HashSet<String> = columns.iter().map(|(primer, _)| primer.clone()).collect();

            for primer in observed {
                if !named.contains(&primer) {
                    columns.push((primer.clone(), primer));
                }
            }

            columns
        }
    }
}

/// Emit the matrix: header of display labels, then one row per isoform in
/// mapped-FASTQ order with a count per column.
pub fn write_matrix<W: Write>(
    mut writer: W,
    isoforms: &[String],
    counts: &FlCountMatrix,
    columns: &[(String, String)],
) -> Result<(), DemuxError> {
    let labels: Vec<&str> = columns.iter().map(|(_, label)| label.as_str()).collect();
    writeln!(writer, "id,{}", labels.join(","))?;

    for isoform in isoforms {
        write!(writer, "{}", isoform)?;
        for (primer, _) in columns {
            write!(writer, ",{}", counts.get(isoform, primer))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

pub fn demux(args: Args) -> Result<()> {
    let (mapped_fastq, read_stat, classify_csv) = match (&args.job_dir, args.inputs()) {
        (Some(job_dir), _) => {
            let out_dir = args
                .output
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let linked = utils::link_job_files(job_dir, out_dir)?;

            (linked.mapped_fastq, linked.read_stat, linked.classify_csv)
        }
        (None, Some((fastq, stat, classify))) => {
            (fastq.clone(), stat.clone(), classify.clone())
        }
        (None, None) => anyhow::bail!(
            "either --job-dir or all of --mapped-fastq/--read-stat/--classify-csv must be given"
        ),
    };

    info!("Reading {}...", classify_csv.display());
    let index = ClassifyIndex::from_report(&reader(&classify_csv)?)?;
    info!(
        "Classified {} reads across {} primers",
        index.lookup.len(),
        index.primers.len()
    );

    info!("Reading {}...", read_stat.display());
    let counts = aggregate_fl_counts(&reader(&read_stat)?, &index)?;
    info!(
        "Aggregated {} FL reads over {} isoforms",
        counts.total(),
        counts.num_isoforms()
    );

    info!("Reading {}...", mapped_fastq.display());
    let isoforms = utils::isoform_order(&reader(&mapped_fastq)?);

    let overrides = match &args.primer_names {
        Some(path) => Some(utils::parse_primer_names(&reader(path)?)?),
        None => None,
    };
    let columns = primer_columns(overrides, index.sorted_primers());

    let mut writer = BufWriter::new(File::create(&args.output)?);
    write_matrix(&mut writer, &isoforms, &counts, &columns)?;
    writer.flush()?;

    info!("Count file written to {}", args.output.display());

    Ok(())
}
