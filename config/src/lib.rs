use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// table sentinels
pub const NOT_FL: &str = "NA";
pub const FULL_LENGTH: &str = "Y";

// table fields
pub const FIELD_ID: &str = "id";
pub const FIELD_PRIMER: &str = "primer";
pub const FIELD_PRIMER_INDEX: &str = "primer_index";
pub const FIELD_IS_FL: &str = "is_fl";
pub const FIELD_PBID: &str = "pbid";

// link names set up next to the output when resolving a job directory
pub const MAPPED_FASTQ: &str = "mapped.fastq";
pub const MAPPED_GFF: &str = "mapped.gff";
pub const READ_STAT: &str = "mapped.read_stat.txt";
pub const CLASSIFY_REPORT: &str = "classify_report.csv";

// job directory layout
pub const TASKS: &str = "tasks";
pub const ISOSEQ1_MAPPING_TASK: &str = "pbtranscript.tasks.post_mapping_to_genome-0";
pub const ISOSEQ2_MAPPING_TASK: &str = "pbtranscript2tools.tasks.post_mapping_to_genome-0";
pub const GATHER_CSV_TASK: &str = "pbcoretools.tasks.gather_csv-1";
pub const OUT_MAPPED_FASTQ: &str = "output_mapped.fastq";
pub const OUT_MAPPED_GFF: &str = "output_mapped.gff";
pub const OUT_READ_STAT: &str = "output_mapped.no5merge.collapsed.read_stat.txt";
pub const GATHERED_CSV: &str = "file.csv";

// os
#[cfg(not(windows))]
const TICK_SETTINGS: (&str, u64) = ("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ", 80);
#[cfg(windows)]
const TICK_SETTINGS: (&str, u64) = (r"+-x| ", 200);

/// return a pre-configured progress bar
pub fn get_progress_bar(length: u64, msg: &str) -> ProgressBar {
    let progressbar_style = ProgressStyle::default_spinner()
        .tick_chars(TICK_SETTINGS.0)
        .template(" {spinner} {msg:<30} {wide_bar} ETA {eta_precise} ")
        .expect("no template error");

    let progress_bar = ProgressBar::new(length);

    progress_bar.set_style(progressbar_style);
    progress_bar.enable_steady_tick(Duration::from_millis(TICK_SETTINGS.1));
    progress_bar.set_message(msg.to_owned());

    progress_bar
}

/// IsoSeq pipeline flavor behind a job directory, detected by probing
/// the fixed task paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineVersion {
    IsoSeq1,
    IsoSeq2,
}

impl PipelineVersion {
    pub fn mapping_task(&self) -> &'static str {
        match self {
            PipelineVersion::IsoSeq1 => ISOSEQ1_MAPPING_TASK,
            PipelineVersion::IsoSeq2 => ISOSEQ2_MAPPING_TASK,
        }
    }
}

impl std::fmt::Display for PipelineVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineVersion::IsoSeq1 => write!(f, "IsoSeq1"),
            PipelineVersion::IsoSeq2 => write!(f, "IsoSeq2"),
        }
    }
}

/// argument checker for the demux surface: a run needs either a job
/// directory or the full mapped-fastq/read-stat/classify-report trio
pub trait ArgCheck {
    fn check(&self) -> Result<(), CliError> {
        self.validate_args()
    }

    fn validate_args(&self) -> Result<(), CliError> {
        if let Some(dir) = self.get_job_dir() {
            validate_dir(dir)?;
            if !self.get_inputs().is_empty() {
                log::warn!("--job-dir given, direct input paths are ignored");
            }
        } else {
            self.check_inputs()?;
        }

        if let Some(names) = self.get_primer_names() {
            validate(names)?;
        }

        Ok(())
    }

    fn check_inputs(&self) -> Result<(), CliError> {
        let inputs = self.get_inputs();
        if inputs.len() != 3 {
            let err =
                "expected a job directory or all of: mapped fastq, read stat, classify report"
                    .to_string();
            return Err(CliError::InvalidInput(err));
        }
        for input in inputs {
            validate(input)?;
        }

        Ok(())
    }

    fn get_job_dir(&self) -> Option<&PathBuf>;
    fn get_inputs(&self) -> Vec<&PathBuf>;
    fn get_primer_names(&self) -> Option<&PathBuf>;
}

/// error handling for CLI
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// argument validation
pub fn validate(arg: &PathBuf) -> Result<(), CliError> {
    if !arg.exists() {
        return Err(CliError::InvalidInput(format!("{:?} does not exist", arg)));
    }

    if !arg.is_file() {
        return Err(CliError::InvalidInput(format!("{:?} is not a file", arg)));
    }

    match std::fs::metadata(arg) {
        Ok(metadata) if metadata.len() == 0 => {
            Err(CliError::InvalidInput(format!("file {:?} is empty", arg)))
        }
        Ok(_) => Ok(()),
        Err(e) => Err(CliError::IoError(e)),
    }
}

pub fn validate_dir(arg: &PathBuf) -> Result<(), CliError> {
    if !arg.exists() {
        return Err(CliError::InvalidInput(format!("{:?} does not exist", arg)));
    }

    if !arg.is_dir() {
        return Err(CliError::InvalidInput(format!(
            "{:?} is not a directory",
            arg
        )));
    }

    Ok(())
}
