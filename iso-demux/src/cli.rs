use clap::Parser;
use config::ArgCheck;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(
        short = 'j',
        long = "job-dir",
        required = false,
        value_name = "DIR",
        help = "IsoSeq job directory [locates mapped fastq, read stat and classify report]"
    )]
    pub job_dir: Option<PathBuf>,

    #[arg(
        long = "mapped-fastq",
        required = false,
        value_name = "PATH",
        help = "Mapped FASTQ [overridden by --job-dir]"
    )]
    pub mapped_fastq: Option<PathBuf>,

    #[arg(
        long = "read-stat",
        required = false,
        value_name = "PATH",
        help = "Collapsed read stat txt [overridden by --job-dir]"
    )]
    pub read_stat: Option<PathBuf>,

    #[arg(
        long = "classify-csv",
        required = false,
        value_name = "PATH",
        help = "Classify report CSV [overridden by --job-dir]"
    )]
    pub classify_csv: Option<PathBuf>,

    #[arg(
        short = 'p',
        long = "primer-names",
        required = false,
        value_name = "PATH",
        help = "Two-column text file mapping primers to sample names"
    )]
    pub primer_names: Option<PathBuf>,

    #[arg(
        short = 'o',
        long = "output",
        required = true,
        value_name = "PATH",
        help = "Output count matrix path"
    )]
    pub output: PathBuf,
}

impl Args {
    pub fn from(args: Vec<String>) -> Self {
        let mut full_args = vec![env!("CARGO_PKG_NAME").to_string()];
        full_args.extend(args);

        Args::parse_from(full_args)
    }

    /// the direct input trio, present only when all three paths were given
    pub fn inputs(&self) -> Option<(&PathBuf, &PathBuf, &PathBuf)> {
        match (&self.mapped_fastq, &self.read_stat, &self.classify_csv) {
            (Some(fastq), Some(stat), Some(classify)) => Some((fastq, stat, classify)),
            _ => None,
        }
    }
}

impl ArgCheck for Args {
    fn get_job_dir(&self) -> Option<&PathBuf> {
        self.job_dir.as_ref()
    }

    fn get_inputs(&self) -> Vec<&PathBuf> {
        [&self.mapped_fastq, &self.read_stat, &self.classify_csv]
            .into_iter()
            .filter_map(|path| path.as_ref())
            .collect()
    }

    fn get_primer_names(&self) -> Option<&PathBuf> {
        self.primer_names.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::CliError;

    #[test]
    fn test_args_from_vec() {
        let args = Args::from(vec![
            "--mapped-fastq".to_string(),
            "mapped.fastq".to_string(),
            "--read-stat".to_string(),
            "mapped.read_stat.txt".to_string(),
            "--classify-csv".to_string(),
            "classify_report.csv".to_string(),
            "-o".to_string(),
            "counts.csv".to_string(),
        ]);

        assert!(args.job_dir.is_none());
        assert!(args.inputs().is_some());
        assert_eq!(args.output, PathBuf::from("counts.csv"));
    }

    #[test]
    fn test_check_rejects_partial_trio() {
        let args = Args::from(vec![
            "--mapped-fastq".to_string(),
            "mapped.fastq".to_string(),
            "-o".to_string(),
            "counts.csv".to_string(),
        ]);

        assert!(args.inputs().is_none());
        assert!(matches!(args.check(), Err(CliError::InvalidInput(_))));
    }
}
