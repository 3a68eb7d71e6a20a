//! Core module for demultiplexing an IsoSeq cluster job (with genome
//! mapping) into a per-isoform, per-primer full-length read count matrix.
//!
//! In short, the classify report maps each raw read to the primer it was
//! tagged with, the collapsed read stat maps each full-length read to the
//! isoform it supports, and the mapped FASTQ fixes which isoforms are
//! reported and in what order. Joining the three on read id and folding
//! the result into a two-level counter yields, for every isoform, the
//! number of full-length reads it received from each primer. The matrix
//! is written as a wide CSV, one row per isoform, one column per primer,
//! with optional user-supplied sample names for the primer columns.

use anyhow::Result;

pub mod cli;
pub mod core;
pub mod utils;

pub fn lib_iso_demux(args: Vec<String>) -> Result<()> {
    let args = cli::Args::from(args);
    crate::core::demux(args)
}
