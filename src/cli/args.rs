use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "kmer-top",
    version,
    about = "Most frequent k-mers of a FASTQ file via minimizer partitioning"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    Run(RunArgs),
}

#[derive(Parser)]
pub struct RunArgs {
    /// Plain or gzip-compressed FASTQ.
    pub reads: PathBuf,

    #[arg(long)]
    pub k: usize,

    #[arg(long = "top")]
    pub top_n: usize,

    #[arg(long, default_value_t = num_cpus::get())]
    pub threads: usize,

    #[arg(long, value_enum, default_value_t = StorageArg::Auto)]
    pub storage: StorageArg,

    /// Parent of the `temp` directory used by disk partitions.
    #[arg(long, default_value = ".")]
    pub scratch_dir: PathBuf,

    /// Write results here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum StorageArg {
    #[value(name = "auto")]
    Auto,
    #[value(name = "ram")]
    Ram,
    #[value(name = "disk")]
    Disk,
}
