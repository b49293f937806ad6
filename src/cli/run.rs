use crate::cli::args::{Cli, Commands, RunArgs, StorageArg};
use anyhow::{Context, Result, bail};
use clap::Parser;
use kmer_top::core::engine::{Engine, RunOptions};
use kmer_top::core::params::{MAX_K, MIN_K, StorageMode};
use kmer_top::core::stats::{fmt_dur, log_stage, stats_enabled};
use kmer_top::core::topk::TopKEntry;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::time::Instant;

pub fn entry() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args),
    }
}

fn run(args: RunArgs) -> Result<()> {
    let stats = stats_enabled();
    let t0 = Instant::now();

    stage(stats, "preflight", || {
        if args.reads.as_os_str() == "-" {
            bail!("stdin is not supported; provide a FASTQ file path");
        }
        if !args.reads.is_file() {
            bail!("input file not found: {}", args.reads.display());
        }
        if !(MIN_K..=MAX_K).contains(&args.k) {
            bail!("--k must be in {MIN_K}..={MAX_K}, got {}", args.k);
        }
        if args.top_n == 0 {
            bail!("--top must be >= 1");
        }
        if args.threads == 0 {
            bail!("--threads must be >= 1");
        }
        Ok(())
    })?;

    let options = RunOptions {
        threads: Some(args.threads),
        storage: match args.storage {
            StorageArg::Auto => None,
            StorageArg::Ram => Some(StorageMode::Ram),
            StorageArg::Disk => Some(StorageMode::Disk),
        },
        scratch_root: args.scratch_dir.clone(),
    };

    let t_engine = Instant::now();
    let mut engine = Engine::with_options(&args.reads, args.k, args.top_n, options)?;
    engine.run()?;
    log_stage(stats, "engine", t_engine);

    let results = engine.results();
    let t_out = Instant::now();
    match &args.out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            write_results(BufWriter::new(file), &results)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => {
            let stdout = io::stdout();
            write_results(stdout.lock(), &results).with_context(|| "failed to write results")?;
        }
    }
    log_stage(stats, "output", t_out);

    if stats {
        eprintln!("KMER_TOP_STATS results={}", results.len());
        eprintln!("KMER_TOP_STATS total={}", fmt_dur(t0.elapsed()));
    }

    Ok(())
}

fn write_results<W: Write>(mut w: W, results: &[TopKEntry]) -> io::Result<()> {
    for entry in results {
        writeln!(w, "{} {}", entry.kmer, entry.count)?;
    }
    w.flush()
}

fn stage<F>(stats: bool, name: &str, f: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    let t = Instant::now();
    let res = f();
    log_stage(stats, name, t);
    res
}
