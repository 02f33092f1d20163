//! sdc-harness command line
//!
//! `run` drives the detection loop, `generate` writes golden sets offline,
//! `decode` turns a captured diagnostic stream back into iterations and `list`
//! shows the available workloads.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use sdc_harness::config::SinkKind;
use sdc_harness::protocol::DecodedIteration;
use sdc_harness::{
    BitFlip, Element, HaltSignal, Harness, HarnessConfig, RunSummary, StreamDecoder, Workload,
    WorkloadSpec, WorkloadVisitor,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Silent data corruption detection harness
#[derive(Parser, Debug)]
#[command(name = "sdc-harness", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Workload kind, overrides the configuration
    #[arg(short, long, global = true)]
    workload: Option<String>,

    /// Primary size parameter of the workload
    #[arg(short, long, global = true)]
    size: Option<usize>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the detection loop
    Run {
        /// Stop after this many iterations (0 = until interrupted)
        #[arg(short = 'n', long)]
        iterations: Option<u64>,

        /// Storage root holding input and golden files
        #[arg(long, value_name = "DIR")]
        data: Option<PathBuf>,

        /// Write diagnostics to this file or device instead of stdout
        #[arg(long, value_name = "PATH")]
        sink: Option<PathBuf>,

        /// Flip a bit in the output: INDEX:BIT[:PERIOD]
        #[arg(long, value_name = "SPEC")]
        inject: Option<String>,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate input, golden output and manifest
    Generate {
        /// Output directory (defaults to the storage root)
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// RNG seed for the input
        #[arg(long, default_value = "1")]
        seed: u64,
    },

    /// Decode a captured diagnostic stream
    Decode {
        /// Captured little-endian word stream
        #[arg(value_name = "CAPTURE")]
        input: PathBuf,

        /// Print JSON instead of a listing
        #[arg(long)]
        json: bool,
    },

    /// List available workloads
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => HarnessConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {:?}", path))?,
        None => HarnessConfig::default(),
    };
    if let Some(kind) = &cli.workload {
        config.workload = WorkloadSpec::from_kind(kind)
            .ok_or_else(|| anyhow!("Unknown workload: {}", kind))?;
    }
    if let Some(size) = cli.size {
        config.workload = config.workload.resized(size);
    }

    match cli.command {
        Command::Run { iterations, data, sink, inject, json } => {
            if let Some(n) = iterations {
                config.run.iterations = n;
            }
            if let Some(dir) = data {
                config.storage.root = dir;
            }
            if let Some(path) = sink {
                config.sink.kind = SinkKind::File;
                config.sink.path = Some(path);
            }
            let injection = inject.as_deref().map(parse_injection).transpose()?;
            run(config, injection, json)
        }
        Command::Generate { out, seed } => generate(config, out, seed),
        Command::Decode { input, json } => decode(config, input, json),
        Command::List => {
            list();
            Ok(())
        }
    }
}

fn setup_logging(verbosity: u8) -> Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    // stderr only: stdout may be the diagnostic sink
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact()
        .init();

    Ok(())
}

fn parse_injection(spec: &str) -> Result<BitFlip> {
    let fields: Vec<&str> = spec.split(':').collect();
    if fields.len() < 2 || fields.len() > 3 {
        bail!("Invalid injection {:?}, expected INDEX:BIT[:PERIOD]", spec);
    }
    let index: usize = fields[0].parse().context("Invalid injection index")?;
    let bit: u32 = fields[1].parse().context("Invalid injection bit")?;
    let period: u64 = match fields.get(2) {
        Some(p) => p.parse().context("Invalid injection period")?,
        None => 1,
    };
    Ok(BitFlip::new(index, bit, period))
}

fn run(config: HarnessConfig, injection: Option<BitFlip>, json: bool) -> Result<()> {
    let harness = Harness::new(config).context("Invalid configuration")?;
    let sink = harness
        .config()
        .sink
        .open()
        .context("Failed to open diagnostic sink")?;

    let halt = HaltSignal::new();
    let handler_halt = halt.clone();
    ctrlc::set_handler(move || handler_halt.request()).context("Failed to install interrupt handler")?;

    tracing::info!("Running {} (storage {:?})", harness.config().workload.kind(), harness.config().storage.root);
    let summary = harness.run(sink, &halt, injection)?;

    if json {
        eprintln!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if summary.faulted() {
        bail!("{} stopped on a configuration fault", summary.workload);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let stats = &summary.stats;
    eprintln!();
    eprintln!("{} {}", "Run summary:".bright_green(), summary.workload.bright_white());
    eprintln!("  State:       {:?}", summary.state);
    eprintln!("  Iterations:  {}", stats.iterations.to_string().bright_white());
    eprintln!("  Clean:       {}", stats.clean.to_string().bright_green());
    eprintln!("  Dirty:       {}", stats.dirty.to_string().bright_red());
    eprintln!("  Mismatches:  {}", stats.total_mismatches);
    eprintln!("  Truncated:   {}", stats.truncated);
    if stats.faults > 0 {
        eprintln!("  Faults:      {}", stats.faults.to_string().bright_red());
    }
    if stats.sink_retries > 0 {
        eprintln!("  Sink retries: {}", stats.sink_retries.to_string().bright_yellow());
    }
}

fn generate(config: HarnessConfig, out: Option<PathBuf>, seed: u64) -> Result<()> {
    let dir = out.unwrap_or_else(|| config.storage.root.clone());
    let harness = Harness::new(config).context("Invalid configuration")?;
    let manifest = harness
        .generate(&dir, seed)
        .with_context(|| format!("Failed to generate golden set in {:?}", dir))?;

    println!("{} {}", "Generated".bright_green(), manifest.workload.bright_white());
    for entry in manifest.inputs.iter().chain(std::iter::once(&manifest.golden)) {
        println!("  {:<40} {:>10} elements  {}", entry.name, entry.elements, &entry.sha256[..16]);
    }
    Ok(())
}

fn decode(config: HarnessConfig, input: PathBuf, json: bool) -> Result<()> {
    let harness = Harness::new(config).context("Invalid configuration")?;
    let bytes = std::fs::read(&input).with_context(|| format!("Failed to read {:?}", input))?;
    let stream = StreamDecoder::new(harness.message_layout()).decode_bytes(&bytes);

    if json {
        println!("{}", serde_json::to_string_pretty(&stream)?);
        return Ok(());
    }

    for (n, iteration) in stream.iterations.iter().enumerate() {
        match iteration {
            DecodedIteration::Clean => println!("{:>6} {}", n, "clean".green()),
            DecodedIteration::Summary { count } => {
                println!("{:>6} {} {} mismatches", n, "dirty".red(), count)
            }
            DecodedIteration::Fault(code) => {
                println!("{:>6} {} {:?} (0x{:08X})", n, "fault".bright_red(), code, code.word())
            }
            DecodedIteration::Dirty { mismatches, truncated, partial } => {
                let mut note = String::new();
                if *partial {
                    note.push_str(" (partial)");
                }
                if let Some(more) = truncated {
                    note.push_str(&format!(" (+{} not reported)", more));
                }
                println!("{:>6} {} {} mismatches{}", n, "dirty".red(), mismatches.len(), note);
                for mismatch in mismatches {
                    let words: Vec<String> = mismatch.value.iter().map(|w| format!("{:08X}", w)).collect();
                    println!("         [{}] {}", mismatch.index, words.join(" "));
                }
            }
        }
    }

    if stream.skipped_words > 0 || stream.trailing_words > 0 {
        println!(
            "{} {} unrecognized words skipped, {} trailing",
            "warning:".yellow(),
            stream.skipped_words,
            stream.trailing_words
        );
    }
    Ok(())
}

struct Describe;

impl WorkloadVisitor for Describe {
    type Output = String;

    fn visit<W: Workload>(self, workload: W) -> String {
        format!(
            "{:<28} {:>9} x {:<6} -> {:>9} x {:<12} {} word(s)/message",
            workload.instance(),
            workload.input_len(),
            <W::Input as Element>::TYPE_NAME,
            workload.output_len(),
            <W::Output as Element>::TYPE_NAME,
            1 + workload.message_layout().body_words()
        )
    }
}

fn list() {
    println!("{}", "Available workloads (default parameters):".bright_cyan());
    for spec in WorkloadSpec::catalog() {
        println!("  {:<10} {}", spec.kind().bright_white(), spec.dispatch(Describe));
    }
}
