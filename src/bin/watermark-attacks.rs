use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use watermark_attacks::{default_output_dir, CatalogKind, Executor, RunOptions, WritePolicy};

#[derive(Parser)]
#[command(
    name = "watermark-attacks",
    about = "Apply attack scenarios to a directory of watermarked images",
    version,
    after_help = "Outputs are written to <OUTPUT_DIR>/<scenario>/<file name>, reusing each \
                  source file's name and format.\n\n\
                  Single attacks: jpeg_95/75/50/30, resize_50/75, crop_10/25/40, screenshot, \
                  noise_light, noise_medium.\n\
                  Combined scenarios (--combined): social, screenshot, intentional removal, \
                  viral repost, thumbnail and crop+compress chains."
)]
struct Cli {
    /// Directory of source images (.jpg, .jpeg, .png, .webp, .bmp)
    #[arg(default_value = "seal")]
    source: PathBuf,

    /// Output root (default: {source}_attacks or {source}_combined_attacks)
    output: Option<PathBuf>,

    /// Run the multi-step scenario catalog instead of single attacks
    #[arg(short, long)]
    combined: bool,

    /// Seed for the noise operator, for byte-identical reruns
    #[arg(long)]
    seed: Option<u64>,

    /// JPEG quality for .jpg outputs (default: 75, or 95 with --combined)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// Keep outputs that already exist instead of overwriting them
    #[arg(long)]
    skip_existing: bool,

    /// Log every scenario trace
    #[arg(short, long)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let kind = if cli.combined {
        CatalogKind::Combined
    } else {
        CatalogKind::Single
    };

    let catalog = match kind.catalog() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Fatal: {e}");
            process::exit(1);
        }
    };

    let output = cli.output.as_deref().map_or_else(
        || default_output_dir(&cli.source, kind),
        Path::to_path_buf,
    );

    let mut opts = RunOptions::for_kind(kind);
    opts.seed = cli.seed;
    if let Some(q) = cli.quality {
        opts.output_quality = q;
    }
    if cli.skip_existing {
        opts.write_policy = WritePolicy::SkipExisting;
    }

    let executor = Executor::new(catalog, opts);
    tracing::info!(
        "Processing images in {} with {} scenarios into {}",
        cli.source.display(),
        executor.catalog().len(),
        output.display()
    );

    let report = match executor.run(&cli.source, &output) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Fatal: {e}");
            process::exit(1);
        }
    };

    let summary = report.summarize();
    println!("{summary}");
    println!("Output directory: {}", output.display());

    if kind == CatalogKind::Combined {
        println!();
        println!("Scenarios:");
        for (n, (id, description, trace)) in summary.scenario_traces().enumerate() {
            match description {
                Some(d) => println!("{:>3}. {id}: {d} ({trace})", n + 1),
                None => println!("{:>3}. {id}: {trace}", n + 1),
            }
        }
    }
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
