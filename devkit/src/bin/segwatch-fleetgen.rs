//! Generate a synthetic device inventory CSV.
//!
//!     segwatch-fleetgen -n 250 -o data_raw/devices.csv --seed 42

use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use chrono::Utc;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use segwatch_devkit::fleet_gen::{generate_records, DEFAULT_OUTPUT, DEFAULT_ROWS};
use segwatch_kernel::inventory::write_devices;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "segwatch-fleetgen")]
#[command(about = "Generate synthetic device metadata")]
struct Args {
    /// Number of rows to generate
    #[arg(short = 'n', long, default_value_t = DEFAULT_ROWS as i64)]
    rows: i64,

    /// Output CSV path
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Optional random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    ensure!(args.rows > 0, "Number of rows must be a positive integer.");

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let records = generate_records(args.rows as usize, &mut rng, Utc::now().naive_utc());

    write_devices(&args.output, &records)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("Created {} synthetic rows at {}", records.len(), args.output.display());
    Ok(())
}
