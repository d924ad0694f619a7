#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use augur::checks::{replicate_means, tail_probability};
use augur::config::RunConfig;
use augur::{Panel, Reconstructor, ScalingSpec};

use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::Path;
use std::process;

#[derive(Parser)]
#[command(
    name = "augur",
    about = "Simulate and replay Bayesian panel AR(1) models",
    long_about = "Simulates panel AR(1) data, replays posterior draws exported by an external \
                 sampler as mean paths or posterior-predictive replicates, and rescales \
                 regression coefficients fitted on standardized data."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate one panel from the [parameters] table
    #[command(about = "Simulate a panel (outputs: panel.tsv)")]
    Simulate {
        /// Path to the run configuration (.toml)
        #[arg(long)]
        config: String,

        /// Seed for observation noise and hierarchical slopes
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Output path for the long-format panel
        #[arg(long, default_value = "panel.tsv")]
        output: String,
    },

    /// Replay the [[draws]] tables against the configured panel
    #[command(about = "Replay posterior draws (outputs: replicates.tsv)")]
    Replay {
        /// Path to the run configuration (.toml)
        #[arg(long)]
        config: String,

        /// Output path for the long-format replicates
        #[arg(long, default_value = "replicates.tsv")]
        output: String,
    },

    /// Map standardized-scale coefficients from the [rescale] table to original units
    Rescale {
        /// Path to the run configuration (.toml)
        #[arg(long)]
        config: String,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate {
            config,
            seed,
            output,
        } => simulate_command(&config, seed, &output),
        Commands::Replay { config, output } => replay_command(&config, &output),
        Commands::Rescale { config } => rescale_command(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn simulate_command(
    config_path: &str,
    seed: u64,
    output_path: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading configuration from: {}", config_path);
    let config = RunConfig::load(config_path)?;
    let generator = config.generator()?;

    let mut rng = StdRng::seed_from_u64(seed);
    let params = config.parameter_set(&mut rng)?;
    println!(
        "Simulating {} individuals over {} periods (gamma = {}, sigma_y = {})",
        generator.shape().individuals(),
        generator.shape().periods(),
        params.gamma(),
        params.sigma_y()
    );

    let simulation = generator.simulate_with_warnings(&params, &mut rng)?;
    let panel = simulation.panel;
    println!("Panel grand mean: {:.6}", panel.grand_mean());
    for warning in &simulation.warnings {
        println!("Warning: {}", warning);
    }

    save_panels(std::slice::from_ref(&panel), output_path)?;
    println!("Panel saved to: {}", output_path);
    Ok(())
}

fn replay_command(config_path: &str, output_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading configuration from: {}", config_path);
    let config = RunConfig::load(config_path)?;
    let draws = config.draw_set()?;
    println!("Loaded {} posterior draws", draws.len());

    let reconstructor = Reconstructor::new(
        config.shape()?,
        config.initial().view(),
        config.replay.replay_mode(),
    )?
    .with_policy(config.replay.stationarity);
    let replicates = reconstructor.reconstruct(&draws)?;

    let means = replicate_means(&replicates.panels)?;
    let baseline = means.mean().unwrap_or(f64::NAN);
    println!(
        "Replicate grand means: average {:.6}, sd {:.6}",
        baseline,
        means.std(0.0)
    );
    println!(
        "Share of replicates at or above the average: {:.3}",
        tail_probability(means.view(), baseline)?
    );
    if replicates.has_warnings() {
        println!(
            "{} draw(s) raised domain warnings; see the log for details",
            replicates.warnings.len()
        );
    }

    save_panels(&replicates.panels, output_path)?;
    println!("Replicates saved to: {}", output_path);
    Ok(())
}

fn rescale_command(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    println!("Loading configuration from: {}", config_path);
    let config = RunConfig::load(config_path)?;
    let rescale = config.rescale()?;

    let x = rescale.design()?;
    let y = rescale.response();
    let spec = ScalingSpec::fit(x.view(), y.view())?;
    let original = spec.rescale_coefficients(&rescale.standardized_coefficients())?;

    println!("coefficient\tstandardized\tmultiplier\toriginal");
    for (k, ((std_value, multiplier), value)) in rescale
        .coefficients
        .iter()
        .zip(spec.multipliers().iter())
        .zip(original.iter())
        .enumerate()
    {
        println!("x{}\t{:.6}\t{:.6}\t{:.6}", k + 1, std_value, multiplier, value);
    }
    Ok(())
}

/// Writes panels in long format: draw, individual, period (1-based), value.
fn save_panels(panels: &[Panel], output_path: impl AsRef<Path>) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(output_path)?;
    writer.write_record(["draw", "individual", "period", "value"])?;

    for (draw, panel) in panels.iter().enumerate() {
        for ((individual, period), value) in panel.indexed_iter() {
            writer.write_record([
                (draw + 1).to_string(),
                (individual + 1).to_string(),
                (period + 1).to_string(),
                format!("{:.6}", value),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}
