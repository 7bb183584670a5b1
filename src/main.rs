use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::Rng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use adex::{
    Core, CoreResult, Data, Measurement, Position, RandomSampler, Settings, Snapshot,
    ThreadedEngine,
};

#[derive(Parser)]
#[command(name = "adex", about = "Adaptive experimentation core", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the core with a simulated two-axis measurement surface.
    Serve {
        /// Configuration file (TOML).
        #[arg(long, default_value = adex::config::DEFAULT_CONFIG_FILE)]
        config: String,
        /// Override the control channel bind address.
        #[arg(long)]
        bind: Option<String>,
        /// Seed the dataset from a saved snapshot.
        #[arg(long)]
        snapshot: Option<String>,
    },
    /// Print a summary of a saved snapshot.
    Inspect { snapshot: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            config,
            bind,
            snapshot,
        } => serve(&config, bind, snapshot).await,
        Command::Inspect { snapshot } => inspect(&snapshot),
    }
}

async fn serve(config: &str, bind: Option<String>, snapshot: Option<String>) -> anyhow::Result<()> {
    let mut settings = Settings::load_from(config).context("loading configuration")?;
    if let Some(bind) = bind {
        settings.server.bind_addr = bind;
    }

    let sampler = RandomSampler::new(vec![(0.0, 100.0), (0.0, 100.0)])
        .with_training_interval(settings.experiment.training_interval);
    let backend = ThreadedEngine::new(simulated_measure);

    let mut core = Core::new(Box::new(sampler), Box::new(backend)).with_settings(settings);
    if let Some(path) = snapshot {
        let restored = Snapshot::load(&path).context("loading snapshot")?;
        info!(path, observations = restored.data.len(), "dataset restored");
        core = core.with_dataset(restored.data);
    }

    core.serve().await.context("core loop failed")
}

fn inspect(path: &str) -> anyhow::Result<()> {
    let snapshot = Snapshot::load(path).context("loading snapshot")?;
    let data: &Data = &snapshot.data;
    println!("run id:         {}", snapshot.run_id);
    println!("created:        {}", snapshot.created);
    println!("observations:   {}", data.len());
    println!(
        "dimensionality: {}",
        data.dimensionality
            .map_or_else(|| "unset".into(), |d| d.to_string())
    );
    for name in data.metrics.keys() {
        println!("metric:         {name}");
    }
    Ok(())
}

/// Three Gaussian peaks over a 100x100 field, with measurement noise.
fn simulated_measure(position: &Position) -> CoreResult<Measurement> {
    const PEAKS: [(f64, f64, f64, f64); 3] = [
        (25.0, 25.0, 8.0, 1.0),
        (70.0, 60.0, 12.0, 0.8),
        (40.0, 85.0, 6.0, 0.6),
    ];
    let (x, y) = (position[0], position[1]);
    let surface: f64 = PEAKS
        .iter()
        .map(|&(cx, cy, width, height)| {
            let d2 = (x - cx).powi(2) + (y - cy).powi(2);
            height * (-d2 / (2.0 * width * width)).exp()
        })
        .sum();
    let noise = rand::thread_rng().gen_range(-0.01..0.01);
    Ok(Measurement::new(position.clone(), surface + noise, 0.01))
}
