use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tile_packer::presets;
use tile_packer::solver::GoodLpSolver;
use tile_packer::{Inventory, Packer, SolverConfig, Strategy};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tile_packer",
    about = "Largest square tiling from an inventory of square tiles"
)]
struct Cli {
    /// Named inventory: test1, inv_5_5 or cover_demo
    #[arg(long, conflicts_with = "tiles")]
    preset: Option<String>,

    /// Tiles as SIZE:COUNT (e.g. 1:4 2:3 3:2)
    #[arg(long = "tiles", num_args = 1.., value_parser = parse_tiles)]
    tiles: Vec<(i64, i64)>,

    /// Model encoding: grid or geometric
    #[arg(long, default_value = "grid")]
    strategy: Strategy,

    /// Solver threads (ignored by backends without threading)
    #[arg(long, default_value_t = 6)]
    threads: usize,

    /// Solver time limit in seconds
    #[arg(long, value_parser = parse_seconds)]
    time_limit: Option<Duration>,

    /// Override the target square side
    #[arg(long)]
    dimension: Option<u32>,

    /// Instance name used for logs and dump files
    #[arg(long)]
    name: Option<String>,

    /// Write the model to <name>.model.dump before solving
    #[arg(long)]
    dump_model: bool,

    /// Write the result as JSON
    #[arg(long)]
    output: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

fn parse_tiles(s: &str) -> Result<(i64, i64), String> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 2 {
        return Err(format!("invalid tiles '{}', expected SIZE:COUNT", s));
    }
    let size = parts[0]
        .parse::<i64>()
        .map_err(|_| format!("invalid size in '{}'", s))?;
    let count = parts[1]
        .parse::<i64>()
        .map_err(|_| format!("invalid count in '{}'", s))?;
    Ok((size, count))
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    let secs = s
        .parse::<f64>()
        .map_err(|_| format!("invalid time limit '{}'", s))?;
    Duration::try_from_secs_f64(secs).map_err(|_| format!("time limit must be non-negative in '{}'", s))
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let (inventory, default_name): (Inventory, String) = match &cli.preset {
        Some(name) => match presets::preset(name) {
            Some(inv) => (inv, name.clone()),
            None => fail(format!(
                "unknown preset '{}', expected one of: {}",
                name,
                presets::NAMES.join(", ")
            )),
        },
        None if cli.tiles.is_empty() => fail("either --preset or --tiles is required"),
        None => (cli.tiles.iter().copied().collect(), "tiles".to_string()),
    };
    let name = cli.name.clone().unwrap_or(default_name);

    let mut packer = Packer::new(&name, &inventory, cli.strategy).unwrap_or_else(|e| fail(e));
    if let Some(dimension) = cli.dimension {
        packer = packer.with_dimension(dimension).unwrap_or_else(|e| fail(e));
    }

    let mut config = SolverConfig::new().with_threads(cli.threads);
    if let Some(limit) = cli.time_limit {
        config = config.with_time_limit(limit);
    }

    let model = packer.build_model();
    if cli.dump_model {
        let path = format!("{name}.model.dump");
        std::fs::write(&path, model.to_string()).unwrap_or_else(|e| fail(format!("{path}: {e}")));
        println!("Model written to {path}");
    }
    let instance = packer.solve_model(&model, &GoodLpSolver, &config);

    println!("Instance {} ({})", instance.name, instance.strategy);
    println!("  target square: {0}x{0}", instance.dimension);
    for warning in &instance.warnings {
        println!("  warning: {warning}");
    }
    println!("  status: {}", instance.status);
    if let Some(width) = instance.filled_width {
        println!("  filled square: {width}x{width}");
    }
    for tile in instance.selected_tiles() {
        println!("  {tile}");
    }
    let unused = instance.tiles.len() - instance.selected_tiles().count();
    println!(
        "Summary: {} of {} tile{} placed, {} unused",
        instance.tiles.len() - unused,
        instance.tiles.len(),
        if instance.tiles.len() == 1 { "" } else { "s" },
        unused,
    );

    if let Some(path) = &cli.output {
        instance.save(path).unwrap_or_else(|e| fail(e));
        println!("Result written to {}", path.display());
    }
}
