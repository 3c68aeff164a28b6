use std::{collections::HashMap, path::PathBuf, process::ExitCode};

use clap::Parser;
use engine::{
  aircraft::AircraftState,
  runway::WindDirection,
  sim::{SimConfig, Simulation},
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "airside")]
#[command(about = "Headless airport ground-operations simulation", long_about = None)]
struct Args {
  /// Nodes CSV file.
  #[arg(long)]
  nodes: PathBuf,

  /// Edges CSV file.
  #[arg(long)]
  edges: PathBuf,

  /// Arrivals present at startup.
  #[arg(long, default_value_t = 5)]
  arrivals: usize,

  /// Active wind direction.
  #[arg(long, default_value = "07")]
  wind: WindDirection,

  /// Per-tick chance of an extra arrival.
  #[arg(long, default_value_t = 0.1)]
  arrival_rate: f64,

  /// RNG seed; defaults to the current unix time.
  #[arg(long)]
  seed: Option<u64>,

  /// Ticks to simulate.
  #[arg(long, default_value_t = 200)]
  ticks: u64,

  /// Log a status line every N ticks (0 disables).
  #[arg(long, default_value_t = 10)]
  log_every: u64,

  /// Print the final summary as JSON.
  #[arg(long)]
  json: bool,
}

#[derive(Serialize)]
struct Summary {
  ticks: u64,
  aircraft_remaining: usize,
  departures_completed: u64,
  states: HashMap<AircraftState, usize>,
}

fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info")),
    )
    .with_target(false)
    .init();

  let args = Args::parse();

  let mut config = SimConfig {
    nodes_file: args.nodes,
    edges_file: args.edges,
    num_arriving_airplanes: args.arrivals,
    wind_direction: args.wind,
    arrival_rate: args.arrival_rate,
    ..SimConfig::default()
  };
  if let Some(seed) = args.seed {
    config.seed = seed;
  }

  let mut sim = match Simulation::from_config(&config) {
    Ok(sim) => sim,
    Err(err) => {
      tracing::error!("{err}");
      return ExitCode::FAILURE;
    }
  };

  let mut kind_counts: Vec<String> = sim
    .graph
    .edge_counts_by_kind()
    .into_iter()
    .map(|(kind, count)| format!("{kind:?}: {count}"))
    .collect();
  kind_counts.sort();
  tracing::info!(
    "loaded topology: {} nodes, {} edges ({}), wind {}",
    sim.graph.node_count(),
    sim.graph.edge_count(),
    kind_counts.join(", "),
    config.wind_direction
  );

  for _ in 0..args.ticks {
    sim.step();
    if args.log_every > 0 && sim.step_count % args.log_every == 0 {
      log_status(&sim);
    }
  }

  let summary = Summary {
    ticks: sim.step_count,
    aircraft_remaining: sim.airplanes.len(),
    departures_completed: sim.departures_completed,
    states: sim.state_counts(),
  };

  if args.json {
    match serde_json::to_string_pretty(&summary) {
      Ok(json) => println!("{json}"),
      Err(err) => {
        tracing::error!("failed to serialize summary: {err}");
        return ExitCode::FAILURE;
      }
    }
  } else {
    tracing::info!(
      "finished after {} ticks: {} aircraft on the field, {} departures completed",
      summary.ticks,
      summary.aircraft_remaining,
      summary.departures_completed
    );
    log_status(&sim);
  }

  ExitCode::SUCCESS
}

fn log_status(sim: &Simulation) {
  let mut states: Vec<String> = sim
    .state_counts()
    .into_iter()
    .map(|(state, count)| format!("{state:?}: {count}"))
    .collect();
  states.sort();

  tracing::info!(
    "tick {}: {} aircraft [{}], runway busy: {}, apron queue: {}",
    sim.step_count,
    sim.airplanes.len(),
    states.join(", "),
    sim.runway.is_busy,
    sim.segments.deck_queue().len()
  );
}
