use std::{
  collections::HashMap,
  path::PathBuf,
  time::{SystemTime, UNIX_EPOCH},
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use turborand::{SeededCore, TurboRand, rng::Rng};

use crate::{
  aircraft::{
    Aircraft, AircraftId, AircraftState, Event, random_callsign,
  },
  graph::{AirfieldGraph, NodeId, TopologyError},
  runway::{RunwayController, WindDirection},
  segments::SegmentManager,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
  pub nodes_file: PathBuf,
  pub edges_file: PathBuf,
  /// Arrivals present when the simulation starts.
  #[serde(default = "default_arrivals")]
  pub num_arriving_airplanes: usize,
  #[serde(default)]
  pub wind_direction: WindDirection,
  /// Per-tick chance of spawning one additional arrival.
  #[serde(default = "default_arrival_rate")]
  pub arrival_rate: f64,
  #[serde(default = "default_seed")]
  pub seed: u64,
}

fn default_arrivals() -> usize {
  5
}

fn default_arrival_rate() -> f64 {
  0.1
}

fn default_seed() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|since_epoch| since_epoch.as_secs())
    .unwrap_or(0)
}

impl Default for SimConfig {
  fn default() -> Self {
    Self {
      nodes_file: PathBuf::from("assets/nodes.csv"),
      edges_file: PathBuf::from("assets/edges.csv"),
      num_arriving_airplanes: default_arrivals(),
      wind_direction: WindDirection::default(),
      arrival_rate: default_arrival_rate(),
      seed: default_seed(),
    }
  }
}

/// Per-aircraft step context. Shared state is threaded by explicit borrow;
/// aircraft hold no references back into the model.
#[derive(Debug)]
pub struct Bundle<'a> {
  pub graph: &'a AirfieldGraph,
  pub segments: &'a mut SegmentManager,
  pub runway: &'a mut RunwayController,
  /// Stands occupied by other aircraft, snapshotted before this step.
  pub occupied_stands: Vec<NodeId>,
  pub now: u64,
  pub rng: &'a mut Rng,
  pub events: &'a mut Vec<Event>,
}

/// The simulation model: owns the airfield and every agent, and advances
/// them one cooperative tick at a time.
#[derive(Debug)]
pub struct Simulation {
  pub graph: AirfieldGraph,
  pub segments: SegmentManager,
  pub runway: RunwayController,
  pub airplanes: Vec<Aircraft>,
  pub step_count: u64,
  pub arrival_rate: f64,
  pub departures_completed: u64,
  rng: Rng,
}

impl Simulation {
  /// Loads the topology from the configured CSV files and spawns the
  /// initial arrivals.
  pub fn from_config(config: &SimConfig) -> Result<Self, TopologyError> {
    let graph =
      AirfieldGraph::from_csv_files(&config.nodes_file, &config.edges_file)?;
    Ok(Self::new(graph, config))
  }

  pub fn new(graph: AirfieldGraph, config: &SimConfig) -> Self {
    let mut sim = Self {
      graph,
      segments: SegmentManager::new(),
      runway: RunwayController::new(config.wind_direction),
      airplanes: Vec::new(),
      step_count: 0,
      arrival_rate: config.arrival_rate,
      departures_completed: 0,
      rng: Rng::with_seed(config.seed),
    };
    for _ in 0..config.num_arriving_airplanes {
      sim.spawn_arrival();
    }
    sim
  }

  /// Spawns one airborne arrival under a fresh callsign.
  pub fn spawn_arrival(&mut self) -> AircraftId {
    let mut callsign = random_callsign(&mut self.rng);
    while self.airplanes.iter().any(|plane| *plane.id == callsign) {
      callsign = random_callsign(&mut self.rng);
    }
    let id = AircraftId::from(callsign);
    self.airplanes.push(Aircraft::arrival(id));
    tracing::info!("{} inbound", id);
    id
  }

  pub fn aircraft(&self, id: AircraftId) -> Option<&Aircraft> {
    self.airplanes.iter().find(|plane| plane.id == id)
  }

  /// Aircraft counts keyed by state, for status reporting.
  pub fn state_counts(&self) -> HashMap<AircraftState, usize> {
    self.airplanes.iter().map(|plane| plane.state).counts()
  }

  /// One simulation tick: spawn, upkeep, runway controller, then every
  /// aircraft in list order over an id snapshot, so removals during the
  /// tick cannot disturb iteration.
  pub fn step(&mut self) {
    self.step_count += 1;

    if self.rng.chance(self.arrival_rate) {
      self.spawn_arrival();
    }

    self.segments.cleanup(self.step_count);
    self
      .runway
      .step(&self.graph, &mut self.segments, &mut self.airplanes);

    let mut events: Vec<Event> = Vec::new();
    let ids: Vec<AircraftId> =
      self.airplanes.iter().map(|plane| plane.id).collect();
    for id in ids {
      let Some(index) =
        self.airplanes.iter().position(|plane| plane.id == id)
      else {
        continue;
      };
      let occupied_stands: Vec<NodeId> = self
        .airplanes
        .iter()
        .filter(|plane| {
          plane.id != id && plane.state == AircraftState::AtStand
        })
        .filter_map(|plane| plane.current_node)
        .collect();

      let mut bundle = Bundle {
        graph: &self.graph,
        segments: &mut self.segments,
        runway: &mut self.runway,
        occupied_stands,
        now: self.step_count,
        rng: &mut self.rng,
        events: &mut events,
      };
      self.airplanes[index].step(&mut bundle);
    }

    for event in events {
      match event {
        Event::Despawn(id) => {
          self.airplanes.retain(|plane| plane.id != id);
          self.departures_completed += 1;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn config_defaults_match_the_contract() {
    let config = SimConfig::default();
    assert_eq!(config.num_arriving_airplanes, 5);
    assert_eq!(config.wind_direction, WindDirection::Rwy07);
    assert_eq!(config.arrival_rate, 0.1);
  }

  #[test]
  fn spawned_callsigns_are_unique() {
    let config = SimConfig {
      num_arriving_airplanes: 50,
      seed: 3,
      ..SimConfig::default()
    };
    let sim = Simulation::new(AirfieldGraph::new(), &config);

    assert_eq!(sim.airplanes.len(), 50);
    let mut ids: Vec<AircraftId> =
      sim.airplanes.iter().map(|plane| plane.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 50);
  }
}
