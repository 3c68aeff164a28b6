use std::{collections::VecDeque, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
  aircraft::{Aircraft, AircraftId, AircraftKind, AircraftState},
  graph::{AirfieldGraph, NodeId, RWY_07_NODE, RWY_25_NODE},
  segments::{Section, SegmentManager},
};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
pub enum WindDirection {
  #[default]
  #[serde(rename = "07")]
  Rwy07,
  #[serde(rename = "25")]
  Rwy25,
}

impl WindDirection {
  /// Threshold the active runway operates from.
  pub fn active_threshold(&self) -> NodeId {
    match self {
      Self::Rwy07 => RWY_07_NODE,
      Self::Rwy25 => RWY_25_NODE,
    }
  }

  /// The opposite threshold; departures line up from here.
  pub fn runway_entry_node(&self) -> NodeId {
    match self {
      Self::Rwy07 => RWY_25_NODE,
      Self::Rwy25 => RWY_07_NODE,
    }
  }
}

impl fmt::Display for WindDirection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Rwy07 => write!(f, "07"),
      Self::Rwy25 => write!(f, "25"),
    }
  }
}

impl FromStr for WindDirection {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "07" => Ok(Self::Rwy07),
      "25" => Ok(Self::Rwy25),
      other => {
        Err(format!("unknown wind direction {other:?} (expected 07 or 25)"))
      }
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RunwayOperation {
  Landing,
  Departure,
}

/// Single-server admission to the runway: at most one aircraft holds the
/// runway macro-section at a time. Landings and departures share one FIFO
/// queue.
#[derive(Debug, Clone, Default)]
pub struct RunwayController {
  pub wind_direction: WindDirection,
  pub is_busy: bool,
  pub current_airplane: Option<AircraftId>,
  pub current_operation: Option<RunwayOperation>,
  pub runway_queue: VecDeque<AircraftId>,
}

impl RunwayController {
  pub fn new(wind_direction: WindDirection) -> Self {
    Self {
      wind_direction,
      ..Self::default()
    }
  }

  pub fn active_threshold(&self) -> NodeId {
    self.wind_direction.active_threshold()
  }

  pub fn runway_entry_node(&self) -> NodeId {
    self.wind_direction.runway_entry_node()
  }

  /// Appends the aircraft to the runway queue if it is not already queued.
  pub fn enqueue(&mut self, id: AircraftId) {
    if !self.runway_queue.contains(&id) {
      self.runway_queue.push_back(id);
    }
  }

  pub fn queue_contains(&self, id: AircraftId) -> bool {
    self.runway_queue.contains(&id)
  }

  /// Runs once per tick, before any aircraft steps. Promotes the queue head
  /// when the runway macro-section can be granted; on any failure the head
  /// stays queued and retries next tick.
  pub fn step(
    &mut self,
    graph: &AirfieldGraph,
    segments: &mut SegmentManager,
    airplanes: &mut [Aircraft],
  ) {
    if self.is_busy {
      return;
    }
    let Some(&head) = self.runway_queue.front() else {
      return;
    };
    let Some(plane) = airplanes.iter_mut().find(|plane| plane.id == head)
    else {
      // The queued aircraft no longer exists.
      self.runway_queue.pop_front();
      return;
    };

    let (granted, mut edges) =
      segments.request_section(graph, Section::Runway, head);
    if !granted {
      return;
    }

    match plane.kind {
      AircraftKind::Arrival => {
        match plane.choose_exit(graph, segments, self.active_threshold()) {
          Some(exit_edges) => {
            self.runway_queue.pop_front();
            edges.extend(exit_edges);
            plane.blocked_edges = edges;
            self.start_landing(graph, plane);
          }
          None => segments.release_edges(&edges, head),
        }
      }
      AircraftKind::Departure => {
        self.runway_queue.pop_front();
        plane.blocked_edges = edges;
        self.start_departure(graph, plane);
      }
    }
  }

  fn start_landing(&mut self, graph: &AirfieldGraph, plane: &mut Aircraft) {
    let threshold = self.active_threshold();
    plane.current_node = Some(threshold);
    if let Some(pos) = graph.position_of(threshold) {
      plane.position.snap_to(threshold, pos);
    }
    plane.state = AircraftState::Landing;
    plane.landing_time = 0;
    plane.is_in_queue = false;

    self.is_busy = true;
    self.current_airplane = Some(plane.id);
    self.current_operation = Some(RunwayOperation::Landing);
    tracing::info!("{} cleared to land, runway {}", plane.id, self.wind_direction);
  }

  fn start_departure(&mut self, graph: &AirfieldGraph, plane: &mut Aircraft) {
    let threshold = self.active_threshold();
    plane.target_node = Some(threshold);
    plane.path.clear();
    if let Some(current) = plane.current_node {
      let mut path = graph.shortest_path(current, threshold);
      if path.len() > 1 {
        path.remove(0);
      }
      plane.path = path.into();
    }
    plane.state = AircraftState::Departing;
    plane.departure_time = 0;
    plane.is_in_queue = false;

    self.is_busy = true;
    self.current_airplane = Some(plane.id);
    self.current_operation = Some(RunwayOperation::Departure);
    tracing::info!(
      "{} cleared for takeoff, runway {}",
      plane.id,
      self.wind_direction
    );
  }

  pub fn finish_landing(&mut self) {
    self.clear_operation();
  }

  pub fn finish_departure(&mut self) {
    self.clear_operation();
  }

  fn clear_operation(&mut self) {
    self.is_busy = false;
    self.current_airplane = None;
    self.current_operation = None;
  }
}

#[cfg(test)]
mod tests {
  use internment::Intern;

  use super::*;

  #[test]
  fn wind_direction_selects_the_active_runway() {
    assert_eq!(WindDirection::Rwy07.active_threshold(), RWY_07_NODE);
    assert_eq!(WindDirection::Rwy07.runway_entry_node(), RWY_25_NODE);
    assert_eq!(WindDirection::Rwy25.active_threshold(), RWY_25_NODE);
    assert_eq!(WindDirection::Rwy25.runway_entry_node(), RWY_07_NODE);
  }

  #[test]
  fn wind_direction_round_trips_through_strings() {
    assert_eq!("07".parse::<WindDirection>(), Ok(WindDirection::Rwy07));
    assert_eq!("25".parse::<WindDirection>(), Ok(WindDirection::Rwy25));
    assert!("34".parse::<WindDirection>().is_err());
    assert_eq!(WindDirection::Rwy07.to_string(), "07");
    assert_eq!(WindDirection::Rwy25.to_string(), "25");
  }

  #[test]
  fn enqueue_is_idempotent() {
    let mut controller = RunwayController::new(WindDirection::Rwy07);
    let id = Intern::from_ref("AAL0001");

    controller.enqueue(id);
    controller.enqueue(id);
    assert_eq!(controller.runway_queue.len(), 1);
    assert!(controller.queue_contains(id));
  }

  #[test]
  fn finish_clears_the_operation() {
    let mut controller = RunwayController::new(WindDirection::Rwy07);
    controller.is_busy = true;
    controller.current_airplane = Some(Intern::from_ref("AAL0001"));
    controller.current_operation = Some(RunwayOperation::Landing);

    controller.finish_landing();
    assert!(!controller.is_busy);
    assert_eq!(controller.current_airplane, None);
    assert_eq!(controller.current_operation, None);
  }
}
