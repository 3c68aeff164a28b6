use std::collections::VecDeque;

use glam::Vec2;
use internment::Intern;
use serde::{Deserialize, Serialize};
use turborand::{TurboRand, rng::Rng};

use crate::{
  HOLD_PROGRESS_STEP, MAX_LANDING_TICKS, MAX_STAND_TICKS,
  graph::{AirfieldGraph, EdgeEnds, EdgeKind, NodeId, NodeKind, edge_key},
  movement::{self, MovementKind},
  segments::{Section, SegmentManager},
  sim::Bundle,
};

pub type AircraftId = Intern<String>;

const AIRLINES: [&str; 4] = ["AAL", "SKW", "JBL", "BAW"];

pub fn random_callsign(rng: &mut Rng) -> String {
  let mut string = String::new();
  string.push_str(rng.sample(&AIRLINES).unwrap_or(&"AAL"));
  for _ in 0..4 {
    string.push_str(&rng.u8(0..=9).to_string());
  }
  string
}

/// Maximum edge fraction available to the occupant at `index` of an edge's
/// reservation queue. The head may use the full edge; each trailing
/// aircraft stops progressively earlier, keeping nose-to-tail spacing.
pub fn hold_progress_limit(index: usize) -> f32 {
  (1.0 - HOLD_PROGRESS_STEP * index as f32).max(0.0)
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AircraftKind {
  Arrival,
  Departure,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AircraftState {
  WaitingLanding,
  Landing,
  TaxiingToExit,
  AtExit,
  TaxiingToStand,
  AtStand,
  PushbackPending,
  Pushback,
  TaxiingToRunway,
  WaitingDeparture,
  Departing,
}

/// Interpolated position along the edge currently being traversed.
#[derive(
  Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize,
)]
pub struct SmoothPosition {
  pub pos: Vec2,
  pub progress: f32,
  pub from: Option<NodeId>,
  pub to: Option<NodeId>,
}

impl SmoothPosition {
  pub fn snap_to(&mut self, node: NodeId, pos: Vec2) {
    self.pos = pos;
    self.progress = 0.0;
    self.from = Some(node);
    self.to = None;
  }
}

/// Signals raised by an aircraft step for the model to apply afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
  /// The aircraft completed its departure and leaves the simulation.
  Despawn(AircraftId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aircraft {
  pub id: AircraftId,
  pub kind: AircraftKind,
  pub state: AircraftState,

  /// `None` while airborne.
  pub current_node: Option<NodeId>,
  pub target_node: Option<NodeId>,
  /// Remaining nodes to visit, head-consumed as movements start.
  pub path: VecDeque<NodeId>,
  /// Edges this aircraft currently holds reservations on.
  pub blocked_edges: Vec<EdgeEnds>,

  pub landing_time: u32,
  pub stand_time: u32,
  pub departure_time: u32,
  pub wait_time: u32,
  pub priority: u8,

  pub position: SmoothPosition,
  pub is_moving: bool,
  pub movement_start: u64,
  pub movement_duration: u32,
  pub hold_progress_limit: Option<f32>,

  pub is_in_queue: bool,
  pub runway_entry_node: Option<NodeId>,
}

impl Aircraft {
  pub fn arrival(id: AircraftId) -> Self {
    Self {
      id,
      kind: AircraftKind::Arrival,
      state: AircraftState::WaitingLanding,
      current_node: None,
      target_node: None,
      path: VecDeque::new(),
      blocked_edges: Vec::new(),
      landing_time: 0,
      stand_time: 0,
      departure_time: 0,
      wait_time: 0,
      priority: 1,
      position: SmoothPosition::default(),
      is_moving: false,
      movement_start: 0,
      movement_duration: 1,
      hold_progress_limit: None,
      is_in_queue: false,
      runway_entry_node: None,
    }
  }

  /// Interpolated position for observers.
  pub fn position(&self) -> Vec2 {
    self.position.pos
  }

  /// Categorical tag for visualization.
  pub fn color(&self) -> &'static str {
    match self.state {
      AircraftState::WaitingLanding => "blue",
      AircraftState::Landing => "red",
      AircraftState::TaxiingToStand => "orange",
      AircraftState::AtStand => "green",
      AircraftState::TaxiingToRunway => "yellow",
      AircraftState::WaitingDeparture => "purple",
      AircraftState::Departing => "magenta",
      _ => "gray",
    }
  }

  pub fn step(&mut self, bundle: &mut Bundle) {
    match self.state {
      AircraftState::WaitingLanding => self.wait_for_landing(bundle),
      AircraftState::Landing => self.land(bundle),
      AircraftState::TaxiingToExit => self.taxi_to_exit(bundle),
      AircraftState::AtExit => self.wait_for_stand(bundle),
      AircraftState::TaxiingToStand => self.taxi_to_stand(bundle),
      AircraftState::AtStand => self.stand_service(bundle),
      AircraftState::PushbackPending => self.pushback_pending(bundle),
      AircraftState::Pushback => self.pushback(bundle),
      AircraftState::TaxiingToRunway => self.taxi_to_runway(bundle),
      AircraftState::WaitingDeparture => self.wait_for_departure(bundle),
      AircraftState::Departing => self.depart(bundle),
    }
  }

  fn wait_for_landing(&mut self, bundle: &mut Bundle) {
    if !self.is_in_queue {
      bundle.runway.enqueue(self.id);
      self.is_in_queue = true;
    }
  }

  fn land(&mut self, bundle: &mut Bundle) {
    self.move_along_path(bundle);

    self.landing_time += 1;
    if self.landing_time >= MAX_LANDING_TICKS {
      self.state = AircraftState::TaxiingToExit;
      self.landing_time = 0;
      bundle.runway.finish_landing();
      tracing::debug!("{} rolled out, taxiing to exit", self.id);
    }
  }

  /// Reserves a runway-exit corridor and plans the roll-out from the active
  /// threshold to the corridor's far end. Called by the runway controller
  /// before the landing clearance is issued.
  pub fn choose_exit(
    &mut self,
    graph: &AirfieldGraph,
    segments: &mut SegmentManager,
    active_threshold: NodeId,
  ) -> Option<Vec<EdgeEnds>> {
    let (granted, edges) =
      segments.request_section(graph, Section::TaxiwayOutbound, self.id);
    if !granted {
      return None;
    }

    let exit = *edges.first()?;
    self.target_node = Some(exit.to);
    let mut path = graph.shortest_path(active_threshold, exit.to);
    if path.len() > 1 {
      path.remove(0);
    }
    self.path = path.into();
    Some(edges)
  }

  fn taxi_to_exit(&mut self, bundle: &mut Bundle) {
    self.move_along_path(bundle);

    if self.current_node == self.target_node {
      self.state = AircraftState::AtExit;
      self.target_node = None;
      self.path.clear();
    }
  }

  /// Waits at the runway exit for the airport deck and a free stand. The
  /// runway and exit reservations are held until the deck comes through, so
  /// the runway stays protected while the aircraft is clear of it.
  fn wait_for_stand(&mut self, bundle: &mut Bundle) {
    let before = self.blocked_edges.clone();
    let (granted, deck_edges) =
      bundle
        .segments
        .request_section(bundle.graph, Section::AirportDeck, self.id);
    if granted && self.choose_stand(bundle) {
      bundle.segments.release_edges(&before, self.id);
      self.blocked_edges = deck_edges;
      self.state = AircraftState::TaxiingToStand;
    } else {
      bundle.segments.release_edges(&deck_edges, self.id);
      self.wait_time += 1;
    }
  }

  /// Picks a random unoccupied stand and plans a path to it.
  fn choose_stand(&mut self, bundle: &mut Bundle) -> bool {
    let current = match self.current_node {
      Some(current) => current,
      None => return false,
    };
    let stands = bundle.graph.nodes_of_kind(NodeKind::Stand);
    let available: Vec<NodeId> = stands
      .into_iter()
      .filter(|stand| !bundle.occupied_stands.contains(stand))
      .collect();
    let Some(&stand) = bundle.rng.sample(&available) else {
      return false;
    };

    self.target_node = Some(stand);
    let mut path = bundle.graph.shortest_path(current, stand);
    if path.len() > 1 {
      path.remove(0);
    }
    self.path = path.into();
    tracing::info!("{} assigned stand {stand}", self.id);
    true
  }

  fn taxi_to_stand(&mut self, bundle: &mut Bundle) {
    self.move_along_path(bundle);

    if self.current_node == self.target_node {
      let held = core::mem::take(&mut self.blocked_edges);
      bundle.segments.release_edges(&held, self.id);
      bundle.segments.remove_from_deck_queue(self.id);
      self.state = AircraftState::AtStand;
      self.stand_time = 0;
      tracing::info!("{} parked", self.id);
    }
  }

  fn stand_service(&mut self, bundle: &mut Bundle) {
    self.stand_time += 1;

    if self.stand_time >= MAX_STAND_TICKS {
      self.state = AircraftState::PushbackPending;
      self.runway_entry_node = Some(bundle.runway.runway_entry_node());
      self.target_node = None;
      self.path.clear();
      tracing::debug!("{} turnaround complete, ready for pushback", self.id);
    }
  }

  /// Needs both the airport deck and a slot on the runway-entry corridor
  /// before the pushback can start. Partial grants are rolled back and
  /// retried next tick.
  fn pushback_pending(&mut self, bundle: &mut Bundle) {
    let (deck_granted, deck_edges) =
      bundle
        .segments
        .request_section(bundle.graph, Section::AirportDeck, self.id);
    let entry_edges = self.choose_runway_entry(bundle.graph, bundle.segments);

    match (deck_granted, entry_edges) {
      (true, Some(entry_edges)) => {
        self.blocked_edges =
          deck_edges.into_iter().chain(entry_edges).collect();
        self.state = AircraftState::Pushback;
        self.kind = AircraftKind::Departure;
        tracing::info!(
          "{} pushing back toward runway entry {}",
          self.id,
          self.runway_entry_node.unwrap_or_default()
        );
      }
      (_, entry_edges) => {
        bundle.segments.release_edges(&deck_edges, self.id);
        if let Some(entry_edges) = entry_edges {
          bundle.segments.release_edges(&entry_edges, self.id);
        }
        self.blocked_edges.clear();
        self.wait_time += 1;
      }
    }
  }

  /// Reserves the runway-entry corridor at the recorded entry node and
  /// plans a path whose final leg traverses it onto the threshold.
  fn choose_runway_entry(
    &mut self,
    graph: &AirfieldGraph,
    segments: &mut SegmentManager,
  ) -> Option<Vec<EdgeEnds>> {
    let entry_node = self.runway_entry_node?;
    let current = self.current_node?;

    for edge in graph.edges_of_kind(EdgeKind::RunwayEntry) {
      if edge.from != entry_node && edge.to != entry_node {
        continue;
      }
      if !segments.request_edge(graph, edge.from, edge.to, self.id) {
        // Corridor full; retry next tick.
        return None;
      }
      self.target_node = Some(entry_node);
      let mut path = graph.shortest_path(current, entry_node);
      if path.len() > 1 {
        path.remove(0);
      }
      self.path = path.into();
      return Some(vec![edge]);
    }
    None
  }

  fn pushback(&mut self, bundle: &mut Bundle) {
    self.move_along_path(bundle);

    if self.current_node == self.target_node {
      let held = core::mem::take(&mut self.blocked_edges);
      bundle.segments.release_edges(&held, self.id);
      bundle.segments.remove_from_deck_queue(self.id);
      self.state = AircraftState::WaitingDeparture;
      self.target_node = None;
      self.path.clear();
      tracing::debug!("{} at runway entry, awaiting departure slot", self.id);
    }
  }

  fn taxi_to_runway(&mut self, bundle: &mut Bundle) {
    self.move_along_path(bundle);

    if self.current_node == self.target_node {
      let held = core::mem::take(&mut self.blocked_edges);
      bundle.segments.release_edges(&held, self.id);
      bundle.segments.remove_from_deck_queue(self.id);
      self.state = AircraftState::WaitingDeparture;
      self.target_node = None;
      self.path.clear();
    }
  }

  fn wait_for_departure(&mut self, bundle: &mut Bundle) {
    if !self.is_in_queue {
      bundle.runway.enqueue(self.id);
      self.is_in_queue = true;
    }
  }

  fn depart(&mut self, bundle: &mut Bundle) {
    self.departure_time += 1;
    self.move_along_path(bundle);

    if self.current_node == self.target_node {
      let held = core::mem::take(&mut self.blocked_edges);
      bundle.segments.release_edges(&held, self.id);
      bundle.runway.finish_departure();
      if let Some(node) = self.current_node {
        bundle.segments.release_node(node, self.id);
      }
      bundle.events.push(Event::Despawn(self.id));
      tracing::info!("{} departed", self.id);
    }
  }

  /// Advances along the path: update the in-flight movement if one is
  /// running, otherwise (re)plan and start the next hop.
  fn move_along_path(&mut self, bundle: &mut Bundle) {
    if self.is_moving {
      self.update_movement(bundle);
      return;
    }

    if self.path.is_empty() {
      if let (Some(current), Some(target)) =
        (self.current_node, self.target_node)
      {
        let mut path = bundle.graph.shortest_path(current, target);
        if path.len() > 1 {
          path.remove(0);
        }
        self.path = path.into();
      }
    }

    let Some(&next) = self.path.front() else {
      return;
    };
    let Some(current) = self.current_node else {
      return;
    };

    self.start_movement(bundle, current, next);
    self.path.pop_front();
    self.wait_time = 0;
  }

  fn start_movement(&mut self, bundle: &mut Bundle, current: NodeId, next: NodeId) {
    let graph = bundle.graph;
    if current != next && !graph.contains_edge(current, next) {
      panic!(
        "{} ({:?}) attempted to move between non-adjacent nodes {current} -> {next}",
        self.id, self.state
      );
    }
    let Some(start) = graph.position_of(current) else {
      return;
    };
    let Some(end) = graph.position_of(next) else {
      return;
    };

    // Runway edges are always covered at runway speed.
    let kind = match graph.edge_kind(current, next) {
      Some(EdgeKind::Runway) => {
        if self.state == AircraftState::Departing {
          MovementKind::Departing
        } else {
          MovementKind::Landing
        }
      }
      _ => movement::movement_kind_for_state(self.state),
    };

    self.movement_duration = movement::duration_ticks(start.distance(end), kind);
    self.movement_start = bundle.now;
    self.is_moving = true;
    self.position.pos = start;
    self.position.progress = 0.0;
    self.position.from = Some(current);
    self.position.to = Some(next);
  }

  fn update_movement(&mut self, bundle: &mut Bundle) {
    let (Some(from), Some(to)) = (self.position.from, self.position.to)
    else {
      return;
    };

    let status = bundle.segments.edge_status(from, to);
    if status.occupied
      && bundle.graph.edge_capacity(from, to) >= status.occupants.len()
    {
      // Shed reservations that are not for the edge under the wheels, then
      // record this edge's slot. A reservation only lands in
      // `blocked_edges` if it really is in the queue.
      let key = edge_key(from, to);
      let stale: Vec<EdgeEnds> = self
        .blocked_edges
        .iter()
        .copied()
        .filter(|edge| edge.key() != key)
        .collect();
      if !stale.is_empty() {
        bundle.segments.release_edges(&stale, self.id);
      }
      if bundle.segments.request_edge(bundle.graph, from, to, self.id) {
        self.blocked_edges = vec![EdgeEnds::new(from, to)];
      } else {
        self.blocked_edges.retain(|edge| edge.key() == key);
      }

      let index = status
        .occupants
        .iter()
        .position(|occupant| *occupant == self.id)
        .unwrap_or(0);
      let limit = hold_progress_limit(index);
      self.hold_progress_limit = Some(limit);
      if self.position.progress >= limit {
        self.wait_time += 1;
        return;
      }
    }

    let elapsed = bundle.now.saturating_sub(self.movement_start) as f32;
    let mut progress =
      (elapsed / self.movement_duration.max(1) as f32).clamp(0.0, 1.0);
    if let Some(limit) = self.hold_progress_limit {
      progress = progress.min(limit);
    }

    if let (Some(start), Some(end)) =
      (bundle.graph.position_of(from), bundle.graph.position_of(to))
    {
      self.position.pos = movement::interpolate(start, end, progress);
      self.position.progress = progress;
    }

    if progress >= 1.0 {
      self.finish_movement(bundle.graph);
    }
  }

  fn finish_movement(&mut self, graph: &AirfieldGraph) {
    if let Some(to) = self.position.to {
      self.current_node = Some(to);
      if let Some(pos) = graph.position_of(to) {
        self.position.pos = pos;
      }
    }
    self.is_moving = false;
    self.position.progress = 0.0;
    self.position.from = self.current_node;
    self.position.to = None;
  }
}
