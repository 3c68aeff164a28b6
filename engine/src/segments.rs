use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::{
  aircraft::AircraftId,
  graph::{AirfieldGraph, EdgeEnds, EdgeKind, NodeId, edge_key},
};

/// A named collection of edges reserved together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
  /// All runway edges. All-or-nothing.
  Runway,
  /// One runway-entry corridor, first that has a free slot.
  TaxiwayInbound,
  /// One runway-exit corridor, first that has a free slot.
  TaxiwayOutbound,
  /// Every apron-link, stand-link and taxiway edge, gated by the apron
  /// fairness queue.
  AirportDeck,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeStatus {
  pub occupied: bool,
  pub occupants: Vec<AircraftId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeStatus {
  pub occupied: bool,
  pub owner: Option<AircraftId>,
}

/// Arbitrates access to shared airfield resources. The sole writer of
/// reservation state; aircraft and the runway controller go through the
/// operations below and never touch the tables.
#[derive(Debug, Clone, Default)]
pub struct SegmentManager {
  edge_reservations: HashMap<(NodeId, NodeId), VecDeque<AircraftId>>,
  node_reservations: HashMap<NodeId, AircraftId>,
  deck_queue: VecDeque<AircraftId>,
}

impl SegmentManager {
  pub fn new() -> Self {
    Self::default()
  }

  /// Grants a slot on the edge queue, or returns false untouched when the
  /// edge is at capacity. Idempotent for a holder.
  pub fn request_edge(
    &mut self,
    graph: &AirfieldGraph,
    u: NodeId,
    v: NodeId,
    id: AircraftId,
  ) -> bool {
    let queue = self.edge_reservations.entry(edge_key(u, v)).or_default();
    if queue.contains(&id) {
      return true;
    }
    if queue.len() < graph.edge_capacity(u, v) {
      queue.push_back(id);
      return true;
    }
    false
  }

  /// Removes the aircraft's slot; a no-op for non-holders. Empty queues are
  /// dropped.
  pub fn release_edge(&mut self, u: NodeId, v: NodeId, id: AircraftId) {
    let key = edge_key(u, v);
    if let Some(queue) = self.edge_reservations.get_mut(&key) {
      queue.retain(|held| *held != id);
      if queue.is_empty() {
        self.edge_reservations.remove(&key);
      }
    }
  }

  pub fn release_edges(&mut self, edges: &[EdgeEnds], id: AircraftId) {
    for edge in edges {
      self.release_edge(edge.from, edge.to, id);
    }
  }

  /// Node slots have capacity one. Idempotent for the owner.
  pub fn request_node(&mut self, node: NodeId, id: AircraftId) -> bool {
    match self.node_reservations.get(&node) {
      Some(owner) if *owner != id => false,
      _ => {
        self.node_reservations.insert(node, id);
        true
      }
    }
  }

  pub fn release_node(&mut self, node: NodeId, id: AircraftId) {
    if self.node_reservations.get(&node) == Some(&id) {
      self.node_reservations.remove(&node);
    }
  }

  /// Attempts a macro-section grant. Returns the granted edges; on failure
  /// every partial reservation has been rolled back and the list is empty.
  /// The caller owns the granted edges and must release them when done.
  pub fn request_section(
    &mut self,
    graph: &AirfieldGraph,
    section: Section,
    id: AircraftId,
  ) -> (bool, Vec<EdgeEnds>) {
    match section {
      Section::Runway => {
        self.request_all(graph, graph.edges_of_kind(EdgeKind::Runway), id)
      }
      Section::TaxiwayInbound => {
        self.request_first(graph, graph.edges_of_kind(EdgeKind::RunwayEntry), id)
      }
      Section::TaxiwayOutbound => {
        self.request_first(graph, graph.edges_of_kind(EdgeKind::RunwayExit), id)
      }
      Section::AirportDeck => self.request_deck(graph, id),
    }
  }

  fn request_all(
    &mut self,
    graph: &AirfieldGraph,
    edges: Vec<EdgeEnds>,
    id: AircraftId,
  ) -> (bool, Vec<EdgeEnds>) {
    let mut granted = Vec::new();
    for edge in edges {
      if self.request_edge(graph, edge.from, edge.to, id) {
        granted.push(edge);
      } else {
        tracing::debug!(
          "{} denied edge {} -> {}, rolling back {} grants",
          id,
          edge.from,
          edge.to,
          granted.len()
        );
        self.release_edges(&granted, id);
        return (false, Vec::new());
      }
    }
    (true, granted)
  }

  fn request_first(
    &mut self,
    graph: &AirfieldGraph,
    edges: Vec<EdgeEnds>,
    id: AircraftId,
  ) -> (bool, Vec<EdgeEnds>) {
    for edge in edges {
      if self.request_edge(graph, edge.from, edge.to, id) {
        return (true, vec![edge]);
      }
    }
    (false, Vec::new())
  }

  /// The airport deck subsumes most of the taxi network, so grants are
  /// head-of-line only: without the FIFO gate, two aircraft with
  /// overlapping demands can starve each other indefinitely.
  fn request_deck(
    &mut self,
    graph: &AirfieldGraph,
    id: AircraftId,
  ) -> (bool, Vec<EdgeEnds>) {
    if !self.deck_queue.contains(&id) {
      self.deck_queue.push_back(id);
      tracing::debug!("{} joined the apron queue", id);
    }
    if self.deck_queue.front() != Some(&id) {
      return (false, Vec::new());
    }

    let mut edges = graph.edges_of_kind(EdgeKind::ApronLink);
    edges.extend(graph.edges_of_kind(EdgeKind::StandLink));
    edges.extend(graph.edges_of_kind(EdgeKind::Taxiway));
    self.request_all(graph, edges, id)
  }

  /// Drops the aircraft from the apron queue wherever it sits.
  pub fn remove_from_deck_queue(&mut self, id: AircraftId) -> bool {
    let before = self.deck_queue.len();
    self.deck_queue.retain(|queued| *queued != id);
    before != self.deck_queue.len()
  }

  pub fn deck_queue(&self) -> &VecDeque<AircraftId> {
    &self.deck_queue
  }

  /// Snapshot of an edge's occupants in queue order.
  pub fn edge_status(&self, u: NodeId, v: NodeId) -> EdgeStatus {
    let occupants: Vec<AircraftId> = self
      .edge_reservations
      .get(&edge_key(u, v))
      .map(|queue| queue.iter().copied().collect())
      .unwrap_or_default();
    EdgeStatus {
      occupied: !occupants.is_empty(),
      occupants,
    }
  }

  pub fn node_status(&self, node: NodeId) -> NodeStatus {
    let owner = self.node_reservations.get(&node).copied();
    NodeStatus {
      occupied: owner.is_some(),
      owner,
    }
  }

  /// Per-tick upkeep hook. Reservations are released explicitly by their
  /// holders; nothing ages out.
  pub fn cleanup(&mut self, _now: u64) {}
}
