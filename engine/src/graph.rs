use std::{
  collections::HashMap,
  fs::File,
  io,
  path::{Path, PathBuf},
};

use glam::Vec2;
use itertools::{Itertools, MinMaxResult};
use petgraph::{
  algo::astar,
  graph::{DiGraph, NodeIndex, UnGraph},
  visit::EdgeRef as _,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type NodeId = u32;

/// Threshold of runway 07. Node ids 1 and 2 are fixed by the topology
/// contract.
pub const RWY_07_NODE: NodeId = 1;
/// Threshold of runway 25.
pub const RWY_25_NODE: NodeId = 2;

/// Default capacity of runway entry/exit corridors, which hold aircraft
/// nose-to-tail.
pub const CORRIDOR_CAPACITY: usize = 5;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
  #[serde(rename = "runway_thr")]
  RunwayThreshold,
  Taxiway,
  Apron,
  Stand,
  Connector,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
  Runway,
  RunwayEntry,
  RunwayExit,
  Taxiway,
  ApronLink,
  StandLink,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
  pub id: NodeId,
  pub kind: NodeKind,
  pub name: String,
  pub pos: Vec2,
  pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
  pub from: NodeId,
  pub to: NodeId,
  pub kind: EdgeKind,
  pub length: f32,
  /// Explicit capacity override from the topology file; the effective value
  /// comes from [`AirfieldGraph::edge_capacity`].
  pub capacity: Option<u32>,
  pub description: String,
  pub holding_allowed: bool,
}

/// An edge named by its endpoints, in stored orientation. Reservations are
/// keyed orientation-agnostically via [`EdgeEnds::key`]; direction matters
/// only to movement.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub struct EdgeEnds {
  pub from: NodeId,
  pub to: NodeId,
}

impl EdgeEnds {
  pub fn new(from: NodeId, to: NodeId) -> Self {
    Self { from, to }
  }

  pub fn key(&self) -> (NodeId, NodeId) {
    edge_key(self.from, self.to)
  }
}

/// Canonical reservation key for an edge, independent of orientation.
pub fn edge_key(u: NodeId, v: NodeId) -> (NodeId, NodeId) {
  if u <= v { (u, v) } else { (v, u) }
}

#[derive(Debug, Error)]
pub enum TopologyError {
  #[error("failed to read {path:?}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("malformed row in {path:?}: {source}")]
  Malformed {
    path: PathBuf,
    #[source]
    source: csv::Error,
  },
}

#[derive(Debug, Deserialize)]
struct NodeRow {
  id: NodeId,
  #[serde(rename = "type")]
  kind: NodeKind,
  name: String,
  x: f32,
  y: f32,
  #[serde(default)]
  notes: String,
}

#[derive(Debug, Deserialize)]
struct EdgeRow {
  from: NodeId,
  to: NodeId,
  #[serde(rename = "type")]
  kind: EdgeKind,
  length: f32,
  #[serde(default)]
  desc: String,
  #[serde(default)]
  capacity: Option<u32>,
}

/// The airfield topology: an undirected attribute graph plus a directed
/// routing view. Every edge is routable in both directions today; one-way
/// restrictions would live in the routing view alone.
#[derive(Debug, Clone, Default)]
pub struct AirfieldGraph {
  attrs: UnGraph<NodeData, EdgeData>,
  routing: DiGraph<NodeId, f32>,
  nodes: HashMap<NodeId, NodeIndex>,
  routing_nodes: HashMap<NodeId, NodeIndex>,
}

impl AirfieldGraph {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_csv_files(
    nodes_file: impl AsRef<Path>,
    edges_file: impl AsRef<Path>,
  ) -> Result<Self, TopologyError> {
    let nodes_file = nodes_file.as_ref();
    let edges_file = edges_file.as_ref();

    let mut graph = Self::new();

    let nodes = File::open(nodes_file).map_err(|source| TopologyError::Io {
      path: nodes_file.into(),
      source,
    })?;
    graph
      .load_nodes(nodes)
      .map_err(|source| TopologyError::Malformed {
        path: nodes_file.into(),
        source,
      })?;

    let edges = File::open(edges_file).map_err(|source| TopologyError::Io {
      path: edges_file.into(),
      source,
    })?;
    graph
      .load_edges(edges)
      .map_err(|source| TopologyError::Malformed {
        path: edges_file.into(),
        source,
      })?;

    Ok(graph)
  }

  /// Loads a topology from in-memory readers. Used by tests; the file-based
  /// loader adds path context to errors.
  pub fn from_csv_readers<N, E>(nodes: N, edges: E) -> Result<Self, csv::Error>
  where
    N: io::Read,
    E: io::Read,
  {
    let mut graph = Self::new();
    graph.load_nodes(nodes)?;
    graph.load_edges(edges)?;
    Ok(graph)
  }

  fn load_nodes<R: io::Read>(&mut self, reader: R) -> Result<(), csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
      .trim(csv::Trim::All)
      .from_reader(reader);
    for row in reader.deserialize() {
      let row: NodeRow = row?;
      self.add_node(NodeData {
        id: row.id,
        kind: row.kind,
        name: row.name,
        pos: Vec2::new(row.x, row.y),
        notes: row.notes,
      });
    }
    Ok(())
  }

  fn load_edges<R: io::Read>(&mut self, reader: R) -> Result<(), csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
      .trim(csv::Trim::All)
      .from_reader(reader);
    for row in reader.deserialize() {
      let row: EdgeRow = row?;
      self.add_edge(row.from, row.to, row.kind, row.length, row.capacity, &row.desc);
    }
    Ok(())
  }

  pub fn add_node(&mut self, node: NodeData) {
    let id = node.id;
    let index = self.attrs.add_node(node);
    self.nodes.insert(id, index);
    let routing_index = self.routing.add_node(id);
    self.routing_nodes.insert(id, routing_index);
  }

  /// Inserts an edge, skipping it when either endpoint is unknown. Edges
  /// enter the routing view in both directions.
  pub fn add_edge(
    &mut self,
    from: NodeId,
    to: NodeId,
    kind: EdgeKind,
    length: f32,
    capacity: Option<u32>,
    description: &str,
  ) -> bool {
    let (Some(&a), Some(&b)) = (self.nodes.get(&from), self.nodes.get(&to))
    else {
      tracing::warn!("skipping edge {from} -> {to}: unknown endpoint");
      return false;
    };

    let description = description.trim().to_lowercase();
    let holding_allowed = derive_holding_allowed(kind, &description);
    self.attrs.add_edge(
      a,
      b,
      EdgeData {
        from,
        to,
        kind,
        length,
        capacity,
        description,
        holding_allowed,
      },
    );

    let ra = self.routing_nodes[&from];
    let rb = self.routing_nodes[&to];
    self.routing.add_edge(ra, rb, length);
    self.routing.add_edge(rb, ra, length);

    true
  }

  pub fn node(&self, id: NodeId) -> Option<&NodeData> {
    self.nodes.get(&id).map(|&index| &self.attrs[index])
  }

  pub fn position_of(&self, id: NodeId) -> Option<Vec2> {
    self.node(id).map(|node| node.pos)
  }

  pub fn neighbors(&self, id: NodeId) -> Vec<NodeId> {
    match self.nodes.get(&id) {
      Some(&index) => self
        .attrs
        .neighbors(index)
        .map(|neighbor| self.attrs[neighbor].id)
        .collect(),
      None => Vec::new(),
    }
  }

  pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
    self
      .attrs
      .node_weights()
      .filter(|node| node.kind == kind)
      .map(|node| node.id)
      .collect()
  }

  pub fn stand_nodes(&self) -> Vec<NodeId> {
    self.nodes_of_kind(NodeKind::Stand)
  }

  /// All edges, in insertion order.
  pub fn edges(&self) -> Vec<EdgeEnds> {
    self
      .attrs
      .edge_weights()
      .map(|edge| EdgeEnds::new(edge.from, edge.to))
      .collect()
  }

  /// Edges of one kind, in insertion order. This order doubles as the fixed
  /// acquisition order for macro-section grants.
  pub fn edges_of_kind(&self, kind: EdgeKind) -> Vec<EdgeEnds> {
    self
      .attrs
      .edge_weights()
      .filter(|edge| edge.kind == kind)
      .map(|edge| EdgeEnds::new(edge.from, edge.to))
      .collect()
  }

  pub fn edge(&self, u: NodeId, v: NodeId) -> Option<&EdgeData> {
    let a = *self.nodes.get(&u)?;
    let b = *self.nodes.get(&v)?;
    let index = self.attrs.find_edge(a, b)?;
    Some(&self.attrs[index])
  }

  pub fn contains_edge(&self, u: NodeId, v: NodeId) -> bool {
    self.edge(u, v).is_some()
  }

  pub fn edge_kind(&self, u: NodeId, v: NodeId) -> Option<EdgeKind> {
    self.edge(u, v).map(|edge| edge.kind)
  }

  pub fn edge_length(&self, u: NodeId, v: NodeId) -> f32 {
    self.edge(u, v).map(|edge| edge.length).unwrap_or(0.0)
  }

  pub fn holding_allowed(&self, u: NodeId, v: NodeId) -> bool {
    self
      .edge(u, v)
      .map(|edge| edge.holding_allowed)
      .unwrap_or(false)
  }

  /// Effective capacity: the explicit override when present and positive,
  /// otherwise derived from the edge kind.
  pub fn edge_capacity(&self, u: NodeId, v: NodeId) -> usize {
    match self.edge(u, v) {
      Some(edge) => match edge.capacity {
        Some(capacity) if capacity > 0 => capacity as usize,
        _ => match edge.kind {
          EdgeKind::RunwayEntry | EdgeKind::RunwayExit => CORRIDOR_CAPACITY,
          _ => 1,
        },
      },
      None => 1,
    }
  }

  /// Length-weighted shortest path over the directed routing view. Returns
  /// an empty path when either node is unknown or no route exists.
  pub fn shortest_path(&self, start: NodeId, end: NodeId) -> Vec<NodeId> {
    let (Some(&s), Some(&e)) =
      (self.routing_nodes.get(&start), self.routing_nodes.get(&end))
    else {
      return Vec::new();
    };

    match astar(&self.routing, s, |node| node == e, |edge| *edge.weight(), |_| {
      0.0
    }) {
      Some((_, path)) => {
        path.into_iter().map(|index| self.routing[index]).collect()
      }
      None => Vec::new(),
    }
  }

  pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
    let (min_x, max_x) =
      match self.attrs.node_weights().map(|node| node.pos.x).minmax() {
        MinMaxResult::NoElements => return None,
        MinMaxResult::OneElement(x) => (x, x),
        MinMaxResult::MinMax(a, b) => (a, b),
      };
    let (min_y, max_y) =
      match self.attrs.node_weights().map(|node| node.pos.y).minmax() {
        MinMaxResult::NoElements => return None,
        MinMaxResult::OneElement(y) => (y, y),
        MinMaxResult::MinMax(a, b) => (a, b),
      };

    Some((min_x, max_x, min_y, max_y))
  }

  pub fn node_count(&self) -> usize {
    self.attrs.node_count()
  }

  pub fn edge_count(&self) -> usize {
    self.attrs.edge_count()
  }

  pub fn edge_counts_by_kind(&self) -> HashMap<EdgeKind, usize> {
    self.attrs.edge_weights().map(|edge| edge.kind).counts()
  }
}

/// Whether aircraft may hold (queue) on an edge. Runways and their exits
/// must stay clear; taxiway B is a no-holding corridor by airfield rule.
fn derive_holding_allowed(kind: EdgeKind, description: &str) -> bool {
  match kind {
    EdgeKind::StandLink | EdgeKind::RunwayEntry => true,
    EdgeKind::Runway | EdgeKind::RunwayExit | EdgeKind::ApronLink => false,
    EdgeKind::Taxiway => !description.contains("taxiway b"),
  }
}
