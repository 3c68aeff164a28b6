use std::collections::HashSet;

use engine::{
  aircraft::{
    Aircraft, AircraftId, AircraftKind, AircraftState, hold_progress_limit,
  },
  graph::{AirfieldGraph, EdgeEnds, EdgeKind, NodeData, NodeKind},
  runway::{RunwayController, WindDirection},
  segments::SegmentManager,
  sim::{Bundle, SimConfig, Simulation},
};
use glam::Vec2;
use internment::Intern;
use turborand::{SeededCore, rng::Rng};

fn node(id: u32, kind: NodeKind, name: &str, x: f32, y: f32) -> NodeData {
  NodeData {
    id,
    kind,
    name: name.into(),
    pos: Vec2::new(x, y),
    notes: String::new(),
  }
}

/// A small airfield: one runway between thresholds 1 and 2, an exit
/// corridor on the east end, two stands off the apron, and an entry
/// corridor back onto threshold 2.
///
/// ```text
///   1 ========================== 2     runway
///                           3  /  \    exit (2,3), entry (8,2)
///                        4 --- 8
///                      5
///                    6   7             stands
/// ```
fn test_airfield() -> AirfieldGraph {
  let mut graph = AirfieldGraph::new();
  graph.add_node(node(1, NodeKind::RunwayThreshold, "RWY_07", 0.0, 0.0));
  graph.add_node(node(2, NodeKind::RunwayThreshold, "RWY_25", 10.0, 0.0));
  graph.add_node(node(3, NodeKind::Taxiway, "EXIT_J", 9.0, 2.0));
  graph.add_node(node(4, NodeKind::Taxiway, "TWY_A", 6.0, 3.0));
  graph.add_node(node(5, NodeKind::Apron, "APRON", 3.0, 4.0));
  graph.add_node(node(6, NodeKind::Stand, "S1", 2.0, 6.0));
  graph.add_node(node(7, NodeKind::Stand, "S2", 4.0, 6.0));
  graph.add_node(node(8, NodeKind::Taxiway, "ENTRY_J", 8.0, 1.0));

  graph.add_edge(1, 2, EdgeKind::Runway, 10.0, None, "runway 07/25");
  graph.add_edge(2, 3, EdgeKind::RunwayExit, 2.2, None, "exit east");
  graph.add_edge(3, 4, EdgeKind::Taxiway, 3.2, None, "taxiway a");
  graph.add_edge(4, 5, EdgeKind::ApronLink, 3.2, None, "apron link");
  graph.add_edge(5, 6, EdgeKind::StandLink, 2.2, None, "stand one");
  graph.add_edge(5, 7, EdgeKind::StandLink, 2.2, None, "stand two");
  graph.add_edge(4, 8, EdgeKind::Taxiway, 2.8, None, "taxiway c");
  graph.add_edge(8, 2, EdgeKind::RunwayEntry, 2.2, None, "entry east");
  graph
}

fn sim_with(arrivals: usize, wind: WindDirection, seed: u64) -> Simulation {
  let config = SimConfig {
    num_arriving_airplanes: arrivals,
    wind_direction: wind,
    arrival_rate: 0.0,
    seed,
    ..SimConfig::default()
  };
  Simulation::new(test_airfield(), &config)
}

/// The universal invariants of the coordination layer, checked between
/// ticks.
fn assert_invariants(sim: &Simulation) {
  for edge in sim.graph.edges() {
    let status = sim.segments.edge_status(edge.from, edge.to);
    let capacity = sim.graph.edge_capacity(edge.from, edge.to);
    assert!(
      status.occupants.len() <= capacity,
      "edge {edge:?} over capacity: {:?}",
      status.occupants
    );
    let unique: HashSet<AircraftId> =
      status.occupants.iter().copied().collect();
    assert_eq!(
      unique.len(),
      status.occupants.len(),
      "duplicate occupants on {edge:?}"
    );
  }

  for plane in &sim.airplanes {
    for edge in &plane.blocked_edges {
      let status = sim.segments.edge_status(edge.from, edge.to);
      assert!(
        status.occupants.contains(&plane.id),
        "{} holds {edge:?} without a reservation",
        plane.id
      );
    }

    if matches!(
      plane.state,
      AircraftState::Landing | AircraftState::Departing
    ) {
      assert!(sim.runway.is_busy, "{} on the runway while idle", plane.id);
      assert_eq!(sim.runway.current_airplane, Some(plane.id));
    }

    if plane.state == AircraftState::AtStand {
      assert!(plane.blocked_edges.is_empty());
      for edge in sim.graph.edges() {
        let status = sim.segments.edge_status(edge.from, edge.to);
        assert!(
          !status.occupants.contains(&plane.id),
          "parked {} still reserves {edge:?}",
          plane.id
        );
      }
    }
  }

  for id in sim.segments.deck_queue() {
    let plane = sim.aircraft(*id).expect("queued aircraft exists");
    assert!(
      matches!(
        plane.state,
        AircraftState::AtExit
          | AircraftState::TaxiingToStand
          | AircraftState::PushbackPending
          | AircraftState::Pushback
      ),
      "{} queued for the apron in state {:?}",
      plane.id,
      plane.state
    );
  }
}

fn run_until(
  sim: &mut Simulation,
  max_ticks: u64,
  predicate: impl Fn(&Simulation) -> bool,
) -> bool {
  for _ in 0..max_ticks {
    sim.step();
    assert_invariants(sim);
    if predicate(sim) {
      return true;
    }
  }
  false
}

// Scenario: a single arrival on an empty field walks the inbound state
// sequence and ends parked with nothing reserved.
#[test]
fn single_arrival_reaches_a_stand() {
  let mut sim = sim_with(1, WindDirection::Rwy07, 7);
  let id = sim.airplanes[0].id;

  let mut seen: Vec<AircraftState> = vec![sim.airplanes[0].state];
  let mut parked = false;
  for _ in 0..200 {
    sim.step();
    assert_invariants(&sim);
    let plane = sim.aircraft(id).expect("arrival never despawns");
    if seen.last() != Some(&plane.state) {
      seen.push(plane.state);
    }
    if plane.state == AircraftState::AtStand {
      parked = true;
      break;
    }
  }
  assert!(parked, "arrival never reached a stand; saw {seen:?}");
  assert_eq!(seen, vec![
    AircraftState::WaitingLanding,
    AircraftState::Landing,
    AircraftState::TaxiingToExit,
    AircraftState::AtExit,
    AircraftState::TaxiingToStand,
    AircraftState::AtStand,
  ]);

  let plane = sim.aircraft(id).expect("arrival parked");
  let stand = plane.current_node.expect("parked on a node");
  assert!(sim.graph.stand_nodes().contains(&stand));
  assert!(plane.blocked_edges.is_empty());
  assert!(!sim.segments.deck_queue().contains(&id));
}

// Scenario: two arrivals, one runway. Admission is one at a time and the
// second may not pass the first.
#[test]
fn two_arrivals_share_one_runway() {
  let mut sim = sim_with(2, WindDirection::Rwy07, 11);
  let first = sim.airplanes[0].id;
  let second = sim.airplanes[1].id;

  let mut first_parked = false;
  let mut second_parked = false;
  for _ in 0..400 {
    sim.step();
    assert_invariants(&sim);

    let landing = sim
      .airplanes
      .iter()
      .filter(|plane| plane.state == AircraftState::Landing)
      .count();
    assert!(landing <= 1, "two aircraft landing at once");

    let a = sim.aircraft(first).expect("first arrival stays");
    let b = sim.aircraft(second).expect("second arrival stays");
    if a.state == AircraftState::Landing {
      assert_eq!(b.state, AircraftState::WaitingLanding);
    }

    first_parked |= a.state == AircraftState::AtStand;
    second_parked |= b.state == AircraftState::AtStand;
    if first_parked && second_parked {
      break;
    }
  }
  assert!(first_parked, "first arrival never parked");
  assert!(second_parked, "second arrival never parked");

  // The second aircraft was assigned the stand the first is not sitting on.
  let a_stand = sim.aircraft(first).and_then(|plane| plane.current_node);
  let b_stand = sim.aircraft(second).and_then(|plane| plane.current_node);
  assert_ne!(a_stand, b_stand, "both aircraft parked on the same stand");
}

// Scenario: the runway-entry corridor holds several departures nose to
// tail, with stepped hold-progress limits.
#[test]
fn entry_corridor_queues_three_departures() {
  let graph = test_airfield();
  let mut segments = SegmentManager::new();
  let ids: Vec<AircraftId> = ["AAL0001", "SKW0002", "JBL0003"]
    .iter()
    .map(|callsign| Intern::from_ref(*callsign))
    .collect();

  for id in &ids {
    assert!(segments.request_edge(&graph, 8, 2, *id));
  }
  assert_eq!(segments.edge_status(8, 2).occupants, ids);

  let limits: Vec<f32> = (0..3).map(hold_progress_limit).collect();
  assert!((limits[0] - 1.0).abs() < 1e-5);
  assert!((limits[1] - 0.81).abs() < 1e-5);
  assert!((limits[2] - 0.62).abs() < 1e-5);
}

// A trailing aircraft on a shared edge advances only to its hold-progress
// limit, and completes the hop once the leader vacates.
#[test]
fn trailing_aircraft_holds_short_of_the_leader() {
  let graph = test_airfield();
  let mut segments = SegmentManager::new();
  let mut runway = RunwayController::new(WindDirection::Rwy07);
  let mut events = Vec::new();
  let mut rng = Rng::with_seed(1);

  let leader = Intern::from_ref("AAL0001");
  let trailer = Intern::from_ref("BAW0002");
  assert!(segments.request_edge(&graph, 8, 2, leader));
  assert!(segments.request_edge(&graph, 8, 2, trailer));

  let mut plane = Aircraft::arrival(trailer);
  plane.kind = AircraftKind::Departure;
  plane.state = AircraftState::Pushback;
  plane.current_node = Some(8);
  plane.target_node = Some(2);
  plane.blocked_edges = vec![EdgeEnds::new(8, 2)];
  plane.is_moving = true;
  plane.movement_start = 0;
  plane.movement_duration = 4;
  plane.position.from = Some(8);
  plane.position.to = Some(2);

  for now in 1..=40 {
    let mut bundle = Bundle {
      graph: &graph,
      segments: &mut segments,
      runway: &mut runway,
      occupied_stands: Vec::new(),
      now,
      rng: &mut rng,
      events: &mut events,
    };
    plane.step(&mut bundle);
  }

  assert!(plane.is_moving, "trailer should still be held on the edge");
  assert_eq!(plane.hold_progress_limit, Some(hold_progress_limit(1)));
  assert!((plane.position.progress - hold_progress_limit(1)).abs() < 1e-5);

  segments.release_edge(8, 2, leader);
  for now in 41..=80 {
    let mut bundle = Bundle {
      graph: &graph,
      segments: &mut segments,
      runway: &mut runway,
      occupied_stands: Vec::new(),
      now,
      rng: &mut rng,
      events: &mut events,
    };
    plane.step(&mut bundle);
  }

  assert_eq!(plane.current_node, Some(2));
  assert_eq!(plane.state, AircraftState::WaitingDeparture);
  assert!(!segments.edge_status(8, 2).occupied);
}

// Scenario: the full lifecycle. A single arrival lands, parks, pushes
// back, departs and despawns with every resource released.
#[test]
fn full_lifecycle_departs_cleanly() {
  let mut sim = sim_with(1, WindDirection::Rwy07, 5);
  let id = sim.airplanes[0].id;

  let departed = run_until(&mut sim, 400, |sim| sim.aircraft(id).is_none());
  assert!(departed, "aircraft never completed its departure");

  assert!(sim.airplanes.is_empty());
  assert_eq!(sim.departures_completed, 1);
  assert!(!sim.runway.is_busy);
  assert!(!sim.segments.deck_queue().contains(&id));
  for edge in sim.graph.edges() {
    let status = sim.segments.edge_status(edge.from, edge.to);
    assert!(
      !status.occupants.contains(&id),
      "departed aircraft still reserves {edge:?}"
    );
  }
}

// Scenario: wind "25" mirrors the runway; the arrival touches down on
// threshold 2.
#[test]
fn wind_flip_lands_on_the_opposite_threshold() {
  let mut sim = sim_with(1, WindDirection::Rwy25, 9);
  assert_eq!(sim.runway.active_threshold(), 2);
  assert_eq!(sim.runway.runway_entry_node(), 1);

  let id = sim.airplanes[0].id;
  let landing = run_until(&mut sim, 50, |sim| {
    sim
      .aircraft(id)
      .is_some_and(|plane| plane.state == AircraftState::Landing)
  });
  assert!(landing);

  let plane = sim.aircraft(id).expect("arrival exists");
  assert_eq!(plane.current_node, Some(2));
  assert_eq!(plane.position(), sim.graph.position_of(2).unwrap());

  let parked = run_until(&mut sim, 200, |sim| {
    sim
      .aircraft(id)
      .is_some_and(|plane| plane.state == AircraftState::AtStand)
  });
  assert!(parked);
}

// Identical seeds and topology produce identical traces.
#[test]
fn runs_are_deterministic_for_a_fixed_seed() {
  let config = SimConfig {
    num_arriving_airplanes: 3,
    wind_direction: WindDirection::Rwy07,
    arrival_rate: 0.2,
    seed: 1234,
    ..SimConfig::default()
  };
  let mut a = Simulation::new(test_airfield(), &config);
  let mut b = Simulation::new(test_airfield(), &config);

  for _ in 0..150 {
    a.step();
    b.step();
    assert_invariants(&a);
  }

  assert_eq!(a.step_count, b.step_count);
  assert_eq!(a.airplanes, b.airplanes);
  assert_eq!(a.runway.runway_queue, b.runway.runway_queue);
  assert_eq!(a.departures_completed, b.departures_completed);
}
