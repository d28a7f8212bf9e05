use crate::core::user::UserId;
use crate::graph::scc::ComponentIndex;
use crate::graph::transfer_graph::{EdgeIx, NodeIx, TransferEdge, TransferGraph};
use log::debug;
use rust_decimal::Decimal;

/// How many DFS steps run between two checks of the stop condition.
const STOP_CHECK_INTERVAL: usize = 256;

/// A closed loop of transfers that moves forward in time.
#[derive(Debug, Clone)]
pub struct TemporalCycle {
    /// Users in hop order, starting at the origin. The last hop returns to
    /// `users[0]`.
    pub users: Vec<UserId>,
    /// Edges in hop order; `hops[i].at <= hops[i + 1].at`.
    pub hops: Vec<TransferEdge>,
}

impl TemporalCycle {
    /// Number of hops (and distinct users) in the loop.
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Credits moved around the loop, summed over every hop.
    pub fn total_amount(&self) -> Decimal {
        self.hops.iter().map(|h| h.amount).sum()
    }
}

/// Output of [`find_temporal_cycles`].
#[derive(Debug, Clone, Default)]
pub struct CycleSearchResult {
    pub cycles: Vec<TemporalCycle>,
    /// The stop condition fired before the search space was exhausted.
    pub interrupted: bool,
    /// Edges examined, for logging.
    pub expansions: usize,
}

/// Find time-ordered transfer loops of at most `max_depth` hops.
///
/// # Algorithm
///
/// Iterative deepening over the loop length `L = 2..=max_depth`. For each
/// `L`, every origin (in user-id order) runs a bounded depth-first search
/// with an explicit stack, an on-path set and a depth counter. A branch is
/// cut when:
///
/// - its depth reaches `L` without closing on the origin,
/// - the next edge is older than the edge that reached the current node,
/// - the next node is already on the path or outside the origin's strongly
///   connected component,
/// - the users on the path already include every user of a reported loop.
///
/// Every loop closing at exactly `L` hops is reported unless its users
/// contain those of a loop reported before it. Shorter loops therefore win
/// over the larger loops that encompass them, a set of users is reported at
/// most once, and a user may still appear in several loops that do not
/// contain one another (a hub washing credits with two partners).
///
/// `should_stop` is polled periodically; when it returns true the search
/// ends and the loops found so far are returned with `interrupted` set.
pub fn find_temporal_cycles(
    graph: &TransferGraph,
    max_depth: usize,
    mut should_stop: impl FnMut() -> bool,
) -> CycleSearchResult {
    let mut result = CycleSearchResult::default();
    if graph.edge_count() < 2 || max_depth < 2 {
        return result;
    }

    let components = ComponentIndex::build(graph);
    if components.cyclic_count() == 0 {
        return result;
    }

    let origins: Vec<NodeIx> = graph
        .nodes_by_user()
        .into_iter()
        .filter(|&n| components.component_of(n).is_some())
        .collect();
    let mut search = Search::new(graph, &components);

    for target in 2..=max_depth {
        for &origin in &origins {
            let stopped = search.run(origin, target, &mut should_stop, |path| {
                let cycle = build_cycle(graph, origin, path);
                debug!(
                    "temporal cycle of {} hops from {} moving {}",
                    cycle.len(),
                    graph.user(origin),
                    cycle.total_amount()
                );
                result.cycles.push(cycle);
            });
            if stopped {
                result.interrupted = true;
                result.expansions = search.expansions;
                return result;
            }
        }
    }

    result.expansions = search.expansions;
    result
}

struct Frame {
    node: NodeIx,
    cursor: usize,
}

/// Reusable buffers for the per-origin DFS.
struct Search<'g> {
    graph: &'g TransferGraph,
    components: &'g ComponentIndex,
    on_path: Vec<bool>,
    path: Vec<EdgeIx>,
    stack: Vec<Frame>,
    /// Node sets of every loop reported so far.
    reported: Vec<Vec<NodeIx>>,
    expansions: usize,
}

impl<'g> Search<'g> {
    fn new(graph: &'g TransferGraph, components: &'g ComponentIndex) -> Self {
        Self {
            graph,
            components,
            on_path: vec![false; graph.node_count()],
            path: Vec::new(),
            stack: Vec::new(),
            reported: Vec::new(),
            expansions: 0,
        }
    }

    fn reset(&mut self) {
        for frame in self.stack.drain(..) {
            self.on_path[frame.node] = false;
        }
        self.path.clear();
    }

    /// The path's users, plus `extra`, include all users of a reported loop.
    fn covers_reported(&self, extra: Option<NodeIx>) -> bool {
        self.reported.iter().any(|nodes| {
            nodes
                .iter()
                .all(|&n| self.on_path[n] || Some(n) == extra)
        })
    }

    /// Enumerate loops of exactly `target` hops through `origin`, handing
    /// each accepted one to `report`. Returns true if `should_stop` fired.
    fn run(
        &mut self,
        origin: NodeIx,
        target: usize,
        should_stop: &mut impl FnMut() -> bool,
        mut report: impl FnMut(&[EdgeIx]),
    ) -> bool {
        self.reset();
        self.stack.push(Frame {
            node: origin,
            cursor: 0,
        });
        self.on_path[origin] = true;

        let stopped = loop {
            let Some(frame) = self.stack.last_mut() else {
                break false;
            };
            let node = frame.node;
            let outgoing = self.graph.outgoing(node);
            if frame.cursor >= outgoing.len() {
                self.stack.pop();
                self.on_path[node] = false;
                self.path.pop();
                continue;
            }
            let edge_ix = outgoing[frame.cursor];
            frame.cursor += 1;

            self.expansions += 1;
            if self.expansions % STOP_CHECK_INTERVAL == 0 && should_stop() {
                break true;
            }

            let edge = self.graph.edge(edge_ix);
            if let Some(&last) = self.path.last() {
                if edge.at < self.graph.edge(last).at {
                    continue;
                }
            }
            if !self.components.same_component(origin, edge.to) {
                continue;
            }

            let depth = self.path.len() + 1;
            if edge.to == origin {
                if depth == target && !self.covers_reported(None) {
                    let mut found = self.path.clone();
                    found.push(edge_ix);
                    let graph = self.graph;
                    self.reported
                        .push(found.iter().map(|&e| graph.edge(e).from).collect());
                    report(&found);
                }
                continue;
            }
            if depth >= target || self.on_path[edge.to] || self.covers_reported(Some(edge.to)) {
                continue;
            }

            self.path.push(edge_ix);
            self.on_path[edge.to] = true;
            self.stack.push(Frame {
                node: edge.to,
                cursor: 0,
            });
        };

        self.reset();
        stopped
    }
}

fn build_cycle(graph: &TransferGraph, origin: NodeIx, path: &[EdgeIx]) -> TemporalCycle {
    let hops: Vec<TransferEdge> = path.iter().map(|&e| graph.edge(e).clone()).collect();
    let mut users = vec![graph.user(origin).clone()];
    users.extend(
        hops.iter()
            .take(hops.len().saturating_sub(1))
            .map(|h| graph.user(h.to).clone()),
    );
    TemporalCycle { users, hops }
}
