use crate::core::user::UserId;
use crate::graph::transfer_graph::{NodeIx, TransferGraph};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

/// A strongly connected component of the transfer graph.
///
/// Every user inside a component can reach every other one through a chain
/// of transfers, so only multi-member components can host a cycle.
#[derive(Debug, Clone)]
pub struct StronglyConnectedComponent {
    pub users: Vec<UserId>,
}

impl StronglyConnectedComponent {
    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// True if a closed transfer loop is possible inside this component.
    pub fn is_cyclic(&self) -> bool {
        self.users.len() > 1
    }
}

/// Per-node component membership used to prune the cycle search.
#[derive(Debug, Clone)]
pub struct ComponentIndex {
    /// `None` for nodes that sit in a single-node component.
    component: Vec<Option<usize>>,
    cyclic_count: usize,
}

impl ComponentIndex {
    pub fn build(graph: &TransferGraph) -> Self {
        let (_, sccs) = tarjan(graph);
        let mut component = vec![None; graph.node_count()];
        let mut cyclic_count = 0;
        for members in sccs.into_iter().filter(|m| m.len() > 1) {
            for node in members {
                component[node.index()] = Some(cyclic_count);
            }
            cyclic_count += 1;
        }
        Self {
            component,
            cyclic_count,
        }
    }

    pub fn component_of(&self, node: NodeIx) -> Option<usize> {
        self.component.get(node).copied().flatten()
    }

    /// Both nodes belong to the same multi-member component.
    pub fn same_component(&self, a: NodeIx, b: NodeIx) -> bool {
        match (self.component_of(a), self.component_of(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    pub fn cyclic_count(&self) -> usize {
        self.cyclic_count
    }
}

fn tarjan(graph: &TransferGraph) -> (DiGraph<NodeIx, ()>, Vec<Vec<NodeIndex>>) {
    let mut g: DiGraph<NodeIx, ()> = DiGraph::with_capacity(graph.node_count(), graph.edge_count());
    for node in 0..graph.node_count() {
        g.add_node(node);
    }
    for edge in graph.edges() {
        g.add_edge(NodeIndex::new(edge.from), NodeIndex::new(edge.to), ());
    }
    let sccs = tarjan_scc(&g);
    (g, sccs)
}

/// Find all strongly connected components, members sorted by user id.
pub fn find_sccs(graph: &TransferGraph) -> Vec<StronglyConnectedComponent> {
    let (g, sccs) = tarjan(graph);
    sccs.into_iter()
        .map(|members| {
            let mut users: Vec<UserId> = members
                .into_iter()
                .map(|n| graph.user(g[n]).clone())
                .collect();
            users.sort();
            StronglyConnectedComponent { users }
        })
        .collect()
}
