use crate::core::transaction::{Transaction, TransactionId};
use crate::core::user::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Index of a user node in a [`TransferGraph`].
pub type NodeIx = usize;
/// Index of a transfer edge in a [`TransferGraph`].
pub type EdgeIx = usize;

/// One transaction seen as a directed, timestamped edge.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferEdge {
    pub from: NodeIx,
    pub to: NodeIx,
    pub transaction_id: TransactionId,
    pub amount: Decimal,
    pub at: DateTime<Utc>,
}

/// Directed multigraph of transfers between users, stored as an arena.
///
/// Parallel edges are kept apart: each transaction is its own edge, since
/// the cycle search depends on the individual timestamps. Outgoing edge lists are kept sorted by
/// `(at, transaction_id)` so traversal order is deterministic.
///
/// # Examples
///
/// ```
/// use credit_watch::core::tenant::TenantId;
/// use credit_watch::core::transaction::Transaction;
/// use credit_watch::core::user::UserId;
/// use credit_watch::graph::transfer_graph::TransferGraph;
/// use chrono::Utc;
/// use rust_decimal_macros::dec;
///
/// let t = TenantId::new(1);
/// let now = Utc::now();
/// let graph = TransferGraph::from_transactions(&[
///     Transaction::new(1, t, UserId::new("a"), UserId::new("b"), dec!(5), now),
///     Transaction::new(2, t, UserId::new("a"), UserId::new("b"), dec!(3), now),
/// ]);
/// assert_eq!(graph.node_count(), 2);
/// assert_eq!(graph.edge_count(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TransferGraph {
    nodes: Vec<UserId>,
    index: HashMap<UserId, NodeIx>,
    edges: Vec<TransferEdge>,
    outgoing: Vec<Vec<EdgeIx>>,
}

impl TransferGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from already-validated transactions.
    pub fn from_transactions(transactions: &[Transaction]) -> Self {
        let mut graph = Self::new();
        for tx in transactions {
            graph.add_transfer(tx);
        }
        graph
    }

    fn node(&mut self, user: &UserId) -> NodeIx {
        if let Some(&ix) = self.index.get(user) {
            return ix;
        }
        let ix = self.nodes.len();
        self.nodes.push(user.clone());
        self.index.insert(user.clone(), ix);
        self.outgoing.push(Vec::new());
        ix
    }

    pub fn add_transfer(&mut self, tx: &Transaction) -> EdgeIx {
        let from = self.node(tx.sender_id());
        let to = self.node(tx.receiver_id());
        let ix = self.edges.len();
        self.edges.push(TransferEdge {
            from,
            to,
            transaction_id: tx.id(),
            amount: tx.amount(),
            at: tx.created_at(),
        });

        let key = (tx.created_at(), tx.id());
        let edges = &self.edges;
        let list = &mut self.outgoing[from];
        let pos = list.partition_point(|&e| (edges[e].at, edges[e].transaction_id) <= key);
        list.insert(pos, ix);
        ix
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn user(&self, node: NodeIx) -> &UserId {
        &self.nodes[node]
    }

    pub fn node_of(&self, user: &UserId) -> Option<NodeIx> {
        self.index.get(user).copied()
    }

    pub fn edge(&self, edge: EdgeIx) -> &TransferEdge {
        &self.edges[edge]
    }

    pub fn edges(&self) -> &[TransferEdge] {
        &self.edges
    }

    /// Outgoing edges of `node`, earliest first.
    pub fn outgoing(&self, node: NodeIx) -> &[EdgeIx] {
        &self.outgoing[node]
    }

    /// Node indices ordered by user id.
    pub fn nodes_by_user(&self) -> Vec<NodeIx> {
        let mut order: Vec<NodeIx> = (0..self.nodes.len()).collect();
        order.sort_by(|a, b| self.nodes[*a].cmp(&self.nodes[*b]));
        order
    }
}
