pub mod cycle_detection;
pub mod scc;
pub mod transfer_graph;
