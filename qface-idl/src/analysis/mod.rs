//! Analysis utilities

pub mod type_graph;

pub use type_graph::*;
