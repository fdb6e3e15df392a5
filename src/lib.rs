//! Carton selection: how many units of one product fit into each container
//! of a catalog, which container fits best, and how the filled containers
//! stack on a pallet.

pub mod api;
pub mod catalog;
pub mod config;
pub mod geometry;
pub mod model;
pub mod optimizer;
pub mod pallet;
pub mod report;
pub mod scoring;
pub mod types;
