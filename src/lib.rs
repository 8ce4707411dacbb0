//! cdc-warden - Active/standby control plane for change-data-capture destinations
//!
//! Every destination is run by exactly one process of the cluster. Processes
//! compete for a per-destination leadership node in a coordination service;
//! the winner runs the destination's pipeline, the others stand by and take
//! over when it goes away. Config monitors keep the set of destinations in
//! sync with local files or a remote manager.

pub mod admin;
pub mod cli;
pub mod config;
pub mod controller;
pub mod coordination;
pub mod election;
pub mod lifecycle;
pub mod manager;
pub mod monitor;
pub mod observability;
pub mod pipeline;
