//! The Machine Manifesting Server.
//!
//! Binds node coordinates to manifests, builds a customized boot image for
//! the node from the golden image, and exposes the bindings over HTTP.

pub mod bindings;
pub mod builder;
pub mod config;
pub mod customize;
pub mod error;
pub mod images;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod telemetry;
