//! HTTP shell around the [`paylane`] verification-and-settlement engine.

pub mod bootstrap;
pub mod metrics;
pub mod routes;
pub mod state;
