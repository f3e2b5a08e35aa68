//! # Outage Tracker Core
//!
//! Storage-agnostic logic for Outage Tracker: the fixed-precision polygon
//! encoding, the geometry store abstraction with an in-memory backend, the
//! zoom-adaptive hexagonal density grid, and outage-episode segmentation.
//!
//! This crate does no filesystem, network, or database I/O. The
//! `outage-tracker` crate supplies the SQLite store, snapshot ingestion,
//! alerting, and the CLI and HTTP surfaces.

pub mod episode;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod grid;
pub mod models;
pub mod store;
