//! # Outage Tracker
//!
//! Ingests periodic snapshots of a utility's power-outage map and answers
//! two questions from the accumulated history: where outages concentrate
//! around a place, and when a given address lost power.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌───────────┐
//! │  Snapshots  │──▶│   Ingest    │──▶│  SQLite   │
//! │ zstd+geobuf │   │ watch loop  │   │ TWKB+bbox │
//! └─────────────┘   └──────┬──────┘   └─────┬─────┘
//!                          │                │
//!                          ▼          ┌─────┴─────┐
//!                     ┌─────────┐     ▼           ▼
//!                     │ Alerts  │ ┌──────┐    ┌──────┐
//!                     └─────────┘ │ CLI  │    │ HTTP │
//!                                 └──────┘    └──────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! otrack init                                   # create database
//! otrack ingest                                 # one ingestion pass
//! otrack watch                                  # pass every 30 minutes
//! otrack grid --lat 45.4469 --lon -75.7904      # outage density nearby
//! otrack episodes --lat 45.4469 --lon -75.7904  # outages at an address
//! otrack serve                                  # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite geometry store |
//! | [`geobuf`] | Geobuf snapshot payload decoding |
//! | [`snapshot`] | Snapshot file discovery |
//! | [`ingest`] | Ingestion passes and the watch loop |
//! | [`alert`] | Operational alert delivery |
//! | [`grid`] | Outage-density grid command |
//! | [`episodes`] | Per-location outage timeline command |
//! | [`timestamps`] | Snapshot history commands |
//! | [`stats`] | Database summary |
//! | [`server`] | HTTP read API |
//! | [`cache`] | Response cache for the HTTP API |

pub mod alert;
pub mod cache;
pub mod config;
pub mod db;
pub mod display;
pub mod episodes;
pub mod geobuf;
pub mod grid;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod server;
pub mod snapshot;
pub mod sqlite_store;
pub mod stats;
pub mod timestamps;
