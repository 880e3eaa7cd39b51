//! SQL archival for the coincidence engine: a five-table schema (all
//! messages, a signal archive, a timing archive, coincidence alerts, and
//! cached heartbeats), an append-only writer, and an expiration sweep.

pub mod client;
pub mod errors;
pub mod repositories;
pub mod schema;

pub use client::DbClient;
pub use errors::DbError;
pub use repositories::archive::ArchivalRepository;
pub use repositories::sweep::SweepRepository;
