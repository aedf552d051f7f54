//! PostgreSQL implementation of the reelmatch repository port.
//!
//! The engine in `reelmatch-core` talks to storage only through the
//! `FingerprintRepository` trait; this crate supplies the durable
//! implementation, with embedded migrations for the `video_features` and
//! `campaign_retention` tables.

pub mod postgres;

pub use postgres::PostgresStore;
