// change-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: Change Gate SQLite Store Library
// Description: Durable persistence for every change-control entity.
// Purpose: Expose the SQLite-backed store implementation.
// Dependencies: crate::store
// ============================================================================

//! ## Overview
//! This crate implements every store seam of `change-gate-core` on a single
//! `SQLite` database: devices, credentials, plans, jobs, snapshots, health
//! samples, audit events, and RBAC records. WAL journaling and a busy timeout
//! make it safe for the core's concurrent apply workers.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
