//! vigia-store — SQLite persistence for the access control service.
//!
//! Implements the decision engine's gallery, device, grant, and audit
//! collaborator traits over a single SQLite database, plus the
//! provisioning helpers and dashboard queries the daemon exposes.

pub mod store;

pub use store::{AccessStore, DailySummary, EventRow, NewDevice, NewSubject, StoreError};
