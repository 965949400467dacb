//! pubharvest-ingestion — The harvest pipeline core.
//!
//! Flow for one run: [`run::RunController`] computes the fetch window from
//! the run-log watermark, sweeps each keyword's ID set through
//! [`reconcile::RecordReconciler`] over a bounded pool, and finishes with
//! the batch writers in [`export`]. [`normalise`] and [`acquire`] are the
//! reconciler's (almost) pure subroutines.

pub mod acquire;
pub mod export;
pub mod inputs;
pub mod models;
pub mod normalise;
pub mod reconcile;
pub mod run;
pub mod sources;
pub mod tags;
pub mod text;
