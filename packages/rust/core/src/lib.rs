//! Business logic for Repodex: catalog management, admin authentication,
//! and background LLM enrichment.
//!
//! The HTTP layer in the server binary is a thin shell over
//! [`CatalogService`] and the auth helpers here.

pub mod auth;
pub mod catalog;
pub mod enrichment;

pub use catalog::{CatalogService, NewCategory, NewRepository, UpdateCategory, UpdateRepository};
pub use enrichment::{EnrichmentCoordinator, SummaryOutcome};
