#![warn(clippy::all, missing_docs)]

//! Core client logic for the TourBook tour-booking service.
//!
//! This crate hosts the API client, the persisted session manager,
//! the booking wizard, custom tour requests and the tour catalogue used by the terminal UI
//! and any future frontends.

pub mod api;
pub mod booking;
pub mod catalog;
pub mod config;
pub mod custom;
pub mod models;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use api::{ApiError, HttpApi, TourApi};
pub use booking::{BookingWizard, FlowGuard, WizardError, WizardStep};
pub use catalog::{DurationBucket, TourCatalog};
pub use config::AppConfig;
pub use custom::{CustomPackageDraft, CustomPackageRequest};
pub use session::{Access, AccessDenied, Role, Session, SessionError, SessionManager, User};
pub use store::{FileStore, MemoryStore, PersistedStore};
