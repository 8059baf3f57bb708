//! REST Collaborator Client
//!
//! Thin JSON client for the hospital API at `<base>/api/v1`. Payloads are
//! passed through as JSON values; every failure is an [`ApiError`].

mod alerts;
mod bedspace;
mod client;
mod dashboard;
mod staff;

pub use alerts::{AlertsApi, alert_body};
pub use bedspace::{BedAction, BedspaceApi, bedspace_body};
pub use client::{ApiClient, ApiError};
pub use dashboard::DashboardApi;
pub use staff::{StaffApi, StaffFilter};
