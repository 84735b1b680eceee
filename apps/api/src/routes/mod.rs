//! HTTP route handlers for the TrainHub API
//!
//! Each module owns a state struct and a `*_router` constructor. Paths are
//! relative to the `/api` prefix, except health which is mounted at `/health`.

pub mod admin;
pub mod auth;
pub mod health;
pub mod pagination;
pub mod plans;
pub mod profile;
pub mod progress;
pub mod purchases;
pub mod webhooks;

pub use admin::{admin_router, AdminState};
pub use auth::{auth_router, AuthState};
pub use health::{health_router, HealthState};
pub use plans::{plans_router, PlansState};
pub use profile::{profile_router, ProfileState};
pub use progress::{progress_router, ProgressState};
pub use purchases::{purchases_router, PurchasesState};
pub use webhooks::{webhook_router, WebhookState};
