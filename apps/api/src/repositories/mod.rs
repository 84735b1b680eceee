//! Database repository layer for TrainHub
//!
//! Every SQL statement the API runs lives here. Handlers and services
//! receive a repository and never build queries themselves.

pub mod admin;
pub mod plan;
pub mod progress;
pub mod purchase;
pub mod user;
pub mod utils;

pub use admin::AdminRepository;
pub use plan::PlanRepository;
pub use progress::ProgressRepository;
pub use purchase::{PendingPurchase, PurchaseRepository};
pub use user::UserRepository;
