//! Database models and types for TrainHub
//!
//! This module contains SQLx models for:
//! - Users, profiles and identity token claims
//! - Training plans and their variants
//! - Purchases
//! - Progress tracking
//! - Admin audit logs

pub mod admin;
pub mod plan;
pub mod progress;
pub mod purchase;
pub mod user;

pub use user::{Claims, Identity, User};
