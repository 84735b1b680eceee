//! Shared test utilities for the TrainHub workspace
//!
//! This crate provides mock implementations of external services so the
//! API and client test suites run without network access.
//!
//! # Mock Services
//!
//! - [`MockPaymentsServer`] - Mock payment processor for checkout and session tests
//!
//! # Example
//!
//! ```rust,ignore
//! use trainhub_test_utils::MockPaymentsServer;
//!
//! #[tokio::test]
//! async fn test_with_mocks() {
//!     let payments = MockPaymentsServer::start().await;
//!     payments.mock_create_checkout_session("cs_test_1").await;
//!
//!     // Use payments.url() as the client's API base
//! }
//! ```

mod payments;

pub use payments::MockPaymentsServer;
