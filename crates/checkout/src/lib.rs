//! Checkout transaction coordinator.
//!
//! This crate places orders against a [`order_store::CheckoutStore`]. One
//! checkout runs as a single unit of work:
//! 1. Aggregate cart lines per product and size
//! 2. Read the products and validate stock for every line
//! 3. Write the decremented stock maps (compare-and-swap on version)
//! 4. Write the order with frozen product snapshots
//! 5. Commit
//!
//! Any failure before commit leaves stock and orders untouched. Lost races
//! are retried a bounded number of times with fresh reads.

pub mod config;
pub mod coordinator;
pub mod error;

pub use config::{CheckoutConfig, TotalsPolicy};
pub use coordinator::CheckoutCoordinator;
pub use error::{CheckoutError, Result};
