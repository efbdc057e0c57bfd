//! Persistence for product stock and orders.
//!
//! All writes go through a [`UnitOfWork`]: reads, compare-and-swap stock
//! writes and order inserts become visible together on `commit`, and a unit
//! dropped before `commit` leaves no trace.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryCheckoutStore, InMemoryUnit};
pub use postgres::{PostgresCheckoutStore, PostgresUnit};
pub use store::{CheckoutStore, UnitOfWork, UnitOfWorkExt};
