//! Shared identifiers and value types used across the checkout workspace.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{OrderId, ProductId, UserId, Version};
