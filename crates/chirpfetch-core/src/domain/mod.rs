//! # Domain Models
//!
//! Canonical domain types for acquired posts.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Handle`] | Normalized account handle |
//! | [`NormalizedItem`] | Validated post shared by every strategy |
//! | [`ItemMetrics`] | Engagement counters |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Items are validated at construction. A candidate whose trimmed text is
//! ten characters or shorter is rejected with
//! [`ValidationError::ItemTextTooShort`](crate::ValidationError::ItemTextTooShort);
//! strategies drop such candidates instead of failing.

mod handle;
mod item;
mod timestamp;

pub use handle::Handle;
pub use item::{validate_text, ItemMetrics, NormalizedItem, MIN_TEXT_LEN_EXCLUSIVE};
pub use timestamp::UtcDateTime;
