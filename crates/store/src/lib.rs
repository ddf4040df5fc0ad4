// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wsi-store: the in-memory Job/Workflow store and the per-entity event bus.

pub mod bus;
pub mod store;

pub use bus::{EventBus, Subscription, DEFAULT_BUFFER};
pub use store::Store;
