//! Nimbus Core
//!
//! Resource model, provider traits and the completion waiter shared by the
//! nimbus provider plugins.

pub mod differ;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod waiter;
