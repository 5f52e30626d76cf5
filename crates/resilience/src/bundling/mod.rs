// crates/resilience/src/bundling/mod.rs
//! Request bundling
//!
//! Requests that share a [`BundleKey`] are merged into one physical call.
//! Each request gets a [`ResultFuture`] that resolves with its part of the
//! bundled response once the bundle is sent.

mod batch;
mod descriptor;
mod executor;
mod future;
mod timer;

pub use descriptor::{BundleDescriptor, BundleKey, BundleThresholds};
pub use executor::Executor;
pub use future::{Cancel, ResultFuture};
