// crates/resilience/src/call.rs
//! Shapes of raw and decorated call functions

use crate::error::CallResult;
use crate::settings::CallContext;
use std::sync::Arc;

/// One physical invocation: `(request, context) -> response`
///
/// The context carries the deadline, the attempt timeout and metadata.
pub type RawCall<Req, Resp> = Arc<dyn Fn(&Req, &CallContext) -> CallResult<Resp> + Send + Sync>;

/// A call with retry or timeout handling already applied
pub type Call<Req, Resp> = Arc<dyn Fn(&Req) -> CallResult<Resp> + Send + Sync>;

/// Boxes a closure as a [`RawCall`]
pub fn raw_call<Req, Resp, F>(f: F) -> RawCall<Req, Resp>
where
    F: Fn(&Req, &CallContext) -> CallResult<Resp> + Send + Sync + 'static,
{
    Arc::new(f)
}
