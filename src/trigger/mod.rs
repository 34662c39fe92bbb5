//! Event Trigger Pipeline
//!
//! Handler registration in two authorization tiers and dispatch of events
//! to them.
//!
//! - `api` handlers are public
//! - `on` handlers require `_session._username` to be set
//!
//! System events (`_instance`, `__send`, `__receive`, `__clock`) go through
//! the same pipeline; an application opts out of one simply by not
//! registering it, which yields `e = "unimplemented"`.

mod pipeline;
mod registry;

pub use pipeline::{Dispatcher, UNAUTHENTICATED, UNIMPLEMENTED};
pub use registry::{
    Handler, HandlerContext, HandlerFuture, HandlerLoader, NoopLoader, Registry, Tier,
};
