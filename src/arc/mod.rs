//! Objects that can be shared between threads.
//!
//! Writers to one [`Object`] are serialized: a write, its cascade and the
//! delivery of every resulting notification finish before the next writer
//! starts. Listeners run without the store locked, so they may read the
//! object or write to it again. Such nested writes are applied at once and
//! their notifications are delivered after the ones already queued.

mod object;

pub use object::{Object, Subscription, WeakObject};
