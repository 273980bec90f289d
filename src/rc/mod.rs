//! Single-threaded objects. State lives in `RefCell`s behind an `Rc`, so an
//! [`Object`] is cheap to clone and cannot leave its thread.

mod object;

pub use object::{Object, Subscription, WeakObject};
