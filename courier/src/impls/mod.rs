mod dispatcher_impl;
pub use dispatcher_impl::*;

#[cfg(feature = "async")]
mod async_dispatcher_impl;

#[cfg(feature = "async")]
pub use async_dispatcher_impl::*;
