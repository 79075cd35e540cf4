//! # courier
//! A mediator-style request dispatcher for Rust with an ordered, fail-fast
//! validation pipeline, inspired by C# [MediatR](https://github.com/jbogard/MediatR)
//! and [FluentValidation](https://github.com/FluentValidation/FluentValidation).
//!
//! ## Mediator Pattern
//! https://en.wikipedia.org/wiki/Mediator_pattern
//!
//! Each request type is bound to exactly one handler. Before the handler
//! runs, the request passes through the behaviors registered for its type in
//! registration order; any behavior may short-circuit the dispatch with a
//! failure, and [ValidationBehavior] does so when any of its rules is
//! violated, reporting every violation it found.
//!
//! ## Example
//! ```rust
//! use courier::{
//!     DefaultDispatcher, Dispatcher, Request, RequestHandler, RuleSet, ValidationBehavior,
//! };
//!
//! struct CreateProfileRequest {
//!     name: String,
//! }
//! impl Request<u64> for CreateProfileRequest {}
//!
//! struct CreateProfileRequestHandler;
//! impl RequestHandler<CreateProfileRequest, u64> for CreateProfileRequestHandler {
//!     fn handle(&mut self, _req: CreateProfileRequest) -> u64 {
//!         1
//!     }
//! }
//!
//! # fn run() -> courier::Result<()> {
//! let mut dispatcher = DefaultDispatcher::builder()
//!     .add_handler(CreateProfileRequestHandler)?
//!     .add_behavior(
//!         ValidationBehavior::new()
//!             .with(RuleSet::new().non_empty("name", |req: &CreateProfileRequest| req.name.as_str())),
//!     )
//!     .build();
//!
//! let id = dispatcher.send(CreateProfileRequest { name: "ada".to_owned() })?;
//! assert_eq!(1, id);
//!
//! assert!(dispatcher.send(CreateProfileRequest { name: "".to_owned() }).is_err());
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```

/// A convenient result type.
pub type Result<T> = std::result::Result<T, error::Error>;

/// Module for the request-response traits.
mod request;
pub use request::*;

/// Module for the errors.
mod error;
pub use error::*;

/// Module for validation rules and failures.
mod validate;
pub use validate::*;

/// Module for cooperative cancellation.
mod cancellation;
pub use cancellation::*;

/// Module for the pipeline behaviors.
mod behavior;
pub use behavior::*;

/// Module for the dispatcher.
mod dispatcher;
pub use dispatcher::*;

/// Futures utilities.
#[cfg(feature = "async")]
pub mod futures;

/// Provides default implementations.
#[cfg(feature = "impls")]
mod impls;

#[cfg(feature = "impls")]
pub use impls::*;
