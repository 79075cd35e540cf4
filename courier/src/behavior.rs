use crate::cancellation::CancellationToken;
use crate::request::Request;
use crate::validate::{Validate, ValidationFailure, Violation};
use std::any::type_name;

/// The rest of the pipeline for a request: the next behavior, or the handler
/// itself at the end of the chain.
pub type Next<Req, Res> = Box<dyn FnOnce(Req) -> crate::Result<Res>>;

/// A step wrapped around a request handler.
///
/// Behaviors run in registration order. Each one may inspect the request,
/// call `next` and return its result unchanged or transformed, or
/// short-circuit with an error without calling `next`.
pub trait Behavior<Req, Res>
where
    Req: Request<Res>,
{
    /// Handles a request, deciding whether the rest of the pipeline runs.
    fn handle(
        &mut self,
        req: Req,
        token: &CancellationToken,
        next: Next<Req, Res>,
    ) -> crate::Result<Res>;
}

/// The rest of an async pipeline.
#[cfg(feature = "async")]
pub type AsyncNext<Req, Res> =
    Box<dyn FnOnce(Req) -> crate::futures::BoxFuture<'static, crate::Result<Res>> + Send>;

/// An async step wrapped around a request handler.
#[cfg(feature = "async")]
#[cfg_attr(feature = "async", async_trait::async_trait)]
pub trait AsyncBehavior<Req, Res>
where
    Req: Request<Res> + Send,
{
    /// Handles a request, deciding whether the rest of the pipeline runs.
    async fn handle(
        &mut self,
        req: Req,
        token: &CancellationToken,
        next: AsyncNext<Req, Res>,
    ) -> crate::Result<Res>;
}

/// A behavior that rejects a request when any of its validators finds a
/// violation, reporting every violation found in rule registration order.
///
/// Validators are attached when the behavior is constructed; a behavior with
/// no validators passes every request through.
///
/// # Examples
/// ```
/// use courier::{Behavior, CancellationToken, Request, RuleSet, ValidationBehavior};
///
/// struct RenameRequest {
///     name: String,
/// }
/// impl Request<()> for RenameRequest {}
///
/// let mut behavior = ValidationBehavior::new()
///     .with(RuleSet::new().non_empty("name", |req: &RenameRequest| req.name.as_str()));
///
/// let token = CancellationToken::new();
///
/// let passed = behavior.handle(
///     RenameRequest {
///         name: "profile".to_owned(),
///     },
///     &token,
///     Box::new(|_req| Ok(())),
/// );
/// assert!(passed.is_ok());
///
/// let rejected = behavior.handle(
///     RenameRequest {
///         name: String::new(),
///     },
///     &token,
///     Box::new(|_req| Ok(())),
/// );
/// assert!(rejected.is_err());
/// ```
pub struct ValidationBehavior<Req> {
    validators: Vec<Box<dyn Validate<Req> + Send + Sync>>,
}

impl<Req> ValidationBehavior<Req> {
    /// Constructs a behavior with no validators.
    pub fn new() -> ValidationBehavior<Req> {
        ValidationBehavior {
            validators: Vec::new(),
        }
    }

    /// Attaches a validator, after any validators already attached.
    pub fn with<V>(mut self, validator: V) -> Self
    where
        V: Validate<Req> + Send + Sync + 'static,
    {
        self.validators.push(Box::new(validator));
        self
    }

    fn check(&self, req: &Req) -> Result<(), ValidationFailure> {
        let violations: Vec<Violation> = self
            .validators
            .iter()
            .flat_map(|validator| validator.validate(req))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            log::debug!(
                "validation rejected `{}` with {} violation(s)",
                type_name::<Req>(),
                violations.len()
            );
            Err(ValidationFailure::new(type_name::<Req>(), violations))
        }
    }
}

impl<Req, Res> Behavior<Req, Res> for ValidationBehavior<Req>
where
    Req: Request<Res>,
{
    fn handle(
        &mut self,
        req: Req,
        _token: &CancellationToken,
        next: Next<Req, Res>,
    ) -> crate::Result<Res> {
        self.check(&req)?;
        next(req)
    }
}

#[cfg(feature = "async")]
#[cfg_attr(feature = "async", async_trait::async_trait)]
impl<Req, Res> AsyncBehavior<Req, Res> for ValidationBehavior<Req>
where
    Req: Request<Res> + Send + 'static,
    Res: Send + 'static,
{
    async fn handle(
        &mut self,
        req: Req,
        _token: &CancellationToken,
        next: AsyncNext<Req, Res>,
    ) -> crate::Result<Res> {
        self.check(&req)?;
        next(req).await
    }
}

impl<Req> Default for ValidationBehavior<Req> {
    fn default() -> Self {
        ValidationBehavior::new()
    }
}
