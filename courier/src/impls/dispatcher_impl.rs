use crate::error::Error;
use crate::{Behavior, CancellationToken, Dispatcher, Next, Request, RequestHandler};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type SharedRegistry<H> = Arc<Mutex<HashMap<TypeId, H>>>;

// The erased continuation threaded through the behavior chain: the boxed
// value is the request on the way in and a `crate::Result<Res>` on the way
// out.
type ErasedNext = Box<dyn FnOnce(Box<dyn Any>) -> Box<dyn Any>>;

// A wrapper around the request handler to handle the request and return the result.
// To provide type safety without unsafe code we box all: the function, the params and the result.
#[derive(Clone)]
struct RequestHandlerWrapper {
    #[allow(clippy::type_complexity)]
    handler: Arc<Mutex<dyn FnMut(Box<dyn Any>, CancellationToken) -> Box<dyn Any>>>,
}

impl RequestHandlerWrapper {
    pub fn new<Req, Res, H>(mut handler: H) -> Self
    where
        Res: 'static,
        Req: Request<Res> + 'static,
        H: RequestHandler<Req, Res> + 'static,
    {
        let f = move |req: Box<dyn Any>, token: CancellationToken| -> Box<dyn Any> {
            let req = *req.downcast::<Req>().unwrap();
            let res: crate::Result<Res> = if token.is_cancelled() {
                Err(Error::Cancelled)
            } else {
                Ok(handler.handle(req))
            };
            Box::new(res)
        };

        RequestHandlerWrapper {
            handler: Arc::new(Mutex::new(f)),
        }
    }

    pub fn from_fn<Req, Res, F>(mut handler: F) -> Self
    where
        Res: 'static,
        Req: Request<Res> + 'static,
        F: FnMut(Req) -> Res + 'static,
    {
        let f = move |req: Box<dyn Any>, token: CancellationToken| -> Box<dyn Any> {
            let req = *req.downcast::<Req>().unwrap();
            let res: crate::Result<Res> = if token.is_cancelled() {
                Err(Error::Cancelled)
            } else {
                Ok(handler(req))
            };
            Box::new(res)
        };

        RequestHandlerWrapper {
            handler: Arc::new(Mutex::new(f)),
        }
    }

    pub fn handle(&mut self, req: Box<dyn Any>, token: CancellationToken) -> Box<dyn Any> {
        let mut handler = self.handler.lock().unwrap();
        (handler)(req, token)
    }
}

// A wrapper around a pipeline behavior, erased the same way as the handler.
// The continuation is re-typed on the way through so behaviors stay unaware
// of the boxing.
#[derive(Clone)]
struct BehaviorWrapper {
    #[allow(clippy::type_complexity)]
    behavior: Arc<Mutex<dyn FnMut(Box<dyn Any>, CancellationToken, ErasedNext) -> Box<dyn Any>>>,
}

impl BehaviorWrapper {
    pub fn new<Req, Res, B>(mut behavior: B) -> Self
    where
        Res: 'static,
        Req: Request<Res> + 'static,
        B: Behavior<Req, Res> + 'static,
    {
        let f = move |req: Box<dyn Any>,
                      token: CancellationToken,
                      next: ErasedNext|
              -> Box<dyn Any> {
            let req = *req.downcast::<Req>().unwrap();
            if token.is_cancelled() {
                let res: crate::Result<Res> = Err(Error::Cancelled);
                return Box::new(res);
            }

            let typed_next: Next<Req, Res> = Box::new(move |req: Req| {
                next(Box::new(req))
                    .downcast::<crate::Result<Res>>()
                    .map(|res| *res)
                    .unwrap_or_else(|_| {
                        Err(Error::Unbound {
                            request_type: type_name::<Req>(),
                        })
                    })
            });

            let res = behavior.handle(req, &token, typed_next);
            Box::new(res)
        };

        BehaviorWrapper {
            behavior: Arc::new(Mutex::new(f)),
        }
    }

    pub fn from_fn<Req, Res, F>(mut behavior: F) -> Self
    where
        Res: 'static,
        Req: Request<Res> + 'static,
        F: FnMut(Req, &CancellationToken, Next<Req, Res>) -> crate::Result<Res> + 'static,
    {
        let f = move |req: Box<dyn Any>,
                      token: CancellationToken,
                      next: ErasedNext|
              -> Box<dyn Any> {
            let req = *req.downcast::<Req>().unwrap();
            if token.is_cancelled() {
                let res: crate::Result<Res> = Err(Error::Cancelled);
                return Box::new(res);
            }

            let typed_next: Next<Req, Res> = Box::new(move |req: Req| {
                next(Box::new(req))
                    .downcast::<crate::Result<Res>>()
                    .map(|res| *res)
                    .unwrap_or_else(|_| {
                        Err(Error::Unbound {
                            request_type: type_name::<Req>(),
                        })
                    })
            });

            let res = behavior(req, &token, typed_next);
            Box::new(res)
        };

        BehaviorWrapper {
            behavior: Arc::new(Mutex::new(f)),
        }
    }

    pub fn handle(
        &mut self,
        req: Box<dyn Any>,
        token: CancellationToken,
        next: ErasedNext,
    ) -> Box<dyn Any> {
        let mut behavior = self.behavior.lock().unwrap();
        (behavior)(req, token, next)
    }
}

// Runs the chain for one dispatch: behaviors in registration order, the
// handler as the terminal continuation.
fn run_chain(
    behaviors: Vec<BehaviorWrapper>,
    mut handler: RequestHandlerWrapper,
    req: Box<dyn Any>,
    token: CancellationToken,
) -> Box<dyn Any> {
    let terminal: ErasedNext = {
        let token = token.clone();
        Box::new(move |req| handler.handle(req, token))
    };

    let chain = behaviors
        .into_iter()
        .rev()
        .fold(terminal, |next, mut behavior| {
            let token = token.clone();
            Box::new(move |req| behavior.handle(req, token, next)) as ErasedNext
        });

    chain(req)
}

/// A default implementation for the [Dispatcher] trait.
///
/// # Examples
///
/// ## Request handler
/// ```
/// use courier::{DefaultDispatcher, Dispatcher, Request, RequestHandler};
///
/// struct SquareRequest(i64);
/// impl Request<i64> for SquareRequest {}
///
/// struct SquareRequestHandler;
/// impl RequestHandler<SquareRequest, i64> for SquareRequestHandler {
///     fn handle(&mut self, req: SquareRequest) -> i64 {
///         req.0 * req.0
///     }
/// }
///
/// # fn run() -> courier::Result<()> {
/// let mut dispatcher = DefaultDispatcher::builder()
///     .add_handler(SquareRequestHandler)?
///     .build();
///
/// assert_eq!(Ok(9), dispatcher.send(SquareRequest(3)));
/// assert_eq!(Ok(49), dispatcher.send(SquareRequest(-7)));
/// # Ok(())
/// # }
/// # run().unwrap();
/// ```
///
/// ## Pipeline behavior
/// ```
/// use courier::{DefaultDispatcher, Dispatcher, Request};
///
/// struct GreetRequest(&'static str);
/// impl Request<String> for GreetRequest {}
///
/// # fn run() -> courier::Result<()> {
/// let mut dispatcher = DefaultDispatcher::builder()
///     .add_handler_fn(|req: GreetRequest| format!("hello, {}", req.0))?
///     .add_behavior_fn(|req: GreetRequest, _token, next| {
///         let res = next(req)?;
///         Ok(res.to_uppercase())
///     })
///     .build();
///
/// assert_eq!(Ok("HELLO, RUST".to_owned()), dispatcher.send(GreetRequest("rust")));
/// # Ok(())
/// # }
/// # run().unwrap();
/// ```
#[derive(Clone)]
pub struct DefaultDispatcher {
    request_handlers: SharedRegistry<RequestHandlerWrapper>,
    behaviors: SharedRegistry<Vec<BehaviorWrapper>>,
}

// SAFETY: the `request_handlers` and `behaviors` are wrapped in Arc and Mutex.
unsafe impl Send for DefaultDispatcher {}

// SAFETY: the `request_handlers` and `behaviors` are wrapped in Arc and Mutex.
unsafe impl Sync for DefaultDispatcher {}

impl DefaultDispatcher {
    /// Gets a [DefaultDispatcher] builder.
    pub fn builder() -> DefaultDispatcherBuilder {
        DefaultDispatcherBuilder::new()
    }
}

impl Dispatcher for DefaultDispatcher {
    fn send<Req, Res>(&mut self, req: Req) -> crate::Result<Res>
    where
        Res: 'static,
        Req: Request<Res> + 'static,
    {
        self.send_with_token(req, CancellationToken::new())
    }

    fn send_with_token<Req, Res>(
        &mut self,
        req: Req,
        token: CancellationToken,
    ) -> crate::Result<Res>
    where
        Res: 'static,
        Req: Request<Res> + 'static,
    {
        let type_id = TypeId::of::<Req>();
        let handlers_lock = self
            .request_handlers
            .try_lock()
            .expect("Request handlers are locked");

        let handler = handlers_lock.get(&type_id).cloned();
        // Drop the lock to avoid deadlocks when a handler re-enters the dispatcher
        drop(handlers_lock);

        let handler = match handler {
            Some(handler) => handler,
            None => {
                return Err(Error::Unbound {
                    request_type: type_name::<Req>(),
                })
            }
        };

        let behaviors_lock = self.behaviors.try_lock().expect("Behaviors are locked");
        let behaviors = behaviors_lock.get(&type_id).cloned().unwrap_or_default();
        drop(behaviors_lock);

        log::trace!(
            "dispatching `{}` through {} behavior(s)",
            type_name::<Req>(),
            behaviors.len()
        );

        run_chain(behaviors, handler, Box::new(req), token)
            .downcast::<crate::Result<Res>>()
            .map(|res| *res)
            .unwrap_or_else(|_| {
                Err(Error::Unbound {
                    request_type: type_name::<Req>(),
                })
            })
    }
}

/// A builder for the [DefaultDispatcher].
pub struct DefaultDispatcherBuilder {
    inner: DefaultDispatcher,
}

impl DefaultDispatcherBuilder {
    /// Constructs a new `DefaultDispatcherBuilder`.
    pub fn new() -> Self {
        DefaultDispatcherBuilder {
            inner: DefaultDispatcher {
                request_handlers: SharedRegistry::default(),
                behaviors: SharedRegistry::default(),
            },
        }
    }

    /// Registers a request handler.
    ///
    /// Fails with [Error::DuplicateBinding] if the request type already has
    /// a handler.
    pub fn add_handler<Req, Res, H>(self, handler: H) -> crate::Result<Self>
    where
        Res: 'static,
        Req: Request<Res> + 'static,
        H: RequestHandler<Req, Res> + 'static,
    {
        self.bind::<Req>(RequestHandlerWrapper::new(handler))
    }

    /// Registers a request handler from a function.
    ///
    /// Fails with [Error::DuplicateBinding] if the request type already has
    /// a handler.
    pub fn add_handler_fn<Req, Res, F>(self, handler: F) -> crate::Result<Self>
    where
        Res: 'static,
        Req: Request<Res> + 'static,
        F: FnMut(Req) -> Res + 'static,
    {
        self.bind::<Req>(RequestHandlerWrapper::from_fn(handler))
    }

    fn bind<Req: 'static>(self, handler: RequestHandlerWrapper) -> crate::Result<Self> {
        let mut handlers_lock = self.inner.request_handlers.lock().unwrap();
        if handlers_lock.contains_key(&TypeId::of::<Req>()) {
            return Err(Error::DuplicateBinding {
                request_type: type_name::<Req>(),
            });
        }

        handlers_lock.insert(TypeId::of::<Req>(), handler);
        drop(handlers_lock);
        Ok(self)
    }

    /// Registers a pipeline behavior for a request type, after any behaviors
    /// already registered for it.
    pub fn add_behavior<Req, Res, B>(self, behavior: B) -> Self
    where
        Res: 'static,
        Req: Request<Res> + 'static,
        B: Behavior<Req, Res> + 'static,
    {
        let mut behaviors_lock = self.inner.behaviors.lock().unwrap();
        let behaviors = behaviors_lock
            .entry(TypeId::of::<Req>())
            .or_insert_with(Vec::new);
        behaviors.push(BehaviorWrapper::new(behavior));
        drop(behaviors_lock);
        self
    }

    /// Registers a pipeline behavior from a function.
    pub fn add_behavior_fn<Req, Res, F>(self, behavior: F) -> Self
    where
        Res: 'static,
        Req: Request<Res> + 'static,
        F: FnMut(Req, &CancellationToken, Next<Req, Res>) -> crate::Result<Res> + 'static,
    {
        let mut behaviors_lock = self.inner.behaviors.lock().unwrap();
        let behaviors = behaviors_lock
            .entry(TypeId::of::<Req>())
            .or_insert_with(Vec::new);
        behaviors.push(BehaviorWrapper::from_fn(behavior));
        drop(behaviors_lock);
        self
    }

    /// Builds the `DefaultDispatcher`.
    pub fn build(self) -> DefaultDispatcher {
        self.inner
    }
}

impl Default for DefaultDispatcherBuilder {
    fn default() -> Self {
        DefaultDispatcherBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        CancellationToken, DefaultDispatcher, Dispatcher, Error, Request, RequestHandler, RuleSet,
        ValidationBehavior, Violation,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct GetScoreRequest {
        name: String,
    }
    impl Request<i32> for GetScoreRequest {}

    struct GetScoreRequestHandler(Arc<AtomicUsize>);
    impl RequestHandler<GetScoreRequest, i32> for GetScoreRequestHandler {
        fn handle(&mut self, _: GetScoreRequest) -> i32 {
            self.0.fetch_add(1, Ordering::SeqCst);
            412411
        }
    }

    fn name_rules() -> RuleSet<GetScoreRequest> {
        RuleSet::new().non_empty("name", |req: &GetScoreRequest| req.name.as_str())
    }

    #[test]
    fn send_request_test() {
        struct NegateRequest(i64);
        impl Request<i64> for NegateRequest {}

        struct NegateRequestHandler;
        impl RequestHandler<NegateRequest, i64> for NegateRequestHandler {
            fn handle(&mut self, req: NegateRequest) -> i64 {
                -req.0
            }
        }

        let mut dispatcher = DefaultDispatcher::builder()
            .add_handler(NegateRequestHandler)
            .unwrap()
            .build();

        assert_eq!(Ok(-5), dispatcher.send(NegateRequest(5)));
        assert_eq!(Ok(5), dispatcher.send(NegateRequest(-5)));
    }

    #[test]
    fn unbound_request_test() {
        struct UnregisteredRequest;
        impl Request<()> for UnregisteredRequest {}

        let mut dispatcher = DefaultDispatcher::builder().build();

        assert_eq!(
            Err(Error::Unbound {
                request_type: std::any::type_name::<UnregisteredRequest>(),
            }),
            dispatcher.send(UnregisteredRequest)
        );
    }

    #[test]
    fn unbound_skips_behaviors_test() {
        struct OrphanRequest;
        impl Request<u8> for OrphanRequest {}

        let touched = Arc::new(AtomicUsize::new(0));
        let probe = touched.clone();

        let mut dispatcher = DefaultDispatcher::builder()
            .add_behavior_fn(move |req: OrphanRequest, _token, next| {
                probe.fetch_add(1, Ordering::SeqCst);
                next(req)
            })
            .build();

        assert!(matches!(
            dispatcher.send(OrphanRequest),
            Err(Error::Unbound { .. })
        ));
        assert_eq!(0, touched.load(Ordering::SeqCst));
    }

    #[test]
    fn duplicate_binding_test() {
        let counter = Arc::new(AtomicUsize::new(0));
        let result = DefaultDispatcher::builder()
            .add_handler(GetScoreRequestHandler(counter.clone()))
            .unwrap()
            .add_handler(GetScoreRequestHandler(counter));

        assert!(matches!(result, Err(Error::DuplicateBinding { .. })));
    }

    #[test]
    fn validation_pass_test() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = DefaultDispatcher::builder()
            .add_handler(GetScoreRequestHandler(calls.clone()))
            .unwrap()
            .add_behavior(ValidationBehavior::new().with(name_rules()))
            .build();

        let req = GetScoreRequest {
            name: "ds".to_owned(),
        };
        assert_eq!(Ok(412411), dispatcher.send(req.clone()));
        assert_eq!(Ok(412411), dispatcher.send(req));
        assert_eq!(2, calls.load(Ordering::SeqCst));
    }

    #[test]
    fn validation_failure_test() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = DefaultDispatcher::builder()
            .add_handler(GetScoreRequestHandler(calls.clone()))
            .unwrap()
            .add_behavior(ValidationBehavior::new().with(name_rules()))
            .build();

        let res = dispatcher.send(GetScoreRequest {
            name: String::new(),
        });

        match res {
            Err(Error::Validation(failure)) => {
                assert_eq!(
                    vec![Violation::new("name", "must not be empty")],
                    failure.violations
                );
            }
            other => panic!("expected a validation failure, got {:?}", other),
        }
        assert_eq!(0, calls.load(Ordering::SeqCst));
    }

    #[test]
    fn violation_order_test() {
        struct SignUpRequest {
            name: String,
            age: u32,
        }
        impl Request<()> for SignUpRequest {}

        let mut dispatcher = DefaultDispatcher::builder()
            .add_handler_fn(|_: SignUpRequest| ())
            .unwrap()
            .add_behavior(
                ValidationBehavior::new()
                    .with(
                        RuleSet::new()
                            .non_empty("name", |req: &SignUpRequest| req.name.as_str())
                            .rule("age", "must be at least 13", |req: &SignUpRequest| {
                                req.age >= 13
                            }),
                    )
                    .with(RuleSet::new().rule(
                        "name",
                        "must be at least 2 characters",
                        |req: &SignUpRequest| req.name.chars().count() >= 2,
                    )),
            )
            .build();

        let res = dispatcher.send(SignUpRequest {
            name: String::new(),
            age: 9,
        });

        match res {
            Err(Error::Validation(failure)) => {
                let fields: Vec<&str> = failure
                    .violations
                    .iter()
                    .map(|violation| violation.field.as_str())
                    .collect();
                assert_eq!(vec!["name", "age", "name"], fields);
            }
            other => panic!("expected a validation failure, got {:?}", other),
        }
    }

    #[test]
    fn behavior_order_test() {
        struct TagRequest;
        impl Request<String> for TagRequest {}

        let mut dispatcher = DefaultDispatcher::builder()
            .add_handler_fn(|_: TagRequest| "handler".to_owned())
            .unwrap()
            .add_behavior_fn(|req: TagRequest, _token, next| {
                let res = next(req)?;
                Ok(format!("outer({})", res))
            })
            .add_behavior_fn(|req: TagRequest, _token, next| {
                let res = next(req)?;
                Ok(format!("inner({})", res))
            })
            .build();

        assert_eq!(
            Ok("outer(inner(handler))".to_owned()),
            dispatcher.send(TagRequest)
        );
    }

    #[test]
    fn short_circuit_test() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = DefaultDispatcher::builder()
            .add_handler(GetScoreRequestHandler(calls.clone()))
            .unwrap()
            .add_behavior_fn(|_req: GetScoreRequest, _token, _next| Err(Error::Cancelled))
            .build();

        assert_eq!(
            Err(Error::Cancelled),
            dispatcher.send(GetScoreRequest {
                name: "ds".to_owned(),
            })
        );
        assert_eq!(0, calls.load(Ordering::SeqCst));
    }

    #[test]
    fn cancellation_test() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = DefaultDispatcher::builder()
            .add_handler(GetScoreRequestHandler(calls.clone()))
            .unwrap()
            .add_behavior(ValidationBehavior::new().with(name_rules()))
            .build();

        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(
            Err(Error::Cancelled),
            dispatcher.send_with_token(
                GetScoreRequest {
                    name: "ds".to_owned(),
                },
                token
            )
        );
        assert_eq!(0, calls.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_before_handler_test() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = DefaultDispatcher::builder()
            .add_handler(GetScoreRequestHandler(calls.clone()))
            .unwrap()
            .add_behavior_fn(|req: GetScoreRequest, token: &CancellationToken, next| {
                token.cancel();
                next(req)
            })
            .build();

        assert_eq!(
            Err(Error::Cancelled),
            dispatcher.send(GetScoreRequest {
                name: "ds".to_owned(),
            })
        );
        assert_eq!(0, calls.load(Ordering::SeqCst));
    }
}
