use crate::error::Error;
use crate::futures::BoxFuture;
use crate::{
    AsyncBehavior, AsyncDispatcher, AsyncNext, AsyncRequestHandler, CancellationToken, Request,
};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

type SharedRegistry<H> = Arc<AsyncMutex<HashMap<TypeId, H>>>;

// The erased continuation threaded through the behavior chain: the boxed
// value is the request on the way in and a `crate::Result<Res>` on the way
// out.
type ErasedNext =
    Box<dyn FnOnce(Box<dyn Any + Send>) -> BoxFuture<'static, Box<dyn Any + Send>> + Send>;

// A wrapper around the request handler to handle the request and return the result.
// To provide type safety without unsafe code we box all: the function, the params and the result.
#[derive(Clone)]
struct RequestHandlerWrapper {
    #[allow(clippy::type_complexity)]
    handler: Arc<
        AsyncMutex<
            dyn FnMut(Box<dyn Any + Send>, CancellationToken) -> BoxFuture<'static, Box<dyn Any + Send>>
                + Send,
        >,
    >,
}

impl RequestHandlerWrapper {
    pub fn new<Req, Res, H>(handler: H) -> Self
    where
        Res: Send + 'static,
        Req: Request<Res> + Send + 'static,
        H: AsyncRequestHandler<Req, Res> + Send + 'static,
    {
        let handler = Arc::new(AsyncMutex::new(handler));

        let f = move |req: Box<dyn Any + Send>,
                      token: CancellationToken|
              -> BoxFuture<'static, Box<dyn Any + Send>> {
            let handler = handler.clone();
            let req = *req.downcast::<Req>().unwrap();

            Box::pin(async move {
                let res: crate::Result<Res> = if token.is_cancelled() {
                    Err(Error::Cancelled)
                } else {
                    let mut handler = handler.lock().await;
                    Ok(handler.handle(req).await)
                };

                let res: Box<dyn Any + Send> = Box::new(res);
                res
            })
        };

        RequestHandlerWrapper {
            handler: Arc::new(AsyncMutex::new(f)),
        }
    }

    pub fn from_fn<Req, Res, H, F>(handler: H) -> Self
    where
        Res: Send + 'static,
        Req: Request<Res> + Send + 'static,
        F: Future<Output = Res> + Send + 'static,
        H: FnMut(Req) -> F + Send + 'static,
    {
        let handler = Arc::new(AsyncMutex::new(handler));

        let f = move |req: Box<dyn Any + Send>,
                      token: CancellationToken|
              -> BoxFuture<'static, Box<dyn Any + Send>> {
            let handler = handler.clone();
            let req = *req.downcast::<Req>().unwrap();

            Box::pin(async move {
                let res: crate::Result<Res> = if token.is_cancelled() {
                    Err(Error::Cancelled)
                } else {
                    let fut = {
                        let mut handler = handler.lock().await;
                        (handler)(req)
                    };
                    Ok(fut.await)
                };

                let res: Box<dyn Any + Send> = Box::new(res);
                res
            })
        };

        RequestHandlerWrapper {
            handler: Arc::new(AsyncMutex::new(f)),
        }
    }

    pub async fn handle(
        &self,
        req: Box<dyn Any + Send>,
        token: CancellationToken,
    ) -> Box<dyn Any + Send> {
        let fut = {
            let mut handler = self.handler.lock().await;
            (handler)(req, token)
        };
        fut.await
    }
}

// A wrapper around a pipeline behavior, erased the same way as the handler.
// The continuation is re-typed on the way through so behaviors stay unaware
// of the boxing.
#[derive(Clone)]
struct BehaviorWrapper {
    #[allow(clippy::type_complexity)]
    behavior: Arc<
        AsyncMutex<
            dyn FnMut(
                    Box<dyn Any + Send>,
                    CancellationToken,
                    ErasedNext,
                ) -> BoxFuture<'static, Box<dyn Any + Send>>
                + Send,
        >,
    >,
}

impl BehaviorWrapper {
    pub fn new<Req, Res, B>(behavior: B) -> Self
    where
        Res: Send + 'static,
        Req: Request<Res> + Send + 'static,
        B: AsyncBehavior<Req, Res> + Send + 'static,
    {
        let behavior = Arc::new(AsyncMutex::new(behavior));

        let f = move |req: Box<dyn Any + Send>,
                      token: CancellationToken,
                      next: ErasedNext|
              -> BoxFuture<'static, Box<dyn Any + Send>> {
            let behavior = behavior.clone();
            let req = *req.downcast::<Req>().unwrap();

            Box::pin(async move {
                let res: crate::Result<Res> = if token.is_cancelled() {
                    Err(Error::Cancelled)
                } else {
                    let typed_next: AsyncNext<Req, Res> =
                        Box::new(move |req: Req| -> BoxFuture<'static, crate::Result<Res>> {
                            Box::pin(async move {
                                next(Box::new(req))
                                    .await
                                    .downcast::<crate::Result<Res>>()
                                    .map(|res| *res)
                                    .unwrap_or_else(|_| {
                                        Err(Error::Unbound {
                                            request_type: type_name::<Req>(),
                                        })
                                    })
                            })
                        });

                    let mut behavior = behavior.lock().await;
                    behavior.handle(req, &token, typed_next).await
                };

                let res: Box<dyn Any + Send> = Box::new(res);
                res
            })
        };

        BehaviorWrapper {
            behavior: Arc::new(AsyncMutex::new(f)),
        }
    }

    pub async fn handle(
        &self,
        req: Box<dyn Any + Send>,
        token: CancellationToken,
        next: ErasedNext,
    ) -> Box<dyn Any + Send> {
        let fut = {
            let mut behavior = self.behavior.lock().await;
            (behavior)(req, token, next)
        };
        fut.await
    }
}

// Runs the chain for one dispatch: behaviors in registration order, the
// handler as the terminal continuation.
fn run_chain(
    behaviors: Vec<BehaviorWrapper>,
    handler: RequestHandlerWrapper,
    req: Box<dyn Any + Send>,
    token: CancellationToken,
) -> BoxFuture<'static, Box<dyn Any + Send>> {
    let terminal: ErasedNext = {
        let token = token.clone();
        Box::new(move |req| Box::pin(async move { handler.handle(req, token).await }))
    };

    let chain = behaviors
        .into_iter()
        .rev()
        .fold(terminal, |next, behavior| {
            let token = token.clone();
            Box::new(move |req| {
                Box::pin(async move { behavior.handle(req, token, next).await })
                    as BoxFuture<'static, Box<dyn Any + Send>>
            }) as ErasedNext
        });

    chain(req)
}

/// A default implementation for the [AsyncDispatcher] trait.
///
/// # Examples
/// ```
/// use courier::{AsyncDispatcher, AsyncRequestHandler, DefaultAsyncDispatcher, Request};
///
/// struct DelayedEchoRequest(String);
/// impl Request<String> for DelayedEchoRequest {}
///
/// struct DelayedEchoRequestHandler;
///
/// #[async_trait::async_trait]
/// impl AsyncRequestHandler<DelayedEchoRequest, String> for DelayedEchoRequestHandler {
///     async fn handle(&mut self, req: DelayedEchoRequest) -> String {
///         tokio::task::yield_now().await;
///         req.0
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> courier::Result<()> {
/// let mut dispatcher = DefaultAsyncDispatcher::builder()
///     .add_handler(DelayedEchoRequestHandler)?
///     .build();
///
/// let res = dispatcher.send(DelayedEchoRequest("pong".to_owned())).await?;
/// assert_eq!("pong", res);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DefaultAsyncDispatcher {
    request_handlers: SharedRegistry<RequestHandlerWrapper>,
    behaviors: SharedRegistry<Vec<BehaviorWrapper>>,
}

impl DefaultAsyncDispatcher {
    /// Gets a [DefaultAsyncDispatcher] builder.
    pub fn builder() -> DefaultAsyncDispatcherBuilder {
        DefaultAsyncDispatcherBuilder::new()
    }
}

#[async_trait::async_trait]
impl AsyncDispatcher for DefaultAsyncDispatcher {
    async fn send<Req, Res>(&mut self, req: Req) -> crate::Result<Res>
    where
        Res: Send + 'static,
        Req: Request<Res> + Send + 'static,
    {
        self.send_with_token(req, CancellationToken::new()).await
    }

    async fn send_with_token<Req, Res>(
        &mut self,
        req: Req,
        token: CancellationToken,
    ) -> crate::Result<Res>
    where
        Res: Send + 'static,
        Req: Request<Res> + Send + 'static,
    {
        let type_id = TypeId::of::<Req>();

        let handler = {
            let handlers = self.request_handlers.lock().await;
            handlers.get(&type_id).cloned()
        };

        let handler = match handler {
            Some(handler) => handler,
            None => {
                return Err(Error::Unbound {
                    request_type: type_name::<Req>(),
                })
            }
        };

        let behaviors = {
            let behaviors = self.behaviors.lock().await;
            behaviors.get(&type_id).cloned().unwrap_or_default()
        };

        log::trace!(
            "dispatching `{}` through {} behavior(s)",
            type_name::<Req>(),
            behaviors.len()
        );

        run_chain(behaviors, handler, Box::new(req), token)
            .await
            .downcast::<crate::Result<Res>>()
            .map(|res| *res)
            .unwrap_or_else(|_| {
                Err(Error::Unbound {
                    request_type: type_name::<Req>(),
                })
            })
    }
}

/// A builder for the [DefaultAsyncDispatcher].
///
/// Registration is synchronous; the registries are wrapped for shared async
/// access when [build](DefaultAsyncDispatcherBuilder::build) is called.
pub struct DefaultAsyncDispatcherBuilder {
    request_handlers: HashMap<TypeId, RequestHandlerWrapper>,
    behaviors: HashMap<TypeId, Vec<BehaviorWrapper>>,
}

impl DefaultAsyncDispatcherBuilder {
    /// Constructs a new `DefaultAsyncDispatcherBuilder`.
    pub fn new() -> Self {
        DefaultAsyncDispatcherBuilder {
            request_handlers: HashMap::new(),
            behaviors: HashMap::new(),
        }
    }

    /// Registers a request handler.
    ///
    /// Fails with [Error::DuplicateBinding] if the request type already has
    /// a handler.
    pub fn add_handler<Req, Res, H>(mut self, handler: H) -> crate::Result<Self>
    where
        Res: Send + 'static,
        Req: Request<Res> + Send + 'static,
        H: AsyncRequestHandler<Req, Res> + Send + 'static,
    {
        if self.request_handlers.contains_key(&TypeId::of::<Req>()) {
            return Err(Error::DuplicateBinding {
                request_type: type_name::<Req>(),
            });
        }

        self.request_handlers
            .insert(TypeId::of::<Req>(), RequestHandlerWrapper::new(handler));
        Ok(self)
    }

    /// Registers a request handler from an async function.
    ///
    /// Fails with [Error::DuplicateBinding] if the request type already has
    /// a handler.
    pub fn add_handler_fn<Req, Res, H, F>(mut self, handler: H) -> crate::Result<Self>
    where
        Res: Send + 'static,
        Req: Request<Res> + Send + 'static,
        F: Future<Output = Res> + Send + 'static,
        H: FnMut(Req) -> F + Send + 'static,
    {
        if self.request_handlers.contains_key(&TypeId::of::<Req>()) {
            return Err(Error::DuplicateBinding {
                request_type: type_name::<Req>(),
            });
        }

        self.request_handlers
            .insert(TypeId::of::<Req>(), RequestHandlerWrapper::from_fn(handler));
        Ok(self)
    }

    /// Registers a pipeline behavior for a request type, after any behaviors
    /// already registered for it.
    pub fn add_behavior<Req, Res, B>(mut self, behavior: B) -> Self
    where
        Res: Send + 'static,
        Req: Request<Res> + Send + 'static,
        B: AsyncBehavior<Req, Res> + Send + 'static,
    {
        self.behaviors
            .entry(TypeId::of::<Req>())
            .or_insert_with(Vec::new)
            .push(BehaviorWrapper::new(behavior));
        self
    }

    /// Builds the `DefaultAsyncDispatcher`.
    pub fn build(self) -> DefaultAsyncDispatcher {
        DefaultAsyncDispatcher {
            request_handlers: Arc::new(AsyncMutex::new(self.request_handlers)),
            behaviors: Arc::new(AsyncMutex::new(self.behaviors)),
        }
    }
}

impl Default for DefaultAsyncDispatcherBuilder {
    fn default() -> Self {
        DefaultAsyncDispatcherBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        AsyncDispatcher, AsyncRequestHandler, CancellationToken, DefaultAsyncDispatcher, Error,
        Request, RuleSet, ValidationBehavior,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct GetScoreRequest {
        name: String,
    }
    impl Request<i32> for GetScoreRequest {}

    struct GetScoreRequestHandler(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl AsyncRequestHandler<GetScoreRequest, i32> for GetScoreRequestHandler {
        async fn handle(&mut self, _: GetScoreRequest) -> i32 {
            self.0.fetch_add(1, Ordering::SeqCst);
            412411
        }
    }

    fn name_rules() -> RuleSet<GetScoreRequest> {
        RuleSet::new().non_empty("name", |req: &GetScoreRequest| req.name.as_str())
    }

    fn score_dispatcher(calls: Arc<AtomicUsize>) -> DefaultAsyncDispatcher {
        DefaultAsyncDispatcher::builder()
            .add_handler(GetScoreRequestHandler(calls))
            .unwrap()
            .add_behavior(ValidationBehavior::new().with(name_rules()))
            .build()
    }

    #[tokio::test]
    async fn async_send_test() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = score_dispatcher(calls.clone());

        let req = GetScoreRequest {
            name: "ds".to_owned(),
        };
        assert_eq!(Ok(412411), dispatcher.send(req.clone()).await);
        assert_eq!(Ok(412411), dispatcher.send(req).await);
        assert_eq!(2, calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn async_validation_failure_test() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = score_dispatcher(calls.clone());

        let res = dispatcher
            .send(GetScoreRequest {
                name: " ".to_owned(),
            })
            .await;

        match res {
            Err(Error::Validation(failure)) => {
                assert_eq!("name", failure.violations[0].field);
            }
            other => panic!("expected a validation failure, got {:?}", other),
        }
        assert_eq!(0, calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn async_unbound_test() {
        struct OrphanRequest;
        impl Request<()> for OrphanRequest {}

        let mut dispatcher = DefaultAsyncDispatcher::builder().build();

        assert!(matches!(
            dispatcher.send(OrphanRequest).await,
            Err(Error::Unbound { .. })
        ));
    }

    #[tokio::test]
    async fn async_duplicate_binding_test() {
        let counter = Arc::new(AtomicUsize::new(0));
        let result = DefaultAsyncDispatcher::builder()
            .add_handler(GetScoreRequestHandler(counter.clone()))
            .unwrap()
            .add_handler(GetScoreRequestHandler(counter));

        assert!(matches!(result, Err(Error::DuplicateBinding { .. })));
    }

    #[tokio::test]
    async fn async_cancellation_test() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut dispatcher = score_dispatcher(calls.clone());

        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(
            Err(Error::Cancelled),
            dispatcher
                .send_with_token(
                    GetScoreRequest {
                        name: "ds".to_owned(),
                    },
                    token
                )
                .await
        );
        assert_eq!(0, calls.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn async_handler_fn_test() {
        let mut dispatcher = DefaultAsyncDispatcher::builder()
            .add_handler_fn(|req: GetScoreRequest| async move { req.name.len() as i32 })
            .unwrap()
            .build();

        let res = dispatcher
            .send(GetScoreRequest {
                name: "four".to_owned(),
            })
            .await;
        assert_eq!(Ok(4), res);
    }
}
