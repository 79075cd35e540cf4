use crate::cancellation::CancellationToken;
use crate::request::Request;

/// A dispatcher routes each request through the behaviors registered for its
/// type and into its handler.
pub trait Dispatcher {
    /// Sends a request to its handler.
    fn send<Req, Res>(&mut self, req: Req) -> crate::Result<Res>
    where
        Res: 'static,
        Req: Request<Res> + 'static;

    /// Sends a request to its handler, observing the given token.
    ///
    /// A dispatch whose token is cancelled fails with
    /// [Cancelled](crate::Error::Cancelled) before the next pipeline step
    /// runs.
    fn send_with_token<Req, Res>(&mut self, req: Req, token: CancellationToken)
        -> crate::Result<Res>
    where
        Res: 'static,
        Req: Request<Res> + 'static;
}

/// An async dispatcher routes each request through the behaviors registered
/// for its type and into its handler.
#[cfg(feature = "async")]
#[cfg_attr(feature = "async", async_trait::async_trait)]
pub trait AsyncDispatcher {
    /// Sends a request to its handler.
    async fn send<Req, Res>(&mut self, req: Req) -> crate::Result<Res>
    where
        Res: Send + 'static,
        Req: Request<Res> + Send + 'static;

    /// Sends a request to its handler, observing the given token.
    ///
    /// A dispatch whose token is cancelled fails with
    /// [Cancelled](crate::Error::Cancelled) before the next pipeline step
    /// runs.
    async fn send_with_token<Req, Res>(
        &mut self,
        req: Req,
        token: CancellationToken,
    ) -> crate::Result<Res>
    where
        Res: Send + 'static,
        Req: Request<Res> + Send + 'static;
}
