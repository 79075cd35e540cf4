/// Represents a request expecting a response of type `Res`.
pub trait Request<Res> {}

/// Handles a request and produces its response.
pub trait RequestHandler<Req, Res>
where
    Req: Request<Res>,
{
    /// Handles a request and returns the response.
    fn handle(&mut self, req: Req) -> Res;
}

/// An async handler for requests.
#[cfg(feature = "async")]
#[cfg_attr(feature = "async", async_trait::async_trait)]
pub trait AsyncRequestHandler<Req, Res>
where
    Req: Request<Res> + Send,
{
    /// Handles a request and returns the response.
    async fn handle(&mut self, req: Req) -> Res;
}
