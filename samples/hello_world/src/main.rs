use courier::{DefaultDispatcher, Dispatcher, Request, RequestHandler};

struct GreetRequest(Option<&'static str>);
impl Request<String> for GreetRequest {}

struct GreetRequestHandler;
impl RequestHandler<GreetRequest, String> for GreetRequestHandler {
    fn handle(&mut self, req: GreetRequest) -> String {
        match req.0 {
            Some(name) => format!("Hello, {}!", name),
            None => "Hello World!".to_string(),
        }
    }
}

fn main() -> courier::Result<()> {
    let mut dispatcher = DefaultDispatcher::builder()
        .add_handler(GreetRequestHandler)?
        .build();

    println!("{}", dispatcher.send(GreetRequest(Some("Rust")))?);
    println!("{}", dispatcher.send(GreetRequest(None))?);

    Ok(())
}
