use courier::{
    DefaultDispatcher, Dispatcher, Request, RequestHandler, RuleSet, ValidationBehavior,
};

/// Asks for the stored score of a named profile.
#[derive(Debug, Clone)]
struct GetScoreRequest {
    name: String,
}
impl Request<i32> for GetScoreRequest {}

struct GetScoreRequestHandler;
impl RequestHandler<GetScoreRequest, i32> for GetScoreRequestHandler {
    fn handle(&mut self, _req: GetScoreRequest) -> i32 {
        // Stand-in for a real storage lookup.
        412411
    }
}

fn score_rules() -> RuleSet<GetScoreRequest> {
    RuleSet::new().non_empty("name", |req: &GetScoreRequest| req.name.as_str())
}

fn main() -> courier::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Pass a different name as the first argument; an empty one trips the
    // validation behavior and exits nonzero.
    let name = std::env::args().nth(1).unwrap_or_else(|| "ds".to_owned());
    log::info!("looking up score for {:?}", name);

    let mut dispatcher = DefaultDispatcher::builder()
        .add_handler(GetScoreRequestHandler)?
        .add_behavior(ValidationBehavior::new().with(score_rules()))
        .build();

    let score = dispatcher.send(GetScoreRequest { name })?;
    println!("{}", score);

    Ok(())
}
