use courier::{
    AsyncDispatcher, AsyncRequestHandler, CancellationToken, DefaultAsyncDispatcher, Request,
    RuleSet, ValidationBehavior,
};
use std::time::Duration;

/// Asks for the stored score of a named profile.
#[derive(Debug, Clone)]
struct GetScoreRequest {
    name: String,
}
impl Request<i32> for GetScoreRequest {}

struct GetScoreRequestHandler;

#[async_trait::async_trait]
impl AsyncRequestHandler<GetScoreRequest, i32> for GetScoreRequestHandler {
    async fn handle(&mut self, _req: GetScoreRequest) -> i32 {
        // Stand-in for a real storage round trip.
        tokio::time::sleep(Duration::from_millis(50)).await;
        412411
    }
}

fn score_rules() -> RuleSet<GetScoreRequest> {
    RuleSet::new().non_empty("name", |req: &GetScoreRequest| req.name.as_str())
}

#[tokio::main]
async fn main() -> courier::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let mut dispatcher = DefaultAsyncDispatcher::builder()
        .add_handler(GetScoreRequestHandler)?
        .add_behavior(ValidationBehavior::new().with(score_rules()))
        .build();

    let score = dispatcher
        .send(GetScoreRequest {
            name: "ds".to_owned(),
        })
        .await?;
    println!("{}", score);

    // A dispatch whose token is already cancelled never reaches the handler.
    let token = CancellationToken::new();
    token.cancel();

    let cancelled = dispatcher
        .send_with_token(
            GetScoreRequest {
                name: "ds".to_owned(),
            },
            token,
        )
        .await;
    log::info!("cancelled dispatch: {:?}", cancelled);

    Ok(())
}
