//! Routing walkthrough: classify two queries, then run a math and a research request
//!
//! Select the provider with `MODEL_PROVIDER` (anthropic, openai or google).

use agent_router::prelude::*;
use agent_router::telemetry;

async fn run_query(
    supervisor: &Supervisor,
    request: &RequestConfig,
    title: &str,
    query: &str,
) {
    println!("=== Testing {} ===", title);
    println!("Query: {}", query);

    match supervisor.invoke(Conversation::from_user(query), request).await {
        Ok(output) => {
            println!("Routed to: {}", output.route);
            println!("Final result: {}", output.answer().unwrap_or("<no answer>"));
            println!();
            print!("{}", output.trace.format());
        }
        Err(e) => println!("Error: {}", e),
    }
    println!();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init()?;

    println!("Testing Multi-Agent Router\n");

    let config = RouterConfig::from_env()?;
    let supervisor = Supervisor::from_config(&config)?;
    let request = RequestConfig {
        model_provider: std::env::var("MODEL_PROVIDER").ok(),
    };

    println!("=== Testing Routing ===");
    for query in ["Calculate 5 + 3", "Who is the president?"] {
        let route = supervisor
            .classifier()
            .classify(&Conversation::from_user(query));
        println!("{:<24} routed to: {}", query, route);
    }
    println!();

    run_query(
        &supervisor,
        &request,
        "Math Query",
        "Calculate 15 + 25 and then multiply by 3",
    )
    .await;
    run_query(
        &supervisor,
        &request,
        "Research Query",
        "Who is the current mayor of New York City?",
    )
    .await;

    println!("All queries completed!");
    Ok(())
}
