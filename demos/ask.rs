//! Route a single query given on the command line
//!
//! ```text
//! cargo run --example ask -- "What is 12 * 7?"
//! cargo run --example ask -- --provider openai --loop-back "Who wrote Dune?"
//! cargo run --example ask -- --config router.yaml --trace "sqrt of 144"
//! ```

use agent_router::prelude::*;
use agent_router::telemetry;
use anyhow::{bail, Context};

#[derive(Debug, Default)]
struct Args {
    provider: Option<String>,
    config: Option<String>,
    loop_back: bool,
    trace: bool,
    query: Vec<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--provider" => args.provider = Some(iter.next().context("--provider needs a value")?),
            "--config" => args.config = Some(iter.next().context("--config needs a path")?),
            "--loop-back" => args.loop_back = true,
            "--trace" => args.trace = true,
            flag if flag.starts_with("--") => bail!("unknown flag {}", flag),
            _ => args.query.push(arg),
        }
    }

    if args.query.is_empty() {
        bail!("usage: ask [--provider NAME] [--config FILE] [--loop-back] [--trace] QUERY");
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init()?;
    let args = parse_args()?;

    let mut config = match &args.config {
        Some(path) => RouterConfig::from_file(path)?,
        None => RouterConfig::from_env()?,
    };
    if args.loop_back {
        config.routing = config.routing.with_mode(RoutingMode::LoopBack);
    }

    let supervisor = Supervisor::from_config(&config)?;
    let request = RequestConfig {
        model_provider: args.provider.or_else(|| std::env::var("MODEL_PROVIDER").ok()),
    };

    let output = supervisor
        .invoke(Conversation::from_user(args.query.join(" ")), &request)
        .await?;

    println!("[{}] {}", output.route, output.answer().unwrap_or_default());
    if args.trace {
        println!("\n{}", output.trace.format());
    }
    Ok(())
}
