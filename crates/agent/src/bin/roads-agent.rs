//! roads-agent
//!
//! Interactive chat with the Roads Management Insights agent. Reads one
//! question per line from stdin; `exit` or end of input quits.

use anyhow::Context;
use chrono::Local;
use imagery_agent::{root_agent, AgentSettings};
use imagery_core::logging;
use imagery_gcp::{default_client, BigQueryClient, VertexClient};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let settings = AgentSettings::from_env()?;

    let http = default_client().context("building HTTP client")?;
    let model = Arc::new(VertexClient::new(http.clone(), &settings.project, &settings.location));
    let warehouse = Arc::new(BigQueryClient::new(http, &settings.project));
    let agent = root_agent(&settings, model, warehouse, Local::now().date_naive());

    println!(
        "Roads Management Insights agent ({}, project {}). Type `exit` to quit.",
        settings.model, settings.project
    );

    let mut history = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        let checkpoint = history.len();
        match agent.run(&mut history, question).await {
            Ok(answer) => println!("{}\n", answer),
            Err(e) => {
                history.truncate(checkpoint);
                error!(error = %e, "Agent turn failed");
                println!("Sorry, that request failed: {}\n", e);
            }
        }
    }
    Ok(())
}
