//! Noterer - CLI Tool
//!
//! Terminal client for the Noterer HTTP API.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "noterer-cli")]
#[command(about = "Terminal client for Noterer")]
struct Cli {
    /// Noterer server URL
    #[arg(long, env = "NOTERER_URL", default_value = "http://127.0.0.1:8000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new conversation
    Start,

    /// Send text to a conversation
    Say {
        /// Conversation ID
        id: Uuid,

        /// What to say
        text: String,

        /// Do not send graph context to the model
        #[arg(long)]
        no_context: bool,
    },

    /// Accept the pending proposal
    Confirm {
        /// Conversation ID
        id: Uuid,
    },

    /// Reject the pending proposal
    Reject {
        /// Conversation ID
        id: Uuid,
    },

    /// Show a conversation
    Show {
        /// Conversation ID
        id: Uuid,
    },

    /// End a conversation
    End {
        /// Conversation ID
        id: Uuid,
    },

    /// List notes, newest first
    Notes {
        #[arg(short, long, default_value = "20")]
        limit: usize,

        #[arg(short, long, default_value = "0")]
        skip: usize,
    },

    /// Show nodes related to a note
    Related {
        /// Note ID
        note_id: Uuid,

        /// Maximum path length
        #[arg(long)]
        max_hops: Option<usize>,

        /// Weight recent notes higher
        #[arg(long)]
        recency: bool,
    },

    /// Ask a question answered from your notes
    Ask {
        /// The question
        prompt: String,

        /// Answer from these notes instead of the most recent ones
        #[arg(long = "note")]
        notes: Vec<Uuid>,
    },

    /// Interactive conversation
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let server = cli.server.trim_end_matches('/');

    match cli.command {
        Commands::Start => {
            let resp = send(client.post(format!("{}/conversation/start", server))).await?;
            println!("Started conversation: {}", resp["conversation_id"].as_str().unwrap_or("-"));
        }
        Commands::Say {
            id,
            text,
            no_context,
        } => {
            let resp = say(&client, server, id, &text, !no_context).await?;
            print_input_result(&resp);
        }
        Commands::Confirm { id } => {
            let resp = confirm(&client, server, id, true).await?;
            print_confirmation(&resp);
        }
        Commands::Reject { id } => {
            let resp = confirm(&client, server, id, false).await?;
            print_confirmation(&resp);
        }
        Commands::Show { id } => {
            let resp = send(client.get(format!("{}/conversation/{}", server, id))).await?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Commands::End { id } => {
            let resp = send(client.delete(format!("{}/conversation/{}", server, id))).await?;
            println!("Conversation {}: {}", id, resp["status"].as_str().unwrap_or("-"));
        }
        Commands::Notes { limit, skip } => handle_notes(&client, server, limit, skip).await?,
        Commands::Related {
            note_id,
            max_hops,
            recency,
        } => handle_related(&client, server, note_id, max_hops, recency).await?,
        Commands::Ask { prompt, notes } => handle_ask(&client, server, &prompt, &notes).await?,
        Commands::Chat => handle_chat(&client, server).await?,
    }

    Ok(())
}

/// Send a request and decode the JSON body, turning API errors into messages
async fn send(request: RequestBuilder) -> Result<Value> {
    let resp = request.send().await?;
    let status = resp.status();
    let body: Value = if status == reqwest::StatusCode::NO_CONTENT {
        Value::Null
    } else {
        resp.json().await.unwrap_or(Value::Null)
    };

    if !status.is_success() {
        let message = body["error"].as_str().unwrap_or("request failed");
        let hint = if body["retryable"].as_bool().unwrap_or(false) {
            " (you can retry)"
        } else {
            ""
        };
        bail!("{} {}{}", status.as_u16(), message, hint);
    }
    Ok(body)
}

async fn say(client: &Client, server: &str, id: Uuid, text: &str, context: bool) -> Result<Value> {
    let body = serde_json::json!({
        "text": text,
        "include_graph_context": context
    });
    send(
        client
            .post(format!("{}/conversation/input/{}", server, id))
            .json(&body),
    )
    .await
}

async fn confirm(client: &Client, server: &str, id: Uuid, accept: bool) -> Result<Value> {
    let body = serde_json::json!({ "confirmed": accept });
    send(
        client
            .post(format!("{}/conversation/confirm/{}", server, id))
            .json(&body),
    )
    .await
}

/// One-line rendering of a proposed action
fn describe_action(action: &Value) -> String {
    let text = |key: &str| action[key].as_str().unwrap_or("-").to_string();
    match action["type"].as_str().unwrap_or("") {
        "create_note" => format!("create note: {}", text("content")),
        "update_note" => format!(
            "update note {}",
            action["note_id"]
                .as_str()
                .or_else(|| action["ref"].as_str())
                .unwrap_or("-")
        ),
        "create_concept" => format!("create concept: {}", text("name")),
        "create_relationship" => format!(
            "link {} -[{}]-> {}",
            text("source"),
            text("relationship_type"),
            text("target")
        ),
        other => format!("{}: {}", other, action),
    }
}

fn print_input_result(resp: &Value) {
    println!("{}", resp["response"].as_str().unwrap_or(""));
    let actions = resp["proposed_actions"].as_array().cloned().unwrap_or_default();
    if !actions.is_empty() {
        println!();
        println!("Proposed actions:");
        for (i, action) in actions.iter().enumerate() {
            println!("  {}. {}", i + 1, describe_action(action));
        }
    }
}

fn print_confirmation(resp: &Value) {
    println!("{}", resp["response"].as_str().unwrap_or(""));
    for executed in resp["executed_actions"].as_array().into_iter().flatten() {
        match executed["created_note_id"].as_str() {
            Some(note_id) => println!("  done: {} ({})", executed["description"], note_id),
            None => println!("  done: {}", executed["description"]),
        }
    }
}

async fn handle_notes(client: &Client, server: &str, limit: usize, skip: usize) -> Result<()> {
    let resp = send(client.get(format!("{}/notes?limit={}&skip={}", server, limit, skip))).await?;

    println!("{:<36} {:<20} {}", "ID", "CREATED", "CONTENT");
    println!("{}", "-".repeat(80));
    for note in resp["items"].as_array().into_iter().flatten() {
        let created = note["created_at"].as_str().unwrap_or("-");
        let content: String = note["content"]
            .as_str()
            .unwrap_or("")
            .chars()
            .take(60)
            .collect();
        println!(
            "{:<36} {:<20} {}",
            note["id"].as_str().unwrap_or("-"),
            created.get(..19).unwrap_or(created),
            content.replace('\n', " ")
        );
    }
    Ok(())
}

async fn handle_related(
    client: &Client,
    server: &str,
    note_id: Uuid,
    max_hops: Option<usize>,
    recency: bool,
) -> Result<()> {
    let mut url = format!("{}/notes/{}/related?recency={}", server, note_id, recency);
    if let Some(hops) = max_hops {
        url.push_str(&format!("&max_hops={}", hops));
    }
    let resp = send(client.get(url)).await?;

    println!("{:<8} {:<5} {:<9} {}", "WEIGHT", "HOPS", "KIND", "NODE");
    println!("{}", "-".repeat(80));
    for item in resp["items"].as_array().into_iter().flatten() {
        println!(
            "{:<8.3} {:<5} {:<9} {}",
            item["weight"].as_f64().unwrap_or(0.0),
            item["hops"].as_u64().unwrap_or(0),
            item["node"]["kind"].as_str().unwrap_or("-"),
            item["node"]["label"].as_str().unwrap_or("-")
        );
    }
    Ok(())
}

async fn handle_ask(client: &Client, server: &str, prompt: &str, notes: &[Uuid]) -> Result<()> {
    let mut body = serde_json::json!({ "prompt": prompt });
    if !notes.is_empty() {
        body["context_ids"] = serde_json::json!(notes);
    }
    let resp = send(client.post(format!("{}/ai/query", server)).json(&body)).await?;
    println!("{}", resp["response"].as_str().unwrap_or(""));
    let sources: Vec<&str> = resp["source_notes"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|s| s.as_str())
        .collect();
    if !sources.is_empty() {
        println!();
        println!("Sources: {}", sources.join(", "));
    }
    Ok(())
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, text: &str) -> Result<Option<String>> {
    print!("{}", text);
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?)
}

async fn handle_chat(client: &Client, server: &str) -> Result<()> {
    let resp = send(client.post(format!("{}/conversation/start", server))).await?;
    let Some(id) = resp["conversation_id"]
        .as_str()
        .and_then(|s| s.parse::<Uuid>().ok())
    else {
        bail!("server returned no conversation id");
    };
    println!("Conversation {} started. Type /quit to leave.", id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = prompt(&mut lines, "> ").await? {
        let text = line.trim();
        if text == "/quit" {
            break;
        }
        if text.is_empty() {
            continue;
        }

        let resp = match say(client, server, id, text, true).await {
            Ok(resp) => resp,
            Err(e) => {
                eprintln!("error: {}", e);
                continue;
            }
        };
        print_input_result(&resp);

        if resp["conversation_state"] != "awaiting_confirmation" {
            continue;
        }
        let answer = prompt(&mut lines, "Apply? [y/N] ").await?.unwrap_or_default();
        let accept = matches!(answer.trim(), "y" | "Y" | "yes");
        match confirm(client, server, id, accept).await {
            Ok(resp) => print_confirmation(&resp),
            Err(e) => eprintln!("error: {}", e),
        }
    }

    send(client.delete(format!("{}/conversation/{}", server, id))).await?;
    println!("Conversation ended.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_action() {
        let action = serde_json::json!({
            "type": "create_relationship",
            "relationship_type": "ABOUT",
            "source": "n1",
            "target": "free will"
        });
        assert_eq!(describe_action(&action), "link n1 -[ABOUT]-> free will");

        let action = serde_json::json!({"type": "create_concept", "name": "telos"});
        assert_eq!(describe_action(&action), "create concept: telos");
    }
}
