//! Mock agent CLI for exercising the playground relay.
//!
//! Reads one prompt from stdin and writes the events of a scripted turn to
//! stdout as JSON lines. Keywords in the prompt select extra behaviour:
//! - `tool`: a tool call that starts and completes
//! - `error`: a `session.error` event instead of a reply
//! - `compact`: a context compaction before the reply
//! - `crash`: exit with a failure status after echoing the prompt

use std::io::{self, BufWriter, Read, Write};

use anyhow::Result;
use clap::Parser;
use playground_protocol::{EventKind, RawEvent};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "mock-agent")]
struct Args {
    #[arg(long)]
    session_id: String,
    #[arg(long, default_value = "mock-model")]
    model: String,
    #[arg(long)]
    system_message: Option<String>,
    #[arg(long)]
    provider_url: Option<String>,
    #[arg(long)]
    provider_type: Option<String>,
}

const TOKEN_LIMIT: u64 = 128_000;

fn main() -> Result<()> {
    let args = Args::parse();

    let mut prompt = String::new();
    io::stdin().read_to_string(&mut prompt)?;
    let prompt = prompt.trim();

    eprintln!(
        "mock-agent session={} model={} provider={:?}",
        args.session_id, args.model, args.provider_url
    );

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for event in script(prompt, &args) {
        serde_json::to_writer(&mut out, &event)?;
        out.write_all(b"\n")?;
        out.flush()?;
    }

    if prompt.contains("crash") {
        eprintln!("mock-agent: crashing on request");
        std::process::exit(2);
    }
    Ok(())
}

fn script(prompt: &str, args: &Args) -> Vec<RawEvent> {
    let mut events = vec![RawEvent::new(
        EventKind::USER_MESSAGE,
        json!({ "content": prompt }),
    )];
    if prompt.contains("crash") {
        return events;
    }

    if prompt.contains("error") {
        events.push(RawEvent::new(
            EventKind::SESSION_ERROR,
            json!({
                "message": "mock failure requested",
                "details": { "sessionId": args.session_id }
            }),
        ));
        return events;
    }

    if prompt.contains("compact") {
        events.push(RawEvent::new(EventKind::SESSION_COMPACTION_START, json!({})));
        events.push(RawEvent::new(
            EventKind::SESSION_COMPACTION_COMPLETE,
            json!({
                "success": true,
                "preCompactionTokens": 9000,
                "postCompactionTokens": 1200,
                "preCompactionMessagesLength": 40,
                "messagesRemoved": 36,
                "tokensRemoved": 7800,
                "summaryContent": "Earlier turns summarised.",
                "compactionTokensUsed": { "input": 9000, "output": 300, "cachedInput": 0 }
            }),
        ));
    }

    if prompt.contains("tool") {
        events.push(RawEvent::new(
            EventKind::TOOL_EXECUTION_START,
            json!({
                "toolCallId": "call-1",
                "toolName": "read_file",
                "arguments": { "path": "README.md" }
            }),
        ));
        events.push(RawEvent::new(
            EventKind::TOOL_EXECUTION_COMPLETE,
            json!({
                "toolCallId": "call-1",
                "success": true,
                "result": { "content": "# Mock project" }
            }),
        ));
    }

    let reply = reply_for(prompt, args.system_message.as_deref());
    let words: Vec<&str> = reply.split_inclusive(' ').collect();
    for word in &words {
        events.push(RawEvent::new(
            EventKind::ASSISTANT_MESSAGE_CHUNK,
            json!({ "deltaContent": word }),
        ));
    }
    events.push(RawEvent::new(
        EventKind::ASSISTANT_MESSAGE,
        json!({ "content": reply }),
    ));

    let input_tokens = prompt.split_whitespace().count() as u64 + 8;
    let output_tokens = words.len() as u64;
    events.push(RawEvent::new(
        EventKind::ASSISTANT_USAGE,
        json!({
            "model": args.model,
            "inputTokens": input_tokens,
            "outputTokens": output_tokens,
            "cacheReadTokens": 0,
            "cacheWriteTokens": 0,
            "cost": 0.0,
            "duration": 12
        }),
    ));
    events.push(RawEvent::new(
        EventKind::SESSION_USAGE_INFO,
        json!({
            "tokenLimit": TOKEN_LIMIT,
            "currentTokens": input_tokens + output_tokens,
            "messagesLength": 2
        }),
    ));
    events
}

fn reply_for(prompt: &str, system_message: Option<&str>) -> String {
    let reply = match prompt.to_lowercase().as_str() {
        "hi" | "hello" => "hello there".to_string(),
        _ => format!("You said: {}", prompt),
    };
    match system_message {
        Some(system) if system.contains("shout") => reply.to_uppercase(),
        _ => reply,
    }
}
