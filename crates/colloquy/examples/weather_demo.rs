//! Offline end-to-end demo: a canned model calls `fetch_weather` through the
//! engine and answers from the result. No model server required.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use colored::Colorize;
use log::info;
use serde_json::{Map, Value, json};

use colloquy::{
    ChatClient, ChatError, Conversation, Core, Dispatcher, FunctionHandler, FunctionSpec,
    InvokeError, LocalExecutor, MessageRole, SpecRegistry,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Place to ask about
    #[arg(long, default_value = "Pune")]
    place: String,

    /// Maximum dispatch rounds per user turn
    #[arg(long, default_value = "4")]
    max_turns: u32,
}

/// Stands in for an offline model: first reply issues a function call for
/// the requested place, second reply answers from the conveyed result.
struct CannedModel {
    place: String,
    sent: Mutex<u32>,
}

#[async_trait]
impl ChatClient for CannedModel {
    async fn send(&self, conversation: &Conversation) -> Result<String, ChatError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|e| ChatError::Model(e.to_string()))?;
        *sent += 1;
        if *sent == 1 {
            return Ok(format!(
                "Let me check that.\n\n```function_call\n{{ \"id\": \"1\", \"function\": \"fetch_weather\", \"parameters\": {{ \"place\": \"{}\" }} }}\n```",
                self.place
            ));
        }

        // Read the temperature back out of the last tool message.
        let answer = conversation
            .get_messages()
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Tool)
            .and_then(|m| {
                let parsed = colloquy::wire::parse_results(&m.content);
                parsed.results.first().and_then(|r| {
                    r.value()
                        .and_then(|v| v.get("temperature"))
                        .and_then(Value::as_i64)
                })
            });

        match answer {
            Some(temperature) => Ok(format!(
                "It is currently {} degrees in {}.",
                temperature, self.place
            )),
            None => Ok(format!("I could not fetch the weather for {}.", self.place)),
        }
    }

    fn name(&self) -> &str {
        "canned-model"
    }
}

struct FetchWeather;

#[async_trait]
impl FunctionHandler for FetchWeather {
    async fn call(&self, parameters: &Map<String, Value>) -> Result<Value, InvokeError> {
        let place = parameters
            .get("place")
            .and_then(Value::as_str)
            .ok_or_else(|| InvokeError::named("PlaceNotFound", "no place given"))?;
        // A real deployment would reach a weather service from inside the
        // sandbox; the demo derives a number from the name.
        let temperature = 18 + (place.len() as i64 % 12);
        Ok(json!({ "units": "metric", "temperature": temperature }))
    }
}

fn role_tag(role: MessageRole) -> colored::ColoredString {
    match role {
        MessageRole::System => "system".dimmed(),
        MessageRole::User => "user".green(),
        MessageRole::Assistant => "assistant".cyan(),
        MessageRole::Tool => "tool".yellow(),
        _ => "other".normal(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("Weather Demo");
    info!("Place: {}", args.place);

    let registry = SpecRegistry::new();
    registry.register(
        FunctionSpec::new(
            "fetch_weather",
            "Fetch the current weather for a place.",
            json!({
                "type": "object",
                "properties": { "place": { "type": "string" } },
                "required": ["place"],
            }),
        )
        .with_response(json!({
            "type": "object",
            "properties": { "temperature": { "type": "number" } },
        }))
        .with_error("PlaceNotFound", "The place could not be resolved."),
    )?;

    let executor = LocalExecutor::new();
    executor.add_handler("fetch_weather", FetchWeather);

    let model = CannedModel {
        place: args.place.clone(),
        sent: Mutex::new(0),
    };
    let core = Core::new(model, Dispatcher::new(registry, Arc::new(executor)))
        .with_max_turns(args.max_turns);

    let mut conversation = Conversation::new().with_title("Weather demo");
    let answer = core
        .run_turn(
            &mut conversation,
            format!("What is the weather in {} right now?", args.place),
        )
        .await?;

    for message in conversation.get_messages() {
        println!("{}:", role_tag(message.role));
        println!("{}\n", message.content);
    }

    println!("{} {}", "final answer:".bold(), answer);
    Ok(())
}
