//! Interactive chat loop and one-shot generation.
//!
//! The decode loop runs on its own thread inside the engine; here we only
//! consume the event stream, so the terminal stays responsive and Ctrl-C can
//! cancel a generation cooperatively without killing the process.

use anyhow::{Context, Result};
use log::{info, warn};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncBufReadExt;

use q4chat_inference::{
    FinishReason, GenerationConfig, ModelScorer, QuantizedModel, SamplingEngine, TokenEvent,
};

use crate::prompt::PromptTemplate;
use crate::storage::{Chat, ChatStore, Role};

pub struct ChatOptions<'a> {
    pub model_path: &'a Path,
    pub config: GenerationConfig,
    pub template: PromptTemplate,
    pub system_prompt: Option<&'a str>,
    pub chats_dir: &'a Path,
    pub chat_id: Option<&'a str>,
}

/// Runs the interactive chat client until the user leaves.
pub fn run_chat(options: ChatOptions<'_>) -> Result<()> {
    let model = Arc::new(QuantizedModel::load(options.model_path)?);
    // The loaded model is authoritative for the end-of-sequence id
    let mut config = options.config;
    config.eos_token_id = model.eos_token_id();
    let engine = SamplingEngine::new(model.clone(), config);
    let store = ChatStore::new(options.chats_dir)?;

    let chat = match options.chat_id {
        Some(id) => store
            .load(id)?
            .with_context(|| format!("No stored chat with id {id}"))?,
        None => store.create("terminal session")?,
    };
    info!("Chat {} ({} earlier messages). Empty line exits.", chat.id, chat.messages.len());

    runtime()?.block_on(chat_loop(
        engine,
        model,
        store,
        chat,
        options.template,
        options.system_prompt,
    ))
}

/// Prints stored conversations, or deletes one by id.
pub fn run_chats(chats_dir: &Path, delete_id: Option<&str>) -> Result<()> {
    let store = ChatStore::new(chats_dir)?;

    if let Some(id) = delete_id {
        if store.delete(id)? {
            println!("Deleted chat {id}");
        } else {
            anyhow::bail!("No stored chat with id {id}");
        }
        return Ok(());
    }

    let chats = store.list()?;
    if chats.is_empty() {
        println!("No stored chats in {}", chats_dir.display());
        return Ok(());
    }
    for chat in chats {
        println!("{}  {:4} messages  {}", chat.id, chat.messages.len(), chat.name);
    }
    Ok(())
}

/// Streams one completion for a prompt given on the command line.
pub fn run_generate(model_path: &Path, mut config: GenerationConfig, input: &str) -> Result<()> {
    let model = Arc::new(QuantizedModel::load(model_path)?);
    config.eos_token_id = model.eos_token_id();
    let engine = SamplingEngine::new(model.clone(), config);

    runtime()?.block_on(async move {
        let prompt_tokens = model.encode(input);
        if prompt_tokens.is_empty() {
            anyhow::bail!("Please provide a prompt");
        }

        let (reply, reason) = stream_reply(&engine, prompt_tokens).await?;
        report_finish(&reason, reply.len());
        Ok(())
    })
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")
}

async fn chat_loop(
    engine: SamplingEngine,
    model: Arc<QuantizedModel>,
    store: ChatStore,
    mut chat: Chat,
    template: PromptTemplate,
    system_prompt: Option<&str>,
) -> Result<()> {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let user_input = line.trim().to_string();
        if user_input.is_empty() {
            break;
        }

        chat.push(Role::User, user_input.as_str());
        let prompt = template.render(system_prompt, &chat.messages);
        let prompt_tokens = model.encode(&prompt);

        let (reply, reason) = stream_reply(&engine, prompt_tokens).await?;
        report_finish(&reason, reply.len());

        // Whatever streamed stays part of the conversation, even after a
        // cancelled or failed turn; the session itself is already over.
        chat.push(Role::Assistant, reply);
        store.save(&chat)?;
    }

    store.save(&chat)?;
    Ok(())
}

/// Consumes one session's event stream: prints fragments as they arrive,
/// cancels on Ctrl-C, and always drains to the terminal sentinel.
async fn stream_reply(
    engine: &SamplingEngine,
    prompt_tokens: Vec<usize>,
) -> Result<(String, FinishReason)> {
    let (mut stream, cancel) = engine.start(prompt_tokens);

    let mut reply = String::new();
    let mut metrics = TokenMetrics::new();
    let reason = loop {
        tokio::select! {
            event = stream.next_event() => match event {
                Some(TokenEvent::Fragment { text, .. }) => {
                    metrics.increment_token();
                    print!("{text}");
                    io::stdout().flush()?;
                    reply.push_str(&text);
                }
                Some(TokenEvent::Done(reason)) => break reason,
                None => {
                    warn!("token stream ended without a sentinel");
                    break FinishReason::Error("stream ended unexpectedly".to_string());
                }
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            }
        }
    };

    metrics.report();
    Ok((reply, reason))
}

fn report_finish(reason: &FinishReason, reply_len: usize) {
    match reason {
        FinishReason::Success => println!(),
        FinishReason::Cancelled => println!("\n[generation cancelled]"),
        FinishReason::Error(message) => {
            println!();
            warn!("generation failed after {reply_len} streamed bytes: {message}");
        }
    }
}

/// Tracks token generation throughput for one turn.
struct TokenMetrics {
    start_time: Option<Instant>,
    generated_count: usize,
}

impl TokenMetrics {
    fn new() -> Self {
        Self {
            start_time: None,
            generated_count: 0,
        }
    }

    fn increment_token(&mut self) {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }
        self.generated_count += 1;
    }

    fn report(&self) {
        if let Some(start_time) = self.start_time {
            let duration = start_time.elapsed();
            if self.generated_count > 0 && duration.as_secs_f64() > 0.0 {
                let tps = self.generated_count as f64 / duration.as_secs_f64();
                info!(
                    "[Generated {} tokens in {:.2}s - {:.2} tokens/sec]",
                    self.generated_count,
                    duration.as_secs_f64(),
                    tps
                );
            }
        }
    }
}
