use std::io::Write as _;

use anyhow::Context;
use chat_widget::native::Runner;
use chat_widget::session::FileStore;
use chat_widget::{Approval, ApprovalPrompt, ChatWidget, Effect, Sender, WidgetConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

/// Reads the operator's decision from the next console line.
struct ConsolePrompt<'a> {
    lines: &'a mut mpsc::Receiver<String>,
}

impl ApprovalPrompt for ConsolePrompt<'_> {
    async fn decide(&mut self, description: &str) -> Approval {
        print!("Approve this action?\n{description}\n[y/N] > ");
        let _ = std::io::stdout().flush();
        let answer = self.lines.recv().await.unwrap_or_default();
        Approval::from_bool(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_widget=info".into()),
        )
        .init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let config = WidgetConfig::from_env().context("loading widget configuration")?;
    let state_file =
        std::env::var("CHAT_WIDGET_STATE_FILE").unwrap_or_else(|_| ".chat-widget.json".to_string());

    let mut widget = ChatWidget::new(config, FileStore::new(&state_file));
    let conversation_id = widget.activate().context("loading conversation id")?.clone();
    info!("Conversation {conversation_id} (state in {state_file})");

    // ── Console input ─────────────────────────────────────────────────────────
    let (line_tx, mut lines) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = stdin.next_line().await {
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let mut runner = Runner::new(widget);
    runner.open();
    println!("Commands: /open, /close, /quit. Anything else is sent as a message.");

    // ── Event loop ────────────────────────────────────────────────────────────
    let mut shown = 0;
    let mut was_typing = false;
    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                match line.trim() {
                    "/quit" => break,
                    "/open" => runner.open(),
                    "/close" => runner.close(),
                    _ => {
                        if !runner.submit(&line) && !line.trim().is_empty() {
                            println!("(not connected, message dropped)");
                        }
                    }
                }
            }
            event = runner.recv() => {
                let Some(event) = event else { break };
                let mut prompt = ConsolePrompt { lines: &mut lines };
                if let Effect::ApprovalSent(decision) = runner.handle(event, &mut prompt).await {
                    info!("Replied {decision:?} to tool call");
                }
            }
        }

        let messages = runner.widget().messages();
        for message in &messages[shown..] {
            if message.sender == Sender::Bot {
                println!("bot> {}", message.text);
            }
        }
        shown = messages.len();
        let typing = runner.widget().is_typing();
        if typing && !was_typing {
            println!("...");
        }
        was_typing = typing;
    }

    runner.close();
    Ok(())
}
