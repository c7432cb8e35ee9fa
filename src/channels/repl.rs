//! Interactive REPL channel with line editing and markdown rendering.
//!
//! Uses rustyline for line editing, history and tab-completion of the
//! command words. Uses termimad for rendering replies inline.
//!
//! ## Commands
//!
//! - `/help` - Show REPL commands
//! - `/connect <address>` - Bind a wallet to the session
//! - `/disconnect` - Unbind the wallet
//! - `/wallet` - Show the bound wallet
//! - `/quit` or `/exit` - Exit the REPL

use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rustyline::completion::Completer;
use rustyline::config::Config;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Editor, Helper};
use termimad::MadSkin;
use tokio::sync::mpsc;

use crate::agent::{COMMAND_WORDS, HandlerResult};
use crate::channels::{Channel, IncomingMessage, MessageStream};
use crate::error::ChannelError;

/// Slash commands handled by the session loop.
const SLASH_COMMANDS: &[&str] = &["/help", "/connect", "/disconnect", "/wallet", "/quit", "/exit"];

/// Rustyline helper completing the first word of a line.
struct ReplHelper;

fn completions(prefix: &str) -> Vec<String> {
    let lower = prefix.to_ascii_lowercase();
    if lower.starts_with('/') {
        SLASH_COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(&lower))
            .map(|cmd| cmd.to_string())
            .collect()
    } else {
        COMMAND_WORDS
            .iter()
            .filter(|word| word.starts_with(&lower))
            .map(|word| word.to_string())
            .collect()
    }
}

impl Completer for ReplHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let prefix = &line[..pos];
        if prefix.is_empty() || prefix.contains(char::is_whitespace) {
            return Ok((0, vec![]));
        }
        Ok((0, completions(prefix)))
    }
}

impl Hinter for ReplHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if !line.starts_with('/') || pos < line.len() {
            return None;
        }

        SLASH_COMMANDS
            .iter()
            .find(|cmd| cmd.starts_with(line) && **cmd != line)
            .map(|cmd| cmd[line.len()..].to_string())
    }
}

impl Highlighter for ReplHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[90m{hint}\x1b[0m"))
    }
}

impl Validator for ReplHelper {}
impl Helper for ReplHelper {}

/// Build a termimad skin with our color scheme.
fn make_skin() -> MadSkin {
    let mut skin = MadSkin::default();
    skin.set_headers_fg(termimad::crossterm::style::Color::Yellow);
    skin.bold.set_fg(termimad::crossterm::style::Color::White);
    skin.italic
        .set_fg(termimad::crossterm::style::Color::Magenta);
    skin.inline_code
        .set_fg(termimad::crossterm::style::Color::Green);
    skin.code_block
        .set_fg(termimad::crossterm::style::Color::Green);
    skin.code_block.left_margin = 2;
    skin
}

fn terminal_width() -> usize {
    termimad::crossterm::terminal::size()
        .map(|(w, _)| w as usize)
        .unwrap_or(80)
}

/// Markdown for a reply: the text, then the wire plan as a JSON block.
fn reply_markdown(result: &HandlerResult) -> String {
    let mut markdown = result.response.clone();
    if let Some(transaction) = &result.transaction {
        let pretty =
            serde_json::to_string_pretty(transaction).unwrap_or_else(|_| transaction.to_string());
        markdown.push_str("\n\n```json\n");
        markdown.push_str(&pretty);
        markdown.push_str("\n```");
    }
    markdown
}

/// REPL channel with line editing and markdown rendering.
pub struct ReplChannel {
    /// Optional single message to send (for -m flag).
    single_message: Option<String>,
    /// Print the raw wire JSON instead of rendered markdown.
    raw_output: Arc<AtomicBool>,
}

impl ReplChannel {
    pub fn new() -> Self {
        Self {
            single_message: None,
            raw_output: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a REPL channel that sends a single message and exits.
    pub fn with_message(message: String) -> Self {
        Self {
            single_message: Some(message),
            raw_output: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_raw_output(&self, raw: bool) {
        self.raw_output.store(raw, Ordering::Relaxed);
    }
}

impl Default for ReplChannel {
    fn default() -> Self {
        Self::new()
    }
}

fn print_help() {
    let h = "\x1b[1m"; // bold (section headers)
    let c = "\x1b[1;36m"; // bold cyan (commands)
    let d = "\x1b[90m"; // dim gray (descriptions)
    let r = "\x1b[0m"; // reset

    println!();
    println!("  {h}defai REPL{r}");
    println!();
    println!("  {h}Session{r}");
    println!("  {c}/connect <address>{r}  {d}bind a wallet{r}");
    println!("  {c}/disconnect{r}         {d}unbind the wallet{r}");
    println!("  {c}/wallet{r}             {d}show the bound wallet{r}");
    println!("  {c}/quit{r} {c}/exit{r}         {d}exit the repl{r}");
    println!();
    println!("  {d}Type `help` for DeFi commands.{r}");
    println!();
}

/// Get the history file path (~/.defai/history).
fn history_path() -> std::path::PathBuf {
    crate::bootstrap::defai_home().join("history")
}

#[async_trait]
impl Channel for ReplChannel {
    fn name(&self) -> &str {
        "repl"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = mpsc::channel(32);
        let single_message = self.single_message.clone();

        if let Some(msg) = single_message {
            tx.send(IncomingMessage::new("repl", &msg))
                .await
                .map_err(|e| ChannelError::StartupFailed {
                    name: "repl".to_string(),
                    reason: e.to_string(),
                })?;
            drop(tx);
        } else {
            std::thread::spawn(move || {
                let config = match Config::builder().history_ignore_dups(true) {
                    Ok(builder) => builder
                        .auto_add_history(true)
                        .completion_type(CompletionType::List)
                        .build(),
                    Err(e) => {
                        eprintln!("Failed to configure line editor: {e}");
                        return;
                    }
                };

                let mut rl: Editor<ReplHelper, DefaultHistory> = match Editor::with_config(config) {
                    Ok(editor) => editor,
                    Err(e) => {
                        eprintln!("Failed to initialize line editor: {e}");
                        return;
                    }
                };
                rl.set_helper(Some(ReplHelper));

                let hist_path = history_path();
                if let Some(parent) = hist_path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                let _ = rl.load_history(&hist_path);

                println!("\x1b[1mdefai\x1b[0m  `help` for commands, /help for the REPL, /quit to exit");
                println!();

                loop {
                    match rl.readline("\x1b[1;36m\u{203A}\x1b[0m ") {
                        Ok(line) => {
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            if line.eq_ignore_ascii_case("/help") {
                                print_help();
                                continue;
                            }

                            let quitting = matches!(
                                line.to_ascii_lowercase().as_str(),
                                "/quit" | "/exit"
                            );
                            if tx.blocking_send(IncomingMessage::new("repl", line)).is_err()
                                || quitting
                            {
                                break;
                            }
                        }
                        // Ctrl+C clears the line, Ctrl+D exits.
                        Err(ReadlineError::Interrupted) => continue,
                        Err(ReadlineError::Eof) => {
                            let _ = tx.blocking_send(IncomingMessage::new("repl", "/quit"));
                            break;
                        }
                        Err(e) => {
                            eprintln!("Input error: {e}");
                            break;
                        }
                    }
                }

                let _ = rl.save_history(&hist_path);
            });
        }

        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        })))
    }

    async fn respond(&self, result: &HandlerResult) -> Result<(), ChannelError> {
        if self.raw_output.load(Ordering::Relaxed) {
            let raw = serde_json::json!({
                "response": result.response,
                "transaction": result.transaction,
            });
            println!("{raw}");
            return Ok(());
        }

        let width = terminal_width();
        eprintln!("\x1b[90m{}\x1b[0m", "\u{2500}".repeat(width.min(80)));

        let skin = make_skin();
        let markdown = reply_markdown(result);
        let text = termimad::FmtText::from(&skin, &markdown, Some(width));
        print!("{text}");
        println!();
        Ok(())
    }

    async fn notice(&self, text: &str) -> Result<(), ChannelError> {
        eprintln!("  \x1b[90m{text}\x1b[0m");
        Ok(())
    }
}
