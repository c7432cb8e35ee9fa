//! Input channels and the session loop that feeds them to the router.
//!
//! A channel produces a stream of lines and renders replies. The session
//! loop owns the bound wallet, handles the slash commands that change it,
//! and passes everything else to [`CommandRouter::route`].

mod repl;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::Address;
use futures::{Stream, StreamExt};

use crate::agent::{CommandRouter, HandlerResult};
use crate::error::ChannelError;
use crate::network::{checksum, mask_address, parse_address};

pub use self::repl::ReplChannel;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub channel: String,
    pub content: String,
}

impl IncomingMessage {
    pub fn new(channel: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            content: content.to_string(),
        }
    }
}

pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start reading input. The stream ends when the user quits.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Render a router reply.
    async fn respond(&self, result: &HandlerResult) -> Result<(), ChannelError>;

    /// Render a local notice that did not come from the router.
    async fn notice(&self, text: &str) -> Result<(), ChannelError>;
}

/// Session-level commands handled before routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SessionCommand<'a> {
    Quit,
    Connect(Result<Address, String>),
    Disconnect,
    Wallet,
    Route(&'a str),
}

pub(crate) fn parse_session_command(line: &str) -> SessionCommand<'_> {
    let trimmed = line.trim();
    let mut parts = trimmed.split_whitespace();
    match parts.next().map(str::to_ascii_lowercase).as_deref() {
        Some("/quit" | "/exit") => SessionCommand::Quit,
        Some("/connect") => match (parts.next(), parts.next()) {
            (Some(raw), None) => SessionCommand::Connect(parse_address(raw)),
            _ => SessionCommand::Connect(Err("Usage: /connect <address>".to_string())),
        },
        Some("/disconnect") => SessionCommand::Disconnect,
        Some("/wallet") => SessionCommand::Wallet,
        _ => SessionCommand::Route(trimmed),
    }
}

/// Text for `/wallet`: the bound wallet and whether `attest` was answered.
pub(crate) fn wallet_status(wallet: Option<Address>, attested: bool) -> String {
    let wallet = match wallet {
        Some(address) => format!("Connected wallet: {}", checksum(&address)),
        None => "No wallet connected. Use /connect <address>.".to_string(),
    };
    let attestation = if attested { "requested" } else { "not requested" };
    format!("{wallet}\nAttestation: {attestation} this session.")
}

/// Drive `channel` until its stream ends or the user quits.
///
/// `persist_wallet` is called with the checksummed address whenever
/// `/connect` binds a new wallet.
pub async fn run_session<F>(
    channel: &dyn Channel,
    router: Arc<CommandRouter>,
    mut wallet: Option<Address>,
    persist_wallet: F,
) -> Result<(), ChannelError>
where
    F: Fn(&str) -> std::io::Result<()>,
{
    let mut messages = channel.start().await?;
    tracing::info!(channel = channel.name(), network = %router.network().id, "Session started");

    while let Some(message) = messages.next().await {
        match parse_session_command(&message.content) {
            SessionCommand::Quit => break,
            SessionCommand::Connect(Ok(address)) => {
                wallet = Some(address);
                if let Err(e) = persist_wallet(&checksum(&address)) {
                    tracing::warn!("Failed to persist wallet address: {}", e);
                }
                channel
                    .notice(&format!("Wallet connected: {}", mask_address(&address)))
                    .await?;
            }
            SessionCommand::Connect(Err(reason)) => channel.notice(&reason).await?,
            SessionCommand::Disconnect => {
                wallet = None;
                channel.notice("Wallet disconnected.").await?;
            }
            SessionCommand::Wallet => {
                channel
                    .notice(&wallet_status(wallet, router.attestation_requested()))
                    .await?;
            }
            SessionCommand::Route(text) => {
                let result = router.route(text, wallet).await;
                channel.respond(&result).await?;
            }
        }
    }

    tracing::info!(channel = channel.name(), "Session ended");
    Ok(())
}
