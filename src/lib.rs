//! defai: a command router that turns Flare DeFi requests into
//! ready-to-sign EIP-1559 transaction plans.

pub mod agent;
pub mod bootstrap;
pub mod chain;
pub mod channels;
pub mod config;
pub mod defi;
pub mod error;
pub mod llm;
pub mod network;
pub mod settings;
pub mod signer;
