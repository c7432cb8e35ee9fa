//! Prompt templates and response schemas.
//!
//! Placeholders are written `{name}` and filled by [`render`].

use serde_json::{Value, json};

/// Persona sent as the system message of every request.
pub const PERSONA: &str = "You are Artemis, a DeFi assistant for the Flare network. \
You explain BlazeSwap swaps, liquidity pools, sFLR staking and Flare's enshrined data \
protocols (FTSO, FDC) accurately and concisely. You never invent balances, prices or \
transaction hashes.";

pub const SEMANTIC_ROUTER: &str = r#"Classify the user input into exactly one category.

Categories, most specific first:
- STAKE_FLR: staking FLR for sFLR ("stake 10 FLR", "I want to stake my flare")
- CHECK_BALANCE: asking for the wallet or token balance
- SEND_TOKEN: transferring tokens to another address
- CROSS_CHAIN_SWAP: exchanging tokens across chains or bridging ("swap FLR to USDC on Arbitrum")
- SWAP_TOKEN: exchanging one token for another on Flare
- ADD_LIQUIDITY_NAT: providing FLR plus a token to a liquidity pool
- REQUEST_ATTESTATION: asking to verify or attest the enclave
- CONVERSATIONAL: anything else, including greetings and ambiguous requests

Ignore politeness and filler. If unsure, answer CONVERSATIONAL.

Input: {user_input}"#;

pub const TOKEN_SEND: &str = r#"Extract the destination address and amount for a token transfer.

- to_address: the complete 0x-prefixed, 42-character hexadecimal address, unmodified
- amount: the first positive number mentioned, written numbers converted to digits

Leave a field empty rather than guessing.

Input: {user_input}"#;

pub const TOKEN_SWAP: &str = r#"Extract a same-chain token swap.

- from_token: symbol of the token being sold, uppercase
- to_token: symbol of the token being bought, uppercase, different from from_token
- amount: the first positive number mentioned

Known symbols: {symbols}. Leave a field empty rather than guessing.

Input: {user_input}"#;

pub const CROSS_CHAIN_SWAP: &str = r#"Extract the amount of FLR the user wants to move to another chain.

- amount: the first positive number mentioned

Input: {user_input}"#;

pub const ADD_LIQUIDITY_NAT: &str = r#"Extract a liquidity deposit pairing native FLR with one token.

- token: symbol of the non-native token, uppercase
- amount_native: the amount of FLR, a positive number

Known symbols: {symbols}. Leave a field empty rather than guessing.

Input: {user_input}"#;

pub const FOLLOW_UP: &str = r#"The user's request could not be completed because {missing} was missing or invalid.
Ask them, in one or two friendly sentences, to resend the request with that information.
Show one concrete example, such as: {example}

Original request: {user_input}"#;

pub const CONVERSATIONAL: &str = r#"Answer the user's message. Be accurate about Flare and say so when you do not know.

<input>
{user_input}
</input>"#;

pub const REMOTE_ATTESTATION: &str = r#"The user wants to verify the assistant with a remote attestation. Explain the process:

1. They send a single random message of 10 to 74 letters and digits, and nothing else.
2. The reply is an attestation token (a JWT).
3. They paste it into a JWT decoder such as jwt.io, check that the payload contains their exact message, and check that the signature and claims are valid."#;

pub const RISK_STRATEGY: &str = r#"The user rated their risk tolerance {score} on a scale of 1 (conservative) to 10 (aggressive).
Suggest a short DeFi strategy on Flare using only these building blocks: holding FLR, staking FLR for sFLR,
BlazeSwap swaps between {symbols}, and BlazeSwap liquidity pools.
Give an allocation in percentages and one sentence of reasoning per position. Use Markdown."#;

/// Substitute `{key}` placeholders.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}

pub fn router_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "category": {
                "type": "string",
                "enum": [
                    "STAKE_FLR",
                    "CHECK_BALANCE",
                    "SEND_TOKEN",
                    "CROSS_CHAIN_SWAP",
                    "SWAP_TOKEN",
                    "ADD_LIQUIDITY_NAT",
                    "REQUEST_ATTESTATION",
                    "CONVERSATIONAL"
                ]
            }
        },
        "required": ["category"]
    })
}

pub fn send_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "to_address": { "type": "string" },
            "amount": { "type": "number" }
        },
        "required": ["to_address", "amount"]
    })
}

pub fn swap_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "from_token": { "type": "string" },
            "to_token": { "type": "string" },
            "amount": { "type": "number" }
        },
        "required": ["from_token", "to_token", "amount"]
    })
}

pub fn amount_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "amount": { "type": "number" } },
        "required": ["amount"]
    })
}

pub fn liquidity_nat_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "token": { "type": "string" },
            "amount_native": { "type": "number" }
        },
        "required": ["token", "amount_native"]
    })
}
