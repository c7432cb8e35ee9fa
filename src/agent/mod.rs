//! Command routing: literal grammar, classification and intent handlers.

mod classifier;
mod commands;
mod intent;
mod router;

pub use classifier::{Classifier, LlmClassifier};
pub use intent::{COMMAND_WORDS, Intent, LiteralCommand, find_embedded_swap, parse_literal};
pub use router::{CommandRouter, HandlerResult, RouterDeps};
