//! Quoting, transaction building and plan lifecycle.

pub mod builder;
pub mod confirm;
pub mod nonce;
pub mod oracle;
pub mod plan;
pub mod quote;
pub mod units;

pub use self::builder::{BuiltPlan, TransactionBuilder};
pub use self::confirm::{ConfirmationEntry, ConfirmationQueue};
pub use self::nonce::{NonceRange, NonceSequencer, WalletLease};
pub use self::oracle::{LegacyRatioTable, LiquidityQuoteMode, PriceOracle, ReserveOracle};
pub use self::plan::{FeeParams, PlanStep, PreparedTransaction, TransactionPlan, TxDraft};
pub use self::quote::{QuoteService, SwapQuote, SwapRoute};
