//! Prepared EIP-1559 transactions and ordered transaction plans.

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, U64, U256};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::chain::ChainClient;
use crate::defi::nonce::NonceRange;
use crate::error::{ChainError, CommandError};
use crate::network::checksum;

/// EIP-1559 fee fields shared by every transaction in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeParams {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

impl FeeParams {
    /// `maxFeePerGas = gasPrice * 2`; the priority fee is the node's value,
    /// capped at the max fee.
    pub fn from_node(gas_price: U256, priority_fee: U256) -> Self {
        let max_fee_per_gas = gas_price.saturating_mul(U256::from(2u8));
        Self {
            max_fee_per_gas,
            max_priority_fee_per_gas: priority_fee.min(max_fee_per_gas),
        }
    }

    pub async fn fetch(chain: &dyn ChainClient) -> Result<Self, ChainError> {
        let gas_price = chain.gas_price().await?;
        let priority_fee = chain.max_priority_fee().await?;
        Ok(Self::from_node(gas_price, priority_fee))
    }
}

/// A transaction before nonce and fees are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxDraft {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_limit: U256,
    pub description: String,
}

fn checksum_address<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&checksum(address))
}

/// Wire form: every numeric field is a `0x` hex string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedTransaction {
    #[serde(serialize_with = "checksum_address")]
    pub from: Address,
    #[serde(serialize_with = "checksum_address")]
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub nonce: U256,
    pub chain_id: U64,
    #[serde(rename = "type")]
    pub tx_type: U64,
}

impl PreparedTransaction {
    /// The same transaction as an ethers request, ready to sign.
    pub fn to_typed(&self) -> TypedTransaction {
        Eip1559TransactionRequest::new()
            .from(self.from)
            .to(self.to)
            .value(self.value)
            .data(self.data.clone())
            .gas(self.gas)
            .max_fee_per_gas(self.max_fee_per_gas)
            .max_priority_fee_per_gas(self.max_priority_fee_per_gas)
            .nonce(self.nonce)
            .chain_id(self.chain_id)
            .into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    pub tx: PreparedTransaction,
    pub description: String,
}

/// Ordered transactions for one wallet with contiguous nonces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPlan {
    pub id: Uuid,
    pub wallet: Address,
    pub steps: Vec<PlanStep>,
}

impl TransactionPlan {
    /// Attach nonces, fees and chain id to drafts in order.
    pub fn assemble(
        wallet: Address,
        chain_id: u64,
        fees: FeeParams,
        drafts: Vec<TxDraft>,
        nonces: NonceRange,
    ) -> Result<Self, CommandError> {
        if drafts.is_empty() {
            return Err(CommandError::validation("Nothing to build."));
        }
        if drafts.len() != nonces.len() {
            return Err(CommandError::validation(format!(
                "Allocated {} nonces for {} transactions.",
                nonces.len(),
                drafts.len()
            )));
        }

        let steps = drafts
            .into_iter()
            .zip(nonces.iter())
            .map(|(draft, nonce)| PlanStep {
                tx: PreparedTransaction {
                    from: wallet,
                    to: draft.to,
                    value: draft.value,
                    data: draft.data,
                    gas: draft.gas_limit,
                    max_fee_per_gas: fees.max_fee_per_gas,
                    max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
                    nonce,
                    chain_id: U64::from(chain_id),
                    tx_type: U64::from(2u8),
                },
                description: draft.description,
            })
            .collect();

        Ok(Self {
            id: Uuid::new_v4(),
            wallet,
            steps,
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Single-step plans serialize as the bare transaction; multi-step plans
    /// as an ordered `[{tx, description}]` array.
    pub fn to_wire(&self) -> serde_json::Value {
        match self.steps.as_slice() {
            [single] => serde_json::to_value(&single.tx).unwrap_or_default(),
            steps => serde_json::to_value(steps).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn draft(description: &str, gas: u64) -> TxDraft {
        TxDraft {
            to: Address::repeat_byte(0x22),
            data: Bytes::from(vec![0xd0, 0xe3, 0x0d, 0xb0]),
            value: U256::from(1_000u64),
            gas_limit: U256::from(gas),
            description: description.to_string(),
        }
    }

    #[test]
    fn fee_doubling_caps_priority() {
        let fees = FeeParams::from_node(U256::from(25u64), U256::from(3u64));
        assert_eq!(fees.max_fee_per_gas, U256::from(50u64));
        assert_eq!(fees.max_priority_fee_per_gas, U256::from(3u64));

        let capped = FeeParams::from_node(U256::from(1u64), U256::from(9u64));
        assert_eq!(capped.max_priority_fee_per_gas, U256::from(2u64));
    }

    #[test]
    fn single_step_wire_form_is_hex() {
        let wallet = Address::repeat_byte(0x11);
        let fees = FeeParams::from_node(U256::from(25u64), U256::from(0u64));
        let plan = TransactionPlan::assemble(
            wallet,
            14,
            fees,
            vec![draft("Wrap", 36_000)],
            NonceRange::new(U256::from(5u64), 1),
        )
        .unwrap();

        assert_eq!(
            plan.to_wire(),
            json!({
                "from": checksum(&wallet),
                "to": checksum(&Address::repeat_byte(0x22)),
                "value": "0x3e8",
                "data": "0xd0e30db0",
                "gas": "0x8ca0",
                "maxFeePerGas": "0x32",
                "maxPriorityFeePerGas": "0x0",
                "nonce": "0x5",
                "chainId": "0xe",
                "type": "0x2",
            })
        );
    }

    #[test]
    fn multi_step_wire_form_keeps_order() {
        let fees = FeeParams::from_node(U256::from(1u64), U256::from(1u64));
        let plan = TransactionPlan::assemble(
            Address::repeat_byte(0x11),
            14,
            fees,
            vec![draft("Approve", 100_000), draft("Add liquidity", 300_000)],
            NonceRange::new(U256::from(9u64), 2),
        )
        .unwrap();

        let wire = plan.to_wire();
        let steps = wire.as_array().expect("array");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0]["description"], "Approve");
        assert_eq!(steps[0]["tx"]["nonce"], "0x9");
        assert_eq!(steps[1]["tx"]["nonce"], "0xa");
        assert_eq!(steps[1]["description"], "Add liquidity");
    }

    #[test]
    fn mismatched_nonce_count_is_rejected() {
        let fees = FeeParams::from_node(U256::one(), U256::zero());
        let err = TransactionPlan::assemble(
            Address::zero(),
            14,
            fees,
            vec![draft("a", 1), draft("b", 1)],
            NonceRange::new(U256::zero(), 1),
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::Validation(_)));
    }
}
