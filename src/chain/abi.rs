//! Contract ABIs and calldata helpers for BlazeSwap, ERC20, WNAT and sFLR.

use std::sync::LazyLock;

use ethers::abi::{Abi, Function, Token, parse_abi};
use ethers::types::{Address, Bytes, U256};

use crate::error::ChainError;

static ROUTER_ABI: LazyLock<Result<Abi, String>> = LazyLock::new(|| {
    parse_abi(&[
        "function getAmountsOut(uint256 amountIn, address[] path) view returns (uint256[] amounts)",
        "function swapExactNATForTokens(uint256 amountOutMin, address[] path, address to, uint256 deadline) payable returns (uint256[] amounts)",
        "function swapExactTokensForNAT(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline) returns (uint256[] amounts)",
        "function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline) returns (uint256[] amounts)",
        "function addLiquidityNAT(address token, uint256 amountTokenDesired, uint256 amountTokenMin, uint256 amountNATMin, uint256 feeBipsToken, address to, uint256 deadline) payable returns (uint256 amountToken, uint256 amountNAT, uint256 liquidity)",
        "function addLiquidity(address tokenA, address tokenB, uint256 amountADesired, uint256 amountBDesired, uint256 amountAMin, uint256 amountBMin, uint256 feeBipsA, uint256 feeBipsB, address to, uint256 deadline) returns (uint256 amountA, uint256 amountB, uint256 liquidity)",
    ])
    .map_err(|e| e.to_string())
});

static ERC20_ABI: LazyLock<Result<Abi, String>> = LazyLock::new(|| {
    parse_abi(&[
        "function allowance(address owner, address spender) view returns (uint256)",
        "function approve(address spender, uint256 amount) returns (bool)",
        "function balanceOf(address account) view returns (uint256)",
    ])
    .map_err(|e| e.to_string())
});

static WNAT_ABI: LazyLock<Result<Abi, String>> = LazyLock::new(|| {
    parse_abi(&["function deposit() payable", "function withdraw(uint256 amount)"])
        .map_err(|e| e.to_string())
});

static STAKING_ABI: LazyLock<Result<Abi, String>> = LazyLock::new(|| {
    parse_abi(&["function submit() payable returns (uint256)"]).map_err(|e| e.to_string())
});

static FACTORY_ABI: LazyLock<Result<Abi, String>> = LazyLock::new(|| {
    parse_abi(&["function getPair(address tokenA, address tokenB) view returns (address pair)"])
        .map_err(|e| e.to_string())
});

static PAIR_ABI: LazyLock<Result<Abi, String>> = LazyLock::new(|| {
    parse_abi(&[
        "function getReserves() view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast)",
    ])
    .map_err(|e| e.to_string())
});

/// Contract families the builder talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contract {
    Router,
    Erc20,
    WrappedNative,
    Staking,
    Factory,
    Pair,
}

impl Contract {
    fn abi(self) -> Result<&'static Abi, ChainError> {
        let parsed = match self {
            Self::Router => &*ROUTER_ABI,
            Self::Erc20 => &*ERC20_ABI,
            Self::WrappedNative => &*WNAT_ABI,
            Self::Staking => &*STAKING_ABI,
            Self::Factory => &*FACTORY_ABI,
            Self::Pair => &*PAIR_ABI,
        };
        parsed.as_ref().map_err(|reason| ChainError::Decode {
            what: format!("{self:?} ABI"),
            reason: reason.clone(),
        })
    }

    pub fn function(self, name: &str) -> Result<&'static Function, ChainError> {
        Ok(self.abi()?.function(name)?)
    }

    /// 4-byte selector for `name`.
    pub fn selector(self, name: &str) -> Result<[u8; 4], ChainError> {
        Ok(self.function(name)?.short_signature())
    }

    pub fn encode(self, name: &str, args: &[Token]) -> Result<Bytes, ChainError> {
        Ok(Bytes::from(self.function(name)?.encode_input(args)?))
    }

    pub fn decode_output(self, name: &str, data: &[u8]) -> Result<Vec<Token>, ChainError> {
        Ok(self.function(name)?.decode_output(data)?)
    }
}

fn path_token(path: &[Address]) -> Token {
    Token::Array(path.iter().copied().map(Token::Address).collect())
}

pub fn get_amounts_out(amount_in: U256, path: &[Address]) -> Result<Bytes, ChainError> {
    Contract::Router.encode(
        "getAmountsOut",
        &[Token::Uint(amount_in), path_token(path)],
    )
}

/// Last element of a `getAmountsOut` result.
pub fn decode_amount_out(data: &[u8]) -> Result<U256, ChainError> {
    let tokens = Contract::Router.decode_output("getAmountsOut", data)?;
    tokens
        .into_iter()
        .next()
        .and_then(Token::into_array)
        .and_then(|amounts| amounts.into_iter().last())
        .and_then(Token::into_uint)
        .ok_or_else(|| ChainError::Decode {
            what: "getAmountsOut".to_string(),
            reason: "empty amounts array".to_string(),
        })
}

pub fn swap_exact_nat_for_tokens(
    amount_out_min: U256,
    path: &[Address],
    to: Address,
    deadline: U256,
) -> Result<Bytes, ChainError> {
    Contract::Router.encode(
        "swapExactNATForTokens",
        &[
            Token::Uint(amount_out_min),
            path_token(path),
            Token::Address(to),
            Token::Uint(deadline),
        ],
    )
}

/// `swapExactTokensForNAT` or `swapExactTokensForTokens`; both share the
/// `(amountIn, amountOutMin, path, to, deadline)` layout.
pub fn swap_exact_tokens(
    function: &str,
    amount_in: U256,
    amount_out_min: U256,
    path: &[Address],
    to: Address,
    deadline: U256,
) -> Result<Bytes, ChainError> {
    Contract::Router.encode(
        function,
        &[
            Token::Uint(amount_in),
            Token::Uint(amount_out_min),
            path_token(path),
            Token::Address(to),
            Token::Uint(deadline),
        ],
    )
}

pub struct AddLiquidityNatArgs {
    pub token: Address,
    pub amount_token_desired: U256,
    pub amount_token_min: U256,
    pub amount_nat_min: U256,
    pub fee_bips_token: U256,
    pub to: Address,
    pub deadline: U256,
}

pub fn add_liquidity_nat(args: &AddLiquidityNatArgs) -> Result<Bytes, ChainError> {
    Contract::Router.encode(
        "addLiquidityNAT",
        &[
            Token::Address(args.token),
            Token::Uint(args.amount_token_desired),
            Token::Uint(args.amount_token_min),
            Token::Uint(args.amount_nat_min),
            Token::Uint(args.fee_bips_token),
            Token::Address(args.to),
            Token::Uint(args.deadline),
        ],
    )
}

pub struct AddLiquidityArgs {
    pub token_a: Address,
    pub token_b: Address,
    pub amount_a_desired: U256,
    pub amount_b_desired: U256,
    pub amount_a_min: U256,
    pub amount_b_min: U256,
    pub fee_bips_a: U256,
    pub fee_bips_b: U256,
    pub to: Address,
    pub deadline: U256,
}

pub fn add_liquidity(args: &AddLiquidityArgs) -> Result<Bytes, ChainError> {
    Contract::Router.encode(
        "addLiquidity",
        &[
            Token::Address(args.token_a),
            Token::Address(args.token_b),
            Token::Uint(args.amount_a_desired),
            Token::Uint(args.amount_b_desired),
            Token::Uint(args.amount_a_min),
            Token::Uint(args.amount_b_min),
            Token::Uint(args.fee_bips_a),
            Token::Uint(args.fee_bips_b),
            Token::Address(args.to),
            Token::Uint(args.deadline),
        ],
    )
}

pub fn allowance(owner: Address, spender: Address) -> Result<Bytes, ChainError> {
    Contract::Erc20.encode(
        "allowance",
        &[Token::Address(owner), Token::Address(spender)],
    )
}

pub fn approve(spender: Address, amount: U256) -> Result<Bytes, ChainError> {
    Contract::Erc20.encode("approve", &[Token::Address(spender), Token::Uint(amount)])
}

pub fn balance_of(account: Address) -> Result<Bytes, ChainError> {
    Contract::Erc20.encode("balanceOf", &[Token::Address(account)])
}

/// Decode a single `uint256` return value (`allowance`, `balanceOf`).
pub fn decode_uint(contract: Contract, name: &str, data: &[u8]) -> Result<U256, ChainError> {
    contract
        .decode_output(name, data)?
        .into_iter()
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| ChainError::Decode {
            what: name.to_string(),
            reason: "expected a uint256".to_string(),
        })
}

pub fn deposit() -> Result<Bytes, ChainError> {
    Contract::WrappedNative.encode("deposit", &[])
}

pub fn withdraw(amount: U256) -> Result<Bytes, ChainError> {
    Contract::WrappedNative.encode("withdraw", &[Token::Uint(amount)])
}

pub fn submit() -> Result<Bytes, ChainError> {
    Contract::Staking.encode("submit", &[])
}

pub fn get_pair(token_a: Address, token_b: Address) -> Result<Bytes, ChainError> {
    Contract::Factory.encode(
        "getPair",
        &[Token::Address(token_a), Token::Address(token_b)],
    )
}

pub fn decode_pair(data: &[u8]) -> Result<Address, ChainError> {
    Contract::Factory
        .decode_output("getPair", data)?
        .into_iter()
        .next()
        .and_then(Token::into_address)
        .ok_or_else(|| ChainError::Decode {
            what: "getPair".to_string(),
            reason: "expected an address".to_string(),
        })
}

pub fn get_reserves() -> Result<Bytes, ChainError> {
    Contract::Pair.encode("getReserves", &[])
}

/// `(reserve0, reserve1)` of a pair.
pub fn decode_reserves(data: &[u8]) -> Result<(U256, U256), ChainError> {
    let mut tokens = Contract::Pair.decode_output("getReserves", data)?.into_iter();
    let reserve0 = tokens.next().and_then(Token::into_uint);
    let reserve1 = tokens.next().and_then(Token::into_uint);
    match (reserve0, reserve1) {
        (Some(r0), Some(r1)) => Ok((r0, r1)),
        _ => Err(ChainError::Decode {
            what: "getReserves".to_string(),
            reason: "expected two reserves".to_string(),
        }),
    }
}
