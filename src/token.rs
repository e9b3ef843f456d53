//! Read views of ledger tokens, answered in place of contract code.

use std::collections::HashMap;

use alloy_primitives::{Address, Bytes, U256};
use evm_tracer::{Intercept, Intercepted};
use once_cell::sync::Lazy;
use tracing::debug;

use crate::{
    common::{EntityId, Nft, hash::selector},
    error::RepositoryError,
    repository::{RepoResult, Repository},
    state::StateProvider,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Method {
    Name,
    Symbol,
    Decimals,
    TotalSupply,
    BalanceOf,
    Allowance,
    OwnerOf,
    TokenUri,
}

static METHODS: Lazy<HashMap<[u8; 4], Method>> = Lazy::new(|| {
    HashMap::from([
        (selector("name()"), Method::Name),
        (selector("symbol()"), Method::Symbol),
        (selector("decimals()"), Method::Decimals),
        (selector("totalSupply()"), Method::TotalSupply),
        (selector("balanceOf(address)"), Method::BalanceOf),
        (selector("allowance(address,address)"), Method::Allowance),
        (selector("ownerOf(uint256)"), Method::OwnerOf),
        (selector("tokenURI(uint256)"), Method::TokenUri),
    ])
});

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenCall {
    Name,
    Symbol,
    Decimals,
    TotalSupply,
    BalanceOf(Address),
    Allowance { owner: Address, spender: Address },
    OwnerOf(U256),
    TokenUri(U256),
}

fn arg(input: &[u8], index: usize) -> Option<U256> {
    let start = 4 + 32 * index;
    input.get(start..start + 32).map(U256::from_be_slice)
}

fn address_arg(input: &[u8], index: usize) -> Option<Address> {
    let word = arg(input, index)?;
    (word >> 160usize).is_zero().then(|| Address::from_word(word.into()))
}

impl TokenCall {
    pub fn decode(input: &[u8]) -> Option<Self> {
        let selector: [u8; 4] = input.get(..4)?.try_into().ok()?;
        let call = match METHODS.get(&selector)? {
            Method::Name => Self::Name,
            Method::Symbol => Self::Symbol,
            Method::Decimals => Self::Decimals,
            Method::TotalSupply => Self::TotalSupply,
            Method::BalanceOf => Self::BalanceOf(address_arg(input, 0)?),
            Method::Allowance => Self::Allowance {
                owner: address_arg(input, 0)?,
                spender: address_arg(input, 1)?,
            },
            Method::OwnerOf => Self::OwnerOf(arg(input, 0)?),
            Method::TokenUri => Self::TokenUri(arg(input, 0)?),
        };
        Some(call)
    }
}

fn encode_word(value: U256) -> Bytes {
    Bytes::copy_from_slice(&value.to_be_bytes::<32>())
}

fn encode_address(address: Address) -> Bytes {
    Bytes::copy_from_slice(address.into_word().as_slice())
}

fn encode_string(value: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(64 + value.len().div_ceil(32) * 32);
    out.extend_from_slice(&U256::from(32).to_be_bytes::<32>());
    out.extend_from_slice(&U256::from(value.len()).to_be_bytes::<32>());
    out.extend_from_slice(value);
    out.resize(64 + value.len().div_ceil(32) * 32, 0);
    out.into()
}

/// Intercepts calls to token addresses and answers them from the snapshot.
///
/// A repository failure during interception reverts the frame and is kept
/// so the executor can report it instead of the revert.
pub struct TokenFacade<'p, 'a, R: ?Sized> {
    state: &'p StateProvider<'a, R>,
    gas_cost: u64,
    failure: Option<RepositoryError>,
}

impl<'p, 'a, R: Repository + ?Sized> TokenFacade<'p, 'a, R> {
    pub fn new(state: &'p StateProvider<'a, R>, gas_cost: u64) -> Self {
        Self {
            state,
            gas_cost,
            failure: None,
        }
    }

    pub fn take_failure(&mut self) -> Option<RepositoryError> {
        self.failure.take()
    }

    fn entity_id(&self, address: &Address) -> RepoResult<Option<EntityId>> {
        Ok(self.state.entity(address)?.map(|entity| entity.id))
    }

    /// `None` when the call does not apply to this token.
    pub fn answer(&self, token: EntityId, call: &TokenCall) -> RepoResult<Option<Bytes>> {
        let Some(info) = self.state.token(token)? else {
            return Ok(None);
        };
        let fungible = info.is_fungible();
        let output = match call {
            TokenCall::Name => Some(encode_string(info.name.as_bytes())),
            TokenCall::Symbol => Some(encode_string(info.symbol.as_bytes())),
            TokenCall::Decimals => fungible.then(|| encode_word(U256::from(info.decimals))),
            TokenCall::TotalSupply => Some(encode_word(info.total_supply)),
            TokenCall::BalanceOf(account) => {
                let balance = match self.entity_id(account)? {
                    Some(account) => self.state.token_balance(token, account)?,
                    None => U256::ZERO,
                };
                Some(encode_word(balance))
            }
            TokenCall::Allowance { owner, spender } if fungible => {
                let amount = match (self.entity_id(owner)?, self.entity_id(spender)?) {
                    (Some(owner), Some(spender)) => {
                        self.state.token_allowance(token, owner, spender)?
                    }
                    _ => U256::ZERO,
                };
                Some(encode_word(amount))
            }
            TokenCall::OwnerOf(serial) if !fungible => match self.nft(token, *serial)? {
                Some(nft) => match nft.owner {
                    Some(owner) => Some(encode_address(self.address_of(owner)?)),
                    None => None,
                },
                None => None,
            },
            TokenCall::TokenUri(serial) if !fungible => self
                .nft(token, *serial)?
                .map(|nft| encode_string(&nft.metadata)),
            _ => None,
        };
        Ok(output)
    }

    fn nft(&self, token: EntityId, serial: U256) -> RepoResult<Option<Nft>> {
        match u64::try_from(serial) {
            Ok(serial) => self.state.nft(token, serial),
            Err(_) => Ok(None),
        }
    }

    fn address_of(&self, id: EntityId) -> RepoResult<Address> {
        Ok(self
            .state
            .entity_by_id(id)?
            .map(|entity| entity.address())
            .unwrap_or_else(|| id.to_address()))
    }

    fn intercept_token(
        &mut self,
        code_address: Address,
        input: &[u8],
    ) -> RepoResult<Option<Intercepted>> {
        let token = match self.state.entity(&code_address)? {
            Some(entity) if entity.is_token() => entity.id,
            _ => return Ok(None),
        };
        let Some(call) = TokenCall::decode(input) else {
            debug!(%token, "unsupported token call");
            return Ok(Some(Intercepted::revert(Bytes::new(), self.gas_cost)));
        };
        let answer = match self.answer(token, &call)? {
            Some(output) => Intercepted::ok(output, self.gas_cost),
            None => {
                debug!(%token, ?call, "token call not applicable");
                Intercepted::revert(Bytes::new(), self.gas_cost)
            }
        };
        Ok(Some(answer))
    }
}

impl<R: Repository + ?Sized> Intercept for TokenFacade<'_, '_, R> {
    fn intercept(&mut self, code_address: Address, input: &[u8]) -> Option<Intercepted> {
        match self.intercept_token(code_address, input) {
            Ok(answer) => answer,
            Err(err) => {
                self.failure.get_or_insert(err);
                Some(Intercepted::revert(Bytes::new(), 0))
            }
        }
    }
}
