//! # External Protocol Calls
//!
//! Strategy adapters talk to yield protocols through one primitive:
//! `call(target, function, args) -> bytes | failure`. A [`ProtocolCall`] is
//! the tagged descriptor for such a call; a [`ProtocolClient`] executes it.
//!
//! The vault never interprets `args` beyond the amount words it prepends
//! itself. Everything protocol-specific (how a lending market wants its
//! deposit encoded, what a staking contract returns from a balance query)
//! is the business of whoever configured the binding and supplies the extra
//! call data. That is what lets one adapter type front any number of
//! protocols.
//!
//! ## Amount Words
//!
//! Amounts are encoded as 16-byte big-endian words ([`encode_word`]). An
//! adapter's deposit call carries `word(amount) || caller_data`; a balance
//! query is expected to answer with a single word.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::config::WORD_LENGTH;
use crate::types::{Address, Amount, FunctionId};

/// Integration failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The external call reverted.
    #[error("call to {target} function {function} reverted: {reason}")]
    Reverted {
        target: Address,
        function: FunctionId,
        reason: String,
    },

    /// The call returned bytes that could not be decoded.
    #[error("malformed response from {target}: {reason}")]
    MalformedResponse { target: Address, reason: String },
}

/// A call descriptor: which contract, which entry point, which arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolCall {
    pub target: Address,
    pub function: FunctionId,
    pub args: Vec<u8>,
}

impl ProtocolCall {
    pub fn new(target: Address, function: FunctionId, args: Vec<u8>) -> Self {
        Self {
            target,
            function,
            args,
        }
    }

    /// A call whose arguments are `word(amount) || extra`.
    pub fn with_amount(target: Address, function: FunctionId, amount: Amount, extra: &[u8]) -> Self {
        let mut args = Vec::with_capacity(WORD_LENGTH + extra.len());
        args.extend_from_slice(&encode_word(amount));
        args.extend_from_slice(extra);
        Self::new(target, function, args)
    }
}

/// Executes protocol calls.
pub trait ProtocolClient {
    /// A state-changing call.
    fn call(&mut self, call: &ProtocolCall) -> Result<Vec<u8>, ProtocolError>;

    /// A read-only call. Must not change protocol state.
    fn query(&self, call: &ProtocolCall) -> Result<Vec<u8>, ProtocolError>;
}

/// Encodes an amount as a big-endian word.
pub fn encode_word(amount: Amount) -> [u8; WORD_LENGTH] {
    amount.to_be_bytes()
}

/// Decodes the leading word of `bytes`.
pub fn decode_word(target: Address, bytes: &[u8]) -> Result<Amount, ProtocolError> {
    let word: [u8; WORD_LENGTH] = bytes
        .get(..WORD_LENGTH)
        .and_then(|w| w.try_into().ok())
        .ok_or_else(|| ProtocolError::MalformedResponse {
            target,
            reason: format!("expected {} bytes, got {}", WORD_LENGTH, bytes.len()),
        })?;
    Ok(Amount::from_be_bytes(word))
}

/// A scripted stand-in for an external protocol.
///
/// Every state-changing call is recorded. Individual functions can be made
/// to revert, and queries answer from a canned response table. Used by the
/// test suites and for dry-running strategy configurations.
#[derive(Debug, Clone, Default)]
pub struct SimulatedProtocol {
    calls: Vec<ProtocolCall>,
    failing: HashSet<FunctionId>,
    responses: HashMap<FunctionId, Vec<u8>>,
}

impl SimulatedProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call to `function` revert.
    pub fn fail(&mut self, function: FunctionId) {
        self.failing.insert(function);
    }

    /// Undoes [`SimulatedProtocol::fail`].
    pub fn recover(&mut self, function: &FunctionId) {
        self.failing.remove(function);
    }

    /// Sets the bytes returned by `function`.
    pub fn respond(&mut self, function: FunctionId, bytes: Vec<u8>) {
        self.responses.insert(function, bytes);
    }

    /// Every successful state-changing call, in order.
    pub fn calls(&self) -> &[ProtocolCall] {
        &self.calls
    }

    fn answer(&self, call: &ProtocolCall) -> Result<Vec<u8>, ProtocolError> {
        if self.failing.contains(&call.function) {
            return Err(ProtocolError::Reverted {
                target: call.target,
                function: call.function,
                reason: "simulated revert".into(),
            });
        }
        Ok(self.responses.get(&call.function).cloned().unwrap_or_default())
    }
}

impl ProtocolClient for SimulatedProtocol {
    fn call(&mut self, call: &ProtocolCall) -> Result<Vec<u8>, ProtocolError> {
        let out = self.answer(call)?;
        self.calls.push(call.clone());
        Ok(out)
    }

    fn query(&self, call: &ProtocolCall) -> Result<Vec<u8>, ProtocolError> {
        self.answer(call)
    }
}
