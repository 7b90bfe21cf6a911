//! Grouping of registers into as few read requests as possible.

use crate::codec::Value;
use crate::registers::{Descriptor, Gate, RegionKind, ValidRange};
use tracing::debug;

/// Whether a register's gate allows it to be read right now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    Open,
    Closed,
    /// The gate register has not been read yet.
    Unknown,
}

impl GateState {
    /// Evaluate `gate` against the last known value of its gate register.
    pub fn evaluate(gate: Option<Gate>, gate_value: impl FnOnce(&str) -> Option<Value>) -> Self {
        let Some(gate) = gate else {
            return GateState::Open;
        };
        match gate_value(gate.register).map(|v| v.as_bool()) {
            None => GateState::Unknown,
            Some(Some(v)) if v == gate.required => GateState::Open,
            Some(_) => GateState::Closed,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Member<'a> {
    pub register: &'a Descriptor,
    /// Position of the register's first word within the transaction.
    pub offset: u16,
}

/// One read request covering a contiguous block of addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction<'a> {
    pub kind: RegionKind,
    pub start: u16,
    /// Inclusive.
    pub end: u16,
    pub members: Vec<Member<'a>>,
}

impl Transaction<'_> {
    pub fn count(&self) -> u16 {
        self.end - self.start + 1
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Skipped<'a> {
    pub register: &'a Descriptor,
    pub gate: GateState,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan<'a> {
    pub transactions: Vec<Transaction<'a>>,
    /// Gated registers left out because their gate was closed or unknown.
    pub skipped: Vec<Skipped<'a>>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("`{name}` ({kind} {address}) is not within any readable address range")]
    OutsideValidRange { name: &'static str, kind: RegionKind, address: u16 },
    #[error("the maximum number of registers per request must be at least 1")]
    ZeroLength,
    #[error("`{name}` spans {words} registers, more than the {max} allowed per request")]
    TooNarrow { name: &'static str, words: u16, max: u16 },
}

struct OpenChunk<'a> {
    transaction: Transaction<'a>,
    range_end: u16,
}

/// Plan the reads for `candidates`.
///
/// Candidates are sorted by region kind and address, and then walked once: a register joins the
/// currently open transaction if it is of the same kind, fits within `max_registers` of the
/// transaction start and within the same [`ValidRange`]. Otherwise a new transaction is started.
///
/// A register wider than `max_registers` can never be read and fails the whole plan, even when
/// its gate would have skipped it.
pub fn plan<'a>(
    candidates: impl IntoIterator<Item = &'a Descriptor>,
    ranges: &[ValidRange],
    max_registers: u16,
    gate: impl Fn(&Descriptor) -> GateState,
) -> Result<Plan<'a>, Error> {
    if max_registers == 0 {
        return Err(Error::ZeroLength);
    }
    let mut candidates = candidates.into_iter().collect::<Vec<_>>();
    candidates.sort_by_key(|d| (d.sort_key(), d.name));
    candidates.dedup_by_key(|d| (d.sort_key(), d.name));

    let mut plan = Plan::default();
    let mut chunk: Option<OpenChunk<'a>> = None;
    for register in candidates {
        let words = register.data_type.words();
        if words > max_registers {
            return Err(Error::TooNarrow { name: register.name, words, max: max_registers });
        }
        let state = gate(register);
        if state != GateState::Open {
            debug!(
                message = "not reading a gated register",
                register = register.name,
                gate = ?register.gate.map(|g| g.register),
                ?state,
            );
            plan.skipped.push(Skipped { register, gate: state });
            continue;
        }
        let last = register.last_address();
        if let Some(open) = &mut chunk {
            let tx = &mut open.transaction;
            if tx.kind == register.kind
                && last - tx.start < max_registers
                && last <= open.range_end
            {
                tx.end = last;
                tx.members.push(Member { register, offset: register.address - tx.start });
                continue;
            }
        }
        let range = ranges
            .iter()
            .find(|r| r.contains(register.kind, register.address, last))
            .ok_or(Error::OutsideValidRange {
                name: register.name,
                kind: register.kind,
                address: register.address,
            })?;
        let next = OpenChunk {
            transaction: Transaction {
                kind: register.kind,
                start: register.address,
                end: last,
                members: vec![Member { register, offset: 0 }],
            },
            range_end: range.end,
        };
        if let Some(done) = chunk.replace(next) {
            plan.transactions.push(done.transaction);
        }
    }
    if let Some(done) = chunk {
        plan.transactions.push(done.transaction);
    }
    Ok(plan)
}
