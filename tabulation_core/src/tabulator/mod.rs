//! Round-by-round tabulation: the shared trace model and the two engines.
//!
//! `rounds[k]` holds the allocations *after* action k together with the
//! transfers action k produced; round 0 is the initial allocation with no
//! transfers. `round_elected` / `round_eliminated` index into that vec, so an
//! elected candidate shows exactly the quota from its recorded round onward.

mod fractional;
mod whole_ballot;

use crate::model::election::{CandidateId, ContestInput, TabulationVariant};
use serde::de::{Error as DeError, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A vote destination: a candidate, or the exhausted sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Allocatee {
    Candidate(CandidateId),
    Exhausted,
}

impl Allocatee {
    pub fn candidate_id(&self) -> Option<CandidateId> {
        match self {
            Allocatee::Candidate(c) => Some(*c),
            Allocatee::Exhausted => None,
        }
    }
}

// On the wire an allocatee is the candidate index, or "X" for exhausted.
impl Serialize for Allocatee {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Allocatee::Candidate(c) => serializer.serialize_u32(c.0),
            Allocatee::Exhausted => serializer.serialize_str("X"),
        }
    }
}

impl<'de> Deserialize<'de> for Allocatee {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AllocateeVisitor;

        impl<'de> Visitor<'de> for AllocateeVisitor {
            type Value = Allocatee;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a candidate index or \"X\"")
            }

            fn visit_u64<E: DeError>(self, v: u64) -> Result<Allocatee, E> {
                Ok(Allocatee::Candidate(CandidateId(v as u32)))
            }

            fn visit_i64<E: DeError>(self, v: i64) -> Result<Allocatee, E> {
                if v < 0 {
                    return Err(E::custom("candidate index cannot be negative"));
                }
                Ok(Allocatee::Candidate(CandidateId(v as u32)))
            }

            fn visit_str<E: DeError>(self, v: &str) -> Result<Allocatee, E> {
                if v == "X" {
                    Ok(Allocatee::Exhausted)
                } else {
                    Err(E::custom(format!("unknown allocatee \"{}\"", v)))
                }
            }
        }

        deserializer.deserialize_any(AllocateeVisitor)
    }
}

/// A vote total in the trace. Whole-ballot rounds carry exact integers;
/// fractional rounds carry IEEE-754 doubles, rounded to two decimal places
/// at the wire boundary only.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct VoteCount(pub f64);

impl Serialize for VoteCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64((self.0 * 100.0).round() / 100.0)
    }
}

impl<'de> Deserialize<'de> for VoteCount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(VoteCount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TabulatorAllocation {
    pub allocatee: Allocatee,
    pub votes: VoteCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferKind {
    Elimination,
    Surplus,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: CandidateId,
    pub to: Allocatee,
    pub count: VoteCount,
    pub kind: TransferKind,
}

/// One record of the round trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabulatorRound {
    /// Still-active and already-elected candidates plus Exhausted, sorted by
    /// votes descending (Exhausted always last).
    pub allocations: Vec<TabulatorAllocation>,
    /// Transfers that produced these allocations, sorted by `(from, to)`.
    pub transfers: Vec<Transfer>,
    pub elected: Vec<CandidateId>,
    pub eliminated: Vec<CandidateId>,
    #[serde(rename = "continuingBallots")]
    pub continuing_ballots: VoteCount,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateOutcome {
    #[serde(rename = "roundElected")]
    pub round_elected: Option<u32>,
    #[serde(rename = "roundEliminated")]
    pub round_eliminated: Option<u32>,
}

/// Everything a rounds engine produces for one contest.
#[derive(Debug, Clone, PartialEq)]
pub struct TabulationOutcome {
    pub rounds: Vec<TabulatorRound>,
    /// Winners in election order.
    pub winners: Vec<CandidateId>,
    pub quota: u32,
    /// Per-candidate outcome, indexed by candidate.
    pub candidates: Vec<CandidateOutcome>,
}

#[derive(Debug, thiserror::Error)]
pub enum TabulationError {
    #[error("invalid contest: {0}")]
    InvalidContest(String),
    #[error("ballot references candidate index {index} outside the table of {num_candidates}")]
    InconsistentBallot { index: u32, num_candidates: usize },
    #[error("tabulation exceeded the {cap}-round safety cap")]
    RoundCapExceeded {
        cap: u32,
        /// Trace produced before the cap tripped, for debugging.
        rounds: Vec<TabulatorRound>,
    },
    #[error("vote conservation failed: allocated {allocated} of {expected} ballots")]
    NumericInconsistency { allocated: f64, expected: f64 },
}

pub type TabulationResult<T> = std::result::Result<T, TabulationError>;

/// Droop quota: the smallest total guaranteed to elect exactly `seats`
/// candidates.
pub fn droop_quota(ballots: u32, seats: u32) -> u32 {
    ballots / (seats + 1) + 1
}

/// Exceeding this is impossible for a correct engine; enforcing it turns a
/// hypothetical non-termination bug into a diagnosable error.
pub(crate) fn round_cap(num_candidates: usize) -> u32 {
    2 * num_candidates as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CandidateStatus {
    Active,
    Elected,
    Eliminated,
}

/// Accumulates per-(from, to) transfer totals for one action. A BTreeMap
/// keys the output in the required `(from, to)` order.
pub(crate) struct TransferLog {
    kind: TransferKind,
    entries: BTreeMap<(CandidateId, Allocatee), f64>,
}

impl TransferLog {
    pub(crate) fn new(kind: TransferKind) -> TransferLog {
        TransferLog {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub(crate) fn add(&mut self, from: CandidateId, to: Allocatee, count: f64) {
        *self.entries.entry((from, to)).or_insert(0.0) += count;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn into_transfers(self) -> Vec<Transfer> {
        let kind = self.kind;
        self.entries
            .into_iter()
            .map(|((from, to), count)| Transfer {
                from,
                to,
                count: VoteCount(count),
                kind,
            })
            .collect()
    }
}

/// Build a round's allocation list: candidates sorted by votes descending
/// (index ascending on ties), Exhausted last.
pub(crate) fn snapshot_allocations(
    candidate_votes: Vec<(CandidateId, f64)>,
    exhausted: f64,
) -> Vec<TabulatorAllocation> {
    let mut sorted = candidate_votes;
    sorted.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    let mut allocations: Vec<TabulatorAllocation> = sorted
        .into_iter()
        .map(|(id, votes)| TabulatorAllocation {
            allocatee: Allocatee::Candidate(id),
            votes: VoteCount(votes),
        })
        .collect();
    allocations.push(TabulatorAllocation {
        allocatee: Allocatee::Exhausted,
        votes: VoteCount(exhausted),
    });
    allocations
}

/// Tabulate one contest with the variant named in its configuration.
pub fn tabulate(input: &ContestInput) -> TabulationResult<TabulationOutcome> {
    input.validate()?;
    let quota = droop_quota(input.quota_basis(), input.seats);

    match input.variant {
        TabulationVariant::InstantRunoff | TabulationVariant::WholeBallotStv => {
            whole_ballot::tabulate(input, quota)
        }
        TabulationVariant::FractionalStv => fractional::tabulate(input, quota),
    }
}
