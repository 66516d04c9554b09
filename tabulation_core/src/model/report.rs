use crate::model::election::{Candidate, CandidateId, TabulationVariant};
use crate::tabulator::{Allocatee, TabulatorRound, VoteCount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One cell of a pairwise table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidatePairEntry {
    pub numerator: u32,
    pub denominator: u32,
    /// `numerator / denominator`, or 0 when the denominator is 0.
    pub fraction: f64,
}

impl CandidatePairEntry {
    pub fn new(numerator: u32, denominator: u32) -> CandidatePairEntry {
        let fraction = if denominator > 0 {
            f64::from(numerator) / f64::from(denominator)
        } else {
            0.0
        };
        CandidatePairEntry {
            numerator,
            denominator,
            fraction,
        }
    }
}

/// A candidate-by-allocatee matrix. `entries[row][col]` is `None` for cells
/// nothing was counted into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePairTable {
    pub rows: Vec<Allocatee>,
    pub cols: Vec<Allocatee>,
    pub entries: Vec<Vec<Option<CandidatePairEntry>>>,
}

impl CandidatePairTable {
    pub fn empty() -> CandidatePairTable {
        CandidatePairTable {
            rows: vec![],
            cols: vec![],
            entries: vec![],
        }
    }

    /// Cell lookup by allocatee rather than position.
    pub fn entry(&self, row: Allocatee, col: Allocatee) -> Option<&CandidatePairEntry> {
        let r = self.rows.iter().position(|a| *a == row)?;
        let c = self.cols.iter().position(|a| *a == col)?;
        self.entries.get(r)?.get(c)?.as_ref()
    }
}

/// How deep voters rank, overall and split by first preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingDistribution {
    /// rank depth -> ballot count, whole electorate.
    #[serde(rename = "overallDistribution")]
    pub overall_distribution: BTreeMap<u32, u32>,
    /// Same mapping restricted to ballots led by each candidate.
    #[serde(rename = "candidateDistributions")]
    pub candidate_distributions: BTreeMap<CandidateId, BTreeMap<u32, u32>>,
    #[serde(rename = "candidateTotals")]
    pub candidate_totals: BTreeMap<CandidateId, u32>,
    #[serde(rename = "totalBallots")]
    pub total_ballots: u32,
}

/// Per-candidate tabulation summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateVotes {
    pub candidate: CandidateId,
    #[serde(rename = "firstRoundVotes")]
    pub first_round_votes: VoteCount,
    /// Cumulative transfers received over all rounds.
    #[serde(rename = "transferVotes")]
    pub transfer_votes: VoteCount,
    #[serde(rename = "roundElected")]
    pub round_elected: Option<u32>,
    #[serde(rename = "roundEliminated")]
    pub round_eliminated: Option<u32>,
    pub winner: bool,
}

/// Everything downstream reporting needs for one contest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContestReport {
    #[serde(rename = "ballotCount")]
    pub ballot_count: u32,
    pub seats: u32,
    pub variant: TabulationVariant,
    pub quota: u32,
    pub candidates: Vec<Candidate>,
    /// Candidate count excluding write-ins.
    #[serde(rename = "numCandidates")]
    pub num_candidates: u32,
    /// First entry of `winners`; kept for single-winner consumers.
    pub winner: Option<CandidateId>,
    /// Winners in election order.
    pub winners: Vec<CandidateId>,
    pub rounds: Vec<TabulatorRound>,
    #[serde(rename = "totalVotes")]
    pub total_votes: Vec<CandidateVotes>,
    #[serde(rename = "pairwisePreferences")]
    pub pairwise_preferences: CandidatePairTable,
    #[serde(rename = "firstAlternate")]
    pub first_alternate: CandidatePairTable,
    #[serde(rename = "firstFinal")]
    pub first_final: CandidatePairTable,
    #[serde(rename = "rankingDistribution")]
    pub ranking_distribution: RankingDistribution,
    #[serde(rename = "smithSet")]
    pub smith_set: Vec<CandidateId>,
    pub condorcet: Option<CandidateId>,
}

impl ContestReport {
    pub fn winning_candidate(&self) -> Option<&Candidate> {
        self.winner.and_then(|id| self.candidates.get(id.0 as usize))
    }
}
