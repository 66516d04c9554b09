use crate::tabulator::{TabulationError, TabulationResult};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable, 0-based candidate index assigned by the upstream loader.
///
/// The engines only ever consume the index; names are carried for reporting
/// and for deterministic tie-breaks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CandidateId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateType {
    Regular,
    WriteIn,
    QualifiedWriteIn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    #[serde(rename = "candidateType")]
    pub candidate_type: CandidateType,
    /// Optional party or type label; reporting-only.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub party: Option<String>,
}

impl Candidate {
    pub fn new(name: String, candidate_type: CandidateType) -> Candidate {
        Candidate {
            name,
            candidate_type,
            party: None,
        }
    }

    pub fn write_in(&self) -> bool {
        self.candidate_type != CandidateType::Regular
    }
}

/// A deduplicated rank sequence with the number of physically identical
/// ballots it stands for.
///
/// Invariants (established by the loader and `canonicalize_ballots`):
/// `choices` is non-empty, contains no duplicate candidate, and no two
/// canonical ballots of one contest share a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalBallot {
    pub choices: Vec<CandidateId>,
    pub count: u32,
}

impl CanonicalBallot {
    pub fn new(choices: Vec<CandidateId>, count: u32) -> CanonicalBallot {
        CanonicalBallot { choices, count }
    }
}

/// Collapse raw per-ballot rank sequences into canonical form.
///
/// Identical sequences are merged into one record with a multiplicity;
/// ballots with no valid rankings are dropped. The output is ordered by
/// sequence, so any reordering of the input produces the same result.
pub fn canonicalize_ballots<I>(raw: I) -> Vec<CanonicalBallot>
where
    I: IntoIterator<Item = Vec<CandidateId>>,
{
    let mut by_sequence: BTreeMap<Vec<CandidateId>, u32> = BTreeMap::new();

    for choices in raw {
        if choices.is_empty() {
            continue;
        }
        *by_sequence.entry(choices).or_insert(0) += 1;
    }

    by_sequence
        .into_iter()
        .map(|(choices, count)| CanonicalBallot { choices, count })
        .collect()
}

/// Which rounds engine to run. Never inferred from the seat count: Cambridge
/// and Scotland run whole-ballot with several seats, Portland runs
/// fractional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TabulationVariant {
    InstantRunoff,
    WholeBallotStv,
    FractionalStv,
}

/// One contest, as handed over by an upstream loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContestInput {
    pub candidates: Vec<Candidate>,
    pub ballots: Vec<CanonicalBallot>,
    pub seats: u32,
    pub variant: TabulationVariant,
    /// Quota basis override for CVRs that carry ballots belonging to other
    /// contests (Portland): the number of ballots ranking at least one
    /// candidate in this contest. Defaults to the canonical ballot count.
    #[serde(
        rename = "quotaBallotCount",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub quota_ballot_count: Option<u32>,
}

impl ContestInput {
    /// Total number of physical ballots.
    pub fn ballot_count(&self) -> u32 {
        self.ballots.iter().map(|b| b.count).sum()
    }

    /// Ballot count used for the Droop quota.
    pub fn quota_basis(&self) -> u32 {
        self.quota_ballot_count.unwrap_or_else(|| self.ballot_count())
    }

    pub fn candidate_name(&self, id: CandidateId) -> &str {
        &self.candidates[id.0 as usize].name
    }

    /// Reject contests the engines cannot tabulate. Ballot problems are
    /// loader bugs and abort the contest rather than being repaired here.
    pub fn validate(&self) -> TabulationResult<()> {
        if self.seats < 1 {
            return Err(TabulationError::InvalidContest(
                "a contest must fill at least one seat".to_string(),
            ));
        }
        if self.candidates.is_empty() {
            return Err(TabulationError::InvalidContest(
                "a contest must have candidates".to_string(),
            ));
        }
        if self.variant == TabulationVariant::InstantRunoff && self.seats > 1 {
            return Err(TabulationError::InvalidContest(format!(
                "instant-runoff cannot fill {} seats",
                self.seats
            )));
        }
        if self.variant != TabulationVariant::InstantRunoff && self.seats == 1 {
            warn!("single-seat contest tabulated as STV; the result matches IRV semantics");
        }

        for ballot in &self.ballots {
            if ballot.choices.is_empty() || ballot.count == 0 {
                return Err(TabulationError::InvalidContest(
                    "canonical ballots must carry a non-empty sequence and count >= 1".to_string(),
                ));
            }
            for choice in &ballot.choices {
                if choice.0 as usize >= self.candidates.len() {
                    return Err(TabulationError::InconsistentBallot {
                        index: choice.0,
                        num_candidates: self.candidates.len(),
                    });
                }
            }
        }

        Ok(())
    }
}
