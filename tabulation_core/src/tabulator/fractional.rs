//! Fractional rounds engine: weighted inclusive Gregory surplus transfers.
//!
//! Every physical ballot carries a weight in [0, 1]. An elected candidate's
//! surplus moves a `surplus / votes` fraction of every ballot on the pile;
//! the retained remainder stays pinned under the candidate's quota and never
//! moves again. Cursor advancement skips both elected and eliminated
//! candidates, so surplus weight can flow to still-active candidates over
//! multiple hops.

use crate::model::election::{CandidateId, ContestInput};
use crate::tabulator::{
    round_cap, snapshot_allocations, Allocatee, CandidateOutcome, CandidateStatus,
    TabulationError, TabulationOutcome, TabulationResult, TabulatorRound, TransferKind,
    TransferLog, VoteCount,
};
use log::debug;
use std::cmp::Ordering;
use std::mem;

/// Guards the quota comparison against float dust on summed weights.
const QUOTA_EPSILON: f64 = 1e-9;

/// Vote totals within this distance count as tied for elimination.
const ELIMINATION_TIE_TOLERANCE: f64 = 1e-4;

/// End-of-tabulation conservation tolerance, relative to the ballot total.
const CONSERVATION_EPSILON: f64 = 1e-6;

pub(crate) fn tabulate(input: &ContestInput, quota: u32) -> TabulationResult<TabulationOutcome> {
    Engine::new(input, quota).run()
}

struct RuntimeBallot<'a> {
    choices: &'a [CandidateId],
    weight: f64,
    /// Index of the rank currently credited.
    cursor: usize,
}

struct Engine<'a> {
    input: &'a ContestInput,
    quota: u32,
    ballots: Vec<RuntimeBallot<'a>>,
    status: Vec<CandidateStatus>,
    votes: Vec<f64>,
    piles: Vec<Vec<usize>>,
    outcomes: Vec<CandidateOutcome>,
    winners: Vec<CandidateId>,
    rounds: Vec<TabulatorRound>,
    exhausted: f64,
    total: f64,
    seats_filled: u32,
}

impl<'a> Engine<'a> {
    fn new(input: &'a ContestInput, quota: u32) -> Engine<'a> {
        // Sequence-sorted expansion keeps summation order, and with it the
        // exact float results, independent of ballot input order.
        let mut canonical: Vec<_> = input.ballots.iter().collect();
        canonical.sort_by(|a, b| a.choices.cmp(&b.choices));

        let mut ballots = Vec::new();
        for ballot in canonical {
            for _ in 0..ballot.count {
                ballots.push(RuntimeBallot {
                    choices: &ballot.choices,
                    weight: 1.0,
                    cursor: 0,
                });
            }
        }

        let num_candidates = input.candidates.len();
        let total = ballots.len() as f64;
        Engine {
            input,
            quota,
            ballots,
            status: vec![CandidateStatus::Active; num_candidates],
            votes: vec![0.0; num_candidates],
            piles: vec![Vec::new(); num_candidates],
            outcomes: vec![CandidateOutcome::default(); num_candidates],
            winners: Vec::new(),
            rounds: Vec::new(),
            exhausted: 0.0,
            total,
            seats_filled: 0,
        }
    }

    fn run(mut self) -> TabulationResult<TabulationOutcome> {
        for (index, ballot) in self.ballots.iter().enumerate() {
            let first = ballot.choices[0];
            self.votes[first.0 as usize] += 1.0;
            self.piles[first.0 as usize].push(index);
        }
        self.push_round(Vec::new(), Vec::new(), Vec::new());

        let cap = round_cap(self.input.candidates.len());
        loop {
            if self.rounds.len() as u32 > cap {
                return Err(TabulationError::RoundCapExceeded {
                    cap,
                    rounds: self.rounds,
                });
            }

            if let Some(id) = self.highest_over_quota() {
                self.elect_and_transfer(id);
                if self.seats_filled == self.input.seats {
                    break;
                }
                if self.try_default_fill() {
                    break;
                }
                continue;
            }

            if self.try_default_fill() {
                break;
            }
            self.eliminate_lowest();
        }

        self.check_conservation()?;
        Ok(TabulationOutcome {
            rounds: self.rounds,
            winners: self.winners,
            quota: self.quota,
            candidates: self.outcomes,
        })
    }

    fn active_ids(&self) -> Vec<CandidateId> {
        self.status
            .iter()
            .enumerate()
            .filter(|(_, status)| **status == CandidateStatus::Active)
            .map(|(index, _)| CandidateId(index as u32))
            .collect()
    }

    fn votes_of(&self, id: CandidateId) -> f64 {
        self.votes[id.0 as usize]
    }

    /// Descending votes, alphabetic on ties.
    fn election_order(&self, a: CandidateId, b: CandidateId) -> Ordering {
        self.votes_of(b)
            .partial_cmp(&self.votes_of(a))
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                self.input
                    .candidate_name(a)
                    .cmp(self.input.candidate_name(b))
            })
            .then(a.cmp(&b))
    }

    /// Move a ballot's cursor to its next choice, skipping both elected and
    /// eliminated candidates.
    fn advance(&mut self, ballot_index: usize) -> Option<CandidateId> {
        let ballot = &mut self.ballots[ballot_index];
        for rank in ballot.cursor + 1..ballot.choices.len() {
            let id = ballot.choices[rank];
            if self.status[id.0 as usize] == CandidateStatus::Active {
                ballot.cursor = rank;
                return Some(id);
            }
        }
        None
    }

    fn push_round(
        &mut self,
        transfers: Vec<crate::tabulator::Transfer>,
        elected: Vec<CandidateId>,
        eliminated: Vec<CandidateId>,
    ) {
        let candidate_votes: Vec<(CandidateId, f64)> = self
            .status
            .iter()
            .enumerate()
            .filter(|(_, status)| **status != CandidateStatus::Eliminated)
            .map(|(index, _)| (CandidateId(index as u32), self.votes[index]))
            .collect();

        self.rounds.push(TabulatorRound {
            allocations: snapshot_allocations(candidate_votes, self.exhausted),
            transfers,
            elected,
            eliminated,
            continuing_ballots: VoteCount(self.total - self.exhausted),
        });
    }

    /// The single highest active candidate at or over the quota, if any.
    fn highest_over_quota(&self) -> Option<CandidateId> {
        let mut over: Vec<CandidateId> = self
            .active_ids()
            .into_iter()
            .filter(|id| self.votes_of(*id) + QUOTA_EPSILON >= f64::from(self.quota))
            .collect();
        over.sort_by(|a, b| self.election_order(*a, *b));
        over.first().copied()
    }

    fn elect_and_transfer(&mut self, id: CandidateId) {
        self.status[id.0 as usize] = CandidateStatus::Elected;
        self.seats_filled += 1;
        self.winners.push(id);

        let votes = self.votes_of(id);
        let surplus = votes - f64::from(self.quota);
        let mut log = TransferLog::new(TransferKind::Surplus);

        if surplus > 0.0 {
            let fraction = surplus / votes;
            debug!(
                "electing {} with {} votes, transferring fraction {}",
                self.input.candidate_name(id),
                votes,
                fraction
            );
            let pile = mem::take(&mut self.piles[id.0 as usize]);
            for ballot_index in pile {
                let transferred = self.ballots[ballot_index].weight * fraction;
                // The retained remainder stays under the electee's quota;
                // the ballot travels on at the transferred fraction.
                self.ballots[ballot_index].weight = transferred;
                match self.advance(ballot_index) {
                    Some(next) => {
                        self.votes[next.0 as usize] += transferred;
                        self.piles[next.0 as usize].push(ballot_index);
                        log.add(id, Allocatee::Candidate(next), transferred);
                    }
                    None => {
                        self.exhausted += transferred;
                        log.add(id, Allocatee::Exhausted, transferred);
                    }
                }
            }
        }
        self.votes[id.0 as usize] = f64::from(self.quota);

        if log.is_empty() {
            let round = self.rounds.len() - 1;
            self.outcomes[id.0 as usize].round_elected = Some(round as u32);
            self.rounds[round].elected.push(id);
        } else {
            self.push_round(log.into_transfers(), vec![id], Vec::new());
            let round = (self.rounds.len() - 1) as u32;
            self.outcomes[id.0 as usize].round_elected = Some(round);
        }
    }

    /// When the survivors cannot outnumber the open seats, seat them all in
    /// one final round with no transfers.
    fn try_default_fill(&mut self) -> bool {
        let mut active = self.active_ids();
        let remaining = self.input.seats - self.seats_filled;
        if active.is_empty() || active.len() as u32 > remaining {
            return false;
        }
        active.sort_by(|a, b| self.election_order(*a, *b));

        for &id in &active {
            self.status[id.0 as usize] = CandidateStatus::Elected;
            self.seats_filled += 1;
        }
        self.push_round(Vec::new(), active.clone(), Vec::new());
        let round = (self.rounds.len() - 1) as u32;
        for &id in &active {
            self.outcomes[id.0 as usize].round_elected = Some(round);
        }
        self.winners.extend(active);
        true
    }

    fn eliminate_lowest(&mut self) {
        let active = self.active_ids();
        let Some(min) = active
            .iter()
            .map(|id| self.votes_of(*id))
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal))
        else {
            return;
        };

        // Everyone within the tolerance of the minimum is tied; the
        // alphabetically first of them goes out.
        let lowest = active
            .into_iter()
            .filter(|id| self.votes_of(*id) - min < ELIMINATION_TIE_TOLERANCE)
            .min_by(|a, b| {
                self.input
                    .candidate_name(*a)
                    .cmp(self.input.candidate_name(*b))
                    .then(a.cmp(b))
            });
        let Some(id) = lowest else {
            return;
        };

        self.status[id.0 as usize] = CandidateStatus::Eliminated;
        let pile = mem::take(&mut self.piles[id.0 as usize]);
        let mut log = TransferLog::new(TransferKind::Elimination);
        for ballot_index in pile {
            let weight = self.ballots[ballot_index].weight;
            match self.advance(ballot_index) {
                Some(next) => {
                    self.votes[next.0 as usize] += weight;
                    self.piles[next.0 as usize].push(ballot_index);
                    log.add(id, Allocatee::Candidate(next), weight);
                }
                None => {
                    self.exhausted += weight;
                    log.add(id, Allocatee::Exhausted, weight);
                }
            }
        }
        self.votes[id.0 as usize] = 0.0;

        self.push_round(log.into_transfers(), Vec::new(), vec![id]);
        let round = (self.rounds.len() - 1) as u32;
        self.outcomes[id.0 as usize].round_eliminated = Some(round);
        debug!(
            "eliminated {} at round {}",
            self.input.candidate_name(id),
            round
        );
    }

    fn check_conservation(&self) -> TabulationResult<()> {
        let allocated: f64 = self
            .status
            .iter()
            .enumerate()
            .filter(|(_, status)| **status != CandidateStatus::Eliminated)
            .map(|(index, _)| self.votes[index])
            .sum::<f64>()
            + self.exhausted;

        if (allocated - self.total).abs() > CONSERVATION_EPSILON * self.total.max(1.0) {
            return Err(TabulationError::NumericInconsistency {
                allocated,
                expected: self.total,
            });
        }
        Ok(())
    }
}
