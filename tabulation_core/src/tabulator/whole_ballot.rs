//! Whole-ballot rounds engine: instant-runoff and Cambridge-style STV.
//!
//! Every physical ballot lives in exactly one candidate pile at weight 1.
//! Surplus transfers move whole ballots, taken from the top of the pile
//! (most recently received, the Cambridge convention).

use crate::model::election::{CandidateId, ContestInput, TabulationVariant};
use crate::tabulator::{
    round_cap, snapshot_allocations, Allocatee, CandidateOutcome, CandidateStatus,
    TabulationError, TabulationOutcome, TabulationResult, TabulatorRound, TransferKind,
    TransferLog, VoteCount,
};
use log::debug;
use std::cmp::Ordering;
use std::mem;

pub(crate) fn tabulate(input: &ContestInput, quota: u32) -> TabulationResult<TabulationOutcome> {
    Engine::new(input, quota).run()
}

struct RuntimeBallot<'a> {
    choices: &'a [CandidateId],
    /// Index of the rank currently credited.
    cursor: usize,
}

struct Engine<'a> {
    input: &'a ContestInput,
    quota: u32,
    irv: bool,
    ballots: Vec<RuntimeBallot<'a>>,
    status: Vec<CandidateStatus>,
    votes: Vec<u32>,
    /// Ballot indices credited to each candidate, in order of receipt.
    piles: Vec<Vec<usize>>,
    outcomes: Vec<CandidateOutcome>,
    winners: Vec<CandidateId>,
    rounds: Vec<TabulatorRound>,
    exhausted: u32,
    total: u32,
    seats_filled: u32,
}

impl<'a> Engine<'a> {
    fn new(input: &'a ContestInput, quota: u32) -> Engine<'a> {
        // Expand in sequence-sorted order so that the pile order (and with
        // it the Cambridge top-of-pile selection) never depends on the
        // order ballots arrived in.
        let mut canonical: Vec<_> = input.ballots.iter().collect();
        canonical.sort_by(|a, b| a.choices.cmp(&b.choices));

        let mut ballots = Vec::new();
        for ballot in canonical {
            for _ in 0..ballot.count {
                ballots.push(RuntimeBallot {
                    choices: &ballot.choices,
                    cursor: 0,
                });
            }
        }

        let num_candidates = input.candidates.len();
        let total = ballots.len() as u32;
        Engine {
            input,
            quota,
            irv: input.variant == TabulationVariant::InstantRunoff,
            ballots,
            status: vec![CandidateStatus::Active; num_candidates],
            votes: vec![0; num_candidates],
            piles: vec![Vec::new(); num_candidates],
            outcomes: vec![CandidateOutcome::default(); num_candidates],
            winners: Vec::new(),
            rounds: Vec::new(),
            exhausted: 0,
            total,
            seats_filled: 0,
        }
    }

    fn run(mut self) -> TabulationResult<TabulationOutcome> {
        for (index, ballot) in self.ballots.iter().enumerate() {
            let first = ballot.choices[0];
            self.votes[first.0 as usize] += 1;
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

            if self.irv {
                if self.try_irv_majority() {
                    break;
                }
            } else if self.try_elect_over_quota() {
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

    fn votes_of(&self, id: CandidateId) -> u32 {
        self.votes[id.0 as usize]
    }

    /// Descending votes, alphabetic on ties.
    fn election_order(&self, a: CandidateId, b: CandidateId) -> Ordering {
        self.votes_of(b)
            .cmp(&self.votes_of(a))
            .then_with(|| {
                self.input
                    .candidate_name(a)
                    .cmp(self.input.candidate_name(b))
            })
            .then(a.cmp(&b))
    }

    /// Move a ballot's cursor to its next still-active preference.
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
            .map(|(index, _)| (CandidateId(index as u32), self.votes[index] as f64))
            .collect();

        self.rounds.push(TabulatorRound {
            allocations: snapshot_allocations(candidate_votes, self.exhausted as f64),
            transfers,
            elected,
            eliminated,
            continuing_ballots: VoteCount((self.total - self.exhausted) as f64),
        });
    }

    /// IRV stop rule: the first candidate over a strict majority of
    /// continuing ballots wins, with no further transfers.
    fn try_irv_majority(&mut self) -> bool {
        let continuing = self.total - self.exhausted;
        let leader = self
            .active_ids()
            .into_iter()
            .filter(|id| u64::from(self.votes_of(*id)) * 2 > u64::from(continuing))
            .max_by_key(|id| self.votes_of(*id));

        let Some(winner) = leader else {
            return false;
        };

        let round = self.rounds.len() - 1;
        self.status[winner.0 as usize] = CandidateStatus::Elected;
        self.outcomes[winner.0 as usize].round_elected = Some(round as u32);
        self.rounds[round].elected.push(winner);
        self.winners.push(winner);
        self.seats_filled += 1;
        debug!(
            "IRV majority for {} at round {}",
            self.input.candidate_name(winner),
            round
        );
        true
    }

    /// Elect every over-quota candidate this round (descending votes), then
    /// distribute each surplus from the top of the pile.
    fn try_elect_over_quota(&mut self) -> bool {
        let mut over: Vec<CandidateId> = self
            .active_ids()
            .into_iter()
            .filter(|id| self.votes_of(*id) >= self.quota)
            .collect();
        if over.is_empty() {
            return false;
        }
        over.sort_by(|a, b| self.election_order(*a, *b));

        // All of this round's electees change status before any ballot
        // moves, so surplus ballots skip every one of them.
        let mut newly = Vec::new();
        for id in over {
            if self.seats_filled == self.input.seats {
                break;
            }
            self.status[id.0 as usize] = CandidateStatus::Elected;
            self.seats_filled += 1;
            newly.push(id);
        }
        if newly.is_empty() {
            return false;
        }

        let mut log = TransferLog::new(TransferKind::Surplus);
        for &id in &newly {
            let surplus = self.votes_of(id) - self.quota;
            if surplus == 0 {
                continue;
            }

            let mut pile = mem::take(&mut self.piles[id.0 as usize]);
            let moved = pile.split_off(pile.len() - surplus as usize);
            self.piles[id.0 as usize] = pile;

            for ballot_index in moved {
                match self.advance(ballot_index) {
                    Some(next) => {
                        self.votes[next.0 as usize] += 1;
                        self.piles[next.0 as usize].push(ballot_index);
                        log.add(id, Allocatee::Candidate(next), 1.0);
                    }
                    None => {
                        self.exhausted += 1;
                        log.add(id, Allocatee::Exhausted, 1.0);
                    }
                }
            }
            self.votes[id.0 as usize] = self.quota;
        }

        if log.is_empty() {
            let round = self.rounds.len() - 1;
            for &id in &newly {
                self.outcomes[id.0 as usize].round_elected = Some(round as u32);
            }
            self.rounds[round].elected.extend(newly.iter().copied());
        } else {
            self.push_round(log.into_transfers(), newly.clone(), Vec::new());
            let round = (self.rounds.len() - 1) as u32;
            for &id in &newly {
                self.outcomes[id.0 as usize].round_elected = Some(round);
            }
        }
        self.winners.extend(newly);
        true
    }

    /// When the survivors cannot outnumber the open seats, seat them all in
    /// one final round with no transfers. Such candidates carry a
    /// `round_elected` without having reached the quota.
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
        let lowest = self.active_ids().into_iter().min_by(|a, b| {
            self.votes_of(*a)
                .cmp(&self.votes_of(*b))
                .then_with(|| {
                    self.input
                        .candidate_name(*a)
                        .cmp(self.input.candidate_name(*b))
                })
                .then(a.cmp(b))
        });
        let Some(id) = lowest else {
            return;
        };

        self.status[id.0 as usize] = CandidateStatus::Eliminated;
        let pile = mem::take(&mut self.piles[id.0 as usize]);
        let mut log = TransferLog::new(TransferKind::Elimination);
        for ballot_index in pile {
            match self.advance(ballot_index) {
                Some(next) => {
                    self.votes[next.0 as usize] += 1;
                    self.piles[next.0 as usize].push(ballot_index);
                    log.add(id, Allocatee::Candidate(next), 1.0);
                }
                None => {
                    self.exhausted += 1;
                    log.add(id, Allocatee::Exhausted, 1.0);
                }
            }
        }
        self.votes[id.0 as usize] = 0;

        self.push_round(log.into_transfers(), Vec::new(), vec![id]);
        let round = (self.rounds.len() - 1) as u32;
        self.outcomes[id.0 as usize].round_eliminated = Some(round);
        debug!(
            "eliminated {} at round {}",
            self.input.candidate_name(id),
            round
        );
    }
}
