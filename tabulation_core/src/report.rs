//! Assembles a `ContestReport` from one tabulation, and drives batches of
//! independent contests in parallel.

use crate::analytics::{
    generate_first_alternate, generate_first_final, generate_pairwise_counts,
    generate_pairwise_preferences, generate_ranking_distribution, preference_graph, smith_set,
};
use crate::model::election::{CandidateId, ContestInput};
use crate::model::report::{CandidateVotes, ContestReport};
use crate::tabulator::{tabulate, Allocatee, TabulationOutcome, TabulationResult, TabulatorRound, VoteCount};
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::BTreeSet;

/// The allocatee leading the last round, for single-winner consumers.
pub fn winner(rounds: &[TabulatorRound]) -> Option<CandidateId> {
    rounds
        .last()
        .and_then(|round| round.allocations.first())
        .and_then(|allocation| allocation.allocatee.candidate_id())
}

/// Per-candidate summary rows, in candidate order.
fn total_votes(outcome: &TabulationOutcome) -> Vec<CandidateVotes> {
    let num_candidates = outcome.candidates.len();
    let mut first_round = vec![0.0; num_candidates];
    if let Some(first) = outcome.rounds.first() {
        for allocation in &first.allocations {
            if let Allocatee::Candidate(id) = allocation.allocatee {
                first_round[id.0 as usize] = allocation.votes.0;
            }
        }
    }

    let mut received = vec![0.0; num_candidates];
    for round in &outcome.rounds {
        for transfer in &round.transfers {
            if let Allocatee::Candidate(id) = transfer.to {
                received[id.0 as usize] += transfer.count.0;
            }
        }
    }

    (0..num_candidates)
        .map(|index| {
            let id = CandidateId(index as u32);
            CandidateVotes {
                candidate: id,
                first_round_votes: VoteCount(first_round[index]),
                transfer_votes: VoteCount(received[index]),
                round_elected: outcome.candidates[index].round_elected,
                round_eliminated: outcome.candidates[index].round_eliminated,
                winner: outcome.winners.contains(&id),
            }
        })
        .collect()
}

/// Tabulate one contest and derive every analytic table from the same
/// canonical ballots and trace.
pub fn generate_report(input: &ContestInput) -> TabulationResult<ContestReport> {
    if input.ballots.is_empty() {
        input.validate()?;
        return Ok(empty_report(input));
    }

    let outcome = tabulate(input)?;

    let candidates: Vec<CandidateId> = (0..input.candidates.len() as u32)
        .map(CandidateId)
        .collect();
    let total_votes = total_votes(&outcome);

    let pairwise_counts = generate_pairwise_counts(&candidates, &input.ballots);
    let pairwise_preferences = generate_pairwise_preferences(&candidates, &pairwise_counts);

    let graph = preference_graph(&candidates, &pairwise_counts);
    let smith = smith_set(&candidates, &graph);
    let condorcet = if smith.len() == 1 {
        smith.iter().next().copied()
    } else {
        None
    };

    let first_alternate = generate_first_alternate(&candidates, &input.ballots);

    let eliminated: BTreeSet<CandidateId> = outcome
        .candidates
        .iter()
        .enumerate()
        .filter(|(_, o)| o.round_eliminated.is_some())
        .map(|(index, _)| CandidateId(index as u32))
        .collect();
    let first_final = generate_first_final(&candidates, &input.ballots, &eliminated);

    let ranking_distribution = generate_ranking_distribution(&input.ballots);

    let winner = outcome.winners.first().copied();
    if winner.is_some() && condorcet.is_some() && winner != condorcet {
        debug!(
            "tabulation winner {:?} differs from the Condorcet winner {:?}",
            winner, condorcet
        );
    }

    let num_candidates = input
        .candidates
        .iter()
        .filter(|c| !c.write_in())
        .count() as u32;

    Ok(ContestReport {
        ballot_count: input.ballot_count(),
        seats: input.seats,
        variant: input.variant,
        quota: outcome.quota,
        candidates: input.candidates.clone(),
        num_candidates,
        winner,
        winners: outcome.winners,
        rounds: outcome.rounds,
        total_votes,
        pairwise_preferences,
        first_alternate,
        first_final,
        ranking_distribution,
        smith_set: smith.into_iter().collect(),
        condorcet,
    })
}

/// A contest with no ballots elects nobody; downstream consumers see the
/// structure with every table empty.
fn empty_report(input: &ContestInput) -> ContestReport {
    use crate::model::report::{CandidatePairTable, RankingDistribution};
    use crate::tabulator::droop_quota;
    use std::collections::BTreeMap;

    ContestReport {
        ballot_count: 0,
        seats: input.seats,
        variant: input.variant,
        quota: droop_quota(input.quota_basis(), input.seats),
        candidates: input.candidates.clone(),
        num_candidates: 0,
        winner: None,
        winners: vec![],
        rounds: vec![],
        total_votes: vec![],
        pairwise_preferences: CandidatePairTable::empty(),
        first_alternate: CandidatePairTable::empty(),
        first_final: CandidatePairTable::empty(),
        ranking_distribution: RankingDistribution {
            overall_distribution: BTreeMap::new(),
            candidate_distributions: BTreeMap::new(),
            candidate_totals: BTreeMap::new(),
            total_ballots: 0,
        },
        smith_set: vec![],
        condorcet: None,
    }
}

/// Tabulate a batch of independent contests in parallel. A contest that
/// fails is logged and omitted; the rest of the batch is unaffected.
pub fn generate_reports(contests: &[(String, ContestInput)]) -> Vec<(String, ContestReport)> {
    contests
        .par_iter()
        .filter_map(|(name, input)| match generate_report(input) {
            Ok(report) => Some((name.clone(), report)),
            Err(error) => {
                warn!("skipping contest {}: {}", name, error);
                None
            }
        })
        .collect()
}
