//! Ballot-level analytics: pairwise preferences, first-alternate and
//! first-to-final tables, ranking-depth distributions, and the Condorcet
//! machinery built on the pairwise counts.
//!
//! Everything here is computed from the canonical ballot set, honoring
//! multiplicities. Only the first-to-final table additionally consumes the
//! eliminated set derived from the round trace.

use crate::model::election::{CandidateId, CanonicalBallot};
use crate::model::report::{CandidatePairEntry, CandidatePairTable, RankingDistribution};
use crate::tabulator::Allocatee;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Count, for every ordered pair `(a, b)`, the ballots preferring `a` over
/// `b`: either both are ranked with `a` first, or `a` is ranked and `b` is
/// not. Ballots ranking neither contribute to neither direction.
pub fn generate_pairwise_counts(
    candidates: &[CandidateId],
    ballots: &[CanonicalBallot],
) -> HashMap<(CandidateId, CandidateId), u32> {
    let mut preference_map: HashMap<(CandidateId, CandidateId), u32> = HashMap::new();
    let all_candidates: HashSet<CandidateId> = candidates.iter().copied().collect();

    for ballot in ballots {
        let mut above_ranked: HashSet<CandidateId> = HashSet::new();

        for &vote in &ballot.choices {
            for arc in &above_ranked {
                *preference_map.entry((*arc, vote)).or_insert(0) += ballot.count;
            }
            above_ranked.insert(vote);
        }

        for unranked in all_candidates.difference(&above_ranked) {
            for arc in &above_ranked {
                *preference_map.entry((*arc, *unranked)).or_insert(0) += ballot.count;
            }
        }
    }

    preference_map
}

/// Square table over the candidates: cell (a, b) holds how many of the
/// ballots ranking at least one of the pair preferred `a`.
pub fn generate_pairwise_preferences(
    candidates: &[CandidateId],
    preference_map: &HashMap<(CandidateId, CandidateId), u32>,
) -> CandidatePairTable {
    let axis: Vec<Allocatee> = candidates.iter().map(|d| Allocatee::Candidate(*d)).collect();

    let entries: Vec<Vec<Option<CandidatePairEntry>>> = candidates
        .iter()
        .map(|c1| {
            candidates
                .iter()
                .map(|c2| {
                    let m1 = preference_map.get(&(*c1, *c2)).unwrap_or(&0);
                    let m2 = preference_map.get(&(*c2, *c1)).unwrap_or(&0);
                    let count = m1 + m2;

                    if count == 0 {
                        None
                    } else {
                        Some(CandidatePairEntry::new(*m1, count))
                    }
                })
                .collect()
        })
        .collect();

    CandidatePairTable {
        entries,
        rows: axis.clone(),
        cols: axis,
    }
}

/// Where each candidate's first-choice ballots go next: the second rank, or
/// Exhausted when there is none. Denominators are the first-choice counts.
pub fn generate_first_alternate(
    candidates: &[CandidateId],
    ballots: &[CanonicalBallot],
) -> CandidatePairTable {
    let mut first_choice_count: HashMap<CandidateId, u32> = HashMap::new();
    let mut alternate_map: HashMap<(CandidateId, Allocatee), u32> = HashMap::new();

    for ballot in ballots {
        if let Some(first) = ballot.choices.first() {
            let second = ballot
                .choices
                .get(1)
                .map(|d| Allocatee::Candidate(*d))
                .unwrap_or(Allocatee::Exhausted);
            *alternate_map.entry((*first, second)).or_insert(0) += ballot.count;
            *first_choice_count.entry(*first).or_insert(0) += ballot.count;
        }
    }

    let rows: Vec<Allocatee> = candidates.iter().map(|d| Allocatee::Candidate(*d)).collect();
    let mut cols = rows.clone();
    cols.push(Allocatee::Exhausted);

    let entries: Vec<Vec<Option<CandidatePairEntry>>> = candidates
        .iter()
        .map(|c1| {
            let denominator = *first_choice_count.get(c1).unwrap_or(&0);

            cols.iter()
                .map(|c2| {
                    let count = *alternate_map.get(&(*c1, *c2)).unwrap_or(&0);
                    if count == 0 {
                        None
                    } else {
                        Some(CandidatePairEntry::new(count, denominator))
                    }
                })
                .collect()
        })
        .collect();

    CandidatePairTable {
        entries,
        rows,
        cols,
    }
}

/// Where each candidate's first-choice ballots end up: the earliest rank
/// that survived tabulation (was never eliminated), or Exhausted.
/// Denominators are the first-choice counts.
pub fn generate_first_final(
    candidates: &[CandidateId],
    ballots: &[CanonicalBallot],
    eliminated: &BTreeSet<CandidateId>,
) -> CandidatePairTable {
    let mut first_final: HashMap<(CandidateId, Allocatee), u32> = HashMap::new();
    let mut first_total: HashMap<CandidateId, u32> = HashMap::new();

    for ballot in ballots {
        if let Some(first) = ballot.choices.first() {
            let final_choice = ballot
                .choices
                .iter()
                .find(|c| !eliminated.contains(c))
                .map(|c| Allocatee::Candidate(*c))
                .unwrap_or(Allocatee::Exhausted);

            *first_final.entry((*first, final_choice)).or_insert(0) += ballot.count;
            *first_total.entry(*first).or_insert(0) += ballot.count;
        }
    }

    let rows: Vec<Allocatee> = candidates.iter().map(|d| Allocatee::Candidate(*d)).collect();
    let mut cols = rows.clone();
    cols.push(Allocatee::Exhausted);

    let entries: Vec<Vec<Option<CandidatePairEntry>>> = candidates
        .iter()
        .map(|c1| {
            let denominator = *first_total.get(c1).unwrap_or(&0);

            cols.iter()
                .map(|c2| {
                    let count = *first_final.get(&(*c1, *c2)).unwrap_or(&0);
                    if count == 0 {
                        None
                    } else {
                        Some(CandidatePairEntry::new(count, denominator))
                    }
                })
                .collect()
        })
        .collect();

    CandidatePairTable {
        entries,
        rows,
        cols,
    }
}

/// Ranking-depth statistics over the canonical ballots.
pub fn generate_ranking_distribution(ballots: &[CanonicalBallot]) -> RankingDistribution {
    let mut overall_distribution: BTreeMap<u32, u32> = BTreeMap::new();
    let mut candidate_distributions: BTreeMap<CandidateId, BTreeMap<u32, u32>> = BTreeMap::new();
    let mut candidate_totals: BTreeMap<CandidateId, u32> = BTreeMap::new();
    let mut total_ballots = 0u32;

    for ballot in ballots {
        if ballot.choices.is_empty() {
            continue;
        }

        // Depth counts distinct candidates; canonical ballots carry no
        // duplicates, so this normally equals the sequence length.
        let distinct: BTreeSet<CandidateId> = ballot.choices.iter().copied().collect();
        let rank_count = distinct.len() as u32;

        total_ballots += ballot.count;
        *overall_distribution.entry(rank_count).or_insert(0) += ballot.count;

        if let Some(first_choice) = ballot.choices.first() {
            *candidate_totals.entry(*first_choice).or_insert(0) += ballot.count;
            let candidate_dist = candidate_distributions.entry(*first_choice).or_default();
            *candidate_dist.entry(rank_count).or_insert(0) += ballot.count;
        }
    }

    RankingDistribution {
        overall_distribution,
        candidate_distributions,
        candidate_totals,
        total_ballots,
    }
}

/// Beats-graph over the pairwise counts: an edge from a loser to each
/// candidate strictly preferred over it.
pub fn preference_graph(
    candidates: &[CandidateId],
    preference_map: &HashMap<(CandidateId, CandidateId), u32>,
) -> HashMap<CandidateId, Vec<CandidateId>> {
    let mut graph = HashMap::new();

    for c1 in candidates {
        for c2 in candidates {
            let c1v = preference_map.get(&(*c1, *c2)).unwrap_or(&0);
            let c2v = preference_map.get(&(*c2, *c1)).unwrap_or(&0);

            if c1v > c2v {
                graph.entry(*c2).or_insert_with(Vec::new).push(*c1);
            }
        }
    }

    graph
}

/// Smallest set of candidates that beat everyone outside it. A singleton
/// Smith set is the Condorcet winner.
pub fn smith_set(
    candidates: &[CandidateId],
    graph: &HashMap<CandidateId, Vec<CandidateId>>,
) -> BTreeSet<CandidateId> {
    let mut last_set: BTreeSet<CandidateId> = candidates.iter().copied().collect();

    loop {
        let this_set: BTreeSet<CandidateId> = last_set
            .iter()
            .flat_map(|d| graph.get(d).cloned().unwrap_or_default())
            .collect();

        if this_set.is_empty() || this_set == last_set {
            break;
        }

        last_set = this_set;
    }

    last_set
}
