//! End-to-end contest scenarios through the public API, with invariant
//! sweeps over the produced traces.

use tabulation_core::{
    generate_report, Allocatee, Candidate, CandidateId, CandidateType, CanonicalBallot,
    ContestInput, ContestReport, TabulationVariant, TransferKind, VoteCount,
};

fn contest(
    names: &[&str],
    ballots: Vec<(Vec<u32>, u32)>,
    seats: u32,
    variant: TabulationVariant,
) -> ContestInput {
    ContestInput {
        candidates: names
            .iter()
            .map(|n| Candidate::new(n.to_string(), CandidateType::Regular))
            .collect(),
        ballots: ballots
            .into_iter()
            .map(|(choices, count)| {
                CanonicalBallot::new(choices.into_iter().map(CandidateId).collect(), count)
            })
            .collect(),
        seats,
        variant,
        quota_ballot_count: None,
    }
}

fn allocation(report: &ContestReport, round: usize, target: Allocatee) -> f64 {
    report.rounds[round]
        .allocations
        .iter()
        .find(|a| a.allocatee == target)
        .map(|a| a.votes.0)
        .unwrap_or_else(|| panic!("round {} has no allocation for {:?}", round, target))
}

fn candidate(id: u32) -> Allocatee {
    Allocatee::Candidate(CandidateId(id))
}

/// Conservation and monotone exhaustion over every round of a trace.
fn sweep_invariants(report: &ContestReport) {
    let total = report.ballot_count as f64;
    let mut previous_exhausted = 0.0;

    for round in &report.rounds {
        let sum: f64 = round.allocations.iter().map(|a| a.votes.0).sum();
        assert!(
            (sum - total).abs() < 1e-6 * total.max(1.0),
            "allocations sum to {} of {}",
            sum,
            total
        );

        let exhausted = round
            .allocations
            .iter()
            .find(|a| a.allocatee == Allocatee::Exhausted)
            .map(|a| a.votes.0)
            .unwrap_or(0.0);
        assert!(exhausted >= previous_exhausted, "exhaustion went backwards");
        previous_exhausted = exhausted;

        assert!(
            (round.continuing_ballots.0 - (total - exhausted)).abs() < 1e-6,
            "continuing ballots disagree with exhaustion"
        );
    }
}

/// Quota pin: every quota-elected candidate holds exactly Q from its
/// election round onward.
fn sweep_elected_pin(report: &ContestReport) {
    for votes in &report.total_votes {
        let Some(round_elected) = votes.round_elected else {
            continue;
        };
        for round in &report.rounds[round_elected as usize..] {
            let held = round
                .allocations
                .iter()
                .find(|a| a.allocatee == Allocatee::Candidate(votes.candidate))
                .map(|a| a.votes.0)
                .unwrap_or_else(|| panic!("elected candidate missing from a later round"));
            assert!(
                (held - f64::from(report.quota)).abs() < 1e-9,
                "candidate {:?} holds {} instead of the quota {}",
                votes.candidate,
                held,
                report.quota
            );
        }
    }
}

/// Scenario S1: three-candidate IRV decided in two rounds.
#[test]
fn irv_three_candidates() {
    let input = contest(
        &["Alice", "Bob", "Carol"],
        vec![(vec![0, 1], 40), (vec![1, 0], 35), (vec![2, 0, 1], 25)],
        1,
        TabulationVariant::InstantRunoff,
    );
    let report = generate_report(&input).unwrap();

    assert_eq!(report.rounds.len(), 2);
    assert_eq!(report.winner, Some(CandidateId(0)));

    assert_eq!(allocation(&report, 0, candidate(0)), 40.0);
    assert_eq!(allocation(&report, 0, candidate(1)), 35.0);
    assert_eq!(allocation(&report, 0, candidate(2)), 25.0);
    assert_eq!(allocation(&report, 0, Allocatee::Exhausted), 0.0);

    assert_eq!(allocation(&report, 1, candidate(0)), 65.0);
    assert_eq!(allocation(&report, 1, candidate(1)), 35.0);

    let transfers = &report.rounds[1].transfers;
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].from, CandidateId(2));
    assert_eq!(transfers[0].to, candidate(0));
    assert_eq!(transfers[0].count, VoteCount(25.0));
    assert_eq!(transfers[0].kind, TransferKind::Elimination);

    sweep_invariants(&report);
}

/// Scenario S2: whole-ballot STV, every ballot A > B > C > D, two seats.
#[test]
fn whole_ballot_stv_surplus_chain() {
    let input = contest(
        &["A", "B", "C", "D"],
        vec![(vec![0, 1, 2, 3], 10)],
        2,
        TabulationVariant::WholeBallotStv,
    );
    let report = generate_report(&input).unwrap();

    assert_eq!(report.quota, 4);
    assert_eq!(report.winners, vec![CandidateId(0), CandidateId(1)]);

    assert_eq!(allocation(&report, 0, candidate(0)), 10.0);
    assert_eq!(allocation(&report, 1, candidate(0)), 4.0);
    assert_eq!(allocation(&report, 1, candidate(1)), 6.0);
    assert_eq!(allocation(&report, 2, candidate(1)), 4.0);
    assert_eq!(allocation(&report, 2, candidate(2)), 2.0);

    sweep_invariants(&report);
    sweep_elected_pin(&report);
}

/// Scenario S3: two candidates reach the quota in the same round with no
/// surplus; both are elected there, alphabetically ordered.
#[test]
fn whole_ballot_stv_simultaneous_quota() {
    let input = contest(
        &["A", "B", "C"],
        vec![(vec![0, 1, 2], 5), (vec![1, 0, 2], 5), (vec![2, 0, 1], 2)],
        2,
        TabulationVariant::WholeBallotStv,
    );
    let report = generate_report(&input).unwrap();

    assert_eq!(report.quota, 5);
    assert_eq!(report.rounds.len(), 1);
    assert_eq!(report.winners, vec![CandidateId(0), CandidateId(1)]);
    assert!(report.rounds[0].transfers.is_empty());
    assert_eq!(
        report.rounds[0].elected,
        vec![CandidateId(0), CandidateId(1)]
    );

    sweep_invariants(&report);
    sweep_elected_pin(&report);
}

/// Scenario S4: fractional STV; A's surplus splits every ballot at half
/// weight and carries C over the quota.
#[test]
fn fractional_stv_half_weight_transfer() {
    let input = contest(
        &["A", "B", "C"],
        vec![(vec![0, 1], 6), (vec![0, 2], 6), (vec![2, 1], 3)],
        2,
        TabulationVariant::FractionalStv,
    );
    let report = generate_report(&input).unwrap();

    assert_eq!(report.quota, 6);
    assert_eq!(report.winners, vec![CandidateId(0), CandidateId(2)]);

    assert_eq!(allocation(&report, 0, candidate(0)), 12.0);
    assert_eq!(allocation(&report, 0, candidate(2)), 3.0);
    assert_eq!(allocation(&report, 1, candidate(0)), 6.0);
    assert_eq!(allocation(&report, 1, candidate(1)), 3.0);
    assert_eq!(allocation(&report, 1, candidate(2)), 6.0);

    sweep_invariants(&report);
    sweep_elected_pin(&report);
}

/// Scenario S5: first-alternate table over the S1 ballots.
#[test]
fn first_alternate_table() {
    let input = contest(
        &["Alice", "Bob", "Carol"],
        vec![(vec![0, 1], 40), (vec![1, 0], 35), (vec![2, 0, 1], 25)],
        1,
        TabulationVariant::InstantRunoff,
    );
    let report = generate_report(&input).unwrap();
    let table = &report.first_alternate;

    let alice_bob = table.entry(candidate(0), candidate(1)).unwrap();
    assert_eq!(alice_bob.numerator, 40);
    assert_eq!(alice_bob.denominator, 40);
    assert!(table.entry(candidate(0), Allocatee::Exhausted).is_none());

    let bob_alice = table.entry(candidate(1), candidate(0)).unwrap();
    assert_eq!(bob_alice.numerator, 35);
    assert_eq!(bob_alice.denominator, 35);

    let carol_alice = table.entry(candidate(2), candidate(0)).unwrap();
    assert_eq!(carol_alice.numerator, 25);
    assert_eq!(carol_alice.denominator, 25);
    assert!(table.entry(candidate(2), candidate(1)).is_none());
    assert!(table.entry(candidate(2), Allocatee::Exhausted).is_none());
}

/// Scenario S6: pairwise preferences over the S1 ballots.
#[test]
fn pairwise_preferences_table() {
    let input = contest(
        &["Alice", "Bob", "Carol"],
        vec![(vec![0, 1], 40), (vec![1, 0], 35), (vec![2, 0, 1], 25)],
        1,
        TabulationVariant::InstantRunoff,
    );
    let report = generate_report(&input).unwrap();
    let table = &report.pairwise_preferences;

    let alice_over_bob = table.entry(candidate(0), candidate(1)).unwrap();
    assert_eq!(alice_over_bob.numerator, 65);
    assert_eq!(alice_over_bob.denominator, 100);
    assert_eq!(alice_over_bob.fraction, 0.65);

    let bob_over_alice = table.entry(candidate(1), candidate(0)).unwrap();
    assert_eq!(bob_over_alice.numerator, 35);
    assert_eq!(bob_over_alice.denominator, 100);

    assert_eq!(
        alice_over_bob.numerator + bob_over_alice.numerator,
        alice_over_bob.denominator
    );
}

/// Boundary B1: a first-round strict majority ends the contest in one
/// round with no transfers.
#[test]
fn majority_in_one_round() {
    let input = contest(
        &["Alice", "Bob"],
        vec![(vec![0, 1], 60), (vec![1, 0], 40)],
        1,
        TabulationVariant::InstantRunoff,
    );
    let report = generate_report(&input).unwrap();

    assert_eq!(report.rounds.len(), 1);
    assert_eq!(report.winner, Some(CandidateId(0)));
    assert!(report.rounds[0].transfers.is_empty());
    sweep_invariants(&report);
}

/// Boundary B2: bullet votes for distinct candidates, no more candidates
/// than seats: everyone is seated in a single round with no transfers.
#[test]
fn bullet_votes_fill_all_seats_at_once() {
    let input = contest(
        &["A", "B", "C"],
        vec![(vec![0], 1), (vec![1], 1), (vec![2], 1)],
        3,
        TabulationVariant::WholeBallotStv,
    );
    let report = generate_report(&input).unwrap();

    assert_eq!(report.quota, 1);
    assert_eq!(report.rounds.len(), 1);
    assert!(report.rounds[0].transfers.is_empty());
    assert_eq!(
        report.winners,
        vec![CandidateId(0), CandidateId(1), CandidateId(2)]
    );
    sweep_invariants(&report);
    sweep_elected_pin(&report);
}

/// Boundary B3: a unanimous A > B > C electorate with two seats elects A,
/// then B on A's surplus; C is never elected.
#[test]
fn unanimous_preference_order() {
    let input = contest(
        &["A", "B", "C"],
        vec![(vec![0, 1, 2], 9)],
        2,
        TabulationVariant::WholeBallotStv,
    );
    let report = generate_report(&input).unwrap();

    // N = 9, Q = 4: A keeps 4, B takes the surplus of 5 and is elected;
    // B's own surplus of 1 moves on to C.
    assert_eq!(report.quota, 4);
    assert_eq!(report.winners, vec![CandidateId(0), CandidateId(1)]);
    assert_eq!(allocation(&report, 1, candidate(1)), 5.0);
    let last = report.rounds.len() - 1;
    assert_eq!(allocation(&report, last, candidate(1)), 4.0);
    assert_eq!(allocation(&report, last, candidate(2)), 1.0);
    assert!(report
        .total_votes
        .iter()
        .find(|v| v.candidate == CandidateId(2))
        .map(|v| v.round_elected.is_none())
        .unwrap());

    sweep_invariants(&report);
    sweep_elected_pin(&report);
}

/// The Droop quota honors the explicit override for CVRs carrying ballots
/// of other contests.
#[test]
fn quota_ballot_count_override() {
    let mut input = contest(
        &["A", "B", "C"],
        vec![(vec![0, 1, 2], 10)],
        2,
        TabulationVariant::WholeBallotStv,
    );
    input.quota_ballot_count = Some(7);
    let report = generate_report(&input).unwrap();
    // floor(7 / 3) + 1, not floor(10 / 3) + 1.
    assert_eq!(report.quota, 3);
}

/// Reordering canonical ballots is invisible in the report (R1), and
/// repeated runs serialize byte-identically (Q6).
#[test]
fn reports_are_reproducible() {
    let forward = contest(
        &["A", "B", "C", "D"],
        vec![
            (vec![0, 1, 2], 4),
            (vec![1, 3], 3),
            (vec![2, 0], 3),
            (vec![3, 2, 1], 2),
        ],
        2,
        TabulationVariant::FractionalStv,
    );
    let mut shuffled = forward.clone();
    shuffled.ballots.rotate_left(2);

    let a = serde_json::to_string(&generate_report(&forward).unwrap()).unwrap();
    let b = serde_json::to_string(&generate_report(&shuffled).unwrap()).unwrap();
    assert_eq!(a, b);
}
