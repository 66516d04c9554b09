//! Ranked-choice tabulation and analytics core.
//!
//! Takes canonical ballots for one contest, elects winners under
//! instant-runoff or single transferable vote (whole-ballot or fractional
//! surplus transfer), and emits a reconstructible round-by-round trace plus
//! ballot-level analytic tables. No IO: loaders hand in a [`ContestInput`],
//! reporting takes a [`ContestReport`] out.
//!
//! ```rust
//! use tabulation_core::{
//!     generate_report, Candidate, CandidateId, CandidateType, CanonicalBallot,
//!     ContestInput, TabulationVariant,
//! };
//!
//! let input = ContestInput {
//!     candidates: vec![
//!         Candidate::new("Alice".to_string(), CandidateType::Regular),
//!         Candidate::new("Bob".to_string(), CandidateType::Regular),
//!     ],
//!     ballots: vec![
//!         CanonicalBallot::new(vec![CandidateId(0), CandidateId(1)], 6),
//!         CanonicalBallot::new(vec![CandidateId(1)], 4),
//!     ],
//!     seats: 1,
//!     variant: TabulationVariant::InstantRunoff,
//!     quota_ballot_count: None,
//! };
//!
//! let report = generate_report(&input).unwrap();
//! assert_eq!(report.winner, Some(CandidateId(0)));
//! ```

pub mod analytics;
pub mod model;
pub mod report;
pub mod tabulator;

pub use model::election::{
    canonicalize_ballots, Candidate, CandidateId, CandidateType, CanonicalBallot, ContestInput,
    TabulationVariant,
};
pub use model::report::{
    CandidatePairEntry, CandidatePairTable, CandidateVotes, ContestReport, RankingDistribution,
};
pub use report::{generate_report, generate_reports, winner};
pub use tabulator::{
    droop_quota, tabulate, Allocatee, TabulationError, TabulationOutcome, TabulationResult,
    TabulatorAllocation, TabulatorRound, Transfer, TransferKind, VoteCount,
};
