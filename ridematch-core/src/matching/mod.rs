//! The matching engine.
//!
//! Leaves first: [`presence`] tracks who is online, [`eligibility`] judges
//! one (ride, driver) pair, [`dispatcher`] turns both into offers,
//! [`offers`] resolves driver answers, [`coordinator`] finishes an
//! assignment, and [`engine`] ties them together for callers.

pub mod coordinator;
pub mod dispatcher;
pub mod eligibility;
pub mod engine;
pub mod error;
pub mod offers;
pub mod presence;
pub mod rules;

pub use coordinator::AssignmentCoordinator;
pub use dispatcher::{DispatchOutcome, OfferDispatcher};
pub use eligibility::{DriverCandidate, EligibilityEvaluator, Evaluation, Ineligibility};
pub use engine::{CancelledRide, CreatedRide, DeclineResult, MatchingEngine, NewRide};
pub use error::MatchError;
pub use offers::{AcceptedOffer, DeclinedOffer, OfferStateMachine};
pub use presence::{DriverPresenceRegistry, PresenceChange};
pub use rules::{RankedDriver, Rejection};
