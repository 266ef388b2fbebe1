pub mod machine;
pub mod states;

pub use machine::ApprovalStateMachine;
pub use states::{ApprovalStage, ClaimEvent, ClaimStatus, TransitionOutcome};
