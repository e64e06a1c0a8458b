//! Transport-agnostic domain types.
//!
//! Nothing here touches the network or the system clock: windows and penalty
//! state take the current instant as an argument.

pub mod penalty;
pub mod request;
pub mod sample;
pub mod window;

pub use penalty::{PenaltyPolicy, PenaltyState};
pub use request::{Reply, Request, Response, WorkerId};
pub use sample::{OutcomeSample, StatusCategory};
pub use window::TokenWindow;
