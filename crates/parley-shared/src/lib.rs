//! Types shared by every Parley crate: identifiers, constants, the clock
//! abstraction and identifier errors.

pub mod clock;
pub mod constants;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::IdError;
pub use types::{ConversationId, SessionId, UserId};
