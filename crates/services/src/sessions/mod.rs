mod manager;
mod registry;
mod view;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use manager::{SessionAnswerResult, SessionConfig, SessionManager};
pub use registry::SessionRegistry;
pub use view::{CardView, LearnerStats, SessionView};
