mod card;
mod ids;
mod progress;
mod review;
mod session;

pub use ids::{CardId, LearnerId, ParseIdError, SessionId};

pub use card::{Card, CardError, DEFAULT_CATEGORY, Level};
pub use progress::{MAX_DIFFICULTY, ProgressError, ProgressRecord, StudyCard};
pub use review::{Answer, AnswerOutcome, Rating, ReviewError};
pub use session::{Session, SessionProgress, SessionStateError};
