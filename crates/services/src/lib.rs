#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod sessions;

pub use lingua_core::Clock;
pub use lingua_core::reporting::{StudyRecommendation, WaitBucket};

pub use app_services::{AppServices, ServiceSettings};
pub use error::{AppServicesError, SessionError};
pub use sessions::{
    CardView, LearnerStats, SessionAnswerResult, SessionConfig, SessionManager, SessionRegistry,
    SessionView,
};
