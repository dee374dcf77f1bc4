pub mod messages;
pub mod usage_event;

pub use messages::{
    MatchedUsageMessage, MatchingDeadLetter, ProcessingDeadLetter, SuggestedMatch,
    UnmatchedUsageMessage,
};
pub use usage_event::{MatchMethod, NormalizedUsageEvent, ProcessingStatus, UsageType};
