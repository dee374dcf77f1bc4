pub mod matching_engine;
pub mod usage_processor;

pub use matching_engine::MatchingEngine;
pub use usage_processor::UsageProcessor;
