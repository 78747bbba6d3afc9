//! Lexicon-based polarity scorer.
//!
//! The monitoring engine treats scoring as a black-box collaborator behind
//! [`pulsewatch_core::SentimentScorer`]; this crate provides the default
//! implementation. Swapping in a model-backed scorer means implementing the
//! same one-method trait.

mod scorer;

pub use scorer::{lexicon_score, LexiconScorer};
