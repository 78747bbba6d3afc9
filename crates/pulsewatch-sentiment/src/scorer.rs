//! Word-weight lexicon scorer for viewer comments.

use pulsewatch_core::SentimentScorer;

/// Comment-vocabulary word weights.
///
/// Keys are lowercase single words. Values in `(0.0, 1.0]` are positive,
/// in `[-1.0, 0.0)` are negative. The final score is clamped to `[-1.0, 1.0]`.
pub(crate) const LEXICON: &[(&str, f64)] = &[
    // Positive signals
    ("great", 0.4),
    ("good", 0.3),
    ("excellent", 0.5),
    ("amazing", 0.5),
    ("awesome", 0.5),
    ("love", 0.5),
    ("loved", 0.5),
    ("best", 0.5),
    ("beautiful", 0.4),
    ("brilliant", 0.5),
    ("fantastic", 0.5),
    ("perfect", 0.5),
    ("fun", 0.3),
    ("funny", 0.3),
    ("helpful", 0.4),
    ("informative", 0.4),
    ("interesting", 0.3),
    ("recommend", 0.4),
    ("subscribed", 0.4),
    ("thanks", 0.3),
    ("underrated", 0.3),
    ("wow", 0.3),
    // Negative signals
    ("bad", -0.4),
    ("terrible", -0.6),
    ("awful", -0.6),
    ("worst", -0.6),
    ("horrible", -0.6),
    ("hate", -0.6),
    ("hated", -0.6),
    ("boring", -0.4),
    ("clickbait", -0.5),
    ("cringe", -0.4),
    ("disappointed", -0.5),
    ("disappointing", -0.5),
    ("dislike", -0.4),
    ("fake", -0.5),
    ("garbage", -0.6),
    ("misleading", -0.5),
    ("overrated", -0.3),
    ("scam", -0.7),
    ("stupid", -0.4),
    ("trash", -0.6),
    ("unsubscribed", -0.5),
    ("waste", -0.5),
];

/// Score a text string using the comment lexicon.
///
/// Splits text into lowercase words, sums matching weights, and clamps
/// the result to `[-1.0, 1.0]`. Returns `0.0` for empty or unknown text.
#[must_use]
pub fn lexicon_score(text: &str) -> f64 {
    let mut score = 0.0_f64;
    for word in text.split_whitespace() {
        let w = word
            .trim_matches(|c: char| !c.is_alphabetic())
            .to_lowercase();
        for &(lex_word, weight) in LEXICON {
            if w == lex_word {
                score += weight;
                break;
            }
        }
    }
    score.clamp(-1.0, 1.0)
}

/// The default [`SentimentScorer`] implementation over [`lexicon_score`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LexiconScorer;

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> f64 {
        lexicon_score(text)
    }
}
