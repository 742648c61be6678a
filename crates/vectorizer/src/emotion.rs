//! Lexicon-based emotion scoring over a fixed multilingual token list.
//!
//! Scoring is a plain word-count model: each lexicon hit contributes `1.0`,
//! scaled by a preceding intensifier or negator, normalized by token count,
//! and clamped to `[0, 1]`. There is no learned model and no randomness, so
//! the same text always produces the same [`EmotionReport`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-záéíóúñü]+").expect("static pattern is valid"));

const EMOTIONS: [&str; 5] = ["joy", "sad", "anxiety", "anger", "calm"];

const JOY: &[&str] = &[
    "happy", "great", "awesome", "excellent", "good", "genial", "feliz", "excelente", "bien",
];
const SAD: &[&str] = &[
    "sad", "depressed", "cry", "bad", "triste", "deprimido", "llorar", "mal",
];
const ANXIETY: &[&str] = &[
    "anxious", "nervous", "worried", "panic", "ansioso", "nervioso", "preocupado", "panico",
    "pánico",
];
const ANGER: &[&str] = &[
    "angry", "furious", "hate", "annoyed", "enfadado", "furioso", "odio", "molesto",
];
const CALM: &[&str] = &["calm", "relaxed", "peace", "ok", "tranquilo", "relajado", "paz"];

const INTENSIFIERS: &[&str] = &["very", "super", "ultra", "muy", "re", "demasiado"];
const NEGATORS: &[&str] = &["not", "no", "never", "nunca", "jamas", "jamás"];

fn lexicon_for(index: usize) -> &'static [&'static str] {
    match index {
        0 => JOY,
        1 => SAD,
        2 => ANXIETY,
        3 => ANGER,
        4 => CALM,
        _ => unreachable!("emotion set is closed at 5 classes"),
    }
}

fn round3(x: f32) -> f32 {
    (x * 1000.0).round() / 1000.0
}

/// Per-class lexicon scores and derived affect scalars for one piece of text.
///
/// `signature` pins a hash of the score vector so two reports can be
/// compared for equality without relying on float comparison of every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionReport {
    pub joy: f32,
    pub sad: f32,
    pub anxiety: f32,
    pub anger: f32,
    pub calm: f32,
    pub dominant: &'static str,
    pub dominant_score: f32,
    pub arousal: f32,
    pub valence: f32,
    pub signature: String,
}

impl EmotionReport {
    pub fn scores(&self) -> [f32; 5] {
        [self.joy, self.sad, self.anxiety, self.anger, self.calm]
    }
}

/// Stateless analyzer; holds no mutable state and is safe to share across threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmotionAnalyzer;

impl EmotionAnalyzer {
    pub fn analyze(&self, text: &str) -> EmotionReport {
        let lower = text.to_lowercase();
        let words: Vec<&str> = TOKEN_RE.find_iter(&lower).map(|m| m.as_str()).collect();
        let n = words.len().max(1) as f32;
        let exclamations = text.matches('!').count() + text.matches('¡').count();
        let ellipses = text.matches("...").count();

        let mut raw = [0f32; 5];
        for (i, w) in words.iter().enumerate() {
            for emo in 0..5 {
                if lexicon_for(emo).contains(w) {
                    let mut hit = 1.0f32;
                    if i > 0 && INTENSIFIERS.contains(&words[i - 1]) {
                        hit *= 1.5;
                    }
                    if i > 0 && NEGATORS.contains(&words[i - 1]) {
                        hit *= 0.5;
                    }
                    raw[emo] += hit;
                }
            }
        }

        let mut scores = [0f32; 5];
        for (emo, slot) in scores.iter_mut().enumerate() {
            *slot = round3(raw[emo] / n * 10.0).min(1.0);
        }

        if exclamations > 2 {
            scores[0] = (scores[0] * 1.15).min(1.0); // joy
            scores[3] = (scores[3] * 1.15).min(1.0); // anger
        }
        if ellipses > 1 {
            scores[2] = (scores[2] * 1.2).min(1.0); // anxiety
        }

        // First strict maximum wins on ties, matching the lexicon's
        // joy/sad/anxiety/anger/calm declaration order.
        let mut dominant_idx = 0usize;
        for emo in 1..5 {
            if scores[emo] > scores[dominant_idx] {
                dominant_idx = emo;
            }
        }

        let arousal = round3((scores[2] + scores[3] + scores[0]) / 2.0).min(1.0);
        let pos = scores[0] + scores[4];
        let neg = scores[1] + scores[2] + scores[3];
        let total = if pos + neg == 0.0 { 1.0 } else { pos + neg };
        let valence = round3(pos / total);

        let mut sig_input = String::new();
        for (emo, score) in EMOTIONS.iter().zip(scores.iter()) {
            sig_input.push_str(emo);
            sig_input.push(':');
            sig_input.push_str(&format!("{score:.3}"));
            sig_input.push(',');
        }
        let mut hasher = Sha256::new();
        hasher.update(sig_input.as_bytes());
        let digest = hex::encode(hasher.finalize());

        EmotionReport {
            joy: scores[0],
            sad: scores[1],
            anxiety: scores[2],
            anger: scores[3],
            calm: scores[4],
            dominant: EMOTIONS[dominant_idx],
            dominant_score: scores[dominant_idx],
            arousal,
            valence,
            signature: digest[..16].to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_text_has_zero_scores() {
        let report = EmotionAnalyzer.analyze("the quick brown fox");
        assert_eq!(report.scores(), [0.0; 5]);
        assert_eq!(report.dominant, "joy"); // first class wins an all-zero tie
    }

    #[test]
    fn intensifier_scales_hit_up() {
        let plain = EmotionAnalyzer.analyze("good");
        let intensified = EmotionAnalyzer.analyze("very good");
        assert!(intensified.joy > plain.joy);
    }

    #[test]
    fn negator_scales_hit_down() {
        let plain = EmotionAnalyzer.analyze("good");
        let negated = EmotionAnalyzer.analyze("not good");
        assert!(negated.joy < plain.joy);
        assert!(negated.joy > 0.0);
    }

    #[test]
    fn excess_exclamations_amplify_joy_and_anger() {
        let calm = EmotionAnalyzer.analyze("happy happy");
        let excited = EmotionAnalyzer.analyze("happy happy!!!");
        assert!(excited.joy >= calm.joy);
    }

    #[test]
    fn repeated_ellipses_amplify_anxiety() {
        let plain = EmotionAnalyzer.analyze("worried");
        let trailing = EmotionAnalyzer.analyze("worried... worried...");
        assert!(trailing.anxiety >= plain.anxiety);
    }

    #[test]
    fn is_deterministic() {
        let a = EmotionAnalyzer.analyze("I am very worried, not happy at all!!!");
        let b = EmotionAnalyzer.analyze("I am very worried, not happy at all!!!");
        assert_eq!(a, b);
    }

    #[test]
    fn empty_text_does_not_panic() {
        let report = EmotionAnalyzer.analyze("");
        assert_eq!(report.scores(), [0.0; 5]);
    }
}
