//! Structural text features: length, word speed, lexical repetition, and
//! punctuation density. No language model, no tokenizer state — just counts
//! over the raw text and its whitespace split.

use std::collections::HashSet;

pub(crate) struct Structural {
    pub len_score: f32,
    pub speed: f32,
    pub reps: f32,
    pub dots: f32,
    pub caps: f32,
}

pub(crate) fn features(text: &str, words: &[&str]) -> Structural {
    let char_len = text.chars().count();
    let wc = words.len();

    let len_score = (char_len as f32 / 400.0).min(1.0);
    let speed = (wc as f32 / 12.0).min(2.0);

    let reps = if wc == 0 {
        1.0
    } else {
        let unique: HashSet<&str> = words.iter().copied().collect();
        unique.len() as f32 / wc as f32
    };

    let dot_count = text.matches('.').count();
    let ellipsis_count = text.matches("...").count();
    let dots = ((dot_count + 2 * ellipsis_count) as f32).min(6.0) / 6.0;

    let caps = text.chars().filter(|c| c.is_uppercase()).count() as f32 / (char_len.max(1) as f32);

    Structural {
        len_score,
        speed,
        reps,
        dots,
        caps,
    }
}
