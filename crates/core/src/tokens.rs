//! Token estimation.
//!
//! A character-count heuristic (roughly four characters per token). Good
//! enough for budgeting and memory bounds; never use it for billing.

pub const CHARS_PER_TOKEN: u64 = 4;

pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    chars.div_ceil(CHARS_PER_TOKEN)
}
