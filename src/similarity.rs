//! # Similarity
//!
//! Normalized string similarity on a 0..=100 scale. Two metrics are distinguished:
//! an order-sensitive matched-character ratio and an order-insensitive variant that sorts
//! whitespace tokens before taking the ratio.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Similarity score in `0..=100`.
pub type Score = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SimilarityMetric {
    /// Matched-character ratio over the strings as given.
    #[default]
    Ratio,
    /// Ratio after sorting the whitespace-separated tokens alphabetically.
    TokenSortRatio,
}

impl SimilarityMetric {
    pub fn score(self, a: &str, b: &str) -> Score {
        match self {
            SimilarityMetric::Ratio => ratio(a, b),
            SimilarityMetric::TokenSortRatio => token_sort_ratio(a, b),
        }
    }
}

impl fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMetric::Ratio => f.write_str("ratio"),
            SimilarityMetric::TokenSortRatio => f.write_str("token-sort-ratio"),
        }
    }
}

/// Matched-character similarity scaled to 0..=100: `2 * M / T`, where `M` is the
/// longest common subsequence and `T` the combined length. Halves round to even.
///
/// An empty operand scores 0.
pub fn ratio(a: &str, b: &str) -> Score {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let matches = lcs_length(&a, &b);
    let similarity = 2.0 * matches as f64 / (a.len() + b.len()) as f64;
    (similarity * 100.0).round_ties_even().clamp(0.0, 100.0) as Score
}

/// LCS length over two rows.
fn lcs_length(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// [`ratio`] over the alphabetically sorted tokens of each side.
pub fn token_sort_ratio(a: &str, b: &str) -> Score {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

fn sorted_tokens(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}
