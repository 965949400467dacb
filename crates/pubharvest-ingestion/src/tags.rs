//! Keyword/tag suggestion facility.
//!
//! The pipeline only needs "text in, ranked phrases out"; the default
//! implementation is a deterministic n-gram scorer so suggestions are stable
//! across re-runs of the same record.

use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;

pub trait TagSuggester: Send + Sync {
    /// Up to `top_k` ranked phrases, most relevant first.
    fn suggest(&self, text: &str, top_k: usize) -> Vec<String>;
}

lazy_static! {
    static ref STOPWORDS: HashSet<&'static str> = [
        "a", "an", "and", "are", "as", "at", "be", "been", "but", "by",
        "for", "from", "has", "have", "in", "into", "is", "it", "its",
        "may", "more", "no", "not", "of", "on", "or", "our", "than",
        "that", "the", "their", "there", "these", "this", "those", "to",
        "was", "we", "were", "which", "while", "with", "who", "after",
        "among", "between", "during", "using", "versus", "via",
    ]
    .into_iter()
    .collect();
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

const MAX_NGRAM: usize = 3;

/// Frequency × phrase-length scorer over stopword-free word runs.
pub struct NgramSuggester;

impl NgramSuggester {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NgramSuggester {
    fn default() -> Self {
        Self::new()
    }
}

impl TagSuggester for NgramSuggester {
    fn suggest(&self, text: &str, top_k: usize) -> Vec<String> {
        if text.is_empty() || top_k == 0 {
            return Vec::new();
        }

        // Runs of consecutive content tokens; stopwords, numbers, and short
        // tokens break a run so phrases never span them.
        let mut runs: Vec<Vec<String>> = vec![Vec::new()];
        for raw in text.split(|c: char| !c.is_alphanumeric() && c != '-') {
            let token = raw.trim_matches('-').to_lowercase();
            let content = token.len() >= 3
                && !is_stopword(&token)
                && !token.chars().all(|c| c.is_ascii_digit());
            if content {
                runs.last_mut().unwrap().push(token);
            } else if !runs.last().unwrap().is_empty() {
                runs.push(Vec::new());
            }
        }

        // phrase → (count, first position)
        let mut candidates: HashMap<String, (usize, usize)> = HashMap::new();
        let mut position = 0usize;
        for run in &runs {
            for start in 0..run.len() {
                for n in 1..=MAX_NGRAM.min(run.len() - start) {
                    let phrase = run[start..start + n].join(" ");
                    let entry = candidates.entry(phrase).or_insert((0, position));
                    entry.0 += 1;
                }
                position += 1;
            }
        }

        let mut ranked: Vec<(String, usize, usize)> = candidates
            .into_iter()
            .map(|(phrase, (count, first))| {
                let words = phrase.split(' ').count();
                (phrase, count * words, first)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)).then(a.0.cmp(&b.0)));

        ranked.into_iter().take(top_k).map(|(p, _, _)| p).collect()
    }
}
