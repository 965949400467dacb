//! Term replacement and title normalization.

pub mod title;

use std::collections::HashMap;

use regex::Regex;
use tracing::warn;

/// Full term (lower-cased) → abbreviation, built once per run from the
/// abbreviation CSV and never mutated mid-run.
pub type AbbreviationMap = HashMap<String, String>;

/// Longest-match, case-insensitive, whole-word substitution engine.
///
/// All terms are compiled into a single alternation ordered longest-first,
/// so a multi-word term always wins over any shorter term contained in it,
/// and a replacement's output is never itself rewritten. Matches only occur
/// at word boundaries; the casing of unmatched text is untouched.
pub struct TermReplacer {
    pattern: Option<Regex>,
    replacements: AbbreviationMap,
}

impl TermReplacer {
    pub fn new(map: &AbbreviationMap) -> Self {
        let mut terms: Vec<&String> = map.keys().collect();
        if terms.is_empty() {
            return Self {
                pattern: None,
                replacements: AbbreviationMap::new(),
            };
        }
        terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let alternation = terms
            .iter()
            .map(|t| regex::escape(t))
            .collect::<Vec<_>>()
            .join("|");

        let pattern = match Regex::new(&format!(r"(?i)\b(?:{alternation})\b")) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(error = %e, "Failed to compile term pattern, replacement disabled");
                None
            }
        };

        Self {
            pattern,
            replacements: map.clone(),
        }
    }

    /// Replace every mapped term in `text`. Empty text or an empty map
    /// returns the input unchanged.
    pub fn apply(&self, text: &str) -> String {
        let Some(ref pattern) = self.pattern else {
            return text.to_string();
        };
        if text.is_empty() {
            return text.to_string();
        }
        pattern
            .replace_all(text, |caps: &regex::Captures| {
                let matched = &caps[0];
                self.replacements
                    .get(&matched.to_lowercase())
                    .cloned()
                    .unwrap_or_else(|| matched.to_string())
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> AbbreviationMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.to_string()))
            .collect()
    }

    #[test]
    fn replaces_case_insensitively_at_word_boundaries() {
        let replacer = TermReplacer::new(&map(&[(
            "transcatheter aortic valve replacement",
            "TAVR",
        )]));
        let out = replacer.apply("Outcomes after Transcatheter Aortic Valve Replacement procedures");
        assert!(out.contains("TAVR"));
        assert!(!out.contains("Transcatheter"));
        assert_eq!(out, "Outcomes after TAVR procedures");
    }

    #[test]
    fn never_replaces_inside_a_larger_word() {
        let replacer = TermReplacer::new(&map(&[("cat", "feline")]));
        assert_eq!(replacer.apply("catheter in a cat scan"), "catheter in a feline scan");
        assert_eq!(replacer.apply("concatenation"), "concatenation");
    }

    #[test]
    fn longer_terms_take_precedence() {
        let replacer = TermReplacer::new(&map(&[
            ("aortic valve replacement", "AVR"),
            ("transcatheter aortic valve replacement", "TAVR"),
        ]));
        assert_eq!(
            replacer.apply("transcatheter aortic valve replacement versus aortic valve replacement"),
            "TAVR versus AVR"
        );
    }

    #[test]
    fn empty_inputs_pass_through() {
        let replacer = TermReplacer::new(&AbbreviationMap::new());
        assert_eq!(replacer.apply("left ventricle"), "left ventricle");
        let replacer = TermReplacer::new(&map(&[("term", "T")]));
        assert_eq!(replacer.apply(""), "");
    }

    #[test]
    fn untouched_casing_outside_matches() {
        let replacer = TermReplacer::new(&map(&[("ejection fraction", "EF")]));
        assert_eq!(
            replacer.apply("Reduced Ejection Fraction in HFrEF Cohorts"),
            "Reduced EF in HFrEF Cohorts"
        );
    }
}
