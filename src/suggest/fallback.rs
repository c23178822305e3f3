// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Deterministic suggestions for when the model cannot help

use crate::categories::CategorySet;
use crate::models::{Candidate, FallbackReason};

use super::parse::CANDIDATE_COUNT;

pub const FALLBACK_CONFIDENCE: f64 = 0.1;

/// Lowercase cue words per well-known folder
const KEYWORDS: &[(&str, &[&str])] = &[
    ("Rechnungen", &["rechnung", "invoice", "betrag", "eur", "€", "ustid", "mwst"]),
    ("Bank", &["iban", "bic", "überweisung", "konto", "bank"]),
    ("Vertraege", &["vertrag", "contract", "vereinbarung", "bedingungen"]),
    ("Auto", &["kfz", "auto", "fahrzeug", "versicherung", "werkstatt"]),
    ("Arbeit", &["arbeit", "gehalt", "firma", "unternehmen", "job"]),
];

/// Folders whose cue words occur in `text`, most hits first, ties by name
///
/// Only folders in the category set are scored.
pub fn keyword_matches<'a>(categories: &'a CategorySet, text: &str) -> Vec<&'a str> {
    let text = text.to_lowercase();
    let mut scored: Vec<(&str, usize)> = categories
        .iter()
        .filter_map(|folder| {
            let (_, words) = KEYWORDS.iter().find(|(name, _)| *name == folder)?;
            let hits = words.iter().filter(|word| text.contains(*word)).count();
            (hits > 0).then_some((folder, hits))
        })
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    scored.into_iter().map(|(folder, _)| folder).collect()
}

/// Folders named by cue words in the document first, then the most
/// frequently chosen folders, then the uncategorized value, then the
/// remaining categories by name.
///
/// `frequencies` may come in any order; ties are broken by folder name.
pub fn fallback_candidates(
    categories: &CategorySet,
    text: &str,
    frequencies: &[(String, u64)],
    reason: FallbackReason,
) -> Vec<Candidate> {
    let mut ranked: Vec<&(String, u64)> = frequencies
        .iter()
        .filter(|(folder, count)| *count > 0 && categories.contains(folder))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let order = keyword_matches(categories, text)
        .into_iter()
        .chain(ranked.into_iter().map(|(folder, _)| folder.as_str()))
        .chain(std::iter::once(categories.uncategorized()))
        .chain(categories.iter());

    let mut candidates: Vec<Candidate> = Vec::with_capacity(CANDIDATE_COUNT);
    for folder in order {
        if candidates.len() == CANDIDATE_COUNT {
            break;
        }
        if candidates.iter().any(|c| c.folder == folder) {
            continue;
        }
        candidates.push(Candidate {
            folder: folder.to_string(),
            reason: reason.rationale().to_string(),
            confidence: FALLBACK_CONFIDENCE,
            novel: false,
        });
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories() -> CategorySet {
        CategorySet::new(["Rechnungen", "Bank", "Auto", "Arbeit"], "Sonstiges").unwrap()
    }

    fn folders(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.folder.as_str()).collect()
    }

    #[test]
    fn test_no_history() {
        let candidates = fallback_candidates(&categories(), "", &[], FallbackReason::UnusableOutput);
        assert_eq!(folders(&candidates), vec!["Sonstiges", "Arbeit", "Auto"]);
        assert!(candidates.iter().all(|c| c.confidence == FALLBACK_CONFIDENCE));
        assert!(candidates.iter().all(|c| c.reason == "fallback: model output unusable"));
    }

    #[test]
    fn test_most_frequent_first() {
        let freq = vec![
            ("Bank".to_string(), 2),
            ("Rechnungen".to_string(), 7),
            ("Auto".to_string(), 2),
            ("Arbeit".to_string(), 1),
        ];
        let candidates = fallback_candidates(&categories(), "", &freq, FallbackReason::BackendUnavailable);
        assert_eq!(folders(&candidates), vec!["Rechnungen", "Auto", "Bank"]);
        assert_eq!(candidates[0].reason, "fallback: inference backend unavailable");
    }

    #[test]
    fn test_removed_folders_ignored() {
        let freq = vec![("Urlaub".to_string(), 9), ("Sonstiges".to_string(), 3)];
        let candidates = fallback_candidates(&categories(), "", &freq, FallbackReason::UnusableOutput);
        assert_eq!(folders(&candidates), vec!["Sonstiges", "Arbeit", "Auto"]);
    }

    #[test]
    fn test_always_three_distinct_on_minimal_set() {
        let minimal = CategorySet::new(["A", "B"], "Sonstiges").unwrap();
        let freq = vec![("A".to_string(), 1)];
        let candidates = fallback_candidates(&minimal, "", &freq, FallbackReason::UnusableOutput);
        assert_eq!(folders(&candidates), vec!["A", "Sonstiges", "B"]);
    }

    #[test]
    fn test_cue_words_rank_ahead_of_frequency() {
        let freq = vec![("Arbeit".to_string(), 9)];
        let text = "Rechnung Nr. 4711\nBetrag: 89,90 EUR\nIBAN DE02120300000000202051";
        let candidates = fallback_candidates(&categories(), text, &freq, FallbackReason::BackendUnavailable);

        assert_eq!(folders(&candidates), vec!["Rechnungen", "Bank", "Arbeit"]);
        assert!(candidates.iter().all(|c| c.confidence == FALLBACK_CONFIDENCE));
        assert!(candidates.iter().all(|c| c.reason == "fallback: inference backend unavailable"));
    }

    #[test]
    fn test_cue_words_only_for_known_categories() {
        // "Vertrag" has cue words but is not a category here
        let cats = categories();
        let matches = keyword_matches(&cats, "Mietvertrag, Kfz-Werkstatt");
        assert_eq!(matches, vec!["Auto"]);
        assert!(keyword_matches(&categories(), "Sehr geehrte Damen und Herren").is_empty());
    }
}
