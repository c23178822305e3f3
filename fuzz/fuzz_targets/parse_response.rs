// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use ablage::categories::CategorySet;
use ablage::suggest::parse::{parse_suggestions, CANDIDATE_COUNT};
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    raw: &'a str,
    allow_novel: bool,
}

fuzz_target!(|input: Input<'_>| {
    let categories = match CategorySet::new(["Rechnungen", "Bank", "Auto"], "Sonstiges") {
        Ok(c) => c,
        Err(_) => return,
    };

    if let Ok(candidates) = parse_suggestions(input.raw, &categories, input.allow_novel) {
        assert_eq!(candidates.len(), CANDIDATE_COUNT);
        for (i, c) in candidates.iter().enumerate() {
            assert!((0.0..=1.0).contains(&c.confidence));
            assert!(c.novel || categories.contains(&c.folder));
            assert!(candidates[..i].iter().all(|other| other.folder != c.folder));
        }
    }
});
