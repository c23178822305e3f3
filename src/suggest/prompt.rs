// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Classification prompt template

use std::fmt::Write;

use crate::categories::CategorySet;
use crate::models::{preview, DecisionRecord};

/// Everything the template embeds
pub struct PromptContext<'a> {
    pub text: &'a str,
    pub categories: &'a CategorySet,
    /// Most recent first, already capped by the caller
    pub history: &'a [DecisionRecord],
    pub allow_novel: bool,
}

const SHAPE: &str = r#"{"suggestions": [
  {"folder": "Ordnername", "reason": "Kurze Begründung", "confidence": 0.85},
  {"folder": "Ordnername", "reason": "Kurze Begründung", "confidence": 0.60},
  {"folder": "Ordnername", "reason": "Kurze Begründung", "confidence": 0.35}
]}"#;

/// Build the prompt; `previous_error` switches to the stricter re-prompt
pub fn build_prompt(ctx: &PromptContext<'_>, previous_error: Option<&str>) -> String {
    let mut prompt = String::new();

    prompt.push_str("Du bist ein Ablage-Assistent für ein deutsches Dokumentensystem.\n\n");

    prompt.push_str("Verfügbare Zielordner:\n");
    for folder in ctx.categories.iter() {
        let _ = writeln!(prompt, "- {}", folder);
    }
    let _ = writeln!(
        prompt,
        "Wenn nichts passt, verwende \"{}\".",
        ctx.categories.uncategorized()
    );
    if ctx.allow_novel {
        prompt.push_str(
            "Du darfst einen neuen Ordner vorschlagen; markiere ihn dann mit \"new\": true.\n",
        );
    }

    if !ctx.history.is_empty() {
        prompt.push_str("\nFrühere Entscheidungen (neueste zuerst):\n");
        for record in ctx.history {
            let _ = writeln!(
                prompt,
                "- \"{}\" -> {}",
                preview(&record.summary, 120).replace('\n', " "),
                record.chosen_folder
            );
        }
    }

    prompt.push_str("\nDokumentinhalt:\n");
    prompt.push_str(ctx.text);
    prompt.push_str("\n\n");

    prompt.push_str(
        "Aufgabe: Analysiere den Dokumentinhalt und schlage genau 3 verschiedene Zielordner vor, \
         sortiert nach Wahrscheinlichkeit. Berücksichtige deutsche Begriffe, Rechnungsnummern, IBANs.\n",
    );
    prompt.push_str(
        "Antworte ausschließlich mit striktem JSON in genau dieser Form, confidence zwischen 0.0 und 1.0:\n",
    );
    prompt.push_str(SHAPE);
    prompt.push('\n');

    if let Some(error) = previous_error {
        let _ = write!(
            prompt,
            "\nDeine letzte Antwort war unbrauchbar ({}). Antworte NUR mit dem JSON-Objekt oben: \
             kein Text davor oder danach, kein Markdown, genau 3 Einträge, jeder \"folder\" aus der \
             Liste der Zielordner, keine Wiederholungen.\n",
            error
        );
    }

    prompt
}
