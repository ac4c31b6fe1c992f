//! Heuristic intent classification for outgoing user text.
//!
//! Classification is a first-match scan over a fixed, ordered keyword table.
//! The table order is part of the contract: text that matches keywords of
//! several intents always resolves to the intent listed first.

use serde::{Deserialize, Serialize};

/// Coarse category of what the user is trying to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Intent {
    Explore,
    Compare,
    Analyze,
    Recommend,
    Discuss,
    DeepDive,
    Personal,
    General,
}

impl Intent {
    /// Wire name of the intent (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Explore => "explore",
            Intent::Compare => "compare",
            Intent::Analyze => "analyze",
            Intent::Recommend => "recommend",
            Intent::Discuss => "discuss",
            Intent::DeepDive => "deep-dive",
            Intent::Personal => "personal",
            Intent::General => "general",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered `(intent, keywords)` table. Keywords are lower-case.
pub const INTENT_KEYWORDS: &[(Intent, &[&str])] = &[
    (
        Intent::Explore,
        &[
            "explore",
            "discover",
            "tell me about",
            "show me",
            "what is",
            "who is",
            "introduce",
        ],
    ),
    (
        Intent::Compare,
        &[
            "compare",
            "versus",
            " vs ",
            "difference between",
            "similar to",
            "better than",
        ],
    ),
    (
        Intent::Analyze,
        &[
            "analyze",
            "analyse",
            "analysis",
            "why did",
            "how did",
            "break down",
            "influence",
        ],
    ),
    (
        Intent::Recommend,
        &[
            "recommend",
            "suggest",
            "what should i",
            "more like",
            "similar artists",
        ],
    ),
    (
        Intent::Discuss,
        &[
            "what do you think",
            "opinion",
            "discuss",
            "let's talk",
            "thoughts on",
        ],
    ),
    (
        Intent::DeepDive,
        &[
            "obsessed",
            "deep dive",
            "deep-dive",
            "everything about",
            "in depth",
            "in-depth",
            "history of",
        ],
    ),
    (
        Intent::Personal,
        &[
            "i love",
            "i like",
            "my favorite",
            "my favourite",
            "reminds me",
            "i grew up",
        ],
    ),
];

/// Classify free text into a single [`Intent`].
///
/// Returns [`Intent::General`] when no keyword matches.
pub fn classify_intent(text: &str) -> Intent {
    let lowered = text.to_lowercase();
    INTENT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(intent, _)| *intent)
        .unwrap_or(Intent::General)
}
