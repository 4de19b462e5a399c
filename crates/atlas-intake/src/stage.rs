use std::fmt;

use serde::{Deserialize, Serialize};

/// Phase of the backend validation pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageId {
    Npi,
    Address,
    Web,
    Qa,
    Synthesis,
    Scoring,
}

impl StageId {
    pub const ALL: [StageId; 6] = [
        StageId::Npi,
        StageId::Address,
        StageId::Web,
        StageId::Qa,
        StageId::Synthesis,
        StageId::Scoring,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Npi => "npi",
            Self::Address => "address",
            Self::Web => "web",
            Self::Qa => "qa",
            Self::Synthesis => "synthesis",
            Self::Scoring => "scoring",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a stage is displayed and recognized in log text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRule {
    pub stage: StageId,
    pub label: String,
    #[serde(default)]
    pub icon: String,
    /// Lower-case substrings; any one of them names the stage.
    pub keywords: Vec<String>,
}

impl StageRule {
    pub fn new(stage: StageId, label: &str, icon: &str, keywords: &[&str]) -> Self {
        Self {
            stage,
            label: label.to_string(),
            icon: icon.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Ordered keyword table used to infer the active stage from log lines.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageTable {
    rules: Vec<StageRule>,
}

impl StageTable {
    pub fn new(rules: Vec<StageRule>) -> Self {
        Self { rules }
    }

    /// First rule (in table order) with a keyword contained in `text`.
    pub fn detect(&self, text: &str) -> Option<&StageRule> {
        let lowered = text.to_lowercase();
        self.rules.iter().find(|rule| {
            rule.keywords
                .iter()
                .any(|kw| !kw.is_empty() && lowered.contains(&kw.to_lowercase()))
        })
    }

    pub fn rule(&self, stage: StageId) -> Option<&StageRule> {
        self.rules.iter().find(|rule| rule.stage == stage)
    }

    pub fn label(&self, stage: StageId) -> &str {
        self.rule(stage)
            .map(|rule| rule.label.as_str())
            .unwrap_or_else(|| stage.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageRule> {
        self.rules.iter()
    }
}

impl Default for StageTable {
    fn default() -> Self {
        Self::new(vec![
            StageRule::new(StageId::Npi, "NPI Registry", "🪪", &["npi"]),
            StageRule::new(StageId::Address, "Address Validation", "📍", &["address"]),
            StageRule::new(StageId::Web, "Web Enrichment", "🌐", &["web", "enrich"]),
            StageRule::new(StageId::Qa, "Quality Assurance", "🔍", &["qa", "quality"]),
            StageRule::new(
                StageId::Synthesis,
                "Profile Synthesis",
                "🧬",
                &["synthes", "golden record"],
            ),
            StageRule::new(
                StageId::Scoring,
                "Confidence Scoring",
                "📊",
                &["score", "confidence"],
            ),
        ])
    }
}
