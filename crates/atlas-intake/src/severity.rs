use std::fmt;

use serde::{Deserialize, Serialize};

/// Display severity inferred from a log line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Markers that promote a log line to one severity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityRule {
    pub severity: Severity,
    pub markers: Vec<String>,
}

impl SeverityRule {
    pub fn new<I, S>(severity: Severity, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            severity,
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.markers
            .iter()
            .any(|marker| !marker.is_empty() && lowered.contains(&marker.to_lowercase()))
    }
}

/// Ordered marker table; the first rule with a matching marker wins and
/// anything unmatched is `Info`.
///
/// Backend wording drifts, so the table is configuration rather than code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeverityRules {
    rules: Vec<SeverityRule>,
}

impl SeverityRules {
    pub fn new(rules: Vec<SeverityRule>) -> Self {
        Self { rules }
    }

    /// Case-insensitive substring sniffing over the rule table.
    pub fn classify(&self, message: &str) -> Severity {
        let lowered = message.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.severity)
            .unwrap_or_default()
    }

    pub fn rules(&self) -> &[SeverityRule] {
        &self.rules
    }
}

impl Default for SeverityRules {
    fn default() -> Self {
        Self::new(vec![
            SeverityRule::new(Severity::Error, ["error", "❌", "✗", "✖"]),
            SeverityRule::new(Severity::Success, ["✅", "✓", "✔", "complete"]),
            SeverityRule::new(Severity::Warning, ["🟡", "⚠", "warning"]),
        ])
    }
}
