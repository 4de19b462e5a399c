/// Application event decoded from one `data:` payload of the validation stream.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Human-readable progress line emitted by the backend pipeline.
    Log { content: String },
    /// One fully validated provider record, passed through untouched.
    Result { payload: serde_json::Value },
    /// End of run. Nothing meaningful follows it.
    Complete,
}

impl StreamEvent {
    pub fn log(content: impl Into<String>) -> Self {
        Self::Log {
            content: content.into(),
        }
    }

    pub fn result(payload: serde_json::Value) -> Self {
        Self::Result { payload }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }
}
