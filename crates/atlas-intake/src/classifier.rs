use tracing::{debug, warn};

use crate::event::StreamEvent;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";
const PREVIEW_CHARS: usize = 120;

/// Events recovered from one framed block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Classified {
    pub events: Vec<StreamEvent>,
    /// `data:` payloads that were dropped because they did not parse.
    pub malformed: usize,
}

/// Classifies every `data:` line of a framed block.
///
/// Each line is its own candidate payload; multi-line payloads are not joined.
/// A bad payload is dropped with a diagnostic and the next line is still read.
pub fn classify_block(block: &str) -> Classified {
    let mut classified = Classified::default();
    for raw_line in block.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
            continue;
        };
        let payload = rest.trim();
        if payload.is_empty() || payload == DONE_SENTINEL {
            continue;
        }
        match parse_payload(payload) {
            Ok(Some(event)) => classified.events.push(event),
            Ok(None) => {}
            Err(reason) => {
                warn!(%reason, payload = %preview(payload), "dropping malformed stream payload");
                classified.malformed += 1;
            }
        }
    }
    classified
}

/// Maps one JSON payload to an event.
///
/// `Ok(None)` means the payload was well-formed but carries a type this
/// client does not handle.
pub fn parse_payload(payload: &str) -> Result<Option<StreamEvent>, String> {
    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|e| format!("invalid JSON: {e}"))?;
    let Some(event_type) = value
        .get("type")
        .and_then(|v| v.as_str())
        .map(ToOwned::to_owned)
    else {
        debug!("ignoring payload without a type discriminator");
        return Ok(None);
    };
    match event_type.as_str() {
        "log" => value
            .get("content")
            .and_then(|v| v.as_str())
            .map(|content| Some(StreamEvent::log(content)))
            .ok_or_else(|| "log event without string content".to_string()),
        "result" => match value {
            serde_json::Value::Object(mut map) => map
                .remove("data")
                .map(|payload| Some(StreamEvent::result(payload)))
                .ok_or_else(|| "result event without data".to_string()),
            _ => Ok(None),
        },
        "complete" | "close" => Ok(Some(StreamEvent::Complete)),
        other => {
            debug!(event_type = other, "ignoring unrecognized event type");
            Ok(None)
        }
    }
}

fn preview(payload: &str) -> String {
    if payload.chars().count() <= PREVIEW_CHARS {
        return payload.to_string();
    }
    let mut out: String = payload.chars().take(PREVIEW_CHARS).collect();
    out.push('…');
    out
}
