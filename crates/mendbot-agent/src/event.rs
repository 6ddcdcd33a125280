use serde::Deserialize;
use serde_json::Value;

/// A single NDJSON message emitted by the claude CLI
/// (`--output-format stream-json`).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// First message on stream: session initialisation.
    System(SystemEvent),

    /// An assistant turn (text or tool calls).
    Assistant(AssistantEvent),

    /// Final result message, emitted once at the very end.
    Result(ResultEvent),

    /// Any message type not handled above (user turns, tool results, ...).
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemEvent {
    pub subtype: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantEvent {
    pub message: Option<AssistantMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantMessage {
    pub content: Option<Vec<ContentBlock>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },

    ToolUse { id: String, name: String, input: Value },

    #[serde(other)]
    Unknown,
}

/// Final result event, emitted once when the agent finishes.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultEvent {
    pub subtype: Option<String>,
    /// Textual output (may be empty if the last turn was a tool call).
    pub result: Option<String>,
    pub session_id: Option<String>,
    pub is_error: Option<bool>,
}

/// What one full stream boils down to for the router.
#[derive(Debug, Clone, Default)]
pub struct StreamSummary {
    pub text: String,
    pub session_id: Option<String>,
    pub is_error: bool,
}

/// Parse a full NDJSON stream into its final text, session id, and error
/// flag. Unparseable lines are skipped; if the result event carried no
/// text, collected assistant text stands in.
pub fn parse_stream(data: &str) -> StreamSummary {
    let mut summary = StreamSummary::default();
    let mut assistant_text = String::new();

    for line in data.lines() {
        if line.is_empty() {
            continue;
        }
        let event: AgentEvent = match serde_json::from_str(line) {
            Ok(e) => e,
            Err(_) => continue,
        };
        match event {
            AgentEvent::System(e) => {
                if let Some(sid) = e.session_id {
                    summary.session_id = Some(sid);
                }
            }
            AgentEvent::Assistant(e) => {
                let blocks = e.message.and_then(|m| m.content).unwrap_or_default();
                for block in blocks {
                    if let ContentBlock::Text { text } = block {
                        if !assistant_text.is_empty() {
                            assistant_text.push('\n');
                        }
                        assistant_text.push_str(&text);
                    }
                }
            }
            AgentEvent::Result(e) => {
                if let Some(sid) = e.session_id {
                    summary.session_id = Some(sid);
                }
                if let Some(text) = e.result {
                    summary.text = text;
                }
                summary.is_error = e.is_error.unwrap_or(false)
                    || e.subtype.as_deref().map(|s| s.starts_with("error")).unwrap_or(false);
            }
            AgentEvent::Unknown => {}
        }
    }

    if summary.text.is_empty() && !assistant_text.is_empty() {
        summary.text = assistant_text;
    }
    summary
}

/// Does this output carry a provider usage/quota exhaustion signature?
///
/// Matched loosely on purpose: the exact phrasing varies by CLI version
/// ("Claude AI usage limit reached|<ts>", "rate limit exceeded", plain
/// 429s from codex).
pub fn looks_like_usage_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("usage limit")
        || lower.contains("rate limit")
        || lower.contains("quota exceeded")
        || lower.contains("429")
}
