//! Stream / tool-call detector (§4.8): a small state machine over streaming
//! chunks that separates display text from tool-call descriptors, whether
//! the provider sends tool calls on its structured delta channel or as a
//! textual fenced-JSON convention inside the content stream.
//!
//! Structured and textual conventions are mutually exclusive within a turn:
//! the first structured `tool_calls` delta locks the detector onto the
//! structured path and textual-fence scanning is suspended for the rest of
//! that turn (see DESIGN.md's precedence decision).

use std::collections::HashMap;

use crate::types::{ContentBlock, OpenAIChunk, ToolUseBlock};
use crate::Result;

const OPEN_FENCE: &str = "```json";
const CLOSE_FENCE: &str = "```";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    AccumulatingText,
    ParsingToolCall,
}

#[derive(Debug, Default)]
struct PartialStructuredCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Output of feeding one chunk (or a cancellation) through the [`Detector`].
#[derive(Debug, Clone)]
pub enum DetectorEvent {
    /// Text to forward to the display sink, in chunk-arrival order.
    Display(String),
    /// A complete tool call, ready to dispatch.
    ToolCall(ToolUseBlock),
    /// The turn ended; `finish_reason` is the provider's value, or a
    /// synthetic `"cancelled"` on consumer-initiated cancellation.
    EndOfTurn { finish_reason: String },
}

/// Drives the Idle → AccumulatingText → ParsingToolCall → Idle state machine
/// described in §4.8 over a sequence of [`OpenAIChunk`]s for one turn.
pub struct Detector {
    state: State,
    /// Text not yet committed to the display sink — held back only long
    /// enough to rule out a fence marker spanning a chunk boundary.
    pending: String,
    /// Buffered content once a `OPEN_FENCE` marker has been seen.
    fence_body: String,
    structured_calls: HashMap<u32, PartialStructuredCall>,
    structured_locked: bool,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            pending: String::new(),
            fence_body: String::new(),
            structured_calls: HashMap::new(),
            structured_locked: false,
        }
    }

    /// Feeds one chunk through the state machine, returning the events it
    /// produced. A chunk can produce any number of `Display`/`ToolCall`
    /// events plus, when a choice carries `finish_reason`, one `EndOfTurn`.
    pub fn process_chunk(&mut self, chunk: OpenAIChunk) -> Result<Vec<DetectorEvent>> {
        let mut events = Vec::new();

        for choice in chunk.choices {
            if let Some(tool_calls) = choice.delta.tool_calls {
                self.structured_locked = true;
                self.state = State::ParsingToolCall;
                for delta in tool_calls {
                    let entry = self.structured_calls.entry(delta.index).or_default();
                    if let Some(id) = delta.id {
                        entry.id = Some(id);
                    }
                    if let Some(function) = delta.function {
                        if let Some(name) = function.name {
                            entry.name = Some(name);
                        }
                        if let Some(args) = function.arguments {
                            entry.arguments.push_str(&args);
                        }
                    }
                }
            }

            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    events.extend(self.feed_text(&content)?);
                }
            }

            if let Some(finish_reason) = choice.finish_reason {
                events.extend(self.finish(&finish_reason)?);
            }
        }

        Ok(events)
    }

    /// Consumer-initiated cancellation mid-stream: any held-back display
    /// text is flushed, and a synthetic `cancelled` end-of-turn is emitted.
    pub fn cancel(&mut self) -> Vec<DetectorEvent> {
        let mut events = Vec::new();
        if !self.pending.is_empty() {
            events.push(DetectorEvent::Display(std::mem::take(&mut self.pending)));
        }
        self.state = State::Idle;
        events.push(DetectorEvent::EndOfTurn { finish_reason: "cancelled".to_string() });
        events
    }

    fn feed_text(&mut self, delta: &str) -> Result<Vec<DetectorEvent>> {
        let mut events = Vec::new();

        if self.structured_locked {
            events.push(DetectorEvent::Display(delta.to_string()));
            return Ok(events);
        }

        match self.state {
            State::Idle | State::AccumulatingText => {
                self.state = State::AccumulatingText;
                self.pending.push_str(delta);

                if let Some(idx) = self.pending.find(OPEN_FENCE) {
                    let before = self.pending[..idx].to_string();
                    if !before.is_empty() {
                        events.push(DetectorEvent::Display(before));
                    }
                    let after_marker = idx + OPEN_FENCE.len();
                    self.fence_body = self.pending[after_marker..].trim_start_matches('\n').to_string();
                    self.pending.clear();
                    self.state = State::ParsingToolCall;
                    events.extend(self.try_close_fence());
                } else {
                    // Hold back only a tail that could still become the start
                    // of the fence marker if it's split across a chunk boundary.
                    let hold_back = partial_fence_overlap(&self.pending);
                    let split_at = self.pending.len() - hold_back;
                    if split_at > 0 {
                        let flush: String = self.pending.drain(..split_at).collect();
                        events.push(DetectorEvent::Display(flush));
                    }
                }
            }
            State::ParsingToolCall => {
                self.fence_body.push_str(delta);
                events.extend(self.try_close_fence());
            }
        }

        Ok(events)
    }

    fn try_close_fence(&mut self) -> Vec<DetectorEvent> {
        let mut events = Vec::new();
        let Some(idx) = self.fence_body.find(CLOSE_FENCE) else {
            return events;
        };

        let body = self.fence_body[..idx].to_string();
        self.fence_body.clear();

        match parse_textual_tool_call(&body) {
            Some(tool_use) => {
                events.push(DetectorEvent::ToolCall(tool_use));
                self.state = State::Idle;
            }
            None => {
                // Malformed fence contents: release what was buffered so the
                // attempt isn't silently lost.
                events.push(DetectorEvent::Display(format!("{OPEN_FENCE}{body}{CLOSE_FENCE}")));
                self.state = State::AccumulatingText;
            }
        }
        events
    }

    fn finish(&mut self, finish_reason: &str) -> Result<Vec<DetectorEvent>> {
        let mut events = Vec::new();

        if !self.pending.is_empty() {
            events.push(DetectorEvent::Display(std::mem::take(&mut self.pending)));
        }

        if finish_reason == "tool_calls" {
            for (_, partial) in self.structured_calls.drain() {
                if let (Some(id), Some(name)) = (partial.id, partial.name) {
                    let input: serde_json::Value = if partial.arguments.is_empty() {
                        serde_json::json!({})
                    } else {
                        serde_json::from_str(&partial.arguments)?
                    };
                    events.push(DetectorEvent::ToolCall(ToolUseBlock::new(id, name, input)));
                }
            }
        }

        self.structured_locked = false;
        self.state = State::Idle;
        events.push(DetectorEvent::EndOfTurn { finish_reason: finish_reason.to_string() });
        Ok(events)
    }
}

/// Longest suffix of `text` that is also a proper prefix of [`OPEN_FENCE`],
/// i.e. how much of `text`'s tail could still turn into the fence marker
/// once more chunks arrive. Used to avoid displaying text that's actually
/// the start of a fence split across a chunk boundary.
fn partial_fence_overlap(text: &str) -> usize {
    let max = (OPEN_FENCE.len() - 1).min(text.len());
    (1..=max).rev().find(|&len| text.ends_with(&OPEN_FENCE[..len])).unwrap_or(0)
}

fn parse_textual_tool_call(body: &str) -> Option<ToolUseBlock> {
    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    let name = value.get("tool")?.as_str()?.to_string();
    let arguments = value.get("arguments").cloned().unwrap_or_else(|| serde_json::json!({}));
    let id = format!("textual_{}", uuid::Uuid::new_v4());
    Some(ToolUseBlock::new(id, name, arguments))
}

/// Converts the final, accumulated text of a turn into a single
/// [`ContentBlock::Text`], for callers that want one block instead of a
/// stream of `Display` fragments (e.g. non-streaming responses).
pub fn coalesce_text(fragments: &[String]) -> ContentBlock {
    ContentBlock::Text(crate::types::TextBlock::new(fragments.concat()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OpenAIChoice, OpenAIDelta, OpenAIFunctionDelta, OpenAIToolCallDelta};

    fn chunk(content: Option<&str>, tool_calls: Option<Vec<OpenAIToolCallDelta>>, finish: Option<&str>) -> OpenAIChunk {
        OpenAIChunk {
            id: "c".to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 0,
            model: "m".to_string(),
            choices: vec![OpenAIChoice {
                index: 0,
                delta: OpenAIDelta { role: None, content: content.map(String::from), tool_calls },
                finish_reason: finish.map(String::from),
            }],
        }
    }

    #[test]
    fn test_plain_text_is_displayed_immediately() {
        let mut detector = Detector::new();
        let events = detector.process_chunk(chunk(Some("hello"), None, None)).unwrap();
        assert!(matches!(&events[0], DetectorEvent::Display(s) if s == "hello"));
    }

    #[test]
    fn test_structured_tool_call_locks_out_textual_fence() {
        let mut detector = Detector::new();
        let delta = OpenAIToolCallDelta {
            index: 0,
            id: Some("call_1".to_string()),
            call_type: Some("function".to_string()),
            function: Some(OpenAIFunctionDelta { name: Some("read_file".to_string()), arguments: Some("{}".to_string()) }),
        };
        detector.process_chunk(chunk(None, Some(vec![delta]), None)).unwrap();
        let events = detector.process_chunk(chunk(None, None, Some("tool_calls"))).unwrap();
        let tool_call = events.iter().find_map(|e| match e {
            DetectorEvent::ToolCall(t) => Some(t),
            _ => None,
        });
        assert!(tool_call.is_some());
        assert_eq!(tool_call.unwrap().name, "read_file");
    }

    #[test]
    fn test_textual_fence_convention_produces_tool_call() {
        let mut detector = Detector::new();
        let mut all_events = Vec::new();
        all_events.extend(detector.process_chunk(chunk(Some("I'll read it.\n"), None, None)).unwrap());
        all_events.extend(detector.process_chunk(chunk(Some("```json\n"), None, None)).unwrap());
        all_events.extend(
            detector
                .process_chunk(chunk(Some(r#"{"tool":"read_file","arguments":{"path":"README.md"}}"#), None, None))
                .unwrap(),
        );
        all_events.extend(detector.process_chunk(chunk(Some("```"), None, Some("stop"))).unwrap());

        let displayed: String = all_events
            .iter()
            .filter_map(|e| match e {
                DetectorEvent::Display(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(displayed, "I'll read it.\n");

        let tool_call = all_events.iter().find_map(|e| match e {
            DetectorEvent::ToolCall(t) => Some(t),
            _ => None,
        });
        assert_eq!(tool_call.unwrap().name, "read_file");
    }

    #[test]
    fn test_malformed_fence_releases_buffered_text() {
        let mut detector = Detector::new();
        detector.process_chunk(chunk(Some("```json\n"), None, None)).unwrap();
        let events = detector.process_chunk(chunk(Some("not valid json```"), None, Some("stop"))).unwrap();
        let displayed: String = events
            .iter()
            .filter_map(|e| match e {
                DetectorEvent::Display(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert!(displayed.contains("not valid json"));
    }

    #[test]
    fn test_cancel_flushes_pending_and_emits_cancelled() {
        let mut detector = Detector::new();
        // A lone backtick is held back as a possible start of the fence
        // marker rather than displayed immediately.
        detector.process_chunk(chunk(Some("`"), None, None)).unwrap();
        let events = detector.cancel();
        assert!(matches!(&events[0], DetectorEvent::Display(s) if s == "`"));
        assert!(matches!(&events[1], DetectorEvent::EndOfTurn { finish_reason } if finish_reason == "cancelled"));
    }
}
