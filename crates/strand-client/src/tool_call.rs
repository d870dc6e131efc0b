//! Tool-call directive extraction
//!
//! The model embeds tool invocations in the streamed answer as
//! sentinel-wrapped JSON blocks:
//!
//! ```text
//! <tool_call>{"tool_name": "read_file", "arguments": {"path": "x"}}</tool_call>
//! ```
//!
//! Because content arrives incrementally, a directive is often
//! syntactically incomplete mid-stream. Parsing is attempted after each
//! append and defers (`None`) until the JSON braces balance; the raw
//! directive text never reaches the visible answer. Two spellings are
//! accepted for the name field (`tool_name`, `name`) and for the
//! arguments field (`arguments`, `parameters`); response shapes drift
//! across model families.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const DIRECTIVE_OPEN: &str = "<tool_call>";
const DIRECTIVE_CLOSE: &str = "</tool_call>";

/// A fully parsed tool invocation, handed to the tool-execution runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDirective {
    pub name: String,
    pub arguments: Value,
}

/// Result of scanning one chunk of streamed text.
#[derive(Debug, Default)]
pub struct ToolScan {
    /// Text that remains visible
    pub visible: String,
    /// Directives completed by this chunk
    pub directives: Vec<ToolCallDirective>,
}

/// Streaming extractor; one per active stream.
#[derive(Debug, Default)]
pub struct ToolCallExtractor {
    in_directive: bool,
    /// Body accumulated for the directive being read
    body: String,
    /// The current directive already parsed and handed out
    parsed: bool,
    /// Possible partial sentinel held back from the previous chunk
    carry: String,
}

impl ToolCallExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a directive block is currently open
    pub fn in_directive(&self) -> bool {
        self.in_directive
    }

    /// Process the next chunk of visible text.
    pub fn push(&mut self, chunk: &str) -> ToolScan {
        let mut out = ToolScan::default();
        let text = if self.carry.is_empty() {
            chunk.to_string()
        } else {
            let mut combined = std::mem::take(&mut self.carry);
            combined.push_str(chunk);
            combined
        };
        let mut rest = text.as_str();

        while !rest.is_empty() {
            if !self.in_directive {
                if let Some(at) = rest.find(DIRECTIVE_OPEN) {
                    out.visible.push_str(&rest[..at]);
                    self.in_directive = true;
                    self.parsed = false;
                    self.body.clear();
                    rest = &rest[at + DIRECTIVE_OPEN.len()..];
                } else if let Some(cut) = partial_suffix_at(rest, DIRECTIVE_OPEN) {
                    out.visible.push_str(&rest[..cut]);
                    self.carry = rest[cut..].to_string();
                    break;
                } else {
                    out.visible.push_str(rest);
                    break;
                }
            } else if let Some(at) = rest.find(DIRECTIVE_CLOSE) {
                self.body.push_str(&rest[..at]);
                self.settle(&mut out);
                if !self.parsed && !self.body.trim().is_empty() {
                    tracing::warn!("Dropping unparseable tool directive: {}", self.body.trim());
                }
                self.in_directive = false;
                self.body.clear();
                rest = &rest[at + DIRECTIVE_CLOSE.len()..];
            } else if let Some(cut) = partial_suffix_at(rest, DIRECTIVE_CLOSE) {
                self.body.push_str(&rest[..cut]);
                self.carry = rest[cut..].to_string();
                self.settle(&mut out);
                break;
            } else {
                self.body.push_str(rest);
                self.settle(&mut out);
                break;
            }
        }

        out
    }

    /// The stream ended. A held-back partial sentinel outside a
    /// directive turns out to be literal text; an unterminated directive
    /// body is dropped (warn-logged if it never parsed).
    pub fn flush(&mut self) -> ToolScan {
        let mut out = ToolScan::default();
        let carry = std::mem::take(&mut self.carry);
        if !self.in_directive {
            out.visible.push_str(&carry);
        } else {
            self.body.push_str(&carry);
            self.settle(&mut out);
            if !self.parsed && !self.body.trim().is_empty() {
                tracing::warn!(
                    "Stream ended inside an unterminated tool directive: {}",
                    self.body.trim()
                );
            }
            self.in_directive = false;
            self.body.clear();
        }
        out
    }

    /// Re-attempt the deferred parse with whatever body has accumulated.
    fn settle(&mut self, out: &mut ToolScan) {
        if self.parsed {
            return;
        }
        if let Some(directive) = parse_directive(&self.body) {
            self.parsed = true;
            out.directives.push(directive);
        }
    }
}

/// Attempt to parse a directive body.
///
/// Returns `None` (defer) while the JSON braces are unbalanced, i.e.
/// the block is still streaming in. Once balanced, the call is parsed and
/// its name/arguments extracted under either accepted spelling.
pub fn parse_directive(body: &str) -> Option<ToolCallDirective> {
    let start = body.find('{')?;
    let end = balanced_end(&body[start..])?;
    let json: Value = match serde_json::from_str(&body[start..start + end]) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!("Balanced but invalid tool directive JSON: {}", e);
            return None;
        }
    };

    let name = json
        .get("tool_name")
        .or_else(|| json.get("name"))?
        .as_str()?
        .to_string();
    let arguments = json
        .get("arguments")
        .or_else(|| json.get("parameters"))
        .cloned()
        .unwrap_or(Value::Null);

    Some(ToolCallDirective { name, arguments })
}

/// Byte length of the balanced JSON object starting at the first byte of
/// `text` (which must be `{`), or `None` if the braces have not balanced
/// yet. String literals and escapes are respected.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (at, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(at + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Offset of the longest proper prefix of `tag` that ends the text.
fn partial_suffix_at(text: &str, tag: &str) -> Option<usize> {
    for take in (1..tag.len()).rev() {
        if text.ends_with(&tag[..take]) {
            return Some(text.len() - take);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defers_on_unbalanced_braces() {
        assert!(parse_directive(r#"{"tool_name": "grep", "arguments": {"pat"#).is_none());
        assert!(parse_directive(r#"{"name": "grep""#).is_none());
    }

    #[test]
    fn test_parse_completes_once_balanced() {
        let call =
            parse_directive(r#"{"tool_name": "grep", "arguments": {"pattern": "fn main"}}"#)
                .unwrap();
        assert_eq!(call.name, "grep");
        assert_eq!(call.arguments["pattern"], "fn main");
    }

    #[test]
    fn test_parse_accepts_both_name_spellings() {
        let primary = parse_directive(r#"{"tool_name": "ls", "arguments": {}}"#).unwrap();
        assert_eq!(primary.name, "ls");
        let secondary = parse_directive(r#"{"name": "ls", "arguments": {}}"#).unwrap();
        assert_eq!(secondary.name, "ls");
    }

    #[test]
    fn test_parse_accepts_both_argument_spellings() {
        let call = parse_directive(r#"{"name": "run", "parameters": {"cmd": "ls"}}"#).unwrap();
        assert_eq!(call.arguments["cmd"], "ls");
    }

    #[test]
    fn test_parse_braces_inside_strings_ignored() {
        let call =
            parse_directive(r#"{"name": "write", "arguments": {"text": "fn f() { }"}}"#).unwrap();
        assert_eq!(call.arguments["text"], "fn f() { }");
        // An unbalanced-looking brace inside a string must not close the
        // object early.
        assert!(parse_directive(r#"{"name": "write", "arguments": {"text": "}""#).is_none());
    }

    #[test]
    fn test_parse_missing_name_is_none() {
        assert!(parse_directive(r#"{"arguments": {}}"#).is_none());
    }

    #[test]
    fn test_extractor_strips_directive_from_visible() {
        let mut ex = ToolCallExtractor::new();
        let scan = ex.push(
            "Let me check.<tool_call>{\"tool_name\":\"read\",\"arguments\":{\"path\":\"a.rs\"}}</tool_call>Done.",
        );
        assert_eq!(scan.visible, "Let me check.Done.");
        assert_eq!(scan.directives.len(), 1);
        assert_eq!(scan.directives[0].name, "read");
    }

    #[test]
    fn test_extractor_defers_across_chunks() {
        let mut ex = ToolCallExtractor::new();
        let first = ex.push("<tool_call>{\"name\":\"edit\",\"arguments\":{\"a\":");
        assert!(first.directives.is_empty(), "unbalanced braces must defer");
        assert!(ex.in_directive());

        let second = ex.push("1}}");
        assert_eq!(second.directives.len(), 1, "parse succeeds once balanced");
        assert_eq!(second.directives[0].name, "edit");

        let third = ex.push("</tool_call>after");
        assert!(third.directives.is_empty(), "close sentinel must not re-emit");
        assert_eq!(third.visible, "after");
        assert!(!ex.in_directive());
    }

    #[test]
    fn test_extractor_sentinel_split_across_chunks() {
        let mut ex = ToolCallExtractor::new();
        let first = ex.push("hi <tool_");
        assert_eq!(first.visible, "hi ");
        let second = ex.push("call>{\"name\":\"x\",\"arguments\":{}}</tool_");
        assert!(second.visible.is_empty());
        assert_eq!(second.directives.len(), 1);
        let third = ex.push("call> bye");
        assert_eq!(third.visible, " bye");
    }

    #[test]
    fn test_extractor_false_partial_sentinel() {
        let mut ex = ToolCallExtractor::new();
        let first = ex.push("a <tool");
        assert_eq!(first.visible, "a ");
        let second = ex.push("box> b");
        assert_eq!(second.visible, "<toolbox> b");
        assert!(second.directives.is_empty());
    }

    #[test]
    fn test_extractor_two_directives() {
        let mut ex = ToolCallExtractor::new();
        let scan = ex.push(
            "<tool_call>{\"name\":\"a\",\"arguments\":{}}</tool_call>mid<tool_call>{\"name\":\"b\",\"arguments\":{}}</tool_call>",
        );
        assert_eq!(scan.visible, "mid");
        let names: Vec<&str> = scan.directives.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
