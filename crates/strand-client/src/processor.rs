//! Operation processing and channel separation
//!
//! Interprets decoded patch operations in strict arrival order, routing
//! the appended answer text through the reasoning and tool-directive
//! extractors so the visible answer, background reasoning, and embedded
//! tool calls stay separated without corrupting the stream. The wire
//! carries no sequence numbers; applying operations out of order is a
//! correctness bug, not a recoverable condition.

use strand_wire::ops::Operation;

use crate::reasoning::ReasoningExtractor;
use crate::tool_call::{ToolCallDirective, ToolCallExtractor};

/// What a batch of operations contributed to each channel.
#[derive(Debug, Default)]
pub struct Applied {
    /// Delta for the visible answer
    pub visible: String,
    /// Delta for the reasoning buffer
    pub reasoning: String,
    /// Tool-call directives completed by this batch
    pub directives: Vec<ToolCallDirective>,
}

impl Applied {
    /// Whether this batch changed anything observable
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty() && self.reasoning.is_empty() && self.directives.is_empty()
    }
}

/// Per-stream operation interpreter; created fresh for each turn.
pub struct OperationProcessor {
    answer_path: String,
    reasoning: ReasoningExtractor,
    tools: ToolCallExtractor,
}

impl OperationProcessor {
    pub fn new(answer_path: impl Into<String>) -> Self {
        Self {
            answer_path: answer_path.into(),
            reasoning: ReasoningExtractor::new(),
            tools: ToolCallExtractor::new(),
        }
    }

    /// Apply one batch of operations, in the order given.
    pub fn apply(&mut self, ops: &[Operation]) -> Applied {
        let mut out = Applied::default();
        for op in ops {
            if let Some(text) = op.answer_text(&self.answer_path) {
                self.route(text, &mut out);
            }
        }
        out
    }

    /// The stream ended; flush anything the extractors were holding.
    pub fn finish(&mut self) -> Applied {
        let mut out = Applied::default();
        let separated = self.reasoning.flush();
        out.reasoning.push_str(&separated.reasoning);
        if !separated.visible.is_empty() {
            let scan = self.tools.push(&separated.visible);
            out.visible.push_str(&scan.visible);
            out.directives.extend(scan.directives);
        }
        let scan = self.tools.flush();
        out.visible.push_str(&scan.visible);
        out.directives.extend(scan.directives);
        out
    }

    fn route(&mut self, text: &str, out: &mut Applied) {
        let separated = self.reasoning.push(text);
        out.reasoning.push_str(&separated.reasoning);
        if !separated.visible.is_empty() {
            let scan = self.tools.push(&separated.visible);
            out.visible.push_str(&scan.visible);
            out.directives.extend(scan.directives);
        }
    }
}
