//! Reasoning span extraction
//!
//! Streamed answer text interleaves model deliberation inside sentinel
//! tags. Two spellings are recognized because different model families
//! emit different ones; both are live formats, not legacy. Inner text is
//! diverted to the reasoning channel and stripped from the visible
//! answer. Tags can straddle chunk boundaries, so a potential partial
//! tag at the end of a chunk is held back rather than emitted.

/// Recognized tag pairs, primary spelling first.
const TAG_PAIRS: [(&str, &str); 2] = [("<think>", "</think>"), ("<thinking>", "</thinking>")];

/// A chunk of answer text split into its two channels.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Separated {
    pub visible: String,
    pub reasoning: String,
}

/// Streaming extractor; one per active stream.
#[derive(Debug, Default)]
pub struct ReasoningExtractor {
    /// Index into [`TAG_PAIRS`] while inside a span
    active: Option<usize>,
    /// Possible partial tag held back from the previous chunk
    carry: String,
}

impl ReasoningExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the extractor is currently inside a reasoning span
    pub fn in_span(&self) -> bool {
        self.active.is_some()
    }

    /// Process the next chunk of streamed text.
    pub fn push(&mut self, chunk: &str) -> Separated {
        let mut out = Separated::default();
        let text = if self.carry.is_empty() {
            chunk.to_string()
        } else {
            let mut combined = std::mem::take(&mut self.carry);
            combined.push_str(chunk);
            combined
        };
        let mut rest = text.as_str();

        while !rest.is_empty() {
            match self.active {
                None => {
                    if let Some((pair, at)) = find_open_tag(rest) {
                        out.visible.push_str(&rest[..at]);
                        self.active = Some(pair);
                        rest = &rest[at + TAG_PAIRS[pair].0.len()..];
                    } else if let Some(cut) = partial_open_at(rest) {
                        out.visible.push_str(&rest[..cut]);
                        self.carry = rest[cut..].to_string();
                        break;
                    } else {
                        out.visible.push_str(rest);
                        break;
                    }
                }
                Some(pair) => {
                    let close = TAG_PAIRS[pair].1;
                    if let Some(at) = rest.find(close) {
                        out.reasoning.push_str(&rest[..at]);
                        self.active = None;
                        rest = &rest[at + close.len()..];
                    } else if let Some(cut) = partial_suffix_at(rest, close) {
                        out.reasoning.push_str(&rest[..cut]);
                        self.carry = rest[cut..].to_string();
                        break;
                    } else {
                        out.reasoning.push_str(rest);
                        break;
                    }
                }
            }
        }

        out
    }

    /// The stream ended: whatever was held back is literal text for the
    /// channel we are currently in.
    pub fn flush(&mut self) -> Separated {
        let mut out = Separated::default();
        let carry = std::mem::take(&mut self.carry);
        if carry.is_empty() {
            return out;
        }
        match self.active {
            None => out.visible.push_str(&carry),
            Some(_) => out.reasoning.push_str(&carry),
        }
        out
    }
}

/// Earliest opening tag in the text: (pair index, byte offset).
fn find_open_tag(text: &str) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize)> = None;
    for (pair, (open, _)) in TAG_PAIRS.iter().enumerate() {
        if let Some(at) = text.find(open) {
            if best.map_or(true, |(_, b)| at < b) {
                best = Some((pair, at));
            }
        }
    }
    best
}

/// Offset where a partial opening tag begins at the end of the text, for
/// any recognized spelling.
fn partial_open_at(text: &str) -> Option<usize> {
    TAG_PAIRS
        .iter()
        .filter_map(|(open, _)| partial_suffix_at(text, open))
        .min()
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
