use super::events::{LineStream, OutputEvent};

/// Sequence numbers, byte accounting and snapshot for one execution.
///
/// Owned by the supervisor loop only; both output streams pass through it,
/// so cap checks are serialized.
#[derive(Debug)]
pub struct OutputLog {
    execution_id: String,
    next_seq: u64,
    bytes: u64,
    lines: Vec<String>,
    truncated: bool,
}

impl OutputLog {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            next_seq: 1,
            bytes: 0,
            lines: Vec::new(),
            truncated: false,
        }
    }

    /// Records a child line. `bytes` counts toward the output cap.
    pub fn push(&mut self, stream: LineStream, line: String, bytes: u64) -> OutputEvent {
        self.bytes = self.bytes.saturating_add(bytes);
        self.event(stream, line)
    }

    /// Records an informational line that does not count toward the cap.
    pub fn notice(&mut self, text: impl Into<String>) -> OutputEvent {
        self.event(LineStream::System, text.into())
    }

    /// Marks the log truncated; the returned notice is the last content event.
    pub fn truncate(&mut self, limit: u64) -> OutputEvent {
        self.truncated = true;
        self.notice(format!(
            "[output truncated: exceeded limit of {limit} bytes; terminating process]"
        ))
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// All payloads in sequence order, joined by `\n`.
    pub fn snapshot(&self) -> String {
        self.lines.join("\n")
    }

    fn event(&mut self, stream: LineStream, line: String) -> OutputEvent {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.lines.push(line.clone());
        OutputEvent {
            execution_id: self.execution_id.clone(),
            seq,
            stream,
            line,
        }
    }
}
