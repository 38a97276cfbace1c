//! Output accumulators for tracked processes.
//!
//! [`SessionBuffer`] keeps every byte of a session's interleaved output and a
//! read cursor for incremental reads. [`LineBuffer`] keeps a sliding window of
//! the most recent lines of one stream.

use std::collections::VecDeque;

/// Append-only text accumulator with at-most-once cursor reads
#[derive(Debug, Default, Clone)]
pub struct SessionBuffer {
    text: String,
    read_cursor: usize,
}

impl SessionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_str(&mut self, chunk: &str) {
        self.text.push_str(chunk);
    }

    /// Everything after the read cursor; advances the cursor to the end
    pub fn read_new(&mut self) -> String {
        let unread = self.text[self.read_cursor..].to_string();
        self.read_cursor = self.text.len();
        unread
    }

    pub fn read_cursor(&self) -> usize {
        self.read_cursor
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Fixed-capacity line window that drops the oldest lines on overflow
#[derive(Debug, Clone)]
pub struct LineBuffer {
    lines: VecDeque<String>,
    limit: usize,
}

impl LineBuffer {
    /// A zero limit is raised to one so the newest line is always kept
    pub fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn extend<I: IntoIterator<Item = String>>(&mut self, lines: I) {
        for line in lines {
            self.lines.push_back(line);
        }
        while self.lines.len() > self.limit {
            self.lines.pop_front();
        }
    }

    /// The last `count` lines in original order
    pub fn tail(&self, count: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(count);
        self.lines.iter().skip(skip).cloned().collect()
    }

    /// The first `count` lines in original order
    pub fn head(&self, count: usize) -> Vec<String> {
        self.lines.iter().take(count).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Turns arbitrary text chunks into complete lines, holding back the
/// unterminated tail until more text or end of stream arrives
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: String,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines completed by `chunk`, without their terminators
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);
        let Some(last_newline) = self.pending.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        complete
            .lines()
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect()
    }

    /// The unterminated tail, if any, at end of stream
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(line.strip_suffix('\r').map(str::to_string).unwrap_or(line))
    }
}
