//! Decoder for the backend's newline-delimited JSON response stream.
//!
//! Each line is classified on its own into a [`Chunk`], and a
//! [`StreamDecoder`] folds chunks into an [`Answer`]. Malformed lines are
//! logged and skipped. The first chunk with `"done": true` ends the stream;
//! anything after it is never read.

use std::fmt;

use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, Deserialize)]
struct ChunkRecord {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: Option<bool>,
}

/// One line of the stream after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Blank,
    Fragment(String),
    /// Final fragment, `done` was true.
    Complete(String),
    Malformed,
}

impl Chunk {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Chunk::Blank;
        }
        match serde_json::from_str::<ChunkRecord>(line) {
            Ok(record) => {
                let text = record.response.unwrap_or_default();
                if record.done.unwrap_or(false) {
                    Chunk::Complete(text)
                } else {
                    Chunk::Fragment(text)
                }
            }
            Err(_) => Chunk::Malformed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Finished,
}

impl Step {
    pub fn is_finished(self) -> bool {
        self == Step::Finished
    }
}

/// The trimmed concatenation of every fragment up to the completion chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Answer {
    text: String,
    complete: bool,
}

impl Answer {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the stream signalled completion, as opposed to just ending.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Default)]
pub struct StreamDecoder {
    accumulated: String,
    finished: bool,
    malformed: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line. Once finished, further lines are ignored.
    pub fn push_line(&mut self, line: &str) -> Step {
        if self.finished {
            return Step::Finished;
        }
        match Chunk::parse(line) {
            Chunk::Blank => {}
            Chunk::Fragment(text) => self.accumulated.push_str(&text),
            Chunk::Complete(text) => {
                self.accumulated.push_str(&text);
                self.finished = true;
                return Step::Finished;
            }
            Chunk::Malformed => {
                self.malformed += 1;
                tracing::warn!("Skipping malformed stream line: {}", line.trim());
            }
        }
        Step::Continue
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn malformed_lines(&self) -> usize {
        self.malformed
    }

    pub fn finish(self) -> Answer {
        Answer {
            text: self.accumulated.trim().to_string(),
            complete: self.finished,
        }
    }
}

/// Decode lines that are already in memory.
pub fn decode<I, S>(lines: I) -> Answer
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut decoder = StreamDecoder::new();
    for line in lines {
        if decoder.push_line(line.as_ref()).is_finished() {
            break;
        }
    }
    decoder.finish()
}

/// Decode from any async line source, e.g. a child process's stdout.
///
/// Reading stops at the completion chunk, so the reader is not drained.
/// Invalid UTF-8 is replaced rather than treated as an I/O failure, the
/// same as the HTTP path; such a line then counts as malformed.
pub async fn decode_reader<R>(mut reader: R) -> std::io::Result<Answer>
where
    R: AsyncBufRead + Unpin,
{
    let mut decoder = StreamDecoder::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(strip_terminator(&buf));
        if decoder.push_line(&line).is_finished() {
            break;
        }
    }
    Ok(decoder.finish())
}

fn strip_terminator(mut line: &[u8]) -> &[u8] {
    if let [rest @ .., b'\n'] = line {
        line = rest;
    }
    if let [rest @ .., b'\r'] = line {
        line = rest;
    }
    line
}

/// Reassembles lines from arbitrarily split byte chunks.
///
/// Bytes are buffered raw so a multi-byte character split across two
/// chunks still decodes correctly.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
    // Prefix of `pending` already known to hold no newline.
    scanned: usize,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every line completed by `bytes`, without the terminator.
    ///
    /// Each byte is scanned once, however many pushes a long line spans.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.pending[from..].iter().position(|&b| b == b'\n') {
            let end = from + offset;
            let line = strip_terminator(&self.pending[start..=end]);
            lines.push(String::from_utf8_lossy(line).into_owned());
            start = end + 1;
            from = start;
        }
        self.pending.drain(..start);
        self.scanned = self.pending.len();
        lines
    }

    /// Trailing text that never got a newline.
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}
