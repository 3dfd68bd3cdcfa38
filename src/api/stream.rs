use serde::Deserialize;

pub const RECORD_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded generation record. Either field may be absent; a record
/// carrying neither is valid noise.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamRecord {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Incremental decoder for the line-framed generation protocol.
///
/// The transport may split one `data: <payload>\n` frame across chunks or
/// pack several frames into one chunk; the undecoded tail is carried
/// between `process` calls. One decoder serves exactly one stream.
#[derive(Default)]
pub struct FrameDecoder {
    buffer: String,
    finished: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw transport chunk; returns the payloads of every frame it
    /// completed. Lines without the record prefix (keep-alives, comments)
    /// are skipped. The `[DONE]` sentinel ends the stream permanently.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }

        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut payloads = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buffer[start..].find('\n') {
            let line_end = start + offset;
            let line = self.buffer[start..line_end].trim_end_matches('\r');

            if let Some(payload) = line.strip_prefix(RECORD_PREFIX) {
                if payload == DONE_SENTINEL {
                    self.finished = true;
                    self.buffer.clear();
                    return payloads;
                }
                payloads.push(payload.to_string());
            }

            start = line_end + 1;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        payloads
    }

    /// True once the terminal sentinel was seen; later chunks are ignored.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
