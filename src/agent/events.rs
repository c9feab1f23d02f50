//! Client side of the live dispatch channel: parses the coordinator's SSE
//! stream back into [`DispatchEvent`]s.

use super::client::ClientError;
use crate::dispatch::DispatchEvent;

/// Incremental SSE reader over a streaming HTTP response.
pub struct EventStream {
    response: reqwest::Response,
    buffer: FrameBuffer,
}

impl EventStream {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: FrameBuffer::new(),
        }
    }

    /// Next dispatch event, or None when the coordinator closed the
    /// stream (e.g. the channel was replaced by a reconnect).
    pub async fn next_event(&mut self) -> Result<Option<DispatchEvent>, ClientError> {
        loop {
            if let Some(frame) = self.buffer.next_frame() {
                let Some(data) = frame_data(&frame) else {
                    // Comment or keep-alive frame
                    continue;
                };
                let event = serde_json::from_str(&data).map_err(|e| {
                    ClientError::Protocol(format!("bad dispatch event: {e}"))
                })?;
                return Ok(Some(event));
            }

            match self.response.chunk().await? {
                Some(chunk) => self.buffer.push(&chunk),
                None => return Ok(None),
            }
        }
    }
}

/// Accumulates raw network chunks and yields complete SSE frames.
///
/// Frames are split on the byte level: the blank-line delimiter is ASCII,
/// so a multi-byte character arriving split across two chunks is only
/// decoded once the whole frame is buffered and survives intact.
struct FrameBuffer {
    bytes: Vec<u8>,
}

impl FrameBuffer {
    fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    fn next_frame(&mut self) -> Option<String> {
        let end = self.bytes.windows(2).position(|w| w == b"\n\n")?;
        let frame: Vec<u8> = self.bytes.drain(..end + 2).collect();
        Some(String::from_utf8_lossy(&frame).into_owned())
    }
}

/// Extract the data payload from one SSE frame. Multiple `data:` lines
/// are joined with newlines per the SSE spec; comment and field lines
/// other than `data` are ignored.
fn frame_data(frame: &str) -> Option<String> {
    let mut data_lines = Vec::new();

    for line in frame.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}
