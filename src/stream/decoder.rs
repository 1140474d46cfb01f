//! Message decoder: reconstructs complete event lines from an arbitrarily
//! fragmented byte stream.
//!
//! The transport delivers bytes in arrival order but message boundaries are
//! not aligned to delivery boundaries — a fragment can end anywhere,
//! including inside a multi-byte UTF-8 character. The decoder therefore
//! carries raw bytes and converts to text only once a line is complete,
//! scanning the carry for marker-prefixed lines and accepting a candidate
//! payload only once its braces balance — a check much cheaper than JSON
//! parsing that rejects the common case of a line cut mid-payload by a
//! fragment boundary. Malformed complete lines are dropped with a
//! diagnostic; they never abort the stream.

use crate::defaults::DECODER_MAX_PENDING_BYTES;
use crate::stream::message::{StreamMessage, WireEvent};

pub struct MessageDecoder {
    marker: Vec<u8>,
    carry: Vec<u8>,
}

impl MessageDecoder {
    pub fn new(marker: &str) -> Self {
        Self {
            marker: marker.as_bytes().to_vec(),
            carry: Vec::new(),
        }
    }

    /// Feeds one raw fragment and returns every message completed by it.
    ///
    /// Structural failures (unbalanced braces, unparsable JSON, a zero
    /// sequence id) drop the line with a diagnostic. Neither stops decoding.
    pub fn feed(&mut self, fragment: &[u8]) -> Vec<StreamMessage> {
        self.carry.extend_from_slice(fragment);

        let mut messages = Vec::new();
        loop {
            let Some(start) = find_subslice(&self.carry, &self.marker) else {
                // No marker anywhere: keep only a potential marker prefix at
                // the tail so keep-alive noise cannot grow the buffer.
                self.trim_to_possible_marker();
                break;
            };

            let payload_start = start + self.marker.len();
            let newline = self.carry[payload_start..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|i| payload_start + i);

            let payload_end = newline.unwrap_or(self.carry.len());
            // Lossy conversion is safe here: a character split by the
            // current fragment boundary can only sit at the very end of the
            // carry, where the brace check fails and the bytes stay intact.
            let payload = String::from_utf8_lossy(&self.carry[payload_start..payload_end]);

            if braces_balanced(&payload) && !payload.trim().is_empty() {
                match serde_json::from_str::<WireEvent>(payload.trim()) {
                    Ok(event) => match event.into_message() {
                        Ok(message) => messages.push(message),
                        Err(e) => tracing::warn!("dropping undecodable event: {e}"),
                    },
                    Err(e) => tracing::warn!("dropping unparsable line: {e}"),
                }
                let consumed = newline.map(|i| i + 1).unwrap_or(self.carry.len());
                self.carry.drain(..consumed);
            } else if newline.is_none() {
                // Truncated mid-payload: wait for the rest of the line,
                // unless it has already outgrown any legitimate event.
                self.carry.drain(..start);
                if self.carry.len() > DECODER_MAX_PENDING_BYTES {
                    tracing::warn!(
                        "dropping oversized partial line ({} bytes buffered)",
                        self.carry.len()
                    );
                    self.carry.clear();
                }
                break;
            } else {
                tracing::warn!(
                    "dropping malformed line ({} bytes, unbalanced braces)",
                    payload.len()
                );
                // This branch requires newline.is_some(), so payload_end
                // points at the newline itself.
                let consumed = payload_end + 1;
                self.carry.drain(..consumed);
            }
        }
        messages
    }

    /// Bytes currently held waiting for completion.
    pub fn pending_len(&self) -> usize {
        self.carry.len()
    }

    fn trim_to_possible_marker(&mut self) {
        // Keep the longest tail that is a prefix of the marker; everything
        // before it can never become a message.
        let keep = (1..self.marker.len())
            .rev()
            .find(|&n| self.carry.ends_with(&self.marker[..n]))
            .unwrap_or(0);
        let cut = self.carry.len() - keep;
        self.carry.drain(..cut);
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Cheap structural check: do `{`/`}` pairs balance outside string literals?
fn braces_balanced(payload: &str) -> bool {
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut seen_open = false;

    for c in payload.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => {
                depth += 1;
                seen_open = true;
            }
            '}' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    seen_open && depth == 0 && !in_string
}
