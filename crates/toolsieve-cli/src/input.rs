//! Reading model output from a file or stdin.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Try to decode bytes as UTF-8, handling incomplete sequences at the end.
/// Returns the decoded string and leaves any incomplete bytes in the buffer.
/// Invalid sequences are replaced rather than stalling the stream.
pub fn decode_utf8_streaming(byte_buffer: &mut Vec<u8>) -> Option<String> {
    if byte_buffer.is_empty() {
        return None;
    }
    match std::str::from_utf8(byte_buffer) {
        Ok(s) => {
            let result = s.to_string();
            byte_buffer.clear();
            Some(result)
        }
        Err(e) => {
            let valid_up_to = e.valid_up_to();
            if let Some(bad_len) = e.error_len() {
                let decoded: Vec<u8> = byte_buffer.drain(..valid_up_to + bad_len).collect();
                return Some(String::from_utf8_lossy(&decoded).into_owned());
            }
            if valid_up_to > 0 {
                let valid_bytes: Vec<u8> = byte_buffer.drain(..valid_up_to).collect();
                String::from_utf8(valid_bytes).ok()
            } else {
                None // No valid UTF-8 yet, wait for more bytes
            }
        }
    }
}

/// Incremental text reader over any async byte source.
pub struct TextReader {
    reader: Box<dyn AsyncRead + Unpin + Send>,
    pending: Vec<u8>,
    buf: Vec<u8>,
}

impl TextReader {
    pub fn new(reader: Box<dyn AsyncRead + Unpin + Send>) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            buf: vec![0; READ_BUFFER_SIZE],
        }
    }

    /// Open `path`, or stdin for `None` / `-`.
    pub async fn open(path: Option<&Path>) -> Result<Self> {
        let reader: Box<dyn AsyncRead + Unpin + Send> = match path {
            Some(path) if path != Path::new("-") => Box::new(
                tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open input {}", path.display()))?,
            ),
            _ => Box::new(tokio::io::stdin()),
        };
        Ok(Self::new(reader))
    }

    /// Next decoded piece of text, or `None` at end of input.
    pub async fn next_text(&mut self) -> Result<Option<String>> {
        loop {
            let n = self.reader.read(&mut self.buf).await.context("Failed to read input")?;
            if n == 0 {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.pending);
                return Ok(Some(String::from_utf8_lossy(&rest).into_owned()));
            }
            self.pending.extend_from_slice(&self.buf[..n]);
            if let Some(text) = decode_utf8_streaming(&mut self.pending) {
                if !text.is_empty() {
                    return Ok(Some(text));
                }
            }
        }
    }

    pub async fn read_all(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(piece) = self.next_text().await? {
            text.push_str(&piece);
        }
        Ok(text)
    }
}

/// Split `text` into pieces of at most `size` characters. `0` keeps it whole.
pub fn split_chars(text: &str, size: usize) -> Vec<&str> {
    if size == 0 || text.is_empty() {
        return vec![text];
    }
    let mut pieces = Vec::with_capacity(text.len() / size + 1);
    let mut start = 0;
    for (count, (offset, _)) in text.char_indices().enumerate() {
        if count > 0 && count % size == 0 {
            pieces.push(&text[start..offset]);
            start = offset;
        }
    }
    pieces.push(&text[start..]);
    pieces
}
