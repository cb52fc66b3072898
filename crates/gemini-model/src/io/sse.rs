use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
///
/// Only the `data` field is surfaced. Comment lines and other fields
/// (`event`, `id`, `retry`) are skipped, and an event made of several
/// `data` lines is joined with `\n`.
pub struct Sse {
    buf: Vec<u8>,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: Vec::new(),
            chunks,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Drain complete events that are already buffered.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                // Tolerate a final event without the trailing blank line.
                return self.flush_trailing();
            };
            // Bytes are buffered raw since a chunk may split a UTF-8
            // sequence.
            self.buf.extend_from_slice(&bytes);
        }
    }

    fn try_parse_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            let Some((block_end, consumed)) = find_blank_line(&self.buf)
            else {
                return Ok(None);
            };
            let block = self.buf[..block_end].to_vec();
            self.buf.drain(..consumed);

            if let Some(data) = parse_block(&block)? {
                return Ok(Some(data));
            }
            // A block with no data (e.g. keep-alive comment), keep going.
        }
    }

    fn flush_trailing(&mut self) -> Result<Option<String>, Error> {
        let block = std::mem::take(&mut self.buf);
        if block.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        parse_block(&block)
    }
}

/// Returns the end of the first event block and how many bytes to consume
/// including its terminating blank line.
fn find_blank_line(buf: &[u8]) -> Option<(usize, usize)> {
    let mut idx = 0;
    while idx < buf.len() {
        if buf[idx..].starts_with(b"\r\n\r\n") {
            return Some((idx, idx + 4));
        }
        if buf[idx..].starts_with(b"\n\n") {
            return Some((idx, idx + 2));
        }
        idx += 1;
    }
    None
}

fn parse_block(block: &[u8]) -> Result<Option<String>, Error> {
    let Ok(block) = str::from_utf8(block) else {
        return Err(Error::InvalidPayload);
    };

    let mut data: Option<String> = None;
    for line in block.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => {
                (field, value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match field {
            "data" => {
                let data = data.get_or_insert_default();
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(value);
            }
            "event" | "id" | "retry" => {}
            _ => return Err(Error::InvalidPayload),
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn sse_from(chunks: &[&'static [u8]]) -> Sse {
        let chunks = chunks.iter().map(|c| Bytes::from_static(*c)).collect();
        Sse::new(Chunks::from_vec_deque(chunks))
    }

    #[tokio::test]
    async fn test_normal_events() {
        let mut sse = sse_from(&[b"data: hello\n\n", b"data: bye\n\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_crlf_and_split_chunks() {
        let mut sse = sse_from(&[
            b"data:",
            b" hello\r\n",
            b"\r\n",
            b"data: {\"a\"",
            b":1}\r\n\r\ndata: bye\r\n\r\n",
        ]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "{\"a\":1}");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_split_utf8_sequence() {
        let mut sse = sse_from(&[b"data: Schl\xc3", b"\xbcssel\n\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "Schlüssel");
    }

    #[tokio::test]
    async fn test_comments_and_multiline_data() {
        let mut sse = sse_from(&[
            b": keep-alive\n\n",
            b"event: message\nid: 7\ndata: first\ndata: second\n\n",
        ]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "first\nsecond");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_trailing_event_without_blank_line() {
        let mut sse = sse_from(&[b"data: last\n"]);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "last");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_data() {
        let mut sse = sse_from(&[b"xxxxxx: 1\n\n"]);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        let mut sse = sse_from(&[b"data: \xff\xfe\n\n"]);
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);
    }
}
