use tracing::warn;

/// SSEの1イベント分
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    /// 名前なし (message) と `log` イベントだけをログとして扱う
    pub fn is_log(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message") | Some("log"))
    }
}

/// 区切りの来ないフレームをこれ以上ためない
pub const MAX_PENDING_BYTES: usize = 1024 * 1024;

/// チャンク単位で届くバイト列を空行区切りのイベントに分解する
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    // 区切りが無いことを確認済みのバイト数
    scanned: usize,
    max_pending: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_pending: MAX_PENDING_BYTES,
        }
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        // CRLF は LF にそろえる
        self.buffer
            .extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        loop {
            // 前のチャンク末尾の \n と今回の先頭の \n をまたいで探せるよう1バイト戻る
            let start = self.scanned.saturating_sub(1);
            let Some(offset) = self.buffer[start..].windows(2).position(|w| w == b"\n\n") else {
                self.scanned = self.buffer.len();
                break;
            };
            let frame: Vec<u8> = self.buffer.drain(..start + offset + 2).collect();
            self.scanned = 0;
            if let Some(event) = parse_frame(&String::from_utf8_lossy(&frame)) {
                events.push(event);
            }
        }

        if self.buffer.len() > self.max_pending {
            warn!(pending = self.buffer.len(), limit = self.max_pending, "dropping oversized SSE frame");
            self.buffer.clear();
            self.scanned = 0;
        }
        events
    }

    /// まだイベントになっていない残りのバイト数
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn parse_frame(text: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data = String::new();
    let mut has_data = false;

    for line in text.lines() {
        if line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            if has_data {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
            has_data = true;
        }
    }

    if !has_data || data.is_empty() {
        return None;
    }
    Some(SseEvent { event, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: {\"a\":1}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: None,
                data: "{\"a\":1}".to_string()
            }]
        );
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: log\ndata: {\"mess").is_empty());
        assert!(decoder.push(b"age\":\"hi\"}\n").is_empty());
        let events = decoder.push(b"\ndata: second\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event.as_deref(), Some("log"));
        assert_eq!(events[0].data, "{\"message\":\"hi\"}");
        assert!(events[0].is_log());
        assert_eq!(events[1].data, "second");
    }

    #[test]
    fn test_crlf_and_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\r\n\r\ndata: x\r\ndata: y\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x\ny");
    }

    #[test]
    fn test_other_event_names_are_not_logs() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"event: ping\ndata: 1\n\n");
        assert_eq!(events.len(), 1);
        assert!(!events[0].is_log());
    }

    #[test]
    fn test_oversized_frame_is_dropped() {
        let mut decoder = SseDecoder::new().with_max_pending(16);
        assert!(decoder.push(b"data: aaaaaaaa").is_empty());
        assert_eq!(decoder.pending(), 14);
        assert!(decoder.push(b"bbbbbbbb").is_empty());
        assert_eq!(decoder.pending(), 0);

        let events = decoder.push(b"\n\ndata: ok\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "ok");
    }

    #[test]
    fn test_byte_by_byte_chunks() {
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for b in b"data: one\n\ndata: two\n\n" {
            events.extend(decoder.push(&[*b]));
        }
        let data: Vec<&str> = events.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, vec!["one", "two"]);
        assert_eq!(decoder.pending(), 0);
    }
}
