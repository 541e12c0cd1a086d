use super::envelope::{Envelope, Frame};
use crate::error::{Result, WyomingError};
use tracing::debug;

/// Upper bound on a header line, so a peer that never sends `\n` cannot
/// grow the buffer without limit.
pub const MAX_HEADER_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
enum ReadState {
    /// Scanning for the `\n` that ends the next header
    AwaitingLine,
    /// Header parsed; waiting until its data and payload bytes are buffered
    AwaitingPayload {
        envelope: Envelope,
        data_length: usize,
        payload_length: usize,
    },
}

/// Incremental decoder for the Wyoming byte stream.
///
/// Bytes may be pushed in pieces of any size. Frames come out once their
/// header line and every declared byte have arrived; partial input stays
/// buffered until the next push.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    state: ReadState,
    /// Bytes of `buffer` already searched for a newline
    scanned: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            state: ReadState::AwaitingLine,
            scanned: 0,
        }
    }

    /// Append raw bytes from the transport.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Push bytes and return every frame they complete, in stream order.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        self.push(bytes);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Decode the next frame from buffered bytes, or `None` if more input is needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match &self.state {
                ReadState::AwaitingLine => {
                    let Some(newline) = self.find_newline() else {
                        if self.buffer.len() > MAX_HEADER_BYTES {
                            return Err(header_too_long());
                        }
                        return Ok(None);
                    };
                    // Same limit whether the line arrived whole or in pieces
                    if newline > MAX_HEADER_BYTES {
                        return Err(header_too_long());
                    }

                    let line: Vec<u8> = self.buffer.drain(..=newline).collect();
                    self.scanned = 0;

                    let envelope = parse_header(&line[..line.len() - 1])?;
                    let data_length = declared_length(&envelope, envelope.data_length, "data_length")?;
                    let payload_length =
                        declared_length(&envelope, envelope.payload_length, "payload_length")?;

                    if data_length == 0 && payload_length == 0 {
                        debug!("Decoded {}", envelope.event_type);
                        return Ok(Some(Frame::new(envelope)));
                    }

                    self.state = ReadState::AwaitingPayload {
                        envelope,
                        data_length,
                        payload_length,
                    };
                }
                ReadState::AwaitingPayload {
                    data_length,
                    payload_length,
                    ..
                } => {
                    let needed = data_length + payload_length;
                    if self.buffer.len() < needed {
                        return Ok(None);
                    }

                    let ReadState::AwaitingPayload {
                        envelope,
                        data_length,
                        payload_length,
                    } = std::mem::replace(&mut self.state, ReadState::AwaitingLine)
                    else {
                        unreachable!("state checked above");
                    };

                    let mut bytes: Vec<u8> = self.buffer.drain(..needed).collect();
                    let payload = bytes.split_off(data_length);

                    let mut frame = Frame::new(envelope);
                    if data_length > 0 {
                        frame.data_bytes = Some(bytes);
                    }
                    if payload_length > 0 {
                        frame.payload = Some(payload);
                    }

                    debug!(
                        "Decoded {} (data={}, payload={})",
                        frame.event_type(),
                        data_length,
                        payload_length
                    );
                    return Ok(Some(frame));
                }
            }
        }
    }

    /// Number of bytes received but not yet returned as part of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// True between frames with nothing buffered.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, ReadState::AwaitingLine) && self.buffer.is_empty()
    }

    fn find_newline(&mut self) -> Option<usize> {
        let found = self.buffer[self.scanned..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|offset| self.scanned + offset);
        if found.is_none() {
            self.scanned = self.buffer.len();
        }
        found
    }
}

fn header_too_long() -> WyomingError {
    WyomingError::framing(format!("header exceeds {} bytes", MAX_HEADER_BYTES))
}

fn parse_header(line: &[u8]) -> Result<Envelope> {
    if line.is_empty() {
        return Err(WyomingError::framing("empty header line"));
    }

    serde_json::from_slice(line).map_err(|e| {
        WyomingError::framing(format!(
            "invalid header {:?}: {}",
            String::from_utf8_lossy(&line[..line.len().min(120)]),
            e
        ))
    })
}

fn declared_length(envelope: &Envelope, length: Option<u64>, field: &str) -> Result<usize> {
    let length = length.unwrap_or(0);
    usize::try_from(length).map_err(|_| {
        WyomingError::framing(format!(
            "{} {} of {} does not fit in memory",
            envelope.event_type, field, length
        ))
    })
}

/// Serialize a frame to bytes ready for the wire.
///
/// The length fields are taken from the bytes actually attached, so the
/// header can never disagree with what follows it. The returned buffer holds
/// the header line first, then the data bytes, then the payload.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>> {
    let data_bytes = frame.data_bytes.as_deref().filter(|b| !b.is_empty());
    let payload = frame.payload.as_deref().filter(|b| !b.is_empty());

    let mut envelope = frame.envelope.clone();
    envelope.data_length = data_bytes.map(|b| b.len() as u64);
    envelope.payload_length = payload.map(|b| b.len() as u64);

    let mut bytes = serde_json::to_vec(&envelope).map_err(|e| {
        WyomingError::framing(format!("Failed to serialize {}: {}", envelope.event_type, e))
    })?;
    bytes.push(b'\n');

    if let Some(data) = data_bytes {
        bytes.extend_from_slice(data);
    }
    if let Some(payload) = payload {
        bytes.extend_from_slice(payload);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_stream() -> (Vec<u8>, Vec<Frame>) {
        let format = json!({"rate": 16000, "width": 2, "channels": 1});
        let format = format.as_object().unwrap().clone();

        let frames = vec![
            Frame::new(Envelope::new("transcribe").with_data(Default::default())),
            Frame::new(Envelope::new("audio-start").with_data(format.clone())),
            Frame::new(Envelope::new("audio-chunk").with_data(format.clone()))
                .with_payload((0..=255u8).cycle().take(1000).collect()),
            Frame::new(Envelope::new("audio-chunk").with_data(format))
                .with_payload(vec![b'\n'; 37]),
            Frame::new(Envelope::new("audio-stop").with_data(Default::default())),
            Frame::new(Envelope::new("transcript"))
                .with_data_bytes(br#"{"text":"hello world"}"#.to_vec()),
        ];

        let mut bytes = Vec::new();
        for frame in &frames {
            bytes.extend(encode_frame(frame).unwrap());
        }

        // Decoded frames carry the length fields the encoder filled in
        let mut decoder = FrameDecoder::new();
        let expected = decoder.feed(&bytes).unwrap();
        assert!(decoder.is_idle());

        (bytes, expected)
    }

    #[test]
    fn test_decodes_audio_chunk_with_payload() {
        let audio: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let frame = Frame::new(Envelope::new("audio-chunk")).with_payload(audio.clone());

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&encode_frame(&frame).unwrap()).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].envelope.payload_length, Some(4096));
        assert_eq!(frames[0].payload.as_deref(), Some(audio.as_slice()));
        assert!(frames[0].data_bytes.is_none());
    }

    #[test]
    fn test_fragmentation_does_not_change_frames() {
        let (bytes, expected) = sample_stream();
        assert_eq!(expected.len(), 6);

        for piece in 1..=bytes.len() {
            let mut decoder = FrameDecoder::new();
            let mut frames = Vec::new();
            for chunk in bytes.chunks(piece) {
                frames.extend(decoder.feed(chunk).unwrap());
            }
            assert_eq!(frames, expected, "piece size {}", piece);
            assert!(decoder.is_idle(), "piece size {}", piece);
        }
    }

    #[test]
    fn test_partial_header_yields_nothing() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(br#"{"type":"audio-st"#).unwrap();
        assert!(frames.is_empty());
        assert_eq!(decoder.buffered(), 17);

        let frames = decoder.feed(b"op\"}\n").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_type(), "audio-stop");
    }

    #[test]
    fn test_waits_for_whole_payload() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder
            .feed(b"{\"type\":\"audio-chunk\",\"payload_length\":4}\nab")
            .unwrap();
        assert!(frames.is_empty());
        assert!(!decoder.is_idle());

        let frames = decoder.feed(b"cd{\"type\":\"audio-stop\"}\n").unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload.as_deref(), Some(&b"abcd"[..]));
        assert_eq!(frames[1].event_type(), "audio-stop");
    }

    #[test]
    fn test_info_data_section_consumed_exactly() {
        let mut capabilities = br#"{"asr":[],"version":"1.0.0","padding":""#.to_vec();
        capabilities.resize(1145, b'x');
        capabilities.extend_from_slice(b"\"}");
        assert_eq!(capabilities.len(), 1147);

        let mut bytes = b"{\"type\":\"info\",\"data_length\":1147}\n".to_vec();
        bytes.extend_from_slice(&capabilities);
        bytes.extend_from_slice(b"{\"type\":\"transcript\",\"data\":{\"text\":\"hi\"}}\n");

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&bytes).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data_bytes.as_ref().map(Vec::len), Some(1147));
        assert_eq!(frames[0].merged_data().unwrap()["version"], "1.0.0");
        assert_eq!(frames[1].event_type(), "transcript");
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_data_section_precedes_payload() {
        let frame = Frame::new(Envelope::new("audio-chunk"))
            .with_data_bytes(br#"{"timestamp":10}"#.to_vec())
            .with_payload(vec![1, 2, 3]);

        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&encode_frame(&frame).unwrap()).unwrap();

        assert_eq!(frames[0].data_bytes.as_deref(), Some(&br#"{"timestamp":10}"#[..]));
        assert_eq!(frames[0].payload.as_deref(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn test_invalid_json_is_framing_error() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.feed(b"not json\n").unwrap_err();
        assert!(matches!(err, WyomingError::Framing { .. }));
    }

    #[test]
    fn test_empty_line_is_framing_error() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.feed(b"\n").unwrap_err();
        assert!(matches!(err, WyomingError::Framing { .. }));
    }

    #[test]
    fn test_negative_length_is_framing_error() {
        let mut decoder = FrameDecoder::new();
        let err = decoder
            .feed(b"{\"type\":\"audio-chunk\",\"payload_length\":-1}\n")
            .unwrap_err();
        assert!(matches!(err, WyomingError::Framing { .. }));
    }

    #[test]
    fn test_oversized_header_is_framing_error() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.feed(&vec![b'a'; MAX_HEADER_BYTES + 1]).unwrap_err();
        assert!(matches!(err, WyomingError::Framing { .. }));
    }

    #[derive(Clone, Default)]
    struct LogCapture(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_header_only_frames_are_logged() {
        let capture = LogCapture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut decoder = FrameDecoder::new();
            decoder.feed(b"{\"type\":\"audio-stop\"}\n").unwrap();
        });

        let logs = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("Decoded audio-stop"), "logs: {}", logs);
    }

    #[test]
    fn test_oversized_header_rejected_however_it_arrives() {
        let text = "a".repeat(MAX_HEADER_BYTES + 50_000);
        let line = format!("{{\"type\":\"transcript\",\"data\":{{\"text\":\"{}\"}}}}\n", text);
        let bytes = line.as_bytes();

        let whole = FrameDecoder::new().feed(bytes).unwrap_err();

        let mut decoder = FrameDecoder::new();
        let mut fragmented = None;
        for piece in bytes.chunks(8192) {
            if let Err(e) = decoder.feed(piece) {
                fragmented = Some(e);
                break;
            }
        }
        let fragmented = fragmented.expect("fragmented header should be rejected");

        assert!(matches!(whole, WyomingError::Framing { .. }));
        assert_eq!(whole.to_string(), fragmented.to_string());
    }

    #[test]
    fn test_header_at_limit_is_accepted() {
        let prefix = "{\"type\":\"transcript\",\"data\":{\"text\":\"";
        let suffix = "\"}}";
        let text = "a".repeat(MAX_HEADER_BYTES - prefix.len() - suffix.len());
        let line = format!("{}{}{}\n", prefix, text, suffix);
        assert_eq!(line.len(), MAX_HEADER_BYTES + 1);

        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for piece in line.as_bytes().chunks(8192) {
            frames.extend(decoder.feed(piece).unwrap());
        }

        assert_eq!(frames.len(), 1);
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_encoder_sets_lengths_from_attached_bytes() {
        let mut envelope = Envelope::new("audio-chunk");
        envelope.payload_length = Some(999);
        let frame = Frame::new(envelope).with_payload(vec![0; 10]);

        let bytes = encode_frame(&frame).unwrap();
        let newline = bytes.iter().position(|&b| b == b'\n').unwrap();
        let header: Envelope = serde_json::from_slice(&bytes[..newline]).unwrap();

        assert_eq!(header.payload_length, Some(10));
        assert_eq!(header.data_length, None);
        assert_eq!(bytes.len(), newline + 1 + 10);
    }

    #[test]
    fn test_encoder_writes_single_line() {
        let data = json!({"text": "line one\nline two"});
        let frame = Frame::new(Envelope::new("transcript").with_data(data.as_object().unwrap().clone()));

        let bytes = encode_frame(&frame).unwrap();
        assert_eq!(bytes.iter().filter(|&&b| b == b'\n').count(), 1);
        assert_eq!(bytes.last(), Some(&b'\n'));
    }
}
