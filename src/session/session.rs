use super::config::SessionConfig;
use super::state::{Phase, TranscriptionState};
use super::stats::Transcript;
use crate::audio::{chunks, validate_chunk_size};
use crate::error::{Result, WyomingError};
use crate::protocol::{encode_frame, Event, Frame, FrameDecoder, ServiceInfo};
use chrono::Utc;
use futures::stream::{Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

const READ_BUFFER_SIZE: usize = 8192;

/// One Wyoming connection and the exchange running on it.
///
/// The session owns the stream exclusively. Requests are strictly sequential:
/// a second transcription may only start after the first reached
/// [`Phase::Complete`]. Run concurrent transcriptions on separate sessions.
pub struct WyomingSession<S> {
    id: Uuid,
    stream: S,
    decoder: FrameDecoder,
    state: TranscriptionState,
    config: SessionConfig,
    read_buffer: Vec<u8>,
}

impl<S> WyomingSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already connected stream
    pub fn new(stream: S, config: SessionConfig) -> Self {
        let id = Uuid::new_v4();
        debug!("Session {} created (chunk_size={})", id, config.chunk_size);

        Self {
            id,
            stream,
            decoder: FrameDecoder::new(),
            state: TranscriptionState::new(),
            config,
            read_buffer: vec![0; READ_BUFFER_SIZE],
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Ask the server for its version and the models it serves
    pub async fn describe(&mut self) -> Result<ServiceInfo> {
        info!("Session {}: requesting server info", self.id);

        self.send_event(Event::Describe).await?;
        let timeout = self.config.response_timeout;
        let outcome = tokio::time::timeout(timeout, self.read_info()).await;
        let info = self.settle(outcome)?;

        info!(
            "Session {}: server version {} with {} ASR program(s)",
            self.id,
            info.version.as_deref().unwrap_or("unknown"),
            info.asr.len()
        );
        Ok(info)
    }

    /// Send `transcribe` with the configured model and language
    pub async fn begin_transcription(&mut self) -> Result<()> {
        let options = self.config.transcribe.clone();
        self.send_event(Event::Transcribe(options)).await
    }

    /// Send `audio-start` with the session audio format
    pub async fn start_audio(&mut self) -> Result<()> {
        self.send_event(Event::AudioStart(self.config.audio_format))
            .await
    }

    /// Send one `audio-chunk` carrying `audio` as its payload
    pub async fn send_chunk(&mut self, audio: &[u8]) -> Result<()> {
        self.send_event(Event::AudioChunk {
            format: self.config.audio_format,
            audio: audio.to_vec(),
        })
        .await
    }

    /// Send `audio-stop`
    pub async fn stop_audio(&mut self) -> Result<()> {
        self.send_event(Event::AudioStop).await
    }

    /// Send any client event after checking it against the exchange state.
    ///
    /// A rejected event is not written, but the session is still marked
    /// failed: the caller and the server no longer agree on the sequence.
    pub async fn send_event(&mut self, event: Event) -> Result<()> {
        let result = self.write_event(event).await;
        if let Err(e) = &result {
            warn!("Session {}: send failed: {}", self.id, e);
            self.state.fail();
        }
        result
    }

    /// Wait for the transcript after `audio-stop`
    pub async fn await_transcript(&mut self) -> Result<Transcript> {
        if let Err(e) = self.state.begin_await() {
            self.state.fail();
            return Err(e);
        }

        let timeout = self.config.response_timeout;
        let outcome = tokio::time::timeout(timeout, self.read_transcript()).await;
        let text = self.settle(outcome)?;

        let format = self.state.format().unwrap_or(self.config.audio_format);
        let transcript = Transcript {
            text,
            session_id: self.id.to_string(),
            received_at: Utc::now(),
            chunks_sent: self.state.chunks_sent(),
            audio_bytes: self.state.audio_bytes(),
            audio_duration_secs: format.duration_secs(self.state.audio_bytes()),
        };

        info!(
            "Session {}: transcript received ({} chars for {:.1}s of audio)",
            self.id,
            transcript.text.len(),
            transcript.audio_duration_secs
        );
        Ok(transcript)
    }

    /// Run a complete exchange over raw PCM audio in the session format
    pub async fn transcribe(&mut self, pcm: &[u8]) -> Result<Transcript> {
        let pieces = chunks(pcm, self.config.chunk_size)?;

        info!(
            "Session {}: transcribing {} bytes ({:.1}s) in chunks of {}",
            self.id,
            pcm.len(),
            self.config.audio_format.duration_secs(pcm.len()),
            self.config.chunk_size
        );

        self.begin_transcription().await?;
        self.start_audio().await?;
        for piece in pieces {
            self.send_chunk(piece).await?;
        }
        self.stop_audio().await?;

        self.await_transcript().await
    }

    /// Run a complete exchange over audio arriving as a stream of PCM buffers.
    ///
    /// Buffers are regrouped so every chunk except the last holds exactly
    /// `chunk_size` bytes.
    pub async fn transcribe_stream<St>(&mut self, mut audio: St) -> Result<Transcript>
    where
        St: Stream<Item = Vec<u8>> + Unpin,
    {
        let chunk_size = self.config.chunk_size;
        validate_chunk_size(chunk_size)?;

        info!("Session {}: transcribing streamed audio", self.id);

        self.begin_transcription().await?;
        self.start_audio().await?;

        let mut pending: Vec<u8> = Vec::with_capacity(chunk_size);
        while let Some(buffer) = audio.next().await {
            pending.extend_from_slice(&buffer);
            let mut consumed = 0;
            while pending.len() - consumed >= chunk_size {
                let chunk = pending[consumed..consumed + chunk_size].to_vec();
                consumed += chunk_size;
                self.send_event(Event::AudioChunk {
                    format: self.config.audio_format,
                    audio: chunk,
                })
                .await?;
            }
            pending.drain(..consumed);
        }
        if !pending.is_empty() {
            self.send_event(Event::AudioChunk {
                format: self.config.audio_format,
                audio: pending,
            })
            .await?;
        }

        self.stop_audio().await?;
        self.await_transcript().await
    }

    /// Shut down the write half of the stream
    pub async fn close(mut self) -> Result<()> {
        debug!("Session {}: closing", self.id);
        self.stream
            .shutdown()
            .await
            .map_err(|e| WyomingError::connection(format!("Failed to close stream: {}", e)))
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    async fn write_event(&mut self, event: Event) -> Result<()> {
        let effect = self.state.begin_send(&event)?;
        let event_type = event.event_type().to_string();

        // Header, data and payload go out in a single write
        let bytes = encode_frame(&event.into_frame()?)?;

        self.stream.write_all(&bytes).await.map_err(|e| {
            WyomingError::connection(format!("Failed to write {}: {}", event_type, e))
        })?;
        self.stream.flush().await.map_err(|e| {
            WyomingError::connection(format!("Failed to flush {}: {}", event_type, e))
        })?;

        self.state.finish_send(effect);
        debug!("Session {}: sent {} ({} bytes)", self.id, event_type, bytes.len());
        Ok(())
    }

    /// Fail the session if a read ended in error or ran past the response timeout
    fn settle<T>(
        &mut self,
        outcome: std::result::Result<Result<T>, tokio::time::error::Elapsed>,
    ) -> Result<T> {
        let timeout = self.config.response_timeout;
        let result = outcome.unwrap_or_else(|_| Err(WyomingError::Timeout(timeout)));
        if let Err(e) = &result {
            warn!("Session {}: receive failed: {}", self.id, e);
            self.state.fail();
        }
        result
    }

    async fn read_info(&mut self) -> Result<ServiceInfo> {
        loop {
            match self.read_event().await? {
                Event::Info(info) => return Ok(info),
                other => debug!("Session {}: ignoring {}", self.id, other.event_type()),
            }
        }
    }

    async fn read_transcript(&mut self) -> Result<String> {
        loop {
            match self.read_event().await? {
                Event::Transcript { text } => return Ok(text),
                other => debug!(
                    "Session {}: skipping {} while awaiting transcript",
                    self.id,
                    other.event_type()
                ),
            }
        }
    }

    /// Read the next event and check it against the exchange state
    async fn read_event(&mut self) -> Result<Event> {
        let frame = self.read_frame().await?;
        let event = Event::from_frame(frame)?;
        self.state.on_receive(&event)?;
        Ok(event)
    }

    async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(frame);
            }

            let n = self
                .stream
                .read(&mut self.read_buffer)
                .await
                .map_err(|e| WyomingError::connection(format!("Failed to read: {}", e)))?;

            if n == 0 {
                let message = if self.decoder.buffered() > 0 {
                    "server closed the stream in the middle of a message"
                } else {
                    "server closed the stream"
                };
                return Err(WyomingError::connection(message));
            }

            self.decoder.push(&self.read_buffer[..n]);
        }
    }
}
