use crate::error::{Result, WyomingError};
use crate::protocol::{event_type, AudioFormat, Event};

/// Where a transcription exchange stands on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No exchange in progress
    Idle,
    /// `transcribe` is being written
    Transcribing,
    /// `transcribe` sent; `audio-start` comes next
    AwaitingAudioStart,
    /// `audio-start` sent; chunks or `audio-stop` come next
    StreamingAudio,
    /// `audio-stop` sent
    Stopped,
    /// Reading until `transcript` arrives
    AwaitingResult,
    /// Transcript received; a new exchange may begin
    Complete,
    /// An error ended the exchange; the connection must be discarded
    Failed,
}

impl Phase {
    /// True while a transcription has started but not finished.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Phase::Transcribing
                | Phase::AwaitingAudioStart
                | Phase::StreamingAudio
                | Phase::Stopped
                | Phase::AwaitingResult
        )
    }
}

/// Effect of an outgoing event, applied once the write succeeds.
#[derive(Debug, Clone, Copy)]
pub struct SendEffect {
    next: Phase,
    audio_bytes: usize,
    format: Option<AudioFormat>,
    describe: bool,
}

/// Sequencing rules for one connection, independent of any I/O.
#[derive(Debug)]
pub struct TranscriptionState {
    phase: Phase,
    /// Format declared by `audio-start` for the current exchange
    format: Option<AudioFormat>,
    describe_pending: bool,
    chunks_sent: usize,
    audio_bytes: usize,
}

impl Default for TranscriptionState {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptionState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            format: None,
            describe_pending: false,
            chunks_sent: 0,
            audio_bytes: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    pub fn chunks_sent(&self) -> usize {
        self.chunks_sent
    }

    pub fn audio_bytes(&self) -> usize {
        self.audio_bytes
    }

    /// Validate an outgoing event against the current phase.
    ///
    /// Nothing changes if the event is rejected. For `transcribe` the phase
    /// moves to `Transcribing` while the write is in progress.
    pub fn begin_send(&mut self, event: &Event) -> Result<SendEffect> {
        self.ensure_usable()?;

        let idle = matches!(self.phase, Phase::Idle | Phase::Complete);
        let mut effect = SendEffect {
            next: self.phase,
            audio_bytes: 0,
            format: None,
            describe: false,
        };

        match event {
            Event::Describe => {
                if !idle || self.describe_pending {
                    return Err(self.out_of_order(event));
                }
                effect.describe = true;
            }
            Event::Transcribe(_) => {
                if !idle || self.describe_pending {
                    return Err(self.out_of_order(event));
                }
                self.phase = Phase::Transcribing;
                self.format = None;
                self.chunks_sent = 0;
                self.audio_bytes = 0;
                effect.next = Phase::AwaitingAudioStart;
            }
            Event::AudioStart(format) => {
                if self.phase != Phase::AwaitingAudioStart {
                    return Err(self.out_of_order(event));
                }
                effect.next = Phase::StreamingAudio;
                effect.format = Some(*format);
            }
            Event::AudioChunk { format, audio } => {
                if self.phase != Phase::StreamingAudio {
                    return Err(self.out_of_order(event));
                }
                if Some(*format) != self.format {
                    return Err(WyomingError::violation(format!(
                        "audio-chunk format {} differs from audio-start format {}",
                        format,
                        self.format
                            .map(|f| f.to_string())
                            .unwrap_or_else(|| "(none)".to_string())
                    )));
                }
                if audio.is_empty() {
                    return Err(WyomingError::violation("audio-chunk without audio"));
                }
                effect.next = Phase::StreamingAudio;
                effect.audio_bytes = audio.len();
            }
            Event::AudioStop => {
                if self.phase != Phase::StreamingAudio {
                    return Err(self.out_of_order(event));
                }
                effect.next = Phase::Stopped;
            }
            other => {
                return Err(WyomingError::violation(format!(
                    "a client does not send {}",
                    other.event_type()
                )));
            }
        }

        Ok(effect)
    }

    /// Apply a send that reached the stream.
    pub fn finish_send(&mut self, effect: SendEffect) {
        self.phase = effect.next;
        if let Some(format) = effect.format {
            self.format = Some(format);
        }
        if effect.audio_bytes > 0 {
            self.chunks_sent += 1;
            self.audio_bytes += effect.audio_bytes;
        }
        if effect.describe {
            self.describe_pending = true;
        }
    }

    /// Enter `AwaitingResult`; valid only after `audio-stop` was sent.
    pub fn begin_await(&mut self) -> Result<()> {
        self.ensure_usable()?;

        match self.phase {
            Phase::Stopped | Phase::AwaitingResult => {
                self.phase = Phase::AwaitingResult;
                Ok(())
            }
            phase => Err(WyomingError::violation(format!(
                "cannot wait for a transcript in phase {:?}; send audio-stop first",
                phase
            ))),
        }
    }

    /// Check an incoming event against what the exchange expects.
    pub fn on_receive(&mut self, event: &Event) -> Result<()> {
        self.ensure_usable()?;

        match event {
            Event::Info(_) if self.describe_pending => {
                self.describe_pending = false;
                Ok(())
            }
            Event::Transcript { .. } if self.phase == Phase::AwaitingResult => {
                self.phase = Phase::Complete;
                Ok(())
            }
            Event::Transcript { .. } => Err(WyomingError::violation(format!(
                "transcript received in phase {:?}, before audio-stop completed the request",
                self.phase
            ))),
            Event::Error { text, code } => Err(WyomingError::Server {
                message: text.clone(),
                code: code.clone(),
            }),
            Event::Other(name) if self.phase == Phase::AwaitingResult && is_progress(name) => Ok(()),
            other => Err(WyomingError::violation(format!(
                "unexpected {} in phase {:?}",
                other.event_type(),
                self.phase
            ))),
        }
    }

    /// Mark the exchange as failed. Every later operation is rejected.
    pub fn fail(&mut self) {
        self.phase = Phase::Failed;
        self.describe_pending = false;
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.phase == Phase::Failed {
            return Err(WyomingError::violation(
                "session failed earlier; open a new connection",
            ));
        }
        Ok(())
    }

    fn out_of_order(&self, event: &Event) -> WyomingError {
        let pending = if self.describe_pending {
            " with describe pending"
        } else {
            ""
        };
        WyomingError::violation(format!(
            "{} not allowed in phase {:?}{}",
            event.event_type(),
            self.phase,
            pending
        ))
    }
}

fn is_progress(name: &str) -> bool {
    matches!(
        name,
        event_type::TRANSCRIPT_START | event_type::TRANSCRIPT_CHUNK | event_type::TRANSCRIPT_STOP
    )
}
