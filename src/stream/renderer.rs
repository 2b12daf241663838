use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use super::chunker::ChunkStream;
use crate::ai::AiError;
use crate::lessons::Lesson;

pub const FAILURE_NOTICE: &str =
    "No response received. Check your API credentials and network connection.";
pub const EMPTY_NOTICE: &str = "(the assistant returned no text)";
pub const AWAITING_SOLUTION: &str = "AI waiting for your solution...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    You,
    Ai,
    System,
    Challenge,
    Error,
}

impl Speaker {
    pub fn label(self) -> &'static str {
        match self {
            Speaker::You => "You",
            Speaker::Ai => "AI",
            Speaker::System => "System",
            Speaker::Challenge => "Challenge",
            Speaker::Error => "Error",
        }
    }
}

/// Where revealed text goes. Owned by the delivery context.
pub trait DisplaySink {
    /// Open a new transcript entry.
    fn start_message(&mut self, speaker: Speaker);
    /// Extend the most recent entry.
    fn append(&mut self, text: &str);
    /// A detached sink still lets reveals run to completion; nothing is written.
    fn is_attached(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealKind {
    /// A lesson's opening explanation. Its first completion appends the challenge.
    Opening,
    Reply,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub chunk_size: usize,
    pub interval: Duration,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            chunk_size: 38,
            interval: Duration::from_millis(28),
        }
    }
}

/// One lesson's worth of state: the challenge text and whether it was shown.
#[derive(Debug, Clone)]
pub struct LessonSession {
    pub title: String,
    challenge: String,
    challenge_appended: bool,
}

impl LessonSession {
    pub fn new(lesson: &Lesson) -> Self {
        Self {
            title: lesson.title.to_string(),
            challenge: lesson.challenge.to_string(),
            challenge_appended: false,
        }
    }

    pub fn challenge_appended(&self) -> bool {
        self.challenge_appended
    }

    fn take_challenge(&mut self) -> Option<String> {
        if self.challenge_appended {
            return None;
        }
        self.challenge_appended = true;
        Some(self.challenge.clone())
    }
}

struct PendingReveal {
    kind: RevealKind,
    result: Result<String, AiError>,
}

struct ActiveReveal {
    kind: RevealKind,
    stream: ChunkStream,
}

/// Reveals finished replies a chunk at a time.
///
/// The delivery context calls [`tick`](Self::tick) once per interval. Reveals
/// queue up behind each other and an active one is never interrupted.
pub struct StreamRenderer {
    settings: RenderSettings,
    active: Option<ActiveReveal>,
    queue: VecDeque<PendingReveal>,
    session: Option<LessonSession>,
}

impl StreamRenderer {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            active: None,
            queue: VecDeque::new(),
            session: None,
        }
    }

    pub fn with_session(mut self, session: LessonSession) -> Self {
        self.session = Some(session);
        self
    }

    /// Replace the current lesson. Reveals already queued keep their kind.
    pub fn start_session(&mut self, session: LessonSession) {
        self.session = Some(session);
    }

    pub fn session(&self) -> Option<&LessonSession> {
        self.session.as_ref()
    }

    pub fn interval(&self) -> Duration {
        self.settings.interval
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some() || !self.queue.is_empty()
    }

    pub fn render(&mut self, kind: RevealKind, result: Result<String, AiError>) {
        self.queue.push_back(PendingReveal { kind, result });
    }

    /// Reveal at most one chunk. Returns whether more work remains.
    pub fn tick(&mut self, sink: &mut dyn DisplaySink) -> bool {
        if self.active.is_none() {
            let Some(pending) = self.queue.pop_front() else {
                return false;
            };
            self.begin(pending, sink);
            if self.active.is_none() {
                return self.is_busy();
            }
        }

        let finished = match self.active.as_mut() {
            Some(active) => {
                if let Some(chunk) = active.stream.next() {
                    if sink.is_attached() {
                        sink.append(&chunk);
                    }
                }
                active.stream.is_finished().then_some(active.kind)
            }
            None => None,
        };

        if let Some(kind) = finished {
            self.active = None;
            self.finish(kind, sink);
        }

        self.is_busy()
    }

    /// Drive ticks at the configured cadence until everything queued is shown.
    pub async fn play(&mut self, sink: &mut dyn DisplaySink) {
        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.is_busy() {
            ticker.tick().await;
            self.tick(sink);
        }
    }

    fn begin(&mut self, pending: PendingReveal, sink: &mut dyn DisplaySink) {
        let attached = sink.is_attached();

        match pending.result {
            Ok(text) if !text.trim().is_empty() => {
                if attached {
                    sink.start_message(Speaker::Ai);
                }
                self.active = Some(ActiveReveal {
                    kind: pending.kind,
                    stream: ChunkStream::new(text, self.settings.chunk_size),
                });
            }
            Ok(_) => {
                if attached {
                    sink.start_message(Speaker::Ai);
                    sink.append(EMPTY_NOTICE);
                }
                self.finish(pending.kind, sink);
            }
            Err(err) => {
                if attached {
                    sink.start_message(Speaker::Error);
                    sink.append(&err.to_string());
                    sink.start_message(Speaker::System);
                    sink.append(FAILURE_NOTICE);
                }
                self.finish(pending.kind, sink);
            }
        }
    }

    fn finish(&mut self, kind: RevealKind, sink: &mut dyn DisplaySink) {
        if kind != RevealKind::Opening {
            return;
        }

        let Some(challenge) = self.session.as_mut().and_then(LessonSession::take_challenge) else {
            return;
        };

        if sink.is_attached() {
            sink.start_message(Speaker::Challenge);
            sink.append(&challenge);
            sink.start_message(Speaker::System);
            sink.append(AWAITING_SOLUTION);
        }
    }
}
