use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::ai::{AiClient, ProviderConfig, Responder};
use crate::config::Config;
use crate::lessons::{self, Lesson};
use crate::stream::{DisplaySink, LessonSession, RevealKind, Speaker, StreamRenderer};
use crate::worker::{AiWorker, Outcome, TaskHandle};

pub const THINKING: &str = "AI is thinking...";

const MAX_ENTRIES: usize = 500;

/// Slash commands understood by [`App::submit`], as listed in the help overlay.
pub const COMMANDS: &[(&str, &str)] = &[
    ("/lesson N", "Start lesson N"),
    ("/continue", "Resume the first unfinished lesson"),
    ("/provider NAME", "Switch to openai, gemma or gemini"),
    ("/model NAME", "Use another model"),
    ("/endpoint URL", "Send requests to another endpoint"),
    ("/key KEY", "Use another API key"),
    ("/stop", "Cancel the pending request"),
    ("/clear", "Clear conversation"),
    ("/help", "Toggle help"),
    ("/quit", "Quit"),
];

#[derive(Clone, Debug)]
pub struct Entry {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Chat history as shown in the conversation panel.
#[derive(Debug)]
pub struct Transcript {
    entries: Vec<Entry>,
    attached: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            attached: true,
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.start_message(speaker);
        self.append(&text.into());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Stop accepting writes; the display is going away.
    pub fn detach(&mut self) {
        self.attached = false;
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySink for Transcript {
    fn start_message(&mut self, speaker: Speaker) {
        self.entries.push(Entry {
            speaker,
            text: String::new(),
            timestamp: Utc::now(),
        });

        // Keep history bounded
        if self.entries.len() > MAX_ENTRIES {
            let drain_count = self.entries.len() - MAX_ENTRIES;
            self.entries.drain(0..drain_count);
        }
    }

    fn append(&mut self, text: &str) {
        if let Some(entry) = self.entries.last_mut() {
            entry.text.push_str(text);
        }
    }

    fn is_attached(&self) -> bool {
        self.attached
    }
}

/// Delivery context for the chat screen.
///
/// Everything here is touched only from the UI loop. Provider calls run on
/// the worker; their outcomes come back through `outcomes` and are fed to the
/// renderer from [`pump`](Self::pump).
pub struct App {
    pub config: Arc<Config>,
    pub transcript: Transcript,
    pub input: String,
    pub show_help: bool,
    provider: Arc<ProviderConfig>,
    client: Option<Arc<AiClient>>,
    worker: AiWorker,
    outcomes: mpsc::UnboundedReceiver<Outcome>,
    renderer: StreamRenderer,
    latest: Option<(TaskHandle, RevealKind)>,
    running: bool,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let client = Arc::new(AiClient::new(config.active_provider())?);
        let mut app = Self::with_responder(config, client.clone());
        app.client = Some(client);
        Ok(app)
    }

    pub fn with_responder(config: Config, responder: Arc<dyn Responder>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = AiWorker::new(responder, config.worker_config(None), tx);
        let renderer = StreamRenderer::new(config.render_settings());
        let provider = Arc::new(config.active_provider());

        Self {
            config: Arc::new(config),
            transcript: Transcript::new(),
            input: String::new(),
            show_help: false,
            provider,
            client: None,
            worker,
            outcomes: rx,
            renderer,
            latest: None,
            running: true,
        }
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_thinking(&self) -> bool {
        self.latest.is_some()
    }

    pub fn is_revealing(&self) -> bool {
        self.renderer.is_busy()
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        self.renderer.interval()
    }

    pub fn lesson_title(&self) -> Option<&str> {
        self.renderer.session().map(|s| s.title.as_str())
    }

    /// Handle whatever is in the input box.
    pub fn submit(&mut self) {
        let line = std::mem::take(&mut self.input);
        let line = line.trim();

        if line.is_empty() {
            return;
        }

        if let Some(command) = line.strip_prefix('/') {
            self.run_command(command);
        } else {
            self.send(line);
        }
    }

    fn run_command(&mut self, command: &str) {
        let mut parts = command.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("lesson"), Some(n)) => match n.parse().ok().and_then(lessons::by_number) {
                Some(lesson) => self.open_lesson(lesson),
                None => self.transcript.push(Speaker::System, format!("No lesson {}", n)),
            },
            (Some("continue"), None) => match lessons::next_incomplete() {
                Some(lesson) => self.open_lesson(lesson),
                None => self.transcript.push(Speaker::System, "All lessons complete."),
            },
            (Some("model"), Some(model)) => self.switch(|client, _| client.set_model(model)),
            (Some("provider"), Some(name)) => match name.parse() {
                Ok(kind) => self.switch(|client, config| client.set_provider(config.provider_config(kind))),
                Err(e) => self.transcript.push(Speaker::System, e),
            },
            (Some("endpoint"), Some(url)) => self.switch(|client, _| client.set_endpoint(url)),
            (Some("key"), Some(key)) => self.switch(|client, _| client.set_api_key(key)),
            (Some("stop"), None) => self.stop(),
            (Some("clear"), None) => self.transcript.clear(),
            (Some("help"), None) => self.show_help = !self.show_help,
            (Some("quit"), None) => self.quit(),
            _ => self
                .transcript
                .push(Speaker::System, format!("Unknown command: /{}", command)),
        }
    }

    /// Reconfigure the live client. Calls already in flight keep their settings.
    fn switch(&mut self, change: impl FnOnce(&AiClient, &Config)) {
        let Some(client) = self.client.as_ref() else {
            self.transcript
                .push(Speaker::System, "Provider settings cannot be changed here.");
            return;
        };

        change(client, &self.config);
        self.provider = client.config();
        self.transcript.push(
            Speaker::System,
            format!("Using {} ({})", self.provider.kind, self.provider.model),
        );
    }

    /// Free-form question from the learner.
    pub fn send(&mut self, prompt: &str) {
        self.transcript.push(Speaker::You, prompt);
        self.dispatch(prompt, RevealKind::Reply);
    }

    /// Start a lesson: the opening explanation streams in, then its challenge.
    pub fn open_lesson(&mut self, lesson: &Lesson) {
        tracing::info!("Opening lesson: {}", lesson.title);

        self.renderer.start_session(LessonSession::new(lesson));
        self.transcript
            .push(Speaker::System, format!("Lesson: {}", lesson.title));
        self.dispatch(lesson.start_prompt, RevealKind::Opening);
    }

    fn dispatch(&mut self, prompt: &str, kind: RevealKind) {
        // A pending opening is about to be dropped; its challenge rides on the
        // reply that replaces it.
        let kind = match self.latest {
            Some((_, RevealKind::Opening)) => RevealKind::Opening,
            _ => kind,
        };

        self.transcript.push(Speaker::System, THINKING);
        let handle = self.worker.dispatch(prompt);
        self.latest = Some((handle, kind));
    }

    /// Cancel the pending request, if any. Its outcome still arrives and is
    /// rendered as a cancellation.
    pub fn stop(&mut self) {
        match self.latest {
            Some((ref handle, _)) if !handle.is_cancelled() => {
                tracing::info!("Stopping task {}", handle.id());
                handle.cancel();
            }
            _ => self.transcript.push(Speaker::System, "Nothing to stop."),
        }
    }

    /// Route one outcome to the renderer. Outcomes for anything but the most
    /// recent dispatch are dropped.
    pub fn handle_outcome(&mut self, outcome: Outcome) {
        let id = outcome.task.id;

        let kind = match self.latest {
            Some((ref handle, kind)) if handle.id() == id => kind,
            _ => {
                tracing::debug!("Dropping stale outcome for task {}", id);
                return;
            }
        };
        self.latest = None;

        if !outcome.is_success() {
            tracing::warn!("Task {} finished as {:?}", id, outcome.task.state);
        }

        self.renderer.render(kind, outcome.result);
    }

    /// Drain every outcome that has arrived since the last call.
    pub fn pump(&mut self) {
        while let Ok(outcome) = self.outcomes.try_recv() {
            self.handle_outcome(outcome);
        }
    }

    /// Advance the reveal by one chunk. Returns whether more is queued.
    pub fn tick(&mut self) -> bool {
        self.renderer.tick(&mut self.transcript)
    }

    pub fn quit(&mut self) {
        self.running = false;
        self.worker.shutdown();
        self.transcript.detach();
        tracing::info!("Application quit requested");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiError;
    use crate::stream::renderer::{AWAITING_SOLUTION, FAILURE_NOTICE};
    use std::time::Duration;

    struct EchoResponder {
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Responder for EchoResponder {
        async fn get_response(&self, prompt: &str, _model: Option<&str>) -> Result<String, AiError> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if self.fail {
                Err(AiError::protocol(401, "invalid api key"))
            } else {
                Ok(format!("echo: {}", prompt.chars().take(12).collect::<String>()))
            }
        }
    }

    fn app(fail: bool) -> App {
        App::with_responder(Config::default(), Arc::new(EchoResponder { fail }))
    }

    async fn settle(app: &mut App, outcomes: usize) {
        for _ in 0..outcomes {
            let outcome = app.outcomes.recv().await.unwrap();
            app.handle_outcome(outcome);
        }
        while app.tick() {}
    }

    fn texts(app: &App, speaker: Speaker) -> Vec<String> {
        app.transcript
            .entries()
            .iter()
            .filter(|e| e.speaker == speaker)
            .map(|e| e.text.clone())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_streams_reply_into_transcript() {
        let mut app = app(false);
        app.input = "  what is XSS?  ".into();
        app.submit();

        assert!(app.input.is_empty());
        assert!(app.is_thinking());
        assert_eq!(texts(&app, Speaker::You), vec!["what is XSS?"]);
        assert_eq!(texts(&app, Speaker::System), vec![THINKING]);

        settle(&mut app, 1).await;
        assert!(!app.is_thinking());
        assert_eq!(texts(&app, Speaker::Ai), vec!["echo: what is XSS?"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_latest_outcome_is_rendered() {
        let mut app = app(false);
        app.send("first question");
        app.send("second question");

        settle(&mut app, 2).await;
        assert_eq!(texts(&app, Speaker::Ai), vec!["echo: second quest"]);
        assert!(texts(&app, Speaker::Error).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_shows_diagnostic() {
        let mut app = app(true);
        app.send("hello");
        settle(&mut app, 1).await;

        assert_eq!(texts(&app, Speaker::Error), vec!["provider returned HTTP 401: invalid api key"]);
        assert!(texts(&app, Speaker::System).contains(&FAILURE_NOTICE.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lesson_opening_then_challenge() {
        let mut app = app(false);
        app.input = "/lesson 3".into();
        app.submit();
        assert_eq!(app.lesson_title(), Some("Access Control"));

        settle(&mut app, 1).await;
        let lesson = lessons::by_number(3).unwrap();
        assert_eq!(texts(&app, Speaker::Challenge), vec![lesson.challenge]);

        let last = app.transcript.entries().last().unwrap();
        assert_eq!(last.text, AWAITING_SOLUTION);

        app.send("here is my decorator");
        settle(&mut app, 1).await;
        assert_eq!(texts(&app, Speaker::Challenge).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_challenge_survives_interrupted_opening() {
        let mut app = app(false);
        let lesson = lessons::by_number(1).unwrap();
        app.open_lesson(lesson);
        app.send("quick question");

        settle(&mut app, 2).await;
        assert_eq!(texts(&app, Speaker::Ai), vec!["echo: quick questi"]);
        assert_eq!(texts(&app, Speaker::Challenge), vec![lesson.challenge]);
        assert!(app.renderer.session().unwrap().challenge_appended());

        app.send("follow-up");
        settle(&mut app, 1).await;
        assert_eq!(texts(&app, Speaker::Challenge).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_challenge_survives_without_supersede() {
        let mut config = Config::default();
        config.worker.supersede = false;
        let mut app = App::with_responder(config, Arc::new(EchoResponder { fail: false }));
        let lesson = lessons::by_number(2).unwrap();
        app.open_lesson(lesson);
        app.send("quick question");

        settle(&mut app, 2).await;
        assert_eq!(texts(&app, Speaker::Challenge), vec![lesson.challenge]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_commands_are_reported() {
        let mut app = app(false);
        app.input = "/lesson 9".into();
        app.submit();
        app.input = "/dance".into();
        app.submit();

        assert!(!app.is_thinking());
        assert_eq!(texts(&app, Speaker::System), vec!["No lesson 9", "Unknown command: /dance"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_request() {
        let mut app = app(false);
        app.send("long question");
        app.input = "/stop".into();
        app.submit();

        settle(&mut app, 1).await;
        assert!(!app.is_thinking());
        assert!(texts(&app, Speaker::Ai).is_empty());
        assert_eq!(texts(&app, Speaker::Error), vec!["request cancelled"]);

        app.input = "/stop".into();
        app.submit();
        assert_eq!(texts(&app, Speaker::System).last().unwrap(), "Nothing to stop.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_detaches_transcript() {
        let mut app = app(false);
        app.send("still running?");
        app.quit();
        assert!(!app.is_running());

        let before = app.transcript.entries().len();
        settle(&mut app, 1).await;
        assert_eq!(app.transcript.entries().len(), before);
    }

    #[tokio::test]
    async fn test_switching_provider_and_model() {
        let mut app = App::new(Config::default()).unwrap();
        assert_eq!(app.provider().kind, crate::ai::ProviderKind::Gemma);

        app.input = "/provider openai".into();
        app.submit();
        assert_eq!(app.provider().kind, crate::ai::ProviderKind::OpenAI);
        assert_eq!(app.provider().model, "gpt-3.5-turbo");

        app.input = "/model gpt-4o-mini".into();
        app.submit();
        assert_eq!(app.provider().model, "gpt-4o-mini");
        assert_eq!(texts(&app, Speaker::System).last().unwrap(), "Using openai (gpt-4o-mini)");

        app.input = "/key sk-typed".into();
        app.submit();
        assert_eq!(
            app.provider().credential.as_ref().map(|s| s.expose()),
            Some("sk-typed")
        );
        assert!(!texts(&app, Speaker::System).iter().any(|t| t.contains("sk-typed")));

        app.input = "/endpoint http://gpu-box:8080/v1/chat/completions".into();
        app.submit();
        assert_eq!(
            app.provider().endpoint.as_deref(),
            Some("http://gpu-box:8080/v1/chat/completions")
        );

        app.input = "/provider claude".into();
        app.submit();
        assert_eq!(app.provider().kind, crate::ai::ProviderKind::OpenAI);
    }

    #[test]
    fn test_switching_needs_a_live_client() {
        let mut app = app(false);
        app.input = "/model other".into();
        app.submit();
        assert_eq!(app.provider().model, "gemma");
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_listed_command_is_handled() {
        for (usage, _) in COMMANDS {
            let mut app = app(false);
            app.input = usage
                .replace(" NAME", if usage.starts_with("/provider") { " openai" } else { " other" })
                .replace(" URL", " http://localhost:11434/api/generate")
                .replace(" KEY", " sk-test")
                .replace(" N", " 1");
            app.submit();

            let unknown = texts(&app, Speaker::System)
                .iter()
                .any(|t| t.starts_with("Unknown command"));
            assert!(!unknown, "{} is listed but not handled", usage);
        }
    }

    #[test]
    fn test_transcript_is_bounded() {
        let mut transcript = Transcript::new();
        for i in 0..(MAX_ENTRIES + 20) {
            transcript.push(Speaker::You, i.to_string());
        }
        assert_eq!(transcript.entries().len(), MAX_ENTRIES);
        assert_eq!(transcript.entries()[0].text, "20");
    }
}
