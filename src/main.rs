use clap::{Parser, Subcommand};
use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod app;
mod ui;
mod ai;
mod config;
mod lessons;
mod stream;
mod worker;

use ai::{AiClient, AiError, ProviderKind};
use app::App;
use config::Config;
use stream::{ConsoleSink, DisplaySink, LessonSession, RevealKind, StreamRenderer};

#[derive(Parser)]
#[command(name = "chatbox")]
#[command(about = "Chatbox - an AI tutor for secure coding lessons")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat {
        /// Open lesson N on start
        #[arg(long, conflicts_with = "resume")]
        lesson: Option<usize>,
        /// Open the first unfinished lesson
        #[arg(long = "continue")]
        resume: bool,
    },
    /// Ask one question and print the reply
    Ask {
        prompt: String,
        #[arg(long)]
        model: Option<String>,
    },
    /// Print a lesson's opening and its challenge
    Lesson { number: usize },
    /// List lessons
    Lessons,
    /// List models available to the Gemini key
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load().await?;

    let interactive = matches!(cli.command, None | Some(Commands::Chat { .. }));
    init_tracing(&config, interactive)?;

    config.validate()?;

    match cli.command {
        None => start_chat(config, None).await?,
        Some(Commands::Chat { lesson, resume }) => {
            let opening = match (lesson, resume) {
                (Some(n), _) => Some(lookup_lesson(n)?),
                (None, true) => lessons::next_incomplete(),
                (None, false) => None,
            };
            start_chat(config, opening).await?
        }
        Some(Commands::Ask { prompt, model }) => ask(config, &prompt, model.as_deref()).await?,
        Some(Commands::Lesson { number }) => run_lesson(config, lookup_lesson(number)?).await?,
        Some(Commands::Lessons) => list_lessons(),
        Some(Commands::Models) => list_models(config).await?,
    }

    Ok(())
}

/// The chat screen owns the terminal, so its logs go to a file.
fn init_tracing(config: &Config, interactive: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("chatbox={}", config.get_tracing_level().as_str().to_lowercase()))
    });

    if interactive {
        let path = Config::log_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    Ok(())
}

fn lookup_lesson(number: usize) -> Result<&'static lessons::Lesson> {
    lessons::by_number(number).ok_or_else(|| {
        anyhow::anyhow!(
            "No lesson {}. Pick one between 1 and {}.",
            number,
            lessons::catalog().len()
        )
    })
}

async fn start_chat(config: Config, opening: Option<&lessons::Lesson>) -> Result<()> {
    tracing::info!("Starting chatbox with provider {}", config.provider);

    let mut app = App::new(config)?;
    if let Some(lesson) = opening {
        app.open_lesson(lesson);
    }

    let mut ui = ui::UI::new(app)?;
    ui.run().await?;

    Ok(())
}

async fn ask(config: Config, prompt: &str, model: Option<&str>) -> Result<()> {
    let mut sink = ConsoleSink::new();
    let answered = answer(&config, prompt, model, &mut sink).await;
    sink.finish();
    answered
}

/// Stream one reply into `sink`. A failed call is shown in the sink and also
/// returned, so the process exits non-zero.
async fn answer(
    config: &Config,
    prompt: &str,
    model: Option<&str>,
    sink: &mut dyn DisplaySink,
) -> Result<()> {
    let client = AiClient::new(config.active_provider())?;
    let result = client.get_response(prompt, model).await;
    let failure = result.as_ref().err().map(AiError::kind);

    let mut renderer = StreamRenderer::new(config.render_settings());
    renderer.render(RevealKind::Reply, result);
    renderer.play(sink).await;

    match failure {
        Some(kind) => Err(anyhow::anyhow!("{} request failed ({} error)", config.provider, kind)),
        None => Ok(()),
    }
}

async fn run_lesson(config: Config, lesson: &lessons::Lesson) -> Result<()> {
    println!("📘 {}", lesson.title);

    let client = AiClient::new(config.active_provider())?;
    let result = client.get_response(lesson.start_prompt, None).await;

    let mut renderer =
        StreamRenderer::new(config.render_settings()).with_session(LessonSession::new(lesson));
    renderer.render(RevealKind::Opening, result);
    play(&mut renderer).await;

    Ok(())
}

async fn play(renderer: &mut StreamRenderer) {
    let mut sink = ConsoleSink::new();
    renderer.play(&mut sink).await;
    sink.finish();
}

fn list_lessons() {
    println!("📚 Lessons:");

    for (idx, lesson) in lessons::catalog().iter().enumerate() {
        let marker = if lesson.progress >= 1.0 { "✅" } else { "  " };
        println!(
            "   {} {}. {} ({:.0}%)",
            marker,
            idx + 1,
            lesson.title,
            lesson.progress * 100.0
        );
    }

    if let Some(next) = lessons::next_incomplete() {
        println!("\n   Continue with: {}", next.title);
    }
}

async fn list_models(config: Config) -> Result<()> {
    let provider = config.provider_config(ProviderKind::Gemini);
    let models = ai::models::list_models(&provider).await?;

    if models.is_empty() {
        println!("No models available for this key.");
        return Ok(());
    }

    println!("🤖 Available models:");
    for model in models {
        if model.display_name.is_empty() {
            println!("   {}", model.name);
        } else {
            println!("   {} - {}", model.name, model.display_name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use stream::Speaker;

    #[derive(Default)]
    struct CaptureSink {
        lines: Vec<(Speaker, String)>,
    }

    impl DisplaySink for CaptureSink {
        fn start_message(&mut self, speaker: Speaker) {
            self.lines.push((speaker, String::new()));
        }

        fn append(&mut self, text: &str) {
            if let Some((_, last)) = self.lines.last_mut() {
                last.push_str(text);
            }
        }
    }

    fn config_at(server: &Server) -> Config {
        let mut config = Config::default();
        config.provider = ProviderKind::OpenAI;
        config.openai.endpoint = Some(format!("{}/v1/chat/completions", server.url()));
        config.openai.api_key = Some("sk-test".into());
        config.stream.interval_ms = 1;
        config
    }

    #[tokio::test]
    async fn test_answer_streams_reply() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"Use parameterized queries."}}]}"#)
            .create_async()
            .await;

        let mut sink = CaptureSink::default();
        answer(&config_at(&server), "How do I stop SQLi?", None, &mut sink)
            .await
            .unwrap();

        assert_eq!(sink.lines, vec![(Speaker::Ai, "Use parameterized queries.".to_string())]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_answer_failure_is_returned_after_display() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", Matcher::Any)
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let mut sink = CaptureSink::default();
        let err = answer(&config_at(&server), "hello", None, &mut sink)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "openai request failed (protocol error)");
        assert_eq!(sink.lines[0], (Speaker::Error, "provider returned HTTP 503: overloaded".to_string()));
        assert_eq!(sink.lines.len(), 2);
    }
}
