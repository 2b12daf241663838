pub mod renderer;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    Terminal,
};
use std::io;
use tokio::time::{Duration, Instant};

use crate::app::App;

pub struct UI {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
    app: App,
    last_render: Instant,
    last_tick: Instant,
    render_interval: Duration,
}

impl UI {
    pub fn new(app: App) -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self {
            terminal,
            app,
            last_render: Instant::now(),
            last_tick: Instant::now(),
            render_interval: Duration::from_millis(50), // 20 FPS
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        tracing::info!("Starting UI loop");

        loop {
            // Handle events
            if event::poll(Duration::from_millis(10))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key_event(key);
                    }
                }
            }

            // Outcomes from the worker land here, never on the worker's tasks
            self.app.pump();

            if self.last_tick.elapsed() >= self.app.tick_interval() {
                self.app.tick();
                self.last_tick = Instant::now();
            }

            // Render at controlled intervals
            if self.last_render.elapsed() >= self.render_interval {
                self.render()?;
                self.last_render = Instant::now();
            }

            if !self.app.is_running() {
                break;
            }

            // Yield so worker units get scheduled
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        self.cleanup()?;
        Ok(())
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        if self.app.show_help {
            self.app.show_help = false;
            return;
        }

        match key.code {
            KeyCode::Esc => self.app.quit(),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => self.app.quit(),
            KeyCode::Char('l') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.app.transcript.clear();
            }
            KeyCode::F(1) => self.app.show_help = true,
            KeyCode::Enter => self.app.submit(),
            KeyCode::Backspace => {
                self.app.input.pop();
            }
            KeyCode::Char(c) => self.app.input.push(c),
            _ => {}
        }
    }

    fn render(&mut self) -> Result<()> {
        let app = &self.app;
        self.terminal.draw(|frame| {
            renderer::render_frame(frame, app);
        })?;

        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        disable_raw_mode()?;
        execute!(
            self.terminal.backend_mut(),
            LeaveAlternateScreen
        )?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for UI {
    fn drop(&mut self) {
        if self.app.is_running() {
            self.app.quit();
        }
        let _ = self.cleanup();
    }
}
