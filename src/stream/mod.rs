pub mod chunker;
pub mod renderer;

use std::io::{self, Write};

pub use renderer::{DisplaySink, LessonSession, RenderSettings, RevealKind, Speaker, StreamRenderer};

/// Sink for the one-shot subcommands: writes straight to stdout.
pub struct ConsoleSink {
    out: io::Stdout,
    open: bool,
    attached: bool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            out: io::stdout(),
            open: false,
            attached: true,
        }
    }

    pub fn finish(&mut self) {
        if self.open {
            let _ = writeln!(self.out);
            self.open = false;
        }
    }

    fn write(&mut self, text: &str) {
        // A closed pipe detaches the sink; later reveals become no-ops.
        if write!(self.out, "{}", text).and_then(|_| self.out.flush()).is_err() {
            self.attached = false;
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySink for ConsoleSink {
    fn start_message(&mut self, speaker: Speaker) {
        self.finish();
        self.write(&format!("{}: ", speaker.label()));
        self.open = true;
    }

    fn append(&mut self, text: &str) {
        self.write(text);
    }

    fn is_attached(&self) -> bool {
        self.attached
    }
}
