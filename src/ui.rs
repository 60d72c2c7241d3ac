//! Terminal feedback: stage spinners and the live status line shown while a
//! capture session runs. Everything goes to stderr so stdout stays clean for
//! summaries.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::gps::Location;

const PLAIN_STATUS_EVERY: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    /// Plain output for tests and non-interactive runs.
    pub fn plain() -> Self {
        Self::new(UiMode::Plain, false, true)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Live status line for a running session.
    pub fn status_line(&self) -> StatusLine {
        let bar = self.use_pretty().then(|| {
            let bar = ProgressBar::new_spinner();
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            bar.set_style(style);
            bar
        });
        StatusLine {
            bar,
            last_plain: None,
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Counters shown on the status line.
#[derive(Clone, Debug, Default)]
pub struct SessionStatus {
    pub frames: u64,
    pub analyses: u64,
    pub detections: u64,
    pub next_analysis_in: Duration,
    pub location: Option<Location>,
}

pub fn render_status(status: &SessionStatus) -> String {
    let gps = match &status.location {
        Some(location) => format!(
            "GPS: {} (satellites {}, quality {})",
            location.coordinates(),
            location.satellite_count,
            location.fix_quality
        ),
        None => "GPS: No fix".to_string(),
    };
    format!(
        "Frames: {} | Analyzed: {} | Detections: {} | Next analysis in: {:.1}s | {} | q+Enter to quit",
        status.frames,
        status.analyses,
        status.detections,
        status.next_analysis_in.as_secs_f64(),
        gps
    )
}

/// Redrawn in place on a terminal; printed every few seconds otherwise.
pub struct StatusLine {
    bar: Option<ProgressBar>,
    last_plain: Option<Instant>,
}

impl StatusLine {
    pub fn update(&mut self, status: &SessionStatus) {
        let line = render_status(status);
        match &self.bar {
            Some(bar) => {
                bar.set_message(line);
                bar.tick();
            }
            None => {
                let due = self
                    .last_plain
                    .map_or(true, |at| at.elapsed() >= PLAIN_STATUS_EVERY);
                if due {
                    eprintln!("{line}");
                    self.last_plain = Some(Instant::now());
                }
            }
        }
    }

    pub fn println(&self, line: &str) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }

    pub fn close(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl Drop for StatusLine {
    fn drop(&mut self) {
        self.close();
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
