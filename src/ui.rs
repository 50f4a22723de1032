use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
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
            let spinner = spinner("{spinner} {msg}");
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner), None)
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None, None)
        }
    }

    /// Stage that counts frames as batches go through it.
    pub fn frame_stage(&self, name: &str) -> StageGuard {
        let mut guard = self.stage(name);
        if let Some(spinner) = &guard.spinner {
            spinner.set_style(
                ProgressStyle::with_template("{spinner} {msg} {pos} frames")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
        }
        guard.frames = Some(0);
        guard
    }
}

fn spinner(template: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_draw_target(ProgressDrawTarget::stderr());
    spinner.enable_steady_tick(Duration::from_millis(120));
    let style =
        ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    frames: Option<u64>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>, frames: Option<u64>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
            frames,
        }
    }

    pub fn add_frames(&mut self, count: usize) {
        let count = count as u64;
        if let Some(frames) = self.frames.as_mut() {
            *frames += count;
        }
        if let Some(spinner) = &self.spinner {
            spinner.inc(count);
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = match self.frames {
            Some(frames) => format!(
                "✔ {} ({} frames, {})",
                self.name,
                frames,
                format_duration(elapsed)
            ),
            None => format!("✔ {} ({})", self.name, format_duration(elapsed)),
        };
        if let Some(spinner) = &self.spinner {
            if self.frames.is_some() {
                spinner.set_style(
                    ProgressStyle::with_template("{msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
            }
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
