use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::watch;
use tokio::task::JoinHandle;

// indicatif shows the last tick string once finished.
const FRAMES: [&str; 5] = ["|", "/", "-", "\\", "|"];
const TEMPLATE: &str = "[INFO] {msg} {spinner}";
const TICK: Duration = Duration::from_millis(200);

/// Cosmetic spinner around a long-running operation.
///
/// It shares nothing with the work it decorates except the stop signal.
/// Drawing goes to stdout and is skipped when stdout is not a terminal.
pub struct Spinner {
    bar: ProgressBar,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Spinner {
    pub fn start(message: impl Into<String>) -> Self {
        Self::start_with(message, ProgressDrawTarget::stdout())
    }

    pub fn start_with(message: impl Into<String>, target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(None, target);
        bar.set_style(style());
        bar.set_message(message.into());
        bar.enable_steady_tick(TICK);

        let (stop, mut stopped) = watch::channel(false);
        let handle = bar.clone();
        // Also ends when the sender is dropped, so an abandoned spinner
        // still clears its line.
        let task = tokio::spawn(async move {
            let _ = stopped.wait_for(|stop| *stop).await;
            handle.finish_and_clear();
        });

        Self { bar, stop, task }
    }

    pub fn progress_bar(&self) -> &ProgressBar {
        &self.bar
    }

    /// Stop drawing, clear the line and wait until that has happened.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::debug!("Spinner task ended abnormally: {e}");
            self.bar.finish_and_clear();
        }
    }
}

fn style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template(TEMPLATE)
        .unwrap_or_else(|e| {
            tracing::debug!("Bad spinner template: {e}");
            ProgressStyle::default_spinner()
        })
        .tick_strings(&FRAMES)
}
