//! Terminal progress rendering from engine events.

use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use favus_uploader::UploadEvent;

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg:>8} {bar:30} {bytes}/{total_bytes} ({bytes_per_sec})")
        .unwrap()
        .progress_chars("=> ")
}

/// Draws a total bar plus one bar per in-flight part until the event
/// channel closes.
pub async fn render(mut rx: mpsc::Receiver<UploadEvent>) {
    let multi = MultiProgress::new();
    let mut total: Option<ProgressBar> = None;
    let mut parts: HashMap<i32, ProgressBar> = HashMap::new();

    while let Some(event) = rx.recv().await {
        match event {
            UploadEvent::SessionStarted {
                total_bytes,
                already_bytes,
                ..
            } => {
                let bar = multi.add(ProgressBar::new(total_bytes));
                bar.set_style(bar_style());
                bar.set_message("total");
                bar.set_position(already_bytes);
                total = Some(bar);
            }
            UploadEvent::PartStarted { part, size, .. } => {
                let bar = multi.add(ProgressBar::new(size));
                bar.set_style(bar_style());
                bar.set_message(format!("part {part}"));
                parts.insert(part, bar);
            }
            UploadEvent::Progress { part, bytes } => {
                if let Some(bar) = &total {
                    bar.inc(bytes);
                }
                if let Some(bar) = parts.get(&part) {
                    bar.inc(bytes);
                }
            }
            UploadEvent::PartCompleted { part, .. } => {
                if let Some(bar) = parts.remove(&part) {
                    bar.finish_and_clear();
                }
            }
            UploadEvent::PartFailed { part, message } => {
                if let Some(bar) = parts.remove(&part) {
                    bar.abandon();
                }
                multi.suspend(|| eprintln!("part {part} failed: {message}"));
            }
            UploadEvent::SessionCompleted { success } => {
                for (_, bar) in parts.drain() {
                    bar.finish_and_clear();
                }
                if let Some(bar) = total.take() {
                    if success {
                        bar.finish();
                    } else {
                        bar.abandon();
                    }
                }
            }
        }
    }
}
