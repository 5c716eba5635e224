//! Terminal rendering of the progress event stream.
//!
//! Consumes [`ScanEvent`]s from the pipeline's channel on a dedicated
//! thread and draws indicatif bars: a spinner while traversal counts
//! files, then one bar per hashing stage. This is presentation only;
//! dropping events (or the whole renderer, in quiet mode) never affects
//! scan results.

use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::events::ScanEvent;

/// Background consumer of the scan event stream.
pub struct ProgressRenderer {
    handle: Option<JoinHandle<()>>,
}

impl ProgressRenderer {
    /// Spawn the rendering thread. With `quiet` set the stream is drained
    /// without drawing anything (errors still go to the log).
    #[must_use]
    pub fn spawn(rx: Receiver<ScanEvent>, quiet: bool) -> Self {
        let handle = thread::spawn(move || render_loop(&rx, quiet));
        Self {
            handle: Some(handle),
        }
    }

    /// Wait for the stream to close and the final bars to be drawn.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn render_loop(rx: &Receiver<ScanEvent>, quiet: bool) {
    let multi = MultiProgress::new();
    let mut scan_bar: Option<ProgressBar> = None;
    let mut partial_bar: Option<ProgressBar> = None;
    let mut full_bar: Option<ProgressBar> = None;

    while let Ok(event) = rx.recv() {
        match event {
            ScanEvent::Error { message } => {
                finish_all(&mut scan_bar, &mut partial_bar, &mut full_bar);
                log::error!("scan failed: {message}");
            }
            _ if quiet => {}
            ScanEvent::Scanned { count } => {
                let bar = scan_bar.get_or_insert_with(|| {
                    let bar = multi.add(ProgressBar::new_spinner());
                    bar.set_style(spinner_style());
                    bar.set_message("scanning");
                    bar
                });
                bar.set_position(count);
            }
            ScanEvent::HashingPartial { current, total } => {
                if let Some(bar) = scan_bar.take() {
                    bar.finish_with_message("scan complete");
                }
                let bar = partial_bar.get_or_insert_with(|| {
                    let bar = multi.add(ProgressBar::new(total as u64));
                    bar.set_style(bar_style());
                    bar.set_message("partial hashing");
                    bar
                });
                bar.set_position(current as u64);
                if current == total {
                    bar.finish_with_message("partial hashing complete");
                }
            }
            ScanEvent::HashingFull { current, total } => {
                if let Some(bar) = scan_bar.take() {
                    bar.finish_with_message("scan complete");
                }
                let bar = full_bar.get_or_insert_with(|| {
                    let bar = multi.add(ProgressBar::new(total as u64));
                    bar.set_style(bar_style());
                    bar.set_message("full hashing");
                    bar
                });
                bar.set_position(current as u64);
                if current == total {
                    bar.finish_with_message("full hashing complete");
                }
            }
            ScanEvent::Complete => {
                finish_all(&mut scan_bar, &mut partial_bar, &mut full_bar);
            }
        }
    }

    // Producer gone; close anything still spinning
    finish_all(&mut scan_bar, &mut partial_bar, &mut full_bar);
}

fn finish_all(
    scan: &mut Option<ProgressBar>,
    partial: &mut Option<ProgressBar>,
    full: &mut Option<ProgressBar>,
) {
    for bar in [scan.take(), partial.take(), full.take()].into_iter().flatten() {
        if !bar.is_finished() {
            bar.finish();
        }
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█>-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;
    use crate::events::HashStage;

    #[test]
    fn test_renderer_drains_stream_and_joins() {
        let (tx, rx) = events::channel();
        let renderer = ProgressRenderer::spawn(rx, true);

        tx.scanned(10);
        tx.hashing(HashStage::Partial, 2, 2);
        tx.hashing(HashStage::Full, 2, 2);
        tx.complete();
        drop(tx);

        // Must terminate once the sender is gone
        renderer.join();
    }

    #[test]
    fn test_renderer_survives_error_event() {
        let (tx, rx) = events::channel();
        let renderer = ProgressRenderer::spawn(rx, true);
        tx.error("index unreachable");
        drop(tx);
        renderer.join();
    }
}
