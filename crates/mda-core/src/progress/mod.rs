//! Periodic progress line on stdout.

mod render;

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub use render::{group_digits, render, scale_rate, Frame, MIN_WIDTH};

/// Samples a shared byte counter every `interval` and redraws the bar.
pub struct ProgressReporter {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Starts the reporter when stdout is a terminal; `None` otherwise.
    /// `received` counts bytes of this run only, on top of `initial`.
    pub fn start(initial: u64, total: u64, received: Arc<AtomicU64>, interval: Duration) -> Option<Self> {
        let term = console::Term::stdout();
        if !term.is_term() {
            return None;
        }
        let (stop, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("progress".into())
            .spawn(move || {
                let mut out = std::io::stdout();
                let _ = writeln!(out, "Start download file ({} bytes)", group_digits(total));
                let started = Instant::now();
                let mut last = received.load(Ordering::Relaxed);
                let mut last_at = started;
                let mut frame = Frame {
                    initial,
                    total,
                    received: last,
                    delta: 0,
                    interval,
                    elapsed: Duration::ZERO,
                    finished: false,
                };
                draw(&mut out, &term, &frame);
                loop {
                    match rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let now = Instant::now();
                            let count = received.load(Ordering::Relaxed);
                            frame.received = count;
                            frame.delta = count.saturating_sub(last);
                            frame.interval = now - last_at;
                            frame.elapsed = now - started;
                            last = count;
                            last_at = now;
                            draw(&mut out, &term, &frame);
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                // Final frame: average rate over the whole run.
                let elapsed = started.elapsed();
                frame.received = received.load(Ordering::Relaxed);
                frame.delta = frame.received;
                frame.interval = elapsed;
                frame.elapsed = elapsed;
                frame.finished = initial + frame.received >= total;
                draw(&mut out, &term, &frame);
                let _ = writeln!(out);
            });
        match handle {
            Ok(handle) => Some(Self {
                stop,
                handle: Some(handle),
            }),
            Err(e) => {
                tracing::warn!("cannot start progress reporter: {}", e);
                None
            }
        }
    }

    /// Prints the final frame and a newline, then waits for the thread.
    pub fn stop(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.finish();
    }
}

fn draw(out: &mut std::io::Stdout, term: &console::Term, frame: &Frame) {
    let (_, cols) = term.size();
    let line = render(frame, cols as usize);
    let _ = write!(out, "\r{}", line);
    let _ = out.flush();
}
