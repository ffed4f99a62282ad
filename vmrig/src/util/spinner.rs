//! Terminal progress indicator for short blocking waits.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Spins on stderr until stopped or dropped.
///
/// Nothing is drawn when stderr is not a terminal.
pub struct Spinner {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Spinner {
    pub fn start(message: impl Into<String>) -> Self {
        let running = Arc::new(AtomicBool::new(true));

        let thread = if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
            let running = Arc::clone(&running);
            let message = message.into();
            Some(thread::spawn(move || {
                let mut frame = 0;
                while running.load(Ordering::Relaxed) {
                    let mut err = std::io::stderr().lock();
                    let _ = write!(err, "\r{} {}", message, FRAMES[frame % FRAMES.len()]);
                    let _ = err.flush();
                    drop(err);
                    frame += 1;
                    thread::sleep(FRAME_INTERVAL);
                }
                let _ = write!(std::io::stderr(), "\r{}\r", " ".repeat(message.len() + 2));
            }))
        } else {
            None
        };

        Self { running, thread }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        self.stop();
    }
}
