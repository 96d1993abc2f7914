use std::{
    fmt,
    io::{self, Write},
    sync::{mpsc::Sender, Mutex, PoisonError},
};

/// Something that can show one diagnostic line to the operator.
/// Every worker and display thread writes through this, so it has to be
/// shareable across threads.
pub trait Output: Send + Sync + fmt::Debug {
    fn emit(&self, line: &str);
}

/// prints to stdout, one whole line at a time, and records it in the log
#[derive(Debug, Default)]
pub struct ConsoleOutput {
    lock: Mutex<()>,
}

impl ConsoleOutput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Output for ConsoleOutput {
    fn emit(&self, line: &str) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stdout = io::stdout().lock();
        // a closed stdout is not worth bringing down a worker for
        if let Err(e) = writeln!(stdout, "{line}").and_then(|()| stdout.flush()) {
            log::debug!("couldn't write to stdout: {e}");
        }
        log::info!("{line}");
    }
}

/// forwards every line over a channel, used to observe a running system
#[derive(Debug)]
pub struct ChannelOutput {
    sender: Mutex<Sender<String>>,
}

impl ChannelOutput {
    #[must_use]
    pub const fn new(sender: Sender<String>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

impl Output for ChannelOutput {
    fn emit(&self, line: &str) {
        log::info!("{line}");
        // receiver gone means nobody is listening anymore
        let _ = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(line.to_string());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{mpsc, Arc};

    use super::*;

    #[test]
    fn channel_output_delivers_lines_in_order() {
        let (tx, rx) = mpsc::channel();
        let output: Arc<dyn Output> = Arc::new(ChannelOutput::new(tx));
        output.emit("one");
        output.emit("two");
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), ["one", "two"]);
    }

    #[test]
    fn channel_output_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        ChannelOutput::new(tx).emit("nobody listens");
    }
}
