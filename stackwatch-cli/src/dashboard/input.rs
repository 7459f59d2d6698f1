use std::io::Read;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use stackwatch_core::keys::{Key, KeyDecoder};
use stackwatch_core::runtime::ServiceAction;

/// How long to wait for the rest of an escape sequence
const ESCAPE_TIMEOUT: Duration = Duration::from_millis(10);

/// Background operation started from the keyboard
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Job {
    Service(ServiceAction),
    StackUp,
    StackDown,
}

impl Job {
    pub fn label(&self) -> &'static str {
        match self {
            Job::Service(action) => action.label(),
            Job::StackUp => "Stack up",
            Job::StackDown => "Stack down",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    MoveUp,
    MoveDown,
    TogglePause,
    OpenUrl,
    Run(Job),
    Quit,
}

impl Action {
    pub fn from_key(key: &Key) -> Option<Self> {
        let action = match key {
            Key::Up | Key::Char('k') => Action::MoveUp,
            Key::Down | Key::Char('j') => Action::MoveDown,
            Key::Char('p') => Action::TogglePause,
            Key::Char('o') => Action::OpenUrl,
            Key::Char('u') => Action::Run(Job::Service(ServiceAction::Up)),
            Key::Char('r') => Action::Run(Job::Service(ServiceAction::Restart)),
            Key::Char('s') => Action::Run(Job::Service(ServiceAction::Stop)),
            Key::Char('d') => Action::Run(Job::Service(ServiceAction::Remove)),
            Key::Char('U') => Action::Run(Job::StackUp),
            Key::Char('D') => Action::Run(Job::StackDown),
            Key::Char('q') | Key::CtrlC => Action::Quit,
            _ => return None,
        };
        Some(action)
    }
}

/// Raw stdin bytes decoded into keys.
///
/// A plain thread does the blocking reads and hands bytes over a channel.
/// It is never joined; it ends with the process.
pub struct InputReader {
    rx: mpsc::UnboundedReceiver<u8>,
    decoder: KeyDecoder,
    closed: bool,
}

impl InputReader {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut buf = [0u8; 64];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        for byte in &buf[..n] {
                            if tx.send(*byte).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed");
                        break;
                    }
                }
            }
        });
        Self::from_channel(rx)
    }

    fn from_channel(rx: mpsc::UnboundedReceiver<u8>) -> Self {
        Self {
            rx,
            decoder: KeyDecoder::new(),
            closed: false,
        }
    }

    /// Next key, or `None` if nothing complete arrived within `wait`
    pub async fn next_key(&mut self, wait: Duration) -> Option<Key> {
        if self.closed {
            tokio::time::sleep(wait).await;
            return None;
        }

        let deadline = Instant::now() + wait;
        loop {
            let timeout = if self.decoder.is_pending() {
                ESCAPE_TIMEOUT
            } else {
                deadline.saturating_duration_since(Instant::now())
            };

            match tokio::time::timeout(timeout, self.rx.recv()).await {
                Ok(Some(byte)) => {
                    if let Some(key) = self.decoder.feed(byte) {
                        return Some(key);
                    }
                }
                Ok(None) => {
                    self.closed = true;
                    return self.decoder.flush();
                }
                Err(_) => return self.decoder.flush(),
            }
        }
    }
}
