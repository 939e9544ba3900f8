//! Process signals that end the server or a client session.

use std::io;

/// Interrupt and terminate listeners.
///
/// Installing them up front means a signal that arrives while the caller is
/// busy elsewhere is buffered and seen by the next [`ExitSignals::recv`].
pub struct ExitSignals {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

/// Which signal ended the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSignal {
    Interrupt,
    Terminate,
}

impl ExitSignals {
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(windows)]
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    /// Waits for the next interrupt or terminate signal. Cancel safe.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> ExitSignal {
        tokio::select! {
            _ = self.interrupt.recv() => ExitSignal::Interrupt,
            _ = self.terminate.recv() => ExitSignal::Terminate,
        }
    }

    #[cfg(windows)]
    pub async fn recv(&mut self) -> ExitSignal {
        self.ctrl_c.recv().await;
        ExitSignal::Interrupt
    }
}
