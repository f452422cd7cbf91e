//! Process shutdown broadcast.

use tokio::sync::watch;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShutdownEvent {
    Pending,
    CtrlC,
    SigTerm,
    ListenerFailed,
    Requested,
}

/// Sending half; fires at most one meaningful event.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<ShutdownEvent>,
}

/// Receiving half, cloned into every long-lived task.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<ShutdownEvent>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(ShutdownEvent::Pending);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self, event: ShutdownEvent) {
        debug_assert!(event != ShutdownEvent::Pending);
        if let Err(error) = self.tx.send(event) {
            tracing::debug!(?event, %error, "no shutdown listeners left");
        }
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }

    /// Fires on the first Ctrl+C or SIGTERM.
    pub fn trigger_on_signal(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let event = wait_for_signal().await;
            tracing::info!(?event, "shutdown signal received");
            self.trigger(event);
        })
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() != ShutdownEvent::Pending
    }

    /// Resolves once shutdown has been requested. Never resolves if the
    /// trigger is dropped without firing.
    pub async fn wait(&mut self) -> ShutdownEvent {
        loop {
            let event = *self.rx.borrow_and_update();
            if event != ShutdownEvent::Pending {
                return event;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

pub async fn wait_for_signal() -> ShutdownEvent {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ShutdownEvent::CtrlC,
            Err(error) => {
                tracing::warn!(%error, "failed to capture Ctrl+C signal");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => match term.recv().await {
                Some(_) => ShutdownEvent::SigTerm,
                None => ShutdownEvent::ListenerFailed,
            },
            Err(error) => {
                tracing::warn!(%error, "failed to capture SIGTERM");
                ShutdownEvent::ListenerFailed
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending();

    tokio::select! {
        event = ctrl_c => event,
        event = sigterm => event,
    }
}
