//! Cooperative interruption of waits on the backend.

use tokio::sync::watch;

/// Observed by every wait in the core; fires once and stays fired.
#[derive(Debug, Clone)]
pub struct Interrupt {
    rx: watch::Receiver<bool>,
}

/// The sending half of an [`Interrupt`], held by whoever may abort the build.
#[derive(Debug)]
pub struct InterruptTrigger {
    tx: watch::Sender<bool>,
}

impl Interrupt {
    /// Creates a linked trigger/interrupt pair.
    pub fn new() -> (InterruptTrigger, Interrupt) {
        let (tx, rx) = watch::channel(false);
        (InterruptTrigger { tx }, Interrupt { rx })
    }

    /// An interrupt that never fires, for background work.
    pub fn never() -> Interrupt {
        let (_tx, rx) = watch::channel(false);
        Interrupt { rx }
    }

    pub fn is_interrupted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes once the interrupt has fired. Pending forever if it cannot fire.
    pub async fn interrupted(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl InterruptTrigger {
    pub fn interrupt(&self) {
        self.tx.send_replace(true);
    }
}
