//! Device facade owning the background poll task

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use kettle_core::{KettleAction, KettleError, ModeSegment, Result, SetpointKind, StatusSnapshot};

use crate::link::KettleLink;
use crate::observer::{AvailabilityEvent, ObserverId, ObserverResult};
use crate::session::{KettleSession, SessionShared};

// ----------------------------------------------------------------------------
// Device
// ----------------------------------------------------------------------------

/// One kettle: a serialized session plus its cancellable poll loop
pub struct KettleDevice<L: KettleLink + 'static> {
    session: Arc<Mutex<KettleSession<L>>>,
    shared: Arc<SessionShared>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl<L: KettleLink + 'static> KettleDevice<L> {
    pub fn new(session: KettleSession<L>) -> Self {
        let shared = session.shared();
        Self {
            session: Arc::new(Mutex::new(session)),
            shared,
            shutdown: None,
            task: None,
        }
    }

    /// Initial connect and login
    ///
    /// Only a firmware mismatch or an unsupported model fails setup; other
    /// errors are logged and left to the poll loop to retry.
    pub async fn setup(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        match session.connect().await {
            Ok(()) => Ok(()),
            Err(e) if fails_setup(&e) => Err(e),
            Err(e) => {
                warn!("Initial kettle connection failed, polling will retry: {}", e);
                Ok(())
            }
        }
    }

    /// Spawn the poll loop; a no-op when it is already running
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let session = self.session.clone();
        self.task = Some(tokio::spawn(poll_loop(session, shutdown_rx)));
        self.shutdown = Some(shutdown_tx);
        info!(session = %self.shared.session_id(), "Kettle poll loop started");
    }

    /// Cancel the poll loop and wait for its disconnect cleanup
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Kettle poll loop ended abnormally: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn session(&self) -> Arc<Mutex<KettleSession<L>>> {
        self.session.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.shared.is_authenticated()
    }

    // ---- Commands ----

    pub async fn action(&self, name: &str) -> Result<()> {
        self.session.lock().await.action_by_name(name).await
    }

    pub async fn run_action(&self, action: KettleAction) -> Result<()> {
        self.session.lock().await.action(action).await
    }

    pub async fn set_heat_temperature(&self, value: i64) -> Result<()> {
        self.session
            .lock()
            .await
            .set_setpoint(SetpointKind::Heat, value)
            .await
    }

    pub async fn set_warm_temperature(&self, value: i64) -> Result<()> {
        self.session
            .lock()
            .await
            .set_setpoint(SetpointKind::Warm, value)
            .await
    }

    pub async fn read_mode_segment(&self, index: usize) -> Result<ModeSegment> {
        self.session.lock().await.read_mode_segment(index).await
    }

    /// Last status dispatched by the poll loop; never waits on a running tick
    pub fn status(&self) -> Option<StatusSnapshot> {
        self.shared.last_status()
    }

    // ---- Observers ----

    pub fn register_status_observer<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&StatusSnapshot) -> ObserverResult + Send + Sync + 'static,
    {
        self.shared.observers().register_status(observer)
    }

    pub fn register_availability_observer<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&AvailabilityEvent) -> ObserverResult + Send + Sync + 'static,
    {
        self.shared.observers().register_availability(observer)
    }

    pub fn unregister_observer(&self, id: ObserverId) -> bool {
        self.shared.observers().unregister(id)
    }
}

fn fails_setup(err: &KettleError) -> bool {
    err.is_firmware_mismatch() || matches!(err, KettleError::UnsupportedModel { .. })
}

// ----------------------------------------------------------------------------
// Poll Loop
// ----------------------------------------------------------------------------

/// Tick until cancelled, then disconnect
///
/// Cancellation is observed while waiting for the session, while a tick
/// runs and while sleeping; a tick cancelled mid-handshake is dropped and
/// cleanup still runs.
async fn poll_loop<L: KettleLink + 'static>(
    session: Arc<Mutex<KettleSession<L>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let outcome = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            outcome = async { session.lock().await.tick().await } => outcome,
        };

        let delay = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            delay = settle(&session, &outcome) => delay,
        };

        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = sleep(delay) => {}
        }
    }

    info!("Kettle poll loop cancelled");
    session.lock().await.disconnect().await;
}

/// Tear down a broken session and pick the delay before the next tick
async fn settle<L: KettleLink + 'static>(
    session: &Mutex<KettleSession<L>>,
    outcome: &Result<()>,
) -> Duration {
    let mut guard = session.lock().await;
    if let Err(e) = outcome {
        error!("Error in kettle poll loop: {}", e);
        if e.breaks_session() {
            guard.disconnect().await;
        }
    }
    guard.next_delay(outcome)
}
