//! Session controller - debounced flushing of local clicks.
//!
//! A [`ClickSession`] is created on sign-in and discarded on sign-out. It
//! runs one driver task that owns the accumulator, the debounce timer,
//! and the counter subscription, and publishes the view state through a
//! watch channel. Execution is cooperative: the driver awaits at most one
//! remote call at a time, so at most one flush is ever outstanding.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tally_engine::{ClickAccumulator, Clicks, Delta, Initials};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result, StoreError};
use crate::identity::{IdentityProvider, UserProfile};
use crate::store::{CounterSnapshot, CounterSubscription, DocumentStore};

/// View state published to the UI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    /// The count to display: confirmed plus optimistic clicks.
    pub displayed: Clicks,
    /// Whether any clicks are still unsettled ("saving...").
    pub syncing: bool,
    /// Current normalized initials, if any.
    pub initials: Option<String>,
    /// Last dismissable status message.
    pub status: Option<String>,
}

enum Command {
    Click,
    Flush {
        amount: Option<Delta>,
    },
    SetInitials {
        raw: String,
        reply: oneshot::Sender<Result<Initials>>,
    },
    DismissStatus,
    SignOut {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Handle to a running session.
///
/// Cheap to use from UI callbacks; all work happens on the driver task.
/// Dropping the handle without [`sign_out`](Self::sign_out) still flushes
/// unsent clicks best-effort, but does not sign the user out.
pub struct ClickSession {
    cmd_tx: mpsc::UnboundedSender<Command>,
    view_rx: watch::Receiver<SessionView>,
    saving_initials: Arc<AtomicBool>,
}

impl ClickSession {
    /// Start a session for a signed-in user.
    ///
    /// Spawns the driver task, which lazily creates the user's counter
    /// record, syncs initials from the profile, and subscribes to live
    /// updates. An initial read failure is published as status; the
    /// session stays interactive with the count at zero.
    pub fn start<I, S>(
        identity: Arc<I>,
        store: Arc<S>,
        user: UserProfile,
        config: ClientConfig,
    ) -> Self
    where
        I: IdentityProvider + 'static,
        S: DocumentStore + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(SessionView::default());

        tracing::info!(uid = %user.uid, "session starting");
        tokio::spawn(drive(identity, store, user, config, cmd_rx, view_tx));

        Self {
            cmd_tx,
            view_rx,
            saving_initials: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Record one local click. Always succeeds while the session runs;
    /// there is no remote side effect beyond (re)starting the debounce
    /// timer.
    pub fn record_click(&self) -> Result<()> {
        self.cmd_tx
            .send(Command::Click)
            .map_err(|_| ClientError::SessionClosed)
    }

    /// Trigger a flush of up to `amount` pending clicks (default: all).
    ///
    /// Dropped (not queued) if a flush is already outstanding. Failures
    /// surface on the view's status, not here.
    pub fn flush(&self, amount: Option<Delta>) -> Result<()> {
        self.cmd_tx
            .send(Command::Flush { amount })
            .map_err(|_| ClientError::SessionClosed)
    }

    /// Validate, normalize, and persist new initials.
    ///
    /// Rejects with [`ClientError::SaveInProgress`] while a previous save
    /// is still awaited, preventing double submission.
    pub async fn set_initials(&self, raw: &str) -> Result<Initials> {
        if self.saving_initials.swap(true, Ordering::SeqCst) {
            return Err(ClientError::SaveInProgress);
        }

        let result = self.set_initials_inner(raw).await;
        self.saving_initials.store(false, Ordering::SeqCst);
        result
    }

    async fn set_initials_inner(&self, raw: &str) -> Result<Initials> {
        let (reply, response) = oneshot::channel();
        self.cmd_tx
            .send(Command::SetInitials {
                raw: raw.to_string(),
                reply,
            })
            .map_err(|_| ClientError::SessionClosed)?;
        response.await.map_err(|_| ClientError::SessionClosed)?
    }

    /// Clear the current status message.
    pub fn dismiss_status(&self) -> Result<()> {
        self.cmd_tx
            .send(Command::DismissStatus)
            .map_err(|_| ClientError::SessionClosed)
    }

    /// Watch the published view state.
    pub fn view(&self) -> watch::Receiver<SessionView> {
        self.view_rx.clone()
    }

    /// The current view state.
    pub fn current_view(&self) -> SessionView {
        self.view_rx.borrow().clone()
    }

    /// End the session: final flush attempt, subscription release, state
    /// reset, provider sign-out - in that order, synchronously awaited.
    ///
    /// A flush or provider failure is returned for surfacing, but the
    /// session is closed and local state cleared either way.
    pub async fn sign_out(self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.cmd_tx
            .send(Command::SignOut { reply })
            .map_err(|_| ClientError::SessionClosed)?;
        response.await.map_err(|_| ClientError::SessionClosed)?
    }
}

/// The driver task: owns accumulator, debounce deadline, and subscription.
async fn drive<I, S>(
    identity: Arc<I>,
    store: Arc<S>,
    user: UserProfile,
    config: ClientConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    view_tx: watch::Sender<SessionView>,
) where
    I: IdentityProvider + 'static,
    S: DocumentStore + 'static,
{
    let mut acc = ClickAccumulator::new();
    let mut status: Option<String> = None;
    let mut initials = user
        .display_name
        .as_deref()
        .and_then(|name| Initials::parse(name).ok());

    // Lazily create the record, seed the confirmed count, and keep the
    // record's initials in sync for leaderboard display.
    match store.get_counter(&user.uid).await {
        Ok(Some(doc)) => {
            acc = ClickAccumulator::with_remote(doc.clicks);
            if let Some(initials) = &initials {
                if doc.initials.as_deref() != Some(initials.as_str()) {
                    if let Err(e) = store.set_initials(&user.uid, initials.as_str()).await {
                        tracing::warn!(uid = %user.uid, error = %e, "failed to sync initials");
                    }
                }
            }
        }
        Ok(None) => {
            let tag = initials.as_ref().map(|i| i.as_str());
            if let Err(e) = store.create_counter(&user.uid, tag).await {
                status = Some(ClientError::Init(e).to_string());
            }
        }
        Err(e) => {
            status = Some(ClientError::Init(e).to_string());
        }
    }

    let mut sub = Some(store.subscribe_counter(&user.uid));
    let mut deadline: Option<Instant> = None;
    publish(&view_tx, &acc, &initials, &status);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Click) => {
                    acc.record_click();
                    // Reset, not stack: only the most recent idle point flushes.
                    deadline = Some(Instant::now() + config.debounce_window);
                    publish(&view_tx, &acc, &initials, &status);
                }
                Some(Command::Flush { amount }) => {
                    deadline = None;
                    match run_flush(store.as_ref(), &user, &initials, &mut acc, amount).await {
                        // A clamped flush never strands a residue: anything
                        // still pending re-arms the timer without needing
                        // another click.
                        Ok(_) => deadline = rearm(&acc, &config),
                        // Failures wait for the next trigger.
                        Err(e) => status = Some(e.to_string()),
                    }
                    publish(&view_tx, &acc, &initials, &status);
                }
                Some(Command::SetInitials { raw, reply }) => {
                    let result = save_initials(identity.as_ref(), store.as_ref(), &user.uid, &raw).await;
                    if let Ok(saved) = &result {
                        initials = Some(saved.clone());
                        publish(&view_tx, &acc, &initials, &status);
                    }
                    let _ = reply.send(result);
                }
                Some(Command::DismissStatus) => {
                    status = None;
                    publish(&view_tx, &acc, &initials, &status);
                }
                Some(Command::SignOut { reply }) => {
                    deadline = None;
                    // Flush unsent clicks before the session is cleared.
                    let flush_result =
                        run_flush(store.as_ref(), &user, &initials, &mut acc, None).await;

                    // Release live updates before resetting local state so a
                    // late notification cannot resurrect counts for the wrong
                    // user.
                    drop(sub.take());
                    acc.reset();
                    status = None;
                    publish(&view_tx, &acc, &initials, &status);

                    let result = match identity.sign_out(&user.uid).await {
                        Err(e) => Err(ClientError::SignOut(e)),
                        Ok(()) => flush_result.map(|_| ()),
                    };
                    tracing::info!(uid = %user.uid, ok = result.is_ok(), "session signed out");
                    let _ = reply.send(result);
                    break;
                }
                None => {
                    // Handle dropped: flush best-effort and shut down.
                    if let Err(e) =
                        run_flush(store.as_ref(), &user, &initials, &mut acc, None).await
                    {
                        tracing::warn!(uid = %user.uid, error = %e, "final flush failed");
                    }
                    drop(sub.take());
                    break;
                }
            },

            event = next_event(&mut sub) => match event {
                Some(Ok(snap)) => {
                    reconcile(&mut acc, &snap, &user.uid);
                    publish(&view_tx, &acc, &initials, &status);
                }
                Some(Err(e)) => {
                    status = Some(ClientError::Subscription(e).to_string());
                    publish(&view_tx, &acc, &initials, &status);
                }
                None => {
                    sub = None;
                    status = Some("live updates ended".to_string());
                    publish(&view_tx, &acc, &initials, &status);
                }
            },

            _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                deadline = None;
                // Re-read the pending amount now, not at schedule time.
                match run_flush(store.as_ref(), &user, &initials, &mut acc, None).await {
                    Ok(_) => deadline = rearm(&acc, &config),
                    Err(e) => status = Some(e.to_string()),
                }
                publish(&view_tx, &acc, &initials, &status);
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn next_event(
    sub: &mut Option<CounterSubscription>,
) -> Option<std::result::Result<CounterSnapshot, StoreError>> {
    match sub {
        Some(sub) => sub.next().await,
        None => std::future::pending().await,
    }
}

/// Apply one live-update notification to the accumulator.
fn reconcile(acc: &mut ClickAccumulator, snap: &CounterSnapshot, uid: &str) {
    if acc.observe(snap.doc.clicks, snap.origin) {
        tracing::trace!(uid = %uid, clicks = snap.doc.clicks, "confirmed count applied");
    }
}

/// Move up to `requested` pending clicks into one remote increment.
///
/// Single-flight and clamping live in the accumulator; this only does the
/// IO and the failure restore.
async fn run_flush<S: DocumentStore>(
    store: &S,
    user: &UserProfile,
    initials: &Option<Initials>,
    acc: &mut ClickAccumulator,
    requested: Option<Delta>,
) -> Result<Option<Delta>> {
    let Some(amount) = acc.begin_flush(requested) else {
        return Ok(None);
    };

    let tag = initials.as_ref().map(|i| i.as_str());
    tracing::debug!(uid = %user.uid, amount, "flushing clicks");

    match store.increment_clicks(&user.uid, amount, tag).await {
        Ok(()) => {
            acc.complete_flush();
            Ok(Some(amount))
        }
        Err(e) => {
            acc.abort_flush();
            tracing::warn!(
                uid = %user.uid,
                amount,
                error = %e,
                "flush failed; clicks restored to pending"
            );
            Err(ClientError::Flush(e))
        }
    }
}

/// Normalize, validate, and persist initials to both collaborators.
async fn save_initials<I, S>(
    identity: &I,
    store: &S,
    uid: &str,
    raw: &str,
) -> Result<Initials>
where
    I: IdentityProvider,
    S: DocumentStore,
{
    let initials = Initials::parse(raw)?;

    identity
        .update_display_name(uid, initials.as_str())
        .await
        .map_err(ClientError::Initials)?;

    // Mirror into the counter record for leaderboard display.
    store
        .set_initials(uid, initials.as_str())
        .await
        .map_err(ClientError::Initials)?;

    Ok(initials)
}

fn publish(
    view_tx: &watch::Sender<SessionView>,
    acc: &ClickAccumulator,
    initials: &Option<Initials>,
    status: &Option<String>,
) {
    let _ = view_tx.send(SessionView {
        displayed: acc.displayed(),
        syncing: acc.unsynced() > 0,
        initials: initials.as_ref().map(|i| i.as_str().to_string()),
        status: status.clone(),
    });
}

fn rearm(acc: &ClickAccumulator, config: &ClientConfig) -> Option<Instant> {
    (acc.pending() > 0).then(|| Instant::now() + config.debounce_window)
}
