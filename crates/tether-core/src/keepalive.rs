//! Keep-alive failure detection.
//!
//! Two cooperating loops run against an activated link: a sender that
//! emits a heartbeat every `send_interval`, and a checker that waits
//! for inbound activity (any message, heartbeat or application) and
//! declares the link lost when `receive_timeout` passes in silence.
//!
//! Heartbeats go through the ordinary send path, so they pick up every
//! transformation the decorator stack applies to application messages
//! (encryption, framing). On the receive side they are ordinary
//! messages; the activity signal fires for all inbound traffic.
//!
//! The checker's whole purpose is converting silent unreachability
//! into an observable terminal state: on timeout it abandons the link
//! (`Activated -> Lost`, transport errors swallowed since the peer is
//! presumed gone) and disposes it. Both loops end quietly when the
//! link leaves `Activated` by any other path; a disposal race while a
//! loop is blocked waiting is normal shutdown, not a failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::LinkError;
use crate::link::Link;
use crate::state::{ConnectionState, wait_leave};

/// Keep-alive tuning knobs.
#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    /// Interval between outbound heartbeats.
    pub send_interval: Duration,
    /// Maximum inbound silence before the link is declared lost.
    /// Should comfortably exceed `send_interval`.
    pub receive_timeout: Duration,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self { send_interval: Duration::from_secs(20), receive_timeout: Duration::from_secs(60) }
    }
}

/// Handle to the two keep-alive loops guarding one link.
///
/// Dropping the handle detaches the loops without affecting the link.
pub struct KeepAlive {
    sender: JoinHandle<()>,
    checker: JoinHandle<()>,
}

impl KeepAlive {
    /// Attach keep-alive to an activated link.
    ///
    /// `heartbeat` builds the message the sender loop emits; it is
    /// called once per interval.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::InvalidState`] unless the link is
    /// `Activated`.
    pub fn attach<S, R>(
        link: Arc<dyn Link<S, R>>,
        config: KeepAliveConfig,
        heartbeat: impl Fn() -> S + Send + Sync + 'static,
    ) -> Result<Self, LinkError>
    where
        S: Send + 'static,
        R: Send + Sync + 'static,
    {
        let state = link.state();
        if state != ConnectionState::Activated {
            return Err(LinkError::not_activated("keep-alive attach", state));
        }

        let activity = Arc::new(Notify::new());
        {
            let activity = activity.clone();
            link.on_message(Arc::new(move |_| activity.notify_one()));
        }

        let sender = tokio::spawn(send_loop(link.clone(), config.send_interval, heartbeat));
        let checker = tokio::spawn(check_loop(link, config.receive_timeout, activity));

        Ok(Self { sender, checker })
    }

    /// Stop both loops without affecting the link.
    pub fn detach(self) {
        // Drop aborts the handles.
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.sender.abort();
        self.checker.abort();
    }
}

async fn send_loop<S, R>(
    link: Arc<dyn Link<S, R>>,
    every: Duration,
    heartbeat: impl Fn() -> S,
) where
    S: Send + 'static,
    R: Send + Sync + 'static,
{
    let mut state = link.watch_state();
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; consume it so heartbeats start
    // one interval after attach.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match link.send(heartbeat()).await {
                    Ok(()) => tracing::trace!("heartbeat sent"),
                    Err(error) if error.is_invalid_state() => break,
                    Err(error) => {
                        // The checker converts persistent silence into
                        // loss; a failed heartbeat alone is not proof.
                        tracing::debug!(%error, "heartbeat send failed");
                    },
                }
            }
            () = wait_leave(&mut state, ConnectionState::Activated) => break,
        }
    }
}

async fn check_loop<S, R>(link: Arc<dyn Link<S, R>>, timeout: Duration, activity: Arc<Notify>)
where
    S: Send + 'static,
    R: Send + Sync + 'static,
{
    let mut state = link.watch_state();
    loop {
        tokio::select! {
            () = activity.notified() => {
                // Inbound traffic: the peer is alive, wait again.
            }
            () = wait_leave(&mut state, ConnectionState::Activated) => return,
            () = tokio::time::sleep(timeout) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "no inbound activity within receive timeout; declaring link lost"
                );
                link.abandon().await;
                link.dispose().await;
                return;
            }
        }
    }
}
