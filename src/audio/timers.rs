//! Session timers.
//!
//! A timer is a spawned task that posts [`TimerFired`] into the session
//! mailbox. Dropping a [`TimerHandle`] disarms it. Because a timer can fire
//! and be disarmed before the session reads the message, every expiration
//! carries the id of the handle that produced it; the session only acts on
//! ids it still holds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::session::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    NoPlayback,
    Idle,
    AloneCheck,
    /// Armed by a voice-state change that left the bot alone.
    AloneLeave,
    Recovery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub id: u64,
}

#[derive(Debug)]
pub struct TimerHandle {
    id: u64,
    token: CancellationToken,
}

impl TimerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True when `fired` came from this handle.
    pub fn matches(&self, fired: TimerFired) -> bool {
        self.id == fired.id
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Spawns the timers of one session. Cancelling the set stops all of them.
#[derive(Debug)]
pub struct TimerSet {
    root: CancellationToken,
    mailbox: mpsc::UnboundedSender<Message>,
    next_id: AtomicU64,
}

impl TimerSet {
    pub(crate) fn new(mailbox: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            root: CancellationToken::new(),
            mailbox,
            next_id: AtomicU64::new(1),
        }
    }

    /// Fires once after `after`.
    pub fn once(&self, kind: TimerKind, after: Duration) -> TimerHandle {
        let (handle, token, fired) = self.prepare(kind);
        let mailbox = self.mailbox.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = sleep(after) => {
                    let _ = mailbox.send(Message::Timer(fired));
                }
            }
        });

        handle
    }

    /// Fires every `period`, first tick one period from now.
    pub fn every(&self, kind: TimerKind, period: Duration) -> TimerHandle {
        let (handle, token, fired) = self.prepare(kind);
        let mailbox = self.mailbox.clone();

        tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticks.tick() => {
                        if mailbox.send(Message::Timer(fired)).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        handle
    }

    pub fn cancel_all(&self) {
        debug!("⏲️ Cancelando todos los timers de la sesión");
        self.root.cancel();
    }

    fn prepare(&self, kind: TimerKind) -> (TimerHandle, CancellationToken, TimerFired) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();
        let handle = TimerHandle {
            id,
            token: token.clone(),
        };
        (handle, token, TimerFired { kind, id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_timer(message: Option<Message>) -> TimerFired {
        match message {
            Some(Message::Timer(fired)) => fired,
            other => panic!("expected a timer message, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn once_fires_after_the_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timers = TimerSet::new(tx);
        let handle = timers.once(TimerKind::Idle, Duration::from_secs(50));

        let fired = expect_timer(rx.recv().await);
        assert_eq!(fired.kind, TimerKind::Idle);
        assert!(handle.matches(fired));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_disarms() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timers = TimerSet::new(tx);
        drop(timers.once(TimerKind::NoPlayback, Duration::from_secs(35)));

        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn every_keeps_ticking_until_cancelled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timers = TimerSet::new(tx);
        let _handle = timers.every(TimerKind::AloneCheck, Duration::from_secs(50));

        assert_eq!(expect_timer(rx.recv().await).kind, TimerKind::AloneCheck);
        assert_eq!(expect_timer(rx.recv().await).kind, TimerKind::AloneCheck);

        timers.cancel_all();
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(200)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn ids_are_unique_per_handle() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let timers = TimerSet::new(tx);
        let a = timers.once(TimerKind::Idle, Duration::from_secs(1));
        let b = timers.once(TimerKind::Idle, Duration::from_secs(1));
        assert_ne!(a.id(), b.id());
        assert!(!a.matches(TimerFired { kind: TimerKind::Idle, id: b.id() }));
    }
}
