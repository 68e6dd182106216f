//! Liveness probing for an open push channel.
//!
//! A [`Heartbeat`] belongs to exactly one connection attempt. Dropping it
//! aborts its timer task, so a monitor from a superseded attempt can never
//! ping or time out against a newer connection.

use std::sync::Arc;

use tokio::{
    sync::{Notify, mpsc, watch},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::{config::HeartbeatConfig, protocol::ClientMessage};

/// Periodic `ping` sender with pong-timeout detection.
#[derive(Debug)]
pub struct Heartbeat {
    /// Last time the server proved it was alive
    last_seen_alive: watch::Sender<Instant>,
    timed_out: Arc<Notify>,
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// Start probing. `ping_tx` is the outbound queue of the open connection.
    pub fn start(config: HeartbeatConfig, ping_tx: mpsc::UnboundedSender<ClientMessage>) -> Self {
        let (last_seen_alive, alive_rx) = watch::channel(Instant::now());
        let timed_out = Arc::new(Notify::new());
        let task = tokio::spawn(probe_loop(config, ping_tx, alive_rx, timed_out.clone()));

        Self {
            last_seen_alive,
            timed_out,
            task,
        }
    }

    /// Record a `pong` from the server.
    pub fn pong_received(&self) {
        self.last_seen_alive.send_replace(Instant::now());
    }

    pub fn last_seen_alive(&self) -> Instant {
        *self.last_seen_alive.borrow()
    }

    /// Resolves once a ping went unanswered for longer than the pong timeout.
    pub async fn expired(&self) {
        self.timed_out.notified().await;
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn probe_loop(
    config: HeartbeatConfig,
    ping_tx: mpsc::UnboundedSender<ClientMessage>,
    mut alive_rx: watch::Receiver<Instant>,
    timed_out: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let sent_at = Instant::now();
        if ping_tx.send(ClientMessage::Ping).is_err() {
            tracing::debug!("Outbound queue closed, stopping heartbeat");
            return;
        }
        tracing::debug!("Ping sent");

        let answered = tokio::time::timeout(
            config.pong_timeout,
            alive_rx.wait_for(|seen| *seen >= sent_at),
        )
        .await
        .map(|seen| seen.is_ok());

        match answered {
            Ok(true) => {}
            Ok(false) => return,
            Err(_) => {
                tracing::warn!(
                    "No pong within {:?}, treating connection as dead",
                    config.pong_timeout
                );
                timed_out.notify_one();
                return;
            }
        }
    }
}
