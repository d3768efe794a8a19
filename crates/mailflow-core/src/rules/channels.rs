//! Action event channels
//!
//! Three typed rendezvous channels (`drop`, `send`, `accept`) carry the
//! decisions of one evaluation to a consumer. A send completes only once
//! the consumer has taken the value, so the consumer sees events one at a
//! time and in exactly the order they were produced.

use mailflow_common::{Email, Error, Result};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// The message should be dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionDrop {
    /// `true` when a rule dropped the message, `false` when no rule matched
    pub dropped_by_rule: bool,
}

/// The message should be forwarded to `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionSend {
    pub to: String,
    pub email: Email,
}

/// One event received from any of the three channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ActionEvent {
    Drop(ActionDrop),
    Send(ActionSend),
    Accept { accepted: bool },
}

struct Handoff<T> {
    value: T,
    taken: oneshot::Sender<()>,
}

/// Sending half of a rendezvous channel
pub struct RendezvousSender<T> {
    tx: mpsc::Sender<Handoff<T>>,
}

/// Receiving half of a rendezvous channel
pub struct RendezvousReceiver<T> {
    rx: mpsc::Receiver<Handoff<T>>,
}

/// Create a channel whose sends wait until the value has been received
pub fn rendezvous<T>() -> (RendezvousSender<T>, RendezvousReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (RendezvousSender { tx }, RendezvousReceiver { rx })
}

impl<T> RendezvousSender<T> {
    /// Hand `value` over, waiting until the receiver has taken it.
    ///
    /// Returns `false` if the receiver went away before taking it.
    pub async fn send(&self, value: T) -> bool {
        let (taken, was_taken) = oneshot::channel();
        if self.tx.send(Handoff { value, taken }).await.is_err() {
            return false;
        }
        was_taken.await.is_ok()
    }
}

impl<T> RendezvousReceiver<T> {
    /// Take the next value, releasing the waiting sender.
    ///
    /// Values whose sender gave up (timed out or cancelled) are discarded.
    /// Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let handoff = self.rx.recv().await?;
            if handoff.taken.send(()).is_ok() {
                return Some(handoff.value);
            }
        }
    }
}

/// Producer side of the three action channels
pub struct ActionSenders {
    drop: RendezvousSender<ActionDrop>,
    send: RendezvousSender<ActionSend>,
    accept: RendezvousSender<bool>,
    cancel: CancellationToken,
    send_timeout: Option<Duration>,
}

/// Consumer side of the three action channels
pub struct ActionReceivers {
    pub drop: RendezvousReceiver<ActionDrop>,
    pub send: RendezvousReceiver<ActionSend>,
    pub accept: RendezvousReceiver<bool>,
}

/// Create a fresh channel bundle for one evaluation
pub fn action_channels() -> (ActionSenders, ActionReceivers) {
    let (drop_tx, drop_rx) = rendezvous();
    let (send_tx, send_rx) = rendezvous();
    let (accept_tx, accept_rx) = rendezvous();

    (
        ActionSenders {
            drop: drop_tx,
            send: send_tx,
            accept: accept_tx,
            cancel: CancellationToken::new(),
            send_timeout: None,
        },
        ActionReceivers {
            drop: drop_rx,
            send: send_rx,
            accept: accept_rx,
        },
    )
}

impl ActionSenders {
    /// Abort any pending or future send once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Abort a send the consumer has not taken within `timeout`
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    pub async fn emit_drop(&self, event: ActionDrop) -> Result<()> {
        self.deliver(self.drop.send(event), "drop").await
    }

    pub async fn emit_send(&self, event: ActionSend) -> Result<()> {
        self.deliver(self.send.send(event), "send").await
    }

    pub async fn emit_accept(&self, accepted: bool) -> Result<()> {
        self.deliver(self.accept.send(accepted), "accept").await
    }

    async fn deliver<F>(&self, handoff: F, channel: &'static str) -> Result<()>
    where
        F: std::future::Future<Output = bool>,
    {
        let handoff = async {
            match self.send_timeout {
                Some(timeout) => tokio::time::timeout(timeout, handoff)
                    .await
                    .map_err(|_| Error::Timeout(timeout)),
                None => Ok(handoff.await),
            }
        };

        let taken = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            taken = handoff => taken?,
        };

        if taken {
            Ok(())
        } else {
            Err(Error::ChannelClosed(channel))
        }
    }
}

impl ActionReceivers {
    /// Wait for the next event on any channel.
    ///
    /// Returns `None` once the producer has finished.
    pub async fn next(&mut self) -> Option<ActionEvent> {
        let mut drop_open = true;
        let mut send_open = true;
        let mut accept_open = true;

        while drop_open || send_open || accept_open {
            tokio::select! {
                event = self.drop.recv(), if drop_open => match event {
                    Some(event) => return Some(ActionEvent::Drop(event)),
                    None => drop_open = false,
                },
                event = self.send.recv(), if send_open => match event {
                    Some(event) => return Some(ActionEvent::Send(event)),
                    None => send_open = false,
                },
                event = self.accept.recv(), if accept_open => match event {
                    Some(accepted) => return Some(ActionEvent::Accept { accepted }),
                    None => accept_open = false,
                },
            }
        }

        None
    }

    /// Drain every event until the producer has finished
    pub async fn collect(mut self) -> Vec<ActionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_send_waits_for_receiver() {
        let (tx, mut rx) = rendezvous::<u32>();
        let delivered = Arc::new(AtomicBool::new(false));

        let flag = delivered.clone();
        let producer = tokio::spawn(async move {
            let ok = tx.send(7).await;
            flag.store(true, Ordering::SeqCst);
            ok
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!delivered.load(Ordering::SeqCst));

        assert_eq!(rx.recv().await, Some(7));
        assert!(producer.await.unwrap());
        assert!(delivered.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_send_fails_when_receiver_dropped() {
        let (senders, receivers) = action_channels();
        drop(receivers);

        let err = senders
            .emit_drop(ActionDrop {
                dropped_by_rule: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChannelClosed("drop")));
    }

    #[tokio::test]
    async fn test_next_preserves_cross_channel_order() {
        let (senders, receivers) = action_channels();

        let producer = tokio::spawn(async move {
            senders.emit_accept(true).await?;
            senders
                .emit_drop(ActionDrop {
                    dropped_by_rule: false,
                })
                .await?;
            senders.emit_accept(false).await
        });

        let events = receivers.collect().await;
        producer.await.unwrap().unwrap();

        assert_eq!(
            events,
            vec![
                ActionEvent::Accept { accepted: true },
                ActionEvent::Drop(ActionDrop {
                    dropped_by_rule: false
                }),
                ActionEvent::Accept { accepted: false },
            ]
        );
    }

    #[tokio::test]
    async fn test_cancellation_unblocks_sender() {
        let token = CancellationToken::new();
        let (senders, _receivers) = action_channels();
        let senders = senders.with_cancellation(token.clone());

        let producer = tokio::spawn(async move { senders.emit_accept(true).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        assert!(matches!(producer.await.unwrap(), Err(Error::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_event_is_not_delivered() {
        let (senders, mut receivers) = action_channels();
        let senders = senders.with_send_timeout(Duration::from_millis(10));

        let err = senders
            .emit_drop(ActionDrop {
                dropped_by_rule: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));

        drop(senders);
        assert_eq!(receivers.next().await, None);
    }

    #[tokio::test]
    async fn test_cancelled_event_is_not_delivered() {
        let token = CancellationToken::new();
        let (senders, mut receivers) = action_channels();
        let senders = senders.with_cancellation(token.clone());

        let producer = tokio::spawn(async move {
            let result = senders
                .emit_send(ActionSend {
                    to: "x@y".to_string(),
                    email: Email::default(),
                })
                .await;
            (result, senders)
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let (result, senders) = producer.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));

        drop(senders);
        assert_eq!(receivers.next().await, None);
    }

    #[tokio::test]
    async fn test_stale_event_skipped_for_next_one() {
        let (tx, mut rx) = rendezvous::<u32>();

        let aborted = tokio::time::timeout(Duration::from_millis(10), tx.send(1)).await;
        assert!(aborted.is_err());

        let producer = tokio::spawn(async move { tx.send(2).await });
        assert_eq!(rx.recv().await, Some(2));
        assert!(producer.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout() {
        let (senders, _receivers) = action_channels();
        let senders = senders.with_send_timeout(Duration::from_secs(5));

        let err = senders.emit_accept(true).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(5)));
    }
}
