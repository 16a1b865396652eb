//! Playback observer bridge
//!
//! Relays engine state to external observers. Two delivery modes:
//! - latest value (`snapshot`, `watch`), never blocks
//! - push subscription delivering every transition in order

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::types::{PlaybackState, Track};

/// Notifications pushed to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaybackNotification {
    /// Engine state changed (phase, track, position, duration or volume)
    StateChanged {
        /// Full state after the change
        state: PlaybackState,
    },

    /// A track played to its end
    ///
    /// Emitted right after the `Ended` state change; a queue collaborator
    /// can use it to pick what plays next.
    TrackFinished {
        /// The finished track
        track: Track,
    },
}

/// Fan-out of engine state to observers
///
/// Pure relay: publishes exactly what the engine hands it.
#[derive(Debug)]
pub struct PlaybackObserverBridge {
    latest: watch::Sender<PlaybackState>,
    notifications: broadcast::Sender<PlaybackNotification>,
}

impl PlaybackObserverBridge {
    /// Create a bridge holding `initial` as the latest state
    ///
    /// `capacity` is the number of notifications buffered per subscriber.
    pub fn new(initial: PlaybackState, capacity: usize) -> Self {
        let (latest, _) = watch::channel(initial);
        let (notifications, _) = broadcast::channel(capacity.max(1));
        Self {
            latest,
            notifications,
        }
    }

    /// Publish a new state
    pub fn publish(&self, state: &PlaybackState) {
        self.latest.send_replace(state.clone());
        self.notifications
            .send(PlaybackNotification::StateChanged {
                state: state.clone(),
            })
            .ok();
    }

    /// Announce that `track` finished
    pub fn track_finished(&self, track: Track) {
        debug!(identity = %track.identity_key, "Track finished");
        self.notifications
            .send(PlaybackNotification::TrackFinished { track })
            .ok();
    }

    /// Latest published state
    pub fn snapshot(&self) -> PlaybackState {
        self.latest.borrow().clone()
    }

    /// Latest-value receiver (intermediate states may be skipped)
    pub fn watch(&self) -> watch::Receiver<PlaybackState> {
        self.latest.subscribe()
    }

    /// Push subscription starting from the next notification
    pub fn subscribe(&self) -> PlaybackSubscription {
        PlaybackSubscription {
            rx: self.notifications.subscribe(),
        }
    }

    /// Number of live push subscribers
    pub fn subscriber_count(&self) -> usize {
        self.notifications.receiver_count()
    }
}

/// Push subscription handed to observers
#[derive(Debug)]
pub struct PlaybackSubscription {
    rx: broadcast::Receiver<PlaybackNotification>,
}

impl PlaybackSubscription {
    /// Wait for the next notification
    ///
    /// A subscriber that falls behind skips ahead to newer notifications.
    /// Returns `None` once the engine is gone.
    pub async fn recv(&mut self) -> Option<PlaybackNotification> {
        loop {
            match self.rx.recv().await {
                Ok(notification) => return Some(notification),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Playback subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next notification if one is queued
    pub fn try_recv(&mut self) -> Option<PlaybackNotification> {
        loop {
            match self.rx.try_recv() {
                Ok(notification) => return Some(notification),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Drain all queued notifications
    pub fn drain(&mut self) -> Vec<PlaybackNotification> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlaybackPhase;

    #[test]
    fn snapshot_tracks_latest_publish() {
        let bridge = PlaybackObserverBridge::new(PlaybackState::new(0.7), 8);
        assert_eq!(bridge.snapshot().phase, PlaybackPhase::Idle);

        let mut state = bridge.snapshot();
        state.phase = PlaybackPhase::Playing;
        bridge.publish(&state);

        assert_eq!(bridge.snapshot().phase, PlaybackPhase::Playing);
    }

    #[test]
    fn publish_without_subscribers_still_updates_snapshot() {
        let bridge = PlaybackObserverBridge::new(PlaybackState::new(0.7), 8);
        assert_eq!(bridge.subscriber_count(), 0);

        let mut state = bridge.snapshot();
        state.volume = 0.1;
        bridge.publish(&state);
        assert_eq!(bridge.snapshot().volume, 0.1);
    }

    #[test]
    fn subscribers_see_every_transition_in_order() {
        let bridge = PlaybackObserverBridge::new(PlaybackState::new(0.7), 8);
        let mut subscription = bridge.subscribe();

        let mut state = bridge.snapshot();
        for phase in [PlaybackPhase::Loading, PlaybackPhase::Playing, PlaybackPhase::Ended] {
            state.phase = phase;
            bridge.publish(&state);
        }
        bridge.track_finished(Track::from_locator("/music/a.mp3"));

        let phases: Vec<_> = subscription
            .drain()
            .into_iter()
            .filter_map(|n| match n {
                PlaybackNotification::StateChanged { state } => Some(state.phase),
                PlaybackNotification::TrackFinished { .. } => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![PlaybackPhase::Loading, PlaybackPhase::Playing, PlaybackPhase::Ended]
        );
    }

    #[test]
    fn lagging_subscriber_skips_ahead() {
        let bridge = PlaybackObserverBridge::new(PlaybackState::new(0.7), 2);
        let mut subscription = bridge.subscribe();

        let mut state = bridge.snapshot();
        for i in 0..5 {
            state.position_seconds = f64::from(i);
            bridge.publish(&state);
        }

        let positions: Vec<f64> = subscription
            .drain()
            .into_iter()
            .filter_map(|n| match n {
                PlaybackNotification::StateChanged { state } => Some(state.position_seconds),
                PlaybackNotification::TrackFinished { .. } => None,
            })
            .collect();
        assert_eq!(positions, vec![3.0, 4.0]);
    }

    #[tokio::test]
    async fn recv_ends_when_bridge_dropped() {
        let bridge = PlaybackObserverBridge::new(PlaybackState::new(0.7), 8);
        let mut subscription = bridge.subscribe();
        drop(bridge);
        assert!(subscription.recv().await.is_none());
    }
}
