//! Sequential playback of a list of tracks

use tokio::sync::watch;
use tonearm_playback::{PlaybackEngine, PlaybackNotification, PlaybackPhase, Track};

/// Outcome of a `play_all` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayReport {
    /// Tracks played to their end
    pub finished: usize,
    /// Tracks that failed to load or failed while playing
    pub skipped: usize,
}

/// Play `tracks` in order until the list is exhausted or `stop` fires
///
/// A track that fails to load or to play is logged and skipped.
pub async fn play_all(
    engine: &PlaybackEngine,
    tracks: Vec<Track>,
    mut stop: watch::Receiver<bool>,
) -> anyhow::Result<PlayReport> {
    let mut report = PlayReport::default();
    let mut subscription = engine.subscribe();

    for (index, track) in tracks.into_iter().enumerate() {
        tracing::info!(index, locator = %track.stream_locator, "Playing");

        if let Err(e) = engine.load_and_play(track.clone()).await {
            tracing::warn!(error = %e, locator = %track.stream_locator, "Skipping track");
            report.skipped += 1;
            continue;
        }

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        return Ok(report);
                    }
                }
                notification = subscription.recv() => match notification {
                    Some(PlaybackNotification::TrackFinished { track: finished })
                        if finished.same_stream(&track) =>
                    {
                        tracing::info!(locator = %finished.stream_locator, "Finished");
                        report.finished += 1;
                        break;
                    }
                    Some(PlaybackNotification::StateChanged { state }) => {
                        let current = state
                            .current_track
                            .as_ref()
                            .is_some_and(|t| t.same_stream(&track));
                        // Notifications of earlier tracks may still be queued
                        if !current {
                            continue;
                        }
                        if let PlaybackPhase::Failed(reason) = &state.phase {
                            tracing::warn!(
                                kind = ?reason.kind,
                                message = %reason.message,
                                "Playback failed"
                            );
                            report.skipped += 1;
                            break;
                        }
                        tracing::debug!(
                            phase = ?state.phase,
                            position = state.position_seconds,
                            duration = state.duration_seconds,
                            "State"
                        );
                    }
                    Some(PlaybackNotification::TrackFinished { .. }) => {}
                    None => anyhow::bail!("playback engine stopped"),
                },
            }
        }
    }

    Ok(report)
}
