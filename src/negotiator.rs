//! Resolution / frame-rate negotiation.
//!
//! Asks a freshly started track for its highest resolution at the desired
//! frame rate. Cameras commonly accept that request and then deliver a much
//! lower rate, so the achieved rate is read back from the track's settings
//! and, if it is below the minimum, progressively smaller resolutions are
//! tried until one sustains it.

use crate::console::LogSink;
use crate::platform::MediaTrack;
use crate::types::{keys, NumberConstraint, NumberRange, Resolution, TrackConstraints, TrackSettings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_FALLBACK_RESOLUTIONS: [Resolution; 2] =
    [Resolution::new(1920, 1080), Resolution::new(1280, 720)];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationConfig {
    pub desired_fps: f64,
    pub min_fps: f64,
    /// Tried in order when the top resolution is too slow.
    pub fallback_resolutions: Vec<Resolution>,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            desired_fps: 30.0,
            min_fps: 30.0,
            fallback_resolutions: DEFAULT_FALLBACK_RESOLUTIONS.to_vec(),
        }
    }
}

pub struct ConstraintNegotiator {
    config: NegotiationConfig,
    logger: Arc<dyn LogSink>,
}

impl ConstraintNegotiator {
    pub fn new(config: NegotiationConfig, logger: Arc<dyn LogSink>) -> Self {
        Self { config, logger }
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// Negotiate `track` to the best resolution that keeps `min_fps`.
    ///
    /// When no fallback reaches `min_fps` the top resolution is applied again
    /// so the hardware ends where the returned settings say it is.
    ///
    /// Returns the settings of the attempt that was kept, the track's current
    /// settings when no attempt succeeded, or `None` when the track cannot
    /// report capabilities. Never fails: rejected attempts are logged.
    pub async fn negotiate<T: MediaTrack>(&self, track: &T) -> Option<TrackSettings> {
        let Some(capabilities) = track.get_capabilities() else {
            log::debug!("Track {} reports no capabilities; skipping negotiation", track.id());
            return None;
        };

        let target_fps = capabilities
            .range(keys::FRAME_RATE)
            .map(|range| range.max)
            .filter(|max| max.is_finite() && *max > 0.0)
            .map_or(self.config.desired_fps, |max| self.config.desired_fps.min(max));
        let max_resolution = capabilities.max_resolution();

        let mut attempted: Vec<Resolution> = Vec::new();
        let mut chosen = None;
        if let Some(resolution) = max_resolution {
            attempted.push(resolution);
            chosen = self.attempt(track, resolution, target_fps).await;
        }

        let starved = chosen
            .as_ref()
            .and_then(TrackSettings::frame_rate)
            .is_some_and(|fps| fps < self.config.min_fps);

        if starved {
            let mut displaced = false;
            let mut recovered = false;
            for &resolution in &self.config.fallback_resolutions {
                if max_resolution.is_some_and(|max| !resolution.fits_within(max)) {
                    continue;
                }
                if attempted.contains(&resolution) {
                    continue;
                }
                attempted.push(resolution);

                let Some(settings) = self.attempt(track, resolution, target_fps).await else {
                    continue;
                };
                displaced = true;
                if settings.frame_rate().is_some_and(|fps| fps >= self.config.min_fps) {
                    chosen = Some(settings);
                    recovered = true;
                    break;
                }
            }

            // No fallback helped: put the track back on the top resolution.
            if displaced && !recovered {
                if let Some(top) = max_resolution {
                    if let Some(settings) = self.attempt(track, top, target_fps).await {
                        chosen = Some(settings);
                    }
                }
            }
        }

        match chosen {
            Some(settings) => {
                self.logger.info(&format!(
                    "[Camera] Negotiated {} @ {} fps",
                    settings
                        .resolution()
                        .map_or_else(|| "unknown".to_string(), |r| r.to_string()),
                    settings
                        .frame_rate()
                        .map_or_else(|| "?".to_string(), |fps| fps.to_string()),
                ));
                Some(settings)
            }
            None => track.get_settings(),
        }
    }

    /// `{width, height: {ideal, max}, frameRate: {ideal, max, min}}`
    pub fn constraints_for(&self, resolution: Resolution, target_fps: f64) -> TrackConstraints {
        TrackConstraints::new()
            .with(keys::WIDTH, NumberConstraint::ideal_max(resolution.width as f64))
            .with(keys::HEIGHT, NumberConstraint::ideal_max(resolution.height as f64))
            .with(
                keys::FRAME_RATE,
                NumberConstraint::Range(NumberRange {
                    ideal: Some(target_fps),
                    max: Some(target_fps),
                    min: Some(self.config.min_fps),
                    exact: None,
                }),
            )
    }

    async fn attempt<T: MediaTrack>(
        &self,
        track: &T,
        resolution: Resolution,
        target_fps: f64,
    ) -> Option<TrackSettings> {
        let constraints = self.constraints_for(resolution, target_fps);
        match track.apply_constraints(&constraints).await {
            Ok(()) => track.get_settings(),
            Err(e) => {
                self.logger.warn(&format!(
                    "[Camera] Could not apply {} @ {} fps: {}",
                    resolution,
                    target_fps,
                    e.reason()
                ));
                None
            }
        }
    }
}
