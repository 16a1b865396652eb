//! Gain stage
//!
//! Linear gain in [0.0, 1.0]. The target level lives in an atomic so the
//! control thread can change it without waiting on the render thread.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Shared handle on the gain level
#[derive(Debug, Clone)]
pub struct GainControl {
    level: Arc<AtomicU32>,
}

impl GainControl {
    /// Create a control with the given initial level (clamped)
    pub fn new(level: f32) -> Self {
        Self {
            level: Arc::new(AtomicU32::new(level.clamp(0.0, 1.0).to_bits())),
        }
    }

    /// Set the target level, clamped to [0.0, 1.0]
    ///
    /// Returns the stored value.
    pub fn set(&self, level: f32) -> f32 {
        let level = level.clamp(0.0, 1.0);
        self.level.store(level.to_bits(), Ordering::Release);
        level
    }

    /// Current target level
    pub fn get(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Acquire))
    }
}

/// Render-side gain node
pub struct GainStage {
    control: GainControl,
    current: f32,
}

impl GainStage {
    /// Create a stage following `control`
    pub fn new(control: GainControl) -> Self {
        let current = control.get();
        Self { control, current }
    }

    /// Apply gain in-place
    ///
    /// Level changes are ramped linearly across the buffer.
    pub fn process(&mut self, buffer: &mut [f32], channels: usize) {
        let target = self.control.get();
        let channels = channels.max(1);

        if (target - self.current).abs() < f32::EPSILON {
            if target < 1.0 {
                for sample in buffer.iter_mut() {
                    *sample *= target;
                }
            }
            self.current = target;
            return;
        }

        let frames = buffer.len() / channels;
        if frames == 0 {
            return;
        }

        let step = (target - self.current) / frames as f32;
        for (index, frame) in buffer.chunks_mut(channels).enumerate() {
            let gain = self.current + step * (index + 1) as f32;
            for sample in frame {
                *sample *= gain;
            }
        }

        self.current = target;
    }
}
