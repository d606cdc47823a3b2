//! Face landmark overlay.
//!
//! The landmark model itself lives behind [`FaceDetector`]. The overlay keeps
//! the most recent face, maps landmarks into the mirrored preview and lets the
//! user pick individual points by clicking near them.

use crate::errors::CameraError;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Pick radius in canvas pixels.
pub const DEFAULT_PICK_DISTANCE: f32 = 12.0;

/// A landmark in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }
}

#[allow(async_fn_in_trait)]
pub trait FaceDetector {
    /// Load the model. Called once before the first `detect`.
    async fn init(&mut self) -> Result<(), CameraError>;

    /// Landmarks of the first face in `frame`, if any.
    fn detect(&mut self, frame: &RgbImage, timestamp_ms: f64) -> Option<Vec<Landmark>>;
}

#[derive(Debug, Default)]
pub struct FaceOverlay {
    last_face: Option<Vec<Landmark>>,
    selected: BTreeSet<usize>,
}

impl FaceOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run detection on `frame` and remember the result. A frame without a
    /// face clears the last face; selections are kept.
    pub fn process_frame<D: FaceDetector>(
        &mut self,
        detector: &mut D,
        frame: &RgbImage,
        timestamp_ms: f64,
    ) -> Option<&[Landmark]> {
        self.last_face = detector.detect(frame, timestamp_ms);
        self.last_face.as_deref()
    }

    pub fn last_face(&self) -> Option<&[Landmark]> {
        self.last_face.as_deref()
    }

    pub fn selected_indices(&self) -> &BTreeSet<usize> {
        &self.selected
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Toggle the landmark nearest to the click at (`x`, `y`) on a mirrored
    /// canvas of `width` x `height`. Returns the toggled index, or `None`
    /// when no landmark lies within `max_distance`.
    pub fn toggle_selection_at(
        &mut self,
        width: u32,
        height: u32,
        x: f32,
        y: f32,
        max_distance: f32,
    ) -> Option<usize> {
        let face = self.last_face.as_ref()?;
        let unmirrored_x = width as f32 - x;
        let limit = max_distance * max_distance;

        // Ties go to the later landmark.
        let (index, _) = face
            .iter()
            .enumerate()
            .map(|(index, point)| {
                let dx = point.x * width as f32 - unmirrored_x;
                let dy = point.y * height as f32 - y;
                (index, dx * dx + dy * dy)
            })
            .filter(|(_, distance)| *distance <= limit)
            .fold(None, |closest: Option<(usize, f32)>, candidate| match closest {
                Some(best) if best.1 < candidate.1 => Some(best),
                _ => Some(candidate),
            })?;

        if !self.selected.remove(&index) {
            self.selected.insert(index);
        }
        Some(index)
    }

    /// Canvas positions of the selected landmarks in the mirrored preview.
    pub fn selected_points(&self, width: u32, height: u32) -> Vec<(usize, f32, f32)> {
        let Some(face) = &self.last_face else {
            return Vec::new();
        };
        self.selected
            .iter()
            .filter_map(|&index| {
                face.get(index).map(|point| {
                    (
                        index,
                        width as f32 - point.x * width as f32,
                        point.y * height as f32,
                    )
                })
            })
            .collect()
    }
}

/// Horizontally flipped copy of `frame`, as shown in a selfie preview.
pub fn mirrored_preview(frame: &RgbImage) -> RgbImage {
    image::imageops::flip_horizontal(frame)
}
