use std::collections::BTreeMap;
use std::f32::consts::FRAC_PI_2;

use glam::{Vec2, Vec3};

use crate::camera::Camera;
use crate::events::{TouchEvent, TouchPhase};

/// How the orbit control moves the camera.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum OrbitMode {
    /// One finger rotates, two fingers pinch to zoom.
    #[default]
    Interactive,
    /// Rotates around the target, ignoring touches.
    AutoRotate {
        /// Radians per second, counterclockwise seen from above.
        speed: f32,
    },
}

/// Orbits a camera around a target point from touch input.
///
/// # Example
/// ```
/// use gles3d::{Camera, OrbitControl, OrbitMode, Vec3};
///
/// let mut orbit = OrbitControl::new()
///     .target(Vec3::ZERO)
///     .distance(8.0)
///     .mode(OrbitMode::AutoRotate { speed: 0.5 });
/// let mut camera = Camera::new();
/// orbit.update(1.0 / 60.0);
/// orbit.apply(&mut camera);
/// assert!((camera.position.length() - 8.0).abs() < 1e-4);
/// ```
#[derive(Clone, Debug)]
pub struct OrbitControl {
    pub target: Vec3,
    pub distance: f32,
    /// Horizontal angle in radians.
    pub azimuth: f32,
    /// Vertical angle in radians, kept away from the poles.
    pub elevation: f32,
    pub mode: OrbitMode,
    /// Radians per pixel of drag.
    pub rotate_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub enabled: bool,
    touches: BTreeMap<u64, Vec2>,
    pinch: Option<f32>,
}

impl Default for OrbitControl {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 5.0,
            azimuth: 0.0,
            elevation: 0.3,
            mode: OrbitMode::Interactive,
            rotate_speed: 0.005,
            min_distance: 0.5,
            max_distance: 100.0,
            enabled: true,
            touches: BTreeMap::new(),
            pinch: None,
        }
    }
}

const ELEVATION_LIMIT: f32 = FRAC_PI_2 - 0.01;

impl OrbitControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(mut self, target: Vec3) -> Self {
        self.target = target;
        self
    }

    pub fn distance(mut self, distance: f32) -> Self {
        self.distance = distance.clamp(self.min_distance, self.max_distance);
        self
    }

    pub fn mode(mut self, mode: OrbitMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn azimuth(mut self, azimuth: f32) -> Self {
        self.azimuth = azimuth;
        self
    }

    pub fn elevation(mut self, elevation: f32) -> Self {
        self.elevation = elevation.clamp(-ELEVATION_LIMIT, ELEVATION_LIMIT);
        self
    }

    pub fn distance_limits(mut self, min: f32, max: f32) -> Self {
        self.min_distance = min;
        self.max_distance = max;
        self.distance = self.distance.clamp(min, max);
        self
    }

    /// Starts from wherever `camera` currently is.
    pub fn from_camera(camera: &Camera) -> Self {
        let offset = camera.position - camera.target;
        let distance = offset.length().max(f32::EPSILON);
        Self {
            target: camera.target,
            distance,
            azimuth: offset.x.atan2(offset.z),
            elevation: (offset.y / distance).clamp(-1.0, 1.0).asin().clamp(-ELEVATION_LIMIT, ELEVATION_LIMIT),
            ..Default::default()
        }
        .distance_limits(0.5, distance.max(100.0))
    }

    /// Feeds one touch update. Returns `true` if the orbit changed.
    pub fn handle_touch(&mut self, touch: &TouchEvent) -> bool {
        if !self.enabled || self.mode != OrbitMode::Interactive {
            return false;
        }
        let pos = Vec2::new(touch.x, touch.y);
        match touch.phase {
            TouchPhase::Begin => {
                self.touches.insert(touch.sequence, pos);
                self.pinch = self.pinch_span();
                false
            }
            TouchPhase::End => {
                self.touches.remove(&touch.sequence);
                self.pinch = self.pinch_span();
                false
            }
            TouchPhase::Move => {
                let Some(previous) = self.touches.insert(touch.sequence, pos) else {
                    return false;
                };
                match self.touches.len() {
                    1 => {
                        let delta = pos - previous;
                        self.azimuth -= delta.x * self.rotate_speed;
                        self.elevation = (self.elevation + delta.y * self.rotate_speed)
                            .clamp(-ELEVATION_LIMIT, ELEVATION_LIMIT);
                        true
                    }
                    2 => {
                        let span = self.pinch_span();
                        let changed = match (self.pinch, span) {
                            (Some(before), Some(after)) if after > f32::EPSILON => {
                                self.distance = (self.distance * before / after)
                                    .clamp(self.min_distance, self.max_distance);
                                true
                            }
                            _ => false,
                        };
                        self.pinch = span;
                        changed
                    }
                    _ => false,
                }
            }
        }
    }

    /// Advances auto-rotation.
    pub fn update(&mut self, dt: f32) {
        if let OrbitMode::AutoRotate { speed } = self.mode {
            self.azimuth += speed * dt;
        }
    }

    pub fn position(&self) -> Vec3 {
        let offset = Vec3::new(
            self.distance * self.elevation.cos() * self.azimuth.sin(),
            self.distance * self.elevation.sin(),
            self.distance * self.elevation.cos() * self.azimuth.cos(),
        );
        self.target + offset
    }

    /// Moves `camera` to the current orbit position, looking at the target.
    pub fn apply(&self, camera: &mut Camera) {
        camera.position = self.position();
        camera.target = self.target;
        camera.up = Vec3::Y;
    }

    fn pinch_span(&self) -> Option<f32> {
        let mut it = self.touches.values();
        match (it.next(), it.next()) {
            (Some(a), Some(b)) => Some(a.distance(*b)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(sequence: u64, x: f32, y: f32, phase: TouchPhase) -> TouchEvent {
        TouchEvent {
            x,
            y,
            sequence,
            phase,
        }
    }

    #[test]
    fn drag_rotates() {
        let mut orbit = OrbitControl::new();
        let az = orbit.azimuth;
        orbit.handle_touch(&touch(1, 100.0, 100.0, TouchPhase::Begin));
        assert!(orbit.handle_touch(&touch(1, 200.0, 100.0, TouchPhase::Move)));
        assert!((orbit.azimuth - (az - 0.5)).abs() < 1e-5);
    }

    #[test]
    fn pinch_out_zooms_in() {
        let mut orbit = OrbitControl::new().distance(10.0);
        orbit.handle_touch(&touch(1, 100.0, 100.0, TouchPhase::Begin));
        orbit.handle_touch(&touch(2, 200.0, 100.0, TouchPhase::Begin));
        assert!(orbit.handle_touch(&touch(2, 300.0, 100.0, TouchPhase::Move)));
        assert!((orbit.distance - 5.0).abs() < 1e-4);

        orbit.handle_touch(&touch(2, 300.0, 100.0, TouchPhase::End));
        // One finger left: moving it rotates again.
        let az = orbit.azimuth;
        orbit.handle_touch(&touch(1, 110.0, 100.0, TouchPhase::Move));
        assert!(orbit.azimuth < az);
    }

    #[test]
    fn elevation_is_clamped() {
        let mut orbit = OrbitControl::new();
        orbit.handle_touch(&touch(1, 0.0, 0.0, TouchPhase::Begin));
        orbit.handle_touch(&touch(1, 0.0, 100_000.0, TouchPhase::Move));
        assert!(orbit.elevation <= ELEVATION_LIMIT);
    }

    #[test]
    fn auto_rotate_ignores_touches() {
        let mut orbit = OrbitControl::new().mode(OrbitMode::AutoRotate { speed: 1.0 });
        orbit.handle_touch(&touch(1, 0.0, 0.0, TouchPhase::Begin));
        assert!(!orbit.handle_touch(&touch(1, 50.0, 0.0, TouchPhase::Move)));
        orbit.update(0.5);
        assert!((orbit.azimuth - 0.5).abs() < 1e-6);
    }

    #[test]
    fn from_camera_keeps_position() {
        let camera = Camera::new().at(Vec3::new(3.0, 4.0, 5.0)).looking_at(Vec3::new(0.0, 1.0, 0.0));
        let orbit = OrbitControl::from_camera(&camera);
        assert!((orbit.position() - camera.position).length() < 1e-4);
    }
}
