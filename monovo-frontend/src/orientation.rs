//! Accumulated view orientation driven by per-frame rotation readings

use nalgebra::{UnitQuaternion, Vector3};

/// Component-wise `(current - previous) * scale`
pub fn rotation_delta(
    current: &Vector3<f32>,
    previous: &Vector3<f32>,
    scale: f32,
) -> Vector3<f32> {
    (current - previous) * scale
}

/// Camera orientation plus the last rotation reading it was updated from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewOrientation {
    pub orientation: UnitQuaternion<f32>,
    pub enabled: bool,
    pub previous_rotation: Option<Vector3<f32>>,
}

impl Default for ViewOrientation {
    fn default() -> Self {
        Self {
            orientation: UnitQuaternion::identity(),
            enabled: true,
            previous_rotation: None,
        }
    }
}

impl ViewOrientation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Rotate about the camera's own axes: Y by `-delta.x`, then X by
    /// `delta.y`, then Z by `delta.z` (radians)
    pub fn apply_rotation_delta(mut self, delta: &Vector3<f32>) -> Self {
        let yaw = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), -delta.x);
        let pitch = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), delta.y);
        let roll = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), delta.z);
        self.orientation = self.orientation * yaw * pitch * roll;
        self
    }

    /// Feed one rotation reading.
    ///
    /// The delta against the previous reading is applied only while enabled
    /// and once a previous reading exists. The reading always becomes the new
    /// previous one.
    pub fn update(mut self, rotation: Option<Vector3<f32>>) -> Self {
        let Some(current) = rotation else {
            return self;
        };
        if self.enabled {
            if let Some(previous) = self.previous_rotation {
                let delta = rotation_delta(&current, &previous, 1.0);
                self = self.apply_rotation_delta(&delta);
            }
        }
        self.previous_rotation = Some(current);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_rotation_delta_scales_difference() {
        let delta = rotation_delta(
            &Vector3::new(1.0, 2.0, 3.0),
            &Vector3::new(0.5, 2.5, 0.0),
            2.0,
        );
        assert_abs_diff_eq!(delta, Vector3::new(1.0, -1.0, 6.0), epsilon = 1e-6);
    }

    #[test]
    fn test_first_reading_only_primes_state() {
        let view = ViewOrientation::new().update(Some(Vector3::new(0.3, 0.2, 0.1)));
        assert_eq!(view.orientation, UnitQuaternion::identity());
        assert_eq!(view.previous_rotation, Some(Vector3::new(0.3, 0.2, 0.1)));
    }

    #[test]
    fn test_yaw_delta_rotates_about_negative_y() {
        let view = ViewOrientation::new()
            .update(Some(Vector3::zeros()))
            .update(Some(Vector3::new(FRAC_PI_2, 0.0, 0.0)));

        // -90 degrees about Y sends +X to +Z
        let forward = view.orientation * Vector3::x();
        assert_abs_diff_eq!(forward, Vector3::z(), epsilon = 1e-5);
    }

    #[test]
    fn test_axes_are_applied_in_local_frame() {
        let delta = Vector3::new(-FRAC_PI_2, FRAC_PI_2, 0.0);
        let view = ViewOrientation::new().apply_rotation_delta(&delta);

        let expected = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2);
        assert_abs_diff_eq!(view.orientation.angle_to(&expected), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_disabled_view_ignores_updates() {
        let view = ViewOrientation::new()
            .with_enabled(false)
            .update(Some(Vector3::zeros()))
            .update(Some(Vector3::new(1.0, 1.0, 1.0)));
        assert_eq!(view.orientation, UnitQuaternion::identity());
        assert_eq!(view.previous_rotation, Some(Vector3::new(1.0, 1.0, 1.0)));
    }

    #[test]
    fn test_missing_reading_is_skipped() {
        let primed = ViewOrientation::new().update(Some(Vector3::new(0.1, 0.0, 0.0)));
        let view = primed.update(None);
        assert_eq!(view, primed);
    }
}
