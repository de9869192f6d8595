/*
MIT License

Copyright (c) 2021, 2022, 2024, 2025 Vincent Hiribarren

Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:

The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.

THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

use cgmath::{ElementWise, EuclideanSpace, Point3, Vector3};
use rayon::iter::{IndexedParallelIterator, ParallelIterator};
use rayon::slice::ParallelSliceMut;

use crate::device::{DepthDevice, ImageResolution};

/// Depth image size the point cloud is sampled at.
pub const KINECT_SIZE: ImageResolution = ImageResolution::Res640x480;

/// Frames between two start attempts while the device is not capturing.
pub const RETRY_INTERVAL_FRAMES: u64 = 90;

/// Applied to every point before centering. Flips the y axis, image rows
/// growing downward.
pub const POINT_SCALE: [f32; 3] = [1.1, -1.1, 1.0];

/// Multiplies normalized depth times the eye distance.
pub const DEPTH_SCALE: f32 = -3.0;

/// Slope of the color ramp against `z / eye_z`.
pub const COLOR_DEPTH_SCALE: f32 = -1.5;

#[must_use]
pub fn should_retry(elapsed_frames: u64) -> bool {
    elapsed_frames % RETRY_INTERVAL_FRAMES == 0
}

/// RGBA color of a point at depth `z`, seen from an eye at `eye_z`.
///
/// Red stays saturated, green and opacity grow with `d = 1 - (z / eye_z) * -1.5`
/// while blue decreases, giving a magenta to yellow ramp.
#[must_use]
pub fn point_color(z: f32, eye_z: f32) -> [f32; 4] {
    let depth = 1.0 - z / eye_z * COLOR_DEPTH_SCALE;
    [1.0, depth, 1.0 - depth, depth]
}

/// Points rebuilt from a depth frame, one per pixel, in row-major order.
///
/// The list is either empty or holds exactly one point per pixel.
pub struct PointCloud {
    resolution: ImageResolution,
    points: Vec<Point3<f32>>,
}

impl PointCloud {
    #[must_use]
    pub fn new(resolution: ImageResolution) -> Self {
        Self {
            resolution,
            points: Vec::with_capacity(resolution.pixel_count()),
        }
    }

    #[must_use]
    pub fn points(&self) -> &[Point3<f32>] {
        &self.points
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Replaces the points with the current frame of `device`.
    ///
    /// Pixel `(x, y)` lands at `(x, y, depth * eye_z * DEPTH_SCALE)`, scaled by
    /// [`POINT_SCALE`] then shifted by `(-width / 2, height / 2, eye_z)`.
    #[allow(clippy::cast_precision_loss)]
    pub fn rebuild(&mut self, device: &dyn DepthDevice, eye_z: f32) {
        let width = self.resolution.width();
        let height = self.resolution.height();
        let offset = Vector3::new(-(width as f32) * 0.5, height as f32 * 0.5, eye_z);
        let scale = Vector3::from(POINT_SCALE);

        self.points.clear();
        self.points
            .resize(self.resolution.pixel_count(), Point3::origin());
        self.points
            .par_chunks_mut(width as usize)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, point) in row.iter_mut().enumerate() {
                    let depth = device.depth_at(x as u32, y as u32);
                    let position = Vector3::new(x as f32, y as f32, depth * eye_z * DEPTH_SCALE);
                    *point = Point3::from_vec(position.mul_element_wise(scale) + offset);
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceOptions, DeviceState};

    const EYE_Z: f32 = 670.0;

    /// Returns the same depth everywhere, or a per-column ramp.
    struct FlatDevice {
        depth: f32,
        ramp: bool,
    }

    impl DepthDevice for FlatDevice {
        fn name(&self) -> &str {
            "flat"
        }
        fn start(&mut self, _options: &DeviceOptions) -> anyhow::Result<()> {
            Ok(())
        }
        fn state(&self) -> DeviceState {
            DeviceState::Capturing
        }
        fn update(&mut self) {}
        #[allow(clippy::cast_precision_loss)]
        fn depth_at(&self, x: u32, _y: u32) -> f32 {
            if self.ramp {
                x as f32 / 640.0
            } else {
                self.depth
            }
        }
        fn stop(&mut self) {}
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-3,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn one_point_per_pixel() {
        let mut cloud = PointCloud::new(KINECT_SIZE);
        let device = FlatDevice {
            depth: 0.5,
            ramp: false,
        };
        cloud.rebuild(&device, EYE_Z);
        assert_eq!(cloud.len(), 640 * 480);
        cloud.rebuild(&device, EYE_Z);
        assert_eq!(cloud.len(), 640 * 480);
        cloud.clear();
        assert!(cloud.is_empty());
    }

    #[test]
    fn corners_are_centered_and_flipped() {
        let mut cloud = PointCloud::new(KINECT_SIZE);
        let device = FlatDevice {
            depth: 0.0,
            ramp: false,
        };
        cloud.rebuild(&device, EYE_Z);
        let first = cloud.points()[0];
        assert_close(first.x, -320.0);
        assert_close(first.y, 240.0);
        assert_close(first.z, EYE_Z);

        let last = cloud.points()[cloud.len() - 1];
        assert_close(last.x, 639.0 * 1.1 - 320.0);
        assert_close(last.y, -479.0 * 1.1 + 240.0);
    }

    #[test]
    fn row_major_order() {
        let mut cloud = PointCloud::new(ImageResolution::Res80x60);
        let device = FlatDevice {
            depth: 0.0,
            ramp: false,
        };
        cloud.rebuild(&device, EYE_Z);
        let second = cloud.points()[1];
        let next_row = cloud.points()[80];
        assert_close(second.x, 1.1 - 40.0);
        assert_close(second.y, 30.0);
        assert_close(next_row.x, -40.0);
        assert_close(next_row.y, -1.1 + 30.0);
    }

    #[test]
    fn depth_pushes_points_away_from_eye() {
        let mut cloud = PointCloud::new(KINECT_SIZE);
        let device = FlatDevice {
            depth: 0.0,
            ramp: true,
        };
        cloud.rebuild(&device, EYE_Z);
        let near = cloud.points()[0];
        let far = cloud.points()[320];
        assert_close(near.z, EYE_Z);
        assert_close(far.z, 0.5 * EYE_Z * DEPTH_SCALE + EYE_Z);
        assert!(far.z < near.z);
    }

    #[test]
    fn retry_cadence() {
        let retries: Vec<u64> = (0..=180).filter(|frame| should_retry(*frame)).collect();
        assert_eq!(retries, vec![0, 90, 180]);
        assert!(!should_retry(45));
    }

    #[test]
    fn color_follows_depth() {
        let [r, g, b, a] = point_color(EYE_Z, EYE_Z);
        assert_close(r, 1.0);
        assert_close(g, 2.5);
        assert_close(b, -1.5);
        assert_close(a, 2.5);

        let [_, g, b, a] = point_color(-EYE_Z / 1.5, EYE_Z);
        assert_close(g, 0.0);
        assert_close(b, 1.0);
        assert_close(a, 0.0);
    }

    #[test]
    fn color_is_monotonic_in_z() {
        let mut previous = point_color(-2.0 * EYE_Z, EYE_Z);
        for step in 1..=30 {
            #[allow(clippy::cast_precision_loss)]
            let z = -2.0 * EYE_Z + step as f32 * 100.0;
            let color = point_color(z, EYE_Z);
            assert!(color[1] > previous[1]);
            assert!(color[2] < previous[2]);
            assert!(color[3] > previous[3]);
            assert_close(color[0], 1.0);
            assert_close(color[1] + color[2], 1.0);
            previous = color;
        }
    }
}
