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

use cgmath::{Matrix4, PerspectiveFov, Point3, Rad, Vector3, vec3};
use std::sync::LazyLock;

use crate::Dimensions;

// cgmath targets OpenGL clip space, where depth spans [-1, 1]
static TO_WEBGPU_NDCS: LazyLock<Matrix4<f32>> = LazyLock::new(|| {
    Matrix4::from_translation(vec3(0., 0., 0.5)) * Matrix4::from_nonuniform_scale(1., 1., 0.5)
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub eye: Point3<f32>,
    pub center: Point3<f32>,
    pub up: Vector3<f32>,
}

impl CameraView {
    #[must_use]
    pub fn look_at(eye: Point3<f32>, center: Point3<f32>) -> Self {
        Self {
            eye,
            center,
            up: Vector3::unit_y(),
        }
    }
    #[must_use]
    pub fn calc_view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.eye, self.center, self.up)
    }
}

pub trait CameraProjection {
    fn calc_projection(&self) -> Matrix4<f32>;
    fn resize_screen(&mut self, dimensions: Dimensions);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCameraConfig {
    /// Vertical field of view, in radians.
    pub fovy: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl CameraProjection for PerspectiveCameraConfig {
    fn calc_projection(&self) -> Matrix4<f32> {
        Matrix4::from(PerspectiveFov {
            fovy: Rad(self.fovy),
            aspect: self.aspect,
            near: self.near,
            far: self.far,
        })
    }
    // Zero-sized surfaces report a ratio of 1 and keep the camera usable
    fn resize_screen(&mut self, dimensions: Dimensions) {
        self.aspect = dimensions.surface_ratio();
    }
}

/// Camera whose placement is fixed once built. Only the projection follows
/// the screen size.
pub struct Camera {
    projection: Box<dyn CameraProjection>,
    view: CameraView,
    projection_cache: Matrix4<f32>,
    view_cache: Matrix4<f32>,
}

impl Camera {
    #[must_use]
    pub fn new(view: CameraView, projection: Box<dyn CameraProjection>) -> Self {
        let view_cache = view.calc_view_matrix();
        let projection_cache = projection.calc_projection();
        Self {
            projection,
            view,
            projection_cache,
            view_cache,
        }
    }
    pub fn resize_screen(&mut self, dimensions: Dimensions) {
        self.projection.resize_screen(dimensions);
        self.projection_cache = self.projection.calc_projection();
    }
    #[must_use]
    pub fn get_camera_matrix(&self) -> Matrix4<f32> {
        (*TO_WEBGPU_NDCS) * self.projection_cache * self.view_cache
    }
    #[must_use]
    pub fn eye_position(&self) -> Point3<f32> {
        self.view.eye
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Transform;

    fn test_camera() -> Camera {
        Camera::new(
            CameraView::look_at(Point3::new(0.0, 0.0, 670.0), Point3::new(0.0, 0.0, 0.0)),
            Box::new(PerspectiveCameraConfig {
                fovy: 60f32.to_radians(),
                aspect: 4. / 3.,
                near: 0.01,
                far: 5000.0,
            }),
        )
    }

    #[test]
    fn look_at_target_projects_to_screen_center() {
        let camera = test_camera();
        let projected = camera
            .get_camera_matrix()
            .transform_point(Point3::new(0.0, 0.0, 0.0));
        assert!(projected.x.abs() < 1e-5);
        assert!(projected.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&projected.z));
    }

    #[test]
    fn depth_grows_away_from_eye_up_to_far_plane() {
        let camera = test_camera();
        let matrix = camera.get_camera_matrix();
        let target = matrix.transform_point(Point3::new(0.0, 0.0, 0.0));
        let behind_target = matrix.transform_point(Point3::new(0.0, 0.0, -1000.0));
        let far = matrix.transform_point(Point3::new(0.0, 0.0, 670.0 - 5000.0));
        assert!(target.z < behind_target.z);
        assert!(behind_target.z < far.z);
        assert!((far.z - 1.0).abs() < 1e-3);
    }

    #[test]
    fn resize_only_touches_aspect() {
        let mut camera = test_camera();
        let eye = camera.eye_position();
        camera.resize_screen(Dimensions {
            width: 1920,
            height: 1080,
        });
        assert_eq!(camera.eye_position(), eye);
        let wide_edge = camera
            .get_camera_matrix()
            .transform_point(Point3::new(100.0, 0.0, 0.0));
        let mut square = test_camera();
        square.resize_screen(Dimensions {
            width: 1000,
            height: 1000,
        });
        let square_edge = square
            .get_camera_matrix()
            .transform_point(Point3::new(100.0, 0.0, 0.0));
        assert!(wide_edge.x < square_edge.x);
    }
}
