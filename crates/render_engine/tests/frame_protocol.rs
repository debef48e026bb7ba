//! GPU-free checks of the frame protocol's pure logic through the
//! public API: slot rotation, surface status handling and the uniform
//! records applications fill in.

use approx::assert_relative_eq;
use nalgebra::{Matrix4, Perspective3};
use render_engine::render::{
    CameraUniformData, FrameSchedule, SurfaceStatus, MAX_FRAMES_IN_FLIGHT,
};

#[test]
fn schedule_visits_every_slot_before_repeating() {
    let mut schedule = FrameSchedule::new();
    let mut seen = vec![false; MAX_FRAMES_IN_FLIGHT];

    for _ in 0..MAX_FRAMES_IN_FLIGHT {
        seen[schedule.current()] = true;
        schedule.advance();
    }

    assert!(seen.iter().all(|&s| s));
    assert_eq!(schedule.current(), 0);
}

#[test]
fn previous_slot_is_where_last_frame_wrote() {
    let mut schedule = FrameSchedule::new();
    for _ in 0..5 {
        let before = schedule.current();
        schedule.advance();
        assert_eq!(schedule.previous(), before);
    }
}

#[test]
fn only_optimal_status_skips_the_rebuild() {
    assert!(!SurfaceStatus::Optimal.needs_rebuild());
    assert!(SurfaceStatus::Suboptimal.needs_rebuild());
    assert!(SurfaceStatus::Stale.needs_rebuild());
}

#[test]
fn camera_record_preserves_matrices_and_position() {
    let view = Matrix4::new_translation(&nalgebra::Vector3::new(1.0, 2.0, 3.0));
    let projection = Perspective3::new(16.0 / 9.0, 1.0, 0.1, 100.0).to_homogeneous();
    let camera = CameraUniformData::new(&view, &projection, [4.0, 5.0, 6.0]);

    let view_back: Matrix4<f32> = camera.view.into();
    let projection_back: Matrix4<f32> = camera.projection.into();

    assert_relative_eq!(view, view_back);
    assert_relative_eq!(projection, projection_back);
    assert_eq!(camera.position, [4.0, 5.0, 6.0, 0.0]);
}
