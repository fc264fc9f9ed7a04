//! Unit tests for output path templates.

use std::path::{Path, PathBuf};

use ingest_orchestrator::templates::{has_segment_placeholder, timestamp_now, PathTemplate};

#[test]
fn camera_placeholder_in_directory_only_is_detected() {
    let t = PathTemplate::new("recording/{camera}/segment_%05d.mp4");
    assert!(t.directory_has_camera());
    assert!(!t.filename_has_camera());
    assert!(t.has_camera_placeholder());
    assert!(t.filename_has_segment());
}

#[test]
fn segment_placeholder_in_directory_does_not_count() {
    let t = PathTemplate::new("rec_%05d/{camera}.mp4");
    assert!(!t.filename_has_segment());
}

#[test]
fn no_camera_placeholder_anywhere() {
    let t = PathTemplate::new("snapshots/snap_{timestamp}.jpeg");
    assert!(!t.has_camera_placeholder());
}

#[test]
fn resolves_each_camera_into_its_own_directory() {
    let t = PathTemplate::new("snaps/{camera}/still_{timestamp}.jpeg");
    let base = Path::new("/srv/ingest_session_00001");
    assert_eq!(
        t.resolve_directory(base, "camA", "20240102_030405"),
        PathBuf::from("/srv/ingest_session_00001/snaps/camA")
    );
    assert_eq!(
        t.resolve(base, "camB", "20240102_030405"),
        PathBuf::from("/srv/ingest_session_00001/snaps/camB/still_20240102_030405.jpeg")
    );
}

#[test]
fn segment_placeholder_survives_resolution() {
    let t = PathTemplate::new("rec_{camera}_%05d.mp4");
    let path = t.resolve(Path::new("/s"), "camA", "t");
    assert_eq!(path, PathBuf::from("/s/rec_camA_%05d.mp4"));
}

#[test]
fn root_level_template_keeps_root_directory() {
    let t = PathTemplate::new("/clip.mp4");
    assert_eq!(t.directory(), "/");
    assert_eq!(t.resolve(Path::new("/s"), "c", "t"), PathBuf::from("/clip.mp4"));
}

#[test]
fn printf_widths_are_recognized() {
    assert!(has_segment_placeholder("%3d"));
    assert!(has_segment_placeholder("a%010db"));
    assert!(!has_segment_placeholder("%"));
}

#[test]
fn timestamp_has_fixed_shape() {
    let ts = timestamp_now();
    assert_eq!(ts.len(), 15);
    assert_eq!(ts.as_bytes()[8], b'_');
    assert!(ts.chars().filter(|c| *c != '_').all(|c| c.is_ascii_digit()));
}
