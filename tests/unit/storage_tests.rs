//! Unit tests for session numbering and directory allocation.

use std::fs;

use ingest_orchestrator::models::session::{
    parse_session_number, session_directory_name, LOGS_DIRECTORY, SESSION_INFO_FILE,
};
use ingest_orchestrator::orchestrator::storage::{
    allocate_session, config_copy_name, next_session_number, record_session_files,
};

#[test]
fn missing_root_starts_at_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert_eq!(next_session_number(&dir.path().join("absent")).unwrap(), 0);
}

#[test]
fn empty_root_starts_at_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert_eq!(next_session_number(dir.path()).unwrap(), 0);
}

#[test]
fn next_number_is_one_past_the_highest() {
    let dir = tempfile::tempdir().expect("tempdir");
    for n in [0, 3, 17] {
        fs::create_dir(dir.path().join(session_directory_name(n))).unwrap();
    }
    fs::create_dir(dir.path().join("ingest_session_notanumber")).unwrap();
    fs::create_dir(dir.path().join("unrelated")).unwrap();
    fs::write(dir.path().join(session_directory_name(99)), "a file, not a session").unwrap();

    assert_eq!(next_session_number(dir.path()).unwrap(), 18);
}

#[test]
fn directory_names_are_zero_padded() {
    assert_eq!(session_directory_name(7), "ingest_session_00007");
    assert_eq!(parse_session_number("ingest_session_00007"), Some(7));
    assert_eq!(parse_session_number("ingest_session_123456"), Some(123_456));
    assert_eq!(parse_session_number("ingest_session_"), None);
    assert_eq!(parse_session_number("ingest_session_-1"), None);
}

#[test]
fn allocation_creates_session_and_log_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = allocate_session(dir.path()).expect("first session");
    let second = allocate_session(dir.path()).expect("second session");

    assert_eq!(first.number, 0);
    assert_eq!(second.number, 1);
    assert!(second.directory.is_absolute());
    assert!(second.directory.ends_with("ingest_session_00001"));
    assert!(second.logs_directory.is_dir());
    assert_eq!(second.logs_directory, second.directory.join(LOGS_DIRECTORY));
}

#[test]
fn session_files_hold_config_copy_and_header() {
    let dir = tempfile::tempdir().expect("tempdir");
    let session = allocate_session(dir.path()).expect("session");
    record_session_files(&session, "site.cfg", "[CAMERA]\nname=camA\n").expect("files written");

    let copy = fs::read_to_string(session.directory.join("site.cfg")).unwrap();
    assert_eq!(copy, "[CAMERA]\nname=camA\n");

    let header = fs::read_to_string(session.directory.join(SESSION_INFO_FILE)).unwrap();
    assert!(header.contains("session number: 0"));
    assert!(header.contains(&session.directory.display().to_string()));
    assert!(header.contains("created (utc):"));
    assert!(header.contains("created (local):"));
}

#[test]
fn config_named_like_session_entries_is_renamed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let session = allocate_session(dir.path()).expect("session");

    record_session_files(&session, SESSION_INFO_FILE, "[CAMERA]\nname=camA\n").expect("written");
    record_session_files(&session, LOGS_DIRECTORY, "[CAMERA]\nname=camB\n").expect("written");

    let header = fs::read_to_string(session.directory.join(SESSION_INFO_FILE)).unwrap();
    assert!(header.contains("session number: 0"));
    let info_copy = session.directory.join(config_copy_name(SESSION_INFO_FILE));
    assert_eq!(fs::read_to_string(info_copy).unwrap(), "[CAMERA]\nname=camA\n");
    let logs_copy = session.directory.join(config_copy_name(LOGS_DIRECTORY));
    assert_eq!(fs::read_to_string(logs_copy).unwrap(), "[CAMERA]\nname=camB\n");
    assert!(session.logs_directory.is_dir());
    assert_eq!(config_copy_name("site.cfg"), "site.cfg");
}
