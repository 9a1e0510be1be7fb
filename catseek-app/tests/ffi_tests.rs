use catseek_app::*;
use std::ffi::{CStr, CString};
use tempfile::tempdir;

#[test]
fn ffi_chat_session_roundtrip() {
    let dir = tempdir().unwrap();
    let gguf = CString::new(dir.path().join("m.gguf").to_str().unwrap()).unwrap();
    let json = CString::new(dir.path().join("m.json").to_str().unwrap()).unwrap();

    let session = catseek_new(1);
    assert!(!session.is_null());
    assert_eq!(catseek_mode(session), 0);

    let text = CString::new("hello there").unwrap();
    let reply = catseek_send_message(session, text.as_ptr());
    assert!(!reply.is_null());
    let rendered = unsafe { CStr::from_ptr(reply) }.to_str().unwrap().to_owned();
    assert!(rendered.contains("Thinking..."));
    assert!(rendered.contains("1-bit=0 | mode=Analytical"));
    catseek_string_free(reply);

    assert_eq!(catseek_mode(session), 1);
    assert_eq!(catseek_token_count(session), 2);

    let blank = CString::new("   ").unwrap();
    assert!(catseek_send_message(session, blank.as_ptr()).is_null());
    assert_eq!(catseek_token_count(session), 2);

    assert_eq!(catseek_export_gguf(session, gguf.as_ptr()), 521);
    assert_eq!(catseek_export_json(session, json.as_ptr()), 0);

    assert_eq!(catseek_new_session(session), 0);
    assert_eq!(catseek_mode(session), 0);
    assert_eq!(catseek_token_count(session), 0);

    catseek_free(session);
}

#[test]
fn ffi_null_handles_are_rejected() {
    let text = CString::new("hi").unwrap();
    assert!(catseek_send_message(std::ptr::null_mut(), text.as_ptr()).is_null());
    assert_eq!(catseek_mode(std::ptr::null()), -1);
    assert_eq!(catseek_new_session(std::ptr::null_mut()), -1);
    assert_eq!(catseek_export_gguf(std::ptr::null(), text.as_ptr()), -1);
    catseek_string_free(std::ptr::null_mut());
    catseek_free(std::ptr::null_mut());
}

#[test]
fn ffi_export_to_missing_dir_fails() {
    let dir = tempdir().unwrap();
    let bad = CString::new(dir.path().join("nope/m.gguf").to_str().unwrap()).unwrap();
    let session = catseek_new(0);
    assert_eq!(catseek_export_gguf(session, bad.as_ptr()), -1);
    assert_eq!(catseek_export_json(session, bad.as_ptr()), -1);
    catseek_free(session);
}
