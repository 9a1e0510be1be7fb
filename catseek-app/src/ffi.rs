use super::ChatApp;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;

/// Opaque chat session handed to a GUI host.
pub struct CatSeekSession {
    app: ChatApp,
}

/// # Safety
/// `ptr` must be non-null and point to a NUL-terminated string.
unsafe fn path_from(ptr: *const c_char) -> PathBuf {
    let c_str = CStr::from_ptr(ptr);
    PathBuf::from(c_str.to_string_lossy().into_owned())
}

/// Create a session with an in-memory transcript. Returns null on failure.
#[no_mangle]
pub extern "C" fn catseek_new(thinking: c_int) -> *mut CatSeekSession {
    match ChatApp::in_memory(thinking != 0) {
        Ok(app) => Box::into_raw(Box::new(CatSeekSession { app })),
        Err(_) => std::ptr::null_mut(),
    }
}

/// Send a message. Returns the rendered reply (free with
/// `catseek_string_free`) or null for blank input.
#[no_mangle]
pub extern "C" fn catseek_send_message(
    session: *mut CatSeekSession,
    text: *const c_char,
) -> *mut c_char {
    if session.is_null() || text.is_null() {
        return std::ptr::null_mut();
    }
    let session = unsafe { &mut *session };
    let text = unsafe { CStr::from_ptr(text).to_string_lossy() };
    match session.app.send_message(&text) {
        Some(reply) => CString::new(reply.text)
            .map(CString::into_raw)
            .unwrap_or(std::ptr::null_mut()),
        None => std::ptr::null_mut(),
    }
}

/// Clear the transcript and reset the engine. 0 on success, -1 on failure.
#[no_mangle]
pub extern "C" fn catseek_new_session(session: *mut CatSeekSession) -> c_int {
    if session.is_null() {
        return -1;
    }
    let session = unsafe { &mut *session };
    match session.app.new_session() {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Current mode bit, or -1 for a null session.
#[no_mangle]
pub extern "C" fn catseek_mode(session: *const CatSeekSession) -> c_int {
    if session.is_null() {
        return -1;
    }
    let session = unsafe { &*session };
    c_int::from(session.app.engine().mode().bit())
}

#[no_mangle]
pub extern "C" fn catseek_token_count(session: *const CatSeekSession) -> u64 {
    if session.is_null() {
        return 0;
    }
    let session = unsafe { &*session };
    session.app.engine().token_count()
}

/// Export the container to `path`. Returns the file size or -1.
#[no_mangle]
pub extern "C" fn catseek_export_gguf(session: *const CatSeekSession, path: *const c_char) -> i64 {
    if session.is_null() || path.is_null() {
        return -1;
    }
    let session = unsafe { &*session };
    // SAFETY: `path` was null-checked above.
    let path = unsafe { path_from(path) };
    match session.app.export_gguf(&path) {
        Ok(summary) => summary.size_bytes as i64,
        Err(_) => -1,
    }
}

/// Export the JSON snapshot to `path`. 0 on success, -1 on failure.
#[no_mangle]
pub extern "C" fn catseek_export_json(session: *const CatSeekSession, path: *const c_char) -> c_int {
    if session.is_null() || path.is_null() {
        return -1;
    }
    let session = unsafe { &*session };
    // SAFETY: `path` was null-checked above.
    let path = unsafe { path_from(path) };
    match session.app.export_json(&path) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

#[no_mangle]
pub extern "C" fn catseek_string_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            drop(CString::from_raw(ptr));
        }
    }
}

#[no_mangle]
pub extern "C" fn catseek_free(session: *mut CatSeekSession) {
    if !session.is_null() {
        unsafe { drop(Box::from_raw(session)); }
    }
}
