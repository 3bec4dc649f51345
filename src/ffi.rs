//! FFI bindings for Emotion Flux
//!
//! This module provides C-compatible functions for driving an engine from other
//! languages. All functions use C strings (null-terminated) and return allocated
//! memory that must be freed by the caller using `emotion_free_string`.
//!
//! Processing functions return NULL both when the gate held a decision back and
//! on error. The two cases are told apart with `emotion_last_error`, which is
//! only set on error.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::baseline::Baseline;
use crate::config::{EngineConfig, GatePolicy};
use crate::engine::EmotionEngine;
use crate::types::{
    BehaviorFeatureRecord, Channel, ChannelRecord, FacialSignals, FinalDecision,
    WebcamFeatureRecord,
};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Serialize an emitted decision; NULL when the gate suppressed it
fn decision_to_cstr(decision: Option<FinalDecision>) -> *mut c_char {
    match decision {
        Some(decision) => match serde_json::to_string(&decision) {
            Ok(json) => string_to_cstr(&json),
            Err(e) => {
                set_last_error(&e.to_string());
                ptr::null_mut()
            }
        },
        None => ptr::null_mut(),
    }
}

/// Parse a JSON argument, recording the error on failure
unsafe fn parse_json_arg<T: serde::de::DeserializeOwned>(json: *const c_char) -> Option<T> {
    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return None;
        }
    };

    match serde_json::from_str(&json_str) {
        Ok(value) => Some(value),
        Err(e) => {
            set_last_error(&format!("Failed to parse feature record: {e}"));
            None
        }
    }
}

// ============================================================================
// Engine Lifecycle
// ============================================================================

/// Opaque handle to an EmotionEngine
pub struct EmotionEngineHandle {
    engine: EmotionEngine,
}

/// Create a new engine with a gate policy preset.
///
/// `policy` is 0 for responsive and 1 for conservative; any other value falls
/// back to responsive.
///
/// # Safety
/// - Returns a pointer to a newly allocated engine.
/// - Must be freed with `emotion_engine_free`.
#[no_mangle]
pub unsafe extern "C" fn emotion_engine_new(policy: i32) -> *mut EmotionEngineHandle {
    clear_last_error();

    let policy = match policy {
        1 => GatePolicy::Conservative,
        _ => GatePolicy::Responsive,
    };

    let handle = Box::new(EmotionEngineHandle {
        engine: EmotionEngine::with_policy(policy),
    });
    Box::into_raw(handle)
}

/// Create a new engine from a JSON configuration document.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string.
/// - Must be freed with `emotion_engine_free`.
/// - Returns NULL on error; call `emotion_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn emotion_engine_new_with_config(
    config_json: *const c_char,
) -> *mut EmotionEngineHandle {
    clear_last_error();

    let json_str = match cstr_to_string(config_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        }
    };

    match EngineConfig::from_json(&json_str) {
        Ok(config) => Box::into_raw(Box::new(EmotionEngineHandle {
            engine: EmotionEngine::new(config),
        })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free an engine.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `emotion_engine_new*`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn emotion_engine_free(engine: *mut EmotionEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

// ============================================================================
// Sample Processing
// ============================================================================

/// Process one behavior feature record.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `emotion_engine_new*`.
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated decision JSON that must be freed with
///   `emotion_free_string`, or NULL when no decision was emitted.
#[no_mangle]
pub unsafe extern "C" fn emotion_engine_process_behavior(
    engine: *mut EmotionEngineHandle,
    json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &mut *engine;

    match parse_json_arg::<BehaviorFeatureRecord>(json) {
        Some(record) => decision_to_cstr(handle.engine.process_behavior_sample(&record)),
        None => ptr::null_mut(),
    }
}

/// Process one webcam feature record.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `emotion_engine_new*`.
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated decision JSON that must be freed with
///   `emotion_free_string`, or NULL when no decision was emitted.
#[no_mangle]
pub unsafe extern "C" fn emotion_engine_process_webcam(
    engine: *mut EmotionEngineHandle,
    json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &mut *engine;

    match parse_json_arg::<WebcamFeatureRecord>(json) {
        Some(record) => decision_to_cstr(handle.engine.process_webcam_sample(&record)),
        None => ptr::null_mut(),
    }
}

/// Process loosely-typed facial signals from a frame analyzer.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `emotion_engine_new*`.
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated decision JSON that must be freed with
///   `emotion_free_string`, or NULL when no decision was emitted.
#[no_mangle]
pub unsafe extern "C" fn emotion_engine_process_facial(
    engine: *mut EmotionEngineHandle,
    json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &mut *engine;

    match parse_json_arg::<FacialSignals>(json) {
        Some(signals) => decision_to_cstr(handle.engine.infer_from_facial_signals(signals)),
        None => ptr::null_mut(),
    }
}

/// Process a record tagged with its `"channel"`.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `emotion_engine_new*`.
/// - `json` must be a valid null-terminated C string.
/// - Returns a newly allocated decision JSON that must be freed with
///   `emotion_free_string`, or NULL when no decision was emitted.
#[no_mangle]
pub unsafe extern "C" fn emotion_engine_process_record(
    engine: *mut EmotionEngineHandle,
    json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &mut *engine;

    match parse_json_arg::<ChannelRecord>(json) {
        Some(record) => decision_to_cstr(handle.engine.process_record(record)),
        None => ptr::null_mut(),
    }
}

// ============================================================================
// Baseline and Channel Control
// ============================================================================

/// Install a persisted baseline (JSON, camelCase fields).
///
/// # Safety
/// - `engine` must be a valid pointer returned by `emotion_engine_new*`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
/// - On error, call `emotion_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn emotion_engine_install_baseline(
    engine: *mut EmotionEngineHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    let handle = &mut *engine;

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    let baseline = match Baseline::from_json(&json_str) {
        Ok(baseline) => baseline,
        Err(e) => {
            set_last_error(&e.to_string());
            return -1;
        }
    };

    if handle.engine.install_baseline(baseline) {
        0
    } else {
        set_last_error("Baseline rejected");
        -1
    }
}

/// Save the calibrated baseline to JSON.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `emotion_engine_new*`.
/// - Returns a newly allocated string that must be freed with `emotion_free_string`.
/// - Returns NULL while still calibrating or on error; call `emotion_last_error`
///   to get the reason.
#[no_mangle]
pub unsafe extern "C" fn emotion_engine_save_baseline(
    engine: *mut EmotionEngineHandle,
) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &*engine;

    let baseline = match handle.engine.baseline() {
        Some(baseline) => baseline,
        None => {
            set_last_error("No baseline yet, engine is calibrating");
            return ptr::null_mut();
        }
    };

    match baseline.to_json() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Enable or disable a channel (0 = behavior, 1 = webcam).
///
/// # Safety
/// - `engine` must be a valid pointer returned by `emotion_engine_new*`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn emotion_engine_set_channel_enabled(
    engine: *mut EmotionEngineHandle,
    channel: i32,
    enabled: bool,
) -> i32 {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return -1;
    }
    let handle = &mut *engine;

    let channel = match channel {
        0 => Channel::Behavior,
        1 => Channel::Webcam,
        other => {
            set_last_error(&format!("Unknown channel: {other}"));
            return -1;
        }
    };

    handle.engine.set_channel_enabled(channel, enabled);
    0
}

/// Engine state as JSON, for diagnostics.
///
/// # Safety
/// - `engine` must be a valid pointer returned by `emotion_engine_new*`.
/// - Returns a newly allocated string that must be freed with `emotion_free_string`.
/// - Returns NULL on error; call `emotion_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn emotion_engine_snapshot(engine: *mut EmotionEngineHandle) -> *mut c_char {
    clear_last_error();

    if engine.is_null() {
        set_last_error("Null engine pointer");
        return ptr::null_mut();
    }
    let handle = &*engine;

    match serde_json::to_string(&handle.engine.snapshot()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Emotion Flux functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by an Emotion Flux function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn emotion_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Emotion Flux call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn emotion_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn emotion_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
