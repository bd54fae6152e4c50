//! # dyad-shim
//!
//! LD_PRELOAD interposer that turns ordinary file opens and closes into
//! DYAD producer-consumer coordination.
//!
//! A producer closing a write-only file under `DYAD_PATH_PROD` publishes
//! ownership of the file to the coordination broker; a consumer opening a
//! file read-only under `DYAD_PATH_CONS` waits for the owner, fetches the
//! bytes, and writes them locally before the real open proceeds. The host
//! application sees nothing but ordinary filesystem I/O.
//!
//! ## Usage
//!
//! ```bash
//! DYAD_PATH_PROD=/scratch/job/prod \
//! DYAD_PATH_CONS=/scratch/job/cons \
//! LD_PRELOAD=/path/to/libdyad_shim.so \
//! ./unmodified_application
//! ```
//!
//! The real entry point is invoked on every code path: coordination
//! failures only ever cost a log line, never the application's own I/O.

#![allow(clippy::missing_safety_doc)]

mod fd;
mod hooks;
mod reals;
mod state;

use libc::{c_char, c_int, mode_t, FILE};
use std::ffi::CStr;

pub use reals::{close_real, fclose_real, fopen_real, open_real, open_real_mode};

unsafe fn cstr<'a>(p: *const c_char) -> Option<&'a str> {
    if p.is_null() {
        return None;
    }
    CStr::from_ptr(p).to_str().ok()
}

/// Intercepted `open`. Subscribes before the real open when the flags are
/// pure read-only and the path is a consumer-managed file.
///
/// The creation mode is forwarded to the real symbol only when `O_CREAT`
/// is present; without it the third argument slot is never read.
#[no_mangle]
pub unsafe extern "C" fn open(path: *const c_char, oflag: c_int, mode: mode_t) -> c_int {
    if !reals::have_open() {
        return -1;
    }
    if let Some(path_str) = cstr(path) {
        if hooks::wants_subscribe(oflag) && !fd::is_path_dir(path_str) {
            hooks::open_sync(path_str);
        }
    }
    if oflag & libc::O_CREAT != 0 {
        open_real_mode(path, oflag, mode)
    } else {
        open_real(path, oflag)
    }
}

/// Intercepted `fopen`. In scope only for mode string `"r"`.
#[no_mangle]
pub unsafe extern "C" fn fopen(path: *const c_char, mode: *const c_char) -> *mut FILE {
    if !reals::have_fopen() {
        return std::ptr::null_mut();
    }
    if let (Some(path_str), Some(mode_str)) = (cstr(path), cstr(mode)) {
        if mode_str == "r" && !fd::is_path_dir(path_str) {
            hooks::open_sync(path_str);
        }
    }
    fopen_real(path, mode)
}

/// Intercepted `close`. For a write-only descriptor under the
/// producer-managed prefix: fsync, real close, then publish — in that
/// order, so the ownership record never points at an incomplete file.
#[no_mangle]
pub unsafe extern "C" fn close(fd: c_int) -> c_int {
    if !reals::have_close() {
        return -1;
    }
    let Some(plan) = hooks::close_prepare(fd) else {
        return close_real(fd);
    };
    libc::fsync(fd);
    if plan.sync_dir {
        hooks::sync_directory(&plan.path);
    }
    let rc = close_real(fd);
    if plan.publish {
        hooks::close_sync(&plan.path);
    }
    rc
}

/// Intercepted `fclose`. Same protocol as `close`, with a stream flush
/// before the descriptor fsync.
#[no_mangle]
pub unsafe extern "C" fn fclose(fp: *mut FILE) -> c_int {
    if !reals::have_fclose() {
        // EOF
        return -1;
    }
    if fp.is_null() {
        return fclose_real(fp);
    }
    let fd_num = libc::fileno(fp);
    let Some(plan) = hooks::close_prepare(fd_num) else {
        return fclose_real(fp);
    };
    libc::fflush(fp);
    libc::fsync(fd_num);
    if plan.sync_dir {
        hooks::sync_directory(&plan.path);
    }
    let rc = fclose_real(fp);
    if plan.publish {
        hooks::close_sync(&plan.path);
    }
    rc
}

// glibc routes large-file-aware callers through the 64-bit aliases.
#[cfg(target_os = "linux")]
mod linux_compat {
    use super::*;

    #[no_mangle]
    pub unsafe extern "C" fn open64(path: *const c_char, oflag: c_int, mode: mode_t) -> c_int {
        open(path, oflag, mode)
    }

    #[no_mangle]
    pub unsafe extern "C" fn fopen64(path: *const c_char, mode: *const c_char) -> *mut FILE {
        fopen(path, mode)
    }
}

/// Build the loading thread's context before the application's entry point
/// runs.
#[used]
#[cfg(not(test))]
#[cfg_attr(target_os = "linux", link_section = ".init_array")]
#[cfg_attr(target_os = "macos", link_section = "__DATA,__mod_init_func")]
static INIT: extern "C" fn() = {
    extern "C" fn init() {
        state::startup();
    }
    init
};
