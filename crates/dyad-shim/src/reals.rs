//! Real libc entry points, resolved lazily from the next object in the
//! dynamic-loader chain and cached so a hot path never repeats the dlsym.
//!
//! Everything the coordinator does on its own behalf goes through these,
//! never through the exported hooks.

use libc::{c_char, c_int, c_void, mode_t, FILE};
use std::sync::atomic::{AtomicPtr, Ordering};

use tracing::debug;

struct RealSymbol {
    ptr: AtomicPtr<c_void>,
    name: &'static str,
}

impl RealSymbol {
    const fn new(name: &'static str) -> Self {
        Self {
            ptr: AtomicPtr::new(std::ptr::null_mut()),
            name,
        }
    }

    unsafe fn get(&self) -> *mut c_void {
        let p = self.ptr.load(Ordering::Acquire);
        if !p.is_null() {
            return p;
        }
        let f = libc::dlsym(libc::RTLD_NEXT, self.name.as_ptr() as *const c_char);
        if f.is_null() {
            debug!(
                symbol = self.name.trim_end_matches('\0'),
                "dlsym(RTLD_NEXT) found no next symbol"
            );
        } else {
            self.ptr.store(f, Ordering::Release);
        }
        f
    }
}

static REAL_OPEN: RealSymbol = RealSymbol::new("open\0");
static REAL_FOPEN: RealSymbol = RealSymbol::new("fopen\0");
static REAL_CLOSE: RealSymbol = RealSymbol::new("close\0");
static REAL_FCLOSE: RealSymbol = RealSymbol::new("fclose\0");

type Open2Fn = unsafe extern "C" fn(*const c_char, c_int) -> c_int;
type Open3Fn = unsafe extern "C" fn(*const c_char, c_int, mode_t) -> c_int;
type FopenFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *mut FILE;
type CloseFn = unsafe extern "C" fn(c_int) -> c_int;
type FcloseFn = unsafe extern "C" fn(*mut FILE) -> c_int;

pub(crate) unsafe fn have_open() -> bool {
    !REAL_OPEN.get().is_null()
}

pub(crate) unsafe fn have_fopen() -> bool {
    !REAL_FOPEN.get().is_null()
}

pub(crate) unsafe fn have_close() -> bool {
    !REAL_CLOSE.get().is_null()
}

pub(crate) unsafe fn have_fclose() -> bool {
    !REAL_FCLOSE.get().is_null()
}

/// Real `open` with no mode argument; used whenever `O_CREAT` is absent so
/// no stray third argument is forwarded.
pub unsafe fn open_real(path: *const c_char, oflag: c_int) -> c_int {
    let p = REAL_OPEN.get();
    if p.is_null() {
        return -1;
    }
    std::mem::transmute::<*mut c_void, Open2Fn>(p)(path, oflag)
}

/// Real `open` carrying the creation mode.
pub unsafe fn open_real_mode(path: *const c_char, oflag: c_int, mode: mode_t) -> c_int {
    let p = REAL_OPEN.get();
    if p.is_null() {
        return -1;
    }
    std::mem::transmute::<*mut c_void, Open3Fn>(p)(path, oflag, mode)
}

pub unsafe fn fopen_real(path: *const c_char, mode: *const c_char) -> *mut FILE {
    let p = REAL_FOPEN.get();
    if p.is_null() {
        return std::ptr::null_mut();
    }
    std::mem::transmute::<*mut c_void, FopenFn>(p)(path, mode)
}

pub unsafe fn close_real(fd: c_int) -> c_int {
    let p = REAL_CLOSE.get();
    if p.is_null() {
        return -1;
    }
    std::mem::transmute::<*mut c_void, CloseFn>(p)(fd)
}

pub unsafe fn fclose_real(fp: *mut FILE) -> c_int {
    let p = REAL_FCLOSE.get();
    if p.is_null() {
        // EOF
        return -1;
    }
    std::mem::transmute::<*mut c_void, FcloseFn>(p)(fp)
}
