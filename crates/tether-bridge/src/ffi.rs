//! C ABI exports: buffer management and the native log hook.

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_int};

use tether_core::logging::{default_logger, forward_native};
use tether_core::{Buffer, Logger, diag};

/// Allocate `size` zeroed bytes. Empty and not owned when `size` is 0 or the
/// allocation failed.
#[unsafe(no_mangle)]
pub extern "C" fn create_buffer(size: usize) -> Buffer<'static> {
    Buffer::create(size)
}

/// Release a buffer produced by [`create_buffer`]. Borrowed buffers are left
/// untouched.
#[unsafe(no_mangle)]
pub extern "C" fn destroy_buffer(buffer: Buffer<'static>) {
    drop(buffer);
}

#[unsafe(no_mangle)]
pub extern "C" fn is_buffer_empty(buffer: &Buffer<'_>) -> bool {
    buffer.is_empty()
}

/// Entry point for the native library's own log lines, forwarded to the
/// process-wide default logger.
///
/// # Safety
///
/// Each pointer must be null or point to a NUL-terminated string that stays
/// valid for the duration of the call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn tether_native_log(
    level: c_int,
    file: *const c_char,
    line: u32,
    name: *const c_char,
    message: *const c_char,
) {
    let logger = default_logger();
    unsafe { forward(&logger, level, file, line, name, message) };
}

unsafe fn forward(
    logger: &Logger,
    level: c_int,
    file: *const c_char,
    line: u32,
    name: *const c_char,
    message: *const c_char,
) {
    let (file, name, message) = unsafe { (text(file), text(name), text(message)) };
    if let Err(e) = forward_native(logger, level, &file, line, &name, &message) {
        diag!(logger, Warn, "dropped native log line: {e}");
    }
}

unsafe fn text<'a>(ptr: *const c_char) -> Cow<'a, str> {
    if ptr.is_null() {
        return Cow::Borrowed("");
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
}
