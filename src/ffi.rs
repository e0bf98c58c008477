//! C FFI layer for rgbd.
//!
//! Exposes the frame conversion primitives and an opaque frame ring handle.
//! The generated C header is written to `include/rgbd.h` by cbindgen.

use crate::colormap::{self, ChannelLayout};
use crate::copy;
use crate::error::LastError;
use crate::ring::FrameRing;
use crate::RgbdError;
use std::ffi::{c_char, c_int};

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// Opaque frame ring handle for C consumers.
pub struct RgbdRing(FrameRing);

fn report(result: crate::Result<()>) -> c_int {
    match result {
        Ok(()) => {
            LAST_ERROR.clear();
            0
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Copy a `width x height` frame into `dst` at byte `offset`, skipping
/// `padding` bytes after each row.
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// `src` must point to `src_len` readable bytes and `dst` to `dst_len`
/// writable bytes, or be null.
#[no_mangle]
pub unsafe extern "C" fn rgbd_copy_frame(
    src: *const u8,
    src_len: usize,
    dst: *mut u8,
    dst_len: usize,
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
    offset: usize,
    padding: usize,
) -> c_int {
    if src.is_null() || dst.is_null() {
        return -1;
    }
    let src = std::slice::from_raw_parts(src, src_len);
    let dst = std::slice::from_raw_parts_mut(dst, dst_len);
    let (width, height, bpp) = (width as usize, height as usize, bytes_per_pixel as usize);

    let frame_len = copy::frame_len(width, height, bpp).unwrap_or(usize::MAX);
    let needed = copy::required_len(width, height, bpp, offset, padding);
    let result = if src.len() < frame_len {
        Err(RgbdError::BufferTooSmall {
            needed: frame_len,
            actual: src.len(),
        })
    } else if dst.len() < needed {
        Err(RgbdError::BufferTooSmall {
            needed,
            actual: dst.len(),
        })
    } else {
        copy::copy_frame(src, dst, width, height, bpp, offset, padding);
        Ok(())
    };
    report(result)
}

/// Jet color of one sample, written as 3 bytes R, G, B to `rgb`.
/// Returns 0 on success, -1 if `rgb` is null.
///
/// # Safety
/// `rgb` must point to 3 writable bytes, or be null.
#[no_mangle]
pub unsafe extern "C" fn rgbd_jet(v: u16, v_min: u16, v_max: u16, rgb: *mut u8) -> c_int {
    if rgb.is_null() {
        return -1;
    }
    let color = colormap::jet(v, v_min, v_max);
    std::ptr::copy_nonoverlapping(color.as_ptr(), rgb, color.len());
    0
}

/// Colormap `width * height` 16-bit samples into `dst`.
/// `layout`: 0 = RGB (3 bytes per pixel), 1 = ARGB (4 bytes, alpha untouched).
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// `src` must point to `width * height` readable samples and `dst` to
/// `dst_len` writable bytes, or be null.
#[no_mangle]
pub unsafe extern "C" fn rgbd_convert_16bit_to_jet(
    src: *const u16,
    dst: *mut u8,
    dst_len: usize,
    width: u32,
    height: u32,
    layout: u32,
    v_min: u16,
    v_max: u16,
) -> c_int {
    if src.is_null() || dst.is_null() {
        return -1;
    }
    let layout = match ChannelLayout::try_from(layout) {
        Ok(layout) => layout,
        Err(e) => return report(Err(e)),
    };
    let (width, height) = (width as usize, height as usize);
    // The destination bounds the sample count before the source is viewed.
    let needed = copy::frame_len(width, height, layout.pixel_size()).unwrap_or(usize::MAX);
    if dst_len < needed {
        return report(Err(RgbdError::BufferTooSmall {
            needed,
            actual: dst_len,
        }));
    }
    let src = std::slice::from_raw_parts(src, width * height);
    let dst = std::slice::from_raw_parts_mut(dst, dst_len);
    report(colormap::jet_frame(
        src, dst, width, height, layout, v_min, v_max,
    ))
}

/// Create an unallocated frame ring. Free it with `rgbd_ring_free`.
#[no_mangle]
pub extern "C" fn rgbd_ring_new() -> *mut RgbdRing {
    Box::into_raw(Box::new(RgbdRing(FrameRing::new())))
}

/// Free a frame ring and its buffer.
///
/// # Safety
/// `ring` must be a pointer returned by `rgbd_ring_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn rgbd_ring_free(ring: *mut RgbdRing) {
    if !ring.is_null() {
        drop(Box::from_raw(ring));
    }
}

/// Allocate `capacity` zeroed frames, releasing any previous buffer.
/// Returns 0 on success, -1 on error (null ring, zero capacity or a size
/// that does not fit in memory).
///
/// # Safety
/// `ring` must be a valid ring pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn rgbd_ring_allocate(
    ring: *mut RgbdRing,
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
    capacity: u32,
) -> c_int {
    if ring.is_null() {
        return -1;
    }
    let ring = &mut *ring;
    report(ring.0.allocate(
        width as usize,
        height as usize,
        bytes_per_pixel as usize,
        capacity as usize,
    ))
}

/// Move to the next slot, wrapping after the last.
///
/// # Safety
/// `ring` must be a valid ring pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn rgbd_ring_advance(ring: *mut RgbdRing) -> c_int {
    if ring.is_null() {
        return -1;
    }
    (*ring).0.advance();
    0
}

/// Set the current slot to `n` modulo capacity; negative counts from the end.
///
/// # Safety
/// `ring` must be a valid ring pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn rgbd_ring_set_index(ring: *mut RgbdRing, n: i64) -> c_int {
    if ring.is_null() {
        return -1;
    }
    (*ring).0.set_index(n);
    0
}

/// Current slot index, or -1 for a null ring.
///
/// # Safety
/// `ring` must be a valid ring pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn rgbd_ring_index(ring: *const RgbdRing) -> i64 {
    if ring.is_null() {
        return -1;
    }
    (*ring).0.index() as i64
}

/// Number of slots, 0 when unallocated, -1 for a null ring.
///
/// # Safety
/// `ring` must be a valid ring pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn rgbd_ring_capacity(ring: *const RgbdRing) -> i64 {
    if ring.is_null() {
        return -1;
    }
    (*ring).0.capacity() as i64
}

/// Pointer to the frame at `index` (wrapped), or the current frame when
/// `index` is negative. Returns NULL on error.
/// The pointer is valid until the ring is reallocated or freed.
///
/// # Safety
/// `ring` must be a valid ring pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn rgbd_ring_slot(ring: *mut RgbdRing, index: i64) -> *mut u8 {
    if ring.is_null() {
        return std::ptr::null_mut();
    }
    let ring = &mut *ring;
    match ring.0.slot_mut(slot_index(index)) {
        Ok(slot) => {
            LAST_ERROR.clear();
            slot.as_mut_ptr()
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            std::ptr::null_mut()
        }
    }
}

/// Copy a stored frame into `dst` with byte `offset` and row `padding`.
/// A negative `index` selects the current frame.
/// Returns 0 on success, -1 on error.
///
/// # Safety
/// `ring` must be a valid ring pointer and `dst` must point to `dst_len`
/// writable bytes, or either may be null.
#[no_mangle]
pub unsafe extern "C" fn rgbd_ring_copy_out(
    ring: *const RgbdRing,
    dst: *mut u8,
    dst_len: usize,
    index: i64,
    offset: usize,
    padding: usize,
) -> c_int {
    if ring.is_null() || dst.is_null() {
        return -1;
    }
    let ring = &*ring;
    let dst = std::slice::from_raw_parts_mut(dst, dst_len);
    report(ring.0.copy_out(dst, slot_index(index), offset, padding))
}

/// Colormap a stored 16-bit frame into `dst`. Thresholds are in the stored
/// samples' native units. Returns 0 on success, -1 on error.
///
/// # Safety
/// `ring` must be a valid ring pointer and `dst` must point to `dst_len`
/// writable bytes, or either may be null.
#[no_mangle]
pub unsafe extern "C" fn rgbd_ring_convert_out(
    ring: *const RgbdRing,
    dst: *mut u8,
    dst_len: usize,
    index: i64,
    layout: u32,
    v_min: u16,
    v_max: u16,
) -> c_int {
    if ring.is_null() || dst.is_null() {
        return -1;
    }
    let layout = match ChannelLayout::try_from(layout) {
        Ok(layout) => layout,
        Err(e) => return report(Err(e)),
    };
    let ring = &*ring;
    let dst = std::slice::from_raw_parts_mut(dst, dst_len);
    report(ring.0.convert_out(dst, slot_index(index), layout, v_min, v_max))
}

/// Get the last error message. Returns NULL if the last call succeeded.
/// The returned pointer is valid until the next rgbd API call.
#[no_mangle]
pub extern "C" fn rgbd_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}

fn slot_index(index: i64) -> Option<usize> {
    usize::try_from(index).ok()
}
