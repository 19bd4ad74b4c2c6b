// src/engine/jpeg_lossless.rs
//
// Lossless JPEG recompression over libjpeg's coefficient API.
// DCT coefficients are copied untouched and entropy-coded again with
// optimized Huffman tables, the same pass `jpegtran -optimize` performs.
// Markers are not carried over; the caller re-attaches the ones it keeps.
#![deny(unsafe_op_in_unsafe_fn)]

use crate::error::{ProcessorError, Result};
use mozjpeg_sys::*;
use std::mem;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::ptr;

/// Panic payload raised by the libjpeg fatal error handler.
struct LibjpegError(String);

extern "C-unwind" fn unwind_error_exit(cinfo: &mut jpeg_common_struct) {
    // SAFETY: libjpeg only calls this with `err` pointing at our manager.
    let code = unsafe { cinfo.err.as_ref() }.map_or(-1, |err| err.msg_code);
    resume_unwind(Box::new(LibjpegError(format!("libjpeg error code {code}"))));
}

extern "C-unwind" fn silence_message(_cinfo: &mut jpeg_common_struct, _level: c_int) {}

fn unwinding_error_mgr() -> Box<jpeg_error_mgr> {
    // SAFETY: an all-zero error manager is valid input for jpeg_std_error,
    // which fills in every method pointer.
    let mut err: Box<jpeg_error_mgr> = Box::new(unsafe { mem::zeroed() });
    unsafe { jpeg_std_error(&mut *err) };
    err.error_exit = Some(unwind_error_exit);
    err.emit_message = Some(silence_message);
    err
}

/// Owns a decompress object; destroyed before its error manager.
struct Decompressor {
    cinfo: Box<jpeg_decompress_struct>,
    _err: Box<jpeg_error_mgr>,
}

impl Decompressor {
    fn new() -> Self {
        let mut err = unwinding_error_mgr();
        // SAFETY: zeroed struct with `err` set is what jpeg_CreateDecompress expects.
        let mut cinfo: Box<jpeg_decompress_struct> = Box::new(unsafe { mem::zeroed() });
        cinfo.common.err = &mut *err;
        unsafe { jpeg_create_decompress(&mut *cinfo) };
        Self { cinfo, _err: err }
    }
}

impl Drop for Decompressor {
    fn drop(&mut self) {
        // SAFETY: created in `new`, destroyed exactly once.
        unsafe { jpeg_destroy_decompress(&mut self.cinfo) };
    }
}

/// Owns a compress object; destroyed before its error manager.
struct Compressor {
    cinfo: Box<jpeg_compress_struct>,
    _err: Box<jpeg_error_mgr>,
}

impl Compressor {
    fn new() -> Self {
        let mut err = unwinding_error_mgr();
        // SAFETY: zeroed struct with `err` set is what jpeg_CreateCompress expects.
        let mut cinfo: Box<jpeg_compress_struct> = Box::new(unsafe { mem::zeroed() });
        cinfo.common.err = &mut *err;
        unsafe { jpeg_create_compress(&mut *cinfo) };
        Self { cinfo, _err: err }
    }
}

impl Drop for Compressor {
    fn drop(&mut self) {
        // SAFETY: created in `new`, destroyed exactly once. The output
        // buffer belongs to `MemoryDestination`.
        unsafe {
            self.cinfo.dest = ptr::null_mut();
            jpeg_destroy_compress(&mut self.cinfo);
        }
    }
}

/// Output slot for `jpeg_mem_dest`; the buffer libjpeg mallocs is freed on drop.
struct MemoryDestination {
    buffer: *mut u8,
    size: c_ulong,
}

impl Drop for MemoryDestination {
    fn drop(&mut self) {
        if !self.buffer.is_null() {
            // SAFETY: allocated by libjpeg with malloc and not freed elsewhere.
            unsafe { libc::free(self.buffer.cast()) };
        }
    }
}

/// Re-encode `input` losslessly with optimized Huffman tables.
///
/// Libjpeg fatal errors come back as `OptimizeFailed`; any other panic
/// keeps unwinding to the caller's panic guard.
pub fn recompress(input: &[u8]) -> Result<Vec<u8>> {
    match catch_unwind(AssertUnwindSafe(|| transcode(input))) {
        Ok(result) => result,
        Err(payload) => match payload.downcast::<LibjpegError>() {
            Ok(err) => Err(ProcessorError::optimize_failed("jpeg", err.0)),
            Err(other) => resume_unwind(other),
        },
    }
}

fn transcode(input: &[u8]) -> Result<Vec<u8>> {
    let input_len = c_ulong::try_from(input.len())
        .map_err(|_| ProcessorError::optimize_failed("jpeg", "input too large"))?;

    let mut src = Decompressor::new();
    let mut dest = Box::new(MemoryDestination {
        buffer: ptr::null_mut(),
        size: 0,
    });
    let mut dst = Compressor::new();

    // SAFETY: `input`, `src`, `dest` and `dst` all outlive every libjpeg call
    // below; errors unwind out through `unwind_error_exit` and the RAII
    // owners above release libjpeg state.
    unsafe {
        jpeg_mem_src(&mut src.cinfo, input.as_ptr(), input_len);
        if jpeg_read_header(&mut src.cinfo, 1) != 1 {
            return Err(ProcessorError::optimize_failed("jpeg", "no image in stream"));
        }
        let coefficients = jpeg_read_coefficients(&mut src.cinfo);
        if coefficients.is_null() {
            return Err(ProcessorError::optimize_failed(
                "jpeg",
                "failed to read DCT coefficients",
            ));
        }

        // Baseline libjpeg defaults, then Huffman optimization only.
        jpeg_c_set_int_param(&mut dst.cinfo, JINT_COMPRESS_PROFILE, JCP_FASTEST as c_int);
        jpeg_copy_critical_parameters(&src.cinfo, &mut dst.cinfo);
        dst.cinfo.optimize_coding = 1;
        dst.cinfo.write_JFIF_header = 0;
        dst.cinfo.write_Adobe_marker = 0;

        jpeg_mem_dest(&mut dst.cinfo, &mut dest.buffer, &mut dest.size);
        jpeg_write_coefficients(&mut dst.cinfo, coefficients);
        jpeg_finish_compress(&mut dst.cinfo);
        jpeg_finish_decompress(&mut src.cinfo);
    }

    if dest.buffer.is_null() {
        return Err(ProcessorError::optimize_failed("jpeg", "empty output"));
    }
    let len = usize::try_from(dest.size)
        .map_err(|_| ProcessorError::optimize_failed("jpeg", "output too large"))?;
    // SAFETY: libjpeg wrote `size` bytes into `buffer`.
    let output = unsafe { std::slice::from_raw_parts(dest.buffer, len) }.to_vec();
    Ok(output)
}
