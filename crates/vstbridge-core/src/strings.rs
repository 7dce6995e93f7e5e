//! Fixed-capacity C string exchange.

use std::ffi::{c_char, c_void, CStr};

/// A caller-provided output buffer of known capacity.
#[derive(Debug)]
pub struct StringBuffer {
    ptr: *mut u8,
    capacity: usize,
}

impl StringBuffer {
    /// # Safety
    /// `ptr` must be null or writable for `capacity` bytes for as long as the
    /// buffer is used.
    pub unsafe fn from_raw(ptr: *mut c_void, capacity: usize) -> Option<Self> {
        if ptr.is_null() || capacity == 0 {
            return None;
        }
        Some(Self {
            ptr: ptr as *mut u8,
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy `text` in, truncated to `capacity - 1` bytes on a character
    /// boundary, NUL-terminated. Returns the number of bytes written without
    /// the terminator.
    pub fn write(&mut self, text: &str) -> usize {
        let len = truncated_len(text, self.capacity - 1);
        // SAFETY: `len < capacity` and the buffer is writable for `capacity`.
        unsafe {
            std::ptr::copy_nonoverlapping(text.as_ptr(), self.ptr, len);
            *self.ptr.add(len) = 0;
        }
        len
    }
}

fn truncated_len(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    let mut len = max;
    while !text.is_char_boundary(len) {
        len -= 1;
    }
    len
}

/// Read a NUL-terminated string of at most `max` bytes.
///
/// A missing terminator inside the bound yields the first `max` bytes.
///
/// # Safety
/// `ptr` must be null or readable up to its terminator or `max` bytes,
/// whichever comes first.
pub unsafe fn read_c_string(ptr: *const c_void, max: usize) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let bytes = ptr as *const u8;
    let mut len = 0;
    while len < max && *bytes.add(len) != 0 {
        len += 1;
    }
    let slice = std::slice::from_raw_parts(bytes, len);
    Some(String::from_utf8_lossy(slice).into_owned())
}

/// Read a NUL-terminated string with no explicit bound, as used by
/// `CanDo` queries.
///
/// # Safety
/// `ptr` must be null or point at a NUL-terminated string.
pub unsafe fn read_c_str<'a>(ptr: *const c_void) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr as *const c_char).to_str().ok()
}

/// Copy `text` into a fixed field of a `#[repr(C)]` record, truncated and
/// NUL-terminated like [`StringBuffer::write`]. The rest is zeroed.
pub fn write_fixed(field: &mut [u8], text: &str) {
    field.fill(0);
    if field.is_empty() {
        return;
    }
    let len = truncated_len(text, field.len() - 1);
    field[..len].copy_from_slice(&text.as_bytes()[..len]);
}

/// Decode a fixed field up to its first NUL.
pub fn read_fixed(field: &[u8]) -> String {
    let len = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..len]).into_owned()
}

/// Zero-filled scratch space for reading strings back from the other side.
pub struct ReadBuffer {
    bytes: [u8; crate::abi::string_len::HOST_READ],
}

impl ReadBuffer {
    pub fn new() -> Self {
        Self {
            bytes: [0; crate::abi::string_len::HOST_READ],
        }
    }

    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        self.bytes.as_mut_ptr() as *mut c_void
    }

    /// Decode the string the other side wrote, forcing termination at the
    /// end of the buffer.
    pub fn into_string(mut self) -> String {
        let last = self.bytes.len() - 1;
        self.bytes[last] = 0;
        let len = self.bytes.iter().position(|b| *b == 0).unwrap_or(last);
        String::from_utf8_lossy(&self.bytes[..len]).into_owned()
    }
}

impl Default for ReadBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_truncates_with_terminator() {
        let mut storage = [0xffu8; 8];
        let mut buffer =
            unsafe { StringBuffer::from_raw(storage.as_mut_ptr() as *mut c_void, 8) }.unwrap();
        let written = buffer.write("Frequency");
        assert_eq!(written, 7);
        assert_eq!(&storage[..8], b"Frequen\0");
    }

    #[test]
    fn test_write_respects_char_boundary() {
        let mut storage = [0u8; 4];
        let mut buffer =
            unsafe { StringBuffer::from_raw(storage.as_mut_ptr() as *mut c_void, 4) }.unwrap();
        // "aé" is 3 bytes; "aéb" is 4 and must drop the trailing char only.
        assert_eq!(buffer.write("aéb"), 3);
        let text = unsafe { read_c_string(storage.as_ptr() as *const c_void, 4) }.unwrap();
        assert_eq!(text, "aé");
    }

    #[test]
    fn test_null_buffer_rejected() {
        assert!(unsafe { StringBuffer::from_raw(std::ptr::null_mut(), 8) }.is_none());
        assert!(unsafe { read_c_string(std::ptr::null(), 8) }.is_none());
    }

    #[test]
    fn test_read_bounded_without_terminator() {
        let storage = *b"abcdef";
        let text = unsafe { read_c_string(storage.as_ptr() as *const c_void, 4) }.unwrap();
        assert_eq!(text, "abcd");
    }

    #[test]
    fn test_read_buffer_round_trip() {
        let mut read = ReadBuffer::new();
        let mut buffer = unsafe { StringBuffer::from_raw(read.as_mut_ptr(), 64) }.unwrap();
        buffer.write("Acme Audio");
        assert_eq!(read.into_string(), "Acme Audio");
    }

    #[test]
    fn test_fixed_field() {
        let mut field = [0xffu8; 8];
        write_fixed(&mut field, "Surround");
        assert_eq!(&field, b"Surroun\0");
        assert_eq!(read_fixed(&field), "Surroun");

        write_fixed(&mut field, "L");
        assert_eq!(&field, b"L\0\0\0\0\0\0\0");
        assert_eq!(read_fixed(b"full"), "full");
    }
}
