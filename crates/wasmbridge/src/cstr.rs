//! NUL-terminated UTF-8 strings in linear memory.

use wasmbridge_types::{Error, Result};

use crate::env::Env;
use crate::pointer::Ptr;

/// UTF-8 byte length of `s`. Same as `s.len()`; kept for symmetry with
/// [`jstrlen_utf16`].
pub fn jstrlen(s: &str) -> usize {
    s.len()
}

/// UTF-8 byte length of a UTF-16 sequence without decoding it.
///
/// A surrogate pair counts as one 4-byte sequence. A lone surrogate counts
/// as 3 bytes, the width of the replacement character it decodes to.
pub fn jstrlen_utf16(units: &[u16]) -> usize {
    let mut len = 0;
    let mut i = 0;
    while i < units.len() {
        let u = units[i];
        len += match u {
            0..=0x7F => 1,
            0x80..=0x7FF => 2,
            0xD800..=0xDBFF if matches!(units.get(i + 1), Some(0xDC00..=0xDFFF)) => {
                i += 1;
                4
            }
            _ => 3,
        };
        i += 1;
    }
    len
}

/// Encode `s` into `target` starting at `offset`.
///
/// Writes at most `max_bytes` bytes (`None` means the rest of `target`),
/// including the terminator when `add_nul` is set. A character that does not
/// fit entirely is not written, so up to 3 bytes of the budget may remain
/// unused. Returns the number of bytes written, terminator included.
pub fn jstrcpy(
    s: &str,
    target: &mut [u8],
    offset: usize,
    max_bytes: Option<usize>,
    add_nul: bool,
) -> usize {
    if offset >= target.len() {
        return 0;
    }
    let room = target.len() - offset;
    let max = max_bytes.map_or(room, |m| m.min(room));
    if max == 0 {
        return 0;
    }
    let end = offset + max - usize::from(add_nul);
    let mut i = offset;
    for c in s.chars() {
        let n = c.len_utf8();
        if i + n > end {
            break;
        }
        c.encode_utf8(&mut target[i..i + n]);
        i += n;
    }
    if add_nul {
        target[i] = 0;
        i += 1;
    }
    i - offset
}

/// UTF-8 bytes of `s`, optionally NUL-terminated.
pub fn jstr_to_bytes(s: &str, add_nul: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len() + usize::from(add_nul));
    out.extend_from_slice(s.as_bytes());
    if add_nul {
        out.push(0);
    }
    out
}

impl Env<'_> {
    /// Length in bytes of the C-string at `ptr`, or `None` for null.
    pub fn cstrlen(&mut self, ptr: Ptr) -> Result<Option<usize>> {
        if ptr.is_null() {
            return Ok(None);
        }
        let heap = self.heap_bytes()?;
        let size = heap.len();
        let start = usize::try_from(ptr.get())
            .ok()
            .filter(|s| *s < size)
            .ok_or(Error::MemoryAccess {
                addr: ptr.get(),
                len: 1,
                size: size as u64,
            })?;
        match heap[start..].iter().position(|b| *b == 0) {
            Some(n) => Ok(Some(n)),
            None => Err(Error::MemoryAccess {
                addr: ptr.get(),
                len: (size - start + 1) as u64,
                size: size as u64,
            }),
        }
    }

    /// Decode the C-string at `ptr`. Invalid UTF-8 is replaced.
    pub fn cstr_to_string(&mut self, ptr: Ptr) -> Result<Option<String>> {
        let Some(n) = self.cstrlen(ptr)? else {
            return Ok(None);
        };
        if n == 0 {
            return Ok(Some(String::new()));
        }
        let bytes = self.read_bytes(ptr, n)?;
        Ok(Some(String::from_utf8_lossy(bytes).into_owned()))
    }

    /// [`jstrcpy`] into linear memory at `ptr`.
    pub fn jstrcpy_to_heap(
        &mut self,
        s: &str,
        ptr: Ptr,
        max_bytes: Option<usize>,
        add_nul: bool,
    ) -> Result<usize> {
        let heap = self.heap_bytes_mut()?;
        let size = heap.len();
        let offset = usize::try_from(ptr.get())
            .ok()
            .filter(|o| *o <= size)
            .ok_or(Error::MemoryAccess {
                addr: ptr.get(),
                len: 0,
                size: size as u64,
            })?;
        Ok(jstrcpy(s, heap, offset, max_bytes, add_nul))
    }

    /// Copy up to `n` bytes of the C-string at `src` to `dst`, stopping at
    /// its terminator.
    ///
    /// `dst` is terminated only if the terminator was reached within `n`
    /// bytes. `None` copies the whole string plus terminator. Returns the
    /// number of bytes written.
    pub fn cstrncpy(&mut self, dst: Ptr, src: Ptr, n: Option<usize>) -> Result<usize> {
        if dst.is_null() || src.is_null() {
            return Err(Error::NullPointer("cstrncpy()"));
        }
        let n = match n {
            Some(n) => n,
            None => self.cstrlen(src)?.unwrap_or(0) + 1,
        };
        if n == 0 {
            return Ok(0);
        }
        let heap = self.heap_bytes_mut()?;
        let size = heap.len();
        let oob = |addr: Ptr, len: usize| Error::MemoryAccess {
            addr: addr.get(),
            len: len as u64,
            size: size as u64,
        };
        let s = usize::try_from(src.get()).map_err(|_| oob(src, n))?;
        let d = usize::try_from(dst.get()).map_err(|_| oob(dst, n))?;
        let mut i = 0;
        while i < n {
            let ch = *heap.get(s + i).ok_or_else(|| oob(src, i + 1))?;
            if ch == 0 {
                break;
            }
            *heap.get_mut(d + i).ok_or_else(|| oob(dst, i + 1))? = ch;
            i += 1;
        }
        if i < n {
            *heap.get_mut(d + i).ok_or_else(|| oob(dst, i + 1))? = 0;
            i += 1;
        }
        Ok(i)
    }

    /// Allocate and fill a C-string. The caller owns the block.
    pub fn alloc_cstring(&mut self, s: &str) -> Result<Ptr> {
        self.alloc_cstring_with_len(s).map(|(p, _)| p)
    }

    /// Like [`Env::alloc_cstring`], also returning the byte length
    /// (without terminator).
    pub fn alloc_cstring_with_len(&mut self, s: &str) -> Result<(Ptr, usize)> {
        let n = s.len();
        let ptr = self.alloc(n + 1)?;
        if let Err(err) = self.write_bytes(ptr, &jstr_to_bytes(s, true)) {
            let _ = self.dealloc(ptr);
            return Err(err);
        }
        Ok((ptr, n))
    }

    /// Allocate a C-string owned by the current scope.
    pub fn scoped_alloc_cstring(&mut self, s: &str) -> Result<Ptr> {
        self.scoped_alloc_cstring_with_len(s).map(|(p, _)| p)
    }

    pub fn scoped_alloc_cstring_with_len(&mut self, s: &str) -> Result<(Ptr, usize)> {
        let n = s.len();
        let ptr = self.scoped_alloc(n + 1)?;
        self.write_bytes(ptr, &jstr_to_bytes(s, true))?;
        Ok((ptr, n))
    }

    /// Read `argc` C-string pointers from `argv`. Null entries stay `None`.
    pub fn c_argv_to_vec(&mut self, argc: usize, argv: Ptr) -> Result<Vec<Option<String>>> {
        let width = self.pointer().size() as u64;
        (0..argc as u64)
            .map(|i| {
                let arg = self.peek_ptr(argv.offset(width * i))?;
                self.cstr_to_string(arg)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf16_lengths_match_utf8() {
        for s in ["", "abc", "ß", "€uro", "a😀b", "日本語"] {
            let units: Vec<u16> = s.encode_utf16().collect();
            assert_eq!(jstrlen_utf16(&units), jstrlen(s), "{s}");
        }
        assert_eq!(jstrlen_utf16(&[0xD800]), 3);
    }

    #[test]
    fn copy_never_splits_characters() {
        let mut buf = [0xAAu8; 8];
        // "a😀" is 1 + 4 bytes; a budget of 4 with a terminator leaves room
        // for "a" only.
        let n = jstrcpy("a😀", &mut buf, 0, Some(4), true);
        assert_eq!(n, 2);
        assert_eq!(&buf[..2], b"a\0");
        assert_eq!(buf[2], 0xAA);
    }

    #[test]
    fn copy_uses_rest_of_target() {
        let mut buf = [0xAAu8; 6];
        let n = jstrcpy("héllo", &mut buf, 1, None, false);
        assert_eq!(n, 5);
        assert_eq!(&buf[1..6], "héll".as_bytes());
    }

    #[test]
    fn copy_edge_cases() {
        let mut buf = [0u8; 4];
        assert_eq!(jstrcpy("abc", &mut buf, 0, Some(0), true), 0);
        assert_eq!(jstrcpy("abc", &mut buf, 9, None, true), 0);
        assert_eq!(jstrcpy("abc", &mut buf, 0, Some(1), true), 1);
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn bytes_with_terminator() {
        assert_eq!(jstr_to_bytes("hi", true), b"hi\0");
        assert_eq!(jstr_to_bytes("hi", false), b"hi");
    }
}
