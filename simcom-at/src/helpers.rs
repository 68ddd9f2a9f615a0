use heapless::String;

/// Wrapper used when tracing raw channel bytes, rendering them as text where
/// they are valid UTF-8 and as escaped bytes otherwise.
pub struct LossyStr<'a>(pub &'a [u8]);

impl core::fmt::Debug for LossyStr<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match core::str::from_utf8(self.0) {
            Ok(s) => write!(f, "{:?}", s),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for LossyStr<'_> {
    fn format(&self, fmt: defmt::Formatter) {
        match core::str::from_utf8(self.0) {
            Ok(s) => defmt::write!(fmt, "{:?}", s),
            Err(_) => defmt::write!(fmt, "{:?}", self.0),
        }
    }
}

/// Append `bytes` to `buf` as text.
///
/// Invalid UTF-8 sequences are replaced by `?`. Returns `false` if `buf` ran
/// out of capacity, in which case everything that did not fit is dropped.
pub fn push_lossy<const N: usize>(buf: &mut String<N>, bytes: &[u8]) -> bool {
    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            if buf.push(c).is_err() {
                return false;
            }
        }
        if !chunk.invalid().is_empty() && buf.push('?').is_err() {
            return false;
        }
    }
    true
}

/// Drop the first `amt` bytes of `buf`, moving `amt` forward to the next
/// character boundary if needed.
pub fn drop_front<const N: usize>(buf: &mut String<N>, amt: usize) {
    let mut amt = amt.min(buf.len());
    while !buf.is_char_boundary(amt) {
        amt += 1;
    }
    let mut rest: String<N> = String::new();
    // `rest` is a suffix of `buf`, so it always fits.
    let _ = rest.push_str(&buf[amt..]);
    *buf = rest;
}
