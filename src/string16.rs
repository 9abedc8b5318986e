// Owned UTF-16 payload buffers
//
// Protocol payloads cross the bridge as UTF-16, matching the engine's
// internal string representation. The wire side is UTF-8.

/// An owned UTF-16 code-unit buffer.
///
/// Each queue entry owns its payload exclusively; ownership moves to the
/// draining thread when the entry is popped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct String16 {
    units: Vec<u16>,
}

impl String16 {
    pub fn new() -> Self {
        Self { units: Vec::new() }
    }

    /// Encode a UTF-8 string into an owned UTF-16 buffer.
    pub fn from_utf8(text: &str) -> Self {
        Self {
            units: text.encode_utf16().collect(),
        }
    }

    /// Copy a borrowed UTF-16 view into an owned buffer.
    pub fn from_units(units: &[u16]) -> Self {
        Self {
            units: units.to_vec(),
        }
    }

    /// Borrow the buffer as a code-unit view.
    pub fn as_view(&self) -> &[u16] {
        &self.units
    }

    /// Decode back to UTF-8. Unpaired surrogates are substituted with the
    /// replacement character rather than failing.
    pub fn to_utf8(&self) -> String {
        String::from_utf16_lossy(&self.units)
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }
}

impl From<&str> for String16 {
    fn from(text: &str) -> Self {
        Self::from_utf8(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_ascii() {
        let buf = String16::from_utf8("{\"id\":1}");
        assert_eq!(buf.to_utf8(), "{\"id\":1}");
    }

    #[test]
    fn round_trips_non_bmp_code_points() {
        // Code points above U+FFFF become surrogate pairs in UTF-16.
        let text = "pause at λ → 🦀";
        let buf = String16::from_utf8(text);
        assert_eq!(buf.len(), text.encode_utf16().count());
        assert_eq!(buf.to_utf8(), text);
    }

    #[test]
    fn empty_payloads_are_empty() {
        let buf = String16::from_utf8("");
        assert!(buf.is_empty());
        assert_eq!(buf.as_view(), &[] as &[u16]);
        assert_eq!(buf.to_utf8(), "");
    }

    #[test]
    fn lossy_decode_substitutes_unpaired_surrogates() {
        let buf = String16::from_units(&[0x0068, 0x0069, 0xD800]);
        assert_eq!(buf.to_utf8(), "hi\u{FFFD}");
    }
}
