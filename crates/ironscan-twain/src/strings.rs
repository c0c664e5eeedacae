use core::fmt;

/// Fixed-size, nul-terminated string buffer embedded in protocol records (`TW_STR32`, `TW_STR255`).
///
/// The buffer always keeps a terminating nul byte. Encoding is whatever the data source manager
/// uses on the platform; UTF-8 text is written as is and read back lossily.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedStr<const N: usize>([u8; N]);

/// `TW_STR32`, padded to an even size like the native record.
pub type Str32 = FixedStr<34>;

/// `TW_STR255`, padded to an even size like the native record.
pub type Str255 = FixedStr<256>;

impl<const N: usize> FixedStr<N> {
    /// Maximum number of text bytes, excluding the terminator.
    pub const CAPACITY: usize = N - 1;

    pub const fn empty() -> Self {
        Self([0; N])
    }

    /// Builds a buffer from `value`, truncating on a character boundary if it does not fit.
    pub fn new(value: &str) -> Self {
        let mut len = value.len().min(Self::CAPACITY);
        while !value.is_char_boundary(len) {
            len -= 1;
        }

        let mut buf = [0; N];
        buf[..len].copy_from_slice(&value.as_bytes()[..len]);

        Self(buf)
    }

    /// Text bytes up to, and excluding, the first nul.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(N);
        &self.0[..len]
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl<const N: usize> Default for FixedStr<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> From<&str> for FixedStr<N> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<const N: usize> PartialEq<str> for FixedStr<N> {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const N: usize> PartialEq<&str> for FixedStr<N> {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const N: usize> fmt::Debug for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl<const N: usize> fmt::Display for FixedStr<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("", "")]
    #[case("Acme", "Acme")]
    #[case("0123456789abcdef0123456789abcdefX", "0123456789abcdef0123456789abcdefX")]
    #[case("0123456789abcdef0123456789abcdefXYZ", "0123456789abcdef0123456789abcdefX")]
    fn str32_truncation(#[case] input: &str, #[case] expected: &str) {
        let s = Str32::new(input);
        assert_eq!(s, expected);
    }

    #[test]
    fn truncation_keeps_char_boundary() {
        // 32 ASCII bytes leave room for a single byte; 'é' needs two.
        let input = format!("{}é", "a".repeat(32));
        let s = Str32::new(&input);
        assert_eq!(s.as_bytes().len(), 32);
        assert_eq!(s.to_string_lossy(), "a".repeat(32));
        assert_eq!(Str32::CAPACITY, 33);
    }

    #[test]
    fn always_nul_terminated() {
        let s = Str255::new(&"x".repeat(400));
        assert_eq!(s.as_bytes().len(), Str255::CAPACITY);
    }
}
