//! Page name mangling and text encoding.
//!
//! Page names map to file names by percent-encoding them under the store's
//! configured [`Charset`]. Only ASCII alphanumerics and `-._*` survive
//! unescaped, spaces become `+`, so the path separator always ends up as a
//! literal `%2F` and a page name can never create a subdirectory or climb
//! out of the page directory.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, percent_encode};

/// Bytes kept verbatim in mangled names (matches form URL encoding).
const NAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'*')
    .remove(b' ');

/// Text encoding error.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// A character has no representation in the target charset.
    #[error("character {ch:?} cannot be encoded as {charset}")]
    Unmappable {
        /// Offending character.
        ch: char,
        /// Charset label.
        charset: &'static str,
    },
    /// Bytes are not valid in the source charset.
    #[error("malformed {charset} input at byte {offset}")]
    Malformed {
        /// Byte offset of the first invalid sequence.
        offset: usize,
        /// Charset label.
        charset: &'static str,
    },
    /// Charset label is not supported.
    #[error("unsupported charset: {0}")]
    Unsupported(String),
}

/// Character set used for page text and name mangling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Charset {
    /// UTF-8 (default).
    #[default]
    Utf8,
    /// ISO-8859-1; every byte is a valid character.
    Latin1,
    /// 7-bit US-ASCII.
    Ascii,
}

impl Charset {
    /// Canonical label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Latin1 => "ISO-8859-1",
            Self::Ascii => "US-ASCII",
        }
    }

    /// Strictly encode text, rejecting unmappable characters.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Utf8 => Ok(text.as_bytes().to_vec()),
            Self::Latin1 => self.encode_narrow(text, 0xFF),
            Self::Ascii => self.encode_narrow(text, 0x7F),
        }
    }

    fn encode_narrow(self, text: &str, max: u32) -> Result<Vec<u8>, CodecError> {
        text.chars()
            .map(|ch| {
                u8::try_from(u32::from(ch))
                    .ok()
                    .filter(|b| u32::from(*b) <= max)
                    .ok_or(CodecError::Unmappable {
                        ch,
                        charset: self.label(),
                    })
            })
            .collect()
    }

    /// Strictly decode bytes, rejecting malformed input.
    pub fn decode(self, bytes: &[u8]) -> Result<String, CodecError> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|e| CodecError::Malformed {
                    offset: e.valid_up_to(),
                    charset: self.label(),
                }),
            Self::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            Self::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(offset) => Err(CodecError::Malformed {
                    offset,
                    charset: self.label(),
                }),
                None => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
            },
        }
    }
}

impl FromStr for Charset {
    type Err = CodecError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label.to_ascii_lowercase().replace('_', "-").as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(Self::Latin1),
            "us-ascii" | "ascii" => Ok(Self::Ascii),
            _ => Err(CodecError::Unsupported(label.to_owned())),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Decode with the primary charset, retrying once with the fallback.
///
/// Both attempts are strict. If both fail, the primary charset's error is
/// returned.
pub fn decode_with_fallback(
    bytes: &[u8],
    primary: Charset,
    fallback: Charset,
) -> Result<String, CodecError> {
    match primary.decode(bytes) {
        Ok(text) => Ok(text),
        Err(primary_err) => {
            tracing::debug!(
                primary = %primary,
                fallback = %fallback,
                error = %primary_err,
                "Primary decode failed, trying fallback charset"
            );
            fallback.decode(bytes).map_err(|_| primary_err)
        }
    }
}

/// URL-encode a value under the given charset.
///
/// Spaces become `+`; everything outside `A-Za-z0-9-._*` is escaped.
pub fn url_encode(value: &str, charset: Charset) -> Result<String, CodecError> {
    let bytes = charset.encode(value)?;
    Ok(percent_encode(&bytes, NAME_ENCODE_SET)
        .to_string()
        .replace(' ', "+"))
}

/// Reverse [`url_encode`].
pub fn url_decode(value: &str, charset: Charset) -> Result<String, CodecError> {
    let plus_decoded = value.replace('+', " ");
    let bytes: Vec<u8> = percent_decode_str(&plus_decoded).collect();
    charset.decode(&bytes)
}

/// Convert a page name into its on-disk base name (without suffix).
pub fn mangle_name(name: &str, charset: Charset) -> Result<String, CodecError> {
    let mangled = url_encode(name, charset)?;
    debug_assert!(!mangled.contains('/'));
    Ok(mangled)
}

/// Convert an on-disk base name back to the page name.
pub fn unmangle_name(mangled: &str, charset: Charset) -> Result<String, CodecError> {
    url_decode(mangled, charset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mangle_plain_name_unchanged() {
        assert_eq!(mangle_name("MainPage", Charset::Utf8).unwrap(), "MainPage");
    }

    #[test]
    fn test_mangle_escapes_path_separator() {
        let mangled = mangle_name("../etc/passwd", Charset::Utf8).unwrap();

        assert_eq!(mangled, "..%2Fetc%2Fpasswd");
        assert!(!mangled.contains('/'));
    }

    #[test]
    fn test_mangle_space_and_plus() {
        assert_eq!(mangle_name("A b+c", Charset::Utf8).unwrap(), "A+b%2Bc");
        assert_eq!(unmangle_name("A+b%2Bc", Charset::Utf8).unwrap(), "A b+c");
    }

    #[test]
    fn test_mangle_non_ascii_utf8() {
        let mangled = mangle_name("Päivä", Charset::Utf8).unwrap();

        assert_eq!(mangled, "P%C3%A4iv%C3%A4");
        assert_eq!(unmangle_name(&mangled, Charset::Utf8).unwrap(), "Päivä");
    }

    #[test]
    fn test_mangle_non_ascii_latin1() {
        let mangled = mangle_name("Päivä", Charset::Latin1).unwrap();

        assert_eq!(mangled, "P%E4iv%E4");
        assert_eq!(unmangle_name(&mangled, Charset::Latin1).unwrap(), "Päivä");
    }

    #[test]
    fn test_mangle_unmappable_in_latin1() {
        let err = mangle_name("Euro €", Charset::Latin1).unwrap_err();

        assert!(matches!(err, CodecError::Unmappable { ch: '€', .. }));
    }

    #[test]
    fn test_decode_utf8_strict() {
        let err = Charset::Utf8.decode(&[b'a', 0xE4, b'b']).unwrap_err();

        assert_eq!(
            err,
            CodecError::Malformed {
                offset: 1,
                charset: "UTF-8"
            }
        );
    }

    #[test]
    fn test_decode_with_fallback_uses_latin1() {
        let text = decode_with_fallback(&[b'a', 0xE4, b'b'], Charset::Utf8, Charset::Latin1)
            .unwrap();

        assert_eq!(text, "aäb");
    }

    #[test]
    fn test_decode_with_fallback_both_fail() {
        let err =
            decode_with_fallback(&[0xE4], Charset::Utf8, Charset::Ascii).unwrap_err();

        assert!(matches!(err, CodecError::Malformed { charset: "UTF-8", .. }));
    }

    #[test]
    fn test_charset_from_str() {
        assert_eq!("UTF-8".parse::<Charset>().unwrap(), Charset::Utf8);
        assert_eq!("iso_8859_1".parse::<Charset>().unwrap(), Charset::Latin1);
        assert_eq!("US-ASCII".parse::<Charset>().unwrap(), Charset::Ascii);
        assert!("EBCDIC".parse::<Charset>().is_err());
    }
}
