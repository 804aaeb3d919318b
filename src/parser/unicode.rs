//! N-Triples unicode-escape decoding (`\uXXXX`, `\UXXXXXXXX`).

/// Decode N-Triples UCHAR escapes in-place over a whole line.
///
/// See <https://www.w3.org/TR/n-triples/#grammar-production-UCHAR>. Invalid
/// escapes (bad hex digits, or a code point with no valid `char` mapping —
/// e.g. a lone surrogate half) are left verbatim rather than causing a panic;
/// the caller treats the surrounding line as malformed if that matters.
pub fn decode_unicode_escapes(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() && (bytes[i + 1] == b'U' || bytes[i + 1] == b'u') {
            let digits = if bytes[i + 1] == b'U' { 8 } else { 4 };
            let start = i + 2;
            let end = start + digits;
            if end <= bytes.len() {
                if let Ok(hex) = std::str::from_utf8(&bytes[start..end]) {
                    if let Ok(code) = u32::from_str_radix(hex, 16) {
                        if let Some(ch) = char::from_u32(code) {
                            out.push(ch);
                            i = end;
                            continue;
                        }
                    }
                }
            }
        }
        // Fall back: copy one UTF-8 scalar value verbatim. Since we're
        // walking validated `&str` bytes, re-slicing from a char boundary is
        // safe; find the next boundary by re-decoding from `i`.
        let rest = &s[i..];
        let ch = rest.chars().next().expect("non-empty remainder");
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}
