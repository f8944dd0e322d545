//! Byte-level tokenizer shared by the index builder and the query side.
//!
//! Text is never decoded: any byte with the high bit set counts as part of a
//! word, so multi-byte UTF-8 sequences pass through intact and token
//! boundaries only ever fall on ASCII bytes.

/// ASCII alphanumerics and every non-ASCII byte are word bytes.
#[inline]
pub fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b >= 0x80
}

/// Whether the byte at `i` belongs to a token, taking the neighbouring bytes
/// into account for the four conditional punctuation bytes.
fn is_token_byte(text: &[u8], i: usize) -> bool {
    let c = text[i];
    if is_word_byte(c) {
        return true;
    }
    let prev = i.checked_sub(1).map(|p| text[p]);
    let next = text.get(i + 1).copied();
    match c {
        // intra-word only: "e.g", "snake_case", "well-known"
        b'.' | b'_' | b'-' => matches!(
            (prev, next),
            (Some(p), Some(n)) if is_word_byte(p) && is_word_byte(n)
        ),
        // trailing: "c++", "g++"
        b'+' => matches!(prev, Some(p) if is_word_byte(p) || p == b'+'),
        _ => false,
    }
}

/// Lowercase ASCII letters and the part of the Cyrillic capital block that
/// the index has always folded.
///
/// `D0 90..=D0 9F` (А..П) maps to `D0 B0..=D0 BF` and `D0 A0..=D0 AF` (Р..Я)
/// maps to `D1 80..=D1 8F`. Ё (`D0 81`) and the other letters of the block are
/// left as they are; persisted dictionaries depend on exactly this mapping.
pub fn fold_case(bytes: &mut [u8]) {
    let len = bytes.len();
    for i in 0..len {
        let c = bytes[i];
        if c.is_ascii_uppercase() {
            bytes[i] = c + 32;
        }
        if c == 0xD0 && i + 1 < len {
            let next = bytes[i + 1];
            if (0x90..=0xAF).contains(&next) {
                if next <= 0x9F {
                    bytes[i + 1] = next + 0x20;
                } else {
                    bytes[i] = 0xD1;
                    bytes[i + 1] = next - 0x20;
                }
            }
        }
    }
}

/// Fold a raw term the same way indexed tokens are folded.
pub fn normalize(term: &[u8]) -> Vec<u8> {
    let mut out = term.to_vec();
    fold_case(&mut out);
    out
}

/// Number of UTF-8 characters in a token (continuation bytes are not counted).
pub fn char_count(token: &[u8]) -> usize {
    token.iter().filter(|&&b| (b & 0xC0) != 0x80).count()
}

/// Iterator over the normalized tokens of a byte slice.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    text: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        let mut start: Option<usize> = None;
        while self.pos < self.text.len() {
            let i = self.pos;
            self.pos += 1;
            if is_token_byte(self.text, i) {
                start.get_or_insert(i);
            } else if let Some(s) = start {
                return Some(normalize(&self.text[s..i]));
            }
        }
        start.map(|s| normalize(&self.text[s..]))
    }
}

/// Split text into case-folded word tokens, in order of appearance.
pub fn tokenize(text: &[u8]) -> Tokens<'_> {
    Tokens { text, pos: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<String> {
        tokenize(text.as_bytes())
            .map(|t| String::from_utf8(t).unwrap())
            .collect()
    }

    #[test]
    fn basic_tokenize() {
        assert_eq!(words("The cat, sat!"), vec!["the", "cat", "sat"]);
    }

    #[test]
    fn empty_and_separator_only_input() {
        assert!(words("").is_empty());
        assert!(words(" ,;\t\n ").is_empty());
    }

    #[test]
    fn intra_word_punctuation() {
        assert_eq!(words("e.g. foo_bar well-known"), vec!["e.g", "foo_bar", "well-known"]);
        assert_eq!(words(".start end. -x y- _z"), vec!["start", "end", "x", "y", "z"]);
        assert_eq!(words("a--b"), vec!["a", "b"]);
    }

    #[test]
    fn plus_is_word_trailing() {
        assert_eq!(words("C++ and g++."), vec!["c++", "and", "g++"]);
        assert_eq!(words("+x"), vec!["x"]);
        // the second '+' only looks at the raw previous byte
        assert_eq!(words(" ++"), vec!["+"]);
    }

    #[test]
    fn non_ascii_bytes_are_word_bytes() {
        assert_eq!(words("über café"), vec!["über", "café"]);
        assert_eq!(words("Привет, МИР"), vec!["привет", "мир"]);
    }

    #[test]
    fn cyrillic_folding_is_partial() {
        assert_eq!(normalize("АПРЯ".as_bytes()), "апря".as_bytes());
        // Ё sits outside the folded range
        assert_eq!(normalize("Ё".as_bytes()), "Ё".as_bytes());
    }

    #[test]
    fn char_count_skips_continuation_bytes() {
        assert_eq!(char_count("мир".as_bytes()), 3);
        assert_eq!(char_count(b"cat"), 3);
    }
}
