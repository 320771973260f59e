//! Regex option flags.
//!
//! The user-facing flag string is any combination of `aimnsx` in any
//! order; the canonical form is the alphabetically ordered subset, which is
//! what cache keys and `Regex.flags` report.

use std::fmt::{self, Display};

/// Parsed regex options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegexFlags {
    /// `a`: ASCII-only character classes.
    pub ascii: bool,
    /// `i`: case-insensitive matching.
    pub case_insensitive: bool,
    /// `m`: `^`/`$` match at newlines.
    pub multiline: bool,
    /// `n`: numbered groups do not capture; only named groups do.
    pub no_numeric_captures: bool,
    /// `s`: `.` matches newline.
    pub single_line: bool,
    /// `x`: extended whitespace/comments in the pattern.
    pub extended: bool,
}

impl RegexFlags {
    /// Parses a flag string in any order. Unknown flags are a
    /// configuration error; the offending character is returned.
    pub fn parse(flags: &str) -> Result<Self, char> {
        let mut parsed = Self::default();
        for c in flags.chars() {
            match c {
                'a' => parsed.ascii = true,
                'i' => parsed.case_insensitive = true,
                'm' => parsed.multiline = true,
                'n' => parsed.no_numeric_captures = true,
                's' => parsed.single_line = true,
                'x' => parsed.extended = true,
                other => return Err(other),
            }
        }
        Ok(parsed)
    }

    /// The canonical (alphabetically ordered) flag string.
    #[must_use]
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        if self.ascii {
            out.push('a');
        }
        if self.case_insensitive {
            out.push('i');
        }
        if self.multiline {
            out.push('m');
        }
        if self.no_numeric_captures {
            out.push('n');
        }
        if self.single_line {
            out.push('s');
        }
        if self.extended {
            out.push('x');
        }
        out
    }

    /// The inline-flag prefix for the backing engine (`(?ims x)` subset),
    /// or the empty string when no engine flag applies.
    #[must_use]
    pub fn inline_prefix(&self) -> String {
        let mut inner = String::new();
        if self.case_insensitive {
            inner.push('i');
        }
        if self.multiline {
            inner.push('m');
        }
        if self.single_line {
            inner.push('s');
        }
        if self.extended {
            inner.push('x');
        }
        if inner.is_empty() { inner } else { format!("(?{inner})") }
    }
}

impl Display for RegexFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_canonicalize_in_alphabetical_order() {
        let flags = RegexFlags::parse("sxi").unwrap();
        assert_eq!(flags.canonical(), "isx");
        assert_eq!(RegexFlags::parse("").unwrap().canonical(), "");
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert_eq!(RegexFlags::parse("iq"), Err('q'));
    }
}
