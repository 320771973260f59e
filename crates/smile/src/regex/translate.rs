//! Pattern translation from the user-facing regex dialect to the backing
//! engine.
//!
//! Three things the backing engine has no options for are rewritten here:
//!
//! * the `n` flag (numbered groups become non-capturing): plain `(` turns
//!   into `(?:` outside character classes;
//! * the `a` flag (ASCII-only classes): `\d`/`\w`/`\s` and their negations
//!   narrow to explicit ASCII ranges;
//! * duplicate named groups (allowed in the user dialect, rejected by the
//!   engine): later duplicates are renamed, and the original spelling is
//!   recorded next to each group index so match construction can apply the
//!   first-non-empty rule.

use super::flags::RegexFlags;

/// The result of translating a pattern.
#[derive(Debug, Clone, Default)]
pub struct TranslatedPattern {
    /// The engine-ready pattern, inline flags included.
    pub pattern: String,
    /// `(original_name, group_index)` for every named group, in order of
    /// appearance. Duplicate names appear once per occurrence.
    pub group_names: Vec<(String, usize)>,
    /// Total number of capturing groups.
    pub group_count: usize,
}

const ASCII_DIGIT: &str = "0-9";
const ASCII_WORD: &str = "0-9A-Za-z_";
const ASCII_SPACE: &str = " \\t\\n\\r\\x0B\\x0C";

/// Translates `pattern` under `flags` into the backing engine's dialect.
#[must_use]
pub fn translate(pattern: &str, flags: RegexFlags) -> TranslatedPattern {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str(&flags.inline_prefix());

    let bytes = pattern.as_bytes();
    let mut result = TranslatedPattern::default();
    let mut seen_names: Vec<String> = Vec::new();
    let mut in_class = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\\' if i + 1 < bytes.len() => {
                let next = bytes[i + 1];
                if flags.ascii {
                    if let Some(rewritten) = ascii_class_for(next, in_class) {
                        out.push_str(&rewritten);
                        i += 2;
                        continue;
                    }
                }
                out.push('\\');
                out.push(char::from(next));
                i += 2;
            }
            b'[' if !in_class => {
                in_class = true;
                out.push('[');
                i += 1;
                // `[^` and a leading literal `]` are part of the class
                // opening, not its body.
                if bytes.get(i) == Some(&b'^') {
                    out.push('^');
                    i += 1;
                }
                if bytes.get(i) == Some(&b']') {
                    out.push_str("\\]");
                    i += 1;
                }
            }
            b']' if in_class => {
                in_class = false;
                out.push(']');
                i += 1;
            }
            b'(' if !in_class => {
                i += 1;
                if bytes.get(i) == Some(&b'?') {
                    // Named groups capture; everything else `(?…` passes
                    // through (non-capturing, lookaround, conditionals).
                    if let Some((name, name_end)) = parse_group_name(bytes, i + 1) {
                        result.group_count += 1;
                        let emitted = if seen_names.iter().any(|n| n == &name) {
                            format!("{name}_dup{}", result.group_count)
                        } else {
                            name.clone()
                        };
                        seen_names.push(name.clone());
                        result.group_names.push((name, result.group_count));
                        out.push_str("(?<");
                        out.push_str(&emitted);
                        out.push('>');
                        i = name_end;
                    } else {
                        out.push('(');
                    }
                } else if flags.no_numeric_captures {
                    out.push_str("(?:");
                } else {
                    result.group_count += 1;
                    out.push('(');
                }
            }
            _ => {
                out.push(char::from(b));
                i += 1;
            }
        }
    }

    result.pattern = out;
    result
}

/// Recognizes `?<name>` and `?P<name>` starting at `at` (which points just
/// past the `?`). Returns the name and the index just past the closing
/// `>`. Lookbehind (`?<=`, `?<!`) is not a name.
fn parse_group_name(bytes: &[u8], at: usize) -> Option<(String, usize)> {
    let mut i = at;
    if bytes.get(i) == Some(&b'P') {
        i += 1;
    }
    if bytes.get(i) != Some(&b'<') {
        return None;
    }
    i += 1;
    if matches!(bytes.get(i), Some(&b'=') | Some(&b'!')) {
        return None; // lookbehind
    }
    let name_start = i;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    if i == name_start || bytes.get(i) != Some(&b'>') {
        return None;
    }
    let name = String::from_utf8_lossy(&bytes[name_start..i]).into_owned();
    Some((name, i + 1))
}

fn ascii_class_for(escape: u8, in_class: bool) -> Option<String> {
    let body = match escape {
        b'd' => ASCII_DIGIT,
        b'w' => ASCII_WORD,
        b's' => ASCII_SPACE,
        b'D' | b'W' | b'S' if !in_class => {
            let body = match escape {
                b'D' => ASCII_DIGIT,
                b'W' => ASCII_WORD,
                _ => ASCII_SPACE,
            };
            return Some(format!("[^{body}]"));
        }
        _ => return None,
    };
    Some(if in_class { body.to_string() } else { format!("[{body}]") })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regex::flags::RegexFlags;

    #[test]
    fn plain_patterns_pass_through() {
        let t = translate("a(b)c", RegexFlags::default());
        assert_eq!(t.pattern, "a(b)c");
        assert_eq!(t.group_count, 1);
        assert!(t.group_names.is_empty());
    }

    #[test]
    fn inline_flags_are_prefixed() {
        let flags = RegexFlags::parse("is").unwrap();
        let t = translate("a.b", flags);
        assert_eq!(t.pattern, "(?is)a.b");
    }

    #[test]
    fn n_flag_uncaptures_plain_groups() {
        let flags = RegexFlags::parse("n").unwrap();
        let t = translate("(a)(?<x>b)", flags);
        assert_eq!(t.pattern, "(?:a)(?<x>b)");
        assert_eq!(t.group_count, 1);
        assert_eq!(t.group_names, vec![("x".to_string(), 1)]);
    }

    #[test]
    fn duplicate_names_are_renamed_but_recorded() {
        let t = translate("(?<n>a)|(?<n>b)", RegexFlags::default());
        assert_eq!(t.pattern, "(?<n>a)|(?<n_dup2>b)");
        assert_eq!(t.group_names, vec![("n".to_string(), 1), ("n".to_string(), 2)]);
        assert_eq!(t.group_count, 2);
    }

    #[test]
    fn ascii_flag_narrows_classes() {
        let flags = RegexFlags::parse("a").unwrap();
        let t = translate(r"\d+[\w]\D", flags);
        assert_eq!(t.pattern, r"[0-9]+[0-9A-Za-z_][^0-9]");
    }

    #[test]
    fn lookbehind_is_not_a_named_group() {
        let t = translate(r"(?<=x)y", RegexFlags::default());
        assert_eq!(t.pattern, r"(?<=x)y");
        assert_eq!(t.group_count, 0);
    }

    #[test]
    fn class_bodies_are_left_alone() {
        let t = translate("[(](a)", RegexFlags::default());
        assert_eq!(t.pattern, "[(](a)");
        assert_eq!(t.group_count, 1);
    }
}
