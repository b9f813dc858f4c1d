use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Display width of a string in terminal columns.
///
/// ```
/// use marquee::util::display_width;
///
/// assert_eq!(display_width("Alien"), 5);
/// assert_eq!(display_width("千と千尋"), 8);
/// ```
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Truncates `s` to at most `max_width` columns, appending "..." when cut.
///
/// Widths too narrow for a character plus the ellipsis return as many whole
/// characters as fit, without an ellipsis.
///
/// ```
/// use marquee::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("The Matrix", 20), "The Matrix");
/// assert_eq!(truncate_to_width("The Matrix Reloaded", 10), "The Mat...");
/// assert_eq!(truncate_to_width("Heat", 2), "He");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }

    let budget = if max_width <= ELLIPSIS_WIDTH {
        max_width
    } else {
        max_width - ELLIPSIS_WIDTH
    };

    let mut used = 0;
    let mut end = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        end = idx + c.len_utf8();
    }

    if max_width <= ELLIPSIS_WIDTH {
        Cow::Owned(s[..end].to_string())
    } else {
        Cow::Owned(format!("{}{}", &s[..end], ELLIPSIS))
    }
}

/// Strips C0 control characters, DEL and ANSI escape sequences from text
/// that came from the catalog API before it is printed to a terminal.
///
/// Tab and newline are kept. Returns `Cow::Borrowed` for clean input.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_control = |c: char| c == '\x7f' || (c < '\x20' && c != '\t' && c != '\n');

    if !s.chars().any(is_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            match chars.peek() {
                // CSI: parameters until a final byte in 0x40..=0x7e
                Some('[') => {
                    chars.next();
                    for n in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&n) {
                            break;
                        }
                    }
                }
                // OSC: until BEL or ESC '\'
                Some(']') => {
                    chars.next();
                    while let Some(n) = chars.next() {
                        if n == '\x07' {
                            break;
                        }
                        if n == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
        } else if !is_control(c) {
            out.push(c);
        }
    }

    Cow::Owned(out)
}
