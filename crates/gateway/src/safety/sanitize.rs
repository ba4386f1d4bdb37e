//! Input sanitation.

/// Strip control characters (keeping `\n` and `\t`), normalize line
/// endings, collapse runs of horizontal whitespace, and trim.
pub fn sanitize_message(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_space = false;
    let mut newline_run = 0usize;

    for c in input.replace("\r\n", "\n").chars() {
        match c {
            '\n' => {
                newline_run += 1;
                // Keep paragraph breaks, drop longer runs.
                if newline_run <= 2 {
                    out.push('\n');
                }
                last_was_space = false;
            }
            ' ' | '\t' => {
                newline_run = 0;
                if !last_was_space {
                    out.push(' ');
                }
                last_was_space = true;
            }
            c if c.is_control() => {
                // Dropped entirely.
            }
            c => {
                newline_run = 0;
                last_was_space = false;
                out.push(c);
            }
        }
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters() {
        assert_eq!(sanitize_message("he\u{0}llo\u{7} world"), "hello world");
    }

    #[test]
    fn keeps_newlines_and_converts_tabs() {
        assert_eq!(sanitize_message("a\tb\nc"), "a b\nc");
    }

    #[test]
    fn collapses_whitespace_runs() {
        assert_eq!(sanitize_message("a    b\t\t c"), "a b c");
    }

    #[test]
    fn caps_blank_line_runs() {
        assert_eq!(sanitize_message("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn normalizes_crlf() {
        assert_eq!(sanitize_message("a\r\nb"), "a\nb");
    }

    #[test]
    fn trims_ends() {
        assert_eq!(sanitize_message("  hi  "), "hi");
    }
}
