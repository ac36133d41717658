use unicode_width::UnicodeWidthChar;

/// Reflows `text` so that no line is wider than `width` terminal columns.
///
/// Extracted text carries unreliable line structure, so breaks are only kept
/// when they arrive while the current line still has room; a break landing
/// on a full line is absorbed by the wrap that already happened there.
pub fn wrap(text: &str, width: usize) -> String {
    if width == 0 || visual_width(text) < width {
        return text.to_owned();
    }

    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    let mut used = 0usize;
    let mut wrapped_here = false;

    for ch in text.chars() {
        if ch == '\n' {
            if !wrapped_here {
                lines.push(std::mem::take(&mut line));
                used = 0;
            }
            wrapped_here = false;
            continue;
        }

        let ch = if ch == '\t' { ' ' } else { ch };
        let Some(glyph_width) = ch.width() else {
            // control characters
            continue;
        };
        wrapped_here = false;

        if used + glyph_width > width && !line.is_empty() {
            lines.push(std::mem::take(&mut line));
            used = 0;
        }

        line.push(ch);
        used += glyph_width;

        if used >= width {
            lines.push(std::mem::take(&mut line));
            used = 0;
            wrapped_here = true;
        }
    }

    if !line.is_empty() {
        lines.push(line);
    }

    lines.join("\n")
}

fn visual_width(text: &str) -> usize {
    text.chars().map(|ch| ch.width().unwrap_or(0)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use unicode_width::UnicodeWidthStr;

    fn widest_line(text: &str) -> usize {
        text.lines()
            .map(UnicodeWidthStr::width)
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn short_text_is_untouched() {
        let text = "short\r\n\tline";
        assert_eq!(wrap(text, 80), text);
    }

    #[test]
    fn zero_width_is_a_no_op() {
        assert_eq!(wrap("anything at all", 0), "anything at all");
    }

    #[test]
    fn long_text_is_split_at_width() {
        let wrapped = wrap("abcdefghij", 4);
        assert_eq!(wrapped, "abcd\nefgh\nij");
    }

    #[test]
    fn breaks_with_room_are_kept() {
        let wrapped = wrap("ab\ncdefgh", 4);
        assert_eq!(wrapped, "ab\ncdef\ngh");
    }

    #[test]
    fn break_on_full_line_is_folded() {
        let wrapped = wrap("abcd\nefgh", 4);
        assert_eq!(wrapped, "abcd\nefgh");
    }

    #[test]
    fn wide_glyphs_take_two_columns() {
        let wrapped = wrap("日本語のテキスト", 5);
        for line in wrapped.lines() {
            assert!(UnicodeWidthStr::width(line) <= 5, "{line:?} too wide");
        }
        assert_eq!(wrapped.lines().next(), Some("日本"));
    }

    #[test]
    fn no_line_exceeds_width() {
        let samples = [
            "Lorem ipsum dolor sit amet, consectetur adipiscing elit.\nSed do eiusmod tempor.",
            "ação função informação\n\n\ncoração 日本語 mixed ﬁ ligatures and\ttabs",
            &"x".repeat(500),
        ];
        for width in 2..40 {
            for sample in samples {
                let wrapped = wrap(sample, width);
                assert!(
                    widest_line(&wrapped) <= width,
                    "width {width} violated for {sample:?}"
                );
            }
        }
    }

    #[test]
    fn no_glyph_is_lost() {
        let text = "The quick brown fox jumps over the lazy dog";
        let wrapped = wrap(text, 7);
        let original: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let reflowed: String = wrapped.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(original, reflowed);
    }
}
