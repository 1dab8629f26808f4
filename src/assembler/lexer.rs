//! Tokenizes a single assembly source line (spec.md §6.2).
//!
//! `[label ':'] [opcode [operand]] ['#' comment]`. Blank lines and
//! comment-only lines tokenize to [`None`].

/// One non-blank source line, split into its grammar pieces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// A label definition attached to this line, if any (without the `:`).
    pub label: Option<String>,
    /// The opcode mnemonic, if this line carries an instruction.
    pub opcode: Option<String>,
    /// The operand token (decimal literal or label reference), if present.
    pub operand: Option<String>,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_valid_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) => {}
        _ => return false,
    }
    chars.all(is_ident_continue)
}

/// Tokenizes one line. Returns `None` for blank or comment-only lines.
pub fn tokenize_line(line: &str) -> Option<RawLine> {
    let without_comment = match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let trimmed = without_comment.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut tokens = trimmed.split_whitespace();
    let mut first = tokens.next()?;

    let label = if let Some(stripped) = first.strip_suffix(':') {
        let label = stripped.to_string();
        first = tokens.next().unwrap_or("");
        Some(label)
    } else {
        None
    };

    if first.is_empty() {
        return Some(RawLine {
            label,
            opcode: None,
            operand: None,
        });
    }

    let opcode = Some(first.to_string());
    let operand = tokens.next().map(|t| t.to_string());

    Some(RawLine { label, opcode, operand })
}

/// `true` if `s` is a syntactically valid label/identifier.
pub fn is_identifier(s: &str) -> bool {
    is_valid_ident(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_comment_lines_are_none() {
        assert_eq!(tokenize_line(""), None);
        assert_eq!(tokenize_line("   "), None);
        assert_eq!(tokenize_line("# just a comment"), None);
    }

    #[test]
    fn label_only_line() {
        let l = tokenize_line("loop:").unwrap();
        assert_eq!(l.label.as_deref(), Some("loop"));
        assert_eq!(l.opcode, None);
    }

    #[test]
    fn label_and_instruction_same_line() {
        let l = tokenize_line("loop: JNZ loop # back edge").unwrap();
        assert_eq!(l.label.as_deref(), Some("loop"));
        assert_eq!(l.opcode.as_deref(), Some("JNZ"));
        assert_eq!(l.operand.as_deref(), Some("loop"));
    }

    #[test]
    fn instruction_without_label() {
        let l = tokenize_line("  PUSH  72  ").unwrap();
        assert_eq!(l.label, None);
        assert_eq!(l.opcode.as_deref(), Some("PUSH"));
        assert_eq!(l.operand.as_deref(), Some("72"));
    }
}
