//! Source scanner
//!
//! Splits file content into logical lines: physical lines joined on a
//! trailing backslash, with comments removed. Each logical line is
//! classified as a preprocessor directive or ordinary code and carries the
//! number of physical lines in it that hold actual code (SLOC).
//!
//! A directive is only recognized when `#` is the first non-blank character
//! of a logical line that did not start inside a block comment, so `#`
//! inside comments, string literals or raw strings never opens a directive.

use platmap_core::LineRange;

/// One logical source line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Physical lines spanned by this logical line
    pub lines: LineRange,
    /// Physical lines in the span that contain code
    pub sloc: u32,
    pub kind: LineKind,
}

/// Classification of a logical line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Code,
    /// Directive text after the `#`, comments removed and trimmed
    Directive(String),
}

/// Scanned file
#[derive(Debug, Clone, Default)]
pub struct SourceScan {
    pub lines: Vec<LogicalLine>,
    /// Number of physical lines in the file
    pub physical_lines: u32,
}

impl SourceScan {
    /// Total SLOC of the file
    pub fn sloc(&self) -> u32 {
        self.lines.iter().map(|l| l.sloc).sum()
    }
}

/// Lexical state carried between physical lines
#[derive(Debug, Default)]
struct Stripper {
    in_block_comment: bool,
    in_line_comment: bool,
    /// Open `"` or `'` literal, only carried across a line splice
    in_literal: Option<char>,
    /// Closing delimiter of an open raw string literal, e.g. `)xyz"`
    in_raw_string: Option<String>,
}

impl Stripper {
    /// Strip one physical line segment.
    ///
    /// Returns the segment with comments replaced by a space and whether
    /// anything other than whitespace and comments was present.
    fn strip_segment(&mut self, segment: &str) -> (String, bool) {
        let chars: Vec<char> = segment.chars().collect();
        let mut out = String::with_capacity(segment.len());
        let mut has_code = false;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            if self.in_line_comment {
                break;
            }

            if self.in_block_comment {
                if c == '*' && chars.get(i + 1) == Some(&'/') {
                    self.in_block_comment = false;
                    out.push(' ');
                    i += 2;
                } else {
                    i += 1;
                }
                continue;
            }

            if let Some(close) = &self.in_raw_string {
                has_code = true;
                if chars[i..].starts_with(&close.chars().collect::<Vec<_>>()) {
                    out.push_str(close);
                    i += close.chars().count();
                    self.in_raw_string = None;
                } else {
                    out.push(c);
                    i += 1;
                }
                continue;
            }

            if let Some(quote) = self.in_literal {
                has_code = true;
                out.push(c);
                if c == '\\' {
                    if let Some(&next) = chars.get(i + 1) {
                        out.push(next);
                        i += 2;
                        continue;
                    }
                } else if c == quote {
                    self.in_literal = None;
                }
                i += 1;
                continue;
            }

            match c {
                '/' if chars.get(i + 1) == Some(&'/') => {
                    self.in_line_comment = true;
                    break;
                }
                '/' if chars.get(i + 1) == Some(&'*') => {
                    self.in_block_comment = true;
                    i += 2;
                }
                '"' => {
                    has_code = true;
                    if let Some(close) = raw_string_close(&chars, i) {
                        // Copy the opening `R"delim(` verbatim.
                        let open_len = close.chars().count();
                        for &ch in &chars[i..i + open_len] {
                            out.push(ch);
                        }
                        i += open_len;
                        self.in_raw_string = Some(close);
                    } else {
                        out.push(c);
                        self.in_literal = Some('"');
                        i += 1;
                    }
                }
                '\'' => {
                    has_code = true;
                    out.push(c);
                    if !is_digit_separator(&out) {
                        self.in_literal = Some('\'');
                    }
                    i += 1;
                }
                _ => {
                    if !c.is_whitespace() {
                        has_code = true;
                    }
                    out.push(c);
                    i += 1;
                }
            }
        }

        (out, has_code)
    }

    /// Reset state that does not survive the end of a logical line
    fn end_logical_line(&mut self) {
        self.in_line_comment = false;
        self.in_literal = None;
    }
}

/// If the `"` at `quote` opens a raw string (`R"delim(`), return the
/// closing sequence `)delim"`.
fn raw_string_close(chars: &[char], quote: usize) -> Option<String> {
    if quote == 0 || chars[quote - 1] != 'R' {
        return None;
    }
    // `R` must start the literal prefix, not end an identifier like `FOOR`.
    let mut p = quote - 1;
    while p > 0 && matches!(chars[p - 1], 'u' | 'U' | 'L' | '8') {
        p -= 1;
    }
    if p > 0 && (chars[p - 1].is_ascii_alphanumeric() || chars[p - 1] == '_') {
        return None;
    }

    let mut delim = String::new();
    for &c in chars.iter().skip(quote + 1) {
        if c == '(' {
            return Some(format!("){}\"", delim));
        }
        if c.is_whitespace() || c == ')' || c == '\\' || delim.len() >= 16 {
            return None;
        }
        delim.push(c);
    }
    None
}

/// A `'` just pushed onto `out` is a C++14 digit separator when the token
/// it sits in started with a digit (`1'000`, `0xFF'FF`).
fn is_digit_separator(out: &str) -> bool {
    let before = &out[..out.len() - 1];
    let token: Vec<char> = before
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '\'' || *c == '.')
        .collect();
    matches!(token.last(), Some(c) if c.is_ascii_digit())
}

/// Split content into physical lines; a trailing newline does not start
/// another line.
fn physical_lines(source: &str) -> Vec<&str> {
    if source.is_empty() {
        return vec![];
    }
    let mut lines: Vec<&str> = source.split('\n').collect();
    if source.ends_with('\n') {
        lines.pop();
    }
    lines
        .into_iter()
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect()
}

/// Scan file content into logical lines
pub fn scan(source: &str) -> SourceScan {
    let physical = physical_lines(source);
    let mut stripper = Stripper::default();
    let mut lines = Vec::new();
    let mut i = 0;

    while i < physical.len() {
        let first = i;
        let starts_inside = stripper.in_block_comment || stripper.in_raw_string.is_some();
        let mut text = String::new();
        let mut sloc = 0;

        loop {
            let raw = physical[i];
            let (body, continues) = match raw.strip_suffix('\\') {
                Some(body) => (body, true),
                None => (raw, false),
            };
            let (stripped, has_code) = stripper.strip_segment(body);
            if has_code {
                sloc += 1;
            }
            text.push_str(&stripped);
            i += 1;
            if !continues || i >= physical.len() {
                break;
            }
        }
        stripper.end_logical_line();

        let trimmed = text.trim_start();
        let kind = match trimmed.strip_prefix('#') {
            Some(rest) if !starts_inside => LineKind::Directive(rest.trim().to_string()),
            _ => LineKind::Code,
        };

        lines.push(LogicalLine {
            lines: LineRange::new(first as u32 + 1, i as u32 + 1),
            sloc,
            kind,
        });
    }

    SourceScan {
        lines,
        physical_lines: physical.len() as u32,
    }
}
