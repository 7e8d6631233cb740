//! Minimal POSIX shell program builder
//!
//! Every value interpolated into a generated script goes through [`quote`],
//! so escaping lives in exactly one place.

use std::fmt;

/// Quote `value` as a single POSIX shell word
///
/// Plain words made of safe characters are returned unchanged; anything else
/// is single-quoted with embedded `'` rewritten as `'\''`.
pub fn quote(value: &str) -> String {
    let is_safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:,=@%+".contains(c));

    if is_safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

/// Ordered list of shell statements, rendered one per line
#[derive(Debug, Clone, Default)]
pub struct ShellScript {
    lines: Vec<String>,
    depth: usize,
}

impl ShellScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw statement at the current indentation level
    pub fn line(&mut self, statement: impl AsRef<str>) -> &mut Self {
        let indent = "  ".repeat(self.depth);
        self.lines.push(format!("{}{}", indent, statement.as_ref()));
        self
    }

    /// Append a command built from already-quoted words
    pub fn command<I, S>(&mut self, words: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = words
            .into_iter()
            .map(|w| w.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        self.line(joined)
    }

    /// Open a block (`while ...; do`, `cleanup() {`, ...) and indent its body
    pub fn open(&mut self, header: impl AsRef<str>) -> &mut Self {
        self.line(header);
        self.depth += 1;
        self
    }

    /// Close the innermost block with `footer` (`done`, `fi`, `}`)
    pub fn close(&mut self, footer: impl AsRef<str>) -> &mut Self {
        self.depth = self.depth.saturating_sub(1);
        self.line(footer)
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

impl fmt::Display for ShellScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
