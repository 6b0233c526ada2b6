//! Colored error output.
//!
//! Uses `termcolor` for cross-platform colored terminal output.
//! Respects the `NO_COLOR` environment variable.

use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve `ColorChoice` from the environment.
pub fn resolve_color_choice() -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

/// Styled writer for the error stream.
pub struct StyledOutput {
    stderr: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stderr: StandardStream::stderr(choice),
        }
    }

    /// Write host diagnostics, highlighting a leading `Error:` tag.
    pub fn errors(&mut self, lines: &[String]) {
        for line in lines {
            match line.strip_prefix("Error:") {
                Some(rest) => {
                    self.tag("Error:", Color::Red);
                    let _ = writeln!(self.stderr, "{}", rest);
                }
                None => {
                    let _ = writeln!(self.stderr, "{}", line);
                }
            }
        }
        let _ = self.stderr.flush();
    }

    fn tag(&mut self, text: &str, color: Color) {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(color)).set_bold(true);
        let _ = self.stderr.set_color(&spec);
        let _ = write!(self.stderr, "{}", text);
        let _ = self.stderr.reset();
    }
}
