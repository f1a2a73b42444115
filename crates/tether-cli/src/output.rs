//! Colored scenario reports
//!
//! Uses `termcolor`; honors `NO_COLOR` and the `--color` flag.

use std::fmt::Display;
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve `ColorChoice` from the flag and the environment
///
/// Priority: `NO_COLOR` env > `--color` flag > auto-detect TTY.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

/// Styled stdout writer
pub struct StyledOutput {
    stdout: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
        }
    }

    fn write_styled(&mut self, text: &str, color: Option<Color>, bold: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold);
        let _ = self.stdout.set_color(&spec);
        let _ = write!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// Bold scenario title
    pub fn heading(&mut self, text: &str) {
        self.write_styled(text, None, true);
        self.newline();
    }

    /// `  label:  value` with the label in cyan
    pub fn field(&mut self, label: &str, value: impl Display) {
        self.write_styled(&format!("  {:<18}", format!("{}:", label)), Some(Color::Cyan), false);
        let _ = writeln!(self.stdout, "{}", value);
    }

    /// Print a PASS/FAIL line and return `ok`
    pub fn check(&mut self, description: &str, ok: bool) -> bool {
        let _ = write!(self.stdout, "  ");
        if ok {
            self.write_styled("PASS", Some(Color::Green), true);
        } else {
            self.write_styled("FAIL", Some(Color::Red), true);
        }
        let _ = writeln!(self.stdout, " {}", description);
        ok
    }

    /// Yellow note
    pub fn warning(&mut self, text: &str) {
        self.write_styled(text, Some(Color::Yellow), true);
        self.newline();
    }

    pub fn newline(&mut self) {
        let _ = writeln!(self.stdout);
    }

    pub fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}
