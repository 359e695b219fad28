//! Output - the human-readable progress lines of an operation
//!
//! Lines written here are part of the engine's contract (callers and tests match
//! them exactly), so they are kept apart from `log` output. Every line is
//! buffered; a stdout sink also prints each line as it is written.

/// Line sink owned by the migrator
#[derive(Debug, Default, Clone)]
pub struct Output {
    lines: Vec<String>,
    echo: bool,
}

impl Output {
    /// Buffer lines without printing them
    #[must_use]
    pub fn buffered() -> Self {
        Self::default()
    }

    /// Buffer lines and print each to stdout
    #[must_use]
    pub fn stdout() -> Self {
        Self {
            lines: Vec::new(),
            echo: true,
        }
    }

    pub fn writeln(&mut self, line: impl Into<String>) {
        let line = line.into();
        if self.echo {
            println!("{line}");
        }
        self.lines.push(line);
    }

    /// Lines written since the last `take`/`clear`
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Buffered lines joined with newlines
    #[must_use]
    pub fn contents(&self) -> String {
        self.lines.join("\n")
    }

    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.contains(needle))
    }

    /// Drain the buffer
    pub fn take(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}
