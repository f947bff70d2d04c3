// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Interactive prompts
//!
//! Line-based: lists are printed numbered, and the user answers with item
//! numbers and ranges. With `--yes` every prompt takes its default without
//! reading input; at end of input nothing is selected.

use owo_colors::{OwoColorize, Style};
use std::collections::BTreeSet;
use std::io::{self, BufRead, IsTerminal, Write};

/// How a line should stand out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// No styling
    Plain,
    /// Section title
    Heading,
    /// Something succeeded
    Good,
    /// Something needs attention
    Warn,
    /// Something failed
    Bad,
    /// Secondary detail
    Dim,
}

/// One entry in a multi-select list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    /// Text shown for the entry
    pub label: String,
    /// Selected unless the user says otherwise
    pub preselected: bool,
}

impl Choice {
    /// Entry with a default mark
    pub fn new(label: impl Into<String>, preselected: bool) -> Self {
        Self {
            label: label.into(),
            preselected,
        }
    }
}

/// User interaction used by the commands
pub trait Ui {
    /// Print a line
    fn say(&mut self, tone: Tone, text: &str) -> io::Result<()>;

    /// Multi-select; returns the chosen indexes in ascending order
    fn select(&mut self, title: &str, choices: &[Choice]) -> io::Result<Vec<usize>>;

    /// Yes/no question
    fn confirm(&mut self, question: &str, default: bool) -> io::Result<bool>;

    /// Pick one of `options` by name or first letter
    fn choose(&mut self, question: &str, options: &[&str], default: usize) -> io::Result<usize>;

    /// Print an unstyled line
    fn line(&mut self, text: &str) -> io::Result<()> {
        self.say(Tone::Plain, text)
    }
}

/// Parse `1,3-5`, `a`/`all`, `n`/`none` against `count` items. Numbers are
/// 1-based. `None` means the answer made no sense.
#[must_use]
pub fn parse_selection(input: &str, count: usize) -> Option<Vec<usize>> {
    let input = input.trim().to_ascii_lowercase();
    match input.as_str() {
        "a" | "all" => return Some((0..count).collect()),
        "n" | "none" => return Some(Vec::new()),
        _ => {}
    }
    let mut picked = BTreeSet::new();
    for part in input.split([',', ' ']).filter(|p| !p.is_empty()) {
        let (lo, hi) = match part.split_once('-') {
            Some((lo, hi)) => (lo.trim().parse::<usize>().ok()?, hi.trim().parse::<usize>().ok()?),
            None => {
                let n = part.parse::<usize>().ok()?;
                (n, n)
            }
        };
        if lo == 0 || hi > count || lo > hi {
            return None;
        }
        picked.extend(lo - 1..hi);
    }
    Some(picked.into_iter().collect())
}

/// Prompts over a reader and writer, normally stdin and stdout
pub struct Terminal<R, W> {
    input: R,
    output: W,
    assume_yes: bool,
    color: bool,
}

impl Terminal<io::StdinLock<'static>, io::Stdout> {
    /// Prompts on the process's stdin and stdout. Colors are used when
    /// stdout is a terminal and `NO_COLOR` is unset.
    #[must_use]
    pub fn stdio(assume_yes: bool) -> Self {
        let color = io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
        Self {
            input: io::stdin().lock(),
            output: io::stdout(),
            assume_yes,
            color,
        }
    }
}

impl<R: BufRead, W: Write> Terminal<R, W> {
    /// Prompts over arbitrary streams, without colors
    pub fn new(input: R, output: W, assume_yes: bool) -> Self {
        Self {
            input,
            output,
            assume_yes,
            color: false,
        }
    }

    /// The output stream
    pub fn output(&self) -> &W {
        &self.output
    }

    fn paint(&self, tone: Tone, text: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        let style = match tone {
            Tone::Plain => return text.to_string(),
            Tone::Heading => Style::new().bold(),
            Tone::Good => Style::new().green(),
            Tone::Warn => Style::new().yellow(),
            Tone::Bad => Style::new().red(),
            Tone::Dim => Style::new().dimmed(),
        };
        text.style(style).to_string()
    }

    /// Read one answer; `None` at end of input
    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.output, "{prompt}")?;
        self.output.flush()?;
        let mut answer = String::new();
        if self.input.read_line(&mut answer)? == 0 {
            writeln!(self.output)?;
            return Ok(None);
        }
        Ok(Some(answer.trim().to_string()))
    }
}

impl<R: BufRead, W: Write> Ui for Terminal<R, W> {
    fn say(&mut self, tone: Tone, text: &str) -> io::Result<()> {
        let painted = self.paint(tone, text);
        writeln!(self.output, "{painted}")
    }

    fn select(&mut self, title: &str, choices: &[Choice]) -> io::Result<Vec<usize>> {
        if choices.is_empty() {
            return Ok(Vec::new());
        }
        self.say(Tone::Heading, title)?;
        for (i, choice) in choices.iter().enumerate() {
            let mark = if choice.preselected { "[x]" } else { "[ ]" };
            writeln!(self.output, "  {mark} {:>2}. {}", i + 1, choice.label)?;
        }
        let defaults: Vec<usize> = choices
            .iter()
            .enumerate()
            .filter(|(_, c)| c.preselected)
            .map(|(i, _)| i)
            .collect();
        if self.assume_yes {
            return Ok(defaults);
        }
        loop {
            let Some(answer) = self.ask("Select (e.g. 1,3-5; a=all, n=none, Enter=marked): ")? else {
                return Ok(Vec::new());
            };
            if answer.is_empty() {
                return Ok(defaults);
            }
            match parse_selection(&answer, choices.len()) {
                Some(picked) => return Ok(picked),
                None => {
                    let msg = format!("Not a valid selection: {answer}");
                    self.say(Tone::Warn, &msg)?;
                }
            }
        }
    }

    fn confirm(&mut self, question: &str, default: bool) -> io::Result<bool> {
        if self.assume_yes {
            return Ok(default);
        }
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            let Some(answer) = self.ask(&format!("{question} {hint} "))? else {
                return Ok(false);
            };
            match answer.to_ascii_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.say(Tone::Warn, "Please answer y or n")?,
            }
        }
    }

    fn choose(&mut self, question: &str, options: &[&str], default: usize) -> io::Result<usize> {
        if self.assume_yes {
            return Ok(default);
        }
        let hint: Vec<String> = options
            .iter()
            .enumerate()
            .map(|(i, o)| if i == default { format!("[{o}]") } else { (*o).to_string() })
            .collect();
        loop {
            let Some(answer) = self.ask(&format!("{question} ({}) ", hint.join("/")))? else {
                return Ok(default);
            };
            let answer = answer.to_ascii_lowercase();
            if answer.is_empty() {
                return Ok(default);
            }
            let found = options
                .iter()
                .position(|o| *o == answer || o.starts_with(&answer));
            match found {
                Some(i) => return Ok(i),
                None => self.say(Tone::Warn, &format!("Choose one of {}", options.join(", ")))?,
            }
        }
    }
}
