use indicatif::{ProgressBar, ProgressStyle};
use nu_ansi_term::{Color, Style};
use std::fmt::Display;
use std::io::IsTerminal;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum Theme {
    Auto,
    Light,
    Dark,
    Plain,
}

/// Leading marker of a status line.
#[derive(Clone, Copy)]
enum Mark {
    Heading,
    Info,
    Done,
    Warn,
    Busy,
}

impl Mark {
    fn glyph(self) -> &'static str {
        match self {
            Mark::Heading => "▸",
            Mark::Info => "ℹ",
            Mark::Done => "✔",
            Mark::Warn => "⚠",
            Mark::Busy => "▶",
        }
    }
}

/// Text output of the CLI. Results go to stdout; warnings and progress go to
/// stderr. Quiet mode (also used for `--format json`) drops all decoration.
pub struct Ui {
    colors: Colors,
    paint: bool,
    quiet: bool,
}

impl Ui {
    pub fn new(theme: Theme, quiet: bool) -> Self {
        let paint = theme != Theme::Plain && !quiet && std::io::stdout().is_terminal();
        #[cfg(windows)]
        if paint {
            let _ = nu_ansi_term::enable_ansi_support();
        }
        Self {
            colors: Colors::for_theme(theme),
            paint,
            quiet,
        }
    }

    /// Titled block of right-aligned `key: value` rows. Empty blocks print
    /// nothing.
    pub fn section<'a, I, V>(&self, title: &str, rows: I)
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: Display,
    {
        let rows: Vec<(&str, String)> = rows.into_iter().map(|(k, v)| (k, v.to_string())).collect();
        if rows.is_empty() {
            return;
        }
        self.heading(title);
        let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in rows {
            let key = format!("{key:>width$}:");
            println!("  {} {value}", self.paint(self.colors.key, key));
        }
    }

    /// Titled bullet list. Empty lists print nothing.
    pub fn list<I>(&self, title: &str, entries: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut entries = entries.into_iter().peekable();
        if entries.peek().is_none() {
            return;
        }
        self.heading(title);
        for entry in entries {
            println!("  {} {entry}", self.paint(self.colors.accent, "-"));
        }
    }

    pub fn info(&self, message: &str) {
        println!("{}", self.status(Mark::Info, self.colors.accent, message));
    }

    pub fn success(&self, message: &str) {
        println!("{}", self.status(Mark::Done, self.colors.ok, message));
    }

    pub fn warn(&self, message: &str) {
        eprintln!("{}", self.status(Mark::Warn, self.colors.warn, message));
    }

    /// Spinner for a step of unknown length.
    pub fn task(&self, label: &str) -> Task<'_> {
        let bar = self.spinner("{prefix} {spinner} {msg}", label);
        Task {
            ui: self,
            label: label.to_string(),
            start: Instant::now(),
            bar: Some(bar),
        }
    }

    /// Running count of imported edges. Hidden when quiet.
    pub fn counter(&self, label: &str) -> ProgressBar {
        self.spinner("{prefix} {spinner} {msg} {human_pos} edges ({per_sec}, {elapsed})", label)
    }

    fn spinner(&self, template: &str, label: &str) -> ProgressBar {
        if self.quiet {
            return ProgressBar::hidden();
        }
        let style = ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ");
        let bar = ProgressBar::new_spinner().with_style(style);
        bar.set_prefix(self.paint(self.colors.accent, Mark::Busy.glyph()));
        bar.set_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }

    fn heading(&self, title: &str) {
        if self.quiet {
            println!("{title}");
        } else {
            println!("{}", self.paint(self.colors.heading, format!("{} {title}", Mark::Heading.glyph())));
        }
    }

    fn status(&self, mark: Mark, style: Style, message: &str) -> String {
        if self.quiet {
            message.to_string()
        } else {
            format!("{} {message}", self.paint(style, mark.glyph()))
        }
    }

    fn paint(&self, style: Style, text: impl Into<String>) -> String {
        let text = text.into();
        if self.paint {
            style.paint(text).to_string()
        } else {
            text
        }
    }
}

/// Spinner handle returned by [`Ui::task`]. Dropping it without `finish`
/// marks the step as interrupted.
pub struct Task<'a> {
    ui: &'a Ui,
    label: String,
    start: Instant,
    bar: Option<ProgressBar>,
}

impl Task<'_> {
    pub fn finish(mut self) -> Duration {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
        self.start.elapsed()
    }
}

impl Drop for Task<'_> {
    fn drop(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
            let elapsed = format_duration(self.start.elapsed());
            self.ui.warn(&format!("{} interrupted after {elapsed}", self.label));
        }
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 1.0 {
        format!("{secs:.2}s")
    } else {
        format!("{:.0}ms", secs * 1_000.0)
    }
}

#[derive(Clone, Copy)]
struct Colors {
    heading: Style,
    key: Style,
    accent: Style,
    ok: Style,
    warn: Style,
}

impl Colors {
    fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Auto | Theme::Dark => Self {
                heading: Color::Purple.bold(),
                key: Color::LightBlue.bold(),
                accent: Color::LightCyan.normal(),
                ok: Color::LightGreen.bold(),
                warn: Color::Yellow.bold(),
            },
            Theme::Light => Self {
                heading: Color::Blue.bold(),
                key: Color::Black.bold(),
                accent: Color::Blue.normal(),
                ok: Color::Green.bold(),
                warn: Color::Red.bold(),
            },
            Theme::Plain => Self {
                heading: Style::new(),
                key: Style::new(),
                accent: Style::new(),
                ok: Style::new(),
                warn: Style::new(),
            },
        }
    }
}
