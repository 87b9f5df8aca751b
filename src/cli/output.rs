//! Handles all user-facing output for the CLI.
//!
//! Everything goes through a [`Reporter`] over any `WriteColor`, so tests capture
//! the exact text with `termcolor::Buffer`.

use std::io;

use difference::Difference;
use miette::{GraphicalReportHandler, GraphicalTheme};
use termcolor::{Color, ColorChoice, ColorSpec, WriteColor};

use crate::cli::diagnostics::snippet;
use crate::compare::ComparisonResult;
use crate::completeness::CompletenessReport;
use crate::harness::{FixtureOutcome, FixtureReport, RunSummary};
use crate::scanner::Corpus;

/// Picks the color mode: off when asked for, when `NO_COLOR` is set, or when
/// stdout is not a terminal.
pub fn color_choice(no_color: bool) -> ColorChoice {
    if no_color || std::env::var_os("NO_COLOR").is_some() || !atty::is(atty::Stream::Stdout) {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

pub struct Reporter<W: WriteColor> {
    out: W,
    verbose: bool,
}

impl<W: WriteColor> Reporter<W> {
    pub fn new(out: W, verbose: bool) -> Self {
        Self { out, verbose }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Prints every report that needs attention, then the summary.
    pub fn run(&mut self, summary: &RunSummary) -> io::Result<()> {
        for report in &summary.reports {
            self.fixture(report)?;
        }
        self.summary(summary)
    }

    pub fn fixture(&mut self, report: &FixtureReport) -> io::Result<()> {
        let (label, color) = match &report.outcome {
            FixtureOutcome::Passed => ("PASS", Color::Green),
            FixtureOutcome::Updated(_) => ("UPDATED", Color::Cyan),
            FixtureOutcome::Failed(_) => ("FAIL", Color::Red),
            FixtureOutcome::TimedOut(_) => ("TIMEOUT", Color::Red),
            FixtureOutcome::Cancelled => ("SKIP", Color::Yellow),
            FixtureOutcome::Malformed(_)
            | FixtureOutcome::Unreadable(_)
            | FixtureOutcome::AnalysisFailed(_)
            | FixtureOutcome::UpdateFailed(..) => ("ERROR", Color::Red),
            FixtureOutcome::Panicked(_) => ("PANIC", Color::Red),
        };
        let quiet = matches!(report.outcome, FixtureOutcome::Passed | FixtureOutcome::Cancelled);
        if quiet && !self.verbose {
            return Ok(());
        }

        self.tag(label, color)?;
        write!(self.out, " {}", report.id)?;
        if self.verbose {
            write!(self.out, " ({}ms)", report.elapsed.as_millis())?;
        }
        writeln!(self.out)?;

        match &report.outcome {
            FixtureOutcome::Failed(result) => self.comparison(result, true),
            FixtureOutcome::Updated(result) => self.comparison(result, self.verbose),
            FixtureOutcome::UpdateFailed(result, err) => {
                self.error(err)?;
                self.comparison(result, false)
            }
            FixtureOutcome::Malformed(err) | FixtureOutcome::Unreadable(err) => self.error(err),
            FixtureOutcome::TimedOut(timeout) => writeln!(
                self.out,
                "    analysis did not finish within {}ms",
                timeout.as_millis()
            ),
            FixtureOutcome::AnalysisFailed(message) => writeln!(self.out, "    {message}"),
            FixtureOutcome::Panicked(message) => writeln!(self.out, "    evaluation panicked: {message}"),
            FixtureOutcome::Passed | FixtureOutcome::Cancelled => Ok(()),
        }
    }

    pub fn summary(&mut self, summary: &RunSummary) -> io::Result<()> {
        writeln!(self.out)?;
        let failed = summary.failed();
        let color = if failed > 0 { Color::Red } else { Color::Green };
        self.out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
        write!(self.out, "{} fixtures", summary.total())?;
        self.out.reset()?;
        writeln!(
            self.out,
            ": {} passed, {} failed, {} updated, {} cancelled",
            summary.passed(),
            failed,
            summary.updated(),
            summary.cancelled()
        )?;
        if let Some(report) = &summary.completeness {
            self.completeness(report)?;
        }
        Ok(())
    }

    pub fn completeness(&mut self, report: &CompletenessReport) -> io::Result<()> {
        if report.is_complete() {
            self.tag("REGISTRY", Color::Green)?;
            return writeln!(self.out, " complete");
        }
        self.tag("REGISTRY", Color::Red)?;
        writeln!(self.out, " {} problem(s)", report.issues.len())?;
        for path in report.orphans() {
            writeln!(self.out, "    orphan fixture (not in registry): {path}")?;
        }
        for path in report.stale() {
            writeln!(self.out, "    stale registry entry (no fixture): {path}")?;
        }
        writeln!(
            self.out,
            "    run `diagcheck registry generate` to refresh the registry"
        )
    }

    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")
    }

    pub fn listing(&mut self, corpus: &Corpus) -> io::Result<()> {
        for fixture in corpus {
            writeln!(self.out, "{}\t{}", fixture.relative(), fixture.test_id())?;
        }
        Ok(())
    }

    /// Renders a harness error with miette's graphical handler.
    pub fn error(&mut self, err: &dyn miette::Diagnostic) -> io::Result<()> {
        let theme = if self.out.supports_color() {
            GraphicalTheme::unicode()
        } else {
            GraphicalTheme::unicode_nocolor()
        };
        let mut rendered = String::new();
        if GraphicalReportHandler::new_themed(theme)
            .render_report(&mut rendered, err)
            .is_err()
        {
            rendered = err.to_string();
        }
        for line in rendered.lines() {
            writeln!(self.out, "    {line}")?;
        }
        Ok(())
    }

    fn comparison(&mut self, result: &ComparisonResult, with_diff: bool) -> io::Result<()> {
        for (index, expected) in result.missing.iter().enumerate() {
            let near = result.near_misses.iter().find(|n| n.missing == index);
            write!(
                self.out,
                "    missing {} at {}",
                expected.code,
                result.locate(expected.segment, expected.span)
            )?;
            match near {
                Some(near) => {
                    let actual = &result.unexpected[near.unexpected];
                    writeln!(
                        self.out,
                        " (near miss: reported at {}, off by {})",
                        actual.span, near.distance
                    )?;
                }
                None => writeln!(self.out)?,
            }
            self.snippet(result, expected.segment, expected.span, &expected.code)?;
        }
        for actual in &result.unexpected {
            write!(
                self.out,
                "    unexpected {} at {}",
                actual.code,
                result.locate(actual.segment, actual.span)
            )?;
            if actual.message.is_empty() {
                writeln!(self.out)?;
            } else {
                writeln!(self.out, ": {}", actual.message)?;
            }
            self.snippet(result, actual.segment, actual.span, &actual.code)?;
        }
        for duplicate in &result.duplicates {
            self.out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
            write!(self.out, "    duplicate")?;
            self.out.reset()?;
            writeln!(
                self.out,
                " {} reported more than once at {}",
                duplicate.code,
                result.locate(duplicate.segment, duplicate.span)
            )?;
        }

        if !with_diff {
            return Ok(());
        }
        match (result.diff(), &result.actual_text) {
            (Some(diffs), _) => self.diff(&diffs),
            (None, Err(e)) => writeln!(self.out, "    cannot render actual markers: {e}"),
            (None, Ok(_)) => Ok(()),
        }
    }

    fn snippet(
        &mut self,
        result: &ComparisonResult,
        segment: usize,
        span: crate::span::Span,
        label: &str,
    ) -> io::Result<()> {
        let Some(text) = result.segments.get(segment).map(|s| s.text.as_str()) else {
            return Ok(());
        };
        if let Some(snippet) = snippet(text, span, label) {
            for line in snippet.lines() {
                writeln!(self.out, "      {line}")?;
            }
        }
        Ok(())
    }

    /// Prints only the changed lines of the expected/actual marker diff.
    fn diff(&mut self, diffs: &[Difference]) -> io::Result<()> {
        writeln!(self.out, "    --- expected")?;
        writeln!(self.out, "    +++ actual")?;
        for diff in diffs {
            let (prefix, text, color) = match diff {
                Difference::Same(_) => continue,
                Difference::Add(x) => ('+', x, Color::Green),
                Difference::Rem(x) => ('-', x, Color::Red),
            };
            self.out.set_color(ColorSpec::new().set_fg(Some(color)))?;
            for line in text.split('\n') {
                writeln!(self.out, "    {prefix}{line}")?;
            }
            self.out.reset()?;
        }
        Ok(())
    }

    fn tag(&mut self, label: &str, color: Color) -> io::Result<()> {
        self.out.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
        write!(self.out, "{label}")?;
        self.out.reset()
    }
}
