//! Human-readable rendering of a run's status.

use crate::tally::{RunStatus, TestGroup, TestTally};
use chrono::NaiveDateTime;
use std::io::{self, Write};

const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Writes which run is being evaluated and when.
pub fn write_header<W: Write>(w: &mut W, run_time: NaiveDateTime, now: NaiveDateTime) -> io::Result<()> {
    writeln!(w, "Evaluating run from: {}", run_time.format(DISPLAY_TIME_FORMAT))?;
    writeln!(w, "Current time is: {}", now.format(DISPLAY_TIME_FORMAT))
}

/// Writes the expected and unknown groups. A group with no tests is left out.
///
/// At verbosity 0 each test gets a one-line summary; above that the failed
/// and aborted resources are listed too.
pub fn write_status<W: Write>(w: &mut W, status: &RunStatus, verbosity: u8) -> io::Result<()> {
    for group in [TestGroup::Expected, TestGroup::Unknown] {
        let tests = status.group(group);
        if tests.is_empty() {
            continue;
        }
        writeln!(w, "{} {} tests run.", tests.len(), group.label())?;
        for (name, tally) in tests {
            if verbosity == 0 {
                write_summary(w, name, tally)?;
            } else {
                write_detail(w, name, tally)?;
            }
        }
    }
    Ok(())
}

fn write_summary<W: Write>(w: &mut W, name: &str, tally: &TestTally) -> io::Result<()> {
    writeln!(
        w,
        "{name} test: {} jobs submitted, {} jobs passed, {} jobs failed, {} system failures",
        tally.submitted.len(),
        tally.succeeded.len(),
        tally.failed.len(),
        tally.aborted.len()
    )
}

fn write_detail<W: Write>(w: &mut W, name: &str, tally: &TestTally) -> io::Result<()> {
    writeln!(w, "For test {name}:")?;
    writeln!(w, "\t{} resources submitted to", tally.submitted.len())?;
    writeln!(w, "\t{} resources began execution", tally.executing.len())?;
    writeln!(w, "\t{} resources passed the test", tally.succeeded.len())?;
    writeln!(
        w,
        "\t{} resources failed the test. List of failed resources:",
        tally.failed.len()
    )?;
    for resource in &tally.failed {
        writeln!(w, "\t\t{resource}")?;
    }
    writeln!(
        w,
        "\t{} resources aborted. List of aborted resources:",
        tally.aborted.len()
    )?;
    for resource in &tally.aborted {
        writeln!(w, "\t\t{resource}")?;
    }
    Ok(())
}
