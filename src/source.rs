//! Line-oriented producer: turns text lines into pipeline values.

use crate::error::{InputError, Result};
use crate::pipeline::Producer;
use crate::Value;
use std::io::BufRead;
use tracing::{debug, warn};

/// Command that ends the session, matched case-insensitively
pub const STOP_COMMAND: &str = "exit";

/// One parsed input line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Value(Value),
    Stop,
    Blank,
}

/// Parse a single line of user input
pub fn parse_line(line: &str) -> std::result::Result<Command, InputError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Command::Blank);
    }
    if trimmed.eq_ignore_ascii_case(STOP_COMMAND) {
        return Ok(Command::Stop);
    }
    trimmed
        .parse::<Value>()
        .map(Command::Value)
        .map_err(|_| InputError::NotAnInteger(trimmed.to_owned()))
}

/// Counts of what the source did with its input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceSummary {
    pub accepted: u64,
    pub rejected: u64,
}

/// Feed every line of `reader` into the pipeline until the stop command or
/// end of input, then stop the pipeline.
///
/// Malformed lines are reported and skipped. A read error or a vanished
/// pipeline ends the loop; the pipeline is stopped in every case because
/// the producer is consumed here.
pub fn run_source<R: BufRead>(reader: R, producer: Producer<Value>) -> Result<SourceSummary> {
    let mut summary = SourceSummary::default();

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to read input, stopping");
                break;
            }
        };

        match parse_line(&line) {
            Ok(Command::Value(value)) => {
                producer.send(value)?;
                summary.accepted += 1;
            }
            Ok(Command::Stop) => {
                debug!("stop command received");
                break;
            }
            Ok(Command::Blank) => {}
            Err(e) => {
                warn!("{e}; type integers or {STOP_COMMAND:?} to quit");
                summary.rejected += 1;
            }
        }
    }

    producer.stop();
    Ok(summary)
}
