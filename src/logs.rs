//! Log inspection used for readiness checks and diagnostics.
//!
//! Matching reads the whole file on each call. A log that is rotated or truncated while a
//! readiness check is in progress may hide an earlier match; log readiness is best effort.
use std::{
    collections::VecDeque,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use regex::Regex;
use tracing::debug;

use crate::{
    error::{LogError, RetryExhausted},
    retry::RetryPolicy,
};

fn open(path: &Path) -> Result<BufReader<File>, LogError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| LogError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Number of lines in `path` matching `pattern`.
pub fn count_matching_lines(path: &Path, pattern: &Regex) -> Result<usize, LogError> {
    let reader = open(path)?;
    Ok(reader
        .lines()
        .map_while(Result::ok)
        .filter(|line| pattern.is_match(line))
        .count())
}

/// Whether any line of `path` matches. A missing or unreadable file reads as no match.
pub fn contains_match(path: &Path, pattern: &Regex) -> bool {
    match count_matching_lines(path, pattern) {
        Ok(count) => count > 0,
        Err(err) => {
            debug!("{err}");
            false
        }
    }
}

/// Re-reads `path` under `policy` until `pattern` matches at least one line, returning the
/// match count.
pub fn wait_for_match(
    path: &Path,
    pattern: &Regex,
    policy: RetryPolicy,
) -> Result<usize, RetryExhausted<LogError>> {
    policy.execute(|attempt| {
        let count = count_matching_lines(path, pattern)?;
        if count > 0 {
            debug!(
                "Found '{}' in {} on attempt {attempt}",
                pattern.as_str(),
                path.display()
            );
            Ok(count)
        } else {
            Err(LogError::NoMatch {
                path: path.to_path_buf(),
                pattern: pattern.as_str().to_string(),
            })
        }
    })
}

/// Returns the last `lines` lines of `path`.
pub fn tail(path: &Path, lines: usize) -> Result<Vec<String>, LogError> {
    let reader = open(path)?;
    let mut buffer: VecDeque<String> = VecDeque::with_capacity(lines.min(1024));

    for line in reader.lines().map_while(Result::ok) {
        if lines == 0 {
            break;
        }
        if buffer.len() == lines {
            buffer.pop_front();
        }
        buffer.push_back(line);
    }

    Ok(buffer.into())
}
