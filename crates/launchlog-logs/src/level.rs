//! Severity classification for console lines.
//!
//! Three sources of truth, strongest first: an explicit level name (from a
//! structured event), the `!![LEVEL]!` marker the launcher puts in front of
//! lines it synthesizes, and content heuristics for plain game output.

use std::sync::LazyLock;

use regex::Regex;

use launchlog_types::Severity;

/// `[12:34:56] [Server thread/INFO]` as printed by modern log4j layouts
static LINE_WITH_LEVEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(?P<timestamp>[0-9:]+)\] \[[^/]+/(?P<level>[^\]]+)\]")
        .expect("static regex is valid")
});

const MARKER_START: &str = "!![";
const MARKER_END: &str = "]!";

/// Case-insensitive lookup of a level name
pub fn from_name(name: &str) -> Severity {
    Severity::from_name(name)
}

/// Take the `!![LEVEL]!` marker off the front of `line`.
///
/// When the marker is present it is removed and the named level returned
/// (Unknown if the name is not recognised). Otherwise the line is left
/// untouched and Unknown is returned.
pub fn from_line(line: &mut String) -> Severity {
    if !line.starts_with(MARKER_START) {
        return Severity::Unknown;
    }
    let Some(end) = line.find(MARKER_END) else {
        return Severity::Unknown;
    };

    let level = from_name(&line[MARKER_START.len()..end]);
    line.drain(..end + MARKER_END.len());
    level
}

/// Take a `<timestamp> LEVEL: ` prefix off a line of the launcher's own log.
///
/// Leading digits, whitespace and dots (the timestamp) are skipped, the text
/// up to the first `:` is the level name, and the prefix up to and including
/// the character after the colon is removed.
pub fn from_launcher_line(line: &mut String) -> Severity {
    let start = line
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || c.is_whitespace() || *c == '.'))
        .map(|(i, _)| i);
    let (Some(start), Some(colon)) = (start, line.find(':')) else {
        return Severity::Unknown;
    };

    let level = if colon >= start {
        from_name(&line[start..colon])
    } else {
        Severity::Unknown
    };

    let after_colon = &line[colon + 1..];
    let skip = after_colon
        .char_indices()
        .nth(1)
        .map_or(after_colon.len(), |(i, _)| i);
    line.drain(..colon + 1 + skip);
    level
}

/// Guess the level of a plain line of game output.
///
/// Checks run in a fixed order and the first hit wins. A line that starts
/// with a tab or space only inherits `previous` once every content rule has
/// failed.
pub fn guess_level(line: &str, previous: Severity) -> Severity {
    if let Some(caps) = LINE_WITH_LEVEL.captures(line) {
        return from_name(&caps["level"]);
    }

    // Old style forge logs
    if ["[INFO]", "[CONFIG]", "[FINE]", "[FINER]", "[FINEST]"]
        .iter()
        .any(|tag| line.contains(tag))
    {
        return Severity::Info;
    }
    if line.contains("[SEVERE]") || line.contains("[STDERR]") {
        return Severity::Error;
    }
    if line.contains("[WARNING]") {
        return Severity::Warning;
    }
    if line.contains("[DEBUG]") {
        return Severity::Debug;
    }

    if line.contains("Exception: ") || line.contains("Throwable: ") {
        return Severity::Error;
    }
    if line.starts_with("Caused by: ") || line.starts_with("Exception in thread") {
        return Severity::Error;
    }

    if line.contains("overwriting existing") {
        return Severity::Fatal;
    }

    if line.starts_with('\t') || line.starts_with(' ') {
        return previous;
    }

    Severity::Unknown
}
