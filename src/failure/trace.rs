use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::engine::ids::NodeId;
use crate::error::{Error, Result};

/// A single up/down transition read from a failure trace. One trace row, which carries
/// both a start and an end time for one interval, expands into exactly two of these.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureEvent {
    pub time_s: f64,
    pub node: NodeId,
    pub up: bool,
}

/// Column layout and tokens of a whitespace-delimited failure trace. Defaults match §6's
/// literal layout `(nodeId=3, eventType=6, startTime=7, endTime=8, maxField=9)`, 1-based in
/// the file and 0-based here; every field is overridable so a trace with extra columns
/// (load, job id, ...) can still be read by pointing at the columns that matter.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub node_col: usize,
    pub event_col: usize,
    pub start_time_col: usize,
    pub end_time_col: usize,
    /// 0-based index of the last column a row must have, i.e. the row needs at least
    /// `max_field + 1` whitespace-separated fields.
    pub max_field: usize,
    pub unavailable_token: String,
    pub available_token: String,
    pub comment_prefix: char,
    /// Subtracted from every trace timestamp so a trace recorded against wall-clock
    /// time can be rebased onto the simulation's own clock starting at 0.
    pub trace_start_offset_s: f64,
}

impl Default for TraceConfig {
    fn default() -> Self {
        TraceConfig {
            node_col: 2,
            event_col: 5,
            start_time_col: 6,
            end_time_col: 7,
            max_field: 8,
            unavailable_token: "unavailable-start".to_string(),
            available_token: "available-start".to_string(),
            comment_prefix: '#',
            trace_start_offset_s: 0.0,
        }
    }
}

/// Opens `path` and returns a reader that transparently decompresses `.gz` and `.zip`
/// trace files (taking the first entry of a zip archive), falling back to reading the
/// file as-is for any other extension.
fn open_transparent(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => Ok(Box::new(flate2::read::GzDecoder::new(file))),
        Some("zip") => {
            let mut archive = zip::ZipArchive::new(file).map_err(|e| Error::InvalidScenario(format!("bad zip trace {}: {e}", path.display())))?;
            if archive.is_empty() {
                return Err(Error::InvalidScenario(format!("zip trace {} has no entries", path.display())));
            }
            let mut buf = Vec::new();
            {
                let mut entry = archive.by_index(0).map_err(|e| Error::InvalidScenario(format!("bad zip trace {}: {e}", path.display())))?;
                entry.read_to_end(&mut buf)?;
            }
            Ok(Box::new(std::io::Cursor::new(buf)))
        }
        _ => Ok(Box::new(file)),
    }
}

/// Reads a failure trace according to `config`, skipping blank lines and lines starting
/// with `config.comment_prefix`. Each remaining line is split on whitespace; a row names
/// one node, one interval type (§4.7's "unavailable-start"/"available-start"), and the
/// interval's start and end time, per the data model's `(nodeId, type, startTime,
/// endTime)` failure event. A row is expanded into the pair of transitions that bound its
/// interval (down-at-start/up-at-end for `unavailable-start`, the reverse for
/// `available-start`), so one parsed row always yields exactly two [`FailureEvent`]s.
/// Out-of-range column indices, a malformed timestamp, `endTime < startTime`, or an
/// unrecognized event-type token are reported as [`Error::TraceParseError`] naming the
/// offending line number (1-based).
pub fn read_trace(path: &Path, config: &TraceConfig) -> Result<Vec<FailureEvent>> {
    let reader = BufReader::new(open_transparent(path)?);
    let mut events = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(config.comment_prefix) {
            continue;
        }
        let columns: Vec<&str> = trimmed.split_whitespace().collect();
        let line_number = line_no + 1;

        if columns.len() <= config.max_field {
            return Err(Error::TraceParseError { line: line_number, reason: format!("expected at least {} columns, found {}", config.max_field + 1, columns.len()) });
        }

        let get = |idx: usize| -> Result<&str> {
            columns.get(idx).copied().ok_or_else(|| Error::TraceParseError { line: line_number, reason: format!("expected at least {} columns, found {}", idx + 1, columns.len()) })
        };

        let node_raw = get(config.node_col)?;
        let event_raw = get(config.event_col)?;
        let start_raw = get(config.start_time_col)?;
        let end_raw = get(config.end_time_col)?;

        let start_time_s: f64 = start_raw.parse().map_err(|_| Error::TraceParseError { line: line_number, reason: format!("invalid startTime {start_raw:?}") })?;
        let end_time_s: f64 = end_raw.parse().map_err(|_| Error::TraceParseError { line: line_number, reason: format!("invalid endTime {end_raw:?}") })?;
        if end_time_s < start_time_s {
            return Err(Error::TraceParseError { line: line_number, reason: format!("endTime {end_time_s} precedes startTime {start_time_s}") });
        }

        let node = NodeId::new(node_raw);
        let start = start_time_s - config.trace_start_offset_s;
        let end = end_time_s - config.trace_start_offset_s;

        if event_raw == config.unavailable_token {
            events.push(FailureEvent { time_s: start, node: node.clone(), up: false });
            events.push(FailureEvent { time_s: end, node, up: true });
        } else if event_raw == config.available_token {
            events.push(FailureEvent { time_s: start, node: node.clone(), up: true });
            events.push(FailureEvent { time_s: end, node, up: false });
        } else {
            return Err(Error::TraceParseError { line: line_number, reason: format!("unrecognized event type token {event_raw:?}") });
        }
    }

    events.sort_by(|a, b| a.time_s.partial_cmp(&b.time_s).unwrap_or(std::cmp::Ordering::Equal));
    Ok(events)
}
