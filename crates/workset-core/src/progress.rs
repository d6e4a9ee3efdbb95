use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// One progress observation for a repository operation. After combination
/// `repo` carries a synthetic count label instead of a single repository.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProgressEvent {
    pub repo: String,
    pub stage: String,
    pub is_begin: bool,
    pub is_end: bool,
    pub current: u64,
    pub total: u64,
}

/// Stage labels reported by git that carry no per-stage progress (object
/// reuse accounting on the remote side).
const NOISE_LABELS: [&str; 1] = ["Total"];

const DONE_MARKER: &str = "done.";

/// `<label>: <percent>% (<current>/<total>)<trailing>`, the form git uses
/// for stages with a known total.
fn relative_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:remote: )?(?P<label>[^:]+):\s+\d+% \((?P<current>\d+)/(?P<total>\d+)\)")
            .expect("relative pattern compiles")
    })
}

/// `<label>: <count><trailing>`, the form used while the total is unknown.
fn absolute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:remote: )?(?P<label>[^:]+):\s+(?P<current>\d+)")
            .expect("absolute pattern compiles")
    })
}

#[derive(Debug, Eq, PartialEq)]
pub(crate) struct ParsedLine {
    pub(crate) stage: String,
    pub(crate) current: u64,
    pub(crate) total: u64,
    pub(crate) ended: bool,
}

/// Parse one stderr record from the tool. Lines matching neither pattern and
/// lines with a noise label yield `None`.
pub(crate) fn parse_line(line: &str) -> Option<ParsedLine> {
    let line = line.trim_end_matches('\r');
    let ended = line.trim_end().ends_with(DONE_MARKER);

    if let Some(caps) = relative_pattern().captures(line) {
        let label = caps["label"].trim();
        if is_noise(label) {
            return None;
        }
        return Some(ParsedLine {
            stage: label.to_string(),
            current: caps["current"].parse().ok()?,
            total: caps["total"].parse().ok()?,
            ended,
        });
    }

    if let Some(caps) = absolute_pattern().captures(line) {
        let label = caps["label"].trim();
        if is_noise(label) {
            return None;
        }
        let current: u64 = caps["current"].parse().ok()?;
        return Some(ParsedLine {
            stage: label.to_string(),
            current,
            total: current,
            ended,
        });
    }

    None
}

fn is_noise(label: &str) -> bool {
    NOISE_LABELS.iter().any(|prefix| label.starts_with(prefix))
}

/// Per-invocation stage bookkeeping: first sighting of a label flags
/// `is_begin`, and current/total never move backwards within a stage even
/// when the tool rewrites a line with smaller numbers.
#[derive(Default)]
pub(crate) struct StageTracker {
    begun: HashSet<String>,
    watermarks: HashMap<String, (u64, u64)>,
}

impl StageTracker {
    pub(crate) fn observe(&mut self, repo: &str, parsed: ParsedLine) -> ProgressEvent {
        let is_begin = self.begun.insert(parsed.stage.clone());
        let mark = self.watermarks.entry(parsed.stage.clone()).or_insert((0, 0));
        mark.0 = mark.0.max(parsed.current);
        mark.1 = mark.1.max(parsed.total);
        ProgressEvent {
            repo: repo.to_string(),
            stage: parsed.stage,
            is_begin,
            is_end: parsed.ended,
            current: mark.0,
            total: mark.1,
        }
    }
}
