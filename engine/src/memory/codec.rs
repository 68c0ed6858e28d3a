//! Memory-bank document codec
//!
//! Parses and renders the Markdown documents that make up a task's memory
//! bank: the task plan (status, checklist, command log), the progress log and
//! the active-context pointer. Parsing is all-or-nothing: a task plan either
//! yields a complete `Task` or an `EngineError::Malformed` naming the line.

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use sdk::errors::EngineError;
use sdk::types::{
    ChecklistItem, ComplexityLevel, ExecutionLogEntry, ProgressRecord, Task, TaskId, TaskStatus,
};
use std::collections::HashSet;
use std::sync::OnceLock;

const CHECKLIST_HEADING: &str = "## Checklist";
const COMMAND_LOG_HEADING: &str = "## Command Log";
/// Checklist sub-heading that returns to phase-less items
const GENERAL_HEADING: &str = "General";

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static pattern is valid"))
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^#\s+Task:\s*(\S+)\s*$")
}

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?i)^\s*(?:[-*]\s+)?(?:\*\*)?(complexity|status)(?:\*\*)?\s*:\s*(?:\*\*)?\s*(.*?)\s*$",
    )
}

fn level_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)^(?:level\s*|l)?(\d+)$")
}

fn item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^\s*[-*]\s+\[([ xX])\]\s+(.+?)\s*$")
}

fn log_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"^- (\d+)\. (\S+) \[((?:[^\]\\]|\\.)+)\] `((?:[^`\\]|\\.)*)` =>\s?(.*)$",
    )
}

fn progress_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^- (\S+) (.*)$")
}

fn current_task_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?im)^\s*(?:[-*]\s+)?(?:\*\*)?current\s+task(?:\*\*)?\s*:\s*(?:\*\*)?\s*`?([^\s`*]+)`?",
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Notes,
    Checklist,
    CommandLog,
}

/// Backslash-escape the characters that delimit command-log fields
fn escape_field(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '`' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unescape_field(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(chars.next().unwrap_or('\\')),
            other => out.push(other),
        }
    }
    out
}

/// Fold a value onto one line so it survives a Markdown round trip
pub fn single_line(text: &str) -> String {
    text.split(['\n', '\r'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(raw: &str, line_no: usize) -> Result<DateTime<Utc>, EngineError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| EngineError::Malformed(format!("line {}: bad timestamp '{}': {}", line_no, raw, e)))
}

/// Parse the complexity marker value, e.g. `Level 3 (feature)`
fn parse_level(raw: &str, line_no: usize) -> Result<ComplexityLevel, EngineError> {
    let value = match raw.find('(') {
        Some(idx) => raw[..idx].trim(),
        None => raw.trim(),
    };
    if !level_re().is_match(value) {
        return Err(EngineError::Malformed(format!(
            "line {}: unparsable complexity '{}'",
            line_no, raw
        )));
    }
    value.parse()
}

/// Parse a task plan document
pub fn parse_task(id: &TaskId, text: &str) -> Result<Task, EngineError> {
    let mut section = Section::Header;
    let mut saw_title = false;
    let mut levels: Vec<(ComplexityLevel, usize)> = Vec::new();
    let mut statuses: Vec<(TaskStatus, usize)> = Vec::new();
    let mut checklist: Vec<ChecklistItem> = Vec::new();
    let mut log: Vec<ExecutionLogEntry> = Vec::new();
    let mut notes: Vec<String> = Vec::new();
    let mut phase: Option<String> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim_end();

        if line == CHECKLIST_HEADING {
            section = Section::Checklist;
            phase = None;
            continue;
        }
        if line == COMMAND_LOG_HEADING {
            section = Section::CommandLog;
            continue;
        }
        if line.starts_with("## ") {
            section = Section::Notes;
            notes.push(line.to_string());
            continue;
        }

        match section {
            Section::Header => {
                if !saw_title {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let caps = title_re().captures(line).ok_or_else(|| {
                        EngineError::Malformed(format!(
                            "line {}: expected '# Task: {}' heading",
                            line_no, id
                        ))
                    })?;
                    if &caps[1] != id.as_str() {
                        return Err(EngineError::Malformed(format!(
                            "line {}: plan is titled '{}' but stored as '{}'",
                            line_no, &caps[1], id
                        )));
                    }
                    saw_title = true;
                    continue;
                }

                if let Some(caps) = marker_re().captures(line) {
                    let value = caps[2].trim_matches('*').trim().to_string();
                    if caps[1].eq_ignore_ascii_case("complexity") {
                        levels.push((parse_level(&value, line_no)?, line_no));
                    } else {
                        let status = value.parse::<TaskStatus>().map_err(|_| {
                            EngineError::Malformed(format!(
                                "line {}: unknown status '{}'",
                                line_no, value
                            ))
                        })?;
                        statuses.push((status, line_no));
                    }
                } else {
                    notes.push(line.to_string());
                }
            }
            Section::Notes => notes.push(line.to_string()),
            Section::Checklist => {
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(heading) = line.strip_prefix("### ") {
                    let heading = heading.trim();
                    phase = if heading == GENERAL_HEADING {
                        None
                    } else {
                        Some(heading.to_string())
                    };
                    continue;
                }
                let caps = item_re().captures(line).ok_or_else(|| {
                    EngineError::Malformed(format!(
                        "line {}: unrecognised checklist line '{}'",
                        line_no,
                        line.trim()
                    ))
                })?;
                checklist.push(ChecklistItem {
                    description: caps[2].to_string(),
                    phase: phase.clone(),
                    done: &caps[1] != " ",
                });
            }
            Section::CommandLog => {
                if line.trim().is_empty() {
                    continue;
                }
                let caps = log_re().captures(line).ok_or_else(|| {
                    EngineError::Malformed(format!(
                        "line {}: unrecognised command log line '{}'",
                        line_no,
                        line.trim()
                    ))
                })?;
                let seq: u64 = caps[1].parse().map_err(|_| {
                    EngineError::Malformed(format!("line {}: bad sequence number", line_no))
                })?;
                if let Some(last) = log.last() {
                    if seq <= last.seq {
                        return Err(EngineError::Malformed(format!(
                            "line {}: command log sequence {} follows {}",
                            line_no, seq, last.seq
                        )));
                    }
                }
                log.push(ExecutionLogEntry {
                    seq,
                    recorded_at: parse_timestamp(&caps[2], line_no)?,
                    item: unescape_field(&caps[3]),
                    command: unescape_field(&caps[4]),
                    result: caps[5].to_string(),
                });
            }
        }
    }

    if !saw_title {
        let reason = if text.trim().is_empty() {
            format!("task plan for '{}' is empty", id)
        } else {
            format!("task plan has no '# Task: {}' heading", id)
        };
        return Err(EngineError::Malformed(reason));
    }

    let complexity_level = match levels.as_slice() {
        [] => {
            return Err(EngineError::Malformed(
                "task plan has no 'Complexity:' marker".to_string(),
            ))
        }
        [(first, _), rest @ ..] => {
            if let Some((other, line_no)) = rest.iter().find(|(level, _)| level != first) {
                return Err(EngineError::Malformed(format!(
                    "line {}: conflicting complexity markers ({} and {})",
                    line_no, first, other
                )));
            }
            *first
        }
    };

    let status = match statuses.as_slice() {
        [] => TaskStatus::NotStarted,
        [(first, _), rest @ ..] => {
            if let Some((other, line_no)) = rest.iter().find(|(status, _)| status != first) {
                return Err(EngineError::Malformed(format!(
                    "line {}: conflicting status markers ({} and {})",
                    line_no, first, other
                )));
            }
            *first
        }
    };

    let mut seen = HashSet::new();
    for item in &checklist {
        if !seen.insert(item.key()) {
            return Err(EngineError::Malformed(format!(
                "duplicate checklist item '{}'",
                item.key()
            )));
        }
    }

    while notes.first().is_some_and(|line| line.trim().is_empty()) {
        notes.remove(0);
    }
    while notes.last().is_some_and(|line| line.trim().is_empty()) {
        notes.pop();
    }

    Ok(Task {
        id: id.clone(),
        complexity_level,
        status,
        checklist,
        log,
        notes,
    })
}

/// Render a task plan document
pub fn render_task(task: &Task) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Task: {}\n\n", task.id));
    out.push_str(&format!(
        "- Complexity: {} ({})\n",
        task.complexity_level,
        task.complexity_level.label()
    ));
    out.push_str(&format!("- Status: {}\n\n", task.status));

    if !task.notes.is_empty() {
        for line in &task.notes {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }

    out.push_str(CHECKLIST_HEADING);
    out.push('\n');
    let mut phase: Option<&str> = None;
    for item in &task.checklist {
        if item.phase.as_deref() != phase {
            phase = item.phase.as_deref();
            out.push_str(&format!("\n### {}\n", phase.unwrap_or(GENERAL_HEADING)));
        }
        let mark = if item.done { 'x' } else { ' ' };
        out.push_str(&format!("- [{}] {}\n", mark, item.description));
    }

    out.push('\n');
    out.push_str(COMMAND_LOG_HEADING);
    out.push('\n');
    for entry in &task.log {
        let result = if entry.result.is_empty() {
            String::new()
        } else {
            format!(" {}", entry.result)
        };
        out.push_str(&format!(
            "- {}. {} [{}] `{}` =>{}\n",
            entry.seq,
            timestamp(&entry.recorded_at),
            escape_field(&entry.item),
            escape_field(&entry.command),
            result
        ));
    }

    out
}

/// Render one progress line, newline-terminated
pub fn render_progress(record: &ProgressRecord) -> String {
    format!("- {} {}\n", timestamp(&record.recorded_at), record.text)
}

/// Parse the progress document; lines that are not progress records are skipped
pub fn parse_progress(text: &str) -> Vec<ProgressRecord> {
    text.lines()
        .filter_map(|line| {
            let caps = progress_re().captures(line.trim_end())?;
            let recorded_at = DateTime::parse_from_rfc3339(&caps[1]).ok()?;
            Some(ProgressRecord {
                recorded_at: recorded_at.with_timezone(&Utc),
                text: caps[2].to_string(),
            })
        })
        .collect()
}

/// Find the current task pointer in the active-context document
pub fn parse_current_task(text: &str) -> Result<Option<TaskId>, EngineError> {
    match current_task_re().captures(text) {
        Some(caps) => TaskId::new(&caps[1]).map(Some),
        None => Ok(None),
    }
}

/// Title of a creative-decision document: its first `# ` heading
pub fn creative_title(text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> TaskId {
        TaskId::new(raw).unwrap()
    }

    const PLAN: &str = "# Task: search-index

Rebuild the search index in place.

- Complexity: Level 4 (system)
- Status: in-progress

## Checklist
- [x] review-plan
- [ ] review-creative

### Phase 1: Store
- [x] implement parser
- [ ] integration-test

### General
- [ ] document

## Command Log
- 1. 2026-10-14T10:00:00Z [review-plan] `cat memory-bank/tasks/search-index.md` => plan reviewed
- 2. 2026-10-14T10:05:00Z [Phase 1: Store / implement parser] `cargo test -p store` => 12 passed
";

    #[test]
    fn test_parse_full_plan() {
        let task = parse_task(&id("search-index"), PLAN).unwrap();
        assert_eq!(task.complexity_level, ComplexityLevel::Level4);
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.checklist.len(), 5);
        assert_eq!(task.checklist[2].phase.as_deref(), Some("Phase 1: Store"));
        assert_eq!(task.checklist[2].key(), "Phase 1: Store / implement parser");
        assert!(task.checklist[4].phase.is_none());
        assert_eq!(task.done_count(), 2);
        assert_eq!(task.log.len(), 2);
        assert_eq!(task.log[1].command, "cargo test -p store");
        assert_eq!(task.log[1].result, "12 passed");
        assert_eq!(task.notes, vec!["Rebuild the search index in place."]);
    }

    #[test]
    fn test_render_then_parse_is_stable() {
        let task = parse_task(&id("search-index"), PLAN).unwrap();
        let rendered = render_task(&task);
        let reparsed = parse_task(&id("search-index"), &rendered).unwrap();
        assert_eq!(task, reparsed);
        assert_eq!(rendered, render_task(&reparsed));
    }

    #[test]
    fn test_conflicting_complexity_is_malformed() {
        let text = "# Task: t\n- Complexity: Level 2\n- Complexity: Level 3\n## Checklist\n- [ ] fix\n";
        let err = parse_task(&id("t"), text).unwrap_err();
        assert!(matches!(err, EngineError::Malformed(ref msg) if msg.contains("conflicting")));
    }

    #[test]
    fn test_repeated_identical_complexity_is_accepted() {
        let text = "# Task: t\n- Complexity: Level 2\n**Complexity**: level 2\n## Checklist\n- [ ] fix\n";
        let task = parse_task(&id("t"), text).unwrap();
        assert_eq!(task.complexity_level, ComplexityLevel::Level2);
    }

    #[test]
    fn test_out_of_range_level_is_unknown() {
        let text = "# Task: t\n- Complexity: Level 7\n## Checklist\n- [ ] fix\n";
        let err = parse_task(&id("t"), text).unwrap_err();
        assert!(matches!(err, EngineError::UnknownComplexityLevel(ref raw) if raw == "Level 7"));
    }

    #[test]
    fn test_garbage_level_is_malformed() {
        let text = "# Task: t\n- Complexity: pretty hard\n## Checklist\n- [ ] fix\n";
        assert!(matches!(
            parse_task(&id("t"), text),
            Err(EngineError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_complexity_is_malformed() {
        let text = "# Task: t\n## Checklist\n- [ ] fix\n";
        assert!(matches!(
            parse_task(&id("t"), text),
            Err(EngineError::Malformed(_))
        ));
    }

    #[test]
    fn test_title_must_match_id() {
        let text = "# Task: other\n- Complexity: Level 1\n";
        let err = parse_task(&id("t"), text).unwrap_err();
        assert!(err.to_string().contains("other"));
    }

    #[test]
    fn test_stray_checklist_line_is_malformed() {
        let text = "# Task: t\n- Complexity: Level 1\n## Checklist\n- [ ] fix\n  some note\n";
        let err = parse_task(&id("t"), text).unwrap_err();
        assert!(err.to_string().contains("line 5"));
    }

    #[test]
    fn test_duplicate_items_are_malformed() {
        let text = "# Task: t\n- Complexity: Level 1\n## Checklist\n- [ ] fix\n- [x] fix\n";
        assert!(matches!(
            parse_task(&id("t"), text),
            Err(EngineError::Malformed(ref msg)) if msg.contains("duplicate")
        ));
    }

    #[test]
    fn test_log_sequence_must_increase() {
        let text = "# Task: t\n- Complexity: Level 1\n## Checklist\n- [x] fix\n## Command Log\n\
                    - 2. 2026-10-14T10:00:00Z [fix] `make` => ok\n\
                    - 2. 2026-10-14T10:01:00Z [fix] `make` => ok\n";
        assert!(matches!(
            parse_task(&id("t"), text),
            Err(EngineError::Malformed(ref msg)) if msg.contains("sequence")
        ));
    }

    #[test]
    fn test_log_entry_with_empty_result() {
        let text = "# Task: t\n- Complexity: Level 1\n## Checklist\n- [x] fix\n## Command Log\n\
                    - 1. 2026-10-14T10:00:00Z [fix] `touch marker` =>\n";
        let task = parse_task(&id("t"), text).unwrap();
        assert_eq!(task.log[0].result, "");
        assert!(render_task(&task).contains("`touch marker` =>\n"));
    }

    #[test]
    fn test_log_delimiters_survive_round_trip() {
        let mut task = parse_task(&id("search-index"), PLAN).unwrap();
        task.log[0].command = "grep `x` => y \\d".to_string();
        task.log[0].result = "found `a` => b".to_string();
        task.log[1].item = "odd] item".to_string();

        let rendered = render_task(&task);
        assert!(rendered.contains("[odd\\] item]"));
        let reparsed = parse_task(&id("search-index"), &rendered).unwrap();
        assert_eq!(reparsed.log, task.log);
    }

    #[test]
    fn test_log_entry_with_empty_item_is_malformed() {
        let text = "# Task: t\n- Complexity: Level 1\n## Checklist\n- [x] fix\n## Command Log\n\
                    - 1. 2026-10-14T10:00:00Z [] `ls` => ok\n";
        assert!(matches!(
            parse_task(&id("t"), text),
            Err(EngineError::Malformed(_))
        ));
    }

    #[test]
    fn test_extra_sections_are_preserved() {
        let text = "# Task: t\n- Complexity: Level 1\n\n## Context\nLogin redirect loops.\n\n## Checklist\n- [ ] fix\n";
        let task = parse_task(&id("t"), text).unwrap();
        assert_eq!(task.notes, vec!["## Context", "Login redirect loops."]);
        let reparsed = parse_task(&id("t"), &render_task(&task)).unwrap();
        assert_eq!(task, reparsed);
    }

    #[test]
    fn test_single_line_folds_newlines() {
        assert_eq!(single_line("ok\n  3 passed\r\n"), "ok 3 passed");
        assert_eq!(single_line("plain"), "plain");
    }

    #[test]
    fn test_progress_round_trip() {
        let record = ProgressRecord {
            recorded_at: Utc::now(),
            text: "prerequisites verified".to_string(),
        };
        let doc = format!("# Progress: t\n\n{}", render_progress(&record));
        assert_eq!(parse_progress(&doc), vec![record]);
    }

    #[test]
    fn test_current_task_pointer() {
        let doc = "# Active Context\n\n- **Current Task**: `search-index`\n- Mode: build\n";
        assert_eq!(
            parse_current_task(doc).unwrap(),
            Some(id("search-index"))
        );
        assert_eq!(parse_current_task("Current Task: fix-login").unwrap(), Some(id("fix-login")));
        assert_eq!(parse_current_task("# Active Context\n").unwrap(), None);
        assert!(parse_current_task("Current Task: ../escape").is_err());
    }

    #[test]
    fn test_creative_title() {
        assert_eq!(
            creative_title("# Storage engine choice\n\nWe picked the log.").as_deref(),
            Some("Storage engine choice")
        );
        assert_eq!(creative_title("no heading"), None);
    }
}
