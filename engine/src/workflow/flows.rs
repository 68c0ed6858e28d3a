//! Per-level build flows
//!
//! Each complexity level has one flow. A flow turns the checklist the
//! planning step wrote into the full ordered checklist the build walks, by
//! inserting the level's required steps around the plan's own items. Stored
//! items are never moved or dropped, so the result is always an acceptable
//! replacement for `TaskDelta::checklist`.

use sdk::types::{ChecklistItem, ComplexityLevel, Task};

/// Gate item closing every phase of a system build
pub const INTEGRATION_TEST: &str = "integration-test";

/// Name used for phase-less items when a phase completes
pub const IMPLICIT_PHASE: &str = "General";

/// A required step, with the plan spellings that satisfy it
struct Step {
    name: &'static str,
    aliases: &'static [&'static str],
}

impl Step {
    const fn new(name: &'static str) -> Self {
        Self { name, aliases: &[] }
    }

    const fn or(name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { name, aliases }
    }

    fn matches(&self, item: &ChecklistItem) -> bool {
        if item.phase.is_some() {
            return false;
        }
        let normalized = normalize(&item.description);
        normalized == self.name || self.aliases.contains(&normalized.as_str())
    }
}

struct Template {
    prefix: &'static [Step],
    /// Inserted when the plan has no items of its own
    fallback: Step,
    suffix: &'static [Step],
}

const QUICK_FIX: Template = Template {
    prefix: &[Step::new("review"), Step::new("examine")],
    fallback: Step::new("fix"),
    suffix: &[Step::new("test"), Step::or("update-task", &["update", "update-tasks"])],
};

const SIMPLE_ENHANCEMENT: Template = Template {
    prefix: &[
        Step::or("review-plan", &["review"]),
        Step::or("examine-code", &["examine"]),
    ],
    fallback: Step::new("implement"),
    suffix: &[
        Step::new("test"),
        Step::or("document-changes", &["document"]),
        Step::or("update-task", &["update", "update-tasks"]),
    ],
};

const FEATURE: Template = Template {
    prefix: &[
        Step::or("review-plan", &["review"]),
        Step::new("review-creative"),
    ],
    fallback: Step::new("build-components"),
    suffix: &[
        Step::new(INTEGRATION_TEST),
        Step::or("document", &["document-changes"]),
        Step::or("update-task", &["update", "update-tasks"]),
    ],
};

const SYSTEM: Template = Template {
    prefix: &[
        Step::or("review-plan", &["review"]),
        Step::new("review-creative"),
        Step::new("review-architecture"),
    ],
    fallback: Step::new("implement"),
    suffix: &[
        Step::or("document", &["document-changes"]),
        Step::or("update-task", &["update", "update-tasks"]),
    ],
};

fn normalize(description: &str) -> String {
    description
        .trim()
        .to_ascii_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Build flow, selected by complexity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    QuickFix,
    SimpleEnhancement,
    Feature,
    System,
}

impl Flow {
    pub fn for_level(level: ComplexityLevel) -> Self {
        match level {
            ComplexityLevel::Level1 => Flow::QuickFix,
            ComplexityLevel::Level2 => Flow::SimpleEnhancement,
            ComplexityLevel::Level3 => Flow::Feature,
            ComplexityLevel::Level4 => Flow::System,
        }
    }

    pub fn level(&self) -> ComplexityLevel {
        match self {
            Flow::QuickFix => ComplexityLevel::Level1,
            Flow::SimpleEnhancement => ComplexityLevel::Level2,
            Flow::Feature => ComplexityLevel::Level3,
            Flow::System => ComplexityLevel::Level4,
        }
    }

    /// Full ordered checklist for `task`
    pub fn checklist(&self, task: &Task) -> Vec<ChecklistItem> {
        match self {
            Flow::QuickFix => quick_fix(task),
            Flow::SimpleEnhancement => simple_enhancement(task),
            Flow::Feature => feature(task),
            Flow::System => system(task),
        }
    }

    /// Whether completing `item` closes a phase
    pub fn is_phase_gate(&self, item: &ChecklistItem) -> bool {
        matches!(self, Flow::System) && item.description == INTEGRATION_TEST
    }
}

fn quick_fix(task: &Task) -> Vec<ChecklistItem> {
    merge(&QUICK_FIX, &task.checklist, |_| true)
}

fn simple_enhancement(task: &Task) -> Vec<ChecklistItem> {
    merge(&SIMPLE_ENHANCEMENT, &task.checklist, |_| true)
}

fn feature(task: &Task) -> Vec<ChecklistItem> {
    merge(&FEATURE, &task.checklist, |_| true)
}

fn system(task: &Task) -> Vec<ChecklistItem> {
    let merged = merge(&SYSTEM, &task.checklist, |item| {
        item.description != INTEGRATION_TEST
    });
    add_phase_gates(&SYSTEM, merged)
}

/// Position class of an item: prefix index, body, or after the body
fn slot(template: &Template, item: &ChecklistItem) -> usize {
    let body = template.prefix.len();
    if let Some(idx) = template.prefix.iter().position(|step| step.matches(item)) {
        return idx;
    }
    if let Some(idx) = template.suffix.iter().position(|step| step.matches(item)) {
        return body + 1 + idx;
    }
    body
}

/// Insert the template steps the stored checklist lacks.
///
/// A missing step goes before the first stored item of a later slot, or at
/// the end. Stored items keep their relative order.
fn merge(
    template: &Template,
    stored: &[ChecklistItem],
    is_own: impl Fn(&ChecklistItem) -> bool,
) -> Vec<ChecklistItem> {
    let body = template.prefix.len();
    let mut items: Vec<(usize, ChecklistItem)> = stored
        .iter()
        .map(|item| (slot(template, item), item.clone()))
        .collect();

    let has_own = items
        .iter()
        .any(|(slot, item)| *slot == body && is_own(item));
    let present = |step: &Step| stored.iter().any(|item| step.matches(item));

    let mut missing: Vec<(usize, &Step)> = template
        .prefix
        .iter()
        .enumerate()
        .filter(|(_, step)| !present(*step))
        .collect();
    if !has_own {
        missing.push((body, &template.fallback));
    }
    missing.extend(
        template
            .suffix
            .iter()
            .enumerate()
            .filter(|(_, step)| !present(*step))
            .map(|(idx, step)| (body + 1 + idx, step)),
    );

    for (slot, step) in missing {
        let at = items
            .iter()
            .position(|(existing, _)| *existing > slot)
            .unwrap_or(items.len());
        items.insert(at, (slot, ChecklistItem::new(step.name)));
    }

    items.into_iter().map(|(_, item)| item).collect()
}

/// Close every phase with an integration-test item. Phase-less plan items
/// form one implicit phase.
fn add_phase_gates(template: &Template, mut items: Vec<ChecklistItem>) -> Vec<ChecklistItem> {
    let body = template.prefix.len();
    let in_group = |item: &ChecklistItem, group: &Option<String>| match group {
        Some(_) => &item.phase == group,
        None => {
            item.phase.is_none()
                && item.description != INTEGRATION_TEST
                && slot(template, item) == body
        }
    };

    let mut groups: Vec<Option<String>> = Vec::new();
    for item in &items {
        let group = item.phase.clone();
        if (group.is_some() || in_group(item, &None)) && !groups.contains(&group) {
            groups.push(group);
        }
    }

    for group in groups {
        let gated = items
            .iter()
            .any(|item| item.phase == group && item.description == INTEGRATION_TEST);
        if gated {
            continue;
        }
        if let Some(last) = items.iter().rposition(|item| in_group(item, &group)) {
            let mut gate = ChecklistItem::new(INTEGRATION_TEST);
            gate.phase = group;
            items.insert(last + 1, gate);
        }
    }

    items
}
