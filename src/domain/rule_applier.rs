use log::{debug, warn};

use crate::domain::detector::detect_sections;
use crate::domain::entities::grid::Grid;
use crate::domain::entities::rule::{OverrideEntry, Overrides, Rule, SelectorKind};
use crate::domain::entities::section::{resolve_section_id, to_drafts, Section};
use crate::domain::index::{normalize_index_base, validate_sections};

/// Sections for a grid and whether a remembered rule produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSections {
    pub sections: Vec<Section>,
    pub used_rule: bool,
}

/// Prefers the rule; falls back to fresh detection whenever the rule yields
/// nothing usable. Every returned list has been normalized and validated,
/// except an empty detection, which is returned as is.
pub fn resolve_sections(grid: &Grid, rule: Option<&Rule>) -> ResolvedSections {
    if let Some(rule) = rule {
        match gate(grid, apply_rule(grid, rule)) {
            Some(sections) if !sections.is_empty() => {
                return ResolvedSections {
                    sections,
                    used_rule: true,
                };
            }
            _ => warn!(
                "{} rule v{} produced no valid sections, falling back to detection",
                rule.kind(),
                rule.version()
            ),
        }
    }

    let detected = detect_sections(grid);
    let sections = if detected.is_empty() {
        detected
    } else {
        gate(grid, detected.clone()).unwrap_or(detected)
    };
    ResolvedSections {
        sections,
        used_rule: false,
    }
}

fn gate(grid: &Grid, sections: Vec<Section>) -> Option<Vec<Section>> {
    let normalized = normalize_index_base(&to_drafts(&sections), grid.nrows());
    match validate_sections(&normalized.drafts, grid.nrows()) {
        Ok(sections) => Some(sections),
        Err(err) => {
            debug!("rejected section list: {err}");
            None
        }
    }
}

/// Reproduces a section list from a stored rule. The result is not
/// validated; callers run it through the index gate like any other input.
pub fn apply_rule(grid: &Grid, rule: &Rule) -> Vec<Section> {
    match rule {
        Rule::Structured(structured) => structured.sections.clone(),
        Rule::Overrides(rule) => {
            let detected = detect_sections(grid);
            apply_overrides(detected, &rule.overrides)
        }
    }
}

/// Global header default first, then each entry in order.
pub fn apply_overrides(mut sections: Vec<Section>, overrides: &Overrides) -> Vec<Section> {
    if let Some(header_row) = overrides.header_row {
        for section in &mut sections {
            section.header_row = header_row;
        }
    }
    for entry in &overrides.sections {
        apply_entry(&mut sections, entry);
    }
    sections
}

fn apply_entry(sections: &mut [Section], entry: &OverrideEntry) {
    let targets = matching_positions(sections, entry);
    if targets.is_empty() {
        debug!(
            "override selector {:?}={} matched nothing",
            entry.selector.by, entry.selector.value
        );
        return;
    }
    for idx in targets {
        entry.fields.apply_to(&mut sections[idx]);
    }
}

fn matching_positions(sections: &[Section], entry: &OverrideEntry) -> Vec<usize> {
    match entry.selector.by {
        SelectorKind::Index => resolve_section_id(&entry.selector.value, sections.len())
            .into_iter()
            .collect(),
        SelectorKind::Label => sections
            .iter()
            .enumerate()
            .filter(|(_, section)| section.label.as_deref() == Some(entry.selector.value.as_str()))
            .map(|(idx, _)| idx)
            .collect(),
    }
}
