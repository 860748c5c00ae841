use serde::Serialize;
use std::collections::BTreeMap;

use crate::codemods::registry::CodemodRegistry;
use crate::codemods::traits::{CodemodContext, Site};
use crate::core::filter::PathFilter;
use crate::findings::traits::{Finding, Location};
use crate::model::source::SourceUnit;
use crate::model::span::{ByteSpan, Position};
use crate::model::symbols::{Resolution, SymbolTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Lost an overlap against a higher-ranked match
    Conflict,
    /// A type the codemod depends on could not be resolved
    ResolutionGap,
    /// The claiming codemod found nothing to rewrite at the finding
    NoTarget,
    /// No enabled codemod claims the finding's rule
    NoCodemod,
    Excluded,
    ParseFailed,
    /// The codemod's replacement equals the original text
    NoChange,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Conflict => "conflict",
            SkipReason::ResolutionGap => "resolution-gap",
            SkipReason::NoTarget => "no-target",
            SkipReason::NoCodemod => "no-codemod",
            SkipReason::Excluded => "excluded",
            SkipReason::ParseFailed => "parse-failed",
            SkipReason::NoChange => "no-change",
        }
    }
}

/// One finding or pattern hit bound to one codemod at one site.
#[derive(Debug, Clone)]
pub struct Match {
    /// Registration index, used as the last ordering key
    pub codemod: usize,
    pub codemod_id: String,
    pub priority: i32,
    pub site: Site,
    /// Sorted ids of the findings this match addresses; empty for pattern hits
    pub findings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedMatch {
    pub reason: SkipReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codemod: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<ByteSpan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<Position>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SkippedMatch {
    pub fn finding(finding: &Finding, reason: SkipReason) -> Self {
        Self {
            reason,
            codemod: None,
            rule: Some(finding.rule.clone()),
            span: finding.location.bytes,
            start: Some(finding.location.start),
            findings: vec![finding.id.clone()],
            detail: None,
        }
    }

    pub fn from_match(m: &Match, unit: &SourceUnit, reason: SkipReason) -> Self {
        Self {
            reason,
            codemod: Some(m.codemod_id.clone()),
            rule: None,
            span: Some(m.site.span),
            start: Some(unit.position(m.site.span.start)),
            findings: m.findings.clone(),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn sort_key(&self) -> (Option<ByteSpan>, Option<Position>, Option<&str>, SkipReason) {
        (self.span, self.start, self.codemod.as_deref(), self.reason)
    }
}

/// Matches accepted for one file, in application order, plus everything
/// that was turned away.
#[derive(Debug, Default)]
pub struct MatchPlan {
    pub accepted: Vec<Match>,
    pub skipped: Vec<SkippedMatch>,
}

/// The byte range of the unit a finding points at.
pub fn finding_region(unit: &SourceUnit, location: &Location) -> Option<ByteSpan> {
    if let Some(bytes) = location.bytes {
        let start = unit.encoding.text_offset(bytes.start);
        let end = unit.encoding.text_offset(bytes.end);
        if let (Some(start), Some(end)) = (start, end) {
            if start <= end
                && end <= unit.text.len()
                && unit.text.is_char_boundary(start)
                && unit.text.is_char_boundary(end)
            {
                return Some(ByteSpan::new(start, end));
            }
        }
    }
    let start = unit
        .lines
        .offset(&unit.text, location.start, location.columns)?;
    let end = unit
        .lines
        .offset(&unit.text, location.end, location.columns)
        .unwrap_or(unit.text.len())
        .max(start);
    Some(ByteSpan::new(start, end))
}

/// Binds findings and pattern scans to codemods for one parsed unit, then
/// resolves overlaps.
///
/// Overlapping matches are ranked by priority (higher first), span start,
/// span end and registration order; the first one wins and every loser is
/// recorded as a conflict.
pub fn plan(
    unit: &SourceUnit,
    findings: &[&Finding],
    registry: &CodemodRegistry,
    active: &[usize],
    symbols: &SymbolTable,
    filter: &PathFilter,
) -> MatchPlan {
    let mut skipped = Vec::new();
    let ctx = CodemodContext::new(unit, symbols);
    let applicable: Vec<usize> = active
        .iter()
        .copied()
        .filter(|i| registry.get(*i).is_some_and(|c| c.applies_to(unit)))
        .collect();

    // (codemod, site span) -> (site, finding ids)
    let mut candidates: BTreeMap<(usize, ByteSpan), (Site, Vec<String>)> = BTreeMap::new();

    for finding in findings {
        let Some(region) = finding_region(unit, &finding.location) else {
            skipped.push(
                SkippedMatch::finding(finding, SkipReason::NoTarget)
                    .with_detail("location is outside the file"),
            );
            continue;
        };
        let claimants: Vec<usize> = applicable
            .iter()
            .copied()
            .filter(|i| {
                registry
                    .get(*i)
                    .is_some_and(|c| c.handles().contains(&finding.rule.as_str()))
            })
            .collect();
        if claimants.is_empty() {
            skipped.push(SkippedMatch::finding(finding, SkipReason::NoCodemod));
            continue;
        }

        for index in claimants {
            let Some(codemod) = registry.get(index) else {
                continue;
            };
            let sites = codemod.locate(&ctx, Some(region));
            if sites.is_empty() {
                let mut skip = SkippedMatch::finding(finding, SkipReason::NoTarget);
                skip.codemod = Some(codemod.id().to_string());
                skipped.push(skip);
                continue;
            }
            for site in sites {
                let entry = candidates
                    .entry((index, site.span))
                    .or_insert_with(|| (site.clone(), Vec::new()));
                entry.1.push(finding.id.clone());
            }
        }
    }

    for index in &applicable {
        let Some(codemod) = registry.get(*index) else {
            continue;
        };
        if !codemod.scans() {
            continue;
        }
        for site in codemod.locate(&ctx, None) {
            candidates
                .entry((*index, site.span))
                .or_insert_with(|| (site, Vec::new()));
        }
    }

    let mut ranked = Vec::new();
    for ((index, _), (site, mut finding_ids)) in candidates {
        let Some(codemod) = registry.get(index) else {
            continue;
        };
        finding_ids.sort();
        finding_ids.dedup();
        let m = Match {
            codemod: index,
            codemod_id: codemod.id().to_string(),
            priority: codemod.priority(),
            site,
            findings: finding_ids,
        };

        let line = unit.position(m.site.span.start).line + 1;
        if !filter.allows_line(&unit.path, line) {
            skipped.push(SkippedMatch::from_match(&m, unit, SkipReason::Excluded));
            continue;
        }

        if codemod.requires_resolution() {
            if let Some(name) = unresolved_need(unit, symbols, &m.site) {
                tracing::debug!(
                    file = %unit.path.display(),
                    codemod = %m.codemod_id,
                    name = %name,
                    "skipping match on resolution gap"
                );
                skipped.push(
                    SkippedMatch::from_match(&m, unit, SkipReason::ResolutionGap).with_detail(name),
                );
                continue;
            }
        }
        ranked.push(m);
    }

    ranked.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.site.span.start.cmp(&b.site.span.start))
            .then(a.site.span.end.cmp(&b.site.span.end))
            .then(a.codemod.cmp(&b.codemod))
    });

    let mut accepted: Vec<Match> = Vec::new();
    for m in ranked {
        if let Some(winner) = accepted.iter().find(|a| a.site.span.overlaps(&m.site.span)) {
            tracing::debug!(
                file = %unit.path.display(),
                codemod = %m.codemod_id,
                winner = %winner.codemod_id,
                "conflicting change skipped"
            );
            let detail = format!("overlaps change from {}", winner.codemod_id);
            skipped.push(SkippedMatch::from_match(&m, unit, SkipReason::Conflict).with_detail(detail));
            continue;
        }
        accepted.push(m);
    }

    accepted.sort_by(|a, b| {
        (a.site.span.start, a.site.span.end, a.codemod)
            .cmp(&(b.site.span.start, b.site.span.end, b.codemod))
    });
    sort_skipped(&mut skipped);

    MatchPlan { accepted, skipped }
}

pub fn sort_skipped(skipped: &mut [SkippedMatch]) {
    skipped.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// Name of the first needed reference that did not resolve.
fn unresolved_need(unit: &SourceUnit, symbols: &SymbolTable, site: &Site) -> Option<String> {
    site.needs.iter().find_map(|need| {
        match symbols.reference_at(&unit.path, *need) {
            Some(r) if matches!(r.resolution, Resolution::Gap(_)) => Some(r.name.clone()),
            Some(_) => None,
            None => Some(unit.slice(*need).unwrap_or_default().to_string()),
        }
    })
}
