use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::matcher::{Match, SkipReason, SkippedMatch};
use crate::codemods::registry::CodemodRegistry;
use crate::codemods::traits::{CodemodContext, Replacement};
use crate::core::error::{CodemodError, ParseError};
use crate::model::source::SourceUnit;
use crate::model::span::{ByteSpan, Position};
use crate::model::symbols::SymbolTable;

/// One applied codemod edit, in original-text coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeHunk {
    pub span: ByteSpan,
    pub start: Position,
    pub end: Position,
    pub original: String,
    pub replacement: String,
    pub codemod: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "kebab-case")]
pub enum FileError {
    Parse {
        message: String,
        error: ParseError,
    },
    Codemod {
        message: String,
        codemod: String,
        span: ByteSpan,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        findings: Vec<String>,
        error: CodemodError,
    },
}

impl FileError {
    pub fn parse(error: ParseError) -> Self {
        FileError::Parse {
            message: error.to_string(),
            error,
        }
    }

    fn codemod(m: &Match, error: CodemodError) -> Self {
        FileError::Codemod {
            message: error.to_string(),
            codemod: m.codemod_id.clone(),
            span: m.site.span,
            findings: m.findings.clone(),
            error,
        }
    }
}

/// Outcome of applying a file's accepted matches.
#[derive(Debug, Default)]
pub struct Execution {
    pub text: String,
    pub hunks: Vec<ChangeHunk>,
    pub errors: Vec<FileError>,
    pub unchanged: Vec<SkippedMatch>,
}

/// Applies accepted, non-overlapping matches in ascending span order.
///
/// Each codemod call is isolated: an error or panic is recorded against its
/// match and the remaining matches are still applied. The returned text is
/// complete even when some matches failed.
pub fn execute(
    unit: &SourceUnit,
    matches: &[Match],
    registry: &CodemodRegistry,
    symbols: &SymbolTable,
) -> Execution {
    let tree = unit.tree().cloned();
    let ctx = CodemodContext {
        unit,
        tree: tree.as_ref(),
        symbols,
    };

    let mut ordered: Vec<&Match> = matches.iter().collect();
    ordered.sort_by_key(|m| (m.site.span.start, m.site.span.end, m.codemod));

    let mut execution = Execution::default();
    for m in ordered {
        let Some(codemod) = registry.get(m.codemod) else {
            continue;
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| codemod.apply(&ctx, &m.site)));
        let replacement = match outcome {
            Ok(Ok(replacement)) => replacement,
            Ok(Err(err)) => {
                record_failure(
                    unit,
                    &mut execution,
                    m,
                    CodemodError::Failed {
                        message: format!("{:#}", err),
                    },
                );
                continue;
            }
            Err(payload) => {
                record_failure(
                    unit,
                    &mut execution,
                    m,
                    CodemodError::Panicked {
                        message: panic_message(payload.as_ref()),
                    },
                );
                continue;
            }
        };

        if let Err(err) = validate(unit, m, &replacement) {
            record_failure(unit, &mut execution, m, err);
            continue;
        }

        let original = &unit.text[replacement.span.range()];
        let text = unit.line_ending.apply(&replacement.text).into_owned();
        if original == text {
            execution
                .unchanged
                .push(SkippedMatch::from_match(m, unit, SkipReason::NoChange));
            continue;
        }

        execution.hunks.push(ChangeHunk {
            span: replacement.span,
            start: unit.position(replacement.span.start),
            end: unit.position(replacement.span.end),
            original: original.to_string(),
            replacement: text,
            codemod: m.codemod_id.clone(),
            findings: m.findings.clone(),
            description: replacement.description,
        });
    }

    execution
        .hunks
        .sort_by_key(|h| (h.span.start, h.span.end));
    execution.text = splice(&unit.text, &execution.hunks);
    execution
}

fn record_failure(unit: &SourceUnit, execution: &mut Execution, m: &Match, error: CodemodError) {
    tracing::warn!(
        file = %unit.path.display(),
        codemod = %m.codemod_id,
        error = %error,
        "codemod failed"
    );
    execution.errors.push(FileError::codemod(m, error));
}

/// A replacement must stay inside its site and on character boundaries.
fn validate(unit: &SourceUnit, m: &Match, replacement: &Replacement) -> Result<(), CodemodError> {
    let span = replacement.span;
    let inside = m.site.span.contains(&span) && span.start <= span.end;
    let aligned = span.end <= unit.text.len()
        && unit.text.is_char_boundary(span.start)
        && unit.text.is_char_boundary(span.end);
    if inside && aligned {
        Ok(())
    } else {
        Err(CodemodError::InvalidReplacement {
            start: span.start,
            end: span.end,
            target_start: m.site.span.start,
            target_end: m.site.span.end,
        })
    }
}

/// Rebuilds the text from non-overlapping hunks sorted by span.
pub fn splice(original: &str, hunks: &[ChangeHunk]) -> String {
    let mut out = String::with_capacity(original.len());
    let mut cursor = 0;
    for hunk in hunks {
        out.push_str(&original[cursor..hunk.span.start]);
        out.push_str(&hunk.replacement);
        cursor = hunk.span.end;
    }
    out.push_str(&original[cursor..]);
    out
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "codemod panicked".to_string()
    }
}
