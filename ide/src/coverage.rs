use flowide_checker::CancellationToken;
use flowide_types::{CoverageExpressions, CoverageReport, Position, Range};

use crate::text::Document;
use crate::{FlowIde, settle};

/// Whole-number share of covered expressions. A file with no expressions is
/// fully covered.
fn percent(covered: u32, uncovered: u32) -> u32 {
    let total = u64::from(covered) + u64::from(uncovered);
    if total == 0 {
        return 100;
    }
    ((u64::from(covered) * 100 + total / 2) / total) as u32
}

pub(crate) fn to_report(expressions: &CoverageExpressions, decorations: bool) -> CoverageReport {
    let uncovered_ranges = if decorations {
        expressions
            .uncovered_locs
            .iter()
            .map(|loc| {
                Range::new(
                    Position::saturating_from_checker(loc.start.line, loc.start.column),
                    Position::new(loc.end.line.saturating_sub(1), loc.end.column),
                )
            })
            .collect()
    } else {
        Vec::new()
    };
    CoverageReport {
        covered: expressions.covered_count,
        uncovered: expressions.uncovered_count,
        percent: percent(expressions.covered_count, expressions.uncovered_count),
        uncovered_ranges,
    }
}

impl FlowIde {
    /// Coverage of the buffer. Empty buffers are not sent to the checker.
    pub async fn coverage(
        &self,
        doc: Document<'_>,
        cancel: Option<CancellationToken>,
    ) -> Option<CoverageReport> {
        if doc.text.is_empty() {
            return None;
        }
        let response = settle(
            "coverage",
            self.client().coverage(doc.path, doc.text, cancel).await,
        )?;
        Some(to_report(
            &response.expressions,
            self.settings().coverage_decorations,
        ))
    }
}
