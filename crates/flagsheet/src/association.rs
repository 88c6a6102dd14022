//! Tool anchors and the rows they drive.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::{MeasureKey, ToolSpec};
use crate::row_index::RowIndex;

/// Row assigned to a tool; its label is written there and request
/// formulas reference it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolAnchor {
    pub name: String,
    pub row: u32,
}

/// A tool measure that did not map to any row of the sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedPair {
    pub tool: String,
    pub key: MeasureKey,
}

impl fmt::Display for UnresolvedPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.tool, self.key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Associations {
    /// One anchor per tool, in tool order
    pub anchors: Vec<ToolAnchor>,
    /// Affected row -> anchor rows driving it, first-seen order
    pub affected: BTreeMap<u32, Vec<u32>>,
    pub unresolved: Vec<UnresolvedPair>,
}

/// Assign anchor rows to `tools` and invert their measure lists through
/// `index`.
///
/// Anchors start at `start_row` and advance by `step` per tool. Keys that
/// are text without a number, or numbers missing from the index, are
/// collected as unresolved. Anchor rows saturate at `u32::MAX`;
/// [`FlagConfig::layout`](crate::FlagConfig::layout) rejects configurations
/// whose anchors leave the sheet.
pub fn associate(tools: &[ToolSpec], index: &RowIndex, start_row: u32, step: u32) -> Associations {
    let mut associations = Associations::default();

    for (i, tool) in tools.iter().enumerate() {
        let offset = u32::try_from(i).unwrap_or(u32::MAX).saturating_mul(step);
        let anchor_row = start_row.saturating_add(offset);
        associations.anchors.push(ToolAnchor {
            name: tool.name.clone(),
            row: anchor_row,
        });

        for key in &tool.measures {
            match key.id().and_then(|id| index.row_of(id)) {
                Some(row) => {
                    let anchors = associations.affected.entry(row).or_default();
                    if !anchors.contains(&anchor_row) {
                        anchors.push(anchor_row);
                    }
                }
                None => associations.unresolved.push(UnresolvedPair {
                    tool: tool.name.clone(),
                    key: key.clone(),
                }),
            }
        }
    }

    if !associations.unresolved.is_empty() {
        tracing::warn!(
            count = associations.unresolved.len(),
            "tool measures not found in the sheet"
        );
    }
    associations
}
