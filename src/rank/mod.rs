//! Recommendation ranking
//!
//! Scores raw result rows into an ordered, explainable recommendation
//! list. Per-signal values are min-max normalized over the current result
//! set (scores are comparable within one response, not across responses),
//! combined as a weighted sum, and ordered descending with node-id
//! tie-breaks so identical inputs always produce identical output.

use crate::config::RankingProfile;
use crate::exec::{NodeRecord, PathRecord, RawResult, ResultRow};
use crate::intent::{RankingCriterion, ScalarValue, Signal, SortDirection};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Ranking errors
#[derive(Error, Debug)]
pub enum RankError {
    /// No signal produced any score (e.g. an empty result set)
    #[error("ranking unavailable: no signal produced a score")]
    Unavailable,
}

pub type RankResult<T> = Result<T, RankError>;

/// One signal's contribution to an item's composite score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalValue {
    pub signal: Signal,
    /// Value as computed from the row (0 when the row carried none)
    pub raw: f64,
    /// Min-max normalized over the result set, direction applied
    pub normalized: f64,
    pub weight: f64,
    pub contribution: f64,
}

/// Evidence justifying one ranked item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationTrace {
    /// Traversal paths that produced the item
    pub paths: Vec<PathRecord>,
    /// The signal contributing most to the score
    pub dominant: Option<Signal>,
}

/// One recommendation: node, composite score, per-signal evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub node: NodeRecord,
    pub score: f64,
    pub signals: Vec<SignalValue>,
    pub trace: ExplanationTrace,
}

/// Scores and orders raw results
pub struct Ranker {
    min_score: f64,
    weight_attribute: Option<String>,
}

impl Ranker {
    pub fn new(profile: &RankingProfile) -> Self {
        Self {
            min_score: profile.min_score,
            weight_attribute: profile.bindings.weight_attribute.clone(),
        }
    }

    /// Rank rows by the given criteria, truncating to `limit`.
    ///
    /// Deterministic: identical rows and weights yield identical ordering.
    pub fn rank(
        &self,
        raw: &RawResult,
        criteria: &[RankingCriterion],
        limit: usize,
    ) -> RankResult<Vec<RankedItem>> {
        if raw.is_empty() {
            return Err(RankError::Unavailable);
        }

        // Raw signal values per row, column per criterion
        let mut produced_any = false;
        let columns: Vec<Vec<Option<f64>>> = criteria
            .iter()
            .map(|criterion| {
                raw.rows
                    .iter()
                    .map(|row| {
                        let value = self.extract(row, criterion.signal);
                        produced_any |= value.is_some();
                        value
                    })
                    .collect()
            })
            .collect();

        if !produced_any {
            return Err(RankError::Unavailable);
        }

        // Min-max bounds per signal over the current result set
        let bounds: Vec<(f64, f64)> = columns
            .iter()
            .map(|column| {
                let mut min = f64::INFINITY;
                let mut max = f64::NEG_INFINITY;
                for value in column.iter().flatten() {
                    min = min.min(*value);
                    max = max.max(*value);
                }
                (min, max)
            })
            .collect();

        let mut items: Vec<RankedItem> = raw
            .rows
            .iter()
            .enumerate()
            .filter_map(|(row_index, row)| {
                let node = row.target()?.clone();
                let mut signals = Vec::with_capacity(criteria.len());
                let mut score = 0.0;

                for (col, criterion) in criteria.iter().enumerate() {
                    let value = columns[col][row_index];
                    let normalized = match value {
                        Some(raw_value) => {
                            let oriented = normalize(raw_value, bounds[col]);
                            match criterion.direction {
                                SortDirection::Descending => oriented,
                                SortDirection::Ascending => 1.0 - oriented,
                            }
                        }
                        // A row that carried no value for a signal earns
                        // nothing from it
                        None => 0.0,
                    };
                    let contribution = criterion.weight * normalized;
                    score += contribution;
                    signals.push(SignalValue {
                        signal: criterion.signal,
                        raw: value.unwrap_or(0.0),
                        normalized,
                        weight: criterion.weight,
                        contribution,
                    });
                }

                let dominant = signals
                    .iter()
                    .filter(|s| s.contribution > 0.0)
                    .max_by(|a, b| a.contribution.total_cmp(&b.contribution))
                    .map(|s| s.signal);

                Some(RankedItem {
                    node,
                    score,
                    signals,
                    trace: ExplanationTrace {
                        paths: row.paths().cloned().collect(),
                        dominant,
                    },
                })
            })
            .collect();

        items.retain(|item| item.score >= self.min_score);
        items.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.node.id.cmp(&b.node.id))
        });
        items.truncate(limit);

        debug!(items = items.len(), "ranked result set");
        Ok(items)
    }

    fn extract(&self, row: &ResultRow, signal: Signal) -> Option<f64> {
        match signal {
            Signal::PathLength => row.paths().map(|path| path.len()).min().map(|n| n as f64),
            Signal::EdgeWeight => {
                let attribute = self.weight_attribute.as_deref()?;
                let mut sum = 0.0;
                let mut count = 0usize;
                for path in row.paths() {
                    for edge in &path.edges {
                        if let Some(value) = edge.attr(attribute).and_then(ScalarValue::as_float) {
                            sum += value;
                            count += 1;
                        }
                    }
                }
                (count > 0).then(|| sum / count as f64)
            }
            _ => row.get(signal.name()).and_then(|value| value.as_f64()),
        }
    }
}

/// Min-max scaling; a constant column scores full marks everywhere so a
/// single-row result still earns its weight
fn normalize(value: f64, (min, max): (f64, f64)) -> f64 {
    if max <= min {
        1.0
    } else {
        (value - min) / (max - min)
    }
}
