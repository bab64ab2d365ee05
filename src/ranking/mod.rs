//! Coverage ranking index.
//!
//! A derived member-to-score structure over client coverage totals,
//! rebuilt wholesale whenever totals move (policy issued, client
//! purged, bulk load). Never incrementally patched: rebuild replaces
//! the entire previous ranking in one swap.

use std::sync::RwLock;

use metrics::counter;
use serde::Serialize;
use tracing::info;

use crate::application::repos::CoverageTotal;
use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "ranking::index";

const METRIC_RANKING_REBUILD_TOTAL: &str = "polizza_ranking_rebuild_total";

/// One ranked member.
///
/// The member composes the client id and display name as
/// `"{client_id}|{first} {last}"`; the score is the client's summed
/// policy coverage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingEntry {
    pub member: String,
    pub score: f64,
}

impl RankingEntry {
    /// Split the member back into client id and display name.
    pub fn split(&self) -> Option<(u32, &str)> {
        let (id, name) = self.member.split_once('|')?;
        Some((id.parse().ok()?, name))
    }
}

/// Full-rebuild top-N index over client coverage totals.
///
/// Entries are sorted once at rebuild time (descending score, ties by
/// ascending client id), so reads are prefix slices.
pub struct RankingIndex {
    entries: RwLock<Vec<RankingEntry>>,
}

impl RankingIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Replace the whole ranking with freshly computed totals.
    ///
    /// Clients whose total is not strictly positive are left out.
    /// Returns the number of ranked members.
    pub fn rebuild_from(&self, totals: &[CoverageTotal]) -> usize {
        let mut ranked: Vec<(u32, RankingEntry)> = totals
            .iter()
            .filter(|total| total.total_coverage > 0.0)
            .map(|total| {
                let entry = RankingEntry {
                    member: format!("{}|{}", total.client_id, total.display_name),
                    score: total.total_coverage,
                };
                (total.client_id, entry)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then_with(|| a.0.cmp(&b.0)));

        let entries: Vec<RankingEntry> = ranked.into_iter().map(|(_, entry)| entry).collect();
        let count = entries.len();
        *rw_write(&self.entries, SOURCE, "rebuild") = entries;

        counter!(METRIC_RANKING_REBUILD_TOTAL).increment(1);
        info!(members = count, "Ranking index rebuilt");
        count
    }

    /// The highest-scoring `n` members, best first.
    pub fn top_n(&self, n: usize) -> Vec<RankingEntry> {
        let entries = rw_read(&self.entries, SOURCE, "top_n");
        entries.iter().take(n).cloned().collect()
    }

    /// Number of ranked members.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    /// Whether the ranking holds no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RankingIndex {
    fn default() -> Self {
        Self::new()
    }
}
