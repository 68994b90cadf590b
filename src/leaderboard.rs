//! Leaderboard ranking and rank-change tracking
//!
//! This module merges server score updates into a stable descending sort
//! and annotates each entry with its movement relative to the immediately
//! preceding snapshot. Ranks are recomputed from scratch on every update;
//! only the previous snapshot's ranks are held in memory, nothing is
//! persisted.

use std::collections::HashMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::roster::PlayerId;

/// Movement of a player between consecutive leaderboard snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankChange {
    /// Ranked higher than in the previous snapshot
    Up,
    /// Ranked lower than in the previous snapshot
    Down,
    /// Unchanged, or absent from the previous snapshot
    Same,
}

/// A player's score as pushed by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRow {
    /// The player this row belongs to
    pub player_id: PlayerId,
    /// Display name at the time of the update
    pub name: String,
    /// Total score
    pub score: u64,
    /// When this score total was first reached, server epoch milliseconds
    ///
    /// Used as the tie-break: of two equal scores, the one achieved
    /// earlier ranks higher.
    pub achieved_at_ms: u64,
}

/// A ranked leaderboard entry derived from the latest snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    /// The player this entry describes
    pub player_id: PlayerId,
    /// Display name
    pub name: String,
    /// Total score
    pub score: u64,
    /// Position in the standings, 1-based and unique
    pub rank: usize,
    /// Position in the previous snapshot, if the player appeared in it
    pub previous_rank: Option<usize>,
    /// Movement relative to the previous snapshot
    pub rank_change: RankChange,
}

/// A truncated standings list that keeps the exact total count
///
/// Public displays show only the top of the board while still reporting
/// how many players are ranked overall.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[derive_where::derive_where(Default)]
pub struct TopList<T> {
    /// The exact number of ranked players
    exact_count: usize,
    /// The leading entries, up to the display limit
    entries: Vec<T>,
}

impl<T: Clone> TopList<T> {
    /// Builds a truncated list from the leading entries of an iterator
    pub fn new<I: Iterator<Item = T>>(entries: I, limit: usize, exact_count: usize) -> Self {
        Self {
            exact_count,
            entries: entries.take(limit).collect_vec(),
        }
    }

    /// Returns the exact number of ranked players
    pub fn exact_count(&self) -> usize {
        self.exact_count
    }

    /// Returns the leading entries
    pub fn entries(&self) -> &[T] {
        &self.entries
    }
}

/// Final standings shown on the podium, computed once per game
#[derive(Debug, Clone, Serialize)]
pub struct PodiumSummary {
    /// The top three entries in rank order
    pub winners: Vec<LeaderboardEntry>,
    /// The full final standings
    pub standings: Vec<LeaderboardEntry>,
}

/// Merges score updates into ranked standings with movement annotations
#[derive(Debug, Default)]
pub struct Ranker {
    /// Ranks from the immediately preceding snapshot
    previous_ranks: HashMap<PlayerId, usize>,
    /// The latest ranked standings
    current: Vec<LeaderboardEntry>,
    /// Final summary, computed at most once when the podium is reached
    podium: once_cell_serde::sync::OnceCell<PodiumSummary>,
}

impl Ranker {
    /// Creates an empty ranker
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the standings with a new score snapshot
    ///
    /// Sorts descending by score with a deterministic tie-break (earliest
    /// achieved-score timestamp, then player id), assigns unique 1-based
    /// ranks, and diffs each player against the previous snapshot. Players
    /// absent from the previous snapshot get [`RankChange::Same`].
    pub fn apply(&mut self, rows: Vec<ScoreRow>) -> &[LeaderboardEntry] {
        let ranked = rows
            .into_iter()
            .sorted_by(|a, b| {
                b.score
                    .cmp(&a.score)
                    .then(a.achieved_at_ms.cmp(&b.achieved_at_ms))
                    .then(a.player_id.cmp(&b.player_id))
            })
            .enumerate()
            .map(|(position, row)| {
                let rank = position + 1;
                let previous_rank = self.previous_ranks.get(&row.player_id).copied();
                let rank_change = match previous_rank {
                    Some(previous) if rank < previous => RankChange::Up,
                    Some(previous) if rank > previous => RankChange::Down,
                    _ => RankChange::Same,
                };
                LeaderboardEntry {
                    player_id: row.player_id,
                    name: row.name,
                    score: row.score,
                    rank,
                    previous_rank,
                    rank_change,
                }
            })
            .collect_vec();

        self.previous_ranks = ranked.iter().map(|e| (e.player_id, e.rank)).collect();
        self.current = ranked;
        &self.current
    }

    /// Returns the latest ranked standings
    pub fn standings(&self) -> &[LeaderboardEntry] {
        &self.current
    }

    /// Returns the rank of a specific player in the latest standings
    pub fn rank_of(&self, player_id: PlayerId) -> Option<usize> {
        self.previous_ranks.get(&player_id).copied()
    }

    /// Returns the standings truncated for display
    pub fn top(&self) -> TopList<LeaderboardEntry> {
        TopList::new(
            self.current.iter().cloned(),
            crate::constants::leaderboard::DISPLAY_LIMIT,
            self.current.len(),
        )
    }

    /// Computes and caches the final podium summary
    ///
    /// The summary is frozen on first call; later score pushes do not
    /// change what the podium shows.
    pub fn podium_summary(&self) -> &PodiumSummary {
        self.podium.get_or_init(|| PodiumSummary {
            winners: self.current.iter().take(3).cloned().collect_vec(),
            standings: self.current.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn player(n: u128) -> PlayerId {
        PlayerId::from(Uuid::from_u128(n))
    }

    fn row(id: PlayerId, name: &str, score: u64, achieved_at_ms: u64) -> ScoreRow {
        ScoreRow {
            player_id: id,
            name: name.to_owned(),
            score,
            achieved_at_ms,
        }
    }

    #[test]
    fn test_rank_changes_against_previous_snapshot() {
        let (p1, p2, p3) = (player(1), player(2), player(3));
        let mut ranker = Ranker::new();

        // First snapshot: P1 rank 1, P3 rank 2, P2 rank 3.
        ranker.apply(vec![
            row(p1, "P1", 300, 10),
            row(p3, "P3", 200, 10),
            row(p2, "P2", 100, 10),
        ]);

        // Second snapshot: P1 rank 1, P2 rank 2, P3 rank 3.
        let standings = ranker.apply(vec![
            row(p1, "P1", 500, 20),
            row(p2, "P2", 400, 20),
            row(p3, "P3", 300, 20),
        ]);

        let changes: HashMap<PlayerId, RankChange> = standings
            .iter()
            .map(|e| (e.player_id, e.rank_change))
            .collect();
        assert_eq!(changes[&p1], RankChange::Same);
        assert_eq!(changes[&p2], RankChange::Up);
        assert_eq!(changes[&p3], RankChange::Down);
    }

    #[test]
    fn test_ranks_are_unique_and_one_based() {
        let mut ranker = Ranker::new();
        let standings = ranker.apply(vec![
            row(player(1), "A", 50, 1),
            row(player(2), "B", 50, 1),
            row(player(3), "C", 10, 1),
        ]);

        let ranks: Vec<usize> = standings.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_ties_broken_by_earliest_achievement_then_id() {
        let (early, late) = (player(9), player(1));
        let mut ranker = Ranker::new();

        let standings = ranker.apply(vec![
            row(late, "Late", 100, 50),
            row(early, "Early", 100, 20),
        ]);
        assert_eq!(standings[0].player_id, early);
        assert_eq!(standings[1].player_id, late);

        // Identical timestamps fall back to player id for determinism.
        let standings = ranker.apply(vec![
            row(player(5), "Five", 100, 30),
            row(player(4), "Four", 100, 30),
        ]);
        assert_eq!(standings[0].player_id, player(4));
        assert_eq!(standings[1].player_id, player(5));
    }

    #[test]
    fn test_new_entrant_gets_same_by_convention() {
        let mut ranker = Ranker::new();
        ranker.apply(vec![row(player(1), "A", 100, 1)]);

        let standings = ranker.apply(vec![
            row(player(1), "A", 100, 1),
            row(player(2), "Joined", 200, 2),
        ]);

        let joined = standings
            .iter()
            .find(|e| e.player_id == player(2))
            .unwrap();
        assert_eq!(joined.rank, 1);
        assert_eq!(joined.previous_rank, None);
        assert_eq!(joined.rank_change, RankChange::Same);

        // The incumbent was pushed down and is annotated as such.
        let incumbent = standings
            .iter()
            .find(|e| e.player_id == player(1))
            .unwrap();
        assert_eq!(incumbent.rank_change, RankChange::Down);
    }

    #[test]
    fn test_first_snapshot_is_all_same() {
        let mut ranker = Ranker::new();
        let standings = ranker.apply(vec![
            row(player(1), "A", 10, 1),
            row(player(2), "B", 20, 1),
        ]);

        assert!(standings.iter().all(|e| e.rank_change == RankChange::Same));
        assert!(standings.iter().all(|e| e.previous_rank.is_none()));
    }

    #[test]
    fn test_top_list_truncates_but_keeps_exact_count() {
        let mut ranker = Ranker::new();
        let rows = (0u32..60)
            .map(|i| {
                row(
                    player(u128::from(i) + 1),
                    &format!("P{i}"),
                    u64::from(100 - i),
                    1,
                )
            })
            .collect_vec();
        ranker.apply(rows);

        let top = ranker.top();
        assert_eq!(top.entries().len(), 50);
        assert_eq!(top.exact_count(), 60);
        assert_eq!(top.entries()[0].rank, 1);
    }

    #[test]
    fn test_podium_summary_frozen_after_first_call() {
        let mut ranker = Ranker::new();
        ranker.apply(vec![
            row(player(1), "Gold", 300, 1),
            row(player(2), "Silver", 200, 1),
            row(player(3), "Bronze", 100, 1),
            row(player(4), "Fourth", 50, 1),
        ]);

        let winners: Vec<PlayerId> = ranker
            .podium_summary()
            .winners
            .iter()
            .map(|e| e.player_id)
            .collect();
        assert_eq!(winners, vec![player(1), player(2), player(3)]);
        assert_eq!(ranker.podium_summary().standings.len(), 4);

        // A late score push does not change the frozen summary.
        ranker.apply(vec![row(player(4), "Fourth", 999, 2)]);
        assert_eq!(
            ranker.podium_summary().winners.first().unwrap().player_id,
            player(1)
        );
    }
}
