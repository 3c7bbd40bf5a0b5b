//! Supervisor ranking for one student
//!
//! Pure function over snapshots: the same student, candidates, graph and
//! options always produce the same order. Ties on score fall back to
//! `available_spots` (descending), then `supervisor_id` (ascending).

use std::cmp::Ordering;

use serde::Serialize;

use crate::graph::TagGraph;
use crate::model::{PriorityProfile, RequestState, SupervisorCapacity};
use crate::scoring::compatibility;

/// A supervisor as seen by the ranker
#[derive(Debug, Clone)]
pub struct Candidate {
    pub profile: PriorityProfile,
    pub capacity: SupervisorCapacity,
    pub pending_requests: u32,
    /// Decided request between this student and the supervisor, if any
    pub decided: Option<RequestState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankOptions {
    /// Drop supervisors with no available spot
    pub available_only: bool,
    /// Drop supervisors that already accepted or rejected this student
    pub exclude_decided: bool,
}

/// Same defaults the daemon ships in its config file
impl Default for RankOptions {
    fn default() -> Self {
        Self {
            available_only: false,
            exclude_decided: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedSupervisor {
    pub supervisor_id: String,
    pub compatibility_score: f64,
    pub available_spots: u32,
    pub total_spots: u32,
    pub pending_requests: u32,
    /// Supervisor tags by priority
    pub tags: Vec<String>,
    pub at_capacity: bool,
}

/// Ordered, immutable ranking; iterate it as often as needed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Ranking {
    entries: Vec<RankedSupervisor>,
}

impl Ranking {
    pub fn iter(&self) -> std::slice::Iter<'_, RankedSupervisor> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<RankedSupervisor> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a Ranking {
    type Item = &'a RankedSupervisor;
    type IntoIter = std::slice::Iter<'a, RankedSupervisor>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn is_decided(state: Option<RequestState>) -> bool {
    matches!(state, Some(RequestState::Accepted) | Some(RequestState::Rejected))
}

fn ranking_order(a: &RankedSupervisor, b: &RankedSupervisor) -> Ordering {
    b.compatibility_score
        .total_cmp(&a.compatibility_score)
        .then_with(|| b.available_spots.cmp(&a.available_spots))
        .then_with(|| a.supervisor_id.cmp(&b.supervisor_id))
}

pub fn rank(
    student: &PriorityProfile,
    candidates: &[Candidate],
    graph: &TagGraph,
    options: RankOptions,
) -> Ranking {
    let mut entries: Vec<RankedSupervisor> = candidates
        .iter()
        .filter(|c| c.capacity.supervisor_id != student.user_id)
        .filter(|c| !(options.available_only && c.capacity.is_full()))
        .filter(|c| !(options.exclude_decided && is_decided(c.decided)))
        .map(|c| RankedSupervisor {
            supervisor_id: c.capacity.supervisor_id.clone(),
            compatibility_score: compatibility(student, &c.profile, graph),
            available_spots: c.capacity.available_spots,
            total_spots: c.capacity.total_spots,
            pending_requests: c.pending_requests,
            tags: c
                .profile
                .tags_by_priority()
                .into_iter()
                .filter_map(|id| graph.tag_name(id).map(str::to_string))
                .collect(),
            at_capacity: c.capacity.is_full(),
        })
        .collect();

    entries.sort_by(ranking_order);
    Ranking { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PriorityEntry, Tag, TagSimilarity};

    fn graph() -> TagGraph {
        TagGraph::new(
            vec![
                Tag { id: 1, name: "AI".into() },
                Tag { id: 2, name: "ML".into() },
                Tag { id: 3, name: "Design".into() },
            ],
            vec![TagSimilarity::new(1, 2, 0.8), TagSimilarity::new(1, 3, 0.1)],
        )
    }

    fn candidate(id: &str, tags: &[(i64, u32)], total: u32, available: u32) -> Candidate {
        Candidate {
            profile: PriorityProfile::new(
                id,
                tags.iter().map(|&(tag_id, priority)| PriorityEntry { tag_id, priority }).collect(),
            ),
            capacity: SupervisorCapacity {
                supervisor_id: id.into(),
                total_spots: total,
                available_spots: available,
            },
            pending_requests: 0,
            decided: None,
        }
    }

    fn student() -> PriorityProfile {
        PriorityProfile::new(
            "stu",
            vec![
                PriorityEntry { tag_id: 1, priority: 1 },
                PriorityEntry { tag_id: 3, priority: 2 },
            ],
        )
    }

    fn ids(ranking: &Ranking) -> Vec<&str> {
        ranking.iter().map(|r| r.supervisor_id.as_str()).collect()
    }

    #[test]
    fn test_orders_by_score() {
        let candidates = vec![
            candidate("design", &[(3, 1)], 2, 2),
            candidate("ml", &[(2, 1)], 2, 2),
            candidate("none", &[], 2, 2),
        ];
        let ranking = rank(&student(), &candidates, &graph(), RankOptions::default());
        assert_eq!(ids(&ranking), vec!["ml", "design", "none"]);
        assert!((ranking.iter().next().unwrap().compatibility_score - 0.8).abs() < 1e-12);
        assert_eq!(ranking.iter().last().unwrap().compatibility_score, 0.0);
    }

    #[test]
    fn test_tie_breaks() {
        let candidates = vec![
            candidate("c", &[(2, 1)], 3, 1),
            candidate("b", &[(2, 1)], 3, 3),
            candidate("a", &[(2, 1)], 3, 1),
        ];
        let ranking = rank(&student(), &candidates, &graph(), RankOptions::default());
        assert_eq!(ids(&ranking), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_deterministic_and_restartable() {
        let candidates = vec![
            candidate("x", &[(2, 1)], 1, 1),
            candidate("y", &[(3, 1), (2, 2)], 1, 0),
            candidate("z", &[(1, 1)], 2, 1),
        ];
        let first = rank(&student(), &candidates, &graph(), RankOptions::default());
        let mut reversed = candidates.clone();
        reversed.reverse();
        let second = rank(&student(), &reversed, &graph(), RankOptions::default());
        assert_eq!(first, second);

        let once: Vec<_> = first.iter().collect();
        let twice: Vec<_> = (&first).into_iter().collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_full_supervisors_flagged_or_filtered() {
        let candidates = vec![candidate("full", &[(2, 1)], 2, 0), candidate("open", &[(3, 1)], 1, 1)];

        let ranking = rank(&student(), &candidates, &graph(), RankOptions::default());
        assert_eq!(ranking.len(), 2);
        let full = ranking.iter().find(|r| r.supervisor_id == "full").unwrap();
        assert!(full.at_capacity);

        let only_open = rank(
            &student(),
            &candidates,
            &graph(),
            RankOptions { available_only: true, ..Default::default() },
        );
        assert_eq!(ids(&only_open), vec!["open"]);
    }

    #[test]
    fn test_exclude_decided() {
        let mut rejected = candidate("rejected", &[(2, 1)], 1, 1);
        rejected.decided = Some(RequestState::Rejected);
        let mut withdrawn = candidate("withdrawn", &[(2, 1)], 1, 1);
        withdrawn.decided = Some(RequestState::Withdrawn);
        let candidates = vec![rejected, withdrawn];

        let all = rank(
            &student(),
            &candidates,
            &graph(),
            RankOptions { exclude_decided: false, ..Default::default() },
        );
        assert_eq!(all.len(), 2);

        let filtered = rank(&student(), &candidates, &graph(), RankOptions::default());
        assert_eq!(ids(&filtered), vec!["withdrawn"]);
    }

    #[test]
    fn test_tags_listed_by_priority() {
        let candidates = vec![candidate("sup", &[(3, 2), (2, 1)], 1, 1)];
        let ranking = rank(&student(), &candidates, &graph(), RankOptions::default());
        assert_eq!(ranking.iter().next().unwrap().tags, vec!["ML", "Design"]);
    }

    #[test]
    fn test_student_not_ranked_against_self() {
        let candidates = vec![candidate("stu", &[(1, 1)], 1, 1)];
        assert!(rank(&student(), &candidates, &graph(), RankOptions::default()).is_empty());
    }

    #[test]
    fn test_default_options_match_config() {
        let options = RankOptions::default();
        assert!(!options.available_only);
        assert!(options.exclude_decided);
        assert_eq!(options, RankOptions::from(crate::config::RankingConfig::default()));
    }
}
