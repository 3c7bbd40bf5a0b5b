//! Compatibility scoring between a student and a supervisor
//!
//! Every `(student tag, supervisor tag)` pair contributes its similarity,
//! weighted by `1/p_student + 1/p_supervisor` so that priority 1 weighs
//! most. The weighted sum is normalized by the weights of the pairs with a
//! nonzero similarity, which keeps the score in `[0, 1]`. No related pair
//! means a score of 0.
//!
//! Profiles keep their entries sorted by tag id, so the accumulation order
//! (and hence the floating-point result) does not depend on how the user
//! listed their tags. The score is not symmetric in its two arguments.

use crate::graph::TagGraph;
use crate::model::PriorityProfile;

pub fn compatibility(student: &PriorityProfile, supervisor: &PriorityProfile, graph: &TagGraph) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    for s in student.entries() {
        for t in supervisor.entries() {
            let similarity = graph.similarity(s.tag_id, t.tag_id);
            if similarity <= 0.0 {
                continue;
            }
            let weight = 1.0 / s.priority as f64 + 1.0 / t.priority as f64;
            weighted += weight * similarity;
            total_weight += weight;
        }
    }

    if total_weight == 0.0 {
        return 0.0;
    }
    (weighted / total_weight).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PriorityEntry, Tag, TagSimilarity};

    const AI: i64 = 1;
    const ML: i64 = 2;
    const DESIGN: i64 = 3;
    const ROBOTICS: i64 = 4;

    fn graph() -> TagGraph {
        TagGraph::new(
            vec![
                Tag { id: AI, name: "AI".into() },
                Tag { id: ML, name: "ML".into() },
                Tag { id: DESIGN, name: "Design".into() },
                Tag { id: ROBOTICS, name: "Robotics".into() },
            ],
            vec![TagSimilarity::new(AI, ML, 0.8), TagSimilarity::new(AI, DESIGN, 0.1)],
        )
    }

    fn profile(user: &str, entries: &[(i64, u32)]) -> PriorityProfile {
        PriorityProfile::new(
            user,
            entries
                .iter()
                .map(|&(tag_id, priority)| PriorityEntry { tag_id, priority })
                .collect(),
        )
    }

    #[test]
    fn test_ai_ml_scenario() {
        let student = profile("stu", &[(AI, 1), (DESIGN, 2)]);
        let supervisor = profile("sup", &[(ML, 1)]);
        let score = compatibility(&student, &supervisor, &graph());
        assert!(score > 0.0);
        // Design-ML is unrelated, so only AI-ML contributes
        assert!((score - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_no_overlap_scores_zero() {
        let student = profile("stu", &[(ML, 1)]);
        let supervisor = profile("sup", &[(ROBOTICS, 1), (DESIGN, 2)]);
        assert_eq!(compatibility(&student, &supervisor, &graph()), 0.0);
        assert_eq!(compatibility(&profile("x", &[]), &supervisor, &graph()), 0.0);
    }

    #[test]
    fn test_identical_tag_scores_one() {
        let student = profile("stu", &[(ROBOTICS, 1)]);
        let supervisor = profile("sup", &[(ROBOTICS, 3)]);
        assert_eq!(compatibility(&student, &supervisor, &graph()), 1.0);
    }

    #[test]
    fn test_higher_priority_weighs_more() {
        // AI matches ML strongly, Design matches AI weakly
        let g = graph();
        let ai_first = compatibility(&profile("a", &[(AI, 1), (DESIGN, 2)]), &profile("s", &[(ML, 1), (AI, 2)]), &g);
        let design_first = compatibility(&profile("b", &[(AI, 2), (DESIGN, 1)]), &profile("s", &[(ML, 1), (AI, 2)]), &g);
        assert!(ai_first > design_first);
    }

    #[test]
    fn test_order_independent() {
        let g = graph();
        let supervisor = profile("sup", &[(ML, 1), (DESIGN, 2), (AI, 3)]);
        let a = compatibility(&profile("s", &[(AI, 1), (DESIGN, 2), (ROBOTICS, 3)]), &supervisor, &g);
        let b = compatibility(&profile("s", &[(ROBOTICS, 3), (DESIGN, 2), (AI, 1)]), &supervisor, &g);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_always_in_unit_interval() {
        let g = graph();
        let tags = [AI, ML, DESIGN, ROBOTICS];
        for i in 0..tags.len() {
            for j in 0..tags.len() {
                let student = profile("s", &[(tags[i], 1), (tags[(i + 1) % 4], 2)]);
                let supervisor = profile("t", &[(tags[j], 1), (tags[(j + 2) % 4], 2)]);
                let score = compatibility(&student, &supervisor, &g);
                assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
            }
        }
    }

    #[test]
    fn test_zero_priority_stays_finite() {
        let student = profile("s", &[(AI, 0), (ML, 1)]);
        let supervisor = profile("t", &[(AI, 0), (ML, 1)]);
        let score = compatibility(&student, &supervisor, &graph());
        assert!(!score.is_nan());
        assert!((score - 1.0).abs() < 1e-12);

        let only_zero = profile("z", &[(AI, 0)]);
        assert_eq!(compatibility(&only_zero, &supervisor, &graph()), 0.0);
    }
}
