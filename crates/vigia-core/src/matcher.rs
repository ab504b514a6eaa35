//! Gallery matching: resolve a probe embedding to an enrolled subject.

use crate::types::{euclidean_distance, l2_normalize, GalleryEntry, SubjectId};

/// Default L2 distance below which a probe and a reference count as the
/// same person.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.68;

/// A resolved gallery match.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryMatch {
    pub subject_id: SubjectId,
    pub distance: f32,
}

/// Strategy for comparing a probe embedding against the enrolled gallery.
pub trait Matcher {
    fn match_probe(&self, probe: &[f32], gallery: &[GalleryEntry]) -> Option<GalleryMatch>;
}

/// First-acceptable-match policy over Euclidean distance.
///
/// Walks the gallery in order and stops at the FIRST reference vector
/// strictly under the threshold. This is not a global-minimum search:
/// gallery iteration order decides which subject wins a near-tie, and that
/// behavior is intentional. Each stored reference is re-normalized before
/// comparison, so unnormalized rows in the identity store still compare
/// correctly.
#[derive(Debug, Clone, Copy)]
pub struct FirstAcceptableMatcher {
    pub threshold: f32,
}

impl FirstAcceptableMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for FirstAcceptableMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl Matcher for FirstAcceptableMatcher {
    fn match_probe(&self, probe: &[f32], gallery: &[GalleryEntry]) -> Option<GalleryMatch> {
        for entry in gallery {
            for reference in &entry.references {
                if reference.len() != probe.len() {
                    tracing::warn!(
                        subject = entry.subject_id,
                        reference_dim = reference.len(),
                        probe_dim = probe.len(),
                        "skipping reference with mismatched dimension"
                    );
                    continue;
                }

                let mut known = reference.clone();
                l2_normalize(&mut known);
                let distance = euclidean_distance(probe, &known);

                if distance < self.threshold {
                    tracing::debug!(
                        subject = entry.subject_id,
                        distance,
                        threshold = self.threshold,
                        "gallery match"
                    );
                    return Some(GalleryMatch {
                        subject_id: entry.subject_id,
                        distance,
                    });
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(subject_id: SubjectId, references: Vec<Vec<f32>>) -> GalleryEntry {
        GalleryEntry {
            subject_id,
            display_name: format!("subject-{subject_id}"),
            references,
        }
    }

    #[test]
    fn test_match_under_threshold() {
        let gallery = vec![entry(42, vec![vec![1.0, 0.0, 0.0]])];
        let probe = vec![1.0, 0.0, 0.0];

        let m = FirstAcceptableMatcher::new(0.68)
            .match_probe(&probe, &gallery)
            .expect("identical vectors must match");
        assert_eq!(m.subject_id, 42);
        assert!(m.distance < 1e-6);
    }

    #[test]
    fn test_no_match_returns_none() {
        // Orthogonal unit vectors sit at distance sqrt(2), well over 0.68.
        let gallery = vec![entry(1, vec![vec![1.0, 0.0]])];
        let probe = vec![0.0, 1.0];

        assert!(FirstAcceptableMatcher::default()
            .match_probe(&probe, &gallery)
            .is_none());
    }

    #[test]
    fn test_distance_equal_to_threshold_does_not_match() {
        // Distance between these unit vectors is exactly 1.0; with a
        // threshold of 1.0 the comparison must stay strict.
        let gallery = vec![entry(1, vec![vec![1.0, 0.0]])];
        let probe = vec![0.0, 1.0];
        let d = euclidean_distance(&probe, &[1.0, 0.0]);

        assert!(FirstAcceptableMatcher::new(d)
            .match_probe(&probe, &gallery)
            .is_none());
        assert!(FirstAcceptableMatcher::new(d + 1e-3)
            .match_probe(&probe, &gallery)
            .is_some());
    }

    #[test]
    fn test_first_acceptable_wins_over_closer_later_entry() {
        // Subject 1 is acceptable but subject 2 is strictly closer; the
        // first-under-threshold policy must still report subject 1.
        let probe = vec![1.0, 0.0];
        let mut near = vec![0.995, 0.0998];
        l2_normalize(&mut near);

        let gallery = vec![
            entry(1, vec![near]),
            entry(2, vec![vec![1.0, 0.0]]),
        ];

        let m = FirstAcceptableMatcher::new(0.68)
            .match_probe(&probe, &gallery)
            .unwrap();
        assert_eq!(m.subject_id, 1);
    }

    #[test]
    fn test_references_are_renormalized() {
        // Stored reference has the right direction but a wild magnitude.
        let gallery = vec![entry(7, vec![vec![250.0, 0.0, 0.0]])];
        let probe = vec![1.0, 0.0, 0.0];

        let m = FirstAcceptableMatcher::default()
            .match_probe(&probe, &gallery)
            .expect("direction match must survive magnitude");
        assert_eq!(m.subject_id, 7);
        assert!(m.distance < 1e-6);
    }

    #[test]
    fn test_empty_gallery_and_empty_references() {
        let probe = vec![1.0, 0.0];
        let matcher = FirstAcceptableMatcher::default();

        assert!(matcher.match_probe(&probe, &[]).is_none());
        assert!(matcher
            .match_probe(&probe, &[entry(1, vec![])])
            .is_none());
    }

    #[test]
    fn test_mismatched_dimension_skipped() {
        let gallery = vec![entry(
            3,
            vec![vec![1.0, 0.0, 0.0, 0.0], vec![1.0, 0.0]],
        )];
        let probe = vec![1.0, 0.0];

        let m = FirstAcceptableMatcher::default()
            .match_probe(&probe, &gallery)
            .expect("second reference has the right dimension");
        assert_eq!(m.subject_id, 3);
    }
}
