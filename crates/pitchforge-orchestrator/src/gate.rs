use pitchforge_core::{Pitch, Score};

/// What the quality gate decides after a pitch has been scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Threshold reached; finalize this pitch.
    Pass,
    /// Below threshold with iterations left.
    Refine,
    /// Below threshold and out of iterations; finalize the best pitch seen.
    Exhausted,
}

/// `iteration` is the number of refinements performed so far.
pub fn decide(score: &Score, threshold: f64, iteration: u32, max_iterations: u32) -> GateDecision {
    if score.meets(threshold) {
        GateDecision::Pass
    } else if iteration < max_iterations {
        GateDecision::Refine
    } else {
        GateDecision::Exhausted
    }
}

/// Highest-scoring pitch of a run. Ties go to the later pitch.
#[derive(Debug, Default)]
pub struct BestPitch {
    best: Option<Pitch>,
}

impl BestPitch {
    /// Consider a scored pitch. Unscored pitches are ignored.
    pub fn observe(&mut self, pitch: &Pitch) {
        let Some(score) = pitch.overall_score() else {
            return;
        };
        let replace = match self.best.as_ref().and_then(Pitch::overall_score) {
            Some(best) => score >= best,
            None => true,
        };
        if replace {
            self.best = Some(pitch.clone());
        }
    }

    /// Best pitch so far.
    pub fn get(&self) -> Option<&Pitch> {
        self.best.as_ref()
    }

    /// Take the best pitch.
    pub fn into_inner(self) -> Option<Pitch> {
        self.best
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pitchforge_core::{Draft, PitchType, Tone};
    use uuid::Uuid;

    fn scored(content: &str, value: f64) -> Pitch {
        let mut p = Pitch::initial(
            Uuid::new_v4(),
            Draft::new("T", content),
            PitchType::Initial,
            Tone::Professional,
        );
        p.set_score(Score::uniform(value));
        p
    }

    #[test]
    fn test_decide() {
        assert_eq!(decide(&Score::uniform(0.9), 0.7, 0, 3), GateDecision::Pass);
        assert_eq!(decide(&Score::uniform(0.5), 0.7, 0, 3), GateDecision::Refine);
        assert_eq!(decide(&Score::uniform(0.5), 0.7, 3, 3), GateDecision::Exhausted);
        // Zero iterations means a single scoring pass.
        assert_eq!(decide(&Score::uniform(0.5), 0.7, 0, 0), GateDecision::Exhausted);
    }

    #[test]
    fn test_threshold_is_inclusive_within_epsilon() {
        // Accumulated increments can land a hair under 0.7.
        let value = 0.5 + 0.1 + 0.1;
        assert_eq!(decide(&Score::uniform(value), 0.7, 2, 3), GateDecision::Pass);
    }

    #[test]
    fn test_best_pitch_prefers_later_on_tie() {
        let mut best = BestPitch::default();
        let first = scored("one", 0.3);
        let second = scored("two", 0.3);
        let worse = scored("three", 0.2);
        best.observe(&first);
        best.observe(&second);
        best.observe(&worse);
        assert_eq!(best.get().unwrap().id, second.id);
    }

    #[test]
    fn test_best_pitch_ignores_unscored() {
        let mut best = BestPitch::default();
        let unscored = Pitch::initial(
            Uuid::new_v4(),
            Draft::new("T", "x"),
            PitchType::Initial,
            Tone::Casual,
        );
        best.observe(&unscored);
        assert!(best.into_inner().is_none());
    }
}
