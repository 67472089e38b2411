use serde::{Deserialize, Serialize};

/// Tolerance used when comparing an overall score against a threshold.
pub const SCORE_EPSILON: f64 = 1e-9;

/// One of the five scoring dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// How convincing the pitch is.
    Persuasiveness,
    /// How easy it is to follow.
    Clarity,
    /// How well it fits the customer.
    Relevance,
    /// How specific it is to the customer.
    Personalization,
    /// How clear the next step is.
    CallToAction,
}

impl Dimension {
    /// Every dimension, in display order.
    pub const ALL: [Dimension; 5] = [
        Dimension::Persuasiveness,
        Dimension::Clarity,
        Dimension::Relevance,
        Dimension::Personalization,
        Dimension::CallToAction,
    ];

    /// Snake-case name used in score JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Persuasiveness => "persuasiveness",
            Dimension::Clarity => "clarity",
            Dimension::Relevance => "relevance",
            Dimension::Personalization => "personalization",
            Dimension::CallToAction => "call_to_action",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-dimension scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    /// How convincing the pitch is.
    pub persuasiveness: f64,
    /// How easy it is to follow.
    pub clarity: f64,
    /// How well it fits the customer.
    pub relevance: f64,
    /// How specific it is to the customer.
    pub personalization: f64,
    /// How clear the next step is.
    pub call_to_action: f64,
}

impl Dimensions {
    /// All five dimensions set to the same value.
    pub fn uniform(value: f64) -> Self {
        Self {
            persuasiveness: value,
            clarity: value,
            relevance: value,
            personalization: value,
            call_to_action: value,
        }
    }

    /// Value of one dimension.
    pub fn get(&self, dim: Dimension) -> f64 {
        match dim {
            Dimension::Persuasiveness => self.persuasiveness,
            Dimension::Clarity => self.clarity,
            Dimension::Relevance => self.relevance,
            Dimension::Personalization => self.personalization,
            Dimension::CallToAction => self.call_to_action,
        }
    }

    /// Overwrite one dimension.
    pub fn set(&mut self, dim: Dimension, value: f64) {
        let slot = match dim {
            Dimension::Persuasiveness => &mut self.persuasiveness,
            Dimension::Clarity => &mut self.clarity,
            Dimension::Relevance => &mut self.relevance,
            Dimension::Personalization => &mut self.personalization,
            Dimension::CallToAction => &mut self.call_to_action,
        };
        *slot = value;
    }

    /// Clamp every dimension into `[0, 1]`; NaN becomes 0.
    pub fn clamped(mut self) -> Self {
        for dim in Dimension::ALL {
            let v = self.get(dim);
            self.set(dim, if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) });
        }
        self
    }
}

/// Relative weight of each dimension in the overall score.
///
/// Equal weights give the arithmetic mean. Weights are normalized by their sum,
/// so they need not add up to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Weight of persuasiveness.
    #[serde(default = "one")]
    pub persuasiveness: f64,
    /// Weight of clarity.
    #[serde(default = "one")]
    pub clarity: f64,
    /// Weight of relevance.
    #[serde(default = "one")]
    pub relevance: f64,
    /// Weight of personalization.
    #[serde(default = "one")]
    pub personalization: f64,
    /// Weight of the call to action.
    #[serde(default = "one")]
    pub call_to_action: f64,
}

fn one() -> f64 {
    1.0
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            persuasiveness: 1.0,
            clarity: 1.0,
            relevance: 1.0,
            personalization: 1.0,
            call_to_action: 1.0,
        }
    }
}

impl ScoreWeights {
    fn get(&self, dim: Dimension) -> f64 {
        match dim {
            Dimension::Persuasiveness => self.persuasiveness,
            Dimension::Clarity => self.clarity,
            Dimension::Relevance => self.relevance,
            Dimension::Personalization => self.personalization,
            Dimension::CallToAction => self.call_to_action,
        }
    }

    /// Weighted mean of the dimensions. Falls back to the plain mean when the
    /// weights are degenerate (non-positive sum).
    pub fn overall(&self, dims: &Dimensions) -> f64 {
        let total: f64 = Dimension::ALL.iter().map(|d| self.get(*d).max(0.0)).sum();
        if total <= 0.0 || !total.is_finite() {
            return ScoreWeights::default().overall(dims);
        }
        Dimension::ALL
            .iter()
            .map(|d| self.get(*d).max(0.0) * dims.get(*d))
            .sum::<f64>()
            / total
    }

    /// Whether every weight is finite and non-negative and at least one is positive.
    pub fn is_valid(&self) -> bool {
        Dimension::ALL
            .iter()
            .all(|d| self.get(*d).is_finite() && self.get(*d) >= 0.0)
            && Dimension::ALL.iter().any(|d| self.get(*d) > 0.0)
    }
}

/// Quality assessment of one pitch version.
///
/// `overall` is private and always derived from the dimensions; deserializing
/// recomputes it rather than trusting the stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ScoreWire")]
pub struct Score {
    dimensions: Dimensions,
    weights: ScoreWeights,
    overall: f64,
    /// Scorer explanation per dimension.
    pub explanations: Vec<(Dimension, String)>,
    /// Free-text feedback from the scorer.
    pub feedback: String,
    /// Concrete changes the scorer suggested.
    pub suggestions: Vec<String>,
}

#[derive(Deserialize)]
struct ScoreWire {
    dimensions: Dimensions,
    #[serde(default)]
    weights: ScoreWeights,
    #[serde(default)]
    explanations: Vec<(Dimension, String)>,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    suggestions: Vec<String>,
}

impl From<ScoreWire> for Score {
    fn from(w: ScoreWire) -> Self {
        Score::weighted(w.dimensions, w.weights)
            .with_explanations(w.explanations)
            .with_feedback(w.feedback, w.suggestions)
    }
}

impl Score {
    /// Score with equal weights.
    pub fn new(dimensions: Dimensions) -> Self {
        Self::weighted(dimensions, ScoreWeights::default())
    }

    /// Score with custom weights. Dimensions are clamped into `[0, 1]`.
    pub fn weighted(dimensions: Dimensions, weights: ScoreWeights) -> Self {
        let dimensions = dimensions.clamped();
        Self {
            dimensions,
            weights,
            overall: weights.overall(&dimensions),
            explanations: Vec::new(),
            feedback: String::new(),
            suggestions: Vec::new(),
        }
    }

    /// Uniform score, mostly useful for stubs.
    pub fn uniform(value: f64) -> Self {
        Self::new(Dimensions::uniform(value))
    }

    /// Attach the scorer's feedback and suggestions.
    pub fn with_feedback(mut self, feedback: impl Into<String>, suggestions: Vec<String>) -> Self {
        self.feedback = feedback.into();
        self.suggestions = suggestions;
        self
    }

    /// Attach per-dimension explanations.
    pub fn with_explanations(mut self, explanations: Vec<(Dimension, String)>) -> Self {
        self.explanations = explanations;
        self
    }

    /// Re-weight this score, recomputing the overall value.
    pub fn reweighted(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self.overall = weights.overall(&self.dimensions);
        self
    }

    /// Weighted overall score in `[0, 1]`.
    pub fn overall(&self) -> f64 {
        self.overall
    }

    /// Per-dimension scores.
    pub fn dimensions(&self) -> &Dimensions {
        &self.dimensions
    }

    /// Weights the overall score was computed with.
    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    /// Overall recomputed from the dimensions right now.
    pub fn recomputed_overall(&self) -> f64 {
        self.weights.overall(&self.dimensions)
    }

    /// Whether this score passes the quality gate for `threshold`.
    pub fn meets(&self, threshold: f64) -> bool {
        self.overall + SCORE_EPSILON >= threshold
    }

    /// Explanation for one dimension, if the scorer gave one.
    pub fn explanation(&self, dim: Dimension) -> Option<&str> {
        self.explanations
            .iter()
            .find(|(d, _)| *d == dim)
            .map(|(_, e)| e.as_str())
    }

    /// Feedback handed to the refiner: the scorer's own feedback plus one line
    /// per dimension below `threshold`.
    pub fn refinement_brief(&self, threshold: f64) -> String {
        let weak: Vec<String> = Dimension::ALL
            .iter()
            .filter(|d| self.dimensions.get(**d) + SCORE_EPSILON < threshold)
            .map(|d| {
                format!(
                    "Improve {}: {}",
                    d,
                    self.explanation(*d).unwrap_or("Score too low")
                )
            })
            .collect();

        let mut parts = Vec::new();
        if !self.feedback.trim().is_empty() {
            parts.push(self.feedback.trim().to_string());
        }
        if weak.is_empty() {
            if parts.is_empty() {
                parts.push("General improvement needed".to_string());
            }
        } else {
            parts.push(weak.join("; "));
        }
        parts.join("\n")
    }
}
