use crate::error::{PitchError, PitchResult};
use crate::score::Score;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Lifecycle status of a pitch version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitchStatus {
    /// Generated, not yet scored.
    Draft,
    /// Has a score.
    Scored,
    /// Produced by refinement, not yet scored.
    Refined,
    /// Chosen by a completed run; the caller still has to approve it.
    ApprovedCandidate,
    /// Accepted by the caller.
    Approved,
    /// Turned down by the caller.
    Rejected,
}

/// Kind of pitch requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitchType {
    /// First contact.
    #[default]
    Initial,
    /// Follow-up after earlier contact.
    FollowUp,
    /// Invitation to a product demo.
    ProductDemo,
    /// Contract renewal.
    Renewal,
    /// Alternative for an A/B test.
    AbVariant,
}

impl std::fmt::Display for PitchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PitchType::Initial => write!(f, "initial"),
            PitchType::FollowUp => write!(f, "follow-up"),
            PitchType::ProductDemo => write!(f, "product demo"),
            PitchType::Renewal => write!(f, "renewal"),
            PitchType::AbVariant => write!(f, "A/B variant"),
        }
    }
}

/// Voice the pitch is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    /// Formal business voice.
    #[default]
    Professional,
    /// Relaxed voice.
    Casual,
    /// Warm voice.
    Friendly,
    /// Time-sensitive voice.
    Urgent,
    /// Advisory voice.
    Consultative,
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tone::Professional => write!(f, "professional"),
            Tone::Casual => write!(f, "casual"),
            Tone::Friendly => write!(f, "friendly"),
            Tone::Urgent => write!(f, "urgent"),
            Tone::Consultative => write!(f, "consultative"),
        }
    }
}

/// Text produced by a generate or refine call, before it becomes a [`Pitch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    /// Pitch title.
    pub title: String,
    /// Pitch body.
    pub content: String,
    /// Extra fields the model returned.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Draft {
    /// Draft with no metadata.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// A refinement that reproduces its input byte for byte did not refine.
    pub fn ensure_differs(&self, previous: &str) -> PitchResult<()> {
        if self.content == previous {
            return Err(PitchError::InvalidResponse(
                "refinement returned the input unchanged".to_string(),
            ));
        }
        Ok(())
    }

    /// Reject a draft with blank content.
    pub fn ensure_not_empty(&self) -> PitchResult<()> {
        if self.content.trim().is_empty() {
            return Err(PitchError::InvalidResponse(
                "model returned an empty pitch".to_string(),
            ));
        }
        Ok(())
    }
}

/// One version of a pitch.
///
/// Versions form a singly linked list through `parent_id`. New versions are
/// only ever created through [`Pitch::refine_into`], which sets
/// `version = parent.version + 1`; lineage fields are never reassigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pitch {
    /// Id of this version.
    pub id: Uuid,
    /// Customer the pitch is for.
    pub customer_id: Uuid,
    /// Pitch title.
    pub title: String,
    /// Pitch body.
    pub content: String,
    /// Kind of pitch.
    pub pitch_type: PitchType,
    /// Voice of the pitch.
    pub tone: Tone,
    /// Language code, `en` by default.
    pub language: String,
    /// Lifecycle status.
    pub status: PitchStatus,
    /// Version number, starting at 1.
    pub version: u32,
    /// Version this one was refined from.
    pub parent_id: Option<Uuid>,
    /// Score of this version, once scored.
    pub scores: Option<Score>,
    /// Feedback that produced this version (empty for the first version).
    #[serde(default)]
    pub feedback: String,
    /// Campaign the pitch belongs to.
    pub campaign_id: Option<Uuid>,
    /// Agent that wrote this version.
    pub generated_by: String,
    /// Extra fields the model returned.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last status or score change.
    pub updated_at: DateTime<Utc>,
}

impl Pitch {
    /// First version of a pitch for a customer.
    pub fn initial(customer_id: Uuid, draft: Draft, pitch_type: PitchType, tone: Tone) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer_id,
            title: draft.title,
            content: draft.content,
            pitch_type,
            tone,
            language: "en".to_string(),
            status: PitchStatus::Draft,
            version: 1,
            parent_id: None,
            scores: None,
            feedback: String::new(),
            campaign_id: None,
            generated_by: String::new(),
            metadata: draft.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// New version refined from `self`.
    pub fn refine_into(&self, draft: Draft, feedback: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer_id: self.customer_id,
            title: draft.title,
            content: draft.content,
            pitch_type: self.pitch_type,
            tone: self.tone,
            language: self.language.clone(),
            status: PitchStatus::Refined,
            version: self.version + 1,
            parent_id: Some(self.id),
            scores: None,
            feedback: feedback.into(),
            campaign_id: self.campaign_id,
            generated_by: String::new(),
            metadata: draft.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the agent that wrote this version.
    pub fn with_generated_by(mut self, agent: impl Into<String>) -> Self {
        self.generated_by = agent.into();
        self
    }

    /// Attach the pitch to a campaign.
    pub fn with_campaign(mut self, campaign_id: Option<Uuid>) -> Self {
        self.campaign_id = campaign_id;
        self
    }

    /// Set the language code.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Attach a score and mark the version scored.
    pub fn set_score(&mut self, score: Score) {
        self.scores = Some(score);
        self.status = PitchStatus::Scored;
        self.updated_at = Utc::now();
    }

    /// Change the lifecycle status.
    pub fn set_status(&mut self, status: PitchStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Overall score, if the version has been scored.
    pub fn overall_score(&self) -> Option<f64> {
        self.scores.as_ref().map(Score::overall)
    }

    /// Whether `other` describes the same lineage position as `self`.
    pub fn same_lineage(&self, other: &Pitch) -> bool {
        self.id == other.id
            && self.customer_id == other.customer_id
            && self.version == other.version
            && self.parent_id == other.parent_id
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn draft(content: &str) -> Draft {
        Draft::new("Title", content)
    }

    #[test]
    fn test_initial_pitch() {
        let pitch = Pitch::initial(Uuid::new_v4(), draft("hello"), PitchType::Initial, Tone::Friendly);
        assert_eq!(pitch.version, 1);
        assert!(pitch.parent_id.is_none());
        assert_eq!(pitch.status, PitchStatus::Draft);
        assert!(pitch.scores.is_none());
    }

    #[test]
    fn test_refine_links_parent_and_bumps_version() {
        let v1 = Pitch::initial(Uuid::new_v4(), draft("one"), PitchType::Renewal, Tone::Urgent);
        let v2 = v1.refine_into(draft("two"), "Improve clarity");
        let v3 = v2.refine_into(draft("three"), "Improve relevance");
        assert_eq!(v2.version, 2);
        assert_eq!(v2.parent_id, Some(v1.id));
        assert_eq!(v3.version, 3);
        assert_eq!(v3.parent_id, Some(v2.id));
        assert_eq!(v3.customer_id, v1.customer_id);
        assert_eq!(v3.pitch_type, PitchType::Renewal);
        assert_eq!(v3.tone, Tone::Urgent);
        assert_eq!(v3.status, PitchStatus::Refined);
    }

    #[test]
    fn test_set_score_marks_scored() {
        let mut pitch = Pitch::initial(Uuid::new_v4(), draft("x"), PitchType::Initial, Tone::Casual);
        pitch.set_score(Score::uniform(0.4));
        assert_eq!(pitch.status, PitchStatus::Scored);
        assert!((pitch.overall_score().unwrap() - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_unchanged_refinement_is_invalid() {
        let err = draft("same").ensure_differs("same").unwrap_err();
        assert!(matches!(err, PitchError::InvalidResponse(_)));
        assert!(draft("new").ensure_differs("same").is_ok());
    }

    #[test]
    fn test_empty_draft_is_invalid() {
        assert!(draft("   ").ensure_not_empty().is_err());
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&PitchStatus::ApprovedCandidate).unwrap();
        assert_eq!(json, "\"approved_candidate\"");
    }
}
