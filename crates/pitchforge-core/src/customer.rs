use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Size bracket of a customer's company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompanySize {
    /// Early-stage company.
    Startup,
    /// Small or medium business.
    #[default]
    Smb,
    /// Mid-market company.
    MidMarket,
    /// Large enterprise.
    Enterprise,
}

impl std::fmt::Display for CompanySize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompanySize::Startup => write!(f, "startup"),
            CompanySize::Smb => write!(f, "smb"),
            CompanySize::MidMarket => write!(f, "mid-market"),
            CompanySize::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// Customer record as returned by the Customer Repository. This is the input
/// to the research stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerSeed {
    /// Repository identifier.
    pub id: Uuid,
    /// Contact name.
    pub name: String,
    /// Company name.
    pub company: String,
    /// Industry the company works in.
    pub industry: String,
    /// Size bracket.
    #[serde(default)]
    pub company_size: CompanySize,
    /// Company website, if known.
    #[serde(default)]
    pub website: String,
    /// Free-text notes about the customer.
    #[serde(default)]
    pub description: String,
    /// Arbitrary preferences passed through to research.
    #[serde(default)]
    pub preferences: HashMap<String, serde_json::Value>,
    /// Labels from the CRM.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Lead score from 0 to 100.
    #[serde(default)]
    pub lead_score: u8,
}

impl CustomerSeed {
    /// New seed with a fresh id and empty optional fields.
    pub fn new(
        name: impl Into<String>,
        company: impl Into<String>,
        industry: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            company: company.into(),
            industry: industry.into(),
            company_size: CompanySize::default(),
            website: String::new(),
            description: String::new(),
            preferences: HashMap::new(),
            tags: Vec::new(),
            lead_score: 0,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the company size.
    pub fn with_size(mut self, size: CompanySize) -> Self {
        self.company_size = size;
        self
    }

    /// Set the tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Research output for one customer. Produced once per run and never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerProfile {
    /// Customer this profile describes.
    pub customer_id: Uuid,
    /// Contact name.
    pub name: String,
    /// Company name.
    pub company: String,
    /// Industry the company works in.
    pub industry: String,
    /// Size bracket.
    pub company_size: CompanySize,
    /// Problems the customer is likely to have.
    pub pain_points: Vec<String>,
    /// Overall tone of the research findings.
    pub sentiment: String,
    /// Trends in the customer's industry.
    pub industry_trends: Vec<String>,
    /// Openings a pitch can use.
    pub opportunities: Vec<String>,
    /// Points to raise in the pitch.
    pub talking_points: Vec<String>,
    /// Inputs the lead scoring model consumes (engagement, fit, intent...).
    #[serde(default)]
    pub lead_signals: HashMap<String, f64>,
    /// Unstructured research text when the model did not return structure.
    #[serde(default)]
    pub summary: String,
    /// When research finished.
    pub researched_at: DateTime<Utc>,
}

impl CustomerProfile {
    /// Profile carrying only the seed's identifying fields.
    pub fn from_seed(seed: &CustomerSeed) -> Self {
        let mut lead_signals = HashMap::new();
        lead_signals.insert("lead_score".to_string(), f64::from(seed.lead_score) / 100.0);
        Self {
            customer_id: seed.id,
            name: seed.name.clone(),
            company: seed.company.clone(),
            industry: seed.industry.clone(),
            company_size: seed.company_size,
            pain_points: Vec::new(),
            sentiment: String::new(),
            industry_trends: Vec::new(),
            opportunities: Vec::new(),
            talking_points: Vec::new(),
            lead_signals,
            summary: String::new(),
            researched_at: Utc::now(),
        }
    }
}

/// Campaign-level advice from the strategy agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recommendations {
    /// Overall campaign strategy.
    pub strategy: String,
    /// Key messages to carry.
    #[serde(default)]
    pub messaging: Vec<String>,
    /// Suggested outreach channels.
    #[serde(default)]
    pub channels: Vec<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_seed_keeps_identity() {
        let mut seed = CustomerSeed::new("Ada", "Analytical Engines", "manufacturing")
            .with_size(CompanySize::Enterprise);
        seed.lead_score = 80;
        let profile = CustomerProfile::from_seed(&seed);
        assert_eq!(profile.customer_id, seed.id);
        assert_eq!(profile.company, "Analytical Engines");
        assert_eq!(profile.company_size, CompanySize::Enterprise);
        assert!((profile.lead_signals["lead_score"] - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_seed_defaults_from_minimal_json() {
        let json = r#"{
            "id": "6f1c1c9e-8a3e-4c55-9f4a-2f4b8a1d0c11",
            "name": "Grace",
            "company": "Compilers Inc",
            "industry": "software"
        }"#;
        let seed: CustomerSeed = serde_json::from_str(json).unwrap();
        assert_eq!(seed.company_size, CompanySize::Smb);
        assert!(seed.tags.is_empty());
        assert_eq!(seed.lead_score, 0);
    }

    #[test]
    fn test_company_size_wire_format() {
        let json = serde_json::to_string(&CompanySize::MidMarket).unwrap();
        assert_eq!(json, "\"mid-market\"");
    }
}
