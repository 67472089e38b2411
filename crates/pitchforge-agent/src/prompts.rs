//! Prompt builders for each agent operation.

use crate::capability::{Feedback, GenerationRequest};
use pitchforge_core::{CustomerProfile, CustomerSeed, Dimension, Pitch};
use std::fmt::Write;

const DRAFT_FORMAT: &str = "Format your response as:\nTITLE: [your title here]\nCONTENT:\n[your pitch content here]";

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "None".to_string();
    }
    items
        .iter()
        .map(|s| format!("- {s}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn profile_block(profile: &CustomerProfile) -> String {
    let mut out = format!(
        "Customer: {}\nCompany: {}\nIndustry: {}\nCompany Size: {}\n",
        profile.name, profile.company, profile.industry, profile.company_size
    );
    if !profile.sentiment.is_empty() {
        let _ = writeln!(out, "Sentiment: {}", profile.sentiment);
    }
    let _ = writeln!(out, "Pain points:\n{}", bullet_list(&profile.pain_points));
    let _ = writeln!(out, "Industry trends:\n{}", bullet_list(&profile.industry_trends));
    let _ = writeln!(out, "Opportunities:\n{}", bullet_list(&profile.opportunities));
    let _ = writeln!(out, "Talking points:\n{}", bullet_list(&profile.talking_points));
    if !profile.summary.is_empty() {
        let _ = writeln!(out, "Research notes:\n{}", profile.summary);
    }
    out
}

/// Ask for a JSON profile of `seed`.
pub fn research_prompt(seed: &CustomerSeed) -> String {
    let tags = if seed.tags.is_empty() {
        "None".to_string()
    } else {
        seed.tags.join(", ")
    };
    let preferences = serde_json::to_string(&seed.preferences).unwrap_or_default();
    format!(
        "Research the following customer and provide detailed insights:\n\n\
         Name: {}\nCompany: {}\nIndustry: {}\nCompany Size: {}\nWebsite: {}\n\
         Description: {}\nPreferences: {}\nTags: {}\n\n\
         Respond in JSON format:\n\
         {{\"pain_points\": [\"...\"], \"sentiment\": \"...\", \"industry_trends\": [\"...\"], \
         \"opportunities\": [\"...\"], \"talking_points\": [\"...\"], \
         \"lead_signals\": {{\"engagement\": 0.0, \"fit\": 0.0, \"intent\": 0.0}}, \
         \"summary\": \"...\"}}",
        seed.name,
        seed.company,
        seed.industry,
        seed.company_size,
        seed.website,
        seed.description,
        preferences,
        tags,
    )
}

/// Ask for a `TITLE:`/`CONTENT:` pitch.
pub fn generation_prompt(profile: &CustomerProfile, request: &GenerationRequest) -> String {
    let mut prompt = format!(
        "Generate a compelling {} marketing pitch for the following customer:\n\n{}\nTone: {}\nLanguage: {}\n",
        request.pitch_type,
        profile_block(profile),
        request.tone,
        request.language,
    );
    if let Some(template) = request.template.as_deref().filter(|t| !t.trim().is_empty()) {
        let _ = write!(prompt, "\nUse this template as a guide:\n{template}\n");
    }
    if let Some(ctx) = request
        .additional_context
        .as_deref()
        .filter(|c| !c.trim().is_empty())
    {
        let _ = write!(prompt, "\nAdditional context:\n{ctx}\n");
    }
    if let Some(rec) = &request.recommendations {
        let _ = write!(prompt, "\nFollow this outreach strategy:\n{}\n", rec.strategy);
        if !rec.messaging.is_empty() {
            let _ = write!(prompt, "Key messages:\n{}\n", bullet_list(&rec.messaging));
        }
    }
    let _ = write!(
        prompt,
        "\n\nPlease provide:\n1. A compelling title (single line)\n2. The full pitch content\n\n{DRAFT_FORMAT}"
    );
    prompt
}

/// Ask for a JSON score on the 0-10 scale.
pub fn scoring_prompt(profile: &CustomerProfile, pitch: &Pitch) -> String {
    format!(
        "Evaluate the following marketing pitch:\n\n\
         Title: {}\nTarget Customer: {} ({})\nIndustry: {}\nTone: {}\n\n\
         Pitch Content:\n{}\n\n\
         Score the pitch on the following dimensions (0 to 10):\n\
         1. Persuasiveness - How compelling and convincing is the pitch?\n\
         2. Clarity - How clear and easy to understand is the message?\n\
         3. Relevance - How well does the pitch address the customer's needs?\n\
         4. Personalization - How specific is it to this customer and company?\n\
         5. Call to action - How clear and motivating is the next step?\n\n\
         Respond in JSON format:\n{}",
        pitch.title,
        profile.name,
        profile.company,
        profile.industry,
        pitch.tone,
        pitch.content,
        score_schema(),
    )
}

fn score_schema() -> String {
    let dims: Vec<String> = Dimension::ALL
        .iter()
        .map(|d| format!("\"{d}\": {{\"score\": 0, \"explanation\": \"...\"}}"))
        .collect();
    format!(
        "{{{}, \"scale\": 10, \"feedback\": \"...\", \"suggestions\": [\"...\"]}}",
        dims.join(", ")
    )
}

/// Ask for a revised pitch that addresses `feedback`.
pub fn refinement_prompt(profile: &CustomerProfile, pitch: &Pitch, feedback: &Feedback) -> String {
    let scores = serde_json::to_string(feedback.score.dimensions()).unwrap_or_default();
    format!(
        "Refine the following marketing pitch based on the feedback provided:\n\n\
         Original Title: {}\nTarget Customer: {} ({})\nIndustry: {}\nTone: {}\n\n\
         Original Pitch:\n{}\n\n\
         Current Scores: {}\n\n\
         Feedback for improvement:\n{}\n\n\
         Please provide the refined pitch maintaining the same tone and addressing \
         all feedback points. The content must differ from the original.\n\n{}",
        pitch.title,
        profile.name,
        profile.company,
        profile.industry,
        pitch.tone,
        pitch.content,
        scores,
        feedback.brief,
        DRAFT_FORMAT,
    )
}

/// Ask for JSON campaign recommendations.
pub fn strategy_prompt(profile: &CustomerProfile) -> String {
    format!(
        "Develop an outreach strategy for the following customer:\n\n{}\n\
         Respond in JSON format:\n\
         {{\"strategy\": \"...\", \"messaging\": [\"...\"], \"channels\": [\"...\"]}}",
        profile_block(profile)
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pitchforge_core::{Draft, PitchType, Recommendations, Score, Tone};

    fn profile() -> CustomerProfile {
        let seed = CustomerSeed::new("Ada", "Analytical Engines", "manufacturing");
        let mut profile = CustomerProfile::from_seed(&seed);
        profile.pain_points = vec!["manual QA".into()];
        profile
    }

    #[test]
    fn test_generation_prompt_includes_optional_parts() {
        let request = GenerationRequest {
            tone: Tone::Urgent,
            pitch_type: PitchType::Renewal,
            template: Some("Hook, proof, ask".into()),
            additional_context: Some("Q3 budget freeze".into()),
            language: "en".into(),
            recommendations: Some(Recommendations {
                strategy: "Lead with ROI".into(),
                messaging: vec!["cut QA time".into()],
                channels: vec![],
            }),
        };
        let prompt = generation_prompt(&profile(), &request);
        assert!(prompt.contains("renewal marketing pitch"));
        assert!(prompt.contains("Tone: urgent"));
        assert!(prompt.contains("Hook, proof, ask"));
        assert!(prompt.contains("Q3 budget freeze"));
        assert!(prompt.contains("Lead with ROI"));
        assert!(prompt.contains("- manual QA"));
        assert!(prompt.ends_with("[your pitch content here]"));
    }

    #[test]
    fn test_generation_prompt_skips_blank_template() {
        let request = GenerationRequest {
            template: Some("  ".into()),
            language: "en".into(),
            ..GenerationRequest::default()
        };
        assert!(!generation_prompt(&profile(), &request).contains("template"));
    }

    #[test]
    fn test_scoring_prompt_names_all_dimensions() {
        let pitch = Pitch::initial(
            profile().customer_id,
            Draft::new("T", "Body"),
            PitchType::Initial,
            Tone::Professional,
        );
        let prompt = scoring_prompt(&profile(), &pitch);
        for dim in Dimension::ALL {
            assert!(prompt.contains(&format!("\"{dim}\"")), "missing {dim}");
        }
        assert!(prompt.contains("(0 to 10)"));
        assert!(prompt.contains("\"scale\": 10"));
    }

    #[test]
    fn test_refinement_prompt_carries_brief() {
        let pitch = Pitch::initial(
            profile().customer_id,
            Draft::new("T", "Body"),
            PitchType::Initial,
            Tone::Professional,
        );
        let feedback = Feedback::from_score(&Score::uniform(0.3), 0.7);
        let prompt = refinement_prompt(&profile(), &pitch, &feedback);
        assert!(prompt.contains("Improve clarity: Score too low"));
        assert!(prompt.contains("Original Pitch:\nBody"));
    }
}
