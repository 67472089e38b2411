//! Parsers turning raw model text into typed agent output.

use pitchforge_core::{
    CustomerProfile, CustomerSeed, Dimension, Dimensions, Draft, PitchError, PitchResult,
    Recommendations, Score, ScoreWeights,
};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// A score is rejected when more than half of its dimensions are missing.
const MAX_MISSING_DIMENSIONS: usize = Dimension::ALL.len() / 2;

/// Scale the scoring prompt asks the model to answer on.
pub const SCORE_SCALE: f64 = 10.0;

fn fence_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").ok())
        .as_ref()
}

/// Pull the first JSON object out of model text: a fenced code block if
/// present, otherwise the outermost braces.
pub fn extract_json(text: &str) -> PitchResult<Value> {
    let fenced = fence_re()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1));
    let candidate = match fenced {
        Some(m) => m.as_str().trim(),
        None => {
            let start = text.find('{');
            let end = text.rfind('}');
            match (start, end) {
                (Some(s), Some(e)) if e > s => &text[s..=e],
                _ => {
                    return Err(PitchError::InvalidResponse(format!(
                        "no JSON object in model output: {}",
                        preview(text)
                    )))
                }
            }
        }
    };
    let value: Value = serde_json::from_str(candidate).map_err(|e| {
        PitchError::InvalidResponse(format!("malformed JSON in model output: {e}"))
    })?;
    if !value.is_object() {
        return Err(PitchError::InvalidResponse(
            "model output is not a JSON object".into(),
        ));
    }
    Ok(value)
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

/// Split `TITLE: ... CONTENT: ...` output. Without a title marker the whole
/// text is the content and `fallback_title` is used.
pub fn parse_draft(text: &str, fallback_title: &str) -> PitchResult<Draft> {
    let text = text.trim();
    let mut title = fallback_title.to_string();
    let mut content = text.to_string();

    if let Some(idx) = text.find("TITLE:") {
        let after = &text[idx + "TITLE:".len()..];
        let (title_part, body) = match after.find("CONTENT:") {
            Some(c) => (&after[..c], Some(after[c + "CONTENT:".len()..].trim())),
            None => match after.split_once('\n') {
                Some((t, rest)) => (t, Some(rest.trim())),
                None => (after, None),
            },
        };
        let title_part = title_part.trim();
        if !title_part.is_empty() {
            title = title_part.to_string();
        }
        if let Some(body) = body {
            content = body.to_string();
        }
    }

    let draft = Draft::new(title, content);
    draft.ensure_not_empty()?;
    Ok(draft)
}

fn dimension_keys(dim: Dimension) -> &'static [&'static str] {
    match dim {
        Dimension::Persuasiveness => &["persuasiveness", "persuasive"],
        Dimension::Clarity => &["clarity", "clear"],
        Dimension::Relevance => &["relevance", "relevant"],
        Dimension::Personalization => &["personalization", "personalisation", "personal"],
        Dimension::CallToAction => &["call_to_action", "callToAction", "cta", "call to action"],
    }
}

fn lookup<'a>(obj: &'a serde_json::Map<String, Value>, dim: Dimension) -> Option<&'a Value> {
    // Some models nest the dimensions under "scores".
    let scopes = [Some(obj), obj.get("scores").and_then(Value::as_object)];
    scopes.into_iter().flatten().find_map(|scope| {
        dimension_keys(dim).iter().find_map(|k| scope.get(*k))
    })
}

fn dimension_value(value: &Value) -> Option<(f64, Option<String>)> {
    match value {
        Value::Number(n) => n.as_f64().map(|v| (v, None)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|v| (v, None)),
        Value::Object(o) => {
            let score = o.get("score").or_else(|| o.get("value"))?;
            let (v, _) = dimension_value(score)?;
            let explanation = o
                .get("explanation")
                .or_else(|| o.get("reason"))
                .and_then(Value::as_str)
                .map(str::to_string);
            Some((v, explanation))
        }
        _ => None,
    }
}

/// Parse a scoring answer into a [`Score`] weighted by `weights`.
///
/// Each dimension may be a number or `{"score": n, "explanation": "..."}`.
/// Values are on the 0-10 scale the scoring prompt asks for, unless the answer
/// names another one with a `"scale"` key. Values outside the scale and
/// absent dimensions count as 0; more than half of them missing is an invalid
/// response.
pub fn parse_score(text: &str, weights: &ScoreWeights) -> PitchResult<Score> {
    let value = extract_json(text)?;
    let obj = value
        .as_object()
        .ok_or_else(|| PitchError::InvalidResponse("score is not an object".into()))?;

    let scale = score_scale(obj)?;
    let mut raw = Vec::with_capacity(Dimension::ALL.len());
    let mut missing = Vec::new();
    for dim in Dimension::ALL {
        match lookup(obj, dim).and_then(dimension_value) {
            Some((v, expl)) if v.is_finite() && (0.0..=scale).contains(&v) => {
                raw.push((dim, v, expl));
            }
            _ => missing.push(dim),
        }
    }
    if missing.len() > MAX_MISSING_DIMENSIONS {
        let names: Vec<&str> = missing.iter().map(Dimension::as_str).collect();
        return Err(PitchError::InvalidResponse(format!(
            "score is missing dimensions: {}",
            names.join(", ")
        )));
    }

    let mut dims = Dimensions::default();
    let mut explanations = Vec::new();
    for (dim, v, expl) in raw {
        dims.set(dim, v / scale);
        if let Some(e) = expl.filter(|e| !e.trim().is_empty()) {
            explanations.push((dim, e));
        }
    }

    let feedback = obj
        .get("feedback")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let suggestions = string_list(obj.get("suggestions"));

    Ok(Score::weighted(dims, *weights)
        .with_explanations(explanations)
        .with_feedback(feedback, suggestions))
}

/// Top of the scale the dimensions are given on. `"scale": 1` or `"0-1"`
/// switches to unit scores.
fn score_scale(obj: &serde_json::Map<String, Value>) -> PitchResult<f64> {
    let scale = match obj.get("scale") {
        None | Some(Value::Null) => SCORE_SCALE,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => {
            let top = s.rsplit(['-', '/']).next().unwrap_or(s);
            top.trim().parse::<f64>().unwrap_or(0.0)
        }
        Some(_) => 0.0,
    };
    if scale.is_finite() && scale > 0.0 {
        Ok(scale)
    } else {
        Err(PitchError::InvalidResponse(format!(
            "unusable score scale: {}",
            obj.get("scale").map(Value::to_string).unwrap_or_default()
        )))
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Merge research output into a profile built from `seed`. When the answer
/// has no JSON the raw text is kept as the summary.
pub fn parse_research(text: &str, seed: &CustomerSeed) -> PitchResult<CustomerProfile> {
    let mut profile = CustomerProfile::from_seed(seed);
    let Ok(value) = extract_json(text) else {
        if text.trim().is_empty() {
            return Err(PitchError::InvalidResponse("empty research output".into()));
        }
        profile.summary = text.trim().to_string();
        return Ok(profile);
    };

    profile.pain_points = string_list(value.get("pain_points"));
    profile.industry_trends = string_list(value.get("industry_trends"));
    profile.opportunities = string_list(value.get("opportunities"));
    profile.talking_points = string_list(value.get("talking_points"));
    profile.sentiment = value
        .get("sentiment")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    profile.summary = value
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if let Some(signals) = value.get("lead_signals").and_then(Value::as_object) {
        for (k, v) in signals {
            if let Some(n) = v.as_f64() {
                profile.lead_signals.insert(k.clone(), n);
            }
        }
    }
    Ok(profile)
}

/// Parse strategy output. Plain text becomes the strategy itself.
pub fn parse_recommendations(text: &str) -> PitchResult<Recommendations> {
    match extract_json(text) {
        Ok(value) => {
            let strategy = value
                .get("strategy")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if strategy.trim().is_empty() {
                return Err(PitchError::InvalidResponse(
                    "strategy output has no strategy".into(),
                ));
            }
            Ok(Recommendations {
                strategy,
                messaging: string_list(value.get("messaging")),
                channels: string_list(value.get("channels")),
            })
        }
        Err(_) if !text.trim().is_empty() => Ok(Recommendations {
            strategy: text.trim().to_string(),
            ..Recommendations::default()
        }),
        Err(e) => Err(e),
    }
}
