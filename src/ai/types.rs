use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const MAX_SCORE: u8 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromptAnalysis {
    #[serde(deserialize_with = "lenient_score")]
    #[schemars(range(min = 0, max = 10))]
    pub overall_score: u8,
    #[serde(default)]
    pub sections: Vec<AnalysisSection>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisSection {
    pub title: String,
    #[serde(deserialize_with = "lenient_score")]
    #[schemars(range(min = 0, max = 10))]
    pub score: u8,
    #[serde(default)]
    pub feedback: String,
}

/// An adversarial question and the answer a well-behaved agent should give.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StressTest {
    #[serde(rename = "pergunta_capciosa")]
    pub question: String,
    #[serde(rename = "resposta_ideal")]
    pub ideal_answer: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct StressTestBatch {
    #[serde(default)]
    pub stress_tests: Vec<StressTest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Evaluation {
    #[serde(deserialize_with = "lenient_score")]
    #[schemars(range(min = 0, max = 10))]
    pub score: u8,
    #[serde(default)]
    pub feedback: String,
}

/// Accepts integers, floats and numeric strings (the model sometimes quotes
/// numbers), rounds, then clamps into `0..=10`.
fn lenient_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let number = match &raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    let Some(number) = number.filter(|n| n.is_finite()) else {
        return Err(serde::de::Error::custom(format!(
            "score must be a number between 0 and {MAX_SCORE}, got {raw}"
        )));
    };

    let clamped = number.round().clamp(0.0, f64::from(MAX_SCORE));
    if clamped != number {
        log::warn!("⚠️  Score {number} adjusted to {clamped}");
    }
    Ok(clamped as u8)
}
