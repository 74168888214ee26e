//! The grading report and its schema.
//!
//! [`GradeReport`] is what the model must produce. [`GradedEssay`] is what the
//! caller receives: the report flattened together with a [`ReportMeta`] block.
//! Field names serialise in camelCase to match the JSON the browser widget
//! renders (`inlineFeedback`, `meta.extractionWarning`).
//!
//! Deserialising checks types only. [`GradeReport::validate`] checks the
//! numeric ranges; both must pass before a report leaves the pipeline.

use crate::error::GraderError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Upper bound of the overall score.
pub const MAX_SCORE: f64 = 100.0;

/// Upper bound of each rubric dimension.
pub const MAX_RUBRIC_SCORE: f64 = 10.0;

/// Names of the five rubric dimensions, in report order.
pub const RUBRIC_DIMENSIONS: [&str; 5] = ["content", "organisation", "language", "style", "mechanics"];

/// Structured feedback for one essay, as returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeReport {
    /// Short textual grade, e.g. "Excellent", "Strong", "Adequate".
    pub grade: String,
    /// Overall score, 0–100.
    pub score: f64,
    /// HKDSE level estimate: 5**, 5*, 5, 4, 3, …
    pub level: String,
    /// 3–5 sentence overview.
    pub summary: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub rubric: Rubric,
    /// Quoted feedback with concrete rewrites; may be Markdown.
    pub inline_feedback: String,
}

/// Per-dimension sub-scores, each 0–10.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rubric {
    pub content: f64,
    pub organisation: f64,
    pub language: f64,
    pub style: f64,
    pub mechanics: f64,
    pub comments: String,
}

impl Rubric {
    /// Sub-scores paired with their dimension names, in report order.
    pub fn scores(&self) -> [(&'static str, f64); 5] {
        [
            ("content", self.content),
            ("organisation", self.organisation),
            ("language", self.language),
            ("style", self.style),
            ("mechanics", self.mechanics),
        ]
    }
}

/// Request-scoped metadata attached by the pipeline, never by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_warning: Option<String>,
    /// Identifier of the model that produced the report.
    pub model: String,
}

/// The response body for a successful grading request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedEssay {
    #[serde(flatten)]
    pub report: GradeReport,
    pub meta: ReportMeta,
}

impl GradeReport {
    /// Check every numeric field against its range.
    ///
    /// Returns the first violation as a [`GraderError::SchemaViolation`].
    pub fn validate(&self) -> Result<(), GraderError> {
        check_range("score", self.score, MAX_SCORE)?;
        for (name, value) in self.rubric.scores() {
            check_range(&format!("rubric.{name}"), value, MAX_RUBRIC_SCORE)?;
        }
        Ok(())
    }

    /// Parse a model reply and validate it.
    pub fn from_json(raw: &str) -> Result<Self, GraderError> {
        let report: GradeReport = serde_json::from_str(raw)?;
        report.validate()?;
        Ok(report)
    }
}

fn check_range(field: &str, value: f64, max: f64) -> Result<(), GraderError> {
    if !value.is_finite() || !(0.0..=max).contains(&value) {
        return Err(GraderError::SchemaViolation {
            detail: format!("{field} = {value} is outside 0–{max}"),
        });
    }
    Ok(())
}

/// The output schema sent with every grading request.
///
/// Uses the OpenAPI-subset dialect accepted by Gemini's `responseSchema`
/// (upper-case type names, `minimum`/`maximum`, `propertyOrdering`).
pub fn response_schema() -> Value {
    let score = |max: f64, description: &str| {
        json!({
            "type": "NUMBER",
            "minimum": 0,
            "maximum": max,
            "description": description,
        })
    };
    let bullets = |description: &str| {
        json!({
            "type": "ARRAY",
            "items": { "type": "STRING" },
            "description": description,
        })
    };

    let mut rubric_props = serde_json::Map::new();
    for name in RUBRIC_DIMENSIONS {
        rubric_props.insert(name.to_string(), score(MAX_RUBRIC_SCORE, &format!("{name}, 0-10")));
    }
    rubric_props.insert("comments".into(), json!({ "type": "STRING" }));
    let mut rubric_required: Vec<&str> = RUBRIC_DIMENSIONS.to_vec();
    rubric_required.push("comments");

    json!({
        "type": "OBJECT",
        "properties": {
            "grade": {
                "type": "STRING",
                "description": "A short textual grade summary, e.g. 'Excellent', 'Strong', 'Adequate'."
            },
            "score": score(MAX_SCORE, "Overall numeric score from 0-100."),
            "level": {
                "type": "STRING",
                "description": "HKDSE performance level estimate: 5**, 5*, 5, 4, 3, etc."
            },
            "summary": {
                "type": "STRING",
                "description": "3-5 sentences summarizing performance at a high level."
            },
            "strengths": bullets("Bullet points of strengths."),
            "improvements": bullets("Bullet points of targeted improvements with actionable phrasing."),
            "rubric": {
                "type": "OBJECT",
                "properties": Value::Object(rubric_props),
                "required": rubric_required,
            },
            "inlineFeedback": {
                "type": "STRING",
                "description": "Inline, quoted feedback with concrete rewrites/examples; may be markdown."
            }
        },
        "required": [
            "grade", "score", "level", "summary", "strengths",
            "improvements", "rubric", "inlineFeedback"
        ],
        "propertyOrdering": [
            "grade", "score", "level", "summary", "strengths",
            "improvements", "rubric", "inlineFeedback"
        ]
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_json() -> Value {
        json!({
            "grade": "Strong",
            "score": 78,
            "level": "5",
            "summary": "A well-argued essay with minor slips.",
            "strengths": ["Clear thesis", "Good paragraphing"],
            "improvements": ["Vary sentence openings"],
            "rubric": {
                "content": 8,
                "organisation": 7.5,
                "language": 7,
                "style": 8,
                "mechanics": 9,
                "comments": "Solid overall."
            },
            "inlineFeedback": "> \"In conclusion\" — try a less formulaic close."
        })
    }

    #[test]
    fn parses_and_validates_sample() {
        let report = GradeReport::from_json(&sample_json().to_string()).unwrap();
        assert_eq!(report.grade, "Strong");
        assert_eq!(report.rubric.organisation, 7.5);
        assert_eq!(report.strengths.len(), 2);
    }

    #[test]
    fn rejects_rubric_score_of_eleven() {
        let mut v = sample_json();
        v["rubric"]["content"] = json!(11);
        let err = GradeReport::from_json(&v.to_string()).unwrap_err();
        match err {
            GraderError::SchemaViolation { detail } => assert!(detail.contains("rubric.content"), "{detail}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_negative_score() {
        let mut v = sample_json();
        v["score"] = json!(-1);
        let err = GradeReport::from_json(&v.to_string()).unwrap_err();
        assert!(matches!(err, GraderError::SchemaViolation { .. }));
    }

    #[test]
    fn rejects_missing_field() {
        let mut v = sample_json();
        v.as_object_mut().unwrap().remove("inlineFeedback");
        assert!(GradeReport::from_json(&v.to_string()).is_err());
    }

    #[test]
    fn rejects_wrong_type() {
        let mut v = sample_json();
        v["score"] = json!("seventy");
        assert!(GradeReport::from_json(&v.to_string()).is_err());
    }

    #[test]
    fn boundaries_are_inclusive() {
        let mut v = sample_json();
        v["score"] = json!(100);
        v["rubric"]["mechanics"] = json!(0);
        v["rubric"]["style"] = json!(10);
        assert!(GradeReport::from_json(&v.to_string()).is_ok());
    }

    #[test]
    fn graded_essay_flattens_report_and_omits_absent_warning() {
        let report = GradeReport::from_json(&sample_json().to_string()).unwrap();
        let graded = GradedEssay {
            report,
            meta: ReportMeta {
                extraction_warning: None,
                model: "gemini-1.5-flash".into(),
            },
        };
        let v = serde_json::to_value(&graded).unwrap();
        assert_eq!(v["grade"], "Strong");
        assert_eq!(v["rubric"]["content"], 8.0);
        assert!(v["inlineFeedback"].is_string());
        assert_eq!(v["meta"]["model"], "gemini-1.5-flash");
        assert!(v["meta"].get("extractionWarning").is_none());
    }

    #[test]
    fn schema_lists_every_rubric_dimension() {
        let schema = response_schema();
        let rubric = &schema["properties"]["rubric"]["properties"];
        for name in RUBRIC_DIMENSIONS {
            assert_eq!(rubric[name]["maximum"], 10.0, "{name}");
        }
        assert_eq!(schema["properties"]["score"]["maximum"], 100.0);
        assert_eq!(schema["required"].as_array().unwrap().len(), 8);
    }
}
