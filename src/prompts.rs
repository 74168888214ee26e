//! Prompts for the grading call.
//!
//! Every instruction the model sees is defined here so the wording can be
//! reviewed and tested in one place. The essay itself is embedded verbatim
//! by [`user_prompt`]; nothing in the pipeline rewrites it.

use serde_json::Value;

/// System instruction: marker persona, rubric, and output contract.
pub const SYSTEM_INSTRUCTIONS: &str = "OCR, and then mark this essay and give feedback using DSE standards. \
Act as a veteran HKDSE English marker and teacher. \
Be specific, concise, and evidence-based. Provide a numeric score out of 100 and an estimated HKDSE level. \
Use the rubric: content, organisation, language, style, mechanics (0-10 each). \
Include strengths, targeted improvements, and inline feedback with examples. \
Return only the fields of the requested JSON schema.";

/// Build the user turn that carries the essay.
pub fn user_prompt(essay: &str) -> String {
    [
        "You will receive a student's essay.",
        "Perform OCR if needed conceptually, then mark and provide feedback aligned to HKDSE (DSE) standards.",
        "Return only the requested JSON fields.",
        "",
        "Essay:",
        essay,
    ]
    .join("\n")
}

/// System instruction for providers without native schema enforcement.
///
/// The schema is spelled out in the prompt instead; the reply is still
/// validated locally afterwards.
pub fn system_with_inline_schema(schema: &Value) -> String {
    format!(
        "{SYSTEM_INSTRUCTIONS}\n\nRespond with a single JSON object and nothing else. \
It must conform to this schema (numbers are plain JSON numbers within the given minimum/maximum):\n{}",
        serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
    )
}
