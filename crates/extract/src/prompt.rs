use crate::mode::Phase;

const SCHEMA: &str = r#"{
  "entities": [
    {"name": "EntityName", "type": ["PERSON|ORGANIZATION|CONCEPT|TECHNOLOGY|LOCATION|EVENT"], "confidence": 0.0, "description": "brief description"}
  ],
  "relationships": [
    {"from": "EntityName", "relationship": "verb phrase", "to": "OtherEntity", "confidence": 0.0}
  ],
  "topics": ["topic"],
  "suggestedQuestions": ["question"],
  "summary": "summary text",
  "contentActions": [
    {"subject": "EntityName", "verb": "verb", "object": "OtherEntity", "confidence": 0.0}
  ]
}"#;

fn phase_instructions(phase: Phase) -> &'static str {
    match phase {
        Phase::Basic => {
            "Identify the main topics (3-8) and the key entities (up to 10). \
             Leave summary, relationships and contentActions out."
        }
        Phase::Summary => {
            "Identify topics and key entities, and write a 2-3 sentence factual summary. \
             Suggest up to 3 questions a reader might ask next."
        }
        Phase::Analyzing => {
            "Identify topics, entities with descriptions, and a summary. \
             List the subject-verb-object actions described in the text as contentActions."
        }
        _ => {
            "Perform a complete extraction: topics, entities with descriptions and confidence, \
             relationships between entities, contentActions, suggested questions and a summary."
        }
    }
}

pub fn build_extraction_prompt(phase: Phase, title: &str, text: &str) -> String {
    format!(
        r#"Extract structured knowledge from the following web page content.

PAGE TITLE: {}

TASK:
{}

RULES:
- Output ONLY valid JSON matching the schema below, no markdown, no explanations
- Omit fields the task does not ask for
- Confidence values are between 0.0 and 1.0
- Relationship and action verbs should be short verb phrases: "founded", "uses", "depends on"

SCHEMA:
{}

TEXT:
{}

JSON OUTPUT:"#,
        title,
        phase_instructions(phase),
        SCHEMA,
        text
    )
}

pub fn build_retry_prompt(invalid_json: &str) -> String {
    format!(
        r#"The following JSON is invalid:

{}

Fix this JSON. Output only valid JSON with no markdown formatting, no code blocks, no explanations. Just the raw JSON object."#,
        invalid_json
    )
}
