use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

fn default_max_attempts() -> i32 {
    1
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AssignQuizPayload {
    pub course_id: i64,
    pub quiz_block_id: String,
    pub student_ids: Vec<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuizPayload {
    pub course_id: i64,
    pub quiz_block_id: String,
    pub score: f64,
    pub answers: Option<JsonValue>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct QuizResultsParams {
    pub course_id: i64,
    pub clerk_id: Option<String>,
}
