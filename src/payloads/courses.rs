use crate::model::BlockInput;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateCoursePayload {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub resources: Vec<JsonValue>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCoursePayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub resources: Option<Vec<JsonValue>>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CourseBlocksParams {
    pub course_id: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SaveBlocksPayload {
    pub blocks: Vec<BlockInput>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EnrollStudentsPayload {
    pub student_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentsParams {
    pub course_id: i64,
}
