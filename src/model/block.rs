use crate::store::{Collection, Record};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Text,
    Image,
    Video,
    Quiz,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Text => "text",
            BlockKind::Image => "image",
            BlockKind::Video => "video",
            BlockKind::Quiz => "quiz",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(BlockKind::Text),
            "image" => Ok(BlockKind::Image),
            "video" => Ok(BlockKind::Video),
            "quiz" => Ok(BlockKind::Quiz),
            other => Err(format!("Unknown block type '{}'", other)),
        }
    }
}

/// An ordered content unit of a course. Positions are contiguous `0..N-1` per course.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CourseBlock {
    pub id: String,
    pub course_id: i64,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub position: i32,
    pub content: JsonValue,
}

impl CourseBlock {
    pub fn is_quiz(&self) -> bool {
        self.kind == BlockKind::Quiz
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewCourseBlock {
    pub id: String,
    pub course_id: i64,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub position: i32,
    pub content: JsonValue,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CourseBlockFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<i64>,
}

impl CourseBlockFilter {
    pub fn by_course(course_id: i64) -> Self {
        Self {
            course_id: Some(course_id),
            ..Default::default()
        }
    }
}

impl Record for CourseBlock {
    const COLLECTION: Collection = Collection::CourseBlocks;
    type Id = String;
    type New = NewCourseBlock;
    type Filter = CourseBlockFilter;

    fn id(&self) -> &String {
        &self.id
    }
}

/// Content payload of a quiz block.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizContent {
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: usize,
}

/// A block as submitted by the editor. Its position is implied by list order.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct BlockInput {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub content: JsonValue,
}

/// Turns an ordered editor list into the exact block set to store for `course_id`.
///
/// Supplied ids are kept so quiz grants keep pointing at the same block across saves;
/// missing ids are generated.
pub fn normalize_blocks(
    course_id: i64,
    inputs: Vec<BlockInput>,
) -> Result<Vec<NewCourseBlock>, String> {
    let mut seen = HashSet::new();
    let mut blocks = Vec::with_capacity(inputs.len());

    for (position, input) in inputs.into_iter().enumerate() {
        let id = match input.id {
            Some(id) if !id.trim().is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };
        if !seen.insert(id.clone()) {
            return Err(format!("Duplicate block id '{}'", id));
        }

        validate_content(input.kind, &input.content)
            .map_err(|reason| format!("Block {} ({}): {}", position, input.kind, reason))?;

        blocks.push(NewCourseBlock {
            id,
            course_id,
            kind: input.kind,
            position: position as i32,
            content: input.content,
        });
    }

    Ok(blocks)
}

fn validate_content(kind: BlockKind, content: &JsonValue) -> Result<(), String> {
    match kind {
        BlockKind::Quiz => {
            let quiz: QuizContent = serde_json::from_value(content.clone())
                .map_err(|e| format!("invalid quiz content: {}", e))?;
            if quiz.question.trim().is_empty() {
                return Err("question must not be empty".to_string());
            }
            if quiz.options.len() < 2 {
                return Err("a quiz needs at least two options".to_string());
            }
            if quiz.correct_index >= quiz.options.len() {
                return Err(format!(
                    "correct index {} is out of range for {} options",
                    quiz.correct_index,
                    quiz.options.len()
                ));
            }
            Ok(())
        }
        BlockKind::Text | BlockKind::Image | BlockKind::Video => {
            if content.is_null() {
                Err("content must not be null".to_string())
            } else {
                Ok(())
            }
        }
    }
}
