//! Grading prompt construction
//!
//! Pure function of the filename and the fixed rubric: produces the instruction text
//! and the structured-output schema handed to the generation endpoint.

use crate::rubric::{self, COMPLIANCE_CATEGORY, TOTAL_POINTS};
use serde::Serialize;
use serde_json::{json, Value};

/// Naming convention every submission must follow
pub const NAMING_CONVENTION: &str = "完整学号_姓名_作品名";

/// Example filename following the convention
pub const NAMING_EXAMPLE: &str = "22305011_张三_期末作业.mp4";

/// Instruction text plus output schema for one grading call
#[derive(Debug, Clone, PartialEq)]
pub struct GradingPrompt {
    pub instruction_text: String,
    pub output_schema: Value,
}

/// Filename parsed as `studentId_studentName_title`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionName {
    pub student_id: String,
    pub student_name: String,
    pub title: String,
}

impl SubmissionName {
    /// Parse a filename against the naming convention
    ///
    /// The extension is ignored. The title may itself contain underscores.
    pub fn parse(filename: &str) -> Option<Self> {
        let stem = match filename.rsplit_once('.') {
            Some((stem, _ext)) if !stem.is_empty() => stem,
            _ => filename,
        };

        let mut parts = stem.splitn(3, '_');
        let student_id = parts.next()?.trim();
        let student_name = parts.next()?.trim();
        let title = parts.next()?.trim();

        if student_id.is_empty() || !student_id.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if student_name.is_empty() || title.is_empty() {
            return None;
        }

        Some(Self {
            student_id: student_id.to_string(),
            student_name: student_name.to_string(),
            title: title.to_string(),
        })
    }
}

/// Build the instruction text and output schema for a submission
pub fn build(filename: &str) -> GradingPrompt {
    GradingPrompt {
        instruction_text: instruction_text(filename),
        output_schema: output_schema(),
    }
}

/// Natural-language grading instructions
pub fn instruction_text(filename: &str) -> String {
    let mut text = String::new();

    text.push_str("角色设定：你是一位大学《计算机三维动画设计》课程的专业教师。\n");
    text.push_str("任务：请对学生提交的期末作业进行严格的学术打分。\n\n");
    text.push_str(&format!("当前提交的文件名：{}\n", filename));
    let precheck = match SubmissionName::parse(filename) {
        Some(name) => format!(
            "文件名预检：学号 {}，姓名 {}，作品名 {}。\n",
            name.student_id, name.student_name, name.title
        ),
        None => format!("文件名预检：未能按“{}”格式解析。\n", NAMING_CONVENTION),
    };
    text.push_str(&precheck);
    text.push('\n');

    text.push_str(&format!(
        "请严格按照以下 {} 个评分项进行打分（总分 {} 分）：\n\n",
        rubric::categories().len(),
        TOTAL_POINTS
    ));
    for (index, category) in rubric::categories().iter().enumerate() {
        text.push_str(&format!(
            "{}. {} ({}分)：\n",
            index + 1,
            category.name,
            category.max_score
        ));
        for line in category.criteria {
            text.push_str(&format!("   - {}\n", line));
        }
        text.push('\n');
    }

    text.push_str("请用中文回复。\n");
    text.push_str(
        "【重要】：所有打分（包括总分和分项分）必须严格为整数 (Integer)，禁止出现小数。\n",
    );
    text.push_str("评语中请包含专业的 3ds Max 术语");
    text.push_str("（如 Curve Editor, UVW Unwrap, Keyframes, Modifier Stack 等）。\n");
    text.push_str(&format!(
        "如果文件名不符合“{}”格式（例如: {}），请在“{}”一项扣分并在评语中明确指出。\n",
        NAMING_CONVENTION, NAMING_EXAMPLE, COMPLIANCE_CATEGORY
    ));

    text
}

/// Structured-output schema (Gemini `responseSchema` dialect)
///
/// Advisory: passed to the model to constrain generation; the response is validated
/// separately when parsed.
pub fn output_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "overallScore": {
                "type": "INTEGER",
                "description": "Total score (integer only)"
            },
            "studentNameGuess": {
                "type": "STRING",
                "description": "Extracted name from filename if present, or generic '同学'"
            },
            "summary": { "type": "STRING" },
            "categories": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "score": {
                            "type": "INTEGER",
                            "description": "Actual score earned for this category (integer only)"
                        },
                        "maxScore": {
                            "type": "INTEGER",
                            "description":
                                "Maximum possible score for this category (e.g. 10 or 20)"
                        },
                        "feedback": { "type": "STRING" }
                    },
                    "required": ["name", "score", "maxScore", "feedback"]
                }
            }
        },
        "required": ["overallScore", "summary", "categories"]
    })
}
