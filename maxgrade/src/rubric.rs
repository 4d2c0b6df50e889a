//! Grading rubric for the 3D animation final project
//!
//! The rubric is declarative data: an ordered list of categories with their point
//! values and criteria text. Prompt construction and report rendering both read from
//! [`RUBRIC`]. Category maximums sum to [`TOTAL_POINTS`].

use serde::Serialize;

/// Rubric revision, bumped whenever categories, points, or criteria change
pub const RUBRIC_VERSION: &str = "2025-final-a";

/// Total points across all categories
pub const TOTAL_POINTS: u32 = 100;

/// One weighted grading dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RubricCategory {
    /// Category name as shown to students and expected back from the model
    pub name: &'static str,
    /// Maximum score (10 or 20)
    pub max_score: u32,
    /// Qualitative criteria, one line per checkpoint (prompt only)
    #[serde(skip)]
    pub criteria: &'static [&'static str],
}

/// Name of the submission-compliance category (penalized for bad filenames)
pub const COMPLIANCE_CATEGORY: &str = "提交规范";

/// The fixed 8-category rubric, in prompt order
pub static RUBRIC: [RubricCategory; 8] = [
    RubricCategory {
        name: "主题内容",
        max_score: 10,
        criteria: &["检查内容是否健康向上，主题是否明确，故事表达是否完整。"],
    },
    RubricCategory {
        name: "模型要求",
        max_score: 10,
        criteria: &[
            "检查模型细节适中程度，比例是否准确。",
            "检查材质贴图是否完整，UV展开是否合理。",
        ],
    },
    RubricCategory {
        name: "动画技术",
        max_score: 20,
        criteria: &[
            "区分基础要求（关键帧动画）与提高要求（IK/骨骼/修改器动画）。",
            "技术实现难度判定。",
        ],
    },
    RubricCategory {
        name: "运动规律",
        max_score: 20,
        criteria: &[
            "核心考察项。是否符合物理规律（重力、惯性）。",
            "是否体现动画法则：挤压拉伸、预备动作、缓冲曲线 (Ease in/out)、跟随动作等。",
        ],
    },
    RubricCategory {
        name: "工作量",
        max_score: 10,
        criteria: &["根据视频估算场景丰富度、模型数量及动画时长（通常要求15秒以上）。"],
    },
    RubricCategory {
        name: "渲染输出",
        max_score: 10,
        criteria: &["检查画面分辨率、清晰度。", "是否有噪点、闪烁或锯齿。"],
    },
    RubricCategory {
        name: "综合视觉",
        max_score: 10,
        criteria: &["构图美观度、色彩搭配和谐度、整体艺术风格。"],
    },
    RubricCategory {
        name: COMPLIANCE_CATEGORY,
        max_score: 10,
        criteria: &[
            concat!(
                "必须严格检查文件名是否符合格式：\"完整学号_姓名_作品名\" ",
                "(例如: 22305011_张三_期末作业.mp4)。"
            ),
            "如果文件名缺少学号或姓名，此项应扣分。",
        ],
    },
];

/// All rubric categories in order
pub fn categories() -> &'static [RubricCategory] {
    &RUBRIC
}

/// Look up a category by name (exact match after trimming)
pub fn find(name: &str) -> Option<&'static RubricCategory> {
    let name = name.trim();
    RUBRIC.iter().find(|c| c.name == name)
}

/// Sum of all category maximums
pub fn total_max_score() -> u32 {
    RUBRIC.iter().map(|c| c.max_score).sum()
}

/// Display label such as "动画技术 (20)"
pub fn display_label(category: &RubricCategory) -> String {
    format!("{} ({})", category.name, category.max_score)
}
