use regex::Regex;

use crate::db::types::QuestionType;
use crate::schemas::ocr::{OcrResult, TextRegion};
use crate::schemas::parser::{ExamMeta, ParsedExam, Question};

const SUBJECT_KEYWORDS: &[(&str, &[&str])] = &[
    ("语文", &["语文", "作文", "阅读理解", "文言文"]),
    ("数学", &["数学", "计算", "几何", "代数", "函数"]),
    ("英语", &["英语", "English", "阅读", "Reading", "Writing"]),
    ("物理", &["物理", "力学", "电学", "光学"]),
    ("化学", &["化学", "元素", "反应", "实验"]),
    ("生物", &["生物", "细胞", "遗传", "生态"]),
    ("历史", &["历史", "朝代", "事件"]),
    ("地理", &["地理", "地图", "气候"]),
    ("政治", &["政治", "思想", "法律"]),
];

const GRADE_KEYWORDS: &[&str] = &[
    "十一年级", "十二年级", "十年级", "一年级", "二年级", "三年级", "四年级", "五年级", "六年级",
    "七年级", "八年级", "九年级", "初一", "初二", "初三", "高一", "高二", "高三",
];

const EXAM_TYPE_KEYWORDS: &[&str] = &[
    "期中考试", "期末考试", "月考", "周考", "单元测试", "模拟考试", "摸底考试", "诊断考试", "联考",
];

const OBJECTIVE_KEYWORDS: &[&str] =
    &["选择", "判断", "填空", "选项", "a.", "b.", "c.", "d.", "正确", "错误", "√", "×"];

const SUBJECTIVE_KEYWORDS: &[&str] = &[
    "简答", "论述", "分析", "说明", "解释", "计算", "证明", "写出", "列举", "描述", "阐述", "评价",
];

/// Fields counted per question when scoring parse completeness: text, type, score.
const QUESTION_FIELDS: usize = 3;
const META_FIELDS: usize = 4;

/// Rule-based parser turning recognized regions into exam metadata and questions.
#[derive(Debug, Clone)]
pub(crate) struct StructuralParser {
    question_numbers: Vec<Regex>,
    scores: Vec<Regex>,
    total_scores: Vec<Regex>,
    dates: Vec<Regex>,
    schools: Vec<Regex>,
    option_marker: Regex,
}

impl StructuralParser {
    pub(crate) fn new() -> Result<Self, regex::Error> {
        let compile = |patterns: &[&str]| -> Result<Vec<Regex>, regex::Error> {
            patterns.iter().map(|pattern| Regex::new(pattern)).collect()
        };

        Ok(Self {
            question_numbers: compile(&[
                r"^(\d+)[.、．]",
                r"^[（(](\d+)[)）]",
                r"^([一二三四五六七八九十]+)[.、．]",
            ])?,
            scores: compile(&[r"[（(](\d+)分[)）]", r"(\d+)分", r"本题(\d+)分"])?,
            total_scores: compile(&[r"满分[：:]*(\d+)", r"总分[：:]*(\d+)", r"共[：:]*(\d+)分"])?,
            dates: compile(&[
                r"(\d{4})年(\d{1,2})月(\d{1,2})日",
                r"(\d{4})-(\d{1,2})-(\d{1,2})",
                r"(\d{4})/(\d{1,2})/(\d{1,2})",
            ])?,
            schools: compile(&[
                r"([^，。\s]{2,10}(?:小学|中学|高中|学校))",
                r"学校[：:]*([^，。\s]{2,20})",
            ])?,
            option_marker: Regex::new(r"([A-D])[.、．]")?,
        })
    }

    pub(crate) fn parse(&self, ocr: &OcrResult) -> ParsedExam {
        let exam_meta = self.extract_meta(&ocr.text_regions);
        let mut questions = self.segment_questions(&ocr.text_regions);
        let mut incomplete_fields = Vec::new();

        for question in &mut questions {
            question.question_type = classify_question_type(&question.question_text);

            match self.extract_score(&question.question_text) {
                Some(score) => question.score = Some(f64::from(score)),
                None => incomplete_fields.push(format!("{}.score", question.question_id)),
            }

            if question.question_type == QuestionType::Objective {
                question.options = self.extract_options(&question.question_text);
            }
        }

        let parsing_confidence = parsing_confidence(&exam_meta, &questions);
        tracing::debug!(
            questions = questions.len(),
            parsing_confidence,
            subject = exam_meta.subject.as_deref().unwrap_or(""),
            "Parsed exam structure"
        );

        ParsedExam { exam_meta, questions, parsing_confidence, incomplete_fields }
    }

    pub(crate) fn extract_meta(&self, regions: &[TextRegion]) -> ExamMeta {
        let text = regions.iter().map(|region| region.text.as_str()).collect::<Vec<_>>().join(" ");

        ExamMeta {
            subject: SUBJECT_KEYWORDS
                .iter()
                .find(|(_, keywords)| keywords.iter().any(|keyword| text.contains(keyword)))
                .map(|(subject, _)| subject.to_string()),
            grade: GRADE_KEYWORDS.iter().find(|grade| text.contains(*grade)).map(|g| g.to_string()),
            total_score: first_capture(&self.total_scores, &text)
                .and_then(|value| value.parse().ok()),
            exam_type: EXAM_TYPE_KEYWORDS
                .iter()
                .find(|exam_type| text.contains(*exam_type))
                .map(|value| value.to_string()),
            exam_date: self.extract_date(&text),
            school: first_capture(&self.schools, &text),
        }
    }

    fn extract_date(&self, text: &str) -> Option<String> {
        self.dates.iter().find_map(|pattern| {
            let captures = pattern.captures(text)?;
            Some(format!("{}-{:0>2}-{:0>2}", &captures[1], &captures[2], &captures[3]))
        })
    }

    /// Starts a new question at every region opening with a question number.
    pub(crate) fn segment_questions(&self, regions: &[TextRegion]) -> Vec<Question> {
        let mut questions = Vec::new();
        let mut current: Option<(Question, Vec<String>)> = None;

        for region in regions {
            let text = region.text.trim();
            if self.question_number(text).is_some() {
                if let Some((question, lines)) = current.take() {
                    questions.push(finish_question(question, lines));
                }
                let question = Question {
                    question_id: format!("Q{}", questions.len() + 1),
                    question_type: QuestionType::Objective,
                    question_text: String::new(),
                    options: None,
                    correct_answer: None,
                    score: None,
                    knowledge_tags: Vec::new(),
                    difficulty: None,
                    bbox: Some(region.bbox),
                };
                current = Some((question, vec![text.to_string()]));
            } else if let Some((_, lines)) = current.as_mut() {
                lines.push(text.to_string());
            }
        }

        if let Some((question, lines)) = current {
            questions.push(finish_question(question, lines));
        }

        questions
    }

    pub(crate) fn question_number(&self, text: &str) -> Option<u32> {
        self.question_numbers.iter().find_map(|pattern| {
            let captures = pattern.captures(text)?;
            let raw = captures.get(1)?.as_str();
            raw.parse::<u32>().ok().or_else(|| chinese_numeral(raw))
        })
    }

    pub(crate) fn extract_score(&self, text: &str) -> Option<u32> {
        first_capture(&self.scores, text)
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|score| *score > 0)
    }

    pub(crate) fn extract_options(&self, text: &str) -> Option<Vec<String>> {
        let markers: Vec<_> = self
            .option_marker
            .captures_iter(text)
            .filter_map(|captures| captures.get(0).zip(captures.get(1)))
            .collect();

        let options: Vec<String> = markers
            .iter()
            .enumerate()
            .filter_map(|(idx, (whole, letter))| {
                let end = markers.get(idx + 1).map_or(text.len(), |(next, _)| next.start());
                let body = text[whole.end()..end].trim();
                (!body.is_empty()).then(|| format!("{}. {}", letter.as_str(), body))
            })
            .collect();

        (!options.is_empty()).then_some(options)
    }
}

fn finish_question(mut question: Question, lines: Vec<String>) -> Question {
    question.question_text = lines.join(" ");
    question
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        pattern.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
    })
}

pub(crate) fn classify_question_type(text: &str) -> QuestionType {
    let text = text.to_lowercase();
    if OBJECTIVE_KEYWORDS.iter().any(|keyword| text.contains(keyword)) {
        return QuestionType::Objective;
    }
    if SUBJECTIVE_KEYWORDS.iter().any(|keyword| text.contains(keyword)) {
        return QuestionType::Subjective;
    }
    QuestionType::Objective
}

fn chinese_digit(ch: char) -> Option<u32> {
    "一二三四五六七八九".chars().position(|digit| digit == ch).map(|idx| idx as u32 + 1)
}

/// Parses numerals from 一 to 九十九.
fn chinese_numeral(raw: &str) -> Option<u32> {
    let chars: Vec<char> = raw.chars().collect();
    match chars.as_slice() {
        ['十'] => Some(10),
        ['十', unit] => Some(10 + chinese_digit(*unit)?),
        [tens, '十'] => Some(chinese_digit(*tens)? * 10),
        [tens, '十', unit] => Some(chinese_digit(*tens)? * 10 + chinese_digit(*unit)?),
        [digit] => chinese_digit(*digit),
        _ => None,
    }
}

fn parsing_confidence(meta: &ExamMeta, questions: &[Question]) -> f64 {
    let total = META_FIELDS + questions.len() * QUESTION_FIELDS;

    let meta_complete = [
        meta.subject.is_some(),
        meta.grade.is_some(),
        meta.total_score.is_some(),
        meta.exam_type.is_some(),
    ]
    .into_iter()
    .filter(|present| *present)
    .count();

    let question_complete: usize = questions
        .iter()
        .map(|question| {
            // question_type is always assigned
            1 + usize::from(!question.question_text.is_empty())
                + usize::from(question.score.is_some_and(|score| score > 0.0))
        })
        .sum();

    (meta_complete + question_complete) as f64 / total as f64
}
