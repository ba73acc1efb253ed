//! 任务解析 - 业务能力层
//!
//! 从渲染后的页面 HTML 中还原出 [`TaskDefinition`]。
//!
//! 所有规则都是按优先级排列的启发式规则，第一个命中的规则生效。
//! 关键字判断天然存在误判，页面作者没有提供结构化协议之前无法做得更强。

use base64::{engine::general_purpose, Engine as _};
use regex::Regex;
use reqwest::Url;
use scraper::{Html, Selector};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info};

use crate::error::{QuizError, Result};
use crate::models::{AnswerShape, TaskDefinition};
use crate::utils::truncate_text;

/// 演示页提交的固定答案
pub const DEMO_ANSWER: &str = "Demo submission to proceed to actual quiz";

const DEMO_INSTRUCTIONS: &str = "Demo page: Submit any answer to proceed to the actual quiz.";
const MIN_BASE64_LEN: usize = 20;

/// 答案形态关键字，按优先级排列
const SHAPE_RULES: &[(AnswerShape, &[&str])] = &[
    (
        AnswerShape::BinaryBlob,
        &["base64", "data:image", "chart", "visualization", "image"],
    ),
    (AnswerShape::Structured, &["json", "object", "{"]),
    (AnswerShape::Boolean, &["true", "false", "boolean", "yes/no"]),
    (
        AnswerShape::Number,
        &["number", "count", "sum", "average", "total"],
    ),
];

/// 编码内容被找到的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource {
    /// pre / code / div / span 元素的文本
    ElementText,
    /// `data-task` 属性
    DataAttribute,
    /// script 中的字符串字面量
    ScriptLiteral,
    /// 原始 HTML 中任意位置
    RawMarkup,
}

/// 任务解析器
pub struct TaskParser {
    text_selector: Selector,
    data_selector: Selector,
    script_selector: Selector,
    base64_charset: Regex,
    script_literal: Regex,
    raw_run: Regex,
    absolute_url: Regex,
    submit_phrases: Vec<Regex>,
    file_extension: Regex,
    download_phrase: Regex,
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| QuizError::task_execution(format!("CSS 选择器无效 {}: {:?}", css, e)))
}

impl TaskParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            text_selector: selector("pre, code, div, span")?,
            data_selector: selector("[data-task]")?,
            script_selector: selector("script")?,
            base64_charset: Regex::new(r"^[A-Za-z0-9+/]*={0,2}$")?,
            script_literal: Regex::new(r#"["']([A-Za-z0-9+/]{20,}={0,2})["']"#)?,
            raw_run: Regex::new(r"\b[A-Za-z0-9+/]{40,}={0,2}")?,
            absolute_url: Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#)?,
            submit_phrases: vec![
                Regex::new(r"(?i)submit\s+(?:to|at|endpoint)[:\s]+(https?://\S+)")?,
                Regex::new(r"(?i)endpoint[:\s]+(https?://\S+)")?,
                Regex::new(r"(?i)POST\s+(?:to|at)[:\s]+(https?://\S+)")?,
            ],
            file_extension: Regex::new(
                r"(?i)\.(pdf|csv|json|xlsx|xls|txt|png|jpg|jpeg|gif|mp3|wav|mp4)(?:$|[?#])",
            )?,
            download_phrase: Regex::new(r"(?i)download[:\s]+(\S+)")?,
        })
    }

    /// 解析测验页面
    ///
    /// # 参数
    /// - `markup`: 渲染后的 HTML
    /// - `source_url`: 页面地址
    ///
    /// # 返回
    /// 解析出的任务；找不到必需字段时返回 task-execution 错误
    pub fn parse(&self, markup: &str, source_url: &Url) -> Result<TaskDefinition> {
        debug!("解析测验页面: {} ({} 字符)", source_url, markup.len());

        if self.is_demo_page(markup, source_url) {
            info!("📘 检测到演示页: {}", source_url);
            return self.demo_task(source_url);
        }

        let (encoded, source) = self.find_encoded_payload(markup)?;
        debug!("编码内容位置: {:?}", source);

        let instructions = decode_instructions(&encoded)?;
        debug!("任务说明: {}", truncate_text(&instructions, 200));

        let submit_endpoint = self.extract_submit_endpoint(&instructions)?;
        let answer_shape = detect_answer_shape(&instructions);
        let file_urls = self.extract_file_urls(&instructions);

        info!(
            "✓ 任务解析完成: 提交到 {}，答案形态 {}，{} 个文件",
            submit_endpoint,
            answer_shape,
            file_urls.len()
        );

        Ok(TaskDefinition {
            instructions,
            submit_endpoint,
            answer_shape,
            file_urls,
            extra: Map::new(),
        })
    }

    fn is_demo_page(&self, markup: &str, source_url: &Url) -> bool {
        source_url.path().contains("/demo") && markup.contains("POST this JSON")
    }

    fn demo_task(&self, source_url: &Url) -> Result<TaskDefinition> {
        let submit_endpoint = source_url
            .join("/submit")
            .map_err(|e| QuizError::task_execution(format!("无法构造演示页提交地址: {}", e)))?;
        let mut extra = Map::new();
        extra.insert("is_demo".to_string(), JsonValue::Bool(true));

        Ok(TaskDefinition {
            instructions: DEMO_INSTRUCTIONS.to_string(),
            submit_endpoint,
            answer_shape: AnswerShape::String,
            file_urls: Vec::new(),
            extra,
        })
    }

    /// 按优先级查找 base64 编码的任务内容
    pub fn find_encoded_payload(&self, markup: &str) -> Result<(String, PayloadSource)> {
        let document = Html::parse_document(markup);

        for element in document.select(&self.text_selector) {
            let text = element.text().collect::<String>();
            let text = text.trim();
            if self.is_base64(text) {
                return Ok((text.to_string(), PayloadSource::ElementText));
            }
        }

        for element in document.select(&self.data_selector) {
            if let Some(value) = element.value().attr("data-task") {
                let value = value.trim();
                if self.is_base64(value) {
                    return Ok((value.to_string(), PayloadSource::DataAttribute));
                }
            }
        }

        for script in document.select(&self.script_selector) {
            let body = script.text().collect::<String>();
            for captures in self.script_literal.captures_iter(&body) {
                let candidate = &captures[1];
                if self.is_base64(candidate) {
                    return Ok((candidate.to_string(), PayloadSource::ScriptLiteral));
                }
            }
        }

        for found in self.raw_run.find_iter(markup) {
            if self.is_base64(found.as_str()) {
                return Ok((found.as_str().to_string(), PayloadSource::RawMarkup));
            }
        }

        Err(QuizError::task_execution("页面中找不到 base64 编码的任务内容"))
    }

    /// 字符集 + 最小长度 + 能解码出非空内容
    pub fn is_base64(&self, candidate: &str) -> bool {
        if candidate.len() < MIN_BASE64_LEN || !self.base64_charset.is_match(candidate) {
            return false;
        }
        general_purpose::STANDARD
            .decode(candidate)
            .map(|bytes| !bytes.is_empty())
            .unwrap_or(false)
    }

    fn extract_submit_endpoint(&self, instructions: &str) -> Result<Url> {
        let urls: Vec<String> = self
            .absolute_url
            .find_iter(instructions)
            .map(|m| clean_url(m.as_str()))
            .collect();

        let keyword_match = urls
            .iter()
            .find(|url| url.to_lowercase().contains("submit"))
            .cloned();

        let phrase_match = || {
            self.submit_phrases.iter().find_map(|pattern| {
                pattern
                    .captures(instructions)
                    .map(|captures| clean_url(&captures[1]))
            })
        };

        let chosen = keyword_match
            .or_else(phrase_match)
            .or_else(|| urls.first().cloned())
            .ok_or_else(|| QuizError::task_execution("任务说明中找不到提交地址"))?;

        Url::parse(&chosen).map_err(|e| {
            QuizError::task_execution(format!("提交地址无效 {}: {}", chosen, e))
                .with_context("url", &chosen)
        })
    }

    /// 提取任务引用的文件 URL，按首次出现顺序去重
    pub fn extract_file_urls(&self, instructions: &str) -> Vec<Url> {
        let by_extension = self
            .absolute_url
            .find_iter(instructions)
            .map(|m| clean_url(m.as_str()))
            .filter(|url| self.file_extension.is_match(url));

        let by_phrase = self
            .download_phrase
            .captures_iter(instructions)
            .map(|captures| clean_url(&captures[1]))
            .filter(|url| url.starts_with("http"));

        let mut seen: Vec<Url> = Vec::new();
        for candidate in by_extension.chain(by_phrase) {
            let Ok(url) = Url::parse(&candidate) else {
                debug!("忽略无效文件地址: {}", candidate);
                continue;
            };
            if !seen.contains(&url) {
                seen.push(url);
            }
        }
        seen
    }
}

/// 解码任务说明，必须是 UTF-8 文本
fn decode_instructions(encoded: &str) -> Result<String> {
    let bytes = general_purpose::STANDARD.decode(encoded).map_err(|e| {
        QuizError::task_execution(format!("任务内容 base64 解码失败: {}", e)).with_source(e)
    })?;
    String::from_utf8(bytes).map_err(|e| {
        QuizError::task_execution(format!("任务内容不是 UTF-8 文本: {}", e)).with_source(e)
    })
}

/// 去掉句末标点和引号
pub fn clean_url(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(&['.', ',', ';', ':', '!', '?', ')'][..])
        .trim_matches(&['\'', '"'][..])
        .to_string()
}

/// 按关键字判断答案形态
pub fn detect_answer_shape(instructions: &str) -> AnswerShape {
    let lower = instructions.to_lowercase();
    SHAPE_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(shape, _)| *shape)
        .unwrap_or(AnswerShape::String)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> TaskParser {
        TaskParser::new().unwrap()
    }

    fn encode(text: &str) -> String {
        general_purpose::STANDARD.encode(text)
    }

    fn page() -> Url {
        Url::parse("https://quiz.example.com/quiz-1").unwrap()
    }

    #[test]
    fn end_to_end_number_task() {
        let text = "Submit to: https://x/submit. Return a number. Download https://x/data.csv";
        let markup = format!("<html><body><pre>{}</pre></body></html>", encode(text));
        let task = parser().parse(&markup, &page()).unwrap();

        assert_eq!(task.instructions, text);
        assert_eq!(task.submit_endpoint.as_str(), "https://x/submit");
        assert_eq!(task.answer_shape, AnswerShape::Number);
        let files: Vec<&str> = task.file_urls.iter().map(Url::as_str).collect();
        assert_eq!(files, vec!["https://x/data.csv"]);
        assert!(!task.is_demo());
    }

    #[test]
    fn round_trip_through_every_position() {
        let texts = [
            "Sum the values column and POST to https://grader.example.com/submit please.",
            "Ünïcödé task: count rows in https://files.example.com/a.json, submit at https://s.example.com/go",
        ];
        let parser = parser();
        for text in texts {
            let encoded = encode(text);
            let positions = [
                (
                    format!("<body><div><code>{}</code></div></body>", encoded),
                    PayloadSource::ElementText,
                ),
                (
                    format!(r#"<body><section data-task="{}"></section></body>"#, encoded),
                    PayloadSource::DataAttribute,
                ),
                (
                    format!(r#"<body><script>const task = "{}";</script></body>"#, encoded),
                    PayloadSource::ScriptLiteral,
                ),
                (
                    format!("<body><p>payload {} end</p></body>", encoded),
                    PayloadSource::RawMarkup,
                ),
            ];
            for (markup, expected_source) in positions {
                let (found, source) = parser.find_encoded_payload(&markup).unwrap();
                assert_eq!(source, expected_source);
                assert_eq!(found, encoded);
                let task = parser.parse(&markup, &page()).unwrap();
                assert_eq!(task.instructions, text);
            }
        }
    }

    #[test]
    fn prefers_url_with_submit_keyword() {
        let text = "See https://docs.example.com/help and send answers to https://api.example.com/submit-answer";
        let markup = format!("<pre>{}</pre>", encode(text));
        let task = parser().parse(&markup, &page()).unwrap();
        assert_eq!(task.submit_endpoint.as_str(), "https://api.example.com/submit-answer");
    }

    #[test]
    fn phrase_then_first_url() {
        let text = "Reference https://docs.example.com/a. Then POST to https://api.example.com/grade.";
        let markup = format!("<pre>{}</pre>", encode(text));
        let task = parser().parse(&markup, &page()).unwrap();
        assert_eq!(task.submit_endpoint.as_str(), "https://api.example.com/grade");

        let text = "Answer via 'https://api.example.com/grade'! What is the capital?";
        let markup = format!("<pre>{}</pre>", encode(text));
        let task = parser().parse(&markup, &page()).unwrap();
        assert_eq!(task.submit_endpoint.as_str(), "https://api.example.com/grade");
    }

    #[test]
    fn missing_url_is_task_execution_error() {
        let markup = format!("<pre>{}</pre>", encode("There is no endpoint anywhere in this text."));
        let err = parser().parse(&markup, &page()).unwrap_err();
        assert_eq!(err.category, crate::error::ErrorCategory::TaskExecution);
    }

    #[test]
    fn missing_payload_is_task_execution_error() {
        let err = parser().parse("<p>nothing here</p>", &page()).unwrap_err();
        assert_eq!(err.category, crate::error::ErrorCategory::TaskExecution);
    }

    #[test]
    fn non_utf8_payload_is_rejected() {
        let encoded = general_purpose::STANDARD.encode([0xff_u8; 30]);
        let markup = format!("<pre>{}</pre>", encoded);
        let err = parser().parse(&markup, &page()).unwrap_err();
        assert_eq!(err.category, crate::error::ErrorCategory::TaskExecution);
    }

    #[test]
    fn shape_priority() {
        assert_eq!(detect_answer_shape("Draw a chart of the count"), AnswerShape::BinaryBlob);
        assert_eq!(detect_answer_shape("Return a JSON object with the total"), AnswerShape::Structured);
        assert_eq!(detect_answer_shape("Answer true or false"), AnswerShape::Boolean);
        assert_eq!(detect_answer_shape("What is the average?"), AnswerShape::Number);
        assert_eq!(detect_answer_shape("Name the city"), AnswerShape::String);
    }

    #[test]
    fn file_urls_are_deduplicated_in_order() {
        let text = "Files: https://x/b.pdf, https://x/a.csv and again https://x/b.pdf. download: https://x/raw?id=1";
        let urls: Vec<String> = parser()
            .extract_file_urls(text)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(urls, vec!["https://x/b.pdf", "https://x/a.csv", "https://x/raw?id=1"]);
    }

    #[test]
    fn demo_page_short_circuits() {
        let url = Url::parse("https://quiz.example.com/demo?x=1").unwrap();
        let task = parser()
            .parse("<p>POST this JSON to the endpoint</p>", &url)
            .unwrap();
        assert!(task.is_demo());
        assert_eq!(task.answer_shape, AnswerShape::String);
        assert_eq!(task.submit_endpoint.as_str(), "https://quiz.example.com/submit");
    }

    #[test]
    fn clean_url_strips_punctuation_and_quotes() {
        assert_eq!(clean_url("https://x/submit)."), "https://x/submit");
        assert_eq!(clean_url("\"https://x/a\""), "https://x/a");
    }
}
