//! 工具菜单与分发
//!
//! 工具名到处理函数的映射是编译期确定的 `phf` 表；
//! 新增工具时同时扩展 [`ToolKind`]、映射表和描述。

use std::collections::HashMap;
use std::sync::Arc;

use phf::phf_map;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::error::{QuizError, Result};
use crate::infrastructure::{FileFetcher, ReasoningService};
use crate::models::{ToolCall, ToolDescriptor};
use crate::services::chart::{render_chart, ChartConfig, ChartKind};
use crate::services::data_tools::{AggFunc, Aggregated, Condition, FilterOp, Table, TableError};
use crate::services::pdf::PdfDocument;
use crate::utils::truncate_text;
use crate::workflow::context::{ExecutionContext, MediaAsset};

/// 工具种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    DownloadFile,
    ParseFile,
    FilterData,
    AggregateData,
    AnalyzeData,
    CreateChart,
    GetValue,
    ProcessImage,
    AnalyzeImage,
    TranscribeAudio,
}

static TOOL_KINDS: phf::Map<&'static str, ToolKind> = phf_map! {
    "download_file" => ToolKind::DownloadFile,
    "parse_file" => ToolKind::ParseFile,
    "filter_data" => ToolKind::FilterData,
    "aggregate_data" => ToolKind::AggregateData,
    "analyze_data" => ToolKind::AnalyzeData,
    "create_chart" => ToolKind::CreateChart,
    "get_value" => ToolKind::GetValue,
    "process_image" => ToolKind::ProcessImage,
    "analyze_image" => ToolKind::AnalyzeImage,
    "transcribe_audio" => ToolKind::TranscribeAudio,
};

impl ToolKind {
    pub const ALL: [ToolKind; 10] = [
        ToolKind::DownloadFile,
        ToolKind::ParseFile,
        ToolKind::FilterData,
        ToolKind::AggregateData,
        ToolKind::AnalyzeData,
        ToolKind::CreateChart,
        ToolKind::GetValue,
        ToolKind::ProcessImage,
        ToolKind::AnalyzeImage,
        ToolKind::TranscribeAudio,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        TOOL_KINDS.get(name).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::DownloadFile => "download_file",
            ToolKind::ParseFile => "parse_file",
            ToolKind::FilterData => "filter_data",
            ToolKind::AggregateData => "aggregate_data",
            ToolKind::AnalyzeData => "analyze_data",
            ToolKind::CreateChart => "create_chart",
            ToolKind::GetValue => "get_value",
            ToolKind::ProcessImage => "process_image",
            ToolKind::AnalyzeImage => "analyze_image",
            ToolKind::TranscribeAudio => "transcribe_audio",
        }
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        let (description, parameters) = match self {
            ToolKind::DownloadFile => (
                "Download a file from a URL into the context",
                json!({
                    "type": "object",
                    "properties": {
                        "url": { "type": "string", "description": "URL of the file to download" },
                        "file_id": { "type": "string", "description": "Identifier to store the file under" },
                        "headers": {
                            "type": "object",
                            "description": "Optional HTTP headers",
                            "additionalProperties": { "type": "string" }
                        }
                    },
                    "required": ["url", "file_id"]
                }),
            ),
            ToolKind::ParseFile => (
                "Parse a downloaded file into a table (csv, json, pdf) or text; a pdf without a table is stored as its text",
                json!({
                    "type": "object",
                    "properties": {
                        "file_id": { "type": "string" },
                        "file_type": { "type": "string", "enum": ["csv", "json", "text", "pdf"] },
                        "df_id": { "type": "string", "description": "Identifier to store the parsed data under" },
                        "options": {
                            "type": "object",
                            "properties": {
                                "page": { "type": "integer", "description": "PDF page number, starting at 1" },
                                "text_only": { "type": "boolean", "description": "Extract PDF text instead of a table" }
                            }
                        }
                    },
                    "required": ["file_id", "file_type", "df_id"]
                }),
            ),
            ToolKind::FilterData => (
                "Filter rows of a table; all conditions must hold",
                json!({
                    "type": "object",
                    "properties": {
                        "df_id": { "type": "string" },
                        "conditions": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "column": { "type": "string" },
                                    "operator": {
                                        "type": "string",
                                        "enum": ["==", "!=", ">", "<", ">=", "<=", "in", "not_in", "contains"]
                                    },
                                    "value": {}
                                },
                                "required": ["column", "operator", "value"]
                            }
                        },
                        "result_id": { "type": "string" }
                    },
                    "required": ["df_id", "conditions", "result_id"]
                }),
            ),
            ToolKind::AggregateData => (
                "Aggregate table columns, optionally grouped by a column",
                json!({
                    "type": "object",
                    "properties": {
                        "df_id": { "type": "string" },
                        "operations": {
                            "type": "object",
                            "description": "Map of column name to sum|mean|count|min|max|median",
                            "additionalProperties": { "type": "string" }
                        },
                        "group_by": { "type": "string" },
                        "result_id": { "type": "string" }
                    },
                    "required": ["df_id", "operations", "result_id"]
                }),
            ),
            ToolKind::AnalyzeData => (
                "Run statistics, correlation, value_counts or sort on a table",
                json!({
                    "type": "object",
                    "properties": {
                        "df_id": { "type": "string" },
                        "analysis_type": {
                            "type": "string",
                            "enum": ["statistics", "correlation", "value_counts", "sort"]
                        },
                        "options": {
                            "type": "object",
                            "description": "columns, column, normalize, top_n, by, ascending"
                        },
                        "result_id": { "type": "string" }
                    },
                    "required": ["df_id", "analysis_type", "result_id"]
                }),
            ),
            ToolKind::CreateChart => (
                "Render a chart from a table as a base64 data URI",
                json!({
                    "type": "object",
                    "properties": {
                        "df_id": { "type": "string" },
                        "chart_type": { "type": "string", "enum": ["bar", "line", "scatter", "pie"] },
                        "config": {
                            "type": "object",
                            "properties": {
                                "x": { "type": "string" },
                                "y": { "type": "string" },
                                "title": { "type": "string" }
                            }
                        },
                        "result_id": { "type": "string" }
                    },
                    "required": ["df_id", "chart_type", "result_id"]
                }),
            ),
            ToolKind::GetValue => (
                "Read a stored result, or a table (optionally one column of it)",
                json!({
                    "type": "object",
                    "properties": {
                        "result_id": { "type": "string" },
                        "path": { "type": "string", "description": "Column name when reading a table" }
                    },
                    "required": ["result_id"]
                }),
            ),
            ToolKind::ProcessImage => (
                "Decode a downloaded file as an image",
                json!({
                    "type": "object",
                    "properties": {
                        "file_id": { "type": "string" },
                        "image_id": { "type": "string" }
                    },
                    "required": ["file_id", "image_id"]
                }),
            ),
            ToolKind::AnalyzeImage => (
                "Ask the vision model a question about a processed image",
                json!({
                    "type": "object",
                    "properties": {
                        "image_id": { "type": "string" },
                        "prompt": { "type": "string" },
                        "result_id": { "type": "string" }
                    },
                    "required": ["image_id", "prompt", "result_id"]
                }),
            ),
            ToolKind::TranscribeAudio => (
                "Transcribe a downloaded audio file to text",
                json!({
                    "type": "object",
                    "properties": {
                        "file_id": { "type": "string" },
                        "result_id": { "type": "string" }
                    },
                    "required": ["file_id", "result_id"]
                }),
            ),
        };

        ToolDescriptor {
            name: self.name(),
            description,
            parameters,
        }
    }
}

/// 完整的工具菜单
pub fn tool_menu() -> Vec<ToolDescriptor> {
    ToolKind::ALL.iter().map(ToolKind::descriptor).collect()
}

// ========== 工具结果 ==========

/// 二进制产物
#[derive(Debug, Clone, PartialEq)]
pub enum Blob {
    /// 原始文件
    File(Vec<u8>),
    /// 解码后的图片
    Media(MediaAsset),
    /// 编码好的 data URI（图表）
    DataUri(String),
}

/// 工具处理函数的返回值
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Tabular(Table),
    Scalar(JsonValue),
    Blob(Blob),
}

/// 工具输出以及保存位置
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    /// `None` 表示只读，不写回上下文
    pub store_as: Option<String>,
    pub output: ToolOutput,
}

impl ToolOutcome {
    fn stored(key: String, output: ToolOutput) -> Self {
        Self {
            store_as: Some(key),
            output,
        }
    }
}

/// 把输出写回上下文，并生成反馈给推理服务的摘要
pub fn store_outcome(ctx: &mut ExecutionContext, outcome: ToolOutcome) -> JsonValue {
    let ToolOutcome { store_as, output } = outcome;
    let Some(key) = store_as else {
        return match output {
            ToolOutput::Scalar(value) => json!({ "success": true, "value": value }),
            ToolOutput::Tabular(table) => json!({ "success": true, "value": table.to_records() }),
            ToolOutput::Blob(_) => json!({ "success": true }),
        };
    };

    match output {
        ToolOutput::Tabular(table) => {
            let mut summary = json!({ "success": true, "id": key });
            if let (JsonValue::Object(target), JsonValue::Object(preview)) = (&mut summary, table.preview()) {
                target.extend(preview);
            }
            ctx.put_table(key, table);
            summary
        }
        ToolOutput::Scalar(value) => {
            let summary = json!({ "success": true, "id": key, "result": value });
            ctx.put_result(key, value);
            summary
        }
        ToolOutput::Blob(Blob::File(bytes)) => {
            let summary = json!({ "success": true, "id": key, "size": bytes.len() });
            ctx.put_file(key, bytes);
            summary
        }
        ToolOutput::Blob(Blob::Media(asset)) => {
            let summary = json!({
                "success": true,
                "id": key,
                "mime": asset.mime,
                "size": asset.bytes.len(),
            });
            ctx.put_media(key, asset);
            summary
        }
        ToolOutput::Blob(Blob::DataUri(uri)) => {
            let summary = json!({ "success": true, "id": key, "size": uri.len() });
            ctx.put_result(key, JsonValue::String(uri));
            summary
        }
    }
}

// ========== 参数 ==========

#[derive(Debug, Deserialize)]
struct DownloadArgs {
    url: String,
    file_id: String,
    #[serde(default)]
    headers: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct ParseArgs {
    file_id: String,
    file_type: String,
    df_id: String,
    #[serde(default)]
    options: Option<ParseOptions>,
}

#[derive(Debug, Default, Deserialize)]
struct ParseOptions {
    /// PDF 页码，从 1 开始
    #[serde(default)]
    page: Option<u32>,
    /// PDF 只取文本，不识别表格
    #[serde(default)]
    text_only: bool,
}

#[derive(Debug, Deserialize)]
struct ConditionArgs {
    column: String,
    operator: String,
    #[serde(default)]
    value: JsonValue,
}

#[derive(Debug, Deserialize)]
struct FilterArgs {
    df_id: String,
    conditions: Vec<ConditionArgs>,
    result_id: String,
}

#[derive(Debug, Deserialize)]
struct AggregateArgs {
    df_id: String,
    operations: Map<String, JsonValue>,
    #[serde(default)]
    group_by: Option<String>,
    result_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnalyzeOptions {
    columns: Option<Vec<String>>,
    column: Option<String>,
    normalize: bool,
    top_n: Option<usize>,
    by: Option<String>,
    ascending: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeArgs {
    df_id: String,
    analysis_type: String,
    #[serde(default)]
    options: Option<AnalyzeOptions>,
    result_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChartArgsConfig {
    x: Option<String>,
    y: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartArgs {
    df_id: String,
    chart_type: String,
    #[serde(default)]
    config: Option<ChartArgsConfig>,
    result_id: String,
}

#[derive(Debug, Deserialize)]
struct GetValueArgs {
    result_id: String,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProcessImageArgs {
    file_id: String,
    image_id: String,
}

#[derive(Debug, Deserialize)]
struct AnalyzeImageArgs {
    image_id: String,
    prompt: String,
    result_id: String,
}

#[derive(Debug, Deserialize)]
struct TranscribeArgs {
    file_id: String,
    result_id: String,
}

fn parse_args<T: DeserializeOwned>(kind: ToolKind, raw: &str) -> Result<T> {
    let raw = if raw.trim().is_empty() { "{}" } else { raw };
    serde_json::from_str(raw).map_err(|e| {
        QuizError::data_processing(format!("工具 {} 参数无效: {}", kind.name(), e)).with_source(e)
    })
}

// ========== 媒体识别 ==========

/// 按文件头识别图片类型
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(b"BM") {
        Some("image/bmp")
    } else {
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
        let head = head.trim_start();
        (head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")))
            .then_some("image/svg+xml")
    }
}

/// 音频格式，只区分 wav 和 mp3
pub fn sniff_audio_format(bytes: &[u8]) -> &'static str {
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        "wav"
    } else {
        "mp3"
    }
}

// ========== 执行 ==========

/// 工具执行器
pub struct ToolExecutor {
    fetcher: Arc<dyn FileFetcher>,
    reasoning: Arc<dyn ReasoningService>,
}

impl ToolExecutor {
    pub fn new(fetcher: Arc<dyn FileFetcher>, reasoning: Arc<dyn ReasoningService>) -> Self {
        Self { fetcher, reasoning }
    }

    /// 执行一次工具调用
    ///
    /// 失败不会中断求解，而是以 `{"success": false, "error": ...}` 的形式反馈给推理服务。
    pub async fn execute(&self, call: &ToolCall, ctx: &mut ExecutionContext) -> JsonValue {
        info!("🔧 执行工具: {}", call.name);
        debug!("工具参数: {}", truncate_text(&call.arguments, 300));

        let outcome = match ToolKind::from_name(&call.name) {
            Some(kind) => self.run(kind, &call.arguments, ctx).await,
            None => Err(QuizError::task_execution(format!("未知工具: {}", call.name))),
        };

        match outcome {
            Ok(outcome) => store_outcome(ctx, outcome),
            Err(err) => {
                warn!("工具 {} 执行失败: {}", call.name, err);
                json!({ "success": false, "error": err.to_string() })
            }
        }
    }

    async fn run(&self, kind: ToolKind, raw: &str, ctx: &ExecutionContext) -> Result<ToolOutcome> {
        match kind {
            ToolKind::DownloadFile => self.download_file(parse_args(kind, raw)?).await,
            ToolKind::ParseFile => parse_file(parse_args(kind, raw)?, ctx),
            ToolKind::FilterData => filter_data(parse_args(kind, raw)?, ctx),
            ToolKind::AggregateData => aggregate_data(parse_args(kind, raw)?, ctx),
            ToolKind::AnalyzeData => analyze_data(parse_args(kind, raw)?, ctx),
            ToolKind::CreateChart => create_chart(parse_args(kind, raw)?, ctx),
            ToolKind::GetValue => get_value(parse_args(kind, raw)?, ctx),
            ToolKind::ProcessImage => process_image(parse_args(kind, raw)?, ctx),
            ToolKind::AnalyzeImage => self.analyze_image(parse_args(kind, raw)?, ctx).await,
            ToolKind::TranscribeAudio => self.transcribe_audio(parse_args(kind, raw)?, ctx).await,
        }
    }

    async fn download_file(&self, args: DownloadArgs) -> Result<ToolOutcome> {
        let url = Url::parse(&args.url)
            .map_err(|e| QuizError::validation(format!("下载地址无效 {}: {}", args.url, e)))?;
        let bytes = self.fetcher.download(&url, args.headers.as_ref()).await?;
        Ok(ToolOutcome::stored(args.file_id, ToolOutput::Blob(Blob::File(bytes))))
    }

    async fn analyze_image(&self, args: AnalyzeImageArgs, ctx: &ExecutionContext) -> Result<ToolOutcome> {
        let asset = ctx.media(&args.image_id)?;
        let text = self
            .reasoning
            .analyze_image(&asset.bytes, &asset.mime, &args.prompt)
            .await?;
        Ok(ToolOutcome::stored(args.result_id, ToolOutput::Scalar(JsonValue::String(text))))
    }

    async fn transcribe_audio(&self, args: TranscribeArgs, ctx: &ExecutionContext) -> Result<ToolOutcome> {
        let bytes = ctx.file(&args.file_id)?;
        let text = self
            .reasoning
            .transcribe_audio(bytes, sniff_audio_format(bytes))
            .await?;
        Ok(ToolOutcome::stored(args.result_id, ToolOutput::Scalar(JsonValue::String(text))))
    }
}

fn parse_file(args: ParseArgs, ctx: &ExecutionContext) -> Result<ToolOutcome> {
    let bytes = ctx.file(&args.file_id)?;
    let output = match args.file_type.to_lowercase().as_str() {
        "csv" => ToolOutput::Tabular(Table::from_csv(bytes)?),
        "json" => {
            let value: JsonValue = serde_json::from_slice(bytes)?;
            match Table::from_json(&value) {
                Some(table) => ToolOutput::Tabular(table),
                None => ToolOutput::Scalar(value),
            }
        }
        "text" | "txt" => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| QuizError::data_processing(format!("文件不是 UTF-8 文本: {}", e)))?;
            ToolOutput::Scalar(JsonValue::String(text.to_string()))
        }
        "pdf" => {
            let options = args.options.unwrap_or_default();
            let pdf = PdfDocument::load(bytes)?;
            if options.text_only {
                ToolOutput::Scalar(JsonValue::String(pdf.text(options.page)?))
            } else {
                match pdf.table(options.page) {
                    Ok(table) => ToolOutput::Tabular(table),
                    Err(TableError::NoTable) => {
                        debug!("PDF 中没有表格，按文本保存");
                        ToolOutput::Scalar(JsonValue::String(pdf.text(options.page)?))
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
        other => {
            return Err(QuizError::data_processing(format!("不支持的文件类型: {}", other)));
        }
    };
    Ok(ToolOutcome::stored(args.df_id, output))
}

fn filter_data(args: FilterArgs, ctx: &ExecutionContext) -> Result<ToolOutcome> {
    let table = ctx.table(&args.df_id)?;
    let conditions = args
        .conditions
        .into_iter()
        .map(|c| {
            Ok(Condition {
                column: c.column,
                op: FilterOp::parse(&c.operator)?,
                value: c.value,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let filtered = table.filter(&conditions)?;
    debug!("过滤: {} → {} 行", table.len(), filtered.len());
    Ok(ToolOutcome::stored(args.result_id, ToolOutput::Tabular(filtered)))
}

fn aggregate_data(args: AggregateArgs, ctx: &ExecutionContext) -> Result<ToolOutcome> {
    let table = ctx.table(&args.df_id)?;
    let operations = args
        .operations
        .iter()
        .map(|(column, func)| {
            let name = func.as_str().ok_or_else(|| {
                QuizError::data_processing(format!("列 {} 的聚合函数必须是字符串", column))
            })?;
            Ok((column.clone(), AggFunc::parse(name)?))
        })
        .collect::<Result<Vec<_>>>()?;

    let output = match table.aggregate(&operations, args.group_by.as_deref())? {
        Aggregated::Scalar(value) => ToolOutput::Scalar(value),
        Aggregated::Grouped(grouped) => ToolOutput::Tabular(grouped),
    };
    Ok(ToolOutcome::stored(args.result_id, output))
}

fn analyze_data(args: AnalyzeArgs, ctx: &ExecutionContext) -> Result<ToolOutcome> {
    let table = ctx.table(&args.df_id)?;
    let options = args.options.unwrap_or_default();
    let output = match args.analysis_type.as_str() {
        "statistics" => ToolOutput::Scalar(table.statistics(options.columns.as_deref())?),
        "correlation" => ToolOutput::Tabular(table.correlation(options.columns.as_deref())?),
        "value_counts" => {
            let column = options
                .column
                .ok_or_else(|| QuizError::data_processing("value_counts 需要 column 参数"))?;
            ToolOutput::Tabular(table.value_counts(&column, options.normalize, options.top_n)?)
        }
        "sort" => {
            let by = options
                .by
                .ok_or_else(|| QuizError::data_processing("sort 需要 by 参数"))?;
            ToolOutput::Tabular(table.sort_by(&by, options.ascending.unwrap_or(true))?)
        }
        other => {
            return Err(QuizError::data_processing(format!("未知分析类型: {}", other)));
        }
    };
    Ok(ToolOutcome::stored(args.result_id, output))
}

fn create_chart(args: ChartArgs, ctx: &ExecutionContext) -> Result<ToolOutcome> {
    let table = ctx.table(&args.df_id)?;
    let kind = ChartKind::parse(&args.chart_type)?;
    let config = args.config.unwrap_or_default();
    let uri = render_chart(
        table,
        kind,
        &ChartConfig {
            x: config.x,
            y: config.y,
            title: config.title,
        },
    )?;
    Ok(ToolOutcome::stored(args.result_id, ToolOutput::Blob(Blob::DataUri(uri))))
}

fn get_value(args: GetValueArgs, ctx: &ExecutionContext) -> Result<ToolOutcome> {
    let value = if let Some(value) = ctx.result(&args.result_id) {
        value.clone()
    } else {
        let table = ctx.table(&args.result_id)?;
        match args.path.as_deref() {
            Some(column) => JsonValue::Array(table.column(column)?),
            None => JsonValue::Array(table.to_records()),
        }
    };
    Ok(ToolOutcome {
        store_as: None,
        output: ToolOutput::Scalar(value),
    })
}

fn process_image(args: ProcessImageArgs, ctx: &ExecutionContext) -> Result<ToolOutcome> {
    let bytes = ctx.file(&args.file_id)?;
    let mime = sniff_image_mime(bytes)
        .ok_or_else(|| QuizError::data_processing(format!("文件 {} 不是可识别的图片", args.file_id)))?;
    Ok(ToolOutcome::stored(
        args.image_id,
        ToolOutput::Blob(Blob::Media(MediaAsset {
            mime: mime.to_string(),
            bytes: bytes.to_vec(),
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with_csv() -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        ctx.put_file("raw", b"team,score\nred,3\nblue,5\nred,4\n".to_vec());
        ctx
    }

    fn run_sync(kind: ToolKind, args: JsonValue, ctx: &mut ExecutionContext) -> JsonValue {
        let raw = args.to_string();
        let outcome = match kind {
            ToolKind::ParseFile => parse_file(parse_args(kind, &raw).unwrap(), ctx),
            ToolKind::FilterData => filter_data(parse_args(kind, &raw).unwrap(), ctx),
            ToolKind::AggregateData => aggregate_data(parse_args(kind, &raw).unwrap(), ctx),
            ToolKind::AnalyzeData => analyze_data(parse_args(kind, &raw).unwrap(), ctx),
            ToolKind::CreateChart => create_chart(parse_args(kind, &raw).unwrap(), ctx),
            ToolKind::GetValue => get_value(parse_args(kind, &raw).unwrap(), ctx),
            ToolKind::ProcessImage => process_image(parse_args(kind, &raw).unwrap(), ctx),
            other => panic!("{:?} needs collaborators", other),
        };
        match outcome {
            Ok(outcome) => store_outcome(ctx, outcome),
            Err(err) => json!({ "success": false, "error": err.to_string() }),
        }
    }

    #[test]
    fn menu_and_dispatch_table_agree() {
        let menu = tool_menu();
        assert_eq!(menu.len(), TOOL_KINDS.len());
        for descriptor in menu {
            let kind = ToolKind::from_name(descriptor.name).unwrap();
            assert_eq!(kind.name(), descriptor.name);
            assert_eq!(descriptor.parameters["type"], "object");
        }
        assert!(ToolKind::from_name("rm_rf").is_none());
    }

    #[test]
    fn parse_filter_aggregate_pipeline() {
        let mut ctx = ctx_with_csv();
        let parsed = run_sync(
            ToolKind::ParseFile,
            json!({"file_id": "raw", "file_type": "csv", "df_id": "scores"}),
            &mut ctx,
        );
        assert_eq!(parsed["success"], true);
        assert_eq!(parsed["shape"], json!([3, 2]));

        let filtered = run_sync(
            ToolKind::FilterData,
            json!({
                "df_id": "scores",
                "conditions": [{"column": "team", "operator": "==", "value": "red"}],
                "result_id": "red"
            }),
            &mut ctx,
        );
        assert_eq!(filtered["shape"], json!([2, 2]));

        let total = run_sync(
            ToolKind::AggregateData,
            json!({"df_id": "red", "operations": {"score": "sum"}, "result_id": "total"}),
            &mut ctx,
        );
        assert_eq!(total["result"], json!({"score": 7}));
        assert_eq!(ctx.result("total"), Some(&json!({"score": 7})));

        let value = run_sync(
            ToolKind::GetValue,
            json!({"result_id": "scores", "path": "score"}),
            &mut ctx,
        );
        assert_eq!(value["value"], json!([3, 5, 4]));
    }

    #[test]
    fn failures_are_reported_not_raised() {
        let mut ctx = ctx_with_csv();
        let result = run_sync(
            ToolKind::ParseFile,
            json!({"file_id": "raw", "file_type": "pdf", "df_id": "x"}),
            &mut ctx,
        );
        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().unwrap().contains("PDF"));

        let result = run_sync(
            ToolKind::AnalyzeData,
            json!({"df_id": "nope", "analysis_type": "sort", "result_id": "y"}),
            &mut ctx,
        );
        assert_eq!(result["success"], false);
    }

    #[test]
    fn chart_is_stored_as_data_uri_result() {
        let mut ctx = ctx_with_csv();
        run_sync(
            ToolKind::ParseFile,
            json!({"file_id": "raw", "file_type": "csv", "df_id": "scores"}),
            &mut ctx,
        );
        let chart = run_sync(
            ToolKind::CreateChart,
            json!({"df_id": "scores", "chart_type": "bar", "config": {"x": "team", "y": "score"}, "result_id": "chart"}),
            &mut ctx,
        );
        assert_eq!(chart["success"], true);
        let stored = ctx.result("chart").and_then(JsonValue::as_str).unwrap();
        assert!(stored.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn pdf_tables_and_text_are_parsed() {
        use crate::services::pdf::tests::sample_pdf;

        let mut ctx = ExecutionContext::new();
        ctx.put_file(
            "report",
            sample_pdf(&[&["Notes only"], &["item  qty", "bolts  40", "nuts  2"]]),
        );

        let parsed = run_sync(
            ToolKind::ParseFile,
            json!({"file_id": "report", "file_type": "pdf", "df_id": "items"}),
            &mut ctx,
        );
        assert_eq!(parsed["success"], true, "{}", parsed);
        let table = ctx.table("items").unwrap();
        assert_eq!(table.columns, vec!["item", "qty"]);
        assert_eq!(table.numeric_column("qty").unwrap(), vec![40.0, 2.0]);

        let text = run_sync(
            ToolKind::ParseFile,
            json!({"file_id": "report", "file_type": "pdf", "df_id": "cover", "options": {"page": 1}}),
            &mut ctx,
        );
        assert_eq!(text["success"], true);
        assert!(ctx.result("cover").and_then(JsonValue::as_str).unwrap().contains("Notes only"));

        let out_of_range = run_sync(
            ToolKind::ParseFile,
            json!({"file_id": "report", "file_type": "pdf", "df_id": "x", "options": {"page": 9}}),
            &mut ctx,
        );
        assert_eq!(out_of_range["success"], false);
    }

    #[test]
    fn image_sniffing() {
        assert_eq!(sniff_image_mime(b"\x89PNG\r\n\x1a\nrest"), Some("image/png"));
        assert_eq!(sniff_image_mime(b"<svg xmlns='x'></svg>"), Some("image/svg+xml"));
        assert_eq!(sniff_image_mime(b"team,score"), None);
        assert_eq!(sniff_audio_format(b"RIFF\0\0\0\0WAVEfmt "), "wav");

        let mut ctx = ctx_with_csv();
        let result = run_sync(
            ToolKind::ProcessImage,
            json!({"file_id": "raw", "image_id": "img"}),
            &mut ctx,
        );
        assert_eq!(result["success"], false);
    }
}
