//! 推理服务 - 基础设施层
//!
//! 兼容 OpenAI API 的对话补全服务：带工具的多轮对话、图片分析、音频转写。
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 带工具调用的对话走 `create_byot`，请求和响应都是原始 JSON
//! - 图片分析走强类型的 Vision 消息

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{QuizError, Result};
use crate::models::{ChatMessage, ModelTurn, TokenUsage, ToolCall, ToolDescriptor};

/// 推理服务能力
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// 发送完整对话和工具菜单，返回模型的一轮回复
    async fn complete(
        &self,
        model: &str,
        transcript: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<ModelTurn>;

    /// 分析一张图片
    async fn analyze_image(&self, image: &[u8], mime: &str, prompt: &str) -> Result<String>;

    /// 把音频转写成文本
    ///
    /// `format` 为音频格式（如 `mp3`、`wav`）
    async fn transcribe_audio(&self, audio: &[u8], format: &str) -> Result<String>;
}

/// OpenAI 兼容的推理服务
pub struct OpenAiReasoningService {
    client: Client<OpenAIConfig>,
    vision_model: String,
    transcription_model: String,
}

impl OpenAiReasoningService {
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            vision_model: config.llm_vision_model_name.clone(),
            transcription_model: config.llm_transcription_model.clone(),
        }
    }
}

// ========== 原始 JSON 响应 ==========

#[derive(Debug, Deserialize)]
struct RawCompletion {
    #[serde(default)]
    choices: Vec<RawChoice>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Debug, Deserialize)]
struct RawChoice {
    message: RawMessage,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<RawToolCall>>,
}

#[derive(Debug, Deserialize)]
struct RawToolCall {
    id: String,
    function: RawFunction,
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct RawUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl RawCompletion {
    fn into_turn(self) -> Result<ModelTurn> {
        let usage = self.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });
        let message = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| QuizError::reasoning("推理服务返回结果为空"))?
            .message;

        Ok(ModelTurn {
            content: message.content,
            tool_calls: message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
            usage,
        })
    }
}

/// 对话记录转成 API 消息
pub fn transcript_to_json(transcript: &[ChatMessage]) -> Vec<JsonValue> {
    transcript
        .iter()
        .map(|message| match message {
            ChatMessage::System(content) => json!({ "role": "system", "content": content }),
            ChatMessage::User(content) => json!({ "role": "user", "content": content }),
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                let mut value = json!({ "role": "assistant", "content": content });
                if !tool_calls.is_empty() {
                    value["tool_calls"] = tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": { "name": call.name, "arguments": call.arguments },
                            })
                        })
                        .collect();
                }
                value
            }
            ChatMessage::Tool { call_id, content } => {
                json!({ "role": "tool", "tool_call_id": call_id, "content": content })
            }
        })
        .collect()
}

fn tools_to_json(tools: &[ToolDescriptor]) -> Vec<JsonValue> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                },
            })
        })
        .collect()
}

#[async_trait]
impl ReasoningService for OpenAiReasoningService {
    async fn complete(
        &self,
        model: &str,
        transcript: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<ModelTurn> {
        debug!("调用推理服务，模型: {}，消息数: {}", model, transcript.len());

        let mut request = json!({
            "model": model,
            "messages": transcript_to_json(transcript),
            "temperature": 0.1,
        });
        if !tools.is_empty() {
            request["tools"] = JsonValue::Array(tools_to_json(tools));
            request["tool_choice"] = json!("auto");
        }

        let response: JsonValue = self.client.chat().create_byot(request).await.map_err(|e| {
            warn!("推理服务调用失败: {}", e);
            QuizError::from(e)
        })?;

        let completion: RawCompletion = serde_json::from_value(response).map_err(|e| {
            QuizError::reasoning(format!("推理服务响应格式错误: {}", e)).with_source(e)
        })?;
        completion.into_turn()
    }

    async fn analyze_image(&self, image: &[u8], mime: &str, prompt: &str) -> Result<String> {
        let data_uri = format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(image));
        debug!("使用 Vision API，模型: {}，图片 {} 字节", self.vision_model, image.len());

        let content_parts = vec![
            ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: prompt.to_string(),
                },
            ),
            ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: data_uri,
                        detail: Some(ImageDetail::Auto),
                    },
                },
            ),
        ];

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
            .build()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.vision_model)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .max_tokens(1024u32)
            .build()?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("Vision API 调用失败: {}", e);
            QuizError::from(e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| QuizError::reasoning("Vision API 返回内容为空"))?;

        Ok(content.trim().to_string())
    }

    async fn transcribe_audio(&self, audio: &[u8], format: &str) -> Result<String> {
        debug!("转写音频，模型: {}，{} 字节", self.transcription_model, audio.len());

        let request = json!({
            "model": self.transcription_model,
            "modalities": ["text"],
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": "Transcribe this audio verbatim. Reply with the transcript only." },
                    {
                        "type": "input_audio",
                        "input_audio": {
                            "data": general_purpose::STANDARD.encode(audio),
                            "format": format,
                        },
                    },
                ],
            }],
        });

        let response: JsonValue = self.client.chat().create_byot(request).await.map_err(|e| {
            warn!("音频转写失败: {}", e);
            QuizError::from(e)
        })?;
        let completion: RawCompletion = serde_json::from_value(response)?;
        completion
            .into_turn()?
            .content
            .map(|text| text.trim().to_string())
            .ok_or_else(|| QuizError::reasoning("音频转写结果为空"))
    }
}
