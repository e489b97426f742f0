//! Answer generation against an OpenAI-compatible chat-completions endpoint.

use std::time::Duration;

use color_eyre::{Result, eyre::eyre};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{AnswerOutcome, config::AppConfig};

/// System instruction sent with every completion request.
const SYSTEM_PROMPT: &str = "请用简练中文回答，避免敏感内容";

/// Transport budget for one completion request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct ChatRequest<'a> {
	model: &'a str,
	messages: Vec<ChatMessage>,
	temperature: f32,
	max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
	role: &'static str,
	content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
	choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
	message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
	content: String,
}

/// Turns a question into an answer via a single LLM completion call.
pub struct AnswerGenerator {
	http: reqwest::Client,
	api_key: String,
	base_url: String,
	model: String,
	temperature: f32,
	max_tokens: u32,
}

impl AnswerGenerator {
	pub fn new(config: &AppConfig) -> Result<Self> {
		let http = reqwest::Client::builder()
			.timeout(REQUEST_TIMEOUT)
			.build()
			.map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;
		Ok(Self {
			http,
			api_key: config.openai_api_key.clone(),
			base_url: config.openai_base_url.trim_end_matches('/').to_string(),
			model: config.openai_model.clone(),
			temperature: config.temperature,
			max_tokens: config.max_tokens,
		})
	}

	/// Generate an answer for a question.
	///
	/// A single attempt, no retry. Any transport or API failure is caught and
	/// mapped to [`AnswerOutcome::Fallback`]; this never errors.
	pub async fn generate(&self, question: &str) -> AnswerOutcome {
		match self.request_completion(question).await {
			Ok(raw) => {
				tracing::info!("请求成功！");
				let answer = strip_think(&raw);
				tracing::info!("回答：{}", answer);
				AnswerOutcome::Generated(answer)
			}
			Err(e) => {
				tracing::error!("API请求失败: {}", e);
				AnswerOutcome::Fallback
			}
		}
	}

	async fn request_completion(&self, question: &str) -> Result<String> {
		let request = ChatRequest {
			model: &self.model,
			messages: vec![
				ChatMessage {
					role: "system",
					content: SYSTEM_PROMPT.to_string(),
				},
				ChatMessage {
					role: "user",
					content: format!("问题：{}", question),
				},
			],
			temperature: self.temperature,
			max_tokens: self.max_tokens,
		};

		let url = format!("{}/chat/completions", self.base_url);
		let response = self
			.http
			.post(&url)
			.bearer_auth(&self.api_key)
			.json(&request)
			.send()
			.await
			.map_err(|e| eyre!("request failed: {}", e))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(eyre!("HTTP {}: {}", status, body));
		}

		let parsed: ChatResponse = response.json().await.map_err(|e| eyre!("failed to decode response: {}", e))?;
		tracing::debug!("LLM raw response: {:?}", parsed);

		let content = parsed.choices.into_iter().next().ok_or_else(|| eyre!("response contained no choices"))?.message.content;
		Ok(content)
	}
}

/// Remove every `<think>…</think>` reasoning span and trim the result.
pub fn strip_think(text: &str) -> String {
	match Regex::new(r"(?s)<think>.*?</think>") {
		Ok(re) => re.replace_all(text, "").trim().to_string(),
		Err(_) => text.trim().to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::FALLBACK_ANSWER;

	fn test_config(base_url: &str) -> AppConfig {
		AppConfig {
			openai_api_key: "sk-test".to_string(),
			openai_base_url: base_url.to_string(),
			openai_model: "deepseek-chat".to_string(),
			temperature: 0.3,
			max_tokens: 500,
			username: "13800000000".to_string(),
			password: "hunter2".to_string(),
			login_url: "https://passport.zhihuishu.com/login".to_string(),
			courses: vec![],
			question_classification: 0,
			delay_time_s: 5,
			enabled_random_time: false,
			browser_path: None,
		}
	}

	#[test]
	fn strip_think_removes_every_span_and_trims() {
		let input = "  <think>reasoning</think>Hello<think>more</think> world  ";
		assert_eq!(strip_think(input), "Hello world");
	}

	#[test]
	fn strip_think_handles_multiline_spans() {
		let input = "<think>第一行\n第二行\n第三行</think>答案是光合作用。";
		assert_eq!(strip_think(input), "答案是光合作用。");
	}

	#[test]
	fn strip_think_leaves_plain_answers_alone() {
		assert_eq!(strip_think("答案是光合作用。"), "答案是光合作用。");
	}

	#[test]
	fn strip_think_only_trims_when_no_spans() {
		assert_eq!(strip_think("   spaced out   "), "spaced out");
	}

	#[test]
	fn chat_request_wire_shape() {
		let request = ChatRequest {
			model: "deepseek-chat",
			messages: vec![
				ChatMessage {
					role: "system",
					content: SYSTEM_PROMPT.to_string(),
				},
				ChatMessage {
					role: "user",
					content: "问题：什么是人工智能？".to_string(),
				},
			],
			temperature: 0.3,
			max_tokens: 500,
		};
		let value = serde_json::to_value(&request).unwrap();
		assert_eq!(value["model"], "deepseek-chat");
		assert_eq!(value["messages"][0]["role"], "system");
		assert_eq!(value["messages"][1]["content"], "问题：什么是人工智能？");
		assert_eq!(value["max_tokens"], 500);
	}

	#[test]
	fn chat_response_decodes_first_choice() {
		let raw = r#"{"choices":[{"message":{"role":"assistant","content":"答案"}}]}"#;
		let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
		assert_eq!(parsed.choices[0].message.content, "答案");
	}

	#[tokio::test]
	async fn transport_failure_yields_the_fallback() {
		// Port 9 (discard) is not listening; the request fails fast.
		let generator = AnswerGenerator::new(&test_config("http://127.0.0.1:9")).unwrap();
		let outcome = generator.generate("什么是人工智能？").await;
		assert!(outcome.is_fallback());
		assert_eq!(outcome.text(), FALLBACK_ANSWER);
	}
}
