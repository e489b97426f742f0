use std::path::Path;

use color_eyre::{Result, eyre::eyre};
use serde::Deserialize;

/// Process-wide settings. Loaded once at startup; immutable afterward.
#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
	pub openai_api_key: String,
	/// OpenAI-compatible endpoint base (default: the official API)
	#[serde(default = "default_openai_base_url")]
	pub openai_base_url: String,
	pub openai_model: String,
	/// Sampling temperature for answer generation (default: 0.3)
	#[serde(default = "default_temperature")]
	pub temperature: f32,
	/// Completion token limit per answer (default: 500)
	#[serde(default = "default_max_tokens")]
	pub max_tokens: u32,
	pub username: String,
	pub password: String,
	pub login_url: String,
	/// Course pages to process, in order
	pub courses: Vec<String>,
	/// 0 = popular questions, anything else = latest (default: 0)
	#[serde(default)]
	pub question_classification: u32,
	/// Base interaction delay in seconds (default: 5)
	#[serde(default = "default_delay_time_s")]
	pub delay_time_s: u64,
	/// Draw a fresh jittered delay on every pause (default: false)
	#[serde(default)]
	pub enabled_random_time: bool,
	/// Chromium executable to launch; system default when unset
	#[serde(default)]
	pub browser_path: Option<String>,
}

fn default_openai_base_url() -> String {
	"https://api.openai.com/v1".to_string()
}

fn default_temperature() -> f32 {
	0.3
}

fn default_max_tokens() -> u32 {
	500
}

fn default_delay_time_s() -> u64 {
	5
}

/// Which question-list view to crawl per course.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QuestionSort {
	Popular,
	Latest,
}

impl AppConfig {
	pub fn load(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path).map_err(|e| eyre!("配置文件读取失败: {} - {}", path.display(), e))?;
		let config: AppConfig = toml::from_str(&raw).map_err(|e| eyre!("配置文件解析失败: {} - {}", path.display(), e))?;
		Ok(config)
	}

	pub fn sort(&self) -> QuestionSort {
		if self.question_classification == 0 { QuestionSort::Popular } else { QuestionSort::Latest }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MINIMAL: &str = r#"
		openai_api_key = "sk-test"
		openai_model = "deepseek-chat"
		username = "13800000000"
		password = "hunter2"
		login_url = "https://passport.zhihuishu.com/login"
		courses = ["https://qah5.zhihuishu.com/qa.html#/web/home/1001"]
	"#;

	#[test]
	fn minimal_config_gets_defaults() {
		let config: AppConfig = toml::from_str(MINIMAL).unwrap();
		assert_eq!(config.openai_base_url, "https://api.openai.com/v1");
		assert_eq!(config.temperature, 0.3);
		assert_eq!(config.max_tokens, 500);
		assert_eq!(config.question_classification, 0);
		assert_eq!(config.delay_time_s, 5);
		assert!(!config.enabled_random_time);
		assert!(config.browser_path.is_none());
	}

	#[test]
	fn full_config_round_trips() {
		let raw = r#"
			openai_api_key = "sk-test"
			openai_base_url = "https://api.deepseek.com/v1"
			openai_model = "deepseek-reasoner"
			temperature = 0.7
			max_tokens = 1024
			username = "13800000000"
			password = "hunter2"
			login_url = "https://passport.zhihuishu.com/login"
			courses = ["https://a.example/1", "https://a.example/2"]
			question_classification = 1
			delay_time_s = 8
			enabled_random_time = true
			browser_path = "/usr/bin/chromium"
		"#;
		let config: AppConfig = toml::from_str(raw).unwrap();
		assert_eq!(config.openai_base_url, "https://api.deepseek.com/v1");
		assert_eq!(config.courses.len(), 2);
		assert_eq!(config.delay_time_s, 8);
		assert!(config.enabled_random_time);
		assert_eq!(config.browser_path.as_deref(), Some("/usr/bin/chromium"));
	}

	#[test]
	fn classification_maps_to_sort() {
		let mut config: AppConfig = toml::from_str(MINIMAL).unwrap();
		assert_eq!(config.sort(), QuestionSort::Popular);
		config.question_classification = 1;
		assert_eq!(config.sort(), QuestionSort::Latest);
		config.question_classification = 7;
		assert_eq!(config.sort(), QuestionSort::Latest);
	}

	#[test]
	fn missing_required_field_is_an_error() {
		let raw = r#"
			openai_api_key = "sk-test"
			openai_model = "deepseek-chat"
		"#;
		assert!(toml::from_str::<AppConfig>(raw).is_err());
	}
}
