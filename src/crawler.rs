//! Question crawling: load a course page and extract question texts in DOM order.

use std::time::Duration;

use chromiumoxide::Page;
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};

use crate::{config::QuestionSort, dom};

/// Course platforms can be slow; navigation gets a generous budget.
const NAV_TIMEOUT: Duration = Duration::from_secs(120);
const CONTAINER_WAIT: Duration = Duration::from_secs(60);

/// Selector for one question entry in the course discussion list.
const QUESTION_ITEM: &str = ".question-item";

/// Crawl the question list of one course page.
///
/// Failing to find any question container within the wait budget is fatal for
/// this course; individual items without a content node are skipped with a
/// warning, so the result may be empty.
pub async fn crawl(page: &Page, url: &str, sort: QuestionSort) -> Result<Vec<String>> {
	tokio::time::timeout(NAV_TIMEOUT, page.goto(url))
		.await
		.map_err(|_| eyre!("页面加载超时: {}", url))?
		.map_err(|e| eyre!("页面加载失败: {} - {}", url, e))?;
	dom::settle(page, Duration::from_secs(2)).await;

	wait_for_question_items(page).await?;

	if sort == QuestionSort::Latest {
		click_latest_tab(page).await?;
		dom::settle(page, Duration::from_secs(2)).await;
		wait_for_question_items(page).await?;
	}

	let raw = extract_question_texts(page).await?;
	let texts = sift_question_texts(raw);

	let label = match sort {
		QuestionSort::Popular => "热门",
		QuestionSort::Latest => "最新",
	};
	tracing::info!("成功解析 {} 道{}题目", texts.len(), label);
	Ok(texts)
}

/// Wait until at least one question container exists, bounded by [`CONTAINER_WAIT`].
async fn wait_for_question_items(page: &Page) -> Result<()> {
	let script = format!("document.querySelectorAll('{}').length > 0", QUESTION_ITEM);
	let deadline = tokio::time::Instant::now() + CONTAINER_WAIT;
	loop {
		if dom::eval_bool(page, script.as_str(), dom::UI_TIMEOUT).await.unwrap_or(false) {
			return Ok(());
		}
		if tokio::time::Instant::now() >= deadline {
			bail!("未检测到题目容器，请检查页面结构！");
		}
		tokio::time::sleep(Duration::from_millis(500)).await;
	}
}

/// Click the `最新` sort tab; the popular view needs no extra action.
async fn click_latest_tab(page: &Page) -> Result<()> {
	let script = r#"
		(function() {
			for (const el of document.querySelectorAll('span, div, a, li')) {
				if (el.childElementCount === 0 && el.textContent.trim() === '最新') {
					el.click();
					return true;
				}
			}
			return false;
		})()
	"#;
	if !dom::eval_bool(page, script, dom::UI_TIMEOUT).await? {
		bail!("未找到“最新”排序标签");
	}
	Ok(())
}

/// One pass over the list: per question item, its content text, or `null`
/// when the content node is missing.
async fn extract_question_texts(page: &Page) -> Result<Vec<Option<String>>> {
	let script = format!(
		r#"
		(function() {{
			const out = [];
			for (const item of document.querySelectorAll('{}')) {{
				const content = item.querySelector('.question-content.ZHIHUISHU_QZMD');
				out.push(content ? content.innerText : null);
			}}
			return JSON.stringify(out);
		}})()
		"#,
		QUESTION_ITEM
	);
	let value = dom::eval(page, script, dom::UI_TIMEOUT).await?;
	let json = value.as_str().ok_or_else(|| eyre!("question extraction returned no data"))?;
	serde_json::from_str(json).map_err(|e| eyre!("failed to decode question texts: {}", e))
}

/// Keep trimmed texts in DOM order; warn for items without a content node.
fn sift_question_texts(raw: Vec<Option<String>>) -> Vec<String> {
	let mut texts = Vec::with_capacity(raw.len());
	for entry in raw {
		match entry {
			Some(text) => texts.push(text.trim().to_string()),
			None => tracing::warn!("某个问题项未找到问题内容容器"),
		}
	}
	texts
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sift_trims_and_preserves_order() {
		let raw = vec![Some("  问题一  ".to_string()), Some("\n问题二\n".to_string())];
		assert_eq!(sift_question_texts(raw), vec!["问题一", "问题二"]);
	}

	#[test]
	fn sift_skips_items_without_content() {
		let raw = vec![Some("问题一".to_string()), None, Some("问题三".to_string())];
		assert_eq!(sift_question_texts(raw), vec!["问题一", "问题三"]);
	}

	#[test]
	fn sift_of_all_missing_is_empty_not_fatal() {
		let raw = vec![None, None];
		assert!(sift_question_texts(raw).is_empty());
	}
}
