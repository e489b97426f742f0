//! Per-question submission: open the answer surface, verify it is still
//! answerable, generate and publish the answer.
//!
//! Opening the answer form is the fragile part. The platform usually spawns a
//! popup page, but depending on timing it may navigate in place instead. The
//! open step therefore tries, in order: waiting for a new page triggered by
//! the click, opening the question's href directly, one late scan of the
//! context's pages, and finally re-clicking with the current page treated as
//! the form. Whatever surface was acquired is released exactly once on every
//! exit path.

use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::target::TargetId;
use chromiumoxide::{Browser, Page};
use color_eyre::{Result, eyre::eyre};
use serde_json::Value;

use crate::{Pacing, dom, llm::AnswerGenerator};

/// How long to wait for a popup page after clicking a question.
const POPUP_WAIT: Duration = Duration::from_secs(10);

/// The answer surface for one question.
struct AnswerSurface {
	page: Page,
	/// A dedicated page that must be closed, as opposed to the course page
	/// reused in place.
	owned: bool,
	/// Course-list URL to restore when the surface is the course page itself.
	return_url: Option<String>,
}

impl AnswerSurface {
	fn popup(page: Page) -> Self {
		Self {
			page,
			owned: true,
			return_url: None,
		}
	}

	fn in_place(page: Page, return_url: Option<String>) -> Self {
		Self {
			page,
			owned: false,
			return_url,
		}
	}

	/// Release the surface: close an owned popup, or bring the course page
	/// back to the question list. Errors here are logged, never propagated.
	async fn release(self) {
		if self.owned {
			if let Err(e) = self.page.close().await {
				tracing::error!("关闭回答页面失败: {}", e);
			}
			return;
		}
		if let Some(url) = self.return_url {
			match self.page.goto(url.as_str()).await {
				Ok(_) => dom::settle(&self.page, Duration::from_secs(2)).await,
				Err(e) => tracing::error!("返回课程页面失败: {}", e),
			}
		}
	}
}

/// Process one question end to end. Returns whether the answer was published.
///
/// Every failure is contained: the question is skipped and the next one can
/// proceed on the same course page.
pub async fn submit_answer(browser: &Browser, page: &Page, generator: &AnswerGenerator, pacing: &Pacing, question: &str) -> bool {
	let Some(surface) = open_answer_surface(browser, page, question).await else {
		return false;
	};
	let published = drive_answer_form(&surface.page, generator, pacing, question).await;
	surface.release().await;
	published
}

/// Result of clicking a question's text locator.
struct QuestionClick {
	href: Option<String>,
}

/// Open the answer form for a question, trying each fallback in order.
async fn open_answer_surface(browser: &Browser, page: &Page, question: &str) -> Option<AnswerSurface> {
	let before = match known_targets(browser).await {
		Ok(ids) => ids,
		Err(e) => {
			tracing::error!("读取浏览器页面列表失败: {}", e);
			return None;
		}
	};
	let return_url = page.url().await.ok().flatten();

	let click = match click_question(page, question).await {
		Ok(Some(click)) => click,
		Ok(None) => {
			tracing::error!("打开回答页面失败: 未在页面上找到该问题");
			return None;
		}
		Err(e) => {
			tracing::error!("打开回答页面失败: {}", e);
			return None;
		}
	};

	// The click usually spawns a popup.
	if let Some(popup) = wait_for_new_page(browser, &before, POPUP_WAIT).await {
		return Some(AnswerSurface::popup(popup));
	}

	// No popup: open the question's href directly.
	if let Some(href) = click.href {
		match browser.new_page(href.as_str()).await {
			Ok(popup) => return Some(AnswerSurface::popup(popup)),
			Err(e) => tracing::warn!("直接打开问题链接失败: {}", e),
		}
	}

	// A popup may still have appeared after the wait ran out.
	if let Some(popup) = wait_for_new_page(browser, &before, Duration::from_secs(1)).await {
		return Some(AnswerSurface::popup(popup));
	}

	// Last resort: the first click may have navigated the course page in
	// place; re-click if nothing happened, then treat this page as the form.
	dom::settle(page, Duration::from_secs(2)).await;
	if let Some(surface) = same_page_surface(page, &return_url).await {
		return Some(surface);
	}
	if let Ok(Some(_)) = click_question(page, question).await {
		dom::settle(page, Duration::from_secs(2)).await;
		if let Some(surface) = same_page_surface(page, &return_url).await {
			return Some(surface);
		}
	}

	tracing::error!("打开回答页面失败: 所有方式均未打开问题 \"{}\"", question);
	None
}

/// The course page counts as the answer surface once its URL moved away from
/// the question list.
async fn same_page_surface(page: &Page, return_url: &Option<String>) -> Option<AnswerSurface> {
	let now_url = page.url().await.ok().flatten();
	if now_url.is_some() && &now_url != return_url {
		return Some(AnswerSurface::in_place(page.clone(), return_url.clone()));
	}
	None
}

/// Snapshot the target ids of all pages currently in the context.
async fn known_targets(browser: &Browser) -> Result<Vec<TargetId>> {
	let pages = browser.pages().await.map_err(|e| eyre!("failed to list pages: {}", e))?;
	Ok(pages.iter().map(|p| p.target_id().clone()).collect())
}

/// Poll the browser context for a page that was not present in `before`.
async fn wait_for_new_page(browser: &Browser, before: &[TargetId], wait: Duration) -> Option<Page> {
	let deadline = tokio::time::Instant::now() + wait;
	loop {
		match browser.pages().await {
			Ok(pages) =>
				if let Some(page) = pages.into_iter().find(|p| !before.contains(p.target_id())) {
					return Some(page);
				},
			Err(e) => tracing::debug!("listing pages failed: {}", e),
		}
		if tokio::time::Instant::now() >= deadline {
			return None;
		}
		tokio::time::sleep(Duration::from_millis(250)).await;
	}
}

/// Click the question's text locator. Returns the question's href when one is
/// attached; `Ok(None)` when the text cannot be located on the page.
async fn click_question(page: &Page, question: &str) -> Result<Option<QuestionClick>> {
	let script = format!(
		r#"
		(function() {{
			const wanted = "{}";
			let target = null;
			for (const el of document.querySelectorAll('.question-item, .question-item *')) {{
				if (el.textContent.trim() === wanted && (!target || target.contains(el))) {{
					target = el;
				}}
			}}
			if (!target) return null;
			const anchor = target.closest('a') || target.querySelector('a');
			const href = anchor && anchor.href ? anchor.href : null;
			target.click();
			return JSON.stringify({{ href: href }});
		}})()
		"#,
		dom::js_string(question)
	);
	let value = dom::eval(page, script, dom::UI_TIMEOUT).await?;
	let Value::String(json) = value else {
		return Ok(None);
	};
	let parsed: Value = serde_json::from_str(&json).map_err(|e| eyre!("failed to decode click result: {}", e))?;
	Ok(Some(QuestionClick {
		href: parsed["href"].as_str().map(|s| s.to_string()),
	}))
}

/// Drive the opened form: check answerability, generate, fill, publish.
async fn drive_answer_form(page: &Page, generator: &AnswerGenerator, pacing: &Pacing, question: &str) -> bool {
	dom::settle(page, Duration::from_secs(2)).await;

	match answer_button_visible(page).await {
		Ok(true) => {}
		Ok(false) => {
			tracing::warn!("没有找到“我来回答”按钮，你可能已经回答了。");
			return false;
		}
		Err(e) => {
			tracing::error!("检查“我来回答”按钮失败: {}", e);
			return false;
		}
	}

	if let Err(e) = click_answer_button(page).await {
		tracing::error!("点击“我来回答”失败: {}", e);
		return false;
	}

	// The LLM call happens only after the page confirmed the question is
	// still answerable, so already-answered questions cost nothing.
	let outcome = generator.generate(question).await;
	if outcome.is_fallback() {
		tracing::warn!("使用兜底回答提交：{}", outcome.text());
	}
	if outcome.text().is_empty() {
		tracing::error!("生成的回答为空，跳过");
		return false;
	}

	if let Err(e) = fill_answer_content(page, pacing, outcome.text()).await {
		tracing::error!("填写回答失败: {}", e);
		return false;
	}

	if let Err(e) = publish_answer(page, pacing).await {
		tracing::error!("提交回答失败: {}", e);
		return false;
	}

	tracing::info!("回答提交成功");
	true
}

/// Script locating the visible `我来回答` control, optionally clicking it.
fn answer_control_script(click: bool) -> String {
	format!(
		r#"
		(function() {{
			for (const el of document.querySelectorAll('div, span, button, a')) {{
				if (el.childElementCount !== 0 || el.textContent.trim() !== '我来回答') continue;
				const rect = el.getBoundingClientRect();
				if (rect.width === 0 || rect.height === 0) continue;
				{}
				return true;
			}}
			return false;
		}})()
		"#,
		if click { "el.click();" } else { "" }
	)
}

async fn answer_button_visible(page: &Page) -> Result<bool> {
	dom::eval_bool(page, answer_control_script(false), dom::UI_TIMEOUT).await
}

async fn click_answer_button(page: &Page) -> Result<()> {
	if !dom::eval_bool(page, answer_control_script(true), dom::UI_TIMEOUT).await? {
		return Err(eyre!("“我来回答”按钮不可见"));
	}
	Ok(())
}

/// Selector chain for the answer textbox; the platform renders it either as a
/// textarea or as a contenteditable region.
const ANSWER_BOX: &str = r#"textarea[placeholder*="请输入您的回答"], [contenteditable="true"], textarea"#;

/// Click the answer textbox, then fill it, pacing both steps with half delays.
async fn fill_answer_content(page: &Page, pacing: &Pacing, answer: &str) -> Result<()> {
	let click_script = format!(
		r#"
		(function() {{
			const box = document.querySelector('{}');
			if (!box) return false;
			box.click();
			box.focus();
			return true;
		}})()
		"#,
		ANSWER_BOX
	);
	if !dom::eval_bool(page, click_script, dom::UI_TIMEOUT).await? {
		return Err(eyre!("未找到回答输入框"));
	}
	tokio::time::sleep(pacing.half()).await;

	let fill_script = format!(
		r#"
		(function() {{
			const text = "{}";
			const box = document.querySelector('{}');
			if (!box) return false;
			if (box.isContentEditable) {{
				box.textContent = text;
			}} else {{
				box.value = text;
			}}
			box.dispatchEvent(new Event('input', {{ bubbles: true }}));
			box.dispatchEvent(new Event('change', {{ bubbles: true }}));
			return true;
		}})()
		"#,
		dom::js_string(answer),
		ANSWER_BOX
	);
	if !dom::eval_bool(page, fill_script, dom::UI_TIMEOUT).await? {
		return Err(eyre!("未找到回答输入框"));
	}
	tokio::time::sleep(pacing.half()).await;
	Ok(())
}

/// Click the publish control, then pace before moving on.
async fn publish_answer(page: &Page, pacing: &Pacing) -> Result<()> {
	let script = r#"
		(function() {
			for (const el of document.querySelectorAll('button, div, span, a')) {
				if (el.childElementCount === 0 && el.textContent.trim() === '立即发布') {
					el.click();
					return true;
				}
			}
			return false;
		})()
	"#;
	if !dom::eval_bool(page, script, dom::UI_TIMEOUT).await? {
		return Err(eyre!("未找到“立即发布”按钮"));
	}
	tokio::time::sleep(pacing.full()).await;
	Ok(())
}
