//! Thin JS-evaluation layer over a page: run a script, get JSON back, bounded.

use std::time::Duration;

use chromiumoxide::Page;
use color_eyre::{Result, eyre::eyre};
use serde_json::Value;

/// Budget for a single UI-facing script evaluation.
pub const UI_TIMEOUT: Duration = Duration::from_secs(5);

/// Budget for waiting out an in-flight navigation.
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Evaluate a script on the page with a hard deadline, returning its JSON value.
pub async fn eval(page: &Page, script: impl Into<String>, timeout: Duration) -> Result<Value> {
	let result = tokio::time::timeout(timeout, page.evaluate(script.into()))
		.await
		.map_err(|_| eyre!("script evaluation timed out after {:?}", timeout))?
		.map_err(|e| eyre!("script evaluation failed: {}", e))?;
	Ok(result.value().cloned().unwrap_or(Value::Null))
}

/// Evaluate a script expected to return a boolean; anything else reads as `false`.
pub async fn eval_bool(page: &Page, script: impl Into<String>, timeout: Duration) -> Result<bool> {
	Ok(eval(page, script, timeout).await?.as_bool() == Some(true))
}

/// Escape text for embedding inside a double-quoted JS string literal.
pub fn js_string(text: &str) -> String {
	text.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n").replace('\r', "\\r")
}

/// Give the page a chance to reach network quiescence after a navigation or a
/// click that may trigger one. `wait_for_navigation` resolves immediately when
/// nothing is in flight, so the sleep carries the actual settling.
pub async fn settle(page: &Page, quiesce: Duration) {
	let _ = tokio::time::timeout(NAVIGATION_TIMEOUT, page.wait_for_navigation()).await;
	tokio::time::sleep(quiesce).await;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn js_string_escapes_quotes_and_backslashes() {
		assert_eq!(js_string(r#"他说："你好"\n"#), r#"他说：\"你好\"\\n"#);
	}

	#[test]
	fn js_string_escapes_newlines() {
		assert_eq!(js_string("line1\nline2\r\n"), "line1\\nline2\\r\\n");
	}

	#[test]
	fn js_string_passes_plain_text_through() {
		assert_eq!(js_string("什么是人工智能？"), "什么是人工智能？");
	}
}
