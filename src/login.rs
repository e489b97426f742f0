//! Login flow: fill the credential form, then pause for manual captcha entry.

use std::time::Duration;

use chromiumoxide::Page;
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};

use crate::{config::AppConfig, dom};

const NAV_TIMEOUT: Duration = Duration::from_secs(30);
const CAPTCHA_WAIT: Duration = Duration::from_secs(60);

/// Log into the platform on `page`.
///
/// Blocks until the operator finishes the captcha by hand; any failure here
/// is fatal for the whole process.
pub async fn login(page: &Page, config: &AppConfig) -> Result<()> {
	tokio::time::timeout(NAV_TIMEOUT, page.goto(config.login_url.as_str()))
		.await
		.map_err(|_| eyre!("登录超时: {}", config.login_url))?
		.map_err(|e| eyre!("登录页面加载失败: {}", e))?;
	dom::settle(page, Duration::from_secs(2)).await;

	// The landing page shows the login link only while logged out.
	let entry_script = r#"
		(function() {
			const box = document.querySelector('#notLogin');
			const link = box && box.querySelector('a');
			if (link) { link.click(); return true; }
			return false;
		})()
	"#;
	if !dom::eval_bool(page, entry_script, Duration::from_secs(10)).await? {
		bail!("未找到登录入口 #notLogin");
	}
	dom::settle(page, Duration::from_secs(2)).await;

	fill_and_submit_login_form(page, config).await?;
	tracing::warn!("请手动完成验证码验证！");

	wait_until_logged_in(page).await?;
	tracing::info!("登录成功！");
	Ok(())
}

/// Fill phone/password and click the login button.
async fn fill_and_submit_login_form(page: &Page, config: &AppConfig) -> Result<()> {
	let fill_script = format!(
		r#"
		(function() {{
			const username = document.querySelector('input[placeholder="请输入手机号"]');
			const password = document.querySelector('input[placeholder="请输入密码"], input[type="password"]');
			if (!username || !password) return false;
			for (const [field, value] of [[username, "{}"], [password, "{}"]]) {{
				field.value = value;
				field.dispatchEvent(new Event('input', {{ bubbles: true }}));
				field.dispatchEvent(new Event('change', {{ bubbles: true }}));
			}}
			return true;
		}})()
		"#,
		dom::js_string(&config.username),
		dom::js_string(&config.password)
	);
	if !dom::eval_bool(page, fill_script, dom::UI_TIMEOUT).await? {
		bail!("未找到用户名或密码输入框");
	}

	let submit_script = r#"
		(function() {
			for (const el of document.querySelectorAll('button, div, span, a')) {
				if (el.childElementCount === 0 && el.textContent.trim() === '登 录') {
					el.click();
					return true;
				}
			}
			return false;
		})()
	"#;
	if !dom::eval_bool(page, submit_script, dom::UI_TIMEOUT).await? {
		bail!("未找到登录按钮");
	}
	Ok(())
}

/// Poll for the logged-in marker while the operator solves the captcha.
async fn wait_until_logged_in(page: &Page) -> Result<()> {
	let deadline = tokio::time::Instant::now() + CAPTCHA_WAIT;
	loop {
		let logged_in = dom::eval_bool(page, "document.querySelector('#notLogin') === null", dom::UI_TIMEOUT)
			.await
			.unwrap_or(false);
		if logged_in {
			return Ok(());
		}
		if tokio::time::Instant::now() >= deadline {
			bail!("登录失败：等待验证码验证超时");
		}
		tokio::time::sleep(Duration::from_secs(1)).await;
	}
}
