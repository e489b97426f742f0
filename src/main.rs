use std::{path::PathBuf, time::Instant};

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use clap::Parser;
use color_eyre::{Result, eyre::eyre};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;
use zhihuishu_headless::{Pacing, config::AppConfig, crawler, llm::AnswerGenerator, login, submit};

#[derive(Debug, Parser)]
#[command(name = "zhihuishu_headless")]
#[command(about = "Automated question answering for zhihuishu course forums", long_about = None)]
struct Args {
	/// Path to the TOML configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with_target(false)
		.init();

	let args = Args::parse();
	let config = AppConfig::load(&args.config)?;
	let started = Instant::now();

	let (mut browser, mut handler) = Browser::launch(browser_config(&config)?).await.map_err(|e| eyre!("浏览器启动失败: {}", e))?;

	// Drain browser events so the connection does not stall.
	let handle = tokio::spawn(async move {
		while let Some(_event) = handler.next().await {}
	});

	let generator = AnswerGenerator::new(&config)?;
	let pacing = Pacing::new(config.delay_time_s, config.enabled_random_time);

	// Login happens on its own page, closed before course processing starts.
	let login_page = browser.new_page("about:blank").await.map_err(|e| eyre!("打开登录页面失败: {}", e))?;
	login::login(&login_page, &config).await?;
	if let Err(e) = login_page.close().await {
		tracing::debug!("closing login page failed: {}", e);
	}

	let total_courses = config.courses.len();
	for (index, course_url) in config.courses.iter().enumerate() {
		tracing::info!("开始处理课程 {}/{}", index + 1, total_courses);
		let page = match browser.new_page("about:blank").await {
			Ok(page) => page,
			Err(e) => {
				tracing::error!("课程处理失败: {} - 打开页面失败: {}", course_url, e);
				continue;
			}
		};
		match run_course(&browser, &page, &config, &generator, &pacing, course_url).await {
			Ok(()) => tracing::info!("成功完成课程: {}", course_url),
			Err(e) => tracing::error!("课程处理失败: {} - {}", course_url, e),
		}
		if let Err(e) = page.close().await {
			tracing::debug!("closing course page failed: {}", e);
		}
	}

	if let Err(e) = browser.close().await {
		tracing::debug!("closing browser failed: {}", e);
	}
	handle.abort();

	print_banner(started.elapsed());
	Ok(())
}

/// Crawl one course and submit an answer for every crawled question.
async fn run_course(browser: &Browser, page: &Page, config: &AppConfig, generator: &AnswerGenerator, pacing: &Pacing, course_url: &str) -> Result<()> {
	let questions = crawler::crawl(page, course_url, config.sort()).await?;
	let total = questions.len();
	for (index, question) in questions.iter().enumerate() {
		tracing::info!("处理中：{}/{}", index + 1, total);
		tracing::info!("问题{}：{}", index + 1, question);
		if !submit::submit_answer(browser, page, generator, pacing, question).await {
			tracing::warn!("问题{}处理失败，跳过", index + 1);
		}
	}
	Ok(())
}

/// Headed launch with anti-automation flags: the operator must see the page
/// to solve the captcha.
fn browser_config(config: &AppConfig) -> Result<BrowserConfig> {
	let mut builder = BrowserConfig::builder().with_head().args(vec![
		"--disable-blink-features=AutomationControlled",
		"--disable-backgrounding-occluded-windows",
		"--disable-renderer-backgrounding",
	]);
	if let Some(path) = &config.browser_path {
		builder = builder.chrome_executable(path);
	}
	builder.build().map_err(|e| eyre!("浏览器配置构建失败: {}", e))
}

/// Completion banner with the total elapsed time.
fn print_banner(elapsed: std::time::Duration) {
	println!("\n==============================");
	println!("    问答任务已完成 [✓]");
	println!("==============================");
	println!("完成时间: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
	println!("总耗时: {:.1} 秒", elapsed.as_secs_f64());
}
