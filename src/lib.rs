use std::time::Duration;

use rand::RngExt;

pub mod config;
pub mod crawler;
pub mod dom;
pub mod llm;
pub mod login;
pub mod submit;

/// Fixed answer text substituted when the LLM call fails.
pub const FALLBACK_ANSWER: &str = "当前服务暂不可用，请稍后再试";

/// Outcome of one answer-generation attempt.
///
/// `Fallback` carries no text of its own: the substituted answer is always
/// [`FALLBACK_ANSWER`], so callers can tell a degraded answer from a real one
/// without comparing strings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AnswerOutcome {
	Generated(String),
	Fallback,
}

impl AnswerOutcome {
	/// The text that gets submitted as the answer.
	pub fn text(&self) -> &str {
		match self {
			AnswerOutcome::Generated(text) => text,
			AnswerOutcome::Fallback => FALLBACK_ANSWER,
		}
	}

	pub fn is_fallback(&self) -> bool {
		matches!(self, AnswerOutcome::Fallback)
	}
}

/// Draw a pacing delay in whole seconds.
///
/// With randomization enabled the value is uniform in `[base/2, base*3/2]`
/// inclusive; otherwise `base` is returned unchanged.
pub fn jitter_secs(base: u64, randomized: bool) -> u64 {
	if !randomized || base == 0 {
		return base;
	}
	rand::rng().random_range(base / 2..=base + base / 2)
}

/// Immutable view of the configured interaction delay.
///
/// Every read draws a fresh jitter value when randomization is on, so
/// consecutive pauses do not repeat the same interval.
#[derive(Clone, Copy, Debug)]
pub struct Pacing {
	base_secs: u64,
	randomized: bool,
}

impl Pacing {
	pub fn new(base_secs: u64, randomized: bool) -> Self {
		Self { base_secs, randomized }
	}

	/// Full delay, applied after publishing an answer.
	pub fn full(&self) -> Duration {
		Duration::from_secs(jitter_secs(self.base_secs, self.randomized))
	}

	/// Half delay, applied around filling the answer textbox.
	pub fn half(&self) -> Duration {
		Duration::from_secs(jitter_secs(self.base_secs, self.randomized) / 2)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn jitter_stays_in_inclusive_range() {
		for _ in 0..500 {
			let v = jitter_secs(10, true);
			assert!((5..=15).contains(&v), "jitter_secs(10, true) produced {v}");
		}
	}

	#[test]
	fn jitter_disabled_returns_base() {
		assert_eq!(jitter_secs(10, false), 10);
		assert_eq!(jitter_secs(0, false), 0);
	}

	#[test]
	fn jitter_zero_base_stays_zero() {
		assert_eq!(jitter_secs(0, true), 0);
	}

	#[test]
	fn pacing_without_randomization_is_fixed() {
		let pacing = Pacing::new(10, false);
		assert_eq!(pacing.full(), Duration::from_secs(10));
		assert_eq!(pacing.half(), Duration::from_secs(5));
	}

	#[test]
	fn outcome_text_and_fallback_flag() {
		let generated = AnswerOutcome::Generated("光合作用将光能转化为化学能".to_string());
		assert_eq!(generated.text(), "光合作用将光能转化为化学能");
		assert!(!generated.is_fallback());

		let fallback = AnswerOutcome::Fallback;
		assert_eq!(fallback.text(), FALLBACK_ANSWER);
		assert!(fallback.is_fallback());
	}
}
