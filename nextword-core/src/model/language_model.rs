use std::collections::HashMap;

use log::{debug, info};
use serde::Serialize;

use super::context_stats::ContextStats;
use super::snapshot;
use crate::error::ModelError;

/// A single ranked prediction: the candidate token and its smoothed score.
///
/// Serializable so the embedding application can hand predictions straight
/// to its UI or IPC layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Prediction {
	pub token: String,
	pub score: f64,
}

/// Represents an n-gram model over word tokens.
///
/// The `LanguageModel` stores continuation counts for every context of
/// length 0 to `order - 1` (the empty context doubles as the global unigram
/// table) and predicts likely next words with additive smoothing and
/// shorter-suffix backoff.
///
/// # Responsibilities
/// - Accumulate vocabulary and context/continuation counts from raw text
/// - Score and rank candidate next words for a partial input
/// - Serialize to and deserialize from the versioned snapshot layout
/// - Merge with another model of the same order (federated aggregation)
///
/// # Invariants
/// - No context key is as long as `order`
/// - Every token appearing in any context entry exists in the vocabulary
///   with a count of at least 1
/// - Stored counts are strictly positive; absence means zero
/// - `word_count` equals the number of distinct vocabulary tokens and
///   `total_words` equals the sum of all vocabulary counts
#[derive(Clone, Debug, PartialEq)]
pub struct LanguageModel {
	/// The order of the model: maximum context length is `order - 1`.
	order: u32,

	/// Additive smoothing constant applied uniformly during scoring.
	smoothing: f64,

	/// Observed-occurrence count per normalized token.
	vocabulary: HashMap<String, u64>,

	/// Continuation statistics per context (up to `order - 1` tokens).
	contexts: HashMap<Vec<String>, ContextStats>,

	/// Distinct tokens seen. Cached; always `vocabulary.len()`.
	word_count: u64,

	/// Sum of all token occurrences across training.
	total_words: u64,
}

/// Splits raw text into normalized word tokens.
///
/// A token is a maximal run of alphanumeric characters, lowercased. Every
/// other character (whitespace and punctuation alike) is a boundary and is
/// never emitted as a token.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
	let mut tokens = Vec::new();
	let mut word = String::new();
	for c in text.chars() {
		if c.is_alphanumeric() {
			word.extend(c.to_lowercase());
		} else if !word.is_empty() {
			tokens.push(std::mem::take(&mut word));
		}
	}
	if !word.is_empty() {
		tokens.push(word);
	}
	tokens
}

impl LanguageModel {
	/// Creates a new empty model.
	///
	/// # Parameters
	/// - `order`: maximum n-gram size; contexts span up to `order - 1`
	///   preceding tokens. Fixed for the model's lifetime.
	/// - `smoothing`: additive smoothing constant, strictly positive.
	///
	/// # Panics
	/// Panics if `order` is 0 or `smoothing` is not a positive finite
	/// number. Both come from configuration, not from runtime data.
	pub fn new(order: u32, smoothing: f64) -> Self {
		assert!(order >= 1, "model order must be at least 1");
		assert!(
			smoothing > 0.0 && smoothing.is_finite(),
			"smoothing constant must be positive and finite"
		);
		Self {
			order,
			smoothing,
			vocabulary: HashMap::new(),
			contexts: HashMap::new(),
			word_count: 0,
			total_words: 0,
		}
	}

	/// The configured order `n`.
	pub fn order(&self) -> u32 {
		self.order
	}

	/// The additive smoothing constant.
	pub fn smoothing(&self) -> f64 {
		self.smoothing
	}

	/// Number of distinct tokens seen so far.
	pub fn word_count(&self) -> u64 {
		self.word_count
	}

	/// Total token occurrences across all training calls.
	pub fn total_words(&self) -> u64 {
		self.total_words
	}

	pub(crate) fn vocabulary(&self) -> &HashMap<String, u64> {
		&self.vocabulary
	}

	pub(crate) fn contexts(&self) -> &HashMap<Vec<String>, ContextStats> {
		&self.contexts
	}

	/// Reassembles a model from already-validated parts.
	///
	/// Only the snapshot decoder calls this; it has checked every invariant
	/// beforehand.
	pub(crate) fn from_parts(
		order: u32,
		smoothing: f64,
		vocabulary: HashMap<String, u64>,
		contexts: HashMap<Vec<String>, ContextStats>,
		word_count: u64,
		total_words: u64,
	) -> Self {
		Self { order, smoothing, vocabulary, contexts, word_count, total_words }
	}

	/// Trains the model on a block of raw text.
	///
	/// For every token position the counts of all contexts ending just
	/// before it (lengths 0 to `order - 1`, bounded by the tokens actually
	/// available) are incremented, while the vocabulary and `total_words`
	/// are incremented exactly once per position. Training is cumulative:
	/// repeating the same text doubles its counts.
	///
	/// Empty text (or text with no alphanumeric content) is a no-op.
	pub fn train(&mut self, text: &str) {
		let tokens = tokenize(text);
		if tokens.is_empty() {
			return;
		}

		let max_context = (self.order - 1) as usize;
		for i in 0..tokens.len() {
			for k in 0..=max_context.min(i) {
				let context = tokens[i - k..i].to_vec();
				self.contexts.entry(context).or_default().record(&tokens[i]);
			}

			// Token occurrence is counted once per position, not once per
			// context length, so total_words equals the token count.
			let seen = self.vocabulary.entry(tokens[i].clone()).or_insert(0);
			if *seen == 0 {
				self.word_count += 1;
			}
			*seen += 1;
			self.total_words += 1;
		}

		debug!(
			"trained on {} tokens (vocabulary {}, total {})",
			tokens.len(),
			self.word_count,
			self.total_words
		);
	}

	/// Finds the statistics for the longest observed suffix of `lookup`.
	///
	/// The empty context is present on any trained model, so backoff
	/// bottoms out at the global unigram distribution. Returns `None` only
	/// when the model has never been trained.
	fn backoff<'a>(&'a self, lookup: &[String]) -> Option<&'a ContextStats> {
		(0..=lookup.len())
			.filter_map(|from| self.contexts.get(&lookup[from..]))
			.find(|stats| !stats.is_empty())
	}

	/// Predicts the `k` most likely next words for a context.
	///
	/// The last `order - 1` context tokens are looked up, backing off to
	/// shorter suffixes until one has observed continuations. Candidates
	/// are scored with additive smoothing:
	///
	/// `score(w | ctx) = (count(ctx, w) + α) / (Σ count(ctx, ·) + α·|V|)`
	///
	/// Ties are broken by higher raw count, then lexicographic token order,
	/// so identical model state and context always yield identical results.
	///
	/// Returns at most `k` predictions; an empty vector on an untrained
	/// model or `k == 0`. Never fails, and never mutates the model.
	pub fn predict_next_word(&self, context: &str, k: usize) -> Vec<Prediction> {
		if k == 0 || self.vocabulary.is_empty() {
			return Vec::new();
		}

		let tokens = tokenize(context);
		let max_context = (self.order - 1) as usize;
		let lookup = &tokens[tokens.len().saturating_sub(max_context)..];

		let stats = match self.backoff(lookup) {
			Some(stats) => stats,
			None => return Vec::new(),
		};

		let denominator = stats.total() as f64 + self.smoothing * self.vocabulary.len() as f64;
		let mut scored: Vec<(String, u64, f64)> = stats
			.iter()
			.map(|(token, count)| {
				let score = (count as f64 + self.smoothing) / denominator;
				(token.to_owned(), count, score)
			})
			.collect();

		scored.sort_by(|a, b| {
			b.2.total_cmp(&a.2)
				.then_with(|| b.1.cmp(&a.1))
				.then_with(|| a.0.cmp(&b.0))
		});
		scored.truncate(k);

		scored
			.into_iter()
			.map(|(token, _, score)| Prediction { token, score })
			.collect()
	}

	/// Draws one next word at random, weighted by observed counts.
	///
	/// Uses the same backoff lookup as `predict_next_word`, then samples a
	/// continuation with probability proportional to its count. Returns
	/// `None` on an untrained model.
	pub fn sample_next_word(&self, context: &str) -> Option<String> {
		let tokens = tokenize(context);
		let max_context = (self.order - 1) as usize;
		let lookup = &tokens[tokens.len().saturating_sub(max_context)..];

		self.backoff(lookup)?.sample().map(str::to_owned)
	}

	/// Serializes the model into the versioned snapshot layout.
	///
	/// Entries are written in sorted order, so two models with identical
	/// counts produce identical bytes regardless of insertion history.
	pub fn serialize(&self) -> Vec<u8> {
		snapshot::encode(self)
	}

	/// Reconstructs a model from snapshot bytes.
	///
	/// # Errors
	/// Returns `CorruptSnapshot` if the magic, version, or any structural
	/// invariant is violated. Malformed input is never coerced into a
	/// partially-valid model.
	pub fn deserialize(bytes: &[u8]) -> Result<Self, ModelError> {
		snapshot::decode(bytes)
	}

	/// Merges another model's counts into this one.
	///
	/// Every context/next-token count from `other` is added to this model's
	/// tables (sum, not overwrite) and vocabulary counts are summed per
	/// token. `total_words` becomes the sum of both fields; `word_count` is
	/// re-read from the merged vocabulary, since summing the two fields
	/// would double-count tokens known to both sides.
	///
	/// Merging is commutative and associative over any set of same-order
	/// models, which lets an aggregator combine contributions in any order
	/// or incrementally.
	///
	/// # Errors
	/// Returns `IncompatibleOrder` if the orders differ; the model is left
	/// unchanged in that case.
	pub fn merge(&mut self, other: &Self) -> Result<(), ModelError> {
		if self.order != other.order {
			return Err(ModelError::IncompatibleOrder {
				expected: self.order,
				found: other.order,
			});
		}

		for (context, stats) in &other.contexts {
			if let Some(existing) = self.contexts.get_mut(context) {
				existing.merge(stats);
			} else {
				self.contexts.insert(context.clone(), stats.clone());
			}
		}

		for (token, count) in &other.vocabulary {
			*self.vocabulary.entry(token.clone()).or_insert(0) += *count;
		}

		self.total_words += other.total_words;
		self.word_count = self.vocabulary.len() as u64;

		info!(
			"merged model: vocabulary {}, total words {}",
			self.word_count, self.total_words
		);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tokenize_lowercases_and_drops_punctuation() {
		assert_eq!(
			tokenize("Hello, World! It's 42."),
			vec!["hello", "world", "it", "s", "42"]
		);
		assert!(tokenize("").is_empty());
		assert!(tokenize("?!... --").is_empty());
	}

	#[test]
	fn total_words_matches_token_count_across_calls() {
		let mut model = LanguageModel::new(3, 1.0);
		model.train("the cat sat");
		model.train("on the mat");
		assert_eq!(model.total_words(), 6);
		assert_eq!(model.word_count(), 5); // "the" repeats
	}

	#[test]
	fn train_on_empty_text_is_a_noop() {
		let mut model = LanguageModel::new(3, 1.0);
		model.train("");
		assert_eq!(model.total_words(), 0);
		assert!(model.predict_next_word("anything", 3).is_empty());
	}

	#[test]
	fn training_is_cumulative_not_idempotent() {
		let mut model = LanguageModel::new(2, 1.0);
		model.train("a b");
		model.train("a b");
		assert_eq!(model.total_words(), 4);
		let counts: std::collections::HashMap<&str, u64> =
			model.contexts()[&vec!["a".to_owned()]].iter().collect();
		assert_eq!(counts["b"], 2);
	}

	#[test]
	fn bigram_scenario_ranks_cat_above_mat() {
		let mut model = LanguageModel::new(2, 1.0);
		model.train("the cat sat on the mat the cat ran");
		let predictions = model.predict_next_word("the", 2);
		assert_eq!(predictions.len(), 2);
		// "the" -> "cat" occurs twice, "the" -> "mat" once.
		assert_eq!(predictions[0].token, "cat");
		assert!(predictions[0].score > predictions[1].score);
	}

	#[test]
	fn unseen_context_falls_back_to_unigram_order() {
		let mut model = LanguageModel::new(3, 1.0);
		model.train("b b b a a c");
		let predictions = model.predict_next_word("completely unseen words", 2);
		assert_eq!(predictions[0].token, "b");
		assert_eq!(predictions[1].token, "a");
	}

	#[test]
	fn empty_context_yields_unigram_order_without_failing() {
		let mut model = LanguageModel::new(3, 1.0);
		model.train("alpha alpha beta");
		let predictions = model.predict_next_word("", 5);
		assert_eq!(predictions[0].token, "alpha");
	}

	#[test]
	fn prediction_is_deterministic() {
		let mut model = LanguageModel::new(3, 0.5);
		model.train("one two three one two four one five");
		let first = model.predict_next_word("one two", 4);
		let second = model.predict_next_word("one two", 4);
		assert_eq!(first, second);
	}

	#[test]
	fn equal_counts_break_ties_lexicographically() {
		let mut model = LanguageModel::new(2, 1.0);
		model.train("x delta x alpha x charlie");
		let predictions = model.predict_next_word("x", 3);
		let tokens: Vec<&str> = predictions.iter().map(|p| p.token.as_str()).collect();
		assert_eq!(tokens, vec!["alpha", "charlie", "delta"]);
	}

	#[test]
	fn returns_at_most_k_predictions() {
		let mut model = LanguageModel::new(2, 1.0);
		model.train("a b c d e");
		assert!(model.predict_next_word("a", 2).len() <= 2);
		assert!(model.predict_next_word("a", 0).is_empty());
	}

	#[test]
	fn merge_rejects_order_mismatch() {
		let mut bigram = LanguageModel::new(2, 1.0);
		let trigram = LanguageModel::new(3, 1.0);
		match bigram.merge(&trigram) {
			Err(ModelError::IncompatibleOrder { expected: 2, found: 3 }) => {}
			other => panic!("expected IncompatibleOrder, got {:?}", other),
		}
	}

	#[test]
	fn merge_with_empty_model_is_identity() {
		let mut model = LanguageModel::new(2, 1.0);
		model.train("the cat sat");
		let before = model.clone();
		model.merge(&LanguageModel::new(2, 1.0)).unwrap();
		assert_eq!(model, before);
	}

	#[test]
	fn merge_sums_overlapping_and_disjoint_vocabularies() {
		let mut a = LanguageModel::new(2, 1.0);
		a.train("red green blue");
		let mut b = LanguageModel::new(2, 1.0);
		b.train("blue cyan");

		a.merge(&b).unwrap();
		// 4 unique tokens; "blue" is shared and count-summed, not duplicated.
		assert_eq!(a.word_count(), 4);
		assert_eq!(a.total_words(), 5);
		assert_eq!(a.vocabulary()["blue"], 2);
	}

	#[test]
	fn merge_is_commutative_and_associative() {
		let mut a = LanguageModel::new(2, 1.0);
		a.train("the cat sat");
		let mut b = LanguageModel::new(2, 1.0);
		b.train("the dog ran");
		let mut c = LanguageModel::new(2, 1.0);
		c.train("a cat ran far");

		// (A + B) + C
		let mut left = a.clone();
		left.merge(&b).unwrap();
		left.merge(&c).unwrap();

		// A + (B + C)
		let mut right_inner = b.clone();
		right_inner.merge(&c).unwrap();
		let mut right = a.clone();
		right.merge(&right_inner).unwrap();

		// (A + C) + B
		let mut swapped = a.clone();
		swapped.merge(&c).unwrap();
		swapped.merge(&b).unwrap();

		assert_eq!(left, right);
		assert_eq!(left, swapped);
		// Canonical encoding makes the equality visible at the byte level too.
		assert_eq!(left.serialize(), right.serialize());
	}

	#[test]
	fn sample_returns_only_observed_tokens() {
		let mut model = LanguageModel::new(2, 1.0);
		model.train("ping pong ping pong");
		for _ in 0..20 {
			let word = model.sample_next_word("ping").unwrap();
			assert_eq!(word, "pong");
		}
		assert_eq!(LanguageModel::new(2, 1.0).sample_next_word("ping"), None);
	}
}
