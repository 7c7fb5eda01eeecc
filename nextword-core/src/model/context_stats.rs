use std::collections::HashMap;

use rand::Rng;

/// Observed continuations for a single context.
///
/// A `ContextStats` stores every next-token observed after one fixed context
/// (the table owning this value holds the context key) together with its
/// occurrence count.
///
/// ## Invariants
/// - Every stored count is strictly positive; a count of zero is expressed
///   by the token being absent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContextStats {
	/// Occurrence count per observed next-token.
	/// Example: { "cat" => 2, "mat" => 1 }
	continuations: HashMap<String, u64>,
}

impl ContextStats {
	/// Records one occurrence of `next_token` after this context.
	pub fn record(&mut self, next_token: &str) {
		if let Some(count) = self.continuations.get_mut(next_token) {
			*count += 1;
		} else {
			self.continuations.insert(next_token.to_owned(), 1);
		}
	}

	/// Adds `count` occurrences of `next_token`. Used by the snapshot
	/// decoder and by merge, where counts arrive pre-aggregated.
	pub fn add(&mut self, next_token: String, count: u64) {
		*self.continuations.entry(next_token).or_insert(0) += count;
	}

	/// Total number of observations across all continuations.
	pub fn total(&self) -> u64 {
		self.continuations.values().sum()
	}

	/// Number of distinct observed continuations.
	pub fn len(&self) -> usize {
		self.continuations.len()
	}

	pub fn is_empty(&self) -> bool {
		self.continuations.is_empty()
	}

	/// Iterates over `(next_token, count)` pairs in arbitrary order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
		self.continuations.iter().map(|(token, count)| (token.as_str(), *count))
	}

	/// Merges another context's continuations into this one.
	///
	/// Occurrence counts are summed; tokens unseen here are inserted with
	/// the other side's count.
	pub fn merge(&mut self, other: &Self) {
		for (next_token, count) in &other.continuations {
			*self.continuations.entry(next_token.clone()).or_insert(0) += *count;
		}
	}

	/// Picks a continuation by weighted random sampling.
	///
	/// The probability of a token is proportional to its occurrence count.
	/// Returns `None` if there are no continuations.
	pub fn sample(&self) -> Option<&str> {
		if self.continuations.is_empty() {
			return None;
		}

		let total = self.total();
		let mut r = rand::rng().random_range(0..total);

		let mut fallback: Option<&str> = None;
		for (next_token, count) in &self.continuations {
			if r < *count {
				return Some(next_token);
			}
			r -= count;
			fallback = Some(next_token);
		}

		// Unreachable while counts stay positive, but kept for safety.
		fallback
	}
}
