//! Snapshot byte codec.
//!
//! A snapshot is the versioned, self-describing serialization of a model,
//! exchanged between devices and the aggregator:
//!
//! ```text
//! MAGIC (4 bytes) | VERSION (u32) | ORDER n (u32) | SMOOTHING α (f64)
//! | VOCAB_COUNT (u32) | [token_len(u32), token_bytes(utf8), count(u64)] × VOCAB_COUNT
//! | CONTEXT_COUNT (u32) | [ctx_len(u32), ctx_tokens(…), NEXT_COUNT(u32),
//!     [token_len, token_bytes, count] × NEXT_COUNT] × CONTEXT_COUNT
//! | WORD_COUNT (u64) | TOTAL_WORDS (u64)
//! ```
//!
//! All integers are little-endian. `token_len` is the UTF-8 byte length of
//! the token text; `ctx_len` is the number of tokens in the context key.
//! Decoding validates the magic, the version and every structural invariant
//! of the model before accepting the bytes; a schema mismatch is a hard
//! `CorruptSnapshot` error, never a silent coercion.

use std::collections::HashMap;

use super::context_stats::ContextStats;
use super::language_model::LanguageModel;
use crate::error::ModelError;

const MAGIC: &[u8; 4] = b"NWLM";
const VERSION: u32 = 1;

fn corrupt(detail: impl Into<String>) -> ModelError {
	ModelError::CorruptSnapshot(detail.into())
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
	out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
	out.extend_from_slice(&value.to_le_bytes());
}

fn put_token(out: &mut Vec<u8>, token: &str) {
	put_u32(out, token.len() as u32);
	out.extend_from_slice(token.as_bytes());
}

/// Sequential reader over a snapshot buffer.
///
/// Every read checks the remaining length, so a truncated buffer surfaces
/// as `CorruptSnapshot` instead of a panic.
struct Reader<'a> {
	bytes: &'a [u8],
	pos: usize,
}

impl<'a> Reader<'a> {
	fn new(bytes: &'a [u8]) -> Self {
		Self { bytes, pos: 0 }
	}

	fn take(&mut self, len: usize) -> Result<&'a [u8], ModelError> {
		let end = self
			.pos
			.checked_add(len)
			.filter(|end| *end <= self.bytes.len())
			.ok_or_else(|| corrupt("unexpected end of snapshot"))?;
		let slice = &self.bytes[self.pos..end];
		self.pos = end;
		Ok(slice)
	}

	fn u32(&mut self) -> Result<u32, ModelError> {
		// The 4-byte conversion cannot fail after take().
		Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
	}

	fn u64(&mut self) -> Result<u64, ModelError> {
		Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
	}

	fn f64(&mut self) -> Result<f64, ModelError> {
		Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
	}

	fn token(&mut self) -> Result<String, ModelError> {
		let len = self.u32()? as usize;
		let bytes = self.take(len)?;
		let token = std::str::from_utf8(bytes)
			.map_err(|_| corrupt("token is not valid UTF-8"))?;
		if token.is_empty() {
			return Err(corrupt("empty token"));
		}
		Ok(token.to_owned())
	}

	fn finish(&self) -> Result<(), ModelError> {
		if self.pos != self.bytes.len() {
			return Err(corrupt("trailing bytes after snapshot payload"));
		}
		Ok(())
	}
}

/// Encodes a model into snapshot bytes.
///
/// Vocabulary, context and continuation entries are written in sorted
/// order, so models with identical counts produce identical bytes no
/// matter how the counts were accumulated.
pub(crate) fn encode(model: &LanguageModel) -> Vec<u8> {
	let mut out = Vec::new();
	out.extend_from_slice(MAGIC);
	put_u32(&mut out, VERSION);
	put_u32(&mut out, model.order());
	out.extend_from_slice(&model.smoothing().to_le_bytes());

	let mut vocabulary: Vec<_> = model.vocabulary().iter().collect();
	vocabulary.sort_by(|a, b| a.0.cmp(b.0));
	put_u32(&mut out, vocabulary.len() as u32);
	for (token, count) in vocabulary {
		put_token(&mut out, token);
		put_u64(&mut out, *count);
	}

	let mut contexts: Vec<_> = model.contexts().iter().collect();
	contexts.sort_by(|a, b| a.0.cmp(b.0));
	put_u32(&mut out, contexts.len() as u32);
	for (context, stats) in contexts {
		put_u32(&mut out, context.len() as u32);
		for token in context {
			put_token(&mut out, token);
		}
		let mut continuations: Vec<_> = stats.iter().collect();
		continuations.sort_by(|a, b| a.0.cmp(b.0));
		put_u32(&mut out, continuations.len() as u32);
		for (token, count) in continuations {
			put_token(&mut out, token);
			put_u64(&mut out, count);
		}
	}

	put_u64(&mut out, model.word_count());
	put_u64(&mut out, model.total_words());
	out
}

/// Decodes snapshot bytes into a model, validating every invariant.
///
/// # Errors
/// `CorruptSnapshot` on a wrong magic or version, a truncated or oversized
/// buffer, a context at least as long as the order, a zero count, a token
/// missing from the vocabulary, a duplicate key, a non-positive smoothing
/// constant, or totals that disagree with the tables.
pub(crate) fn decode(bytes: &[u8]) -> Result<LanguageModel, ModelError> {
	let mut reader = Reader::new(bytes);

	if reader.take(4)? != MAGIC {
		return Err(corrupt("bad magic"));
	}
	let version = reader.u32()?;
	if version != VERSION {
		return Err(corrupt(format!(
			"unsupported version {} (expected {})",
			version, VERSION
		)));
	}

	let order = reader.u32()?;
	if order < 1 {
		return Err(corrupt("order must be at least 1"));
	}
	let smoothing = reader.f64()?;
	if !(smoothing.is_finite() && smoothing > 0.0) {
		return Err(corrupt("smoothing constant must be positive and finite"));
	}

	let vocab_count = reader.u32()? as usize;
	let mut vocabulary: HashMap<String, u64> = HashMap::with_capacity(vocab_count);
	for _ in 0..vocab_count {
		let token = reader.token()?;
		let count = reader.u64()?;
		if count == 0 {
			return Err(corrupt(format!("zero count for vocabulary token '{}'", token)));
		}
		if vocabulary.insert(token.clone(), count).is_some() {
			return Err(corrupt(format!("duplicate vocabulary token '{}'", token)));
		}
	}

	let context_count = reader.u32()? as usize;
	let mut contexts: HashMap<Vec<String>, ContextStats> = HashMap::with_capacity(context_count);
	for _ in 0..context_count {
		let context_len = reader.u32()? as usize;
		if context_len >= order as usize {
			return Err(corrupt(format!(
				"context of length {} in a model of order {}",
				context_len, order
			)));
		}
		let mut context = Vec::with_capacity(context_len);
		for _ in 0..context_len {
			let token = reader.token()?;
			if !vocabulary.contains_key(&token) {
				return Err(corrupt(format!("context token '{}' not in vocabulary", token)));
			}
			context.push(token);
		}

		let next_count = reader.u32()? as usize;
		if next_count == 0 {
			return Err(corrupt("context entry with no continuations"));
		}
		let mut stats = ContextStats::default();
		for _ in 0..next_count {
			let token = reader.token()?;
			if !vocabulary.contains_key(&token) {
				return Err(corrupt(format!(
					"continuation token '{}' not in vocabulary",
					token
				)));
			}
			let count = reader.u64()?;
			if count == 0 {
				return Err(corrupt(format!("zero count for continuation '{}'", token)));
			}
			let before = stats.len();
			stats.add(token.clone(), count);
			if stats.len() == before {
				return Err(corrupt(format!("duplicate continuation token '{}'", token)));
			}
		}

		if contexts.insert(context, stats).is_some() {
			return Err(corrupt("duplicate context key"));
		}
	}

	let word_count = reader.u64()?;
	let total_words = reader.u64()?;
	reader.finish()?;

	if word_count != vocabulary.len() as u64 {
		return Err(corrupt(format!(
			"word count {} does not match vocabulary size {}",
			word_count,
			vocabulary.len()
		)));
	}
	let occurrences: u64 = vocabulary.values().sum();
	if total_words != occurrences {
		return Err(corrupt(format!(
			"total words {} does not match vocabulary occurrences {}",
			total_words, occurrences
		)));
	}

	Ok(LanguageModel::from_parts(
		order,
		smoothing,
		vocabulary,
		contexts,
		word_count,
		total_words,
	))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn trained_model() -> LanguageModel {
		let mut model = LanguageModel::new(3, 0.5);
		model.train("the cat sat on the mat the cat ran");
		model.train("a dog ran after the cat");
		model
	}

	#[test]
	fn round_trip_is_observationally_equivalent() {
		let model = trained_model();
		let restored = LanguageModel::deserialize(&model.serialize()).unwrap();

		assert_eq!(restored, model);
		assert_eq!(restored.total_words(), model.total_words());
		assert_eq!(restored.word_count(), model.word_count());
		assert_eq!(
			restored.predict_next_word("the cat", 5),
			model.predict_next_word("the cat", 5)
		);
		assert_eq!(restored.predict_next_word("", 3), model.predict_next_word("", 3));
	}

	#[test]
	fn encoding_is_canonical() {
		let model = trained_model();
		assert_eq!(model.serialize(), model.serialize());
		let restored = LanguageModel::deserialize(&model.serialize()).unwrap();
		assert_eq!(restored.serialize(), model.serialize());
	}

	#[test]
	fn corrupted_magic_is_rejected() {
		let mut bytes = trained_model().serialize();
		bytes[0..4].copy_from_slice(b"XXXX");
		match LanguageModel::deserialize(&bytes) {
			Err(ModelError::CorruptSnapshot(detail)) => assert!(detail.contains("magic")),
			other => panic!("expected CorruptSnapshot, got {:?}", other),
		}
	}

	#[test]
	fn unsupported_version_is_rejected() {
		let mut bytes = trained_model().serialize();
		bytes[4..8].copy_from_slice(&9u32.to_le_bytes());
		assert!(matches!(
			LanguageModel::deserialize(&bytes),
			Err(ModelError::CorruptSnapshot(_))
		));
	}

	#[test]
	fn truncated_buffer_is_rejected() {
		let bytes = trained_model().serialize();
		for len in [0, 3, 10, bytes.len() / 2, bytes.len() - 1] {
			assert!(
				matches!(
					LanguageModel::deserialize(&bytes[..len]),
					Err(ModelError::CorruptSnapshot(_))
				),
				"truncation at {} accepted",
				len
			);
		}
	}

	#[test]
	fn trailing_bytes_are_rejected() {
		let mut bytes = trained_model().serialize();
		bytes.push(0);
		match LanguageModel::deserialize(&bytes) {
			Err(ModelError::CorruptSnapshot(detail)) => assert!(detail.contains("trailing")),
			other => panic!("expected CorruptSnapshot, got {:?}", other),
		}
	}

	#[test]
	fn zero_vocabulary_count_is_rejected() {
		// Order-1 model over one token: the count sits at a fixed offset
		// (magic 4, version 4, order 4, smoothing 8, vocab count 4,
		// token_len 4, token 1).
		let mut model = LanguageModel::new(1, 1.0);
		model.train("a");
		let mut bytes = model.serialize();
		bytes[29..37].copy_from_slice(&0u64.to_le_bytes());
		match LanguageModel::deserialize(&bytes) {
			Err(ModelError::CorruptSnapshot(detail)) => assert!(detail.contains("zero count")),
			other => panic!("expected CorruptSnapshot, got {:?}", other),
		}
	}

	#[test]
	fn oversized_context_is_rejected() {
		// Hand-built snapshot for an order-1 model carrying a one-token
		// context, which an order-1 model must never store.
		let mut bytes = Vec::new();
		bytes.extend_from_slice(MAGIC);
		put_u32(&mut bytes, VERSION);
		put_u32(&mut bytes, 1); // order
		bytes.extend_from_slice(&1.0f64.to_le_bytes());
		put_u32(&mut bytes, 1); // vocab count
		put_token(&mut bytes, "a");
		put_u64(&mut bytes, 1);
		put_u32(&mut bytes, 1); // context count
		put_u32(&mut bytes, 1); // ctx_len == order
		put_token(&mut bytes, "a");
		put_u32(&mut bytes, 1);
		put_token(&mut bytes, "a");
		put_u64(&mut bytes, 1);
		put_u64(&mut bytes, 1); // word count
		put_u64(&mut bytes, 1); // total words

		match decode(&bytes) {
			Err(ModelError::CorruptSnapshot(detail)) => assert!(detail.contains("order")),
			other => panic!("expected CorruptSnapshot, got {:?}", other),
		}
	}

	#[test]
	fn continuation_outside_vocabulary_is_rejected() {
		let mut bytes = Vec::new();
		bytes.extend_from_slice(MAGIC);
		put_u32(&mut bytes, VERSION);
		put_u32(&mut bytes, 1);
		bytes.extend_from_slice(&1.0f64.to_le_bytes());
		put_u32(&mut bytes, 1);
		put_token(&mut bytes, "a");
		put_u64(&mut bytes, 1);
		put_u32(&mut bytes, 1);
		put_u32(&mut bytes, 0); // empty context
		put_u32(&mut bytes, 1);
		put_token(&mut bytes, "b"); // never declared in the vocabulary
		put_u64(&mut bytes, 1);
		put_u64(&mut bytes, 1);
		put_u64(&mut bytes, 1);

		match decode(&bytes) {
			Err(ModelError::CorruptSnapshot(detail)) => {
				assert!(detail.contains("not in vocabulary"))
			}
			other => panic!("expected CorruptSnapshot, got {:?}", other),
		}
	}

	#[test]
	fn inconsistent_totals_are_rejected() {
		let model = trained_model();
		let bytes = model.serialize();

		// Patch TOTAL_WORDS (the final u64).
		let mut patched = bytes.clone();
		let at = patched.len() - 8;
		patched[at..].copy_from_slice(&(model.total_words() + 1).to_le_bytes());
		assert!(matches!(
			LanguageModel::deserialize(&patched),
			Err(ModelError::CorruptSnapshot(_))
		));

		// Patch WORD_COUNT (the u64 before it).
		let mut patched = bytes;
		let at = patched.len() - 16;
		patched[at..at + 8].copy_from_slice(&(model.word_count() + 1).to_le_bytes());
		assert!(matches!(
			LanguageModel::deserialize(&patched),
			Err(ModelError::CorruptSnapshot(_))
		));
	}
}
