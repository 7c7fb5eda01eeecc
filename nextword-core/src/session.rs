//! Prediction sessions.
//!
//! A `PredictionSession` owns one `LanguageModel`, buffers the text a user
//! types, retrains once the buffer crosses a threshold, and exports
//! snapshots for the aggregator. Persistence goes through the
//! `SnapshotStore` seam so the core never assumes a filesystem; the bundled
//! `FileStore` writes snapshots atomically for embedders that want one.
//!
//! A session has a single logical owner: callers that share one across
//! threads must guard it with a lock, since flush mutates the counts that
//! predict and export read.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::error::ModelError;
use crate::model::language_model::{LanguageModel, Prediction};

/// Tunable session parameters.
///
/// Deserializable so the embedding application can ship tuning as plain
/// configuration instead of recompiling.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	/// N-gram order of a freshly constructed model.
	pub order: u32,
	/// Additive smoothing constant of a freshly constructed model.
	pub smoothing: f64,
	/// Number of buffered entries that triggers a flush.
	pub flush_threshold: usize,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self { order: 3, smoothing: 1.0, flush_threshold: 100 }
	}
}

/// Destination for persisted snapshots.
///
/// Implementations receive the already-serialized bytes; they decide where
/// those bytes live. Failures propagate back through `flush`, which keeps
/// the session buffer intact for a retry.
pub trait SnapshotStore {
	/// Durably stores one snapshot, replacing any previous one.
	fn persist(&mut self, snapshot: &[u8]) -> io::Result<()>;

	/// The storage location, if the store has one the embedder can use.
	fn location(&self) -> Option<&Path> {
		None
	}
}

/// Snapshot store backed by a single file.
///
/// Writes go to a temporary file in the target directory which is then
/// renamed over the destination, so a crash mid-write never leaves a
/// half-written snapshot behind.
pub struct FileStore {
	path: PathBuf,
}

impl FileStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

impl SnapshotStore for FileStore {
	fn persist(&mut self, snapshot: &[u8]) -> io::Result<()> {
		let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
		fs::create_dir_all(parent)?;

		let mut temp = NamedTempFile::new_in(parent)?;
		temp.write_all(snapshot)?;
		temp.persist(&self.path)?;
		Ok(())
	}

	fn location(&self) -> Option<&Path> {
		Some(&self.path)
	}
}

/// One user's prediction session.
///
/// # Responsibilities
/// - Buffer ingested text and retrain the model at the flush threshold
/// - Serve next-word predictions from the current model
/// - Export snapshots for the aggregator and load snapshots back
///
/// # Invariants
/// - The buffer only shrinks when its text has been trained and persisted;
///   a failed flush keeps every entry (at-least-once training).
/// - Loading replaces the model atomically: on any error the previous
///   model is untouched.
pub struct PredictionSession {
	model: LanguageModel,
	buffer: Vec<String>,
	flush_threshold: usize,
	store: Option<Box<dyn SnapshotStore>>,
}

impl PredictionSession {
	/// Creates a session with a fresh model.
	pub fn new(config: SessionConfig) -> Self {
		Self {
			model: LanguageModel::new(config.order, config.smoothing),
			buffer: Vec::new(),
			flush_threshold: config.flush_threshold.max(1),
			store: None,
		}
	}

	/// Creates a session, restoring the model from a snapshot if one is
	/// given.
	///
	/// # Errors
	/// Propagates `CorruptSnapshot` verbatim when the snapshot does not
	/// decode; the caller decides whether to fall back to `new`.
	pub fn create(snapshot: Option<&[u8]>, config: SessionConfig) -> Result<Self, ModelError> {
		let mut session = Self::new(config);
		if let Some(bytes) = snapshot {
			session.model = LanguageModel::deserialize(bytes)?;
			info!(
				"session restored from snapshot: vocabulary {}, total words {}",
				session.model.word_count(),
				session.model.total_words()
			);
		}
		Ok(session)
	}

	/// Attaches a snapshot store that every successful flush writes to.
	pub fn with_store(mut self, store: Box<dyn SnapshotStore>) -> Self {
		self.store = Some(store);
		self
	}

	/// Read-only view of the current model.
	pub fn model(&self) -> &LanguageModel {
		&self.model
	}

	/// Number of entries waiting in the buffer.
	pub fn buffered_entries(&self) -> usize {
		self.buffer.len()
	}

	/// Where flushed snapshots are persisted, if a store with a location
	/// is attached. The embedding layer owns any further path handling.
	pub fn persist_path(&self) -> Option<&Path> {
		self.store.as_ref().and_then(|store| store.location())
	}

	/// Buffers a piece of user text, flushing once the threshold is hit.
	///
	/// Empty text is ignored. A failed flush leaves the buffer (including
	/// this entry) in place; the error is the store's, surfaced verbatim.
	pub fn ingest(&mut self, text: &str) -> Result<(), ModelError> {
		if text.is_empty() {
			return Ok(());
		}

		self.buffer.push(text.to_owned());
		debug!("buffered entry {}/{}", self.buffer.len(), self.flush_threshold);

		if self.buffer.len() >= self.flush_threshold {
			self.flush()?;
		}
		Ok(())
	}

	/// Trains on the buffered text and clears the buffer.
	///
	/// The buffered entries are joined with single spaces and trained in
	/// one call. The model swap, the persistence write and the buffer
	/// clear happen together or not at all: a persistence failure leaves
	/// both the model and the buffer as they were, so the next flush
	/// retries the same text.
	///
	/// A no-op on an empty buffer. Callable at any time, e.g. to force
	/// training before shutdown.
	pub fn flush(&mut self) -> Result<(), ModelError> {
		if self.buffer.is_empty() {
			return Ok(());
		}

		let combined = self.buffer.join(" ");
		let mut trained = self.model.clone();
		trained.train(&combined);

		if let Some(store) = self.store.as_mut() {
			if let Err(error) = store.persist(&trained.serialize()) {
				warn!(
					"flush failed, keeping {} buffered entries: {}",
					self.buffer.len(),
					error
				);
				return Err(error.into());
			}
		}

		self.model = trained;
		self.buffer.clear();
		info!(
			"flushed session: vocabulary {}, total words {}",
			self.model.word_count(),
			self.model.total_words()
		);
		Ok(())
	}

	/// Predicts the `k` most likely next words for the given context.
	///
	/// Buffered-but-unflushed text does not influence predictions.
	pub fn predict(&self, context: &str, k: usize) -> Vec<Prediction> {
		self.model.predict_next_word(context, k)
	}

	/// Draws one continuation at random, weighted by learned counts.
	pub fn sample(&self, context: &str) -> Option<String> {
		self.model.sample_next_word(context)
	}

	/// Serializes the current model for the external transport layer.
	///
	/// Read-only; may be called at any time, including mid-buffer, in
	/// which case unflushed entries are simply not part of the export.
	pub fn export_snapshot(&self) -> Vec<u8> {
		self.model.serialize()
	}

	/// Replaces the held model with one decoded from `bytes`.
	///
	/// # Errors
	/// Fails with `CorruptSnapshot` exactly as `LanguageModel::deserialize`
	/// does, in which case the previous model is retained unchanged.
	pub fn load(&mut self, bytes: &[u8]) -> Result<(), ModelError> {
		let model = LanguageModel::deserialize(bytes)?;
		self.model = model;
		info!(
			"session loaded snapshot: vocabulary {}, total words {}",
			self.model.word_count(),
			self.model.total_words()
		);
		Ok(())
	}
}
