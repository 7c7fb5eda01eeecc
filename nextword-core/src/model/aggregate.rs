use std::sync::mpsc;
use std::thread;

use log::{debug, info};

use super::language_model::LanguageModel;
use crate::error::ModelError;

/// Merges many exported snapshots into one model.
///
/// # Parameters
/// - `blobs`: raw snapshot bytes, one entry per contributing device.
///
/// # Returns
/// - `Ok(Some(model))`: every snapshot decoded and merged.
/// - `Ok(None)`: `blobs` was empty.
/// - `Err(...)`: a contributor failed to decode or had a mismatched order.
///
/// # Behavior
/// - Splits the snapshots into chunks (one per available CPU core).
/// - Spawns a thread per chunk; each decodes its snapshots and folds them
///   into a partial model.
/// - Partial models drain through an MPSC channel and are merged
///   sequentially into the final model.
///
/// Splitting is sound because merge is commutative and associative: any
/// grouping of the same snapshots produces identical counts. The first
/// snapshot encountered fixes the expected order (and the smoothing
/// constant of the result); any other order aborts the whole aggregation,
/// since silently dropping a contributor would corrupt the aggregate.
pub fn merge_snapshots(blobs: Vec<Vec<u8>>) -> Result<Option<LanguageModel>, ModelError> {
	if blobs.is_empty() {
		return Ok(None);
	}

	let cpus = num_cpus::get().max(1);
	let chunk_size = blobs.len().div_ceil(cpus);
	debug!(
		"aggregating {} snapshots in chunks of {} across {} cores",
		blobs.len(),
		chunk_size,
		cpus
	);

	let (tx, rx) = mpsc::channel();
	for chunk in blobs.chunks(chunk_size) {
		let tx = tx.clone();
		let chunk: Vec<Vec<u8>> = chunk.to_vec();

		thread::spawn(move || {
			// The receiver only hangs up after an earlier chunk failed;
			// this chunk's result is irrelevant then.
			let _ = tx.send(merge_chunk(&chunk));
		});
	}
	drop(tx);

	let mut merged: Option<LanguageModel> = None;
	for partial in rx.iter() {
		let Some(partial) = partial? else { continue };
		match merged.as_mut() {
			Some(model) => model.merge(&partial)?,
			None => merged = Some(partial),
		}
	}

	if let Some(model) = &merged {
		info!(
			"aggregated model: order {}, vocabulary {}, total words {}",
			model.order(),
			model.word_count(),
			model.total_words()
		);
	}
	Ok(merged)
}

/// Decodes and folds one chunk of snapshots into a partial model.
fn merge_chunk(blobs: &[Vec<u8>]) -> Result<Option<LanguageModel>, ModelError> {
	let mut partial: Option<LanguageModel> = None;
	for bytes in blobs {
		let model = LanguageModel::deserialize(bytes)?;
		match partial.as_mut() {
			Some(existing) => existing.merge(&model)?,
			None => partial = Some(model),
		}
	}
	Ok(partial)
}
