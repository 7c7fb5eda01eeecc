use thiserror::Error;

/// Errors surfaced by the prediction core.
///
/// Empty input is deliberately not represented here: training or predicting
/// on empty text is a no-op / empty result, so the prediction feature stays
/// available even under a degraded or empty model.
#[derive(Debug, Error)]
pub enum ModelError {
	/// A snapshot violated the wire format or a structural invariant on load.
	///
	/// The payload names the first violated check. The previous model, if
	/// any, is left untouched by the failed load.
	#[error("corrupt snapshot: {0}")]
	CorruptSnapshot(String),

	/// A merge was attempted between models of different order.
	#[error("incompatible model order: expected {expected}, found {found}")]
	IncompatibleOrder { expected: u32, found: u32 },

	/// The snapshot store failed to persist a flushed model.
	///
	/// The session keeps its buffer when this happens, so the same text is
	/// retrained on the next flush attempt.
	#[error("snapshot persistence failed: {0}")]
	Persist(#[from] std::io::Error),
}
