use std::env;
use std::fs;
use std::path::PathBuf;

use log::info;

use nextword_core::io::{get_filename, list_files, normalize_folder};
use nextword_core::model::aggregate::merge_snapshots;

/// Aggregator entry point.
///
/// Reads every `.snap` export in a directory, merges them into a single
/// model, and writes the combined snapshot back out for redistribution.
///
/// Usage: `nextword-aggregate [snapshot_dir] [output_file]`
/// - `snapshot_dir` defaults to `./snapshots`
/// - `output_file` defaults to `./merged.snap`
///
/// Any corrupt or order-mismatched export aborts the run: dropping a
/// contributor silently would corrupt the aggregate.
fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::init();

	let args: Vec<String> = env::args().collect();
	let folder = normalize_folder(args.get(1).map(String::as_str).unwrap_or("./snapshots"));
	if !folder.is_dir() {
		return Err(format!("Expected a directory, got: {}", folder.display()).into());
	}

	let mut blobs = Vec::new();
	for file in list_files(&folder, "snap")? {
		let full_path = folder.join(&file);
		info!("reading export '{}' from {}", get_filename(&full_path)?, full_path.display());
		blobs.push(fs::read(full_path)?);
	}

	let merged = match merge_snapshots(blobs)? {
		Some(model) => model,
		None => {
			println!("No .snap exports found in {}", folder.display());
			return Ok(());
		}
	};

	println!(
		"Aggregated model: order {}, vocabulary {}, total words {}",
		merged.order(),
		merged.word_count(),
		merged.total_words()
	);

	let output = match args.get(2) {
		Some(path) => PathBuf::from(path),
		None => PathBuf::from("./merged.snap"),
	};
	fs::write(&output, merged.serialize())?;
	println!("Merged snapshot written to {}", output.display());

	Ok(())
}
