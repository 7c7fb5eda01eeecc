use std::path::{Path, PathBuf};
use std::{env, fs, io};

/// Extracts the base filename without extension.
///
/// Examples:
/// - `"./snapshots/phone.snap"` → `"phone"`
/// - `"phone.snap"` → `"phone"`
pub fn get_filename<P: AsRef<Path>>(input_path: P) -> io::Result<String> {
	let stem = input_path
		.as_ref()
		.file_stem()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Path has no filename"))?;

	Ok(stem.to_string_lossy().to_string())
}

/// Normalize a folder path.
///
/// - `"."` or `"./"` resolves to the current working directory
/// - Other paths are returned as-is (not canonicalized)
pub fn normalize_folder(input: &str) -> PathBuf {
	if input == "." || input == "./" {
		env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
	} else {
		PathBuf::from(input)
	}
}

/// Lists all files with a given extension in a directory.
///
/// Returns file names only (no paths). Subdirectories are ignored.
pub fn list_files<P: AsRef<Path>>(dir: P, extension: &str) -> io::Result<Vec<String>> {
	let mut files = Vec::new();

	for entry in fs::read_dir(dir)? {
		let entry = entry?;
		let path = entry.path();

		if path.is_file() {
			if path.extension() == Some(std::ffi::OsStr::new(extension)) {
				if let Some(name) = path.file_name() {
					files.push(name.to_string_lossy().to_string());
				}
			}
		}
	}

	Ok(files)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn list_files_filters_by_extension() {
		let dir = tempfile::tempdir().unwrap();
		fs::write(dir.path().join("a.snap"), b"x").unwrap();
		fs::write(dir.path().join("b.snap"), b"x").unwrap();
		fs::write(dir.path().join("notes.txt"), b"x").unwrap();

		let mut files = list_files(dir.path(), "snap").unwrap();
		files.sort();
		assert_eq!(files, vec!["a.snap", "b.snap"]);
	}

	#[test]
	fn filename_drops_directory_and_extension() {
		assert_eq!(get_filename("./snapshots/phone.snap").unwrap(), "phone");
		assert_eq!(get_filename("tablet.snap").unwrap(), "tablet");
	}
}
