//! Packs a job's output directory into a compressed, base64-encoded archive.

use std::io::Read;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use zip::write::SimpleFileOptions;

/// Walks `output_dir` recursively and returns a base64-encoded, compressed
/// archive of its contents, keyed by path relative to `output_dir`.
///
/// A missing or empty directory still produces a valid archive; the Job
/// Runner guarantees at least the `_runner.txt` marker exists in practice.
pub fn pack(output_dir: &Path) -> Result<String> {
    let tmp = tempfile::NamedTempFile::new().context("failed to create temporary archive file")?;
    let path = tmp.path().to_path_buf();

    {
        let file = std::fs::File::create(&path).context("failed to open temporary archive file")?;
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        if output_dir.is_dir() {
            for entry in walkdir::WalkDir::new(output_dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let relative = entry
                    .path()
                    .strip_prefix(output_dir)
                    .context("output entry escaped its own directory")?;
                let name = relative.to_string_lossy().replace('\\', "/");

                writer
                    .start_file(name, options)
                    .context("failed to start archive entry")?;
                let mut contents = Vec::new();
                std::fs::File::open(entry.path())
                    .context("failed to open output file for packing")?
                    .read_to_end(&mut contents)
                    .context("failed to read output file for packing")?;
                writer.write_all(&contents).context("failed to write archive entry")?;
            }
        }

        writer.finish().context("failed to finalize archive")?;
    }

    let bytes = std::fs::read(&path).context("failed to read back temporary archive")?;
    Ok(BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn packs_files_relative_to_output_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("_runner.txt"), b"job started\n").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/result.txt"), b"hello\n").unwrap();

        let encoded = pack(dir.path()).unwrap();
        let bytes = BASE64.decode(encoded).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();

        let mut names: Vec<_> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["_runner.txt", "nested/result.txt"]);
    }

    #[test]
    fn packs_missing_directory_as_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");

        let encoded = pack(&missing).unwrap();
        let bytes = BASE64.decode(encoded).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 0);
    }
}
