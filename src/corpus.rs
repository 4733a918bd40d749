//! Corpus loading and chunking.
//!
//! Reads the `.txt` documents the preprocessing step leaves behind,
//! normalizes their whitespace, and splits each one into overlapping
//! character-bounded chunks tagged with the source filename.

use std::fs;
use std::path::Path;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::ApiError;

/// A loaded document: source filename plus cleaned text.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub text: String,
}

/// A retrieval unit: a bounded substring of one document.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub text: String,
    /// Source filename label, not a reference to the document itself.
    pub source: String,
}

/// Read every `.txt` file in `folder` (non-recursive), cleaned and sorted
/// by filename. A file that cannot be read is skipped with a warning;
/// a missing folder or a folder without any `.txt` file is an error.
pub fn load_documents(folder: &Path) -> Result<Vec<Document>, ApiError> {
    if !folder.is_dir() {
        return Err(ApiError::NotFound(format!(
            "documents folder not found: {}",
            folder.display()
        )));
    }

    let entries = fs::read_dir(folder).map_err(ApiError::internal)?;
    let mut paths: Vec<_> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("txt")
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(ApiError::NotFound(format!(
            "no .txt documents in {}",
            folder.display()
        )));
    }

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        // Best-effort decoding: invalid UTF-8 is replaced, never fatal.
        let raw = match fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                tracing::warn!("Could not read {}: {}", name, err);
                continue;
            }
        };

        documents.push(Document {
            name,
            text: clean_text(&raw),
        });
    }

    Ok(documents)
}

/// Drop blank lines, trim the rest, rejoin with newlines. Lossy on
/// purpose: original blank-line structure is not preserved.
pub fn clean_text(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Content fingerprint of a corpus snapshot, stable across reorderings of
/// `read_dir` since documents arrive sorted by name.
pub fn fingerprint(documents: &[Document]) -> String {
    let mut hasher = Sha256::new();
    for doc in documents {
        hasher.update(doc.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(doc.text.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Split every document into chunks, carrying the source filename along.
pub fn chunk_documents(
    documents: &[Document],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>, ApiError> {
    if chunk_overlap >= chunk_size {
        return Err(ApiError::BadRequest(format!(
            "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }

    let mut chunks = Vec::new();
    for doc in documents {
        for text in split_text(&doc.text, chunk_size, chunk_overlap) {
            chunks.push(Chunk {
                text,
                source: doc.name.clone(),
            });
        }
    }

    tracing::info!(
        "Loaded {} documents -> {} chunks",
        documents.len(),
        chunks.len()
    );
    Ok(chunks)
}

/// Load and chunk in one step.
pub fn load_and_chunk(
    folder: &Path,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>, ApiError> {
    let documents = load_documents(folder)?;
    chunk_documents(&documents, chunk_size, chunk_overlap)
}

/// Split text into chunks of at most `chunk_size` characters.
///
/// Every non-final chunk ends at the best boundary inside its window:
/// paragraph break, then sentence ending, then whitespace, then a raw
/// character cut. The next chunk starts exactly `overlap` characters
/// before the previous end, so consecutive chunks share exactly
/// `overlap` characters.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    if total == 0 {
        return Vec::new();
    }
    if total <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let window_end = (start + chunk_size).min(total);
        let end = if window_end == total {
            total
        } else {
            let window = &chars[start..window_end];
            // Never cut inside the overlap region or the first half of the
            // window; either would stall or produce degenerate chunks.
            let min_cut = (overlap + 1).max(window.len() / 2);
            match boundary_cut(window, min_cut) {
                Some(cut) => start + cut,
                None => window_end,
            }
        };

        chunks.push(chars[start..end].iter().collect());
        if end == total {
            break;
        }
        start = end - overlap;
    }

    chunks
}

const SENTENCE_ENDINGS: [char; 3] = ['.', '!', '?'];

/// Best cut position in `window`, at or after `min_cut`. Preference:
/// paragraph break, sentence ending, whitespace. Scans right-to-left so
/// the chunk stays as full as its best boundary allows.
fn boundary_cut(window: &[char], min_cut: usize) -> Option<usize> {
    let len = window.len();
    if min_cut > len {
        return None;
    }

    for cut in (min_cut..=len).rev() {
        if cut >= 2 && window[cut - 1] == '\n' && window[cut - 2] == '\n' {
            return Some(cut);
        }
    }
    for cut in (min_cut..=len).rev() {
        if cut >= 2 && window[cut - 1].is_whitespace() && SENTENCE_ENDINGS.contains(&window[cut - 2])
        {
            return Some(cut);
        }
    }
    for cut in (min_cut..=len).rev() {
        if cut >= 1 && window[cut - 1].is_whitespace() {
            return Some(cut);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_doc(dir: &std::path::Path, name: &str, contents: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn clean_text_drops_blank_lines_and_trims() {
        let raw = "  first line  \n\n\n\t second line\t\n   \n";
        assert_eq!(clean_text(raw), "first line\nsecond line");
    }

    #[test]
    fn load_documents_rejects_missing_folder() {
        let result = load_documents(std::path::Path::new("/nonexistent/purser-docs"));
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn load_documents_rejects_folder_without_txt_files() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "notes.md", "not a corpus file");
        let result = load_documents(dir.path());
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn load_and_chunk_tags_chunks_with_source_filenames() {
        let dir = tempfile::tempdir().unwrap();
        write_doc(dir.path(), "halifax.txt", "Halifax offers kayak tours.");
        write_doc(dir.path(), "packing.txt", "Pack light layers.");

        let chunks = load_and_chunk(dir.path(), 500, 50).unwrap();

        assert_eq!(chunks.len(), 2);
        let sources: Vec<_> = chunks.iter().map(|c| c.source.as_str()).collect();
        assert!(sources.contains(&"halifax.txt"));
        assert!(sources.contains(&"packing.txt"));
    }

    #[test]
    fn chunk_documents_rejects_overlap_not_smaller_than_size() {
        let docs = vec![Document {
            name: "a.txt".to_string(),
            text: "text".to_string(),
        }];
        assert!(matches!(
            chunk_documents(&docs, 50, 50),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn short_document_yields_single_chunk() {
        let chunks = split_text("tiny", 500, 50);
        assert_eq!(chunks, vec!["tiny".to_string()]);
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        assert!(split_text("", 500, 50).is_empty());
    }

    #[test]
    fn consecutive_chunks_share_exactly_overlap_characters() {
        let text: String = std::iter::repeat("abcdefghij").take(30).collect();
        let overlap = 10;
        let chunks = split_text(&text, 80, overlap);

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let left: Vec<char> = pair[0].chars().collect();
            let right: Vec<char> = pair[1].chars().collect();
            let tail: String = left[left.len() - overlap..].iter().collect();
            let head: String = right[..overlap].iter().collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn chunks_never_exceed_chunk_size() {
        let text = "word ".repeat(500);
        for chunk in split_text(&text, 64, 16) {
            assert!(chunk.chars().count() <= 64);
        }
    }

    #[test]
    fn prefers_sentence_boundary_over_word_boundary() {
        // A word boundary sits later in the window than the sentence
        // ending; the sentence ending must still win.
        let text = "Tours run daily in the summer. Guests can book at the desk today";
        let chunks = split_text(text, 40, 5);
        assert!(chunks[0].ends_with("summer. "), "got {:?}", chunks[0]);
    }

    #[test]
    fn prefers_paragraph_boundary_over_sentence_boundary() {
        let text = "Intro line one. Intro two.\n\nBody paragraph with plenty of following text";
        let chunks = split_text(text, 40, 5);
        assert!(chunks[0].ends_with("Intro two.\n\n"), "got {:?}", chunks[0]);
    }

    #[test]
    fn falls_back_to_raw_character_cut_without_boundaries() {
        let text = "x".repeat(100);
        let chunks = split_text(&text, 40, 10);
        assert_eq!(chunks[0].len(), 40);
        assert!(chunks.len() > 1);
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let base = vec![Document {
            name: "a.txt".to_string(),
            text: "alpha".to_string(),
        }];
        let changed = vec![Document {
            name: "a.txt".to_string(),
            text: "beta".to_string(),
        }];
        assert_ne!(fingerprint(&base), fingerprint(&changed));
        assert_eq!(fingerprint(&base), fingerprint(&base));
    }
}
