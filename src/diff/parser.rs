use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};

/// `diff --git a/old b/new` file boundary.
static FILE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^diff --git a/(.+?) b/(.+)$").expect("file header regex"));

/// `@@ -start,count +start,count @@` hunk header; a missing count means 1.
static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header regex")
});

/// Paths that carry no review signal: lockfiles, build output, VCS
/// metadata, binary/image/font assets, minified bundles.
const NOISE_PATTERNS: &[&str] = &[
    r"\.lock$",
    r"package-lock\.json$",
    r"yarn\.lock$",
    r"pnpm-lock\.yaml$",
    r"\.min\.(js|css)$",
    r"node_modules/",
    r"\.git/",
    r"\.DS_Store$",
    r"\.log$",
    r"dist/",
    r"build/",
    r"\.pyc$",
    r"__pycache__/",
    r"\.png$",
    r"\.jpg$",
    r"\.jpeg$",
    r"\.gif$",
    r"\.svg$",
    r"\.ico$",
    r"\.woff",
    r"\.woff2$",
    r"\.ttf$",
    r"\.eot$",
];

static NOISE: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new(NOISE_PATTERNS.iter().map(|p| format!("(?i){p}"))).expect("noise regex set")
});

// ── Parsed file record ───────────────────────────────────────────

/// One file's segment of a unified diff, immutable once parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffFile {
    /// Path on the `a/` side.
    pub old_path: String,
    /// Path on the `b/` side.
    pub new_path: String,
    /// Raw segment text including all header lines, for reconstruction.
    pub content: String,
    /// Count of literal `+` content lines (excluding `+++`).
    pub added_lines: u32,
    /// Count of literal `-` content lines (excluding `---`).
    pub removed_lines: u32,
    /// Whether the segment carried a `new file mode` header.
    pub is_new: bool,
    /// Whether the segment carried a `deleted file mode` header.
    pub is_deleted: bool,
    /// Whether the segment was a `Binary files` stub.
    pub is_binary: bool,
}

impl DiffFile {
    /// The path that identifies this file: the new path, or the old path
    /// when the new side is absent.
    pub fn effective_path(&self) -> &str {
        if self.new_path.is_empty() {
            &self.old_path
        } else {
            &self.new_path
        }
    }

    /// One-word status used in summaries.
    pub fn status(&self) -> &'static str {
        if self.is_deleted {
            "deleted"
        } else if self.is_binary {
            "binary"
        } else if self.is_new {
            "new"
        } else {
            "modified"
        }
    }
}

struct FileBuilder {
    old_path: String,
    new_path: String,
    lines: Vec<String>,
    added: u32,
    removed: u32,
    hunk_added: u32,
    hunk_removed: u32,
    is_new: bool,
    is_deleted: bool,
    is_binary: bool,
}

impl FileBuilder {
    fn new(old_path: String, new_path: String, header: &str) -> Self {
        Self {
            old_path,
            new_path,
            lines: vec![header.to_string()],
            added: 0,
            removed: 0,
            hunk_added: 0,
            hunk_removed: 0,
            is_new: false,
            is_deleted: false,
            is_binary: false,
        }
    }

    fn finish(self) -> DiffFile {
        // Hunk headers declare totals; the literal content scan is
        // authoritative. Disagreement means a malformed or truncated
        // segment, which is tolerated.
        if (self.hunk_added, self.hunk_removed) != (self.added, self.removed) {
            let path = if self.new_path.is_empty() {
                &self.old_path
            } else {
                &self.new_path
            };
            tracing::debug!(
                path = %path,
                hunk_added = self.hunk_added,
                hunk_removed = self.hunk_removed,
                counted_added = self.added,
                counted_removed = self.removed,
                "hunk header counts disagree with content lines"
            );
        }

        DiffFile {
            old_path: self.old_path,
            new_path: self.new_path,
            content: self.lines.join("\n"),
            added_lines: self.added,
            removed_lines: self.removed,
            is_new: self.is_new,
            is_deleted: self.is_deleted,
            is_binary: self.is_binary,
        }
    }
}

// ── Operations ───────────────────────────────────────────────────

/// Split a unified diff into per-file records.
///
/// Lines before the first `diff --git` boundary are ignored; a segment
/// whose header does not parse is skipped; empty input yields an empty
/// vec. Never fails.
pub fn parse(text: &str) -> Vec<DiffFile> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut files = Vec::new();
    let mut current: Option<FileBuilder> = None;

    for line in text.split('\n') {
        if line.starts_with("diff --git") {
            if let Some(builder) = current.take() {
                files.push(builder.finish());
            }
            if let Some(caps) = FILE_HEADER.captures(line) {
                current = Some(FileBuilder::new(
                    caps[1].to_string(),
                    caps[2].to_string(),
                    line,
                ));
            }
            continue;
        }

        let Some(builder) = current.as_mut() else {
            continue;
        };

        if line.starts_with("Binary files") {
            builder.is_binary = true;
        } else if line.starts_with("new file mode") {
            builder.is_new = true;
        } else if line.starts_with("deleted file mode") {
            builder.is_deleted = true;
        } else if let Some(caps) = HUNK_HEADER.captures(line) {
            let removed = caps
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(1);
            let added = caps
                .get(4)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(1);
            builder.hunk_removed += removed;
            builder.hunk_added += added;
        } else if line.starts_with('+') && !line.starts_with("+++") {
            builder.added += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            builder.removed += 1;
        }

        builder.lines.push(line.to_string());
    }

    if let Some(builder) = current.take() {
        files.push(builder.finish());
    }

    files
}

/// Whether a path matches the noise denylist (case-insensitive).
pub fn is_noise_path(path: &str) -> bool {
    NOISE.is_match(path)
}

/// Drop noise files, preserving the order of survivors. Idempotent.
pub fn filter(files: Vec<DiffFile>) -> Vec<DiffFile> {
    files
        .into_iter()
        .filter(|f| !is_noise_path(f.effective_path()))
        .collect()
}

/// Split text on line boundaries into chunks of at most `max_size` bytes.
///
/// A line is never split; a single line longer than `max_size` becomes its
/// own oversized chunk. Joining the chunks with `\n` reproduces the input.
pub fn chunk(content: &str, max_size: usize) -> Vec<String> {
    if content.len() <= max_size {
        return vec![content.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_size = 0usize;

    for line in content.split('\n') {
        let line_size = line.len() + 1;
        if current_size + line_size > max_size && !current.is_empty() {
            chunks.push(current.join("\n"));
            current = vec![line];
            current_size = line_size;
        } else {
            current.push(line);
            current_size += line_size;
        }
    }

    if !current.is_empty() {
        chunks.push(current.join("\n"));
    }

    chunks
}

/// Bound, parse, and filter a raw diff.
///
/// Input larger than `max_diff_size` bytes is hard-truncated on a char
/// boundary with a visible notice appended, then parsed and filtered.
/// Returns the reconstructed filtered text and the surviving file records.
pub fn process(text: &str, max_diff_size: usize) -> (String, Vec<DiffFile>) {
    let owned;
    let bounded = if text.len() > max_diff_size {
        let mut cut = max_diff_size;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        owned = format!(
            "{}\n\n[DIFF TRUNCATED: Original size {} chars, max {} chars]",
            &text[..cut],
            text.len(),
            max_diff_size
        );
        owned.as_str()
    } else {
        text
    };

    let files = filter(parse(bounded));
    let reconstructed = files
        .iter()
        .map(|f| f.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    (reconstructed, files)
}

/// One line per file: `status: path (+added/-removed)`.
pub fn summarize(files: &[DiffFile]) -> String {
    files
        .iter()
        .map(|f| {
            format!(
                "{}: {} (+{}/-{})",
                f.status(),
                f.effective_path(),
                f.added_lines,
                f.removed_lines
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Map the most frequent changed-file extension to a language name.
///
/// Used only to phrase style guidance; `"unknown"` when no file has an
/// extension.
pub fn detect_language(files: &[DiffFile]) -> String {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for file in files {
        let path = file.effective_path();
        if let Some((stem, ext)) = path.rsplit_once('.') {
            if !stem.is_empty() && !ext.is_empty() {
                *counts.entry(ext.to_ascii_lowercase()).or_default() += 1;
            }
        }
    }

    let Some(most_common) = counts
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(ext, _)| ext.clone())
    else {
        return "unknown".to_string();
    };

    match most_common.as_str() {
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "java" => "java",
        "go" => "go",
        "rs" => "rust",
        "cpp" => "c++",
        "c" => "c",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" => "kotlin",
        other => return other.to_string(),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
diff --git a/src/main.rs b/src/main.rs
index 1111111..2222222 100644
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,3 +1,4 @@
 fn main() {
-    println!(\"hello\");
+    println!(\"hello, world\");
+    run();
 }
diff --git a/Cargo.lock b/Cargo.lock
index 3333333..4444444 100644
--- a/Cargo.lock
+++ b/Cargo.lock
@@ -1,2 +1,2 @@
-version = 1
+version = 2
diff --git a/logo.png b/logo.png
Binary files a/logo.png and b/logo.png differ
diff --git a/src/util.rs b/src/util.rs
new file mode 100644
index 0000000..5555555
--- /dev/null
+++ b/src/util.rs
@@ -0,0 +1,2 @@
+pub fn run() {}
+pub fn stop() {}";

    /// Count literal `+`/`-` content lines, independently of the parser.
    fn rescan(content: &str) -> (u32, u32) {
        let mut added = 0;
        let mut removed = 0;
        for line in content.split('\n') {
            if line.starts_with('+') && !line.starts_with("+++") {
                added += 1;
            } else if line.starts_with('-') && !line.starts_with("---") {
                removed += 1;
            }
        }
        (added, removed)
    }

    #[test]
    fn parse_splits_on_file_boundaries() {
        let files = parse(SAMPLE);
        assert_eq!(files.len(), 4);
        assert_eq!(files[0].new_path, "src/main.rs");
        assert_eq!(files[1].new_path, "Cargo.lock");
        assert_eq!(files[2].new_path, "logo.png");
        assert_eq!(files[3].new_path, "src/util.rs");
    }

    #[test]
    fn parse_counts_match_independent_rescan() {
        for file in parse(SAMPLE) {
            let (added, removed) = rescan(&file.content);
            assert_eq!(file.added_lines, added, "added for {}", file.new_path);
            assert_eq!(file.removed_lines, removed, "removed for {}", file.new_path);
        }
    }

    #[test]
    fn parse_detects_flags() {
        let files = parse(SAMPLE);
        assert!(files[2].is_binary);
        assert!(files[3].is_new);
        assert!(!files[0].is_new && !files[0].is_deleted && !files[0].is_binary);

        let deleted = parse(
            "diff --git a/gone.rs b/gone.rs\ndeleted file mode 100644\n--- a/gone.rs\n+++ /dev/null\n@@ -1,1 +0,0 @@\n-pub fn gone() {}",
        );
        assert!(deleted[0].is_deleted);
    }

    #[test]
    fn parse_tolerates_garbage() {
        assert!(parse("").is_empty());
        assert!(parse("not a diff at all\njust text").is_empty());

        // A header that matches the boundary prefix but not the full
        // pattern starts no segment.
        assert!(parse("diff --git mangled header\n+++ x").is_empty());
    }

    #[test]
    fn parse_round_trips_content() {
        let files = parse(SAMPLE);
        let rejoined = files
            .iter()
            .map(|f| f.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(rejoined, SAMPLE);
    }

    #[test]
    fn noise_paths_are_detected() {
        assert!(is_noise_path("Cargo.lock"));
        assert!(is_noise_path("package-lock.json"));
        assert!(is_noise_path("assets/app.min.js"));
        assert!(is_noise_path("node_modules/left-pad/index.js"));
        assert!(is_noise_path("dist/bundle.js"));
        assert!(is_noise_path("logo.PNG"));
        assert!(is_noise_path("fonts/icons.woff2"));

        assert!(!is_noise_path("src/main.rs"));
        assert!(!is_noise_path("README.md"));
        assert!(!is_noise_path("locksmith.rs"));
    }

    #[test]
    fn filter_drops_noise_and_preserves_order() {
        let files = parse(SAMPLE);
        let kept = filter(files);
        let paths: Vec<&str> = kept.iter().map(|f| f.effective_path()).collect();
        assert_eq!(paths, vec!["src/main.rs", "src/util.rs"]);
    }

    #[test]
    fn filter_is_idempotent() {
        let once = filter(parse(SAMPLE));
        let twice = filter(once.clone());
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.effective_path(), b.effective_path());
        }
    }

    #[test]
    fn chunk_respects_max_size_and_round_trips() {
        let content = (0..100)
            .map(|i| format!("line number {i}"))
            .collect::<Vec<_>>()
            .join("\n");

        let chunks = chunk(&content, 100);
        assert!(chunks.len() > 1);
        for piece in &chunks {
            assert!(piece.len() <= 100, "chunk of {} bytes", piece.len());
            assert!(!piece.is_empty());
        }
        assert_eq!(chunks.join("\n"), content);
    }

    #[test]
    fn chunk_small_input_is_single_chunk() {
        let chunks = chunk("one\ntwo", 100);
        assert_eq!(chunks, vec!["one\ntwo".to_string()]);
    }

    #[test]
    fn chunk_never_splits_a_line() {
        let content = "short\naveryveryverylongline\nshort";
        for piece in chunk(content, 10) {
            for line in piece.split('\n') {
                assert!(content.contains(line));
            }
        }
    }

    #[test]
    fn process_truncates_oversized_input() {
        let (text, _files) = process(SAMPLE, 50);
        assert!(text.contains("[DIFF TRUNCATED"));
        assert!(text.contains(&format!("Original size {} chars", SAMPLE.len())));
    }

    #[test]
    fn process_filters_and_reconstructs() {
        let (text, files) = process(SAMPLE, 1_000_000);
        assert_eq!(files.len(), 2);
        assert!(text.contains("src/main.rs"));
        assert!(text.contains("src/util.rs"));
        assert!(!text.contains("Cargo.lock"));
        assert!(!text.contains("logo.png"));
    }

    #[test]
    fn summarize_one_line_per_file() {
        let summary = summarize(&parse(SAMPLE));
        let lines: Vec<&str> = summary.split('\n').collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "modified: src/main.rs (+2/-1)");
        assert_eq!(lines[2], "binary: logo.png (+0/-0)");
        assert_eq!(lines[3], "new: src/util.rs (+2/-0)");
    }

    #[test]
    fn detect_language_picks_dominant_extension() {
        let files = parse(SAMPLE);
        assert_eq!(detect_language(&files), "rust");
        assert_eq!(detect_language(&[]), "unknown");
    }

    #[test]
    fn detect_language_maps_known_extensions() {
        let diff = "diff --git a/app.py b/app.py\n@@ -1 +1 @@\n-x\n+y";
        assert_eq!(detect_language(&parse(diff)), "python");

        let diff = "diff --git a/data.csv b/data.csv\n@@ -1 +1 @@\n-x\n+y";
        assert_eq!(detect_language(&parse(diff)), "csv");
    }
}
