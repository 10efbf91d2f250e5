use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ops::Operation;

/// Directories never surfaced to the model; walking them only burns tokens.
const IGNORED_DIRS: &[&str] =
    &[".git", "build", ".dart_tool", ".idea", "__pycache__", "node_modules", "target"];

/// Binary or noisy files hidden from the tree listing.
const HIDDEN_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "lock"];

/// Post-write syntax check for Dart sources, via `dart analyze`.
///
/// The check is advisory: a missing SDK, a crash, or a timeout all pass
/// open with a reason, and a reported failure never reverts the write.
pub struct SyntaxValidator {
    program: String,
    timeout: Duration,
}

impl Default for SyntaxValidator {
    fn default() -> Self {
        Self { program: "dart".into(), timeout: Duration::from_secs(10) }
    }
}

impl SyntaxValidator {
    pub async fn check(&self, path: &Path) -> (bool, String) {
        if path.extension().and_then(|e| e.to_str()) != Some("dart") {
            return (true, "not a Dart file; check skipped".into());
        }

        let program = self.program.clone();
        let target = path.to_path_buf();
        // Blocking subprocess on a worker thread, bounded by a timeout.
        let handle = tokio::task::spawn_blocking(move || {
            std::process::Command::new(&program)
                .arg("analyze")
                .arg(&target)
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::piped())
                .output()
        });

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(Ok(output))) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                if stdout.to_lowercase().contains("no issues found") || output.status.success() {
                    (true, "syntax OK".into())
                } else {
                    // Only the first diagnostic line; the rest floods small displays.
                    let first = stdout.lines().next().unwrap_or("").trim().to_string();
                    (false, format!("syntax error: {}", first))
                }
            }
            Ok(Ok(Err(e))) if e.kind() == std::io::ErrorKind::NotFound => {
                (true, "dart SDK not found; check skipped".into())
            }
            Ok(Ok(Err(e))) => (true, format!("check bypassed: {}", e)),
            Ok(Err(join_err)) => (true, format!("check bypassed: {}", join_err)),
            Err(_) => (true, "analyzer timed out; check skipped".into()),
        }
    }
}

/// Executes parsed operations against the file system.
///
/// Paths resolve under `root` (the working directory in normal use), but the
/// protected-path check always compares the exact trimmed string the model
/// emitted, never a canonicalized form.
pub struct ActionRunner {
    root: PathBuf,
    protected: Vec<String>,
    validator: Option<SyntaxValidator>,
}

impl ActionRunner {
    pub fn new(root: PathBuf, protected: Vec<String>, validator: Option<SyntaxValidator>) -> Self {
        Self { root, protected, validator }
    }

    fn is_protected(&self, path: &str) -> bool {
        self.protected.iter().any(|p| p == path)
    }

    /// Apply each operation in order, returning one status line per executed
    /// or denied operation. Failed or inapplicable operations are skipped
    /// without a line; nothing here ever returns an error.
    pub async fn apply(&self, ops: &[Operation]) -> Vec<String> {
        let mut results = Vec::new();
        for op in ops {
            match op {
                Operation::CreateFolder { path } => match fs::create_dir_all(self.root.join(path)) {
                    Ok(()) => results.push(format!("📂 Folder: {}", path)),
                    Err(e) => eprintln!("create folder {} failed: {}", path, e),
                },
                Operation::WriteFile { path, content } => {
                    if self.is_protected(path) {
                        results.push(format!("🛡️ Protected: {} (denied)", path));
                        continue;
                    }
                    // An empty path would resolve to the root itself.
                    if path.is_empty() {
                        continue;
                    }
                    let full = self.root.join(path);
                    if let Some(parent) = full.parent() {
                        if !parent.as_os_str().is_empty() {
                            if let Err(e) = fs::create_dir_all(parent) {
                                eprintln!("create parent for {} failed: {}", path, e);
                                continue;
                            }
                        }
                    }
                    if let Err(e) = fs::write(&full, content) {
                        eprintln!("write {} failed: {}", path, e);
                        continue;
                    }
                    let (passed, msg) = match &self.validator {
                        Some(v) => v.check(&full).await,
                        None => (true, "check disabled".into()),
                    };
                    let marker = if passed { "✅" } else { "❌" };
                    results.push(format!("{} Saved: {} ({})", marker, path, msg));
                }
                Operation::Rename { from, to } => {
                    if self.is_protected(from) || self.is_protected(to) {
                        results.push(format!("🛡️ Protected: {} -> {} (denied)", from, to));
                        continue;
                    }
                    if from.is_empty() || to.is_empty() {
                        continue;
                    }
                    let src = self.root.join(from);
                    if !src.exists() {
                        continue;
                    }
                    match fs::rename(&src, self.root.join(to)) {
                        Ok(()) => results.push(format!("🚚 Moved: {} -> {}", from, to)),
                        Err(e) => eprintln!("rename {} failed: {}", from, e),
                    }
                }
                Operation::Remove { path } => {
                    if self.is_protected(path) {
                        results.push(format!("🛡️ Protected: {} (denied)", path));
                        continue;
                    }
                    if path.is_empty() {
                        continue;
                    }
                    let full = self.root.join(path);
                    if !full.exists() {
                        continue;
                    }
                    let removed = if full.is_dir() {
                        fs::remove_dir_all(&full)
                    } else {
                        fs::remove_file(&full)
                    };
                    match removed {
                        Ok(()) => results.push(format!("🔥 Removed: {}", path)),
                        Err(e) => eprintln!("remove {} failed: {}", path, e),
                    }
                }
            }
        }
        results
    }
}

/// Depth- and entry-bounded snapshot of the working tree, formatted for
/// prompt injection.
pub fn project_tree(root: &Path, max_depth: usize, max_entries: usize) -> String {
    let mut lines = Vec::new();
    visit_dir(root, 0, max_depth, max_entries, &mut lines);
    lines.join("\n")
}

fn visit_dir(dir: &Path, level: usize, max_depth: usize, max_entries: usize, lines: &mut Vec<String>) {
    if lines.len() >= max_entries {
        return;
    }
    let indent = "    ".repeat(level);
    let name = if level == 0 {
        "ROOT".to_string()
    } else {
        dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    };
    lines.push(format!("{}[FOLDER] {}/", indent, name));

    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() {
            if !IGNORED_DIRS.contains(&file_name.as_str()) {
                dirs.push(path);
            }
        } else if !is_hidden_file(&file_name) {
            files.push(file_name);
        }
    }
    files.sort();
    dirs.sort();

    for file in files {
        if lines.len() >= max_entries {
            return;
        }
        lines.push(format!("{}    [FILE] {}", indent, file));
    }
    for sub in dirs {
        if level + 1 < max_depth {
            visit_dir(&sub, level + 1, max_depth, max_entries, lines);
        }
    }
}

fn is_hidden_file(name: &str) -> bool {
    let ext = name.rsplit('.').next().unwrap_or("");
    if HIDDEN_EXTENSIONS.contains(&ext) {
        return true;
    }
    // JSON is almost always generated noise, except the manifest.
    name.ends_with(".json") && name != "package.json"
}

/// Expand `@name` mentions in a prompt into `[FILE: name]` context blocks.
/// Missing or unreadable files contribute nothing.
pub fn read_mentioned_files(prompt: &str, root: &Path) -> String {
    let Ok(re) = Regex::new(r"@([\w.\-]+)") else {
        return String::new();
    };
    let mut out = String::new();
    for cap in re.captures_iter(prompt) {
        let name = &cap[1];
        let path = root.join(name);
        if path.is_file() {
            if let Ok(content) = fs::read_to_string(&path) {
                out.push_str(&format!("\n\n[FILE: {}]\n{}", name, content));
            }
        }
    }
    out
}

pub mod git {
    use anyhow::{bail, Context, Result};

    /// Stage everything, commit, and push. Any failing step aborts with the
    /// underlying git stderr.
    pub fn commit_and_push(message: &str) -> Result<String> {
        run(&["add", "."])?;
        run(&["commit", "-m", message])?;
        run(&["push"])?;
        Ok("pushed to origin".to_string())
    }

    fn run(args: &[&str]) -> Result<()> {
        let output = std::process::Command::new("git")
            .args(args)
            .output()
            .with_context(|| format!("running git {}", args.join(" ")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git {} failed: {}", args[0], stderr.trim());
        }
        Ok(())
    }
}
