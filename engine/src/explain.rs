//! Line-by-line code explainer
//!
//! Every non-blank line of a file is sent to the model on its own. The
//! explanation is written as comments above the line, followed by a
//! `# Line N:` marker and the untouched original line.

use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{CondenseError, Result};
use crate::llm::Completer;
use crate::prompts::{explain_prompt, EXPLAIN_SYSTEM_PROMPT};

/// Suffix appended to the stem of explained files
pub const EXPLAINED_SUFFIX: &str = "_explained";

fn tag_pattern() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"</?[A-Za-z!][^<>]*>").expect("valid tag pattern"))
}

/// Drop markup tags and decode the basic entities
pub fn strip_markup(line: &str) -> String {
    tag_pattern()
        .replace_all(line, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Where the explained copy of `file` goes: `root/a/x.py` -> `out/a/x_explained.py`
pub fn explained_path(file: &Path, repo_root: &Path, out_root: &Path) -> Option<PathBuf> {
    let relative = file.strip_prefix(repo_root).ok()?;
    let stem = relative.file_stem()?.to_string_lossy();
    let name = match relative.extension() {
        Some(ext) => format!("{}{}.{}", stem, EXPLAINED_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, EXPLAINED_SUFFIX),
    };

    let mut target = out_root.join(relative);
    target.set_file_name(name);
    Some(target)
}

/// Annotates source files with per-line explanations
pub struct Explainer<C: Completer> {
    completer: C,
    model: String,
    language: String,
}

impl<C: Completer> Explainer<C> {
    pub fn new(completer: C, model: impl Into<String>) -> Self {
        Self {
            completer,
            model: model.into(),
            language: "Python".to_owned(),
        }
    }

    /// Language named in the prompt
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Explanation for one line. Failures yield an empty string.
    pub fn explain_line(&self, line: &str) -> String {
        let prompt = explain_prompt(&self.language, line);
        match self.completer.complete(EXPLAIN_SYSTEM_PROMPT, &prompt, &self.model) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Failed to explain line: {}", e);
                String::new()
            },
        }
    }

    /// Annotated copy of `source`
    pub fn annotate(&self, source: &str) -> String {
        let mut out = String::with_capacity(source.len() * 4);

        for (index, line) in source.split_inclusive('\n').enumerate() {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                let text = strip_markup(trimmed);
                for explanation in self.explain_line(&text).split('\n') {
                    out.push_str("# Explanation: ");
                    out.push_str(explanation);
                    out.push('\n');
                }
                out.push_str(&format!("# Line {}: {}\n", index + 1, text));
            }
            out.push_str(line);
        }

        out.push('\n');
        out
    }

    /// Annotate `file` and write the result under `out_root`
    pub fn explain_file(&self, file: &Path, repo_root: &Path, out_root: &Path) -> Result<PathBuf> {
        let target = explained_path(file, repo_root, out_root)
            .ok_or_else(|| CondenseError::NotFound(file.display().to_string()))?;
        let source = fs::read_to_string(file)?;

        log::info!("Explaining {}", file.display());
        let annotated = self.annotate(&source);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, annotated)?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replies "explains <line>"; fails on lines containing "boom"
    struct Echo {
        prompts: Mutex<Vec<String>>,
    }

    impl Echo {
        fn new() -> Self {
            Self { prompts: Mutex::new(Vec::new()) }
        }
    }

    impl Completer for Echo {
        fn complete(&self, system: &str, user: &str, _model: &str) -> std::result::Result<String, LlmError> {
            assert_eq!(system, EXPLAIN_SYSTEM_PROMPT);
            self.prompts.lock().unwrap().push(user.to_owned());
            if user.contains("boom") {
                return Err(LlmError::EmptyResponse);
            }
            let line = user.trim_end().rsplit('\n').next().unwrap_or_default();
            Ok(format!("explains {}\nsecond line", line))
        }
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(strip_markup("<b>x = 1</b>"), "x = 1");
        assert_eq!(strip_markup("if a &lt; b &amp;&amp; c:"), "if a < b && c:");
        assert_eq!(strip_markup("if a < b and c > d:"), "if a < b and c > d:");
    }

    #[test]
    fn test_annotate_layout() {
        let echo = Echo::new();
        let explainer = Explainer::new(&echo, "gpt-4o-mini");

        let annotated = explainer.annotate("x = 1\n\n  y = x\n");
        assert_eq!(
            annotated,
            "# Explanation: explains x = 1\n# Explanation: second line\n# Line 1: x = 1\nx = 1\n\
             \n\
             # Explanation: explains y = x\n# Explanation: second line\n# Line 3: y = x\n  y = x\n\
             \n"
        );
        assert_eq!(echo.prompts.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_prompt_names_language() {
        let echo = Echo::new();
        Explainer::new(&echo, "m").with_language("Rust").explain_line("let x = 1;");
        assert_eq!(echo.prompts.lock().unwrap()[0], "Explain the following Rust code:\n\nlet x = 1;\n");
    }

    #[test]
    fn test_failed_call_leaves_empty_explanation() {
        let echo = Echo::new();
        let annotated = Explainer::new(&echo, "m").annotate("boom()");
        assert_eq!(annotated, "# Explanation: \n# Line 1: boom()\nboom()\n");
    }

    #[test]
    fn test_explained_path() {
        let path = explained_path(Path::new("/repo/a/b/x.py"), Path::new("/repo"), Path::new("/out")).unwrap();
        assert_eq!(path, PathBuf::from("/out/a/b/x_explained.py"));

        // stems ending in p or y survive
        let path = explained_path(Path::new("/repo/happy.py"), Path::new("/repo"), Path::new("/out")).unwrap();
        assert_eq!(path, PathBuf::from("/out/happy_explained.py"));

        assert!(explained_path(Path::new("/elsewhere/x.py"), Path::new("/repo"), Path::new("/out")).is_none());
    }

    #[test]
    fn test_explain_file_writes_mirror_tree() {
        let repo = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let src = repo.path().join("pkg");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("mod.py"), "pass\n").unwrap();

        let echo = Echo::new();
        let written = Explainer::new(&echo, "m")
            .explain_file(&src.join("mod.py"), repo.path(), out.path())
            .unwrap();

        assert_eq!(written, out.path().join("pkg").join("mod_explained.py"));
        let content = fs::read_to_string(written).unwrap();
        assert!(content.contains("# Line 1: pass\npass\n"));
    }
}
