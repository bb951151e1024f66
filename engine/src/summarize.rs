//! Codebase summarizer
//!
//! Summarizes a repository's Python files one at a time, each prompt carrying
//! the file's call graph. Summaries accumulate until the next one would push
//! the running token count past the target; the walk stops there.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use tree_sitter::{Node, Parser as TSParser};

use crate::budget::target_word_count;
use crate::error::Result;
use crate::llm::Completer;
use crate::prompts::{Style, CODE_SYSTEM_PROMPT};
use crate::tokenizer::TokenCounter;

/// Lines of source quoted ahead of a summary when fragments are enabled
pub const FRAGMENT_LINES: usize = 10;

/// Functions defined in a file and the names each one calls, in source order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallGraph {
    entries: Vec<(String, Vec<String>)>,
}

impl CallGraph {
    /// Build the graph for Python source. Source with syntax errors yields an
    /// empty graph.
    pub fn parse(source: &str) -> Self {
        let mut parser = TSParser::new();
        if let Err(e) = parser.set_language(tree_sitter_python::language()) {
            log::warn!("Python grammar unavailable: {}", e);
            return Self::default();
        }

        let Some(tree) = parser.parse(source, None) else {
            return Self::default();
        };
        let root = tree.root_node();
        if root.has_error() {
            log::debug!("Source has syntax errors, skipping call graph");
            return Self::default();
        }

        let mut graph = Self::default();
        graph.visit_definitions(root, source.as_bytes());
        graph
    }

    fn visit_definitions(&mut self, root: Node<'_>, source: &[u8]) {
        for node in breadth_first(root) {
            if node.kind() != "function_definition" {
                continue;
            }
            if let Some(name) = node
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source).ok())
            {
                self.insert(name.to_owned(), collect_calls(node, source));
            }
        }
    }

    /// A redefinition replaces the earlier entry in place
    fn insert(&mut self, name: String, callees: Vec<String>) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = callees,
            None => self.entries.push((name, callees)),
        }
    }

    /// Callees of `function`
    pub fn calls(&self, function: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(n, _)| n == function)
            .map(|(_, c)| c.as_slice())
    }

    /// Defined function names
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `Function f calls: a, b` per function that calls anything
    pub fn describe(&self) -> String {
        self.entries
            .iter()
            .filter(|(_, callees)| !callees.is_empty())
            .map(|(name, callees)| format!("Function {} calls: {}", name, callees.join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Every call below `node`, shallowest first: `f(...)` records `f`,
/// `obj.m(...)` records `m`
fn collect_calls(node: Node<'_>, source: &[u8]) -> Vec<String> {
    breadth_first(node)
        .into_iter()
        .filter(|n| n.kind() == "call")
        .filter_map(|call| {
            let function = call.child_by_field_name("function")?;
            match function.kind() {
                "identifier" => function.utf8_text(source).ok(),
                "attribute" => function
                    .child_by_field_name("attribute")
                    .and_then(|a| a.utf8_text(source).ok()),
                _ => None,
            }
        })
        .map(str::to_owned)
        .collect()
}

/// Named nodes under `root` in level order. Wrapper nodes with no Python AST
/// counterpart (blocks, assignments, argument lists, decorated definitions)
/// are flattened into their parent's level.
fn breadth_first(root: Node<'_>) -> Vec<Node<'_>> {
    let mut order = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(node) = queue.pop_front() {
        order.push(node);
        enqueue_children(node, &mut queue);
    }
    order
}

fn enqueue_children<'t>(node: Node<'t>, queue: &mut VecDeque<Node<'t>>) {
    let mut cursor = node.walk();
    let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
    for child in children {
        match child.kind() {
            "block" | "assignment" | "augmented_assignment" | "argument_list" | "decorated_definition" => {
                enqueue_children(child, queue)
            },
            _ => queue.push_back(child),
        }
    }
}

/// A file to summarize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the repository root, `/`-separated
    pub relative_path: String,
    pub content: String,
}

/// Output format of the combined summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SummaryFormat {
    #[default]
    Markdown,
    Pseudo,
    Json,
}

impl SummaryFormat {
    /// Default output file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown | Self::Pseudo => "md",
        }
    }
}

impl fmt::Display for SummaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Markdown => "markdown",
            Self::Pseudo => "pseudo",
            Self::Json => "json",
        })
    }
}

impl FromStr for SummaryFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "pseudo" => Ok(Self::Pseudo),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown format '{}' (expected markdown, pseudo or json)", other)),
        }
    }
}

/// Summarizer knobs
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOptions {
    /// Token budget for the combined output
    pub target_tokens: usize,
    pub style: Style,
    /// Quote the first lines of each file ahead of its summary
    pub include_code_fragments: bool,
    /// Files longer than this are truncated before prompting
    pub max_file_tokens: usize,
    /// Divides each file's word target
    pub aggression: f64,
}

impl SummaryOptions {
    pub fn new(target_tokens: usize, max_file_tokens: usize) -> Self {
        Self {
            target_tokens,
            style: Style::default(),
            include_code_fragments: false,
            max_file_tokens,
            aggression: 1.2,
        }
    }
}

/// Result of a summarizer run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodebaseSummary {
    /// `### path\n\nsummary\n` per processed file
    pub files: Vec<String>,
    /// Tokens of the accepted summaries
    #[serde(skip)]
    pub tokens: usize,
    /// The budget ran out before every file was processed
    #[serde(skip)]
    pub truncated: bool,
}

impl CodebaseSummary {
    /// Render in `format`. No entries renders as the empty string.
    pub fn render(&self, format: SummaryFormat) -> Result<String> {
        if self.files.is_empty() {
            return Ok(String::new());
        }
        match format {
            SummaryFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            SummaryFormat::Markdown | SummaryFormat::Pseudo => Ok(self.files.join("\n")),
        }
    }
}

/// Walks source files and asks the model for one summary each
pub struct CodebaseSummarizer<'a, C: Completer, T: TokenCounter + ?Sized> {
    completer: C,
    counter: &'a T,
    model: String,
    options: SummaryOptions,
}

impl<'a, C: Completer, T: TokenCounter + ?Sized> CodebaseSummarizer<'a, C, T> {
    pub fn new(completer: C, counter: &'a T, model: impl Into<String>, options: SummaryOptions) -> Self {
        Self {
            completer,
            counter,
            model: model.into(),
            options,
        }
    }

    pub fn options(&self) -> &SummaryOptions {
        &self.options
    }

    /// Summarize `files` in order
    pub fn summarize(&self, files: &[SourceFile]) -> CodebaseSummary {
        self.summarize_observed(files, |_, _| {})
    }

    /// Summarize `files`, calling `observer` before each file with its index
    pub fn summarize_observed<O>(&self, files: &[SourceFile], mut observer: O) -> CodebaseSummary
    where
        O: FnMut(usize, &SourceFile),
    {
        let sizes: Vec<usize> = files.iter().map(|f| self.counter.count(&f.content)).collect();
        let total: usize = sizes.iter().sum();
        let mut summary = CodebaseSummary::default();

        for (index, (file, &size)) in files.iter().zip(&sizes).enumerate() {
            observer(index, file);

            let words = target_word_count(size, total, self.options.target_tokens, self.options.aggression);
            let mut text = self.summarize_file(file, size, words);
            if self.options.include_code_fragments {
                text = format!("{}\n{}", code_fragment(&file.content), text);
            }

            let tokens = self.counter.count(&text);
            if summary.tokens + tokens > self.options.target_tokens {
                log::info!(
                    "Token target reached at {} ({} + {} > {}); stopping",
                    file.relative_path,
                    summary.tokens,
                    tokens,
                    self.options.target_tokens
                );
                summary.truncated = true;
                break;
            }

            summary.tokens += tokens;
            summary.files.push(format!("### {}\n\n{}\n", file.relative_path, text));
        }

        summary
    }

    /// Prompt for one file
    pub fn prompt(&self, file: &SourceFile, size: usize, words: usize) -> String {
        let code = if size > self.options.max_file_tokens {
            log::warn!(
                "{} has {} tokens, truncating to {}",
                file.relative_path,
                size,
                self.options.max_file_tokens
            );
            self.counter
                .split_range(&file.content, 0..self.options.max_file_tokens)
        } else {
            file.content.clone()
        };

        let graph = CallGraph::parse(&file.content);
        let content = format!("Call graph:\n{}\n\nCode:\n{}", graph.describe(), code);
        self.options.style.render(words, false, &content)
    }

    fn summarize_file(&self, file: &SourceFile, size: usize, words: usize) -> String {
        log::debug!("Summarizing {} ({} tokens, {} words)", file.relative_path, size, words);
        let prompt = self.prompt(file, size, words);

        match self.completer.complete(CODE_SYSTEM_PROMPT, &prompt, &self.model) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Failed to summarize {}: {}", file.relative_path, e);
                String::new()
            },
        }
    }
}

/// First lines of `content` in a fenced block
fn code_fragment(content: &str) -> String {
    let snippet: Vec<&str> = content.lines().take(FRAGMENT_LINES).collect();
    format!("```python\n{}\n```", snippet.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::tokenizer::Tokenizer;
    use std::sync::Mutex;

    const SAMPLE: &str = r#"
import os

def load(path):
    data = open(path).read()
    return parse(data)

def parse(text):
    return text.strip().split(",")

class Store:
    def save(self, item):
        self.items.append(item)
        os.path.join("a", "b")

def idle():
    pass
"#;

    struct Canned {
        reply: std::result::Result<&'static str, ()>,
        prompts: Mutex<Vec<String>>,
    }

    impl Canned {
        fn new(reply: std::result::Result<&'static str, ()>) -> Self {
            Self { reply, prompts: Mutex::new(Vec::new()) }
        }
    }

    impl Completer for Canned {
        fn complete(&self, system: &str, user: &str, _model: &str) -> std::result::Result<String, LlmError> {
            assert_eq!(system, CODE_SYSTEM_PROMPT);
            self.prompts.lock().unwrap().push(user.to_owned());
            self.reply.map(str::to_owned).map_err(|_| LlmError::EmptyResponse)
        }
    }

    fn file(path: &str, content: &str) -> SourceFile {
        SourceFile { relative_path: path.to_owned(), content: content.to_owned() }
    }

    #[test]
    fn test_call_graph_names_and_attributes() {
        let graph = CallGraph::parse(SAMPLE);

        // top-level functions before methods
        assert_eq!(graph.functions().collect::<Vec<_>>(), vec!["load", "parse", "idle", "save"]);
        // shallowest first: `open` sits under the receiver of `.read()`
        assert_eq!(graph.calls("load").unwrap(), ["read", "parse", "open"]);
        assert_eq!(graph.calls("parse").unwrap(), ["split", "strip"]);
        assert_eq!(graph.calls("save").unwrap(), ["append", "join"]);
        assert!(graph.calls("idle").unwrap().is_empty());
    }

    #[test]
    fn test_call_graph_description_skips_leaf_functions() {
        let described = CallGraph::parse(SAMPLE).describe();
        assert!(described.contains("Function load calls: read, parse, open"));
        assert!(!described.contains("idle"));
    }

    #[test]
    fn test_call_graph_on_invalid_source_is_empty() {
        assert!(CallGraph::parse("def broken(:\n    pass").is_empty());
        assert!(CallGraph::parse("").is_empty());
    }

    #[test]
    fn test_prompt_carries_graph_and_code() {
        let completer = Canned::new(Ok("summary"));
        let tokenizer = Tokenizer::default();
        let summarizer =
            CodebaseSummarizer::new(&completer, &tokenizer, "gpt-4o-mini", SummaryOptions::new(1000, 4096));

        let prompt = summarizer.prompt(&file("a.py", SAMPLE), 10, 42);
        assert!(prompt.contains("Call graph:\nFunction load calls"));
        assert!(prompt.contains("\n\nCode:\n\nimport os"));
        assert!(prompt.contains("42 words"));
    }

    #[test]
    fn test_oversized_file_is_truncated_on_a_character_boundary() {
        let completer = Canned::new(Ok("summary"));
        let tokenizer = Tokenizer::default();
        let summarizer =
            CodebaseSummarizer::new(&completer, &tokenizer, "gpt-4o-mini", SummaryOptions::new(1000, 3));

        let content = "日本語のテキスト🎉🎉🎉";
        let prompt = summarizer.prompt(&file("a.py", content), tokenizer.count(content), 5);
        assert!(prompt.contains("Code:\n日本"));
        assert!(!prompt.contains("テキスト"));
    }

    #[test]
    fn test_entries_are_headed_by_path() {
        let completer = Canned::new(Ok("does things"));
        let tokenizer = Tokenizer::default();
        let summarizer =
            CodebaseSummarizer::new(&completer, &tokenizer, "gpt-4o-mini", SummaryOptions::new(1000, 4096));

        let summary = summarizer.summarize(&[file("pkg/a.py", SAMPLE), file("b.py", "x = 1\n")]);
        assert_eq!(summary.files, vec!["### pkg/a.py\n\ndoes things\n", "### b.py\n\ndoes things\n"]);
        assert!(!summary.truncated);
        assert_eq!(
            summary.render(SummaryFormat::Markdown).unwrap(),
            "### pkg/a.py\n\ndoes things\n\n### b.py\n\ndoes things\n"
        );
        assert_eq!(completer.prompts.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_budget_stops_the_walk() {
        let completer = Canned::new(Ok("one two three four five six seven eight"));
        let tokenizer = Tokenizer::default();
        let per_summary = tokenizer.count("one two three four five six seven eight");
        let options = SummaryOptions::new(per_summary * 2 + 1, 4096);
        let summarizer = CodebaseSummarizer::new(&completer, &tokenizer, "gpt-4o-mini", options);

        let files: Vec<_> = (0..5).map(|i| file(&format!("f{}.py", i), "pass\n")).collect();
        let summary = summarizer.summarize(&files);

        assert_eq!(summary.files.len(), 2);
        assert!(summary.truncated);
        assert!(summary.tokens <= per_summary * 2 + 1);
        // the third file was prompted, then rejected
        assert_eq!(completer.prompts.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_code_fragments_are_prefixed() {
        let completer = Canned::new(Ok("summary"));
        let tokenizer = Tokenizer::default();
        let mut options = SummaryOptions::new(10_000, 4096);
        options.include_code_fragments = true;
        let summarizer = CodebaseSummarizer::new(&completer, &tokenizer, "gpt-4o-mini", options);

        let content: String = (1..=15).map(|i| format!("line{}\n", i)).collect();
        let summary = summarizer.summarize(&[file("a.py", &content)]);

        let entry = &summary.files[0];
        assert!(entry.starts_with("### a.py\n\n```python\nline1\n"));
        assert!(entry.contains("line10\n```\nsummary"));
        assert!(!entry.contains("line11"));
    }

    #[test]
    fn test_failed_call_gives_empty_summary() {
        let completer = Canned::new(Err(()));
        let tokenizer = Tokenizer::default();
        let summarizer =
            CodebaseSummarizer::new(&completer, &tokenizer, "gpt-4o-mini", SummaryOptions::new(100, 4096));

        let summary = summarizer.summarize(&[file("a.py", "pass\n")]);
        assert_eq!(summary.files, vec!["### a.py\n\n\n"]);
    }

    #[test]
    fn test_json_render() {
        let summary = CodebaseSummary {
            files: vec!["### a.py\n\nx\n".to_owned()],
            tokens: 3,
            truncated: false,
        };
        let rendered = summary.render(SummaryFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value, serde_json::json!({"files": ["### a.py\n\nx\n"]}));
        assert!(rendered.contains("\n  \"files\""));
    }

    #[test]
    fn test_nothing_renders_empty() {
        let summary = CodebaseSummary::default();
        assert_eq!(summary.render(SummaryFormat::Json).unwrap(), "");
        assert_eq!(summary.render(SummaryFormat::Pseudo).unwrap(), "");
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<SummaryFormat>().unwrap(), SummaryFormat::Json);
        assert_eq!("Pseudo".parse::<SummaryFormat>().unwrap().extension(), "md");
        assert!("xml".parse::<SummaryFormat>().is_err());
    }
}
