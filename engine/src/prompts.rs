//! Prompt registry shared by every tool
//!
//! One [`Style`] enum maps a style tag to its prompt template. Templates use
//! three placeholders: `{words}` (target word count), `{json}` (the JSON
//! directive, or nothing) and `{content}` (the chunk or file body).

use crate::tokenizer::TokenCounter;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// System prompt for the text compressor
pub const TEXT_SYSTEM_PROMPT: &str = "You are a compression assistant. Your task is to compress text to a specified word count or summary format. \
Follow the specified compression style, using concise language while retaining essential details.";

/// System prompt for the codebase summarizer
pub const CODE_SYSTEM_PROMPT: &str = "You are a code compression assistant. Given a code file and a call graph, \
produce a short summary following the requested style.";

/// System prompt for the line explainer
pub const EXPLAIN_SYSTEM_PROMPT: &str =
    "You are a patient programming tutor. Explain code briefly and precisely, in plain language.";

/// Inserted at `{json}` when JSON output is requested
pub const JSON_DIRECTIVE: &str = " and format the output as JSON";

/// What a style is meant to compress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleKind {
    /// Natural-language documents
    Prose,
    /// Source code files
    Code,
}

/// Compression style registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Style {
    /// Readable narrative summary (default)
    #[default]
    Summary,
    /// Bullet points, one idea each
    BulletPoints,
    /// Key terms with definitions
    Glossary,
    /// Headings and subheadings
    Outline,
    /// Strengths, weaknesses and themes
    CriticalAnalysis,
    /// Verifiable facts and figures only
    Facts,
    /// Key terms and phrases
    Keywords,
    /// Architecture and important classes
    Architecture,
    /// One line per function
    FunctionSummaries,
    /// Pseudocode for the complex parts
    AlgorithmSketches,
    /// Imports and side effects
    DependencyMap,
    /// Unique logic only, boilerplate collapsed
    BoilerplateCollapse,
}

impl Style {
    /// Every registered style, prose first
    pub const ALL: [Style; 12] = [
        Self::Summary,
        Self::BulletPoints,
        Self::Glossary,
        Self::Outline,
        Self::CriticalAnalysis,
        Self::Facts,
        Self::Keywords,
        Self::Architecture,
        Self::FunctionSummaries,
        Self::AlgorithmSketches,
        Self::DependencyMap,
        Self::BoilerplateCollapse,
    ];

    /// Canonical tag
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::BulletPoints => "bullet-points",
            Self::Glossary => "glossary",
            Self::Outline => "outline",
            Self::CriticalAnalysis => "critical-analysis",
            Self::Facts => "facts",
            Self::Keywords => "keywords",
            Self::Architecture => "architecture",
            Self::FunctionSummaries => "function-summaries",
            Self::AlgorithmSketches => "algorithm-sketches",
            Self::DependencyMap => "dependency-map",
            Self::BoilerplateCollapse => "boilerplate-collapse",
        }
    }

    /// Older tags still accepted on input
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Summary => &["narrative-summary", "auto-detect", "auto"],
            Self::Glossary => &["glossary-terms"],
            Self::Facts => &["facts-database"],
            Self::Keywords => &["keywords-keyphrases"],
            Self::Architecture => &["architecture-outline"],
            _ => &[],
        }
    }

    /// Resolve a tag or alias; `_` and `-` are interchangeable
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|s| s.tag() == tag || s.aliases().contains(&tag.as_str()))
    }

    /// What this style is meant for
    pub fn kind(&self) -> StyleKind {
        match self {
            Self::Summary
            | Self::BulletPoints
            | Self::Glossary
            | Self::Outline
            | Self::CriticalAnalysis
            | Self::Facts
            | Self::Keywords => StyleKind::Prose,
            _ => StyleKind::Code,
        }
    }

    /// One-line description for listings
    pub fn description(&self) -> &'static str {
        match self {
            Self::Summary => "Readable story-like summary (default)",
            Self::BulletPoints => "Bullet points, one essential idea each",
            Self::Glossary => "Key terms and concepts as a glossary",
            Self::Outline => "Hierarchical headings and subheadings",
            Self::CriticalAnalysis => "Strengths, weaknesses and themes",
            Self::Facts => "Factual statements and figures only",
            Self::Keywords => "Essential terms and phrases",
            Self::Architecture => "Architecture and important classes",
            Self::FunctionSummaries => "One line summary per function",
            Self::AlgorithmSketches => "Short pseudocode for complex parts",
            Self::DependencyMap => "Imports and side effects",
            Self::BoilerplateCollapse => "Unique logic only, boilerplate collapsed",
        }
    }

    /// Raw template with `{words}`, `{json}` and `{content}` placeholders
    pub fn template(&self) -> &'static str {
        match self {
            Self::Summary => "Provide a concise narrative that conveys the main ideas and story arc of the following text, aiming for around {words} words{json}. Structure it as if telling the story to someone unfamiliar with the topic:\n\n{content}",
            Self::BulletPoints => "Summarize the following text into clear bullet points, with each point capturing an essential idea. Aim for approximately {words} words{json}:\n\n{content}",
            Self::Glossary => "Extract and define key terms and concepts from the following text, presenting them as a glossary list. Aim for around {words} words{json}:\n\n{content}",
            Self::Outline => "Create a structured outline with headings and subheadings, capturing the primary structure and flow of the text. Aim for around {words} words{json}. Use hierarchical headings to emphasize key points and their relationships:\n\n{content}",
            Self::CriticalAnalysis => "Provide a brief analysis of the main points, discussing strengths, weaknesses, or important themes present in the text. Aim for around {words} words{json}:\n\n{content}",
            Self::Facts => "Extract factual statements from the following text, summarizing key details, statistics, and verifiable information. Aim for around {words} words{json}:\n\n{content}",
            Self::Keywords => "List key terms and phrases that represent the main ideas of the following text. Limit the list to approximately {words} words{json}:\n\n{content}",
            Self::Architecture => "Describe the architecture and important classes of the following code in around {words} words{json}:\n\n{content}",
            Self::FunctionSummaries => "Give a one line summary for each function in the following code, using around {words} words in total{json}:\n\n{content}",
            Self::AlgorithmSketches => "Write short pseudocode for the complex parts of the following code, using around {words} words{json}:\n\n{content}",
            Self::DependencyMap => "Explain the imports and side effects of the following code in around {words} words{json}:\n\n{content}",
            Self::BoilerplateCollapse => "Only keep the unique logic of the following code, collapsing boilerplate, in around {words} words{json}:\n\n{content}",
        }
    }

    /// Fill the template
    pub fn render(&self, words: usize, json: bool, content: &str) -> String {
        self.template()
            .replace("{words}", &words.to_string())
            .replace("{json}", json_directive(json))
            .replace("{content}", content)
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| {
            let known: Vec<_> = Self::ALL.iter().map(|s| s.tag()).collect();
            format!("unknown style '{}' (expected one of: {})", s, known.join(", "))
        })
    }
}

/// The JSON directive for a flag value
pub fn json_directive(json: bool) -> &'static str {
    if json {
        JSON_DIRECTIVE
    } else {
        ""
    }
}

/// Largest prompt overhead (system + empty template) across `styles`
pub fn reserved_prompt_tokens<C: TokenCounter + ?Sized>(
    counter: &C,
    system: &str,
    styles: &[Style],
    json: bool,
) -> usize {
    styles
        .iter()
        .map(|style| counter.count(&format!("{}{}", system, style.render(0, json, ""))))
        .max()
        .unwrap_or(0)
}

/// User prompt asking for a single line of code to be explained
pub fn explain_prompt(language: &str, line: &str) -> String {
    format!("Explain the following {} code:\n\n{}\n", language, line)
}
