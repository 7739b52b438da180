//! Fenced code block extraction from raw AI responses.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{ArtifactType, CodeArtifact};

/// `// File: X.cs`, `# file: x.py`, `/* filename: X.cs */` on a block's first line.
static FIRST_LINE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?://|#|--|/\*)\s*(?:file(?:name)?|path)\s*:\s*([^\s*]+)\s*(?:\*/)?\s*$")
        .expect("static regex")
});

/// `### X.cs`, `**X.cs**`, `File: X.cs`, `` `X.cs` `` on the line before a fence.
static HEADING_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:#+\s*)?(?:\d+\.\s*)?(?:\*\*)?(?:file(?:name)?\s*:\s*)?`?([A-Za-z0-9_.\-/\\]+\.[A-Za-z0-9]+)`?(?:\*\*)?:?\s*$",
    )
    .expect("static regex")
});

/// Outcome of parsing one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub artifacts: Vec<CodeArtifact>,
    /// True when no code block was found and the whole response was kept.
    pub degraded: bool,
}

struct Block {
    info: String,
    heading: Option<String>,
    lines: Vec<String>,
}

/// Split `response` into artifacts, one per non-empty fenced block.
///
/// With no usable block the whole response becomes a single artifact named
/// `default_file_name`. `forced_type` overrides name-based type inference.
#[must_use]
pub fn parse_code_blocks(
    response: &str,
    default_file_name: &str,
    forced_type: Option<ArtifactType>,
) -> ParsedResponse {
    let blocks = scan_blocks(response);
    let (stem, default_ext) = split_name(default_file_name);

    let mut artifacts = Vec::new();
    let mut unnamed = 0usize;
    for block in blocks {
        let content = block.lines.join("\n");
        if content.trim().is_empty() {
            continue;
        }
        let (language, info_name) = parse_info_string(&block.info);
        let name = info_name
            .as_deref()
            .and_then(usable_file_name)
            .or_else(|| {
                block.lines.first().and_then(|line| {
                    FIRST_LINE_NAME
                        .captures(line)
                        .and_then(|c| usable_file_name(&c[1]))
                })
            })
            .or_else(|| block.heading.as_deref().and_then(usable_file_name));

        let file_name = match name {
            Some(name) => name,
            None => {
                unnamed += 1;
                let ext = language
                    .as_deref()
                    .and_then(extension_for_language)
                    .unwrap_or(default_ext);
                if ext.is_empty() {
                    format!("{stem}{unnamed}")
                } else {
                    format!("{stem}{unnamed}.{ext}")
                }
            }
        };

        let file_type = forced_type.unwrap_or_else(|| ArtifactType::infer(&file_name));
        artifacts.push(CodeArtifact::new(file_name, ensure_trailing_newline(content), file_type));
    }

    if artifacts.is_empty() {
        let file_type = forced_type.unwrap_or_else(|| ArtifactType::infer(default_file_name));
        return ParsedResponse {
            artifacts: vec![CodeArtifact::new(default_file_name, response, file_type)],
            degraded: true,
        };
    }

    ParsedResponse {
        artifacts,
        degraded: false,
    }
}

/// Line scanner for ``` fences. An unterminated final block runs to the end.
fn scan_blocks(response: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;
    let mut last_text_line: Option<&str> = None;

    for line in response.lines() {
        let trimmed = line.trim_start();
        match current.as_mut() {
            None => {
                if let Some(info) = trimmed.strip_prefix("```") {
                    current = Some(Block {
                        info: info.trim().to_string(),
                        heading: last_text_line
                            .and_then(|l| HEADING_NAME.captures(l.trim()))
                            .map(|c| c[1].to_string()),
                        lines: Vec::new(),
                    });
                } else if !trimmed.is_empty() {
                    last_text_line = Some(line);
                }
            }
            Some(block) => {
                if trimmed.starts_with("```") && trimmed.trim_start_matches('`').trim().is_empty() {
                    if let Some(done) = current.take() {
                        blocks.push(done);
                    }
                    last_text_line = None;
                } else {
                    block.lines.push(line.to_string());
                }
            }
        }
    }
    if let Some(block) = current {
        blocks.push(block);
    }
    blocks
}

/// Returns `(language, file name)` from an info string such as
/// `csharp:UserService.cs`, `csharp filename=UserService.cs` or `UserService.cs`.
fn parse_info_string(info: &str) -> (Option<String>, Option<String>) {
    let info = info.trim();
    if info.is_empty() {
        return (None, None);
    }

    let mut tokens = info.split_whitespace();
    let first = tokens.next().unwrap_or_default();

    let (language, mut name) = match first.split_once(':') {
        Some((lang, file)) if !file.is_empty() => (Some(lang.to_string()), Some(file.to_string())),
        Some((lang, _)) => (Some(lang.to_string()), None),
        None if looks_like_file_name(first) => (None, Some(first.to_string())),
        None => (Some(first.to_string()), None),
    };

    for token in tokens {
        if name.is_some() {
            break;
        }
        let token = token
            .strip_prefix("filename=")
            .or_else(|| token.strip_prefix("file="))
            .or_else(|| token.strip_prefix("title="))
            .unwrap_or(token)
            .trim_matches(['"', '\'']);
        if looks_like_file_name(token) {
            name = Some(token.to_string());
        }
    }

    (language.map(|l| l.to_ascii_lowercase()), name)
}

fn looks_like_file_name(token: &str) -> bool {
    let base = base_name(token);
    match base.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Last path component, so AI-supplied directories never escape the layout.
fn base_name(name: &str) -> String {
    name.trim()
        .trim_matches(['`', '*', '"', '\''])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .to_string()
}

/// The last path component of an AI-supplied name, or `None` when it is
/// empty or made only of dots (`.`, `..`).
fn usable_file_name(name: &str) -> Option<String> {
    let base = base_name(name);
    if base.trim_matches('.').is_empty() {
        None
    } else {
        Some(base)
    }
}

fn split_name(file_name: &str) -> (&str, &str) {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (file_name, ""),
    }
}

fn extension_for_language(language: &str) -> Option<&'static str> {
    let ext = match language {
        "csharp" | "cs" | "c#" => "cs",
        "rust" | "rs" => "rs",
        "python" | "py" => "py",
        "typescript" | "ts" => "ts",
        "tsx" => "tsx",
        "javascript" | "js" => "js",
        "java" => "java",
        "kotlin" | "kt" => "kt",
        "go" | "golang" => "go",
        "json" => "json",
        "xml" | "csproj" => "xml",
        "sql" => "sql",
        "yaml" | "yml" => "yaml",
        "html" => "html",
        "css" => "css",
        "bash" | "sh" | "shell" => "sh",
        _ => return None,
    };
    Some(ext)
}

fn ensure_trailing_newline(mut content: String) -> String {
    if !content.ends_with('\n') {
        content.push('\n');
    }
    content
}
