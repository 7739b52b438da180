//! Lightweight syntax checks over generated code
//!
//! Not a compiler pass. The scanner tracks comments, strings and char
//! literals well enough to balance brackets in C-family sources, and flags
//! obviously truncated statements. Issues are reported, never fatal.

use serde::{Deserialize, Serialize};

use crate::types::CodeArtifact;

/// Extensions whose sources use `{}`/`()`/`[]` blocks.
const BRACE_LANGUAGES: &[&str] = &[
    "cs", "java", "js", "ts", "tsx", "jsx", "go", "c", "h", "cpp", "hpp", "kt", "swift",
    "scala", "php", "dart",
];

/// Extensions where statements end in `;`.
const SEMICOLON_LANGUAGES: &[&str] = &["cs", "java"];

const STATEMENT_KEYWORDS: &[&str] = &["return", "throw", "var", "using"];

/// Line endings that continue a statement onto the next line.
const CONTINUATION_SUFFIXES: &[&str] = &[
    ";", "{", "}", "(", "[", ",", "=", "=>", "+", "-", "*", "/", "?", ":", "&&", "||", ".", "??",
];

/// Line starts that continue the previous line's statement.
const CONTINUATION_PREFIXES: &[&str] = &[".", "?", ":", "+", "-", "*", "&&", "||", "=>", "(", "{", ")", "??"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxIssue {
    /// 1-based; `None` for whole-file issues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
}

impl SyntaxIssue {
    fn at(line: usize, message: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            message: message.into(),
        }
    }
}

/// Issues found in one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileValidation {
    pub file_name: String,
    pub issues: Vec<SyntaxIssue>,
}

impl FileValidation {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CodeValidator;

impl CodeValidator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// True when every artifact passes.
    #[must_use]
    pub fn validate(&self, artifacts: &[CodeArtifact]) -> bool {
        self.validate_all(artifacts).iter().all(FileValidation::is_valid)
    }

    /// Per-artifact results, in input order.
    #[must_use]
    pub fn validate_all(&self, artifacts: &[CodeArtifact]) -> Vec<FileValidation> {
        artifacts
            .iter()
            .map(|artifact| FileValidation {
                file_name: artifact.file_name.clone(),
                issues: self.validate_file(&artifact.file_name, &artifact.content),
            })
            .collect()
    }

    /// Checks chosen by the file's extension.
    #[must_use]
    pub fn validate_file(&self, file_name: &str, content: &str) -> Vec<SyntaxIssue> {
        if content.trim().is_empty() {
            return vec![SyntaxIssue {
                line: None,
                message: "File is empty".to_string(),
            }];
        }
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        if ext.is_empty() || BRACE_LANGUAGES.contains(&ext.as_str()) {
            let ScanOutput {
                mut issues,
                stripped,
            } = scan(content);
            if ext.is_empty() || SEMICOLON_LANGUAGES.contains(&ext.as_str()) {
                issues.extend(unterminated_statements(&stripped));
            }
            issues.sort_by_key(|issue| issue.line.unwrap_or(0));
            issues
        } else {
            Vec::new()
        }
    }

    /// Bracket balance and literal termination for C-family source.
    #[must_use]
    pub fn validate_syntax(&self, content: &str) -> Vec<SyntaxIssue> {
        if content.trim().is_empty() {
            return vec![SyntaxIssue {
                line: None,
                message: "File is empty".to_string(),
            }];
        }
        scan(content).issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    LineComment,
    BlockComment { start: usize },
    Str { start: usize },
    Verbatim { start: usize },
    Char { start: usize },
}

struct ScanOutput {
    issues: Vec<SyntaxIssue>,
    /// Source with comments removed and literal contents blanked.
    stripped: String,
}

fn scan(content: &str) -> ScanOutput {
    let mut issues = Vec::new();
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut stripped = String::with_capacity(content.len());
    let mut mode = Mode::Code;
    let mut line = 1usize;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            match mode {
                Mode::LineComment => mode = Mode::Code,
                Mode::Str { start } => {
                    issues.push(SyntaxIssue::at(start, "Unterminated string literal"));
                    mode = Mode::Code;
                }
                Mode::Char { start } => {
                    issues.push(SyntaxIssue::at(start, "Unterminated character literal"));
                    mode = Mode::Code;
                }
                _ => {}
            }
            stripped.push('\n');
            line += 1;
            continue;
        }

        match mode {
            Mode::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    mode = Mode::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    mode = Mode::BlockComment { start: line };
                }
                '@' | '$' if chars.peek() == Some(&'"') => {
                    chars.next();
                    stripped.push('"');
                    mode = if c == '@' {
                        Mode::Verbatim { start: line }
                    } else {
                        Mode::Str { start: line }
                    };
                }
                '"' => {
                    stripped.push('"');
                    mode = Mode::Str { start: line };
                }
                '\'' => {
                    stripped.push('\'');
                    mode = Mode::Char { start: line };
                }
                '{' | '(' | '[' => {
                    stack.push((c, line));
                    stripped.push(c);
                }
                '}' | ')' | ']' => {
                    let expected_open = opening_for(c);
                    match stack.pop() {
                        Some((open, _)) if open == expected_open => {}
                        Some((open, open_line)) => issues.push(SyntaxIssue::at(
                            line,
                            format!(
                                "Mismatched '{c}': expected '{}' to close '{open}' from line {open_line}",
                                closing_for(open)
                            ),
                        )),
                        None => issues.push(SyntaxIssue::at(line, format!("Unexpected '{c}'"))),
                    }
                    stripped.push(c);
                }
                _ => stripped.push(c),
            },
            Mode::LineComment => {}
            Mode::BlockComment { .. } => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    mode = Mode::Code;
                }
            }
            Mode::Str { .. } => match c {
                '\\' => {
                    if chars.peek() != Some(&'\n') {
                        chars.next();
                    }
                }
                '"' => {
                    stripped.push('"');
                    mode = Mode::Code;
                }
                _ => {}
            },
            Mode::Verbatim { .. } => {
                if c == '"' {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                    } else {
                        stripped.push('"');
                        mode = Mode::Code;
                    }
                }
            }
            Mode::Char { .. } => match c {
                '\\' => {
                    if chars.peek() != Some(&'\n') {
                        chars.next();
                    }
                }
                '\'' => {
                    stripped.push('\'');
                    mode = Mode::Code;
                }
                _ => {}
            },
        }
    }

    match mode {
        Mode::BlockComment { start } => {
            issues.push(SyntaxIssue::at(start, "Unterminated block comment"));
        }
        Mode::Str { start } | Mode::Verbatim { start } => {
            issues.push(SyntaxIssue::at(start, "Unterminated string literal"));
        }
        Mode::Char { start } => {
            issues.push(SyntaxIssue::at(start, "Unterminated character literal"));
        }
        Mode::Code | Mode::LineComment => {}
    }

    for (open, open_line) in stack.into_iter().rev() {
        issues.push(SyntaxIssue::at(
            open_line,
            format!("Unclosed '{open}' (missing '{}')", closing_for(open)),
        ));
    }

    ScanOutput { issues, stripped }
}

const fn opening_for(close: char) -> char {
    match close {
        '}' => '{',
        ')' => '(',
        _ => '[',
    }
}

const fn closing_for(open: char) -> char {
    match open {
        '{' => '}',
        '(' => ')',
        _ => ']',
    }
}

/// `return`/`throw`/`var`/`using` lines with no `;` and no continuation.
fn unterminated_statements(stripped: &str) -> Vec<SyntaxIssue> {
    let lines: Vec<&str> = stripped.lines().collect();
    let mut issues = Vec::new();

    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        let Some(keyword) = STATEMENT_KEYWORDS.iter().find(|kw| starts_with_keyword(line, kw)) else {
            continue;
        };
        if CONTINUATION_SUFFIXES.iter().any(|s| line.ends_with(s)) {
            continue;
        }
        let next = lines[idx + 1..]
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty());
        if next.is_some_and(|n| CONTINUATION_PREFIXES.iter().any(|p| n.starts_with(p))) {
            continue;
        }
        issues.push(SyntaxIssue::at(
            idx + 1,
            format!("'{keyword}' statement is not terminated with ';'"),
        ));
    }
    issues
}

fn starts_with_keyword(line: &str, keyword: &str) -> bool {
    line.strip_prefix(keyword)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArtifactType;

    fn check(content: &str) -> Vec<SyntaxIssue> {
        CodeValidator::new().validate_file("Sample.cs", content)
    }

    #[test]
    fn test_well_formed_csharp_passes() {
        let source = r#"
using System;

namespace Shop
{
    // a comment with { unbalanced
    public class Cart
    {
        private readonly string _path = @"C:\data\""cart"".json";
        private const char Open = '{';

        public decimal Total(decimal[] prices)
        {
            var sum = prices
                .Where(p => p > 0)
                .Sum();
            /* block ( comment */
            return sum;
        }

        public string Label() => $"Total: {Total(new decimal[0])}";
    }
}
"#;
        assert_eq!(check(source), Vec::new());
    }

    #[test]
    fn test_missing_closing_brace_reports_opening_line() {
        let issues = check("public class A\n{\n    void M() {\n    }\n");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].line, Some(2));
        assert!(issues[0].message.contains("Unclosed '{'"));
    }

    #[test]
    fn test_mismatched_and_unexpected_closers() {
        let issues = check("void M() {\n    call(1];\n}\n}\n");
        assert!(issues.iter().any(|i| i.line == Some(2) && i.message.contains("Mismatched ']'")));
        assert!(issues.iter().any(|i| i.line == Some(4) && i.message.contains("Unexpected '}'")));
    }

    #[test]
    fn test_unterminated_literals_and_comments() {
        let issues = check("var s = \"open;\nvar t = 1;\n");
        assert!(issues.iter().any(|i| i.message == "Unterminated string literal" && i.line == Some(1)));

        let issues = check("class A {}\n/* never closed\n");
        assert!(issues.iter().any(|i| i.message == "Unterminated block comment"));
    }

    #[test]
    fn test_unterminated_return_is_flagged() {
        let issues = check("int M()\n{\n    return 42\n}\n");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].line, Some(3));
        assert!(issues[0].message.contains("'return'"));
    }

    #[test]
    fn test_multiline_statements_are_not_flagged() {
        let source = "object M()\n{\n    return new Thing\n    {\n        Name = \"x\"\n    };\n}\n";
        assert_eq!(check(source), Vec::new());
    }

    #[test]
    fn test_empty_file() {
        let issues = check("   \n");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].line, None);
    }

    #[test]
    fn test_non_code_files_only_get_empty_check() {
        let validator = CodeValidator::new();
        assert!(validator.validate_file("notes.md", "{ unbalanced").is_empty());
        assert!(!validator.validate_file("notes.md", "").is_empty());
    }

    #[test]
    fn test_validate_over_artifacts() {
        let validator = CodeValidator::new();
        let good = CodeArtifact::new("A.cs", "class A {}\n", ArtifactType::Implementation);
        let bad = CodeArtifact::new("B.cs", "class B {\n", ArtifactType::Implementation);
        assert!(validator.validate(std::slice::from_ref(&good)));
        assert!(!validator.validate(&[good.clone(), bad.clone()]));

        let results = validator.validate_all(&[good, bad]);
        assert!(results[0].is_valid());
        assert_eq!(results[1].file_name, "B.cs");
        assert_eq!(results[1].issues.len(), 1);
    }
}
