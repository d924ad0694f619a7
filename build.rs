use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories that hold this crate's own Rust sources. Everything else under
// the project root (target/, vendored material) is out of scope for the policy.
const SOURCE_ROOTS: [&str; 4] = ["engine", "src", "tests", "benches"];

// Collects every matching line of one file for a single policy rule.
struct PolicyCollector {
    violations: Vec<String>,
    file_path: PathBuf,
    rule: Rule,
}

#[derive(Clone, Copy)]
enum Rule {
    UnderscorePrefix,
    ForbiddenCommentWord,
    AllCapsComment,
    AllowDeadCode,
}

impl Rule {
    fn pattern(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => r"\b(_[a-zA-Z0-9_]+)\b",
            Rule::ForbiddenCommentWord => {
                r"(//|/\*).*(?:FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|UPDATED|UPDATE)"
            }
            Rule::AllCapsComment => r"(//|/\*).*",
            Rule::AllowDeadCode => r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]",
        }
    }

    fn explanation(self) -> &'static str {
        match self {
            Rule::UnderscorePrefix => {
                "Underscore-prefixed variable names are not allowed in this project.\n   Either use the variable (removing the underscore) or remove it completely."
            }
            Rule::ForbiddenCommentWord => {
                "Comments describe the code as it is, not its edit history (FIX, NEW, UPDATE, ...)."
            }
            Rule::AllCapsComment => "Comments written entirely in capitals are not allowed.",
            Rule::AllowDeadCode => {
                "#[allow(dead_code)] attributes are STRICTLY FORBIDDEN in this project.\n   Either use the code (removing the attribute) or remove it completely."
            }
        }
    }
}

impl PolicyCollector {
    fn new(file_path: &Path, rule: Rule) -> Self {
        Self {
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
            rule,
        }
    }

    fn check_and_get_error_message(&self) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }

        let file_name = self.file_path.to_str().unwrap_or("?");
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} policy violations in {}:\n",
            self.violations.len(),
            file_name
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!("\n⚠️ {}\n", self.rule.explanation()));
        Some(error_msg)
    }
}

impl Sink for PolicyCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();

        let keep = match self.rule {
            Rule::UnderscorePrefix => !is_comment_or_string_match(line_text),
            Rule::AllCapsComment => comment_is_all_caps(line_text),
            Rule::ForbiddenCommentWord | Rule::AllowDeadCode => true,
        };
        if keep {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn is_comment_or_string_match(line_text: &str) -> bool {
    if line_text.trim_start().starts_with("//") {
        return true;
    }
    // odd-indexed pieces of a quote split are string contents
    line_text
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'))
}

fn comment_is_all_caps(line_text: &str) -> bool {
    let trimmed = line_text.trim_start();
    let comment_text = if let Some(rest) = trimmed.strip_prefix("///") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        rest
    } else {
        return false;
    };
    let alpha_chars: Vec<char> = comment_text.chars().filter(|c| c.is_alphabetic()).collect();
    !alpha_chars.is_empty() && alpha_chars.iter().all(|c| c.is_uppercase())
}

fn source_files() -> impl Iterator<Item = PathBuf> {
    SOURCE_ROOTS.iter().flat_map(|root| {
        WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
            .map(|e| e.path().to_path_buf())
    })
}

fn scan(rule: Rule) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(rule.pattern())?;
    let mut searcher = Searcher::new();

    for path in source_files() {
        let mut collector = PolicyCollector::new(&path, rule);
        searcher.search_path(&matcher, &path, &mut collector)?;
        if let Some(error_message) = collector.check_and_get_error_message() {
            return Err(error_message.into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for root in SOURCE_ROOTS {
        println!("cargo:rerun-if-changed={root}");
    }

    for rule in [
        Rule::UnderscorePrefix,
        Rule::ForbiddenCommentWord,
        Rule::AllCapsComment,
        Rule::AllowDeadCode,
    ] {
        if let Err(e) = scan(rule) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
