//! Script preprocessing: `#include` and `#define` directives.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use qd_common::{QdError, QdResult};

/// Nesting limit for `#include`.
const MAX_INCLUDE_DEPTH: usize = 16;

/// Expands includes and defines line by line.
#[derive(Debug, Default)]
pub struct Preprocessor {
    defines: HashMap<String, String>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: &str, value: &str) {
        self.defines.insert(name.to_string(), value.to_string());
    }

    /// Read and expand a script file.
    pub fn read_file(&mut self, path: &Path) -> QdResult<String> {
        self.file(path, 0)
    }

    /// Expand script text. Includes are looked up as given, then relative
    /// to `base_dir`.
    pub fn expand(&mut self, text: &str, base_dir: Option<&Path>) -> QdResult<String> {
        self.text(text, base_dir, 0)
    }

    fn file(&mut self, path: &Path, depth: usize) -> QdResult<String> {
        if !path.is_file() {
            return Err(QdError::FileNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        self.text(&text, path.parent(), depth)
    }

    fn text(&mut self, text: &str, base_dir: Option<&Path>, depth: usize) -> QdResult<String> {
        let mut out = String::with_capacity(text.len());
        for line in text.lines() {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix("#include") {
                if depth >= MAX_INCLUDE_DEPTH {
                    return Err(QdError::invalid("#include", "include files nested too deeply"));
                }
                let name = rest.trim().trim_matches('"');
                if name.is_empty() {
                    return Err(QdError::MissingArgument("#include".to_string()));
                }
                let included = self.file(&include_path(name, base_dir), depth + 1)?;
                out.push_str(&included);
            } else if let Some(rest) = trimmed.strip_prefix("#define") {
                let mut parts = rest.split_whitespace();
                let name = parts
                    .next()
                    .ok_or_else(|| QdError::MissingArgument("#define".to_string()))?;
                let value = parts.collect::<Vec<_>>().join(" ");
                self.define(name, &value);
            } else {
                out.push_str(&self.substitute(line));
                out.push('\n');
            }
        }
        Ok(out)
    }

    /// Replace whole tokens that name a define.
    fn substitute(&self, line: &str) -> String {
        if self.defines.is_empty() {
            return line.to_string();
        }
        line.split_whitespace()
            .map(|token| self.defines.get(token).map_or(token, String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn include_path(name: &str, base_dir: Option<&Path>) -> PathBuf {
    let direct = PathBuf::from(name);
    match base_dir {
        Some(dir) if !direct.exists() => dir.join(name),
        _ => direct,
    }
}
