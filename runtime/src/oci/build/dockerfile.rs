//! Dockerfile stage parser.
//!
//! Splits a Dockerfile into its build stages. Only `FROM` and the `ARG`
//! instructions that precede the first `FROM` are interpreted; every other
//! instruction is kept verbatim for the build engine. Supports line
//! continuations (`\`) and comments.

use layerforge_core::error::{ForgeError, Result};

use super::stage::Stage;

/// An `ARG` declared before the first `FROM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaArg {
    pub name: String,
    pub default: Option<String>,
}

/// A stage as declared in the Dockerfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerfileStage {
    pub stage: Stage,
    /// Value of `FROM --platform=<platform>`
    pub platform: Option<String>,
    /// Instructions following the `FROM` line, uninterpreted
    pub instructions: Vec<String>,
}

/// Parsed Dockerfile: meta args followed by stages in declaration order.
#[derive(Debug, Clone)]
pub struct Dockerfile {
    pub meta_args: Vec<MetaArg>,
    pub stages: Vec<DockerfileStage>,
}

impl Dockerfile {
    /// Parse a Dockerfile from its text content.
    pub fn parse(content: &str) -> Result<Self> {
        let mut meta_args = Vec::new();
        let mut stages: Vec<DockerfileStage> = Vec::new();

        for (line_num, line) in join_continuation_lines(content) {
            let trimmed = line.trim();

            // Skip empty lines, comments and parser directives
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let (keyword, rest) = split_first_word(trimmed);
            match keyword.to_uppercase().as_str() {
                "FROM" => {
                    let stage = parse_from(rest, stages.len(), line_num)?;
                    if !stage.stage.name.is_empty()
                        && stages.iter().any(|s| s.stage.name == stage.stage.name)
                    {
                        return Err(ForgeError::ParseFailure(format!(
                            "Line {}: duplicate stage name '{}'",
                            line_num, stage.stage.name
                        )));
                    }
                    stages.push(stage);
                }
                "ARG" if stages.is_empty() => meta_args.push(parse_arg(rest, line_num)?),
                _ => match stages.last_mut() {
                    Some(current) => current.instructions.push(trimmed.to_string()),
                    None => {
                        return Err(ForgeError::ParseFailure(format!(
                            "Line {}: {} before FROM (only ARG may precede the first FROM)",
                            line_num,
                            keyword.to_uppercase()
                        )))
                    }
                },
            }
        }

        if stages.is_empty() {
            return Err(ForgeError::ParseFailure(
                "Dockerfile contains no FROM instruction".to_string(),
            ));
        }

        Ok(Dockerfile { meta_args, stages })
    }

    /// Parse a Dockerfile from a file path.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ForgeError::ParseFailure(format!(
                "Failed to read Dockerfile at {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    /// The stage list in declaration order.
    pub fn stage_list(&self) -> Vec<Stage> {
        self.stages.iter().map(|s| s.stage.clone()).collect()
    }
}

/// Join lines ending with `\` into single logical lines.
///
/// Each logical line carries the 1-based number of its first physical line.
fn join_continuation_lines(content: &str) -> Vec<(usize, String)> {
    let mut logical_lines = Vec::new();
    let mut current = String::new();
    let mut start = 0;

    for (i, line) in content.lines().enumerate() {
        if current.is_empty() {
            start = i + 1;
        }
        if let Some(stripped) = line.strip_suffix('\\') {
            current.push_str(stripped.trim_end());
            current.push(' ');
        } else {
            current.push_str(line);
            logical_lines.push((start, std::mem::take(&mut current)));
        }
    }

    // Trailing continuation without a final line
    if !current.is_empty() {
        logical_lines.push((start, current));
    }

    logical_lines
}

/// Split a string into the first word and the rest.
fn split_first_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim_start()),
        None => (s, ""),
    }
}

/// Parse `FROM [--platform=<p>] <image> [AS <name>]`.
fn parse_from(rest: &str, index: usize, line_num: usize) -> Result<DockerfileStage> {
    let mut words = rest.split_whitespace().peekable();

    let mut platform = None;
    while let Some(flag) = words.peek().copied().and_then(|w| w.strip_prefix("--")) {
        match flag.split_once('=') {
            Some(("platform", value)) => platform = Some(value.to_string()),
            _ => {
                return Err(ForgeError::ParseFailure(format!(
                    "Line {}: unsupported FROM flag '--{}'",
                    line_num, flag
                )))
            }
        }
        words.next();
    }

    let image = words.next().ok_or_else(|| {
        ForgeError::ParseFailure(format!(
            "Line {}: FROM requires an image argument",
            line_num
        ))
    })?;

    let name = match (words.next(), words.next(), words.next()) {
        (None, _, _) => String::new(),
        (Some(kw), Some(alias), None) if kw.eq_ignore_ascii_case("AS") => {
            let alias = alias.to_lowercase();
            validate_stage_name(&alias, line_num)?;
            alias
        }
        _ => {
            return Err(ForgeError::ParseFailure(format!(
                "Line {}: FROM expects '<image> [AS <name>]', got '{}'",
                line_num, rest
            )))
        }
    };

    Ok(DockerfileStage {
        stage: Stage::new(name, image, index),
        platform,
        instructions: Vec::new(),
    })
}

/// Stage names must start with a letter and contain only `[a-z0-9._-]`.
fn validate_stage_name(name: &str, line_num: usize) -> Result<()> {
    let valid = name.starts_with(|c: char| c.is_ascii_lowercase())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));

    if valid {
        Ok(())
    } else {
        Err(ForgeError::ParseFailure(format!(
            "Line {}: invalid stage name '{}'",
            line_num, name
        )))
    }
}

fn parse_arg(rest: &str, line_num: usize) -> Result<MetaArg> {
    if rest.is_empty() {
        return Err(ForgeError::ParseFailure(format!(
            "Line {}: ARG requires a name",
            line_num
        )));
    }

    match rest.split_once('=') {
        Some((name, default)) => Ok(MetaArg {
            name: name.trim().to_string(),
            default: Some(unquote(default)),
        }),
        None => Ok(MetaArg {
            name: rest.trim().to_string(),
            default: None,
        }),
    }
}

/// Remove surrounding quotes from a string.
fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}
