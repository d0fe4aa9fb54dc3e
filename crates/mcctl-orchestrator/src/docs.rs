//! ---
//! mcctl_section: "01-core-functionality"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Read-only access to bundled markdown documentation."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use strum::Display;
use tracing::{debug, warn};
use walkdir::WalkDir;

const VARIABLES_FILE: &str = "03-variables.md";

/// One markdown document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocTopic {
    /// File stem, used to address the topic.
    pub slug: String,
    /// First level-one heading, or the slug.
    pub title: String,
    /// Location on disk.
    pub path: PathBuf,
}

/// Value shape of a server environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
#[allow(missing_docs)]
pub enum EnvVarKind {
    Boolean,
    Number,
    Memory,
    String,
}

/// One documented server environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVarDoc {
    /// Variable name without markup.
    pub name: String,
    /// Inferred value shape.
    pub kind: EnvVarKind,
    /// Default value, `None` when documented as `-`.
    pub default: Option<String>,
    /// Description with bold markers removed.
    pub description: String,
    /// The description mentions the variable is required.
    pub required: bool,
    /// Heading of the section the table sits under.
    pub category: String,
}

/// Errors raised by the docs adapter.
#[derive(Debug, thiserror::Error)]
pub enum DocsError {
    /// No topic with that slug.
    #[error("documentation topic '{0}' not found")]
    UnknownTopic(String),
    /// Reading the docs directory failed.
    #[error("documentation io error: {0}")]
    Io(#[from] io::Error),
}

/// Capability interface over static documentation.
pub trait DocsAdapter: Send + Sync {
    /// All topics, sorted by slug.
    fn list_topics(&self) -> Result<Vec<DocTopic>, DocsError>;

    /// Raw markdown of one topic.
    fn read(&self, slug: &str) -> Result<String, DocsError>;

    /// Documented environment variables, optionally for one category (case-insensitive).
    fn env_vars(&self, category: Option<&str>) -> Result<Vec<EnvVarDoc>, DocsError>;
}

/// Docs served from a directory of markdown files.
#[derive(Debug, Clone)]
pub struct FsDocs {
    root: PathBuf,
}

impl FsDocs {
    /// Adapter rooted at `root`. The directory need not exist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// True when the docs directory exists.
    pub fn is_available(&self) -> bool {
        self.root.is_dir()
    }
}

impl DocsAdapter for FsDocs {
    fn list_topics(&self) -> Result<Vec<DocTopic>, DocsError> {
        if !self.is_available() {
            debug!(root = %self.root.display(), "docs directory missing");
            return Ok(Vec::new());
        }
        let mut topics = Vec::new();
        for entry in WalkDir::new(&self.root).max_depth(3) {
            let entry = entry.map_err(io::Error::from)?;
            let path = entry.path();
            let markdown = path.extension().and_then(|e| e.to_str()) == Some("md");
            if !entry.file_type().is_file() || !markdown {
                continue;
            }
            let Some(slug) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = fs::read_to_string(path)?;
            topics.push(DocTopic {
                slug: slug.to_owned(),
                title: title_of(&content).unwrap_or(slug).to_owned(),
                path: path.to_path_buf(),
            });
        }
        topics.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(topics)
    }

    fn read(&self, slug: &str) -> Result<String, DocsError> {
        let topic = self
            .list_topics()?
            .into_iter()
            .find(|topic| topic.slug == slug)
            .ok_or_else(|| DocsError::UnknownTopic(slug.to_owned()))?;
        Ok(fs::read_to_string(topic.path)?)
    }

    fn env_vars(&self, category: Option<&str>) -> Result<Vec<EnvVarDoc>, DocsError> {
        let vars = load_variables(&self.root.join(VARIABLES_FILE));
        Ok(match category {
            Some(category) => vars
                .into_iter()
                .filter(|var| var.category.eq_ignore_ascii_case(category))
                .collect(),
            None => vars,
        })
    }
}

fn title_of(content: &str) -> Option<&str> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("# "))
        .map(str::trim)
        .filter(|title| !title.is_empty())
}

fn load_variables(path: &Path) -> Vec<EnvVarDoc> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let parsed = parse_env_tables(&content);
            if parsed.is_empty() {
                default_env_vars()
            } else {
                parsed
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => default_env_vars(),
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "variables doc unreadable, using built-in list"
            );
            default_env_vars()
        }
    }
}

/// Parse `| Variable | ... |` tables, grouped by the enclosing `## ` heading.
pub fn parse_env_tables(content: &str) -> Vec<EnvVarDoc> {
    let mut vars = Vec::new();
    let mut category: Option<&str> = None;
    let mut lines = content.lines().peekable();

    while let Some(line) = lines.next() {
        if let Some(heading) = line.strip_prefix("## ") {
            category = Some(heading.trim());
            continue;
        }
        let Some(category) = category else { continue };
        if !line.trim_start().starts_with("| Variable |") {
            continue;
        }
        match lines.next() {
            Some(separator) if is_separator(separator) => {}
            _ => continue,
        }
        while let Some(row) = lines.next_if(|row| row.trim_start().starts_with('|')) {
            if let Some(var) = parse_row(row, category) {
                vars.push(var);
            }
        }
    }
    vars
}

fn is_separator(line: &str) -> bool {
    let line = line.trim();
    line.starts_with('|')
        && line.contains('-')
        && line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

fn parse_row(row: &str, category: &str) -> Option<EnvVarDoc> {
    let cells: Vec<&str> = row
        .split('|')
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .collect();
    if cells.len() < 2 {
        return None;
    }
    let name = cells[0].replace('`', "");
    let (default, description) = if cells.len() >= 3 {
        let default = (cells[1] != "-").then(|| cells[1].to_owned());
        (default, cells[2])
    } else {
        (None, cells[1])
    };
    Some(EnvVarDoc {
        kind: infer_kind(&name, description),
        required: description.to_ascii_lowercase().contains("required"),
        description: description.replace("**", ""),
        default,
        category: category.to_owned(),
        name,
    })
}

fn infer_kind(name: &str, description: &str) -> EnvVarKind {
    let name = name.to_ascii_lowercase();
    if name.contains("enable") || description.to_ascii_lowercase().contains("true/false") {
        EnvVarKind::Boolean
    } else if name.contains("port") || name.contains("count") || name.contains("max") {
        EnvVarKind::Number
    } else if name.contains("memory") {
        EnvVarKind::Memory
    } else {
        EnvVarKind::String
    }
}

fn default_env_vars() -> Vec<EnvVarDoc> {
    const DEFAULTS: &[(&str, EnvVarKind, Option<&str>, &str, bool, &str)] = &[
        (
            "EULA",
            EnvVarKind::Boolean,
            None,
            "Minecraft EULA agreement (Required: TRUE)",
            true,
            "General Settings",
        ),
        ("TYPE", EnvVarKind::String, Some("VANILLA"), "Server type", false, "General Settings"),
        (
            "VERSION",
            EnvVarKind::String,
            Some("LATEST"),
            "Minecraft version",
            false,
            "General Settings",
        ),
        (
            "MEMORY",
            EnvVarKind::Memory,
            Some("1G"),
            "Initial/max heap memory",
            false,
            "Memory Settings",
        ),
        ("SEED", EnvVarKind::String, None, "World seed", false, "Server Settings"),
        ("MOTD", EnvVarKind::String, None, "Server message", false, "Server Settings"),
        (
            "DIFFICULTY",
            EnvVarKind::String,
            Some("easy"),
            "Difficulty (peaceful, easy, normal, hard)",
            false,
            "Server Settings",
        ),
        (
            "MODE",
            EnvVarKind::String,
            Some("survival"),
            "Game mode (survival, creative, adventure, spectator)",
            false,
            "Server Settings",
        ),
        (
            "MAX_PLAYERS",
            EnvVarKind::Number,
            Some("20"),
            "Maximum player count",
            false,
            "Server Settings",
        ),
        ("ENABLE_RCON", EnvVarKind::Boolean, Some("true"), "Enable RCON", false, "RCON"),
        ("RCON_PASSWORD", EnvVarKind::String, None, "RCON password", false, "RCON"),
    ];
    DEFAULTS
        .iter()
        .map(|(name, kind, default, description, required, category)| EnvVarDoc {
            name: (*name).to_owned(),
            kind: *kind,
            default: default.map(str::to_owned),
            description: (*description).to_owned(),
            required: *required,
            category: (*category).to_owned(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARIABLES: &str = "\
# Variables

## General Settings

| Variable | Default | Description |
|----------|---------|-------------|
| `EULA` | - | **Required**: accept the EULA |
| `TYPE` | `VANILLA` | Server type |

## Network

| Variable | Description |
|---|---|
| `SERVER_PORT` | Port to listen on |
";

    #[test]
    fn parses_tables_per_category() {
        let vars = parse_env_tables(VARIABLES);
        assert_eq!(vars.len(), 3);
        assert_eq!(vars[0].name, "EULA");
        assert_eq!(vars[0].default, None);
        assert!(vars[0].required);
        assert_eq!(vars[0].description, "Required: accept the EULA");
        assert_eq!(vars[1].default.as_deref(), Some("`VANILLA`"));
        assert_eq!(vars[2].category, "Network");
        assert_eq!(vars[2].kind, EnvVarKind::Number);
        assert_eq!(vars[2].default, None);
    }

    #[test]
    fn missing_directory_falls_back_to_defaults() {
        let docs = FsDocs::new("/nonexistent/mcctl-docs");
        assert!(docs.list_topics().unwrap().is_empty());
        let rcon = docs.env_vars(Some("rcon")).unwrap();
        assert_eq!(rcon.len(), 2);
        assert!(rcon.iter().any(|var| var.name == "RCON_PASSWORD"));
    }

    #[test]
    fn topics_are_listed_and_read() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("01-quickstart.md"), "intro\n# Quick start\n").unwrap();
        fs::write(dir.path().join(VARIABLES_FILE), VARIABLES).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let docs = FsDocs::new(dir.path());
        let topics = docs.list_topics().unwrap();
        let slugs: Vec<_> = topics.iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, ["01-quickstart", "03-variables"]);
        assert_eq!(topics[0].title, "Quick start");
        assert!(docs.read("03-variables").unwrap().contains("SERVER_PORT"));
        assert!(matches!(docs.read("missing"), Err(DocsError::UnknownTopic(_))));
        assert_eq!(docs.env_vars(None).unwrap().len(), 3);
    }
}
