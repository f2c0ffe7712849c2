use clap::{Parser, Subcommand};
use colored::Colorize;
use globset::{Glob, GlobMatcher};
use ignore::WalkBuilder;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// tether - Link hygiene for markdown documentation trees
#[derive(Parser)]
#[command(name = "tether")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true, default_value = ".tether.toml")]
    config: PathBuf,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Find documents no other document references
    Orphans {
        /// Directory to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Filename glob that selects candidate documents
        #[arg(short, long)]
        pattern: Option<String>,

        /// Filenames exempt from orphan reporting (can be repeated)
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Exit nonzero when orphans are found
        #[arg(long)]
        strict: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rewrite prev/next navigation links in readme-listed documents
    Nav {
        /// Readme that defines the document order
        readme: Option<PathBuf>,

        /// Directory name used by readme links to documents
        #[arg(short, long)]
        dir: Option<String>,

        /// Report out-of-date documents without writing them
        #[arg(long)]
        check: bool,
    },
}

// Configuration (.tether.toml); every key is optional and flags win over it
const DEFAULT_PATTERN: &str = "*.md";
const DEFAULT_ENTRY_POINT: &str = "README.md";
const DEFAULT_DOCS_DIR: &str = "docs";

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
struct Config {
    #[serde(default)]
    orphans: OrphansConfig,
    #[serde(default)]
    nav: NavConfig,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
struct OrphansConfig {
    pattern: Option<String>,
    exclude: Option<Vec<String>>,
    #[serde(default)]
    strict: bool,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
struct NavConfig {
    readme: Option<PathBuf>,
    dir: Option<String>,
}

impl Config {
    /// Load config from the given path, or return defaults if the file is absent
    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| TetherError::Config(path.to_path_buf(), e))
    }
}

#[derive(Error, Debug)]
enum TetherError {
    #[error("directory not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("readme not found: {}", .0.display())]
    ReadmeNotFound(PathBuf),

    #[error("invalid pattern '{0}': {1}")]
    Pattern(String, #[source] globset::Error),

    #[error("failed to parse {}: {}", .0.display(), .1)]
    Config(PathBuf, #[source] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, TetherError>;

// Scan structures
#[derive(Debug, Clone)]
struct Document {
    /// Path relative to the scan root, used for reporting and identity
    rel: String,
    /// Final path segment - the needle other documents are searched for
    name: String,
    /// File content; None when the file could not be read
    content: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            std::process::exit(2);
        }
    };

    let result = match cli.command {
        Commands::Orphans {
            path,
            pattern,
            exclude,
            strict,
            json,
        } => cmd_orphans(&path, pattern, exclude, strict, json, &config, cli.quiet),
        Commands::Nav { readme, dir, check } => cmd_nav(readme, dir, check, &config, cli.quiet),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            std::process::exit(2);
        }
    }
}

fn cmd_orphans(
    root: &Path,
    pattern: Option<String>,
    exclude: Vec<String>,
    strict: bool,
    json: bool,
    config: &Config,
    quiet: bool,
) -> Result<i32> {
    let settings = orphan_settings(pattern, exclude, strict, config);
    let matcher = build_matcher(&settings.pattern)?;

    if !quiet && !json {
        println!("{} {}", "Scanning".cyan().bold(), root.display());
    }

    let (documents, skipped) = collect_documents(root, &matcher)?;
    let orphans = find_orphans(&documents, &settings.exclude);

    for warning in &skipped {
        eprintln!("{}: {}", "warning".yellow().bold(), warning);
    }

    if json {
        let report = serde_json::json!({
            "root": root.display().to_string(),
            "scanned": documents.len(),
            "orphans": orphans,
            "skipped": skipped,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if orphans.is_empty() {
        println!("{}", "No orphaned files found!".green());
    } else {
        println!(
            "{} orphaned files found:",
            orphans.len().to_string().yellow().bold()
        );
        for orphan in &orphans {
            println!("  {}", orphan.cyan());
        }
    }

    if settings.strict && !orphans.is_empty() {
        return Ok(1);
    }
    Ok(0)
}

#[derive(Debug)]
struct OrphanSettings {
    pattern: String,
    exclude: Vec<String>,
    strict: bool,
}

/// Flags beat config beats built-in defaults
fn orphan_settings(
    pattern: Option<String>,
    exclude: Vec<String>,
    strict: bool,
    config: &Config,
) -> OrphanSettings {
    let pattern = pattern
        .or_else(|| config.orphans.pattern.clone())
        .unwrap_or_else(|| DEFAULT_PATTERN.to_string());
    let exclude = if !exclude.is_empty() {
        exclude
    } else {
        config
            .orphans
            .exclude
            .clone()
            .unwrap_or_else(|| vec![DEFAULT_ENTRY_POINT.to_string()])
    };
    let strict = strict || config.orphans.strict;
    OrphanSettings {
        pattern,
        exclude,
        strict,
    }
}

fn build_matcher(pattern: &str) -> Result<GlobMatcher> {
    let glob = Glob::new(pattern).map_err(|e| TetherError::Pattern(pattern.to_string(), e))?;
    Ok(glob.compile_matcher())
}

/// Walk the tree under `root` and load every file whose name matches `matcher`.
///
/// Unreadable files stay in the corpus with no content so they can still be
/// found referenced; the failure is recorded in the returned warning list.
fn collect_documents(root: &Path, matcher: &GlobMatcher) -> Result<(Vec<Document>, Vec<String>)> {
    if !root.is_dir() {
        return Err(TetherError::RootNotFound(root.to_path_buf()));
    }

    let mut builder = WalkBuilder::new(root);
    builder.hidden(true).git_ignore(true).git_global(true);
    // Name-sorted traversal keeps reports identical across runs and machines
    builder.sort_by_file_name(|a, b| a.cmp(b));

    let mut documents = Vec::new();
    let mut skipped = Vec::new();

    for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                skipped.push(e.to_string());
                continue;
            }
        };
        let path = entry.path();

        // Skip directories
        if path.is_dir() {
            continue;
        }

        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };

        if !matcher.is_match(&name) {
            continue;
        }

        let rel = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();

        let content = match fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) => {
                skipped.push(format!("skipping {}: {}", rel, e));
                None
            }
        };

        documents.push(Document { rel, name, content });
    }

    Ok((documents, skipped))
}

/// Core orphan pass: a candidate is orphaned when no other document's content
/// contains its filename as a literal substring.
///
/// The check is textual on purpose - a filename mentioned in plain prose
/// counts as a reference even without markdown link syntax around it.
fn find_orphans(documents: &[Document], exclude: &[String]) -> Vec<String> {
    let mut orphans = Vec::new();

    for candidate in documents {
        if exclude.iter().any(|name| name == &candidate.name) {
            continue;
        }

        let referenced = documents.iter().any(|other| {
            other.rel != candidate.rel
                && other
                    .content
                    .as_deref()
                    .is_some_and(|text| text.contains(candidate.name.as_str()))
        });

        if !referenced {
            orphans.push(candidate.rel.clone());
        }
    }

    orphans
}

// ============================================================================
// Navigation links (readme-ordered prev/next blocks)
// ============================================================================

fn cmd_nav(
    readme: Option<PathBuf>,
    dir: Option<String>,
    check: bool,
    config: &Config,
    quiet: bool,
) -> Result<i32> {
    let (readme_path, dir) = nav_settings(readme, dir, config);

    if !readme_path.exists() {
        return Err(TetherError::ReadmeNotFound(readme_path));
    }
    let readme_content = fs::read_to_string(&readme_path)?;
    let doc_links = extract_doc_links(&readme_content, &dir);

    // Listed documents are resolved relative to the readme's directory
    let base = readme_path.parent().unwrap_or(Path::new(""));
    let mut stale = 0;

    for (i, link) in doc_links.iter().enumerate() {
        let doc_path = base.join(link);

        if !doc_path.exists() {
            eprintln!("{}: {} not found", "warning".yellow().bold(), link);
            continue;
        }

        let prev = if i > 0 {
            Some(doc_links[i - 1].as_str())
        } else {
            None
        };
        let next = doc_links.get(i + 1).map(|s| s.as_str());

        let content = match fs::read_to_string(&doc_path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("{}: skipping {}: {}", "warning".yellow().bold(), link, e);
                continue;
            }
        };
        let updated = apply_navigation(&content, prev, next);

        if check {
            if updated != content {
                stale += 1;
                println!("Would update {}", link);
            }
            continue;
        }

        if let Err(e) = fs::write(&doc_path, &updated) {
            eprintln!(
                "{}: could not write {}: {}",
                "warning".yellow().bold(),
                link,
                e
            );
            continue;
        }
        if !quiet {
            println!("Updated {}", link);
        }
    }

    if check && stale > 0 {
        return Ok(1);
    }
    Ok(0)
}

fn nav_settings(readme: Option<PathBuf>, dir: Option<String>, config: &Config) -> (PathBuf, String) {
    let readme = readme
        .or_else(|| config.nav.readme.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENTRY_POINT));
    let dir = dir
        .or_else(|| config.nav.dir.clone())
        .unwrap_or_else(|| DEFAULT_DOCS_DIR.to_string());
    (readme, dir)
}

/// Extract documentation targets from readme markdown links, in order of first
/// appearance, deduplicated. Only links into the given directory count; link
/// text never spans lines.
fn extract_doc_links(readme: &str, dir: &str) -> Vec<String> {
    let link_re =
        Regex::new(&format!(r"\[.*?\]\(({}/.*?\.md)\)", regex::escape(dir))).unwrap();

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for caps in link_re.captures_iter(readme) {
        let target = caps[1].to_string();
        if seen.insert(target.clone()) {
            links.push(target);
        }
    }
    links
}

/// Title shown for a linked document, derived from its file stem
fn link_title(path: &str) -> String {
    let stem = Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path);
    display_title(stem)
}

/// File stem to human title: underscores become spaces and each word is
/// capitalized ("project_structure" -> "Project Structure").
fn display_title(stem: &str) -> String {
    let mut title = String::with_capacity(stem.len());
    let mut prev_alpha = false;

    for ch in stem.chars() {
        if ch == '_' {
            title.push(' ');
            prev_alpha = false;
        } else if ch.is_alphabetic() {
            if prev_alpha {
                title.extend(ch.to_lowercase());
            } else {
                title.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            title.push(ch);
            prev_alpha = false;
        }
    }

    title
}

/// Listed documents live in one directory and link to each other as siblings,
/// so "docs/foo.md" links as "foo.md"
fn relative_link(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}

fn navigation_line(prev: Option<&str>, next: Option<&str>) -> Option<String> {
    let mut parts = Vec::new();

    if let Some(prev) = prev {
        parts.push(format!(
            "[← Previous: {}]({})",
            link_title(prev),
            relative_link(prev)
        ));
    }
    if let Some(next) = next {
        parts.push(format!(
            "[Next: {} →]({})",
            link_title(next),
            relative_link(next)
        ));
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

/// Strip any existing navigation lines and place the block on a line of its
/// own at the top and bottom of the document. Applying this twice yields the
/// same bytes as applying it once.
fn apply_navigation(content: &str, prev: Option<&str>, next: Option<&str>) -> String {
    let nav = match navigation_line(prev, next) {
        Some(nav) => nav,
        None => return content.to_string(),
    };

    let mut body = content.to_string();
    if body.contains("← Previous:") || body.contains("Next:") {
        let prev_re = Regex::new(r"\[← Previous:[^\n]*\n").unwrap();
        let next_re = Regex::new(r"\[Next:[^\n]*\n").unwrap();
        body = prev_re.replace_all(&body, "").into_owned();
        body = next_re.replace_all(&body, "").into_owned();
    }

    format!("\n{nav}\n\n{}\n\n{nav}\n\n", body.trim())
}
