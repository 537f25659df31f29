//! Command-surface discovery via breadth-first help probing.
//!
//! Starting from the bare invocation, each candidate command path is probed
//! with a short list of help variants. Output that looks like help text is
//! mined for advertised subcommands, which become new candidate paths. The
//! traversal is bounded three ways: a visited set (help loops), a depth cap,
//! and a total wall-clock budget.

use crate::probe::{run_probe, ProbeOutput};
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::Path;
use std::time::{Duration, Instant};

/// Ordered token sequence naming one invocation of the target binary. The
/// empty sequence is the root invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CommandPath(Vec<String>);

impl CommandPath {
    pub fn root() -> CommandPath {
        CommandPath(Vec::new())
    }

    pub fn child(&self, token: &str) -> CommandPath {
        let mut tokens = self.0.clone();
        tokens.push(token.to_string());
        CommandPath(tokens)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn joined(&self) -> String {
        self.0.join(" ")
    }
}

/// The fixed help-probe variants, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProbeKind {
    #[serde(rename = "--help")]
    LongHelp,
    #[serde(rename = "-h")]
    ShortHelp,
    #[serde(rename = "help-prefix")]
    HelpPrefix,
    #[serde(rename = "help-suffix")]
    HelpSuffix,
}

impl ProbeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeKind::LongHelp => "--help",
            ProbeKind::ShortHelp => "-h",
            ProbeKind::HelpPrefix => "help-prefix",
            ProbeKind::HelpSuffix => "help-suffix",
        }
    }

    fn argv(self, path: &CommandPath) -> Vec<String> {
        let tokens = path.tokens();
        match self {
            ProbeKind::LongHelp => {
                let mut argv = tokens.to_vec();
                argv.push("--help".to_string());
                argv
            }
            ProbeKind::ShortHelp => {
                let mut argv = tokens.to_vec();
                argv.push("-h".to_string());
                argv
            }
            ProbeKind::HelpPrefix => {
                let mut argv = vec!["help".to_string()];
                argv.extend(tokens.iter().cloned());
                argv
            }
            ProbeKind::HelpSuffix => {
                let mut argv = tokens.to_vec();
                argv.push("help".to_string());
                argv
            }
        }
    }
}

/// Result of probing one command path. Built once per node and never
/// mutated.
#[derive(Debug, Clone)]
pub struct HelpProbeOutcome {
    pub command_path: CommandPath,
    pub matched: bool,
    pub probe_kind: Option<ProbeKind>,
    pub raw_text: String,
    pub discovered_children: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelpSection {
    pub path: String,
    pub probe: ProbeKind,
    pub line_count: usize,
}

/// Everything the traversal learned about the binary's advertised commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSurface {
    pub command_paths: Vec<String>,
    pub top_level_commands: Vec<String>,
    pub help_sections: Vec<HelpSection>,
    pub probe_kinds: BTreeSet<ProbeKind>,
    pub max_depth: usize,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct DiscoveryOptions {
    pub max_depth: usize,
    pub per_probe_timeout: Duration,
    pub total_timeout: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> DiscoveryOptions {
        DiscoveryOptions {
            max_depth: 4,
            per_probe_timeout: Duration::from_secs(5),
            total_timeout: Duration::from_secs(120),
        }
    }
}

/// Extraction strategy for subcommand names out of accepted help text.
pub trait SubcommandParser {
    fn parse(&self, help_text: &str) -> Vec<String>;
}

/// Default strategy: find a commands section header, then take the first
/// token of each row until the block ends. Non-English or unconventional
/// headers yield no children.
pub struct SectionHeaderParser {
    start: Regex,
    stop: Regex,
}

impl SectionHeaderParser {
    pub fn new() -> SectionHeaderParser {
        SectionHeaderParser {
            start: Regex::new(r"(?i)^\s*(Available\s+Commands|Commands|Subcommands)\s*:")
                .expect("regex for command section start"),
            stop: Regex::new(
                r"^\s*(Flags|Global Flags|Options|Arguments|Examples|Environment|Usage|USAGE)\s*:",
            )
            .expect("regex for command section stop"),
        }
    }
}

impl Default for SectionHeaderParser {
    fn default() -> SectionHeaderParser {
        SectionHeaderParser::new()
    }
}

impl SubcommandParser for SectionHeaderParser {
    fn parse(&self, help_text: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut in_commands = false;
        for line in help_text.lines() {
            if self.start.is_match(line) {
                in_commands = true;
                continue;
            }
            if !in_commands {
                continue;
            }
            if line.trim().is_empty() || self.stop.is_match(line) {
                in_commands = false;
                continue;
            }
            let Some(token) = line.split_whitespace().next() else {
                continue;
            };
            if let Some(normalized) = normalize_command_token(token) {
                found.push(normalized);
            }
        }
        let mut seen = HashSet::new();
        found.retain(|token| seen.insert(token.clone()));
        found
    }
}

const COMMAND_STOPWORDS: [&str; 6] = ["help", "commands", "command", "flags", "options", "usage"];

/// Clean one candidate token into a command name, or reject it.
pub fn normalize_command_token(token: &str) -> Option<String> {
    let token = token
        .trim()
        .trim_matches(|c| matches!(c, '`' | '"' | '\''))
        .trim_matches(|c| matches!(c, '[' | ']' | '<' | '>' | '(' | ')' | '{' | '}'));
    if token.is_empty() || token.starts_with('-') {
        return None;
    }
    if COMMAND_STOPWORDS.contains(&token.to_lowercase().as_str()) {
        return None;
    }
    let shape = Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9._:-]*$").expect("regex for command tokens");
    if !shape.is_match(token) {
        return None;
    }
    Some(token.to_string())
}

fn looks_like_help(text: &str) -> bool {
    let signature =
        Regex::new(r"(?i)usage|commands|subcommands|flags|options|help").expect("regex for help");
    signature.is_match(text)
}

/// Try the probe variants for one path in fixed order; the first whose output
/// looks like help wins. At the root the prefix and suffix variants collapse
/// to the same bare `help` argv, so only the suffix form is attempted.
fn probe_help(
    binary: &Path,
    path: &CommandPath,
    per_probe_timeout: Duration,
    parser: &dyn SubcommandParser,
) -> Result<HelpProbeOutcome> {
    let kinds: &[ProbeKind] = if path.is_root() {
        &[
            ProbeKind::LongHelp,
            ProbeKind::ShortHelp,
            ProbeKind::HelpSuffix,
        ]
    } else {
        &[
            ProbeKind::LongHelp,
            ProbeKind::ShortHelp,
            ProbeKind::HelpPrefix,
            ProbeKind::HelpSuffix,
        ]
    };

    for kind in kinds {
        let argv = kind.argv(path);
        let output: ProbeOutput = run_probe(binary, &argv, per_probe_timeout, None, None)?;
        let text = output.combined_text();
        if looks_like_help(&text) {
            let discovered_children = parser.parse(&text);
            return Ok(HelpProbeOutcome {
                command_path: path.clone(),
                matched: true,
                probe_kind: Some(*kind),
                raw_text: text,
                discovered_children,
            });
        }
    }

    Ok(HelpProbeOutcome {
        command_path: path.clone(),
        matched: false,
        probe_kind: None,
        raw_text: String::new(),
        discovered_children: Vec::new(),
    })
}

pub fn discover(binary: &Path, options: DiscoveryOptions) -> Result<CommandSurface> {
    discover_with_parser(binary, options, &SectionHeaderParser::new())
}

/// Breadth-first traversal over command paths. All traversal state lives in
/// this call, so discoveries may run concurrently within one process.
pub fn discover_with_parser(
    binary: &Path,
    options: DiscoveryOptions,
    parser: &dyn SubcommandParser,
) -> Result<CommandSurface> {
    let started = Instant::now();
    let mut queue: VecDeque<CommandPath> = VecDeque::new();
    queue.push_back(CommandPath::root());
    let mut visited: HashSet<CommandPath> = HashSet::new();

    let mut commands: BTreeSet<String> = BTreeSet::new();
    let mut sections: Vec<HelpSection> = Vec::new();
    let mut probe_kinds: BTreeSet<ProbeKind> = BTreeSet::new();

    while !queue.is_empty() {
        if started.elapsed() > options.total_timeout {
            break;
        }
        let Some(path) = queue.pop_front() else {
            break;
        };
        if !visited.insert(path.clone()) {
            continue;
        }

        let outcome = probe_help(binary, &path, options.per_probe_timeout, parser)?;
        if !outcome.matched {
            tracing::debug!(path = %outcome.command_path.joined(), "no help variant matched");
            continue;
        }
        let Some(kind) = outcome.probe_kind else {
            continue;
        };

        let node = outcome.command_path.joined();
        probe_kinds.insert(kind);
        sections.push(HelpSection {
            path: node.clone(),
            probe: kind,
            line_count: outcome.raw_text.lines().count(),
        });
        tracing::debug!(
            path = %node,
            probe = kind.as_str(),
            children = outcome.discovered_children.len(),
            "help probe accepted"
        );

        if !path.is_root() {
            commands.insert(node);
        }

        if path.depth() >= options.max_depth {
            continue;
        }

        for token in &outcome.discovered_children {
            let child = path.child(token);
            if !visited.contains(&child) {
                queue.push_back(child);
            }
        }
    }

    let timed_out = !queue.is_empty();
    let command_paths: Vec<String> = commands.into_iter().collect();
    let top_level_commands: Vec<String> = command_paths
        .iter()
        .filter_map(|path| path.split_whitespace().next())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let max_depth = command_paths
        .iter()
        .map(|path| path.split_whitespace().count())
        .max()
        .unwrap_or(0);

    Ok(CommandSurface {
        command_paths,
        top_level_commands,
        help_sections: sections,
        probe_kinds,
        max_depth,
        timed_out,
    })
}
