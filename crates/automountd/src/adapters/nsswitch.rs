//! [`NsswitchReader`] adapter: reads the `<database>: source [action] ...`
//! line from an `/etc/nsswitch.conf`-shaped file. No teacher file reads
//! nsswitch.conf itself, so the tokenization is hand-grounded on the
//! well-known glibc nsswitch grammar rather than copied from the corpus.

use std::fs;

use regex::Regex;

use automount_core::adapters::NsswitchReader;
use automount_core::error::NssStatus;
use automount_core::nss::{NssAction, NssActionKind, NssSource};

pub struct FileNsswitchReader {
    pub path: String,
    pub database: String,
}

impl FileNsswitchReader {
    pub fn new(path: impl Into<String>, database: impl Into<String>) -> Self {
        Self { path: path.into(), database: database.into() }
    }
}

impl NsswitchReader for FileNsswitchReader {
    fn parse(&self) -> std::io::Result<Vec<NssSource>> {
        let contents = fs::read_to_string(&self.path)?;
        let prefix = format!("{}:", self.database);

        for line in contents.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some(rest) = line.strip_prefix(&prefix) else { continue };
            return Ok(parse_sources(rest));
        }

        Ok(Vec::new())
    }
}

fn token_pattern() -> Regex {
    Regex::new(r"\[[^\]]*\]|[A-Za-z0-9_.-]+").expect("static nsswitch token regex")
}

fn parse_sources(rest: &str) -> Vec<NssSource> {
    let pattern = token_pattern();
    let mut sources: Vec<NssSource> = Vec::new();

    for token in pattern.find_iter(rest).map(|m| m.as_str()) {
        if let Some(qualifier) = token.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
            if let Some(source) = sources.last_mut() {
                apply_qualifier(source, qualifier);
            }
            continue;
        }
        sources.push(NssSource::new(token));
    }

    sources
}

/// A qualifier is a whitespace-separated list of `[!]STATUS=ACTION` pairs,
/// e.g. `[NOTFOUND=return UNAVAIL=continue]`.
fn apply_qualifier(source: &mut NssSource, qualifier: &str) {
    for clause in qualifier.split_whitespace() {
        let Some((status, action)) = clause.split_once('=') else { continue };
        let (negated, status) = match status.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, status),
        };
        let (Some(status), Some(kind)) = (parse_status(status), parse_action_kind(action)) else { continue };
        source.set_action(status, NssAction::new(kind, negated));
    }
}

fn parse_status(status: &str) -> Option<NssStatus> {
    match status.to_ascii_uppercase().as_str() {
        "SUCCESS" => Some(NssStatus::Success),
        "NOTFOUND" => Some(NssStatus::NotFound),
        "UNAVAIL" => Some(NssStatus::Unavail),
        "TRYAGAIN" => Some(NssStatus::TryAgain),
        _ => None,
    }
}

fn parse_action_kind(action: &str) -> Option<NssActionKind> {
    match action.to_ascii_lowercase().as_str() {
        "return" => Some(NssActionKind::Return),
        "continue" => Some(NssActionKind::Continue),
        _ => None,
    }
}
