//! Domain blocking through the system hosts file
//!
//! A blocked domain is two lines, `<loopback> <domain>` and
//! `<loopback> www.<domain>`. The file is the source of truth: the blocked
//! set is always re-derived from its content since other tools edit it too.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::error::{GuardianError, Result};
use crate::persist::{file_lock, lock_recover, AtomicWriter};

pub const DEFAULT_LOOPBACK: &str = "127.0.0.1";

/// Names that point at loopback on every stock hosts file
const RESERVED_NAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
];

/// Location of the hosts file on this OS, if known
pub fn default_hosts_path() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        Some(PathBuf::from(r"C:\Windows\System32\drivers\etc\hosts"))
    } else if cfg!(target_os = "macos") {
        Some(PathBuf::from("/private/etc/hosts"))
    } else if cfg!(unix) {
        Some(PathBuf::from("/etc/hosts"))
    } else {
        None
    }
}

fn domain_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z0-9][a-z0-9-]{0,61}[a-z0-9]$")
            .unwrap_or_else(|e| unreachable!("domain pattern is valid: {}", e))
    })
}

/// Reduce user input such as `https://www.YouTube.com/watch?v=1` to
/// `youtube.com`.
pub fn normalize_domain(input: &str) -> Result<String> {
    let mut domain = input.trim().to_lowercase();
    if let Some(idx) = domain.find("://") {
        domain = domain[idx + 3..].to_string();
    }
    if let Some(idx) = domain.find(['/', '?', '#']) {
        domain.truncate(idx);
    }
    if let Some(idx) = domain.rfind(':') {
        if domain[idx + 1..].chars().all(|c| c.is_ascii_digit()) {
            domain.truncate(idx);
        }
    }
    let domain = domain.trim_end_matches('.');
    let domain = domain.strip_prefix("www.").unwrap_or(domain);

    if !domain_pattern().is_match(domain) {
        return Err(GuardianError::invalid(
            "domain",
            format!("'{}' is not a domain name", input.trim()),
        ));
    }
    Ok(domain.to_string())
}

/// Serializable blocked-domain document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedDomains {
    pub domains: Vec<String>,
}

/// Host names listed on a loopback line, or `None` for any other line
fn loopback_names<'a>(line: &'a str, loopback: &str) -> Option<Vec<&'a str>> {
    let content = line.split('#').next().unwrap_or("");
    let mut fields = content.split_whitespace();
    if fields.next()? != loopback {
        return None;
    }
    Some(fields.collect())
}

fn same_host(name: &str, host: &str) -> bool {
    name.trim_end_matches('.').eq_ignore_ascii_case(host)
}

/// `line` with the hosts in `targets` removed.
///
/// Returns `None` when the line does not name any of them. A line left with
/// no host names is dropped entirely (`Some("")`); otherwise the address,
/// the remaining names and any trailing comment are kept.
fn strip_hosts(line: &str, loopback: &str, targets: &[&str]) -> Option<String> {
    let names = loopback_names(line, loopback)?;
    if !names.iter().any(|name| targets.iter().any(|host| same_host(name, host))) {
        return None;
    }

    let kept: Vec<&str> = names
        .into_iter()
        .filter(|name| !targets.iter().any(|host| same_host(name, host)))
        .collect();
    if kept.is_empty() {
        return Some(String::new());
    }

    let mut rewritten = format!("{} {}", loopback, kept.join(" "));
    if let Some(idx) = line.find('#') {
        rewritten.push(' ');
        rewritten.push_str(line[idx..].trim_end_matches(['\r', '\n']));
    }
    if line.ends_with("\r\n") {
        rewritten.push_str("\r\n");
    } else if line.ends_with('\n') {
        rewritten.push('\n');
    }
    Some(rewritten)
}

pub struct DomainBlocker {
    path: Option<PathBuf>,
    loopback: String,
    writer: AtomicWriter,
}

impl DomainBlocker {
    pub fn new(path: impl Into<PathBuf>, loopback: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            loopback: loopback.into(),
            writer: AtomicWriter::new(),
        }
    }

    /// Blocker for the platform hosts file
    pub fn system() -> Self {
        Self {
            path: default_hosts_path(),
            loopback: DEFAULT_LOOPBACK.to_string(),
            writer: AtomicWriter::new(),
        }
    }

    /// Blocker for `path` if given, else the platform hosts file
    pub fn from_override(path: Option<PathBuf>, loopback: &str) -> Self {
        match path {
            Some(path) => Self::new(path, loopback),
            None => Self {
                loopback: loopback.to_string(),
                ..Self::system()
            },
        }
    }

    #[cfg(test)]
    fn failing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            loopback: DEFAULT_LOOPBACK.to_string(),
            writer: AtomicWriter::failing_before_rename(),
        }
    }

    fn path(&self) -> Result<&Path> {
        self.path.as_deref().ok_or_else(|| {
            GuardianError::UnsupportedPlatform(format!(
                "no hosts file location known for {}",
                std::env::consts::OS
            ))
        })
    }

    pub fn hosts_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn read(path: &Path) -> Result<String> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(GuardianError::from_io(path, e)),
        }
    }

    fn blocked_in(&self, content: &str) -> BTreeSet<String> {
        content
            .lines()
            .filter_map(|line| loopback_names(line, &self.loopback))
            .flatten()
            .map(|name| name.trim_end_matches('.').to_lowercase())
            .filter(|name| !name.starts_with("www."))
            .filter(|name| !RESERVED_NAMES.contains(&name.as_str()))
            .collect()
    }

    /// Domains currently redirected to loopback.
    pub fn list_blocked(&self) -> Result<BTreeSet<String>> {
        let path = self.path()?;
        Ok(self.blocked_in(&Self::read(path)?))
    }

    pub fn snapshot(&self) -> Result<BlockedDomains> {
        Ok(BlockedDomains {
            domains: self.list_blocked()?.into_iter().collect(),
        })
    }

    fn ensure_writable(path: &Path) -> Result<()> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.permissions().readonly() => Err(GuardianError::Permission(format!(
                "{} is read-only",
                path.display()
            ))),
            _ => Ok(()),
        }
    }

    /// Is `host` already redirected to loopback somewhere in `content`?
    fn redirects(&self, content: &str, host: &str) -> bool {
        content
            .lines()
            .filter_map(|line| loopback_names(line, &self.loopback))
            .flatten()
            .any(|name| same_host(name, host))
    }

    /// Redirect `domain` (and its `www.` variant). Only the missing lines
    /// are appended; returns false when both were present and the file is
    /// left untouched.
    pub fn block(&self, domain: &str) -> Result<bool> {
        let domain = normalize_domain(domain)?;
        let www = format!("www.{}", domain);
        let path = self.path()?;

        let lock = file_lock(path);
        let _guard = lock_recover(&lock);

        let content = Self::read(path)?;
        let missing: Vec<&str> = [domain.as_str(), www.as_str()]
            .into_iter()
            .filter(|host| !self.redirects(&content, host))
            .collect();
        if missing.is_empty() {
            debug!("{} already blocked", domain);
            return Ok(false);
        }
        Self::ensure_writable(path)?;

        let mut next = content;
        if !next.is_empty() && !next.ends_with('\n') {
            next.push('\n');
        }
        for host in missing {
            next.push_str(&format!("{} {}\n", self.loopback, host));
        }

        self.writer.write(path, next.as_bytes())?;
        info!("Blocked domain: {}", domain);
        Ok(true)
    }

    /// Remove `domain` and `www.<domain>` from every loopback line. Other
    /// names sharing a line stay. Returns false when nothing referenced it.
    pub fn unblock(&self, domain: &str) -> Result<bool> {
        let domain = normalize_domain(domain)?;
        let www = format!("www.{}", domain);
        let targets = [domain.as_str(), www.as_str()];
        let path = self.path()?;

        let lock = file_lock(path);
        let _guard = lock_recover(&lock);

        let content = Self::read(path)?;
        let mut removed = false;
        let mut next = String::with_capacity(content.len());
        for line in content.split_inclusive('\n') {
            match strip_hosts(line, &self.loopback, &targets) {
                Some(rewritten) => {
                    removed = true;
                    next.push_str(&rewritten);
                }
                None => next.push_str(line),
            }
        }

        if !removed {
            debug!("{} was not blocked", domain);
            return Ok(false);
        }
        Self::ensure_writable(path)?;

        self.writer.write(path, next.as_bytes())?;
        info!("Unblocked domain: {}", domain);
        Ok(true)
    }
}
