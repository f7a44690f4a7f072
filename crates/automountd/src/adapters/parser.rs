//! [`Parser`] adapter: a minimal Sun-map syntax parser, grounded on the
//! option/location shape `mount_generic.c`'s `mount_mount` expects
//! (`-fstype=TYPE[,opt,opt] location`). Negative caching on rejection
//! (spec §4.A, §7 "Parse rejection") is the caller's job — see
//! `callbacks::resolve_and_mount`, not this adapter.

use automount_core::adapters::{ParseRejected, ParsedMount, Parser};

pub struct SunMapParser;

impl Parser for SunMapParser {
    fn parse_mount(&self, key: &str, text: &str) -> Result<ParsedMount, ParseRejected> {
        let mut fstype = None;
        let mut options = Vec::new();
        let mut location = None;

        for token in text.split_whitespace() {
            if let Some(opts) = token.strip_prefix('-') {
                for opt in opts.split(',') {
                    if opt.is_empty() {
                        continue;
                    }
                    if let Some(ty) = opt.strip_prefix("fstype=") {
                        fstype = Some(ty.to_string());
                    } else {
                        options.push(opt.to_string());
                    }
                }
            } else if location.is_none() {
                location = Some(token.to_string());
            } else {
                // Sun map syntax allows several locations per entry for a
                // multi-mount (spec.md §3 glossary "Multi-mount"); this
                // parser only resolves the first one.
                return Err(ParseRejected(format!(
                    "multi-mount entry for {key:?} not supported by this parser: {text:?}"
                )));
            }
        }

        let location = location
            .ok_or_else(|| ParseRejected(format!("no location found in entry for {key:?}: {text:?}")))?;
        let fstype = fstype.unwrap_or_else(|| implied_fstype(&location).to_string());

        Ok(ParsedMount { source: location, fstype, options: options.join(",") })
    }
}

/// `host:/path` without an explicit `-fstype=` implies NFS, matching the
/// classic Sun automounter convention; anything else is assumed to already
/// be a local device or bind source.
fn implied_fstype(location: &str) -> &'static str {
    if location.contains(':') && !location.starts_with('/') {
        "nfs"
    } else {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explicit_fstype_and_options() {
        let parsed = SunMapParser.parse_mount("home", "-fstype=nfs,soft,intr srv:/home").unwrap();
        assert_eq!(parsed.source, "srv:/home");
        assert_eq!(parsed.fstype, "nfs");
        assert_eq!(parsed.options, "soft,intr");
    }

    #[test]
    fn implies_nfs_fstype_for_host_colon_path() {
        let parsed = SunMapParser.parse_mount("home", "srv:/home").unwrap();
        assert_eq!(parsed.fstype, "nfs");
        assert_eq!(parsed.options, "");
    }

    #[test]
    fn rejects_entry_with_no_location() {
        let err = SunMapParser.parse_mount("home", "-fstype=nfs").unwrap_err();
        assert!(err.0.contains("no location"));
    }

    #[test]
    fn rejects_multi_mount_entries() {
        let err = SunMapParser.parse_mount("home", "srv:/a srv:/b").unwrap_err();
        assert!(err.0.contains("multi-mount"));
    }
}
