//! The byte-level lexer behind the `file` lookup module's map grammar
//! (spec §6 "Map file grammar"), ported from `lookup_file.c`'s `read_one()`
//! state machine. Not a regex: the continuation-inside-token and
//! quote-opacity rules are not regular once escapes can nest, so this
//! walks the input one character at a time exactly as the original does.

use automount_core::time::{KEY_MAX_LEN, MAPENT_MAX_LEN};

/// Lexer states (spec §6, SPEC_FULL §6 — renamed from the C `st_*` enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Begin,
    Compare,
    Star,
    BadEntry,
    EntrySpace,
    GetEntry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Found {
    Nothing,
    Star,
    Real,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    /// Just consumed the backslash itself; the next character is the
    /// escaped one.
    Char,
    /// Just consumed the character following a backslash; both bytes are
    /// preserved verbatim in the entry value (parser's job to interpret).
    Val,
    /// Inside a double-quoted run: whitespace and `#` are literal.
    All,
}

/// One raw `key value` pair read from a map file, before any
/// `sanitize_path`/parser interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub key: String,
    pub value: String,
}

/// Reads the next entry from `input`, advancing past it. Returns `None` at
/// end of input. A malformed entry (unmatched quote, oversized key/value)
/// is warned about and skipped — the lexer moves on to the next entry
/// rather than failing the whole read, matching `read_one`'s behavior of
/// looping until it finds a usable line.
pub fn next_entry(input: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<RawEntry> {
    loop {
        let mut key = String::new();
        let mut value = String::new();
        let mut state = LexState::Begin;
        let mut getting = Found::Nothing;
        let mut gotten = Found::Nothing;
        let mut escape = Escape::None;
        let mut produced: Option<RawEntry> = None;
        let mut saw_any_char = false;

        'entry: loop {
            let ch = match input.next() {
                Some(c) => c,
                None => break 'entry,
            };
            saw_any_char = true;

            match escape {
                Escape::None => {
                    if ch == '\\' {
                        if input.peek() == Some(&'\n') {
                            input.next();
                            continue 'entry;
                        }
                        escape = Escape::Char;
                    } else if ch == '"' {
                        escape = Escape::All;
                    }
                }
                Escape::Char => escape = Escape::Val,
                Escape::Val => escape = Escape::None,
                Escape::All => {
                    if ch == '"' {
                        escape = Escape::None;
                    }
                }
            }

            match state {
                LexState::Begin => {
                    if escape == Escape::None {
                        if ch.is_whitespace() {
                            // stay in Begin
                        } else if ch == '#' {
                            state = LexState::BadEntry;
                        } else if ch == '*' {
                            state = LexState::Star;
                            key.push(ch);
                        } else {
                            if ch == '+' {
                                gotten = Found::Plus;
                            }
                            state = LexState::Compare;
                            key.push(ch);
                        }
                    } else if escape == Escape::All {
                        state = LexState::Compare;
                        key.push(ch);
                    } else if escape == Escape::Char {
                        // swallow the backslash itself
                    } else {
                        state = LexState::BadEntry;
                    }
                }
                LexState::Compare => {
                    if ch == '\n' {
                        state = LexState::Begin;
                        if gotten == Found::Plus {
                            produced = Some(RawEntry { key: key.clone(), value: value.clone() });
                            break 'entry;
                        } else if escape == Escape::All {
                            tracing::warn!(%key, "unmatched \" in map key");
                            break 'entry;
                        } else if escape != Escape::Val {
                            produced = Some(RawEntry { key: key.clone(), value: value.clone() });
                            break 'entry;
                        }
                    } else if ch.is_whitespace() && escape == Escape::None {
                        getting = Found::Real;
                        state = LexState::EntrySpace;
                        if gotten == Found::Plus {
                            produced = Some(RawEntry { key: key.clone(), value: value.clone() });
                            break 'entry;
                        }
                    } else if escape == Escape::Char {
                        // swallow
                    } else if key.len() >= KEY_MAX_LEN {
                        state = LexState::BadEntry;
                        gotten = Found::Nothing;
                        tracing::warn!(%key, "map key is too long, KEY_MAX_LEN exceeded");
                    } else {
                        if escape == Escape::Val {
                            key.push('\\');
                        }
                        key.push(ch);
                    }
                }
                LexState::Star => {
                    if ch == '\n' {
                        state = LexState::Begin;
                    } else if ch.is_whitespace() && gotten < Found::Star && escape == Escape::None
                    {
                        getting = Found::Star;
                        state = LexState::EntrySpace;
                    } else if escape != Escape::Char {
                        state = LexState::BadEntry;
                    }
                }
                LexState::BadEntry => {
                    if ch == '\n' {
                        let cont = matches!(input.peek(), Some(c) if c.is_whitespace() && *c != '\n');
                        if cont {
                            continue 'entry;
                        }
                        state = LexState::Begin;
                        if gotten == Found::Real || gotten == getting {
                            produced = Some(RawEntry { key: key.clone(), value: value.clone() });
                            break 'entry;
                        }
                        tracing::warn!(%key, "bad map entry, skipping");
                        break 'entry;
                    } else if !ch.is_whitespace() {
                        gotten = Found::Nothing;
                    }
                }
                LexState::EntrySpace => {
                    if ch == '\n' {
                        state = LexState::Begin;
                    } else if !ch.is_whitespace() || escape != Escape::None {
                        if escape == Escape::Char {
                            // swallow, stay in EntrySpace
                        } else if escape != Escape::None && (ch as u32) <= 32 {
                            getting = Found::Nothing;
                            state = LexState::BadEntry;
                        } else {
                            value.clear();
                            if escape == Escape::Val {
                                value.push('\\');
                            }
                            value.push(ch);
                            state = LexState::GetEntry;
                            gotten = getting;
                        }
                    }
                }
                LexState::GetEntry => {
                    if ch == '\n' {
                        if escape == Escape::All {
                            state = LexState::Begin;
                            tracing::warn!(%key, "unmatched \" in map entry");
                            break 'entry;
                        }
                        let cont = matches!(input.peek(), Some(c) if c.is_whitespace() && *c != '\n');
                        if cont {
                            state = LexState::BadEntry;
                            continue 'entry;
                        }
                        state = LexState::Begin;
                        if gotten == Found::Real || gotten == getting {
                            produced = Some(RawEntry { key: key.clone(), value: value.clone() });
                            break 'entry;
                        }
                    } else if value.len() < MAPENT_MAX_LEN {
                        value.push(ch);
                        if input.peek().is_none() && (gotten == Found::Real || gotten == getting) {
                            produced = Some(RawEntry { key: key.clone(), value: value.clone() });
                            break 'entry;
                        }
                    } else {
                        tracing::warn!(%key, "map entry is too long, MAPENT_MAX_LEN exceeded");
                        state = LexState::BadEntry;
                    }
                }
            }
        }

        if let Some(entry) = produced {
            return Some(entry);
        }
        if !saw_any_char {
            return None;
        }
        // Reached EOF mid-entry with nothing usable; drop the partial
        // entry and loop once more, which will return None immediately.
    }
}

/// Parses every entry out of a whole map file's contents.
pub fn parse_all(contents: &str) -> Vec<RawEntry> {
    let mut chars = contents.chars().peekable();
    let mut entries = Vec::new();
    while let Some(entry) = next_entry(&mut chars) {
        entries.push(entry);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_entry_roundtrips() {
        let entries = parse_all("home -fstype=nfs srv:/home\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "home");
        assert_eq!(entries[0].value, "-fstype=nfs srv:/home");
    }

    #[test]
    fn comment_line_is_skipped() {
        let entries = parse_all("# a comment\nhome srv:/home\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "home");
    }

    #[test]
    fn continuation_line_is_joined() {
        let entries = parse_all("home -fstype=nfs \\\n    srv:/home\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "home");
    }

    #[test]
    fn wildcard_key_is_recognised() {
        let entries = parse_all("* -fstype=nfs srv:/&\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "*");
    }

    #[test]
    fn plus_inclusion_is_its_own_entry() {
        let entries = parse_all("+auto.master\nhome srv:/home\n");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "+auto.master");
        assert_eq!(entries[1].key, "home");
    }

    #[test]
    fn quoted_whitespace_and_hash_are_literal() {
        let entries = parse_all("home -opts \"a b#c\"\n");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value, "-opts \"a b#c\"");
    }

    #[test]
    fn multiple_entries_are_each_returned() {
        let entries = parse_all("a srv:/a\nb srv:/b\n");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "a");
        assert_eq!(entries[1].key, "b");
    }
}
