//! Lazy enumeration of stored addresses.

use std::fs;
use std::path::PathBuf;

use cask_hash::Address;

use crate::layout::PREFIX_LEN;
use crate::{CasError, Result, Store};

impl Store {
    /// Walk the layout lazily, yielding every stored base address.
    ///
    /// Directory handles open as iteration proceeds; nothing is
    /// materialized up front. Encoded siblings and foreign entries are
    /// skipped. Ordering is unspecified, and objects written or deleted
    /// while iterating may or may not be observed; callers must tolerate
    /// both.
    pub fn list(&self) -> Addresses {
        Addresses {
            root: self.root().to_path_buf(),
            state: State::Start,
        }
    }
}

/// Iterator returned by [`Store::list`].
pub struct Addresses {
    root: PathBuf,
    state: State,
}

enum State {
    Start,
    Walk {
        top: fs::ReadDir,
        bucket: Option<Bucket>,
    },
    Done,
}

struct Bucket {
    prefix: String,
    entries: fs::ReadDir,
}

impl Iterator for Addresses {
    type Item = Result<Address>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match &mut self.state {
                State::Start => match fs::read_dir(&self.root) {
                    Ok(top) => self.state = State::Walk { top, bucket: None },
                    Err(e) => {
                        self.state = State::Done;
                        return Some(Err(CasError::Io(e)));
                    }
                },
                State::Walk { top, bucket } => {
                    if let Some(current) = bucket {
                        match current.entries.next() {
                            Some(Ok(entry)) => {
                                if let Some(address) = parse_entry(&current.prefix, &entry) {
                                    return Some(Ok(address));
                                }
                                continue;
                            }
                            Some(Err(e)) => return Some(Err(CasError::Io(e))),
                            None => *bucket = None,
                        }
                        continue;
                    }
                    match top.next() {
                        Some(Ok(entry)) => {
                            let name = entry.file_name();
                            let Some(name) = name.to_str() else { continue };
                            if !is_hex(name, PREFIX_LEN)
                                || !entry.file_type().map(|t| t.is_dir()).unwrap_or(false)
                            {
                                continue;
                            }
                            match fs::read_dir(entry.path()) {
                                Ok(entries) => {
                                    *bucket = Some(Bucket {
                                        prefix: name.to_string(),
                                        entries,
                                    });
                                }
                                Err(e) => return Some(Err(CasError::Io(e))),
                            }
                        }
                        Some(Err(e)) => return Some(Err(CasError::Io(e))),
                        None => {
                            self.state = State::Done;
                            return None;
                        }
                    }
                }
                State::Done => return None,
            }
        }
    }
}

fn parse_entry(prefix: &str, entry: &fs::DirEntry) -> Option<Address> {
    let name = entry.file_name();
    let name = name.to_str()?;
    if !is_hex(name, Address::HEX_LEN - PREFIX_LEN) {
        return None;
    }
    if !entry.file_type().ok()?.is_file() {
        return None;
    }
    Address::try_parse(&format!("{prefix}{name}"))
}

fn is_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn empty_store_yields_nothing() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path()).unwrap();
        assert_eq!(store.list().count(), 0);
    }

    #[test]
    fn foreign_entries_and_siblings_are_skipped() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path()).unwrap();

        let hex = "0A4D55A8D778E5022FAB701977C5D840BBC486D0";
        let bucket = temp.path().join(&hex[..4]);
        fs::create_dir(&bucket).unwrap();
        fs::write(bucket.join(&hex[4..]), b"base").unwrap();
        fs::write(bucket.join(format!("{}.gzip", &hex[4..])), b"sibling").unwrap();
        fs::write(bucket.join("notes.txt"), b"foreign").unwrap();
        fs::write(temp.path().join("README"), b"foreign").unwrap();
        fs::create_dir(temp.path().join("not-a-bucket")).unwrap();

        let addresses: Vec<_> = store.list().map(|a| a.unwrap()).collect();
        assert_eq!(addresses, vec![Address::parse(hex).unwrap()]);
    }

    #[test]
    fn lower_case_layouts_from_prior_versions_parse() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path()).unwrap();

        let hex = "0a4d55a8d778e5022fab701977c5d840bbc486d0";
        let bucket = temp.path().join(&hex[..4]);
        fs::create_dir(&bucket).unwrap();
        fs::write(bucket.join(&hex[4..]), b"base").unwrap();

        let addresses: Vec<_> = store.list().map(|a| a.unwrap()).collect();
        assert_eq!(addresses.len(), 1);
        assert_eq!(addresses[0].to_text(), hex.to_uppercase());
    }
}
