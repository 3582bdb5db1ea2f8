use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::page::VideoEntry;

static VIDEO_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]v=([\w-]+)").expect("video id pattern compiles"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VideoId(String);

impl VideoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn extract_video_id(href: &str) -> Option<VideoId> {
    VIDEO_ID_PATTERN
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| VideoId(m.as_str().to_string()))
}

/// A harvested entry that passed the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Admitted {
    pub id: VideoId,
    pub entry: VideoEntry,
}

/// Ids admitted during one navigator session.
#[derive(Debug, Default)]
pub struct Ledger {
    seen: HashSet<VideoId>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entries whose id is new, in harvested order, and records their ids.
    pub fn admit(&mut self, entries: Vec<VideoEntry>) -> Vec<Admitted> {
        entries
            .into_iter()
            .filter_map(|entry| {
                let id = entry.href.as_deref().and_then(extract_video_id)?;
                if self.seen.insert(id.clone()) {
                    Some(Admitted { id, entry })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Releases an id so a later harvest can admit it again.
    pub fn forget(&mut self, id: &VideoId) -> bool {
        self.seen.remove(id)
    }

    pub fn contains(&self, id: &VideoId) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
