use std::collections::VecDeque;

use anyhow::{bail, Result};
use parking_lot::Mutex;

use crate::grid::Card;

/// Opaque handle to an element the host page owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(pub u64);

/// Opaque handle to the results container located by the harvester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerRef(pub u64);

/// One candidate video as the host page renders it.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEntry {
    pub node: NodeRef,
    pub href: Option<String>,
    pub title: String,
}

/// Read side of the host page plus the few scroll and navigation primitives
/// the navigator needs. Implementations must not mutate the entries they report.
pub trait HostPage: Send + Sync {
    /// Resolves a chain of selectors, each applied to the previous match.
    fn find_container(&self, path: &[String]) -> Result<Option<ContainerRef>>;
    fn query_entries(&self, container: ContainerRef, selectors: &[String])
        -> Result<Vec<VideoEntry>>;
    fn container_height(&self, container: ContainerRef) -> Result<f64>;
    fn scroll_y(&self) -> Result<f64>;
    fn scroll_to(&self, y: f64) -> Result<()>;
    fn scroll_into_view(&self, node: NodeRef) -> Result<()>;
    fn navigate(&self, url: &str) -> Result<()>;
}

/// The overlay surface the grid is mirrored onto.
pub trait Overlay: Send + Sync {
    /// Creates the overlay root, the grid and the stylesheet.
    fn mount(&self) -> Result<()>;
    /// Removes root and stylesheet. Returns false when neither was present.
    fn unmount(&self) -> Result<bool>;
    /// Inserts `cards` ahead of the load-more card, or at the end while there is
    /// none. Either all cards are inserted or none are.
    fn append_cards(&self, cards: &[Card]) -> Result<()>;
    /// Moves the load-more card to the end of the grid, creating it if needed.
    fn place_sentinel(&self) -> Result<()>;
    /// Highlights the item at `index` (and only it) and scrolls it to the vertical center.
    fn focus(&self, index: usize) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayItem {
    Card(String),
    Sentinel,
}

#[derive(Debug, Default)]
struct MemoryState {
    container: bool,
    entries: Vec<VideoEntry>,
    batches: VecDeque<Vec<VideoEntry>>,
    next_node: u64,
    scroll_y: f64,
    scrolled_into_view: Vec<NodeRef>,
    navigations: Vec<String>,
    mounted: bool,
    stylesheet: bool,
    items: Vec<OverlayItem>,
    highlighted: Option<usize>,
    fail_queries: bool,
    fail_appends: bool,
    fail_sentinel: bool,
    height_reads: usize,
}

/// Scriptable in-memory page. Entries queued with [`MemoryPage::queue_batch`]
/// are revealed one batch per `scroll_into_view`, mimicking incremental loading.
#[derive(Debug, Default)]
pub struct MemoryPage {
    state: Mutex<MemoryState>,
}

pub const MEMORY_ENTRY_HEIGHT: f64 = 94.0;

impl MemoryPage {
    pub fn new() -> Self {
        let page = Self::default();
        page.state.lock().container = true;
        page
    }

    pub fn without_container() -> Self {
        Self::default()
    }

    pub fn with_videos(ids: &[&str]) -> Self {
        let page = Self::new();
        page.push_videos(ids);
        page
    }

    pub fn push_videos(&self, ids: &[&str]) {
        let entries = self.make_entries(ids);
        self.state.lock().entries.extend(entries);
    }

    /// Appends an entry with an arbitrary link, e.g. one without a `v=` parameter.
    pub fn push_link(&self, href: Option<&str>, title: &str) {
        let mut state = self.state.lock();
        state.next_node += 1;
        let node = NodeRef(state.next_node);
        state.entries.push(VideoEntry {
            node,
            href: href.map(str::to_string),
            title: title.to_string(),
        });
    }

    pub fn queue_batch(&self, ids: &[&str]) {
        let entries = self.make_entries(ids);
        self.state.lock().batches.push_back(entries);
    }

    pub fn set_scroll_y(&self, y: f64) {
        self.state.lock().scroll_y = y;
    }

    pub fn fail_queries(&self, fail: bool) {
        self.state.lock().fail_queries = fail;
    }

    pub fn fail_appends(&self, fail: bool) {
        self.state.lock().fail_appends = fail;
    }

    pub fn fail_sentinel(&self, fail: bool) {
        self.state.lock().fail_sentinel = fail;
    }

    /// How often the container height was read; extension workers poll it.
    pub fn height_reads(&self) -> usize {
        self.state.lock().height_reads
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    pub fn scrolled_into_view(&self) -> Vec<NodeRef> {
        self.state.lock().scrolled_into_view.clone()
    }

    pub fn current_scroll_y(&self) -> f64 {
        self.state.lock().scroll_y
    }

    pub fn is_mounted(&self) -> bool {
        let state = self.state.lock();
        state.mounted || state.stylesheet
    }

    pub fn overlay_items(&self) -> Vec<OverlayItem> {
        self.state.lock().items.clone()
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.state.lock().highlighted
    }

    fn make_entries(&self, ids: &[&str]) -> Vec<VideoEntry> {
        let mut state = self.state.lock();
        ids.iter()
            .map(|id| {
                state.next_node += 1;
                VideoEntry {
                    node: NodeRef(state.next_node),
                    href: Some(format!("https://www.youtube.com/watch?v={id}")),
                    title: format!("Video {id}"),
                }
            })
            .collect()
    }
}

const MEMORY_CONTAINER: ContainerRef = ContainerRef(1);

impl HostPage for MemoryPage {
    fn find_container(&self, path: &[String]) -> Result<Option<ContainerRef>> {
        let state = self.state.lock();
        if state.fail_queries {
            bail!("page query failed");
        }
        if state.container && !path.is_empty() {
            Ok(Some(MEMORY_CONTAINER))
        } else {
            Ok(None)
        }
    }

    fn query_entries(
        &self,
        container: ContainerRef,
        _selectors: &[String],
    ) -> Result<Vec<VideoEntry>> {
        let state = self.state.lock();
        if state.fail_queries {
            bail!("page query failed");
        }
        if container != MEMORY_CONTAINER || !state.container {
            bail!("stale container handle {}", container.0);
        }
        Ok(state.entries.clone())
    }

    fn container_height(&self, _container: ContainerRef) -> Result<f64> {
        let mut state = self.state.lock();
        state.height_reads += 1;
        Ok(state.entries.len() as f64 * MEMORY_ENTRY_HEIGHT)
    }

    fn scroll_y(&self) -> Result<f64> {
        Ok(self.state.lock().scroll_y)
    }

    fn scroll_to(&self, y: f64) -> Result<()> {
        self.state.lock().scroll_y = y;
        Ok(())
    }

    fn scroll_into_view(&self, node: NodeRef) -> Result<()> {
        let mut state = self.state.lock();
        let Some(position) = state.entries.iter().position(|entry| entry.node == node) else {
            bail!("node {} is not attached", node.0);
        };
        state.scroll_y = position as f64 * MEMORY_ENTRY_HEIGHT;
        state.scrolled_into_view.push(node);
        if let Some(batch) = state.batches.pop_front() {
            state.entries.extend(batch);
        }
        Ok(())
    }

    fn navigate(&self, url: &str) -> Result<()> {
        self.state.lock().navigations.push(url.to_string());
        Ok(())
    }
}

impl Overlay for MemoryPage {
    fn mount(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.mounted = true;
        state.stylesheet = true;
        state.items.clear();
        state.highlighted = None;
        Ok(())
    }

    fn unmount(&self) -> Result<bool> {
        let mut state = self.state.lock();
        let removed = state.mounted || state.stylesheet;
        state.mounted = false;
        state.stylesheet = false;
        state.items.clear();
        state.highlighted = None;
        Ok(removed)
    }

    fn append_cards(&self, cards: &[Card]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.mounted {
            bail!("overlay is not mounted");
        }
        if state.fail_appends {
            bail!("appending cards failed");
        }
        let at = state
            .items
            .iter()
            .position(|item| *item == OverlayItem::Sentinel)
            .unwrap_or(state.items.len());
        state.items.splice(
            at..at,
            cards.iter().map(|card| OverlayItem::Card(card.id.to_string())),
        );
        Ok(())
    }

    fn place_sentinel(&self) -> Result<()> {
        let mut state = self.state.lock();
        if !state.mounted {
            bail!("overlay is not mounted");
        }
        if state.fail_sentinel {
            bail!("placing the load-more card failed");
        }
        state.items.retain(|item| *item != OverlayItem::Sentinel);
        state.items.push(OverlayItem::Sentinel);
        Ok(())
    }

    fn focus(&self, index: usize) -> Result<()> {
        let mut state = self.state.lock();
        if index >= state.items.len() {
            bail!("no overlay item at index {index}");
        }
        state.highlighted = Some(index);
        Ok(())
    }
}
