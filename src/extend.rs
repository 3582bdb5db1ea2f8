use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{debug, error, warn};

use crate::config::NavigatorConfig;
use crate::harvest::Harvester;
use crate::page::{ContainerRef, HostPage, NodeRef, VideoEntry};

#[derive(Debug, thiserror::Error)]
pub enum ExtendError {
    #[error("video container not found")]
    ContainerNotFound,
    #[error("container did not grow within {0:?}")]
    TimedOut(Duration),
    #[error("extension cancelled")]
    Cancelled,
    #[error(transparent)]
    Page(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtendTiming {
    pub scroll_settle: Duration,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl From<&NavigatorConfig> for ExtendTiming {
    fn from(cfg: &NavigatorConfig) -> Self {
        Self {
            scroll_settle: cfg.scroll_settle,
            poll_interval: cfg.poll_interval,
            timeout: cfg.extend_timeout,
        }
    }
}

/// Makes the host page load more entries and re-harvests once it has.
#[derive(Clone)]
pub struct Extender {
    page: Arc<dyn HostPage>,
    harvester: Harvester,
    timing: ExtendTiming,
}

impl Extender {
    pub fn new(page: Arc<dyn HostPage>, harvester: Harvester, timing: ExtendTiming) -> Self {
        Self {
            page,
            harvester,
            timing,
        }
    }

    /// Full current entry list after the page grew, or empty on any failure.
    pub fn extend(&self, anchor: Option<NodeRef>, cancel: &AtomicBool) -> Vec<VideoEntry> {
        match self.try_extend(anchor, cancel) {
            Ok(entries) => entries,
            Err(ExtendError::ContainerNotFound) => {
                warn!("video container not found for observing");
                Vec::new()
            }
            Err(err @ ExtendError::TimedOut(_)) => {
                warn!(error = %err, "no new videos loaded");
                Vec::new()
            }
            Err(ExtendError::Cancelled) => {
                debug!("extension cancelled");
                Vec::new()
            }
            Err(err) => {
                error!(error = ?err, "extending video list failed");
                Vec::new()
            }
        }
    }

    pub fn try_extend(
        &self,
        anchor: Option<NodeRef>,
        cancel: &AtomicBool,
    ) -> Result<Vec<VideoEntry>, ExtendError> {
        let container = self
            .harvester
            .locate()?
            .ok_or(ExtendError::ContainerNotFound)?;
        let Some(anchor) = anchor else {
            // Nothing to scroll to yet; the page may have rendered entries since.
            let harvest = self.harvester.try_harvest()?;
            debug!(entries = harvest.entries.len(), "re-harvested without an anchor");
            return Ok(harvest.entries);
        };

        let scroll_y = self.page.scroll_y().context("read window scroll offset")?;
        let baseline = self
            .page
            .container_height(container)
            .context("read container height")?;

        self.page
            .scroll_into_view(anchor)
            .context("scroll last entry into view")?;
        thread::sleep(self.timing.scroll_settle);
        self.page
            .scroll_to(scroll_y)
            .context("restore window scroll offset")?;

        wait_for_layout_change(
            self.page.as_ref(),
            container,
            baseline,
            self.timing,
            cancel,
        )?;

        let harvest = self.harvester.try_harvest()?;
        debug!(entries = harvest.entries.len(), "re-harvested after extension");
        Ok(harvest.entries)
    }
}

/// Blocks until the container height differs from `baseline`, the timeout
/// elapses or `cancel` is set.
pub fn wait_for_layout_change(
    page: &dyn HostPage,
    container: ContainerRef,
    baseline: f64,
    timing: ExtendTiming,
    cancel: &AtomicBool,
) -> Result<(), ExtendError> {
    let deadline = Instant::now() + timing.timeout;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return Err(ExtendError::Cancelled);
        }
        let height = page
            .container_height(container)
            .context("observe container height")?;
        if height != baseline {
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(ExtendError::TimedOut(timing.timeout));
        }
        thread::sleep(timing.poll_interval.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::Locator;
    use crate::page::MemoryPage;

    fn timing() -> ExtendTiming {
        ExtendTiming {
            scroll_settle: Duration::ZERO,
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(60),
        }
    }

    fn extender(page: &Arc<MemoryPage>) -> Extender {
        let harvester = Harvester::new(page.clone(), Locator::default());
        Extender::new(page.clone(), harvester, timing())
    }

    fn last_node(page: &Arc<MemoryPage>) -> Option<NodeRef> {
        let harvester = Harvester::new(page.clone(), Locator::default());
        harvester.harvest().last_entry().map(|e| e.node)
    }

    #[test]
    fn extension_returns_full_list_and_restores_scroll() {
        let page = Arc::new(MemoryPage::with_videos(&["a", "b"]));
        page.set_scroll_y(12.0);
        page.queue_batch(&["c", "d"]);
        let anchor = last_node(&page);

        let entries = extender(&page)
            .try_extend(anchor, &AtomicBool::new(false))
            .unwrap();

        assert_eq!(entries.len(), 4);
        assert_eq!(page.scrolled_into_view(), vec![anchor.unwrap()]);
        assert_eq!(page.current_scroll_y(), 12.0);
    }

    #[test]
    fn timeout_resolves_as_no_entries() {
        let page = Arc::new(MemoryPage::with_videos(&["a"]));
        let anchor = last_node(&page);
        let ext = extender(&page);

        let err = ext
            .try_extend(anchor, &AtomicBool::new(false))
            .unwrap_err();
        assert!(matches!(err, ExtendError::TimedOut(_)));
        assert!(ext.extend(anchor, &AtomicBool::new(false)).is_empty());
    }

    #[test]
    fn cancellation_stops_the_wait() {
        let page = Arc::new(MemoryPage::with_videos(&["a"]));
        let anchor = last_node(&page);
        let err = extender(&page)
            .try_extend(anchor, &AtomicBool::new(true))
            .unwrap_err();
        assert!(matches!(err, ExtendError::Cancelled));
    }

    #[test]
    fn missing_container_is_reported() {
        let page = Arc::new(MemoryPage::without_container());
        let err = extender(&page)
            .try_extend(None, &AtomicBool::new(false))
            .unwrap_err();
        assert!(matches!(err, ExtendError::ContainerNotFound));
    }

    #[test]
    fn without_anchor_the_page_is_harvested_again() {
        let page = Arc::new(MemoryPage::new());
        page.push_videos(&["a", "b"]);

        let entries = extender(&page)
            .try_extend(None, &AtomicBool::new(false))
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert!(page.scrolled_into_view().is_empty());
    }
}
