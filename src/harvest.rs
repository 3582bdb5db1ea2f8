use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, warn};

use crate::config::NavigatorConfig;
use crate::page::{ContainerRef, HostPage, VideoEntry};

/// Where the results container lives and which elements count as video cards.
/// Paths are tried in order; the first one that resolves wins.
#[derive(Debug, Clone, PartialEq)]
pub struct Locator {
    pub container_paths: Vec<Vec<String>>,
    pub card_selectors: Vec<String>,
}

impl From<&NavigatorConfig> for Locator {
    fn from(cfg: &NavigatorConfig) -> Self {
        Self {
            container_paths: cfg.container_paths.clone(),
            card_selectors: cfg.card_selectors.clone(),
        }
    }
}

impl Default for Locator {
    fn default() -> Self {
        Self::from(&NavigatorConfig::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Harvest {
    pub container: Option<ContainerRef>,
    pub entries: Vec<VideoEntry>,
}

impl Harvest {
    pub fn last_entry(&self) -> Option<&VideoEntry> {
        self.entries.last()
    }
}

#[derive(Clone)]
pub struct Harvester {
    page: Arc<dyn HostPage>,
    locator: Locator,
}

impl Harvester {
    pub fn new(page: Arc<dyn HostPage>, locator: Locator) -> Self {
        Self { page, locator }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn locate(&self) -> Result<Option<ContainerRef>> {
        for path in &self.locator.container_paths {
            if let Some(container) = self
                .page
                .find_container(path)
                .with_context(|| format!("resolve container path {}", path.join(" > ")))?
            {
                return Ok(Some(container));
            }
        }
        Ok(None)
    }

    pub fn try_harvest(&self) -> Result<Harvest> {
        let Some(container) = self.locate()? else {
            return Ok(Harvest::default());
        };
        let entries = self
            .page
            .query_entries(container, &self.locator.card_selectors)
            .context("query video entries")?;
        Ok(Harvest {
            container: Some(container),
            entries,
        })
    }

    /// Never fails: a missing container or a page error yields an empty harvest.
    pub fn harvest(&self) -> Harvest {
        match self.try_harvest() {
            Ok(harvest) => {
                if harvest.container.is_none() {
                    warn!("video container not found");
                }
                harvest
            }
            Err(err) => {
                error!(error = ?err, "harvesting video entries failed");
                Harvest::default()
            }
        }
    }
}
