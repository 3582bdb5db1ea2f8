use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use crate::config::NavigatorConfig;
use crate::extend::{ExtendTiming, Extender};
use crate::grid::{Grid, GridItem};
use crate::harvest::{Harvester, Locator};
use crate::ledger::Ledger;
use crate::page::{HostPage, NodeRef, Overlay, VideoEntry};
use crate::selection::{Direction, Selection};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    Toggle,
    Up,
    Down,
    Left,
    Right,
    Select,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    Navigated(String),
    MissingLink,
    ExtensionStarted,
    ExtensionPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggled {
    Activated,
    Deactivated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Toggled(Toggled),
    Moved(bool),
    Selected(SelectOutcome),
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationState {
    #[default]
    Uninitialized,
    Active,
    Inactive,
}

struct ExtensionResponse {
    request_id: u64,
    entries: Vec<VideoEntry>,
}

struct PendingExtension {
    request_id: u64,
    cancel_flag: Arc<AtomicBool>,
}

/// One activation of the overlay: ledger, grid and selection live and die together.
pub struct Session {
    page: Arc<dyn HostPage>,
    overlay: Arc<dyn Overlay>,
    thumbnail_template: String,
    harvester: Harvester,
    extender: Extender,
    ledger: Ledger,
    grid: Grid,
    selection: Selection,
    anchor: Option<NodeRef>,
    response_tx: Sender<ExtensionResponse>,
    response_rx: Receiver<ExtensionResponse>,
    pending: Option<PendingExtension>,
    next_request_id: u64,
}

impl Session {
    pub fn activate(
        page: Arc<dyn HostPage>,
        overlay: Arc<dyn Overlay>,
        cfg: &NavigatorConfig,
    ) -> Result<Self> {
        overlay.mount().context("mount navigator overlay")?;

        let harvester = Harvester::new(page.clone(), Locator::from(cfg));
        let extender = Extender::new(page.clone(), harvester.clone(), ExtendTiming::from(cfg));
        let (response_tx, response_rx) = unbounded();
        let mut session = Self {
            page,
            overlay,
            thumbnail_template: cfg.thumbnail_template.clone(),
            harvester,
            extender,
            ledger: Ledger::new(),
            grid: Grid::new(),
            selection: Selection::new(),
            anchor: None,
            response_tx,
            response_rx,
            pending: None,
            next_request_id: 0,
        };

        if let Err(err) = session.populate() {
            if let Err(cleanup) = session.overlay.unmount() {
                warn!(error = ?cleanup, "removing half-built overlay failed");
            }
            return Err(err);
        }
        Ok(session)
    }

    fn populate(&mut self) -> Result<()> {
        let harvest = self.harvester.harvest();
        let added = self.admit_and_render(harvest.entries)?;
        self.selection.apply(self.overlay.as_ref(), 0)?;
        info!(videos = added, "video navigator opened");
        Ok(())
    }

    fn admit_and_render(&mut self, entries: Vec<VideoEntry>) -> Result<usize> {
        if let Some(last) = entries.last() {
            self.anchor = Some(last.node);
        }
        let admitted = self.ledger.admit(entries);
        let before = self.grid.video_count();
        let result = self
            .grid
            .render(self.overlay.as_ref(), &admitted, &self.thumbnail_template);
        if result.is_err() {
            let rendered = self.grid.video_count() - before;
            for missing in &admitted[rendered..] {
                self.ledger.forget(&missing.id);
            }
        }
        result
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn selected_index(&self) -> usize {
        self.selection.index()
    }

    pub fn selected_item(&self) -> Option<&GridItem> {
        self.grid.item(self.selection.index())
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn is_extending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn step(&mut self, direction: Direction) -> Result<bool> {
        self.selection
            .step(self.overlay.as_ref(), direction, self.grid.len())
    }

    pub fn up(&mut self) -> Result<bool> {
        self.step(Direction::Up)
    }

    pub fn down(&mut self) -> Result<bool> {
        self.step(Direction::Down)
    }

    pub fn left(&mut self) -> Result<bool> {
        self.step(Direction::Left)
    }

    pub fn right(&mut self) -> Result<bool> {
        self.step(Direction::Right)
    }

    pub fn select(&mut self) -> Result<SelectOutcome> {
        let link = match self.grid.item(self.selection.index()) {
            Some(GridItem::LoadMore) => None,
            Some(GridItem::Video(card)) if !card.href.trim().is_empty() => Some(card.href.clone()),
            _ => {
                warn!(index = self.selection.index(), "no link found in selected item");
                return Ok(SelectOutcome::MissingLink);
            }
        };
        let Some(href) = link else {
            return Ok(self.start_extension());
        };
        self.page
            .navigate(&href)
            .with_context(|| format!("navigate to {href}"))?;
        info!(url = %href, "opening selected video");
        Ok(SelectOutcome::Navigated(href))
    }

    fn start_extension(&mut self) -> SelectOutcome {
        if let Some(pending) = &self.pending {
            info!(request_id = pending.request_id, "load more already in progress");
            return SelectOutcome::ExtensionPending;
        }

        self.next_request_id += 1;
        let request_id = self.next_request_id;
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending = Some(PendingExtension {
            request_id,
            cancel_flag: cancel_flag.clone(),
        });

        let extender = self.extender.clone();
        let anchor = self.anchor;
        let tx = self.response_tx.clone();
        thread::spawn(move || {
            let entries = extender.extend(anchor, &cancel_flag);
            let _ = tx.send(ExtensionResponse {
                request_id,
                entries,
            });
        });

        debug!(request_id, "load more started");
        SelectOutcome::ExtensionStarted
    }

    /// Applies any finished extension. Returns whether the grid was re-rendered.
    pub fn poll(&mut self) -> Result<bool> {
        let mut changed = false;
        while let Ok(response) = self.response_rx.try_recv() {
            changed |= self.handle_response(response)?;
        }
        Ok(changed)
    }

    /// Blocks until the pending extension finishes or `timeout` elapses.
    pub fn wait_for_extension(&mut self, timeout: Duration) -> Result<bool> {
        if self.pending.is_none() {
            return Ok(false);
        }
        match self.response_rx.recv_timeout(timeout) {
            Ok(response) => self.handle_response(response),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Ok(false),
        }
    }

    fn handle_response(&mut self, response: ExtensionResponse) -> Result<bool> {
        let Some(pending) = &self.pending else {
            return Ok(false);
        };
        if pending.request_id != response.request_id
            || pending.cancel_flag.load(Ordering::SeqCst)
        {
            return Ok(false);
        }
        self.pending = None;

        let added = self.admit_and_render(response.entries)?;
        let index = self.selection.clamped_to(self.grid.last_video_index());
        self.selection.apply(self.overlay.as_ref(), index)?;
        info!(added, total = self.grid.video_count(), "load more finished");
        Ok(true)
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel_flag.store(true, Ordering::SeqCst);
        }
    }

    /// Tears the overlay down. Returns false when nothing was left to remove.
    pub fn deactivate(mut self) -> Result<bool> {
        self.cancel_pending();
        self.overlay.unmount().context("remove navigator overlay")
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

/// Owns the optional session on behalf of the key-binding layer.
pub struct Navigator {
    page: Arc<dyn HostPage>,
    overlay: Arc<dyn Overlay>,
    config: NavigatorConfig,
    session: Option<Session>,
    state: ActivationState,
}

impl Navigator {
    pub fn new(
        page: Arc<dyn HostPage>,
        overlay: Arc<dyn Overlay>,
        config: NavigatorConfig,
    ) -> Self {
        Self {
            page,
            overlay,
            config,
            session: None,
            state: ActivationState::Uninitialized,
        }
    }

    pub fn state(&self) -> ActivationState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn toggle(&mut self) -> Result<Toggled> {
        match self.state {
            ActivationState::Active => {
                self.deactivate()?;
                Ok(Toggled::Deactivated)
            }
            ActivationState::Uninitialized | ActivationState::Inactive => {
                self.activate()?;
                Ok(Toggled::Activated)
            }
        }
    }

    pub fn activate(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let session = Session::activate(self.page.clone(), self.overlay.clone(), &self.config)?;
        self.session = Some(session);
        self.state = ActivationState::Active;
        Ok(())
    }

    /// Safe to call repeatedly; leftovers on the page are removed either way.
    pub fn deactivate(&mut self) -> Result<()> {
        let removed = match self.session.take() {
            Some(session) => {
                self.state = ActivationState::Inactive;
                session.deactivate()?
            }
            None => self.overlay.unmount().context("remove navigator overlay")?,
        };
        debug!(removed, "video navigator closed");
        Ok(())
    }

    /// Forgets the session without touching the page, e.g. after the page went away.
    pub fn reset(&mut self) {
        self.session = None;
        self.state = ActivationState::Uninitialized;
    }

    pub fn run(&mut self, command: NavCommand) -> Result<Outcome> {
        if command == NavCommand::Toggle {
            return self.toggle().map(Outcome::Toggled);
        }
        let Some(session) = self.session.as_mut() else {
            debug!(?command, "navigator is not active");
            return Ok(Outcome::Ignored);
        };
        let outcome = match command {
            NavCommand::Up => Outcome::Moved(session.up()?),
            NavCommand::Down => Outcome::Moved(session.down()?),
            NavCommand::Left => Outcome::Moved(session.left()?),
            NavCommand::Right => Outcome::Moved(session.right()?),
            NavCommand::Select => Outcome::Selected(session.select()?),
            NavCommand::Toggle => unreachable!("handled above"),
        };
        if matches!(outcome, Outcome::Selected(SelectOutcome::Navigated(_))) {
            self.reset();
        }
        Ok(outcome)
    }

    /// Entry point for the key-binding layer: failures are logged, never returned.
    pub fn dispatch(&mut self, command: NavCommand) -> Outcome {
        match self.run(command) {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(?command, error = ?err, "navigator command failed");
                Outcome::Ignored
            }
        }
    }

    pub fn poll(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        match session.poll() {
            Ok(changed) => changed,
            Err(err) => {
                error!(error = ?err, "applying loaded videos failed");
                false
            }
        }
    }

    pub fn wait_for_extension(&mut self, timeout: Duration) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        match session.wait_for_extension(timeout) {
            Ok(changed) => changed,
            Err(err) => {
                error!(error = ?err, "applying loaded videos failed");
                false
            }
        }
    }
}
