use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use parking_lot::Mutex;
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

use crate::config::DevToolsConfig;
use crate::grid::Card;
use crate::page::{ContainerRef, HostPage, NodeRef, Overlay, VideoEntry};

/// One entry of the DevTools `/json` target list.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DiscoveryError {
    #[error("no tab matching {0:?} is open")]
    NoTab(String),
    #[error("{0} video tabs are open; close all but one")]
    MultipleVideoTabs(usize),
    #[error("no video is open in the matching tab")]
    NoVideoTab,
    #[error("video tab {0} exposes no debugger url")]
    NoDebuggerUrl(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DevToolsError {
    #[error("devtools connection closed")]
    Closed,
    #[error("page script threw: {0}")]
    Exception(String),
    #[error("devtools rejected the request: {0}")]
    Protocol(String),
}

pub fn list_targets(http: &HttpClient, endpoint: &str) -> Result<Vec<Target>> {
    let url = Url::parse(endpoint)
        .and_then(|base| base.join("json"))
        .with_context(|| format!("invalid devtools endpoint {endpoint:?}"))?;
    http.get(url.clone())
        .send()
        .with_context(|| format!("fetch devtools targets from {url}"))?
        .error_for_status()
        .context("devtools target list")?
        .json()
        .context("decode devtools target list")
}

/// Picks the single tab that is playing a video.
pub fn pick_video_tab<'a>(
    targets: &'a [Target],
    tab_match: &str,
    watch_marker: &str,
) -> Result<&'a Target, DiscoveryError> {
    let matching: Vec<&Target> = targets
        .iter()
        .filter(|t| t.kind.is_empty() || t.kind == "page")
        .filter(|t| t.url.contains(tab_match))
        .collect();
    if matching.is_empty() {
        return Err(DiscoveryError::NoTab(tab_match.to_string()));
    }
    let videos: Vec<&Target> = matching
        .into_iter()
        .filter(|t| t.url.contains(watch_marker))
        .collect();
    match videos.as_slice() {
        [] => Err(DiscoveryError::NoVideoTab),
        [tab] if tab.web_socket_debugger_url.is_none() => {
            Err(DiscoveryError::NoDebuggerUrl(tab.url.clone()))
        }
        [tab] => Ok(tab),
        many => Err(DiscoveryError::MultipleVideoTabs(many.len())),
    }
}

/// Polls the target list until exactly one video tab shows up.
/// Returns `Ok(None)` when `should_stop` asks to give up early.
pub fn discover(cfg: &DevToolsConfig, should_stop: &dyn Fn() -> bool) -> Result<Option<Target>> {
    let http = HttpClient::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("build devtools http client")?;
    let started = Instant::now();
    info!(endpoint = %cfg.endpoint, "looking for a video tab");

    loop {
        if should_stop() {
            return Ok(None);
        }
        if started.elapsed() > cfg.discovery_timeout {
            bail!(
                "no video tab found after {}",
                humantime::format_duration(cfg.discovery_timeout)
            );
        }
        match list_targets(&http, &cfg.endpoint) {
            Ok(targets) => match pick_video_tab(&targets, &cfg.tab_match, &cfg.watch_marker) {
                Ok(tab) => {
                    info!(url = %tab.url, "found video tab");
                    return Ok(Some(tab.clone()));
                }
                Err(err) => warn!("{err}"),
            },
            Err(err) => warn!(
                error = ?err,
                "devtools endpoint unreachable; is the browser running with remote debugging?"
            ),
        }
        thread::sleep(cfg.retry_interval);
    }
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// `Runtime.evaluate` over one DevTools WebSocket. Calls are serialised.
pub struct DevToolsClient {
    socket: Mutex<Socket>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl DevToolsClient {
    pub fn connect(ws_url: &str, timeout: Duration) -> Result<Self> {
        let (socket, _response) =
            tungstenite::connect(ws_url).with_context(|| format!("connect to {ws_url}"))?;
        if let MaybeTlsStream::Plain(stream) = socket.get_ref() {
            stream
                .set_read_timeout(Some(timeout))
                .context("set devtools read timeout")?;
            stream
                .set_write_timeout(Some(timeout))
                .context("set devtools write timeout")?;
        }
        Ok(Self {
            socket: Mutex::new(socket),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Evaluates `expression` in the page and returns its JSON value.
    pub fn evaluate(&self, expression: &str) -> Result<Value> {
        if self.is_closed() {
            bail!(DevToolsError::Closed);
        }
        let result = self.evaluate_inner(expression);
        if let Err(err) = &result {
            if is_connection_error(err) {
                self.closed.store(true, Ordering::SeqCst);
            }
        }
        result
    }

    fn evaluate_inner(&self, expression: &str) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = json!({
            "id": id,
            "method": "Runtime.evaluate",
            "params": {
                "expression": expression,
                "returnByValue": true,
                "awaitPromise": true,
            }
        });

        let mut socket = self.socket.lock();
        socket
            .send(Message::Text(request.to_string().into()))
            .context("send devtools request")?;

        loop {
            let message = socket.read().context("wait for devtools reply")?;
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => bail!(DevToolsError::Closed),
                _ => continue,
            };
            let reply: Value =
                serde_json::from_str(text.as_str()).context("decode devtools reply")?;
            if let Some(value) = parse_evaluate_reply(id, &reply)? {
                return Ok(value);
            }
        }
    }
}

/// `Ok(None)` for messages that are not the reply to `id` (events, stale replies).
fn parse_evaluate_reply(id: u64, reply: &Value) -> Result<Option<Value>> {
    if reply.get("id").and_then(Value::as_u64) != Some(id) {
        return Ok(None);
    }
    if let Some(error) = reply.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        bail!(DevToolsError::Protocol(message));
    }
    let result = reply
        .get("result")
        .ok_or_else(|| anyhow!(DevToolsError::Protocol("reply without result".into())))?;
    if let Some(details) = result.get("exceptionDetails") {
        let message = details
            .pointer("/exception/description")
            .or_else(|| details.get("text"))
            .and_then(Value::as_str)
            .unwrap_or("unknown exception")
            .to_string();
        bail!(DevToolsError::Exception(message));
    }
    Ok(Some(
        result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null),
    ))
}

pub fn is_connection_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.is::<tungstenite::Error>()
            || matches!(cause.downcast_ref::<DevToolsError>(), Some(DevToolsError::Closed))
    })
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    node: u64,
    #[serde(default)]
    href: Option<String>,
    #[serde(default)]
    title: String,
}

/// The watch page seen through DevTools: host page and overlay in one.
pub struct DevToolsPage {
    client: DevToolsClient,
}

impl DevToolsPage {
    pub fn new(client: DevToolsClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &DevToolsClient {
        &self.client
    }

    fn call(&self, body: &str, data: Value) -> Result<Value> {
        self.client.evaluate(&page_call(body, &data))
    }
}

fn page_call(body: &str, data: &Value) -> String {
    let ids = json!({
        "overlay": OVERLAY_ID,
        "grid": GRID_ID,
        "style": STYLE_ID,
        "item": ITEM_CLASS,
        "title": TITLE_CLASS,
        "selected": SELECTED_CLASS,
        "loadmore": LOADMORE_CLASS,
    });
    format!(
        "(() => {{ {PAGE_HELPERS} const reg = {REGISTRY}; return ({body})({ids}, {data}); }})()"
    )
}

impl HostPage for DevToolsPage {
    fn find_container(&self, path: &[String]) -> Result<Option<ContainerRef>> {
        let value = self.call(FIND_CONTAINER, json!(path))?;
        let id: Option<u64> = serde_json::from_value(value).context("decode container handle")?;
        Ok(id.map(ContainerRef))
    }

    fn query_entries(
        &self,
        container: ContainerRef,
        selectors: &[String],
    ) -> Result<Vec<VideoEntry>> {
        let value = self.call(
            QUERY_ENTRIES,
            json!({ "container": container.0, "selectors": selectors }),
        )?;
        let raw: Vec<RawEntry> = serde_json::from_value(value).context("decode video entries")?;
        Ok(raw
            .into_iter()
            .map(|entry| VideoEntry {
                node: NodeRef(entry.node),
                href: entry.href,
                title: entry.title,
            })
            .collect())
    }

    fn container_height(&self, container: ContainerRef) -> Result<f64> {
        let value = self.call(CONTAINER_HEIGHT, json!(container.0))?;
        value
            .as_f64()
            .ok_or_else(|| anyhow!("container height is not a number: {value}"))
    }

    fn scroll_y(&self) -> Result<f64> {
        let value = self.call(SCROLL_Y, Value::Null)?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    fn scroll_to(&self, y: f64) -> Result<()> {
        self.call(SCROLL_TO, json!(y)).map(drop)
    }

    fn scroll_into_view(&self, node: NodeRef) -> Result<()> {
        self.call(SCROLL_INTO_VIEW, json!(node.0)).map(drop)
    }

    fn navigate(&self, url: &str) -> Result<()> {
        self.call(NAVIGATE, json!(url)).map(drop)
    }
}

impl Overlay for DevToolsPage {
    fn mount(&self) -> Result<()> {
        self.call(MOUNT, json!(OVERLAY_CSS)).map(drop)
    }

    fn unmount(&self) -> Result<bool> {
        let value = self.call(UNMOUNT, Value::Null)?;
        Ok(value.as_bool().unwrap_or(false))
    }

    fn append_cards(&self, cards: &[Card]) -> Result<()> {
        let payload: Vec<Value> = cards
            .iter()
            .map(|card| {
                json!({
                    "id": card.id.as_str(),
                    "href": card.href,
                    "title": card.title,
                    "thumbnail": card.thumbnail,
                })
            })
            .collect();
        let appended = self.call(APPEND_CARDS, Value::Array(payload))?;
        debug!(%appended, "cards appended to overlay");
        Ok(())
    }

    fn place_sentinel(&self) -> Result<()> {
        self.call(PLACE_SENTINEL, Value::Null).map(drop)
    }

    fn focus(&self, index: usize) -> Result<()> {
        self.call(FOCUS, json!(index)).map(drop)
    }
}

const OVERLAY_ID: &str = "tube-remote-overlay";
const GRID_ID: &str = "tube-remote-grid";
const STYLE_ID: &str = "tube-remote-style";
const ITEM_CLASS: &str = "tube-remote-item";
const TITLE_CLASS: &str = "tube-remote-title";
const SELECTED_CLASS: &str = "tube-remote-item--selected";
const LOADMORE_CLASS: &str = "tube-remote-loadmore";

// Element handles live in a page-side registry so host elements are never tagged.
const REGISTRY: &str = "(window.__tubeRemoteNodes = window.__tubeRemoteNodes \
    || { seq: 0, byId: new Map(), ids: new WeakMap() })";

const PAGE_HELPERS: &str = r#"
function tag(reg, el) {
    let id = reg.ids.get(el);
    if (id === undefined) {
        id = ++reg.seq;
        reg.ids.set(el, id);
        reg.byId.set(id, new WeakRef(el));
    }
    return id;
}
function lookup(reg, id) {
    const ref = reg.byId.get(id);
    const el = ref ? ref.deref() : undefined;
    if (!el) reg.byId.delete(id);
    if (!el || !el.isConnected) throw new Error('element ' + id + ' is detached');
    return el;
}
"#;

const FIND_CONTAINER: &str = r#"(ids, path) => {
    let node = document;
    for (const sel of path) {
        node = node ? node.querySelector(sel) : null;
    }
    return node && node !== document ? tag(reg, node) : null;
}"#;

const QUERY_ENTRIES: &str = r#"(ids, data) => {
    if (data.selectors.length === 0) return [];
    const root = lookup(reg, data.container);
    return Array.from(root.querySelectorAll(data.selectors.join(','))).map(el => {
        const link = el.querySelector('a[href*="/watch?v="]');
        const title = el.querySelector('#video-title, h3, [title]');
        return {
            node: tag(reg, el),
            href: link ? link.href : null,
            title: title ? (title.getAttribute('title') || title.textContent || '').trim() : '',
        };
    });
}"#;

const CONTAINER_HEIGHT: &str = r#"(ids, id) => lookup(reg, id).offsetHeight"#;

const SCROLL_Y: &str = r#"(ids) => window.scrollY"#;

const SCROLL_TO: &str = r#"(ids, y) => { window.scrollTo(0, y); return true; }"#;

const SCROLL_INTO_VIEW: &str = r#"(ids, id) => { lookup(reg, id).scrollIntoView(); return true; }"#;

const NAVIGATE: &str = r#"(ids, url) => { window.location.href = url; return true; }"#;

const MOUNT: &str = r#"(ids, css) => {
    document.getElementById(ids.overlay)?.remove();
    const overlay = document.createElement('div');
    overlay.id = ids.overlay;
    const grid = document.createElement('div');
    grid.id = ids.grid;
    overlay.appendChild(grid);
    document.body.appendChild(overlay);
    if (!document.getElementById(ids.style)) {
        const style = document.createElement('style');
        style.id = ids.style;
        style.textContent = css;
        document.head.appendChild(style);
    }
    return true;
}"#;

const UNMOUNT: &str = r#"(ids) => {
    const overlay = document.getElementById(ids.overlay);
    const style = document.getElementById(ids.style);
    overlay?.remove();
    style?.remove();
    return Boolean(overlay || style);
}"#;

const APPEND_CARDS: &str = r#"(ids, cards) => {
    const grid = document.getElementById(ids.grid);
    if (!grid) throw new Error('overlay is not mounted');
    const batch = document.createDocumentFragment();
    for (const card of cards) {
        const item = document.createElement('a');
        item.className = ids.item;
        item.href = card.href;
        item.dataset.videoId = card.id;
        const img = document.createElement('img');
        img.src = card.thumbnail;
        img.loading = 'eager';
        img.alt = '';
        const title = document.createElement('div');
        title.className = ids.title;
        title.textContent = card.title;
        item.append(img, title);
        batch.appendChild(item);
    }
    grid.insertBefore(batch, grid.querySelector('.' + ids.loadmore));
    return cards.length;
}"#;

const PLACE_SENTINEL: &str = r#"(ids) => {
    const grid = document.getElementById(ids.grid);
    if (!grid) throw new Error('overlay is not mounted');
    let button = grid.querySelector('.' + ids.loadmore);
    if (!button) {
        button = document.createElement('button');
        button.textContent = 'Load more videos';
        button.className = ids.item + ' ' + ids.loadmore;
    }
    grid.appendChild(button);
    return true;
}"#;

const FOCUS: &str = r#"(ids, index) => {
    const overlay = document.getElementById(ids.overlay);
    if (!overlay) throw new Error('overlay is not mounted');
    const items = overlay.querySelectorAll('.' + ids.item);
    const target = items[index];
    if (!target) throw new Error('no overlay item at ' + index);
    overlay.querySelectorAll('.' + ids.selected).forEach(el => el.classList.remove(ids.selected));
    target.classList.add(ids.selected);
    const frame = overlay.getBoundingClientRect();
    const rect = target.getBoundingClientRect();
    const offset = rect.top - frame.top - overlay.clientHeight / 2 + target.clientHeight / 2;
    overlay.scrollBy({ top: offset, behavior: 'smooth' });
    return true;
}"#;

const OVERLAY_CSS: &str = r#"
#tube-remote-overlay {
    position: fixed; inset: 0; z-index: 1000000;
    background: rgba(0, 0, 0, .90); overflow-y: auto;
    display: flex; flex-direction: column;
    font-family: Roboto, Arial, sans-serif;
}
#tube-remote-grid {
    display: grid;
    grid-template-columns: repeat(2, 1fr);
    gap: 12px;
    padding: 24px 24px 93px;
    max-width: calc(100vw - 30px);
    margin: 0 auto;
    width: max-content;
    box-sizing: border-box;
    position: relative;
}
.tube-remote-item {
    display: block;
    padding: 10px;
    border-radius: 10px;
    color: white;
    text-decoration: none;
    transition: scale 0.2s ease-in-out, background-color 0.2s ease-in-out, transform 0.2s ease-in-out;
    zoom: 1.75;
}
.tube-remote-item img { width: 320px; aspect-ratio: 16 / 9; object-fit: cover; border-radius: 8px; }
.tube-remote-title { width: 320px; font-size: 14px; margin-top: 6px; }
.tube-remote-item--selected { background-color: rgba(255, 255, 255, 0.3); scale: 1.05; }
.tube-remote-loadmore {
    position: absolute; bottom: 24px; left: 50%;
    transform: translateX(-50%) scale(1);
    border: 0; background-color: rgba(255, 255, 255, 0.2);
    color: white; zoom: 1; font-size: 32px; line-height: 1; width: 25%;
}
.tube-remote-loadmore.tube-remote-item--selected {
    background-color: rgba(255, 255, 255, 0.5) !important;
    transform: translateX(-50%) scale(1.1);
    scale: 1;
}
"#;
