use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;

use crate::ledger::extract_video_id;
use crate::navigator::{NavCommand, Outcome, SelectOutcome};

#[derive(Debug, thiserror::Error)]
#[error("unknown command {0:?}")]
pub struct UnknownCommand(pub String);

/// Everything the daemon accepts over its socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SkipForward,
    SkipBackward,
    QualityUp,
    QualityDown,
    NextChapter,
    PrevChapter,
    Captions,
    Fullscreen,
    Theater,
    Restart,
    VideoNavigator,
    NavigatorUp,
    NavigatorDown,
    NavigatorLeft,
    NavigatorRight,
    NavigatorSelect,
    Exit,
}

impl Command {
    pub const ALL: [Command; 17] = [
        Command::SkipForward,
        Command::SkipBackward,
        Command::QualityUp,
        Command::QualityDown,
        Command::NextChapter,
        Command::PrevChapter,
        Command::Captions,
        Command::Fullscreen,
        Command::Theater,
        Command::Restart,
        Command::VideoNavigator,
        Command::NavigatorUp,
        Command::NavigatorDown,
        Command::NavigatorLeft,
        Command::NavigatorRight,
        Command::NavigatorSelect,
        Command::Exit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::SkipForward => "skip_forward",
            Command::SkipBackward => "skip_backward",
            Command::QualityUp => "quality_up",
            Command::QualityDown => "quality_down",
            Command::NextChapter => "next_chapter",
            Command::PrevChapter => "prev_chapter",
            Command::Captions => "cc",
            Command::Fullscreen => "fullscreen",
            Command::Theater => "theater",
            Command::Restart => "restart",
            Command::VideoNavigator => "video_navigator",
            Command::NavigatorUp => "navigator_up",
            Command::NavigatorDown => "navigator_down",
            Command::NavigatorLeft => "navigator_left",
            Command::NavigatorRight => "navigator_right",
            Command::NavigatorSelect => "navigator_select",
            Command::Exit => "exit",
        }
    }

    pub fn navigator(&self) -> Option<NavCommand> {
        match self {
            Command::VideoNavigator => Some(NavCommand::Toggle),
            Command::NavigatorUp => Some(NavCommand::Up),
            Command::NavigatorDown => Some(NavCommand::Down),
            Command::NavigatorLeft => Some(NavCommand::Left),
            Command::NavigatorRight => Some(NavCommand::Right),
            Command::NavigatorSelect => Some(NavCommand::Select),
            _ => None,
        }
    }

    /// Page expression for the one-shot player commands.
    pub fn player_expression(&self, skip_seconds: u32) -> Option<String> {
        let expr = match self {
            Command::SkipForward => {
                format!("document.querySelector('video').currentTime += {skip_seconds}")
            }
            Command::SkipBackward => {
                format!("document.querySelector('video').currentTime -= {skip_seconds}")
            }
            Command::QualityUp => step_quality(-1),
            Command::QualityDown => step_quality(1),
            Command::NextChapter => NEXT_CHAPTER.to_string(),
            Command::PrevChapter => PREV_CHAPTER.to_string(),
            Command::Captions => click_button(".ytp-subtitles-button"),
            Command::Fullscreen => click_button(".ytp-fullscreen-button"),
            Command::Theater => click_button(".ytp-size-button"),
            Command::Restart => "document.querySelector('video').currentTime = 0".to_string(),
            _ => return None,
        };
        Some(expr)
    }

    pub fn status_message(&self, skip_seconds: u32) -> String {
        match self {
            Command::SkipForward => format!("Skipped forward {skip_seconds} seconds"),
            Command::SkipBackward => format!("Skipped backward {skip_seconds} seconds"),
            Command::QualityUp => "Increased video quality".to_string(),
            Command::QualityDown => "Decreased video quality".to_string(),
            Command::NextChapter => "Skipped to next chapter".to_string(),
            Command::PrevChapter => "Skipped to previous chapter".to_string(),
            Command::Captions => "Toggled closed captions".to_string(),
            Command::Fullscreen => "Toggled fullscreen".to_string(),
            Command::Theater => "Toggled theater mode".to_string(),
            Command::Restart => "Restarted video".to_string(),
            Command::VideoNavigator => "Toggled video navigator".to_string(),
            Command::NavigatorUp => "Moved up in navigator".to_string(),
            Command::NavigatorDown => "Moved down in navigator".to_string(),
            Command::NavigatorLeft => "Moved left in navigator".to_string(),
            Command::NavigatorRight => "Moved right in navigator".to_string(),
            Command::NavigatorSelect => "Selected item in navigator".to_string(),
            Command::Exit => "Stopping".to_string(),
        }
    }

    /// Status line for a navigator command, naming the video a select opened.
    pub fn outcome_message(&self, outcome: &Outcome, skip_seconds: u32) -> String {
        match outcome {
            Outcome::Selected(SelectOutcome::Navigated(href)) => {
                let video = extract_video_id(href)
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| href.clone());
                format!("Selected video {video} in navigator")
            }
            Outcome::Selected(SelectOutcome::ExtensionStarted) => {
                "Loading more videos in navigator".to_string()
            }
            Outcome::Selected(SelectOutcome::ExtensionPending) => {
                "Still loading more videos in navigator".to_string()
            }
            Outcome::Selected(SelectOutcome::MissingLink) => {
                "Selected item has no video link".to_string()
            }
            _ => self.status_message(skip_seconds),
        }
    }
}

// YouTube lists qualities from highest to lowest; `direction` -1 moves up the list.
fn step_quality(direction: i32) -> String {
    QUALITY_STEP.replace("{direction}", &direction.to_string())
}

const QUALITY_STEP: &str = r#"(() => {
    const menuBtn = document.querySelector('.ytp-settings-button');
    if (!menuBtn) return;
    menuBtn.click();
    setTimeout(() => {
        const items = Array.from(document.querySelectorAll('.ytp-menuitem'));
        const qualityItem = items.find(i =>
            i.textContent.includes('Quality') || i.textContent.includes('Kwaliteit')
        );
        if (!qualityItem) { menuBtn.click(); return; }
        qualityItem.click();
        setTimeout(() => {
            const options = Array.from(document.querySelectorAll('.ytp-quality-menu .ytp-menuitem'));
            const selected = options.findIndex(o => o.getAttribute('aria-checked') === 'true');
            const target = options[selected + ({direction})];
            if (selected >= 0 && target) target.click();
            menuBtn.click();
        }, 100);
    }, 100);
})()"#;

const CHAPTER_TIMES: &str = r#"
    const video = document.querySelector('video');
    if (!video) return;
    const marks = Array.from(document.querySelectorAll(
        '#contents #endpoint #details div#time.style-scope.ytd-macro-markers-list-item-renderer'
    ));
    if (marks.length === 0) return;
    const parse = t => t.split(':').reduce((acc, v) => acc * 60 + parseFloat(v), 0);
    const times = marks.map(m => parse(m.textContent.trim()));
    const now = video.currentTime;
"#;

const NEXT_CHAPTER_BODY: &str = r#"
    const next = times.find(t => now < t - 1);
    video.currentTime = next === undefined ? video.duration : next;
"#;

const PREV_CHAPTER_BODY: &str = r#"
    const starts = [0, ...times];
    const upcoming = starts.findIndex(t => now < t - 1);
    const current = upcoming === -1 ? starts.length - 1 : upcoming - 1;
    video.currentTime = starts[Math.max(current - 1, 0)];
"#;

static NEXT_CHAPTER: Lazy<String> =
    Lazy::new(|| format!("(() => {{{CHAPTER_TIMES}{NEXT_CHAPTER_BODY}}})()"));
static PREV_CHAPTER: Lazy<String> =
    Lazy::new(|| format!("(() => {{{CHAPTER_TIMES}{PREV_CHAPTER_BODY}}})()"));

fn click_button(selector: &str) -> String {
    format!(
        "(() => {{ const btn = document.querySelector('{selector}'); if (btn) btn.click(); }})()"
    )
}

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let name = raw.trim();
        Command::ALL
            .iter()
            .copied()
            .find(|cmd| cmd.as_str() == name)
            .ok_or_else(|| UnknownCommand(name.to_string()))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
