use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tube_remote::config::NavigatorConfig;
use tube_remote::grid::GridItem;
use tube_remote::navigator::{
    ActivationState, NavCommand, Navigator, Outcome, SelectOutcome, Toggled,
};
use tube_remote::page::{MemoryPage, OverlayItem};

const WAIT: Duration = Duration::from_secs(5);

fn fast_config(extend_timeout: Duration) -> NavigatorConfig {
    NavigatorConfig {
        scroll_settle: Duration::ZERO,
        poll_interval: Duration::from_millis(5),
        extend_timeout,
        ..NavigatorConfig::default()
    }
}

fn navigator_for(page: &Arc<MemoryPage>) -> Navigator {
    navigator_with(page, fast_config(Duration::from_secs(2)))
}

fn navigator_with(page: &Arc<MemoryPage>, config: NavigatorConfig) -> Navigator {
    Navigator::new(page.clone(), page.clone(), config)
}

fn grid_ids(navigator: &Navigator) -> Vec<String> {
    navigator
        .session()
        .expect("active session")
        .grid()
        .video_ids()
        .map(|id| id.to_string())
        .collect()
}

fn selected(navigator: &Navigator) -> usize {
    navigator.session().expect("active session").selected_index()
}

#[test]
fn walks_the_grid_and_opens_the_selected_video() {
    let page = Arc::new(MemoryPage::with_videos(&["a", "b", "c", "d"]));
    let mut navigator = navigator_for(&page);

    assert_eq!(
        navigator.run(NavCommand::Toggle).unwrap(),
        Outcome::Toggled(Toggled::Activated)
    );
    assert_eq!(selected(&navigator), 0);
    assert_eq!(page.highlighted(), Some(0));
    assert_eq!(page.overlay_items().len(), 5);
    assert_eq!(page.overlay_items().last(), Some(&OverlayItem::Sentinel));

    assert_eq!(navigator.run(NavCommand::Right).unwrap(), Outcome::Moved(true));
    assert_eq!(selected(&navigator), 1);
    assert_eq!(navigator.run(NavCommand::Down).unwrap(), Outcome::Moved(true));
    assert_eq!(selected(&navigator), 3);
    assert_eq!(navigator.run(NavCommand::Down).unwrap(), Outcome::Moved(false));
    assert_eq!(selected(&navigator), 3);
    assert_eq!(page.highlighted(), Some(3));

    let outcome = navigator.run(NavCommand::Select).unwrap();
    let expected = "https://www.youtube.com/watch?v=d".to_string();
    assert_eq!(outcome, Outcome::Selected(SelectOutcome::Navigated(expected.clone())));
    assert_eq!(page.navigations(), vec![expected]);
    assert_eq!(navigator.state(), ActivationState::Uninitialized);
    assert!(navigator.session().is_none());
}

#[test]
fn load_more_appends_new_videos_and_keeps_the_cursor() {
    let page = Arc::new(MemoryPage::with_videos(&["a", "b", "c", "d"]));
    page.queue_batch(&["e", "f"]);
    let mut navigator = navigator_for(&page);
    navigator.activate().unwrap();

    navigator.run(NavCommand::Down).unwrap();
    navigator.run(NavCommand::Down).unwrap();
    assert_eq!(selected(&navigator), 4);
    assert_eq!(
        navigator.session().unwrap().selected_item(),
        Some(&GridItem::LoadMore)
    );

    assert_eq!(
        navigator.run(NavCommand::Select).unwrap(),
        Outcome::Selected(SelectOutcome::ExtensionStarted)
    );
    assert!(navigator.wait_for_extension(WAIT));

    assert_eq!(grid_ids(&navigator), ["a", "b", "c", "d", "e", "f"]);
    assert_eq!(selected(&navigator), 4);
    match navigator.session().unwrap().selected_item() {
        Some(GridItem::Video(card)) => assert_eq!(card.id.as_str(), "e"),
        other => panic!("expected video e, got {other:?}"),
    }
    assert_eq!(page.overlay_items().len(), 7);
    assert_eq!(page.overlay_items().last(), Some(&OverlayItem::Sentinel));
    assert_eq!(page.highlighted(), Some(4));
}

#[test]
fn overlapping_batches_never_duplicate_cards() {
    let page = Arc::new(MemoryPage::with_videos(&["a", "b", "c"]));
    page.queue_batch(&["c", "d", "a", "e"]);
    let mut navigator = navigator_for(&page);
    navigator.activate().unwrap();

    navigator.run(NavCommand::Down).unwrap();
    navigator.run(NavCommand::Right).unwrap();
    assert_eq!(
        navigator.session().unwrap().selected_item(),
        Some(&GridItem::LoadMore)
    );
    navigator.run(NavCommand::Select).unwrap();
    assert!(navigator.wait_for_extension(WAIT));

    assert_eq!(grid_ids(&navigator), ["a", "b", "c", "d", "e"]);
    let sentinels = page
        .overlay_items()
        .iter()
        .filter(|item| **item == OverlayItem::Sentinel)
        .count();
    assert_eq!(sentinels, 1);
}

#[test]
fn missing_container_leaves_only_the_load_more_card() {
    let page = Arc::new(MemoryPage::without_container());
    let mut navigator = navigator_for(&page);
    navigator.activate().unwrap();

    assert_eq!(page.overlay_items(), vec![OverlayItem::Sentinel]);
    assert_eq!(selected(&navigator), 0);
    for command in [NavCommand::Up, NavCommand::Down, NavCommand::Left, NavCommand::Right] {
        assert_eq!(navigator.run(command).unwrap(), Outcome::Moved(false));
    }

    assert_eq!(
        navigator.run(NavCommand::Select).unwrap(),
        Outcome::Selected(SelectOutcome::ExtensionStarted)
    );
    assert!(navigator.wait_for_extension(WAIT));
    assert_eq!(selected(&navigator), 0);
    assert_eq!(page.overlay_items(), vec![OverlayItem::Sentinel]);
}

#[test]
fn timed_out_extension_keeps_the_session_usable() {
    let page = Arc::new(MemoryPage::with_videos(&["a", "b", "c", "d"]));
    let mut navigator = navigator_with(&page, fast_config(Duration::from_millis(300)));
    navigator.activate().unwrap();
    navigator.run(NavCommand::Down).unwrap();
    navigator.run(NavCommand::Down).unwrap();

    assert_eq!(
        navigator.run(NavCommand::Select).unwrap(),
        Outcome::Selected(SelectOutcome::ExtensionStarted)
    );
    assert_eq!(
        navigator.run(NavCommand::Select).unwrap(),
        Outcome::Selected(SelectOutcome::ExtensionPending)
    );
    assert!(navigator.session().unwrap().is_extending());

    assert!(navigator.wait_for_extension(WAIT));
    let session = navigator.session().unwrap();
    assert!(!session.is_extending());
    assert_eq!(session.grid().video_count(), 4);
    assert_eq!(selected(&navigator), 3);

    assert_eq!(navigator.run(NavCommand::Up).unwrap(), Outcome::Moved(true));
    assert_eq!(selected(&navigator), 1);
}

#[test]
fn moves_stay_responsive_while_loading() {
    let page = Arc::new(MemoryPage::with_videos(&["a", "b"]));
    let mut navigator = navigator_with(&page, fast_config(Duration::from_millis(300)));
    navigator.activate().unwrap();
    navigator.run(NavCommand::Down).unwrap();
    navigator.run(NavCommand::Select).unwrap();

    assert_eq!(navigator.run(NavCommand::Up).unwrap(), Outcome::Moved(true));
    assert_eq!(selected(&navigator), 0);
    assert!(navigator.wait_for_extension(WAIT));
    assert_eq!(selected(&navigator), 0);
}

#[test]
fn toggling_cycles_through_activation_states() {
    let page = Arc::new(MemoryPage::with_videos(&["a", "b"]));
    let mut navigator = navigator_for(&page);
    assert_eq!(navigator.state(), ActivationState::Uninitialized);

    assert_eq!(navigator.toggle().unwrap(), Toggled::Activated);
    assert_eq!(navigator.state(), ActivationState::Active);
    assert!(page.is_mounted());

    assert_eq!(navigator.toggle().unwrap(), Toggled::Deactivated);
    assert_eq!(navigator.state(), ActivationState::Inactive);
    assert!(!page.is_mounted());

    assert_eq!(navigator.toggle().unwrap(), Toggled::Activated);
    assert_eq!(navigator.state(), ActivationState::Active);
    assert_eq!(selected(&navigator), 0);
    assert_eq!(grid_ids(&navigator), ["a", "b"]);
}

#[test]
fn deactivation_is_idempotent() {
    let page = Arc::new(MemoryPage::with_videos(&["a"]));
    let mut navigator = navigator_for(&page);

    navigator.deactivate().unwrap();
    navigator.activate().unwrap();
    navigator.deactivate().unwrap();
    navigator.deactivate().unwrap();

    assert!(!page.is_mounted());
    assert!(page.overlay_items().is_empty());
    assert!(navigator.session().is_none());
}

#[test]
fn commands_without_a_session_are_ignored() {
    let page = Arc::new(MemoryPage::with_videos(&["a", "b"]));
    let mut navigator = navigator_for(&page);

    assert_eq!(navigator.dispatch(NavCommand::Down), Outcome::Ignored);
    assert_eq!(navigator.dispatch(NavCommand::Select), Outcome::Ignored);
    assert!(page.navigations().is_empty());
    assert!(!navigator.poll());
}

#[test]
fn failing_page_queries_are_logged_not_fatal() {
    let page = Arc::new(MemoryPage::with_videos(&["a", "b"]));
    page.fail_queries(true);
    let mut navigator = navigator_for(&page);

    assert_eq!(
        navigator.dispatch(NavCommand::Toggle),
        Outcome::Toggled(Toggled::Activated)
    );
    assert_eq!(page.overlay_items(), vec![OverlayItem::Sentinel]);

    page.fail_queries(false);
    navigator.dispatch(NavCommand::Toggle);
    navigator.dispatch(NavCommand::Toggle);
    assert_eq!(grid_ids(&navigator), ["a", "b"]);
}

#[test]
fn load_more_picks_up_entries_rendered_after_opening() {
    let page = Arc::new(MemoryPage::new());
    let mut navigator = navigator_for(&page);
    navigator.activate().unwrap();
    assert_eq!(page.overlay_items(), vec![OverlayItem::Sentinel]);

    page.push_videos(&["a", "b"]);
    assert_eq!(
        navigator.run(NavCommand::Select).unwrap(),
        Outcome::Selected(SelectOutcome::ExtensionStarted)
    );
    assert!(navigator.wait_for_extension(WAIT));

    assert_eq!(grid_ids(&navigator), ["a", "b"]);
    assert_eq!(selected(&navigator), 0);
    assert_eq!(page.overlay_items().len(), 3);
    assert_eq!(page.highlighted(), Some(0));
}

#[test]
fn cards_the_overlay_rejected_are_loaded_again_later() {
    let page = Arc::new(MemoryPage::with_videos(&["a", "b"]));
    page.queue_batch(&["c"]);
    page.queue_batch(&["d"]);
    let mut navigator = navigator_for(&page);
    navigator.activate().unwrap();
    navigator.run(NavCommand::Down).unwrap();

    page.fail_appends(true);
    navigator.run(NavCommand::Select).unwrap();
    assert!(!navigator.wait_for_extension(WAIT));
    assert!(!navigator.session().unwrap().is_extending());
    assert_eq!(grid_ids(&navigator), ["a", "b"]);
    assert_eq!(page.overlay_items().len(), 3);

    page.fail_appends(false);
    assert_eq!(
        navigator.run(NavCommand::Select).unwrap(),
        Outcome::Selected(SelectOutcome::ExtensionStarted)
    );
    assert!(navigator.wait_for_extension(WAIT));

    assert_eq!(grid_ids(&navigator), ["a", "b", "c", "d"]);
    assert_eq!(selected(&navigator), 2);
    assert_eq!(page.highlighted(), Some(2));
    assert_eq!(page.overlay_items()[2], OverlayItem::Card("c".into()));
    match navigator.session().unwrap().selected_item() {
        Some(GridItem::Video(card)) => assert_eq!(card.id.as_str(), "c"),
        other => panic!("expected video c, got {other:?}"),
    }
}

#[test]
fn closing_the_navigator_cancels_a_pending_load() {
    let page = Arc::new(MemoryPage::with_videos(&["a", "b"]));
    let mut navigator = navigator_with(&page, fast_config(Duration::from_secs(30)));
    navigator.toggle().unwrap();
    navigator.run(NavCommand::Down).unwrap();
    assert_eq!(
        navigator.run(NavCommand::Select).unwrap(),
        Outcome::Selected(SelectOutcome::ExtensionStarted)
    );
    assert!(navigator.session().unwrap().is_extending());

    assert_eq!(navigator.toggle().unwrap(), Toggled::Deactivated);
    thread::sleep(Duration::from_millis(100));
    let reads = page.height_reads();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(page.height_reads(), reads, "extension worker kept polling");

    assert_eq!(navigator.toggle().unwrap(), Toggled::Activated);
    assert!(!navigator.poll());
    let session = navigator.session().unwrap();
    assert!(!session.is_extending());
    assert_eq!(grid_ids(&navigator), ["a", "b"]);
    assert_eq!(selected(&navigator), 0);
    assert!(!navigator.wait_for_extension(Duration::from_millis(50)));
}
