use anyhow::{Context, Result};

use crate::ledger::{Admitted, VideoId};
use crate::page::Overlay;

/// Column count of the overlay grid.
pub const GRID_STRIDE: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub id: VideoId,
    pub title: String,
    pub href: String,
    pub thumbnail: String,
}

impl Card {
    /// Copies the fields a card needs; the host element itself is never cloned.
    pub fn from_admitted(admitted: &Admitted, thumbnail_template: &str) -> Self {
        let href = admitted
            .entry
            .href
            .clone()
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", admitted.id));
        Self {
            id: admitted.id.clone(),
            title: admitted.entry.title.trim().to_string(),
            href,
            thumbnail: thumbnail_url(thumbnail_template, &admitted.id),
        }
    }
}

pub fn thumbnail_url(template: &str, id: &VideoId) -> String {
    template.replace("{id}", id.as_str())
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridItem {
    Video(Card),
    LoadMore,
}

impl GridItem {
    pub fn is_sentinel(&self) -> bool {
        matches!(self, GridItem::LoadMore)
    }
}

/// Ordered grid model. Always ends with exactly one `LoadMore`.
#[derive(Debug)]
pub struct Grid {
    items: Vec<GridItem>,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            items: vec![GridItem::LoadMore],
        }
    }
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts one card per admitted entry ahead of the sentinel, on the overlay
    /// first and then on the model. The model only changes once the overlay
    /// accepted the cards, so both always list the same items.
    pub fn render(
        &mut self,
        overlay: &dyn Overlay,
        admitted: &[Admitted],
        thumbnail_template: &str,
    ) -> Result<usize> {
        let cards: Vec<Card> = admitted
            .iter()
            .map(|a| Card::from_admitted(a, thumbnail_template))
            .collect();
        let added = cards.len();

        if !cards.is_empty() {
            overlay.append_cards(&cards).context("append cards to overlay")?;
            let at = self
                .items
                .iter()
                .position(GridItem::is_sentinel)
                .unwrap_or(self.items.len());
            self.items.splice(at..at, cards.into_iter().map(GridItem::Video));
        }
        overlay.place_sentinel().context("place load-more card")?;
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn video_count(&self) -> usize {
        self.items.iter().filter(|item| !item.is_sentinel()).count()
    }

    pub fn last_video_index(&self) -> Option<usize> {
        self.video_count().checked_sub(1)
    }

    pub fn item(&self, index: usize) -> Option<&GridItem> {
        self.items.get(index)
    }

    pub fn items(&self) -> &[GridItem] {
        &self.items
    }

    pub fn video_ids(&self) -> impl Iterator<Item = &VideoId> {
        self.items.iter().filter_map(|item| match item {
            GridItem::Video(card) => Some(&card.id),
            GridItem::LoadMore => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::page::{MemoryPage, NodeRef, OverlayItem, VideoEntry};

    const TEMPLATE: &str = "https://i.ytimg.com/vi/{id}/hqdefault.jpg";

    fn admit(ledger: &mut Ledger, ids: &[&str]) -> Vec<Admitted> {
        let entries = ids
            .iter()
            .enumerate()
            .map(|(i, id)| VideoEntry {
                node: NodeRef(i as u64),
                href: Some(format!("/watch?v={id}")),
                title: format!("  {id} title "),
            })
            .collect();
        ledger.admit(entries)
    }

    #[test]
    fn card_uses_canonical_thumbnail() {
        let mut ledger = Ledger::new();
        let admitted = admit(&mut ledger, &["xyz"]);
        let card = Card::from_admitted(&admitted[0], TEMPLATE);
        assert_eq!(card.thumbnail, "https://i.ytimg.com/vi/xyz/hqdefault.jpg");
        assert_eq!(card.title, "xyz title");
        assert_eq!(card.href, "/watch?v=xyz");
    }

    #[test]
    fn sentinel_stays_single_and_last() {
        let overlay = MemoryPage::new();
        overlay.mount().unwrap();
        let mut ledger = Ledger::new();
        let mut grid = Grid::new();

        grid.render(&overlay, &admit(&mut ledger, &["a", "b"]), TEMPLATE)
            .unwrap();
        grid.render(&overlay, &[], TEMPLATE).unwrap();
        grid.render(&overlay, &admit(&mut ledger, &["b", "c"]), TEMPLATE)
            .unwrap();

        let sentinels = grid.items().iter().filter(|i| i.is_sentinel()).count();
        assert_eq!(sentinels, 1);
        assert!(grid.items().last().unwrap().is_sentinel());
        assert_eq!(grid.len(), 4);
        assert_eq!(grid.last_video_index(), Some(2));

        let mirrored = overlay.overlay_items();
        assert_eq!(
            mirrored,
            vec![
                OverlayItem::Card("a".into()),
                OverlayItem::Card("b".into()),
                OverlayItem::Card("c".into()),
                OverlayItem::Sentinel,
            ]
        );
    }

    #[test]
    fn rejected_cards_leave_the_model_untouched() {
        let overlay = MemoryPage::new();
        overlay.mount().unwrap();
        let mut ledger = Ledger::new();
        let mut grid = Grid::new();
        grid.render(&overlay, &admit(&mut ledger, &["a"]), TEMPLATE)
            .unwrap();

        overlay.fail_appends(true);
        assert!(grid
            .render(&overlay, &admit(&mut ledger, &["b"]), TEMPLATE)
            .is_err());

        assert_eq!(grid.video_count(), 1);
        assert_eq!(
            overlay.overlay_items(),
            vec![OverlayItem::Card("a".into()), OverlayItem::Sentinel]
        );
    }

    #[test]
    fn cards_that_reached_the_overlay_stay_in_the_model() {
        let overlay = MemoryPage::new();
        overlay.mount().unwrap();
        let mut ledger = Ledger::new();
        let mut grid = Grid::new();
        grid.render(&overlay, &admit(&mut ledger, &["a"]), TEMPLATE)
            .unwrap();

        overlay.fail_sentinel(true);
        assert!(grid
            .render(&overlay, &admit(&mut ledger, &["b", "c"]), TEMPLATE)
            .is_err());

        let ids: Vec<String> = grid.video_ids().map(|id| id.to_string()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(
            overlay.overlay_items(),
            vec![
                OverlayItem::Card("a".into()),
                OverlayItem::Card("b".into()),
                OverlayItem::Card("c".into()),
                OverlayItem::Sentinel,
            ]
        );
        assert!(grid.items().last().unwrap().is_sentinel());
    }

    #[test]
    fn empty_grid_has_only_the_sentinel() {
        let grid = Grid::new();
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.video_count(), 0);
        assert_eq!(grid.last_video_index(), None);
    }
}
