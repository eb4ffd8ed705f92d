use std::time::{Duration, Instant};

pub const AUTOPLAY_DELAY: Duration = Duration::from_millis(3000);
pub const TRANSITION_DURATION: Duration = Duration::from_millis(500);

/// Below this many terminal columns the strip shows two cards, otherwise
/// three.
pub const NARROW_VIEWPORT_COLS: u16 = 90;

/// Infinite-loop carousel over `len` real items. The rendered sequence is
/// `[last N] + [all] + [first N]` with the visible index starting at offset
/// N; moving past a cloned boundary is corrected back into the real range
/// with an instantaneous jump once the animated transition settles, so the
/// seam is never animated across.
pub struct Carousel {
    len: usize,
    per_view: usize,
    index: usize,
    hovered: bool,
    transition_started: Option<Instant>,
    last_advance: Instant,
    autoplay_delay: Duration,
}

impl Carousel {
    pub fn new(now: Instant) -> Self {
        Self {
            len: 0,
            per_view: 3,
            index: 3,
            hovered: false,
            transition_started: None,
            last_advance: now,
            autoplay_delay: AUTOPLAY_DELAY,
        }
    }

    pub fn with_autoplay_delay(mut self, delay: Duration) -> Self {
        self.autoplay_delay = delay;
        self
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn per_view(&self) -> usize {
        self.per_view
    }

    /// Resets the strip over a new item count; the visible window returns to
    /// the first real item.
    pub fn set_len(&mut self, len: usize) {
        self.len = len;
        self.index = self.per_view;
        self.transition_started = None;
    }

    pub fn set_viewport_width(&mut self, cols: u16) {
        let per_view = if cols <= NARROW_VIEWPORT_COLS { 2 } else { 3 };
        if per_view != self.per_view {
            self.per_view = per_view;
            self.index = per_view;
            self.transition_started = None;
        }
    }

    pub fn set_hovered(&mut self, hovered: bool) {
        self.hovered = hovered;
    }

    pub fn in_transition(&self) -> bool {
        self.transition_started.is_some()
    }

    pub fn extended_len(&self) -> usize {
        if self.len == 0 {
            0
        } else {
            self.len + 2 * self.per_view
        }
    }

    /// Advances one slide. Refused while a transition is in flight, so
    /// overlapping animations never start.
    pub fn advance(&mut self, now: Instant) -> bool {
        if self.len == 0 || self.in_transition() {
            return false;
        }
        self.index += 1;
        self.transition_started = Some(now);
        self.last_advance = now;
        true
    }

    pub fn retreat(&mut self, now: Instant) -> bool {
        if self.len == 0 || self.in_transition() {
            return false;
        }
        self.index = self.index.saturating_sub(1);
        self.transition_started = Some(now);
        self.last_advance = now;
        true
    }

    /// Jumps straight to a real slide (dot navigation); no animation, so no
    /// seam handling is needed.
    pub fn go_to(&mut self, dot: usize, now: Instant) -> bool {
        if self.len == 0 || self.in_transition() || dot >= self.len {
            return false;
        }
        self.index = dot + self.per_view;
        self.last_advance = now;
        true
    }

    /// Completes an elapsed transition, applying the instantaneous index
    /// correction when the window moved past a cloned boundary. Returns true
    /// if anything changed.
    pub fn settle(&mut self, now: Instant) -> bool {
        let Some(started) = self.transition_started else {
            return false;
        };
        if now.duration_since(started) < TRANSITION_DURATION {
            return false;
        }
        self.transition_started = None;
        if self.index >= self.len + self.per_view {
            // Past the cloned tail: snap back to the real first slide.
            self.index = self.per_view;
        } else if self.index < self.per_view {
            // Before the cloned head: snap to the real last slide.
            self.index = self.len + self.per_view - 1;
        }
        true
    }

    /// Autoplay: advances on a fixed timer, paused while hovered and
    /// suppressed while a transition is in flight.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = self.settle(now);
        if self.len == 0 || self.hovered || self.in_transition() {
            return changed;
        }
        if now.duration_since(self.last_advance) >= self.autoplay_delay {
            changed |= self.advance(now);
        }
        changed
    }

    /// Dot indicator position within the real range.
    pub fn active_dot(&self) -> usize {
        if self.len == 0 {
            0
        } else {
            (self.index + self.len - self.per_view) % self.len
        }
    }

    /// Real item indices currently visible, left to right.
    pub fn visible(&self) -> Vec<usize> {
        if self.len == 0 {
            return Vec::new();
        }
        (0..self.per_view)
            .map(|offset| (self.index + offset + self.len - self.per_view) % self.len)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn carousel(len: usize) -> (Carousel, Instant) {
        let now = Instant::now();
        let mut strip = Carousel::new(now);
        strip.set_len(len);
        (strip, now)
    }

    fn after(now: Instant, ms: u64) -> Instant {
        now + Duration::from_millis(ms)
    }

    #[test]
    fn starts_at_first_real_slide() {
        let (strip, _) = carousel(5);
        assert_eq!(strip.active_dot(), 0);
        assert_eq!(strip.extended_len(), 5 + 6);
        assert_eq!(strip.visible(), [0, 1, 2]);
    }

    #[test]
    fn advancing_past_cloned_tail_snaps_to_first() {
        let (mut strip, now) = carousel(4);
        let mut t = now;
        // Walk from index 3 through 4, 5, 6 and into the cloned range at 7.
        for _ in 0..4 {
            assert!(strip.advance(t));
            t = after(t, 600);
            assert!(strip.settle(t));
        }
        assert_eq!(strip.active_dot(), 0);
        assert_eq!(strip.visible(), [0, 1, 2]);
    }

    #[test]
    fn retreating_past_cloned_head_snaps_to_last() {
        let (mut strip, now) = carousel(4);
        assert!(strip.retreat(now));
        assert!(strip.settle(after(now, 600)));
        assert_eq!(strip.active_dot(), 3);
    }

    #[test]
    fn no_overlapping_transitions() {
        let (mut strip, now) = carousel(5);
        assert!(strip.advance(now));
        assert!(!strip.advance(after(now, 100)));
        assert!(!strip.retreat(after(now, 100)));
        assert!(!strip.settle(after(now, 100)));
        assert!(strip.settle(after(now, 600)));
        assert!(strip.advance(after(now, 700)));
    }

    #[test]
    fn dot_navigation_is_instant() {
        let (mut strip, now) = carousel(6);
        assert!(strip.go_to(4, now));
        assert!(!strip.in_transition());
        assert_eq!(strip.active_dot(), 4);
    }

    #[test]
    fn autoplay_fires_on_interval_and_pauses_on_hover() {
        let now = Instant::now();
        let mut strip = Carousel::new(now).with_autoplay_delay(Duration::from_millis(1000));
        strip.set_len(5);

        assert!(!strip.tick(after(now, 500)));
        assert!(strip.tick(after(now, 1100)));
        assert_eq!(strip.active_dot(), 1);

        strip.settle(after(now, 1700));
        strip.set_hovered(true);
        assert!(!strip.tick(after(now, 3000)));
        assert_eq!(strip.active_dot(), 1);

        strip.set_hovered(false);
        assert!(strip.tick(after(now, 3100)));
        assert_eq!(strip.active_dot(), 2);
    }

    #[test]
    fn narrow_viewport_shows_two_cards() {
        let (mut strip, _) = carousel(5);
        strip.set_viewport_width(80);
        assert_eq!(strip.per_view(), 2);
        assert_eq!(strip.visible(), [0, 1]);
        strip.set_viewport_width(120);
        assert_eq!(strip.per_view(), 3);
    }

    #[test]
    fn empty_strip_is_inert() {
        let now = Instant::now();
        let mut strip = Carousel::new(now);
        assert!(!strip.advance(now));
        assert!(!strip.tick(after(now, 5000)));
        assert!(strip.visible().is_empty());
    }
}
