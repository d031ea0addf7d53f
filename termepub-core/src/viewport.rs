/// Scroll state over a laid-out chapter.
///
/// `width`/`height` describe the visible area in terminal cells,
/// `doc_width`/`doc_height` the extent of the current chapter. Offsets are
/// re-clamped whenever either side changes, so
/// `scroll_y <= max_scroll_y()` and `scroll_x <= max_scroll_x()` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    scroll_x: usize,
    scroll_y: usize,
    width: usize,
    height: usize,
    doc_width: usize,
    doc_height: usize,
}

impl Viewport {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            scroll_x: 0,
            scroll_y: 0,
            width: width.max(1),
            height: height.max(1),
            doc_width: 0,
            doc_height: 0,
        }
    }

    pub fn scroll_x(&self) -> usize {
        self.scroll_x
    }

    pub fn scroll_y(&self) -> usize {
        self.scroll_y
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn max_scroll_y(&self) -> usize {
        self.doc_height.saturating_sub(self.height)
    }

    pub fn max_scroll_x(&self) -> usize {
        self.doc_width.saturating_sub(self.width)
    }

    pub fn at_top(&self) -> bool {
        self.scroll_y == 0
    }

    pub fn at_bottom(&self) -> bool {
        self.scroll_y >= self.max_scroll_y()
    }

    pub fn set_extent(&mut self, doc_height: usize, doc_width: usize) {
        self.doc_height = doc_height;
        self.doc_width = doc_width;
        self.clamp();
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.clamp();
    }

    pub fn scroll_to(&mut self, scroll_y: usize) {
        self.scroll_y = scroll_y.min(self.max_scroll_y());
    }

    pub fn scroll_down(&mut self) {
        self.scroll_to(self.scroll_y.saturating_add(1));
    }

    pub fn scroll_up(&mut self) {
        self.scroll_y = self.scroll_y.saturating_sub(1);
    }

    pub fn scroll_right(&mut self) {
        self.scroll_x = self.scroll_x.saturating_add(1).min(self.max_scroll_x());
    }

    pub fn scroll_left(&mut self) {
        self.scroll_x = self.scroll_x.saturating_sub(1);
    }

    /// Advances one screen. Returns `true` without moving when the viewport
    /// already sits at the bottom of the chapter.
    pub fn page_down(&mut self) -> bool {
        if self.at_bottom() {
            return true;
        }
        self.scroll_to(self.scroll_y.saturating_add(self.height));
        false
    }

    /// Goes back one screen. Returns `true` without moving when already at
    /// the top.
    pub fn page_up(&mut self) -> bool {
        if self.at_top() {
            return true;
        }
        self.scroll_y = self.scroll_y.saturating_sub(self.height);
        false
    }

    pub fn to_top(&mut self) {
        self.scroll_y = 0;
    }

    pub fn to_bottom(&mut self) {
        self.scroll_y = self.max_scroll_y();
    }

    fn clamp(&mut self) {
        self.scroll_y = self.scroll_y.min(self.max_scroll_y());
        self.scroll_x = self.scroll_x.min(self.max_scroll_x());
    }
}
