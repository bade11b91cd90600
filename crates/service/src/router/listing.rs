use common::path::VirtualPath;

/// Default cap on one aggregate listing.
pub const MAX_LISTING_LEN: usize = 64 * 1024;

/// Newline separated virtual paths gathered from every store for one
/// `dispfnames` request.
///
/// Bounded: once full, further input is cut at the last whole line that
/// still fits and everything after it is dropped.
#[derive(Debug)]
pub struct AggregateListing {
    buf: String,
    limit: usize,
    truncated: bool,
}

impl AggregateListing {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: String::new(),
            limit,
            truncated: false,
        }
    }

    pub fn push_path(&mut self, path: &VirtualPath) {
        let mut line = path.to_string();
        line.push('\n');
        self.append_raw(&line);
    }

    /// Append a store's response text verbatim.
    pub fn append_raw(&mut self, text: &str) {
        if self.truncated || text.is_empty() {
            return;
        }
        let room = self.limit - self.buf.len();
        if text.len() <= room {
            self.buf.push_str(text);
            return;
        }

        self.truncated = true;
        let head = &text.as_bytes()[..room];
        if let Some(end) = head.iter().rposition(|b| *b == b'\n') {
            // cut is right after an ASCII newline, so on a char boundary
            self.buf.push_str(&text[..=end]);
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn line_count(&self) -> usize {
        self.buf.lines().count()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }
}
