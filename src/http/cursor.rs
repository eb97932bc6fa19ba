/// Read position over a borrowed byte window.
///
/// Scanning code (header terminator search, multipart boundary search) walks
/// the window through this type instead of juggling raw indices. Offsets
/// returned by [`ByteCursor::find`] are relative to the start of the window,
/// not to the cursor position, so callers can add a window base to get an
/// absolute offset.
#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Bytes from the current position to the end of the window.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Moves forward by `n` bytes, clamped to the end of the window.
    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.buf.len());
    }

    /// Window offset of the next occurrence of `needle` at or after the
    /// current position. Does not move the cursor.
    pub fn find(&self, needle: &[u8]) -> Option<usize> {
        if needle.is_empty() || self.remaining() < needle.len() {
            return None;
        }
        self.rest()
            .windows(needle.len())
            .position(|w| w == needle)
            .map(|idx| self.pos + idx)
    }

    /// Window offset of the next byte equal to `byte`.
    pub fn find_byte(&self, byte: u8) -> Option<usize> {
        self.rest()
            .iter()
            .position(|&b| b == byte)
            .map(|idx| self.pos + idx)
    }
}
