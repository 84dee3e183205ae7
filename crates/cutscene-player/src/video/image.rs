pub const PALETTE_SIZE: usize = 256;

/// Value of a palette slot no `P` chunk has assigned yet.
pub const UNSET: u32 = 0;

const OPAQUE: u32 = 0xFF00_0000;

/// 256-entry ARGB color table.
///
/// Assigned entries always carry the opaque alpha bit, so they can never
/// collide with [`UNSET`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: [u32; PALETTE_SIZE],
}

impl Palette {
    pub fn new() -> Self {
        Self {
            colors: [UNSET; PALETTE_SIZE],
        }
    }

    /// Assign indices `0..rgb.len() / 3` from packed RGB triples.
    pub fn apply(&mut self, rgb: &[u8]) {
        for (slot, c) in self.colors.iter_mut().zip(rgb.chunks_exact(3)) {
            *slot = OPAQUE | (u32::from(c[0]) << 16) | (u32::from(c[1]) << 8) | u32::from(c[2]);
        }
    }

    pub fn get(&self, index: u8) -> u32 {
        self.colors[usize::from(index)]
    }

    pub fn is_set(&self, index: u8) -> bool {
        self.get(index) != UNSET
    }

    pub fn assigned(&self) -> usize {
        self.colors.iter().filter(|&&c| c != UNSET).count()
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::new()
    }
}

/// Composed ARGB image, updated in place frame after frame.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl FrameBuffer {
    /// A zeroed buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![UNSET; width as usize * height as usize],
        }
    }

    /// Apply one image chunk as a delta frame.
    ///
    /// A pixel changes only when its index refers to an assigned palette
    /// slot; otherwise the previous frame's pixel is kept. Returns the
    /// number of pixels written.
    pub fn compose(&mut self, indices: &[u8], palette: &Palette) -> usize {
        debug_assert_eq!(indices.len(), self.pixels.len());
        let mut written = 0;
        for (pixel, &index) in self.pixels.iter_mut().zip(indices) {
            let color = palette.get(index);
            if color != UNSET {
                *pixel = color;
                written += 1;
            }
        }
        written
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Owned copy for handing to the presenter.
    pub fn snapshot(&self) -> Vec<u32> {
        self.pixels.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_palette_is_unset() {
        let p = Palette::new();
        assert_eq!(p.assigned(), 0);
        assert!(!p.is_set(0));
        assert!(!p.is_set(255));
    }

    #[test]
    fn black_is_distinguishable_from_unset() {
        let mut p = Palette::new();
        p.apply(&[0, 0, 0]);
        assert!(p.is_set(0));
        assert_eq!(p.get(0), 0xFF00_0000);
    }

    #[test]
    fn apply_writes_leading_indices_only() {
        let mut p = Palette::new();
        p.apply(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        p.apply(&[0xAA, 0xBB, 0xCC]);
        assert_eq!(p.get(0), 0xFFAA_BBCC);
        assert_eq!(p.get(1), 0xFF04_0506);
        assert_eq!(p.get(2), 0xFF07_0809);
        assert!(!p.is_set(3));
        assert_eq!(p.assigned(), 3);
    }

    #[test]
    fn unset_indices_leave_buffer_untouched() {
        let palette = Palette::new();
        let mut frame = FrameBuffer::new(2, 2);
        let written = frame.compose(&[0, 1, 2, 3], &palette);
        assert_eq!(written, 0);
        assert!(frame.pixels().iter().all(|&p| p == UNSET));
    }

    #[test]
    fn only_assigned_indices_change_pixels() {
        let mut palette = Palette::new();
        palette.apply(&[10, 20, 30]);
        let mut frame = FrameBuffer::new(3, 1);
        let written = frame.compose(&[0, 5, 0], &palette);
        assert_eq!(written, 2);
        assert_eq!(frame.pixels(), &[0xFF0A_141E, UNSET, 0xFF0A_141E]);
    }

    #[test]
    fn delta_frames_keep_previous_pixels() {
        let mut palette = Palette::new();
        palette.apply(&[255, 0, 0, 0, 255, 0]);
        let mut frame = FrameBuffer::new(2, 1);
        frame.compose(&[0, 1], &palette);

        // Later chunk references an unset slot for the first pixel.
        let mut update = Palette::new();
        update.apply(&[0, 0, 0, 0, 0, 255]);
        frame.compose(&[9, 1], &update);
        assert_eq!(frame.pixels(), &[0xFFFF_0000, 0xFF00_00FF]);
    }
}
