//! Sub-matrix overlays.
//!
//! A sub-matrix is a block of RGB pixels stored somewhere else in the
//! channel buffer (for example a second sequence model) that is pasted
//! onto the wall canvas before packing.

/// One overlay block, in canvas pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubMatrix {
    pub enabled: bool,
    /// 0-based channel where the block's pixels start.
    pub start_channel: usize,
    pub width: u32,
    pub height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
}

impl SubMatrix {
    /// One past the last source channel, saturating on absurd sizes.
    fn source_end(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(3)
            .saturating_add(self.start_channel)
    }
}

/// The canvas plus every overlay pasted onto it.
#[derive(Clone, Debug, Default)]
pub struct CanvasOverlay {
    canvas_start: usize,
    canvas_width: u32,
    canvas_height: u32,
    sub_matrices: Vec<SubMatrix>,
}

impl CanvasOverlay {
    pub fn new(canvas_start: usize, canvas_width: u32, canvas_height: u32) -> Self {
        Self {
            canvas_start,
            canvas_width,
            canvas_height,
            sub_matrices: Vec::new(),
        }
    }

    pub fn add_sub_matrix(&mut self, sub: SubMatrix) {
        self.sub_matrices.push(sub);
    }

    pub fn sub_matrices(&self) -> &[SubMatrix] {
        &self.sub_matrices
    }

    /// One past the last channel any enabled block reads from.
    pub fn source_end(&self) -> usize {
        self.sub_matrices
            .iter()
            .filter(|s| s.enabled)
            .map(SubMatrix::source_end)
            .max()
            .unwrap_or(0)
    }

    /// Enabled blocks whose source channels are not all inside the canvas.
    pub fn sources_outside_canvas(&self) -> impl Iterator<Item = &SubMatrix> {
        let canvas_end =
            self.canvas_start + self.canvas_width as usize * self.canvas_height as usize * 3;
        self.sub_matrices.iter().filter(move |s| {
            s.enabled && (s.start_channel < self.canvas_start || s.source_end() > canvas_end)
        })
    }

    /// Copy every enabled block onto the canvas, row by row, clipped to
    /// the canvas and to the end of the buffer.
    pub fn apply(&self, channels: &mut [u8]) {
        let canvas_stride = self.canvas_width as usize * 3;

        for sub in self.sub_matrices.iter().filter(|s| s.enabled) {
            if sub.x_offset >= self.canvas_width || sub.y_offset >= self.canvas_height {
                continue;
            }
            let visible_w = sub.width.min(self.canvas_width - sub.x_offset) as usize;
            let visible_h = sub.height.min(self.canvas_height - sub.y_offset) as usize;
            let src_stride = sub.width as usize * 3;

            for y in 0..visible_h {
                let src = sub.start_channel + y * src_stride;
                let dst = self.canvas_start
                    + (sub.y_offset as usize + y) * canvas_stride
                    + sub.x_offset as usize * 3;
                let len = visible_w * 3;
                if src + len > channels.len() || dst + len > channels.len() {
                    break;
                }
                channels.copy_within(src..src + len, dst);
            }
        }
    }
}
