//! Device-native frame buffer and the per-tick packer that fills it.
//!
//! The receiver wants pixels row-major per physical row, where one
//! physical row runs across every panel slot of one output's chain. The
//! packer walks each panel's pixel map, gamma-corrects each byte, and
//! writes it to the panel's slot. Nothing is allocated per frame.

use crate::error::{FrameError, PlanError};
use crate::gamma::GammaTable;
use crate::topology::PanelTopology;

/// Staging buffer in receiver layout:
/// `outputs × panel_height` rows of `longest_chain × panel_width × 3` bytes.
#[derive(Clone, Debug)]
pub struct DeviceFrameBuffer {
    bytes: Vec<u8>,
    row_size: usize,
}

impl DeviceFrameBuffer {
    pub fn new(topology: &PanelTopology) -> Result<Self, PlanError> {
        let row_size = topology.row_size();
        let len = topology
            .device_frame_len()
            .ok_or(PlanError::BufferTooLarge {
                rows: topology.rows(),
                row_size,
            })?;
        Ok(Self {
            bytes: vec![0; len],
            row_size,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }

    pub fn rows(&self) -> usize {
        self.bytes.len().checked_div(self.row_size).unwrap_or(0)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// Where one panel lands in the device buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Placement {
    panel: usize,
    first_row: usize,
    slot_byte: usize,
}

/// Reorders the source canvas into a [`DeviceFrameBuffer`].
#[derive(Clone, Debug)]
pub struct FramePacker {
    gamma: GammaTable,
    placements: Vec<Placement>,
    row_size: usize,
    panel_row_bytes: usize,
    panel_height: usize,
    channel_count: usize,
}

impl FramePacker {
    /// Precompute every panel's slot for the given topology.
    pub fn new(topology: &PanelTopology, gamma: GammaTable) -> Self {
        let pw3 = topology.panel_width() as usize * 3;
        let ph = topology.panel_height() as usize;
        let mut placements = Vec::with_capacity(topology.panel_count());
        for output in 0..topology.outputs() {
            for &idx in topology.panel_indices_on_output(output) {
                let panel = &topology.panels()[idx];
                placements.push(Placement {
                    panel: idx,
                    first_row: output * ph,
                    slot_byte: topology.chain_slot(panel) * pw3,
                });
            }
        }

        Self {
            gamma,
            placements,
            row_size: topology.row_size(),
            panel_row_bytes: pw3,
            panel_height: ph,
            channel_count: topology.channel_count(),
        }
    }

    pub fn gamma(&self) -> &GammaTable {
        &self.gamma
    }

    /// Pack one frame. `canvas` starts at the output's first channel.
    pub fn pack(
        &self,
        topology: &PanelTopology,
        canvas: &[u8],
        device: &mut DeviceFrameBuffer,
    ) -> Result<(), FrameError> {
        if canvas.len() < self.channel_count {
            return Err(FrameError::ShortBuffer {
                required: self.channel_count,
                actual: canvas.len(),
            });
        }

        let pw3 = self.panel_row_bytes;
        let out = device.as_mut_slice();

        for placement in &self.placements {
            let map = topology.panels()[placement.panel].pixel_map();

            for y in 0..self.panel_height {
                let dst_start = (placement.first_row + y) * self.row_size + placement.slot_byte;
                let dst = &mut out[dst_start..dst_start + pw3];
                let src = &map[y * pw3..(y + 1) * pw3];

                for (byte, &channel) in dst.iter_mut().zip(src) {
                    *byte = self.gamma.apply(canvas[channel]);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{ColorOrder, LayoutVersion, Orientation, PanelDescriptor};
    use pretty_assertions::assert_eq;

    /// Panels that end up mounted `N` whichever layout convention is used.
    fn topology(layout: LayoutVersion, chains: usize) -> PanelTopology {
        let mut topo = PanelTopology::new(4, 2, false, layout).unwrap();
        for chain in 0..chains {
            topo.add_panel(PanelDescriptor {
                output: 0,
                chain,
                orientation: Orientation::Normal.resolve(layout),
                x_offset: chain as u32 * 4,
                y_offset: 0,
                color_order: ColorOrder::Rgb,
            })
            .unwrap();
        }
        topo
    }

    /// Every canvas pixel gets its own index as a marker: `(i, i, i)`.
    fn marker_canvas(topo: &PanelTopology) -> Vec<u8> {
        (0..topo.channel_count()).map(|c| (c / 3) as u8).collect()
    }

    #[test]
    fn device_buffer_is_sized_from_topology() {
        let topo = topology(LayoutVersion::Current, 2);
        let buf = DeviceFrameBuffer::new(&topo).unwrap();
        assert_eq!(buf.len(), 2 * 2 * 4 * 3);
        assert_eq!(buf.row_size(), 2 * 4 * 3);
        assert_eq!(buf.rows(), 2);
        assert_eq!(&buf.as_slice()[24..48], &[0; 24]);
    }

    #[test]
    fn single_panel_round_trip_recovers_source_order() {
        let mut topo = PanelTopology::new(4, 2, false, LayoutVersion::Current).unwrap();
        topo.add_panel(PanelDescriptor::default()).unwrap();

        let canvas: Vec<u8> = (0..topo.channel_count() as u8).collect();
        let packer = FramePacker::new(&topo, GammaTable::identity());
        let mut device = DeviceFrameBuffer::new(&topo).unwrap();
        packer.pack(&topo, &canvas, &mut device).unwrap();

        // Inverse map: device byte i came from canvas[pixel_map[i]].
        let mut recovered = vec![0u8; canvas.len()];
        for (i, &channel) in topo.panels()[0].pixel_map().iter().enumerate() {
            recovered[channel] = device.as_slice()[i];
        }
        assert_eq!(recovered, canvas);
    }

    #[test]
    fn layout_flag_mirrors_chain_slots() {
        let current = topology(LayoutVersion::Current, 2);
        let legacy = topology(LayoutVersion::Legacy, 2);

        let pack = |topo: &PanelTopology| {
            let mut device = DeviceFrameBuffer::new(topo).unwrap();
            FramePacker::new(topo, GammaTable::identity())
                .pack(topo, &marker_canvas(topo), &mut device)
                .unwrap();
            device
        };
        let a = pack(&current);
        let b = pack(&legacy);

        // Same geometry either way.
        assert_eq!(a.len(), b.len());
        // First slot of row 0 holds panel 0 under Current, panel 1 under Legacy.
        assert_eq!(&a.as_slice()[0..3], &[0, 0, 0]);
        assert_eq!(&b.as_slice()[0..3], &[4, 4, 4]);
        assert_eq!(&a.as_slice()[12..15], &b.as_slice()[0..3]);
    }

    #[test]
    fn gamma_is_applied_per_byte() {
        let mut topo = PanelTopology::new(1, 1, false, LayoutVersion::Current).unwrap();
        topo.add_panel(PanelDescriptor::default()).unwrap();
        let packer = FramePacker::new(&topo, GammaTable::new(2.2));
        let mut device = DeviceFrameBuffer::new(&topo).unwrap();

        packer.pack(&topo, &[0, 128, 255], &mut device).unwrap();
        assert_eq!(device.as_slice(), &[0, 56, 255]);
    }

    #[test]
    fn short_canvas_is_rejected() {
        let topo = topology(LayoutVersion::Current, 1);
        let packer = FramePacker::new(&topo, GammaTable::identity());
        let mut device = DeviceFrameBuffer::new(&topo).unwrap();
        let err = packer.pack(&topo, &[0; 5], &mut device).unwrap_err();
        assert_eq!(
            err,
            FrameError::ShortBuffer {
                required: 24,
                actual: 5
            }
        );
    }

    #[test]
    fn empty_slots_stay_dark() {
        let mut topo = PanelTopology::new(2, 1, false, LayoutVersion::Current).unwrap();
        topo.add_panel(PanelDescriptor::default()).unwrap();
        topo.add_panel(PanelDescriptor {
            output: 1,
            chain: 1,
            x_offset: 2,
            ..PanelDescriptor::default()
        })
        .unwrap();

        let mut device = DeviceFrameBuffer::new(&topo).unwrap();
        FramePacker::new(&topo, GammaTable::identity())
            .pack(&topo, &[9; 12], &mut device)
            .unwrap();

        // Output 0 has nothing in slot 1; output 1 has nothing in slot 0.
        let expected = [[9u8; 6], [0; 6], [0; 6], [9; 6]].concat();
        assert_eq!(device.as_slice(), expected.as_slice());
    }
}
