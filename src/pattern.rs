//! Panel identification pattern.
//!
//! Every panel is tinted by its output and stamped, in its own upright
//! coordinates, with two numbers: the output (1-based) and its place in
//! that output's chain (1-based, as configured). The packer then moves
//! each panel to its chain slot, so a wall that shows the wrong numbers
//! on a panel is wired differently from its configuration.

use crate::Color;
use crate::topology::{Panel, PanelTopology};

/// 3x5 digits, one byte per row, three bits per row with the left pixel
/// in the high bit.
const DIGITS: [[u8; 5]; 10] = [
    [7, 5, 5, 5, 7], // 0
    [2, 6, 2, 2, 7], // 1
    [7, 1, 7, 4, 7], // 2
    [7, 1, 7, 1, 7], // 3
    [5, 5, 7, 1, 1], // 4
    [7, 4, 7, 1, 7], // 5
    [7, 4, 7, 5, 7], // 6
    [7, 1, 1, 1, 1], // 7
    [7, 5, 7, 5, 7], // 8
    [7, 5, 7, 1, 7], // 9
];

const GLYPH_WIDTH: u32 = 3;
const GLYPH_ADVANCE: u32 = GLYPH_WIDTH + 1;

/// Background brightness in percent, low enough that the digits stand out.
const TINT_BRIGHTNESS: u8 = 25;

const TEXT: Color = Color {
    r: 255,
    g: 255,
    b: 255,
};

/// Draw the identification pattern over the whole canvas.
///
/// `canvas` is the output's canvas region (`width * height * 3` bytes).
/// Pixels outside the panels are left as they are.
pub fn draw_panel_ids(topology: &PanelTopology, canvas: &mut [u8]) {
    let outputs = topology.outputs().max(1);
    let top = if topology.panel_height() > 16 { 2 } else { 1 };

    for output in 0..topology.outputs() {
        let hue = (output * 360 / outputs) as u16;
        let tint = Color::from_hue(hue).apply_brightness(TINT_BRIGHTNESS);

        for panel in topology.panels_on_output(output) {
            fill_panel(topology, panel, tint, canvas);
            let next = draw_number(topology, panel, output + 1, 1, top, canvas);
            draw_number(topology, panel, panel.chain + 1, next + 1, top, canvas);
        }
    }
}

fn fill_panel(topology: &PanelTopology, panel: &Panel, color: Color, canvas: &mut [u8]) {
    for y in 0..topology.panel_height() {
        for x in 0..topology.panel_width() {
            set_pixel(topology, panel, x, y, color, canvas);
        }
    }
}

/// Draw `value` in decimal starting at panel-local `(x, y)`. Returns the
/// x where a following glyph would start.
fn draw_number(
    topology: &PanelTopology,
    panel: &Panel,
    value: usize,
    x: u32,
    y: u32,
    canvas: &mut [u8],
) -> u32 {
    let mut cursor = x;
    for digit in value.to_string().bytes().map(|b| usize::from(b - b'0')) {
        for (row, &bits) in DIGITS[digit].iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                    set_pixel(topology, panel, cursor + col, y + row as u32, TEXT, canvas);
                }
            }
        }
        cursor += GLYPH_ADVANCE;
    }
    cursor
}

/// Paint panel-local `(x, y)`, clipped to the panel and the canvas.
fn set_pixel(
    topology: &PanelTopology,
    panel: &Panel,
    x: u32,
    y: u32,
    color: Color,
    canvas: &mut [u8],
) {
    if x >= topology.panel_width() || y >= topology.panel_height() {
        return;
    }
    let (cx, cy) = topology.canvas_pixel(panel, x, y);
    let i = (cy as usize * topology.width() as usize + cx as usize) * 3;
    if let Some(px) = canvas.get_mut(i..i + 3) {
        px.copy_from_slice(&color.to_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gamma::GammaTable;
    use crate::packer::{DeviceFrameBuffer, FramePacker};
    use crate::topology::{ColorOrder, LayoutVersion, Orientation, PanelDescriptor};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const PW: u32 = 12;
    const PH: u32 = 7;

    fn descriptor(
        layout: LayoutVersion,
        output: usize,
        chain: usize,
        orientation: Orientation,
    ) -> PanelDescriptor {
        PanelDescriptor {
            output,
            chain,
            // Undo the legacy flip so the panel ends up as `orientation`.
            orientation: orientation.resolve(layout),
            x_offset: chain as u32 * PW,
            y_offset: output as u32 * PH,
            color_order: ColorOrder::Rgb,
        }
    }

    /// Draw the pattern and pack it the way the output would.
    fn render(topo: &PanelTopology) -> DeviceFrameBuffer {
        let mut canvas = vec![0u8; topo.channel_count()];
        draw_panel_ids(topo, &mut canvas);
        let mut device = DeviceFrameBuffer::new(topo).unwrap();
        FramePacker::new(topo, GammaTable::identity())
            .pack(topo, &canvas, &mut device)
            .unwrap();
        device
    }

    /// Whether panel-local `(x, y)` in chain slot `slot` of `output` is
    /// lit as text.
    fn lit(device: &DeviceFrameBuffer, output: usize, slot: usize, x: u32, y: u32) -> bool {
        let row = output * PH as usize + y as usize;
        let i = row * device.row_size() + (slot * PW as usize + x as usize) * 3;
        device.as_slice()[i..i + 3] == [255, 255, 255]
    }

    #[rstest]
    #[case(LayoutVersion::Current, 1)]
    #[case(LayoutVersion::Legacy, 0)]
    fn chain_number_follows_panel_to_its_slot(
        #[case] layout: LayoutVersion,
        #[case] second_panel_slot: usize,
    ) {
        let mut topo = PanelTopology::new(PW, PH, false, layout).unwrap();
        for chain in 0..2 {
            topo.add_panel(descriptor(layout, 0, chain, Orientation::Normal))
                .unwrap();
        }
        let device = render(&topo);
        let first_panel_slot = 1 - second_panel_slot;

        // Output "1" on both: the top row of a 1 is its middle pixel.
        for slot in 0..2 {
            assert!(lit(&device, 0, slot, 2, 1));
            assert!(!lit(&device, 0, slot, 1, 1));
        }
        // Chain digit starts at x = 6: a "2" has a full top row, a "1" does not.
        assert!(lit(&device, 0, second_panel_slot, 6, 1));
        assert!(!lit(&device, 0, first_panel_slot, 6, 1));
        assert!(lit(&device, 0, first_panel_slot, 7, 1));
    }

    #[test]
    fn output_number_is_one_based() {
        let layout = LayoutVersion::Current;
        let mut topo = PanelTopology::new(PW, PH, false, layout).unwrap();
        topo.add_panel(descriptor(layout, 0, 0, Orientation::Normal))
            .unwrap();
        topo.add_panel(descriptor(layout, 1, 0, Orientation::Normal))
            .unwrap();
        let device = render(&topo);

        // "1" on output 0, "2" on output 1.
        assert!(!lit(&device, 0, 0, 1, 1));
        assert!(lit(&device, 1, 0, 1, 1));
    }

    #[rstest]
    #[case(Orientation::Normal)]
    #[case(Orientation::UpsideDown)]
    #[case(Orientation::Right)]
    #[case(Orientation::Left)]
    fn digits_read_upright_on_rotated_panels(#[case] orientation: Orientation) {
        let layout = LayoutVersion::Current;
        let mut topo = PanelTopology::new(PW, PH, false, layout).unwrap();
        topo.add_panel(descriptor(layout, 0, 0, orientation)).unwrap();
        let device = render(&topo);

        // Bottom row of a "1" is solid: x = 1..=3 on local row 5.
        let bottom: Vec<bool> = (0..5).map(|x| lit(&device, 0, 0, x, 5)).collect();
        assert_eq!(bottom, vec![false, true, true, true, false]);
    }

    #[test]
    fn background_is_tinted_per_output() {
        let layout = LayoutVersion::Current;
        let mut topo = PanelTopology::new(PW, PH, false, layout).unwrap();
        topo.add_panel(descriptor(layout, 0, 0, Orientation::Normal))
            .unwrap();
        let device = render(&topo);

        let tint = Color::from_hue(0).apply_brightness(TINT_BRIGHTNESS);
        assert_eq!(&device.as_slice()[0..3], &tint.to_bytes());
    }

    #[test]
    fn text_is_clipped_to_small_panels() {
        let mut topo = PanelTopology::new(4, 2, false, LayoutVersion::Current).unwrap();
        topo.add_panel(PanelDescriptor::default()).unwrap();
        let mut canvas = vec![0u8; topo.channel_count()];

        draw_panel_ids(&topo, &mut canvas);
        assert_eq!(canvas.len(), 4 * 2 * 3);
        // Local (2, 1) is the top of the "1".
        assert_eq!(&canvas[(4 + 2) * 3..(4 + 3) * 3], &[255, 255, 255]);
    }
}
