//! Raw-Ethernet driver for ColorLight 5a-75 LED receiver cards.
//!
//! The library turns a flat RGB channel buffer into the frames a 5a-75
//! expects on the wire:
//! - [`topology`] maps canvas pixels onto panels and chains
//! - [`packer`] reorders, colour-swaps and gamma-corrects into the device buffer
//! - [`wire`] precomputes the Ethernet frames for that buffer
//! - [`transmit`] pushes them through a [`link::LinkTransport`] within the tick budget
//!
//! [`output::ColorLightOutput`] ties those together. The binary adds a
//! frame-tick thread ([`render`]) and, with the `server` feature, an HTTP
//! control API ([`server`]).

pub mod config;
pub mod error;
pub mod gamma;
pub mod link;
pub mod media;
pub mod output;
pub mod packer;
pub mod pattern;
pub mod render;
#[cfg(feature = "server")]
pub mod server;
pub mod submatrix;
pub mod topology;
pub mod transmit;
pub mod warnings;
pub mod wire;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ── Color ──────────────────────────────────────────────────────────

/// A single RGB pixel on the canvas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Fully saturated colour for a hue in degrees. Wraps at 360.
    pub fn from_hue(hue: u16) -> Self {
        let hue = hue % 360;
        let sector = hue / 60;
        let fraction = ((hue % 60) as f32) / 60.0;
        let rising = (fraction * 255.0) as u8;
        let falling = ((1.0 - fraction) * 255.0) as u8;

        match sector {
            0 => Self::new(255, rising, 0),
            1 => Self::new(falling, 255, 0),
            2 => Self::new(0, 255, rising),
            3 => Self::new(0, falling, 255),
            4 => Self::new(rising, 0, 255),
            _ => Self::new(255, 0, falling),
        }
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Scale each channel by `brightness` percent; 100 and above is unchanged.
    pub fn apply_brightness(self, brightness: u8) -> Self {
        if brightness >= 100 {
            return self;
        }
        Self {
            r: ((self.r as u16 * brightness as u16) / 100) as u8,
            g: ((self.g as u16 * brightness as u16) / 100) as u8,
            b: ((self.b as u16 * brightness as u16) / 100) as u8,
        }
    }
}

// ── Shutdown ───────────────────────────────────────────────────────

/// Install a Ctrl+C handler that clears the returned flag.
pub fn setup_signal_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    Ok(running)
}

/// Whether the tick loop should keep going.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0, 255, 0, 0)] // Red
    #[case(60, 255, 255, 0)] // Yellow
    #[case(120, 0, 255, 0)] // Green
    #[case(180, 0, 255, 255)] // Cyan
    #[case(240, 0, 0, 255)] // Blue
    #[case(300, 255, 0, 255)] // Magenta
    fn hue_wheel_primaries(#[case] hue: u16, #[case] r: u8, #[case] g: u8, #[case] b: u8) {
        assert_eq!(Color::from_hue(hue), Color::new(r, g, b));
    }

    #[test]
    fn hue_wraps_at_360() {
        assert_eq!(Color::from_hue(0), Color::from_hue(360));
        assert_eq!(Color::from_hue(90), Color::from_hue(450));
    }

    #[test]
    fn bytes_are_rgb_order() {
        assert_eq!(Color::new(1, 2, 3).to_bytes(), [1, 2, 3]);
    }

    #[test]
    fn brightness_scales_channels() {
        assert_eq!(
            Color::new(200, 100, 50).apply_brightness(25),
            Color::new(50, 25, 12)
        );
        assert_eq!(Color::new(1, 2, 3).apply_brightness(150), Color::new(1, 2, 3));
    }

    #[test]
    fn running_flag_reads_through() {
        let flag = AtomicBool::new(true);
        assert!(is_running(&flag));
        flag.store(false, Ordering::SeqCst);
        assert!(!is_running(&flag));
    }
}
