//! The ColorLight 5a-75 channel output.
//!
//! Ties the pieces together: configuration becomes a topology, a gamma
//! table, a device buffer and a wire plan; each tick the host calls
//! [`ColorLightOutput::prep_data`] then [`ColorLightOutput::send_data`].
//!
//! Setup failures are reported as operator warnings plus an `Err`, so the
//! host can leave this output disabled and carry on.

use crate::config::OutputConfig;
use crate::error::{FrameError, LinkError, OutputError};
use crate::gamma::GammaTable;
use crate::link::{LinkTransport, PlatformLink, open_platform_link};
use crate::packer::{DeviceFrameBuffer, FramePacker};
use crate::submatrix::CanvasOverlay;
use crate::topology::PanelTopology;
use crate::transmit::{SendOutcome, Transmitter};
use crate::warnings::WarningHolder;
use crate::wire::WirePacketPlan;
use std::ops::RangeInclusive;

/// Running totals since the output was opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutputStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
}

/// Everything built from configuration before a link is attached.
struct Prepared {
    start_channel: usize,
    interface: String,
    description: String,
    topology: PanelTopology,
    overlay: CanvasOverlay,
    packer: FramePacker,
    device: DeviceFrameBuffer,
    plan: WirePacketPlan,
}

impl Prepared {
    fn from_config(config: &OutputConfig) -> Result<Self, OutputError> {
        let topology = config.build_topology()?;
        WirePacketPlan::check_geometry(topology.rows(), topology.row_size())?;
        let gamma = GammaTable::new(config.gamma());
        let packer = FramePacker::new(&topology, gamma);
        let device = DeviceFrameBuffer::new(&topology)?;
        let plan = WirePacketPlan::for_buffer(&device)?;

        let mut overlay =
            CanvasOverlay::new(config.start_channel, topology.width(), topology.height());
        for sub in config.sub_matrices() {
            overlay.add_sub_matrix(sub);
        }

        Ok(Self {
            start_channel: config.start_channel,
            interface: config.interface().to_string(),
            description: config.description().to_string(),
            topology,
            overlay,
            packer,
            device,
            plan,
        })
    }
}

/// One configured ColorLight output with its link.
pub struct ColorLightOutput<L: LinkTransport = PlatformLink> {
    start_channel: usize,
    interface: String,
    description: String,
    topology: PanelTopology,
    overlay: CanvasOverlay,
    packer: FramePacker,
    device: DeviceFrameBuffer,
    plan: WirePacketPlan,
    link: L,
    transmitter: Transmitter,
    stats: OutputStats,
}

impl ColorLightOutput<PlatformLink> {
    /// Build the output and open the platform raw link on the configured
    /// interface.
    pub fn open(config: &OutputConfig, warnings: WarningHolder) -> Result<Self, OutputError> {
        let prepared = prepare(config, &warnings)?;

        let link = open_platform_link(&prepared.interface).map_err(|e| {
            report(&warnings, &link_warning(&e, &prepared.interface), &e);
            OutputError::Link(e)
        })?;

        Ok(Self::assemble(prepared, link, warnings))
    }
}

impl<L: LinkTransport> ColorLightOutput<L> {
    /// Build the output around an already-open link.
    pub fn with_link(
        config: &OutputConfig,
        link: L,
        warnings: WarningHolder,
    ) -> Result<Self, OutputError> {
        let prepared = prepare(config, &warnings)?;
        Ok(Self::assemble(prepared, link, warnings))
    }

    fn assemble(p: Prepared, link: L, warnings: WarningHolder) -> Self {
        Self {
            start_channel: p.start_channel,
            interface: p.interface,
            description: p.description,
            topology: p.topology,
            overlay: p.overlay,
            packer: p.packer,
            device: p.device,
            plan: p.plan,
            link,
            transmitter: Transmitter::new(warnings),
            stats: OutputStats::default(),
        }
    }

    /// Apply sub-matrix overlays to `channels`, then pack the canvas into
    /// the device buffer.
    pub fn prep_data(&mut self, channels: &mut [u8]) -> Result<(), FrameError> {
        self.overlay.apply(channels);
        let canvas = channels.get(self.start_channel..).unwrap_or(&[]);
        self.packer.pack(&self.topology, canvas, &mut self.device)
    }

    /// Send the current device buffer. Returns the number of channels this
    /// output consumes, as the host expects, plus what happened on the wire.
    pub fn send_data(&mut self) -> (usize, SendOutcome) {
        let outcome = self
            .transmitter
            .send_frame(&mut self.link, &self.plan, self.device.as_slice());
        if outcome.is_sent() {
            self.stats.frames_sent += 1;
        } else {
            self.stats.frames_dropped += 1;
        }
        (self.channel_count(), outcome)
    }

    pub fn channel_count(&self) -> usize {
        self.topology.channel_count()
    }

    pub fn start_channel(&self) -> usize {
        self.start_channel
    }

    /// Channels this output reads, inclusive. `None` if it has no panels.
    pub fn required_channel_range(&self) -> Option<RangeInclusive<usize>> {
        let count = self.channel_count();
        (count > 0).then(|| self.start_channel..=self.start_channel + count - 1)
    }

    /// Size of a channel buffer that covers the canvas and every overlay
    /// source block.
    pub fn buffer_len(&self) -> usize {
        (self.start_channel + self.channel_count()).max(self.overlay.source_end())
    }

    pub fn topology(&self) -> &PanelTopology {
        &self.topology
    }

    pub fn plan(&self) -> &WirePacketPlan {
        &self.plan
    }

    pub fn device_buffer(&self) -> &DeviceFrameBuffer {
        &self.device
    }

    pub fn gamma(&self) -> &GammaTable {
        self.packer.gamma()
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn stats(&self) -> OutputStats {
        self.stats
    }

    pub fn slow_count(&self) -> u32 {
        self.transmitter.slow_count()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn dump_config(&self) {
        tracing::debug!("ColorLight output {}", self.description);
        tracing::debug!("    Width          : {}", self.topology.width());
        tracing::debug!("    Height         : {}", self.topology.height());
        tracing::debug!("    Rows           : {}", self.topology.rows());
        tracing::debug!("    Row Size       : {}", self.topology.row_size());
        tracing::debug!("    Socket         : {}", self.link.socket_id());
        tracing::debug!("    Outputs        : {}", self.topology.outputs());
        tracing::debug!("    Longest Chain  : {}", self.topology.longest_chain());
        tracing::debug!("    Inverted Data  : {}", self.topology.inverted());
        tracing::debug!("    Interface      : {}", self.interface);
        tracing::debug!("    Frames/tick    : {}", self.plan.len());
    }
}

fn prepare(config: &OutputConfig, warnings: &WarningHolder) -> Result<Prepared, OutputError> {
    let prepared = Prepared::from_config(config).inspect_err(|e| {
        report(warnings, &format!("ColorLight: {e}"), e);
    })?;

    // The host only writes the canvas; a block read from elsewhere pastes
    // whatever those channels hold, usually black.
    for sub in prepared.overlay.sources_outside_canvas() {
        let message = format!(
            "ColorLight: Sub-matrix at channel {} reads outside the canvas",
            sub.start_channel + 1
        );
        tracing::warn!("{}", message);
        warnings.add_warning(message);
    }

    Ok(prepared)
}

fn report(warnings: &WarningHolder, message: &str, err: &dyn std::error::Error) {
    tracing::error!("{}", message);
    tracing::debug!("ColorLight init failed: {:?}", err);
    warnings.add_warning(message);
}

/// Operator-facing text for a link setup failure.
pub fn link_warning(err: &LinkError, interface: &str) -> String {
    match err {
        LinkError::LinkDown(_) => {
            format!("ColorLight: Configured interface {interface} does not have link")
        }
        LinkError::InsufficientBandwidth { .. } => {
            format!("ColorLight: Configured interface {interface} is not 1000Mbps Capable")
        }
        LinkError::OpenFailed { .. } => "ColorLight: Error creating raw socket".to_string(),
        LinkError::BindFailed { .. } => {
            format!("ColorLight: Could not bind to interface {interface}")
        }
        LinkError::Unsupported => {
            "ColorLight: Raw Ethernet output is not supported on this platform".to_string()
        }
    }
}
