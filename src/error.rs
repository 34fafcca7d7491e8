//! Error types for the ColorLight output.
//!
//! Initialization can fail in several distinct ways (bad geometry, a link
//! that is down, a socket that will not bind). Each failure is a typed
//! value so the caller can decide to disable the output instead of
//! crashing the host. Runtime send failures are *not* errors: they are
//! reported as a [`crate::transmit::SendOutcome`].

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Problems found while turning the JSON configuration into typed values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("panel {axis} must be positive, got {value}")]
    InvalidPanelDimension { axis: &'static str, value: i64 },
}

/// Geometry failures while building the panel topology.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopologyError {
    #[error("panel dimensions must be non-zero, got {width}x{height}")]
    ZeroPanelDimension { width: u32, height: u32 },

    #[error("canvas of {width}x{height} pixels is too large to address")]
    CanvasTooLarge { width: u32, height: u32 },

    #[error("chain of {panels} panels is {pixels} pixels wide, a row holds at most {max}")]
    ChainTooLong { panels: u64, pixels: u64, max: usize },

    #[error("{outputs} outputs need {rows} rows, the receiver addresses at most {max}")]
    TooManyOutputs { outputs: u64, rows: u64, max: usize },
}

/// Failures while precomputing the wire frame plan.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("row {row} spans bytes {start}..{end}, beyond device buffer of {len} bytes")]
    RowOutOfBounds {
        row: usize,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("row size {0} is not a whole number of RGB pixels")]
    PartialPixel(usize),

    #[error("{0} rows exceed the addressable row range")]
    TooManyRows(usize),

    #[error("row of {0} pixels exceeds the addressable pixel range")]
    RowTooWide(usize),

    #[error("{rows} rows of {row_size} bytes do not fit in memory")]
    BufferTooLarge { rows: usize, row_size: usize },
}

/// Link setup failures. Each one disables the output.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("interface {0} does not have link")]
    LinkDown(String),

    #[error("interface {interface} is not 1000Mbps capable (reports {speed}Mbps)")]
    InsufficientBandwidth { interface: String, speed: i64 },

    #[error("could not open raw link for {interface}: {source}")]
    OpenFailed {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("could not bind to interface {interface}: {source}")]
    BindFailed {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("raw link output is not supported on this platform")]
    Unsupported,
}

/// Per-frame packing failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("channel buffer holds {actual} bytes, output needs {required}")]
    ShortBuffer { required: usize, actual: usize },
}

/// Umbrella error for bringing up a [`crate::output::ColorLightOutput`].
#[derive(Debug, Error)]
pub enum OutputError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Link(#[from] LinkError),
}
