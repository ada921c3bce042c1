use std::fmt;

use runtime::Interrupt;

/// Diagnostic kinds recorded on the run's event bus.
pub mod kinds {
    pub const MISSING_INPUT: &str = "missing_input";
    pub const UNSUPPORTED_GEOMETRY: &str = "unsupported_geometry";
    pub const CAPACITY_EXCEEDED: &str = "capacity_exceeded";
    pub const DEGENERATE_EXTENT: &str = "degenerate_extent";
    pub const DEGENERATE_RING: &str = "degenerate_ring";
    pub const INTERRUPTED: &str = "interrupted";
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Invalid configuration or missing input.
    Configuration(String),
    UnsupportedGeometry {
        feature: usize,
        kind: String,
    },
    /// One ring alone needs more vertices than a chunk may hold.
    CapacityExceeded {
        feature: usize,
        vertices: usize,
        budget: usize,
    },
    /// Zero-area source extent. Recovered by single-cell binning; only ever
    /// reported through diagnostics.
    DegenerateExtent {
        width: f64,
        height: f64,
    },
    Cancelled,
    TimedOut,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Configuration(reason) => write!(f, "configuration error: {reason}"),
            PipelineError::UnsupportedGeometry { feature, kind } => {
                write!(f, "unsupported geometry type {kind:?} at feature {feature}")
            }
            PipelineError::CapacityExceeded {
                feature,
                vertices,
                budget,
            } => write!(
                f,
                "feature {feature} has a ring of {vertices} vertices, over the chunk budget of {budget}"
            ),
            PipelineError::DegenerateExtent { width, height } => write!(
                f,
                "degenerate source extent {width} x {height}; binning into a single cell"
            ),
            PipelineError::Cancelled => write!(f, "run cancelled"),
            PipelineError::TimedOut => write!(f, "run exceeded its deadline"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<Interrupt> for PipelineError {
    fn from(value: Interrupt) -> Self {
        match value {
            Interrupt::Cancelled => PipelineError::Cancelled,
            Interrupt::TimedOut => PipelineError::TimedOut,
        }
    }
}

impl PipelineError {
    /// Stable diagnostic kind for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => kinds::MISSING_INPUT,
            PipelineError::UnsupportedGeometry { .. } => kinds::UNSUPPORTED_GEOMETRY,
            PipelineError::CapacityExceeded { .. } => kinds::CAPACITY_EXCEEDED,
            PipelineError::DegenerateExtent { .. } => kinds::DEGENERATE_EXTENT,
            PipelineError::Cancelled | PipelineError::TimedOut => kinds::INTERRUPTED,
        }
    }
}
