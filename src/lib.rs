// Simulation modules
pub mod butterfly;
pub mod compute;
pub mod config;
pub mod cpu;
pub mod displacement;
pub mod error;
pub mod evolve;
pub mod fft;
pub mod normals;
pub mod orchestrator;
pub mod spectrum;

// Re-export everything for public use
pub use butterfly::{BitReversalTable, ButterflyEntry, ButterflyTable};
pub use compute::{
    Bindings, BufferData, ComputeDevice, DispatchHandle, GroupCount, KernelId, PushConstants,
};
pub use config::OceanConfig;
pub use cpu::{CpuBuffer, CpuDevice};
pub use displacement::{DisplacementField, DisplacementSynthesizer};
pub use error::{ConfigError, DispatchError, OceanError};
pub use evolve::{TimeEvolver, TimeSpectrum};
pub use fft::{FftDirection, FftTransformer};
pub use normals::{NormalEstimator, NormalField};
pub use orchestrator::{FieldSnapshot, FrameOrchestrator, OceanFrame, OrchestratorState};
pub use spectrum::InitialSpectrum;

pub mod prelude {
    pub use crate::compute::ComputeDevice;
    pub use crate::config::OceanConfig;
    pub use crate::cpu::CpuDevice;
    pub use crate::error::{ConfigError, DispatchError, OceanError};
    pub use crate::orchestrator::{FieldSnapshot, FrameOrchestrator, OrchestratorState};
}
