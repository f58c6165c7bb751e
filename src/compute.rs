//! The compute-dispatch capability the simulation core needs from its host.
//!
//! The core never talks to a graphics API. It creates buffers, dispatches
//! kernels over a 2D index space, inserts barriers between dependent
//! dispatches and waits for completion, all through [`ComputeDevice`].

use glam::Vec3;
use num_complex::Complex32;

use crate::butterfly::ButterflyEntry;
use crate::error::DispatchError;
use crate::fft::FftDirection;

/// Edge length of a local work group (16×16 invocations).
pub const LOCAL_SIZE: u32 = 16;

/// Kernels the simulation dispatches every tick.
///
/// Binding layouts (reads / writes):
/// - `TimeEvolve`: `[h0k, h0minusk, omega]` / `[height, dx, dz]`
/// - `FftRowPass`, `FftColumnPass`: `[butterfly, height, dx, dz]` / `[height, dx, dz]`
/// - `Displacement`: `[height, dx, dz]` / `[displacement]`
/// - `Normals`: `[displacement]` / `[normals]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelId {
    TimeEvolve,
    FftRowPass,
    FftColumnPass,
    Displacement,
    Normals,
}

impl KernelId {
    pub fn name(&self) -> &'static str {
        match self {
            KernelId::TimeEvolve => "time_evolve",
            KernelId::FftRowPass => "fft_row_pass",
            KernelId::FftColumnPass => "fft_column_pass",
            KernelId::Displacement => "displacement",
            KernelId::Normals => "normals",
        }
    }
}

/// Number of work groups along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupCount {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl GroupCount {
    /// Groups needed to cover an `n × n` grid with `LOCAL_SIZE × LOCAL_SIZE` tiles.
    pub fn covering(n: usize) -> Self {
        let groups = (n as u32).div_ceil(LOCAL_SIZE);
        Self {
            x: groups,
            y: groups,
            z: 1,
        }
    }
}

/// Small per-dispatch constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PushConstants {
    pub resolution: u32,
    pub patch_length: f32,
    pub time: f32,
    pub choppiness: f32,
    pub stage: u32,
    pub direction: FftDirection,
}

impl PushConstants {
    pub fn new(resolution: usize, patch_length: f32) -> Self {
        Self {
            resolution: resolution as u32,
            patch_length,
            time: 0.0,
            choppiness: 0.0,
            stage: 0,
            direction: FftDirection::Inverse,
        }
    }
}

/// Identifies one submitted dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchHandle(pub u64);

/// Buffers bound to a dispatch, in the kernel's binding order.
#[derive(Debug)]
pub struct Bindings<'a, B> {
    pub reads: &'a [&'a B],
    pub writes: &'a [&'a B],
}

/// Host-side payload of a device buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferData {
    Complex(Vec<Complex32>),
    Real(Vec<f32>),
    Butterfly(Vec<ButterflyEntry>),
    Vector(Vec<Vec3>),
}

impl BufferData {
    pub fn complex_zeroed(len: usize) -> Self {
        BufferData::Complex(vec![Complex32::new(0.0, 0.0); len])
    }

    pub fn vector_zeroed(len: usize) -> Self {
        BufferData::Vector(vec![Vec3::ZERO; len])
    }

    pub fn len(&self) -> usize {
        match self {
            BufferData::Complex(v) => v.len(),
            BufferData::Real(v) => v.len(),
            BufferData::Butterfly(v) => v.len(),
            BufferData::Vector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BufferData::Complex(_) => "complex",
            BufferData::Real(_) => "real",
            BufferData::Butterfly(_) => "butterfly",
            BufferData::Vector(_) => "vector",
        }
    }

    pub fn into_vectors(self) -> Option<Vec<Vec3>> {
        match self {
            BufferData::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_complex(self) -> Option<Vec<Complex32>> {
        match self {
            BufferData::Complex(v) => Some(v),
            _ => None,
        }
    }
}

/// Narrow compute capability injected into the frame orchestrator.
///
/// Dispatches may run asynchronously. Writes of one dispatch are only visible
/// to a later dispatch once a [`barrier`](ComputeDevice::barrier) covering the
/// written buffers has been recorded between them, and only visible to the
/// host after [`wait_for_completion`](ComputeDevice::wait_for_completion).
pub trait ComputeDevice {
    /// Opaque buffer handle. Owned by whoever created it.
    type Buffer;

    fn create_buffer(
        &mut self,
        label: &'static str,
        data: BufferData,
    ) -> Result<Self::Buffer, DispatchError>;

    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    /// Copy a buffer back to the host. Only valid after the writing dispatch completed.
    fn read_buffer(&self, buffer: &Self::Buffer) -> Result<BufferData, DispatchError>;

    fn dispatch(
        &mut self,
        kernel: KernelId,
        groups: GroupCount,
        bindings: Bindings<'_, Self::Buffer>,
        push_constants: &PushConstants,
    ) -> Result<DispatchHandle, DispatchError>;

    /// Write-before-read fence for `resources`.
    fn barrier(&mut self, resources: &[&Self::Buffer]);

    fn wait_for_completion(&mut self, handle: DispatchHandle) -> Result<(), DispatchError>;
}
