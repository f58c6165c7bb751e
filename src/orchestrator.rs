//! Frame orchestration: buffer ownership and dispatch ordering.
//!
//! The orchestrator is the only component that knows the order of the
//! per-tick dispatches:
//!
//! ```text
//! TimeEvolve | row pass × log2N | column pass × log2N | Displacement | Normals
//! ```
//!
//! with a barrier at every hand-off. Public outputs are double-buffered: a tick
//! writes the back pair and only becomes the front frame once it completed, so
//! a failed tick leaves the last good frame in place.

use crate::butterfly::ButterflyTable;
use crate::compute::{
    Bindings, BufferData, ComputeDevice, DispatchHandle, GroupCount, KernelId, PushConstants,
};
use crate::config::OceanConfig;
use crate::displacement::DisplacementField;
use crate::error::{ConfigError, DispatchError, OceanError, Result};
use crate::fft::{output_slot, read_slot, write_slot, FftDirection};
use crate::normals::NormalField;
use crate::spectrum::InitialSpectrum;

/// Lifecycle of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Uninitialized,
    SpectrumReady,
    TickInFlight,
    TickComplete,
}

struct SpectrumTables<B> {
    h0k: B,
    h0minusk: B,
    omega: B,
    butterfly: B,
}

struct OutputPair<B> {
    displacement: B,
    normals: B,
}

/// Every buffer of one parameter set. Built whole and destroyed whole.
struct Resources<B> {
    resolution: usize,
    stages: u32,
    tables: SpectrumTables<B>,
    // [height, dx, dz] × ping-pong slot
    channels: [[B; 2]; 3],
    outputs: [OutputPair<B>; 2],
}

impl<B> Resources<B> {
    fn create<D>(
        device: &mut D,
        spectrum: InitialSpectrum,
        butterfly: ButterflyTable,
    ) -> Result<Self, DispatchError>
    where
        D: ComputeDevice<Buffer = B>,
    {
        let resolution = spectrum.resolution;
        let stages = butterfly.stages();
        let cells = resolution * resolution;

        let requests = vec![
            ("h0k", BufferData::Complex(spectrum.h0k)),
            ("h0minusk", BufferData::Complex(spectrum.h0minusk)),
            ("omega", BufferData::Real(spectrum.omega)),
            ("butterfly", BufferData::Butterfly(butterfly.into_entries())),
            ("height_ping", BufferData::complex_zeroed(cells)),
            ("height_pong", BufferData::complex_zeroed(cells)),
            ("dx_ping", BufferData::complex_zeroed(cells)),
            ("dx_pong", BufferData::complex_zeroed(cells)),
            ("dz_ping", BufferData::complex_zeroed(cells)),
            ("dz_pong", BufferData::complex_zeroed(cells)),
            ("displacement_a", BufferData::vector_zeroed(cells)),
            ("normals_a", BufferData::vector_zeroed(cells)),
            ("displacement_b", BufferData::vector_zeroed(cells)),
            ("normals_b", BufferData::vector_zeroed(cells)),
        ];

        let mut created = Vec::with_capacity(requests.len());
        for (label, data) in requests {
            match device.create_buffer(label, data) {
                Ok(buffer) => created.push(buffer),
                Err(err) => {
                    for buffer in created {
                        device.destroy_buffer(buffer);
                    }
                    return Err(err);
                }
            }
        }

        let count = created.len();
        let [h0k, h0minusk, omega, butterfly, h0, h1, x0, x1, z0, z1, d0, n0, d1, n1]: [B; 14] =
            created.try_into().map_err(|_| {
                DispatchError::Backend(format!("expected 14 buffers, created {}", count))
            })?;

        Ok(Self {
            resolution,
            stages,
            tables: SpectrumTables {
                h0k,
                h0minusk,
                omega,
                butterfly,
            },
            channels: [[h0, h1], [x0, x1], [z0, z1]],
            outputs: [
                OutputPair {
                    displacement: d0,
                    normals: n0,
                },
                OutputPair {
                    displacement: d1,
                    normals: n1,
                },
            ],
        })
    }

    /// Every buffer of the set, for fencing after an aborted tick.
    fn buffers(&self) -> Vec<&B> {
        let tables = &self.tables;
        let mut all = vec![&tables.h0k, &tables.h0minusk, &tables.omega, &tables.butterfly];
        all.extend(self.channels.iter().flatten());
        for pair in &self.outputs {
            all.push(&pair.displacement);
            all.push(&pair.normals);
        }
        all
    }

    fn destroy<D>(self, device: &mut D)
    where
        D: ComputeDevice<Buffer = B>,
    {
        let tables = self.tables;
        for buffer in [tables.h0k, tables.h0minusk, tables.omega, tables.butterfly] {
            device.destroy_buffer(buffer);
        }
        for buffer in self.channels.into_iter().flatten() {
            device.destroy_buffer(buffer);
        }
        for pair in self.outputs {
            device.destroy_buffer(pair.displacement);
            device.destroy_buffer(pair.normals);
        }
    }
}

/// Issues the dispatches of one tick and remembers the last one submitted.
struct TickRecorder<'d, D: ComputeDevice> {
    device: &'d mut D,
    groups: GroupCount,
    last: Option<DispatchHandle>,
}

impl<'d, D: ComputeDevice> TickRecorder<'d, D> {
    fn dispatch(
        &mut self,
        kernel: KernelId,
        reads: &[&D::Buffer],
        writes: &[&D::Buffer],
        push: &PushConstants,
    ) -> Result<DispatchHandle, DispatchError> {
        let handle = self
            .device
            .dispatch(kernel, self.groups, Bindings { reads, writes }, push)?;
        self.last = Some(handle);
        Ok(handle)
    }

    fn record(
        &mut self,
        resources: &Resources<D::Buffer>,
        push: &mut PushConstants,
        back: usize,
    ) -> Result<DispatchHandle, DispatchError> {
        let tables = &resources.tables;
        let [height, dx, dz] = &resources.channels;

        self.dispatch(
            KernelId::TimeEvolve,
            &[&tables.h0k, &tables.h0minusk, &tables.omega],
            &[&height[0], &dx[0], &dz[0]],
            push,
        )?;
        self.device.barrier(&[&height[0], &dx[0], &dz[0]]);

        let stages = resources.stages;
        push.direction = FftDirection::Inverse;
        for pass in 0..2 * stages {
            let kernel = if pass < stages {
                KernelId::FftRowPass
            } else {
                KernelId::FftColumnPass
            };
            push.stage = pass % stages;
            let (r, w) = (read_slot(pass), write_slot(pass));

            self.dispatch(
                kernel,
                &[&tables.butterfly, &height[r], &dx[r], &dz[r]],
                &[&height[w], &dx[w], &dz[w]],
                push,
            )?;
            // The last row pass also fences the column passes, which read across rows
            self.device.barrier(&[&height[w], &dx[w], &dz[w]]);
        }

        let slot = output_slot(2 * stages);
        let target = &resources.outputs[back];
        self.dispatch(
            KernelId::Displacement,
            &[&height[slot], &dx[slot], &dz[slot]],
            &[&target.displacement],
            push,
        )?;
        self.device.barrier(&[&target.displacement]);

        let handle = self.dispatch(
            KernelId::Normals,
            &[&target.displacement],
            &[&target.normals],
            push,
        )?;
        // The pair is rewritten two ticks later
        self.device.barrier(&[&target.displacement, &target.normals]);
        Ok(handle)
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameInfo {
    pair: usize,
    tick: u64,
    time: f32,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    handle: DispatchHandle,
    pair: usize,
    time: f32,
    resume: OrchestratorState,
}

/// A completed frame: opaque field handles plus their metadata.
///
/// Valid until the next tick completes.
#[derive(Debug)]
pub struct OceanFrame<'a, B> {
    pub displacement: &'a B,
    pub normals: &'a B,
    pub resolution: usize,
    pub patch_length: f32,
    pub tick: u64,
    pub time: f32,
}

/// Host copy of a completed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSnapshot {
    pub resolution: usize,
    pub patch_length: f32,
    pub tick: u64,
    pub time: f32,
    pub displacement: DisplacementField,
    pub normals: NormalField,
}

/// Owns all simulation buffers and sequences the per-tick dispatches.
pub struct FrameOrchestrator<D: ComputeDevice> {
    device: D,
    state: OrchestratorState,
    config: Option<OceanConfig>,
    resources: Option<Resources<D::Buffer>>,
    front: Option<FrameInfo>,
    in_flight: Option<InFlight>,
    ticks: u64,
}

impl<D: ComputeDevice> FrameOrchestrator<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            state: OrchestratorState::Uninitialized,
            config: None,
            resources: None,
            front: None,
            in_flight: None,
            ticks: 0,
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// The validated configuration, wind direction normalized.
    pub fn config(&self) -> Option<&OceanConfig> {
        self.config.as_ref()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Build the spectrum and lookup tables for `config` and replace every buffer.
    ///
    /// The new buffer set is complete before the old one is destroyed, so a
    /// failure leaves the previous state untouched. Not allowed while a tick is
    /// in flight. Besides `Uninitialized` and `TickComplete` this also accepts
    /// `SpectrumReady`, replacing a parameter set that was never ticked; no
    /// dispatch can be pending in that state.
    pub fn configure(&mut self, config: &OceanConfig) -> Result<()> {
        if self.state == OrchestratorState::TickInFlight {
            return Err(OceanError::TickInFlight);
        }

        let config = config.validate()?;
        let spectrum = InitialSpectrum::generate(&config)?;
        let butterfly = ButterflyTable::new(config.resolution);
        let resources = Resources::create(&mut self.device, spectrum, butterfly)?;

        if let Some(old) = self.resources.replace(resources) {
            old.destroy(&mut self.device);
        }

        log::info!(
            "ocean configured: n={}, L={}, wind={} m/s ({:.2}, {:.2}), amplitude={}",
            config.resolution,
            config.patch_length,
            config.wind_speed,
            config.wind_direction.x,
            config.wind_direction.y,
            config.amplitude
        );

        self.config = Some(config);
        self.front = None;
        self.state = OrchestratorState::SpectrumReady;
        Ok(())
    }

    /// Change choppiness without regenerating the spectrum. Applies from the next tick.
    pub fn set_choppiness(&mut self, choppiness: f32) -> Result<()> {
        if !choppiness.is_finite() {
            return Err(ConfigError::NonFiniteParameter { name: "choppiness" }.into());
        }
        if choppiness < 0.0 {
            return Err(ConfigError::NegativeChoppiness(choppiness).into());
        }
        let config = self.config.as_mut().ok_or(OceanError::NotConfigured)?;
        config.choppiness = choppiness;
        Ok(())
    }

    /// Submit every dispatch of one tick at simulation time `time`.
    pub fn begin_tick(&mut self, time: f32) -> Result<DispatchHandle> {
        match self.state {
            OrchestratorState::Uninitialized => return Err(OceanError::NotConfigured),
            OrchestratorState::TickInFlight => return Err(OceanError::TickInFlight),
            OrchestratorState::SpectrumReady | OrchestratorState::TickComplete => {}
        }
        let (Some(config), Some(resources)) = (self.config.as_ref(), self.resources.as_ref())
        else {
            return Err(OceanError::NotConfigured);
        };

        let pair = self.front.map_or(0, |front| 1 - front.pair);
        let mut push = PushConstants::new(resources.resolution, config.patch_length);
        push.time = time;
        push.choppiness = config.effective_choppiness();

        let mut recorder = TickRecorder {
            device: &mut self.device,
            groups: GroupCount::covering(resources.resolution),
            last: None,
        };

        match recorder.record(resources, &mut push, pair) {
            Ok(handle) => {
                log::debug!("tick at t={} submitted, last dispatch #{}", time, handle.0);
                self.in_flight = Some(InFlight {
                    handle,
                    pair,
                    time,
                    resume: self.state,
                });
                self.state = OrchestratorState::TickInFlight;
                Ok(handle)
            }
            Err(err) => {
                // Already submitted work cannot be cancelled; drain it before reusing buffers
                if let Some(last) = recorder.last {
                    if let Err(drain) = recorder.device.wait_for_completion(last) {
                        log::warn!("draining aborted tick failed: {}", drain);
                    }
                    recorder.device.barrier(&resources.buffers());
                }
                log::warn!("tick at t={} aborted: {}", time, err);
                Err(err.into())
            }
        }
    }

    /// Wait for the in-flight tick and publish its outputs as the front frame.
    pub fn complete_tick(&mut self) -> Result<OceanFrame<'_, D::Buffer>> {
        if self.state != OrchestratorState::TickInFlight {
            return Err(OceanError::NoTickInFlight);
        }
        let in_flight = self.in_flight.take().ok_or(OceanError::NoTickInFlight)?;

        if let Err(err) = self.device.wait_for_completion(in_flight.handle) {
            log::warn!("tick at t={} failed: {}", in_flight.time, err);
            // Whatever the failed tick wrote must be visible before the next one rewrites it
            if let Some(resources) = self.resources.as_ref() {
                self.device.barrier(&resources.buffers());
            }
            self.state = in_flight.resume;
            return Err(err.into());
        }

        self.ticks += 1;
        self.front = Some(FrameInfo {
            pair: in_flight.pair,
            tick: self.ticks,
            time: in_flight.time,
        });
        self.state = OrchestratorState::TickComplete;
        self.frame().ok_or(OceanError::NoFrame)
    }

    /// Run one whole tick and wait for it.
    pub fn tick(&mut self, time: f32) -> Result<OceanFrame<'_, D::Buffer>> {
        self.begin_tick(time)?;
        self.complete_tick()
    }

    /// The last completed frame, if any.
    pub fn frame(&self) -> Option<OceanFrame<'_, D::Buffer>> {
        let front = self.front?;
        let resources = self.resources.as_ref()?;
        let config = self.config.as_ref()?;
        let pair = &resources.outputs[front.pair];
        Some(OceanFrame {
            displacement: &pair.displacement,
            normals: &pair.normals,
            resolution: resources.resolution,
            patch_length: config.patch_length,
            tick: front.tick,
            time: front.time,
        })
    }

    /// Copy the last completed frame back to the host.
    pub fn read_frame(&self) -> Result<FieldSnapshot> {
        let frame = self.frame().ok_or(OceanError::NoFrame)?;
        let n = frame.resolution;

        let displacement = self
            .device
            .read_buffer(frame.displacement)?
            .into_vectors()
            .ok_or_else(|| DispatchError::Backend("displacement is not a vector buffer".into()))?;
        let normals = self
            .device
            .read_buffer(frame.normals)?
            .into_vectors()
            .ok_or_else(|| DispatchError::Backend("normals is not a vector buffer".into()))?;

        Ok(FieldSnapshot {
            resolution: n,
            patch_length: frame.patch_length,
            tick: frame.tick,
            time: frame.time,
            displacement: DisplacementField {
                resolution: n,
                values: displacement,
            },
            normals: NormalField {
                resolution: n,
                values: normals,
            },
        })
    }
}
