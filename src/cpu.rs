//! CPU compute backend.
//!
//! Executes every dispatch immediately with rayon and keeps the same
//! visibility rules a GPU queue has: a buffer written by one dispatch may not
//! be read or rewritten by the next one until a barrier covering it was
//! recorded. Violations fail the dispatch with [`DispatchError::MissingBarrier`].

use std::collections::HashSet;

use glam::Vec3;
use num_complex::Complex32;

use crate::butterfly::ButterflyEntry;
use crate::compute::{
    Bindings, BufferData, ComputeDevice, DispatchHandle, GroupCount, KernelId, PushConstants,
    LOCAL_SIZE,
};
use crate::displacement::synthesize_rows;
use crate::error::DispatchError;
use crate::evolve::evolve_rows;
use crate::fft::{butterfly_pass, PassAxis};
use crate::normals::estimate_rows;

/// Handle to a buffer living in a [`CpuDevice`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct CpuBuffer {
    index: usize,
}

impl CpuBuffer {
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug)]
struct Slot {
    label: &'static str,
    data: Option<BufferData>,
}

/// Rayon-backed [`ComputeDevice`].
#[derive(Debug, Default)]
pub struct CpuDevice {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    unfenced: HashSet<usize>,
    issued: u64,
}

impl CpuDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dispatches issued so far.
    pub fn dispatch_count(&self) -> u64 {
        self.issued
    }

    /// Number of live buffers.
    pub fn buffer_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn slot(&self, buffer: &CpuBuffer) -> Result<&Slot, DispatchError> {
        self.slots
            .get(buffer.index)
            .and_then(Option::as_ref)
            .ok_or(DispatchError::UnknownBuffer(buffer.index))
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut Slot, DispatchError> {
        self.slots
            .get_mut(index)
            .and_then(Option::as_mut)
            .ok_or(DispatchError::UnknownBuffer(index))
    }

    fn check_hazards(&self, bindings: &Bindings<'_, CpuBuffer>) -> Result<(), DispatchError> {
        for buffer in bindings.reads.iter().chain(bindings.writes) {
            let slot = self.slot(buffer)?;
            if self.unfenced.contains(&buffer.index) {
                return Err(DispatchError::MissingBarrier(slot.label));
            }
        }

        for (i, write) in bindings.writes.iter().enumerate() {
            let aliased = bindings.reads.iter().any(|r| r.index == write.index)
                || bindings.writes[..i].iter().any(|w| w.index == write.index);
            if aliased {
                return Err(DispatchError::Aliased(self.slot(write)?.label));
            }
        }
        Ok(())
    }
}

impl ComputeDevice for CpuDevice {
    type Buffer = CpuBuffer;

    fn create_buffer(
        &mut self,
        label: &'static str,
        data: BufferData,
    ) -> Result<CpuBuffer, DispatchError> {
        let slot = Some(Slot {
            label,
            data: Some(data),
        });
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = slot;
                index
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        Ok(CpuBuffer { index })
    }

    fn destroy_buffer(&mut self, buffer: CpuBuffer) {
        if let Some(slot) = self.slots.get_mut(buffer.index) {
            if slot.take().is_some() {
                self.unfenced.remove(&buffer.index);
                self.free.push(buffer.index);
            }
        }
    }

    fn read_buffer(&self, buffer: &CpuBuffer) -> Result<BufferData, DispatchError> {
        let slot = self.slot(buffer)?;
        slot.data
            .clone()
            .ok_or(DispatchError::UnknownBuffer(buffer.index))
    }

    fn dispatch(
        &mut self,
        kernel: KernelId,
        groups: GroupCount,
        bindings: Bindings<'_, CpuBuffer>,
        push_constants: &PushConstants,
    ) -> Result<DispatchHandle, DispatchError> {
        let domain = push_constants.resolution;
        let (covered_x, covered_y) = (groups.x * LOCAL_SIZE, groups.y * LOCAL_SIZE);
        if covered_x < domain || covered_y < domain || groups.z == 0 {
            return Err(DispatchError::InsufficientCoverage {
                groups: groups.x.min(groups.y),
                local: LOCAL_SIZE,
                domain,
            });
        }

        self.check_hazards(&bindings)?;

        // Outputs are moved out of their slots for the duration of the kernel
        let mut outputs = Vec::with_capacity(bindings.writes.len());
        for buffer in bindings.writes {
            match self.slot_mut(buffer.index)?.data.take() {
                Some(data) => outputs.push(data),
                None => {
                    self.restore(bindings.writes, outputs)?;
                    return Err(DispatchError::UnknownBuffer(buffer.index));
                }
            }
        }

        let result = self
            .collect_inputs(&bindings)
            .and_then(|inputs| run_kernel(kernel, push_constants, &inputs, &mut outputs));
        self.restore(bindings.writes, outputs)?;
        result?;

        self.unfenced
            .extend(bindings.writes.iter().map(|buffer| buffer.index));

        let handle = DispatchHandle(self.issued);
        self.issued += 1;
        log::debug!("dispatched {} as #{}", kernel.name(), handle.0);
        Ok(handle)
    }

    fn barrier(&mut self, resources: &[&CpuBuffer]) {
        for buffer in resources {
            self.unfenced.remove(&buffer.index);
        }
    }

    fn wait_for_completion(&mut self, handle: DispatchHandle) -> Result<(), DispatchError> {
        if handle.0 >= self.issued {
            return Err(DispatchError::Backend(format!(
                "dispatch #{} was never issued",
                handle.0
            )));
        }
        // Completion makes every prior write visible
        self.unfenced.clear();
        Ok(())
    }
}

impl CpuDevice {
    fn restore(
        &mut self,
        writes: &[&CpuBuffer],
        outputs: Vec<BufferData>,
    ) -> Result<(), DispatchError> {
        for (buffer, data) in writes.iter().zip(outputs) {
            self.slot_mut(buffer.index)?.data = Some(data);
        }
        Ok(())
    }

    fn collect_inputs(
        &self,
        bindings: &Bindings<'_, CpuBuffer>,
    ) -> Result<Vec<&BufferData>, DispatchError> {
        bindings
            .reads
            .iter()
            .map(|buffer| {
                self.slot(buffer)?
                    .data
                    .as_ref()
                    .ok_or(DispatchError::UnknownBuffer(buffer.index))
            })
            .collect()
    }
}

fn mismatch(kernel: KernelId, reason: impl Into<String>) -> DispatchError {
    DispatchError::BindingMismatch {
        kernel: kernel.name(),
        reason: reason.into(),
    }
}

fn expect_count<T>(
    kernel: KernelId,
    what: &str,
    items: &[T],
    count: usize,
) -> Result<(), DispatchError> {
    if items.len() != count {
        return Err(mismatch(
            kernel,
            format!("expected {} {} bindings, got {}", count, what, items.len()),
        ));
    }
    Ok(())
}

fn complex<'a>(
    kernel: KernelId,
    data: &'a BufferData,
    len: usize,
) -> Result<&'a [Complex32], DispatchError> {
    match data {
        BufferData::Complex(v) if v.len() == len => Ok(v.as_slice()),
        other => Err(mismatch(
            kernel,
            format!("expected complex[{}], got {}[{}]", len, other.kind(), other.len()),
        )),
    }
}

fn real<'a>(
    kernel: KernelId,
    data: &'a BufferData,
    len: usize,
) -> Result<&'a [f32], DispatchError> {
    match data {
        BufferData::Real(v) if v.len() == len => Ok(v.as_slice()),
        other => Err(mismatch(
            kernel,
            format!("expected real[{}], got {}[{}]", len, other.kind(), other.len()),
        )),
    }
}

fn vectors<'a>(
    kernel: KernelId,
    data: &'a BufferData,
    len: usize,
) -> Result<&'a [Vec3], DispatchError> {
    match data {
        BufferData::Vector(v) if v.len() == len => Ok(v.as_slice()),
        other => Err(mismatch(
            kernel,
            format!("expected vector[{}], got {}[{}]", len, other.kind(), other.len()),
        )),
    }
}

fn butterflies<'a>(
    kernel: KernelId,
    data: &'a BufferData,
    n: usize,
    stage: u32,
) -> Result<&'a [ButterflyEntry], DispatchError> {
    match data {
        BufferData::Butterfly(v) if v.len() >= (stage as usize + 1) * n && v.len() % n == 0 => {
            Ok(&v[stage as usize * n..(stage as usize + 1) * n])
        }
        other => Err(mismatch(
            kernel,
            format!("stage {} not present in {}[{}]", stage, other.kind(), other.len()),
        )),
    }
}

fn complex_outputs<'a>(
    kernel: KernelId,
    outputs: &'a mut [BufferData],
    len: usize,
) -> Result<[&'a mut [Complex32]; 3], DispatchError> {
    let slices = outputs
        .iter_mut()
        .map(|data| {
            let (kind, got) = (data.kind(), data.len());
            match data {
                BufferData::Complex(v) if v.len() == len => Ok(v.as_mut_slice()),
                _ => Err(mismatch(
                    kernel,
                    format!("expected complex[{}] output, got {}[{}]", len, kind, got),
                )),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    slices
        .try_into()
        .map_err(|_| mismatch(kernel, "expected 3 complex outputs"))
}

fn vector_output<'a>(
    kernel: KernelId,
    outputs: &'a mut [BufferData],
    len: usize,
) -> Result<&'a mut [Vec3], DispatchError> {
    match outputs {
        [BufferData::Vector(v)] if v.len() == len => Ok(v.as_mut_slice()),
        _ => Err(mismatch(kernel, format!("expected one vector[{}] output", len))),
    }
}

/// Bind typed slices and run the kernel body over the whole grid.
fn run_kernel(
    kernel: KernelId,
    push: &PushConstants,
    inputs: &[&BufferData],
    outputs: &mut [BufferData],
) -> Result<(), DispatchError> {
    let n = push.resolution as usize;
    let len = n * n;

    match kernel {
        KernelId::TimeEvolve => {
            expect_count(kernel, "input", inputs, 3)?;
            let h0k = complex(kernel, inputs[0], len)?;
            let h0minusk = complex(kernel, inputs[1], len)?;
            let omega = real(kernel, inputs[2], len)?;
            let [height, dx, dz] = complex_outputs(kernel, outputs, len)?;
            let delta_k = 2.0 * std::f32::consts::PI / push.patch_length;
            evolve_rows(n, delta_k, push.time, h0k, h0minusk, omega, height, dx, dz);
        }
        KernelId::FftRowPass | KernelId::FftColumnPass => {
            expect_count(kernel, "input", inputs, 4)?;
            let stage = butterflies(kernel, inputs[0], n, push.stage)?;
            let channels = [
                complex(kernel, inputs[1], len)?,
                complex(kernel, inputs[2], len)?,
                complex(kernel, inputs[3], len)?,
            ];
            let targets = complex_outputs(kernel, outputs, len)?;
            let axis = if kernel == KernelId::FftRowPass {
                PassAxis::Rows
            } else {
                PassAxis::Columns
            };
            for (input, output) in channels.into_iter().zip(targets) {
                butterfly_pass(axis, push.direction, n, stage, input, output);
            }
        }
        KernelId::Displacement => {
            expect_count(kernel, "input", inputs, 3)?;
            let height = complex(kernel, inputs[0], len)?;
            let dx = complex(kernel, inputs[1], len)?;
            let dz = complex(kernel, inputs[2], len)?;
            let out = vector_output(kernel, outputs, len)?;
            synthesize_rows(n, push.choppiness, height, dx, dz, out);
        }
        KernelId::Normals => {
            expect_count(kernel, "input", inputs, 1)?;
            let displacement = vectors(kernel, inputs[0], len)?;
            let out = vector_output(kernel, outputs, len)?;
            estimate_rows(n, push.patch_length, displacement, out);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fft::FftDirection;

    fn push(n: usize) -> PushConstants {
        PushConstants::new(n, n as f32)
    }

    #[test]
    fn test_buffer_lifecycle() {
        let mut device = CpuDevice::new();
        let a = device.create_buffer("a", BufferData::Real(vec![1.0; 4])).unwrap();
        let b = device.create_buffer("b", BufferData::Real(vec![2.0; 4])).unwrap();
        assert_eq!(device.buffer_count(), 2);
        assert_eq!(device.read_buffer(&a).unwrap(), BufferData::Real(vec![1.0; 4]));

        let stale = a.index();
        device.destroy_buffer(a);
        assert_eq!(device.buffer_count(), 1);
        assert_eq!(
            device.read_buffer(&CpuBuffer { index: stale }),
            Err(DispatchError::UnknownBuffer(stale))
        );

        // Freed slots are reused
        let c = device.create_buffer("c", BufferData::Real(vec![3.0; 4])).unwrap();
        assert_eq!(c.index(), stale);
        assert_eq!(device.read_buffer(&b).unwrap().len(), 4);
    }

    #[test]
    fn test_normals_kernel_runs() {
        let n = 4;
        let mut device = CpuDevice::new();
        let displacement = device
            .create_buffer("displacement", BufferData::vector_zeroed(n * n))
            .unwrap();
        let normals = device
            .create_buffer("normals", BufferData::vector_zeroed(n * n))
            .unwrap();

        let handle = device
            .dispatch(
                KernelId::Normals,
                GroupCount::covering(n),
                Bindings {
                    reads: &[&displacement],
                    writes: &[&normals],
                },
                &push(n),
            )
            .unwrap();
        device.wait_for_completion(handle).unwrap();

        let out = device.read_buffer(&normals).unwrap().into_vectors().unwrap();
        assert!(out.iter().all(|v| *v == Vec3::Y));
    }

    #[test]
    fn test_missing_barrier_is_reported() {
        let n = 4;
        let mut device = CpuDevice::new();
        let displacement = device
            .create_buffer("displacement", BufferData::vector_zeroed(n * n))
            .unwrap();
        let normals = device
            .create_buffer("normals", BufferData::vector_zeroed(n * n))
            .unwrap();
        let again = device
            .create_buffer("again", BufferData::vector_zeroed(n * n))
            .unwrap();

        let groups = GroupCount::covering(n);
        device
            .dispatch(
                KernelId::Normals,
                groups,
                Bindings {
                    reads: &[&displacement],
                    writes: &[&normals],
                },
                &push(n),
            )
            .unwrap();

        let reads_unfenced = Bindings {
            reads: &[&normals],
            writes: &[&again],
        };
        assert_eq!(
            device.dispatch(KernelId::Normals, groups, reads_unfenced, &push(n)),
            Err(DispatchError::MissingBarrier("normals"))
        );

        device.barrier(&[&normals]);
        let fenced = Bindings {
            reads: &[&normals],
            writes: &[&again],
        };
        assert!(device.dispatch(KernelId::Normals, groups, fenced, &push(n)).is_ok());
    }

    #[test]
    fn test_aliased_binding_is_rejected() {
        let n = 4;
        let mut device = CpuDevice::new();
        let field = device
            .create_buffer("field", BufferData::vector_zeroed(n * n))
            .unwrap();
        let result = device.dispatch(
            KernelId::Normals,
            GroupCount::covering(n),
            Bindings {
                reads: &[&field],
                writes: &[&field],
            },
            &push(n),
        );
        assert_eq!(result, Err(DispatchError::Aliased("field")));
        // The buffer survives a rejected dispatch
        assert!(device.read_buffer(&field).is_ok());
    }

    #[test]
    fn test_wrong_buffer_type_is_a_binding_mismatch() {
        let n = 4;
        let mut device = CpuDevice::new();
        let wrong = device.create_buffer("wrong", BufferData::Real(vec![0.0; n * n])).unwrap();
        let normals = device
            .create_buffer("normals", BufferData::vector_zeroed(n * n))
            .unwrap();
        let result = device.dispatch(
            KernelId::Normals,
            GroupCount::covering(n),
            Bindings {
                reads: &[&wrong],
                writes: &[&normals],
            },
            &push(n),
        );
        assert!(matches!(result, Err(DispatchError::BindingMismatch { .. })));
        // Output restored after the failed kernel
        assert_eq!(device.read_buffer(&normals).unwrap().len(), n * n);
    }

    #[test]
    fn test_wrong_output_type_is_a_binding_mismatch() {
        let n = 4;
        let mut device = CpuDevice::new();
        let h0k = device.create_buffer("h0k", BufferData::complex_zeroed(n * n)).unwrap();
        let h0minusk = device
            .create_buffer("h0minusk", BufferData::complex_zeroed(n * n))
            .unwrap();
        let omega = device.create_buffer("omega", BufferData::Real(vec![0.0; n * n])).unwrap();
        let height = device.create_buffer("height", BufferData::complex_zeroed(n * n)).unwrap();
        let dx = device.create_buffer("dx", BufferData::complex_zeroed(n * n)).unwrap();
        let dz = device.create_buffer("dz", BufferData::vector_zeroed(n * n)).unwrap();

        let result = device.dispatch(
            KernelId::TimeEvolve,
            GroupCount::covering(n),
            Bindings {
                reads: &[&h0k, &h0minusk, &omega],
                writes: &[&height, &dx, &dz],
            },
            &push(n),
        );
        match result {
            Err(DispatchError::BindingMismatch { kernel, reason }) => {
                assert_eq!(kernel, "time_evolve");
                assert!(reason.contains("vector[16]"), "{}", reason);
            }
            other => panic!("expected a binding mismatch, got {:?}", other),
        }
        // Every output is back in its slot and nothing was issued
        assert_eq!(device.read_buffer(&dz).unwrap(), BufferData::vector_zeroed(n * n));
        assert_eq!(device.read_buffer(&height).unwrap().len(), n * n);
        assert_eq!(device.dispatch_count(), 0);
    }

    #[test]
    fn test_insufficient_coverage() {
        let n = 32;
        let mut device = CpuDevice::new();
        let a = device.create_buffer("a", BufferData::vector_zeroed(n * n)).unwrap();
        let b = device.create_buffer("b", BufferData::vector_zeroed(n * n)).unwrap();
        let result = device.dispatch(
            KernelId::Normals,
            GroupCount { x: 1, y: 1, z: 1 },
            Bindings {
                reads: &[&a],
                writes: &[&b],
            },
            &push(n),
        );
        assert!(matches!(result, Err(DispatchError::InsufficientCoverage { .. })));
    }

    #[test]
    fn test_fft_pass_kernel_matches_host_pass() {
        let n = 8;
        let table = crate::butterfly::ButterflyTable::new(n);
        let input: Vec<Complex32> = (0..n * n)
            .map(|i| Complex32::new(i as f32, -(i as f32) * 0.5))
            .collect();

        let mut device = CpuDevice::new();
        let butterfly = device
            .create_buffer("butterfly", BufferData::Butterfly(table.entries().to_vec()))
            .unwrap();
        let sources: Vec<CpuBuffer> = (0..3)
            .map(|_| device.create_buffer("src", BufferData::Complex(input.clone())).unwrap())
            .collect();
        let targets: Vec<CpuBuffer> = (0..3)
            .map(|_| device.create_buffer("dst", BufferData::complex_zeroed(n * n)).unwrap())
            .collect();

        let mut constants = push(n);
        constants.stage = 1;
        constants.direction = FftDirection::Inverse;
        let handle = device
            .dispatch(
                KernelId::FftColumnPass,
                GroupCount::covering(n),
                Bindings {
                    reads: &[&butterfly, &sources[0], &sources[1], &sources[2]],
                    writes: &[&targets[0], &targets[1], &targets[2]],
                },
                &constants,
            )
            .unwrap();
        device.wait_for_completion(handle).unwrap();

        let mut expected = vec![Complex32::new(0.0, 0.0); n * n];
        butterfly_pass(
            PassAxis::Columns,
            FftDirection::Inverse,
            n,
            table.stage(1),
            &input,
            &mut expected,
        );
        for target in &targets {
            let got = device.read_buffer(target).unwrap().into_complex().unwrap();
            assert_eq!(got, expected);
        }
    }
}
