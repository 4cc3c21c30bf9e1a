//! Growable GPU buffers.
//!
//! [`DynamicBuffer`] grows with a 2x strategy when data exceeds capacity.
//! [`UniformSlots`] packs one uniform struct per slot at the device's dynamic
//! offset alignment, so many draws in one encoder can each read their own
//! parameters from a single buffer.

use std::marker::PhantomData;

use super::pipeline_helpers::align_to;

/// Minimum byte capacity of any dynamic buffer.
const MIN_CAPACITY: usize = 256;

/// Capacity after growing a buffer of `current` bytes to hold `needed`.
fn grown_capacity(current: usize, needed: usize) -> usize {
    if needed <= current {
        current
    } else {
        (needed * 2).max(current + 1024)
    }
}

/// A GPU buffer that can grow dynamically.
///
/// Never shrinks (GPU buffers cannot be resized in place).
pub struct DynamicBuffer {
    buffer: wgpu::Buffer,
    capacity: usize,
    usage: wgpu::BufferUsages,
    label: String,
}

impl DynamicBuffer {
    /// Buffer with the given initial byte capacity.
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        initial_capacity: usize,
        usage: wgpu::BufferUsages,
    ) -> Self {
        let capacity = initial_capacity.max(MIN_CAPACITY);
        let buffer = Self::allocate(device, label, capacity, usage);
        Self {
            buffer,
            capacity,
            usage,
            label: label.to_owned(),
        }
    }

    fn allocate(
        device: &wgpu::Device,
        label: &str,
        capacity: usize,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity as u64,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Write raw bytes to buffer, growing if necessary.
    ///
    /// Returns `true` if buffer was reallocated (bind groups need recreation).
    pub fn write_bytes(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        data: &[u8],
    ) -> bool {
        let needed = data.len();
        let reallocated = needed > self.capacity;
        if reallocated {
            self.capacity = grown_capacity(self.capacity, needed);
            log::debug!(
                "{}: growing to {} bytes for {} byte write",
                self.label,
                self.capacity,
                needed
            );
            self.buffer =
                Self::allocate(device, &self.label, self.capacity, self.usage);
        }

        if needed > 0 {
            queue.write_buffer(&self.buffer, 0, data);
        }

        reallocated
    }

    /// The underlying buffer. Replaced on reallocation.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

/// An array of `T` uniforms addressed with dynamic offsets.
pub struct UniformSlots<T> {
    inner: DynamicBuffer,
    stride: u64,
    staging: Vec<u8>,
    _marker: PhantomData<T>,
}

impl<T: bytemuck::Pod> UniformSlots<T> {
    /// Slot array sized for `initial_slots`, aligned to `alignment` bytes.
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        initial_slots: usize,
        alignment: u64,
    ) -> Self {
        let stride = slot_stride::<T>(alignment);
        Self {
            inner: DynamicBuffer::new(
                device,
                label,
                initial_slots.max(1) * stride as usize,
                wgpu::BufferUsages::UNIFORM,
            ),
            stride,
            staging: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Upload `slots`, one per aligned slot.
    ///
    /// Returns `true` if the buffer was reallocated (bind groups need
    /// recreation).
    pub fn write(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        slots: &[T],
    ) -> bool {
        pack_slots(slots, self.stride, &mut self.staging);
        self.inner.write_bytes(device, queue, &self.staging)
    }

    /// Dynamic offset of slot `index`.
    pub fn offset(&self, index: usize) -> u32 {
        (index as u64 * self.stride) as u32
    }

    /// Binding that exposes exactly one slot, for use with dynamic offsets.
    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: self.inner.buffer(),
            offset: 0,
            size: wgpu::BufferSize::new(size_of::<T>() as u64),
        })
    }
}

/// Byte distance between slots holding `T` at the given alignment.
pub fn slot_stride<T>(alignment: u64) -> u64 {
    align_to(size_of::<T>() as u64, alignment)
}

fn pack_slots<T: bytemuck::Pod>(slots: &[T], stride: u64, out: &mut Vec<u8>) {
    let stride = stride as usize;
    out.clear();
    out.resize(slots.len() * stride, 0);
    for (chunk, slot) in out.chunks_exact_mut(stride).zip(slots) {
        let bytes = bytemuck::bytes_of(slot);
        chunk[..bytes.len()].copy_from_slice(bytes);
    }
}
