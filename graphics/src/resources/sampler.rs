//! Texture sampler.

use crate::backend::GpuSampler;
use crate::handle::Handle;
use crate::types::SamplerDescriptor;

/// Reference-counted sampler handle.
pub type SamplerHandle = Handle<Sampler>;

/// A texture sampler. Samplers hold no device memory, so disposal only
/// removes the bookkeeping entry.
pub struct Sampler {
    descriptor: SamplerDescriptor,
    native: GpuSampler,
}

impl Sampler {
    pub(crate) fn new(descriptor: SamplerDescriptor, native: GpuSampler) -> Self {
        Self { descriptor, native }
    }

    /// Get the sampler descriptor.
    pub fn descriptor(&self) -> &SamplerDescriptor {
        &self.descriptor
    }

    pub fn native(&self) -> GpuSampler {
        self.native
    }

    /// Get the sampler label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("mag_filter", &self.descriptor.mag_filter)
            .field("min_filter", &self.descriptor.min_filter)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Sampler: Send, Sync);
