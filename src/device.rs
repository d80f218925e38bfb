//! Target platform and device description.

use std::fmt;

/// Platform the module is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformId {
    Cuda,
    Rocm,
}

impl PlatformId {
    pub fn name(self) -> &'static str {
        match self {
            PlatformId::Cuda => "CUDA",
            PlatformId::Rocm => "ROCM",
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeCapability {
    Cuda { major: u32, minor: u32 },
    Rocm { gfx_version: String },
}

/// Properties of the device the code is generated for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescription {
    pub name: String,
    pub compute_capability: ComputeCapability,
    pub threads_per_block_limit: u32,
    pub shared_memory_per_block: u64,
    pub core_count: u32,
}

impl DeviceDescription {
    pub fn cuda(name: &str, major: u32, minor: u32) -> Self {
        Self {
            name: name.to_string(),
            compute_capability: ComputeCapability::Cuda { major, minor },
            threads_per_block_limit: 1024,
            shared_memory_per_block: 48 * 1024,
            core_count: 108,
        }
    }

    pub fn rocm(name: &str, gfx_version: &str) -> Self {
        Self {
            name: name.to_string(),
            compute_capability: ComputeCapability::Rocm { gfx_version: gfx_version.to_string() },
            threads_per_block_limit: 1024,
            shared_memory_per_block: 64 * 1024,
            core_count: 104,
        }
    }

    /// Capability tag used in dump file names, e.g. `sm_8.0` or `gfx90a`.
    pub fn capability_tag(&self) -> String {
        match &self.compute_capability {
            ComputeCapability::Cuda { major, minor } => format!("sm_{}.{}", major, minor),
            ComputeCapability::Rocm { gfx_version } => gfx_version.clone(),
        }
    }
}
