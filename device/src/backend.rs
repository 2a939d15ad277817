use crate::DeviceError;
use enum_as_inner::EnumAsInner;

/// Per-device resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProperties {
    pub memory_words: usize,
    pub n_aux_queues: usize,
}

/// Order in which collocation visits (task, shell) pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollocationOrder {
    /// Per task, over its screened shells.
    MaskedCombined,
    /// Per shell, over the tasks that screen it in.
    ShellToTask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub hessian: bool,
    pub exc_gradient: bool,
    pub max_pure_l: usize,
    pub collocation_order: CollocationOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    HostReference,
    VendorA,
    VendorB,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::HostReference => "host",
            BackendKind::VendorA => "vendor_a",
            BackendKind::VendorB => "vendor_b",
        }
    }
}

/// Execution backend, fixed once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumAsInner)]
pub enum Backend {
    /// Serial reference: one auxiliary queue.
    HostReference(DeviceProperties),
    VendorA(DeviceProperties),
    /// No second-derivative collocation, no nuclear gradients.
    VendorB(DeviceProperties),
}

impl Backend {
    pub fn new(name: &str, memory_words: usize, n_aux_queues: usize) -> Result<Backend, DeviceError> {
        let props = DeviceProperties {
            memory_words,
            n_aux_queues: n_aux_queues.max(1),
        };

        let backend = match name {
            "host" => Backend::HostReference(DeviceProperties {
                n_aux_queues: 1,
                ..props
            }),
            "vendor_a" => Backend::VendorA(props),
            "vendor_b" => Backend::VendorB(props),
            _ => return Err(DeviceError::UnknownBackend(name.to_string())),
        };

        Ok(backend)
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::HostReference(_) => BackendKind::HostReference,
            Backend::VendorA(_) => BackendKind::VendorA,
            Backend::VendorB(_) => BackendKind::VendorB,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn properties(&self) -> &DeviceProperties {
        match self {
            Backend::HostReference(p) | Backend::VendorA(p) | Backend::VendorB(p) => p,
        }
    }

    pub fn memory_words(&self) -> usize {
        self.properties().memory_words
    }

    pub fn n_aux_queues(&self) -> usize {
        self.properties().n_aux_queues
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            Backend::HostReference(_) => Capabilities {
                hessian: true,
                exc_gradient: true,
                max_pure_l: xwconsts::MAX_PURE_L,
                collocation_order: CollocationOrder::MaskedCombined,
            },
            Backend::VendorA(_) => Capabilities {
                hessian: true,
                exc_gradient: true,
                max_pure_l: xwconsts::MAX_PURE_L,
                collocation_order: CollocationOrder::ShellToTask,
            },
            Backend::VendorB(_) => Capabilities {
                hessian: false,
                exc_gradient: false,
                max_pure_l: xwconsts::MAX_PURE_L,
                collocation_order: CollocationOrder::MaskedCombined,
            },
        }
    }

    pub fn unsupported(&self, feature: &str) -> DeviceError {
        DeviceError::Capability {
            backend: self.name(),
            feature: feature.to_string(),
        }
    }

    pub fn require_hessian(&self) -> Result<(), DeviceError> {
        if self.capabilities().hessian {
            Ok(())
        } else {
            Err(self.unsupported("second-derivative collocation"))
        }
    }

    pub fn require_exc_gradient(&self) -> Result<(), DeviceError> {
        if self.capabilities().exc_gradient {
            Ok(())
        } else {
            Err(self.unsupported("XC nuclear gradient"))
        }
    }
}
