use ort::execution_providers::ExecutionProviderDispatch;

/// Hardware backend the detector asks ONNX Runtime for.
///
/// Registration failures are not fatal: ONNX Runtime falls back to its CPU
/// provider, which is also what an empty provider list means.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Accelerator {
    CoreMl,
    DirectMl,
    Cpu,
}

impl Accelerator {
    pub fn for_platform() -> Self {
        if cfg!(target_os = "macos") {
            Accelerator::CoreMl
        } else if cfg!(target_os = "windows") {
            Accelerator::DirectMl
        } else {
            Accelerator::Cpu
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Accelerator::CoreMl => "CoreML",
            Accelerator::DirectMl => "DirectML",
            Accelerator::Cpu => "CPU",
        }
    }

    /// Providers to register, in preference order. Platform providers are
    /// only compiled in where `ort` is built with them.
    pub fn providers(self) -> Vec<ExecutionProviderDispatch> {
        match self {
            #[cfg(target_os = "macos")]
            Accelerator::CoreMl => {
                vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
            }
            #[cfg(target_os = "windows")]
            Accelerator::DirectMl => {
                vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
            }
            _ => Vec::new(),
        }
    }
}
