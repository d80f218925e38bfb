//! Low-level code module produced by emission.
//!
//! [`CodeModule`] is the target-specific representation handed to the device
//! compiler: a target triple and data layout (recorded, never validated),
//! global variables, and kernel functions. A global's use count is the number
//! of kernel references to it, which is what dead-global pruning inspects.

use std::fmt;

/// A module-level global variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVariable {
    pub name: String,
    pub size_bytes: u64,
    /// Embedded initializer; `None` means the content is supplied at load time.
    pub initializer: Option<Vec<u8>>,
    pub is_constant: bool,
    uses: usize,
}

impl GlobalVariable {
    pub fn new(name: &str, size_bytes: u64, initializer: Option<Vec<u8>>) -> Self {
        Self {
            name: name.to_string(),
            size_bytes,
            initializer,
            is_constant: true,
            uses: 0,
        }
    }

    pub fn use_count(&self) -> usize {
        self.uses
    }

    pub fn use_empty(&self) -> bool {
        self.uses == 0
    }
}

/// A device kernel and the globals it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelFunction {
    pub name: String,
    pub params: Vec<u64>,
    pub body: Vec<String>,
    pub referenced_globals: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeModule {
    name: String,
    target_triple: String,
    data_layout: String,
    globals: Vec<GlobalVariable>,
    kernels: Vec<KernelFunction>,
}

impl CodeModule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_target_triple(&mut self, triple: &str) {
        self.target_triple = triple.to_string();
    }

    pub fn target_triple(&self) -> &str {
        &self.target_triple
    }

    pub fn set_data_layout(&mut self, layout: &str) {
        self.data_layout = layout.to_string();
    }

    pub fn data_layout(&self) -> &str {
        &self.data_layout
    }

    /// Add a global, counting uses by kernels already in the module.
    pub fn add_global(&mut self, mut global: GlobalVariable) {
        global.uses = self
            .kernels
            .iter()
            .flat_map(|k| &k.referenced_globals)
            .filter(|name| **name == global.name)
            .count();
        self.globals.push(global);
    }

    pub fn global(&self, name: &str) -> Option<&GlobalVariable> {
        self.globals.iter().find(|g| g.name == name)
    }

    pub fn globals(&self) -> &[GlobalVariable] {
        &self.globals
    }

    /// Remove a global; returns it if it existed.
    pub fn erase_global(&mut self, name: &str) -> Option<GlobalVariable> {
        let pos = self.globals.iter().position(|g| g.name == name)?;
        Some(self.globals.remove(pos))
    }

    /// Add a kernel, counting one use per referenced global present in the module.
    pub fn add_kernel(&mut self, kernel: KernelFunction) {
        for name in &kernel.referenced_globals {
            if let Some(global) = self.globals.iter_mut().find(|g| &g.name == name) {
                global.uses += 1;
            }
        }
        self.kernels.push(kernel);
    }

    pub fn kernels(&self) -> &[KernelFunction] {
        &self.kernels
    }

    pub fn kernel(&self, name: &str) -> Option<&KernelFunction> {
        self.kernels.iter().find(|k| k.name == name)
    }
}

impl fmt::Display for CodeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        writeln!(f, "target datalayout = \"{}\"", self.data_layout)?;
        writeln!(f, "target triple = \"{}\"", self.target_triple)?;
        if !self.globals.is_empty() {
            writeln!(f)?;
        }
        for global in &self.globals {
            let qualifier = if global.is_constant { "constant" } else { "global" };
            match &global.initializer {
                Some(bytes) => {
                    write!(f, "@{} = {} [{} x i8] c\"", global.name, qualifier, global.size_bytes)?;
                    for byte in bytes {
                        write!(f, "\\{:02X}", byte)?;
                    }
                    writeln!(f, "\", align 64")?;
                }
                None => writeln!(
                    f,
                    "@{} = external {} [{} x i8], align 64",
                    global.name, qualifier, global.size_bytes
                )?,
            }
        }
        for kernel in &self.kernels {
            writeln!(f)?;
            write!(f, "define void @{}(", kernel.name)?;
            for (i, size) in kernel.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "ptr noalias align 64 dereferenceable({}) %arg{}", size, i)?;
            }
            writeln!(f, ") {{")?;
            for line in &kernel.body {
                writeln!(f, "  {}", line)?;
            }
            writeln!(f, "  ret void")?;
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel(name: &str, globals: &[&str]) -> KernelFunction {
        KernelFunction {
            name: name.to_string(),
            params: vec![16],
            body: vec![],
            referenced_globals: globals.iter().map(|g| g.to_string()).collect(),
        }
    }

    #[test]
    fn test_use_counts() {
        let mut module = CodeModule::new("m");
        module.add_global(GlobalVariable::new("c0", 16, None));
        module.add_global(GlobalVariable::new("c1", 4, Some(vec![1, 0, 0, 0])));

        module.add_kernel(kernel("k0", &["c0"]));
        module.add_kernel(kernel("k1", &["c0", "missing"]));

        assert_eq!(module.global("c0").unwrap().use_count(), 2);
        assert!(module.global("c1").unwrap().use_empty());
    }

    #[test]
    fn test_use_counts_independent_of_insertion_order() {
        let mut module = CodeModule::new("m");
        module.add_kernel(kernel("k0", &["c0"]));
        module.add_global(GlobalVariable::new("c0", 16, None));
        module.add_kernel(kernel("k1", &["c0"]));

        assert_eq!(module.global("c0").unwrap().use_count(), 2);
    }

    #[test]
    fn test_erase_global() {
        let mut module = CodeModule::new("m");
        module.add_global(GlobalVariable::new("c0", 16, None));

        assert!(module.erase_global("c0").is_some());
        assert!(module.erase_global("c0").is_none());
        assert!(module.globals().is_empty());
    }

    #[test]
    fn test_text_rendering() {
        let mut module = CodeModule::new("m");
        module.set_target_triple("nvptx64-nvidia-cuda");
        module.set_data_layout("e-i64:64-i128:128");
        module.add_global(GlobalVariable::new("c1", 2, Some(vec![0xAB, 0x01])));
        module.add_kernel(kernel("k0", &["c1"]));

        let text = module.to_string();
        assert!(text.contains("target triple = \"nvptx64-nvidia-cuda\""));
        assert!(text.contains("@c1 = constant [2 x i8] c\"\\AB\\01\", align 64"));
        assert!(text.contains("define void @k0(ptr noalias align 64 dereferenceable(16) %arg0) {"));
    }
}
