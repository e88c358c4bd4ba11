//! Shader compilation and the content-addressed module cache.
//!
//! [`compile`] hands WGSL to the device and turns every error-severity message
//! into a [`ShaderDiagnostic`] that carries the offending source line. Warnings
//! never fail a compile. [`ShaderCache`] keys compiled modules by
//! `(source, label)` so identical shader text is compiled once no matter how
//! many plugins ask for it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{CompilationMessage, GpuBackend, GpuShaderModule, MessageSeverity};
use crate::error::{GraphicsError, GraphicsResult, ShaderDiagnostic};

/// A successfully compiled shader module.
#[derive(Debug)]
pub struct ShaderModule {
    label: Option<String>,
    native: GpuShaderModule,
    warnings: Vec<CompilationMessage>,
}

impl ShaderModule {
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn native(&self) -> GpuShaderModule {
        self.native
    }

    /// Non-error messages the compiler reported.
    pub fn warnings(&self) -> &[CompilationMessage] {
        &self.warnings
    }
}

/// Cache key: exact source text plus label.
pub type ShaderKey = (String, Option<String>);

/// Compile `source`, failing with every error diagnostic if any are reported.
pub fn compile(
    backend: &dyn GpuBackend,
    source: &str,
    label: Option<&str>,
) -> GraphicsResult<ShaderModule> {
    let compilation = backend.compile_shader(source, label)?;
    let (errors, warnings): (Vec<_>, Vec<_>) = compilation
        .messages
        .into_iter()
        .partition(|message| message.severity == MessageSeverity::Error);

    if !errors.is_empty() {
        let errors: Vec<ShaderDiagnostic> = errors
            .into_iter()
            .map(|message| to_diagnostic(source, message))
            .collect();
        for error in &errors {
            log::debug!("shader {label:?}: {error}");
        }
        return Err(GraphicsError::ShaderCompilationFailed {
            label: label.unwrap_or("<unnamed>").to_owned(),
            errors,
        });
    }

    for warning in &warnings {
        log::debug!(
            "shader {label:?} warning at {}:{}: {}",
            warning.line,
            warning.column,
            warning.message
        );
    }

    Ok(ShaderModule {
        label: label.map(str::to_owned),
        native: compilation.module,
        warnings,
    })
}

fn to_diagnostic(source: &str, message: CompilationMessage) -> ShaderDiagnostic {
    let source_line = if message.line > 0 {
        source
            .lines()
            .nth(message.line as usize - 1)
            .map(str::to_owned)
    } else {
        None
    };
    ShaderDiagnostic {
        message: message.message,
        line: message.line,
        column: message.column,
        source_line,
    }
}

/// Content-addressed cache of compiled modules. Entries are only removed by
/// [`ShaderCache::clear`].
#[derive(Debug, Default)]
pub struct ShaderCache {
    modules: HashMap<ShaderKey, Arc<ShaderModule>>,
    hits: u64,
    misses: u64,
}

impl ShaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached module for `(source, label)`, compiling on a miss.
    ///
    /// Failed compiles are not cached.
    pub fn get_or_compile(
        &mut self,
        backend: &dyn GpuBackend,
        source: &str,
        label: Option<&str>,
    ) -> GraphicsResult<Arc<ShaderModule>> {
        let key: ShaderKey = (source.to_owned(), label.map(str::to_owned));
        if let Some(module) = self.modules.get(&key) {
            self.hits += 1;
            log::debug!("shader cache hit for {label:?}");
            return Ok(Arc::clone(module));
        }

        self.misses += 1;
        log::debug!("shader cache miss for {label:?}");
        let module = Arc::new(compile(backend, source, label)?);
        self.modules.insert(key, Arc::clone(&module));
        Ok(module)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Drop every entry. Modules already handed out stay valid.
    pub fn clear(&mut self) {
        log::debug!("shader cache cleared ({} module(s))", self.modules.len());
        self.modules.clear();
    }
}
