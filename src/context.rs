//! Compiler context: configuration, statistics and the process-wide naming
//! state.
//!
//! Compilation itself is pure; the only state that outlives a single
//! `compile` call is the monotonic counters behind the factory and function
//! name pools, and they live here rather than in globals so embedders can
//! hold several independent compilers.

use crate::bridge::CompiledScript;

/// Tunables for code generation.
#[derive(Clone, Debug)]
pub struct CompilerConfig {
    /// Emit one debug log line per compiled script carrying its factory
    /// source.
    pub debug: bool,
    /// Whether the host environment understands the `??` operator; gates
    /// the list-read fast paths.
    pub supports_nullish_coalescing: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            debug: false,
            supports_nullish_coalescing: true,
        }
    }
}

/// Counters collected across compilations.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompileStats {
    /// Scripts and procedures successfully compiled.
    pub scripts_compiled: usize,
    /// Redundant cast nodes removed by the rewriter.
    pub casts_eliminated: usize,
    /// Deduplicated setup bindings emitted into factory preambles.
    pub setup_bindings: usize,
    /// Yield points emitted into generator bodies.
    pub yields_emitted: usize,
}

impl CompileStats {
    /// Folds another set of counters into this one.
    pub fn merge(&mut self, other: &CompileStats) {
        self.scripts_compiled += other.scripts_compiled;
        self.casts_eliminated += other.casts_eliminated;
        self.setup_bindings += other.setup_bindings;
        self.yields_emitted += other.yields_emitted;
    }
}

/// Observer invoked with every successfully compiled script; used by
/// snapshot tests.
pub type CompileObserver = Box<dyn FnMut(&CompiledScript)>;

/// Shared state for a compiler instance.
pub struct CompilerContext {
    pub config: CompilerConfig,
    pub stats: CompileStats,
    factory_count: usize,
    function_count: usize,
    generator_count: usize,
    observer: Option<CompileObserver>,
}

impl CompilerContext {
    pub fn new() -> CompilerContext {
        CompilerContext::with_config(CompilerConfig::default())
    }

    pub fn with_config(config: CompilerConfig) -> CompilerContext {
        CompilerContext {
            config,
            stats: CompileStats::default(),
            factory_count: 0,
            function_count: 0,
            generator_count: 0,
            observer: None,
        }
    }

    /// Registers the observer called after each successful compile.
    pub fn set_observer(&mut self, observer: CompileObserver) {
        self.observer = Some(observer);
    }

    /// Next unique factory function name.
    pub fn next_factory_name(&mut self) -> String {
        let n = self.factory_count;
        self.factory_count += 1;
        format!("factory{}", n)
    }

    /// Next unique inner function name; generators draw from their own pool.
    pub fn next_function_name(&mut self, yields: bool) -> String {
        if yields {
            let n = self.generator_count;
            self.generator_count += 1;
            format!("gen{}", n)
        } else {
            let n = self.function_count;
            self.function_count += 1;
            format!("fun{}", n)
        }
    }

    /// Reports a finished compile to the observer, if any.
    pub fn notify(&mut self, compiled: &CompiledScript) {
        if let Some(observer) = &mut self.observer {
            observer(compiled);
        }
    }
}

impl Default for CompilerContext {
    fn default() -> Self {
        CompilerContext::new()
    }
}

impl std::fmt::Debug for CompilerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerContext")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .field("factory_count", &self.factory_count)
            .field("function_count", &self.function_count)
            .field("generator_count", &self.generator_count)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
