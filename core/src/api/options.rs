//! Configuration options for the compiler.

use crate::macros::DEFAULT_MAX_DEPTH;
use crate::optimizer::OptLevel;

/// Configuration options for compilation.
///
/// # Example
///
/// ```
/// use quill_core::api::CompilationOptions;
/// use quill_core::optimizer::OptLevel;
///
/// let options = CompilationOptions {
///     opt_level: OptLevel::Aggressive,
///     ..CompilationOptions::default()
/// };
/// assert_eq!(options.max_macro_depth, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilationOptions {
    /// How much the optimizer rewrites each unit body.
    ///
    /// Default: `OptLevel::Basic`
    pub opt_level: OptLevel,

    /// Maximum nesting of macro invocations produced by other invocations.
    ///
    /// Default: 64
    pub max_macro_depth: usize,
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::default(),
            max_macro_depth: DEFAULT_MAX_DEPTH,
        }
    }
}
