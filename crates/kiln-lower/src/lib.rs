// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Function lowering - turn a typed statement tree into a LIR function.
//!
//! A [`FunctionBuilder`] owns everything about one function under
//! construction: the classified signature, parameter and local storage, the
//! label table and the entry-block prolog. A [`BodyLowerer`] walks statements
//! and expressions and appends blocks through the builder. Exception regions
//! are compiled into landing pads and a small dispatch flag per region.
//!
//! Unit-wide state (target, options, the name allocator) lives in a
//! [`UnitContext`] passed by `&mut` to each builder.

mod error;
mod function;
mod label;
mod lower;
mod variable;

#[cfg(test)]
mod tests;

pub use error::{LowerError, LowerErrorKind};
pub use function::FunctionBuilder;
pub use label::Label;
pub use lower::BodyLowerer;
pub use variable::{VarKind, Variable};

use kiln_abi::TargetConfig;
use kiln_ast::Stmt;
use kiln_lir::{LirFunction, NameGen};

/// Knobs that change the shape of lowered code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowerOptions {
    /// Drop blocks unreachable from the entry block when finishing.
    pub prune_unreachable: bool,
    /// Personality routine attached to functions with landing pads.
    pub personality: String,
    /// Runtime routine that rethrows a buffered exception into an enclosing
    /// handler.
    pub rethrow: String,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            prune_unreachable: false,
            personality: "__kiln_personality_v0".to_string(),
            rethrow: "__kiln_rethrow".to_string(),
        }
    }
}

/// State shared by every function of one compilation unit.
#[derive(Debug, Default)]
pub struct UnitContext {
    pub target: TargetConfig,
    pub options: LowerOptions,
    names: NameGen,
}

impl UnitContext {
    pub fn new(target: TargetConfig, options: LowerOptions) -> Self {
        Self { target, options, names: NameGen::new() }
    }

    /// Unit-unique `tag.N` name.
    pub fn fresh_name(&mut self, tag: &str) -> String {
        self.names.fresh(tag)
    }
}

/// Lower `body` as the whole body of the function `fb` describes.
///
/// Parameters, the closure environment and declared locals must already be
/// registered with `fb`.
pub fn lower_function(mut fb: FunctionBuilder<'_>, body: &Stmt) -> Result<LirFunction, LowerError> {
    fb.generate_prolog()?;
    let mut lowerer = BodyLowerer::new(&mut fb);
    lowerer.lower_stmt(body)?;
    fb.finish()
}
