// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Structural verifier for lowered functions.
//!
//! Orphan blocks are legal: lowering creates continuation blocks that may
//! never be reached. What must hold is that every laid-out block is properly
//! terminated and only branches to laid-out blocks.

use thiserror::Error;

use crate::{LirFunction, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("function `{function}` has no blocks")]
    NoBlocks { function: String },

    #[error("block `{block}` in `{function}` has no terminator")]
    MissingTerminator { function: String, block: String },

    #[error("block `{block}` in `{function}` has a terminator before its last instruction")]
    TerminatorNotLast { function: String, block: String },

    #[error("block `{block}` in `{function}` branches to `{target}`, which is not laid out")]
    DanglingSuccessor {
        function: String,
        block: String,
        target: String,
    },

    #[error("block `{block}` in `{function}` still uses a label-address placeholder")]
    UnresolvedPlaceholder { function: String, block: String },
}

impl LirFunction {
    pub fn verify(&self) -> Result<(), VerifyError> {
        if self.layout().is_empty() {
            return Err(VerifyError::NoBlocks { function: self.name.clone() });
        }

        for block in self.blocks() {
            let err_block = || block.name.clone();
            let Some((last, body)) = block.insts.split_last() else {
                return Err(VerifyError::MissingTerminator {
                    function: self.name.clone(),
                    block: err_block(),
                });
            };
            if !self.inst(*last).kind.is_terminator() {
                return Err(VerifyError::MissingTerminator {
                    function: self.name.clone(),
                    block: err_block(),
                });
            }
            if body.iter().any(|i| self.inst(*i).kind.is_terminator()) {
                return Err(VerifyError::TerminatorNotLast {
                    function: self.name.clone(),
                    block: err_block(),
                });
            }

            for inst in &block.insts {
                let kind = &self.inst(*inst).kind;
                if kind.operands().into_iter().any(Value::is_placeholder) {
                    return Err(VerifyError::UnresolvedPlaceholder {
                        function: self.name.clone(),
                        block: err_block(),
                    });
                }
            }

            for succ in self.successors(block.id) {
                if !self.is_attached(succ) {
                    return Err(VerifyError::DanglingSuccessor {
                        function: self.name.clone(),
                        block: err_block(),
                        target: self.block(succ).name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
