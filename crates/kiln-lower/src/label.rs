// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Labels and label-address placeholders.
//!
//! A label's block is created on first reference and joins the layout when
//! the label is defined. Taking the address of a label that is not defined
//! yet hands out a placeholder; the instructions that use it are recorded so
//! definition can patch exactly those use sites.

use std::collections::HashMap;

use kiln_ast::{LabelId, Span};
use kiln_lir::{BlockId, InstId, PlaceholderId};

#[derive(Debug, Clone)]
pub struct Label {
    pub id: LabelId,
    pub span: Span,
    pub block: Option<BlockId>,
    pub defined: bool,
    pub address_taken: bool,
}

#[derive(Debug, Clone)]
struct Placeholder {
    uses: Vec<InstId>,
}

#[derive(Debug, Default)]
pub struct LabelTable {
    labels: Vec<Label>,
    /// `None` once resolved.
    placeholders: Vec<Option<Placeholder>>,
    by_label: HashMap<LabelId, PlaceholderId>,
    indirect_branches: Vec<InstId>,
}

impl LabelTable {
    pub fn new_label(&mut self, span: Span) -> LabelId {
        let id = LabelId(self.labels.len() as u32);
        self.labels.push(Label {
            id,
            span,
            block: None,
            defined: false,
            address_taken: false,
        });
        id
    }

    pub fn get(&self, id: LabelId) -> Option<&Label> {
        self.labels.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: LabelId) -> Option<&mut Label> {
        self.labels.get_mut(id.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.labels.iter()
    }

    /// Placeholder standing in for the label's address, reused per label.
    pub fn placeholder_for(&mut self, label: LabelId) -> PlaceholderId {
        if let Some(p) = self.by_label.get(&label) {
            return *p;
        }
        let p = PlaceholderId(self.placeholders.len() as u32);
        self.placeholders.push(Some(Placeholder { uses: Vec::new() }));
        self.by_label.insert(label, p);
        p
    }

    pub fn record_use(&mut self, placeholder: PlaceholderId, inst: InstId) {
        if let Some(Some(p)) = self.placeholders.get_mut(placeholder.0 as usize) {
            if !p.uses.contains(&inst) {
                p.uses.push(inst);
            }
        }
    }

    /// Retire the label's placeholder and return it with its use sites.
    pub fn take_placeholder(&mut self, label: LabelId) -> Option<(PlaceholderId, Vec<InstId>)> {
        let p = self.by_label.remove(&label)?;
        let entry = self.placeholders.get_mut(p.0 as usize)?.take()?;
        Some((p, entry.uses))
    }

    pub fn pending_placeholders(&self) -> usize {
        self.placeholders.iter().filter(|p| p.is_some()).count()
    }

    pub fn record_indirect_branch(&mut self, inst: InstId) {
        self.indirect_branches.push(inst);
    }

    pub fn indirect_branches(&self) -> &[InstId] {
        &self.indirect_branches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_shared_per_label_until_taken() {
        let mut table = LabelTable::default();
        let a = table.new_label(Span::default());
        let b = table.new_label(Span::default());
        let pa = table.placeholder_for(a);
        assert_eq!(table.placeholder_for(a), pa);
        assert_ne!(table.placeholder_for(b), pa);
        table.record_use(pa, InstId(3));
        table.record_use(pa, InstId(3));
        assert_eq!(table.pending_placeholders(), 2);

        let (p, uses) = table.take_placeholder(a).unwrap();
        assert_eq!(p, pa);
        assert_eq!(uses, vec![InstId(3)]);
        assert_eq!(table.pending_placeholders(), 1);
        assert!(table.take_placeholder(a).is_none());
    }
}
