//! Batched instruction edits.
//!
//! Passes never mutate an instruction list while walking it. They scan the body, queue
//! [`PendingEdits`] keyed by the index of the original instruction, and apply the whole batch
//! once the scan is complete. Indices therefore always refer to the body as it was scanned.
//!
//! # Ordering
//!
//! For every original index the result contains, in order:
//!
//! 1. all instructions queued with [`PendingEdits::insert_before`], in queue order
//! 2. the replacement queued with [`PendingEdits::replace`], or the original instruction
//!
//! Inserting before `body.len()` appends at the end.

use std::collections::BTreeMap;

use crate::{ir::{Body, Instruction}, Result};

#[derive(Debug, Default)]
struct Slot {
    before: Vec<Instruction>,
    replacement: Option<Vec<Instruction>>,
}

/// A batch of edits against one method body.
#[derive(Debug, Default)]
pub struct PendingEdits {
    slots: BTreeMap<usize, Slot>,
}

impl PendingEdits {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `instructions` to run immediately before the original instruction at `index`.
    pub fn insert_before(&mut self, index: usize, instructions: impl IntoIterator<Item = Instruction>) {
        self.slots
            .entry(index)
            .or_default()
            .before
            .extend(instructions);
    }

    /// Queues the replacement of the original instruction at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a replacement is already queued for `index`.
    pub fn replace(&mut self, index: usize, instructions: Vec<Instruction>) -> Result<()> {
        let slot = self.slots.entry(index).or_default();
        if slot.replacement.is_some() {
            return Err(malformed_error!(
                "conflicting replacements for instruction {}",
                index
            ));
        }
        slot.replacement = Some(instructions);
        Ok(())
    }

    /// Returns `true` if a replacement is queued for `index`.
    #[must_use]
    pub fn is_replaced(&self, index: usize) -> bool {
        self.slots
            .get(&index)
            .is_some_and(|slot| slot.replacement.is_some())
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of original positions touched by the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Applies the batch to `body`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if an edit targets an index past the end of the body.
    pub fn apply(self, body: &mut Body) -> Result<()> {
        if self.slots.is_empty() {
            return Ok(());
        }
        let len = body.len();
        if let Some((&last, _)) = self.slots.last_key_value() {
            let replaces_end = self
                .slots
                .get(&last)
                .is_some_and(|slot| slot.replacement.is_some());
            if last > len || (last == len && replaces_end) {
                return Err(malformed_error!(
                    "edit at {} is outside a body of {} instructions",
                    last,
                    len
                ));
            }
        }

        let original = std::mem::take(body.instructions_mut());
        let mut slots = self.slots;
        let mut rewritten = Vec::with_capacity(original.len() + slots.len());
        for (index, instruction) in original.into_iter().enumerate() {
            match slots.remove(&index) {
                Some(slot) => {
                    rewritten.extend(slot.before);
                    match slot.replacement {
                        Some(replacement) => rewritten.extend(replacement),
                        None => rewritten.push(instruction),
                    }
                }
                None => rewritten.push(instruction),
            }
        }
        if let Some(tail) = slots.remove(&len) {
            rewritten.extend(tail.before);
        }
        *body.instructions_mut() = rewritten;
        Ok(())
    }
}
