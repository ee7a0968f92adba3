// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Undo/redo command log.
//!
//! Every mutation is recorded as a pair of closures that revert and
//! re-apply it against the owning state. The log also remembers the
//! positions at which the state was last saved and last backed up, which is
//! the single source of truth for "unsaved changes".

use std::fmt;
use std::rc::Rc;

/// Closure applied to the state when a command is undone or redone.
pub type Action<T> = Rc<dyn Fn(&mut T)>;

/// A recorded (undo, redo) pair.
pub struct Command<T> {
    pub label: String,
    undo: Action<T>,
    redo: Action<T>,
    /// Runs when the command is dropped from an abandoned redo branch.
    discard: Option<Action<T>>,
}

impl<T> Command<T> {
    pub fn new(
        label: impl Into<String>,
        undo: impl Fn(&mut T) + 'static,
        redo: impl Fn(&mut T) + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            undo: Rc::new(undo),
            redo: Rc::new(redo),
            discard: None,
        }
    }

    /// Release state that only this command's redo could reach.
    pub fn on_discard(mut self, discard: impl Fn(&mut T) + 'static) -> Self {
        self.discard = Some(Rc::new(discard));
        self
    }

    /// Combine several commands into one entry. Undo runs the parts in
    /// reverse order, redo runs them forward.
    pub fn compound(label: impl Into<String>, parts: Vec<Command<T>>) -> Self
    where
        T: 'static,
    {
        let undo_parts: Vec<Action<T>> = parts.iter().rev().map(|c| c.undo.clone()).collect();
        let redo_parts: Vec<Action<T>> = parts.iter().map(|c| c.redo.clone()).collect();
        let discard_parts: Vec<Action<T>> = parts.iter().filter_map(|c| c.discard.clone()).collect();
        let command = Self::new(
            label,
            move |state: &mut T| undo_parts.iter().for_each(|f| f(state)),
            move |state: &mut T| redo_parts.iter().for_each(|f| f(state)),
        );
        if discard_parts.is_empty() {
            command
        } else {
            command.on_discard(move |state: &mut T| discard_parts.iter().for_each(|f| f(state)))
        }
    }

    pub fn undo_action(&self) -> Action<T> {
        self.undo.clone()
    }

    pub fn redo_action(&self) -> Action<T> {
        self.redo.clone()
    }

    pub fn discard_action(&self) -> Option<Action<T>> {
        self.discard.clone()
    }
}

impl<T> Clone for Command<T> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            undo: self.undo.clone(),
            redo: self.redo.clone(),
            discard: self.discard.clone(),
        }
    }
}

impl<T> fmt::Debug for Command<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command").field("label", &self.label).finish()
    }
}

/// Ordered command log with a cursor.
///
/// Positions are absolute: entries dropped off the front by `max_size` still
/// count, so a saved position stays comparable after trimming.
pub struct UndoLog<T> {
    /// Applied commands (past)
    undo_stack: Vec<Command<T>>,
    /// Undone commands (future), most recent last
    redo_stack: Vec<Command<T>>,
    /// Maximum retained undo entries, unbounded when `None`
    max_size: Option<usize>,
    dropped: usize,
    save_index: Option<usize>,
    backup_index: Option<usize>,
    replaying: bool,
}

impl<T> Default for UndoLog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> UndoLog<T> {
    pub fn new() -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_size: None,
            dropped: 0,
            save_index: Some(0),
            backup_index: Some(0),
            replaying: false,
        }
    }

    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size: Some(max_size.max(1)),
            ..Self::new()
        }
    }

    /// Record a command. Clears the redo stack and returns the commands it
    /// held, most recent last. Ignored while a command is being replayed so
    /// undo/redo closures can reuse recording mutators.
    pub fn push(&mut self, command: Command<T>) -> Vec<Command<T>> {
        if self.replaying {
            log::debug!("Ignoring '{}' pushed during replay", command.label);
            return Vec::new();
        }
        let position = self.position();
        if self.save_index.is_some_and(|i| i > position) {
            self.save_index = None;
        }
        if self.backup_index.is_some_and(|i| i > position) {
            self.backup_index = None;
        }
        let discarded = std::mem::take(&mut self.redo_stack);
        self.undo_stack.push(command);
        if let Some(max) = self.max_size {
            while self.undo_stack.len() > max {
                self.undo_stack.remove(0);
                self.dropped += 1;
            }
        }
        discarded
    }

    /// Move the cursor back one entry and return the command to revert.
    pub fn step_back(&mut self) -> Option<Command<T>> {
        let command = self.undo_stack.pop()?;
        self.redo_stack.push(command.clone());
        Some(command)
    }

    /// Move the cursor forward one entry and return the command to re-apply.
    pub fn step_forward(&mut self) -> Option<Command<T>> {
        let command = self.redo_stack.pop()?;
        self.undo_stack.push(command.clone());
        Some(command)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Absolute cursor position (number of applied commands).
    pub fn position(&self) -> usize {
        self.dropped + self.undo_stack.len()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn next_undo_label(&self) -> Option<&str> {
        self.undo_stack.last().map(|c| c.label.as_str())
    }

    pub fn next_redo_label(&self) -> Option<&str> {
        self.redo_stack.last().map(|c| c.label.as_str())
    }

    pub fn mark_saved(&mut self) {
        self.save_index = Some(self.position());
    }

    pub fn mark_backed_up(&mut self) {
        self.backup_index = Some(self.position());
    }

    pub fn at_save_point(&self) -> bool {
        self.save_index == Some(self.position())
    }

    pub fn at_backup_point(&self) -> bool {
        self.backup_index == Some(self.position())
    }

    pub fn save_index(&self) -> Option<usize> {
        self.save_index
    }

    pub fn backup_index(&self) -> Option<usize> {
        self.backup_index
    }

    pub fn set_replaying(&mut self, replaying: bool) {
        self.replaying = replaying;
    }

    pub fn is_replaying(&self) -> bool {
        self.replaying
    }

    pub fn clear(&mut self) {
        *self = Self {
            max_size: self.max_size,
            ..Self::new()
        };
    }
}
