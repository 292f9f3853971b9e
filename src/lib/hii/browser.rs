// Copyright 2023 Meta Platforms, Inc. and affiliates.
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Selection + callback loop (spec §4.8) and goto protocol (spec §4.9).

use std::collections::HashMap;
use std::collections::HashSet;

use log::debug;
use thiserror::Error;

use crate::hii::eval::evaluate_predicate;
use crate::hii::eval::Matcher;
use crate::hii::eval::StorageAccess;
use crate::hii::model::FormSet;
use crate::hii::model::Guid;
use crate::hii::model::Predicate;
use crate::hii::model::Statement;
use crate::hii::model::StatementId;
use crate::hii::model::TypedValue;

macro_rules! bitflags_state {
    (
        $(#[$outer:meta])*
        pub struct $name:ident: $int:ty {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name($int);

        impl $name {
            $(pub const $flag: $name = $name($value);)*

            pub fn contains(self, other: $name) -> bool {
                (self.0 & other.0) == other.0 && other.0 != 0
            }

            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

bitflags_state! {
    /// Callback return actions, composable per spec §4.8's action matrix.
    pub struct CallbackAction: u16 {
        const DISCARD = 0x0001;
        const DEFAULT = 0x0002;
        const SUBMIT = 0x0004;
        const RESET = 0x0008;
        const EXIT = 0x0010;
        const RECONNECT = 0x0020;
        const FORM_OPEN = 0x0040;
        const FORM_CLOSE = 0x0080;
        const RETRIEVE = 0x0100;
    }
}

/// Scope a callback action applies at, chosen by the callback itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionScope {
    Question,
    Form,
    FormSet,
    System,
}

/// One browser input event routed to a registered form callback.
#[derive(Debug, Clone, Copy)]
pub enum CallbackEvent {
    Changing(StatementId),
    Changed(StatementId),
    ActionChanging(StatementId),
}

/// What a callback invocation produced: either an action to apply, or a
/// request to restart form-set parsing because the HII database changed
/// out from under the loop (spec §9: never re-enters the parser from
/// inside the callback's own call stack).
#[derive(Debug, Clone, Copy)]
pub enum CallbackOutcome {
    Actions { action: CallbackAction, scope: ActionScope, default_id: Option<u16> },
    ReparseRequested,
}

/// Registered per form-set; fired from [`Browser::edit`] (`CHANGING`/
/// `CHANGED`) and from `ACTION`-statement confirm handling (`ACTION_CHANGING`).
pub trait BrowserCallback {
    fn invoke(&mut self, event: CallbackEvent) -> CallbackOutcome;
}

/// No-op callback for form-sets that register none.
pub struct NoCallback;

impl BrowserCallback for NoCallback {
    fn invoke(&mut self, _event: CallbackEvent) -> CallbackOutcome {
        CallbackOutcome::Actions { action: CallbackAction::default(), scope: ActionScope::Question, default_id: None }
    }
}

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("unknown statement id")]
    UnknownStatement,
    #[error("statement has no question header to edit")]
    NotEditable,
    #[error("goto target form {0} not found in current form-set")]
    FormNotFound(u16),
    #[error("goto cancelled: unsaved edits")]
    GotoCancelled,
}

/// What the user chooses when a cross-form-set goto would discard pending
/// edits (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptDecision {
    Discard,
    Submit,
    Cancel,
}

/// Supplies the discard/submit/cancel decision for unsaved edits blocking a
/// goto. The CLI's interactive prompt and a test's canned answer both
/// implement this.
pub trait UnsavedEditsPrompt {
    fn decide(&mut self) -> PromptDecision;
}

/// One statement filtered into a display form, with its evaluated
/// suppress/gray-out/disabled state resolved (spec §4.8).
#[derive(Debug, Clone)]
pub struct DisplayStatement {
    pub id: StatementId,
    pub gray_out: bool,
}

/// The result of "assemble the display form": statements with a `True`
/// suppress predicate are dropped entirely; the rest carry their resolved
/// gray-out/disabled bits for the renderer.
#[derive(Debug, Clone, Default)]
pub struct DisplayForm {
    pub statements: Vec<DisplayStatement>,
}

/// Resolves a `REF` statement's device-path + form-set-GUID pair to a
/// different form-set's parsed tree, for cross-form-set gotos (spec §4.9
/// cases 1 and 2). The CLI wires this to whatever loaded the other
/// form-set's package; tests can stub it with an empty map.
pub trait ForeignFormSetResolver {
    fn resolve(&self, device_path_string_id: u16, form_set_guid: Guid) -> Option<FormSet>;
}

/// One resolved goto destination, either within the current form-set or in
/// a freshly resolved foreign one.
pub enum GotoTarget {
    Local { form_id: u16, question_id: u16 },
    Foreign { form_set: FormSet, form_id: u16, question_id: u16 },
}

/// One in-progress form-set navigation: the parsed tree, which form is
/// current, per-form highlighted-question memory, and the edit-buffer
/// overlay (spec §3 "current value" vs "edit buffer" distinction, §9).
pub struct Browser {
    pub formset: FormSet,
    pub current_form_id: u16,
    highlighted: HashMap<u16, StatementId>,
    edit_buffer: HashMap<u32, TypedValue>,
    changed: HashSet<u32>,
    pub reset_required: bool,
    pub reconnect_required: bool,
}

impl Browser {
    pub fn new(formset: FormSet, current_form_id: u16) -> Self {
        Browser {
            formset,
            current_form_id,
            highlighted: HashMap::new(),
            edit_buffer: HashMap::new(),
            changed: HashSet::new(),
            reset_required: false,
            reconnect_required: false,
        }
    }

    pub fn has_unsaved_edits(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Evaluates per-form expressions and filters grayed/suppressed/disabled
    /// statements (spec §4.8, first action of the loop iteration).
    pub fn assemble_display_form(
        &self,
        storage: &mut impl StorageAccess,
        matcher: &impl Matcher,
    ) -> Result<DisplayForm, BrowserError> {
        let form = self
            .formset
            .forms
            .iter()
            .find(|f| f.form_id == self.current_form_id)
            .ok_or(BrowserError::FormNotFound(self.current_form_id))?;

        let mut display = DisplayForm::default();
        for &stmt_id in &form.statements {
            let statement = self.formset.statement(stmt_id);
            if statement.disabled {
                continue;
            }
            if self.predicate_any_true(&statement.suppress_if, storage, matcher) {
                continue;
            }
            let gray_out = self.predicate_any_true(&statement.gray_out_if, storage, matcher);
            display.statements.push(DisplayStatement { id: stmt_id, gray_out });
        }
        Ok(display)
    }

    fn predicate_any_true(
        &self,
        exprs: &[crate::hii::model::ExpressionId],
        storage: &mut impl StorageAccess,
        matcher: &impl Matcher,
    ) -> bool {
        exprs.iter().any(|&id| {
            let expr = self.formset.expression(id);
            matches!(
                evaluate_predicate(expr, &self.formset, &TypedValue::Undefined, storage, matcher),
                Predicate::True
            )
        })
    }

    /// Updates the cached highlighted question for the current form.
    pub fn navigate(&mut self, question_id_statement: StatementId) {
        self.highlighted.insert(self.current_form_id, question_id_statement);
    }

    pub fn highlighted(&self) -> Option<StatementId> {
        self.highlighted.get(&self.current_form_id).copied()
    }

    /// Writes a new value into the edit buffer (never the active buffer),
    /// runs the CHANGING/CHANGED callback pair, and marks the statement
    /// changed (spec §4.8).
    pub fn edit(
        &mut self,
        statement_id: StatementId,
        new_value: TypedValue,
        callback: &mut impl BrowserCallback,
    ) -> Result<CallbackOutcome, BrowserError> {
        let statement = self.statement_checked(statement_id)?;
        if statement.question_header().is_none() {
            return Err(BrowserError::NotEditable);
        }
        let outcome = callback.invoke(CallbackEvent::Changing(statement_id));
        if matches!(outcome, CallbackOutcome::ReparseRequested) {
            return Ok(outcome);
        }
        self.edit_buffer.insert(statement_id.0, new_value);
        self.changed.insert(statement_id.0);
        let outcome = callback.invoke(CallbackEvent::Changed(statement_id));
        Ok(outcome)
    }

    fn statement_checked(&self, id: StatementId) -> Result<&Statement, BrowserError> {
        self.formset.statements.get(id.0 as usize).ok_or(BrowserError::UnknownStatement)
    }

    /// Applies one callback's action bits against the edit/active buffers
    /// and the browser's latched reset/reconnect flags (spec §4.8's action
    /// matrix). `storage` is the active buffer; `statement_id` selects the
    /// affected value when `scope` is [`ActionScope::Question`].
    pub fn apply_action(
        &mut self,
        action: CallbackAction,
        scope: ActionScope,
        statement_id: Option<StatementId>,
        storage: &mut impl StorageAccess,
        var_store_id: u16,
        offset: u16,
        width: u8,
    ) {
        if action.contains(CallbackAction::DISCARD) {
            self.discard_edits(scope, statement_id);
        }
        if action.contains(CallbackAction::DEFAULT) {
            debug!("DEFAULT action requested at scope {:?}", scope);
        }
        if action.contains(CallbackAction::SUBMIT) {
            self.submit_edits(scope, statement_id, storage, var_store_id, offset, width);
        }
        if action.contains(CallbackAction::RESET) {
            self.reset_required = true;
        }
        if action.contains(CallbackAction::RECONNECT) {
            self.reconnect_required = true;
        }
    }

    fn discard_edits(&mut self, scope: ActionScope, statement_id: Option<StatementId>) {
        match scope {
            ActionScope::Question => {
                if let Some(id) = statement_id {
                    self.edit_buffer.remove(&id.0);
                    self.changed.remove(&id.0);
                }
            }
            ActionScope::Form | ActionScope::FormSet | ActionScope::System => {
                self.edit_buffer.clear();
                self.changed.clear();
            }
        }
    }

    fn submit_edits(
        &mut self,
        scope: ActionScope,
        statement_id: Option<StatementId>,
        storage: &mut impl StorageAccess,
        var_store_id: u16,
        offset: u16,
        width: u8,
    ) {
        match scope {
            ActionScope::Question => {
                if let Some(id) = statement_id {
                    if let Some(v) = self.edit_buffer.remove(&id.0) {
                        storage.set(var_store_id, offset, width, &v);
                        self.changed.remove(&id.0);
                    }
                }
            }
            ActionScope::Form | ActionScope::FormSet | ActionScope::System => {
                for (stmt_id, value) in self.edit_buffer.drain() {
                    let _ = stmt_id;
                    storage.set(var_store_id, offset, width, &value);
                }
                self.changed.clear();
            }
        }
    }

    /// Decides and executes the goto protocol for a `REF` statement (spec
    /// §4.9). Prompts on unsaved edits only when a cross-form-set
    /// transition is actually taken.
    pub fn goto(
        &mut self,
        device_path_string_id: u16,
        form_set_guid: Guid,
        form_id: u16,
        question_id: u16,
        resolver: &impl ForeignFormSetResolver,
        prompt: &mut impl UnsavedEditsPrompt,
    ) -> Result<GotoTarget, BrowserError> {
        let zero_guid = Guid { data1: 0, data2: 0, data3: 0, data4: [0; 8] };
        let crosses_form_set = device_path_string_id != 0 || form_set_guid != zero_guid;

        if crosses_form_set && self.has_unsaved_edits() {
            match prompt.decide() {
                PromptDecision::Cancel => return Err(BrowserError::GotoCancelled),
                PromptDecision::Discard => self.discard_edits(ActionScope::FormSet, None),
                PromptDecision::Submit => {
                    self.changed.clear();
                    self.edit_buffer.clear();
                }
            }
        }

        if device_path_string_id != 0 {
            // Case 1: foreign device path, resolve to a foreign HII handle.
            let form_set = resolver
                .resolve(device_path_string_id, form_set_guid)
                .ok_or(BrowserError::FormNotFound(form_id))?;
            return Ok(GotoTarget::Foreign { form_set, form_id, question_id });
        }
        if form_set_guid != zero_guid {
            // Case 2: same device, different form-set by GUID.
            let form_set = resolver
                .resolve(0, form_set_guid)
                .ok_or(BrowserError::FormNotFound(form_id))?;
            return Ok(GotoTarget::Foreign { form_set, form_id, question_id });
        }
        // Case 3: local goto within the current form-set.
        if !self.formset.forms.iter().any(|f| f.form_id == form_id) {
            return Err(BrowserError::FormNotFound(form_id));
        }
        self.current_form_id = form_id;
        Ok(GotoTarget::Local { form_id, question_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hii::eval::NoMatcher;
    use crate::hii::model::Form;
    use crate::hii::model::QuestionHeader;
    use crate::hii::model::StatementKind;

    struct FakeStorage(u64);
    impl StorageAccess for FakeStorage {
        fn get(&self, _v: u16, _o: u16, _w: u8) -> TypedValue {
            TypedValue::U64(self.0)
        }
        fn set(&mut self, _v: u16, _o: u16, _w: u8, value: &TypedValue) {
            self.0 = value.as_u64().unwrap_or(0);
        }
        fn question_value(&self, _q: u16) -> TypedValue {
            TypedValue::U64(self.0)
        }
    }

    struct AlwaysCancel;
    impl UnsavedEditsPrompt for AlwaysCancel {
        fn decide(&mut self) -> PromptDecision {
            PromptDecision::Cancel
        }
    }

    struct NoForeignFormSets;
    impl ForeignFormSetResolver for NoForeignFormSets {
        fn resolve(&self, _d: u16, _g: Guid) -> Option<FormSet> {
            None
        }
    }

    fn header(question_id: u16) -> QuestionHeader {
        QuestionHeader { prompt_string_id: 0, help_string_id: 0, question_id, var_store_id: 1, var_store_info: 0, question_flags: 0 }
    }

    fn sample_formset() -> FormSet {
        let mut formset = FormSet::default();
        let stmt = Statement {
            kind: StatementKind::Numeric { header: header(1), range: crate::hii::model::RangeData { min: 0, max: 10, step: 1, width: 1 } },
            suppress_if: Vec::new(),
            gray_out_if: Vec::new(),
            disabled: false,
            defaults: Vec::new(),
        };
        formset.statements.push(stmt);
        formset.forms.push(Form { form_id: 1, title_string_id: 0, statements: vec![StatementId(0)], suppress_if: Vec::new() });
        formset.forms.push(Form { form_id: 2, title_string_id: 0, statements: Vec::new(), suppress_if: Vec::new() });
        formset
    }

    #[test]
    fn display_form_includes_non_suppressed_statements() {
        let browser = Browser::new(sample_formset(), 1);
        let mut storage = FakeStorage(0);
        let display = browser.assemble_display_form(&mut storage, &NoMatcher).unwrap();
        assert_eq!(display.statements.len(), 1);
    }

    #[test]
    fn editing_marks_statement_changed() {
        let mut browser = Browser::new(sample_formset(), 1);
        let mut cb = NoCallback;
        browser.edit(StatementId(0), TypedValue::U64(5), &mut cb).unwrap();
        assert!(browser.has_unsaved_edits());
    }

    #[test]
    fn submit_action_commits_edit_buffer_to_storage() {
        let mut browser = Browser::new(sample_formset(), 1);
        let mut cb = NoCallback;
        browser.edit(StatementId(0), TypedValue::U64(7), &mut cb).unwrap();
        let mut storage = FakeStorage(0);
        browser.apply_action(CallbackAction::SUBMIT, ActionScope::Question, Some(StatementId(0)), &mut storage, 1, 0, 1);
        assert_eq!(storage.0, 7);
        assert!(!browser.has_unsaved_edits());
    }

    #[test]
    fn local_goto_switches_current_form() {
        let mut browser = Browser::new(sample_formset(), 1);
        let zero_guid = Guid { data1: 0, data2: 0, data3: 0, data4: [0; 8] };
        let mut prompt = AlwaysCancel;
        let target = browser.goto(0, zero_guid, 2, 0, &NoForeignFormSets, &mut prompt).unwrap();
        assert!(matches!(target, GotoTarget::Local { form_id: 2, .. }));
        assert_eq!(browser.current_form_id, 2);
    }

    #[test]
    fn cross_form_set_goto_with_unsaved_edits_can_be_cancelled() {
        let mut browser = Browser::new(sample_formset(), 1);
        let mut cb = NoCallback;
        browser.edit(StatementId(0), TypedValue::U64(9), &mut cb).unwrap();
        let guid = Guid { data1: 1, data2: 0, data3: 0, data4: [0; 8] };
        let mut prompt = AlwaysCancel;
        let result = browser.goto(0, guid, 1, 0, &NoForeignFormSets, &mut prompt);
        assert!(matches!(result, Err(BrowserError::GotoCancelled)));
    }
}
