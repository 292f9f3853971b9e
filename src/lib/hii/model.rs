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

//! Parsed form-set model: an arena of statements/expressions addressed by
//! index, rather than the `Rc<RefCell<_>>`/`Weak` tree the opcode stream
//! would suggest (see the arena decision in DESIGN.md).

use std::collections::HashMap;
use std::fmt;

use binrw::BinRead;

/// A 128-bit GUID as used throughout the HII database (credited to
/// LongSoft/IFRExtractor-RS for the field layout and display format).
#[derive(BinRead, Clone, Copy, PartialEq, Eq, Hash)]
#[br(little)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7],
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);
    };
}

arena_id!(StatementId);
arena_id!(ExpressionId);
arena_id!(FormId);
arena_id!(StorageId);

/// A tagged value as produced by the expression evaluator or read from storage.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Buffer(Vec<u8>),
    StringId(u16),
    Undefined,
}

impl TypedValue {
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            TypedValue::Bool(b) => Some(b as u64),
            TypedValue::U8(v) => Some(v as u64),
            TypedValue::U16(v) => Some(v as u64),
            TypedValue::U32(v) => Some(v as u64),
            TypedValue::U64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Bool(b) => Some(*b),
            _ => self.as_u64().map(|v| v != 0),
        }
    }
}

/// Three-state predicate used for suppress/grayout evaluation (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    False,
    True,
    Disabled,
}

/// A single node of a postfix expression list. `MAP` references sublists by
/// index into the owning form-set's expression arena rather than nesting
/// inline, so the evaluator's value stack stays flat (spec §4.7, §9).
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionOp {
    Constant(TypedValue),
    This,
    Zero,
    One,
    Ones,
    Undefined,
    QuestionRef1(u16),
    Get { var_store_id: u16, offset: u16, width: u8 },
    Set { var_store_id: u16, offset: u16, width: u8 },
    Not,
    And,
    Or,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    BitwiseAnd,
    BitwiseOr,
    BitwiseNot,
    ShiftLeft,
    ShiftRight,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    ToUint,
    ToBoolean,
    ToString,
    ToUpper,
    ToLower,
    Length,
    Catenate,
    Mid,
    Find,
    Span,
    Version,
    /// Matcher name is a caller-defined tag resolved by a supplied matcher
    /// (spec §4.7: no regex engine in scope).
    Match { syntax_guid: Guid, pattern_string_id: u16 },
    Match2 { syntax_guid: Guid, pattern_string_id: u16 },
    /// Each arm is (condition expression, result expression).
    Map(Vec<(ExpressionId, ExpressionId)>),
}

pub type Expression = Vec<ExpressionOp>;

/// Where a question's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Buffer,
    EfiVariable,
    EfiVariableBuffer,
    NameValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storage {
    pub var_store_id: u16,
    pub kind: StorageKind,
    pub name: String,
    pub guid: Guid,
    pub size: u16,
    /// Back-reference to the owning HII handle; part of the uniquing key
    /// for name-value and buffer stores (spec §3).
    pub hii_handle: u32,
}

/// The uniquing key from §3: each storage kind compares a different subset
/// of (guid, name, hii-handle) -- variable stores dedup on name alone
/// within a guid, name-value stores ignore the name entirely, and buffer
/// stores require all three to match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageKey {
    NameValue(Guid, u32),
    Variable(Guid, String),
    Buffer(Guid, String, u32),
}

impl Storage {
    pub fn unique_key(&self) -> StorageKey {
        match self.kind {
            StorageKind::NameValue => StorageKey::NameValue(self.guid, self.hii_handle),
            StorageKind::EfiVariable | StorageKind::EfiVariableBuffer => {
                StorageKey::Variable(self.guid, self.name.clone())
            }
            StorageKind::Buffer => {
                StorageKey::Buffer(self.guid, self.name.clone(), self.hii_handle)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionHeader {
    pub prompt_string_id: u16,
    pub help_string_id: u16,
    pub question_id: u16,
    pub var_store_id: u16,
    pub var_store_info: u16,
    pub question_flags: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeData {
    pub min: u64,
    pub max: u64,
    pub step: u64,
    pub width: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Subtitle { prompt_string_id: u16 },
    Text { prompt_string_id: u16, help_string_id: u16, text_two_string_id: u16 },
    OneOf { header: QuestionHeader, range: RangeData, options: Vec<StatementId> },
    OneOfOption { option_string_id: u16, flags: u8, value: TypedValue },
    Numeric { header: QuestionHeader, range: RangeData },
    CheckBox { header: QuestionHeader, flags: u8 },
    OrderedList { header: QuestionHeader, max_entries: u8, options: Vec<StatementId> },
    StringStatement { header: QuestionHeader, min_size: u8, max_size: u8 },
    Password { header: QuestionHeader, min_size: u8, max_size: u8 },
    Date { header: QuestionHeader },
    Time { header: QuestionHeader },
    Ref { header: QuestionHeader, form_id: u16, question_id: u16, form_set_guid: Option<Guid>, device_path_string_id: u16 },
    Action { header: QuestionHeader, config_string_id: u16 },
    ResetButton { header: QuestionHeader, default_id: u16 },
}

#[derive(Debug, Clone)]
pub struct Statement {
    pub kind: StatementKind,
    /// Snapshot of the enclosing conditional stack at parse time (spec §4.6).
    pub suppress_if: Vec<ExpressionId>,
    pub gray_out_if: Vec<ExpressionId>,
    pub disabled: bool,
    pub defaults: Vec<(u16, TypedValue)>,
}

impl Statement {
    pub fn question_header(&self) -> Option<QuestionHeader> {
        use StatementKind::*;
        match &self.kind {
            OneOf { header, .. }
            | Numeric { header, .. }
            | CheckBox { header, .. }
            | OrderedList { header, .. }
            | StringStatement { header, .. }
            | Password { header, .. }
            | Date { header }
            | Time { header }
            | Ref { header, .. }
            | Action { header, .. }
            | ResetButton { header, .. } => Some(*header),
            Subtitle { .. } | Text { .. } | OneOfOption { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Form {
    pub form_id: u16,
    pub title_string_id: u16,
    pub statements: Vec<StatementId>,
    pub suppress_if: Vec<ExpressionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DefaultStoreEntry {
    pub default_id: u16,
    pub name_string_id: u16,
}

/// One parsed form-set, owning the statement and expression arenas referenced
/// by [`StatementId`]/[`ExpressionId`] (spec §9 arena decision).
#[derive(Debug, Clone, Default)]
pub struct FormSet {
    pub guid: Guid,
    pub title_string_id: u16,
    pub help_string_id: u16,
    pub class_guid: Guid,
    pub forms: Vec<Form>,
    pub default_stores: Vec<DefaultStoreEntry>,
    pub storages: Vec<Storage>,
    pub statements: Vec<Statement>,
    pub expressions: Vec<Expression>,
}

impl FormSet {
    pub fn statement(&self, id: StatementId) -> &Statement {
        &self.statements[id.0 as usize]
    }

    pub fn statement_mut(&mut self, id: StatementId) -> &mut Statement {
        &mut self.statements[id.0 as usize]
    }

    pub fn expression(&self, id: ExpressionId) -> &Expression {
        &self.expressions[id.0 as usize]
    }

    pub fn form(&self, id: FormId) -> &Form {
        &self.forms[id.0 as usize]
    }

    pub fn storage_by_id(&self, var_store_id: u16) -> Option<&Storage> {
        self.storages.iter().find(|s| s.var_store_id == var_store_id)
    }

    pub fn find_question(&self, question_id: u16) -> Option<(StatementId, &Statement)> {
        self.statements.iter().enumerate().find_map(|(idx, s)| {
            s.question_header()
                .filter(|h| h.question_id == question_id)
                .map(|_| (StatementId(idx as u32), s))
        })
    }
}

/// Default-store discipline used when a `DEFAULTSTORE` opcode registers a
/// new entry: keep the list sorted by ascending default id (spec §4.6).
pub fn insert_default_store_sorted(stores: &mut Vec<DefaultStoreEntry>, entry: DefaultStoreEntry) {
    let pos = stores
        .binary_search_by_key(&entry.default_id, |e| e.default_id)
        .unwrap_or_else(|pos| pos);
    stores.insert(pos, entry);
}

pub type StringTable = HashMap<u16, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guid_formats_like_a_standard_guid_string() {
        let g = Guid {
            data1: 0x01234567,
            data2: 0x89AB,
            data3: 0xCDEF,
            data4: [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF],
        };
        assert_eq!(format!("{}", g), "01234567-89AB-CDEF-0123-456789ABCDEF");
    }

    #[test]
    fn default_stores_stay_sorted_by_id() {
        let mut stores = Vec::new();
        insert_default_store_sorted(&mut stores, DefaultStoreEntry { default_id: 5, name_string_id: 1 });
        insert_default_store_sorted(&mut stores, DefaultStoreEntry { default_id: 0, name_string_id: 2 });
        insert_default_store_sorted(&mut stores, DefaultStoreEntry { default_id: 2, name_string_id: 3 });
        assert_eq!(
            stores.iter().map(|e| e.default_id).collect::<Vec<_>>(),
            vec![0, 2, 5]
        );
    }
}
