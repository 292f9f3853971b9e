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

//! IFR opcode tags (UEFI Spec v2.9 pages 1840-1916).

use binrw::BinRead;

#[derive(BinRead, Debug, PartialEq, Eq, Copy, Clone, Hash)]
#[br(little)]
pub enum IFROpCode {
    #[br(magic = 0x01u8)]
    Form,
    #[br(magic = 0x02u8)]
    Subtitle,
    #[br(magic = 0x03u8)]
    Text,
    #[br(magic = 0x04u8)]
    Image,
    #[br(magic = 0x05u8)]
    OneOf,
    #[br(magic = 0x06u8)]
    CheckBox,
    #[br(magic = 0x07u8)]
    Numeric,
    #[br(magic = 0x08u8)]
    Password,
    #[br(magic = 0x09u8)]
    OneOfOption,
    #[br(magic = 0x0Au8)]
    SuppressIf,
    #[br(magic = 0x0Bu8)]
    Locked,
    #[br(magic = 0x0Cu8)]
    Action,
    #[br(magic = 0x0Du8)]
    ResetButton,
    #[br(magic = 0x0Eu8)]
    FormSet,
    #[br(magic = 0x0Fu8)]
    Ref,
    #[br(magic = 0x10u8)]
    NoSubmitIf,
    #[br(magic = 0x11u8)]
    InconsistentIf,
    #[br(magic = 0x12u8)]
    EqIdVal,
    #[br(magic = 0x13u8)]
    EqIdId,
    #[br(magic = 0x14u8)]
    EqIdValList,
    #[br(magic = 0x15u8)]
    And,
    #[br(magic = 0x16u8)]
    Or,
    #[br(magic = 0x17u8)]
    Not,
    #[br(magic = 0x18u8)]
    Rule,
    #[br(magic = 0x19u8)]
    GrayOutIf,
    #[br(magic = 0x1Au8)]
    Date,
    #[br(magic = 0x1Bu8)]
    Time,
    #[br(magic = 0x1Cu8)]
    String,
    #[br(magic = 0x1Du8)]
    Refresh,
    #[br(magic = 0x1Eu8)]
    DisableIf,
    #[br(magic = 0x1Fu8)]
    Animation,
    #[br(magic = 0x20u8)]
    ToLower,
    #[br(magic = 0x21u8)]
    ToUpper,
    #[br(magic = 0x22u8)]
    Map,
    #[br(magic = 0x23u8)]
    OrderedList,
    #[br(magic = 0x24u8)]
    VarStore,
    #[br(magic = 0x25u8)]
    VarStoreNameValue,
    #[br(magic = 0x26u8)]
    VarStoreEfi,
    #[br(magic = 0x27u8)]
    VarStoreDevice,
    #[br(magic = 0x28u8)]
    Version,
    #[br(magic = 0x29u8)]
    End,
    #[br(magic = 0x2Au8)]
    Match,
    #[br(magic = 0x2Bu8)]
    Get,
    #[br(magic = 0x2Cu8)]
    Set,
    #[br(magic = 0x2Du8)]
    Read,
    #[br(magic = 0x2Eu8)]
    Write,
    #[br(magic = 0x2Fu8)]
    Equal,
    #[br(magic = 0x30u8)]
    NotEqual,
    #[br(magic = 0x31u8)]
    GreaterThan,
    #[br(magic = 0x32u8)]
    GreaterEqual,
    #[br(magic = 0x33u8)]
    LessThan,
    #[br(magic = 0x34u8)]
    LessEqual,
    #[br(magic = 0x35u8)]
    BitwiseAnd,
    #[br(magic = 0x36u8)]
    BitwiseOr,
    #[br(magic = 0x37u8)]
    BitwiseNot,
    #[br(magic = 0x38u8)]
    ShiftLeft,
    #[br(magic = 0x39u8)]
    ShiftRight,
    #[br(magic = 0x3Au8)]
    Add,
    #[br(magic = 0x3Bu8)]
    Subtract,
    #[br(magic = 0x3Cu8)]
    Multiply,
    #[br(magic = 0x3Du8)]
    Divide,
    #[br(magic = 0x3Eu8)]
    Modulo,
    #[br(magic = 0x3Fu8)]
    RuleRef,
    #[br(magic = 0x40u8)]
    QuestionRef1,
    #[br(magic = 0x41u8)]
    QuestionRef2,
    #[br(magic = 0x42u8)]
    Uint8,
    #[br(magic = 0x43u8)]
    Uint16,
    #[br(magic = 0x44u8)]
    Uint32,
    #[br(magic = 0x45u8)]
    Uint64,
    #[br(magic = 0x46u8)]
    True,
    #[br(magic = 0x47u8)]
    False,
    #[br(magic = 0x48u8)]
    ToUint,
    #[br(magic = 0x49u8)]
    ToString,
    #[br(magic = 0x4Au8)]
    ToBoolean,
    #[br(magic = 0x4Bu8)]
    Mid,
    #[br(magic = 0x4Cu8)]
    Find,
    #[br(magic = 0x4Du8)]
    Token,
    #[br(magic = 0x4Eu8)]
    StringRef1,
    #[br(magic = 0x4Fu8)]
    StringRef2,
    #[br(magic = 0x50u8)]
    Conditional,
    #[br(magic = 0x51u8)]
    QuestionRef3,
    #[br(magic = 0x52u8)]
    Zero,
    #[br(magic = 0x53u8)]
    One,
    #[br(magic = 0x54u8)]
    Ones,
    #[br(magic = 0x55u8)]
    Undefined,
    #[br(magic = 0x56u8)]
    Length,
    #[br(magic = 0x57u8)]
    Dup,
    #[br(magic = 0x58u8)]
    This,
    #[br(magic = 0x59u8)]
    Span,
    #[br(magic = 0x5Au8)]
    Value,
    #[br(magic = 0x5Bu8)]
    Default,
    #[br(magic = 0x5Cu8)]
    DefaultStore,
    #[br(magic = 0x5Du8)]
    FormMap,
    #[br(magic = 0x5Eu8)]
    Catenate,
    #[br(magic = 0x5Fu8)]
    Guid,
    #[br(magic = 0x60u8)]
    Security,
    #[br(magic = 0x61u8)]
    ModalTag,
    #[br(magic = 0x62u8)]
    RefreshId,
    #[br(magic = 0x63u8)]
    WarningIf,
    #[br(magic = 0x64u8)]
    Match2,
    Unknown(u8),
}

impl IFROpCode {
    /// Direct byte-to-tag decode for a single opcode byte already held in
    /// memory (the parser reads headers off a slice rather than a
    /// `binrw` reader, so the `#[br(magic = ...)]` table above isn't used
    /// for decoding -- only kept as spec documentation on each variant).
    pub fn from_byte(b: u8) -> IFROpCode {
        use IFROpCode::*;
        match b {
            0x01 => Form,
            0x02 => Subtitle,
            0x03 => Text,
            0x04 => Image,
            0x05 => OneOf,
            0x06 => CheckBox,
            0x07 => Numeric,
            0x08 => Password,
            0x09 => OneOfOption,
            0x0A => SuppressIf,
            0x0B => Locked,
            0x0C => Action,
            0x0D => ResetButton,
            0x0E => FormSet,
            0x0F => Ref,
            0x10 => NoSubmitIf,
            0x11 => InconsistentIf,
            0x12 => EqIdVal,
            0x13 => EqIdId,
            0x14 => EqIdValList,
            0x15 => And,
            0x16 => Or,
            0x17 => Not,
            0x18 => Rule,
            0x19 => GrayOutIf,
            0x1A => Date,
            0x1B => Time,
            0x1C => String,
            0x1D => Refresh,
            0x1E => DisableIf,
            0x1F => Animation,
            0x20 => ToLower,
            0x21 => ToUpper,
            0x22 => Map,
            0x23 => OrderedList,
            0x24 => VarStore,
            0x25 => VarStoreNameValue,
            0x26 => VarStoreEfi,
            0x27 => VarStoreDevice,
            0x28 => Version,
            0x29 => End,
            0x2A => Match,
            0x2B => Get,
            0x2C => Set,
            0x2D => Read,
            0x2E => Write,
            0x2F => Equal,
            0x30 => NotEqual,
            0x31 => GreaterThan,
            0x32 => GreaterEqual,
            0x33 => LessThan,
            0x34 => LessEqual,
            0x35 => BitwiseAnd,
            0x36 => BitwiseOr,
            0x37 => BitwiseNot,
            0x38 => ShiftLeft,
            0x39 => ShiftRight,
            0x3A => Add,
            0x3B => Subtract,
            0x3C => Multiply,
            0x3D => Divide,
            0x3E => Modulo,
            0x3F => RuleRef,
            0x40 => QuestionRef1,
            0x41 => QuestionRef2,
            0x42 => Uint8,
            0x43 => Uint16,
            0x44 => Uint32,
            0x45 => Uint64,
            0x46 => True,
            0x47 => False,
            0x48 => ToUint,
            0x49 => ToString,
            0x4A => ToBoolean,
            0x4B => Mid,
            0x4C => Find,
            0x4D => Token,
            0x4E => StringRef1,
            0x4F => StringRef2,
            0x50 => Conditional,
            0x51 => QuestionRef3,
            0x52 => Zero,
            0x53 => One,
            0x54 => Ones,
            0x55 => Undefined,
            0x56 => Length,
            0x57 => Dup,
            0x58 => This,
            0x59 => Span,
            0x5A => Value,
            0x5B => Default,
            0x5C => DefaultStore,
            0x5D => FormMap,
            0x5E => Catenate,
            0x5F => Guid,
            0x60 => Security,
            0x61 => ModalTag,
            0x62 => RefreshId,
            0x63 => WarningIf,
            0x64 => Match2,
            other => Unknown(other),
        }
    }

    pub fn is_expression(self) -> bool {
        use IFROpCode::*;
        matches!(
            self,
            And | Or
                | Not
                | Equal
                | NotEqual
                | GreaterThan
                | GreaterEqual
                | LessThan
                | LessEqual
                | BitwiseAnd
                | BitwiseOr
                | BitwiseNot
                | ShiftLeft
                | ShiftRight
                | Add
                | Subtract
                | Multiply
                | Divide
                | Modulo
                | RuleRef
                | QuestionRef1
                | QuestionRef2
                | QuestionRef3
                | Uint8
                | Uint16
                | Uint32
                | Uint64
                | True
                | False
                | ToUint
                | ToString
                | ToBoolean
                | ToLower
                | ToUpper
                | Mid
                | Find
                | Token
                | StringRef1
                | StringRef2
                | Conditional
                | Zero
                | One
                | Ones
                | Undefined
                | Length
                | Dup
                | This
                | Span
                | Value
                | Catenate
                | Match
                | Match2
                | Get
                | Set
                | Version
                | Security
                | Map
        )
    }

    /// Opcodes that open a scope closed by a matching `END`.
    pub fn opens_scope_by_default(self) -> bool {
        use IFROpCode::*;
        matches!(
            self,
            FormSet
                | Form
                | FormMap
                | OneOf
                | OrderedList
                | SuppressIf
                | GrayOutIf
                | DisableIf
                | NoSubmitIf
                | InconsistentIf
                | Rule
                | And
                | Or
                | Not
                | Map
                | VarStoreDevice
                | Locked
                | ModalTag
        )
    }
}
