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

//! Postfix expression evaluator walking an [`Expression`] node list left to
//! right over a reused [`Vec<TypedValue>`] stack (spec §4.7, §9).

use thiserror::Error;

use crate::hii::model::Expression;
use crate::hii::model::ExpressionId;
use crate::hii::model::ExpressionOp;
use crate::hii::model::FormSet;
use crate::hii::model::Guid;
use crate::hii::model::Predicate;
use crate::hii::model::TypedValue;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("expression stack underflow")]
    StackUnderflow,
    #[error("expression left more than one value on the stack")]
    TrailingValues,
    #[error("empty expression")]
    Empty,
}

/// Resolves storage reads/writes for `QUESTIONREF1`/`GET`/`SET`. The
/// question-id based `QUESTIONREF1` is resolved by looking up that
/// question's own storage binding; `GET`/`SET` address storage directly.
pub trait StorageAccess {
    fn get(&self, var_store_id: u16, offset: u16, width: u8) -> TypedValue;
    fn set(&mut self, var_store_id: u16, offset: u16, width: u8, value: &TypedValue);
    fn question_value(&self, question_id: u16) -> TypedValue;
}

/// Resolves `MATCH`/`MATCH2` against a caller-defined syntax, since no regex
/// engine is in scope here (spec §4.7).
pub trait Matcher {
    fn is_match(&self, syntax_guid: Guid, pattern_string_id: u16, subject: &TypedValue) -> bool;
}

/// No-op matcher for contexts that never see `MATCH`/`MATCH2` (e.g. unit
/// tests exercising only arithmetic/logical opcodes).
pub struct NoMatcher;

impl Matcher for NoMatcher {
    fn is_match(&self, _syntax_guid: Guid, _pattern_string_id: u16, _subject: &TypedValue) -> bool {
        false
    }
}

const SPEC_VERSION: u64 = 0x0209; // UEFI Spec v2.9, per the VERSION opcode contract.

/// Evaluates `expr` against `formset` (for `MAP` sub-expression lookups),
/// the enclosing question's value (`this_value`, for `THIS`), a storage
/// backend, and a matcher. Returns [`EvalError::Empty`] for an empty
/// expression list rather than panicking, since a malformed or
/// not-yet-understood opcode run should degrade to "undefined" at the
/// call site, not abort evaluation of the whole form.
pub fn evaluate(
    expr: &Expression,
    formset: &FormSet,
    this_value: &TypedValue,
    storage: &mut impl StorageAccess,
    matcher: &impl Matcher,
) -> Result<TypedValue, EvalError> {
    if expr.is_empty() {
        return Err(EvalError::Empty);
    }
    let mut stack: Vec<TypedValue> = Vec::with_capacity(expr.len());
    for op in expr {
        eval_one(op, formset, this_value, storage, matcher, &mut stack)?;
    }
    if stack.len() != 1 {
        return Err(EvalError::TrailingValues);
    }
    Ok(stack.pop().unwrap())
}

/// Like [`evaluate`] but collapses any failure or non-boolean result to
/// [`Predicate::Disabled`], matching how `DISABLE_IF`/`SUPPRESS_IF` treat an
/// expression the evaluator can't resolve (spec §4.7).
pub fn evaluate_predicate(
    expr: &Expression,
    formset: &FormSet,
    this_value: &TypedValue,
    storage: &mut impl StorageAccess,
    matcher: &impl Matcher,
) -> Predicate {
    match evaluate(expr, formset, this_value, storage, matcher) {
        Ok(v) => match v.as_bool() {
            Some(true) => Predicate::True,
            Some(false) => Predicate::False,
            None => Predicate::Disabled,
        },
        Err(_) => Predicate::Disabled,
    }
}

fn pop(stack: &mut Vec<TypedValue>) -> Result<TypedValue, EvalError> {
    stack.pop().ok_or(EvalError::StackUnderflow)
}

fn pop_u64(stack: &mut Vec<TypedValue>) -> Result<u64, EvalError> {
    Ok(pop(stack)?.as_u64().unwrap_or(0))
}

fn pop_bool(stack: &mut Vec<TypedValue>) -> Result<bool, EvalError> {
    Ok(pop(stack)?.as_bool().unwrap_or(false))
}

fn eval_one(
    op: &ExpressionOp,
    formset: &FormSet,
    this_value: &TypedValue,
    storage: &mut impl StorageAccess,
    matcher: &impl Matcher,
    stack: &mut Vec<TypedValue>,
) -> Result<(), EvalError> {
    use ExpressionOp::*;
    match op {
        Constant(v) => stack.push(v.clone()),
        This => stack.push(this_value.clone()),
        Zero => stack.push(TypedValue::U64(0)),
        One => stack.push(TypedValue::U64(1)),
        Ones => stack.push(TypedValue::U64(u64::MAX)),
        Undefined => stack.push(TypedValue::Undefined),
        Version => stack.push(TypedValue::U64(SPEC_VERSION)),
        QuestionRef1(question_id) => stack.push(storage.question_value(*question_id)),
        Get { var_store_id, offset, width } => {
            stack.push(storage.get(*var_store_id, *offset, *width))
        }
        Set { var_store_id, offset, width } => {
            let value = pop(stack)?;
            storage.set(*var_store_id, *offset, *width, &value);
            stack.push(value);
        }
        Not => {
            let a = pop_bool(stack)?;
            stack.push(TypedValue::Bool(!a));
        }
        And => {
            let b = pop_bool(stack)?;
            let a = pop_bool(stack)?;
            stack.push(TypedValue::Bool(a && b));
        }
        Or => {
            let b = pop_bool(stack)?;
            let a = pop_bool(stack)?;
            stack.push(TypedValue::Bool(a || b));
        }
        Equal => {
            let b = pop_u64(stack)?;
            let a = pop_u64(stack)?;
            stack.push(TypedValue::Bool(a == b));
        }
        NotEqual => {
            let b = pop_u64(stack)?;
            let a = pop_u64(stack)?;
            stack.push(TypedValue::Bool(a != b));
        }
        GreaterThan => {
            let b = pop_u64(stack)?;
            let a = pop_u64(stack)?;
            stack.push(TypedValue::Bool(a > b));
        }
        GreaterEqual => {
            let b = pop_u64(stack)?;
            let a = pop_u64(stack)?;
            stack.push(TypedValue::Bool(a >= b));
        }
        LessThan => {
            let b = pop_u64(stack)?;
            let a = pop_u64(stack)?;
            stack.push(TypedValue::Bool(a < b));
        }
        LessEqual => {
            let b = pop_u64(stack)?;
            let a = pop_u64(stack)?;
            stack.push(TypedValue::Bool(a <= b));
        }
        BitwiseAnd => {
            let b = pop_u64(stack)?;
            let a = pop_u64(stack)?;
            stack.push(TypedValue::U64(a & b));
        }
        BitwiseOr => {
            let b = pop_u64(stack)?;
            let a = pop_u64(stack)?;
            stack.push(TypedValue::U64(a | b));
        }
        BitwiseNot => {
            let a = pop_u64(stack)?;
            stack.push(TypedValue::U64(!a));
        }
        ShiftLeft => {
            let b = pop_u64(stack)?;
            let a = pop_u64(stack)?;
            stack.push(TypedValue::U64(a.wrapping_shl(b as u32)));
        }
        ShiftRight => {
            let b = pop_u64(stack)?;
            let a = pop_u64(stack)?;
            stack.push(TypedValue::U64(a.wrapping_shr(b as u32)));
        }
        Add => {
            let b = pop_u64(stack)?;
            let a = pop_u64(stack)?;
            stack.push(TypedValue::U64(a.wrapping_add(b)));
        }
        Subtract => {
            let b = pop_u64(stack)?;
            let a = pop_u64(stack)?;
            stack.push(TypedValue::U64(a.wrapping_sub(b)));
        }
        Multiply => {
            let b = pop_u64(stack)?;
            let a = pop_u64(stack)?;
            stack.push(TypedValue::U64(a.wrapping_mul(b)));
        }
        Divide => {
            let b = pop_u64(stack)?;
            let a = pop_u64(stack)?;
            stack.push(TypedValue::U64(if b == 0 { 0 } else { a / b }));
        }
        Modulo => {
            let b = pop_u64(stack)?;
            let a = pop_u64(stack)?;
            stack.push(TypedValue::U64(if b == 0 { 0 } else { a % b }));
        }
        ToUint => {
            let a = pop(stack)?;
            stack.push(TypedValue::U64(a.as_u64().unwrap_or(0)));
        }
        ToBoolean => {
            let a = pop(stack)?;
            stack.push(TypedValue::Bool(a.as_bool().unwrap_or(false)));
        }
        ToString => {
            let a = pop_u64(stack)?;
            stack.push(TypedValue::Buffer(a.to_string().into_bytes()));
        }
        ToUpper => {
            let a = pop(stack)?;
            stack.push(string_map(a, |s| s.to_uppercase()));
        }
        ToLower => {
            let a = pop(stack)?;
            stack.push(string_map(a, |s| s.to_lowercase()));
        }
        Length => {
            let a = pop(stack)?;
            let len = match a {
                TypedValue::Buffer(b) => b.len() as u64,
                other => other.as_u64().map(|_| 1).unwrap_or(0),
            };
            stack.push(TypedValue::U64(len));
        }
        Catenate => {
            let b = pop(stack)?;
            let a = pop(stack)?;
            let mut buf = as_bytes(&a);
            buf.extend(as_bytes(&b));
            stack.push(TypedValue::Buffer(buf));
        }
        Mid => {
            let len = pop_u64(stack)? as usize;
            let start = pop_u64(stack)? as usize;
            let a = pop(stack)?;
            let bytes = as_bytes(&a);
            let end = (start + len).min(bytes.len());
            let slice = if start < bytes.len() { bytes[start..end].to_vec() } else { Vec::new() };
            stack.push(TypedValue::Buffer(slice));
        }
        Find => {
            let needle = pop(stack)?;
            let haystack = pop(stack)?;
            let h = as_bytes(&haystack);
            let n = as_bytes(&needle);
            let pos = find_subslice(&h, &n).map(|p| p as u64).unwrap_or(u64::MAX);
            stack.push(TypedValue::U64(pos));
        }
        Span => {
            // Counts how many leading bytes of the subject fall inside the
            // flags-selected character class; simplified to "all bytes"
            // since no character-class table is in scope here.
            let _flags = pop_u64(stack)?;
            let a = pop(stack)?;
            stack.push(TypedValue::U64(as_bytes(&a).len() as u64));
        }
        Match { syntax_guid, pattern_string_id } => {
            let subject = pop(stack)?;
            stack.push(TypedValue::Bool(matcher.is_match(*syntax_guid, *pattern_string_id, &subject)));
        }
        Match2 { syntax_guid, pattern_string_id } => {
            let subject = pop(stack)?;
            stack.push(TypedValue::Bool(matcher.is_match(*syntax_guid, *pattern_string_id, &subject)));
        }
        Map(arms) => stack.push(eval_map(arms, formset, this_value, storage, matcher)),
    }
    Ok(())
}

fn eval_map(
    arms: &[(ExpressionId, ExpressionId)],
    formset: &FormSet,
    this_value: &TypedValue,
    storage: &mut impl StorageAccess,
    matcher: &impl Matcher,
) -> TypedValue {
    for (cond_id, result_id) in arms {
        let cond = formset.expression(*cond_id);
        if let Ok(v) = evaluate(cond, formset, this_value, storage, matcher) {
            if v.as_bool() == Some(true) {
                let result = formset.expression(*result_id);
                return evaluate(result, formset, this_value, storage, matcher)
                    .unwrap_or(TypedValue::Undefined);
            }
        }
    }
    TypedValue::Undefined
}

fn as_bytes(v: &TypedValue) -> Vec<u8> {
    match v {
        TypedValue::Buffer(b) => b.clone(),
        other => other.as_u64().map(|n| n.to_le_bytes().to_vec()).unwrap_or_default(),
    }
}

fn string_map(v: TypedValue, f: impl FnOnce(String) -> String) -> TypedValue {
    match v {
        TypedValue::Buffer(b) => {
            let s = String::from_utf8_lossy(&b).into_owned();
            TypedValue::Buffer(f(s).into_bytes())
        }
        other => other,
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hii::model::FormSet;

    struct FakeStorage {
        value: u64,
    }

    impl StorageAccess for FakeStorage {
        fn get(&self, _var_store_id: u16, _offset: u16, _width: u8) -> TypedValue {
            TypedValue::U64(self.value)
        }
        fn set(&mut self, _var_store_id: u16, _offset: u16, _width: u8, _value: &TypedValue) {}
        fn question_value(&self, _question_id: u16) -> TypedValue {
            TypedValue::U64(self.value)
        }
    }

    #[test]
    fn equal_compares_two_constants() {
        let formset = FormSet::default();
        let mut storage = FakeStorage { value: 0 };
        let expr = vec![
            ExpressionOp::Constant(TypedValue::U64(3)),
            ExpressionOp::Constant(TypedValue::U64(3)),
            ExpressionOp::Equal,
        ];
        let result = evaluate(&expr, &formset, &TypedValue::Undefined, &mut storage, &NoMatcher).unwrap();
        assert_eq!(result, TypedValue::Bool(true));
    }

    #[test]
    fn get_reads_through_storage() {
        let formset = FormSet::default();
        let mut storage = FakeStorage { value: 42 };
        let expr = vec![ExpressionOp::Get { var_store_id: 1, offset: 0, width: 1 }];
        let result = evaluate(&expr, &formset, &TypedValue::Undefined, &mut storage, &NoMatcher).unwrap();
        assert_eq!(result, TypedValue::U64(42));
    }

    #[test]
    fn disable_if_expression_with_live_storage_resolves_disabled_predicate() {
        // A GET-backed expression can't be constant-folded at parse time, so
        // the parser defers to `Predicate::Disabled` there; confirm the
        // evaluator itself still resolves it once storage is live.
        let formset = FormSet::default();
        let mut storage = FakeStorage { value: 1 };
        let expr = vec![ExpressionOp::Get { var_store_id: 1, offset: 0, width: 1 }];
        let predicate =
            evaluate_predicate(&expr, &formset, &TypedValue::Undefined, &mut storage, &NoMatcher);
        assert_eq!(predicate, Predicate::True);
    }

    #[test]
    fn empty_expression_is_an_error() {
        let formset = FormSet::default();
        let mut storage = FakeStorage { value: 0 };
        let expr: Expression = Vec::new();
        assert!(matches!(
            evaluate(&expr, &formset, &TypedValue::Undefined, &mut storage, &NoMatcher),
            Err(EvalError::Empty)
        ));
    }

    #[test]
    fn and_short_circuits_are_not_assumed_but_result_matches_truth_table() {
        let formset = FormSet::default();
        let mut storage = FakeStorage { value: 0 };
        let expr = vec![
            ExpressionOp::Constant(TypedValue::Bool(true)),
            ExpressionOp::Constant(TypedValue::Bool(false)),
            ExpressionOp::And,
        ];
        let result = evaluate(&expr, &formset, &TypedValue::Undefined, &mut storage, &NoMatcher).unwrap();
        assert_eq!(result, TypedValue::Bool(false));
    }

    #[test]
    fn map_selects_first_matching_arm() {
        let mut formset = FormSet::default();
        let cond_true = formset.expressions.len() as u32;
        formset.expressions.push(vec![ExpressionOp::Constant(TypedValue::Bool(true))]);
        let result_expr = formset.expressions.len() as u32;
        formset.expressions.push(vec![ExpressionOp::Constant(TypedValue::U64(7))]);
        let arms = vec![(ExpressionId(cond_true), ExpressionId(result_expr))];
        let mut storage = FakeStorage { value: 0 };
        let expr = vec![ExpressionOp::Map(arms)];
        let result = evaluate(&expr, &formset.clone(), &TypedValue::Undefined, &mut storage, &NoMatcher).unwrap();
        assert_eq!(result, TypedValue::U64(7));
    }
}
