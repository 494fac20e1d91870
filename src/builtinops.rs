//! Built-in operations registry.
//!
//! Every reserved name of the language is either a **primitive** (an operator
//! applied to evaluated operands: `+`, `car`, `eq?`, ...) or a **special form**
//! (a construct with its own grammar whose operands are not evaluated up front:
//! `if`, `let`, `lambda`, ...). Both are closed enumerations; the registry pairs
//! each one with its Scheme identifier and arity and is indexed by name once at
//! initialization time.
//!
//! ```scheme
//! (+ 1 2 3)          ; primitive, any number of operands
//! (modulo 7 2)       ; primitive, exactly two operands
//! (if #t 1 2)        ; special form, exactly three operands
//! ((if #t car cdr) p) ; `car` passed as a first-class primitive value
//! ```
//!
//! A primitive's arity also selects the operator form the parser builds:
//! exactly one operand gives a unary form, exactly two a binary form and
//! everything else a variadic form. The semantic functions `apply_unary`,
//! `apply_binary` and `apply_variadic` receive already evaluated operands.
//!
//! `and`/`or` are registered as primitives so they share name resolution and
//! arity checking, but the evaluator short-circuits them when they appear
//! directly at the head of a form. Applied through a variable they behave like
//! ordinary functions over evaluated operands.
//!
//! ## Error Handling
//!
//! - **Type Safety**: numeric operators reject non-numbers, `car`/`cdr` reject non-pairs
//! - **Overflow Detection**: arithmetic reports overflow instead of wrapping
//! - **Arity Checking**: operand counts are validated before dispatch

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::LazyLock;

use tracing::trace;

use crate::Error;
use crate::expr::Expr;
use crate::number::{self, NumberType, Rational, to_integer, to_rational};

/// Arity descriptor shared by primitives, special forms and procedures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    pub fn accepts(&self, got: usize) -> bool {
        match self {
            Arity::Exact(n) => got == *n,
            Arity::AtLeast(n) => got >= *n,
            Arity::Any => true,
        }
    }

    /// Check an operand count against this arity for the named form
    pub fn validate(&self, form: &str, got: usize) -> Result<(), Error> {
        if self.accepts(got) {
            Ok(())
        } else {
            Err(Error::arity_error(form, *self, got))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Primitive operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Add,
    Sub,
    Mul,
    Div,
    Modulo,
    Expt,
    Lt,
    Le,
    NumEq,
    Ge,
    Gt,
    Cons,
    Car,
    Cdr,
    List,
    SetCar,
    SetCdr,
    Not,
    And,
    Or,
    Eq,
    IsBoolean,
    IsNumber,
    IsInteger,
    IsNull,
    IsPair,
    IsProcedure,
    IsSymbol,
    IsList,
    IsString,
    Display,
    Void,
    Exit,
}

impl Primitive {
    pub const ALL: [Primitive; 33] = [
        Primitive::Add,
        Primitive::Sub,
        Primitive::Mul,
        Primitive::Div,
        Primitive::Modulo,
        Primitive::Expt,
        Primitive::Lt,
        Primitive::Le,
        Primitive::NumEq,
        Primitive::Ge,
        Primitive::Gt,
        Primitive::Cons,
        Primitive::Car,
        Primitive::Cdr,
        Primitive::List,
        Primitive::SetCar,
        Primitive::SetCdr,
        Primitive::Not,
        Primitive::And,
        Primitive::Or,
        Primitive::Eq,
        Primitive::IsBoolean,
        Primitive::IsNumber,
        Primitive::IsInteger,
        Primitive::IsNull,
        Primitive::IsPair,
        Primitive::IsProcedure,
        Primitive::IsSymbol,
        Primitive::IsList,
        Primitive::IsString,
        Primitive::Display,
        Primitive::Void,
        Primitive::Exit,
    ];

    /// The Scheme identifier for this primitive
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Add => "+",
            Primitive::Sub => "-",
            Primitive::Mul => "*",
            Primitive::Div => "/",
            Primitive::Modulo => "modulo",
            Primitive::Expt => "expt",
            Primitive::Lt => "<",
            Primitive::Le => "<=",
            Primitive::NumEq => "=",
            Primitive::Ge => ">=",
            Primitive::Gt => ">",
            Primitive::Cons => "cons",
            Primitive::Car => "car",
            Primitive::Cdr => "cdr",
            Primitive::List => "list",
            Primitive::SetCar => "set-car!",
            Primitive::SetCdr => "set-cdr!",
            Primitive::Not => "not",
            Primitive::And => "and",
            Primitive::Or => "or",
            Primitive::Eq => "eq?",
            Primitive::IsBoolean => "boolean?",
            Primitive::IsNumber => "number?",
            Primitive::IsInteger => "integer?",
            Primitive::IsNull => "null?",
            Primitive::IsPair => "pair?",
            Primitive::IsProcedure => "procedure?",
            Primitive::IsSymbol => "symbol?",
            Primitive::IsList => "list?",
            Primitive::IsString => "string?",
            Primitive::Display => "display",
            Primitive::Void => "void",
            Primitive::Exit => "exit",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            Primitive::Add
            | Primitive::Mul
            | Primitive::Lt
            | Primitive::Le
            | Primitive::NumEq
            | Primitive::Ge
            | Primitive::Gt
            | Primitive::List
            | Primitive::And
            | Primitive::Or => Arity::Any,
            Primitive::Sub | Primitive::Div => Arity::AtLeast(1),
            Primitive::Modulo
            | Primitive::Expt
            | Primitive::Cons
            | Primitive::SetCar
            | Primitive::SetCdr
            | Primitive::Eq => Arity::Exact(2),
            Primitive::Car
            | Primitive::Cdr
            | Primitive::Not
            | Primitive::IsBoolean
            | Primitive::IsNumber
            | Primitive::IsInteger
            | Primitive::IsNull
            | Primitive::IsPair
            | Primitive::IsProcedure
            | Primitive::IsSymbol
            | Primitive::IsList
            | Primitive::IsString
            | Primitive::Display => Arity::Exact(1),
            Primitive::Void | Primitive::Exit => Arity::Exact(0),
        }
    }
}

/// Special forms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialForm {
    Begin,
    Quote,
    If,
    Cond,
    Lambda,
    Define,
    Let,
    Letrec,
    Set,
}

impl SpecialForm {
    pub const ALL: [SpecialForm; 9] = [
        SpecialForm::Begin,
        SpecialForm::Quote,
        SpecialForm::If,
        SpecialForm::Cond,
        SpecialForm::Lambda,
        SpecialForm::Define,
        SpecialForm::Let,
        SpecialForm::Letrec,
        SpecialForm::Set,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SpecialForm::Begin => "begin",
            SpecialForm::Quote => "quote",
            SpecialForm::If => "if",
            SpecialForm::Cond => "cond",
            SpecialForm::Lambda => "lambda",
            SpecialForm::Define => "define",
            SpecialForm::Let => "let",
            SpecialForm::Letrec => "letrec",
            SpecialForm::Set => "set!",
        }
    }

    /// Operand count, not counting the form's own name
    pub fn arity(self) -> Arity {
        match self {
            SpecialForm::Begin | SpecialForm::Cond => Arity::Any,
            SpecialForm::Quote => Arity::Exact(1),
            SpecialForm::If => Arity::Exact(3),
            SpecialForm::Set => Arity::Exact(2),
            // Header only; an empty body is reported by the parser
            SpecialForm::Lambda | SpecialForm::Define | SpecialForm::Let | SpecialForm::Letrec => {
                Arity::AtLeast(1)
            }
        }
    }
}

/// What a reserved name refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Operator applied to evaluated operands
    Primitive(Primitive),
    /// Construct with its own grammar
    SpecialForm(SpecialForm),
}

/// Definition of a built-in operation
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinOp {
    /// The Scheme identifier for this operation
    pub scheme_id: &'static str,
    pub op_kind: OpKind,
    /// Expected number of operands
    pub arity: Arity,
}

impl BuiltinOp {
    pub(crate) fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }

    /// The first-class value a variable reference to this name evaluates to
    pub(crate) fn as_value(&self) -> Expr {
        match self.op_kind {
            OpKind::Primitive(op) => Expr::Primitive(op),
            OpKind::SpecialForm(form) => Expr::SpecialForm(form),
        }
    }
}

/// Global registry of all built-in operations, primitives first.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    let primitives = Primitive::ALL.into_iter().map(|op| BuiltinOp {
        scheme_id: op.name(),
        op_kind: OpKind::Primitive(op),
        arity: op.arity(),
    });
    let special_forms = SpecialForm::ALL.into_iter().map(|form| BuiltinOp {
        scheme_id: form.name(),
        op_kind: OpKind::SpecialForm(form),
        arity: form.arity(),
    });
    primitives.chain(special_forms).collect()
});

/// Lazy static map from scheme_id to BuiltinOp (private - use find_scheme_op)
static BUILTIN_SCHEME: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.scheme_id, op)).collect()
});

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by its Scheme identifier
pub fn find_scheme_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_SCHEME.get(id).copied()
}

pub fn find_primitive(id: &str) -> Option<Primitive> {
    match find_scheme_op(id)?.op_kind {
        OpKind::Primitive(op) => Some(op),
        OpKind::SpecialForm(_) => None,
    }
}

pub fn find_special_form(id: &str) -> Option<SpecialForm> {
    match find_scheme_op(id)?.op_kind {
        OpKind::SpecialForm(form) => Some(form),
        OpKind::Primitive(_) => None,
    }
}

//
// Builtin Function Implementations
//

fn numbers(op: Primitive, args: &[Expr]) -> Result<Vec<Rational>, Error> {
    args.iter().map(|arg| to_rational(arg, op.name())).collect()
}

fn builtin_add(args: &[Expr]) -> Result<Expr, Error> {
    let mut sum = Rational::from_integer(0);
    for n in numbers(Primitive::Add, args)? {
        sum = sum.add(n)?;
    }
    Ok(sum.into())
}

fn builtin_mul(args: &[Expr]) -> Result<Expr, Error> {
    let mut product = Rational::from_integer(1);
    for n in numbers(Primitive::Mul, args)? {
        product = product.mul(n)?;
    }
    Ok(product.into())
}

// Folds `combine` over `first, rest...`; a single operand is combined with `identity`
fn fold_inverse(
    op: Primitive,
    args: &[Expr],
    identity: NumberType,
    combine: fn(Rational, Rational) -> Result<Rational, Error>,
) -> Result<Expr, Error> {
    let nums = numbers(op, args)?;
    let Some((first, rest)) = nums.split_first() else {
        return Err(Error::arity_error(op.name(), op.arity(), 0));
    };
    if rest.is_empty() {
        return Ok(combine(Rational::from_integer(identity), *first)?.into());
    }
    let mut result = *first;
    for n in rest {
        result = combine(result, *n)?;
    }
    Ok(result.into())
}

fn builtin_sub(args: &[Expr]) -> Result<Expr, Error> {
    fold_inverse(Primitive::Sub, args, 0, Rational::sub)
}

fn builtin_div(args: &[Expr]) -> Result<Expr, Error> {
    fold_inverse(Primitive::Div, args, 1, Rational::div)
}

// Chained comparison: every operand is type-checked, then adjacent pairs compared
fn builtin_compare(
    op: Primitive,
    args: &[Expr],
    holds: fn(&Rational, &Rational) -> bool,
) -> Result<Expr, Error> {
    let nums = numbers(op, args)?;
    Ok(Expr::Bool(nums.windows(2).all(|w| holds(&w[0], &w[1]))))
}

fn builtin_car(pair: Expr) -> Result<Expr, Error> {
    match pair {
        Expr::Pair(p) => Ok(p.car()),
        other => Err(Error::type_error("car", "a pair", &other)),
    }
}

fn builtin_cdr(pair: Expr) -> Result<Expr, Error> {
    match pair {
        Expr::Pair(p) => Ok(p.cdr()),
        other => Err(Error::type_error("cdr", "a pair", &other)),
    }
}

fn builtin_set_car(pair: Expr, value: Expr) -> Result<Expr, Error> {
    match pair {
        Expr::Pair(p) => {
            p.set_car(value);
            Ok(Expr::Void)
        }
        other => Err(Error::type_error("set-car!", "a pair", &other)),
    }
}

fn builtin_set_cdr(pair: Expr, value: Expr) -> Result<Expr, Error> {
    match pair {
        Expr::Pair(p) => {
            p.set_cdr(value);
            Ok(Expr::Void)
        }
        other => Err(Error::type_error("set-cdr!", "a pair", &other)),
    }
}

/// Write `value` as `display` shows it: strings unquoted, everything else canonically
pub fn write_display(out: &mut impl Write, value: &Expr) -> io::Result<()> {
    match value {
        Expr::Str(s) => write!(out, "{s}")?,
        other => write!(out, "{other}")?,
    }
    out.flush()
}

fn builtin_display(value: Expr) -> Result<Expr, Error> {
    write_display(&mut io::stdout().lock(), &value)
        .map_err(|e| Error::UndefinedOperation(format!("display: {e}")))?;
    Ok(Expr::Void)
}

/// First falsy operand, else the last one (`#t` when empty)
fn builtin_and(args: Vec<Expr>) -> Expr {
    let mut last = Expr::Bool(true);
    for arg in args {
        if !arg.is_truthy() {
            return arg;
        }
        last = arg;
    }
    last
}

/// First truthy operand, else the last one (`#f` when empty)
fn builtin_or(args: Vec<Expr>) -> Expr {
    let mut last = Expr::Bool(false);
    for arg in args {
        if arg.is_truthy() {
            return arg;
        }
        last = arg;
    }
    last
}

/// Apply a single-operand primitive
pub fn apply_unary(op: Primitive, operand: Expr) -> Result<Expr, Error> {
    trace!(op = op.name(), "apply unary primitive");
    match op {
        Primitive::Car => builtin_car(operand),
        Primitive::Cdr => builtin_cdr(operand),
        Primitive::Not => Ok(Expr::Bool(!operand.is_truthy())),
        Primitive::IsBoolean => Ok(Expr::Bool(matches!(operand, Expr::Bool(_)))),
        Primitive::IsNumber => Ok(Expr::Bool(operand.is_number())),
        Primitive::IsInteger => Ok(Expr::Bool(matches!(operand, Expr::Integer(_)))),
        Primitive::IsNull => Ok(Expr::Bool(matches!(operand, Expr::Null))),
        Primitive::IsPair => Ok(Expr::Bool(matches!(operand, Expr::Pair(_)))),
        Primitive::IsProcedure => Ok(Expr::Bool(operand.is_procedure())),
        Primitive::IsSymbol => Ok(Expr::Bool(matches!(operand, Expr::Symbol(_)))),
        Primitive::IsList => Ok(Expr::Bool(operand.is_list())),
        Primitive::IsString => Ok(Expr::Bool(matches!(operand, Expr::Str(_)))),
        Primitive::Display => builtin_display(operand),
        _ => apply_variadic(op, vec![operand]),
    }
}

/// Apply a two-operand primitive
pub fn apply_binary(op: Primitive, lhs: Expr, rhs: Expr) -> Result<Expr, Error> {
    trace!(op = op.name(), "apply binary primitive");
    match op {
        Primitive::Modulo => {
            let a = to_integer(&lhs, op.name())?;
            let b = to_integer(&rhs, op.name())?;
            Ok(Expr::Integer(number::modulo(a, b)?))
        }
        Primitive::Expt => {
            let base = to_integer(&lhs, op.name())?;
            let exponent = to_integer(&rhs, op.name())?;
            Ok(Expr::Integer(number::expt(base, exponent)?))
        }
        Primitive::Cons => Ok(Expr::cons(lhs, rhs)),
        Primitive::SetCar => builtin_set_car(lhs, rhs),
        Primitive::SetCdr => builtin_set_cdr(lhs, rhs),
        Primitive::Eq => Ok(Expr::Bool(lhs.is_eq(&rhs))),
        _ => apply_variadic(op, vec![lhs, rhs]),
    }
}

/// Apply a primitive with a variable operand list
pub fn apply_variadic(op: Primitive, args: Vec<Expr>) -> Result<Expr, Error> {
    trace!(op = op.name(), argc = args.len(), "apply variadic primitive");
    match op {
        Primitive::Add => builtin_add(&args),
        Primitive::Sub => builtin_sub(&args),
        Primitive::Mul => builtin_mul(&args),
        Primitive::Div => builtin_div(&args),
        Primitive::Lt => builtin_compare(op, &args, |a, b| a < b),
        Primitive::Le => builtin_compare(op, &args, |a, b| a <= b),
        Primitive::NumEq => builtin_compare(op, &args, |a, b| a == b),
        Primitive::Ge => builtin_compare(op, &args, |a, b| a >= b),
        Primitive::Gt => builtin_compare(op, &args, |a, b| a > b),
        Primitive::List => Ok(Expr::list(args)),
        Primitive::And => Ok(builtin_and(args)),
        Primitive::Or => Ok(builtin_or(args)),
        Primitive::Void => Ok(Expr::Void),
        Primitive::Exit => Ok(Expr::Exit),
        _ => apply_primitive(op, args),
    }
}

/// Apply a primitive to evaluated arguments, checking its arity first
///
/// This is the path taken when a primitive is called as a first-class value.
pub fn apply_primitive(op: Primitive, args: Vec<Expr>) -> Result<Expr, Error> {
    op.arity().validate(op.name(), args.len())?;
    let mut args = args.into_iter();
    match (op.arity(), args.next(), args.next()) {
        (Arity::Exact(1), Some(operand), None) => apply_unary(op, operand),
        (Arity::Exact(2), Some(lhs), Some(rhs)) => apply_binary(op, lhs, rhs),
        (Arity::Exact(1 | 2), ..) => Err(Error::arity_error(op.name(), op.arity(), 0)),
        (_, first, second) => {
            let all = first.into_iter().chain(second).chain(args).collect();
            apply_variadic(op, all)
        }
    }
}
