//! The expression model.
//!
//! [`Expr`] is a single closed sum type covering both evaluated values (the
//! self-evaluating literals, pairs, procedures and operator tags) and the code
//! forms produced by the parser. Values and code share one type because the
//! language is homoiconic: `quote` turns syntax into data, and data is what
//! `eval` returns.
//!
//! Sharing follows Scheme semantics. Pairs are reference-counted cells whose
//! car and cdr can be replaced in place by `set-car!`/`set-cdr!`, and every
//! holder of the same pair observes the change. Procedures share their code and
//! hold a reference to the frame they were created in.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::builtinops::{Primitive, SpecialForm};
use crate::environment::Environment;
use crate::number::{NumberType, Rational};

/// A mutable cons cell
pub struct Pair {
    car: RefCell<Expr>,
    cdr: RefCell<Expr>,
}

impl Pair {
    pub fn new(car: Expr, cdr: Expr) -> Self {
        Pair {
            car: RefCell::new(car),
            cdr: RefCell::new(cdr),
        }
    }

    pub fn car(&self) -> Expr {
        self.car.borrow().clone()
    }

    pub fn cdr(&self) -> Expr {
        self.cdr.borrow().clone()
    }

    pub fn set_car(&self, value: Expr) {
        *self.car.borrow_mut() = value;
    }

    pub fn set_cdr(&self, value: Expr) {
        *self.cdr.borrow_mut() = value;
    }
}

// Unlink uniquely owned tails iteratively so long lists do not drop recursively
impl Drop for Pair {
    fn drop(&mut self) {
        let mut tail = self.cdr.replace(Expr::Null);
        while let Expr::Pair(next) = tail {
            match Rc::try_unwrap(next) {
                Ok(pair) => tail = pair.cdr.replace(Expr::Null),
                Err(_) => break,
            }
        }
    }
}

/// Parameter list and body shared by a `lambda` form and every closure made from it
#[derive(Debug)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Expr,
}

/// A closure: code plus the frame it captured
pub struct Procedure {
    pub lambda: Rc<Lambda>,
    pub env: Environment,
}

impl Procedure {
    pub fn params(&self) -> &[String] {
        &self.lambda.params
    }

    pub fn body(&self) -> &Expr {
        &self.lambda.body
    }
}

/// One `cond` clause; a `None` test is the `else` clause
#[derive(Debug, Clone)]
pub struct CondClause {
    pub test: Option<Expr>,
    pub body: Vec<Expr>,
}

/// A `let`/`letrec` binding
pub type Binding = (String, Expr);

/// Core expression type
#[derive(Clone)]
pub enum Expr {
    // === Self-evaluating values ===
    Integer(NumberType),
    /// Always reduced, denominator > 1
    Rational(Rational),
    Str(Rc<str>),
    Bool(bool),
    /// Quoted symbol datum
    Symbol(Rc<str>),
    Void,
    /// Terminate/exit literal returned by `(exit)`
    Exit,
    /// The empty list
    Null,
    Pair(Rc<Pair>),
    Procedure(Rc<Procedure>),
    /// Primitive operator as a first-class value
    Primitive(Primitive),
    /// Special form as a first-class value
    SpecialForm(SpecialForm),

    // === Operator forms (operands evaluated left to right) ===
    Unary {
        op: Primitive,
        operand: Box<Expr>,
    },
    Binary {
        op: Primitive,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Variadic {
        op: Primitive,
        operands: Vec<Expr>,
    },
    /// Short-circuiting `and`
    And(Vec<Expr>),
    /// Short-circuiting `or`
    Or(Vec<Expr>),

    // === Control and binding forms ===
    Var(Rc<str>),
    Quote(Box<Expr>),
    Begin(Vec<Expr>),
    If {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Cond(Vec<CondClause>),
    Let {
        bindings: Vec<Binding>,
        body: Box<Expr>,
    },
    Letrec {
        bindings: Vec<Binding>,
        body: Box<Expr>,
    },
    Set {
        name: String,
        value: Box<Expr>,
    },
    Define {
        name: String,
        value: Box<Expr>,
    },
    /// `(define (name params...) body...)`
    DefineFn {
        name: String,
        lambda: Rc<Lambda>,
    },
    Lambda(Rc<Lambda>),
    /// Call form; a `Var` operator is resolved at evaluation time
    Apply {
        operator: Box<Expr>,
        operands: Vec<Expr>,
    },
}

impl Expr {
    pub fn string(s: &str) -> Expr {
        Expr::Str(Rc::from(s))
    }

    pub fn symbol(name: &str) -> Expr {
        Expr::Symbol(Rc::from(name))
    }

    pub fn cons(car: Expr, cdr: Expr) -> Expr {
        Expr::Pair(Rc::new(Pair::new(car, cdr)))
    }

    /// Build a proper list by right fold, ending in the empty list
    pub fn list(items: impl IntoIterator<Item = Expr, IntoIter: DoubleEndedIterator>) -> Expr {
        Self::list_with_tail(items, Expr::Null)
    }

    /// Build a list by right fold onto an arbitrary tail
    pub fn list_with_tail(
        items: impl IntoIterator<Item = Expr, IntoIter: DoubleEndedIterator>,
        tail: Expr,
    ) -> Expr {
        items
            .into_iter()
            .rev()
            .fold(tail, |tail, item| Expr::cons(item, tail))
    }

    /// Every value except `#f` is true
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Expr::Bool(false))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Expr::Integer(_) | Expr::Rational(_))
    }

    pub fn is_procedure(&self) -> bool {
        matches!(self, Expr::Procedure(_) | Expr::Primitive(_))
    }

    /// True for a chain of pairs ending in the empty list
    ///
    /// Uses two cursors so that a cycle made with `set-cdr!` terminates.
    pub fn is_list(&self) -> bool {
        let mut slow = self.clone();
        let mut fast = self.clone();
        loop {
            for _ in 0..2 {
                fast = match &fast {
                    Expr::Null => return true,
                    Expr::Pair(p) => p.cdr(),
                    _ => return false,
                };
            }
            slow = match &slow {
                Expr::Pair(p) => p.cdr(),
                _ => return false,
            };
            if let (Expr::Pair(a), Expr::Pair(b)) = (&slow, &fast)
                && Rc::ptr_eq(a, b)
            {
                return false;
            }
        }
    }

    /// `eq?` identity
    ///
    /// Scalars (numbers, booleans, strings, symbols, the empty list, void and
    /// operator tags) compare by value; pairs and procedures by storage.
    pub fn is_eq(&self, other: &Expr) -> bool {
        match (self, other) {
            (Expr::Integer(a), Expr::Integer(b)) => a == b,
            (Expr::Rational(a), Expr::Rational(b)) => a == b,
            (Expr::Bool(a), Expr::Bool(b)) => a == b,
            (Expr::Str(a), Expr::Str(b)) => a == b,
            (Expr::Symbol(a), Expr::Symbol(b)) => a == b,
            (Expr::Null, Expr::Null) | (Expr::Void, Expr::Void) => true,
            (Expr::Primitive(a), Expr::Primitive(b)) => a == b,
            (Expr::SpecialForm(a), Expr::SpecialForm(b)) => a == b,
            (Expr::Pair(a), Expr::Pair(b)) => Rc::ptr_eq(a, b),
            (Expr::Procedure(a), Expr::Procedure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Runtime tag name used in error messages and logs
    pub fn type_name(&self) -> &'static str {
        match self {
            Expr::Integer(_) => "integer",
            Expr::Rational(_) => "rational",
            Expr::Str(_) => "string",
            Expr::Bool(_) => "boolean",
            Expr::Symbol(_) => "symbol",
            Expr::Void => "void",
            Expr::Exit => "exit",
            Expr::Null => "null",
            Expr::Pair(_) => "pair",
            Expr::Procedure(_) => "procedure",
            Expr::Primitive(_) => "primitive",
            Expr::SpecialForm(_) => "special-form",
            Expr::Unary { .. }
            | Expr::Binary { .. }
            | Expr::Variadic { .. }
            | Expr::And(_)
            | Expr::Or(_) => "operator-form",
            Expr::Var(_) => "variable",
            Expr::Quote(_) => "quote",
            Expr::Begin(_) => "begin",
            Expr::If { .. } => "if",
            Expr::Cond(_) => "cond",
            Expr::Let { .. } => "let",
            Expr::Letrec { .. } => "letrec",
            Expr::Set { .. } => "set!",
            Expr::Define { .. } | Expr::DefineFn { .. } => "define",
            Expr::Lambda(_) => "lambda",
            Expr::Apply { .. } => "application",
        }
    }

    fn write_string(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
        write!(f, "\"")?;
        for ch in s.chars() {
            match ch {
                '"' => write!(f, "\\\"")?,
                '\\' => write!(f, "\\\\")?,
                '\n' => write!(f, "\\n")?,
                '\t' => write!(f, "\\t")?,
                '\r' => write!(f, "\\r")?,
                c => write!(f, "{c}")?,
            }
        }
        write!(f, "\"")
    }

    fn write_pair(f: &mut fmt::Formatter<'_>, pair: &Pair) -> fmt::Result {
        write!(f, "({}", pair.car())?;
        let mut tail = pair.cdr();
        loop {
            tail = match &tail {
                Expr::Null => break,
                Expr::Pair(next) => {
                    write!(f, " {}", next.car())?;
                    next.cdr()
                }
                other => {
                    write!(f, " . {other}")?;
                    break;
                }
            };
        }
        write!(f, ")")
    }
}

/// Canonical `show` rendering
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Integer(n) => write!(f, "{n}"),
            Expr::Rational(r) => write!(f, "{r}"),
            Expr::Str(s) => Self::write_string(f, s),
            Expr::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Expr::Symbol(s) => write!(f, "{s}"),
            Expr::Void => write!(f, "#<void>"),
            Expr::Exit => Ok(()),
            Expr::Null => write!(f, "()"),
            Expr::Pair(p) => Self::write_pair(f, p),
            Expr::Procedure(_) | Expr::Primitive(_) | Expr::SpecialForm(_) => {
                write!(f, "#<procedure>")
            }
            other => write!(f, "#<{}>", other.type_name()),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Primitive(op) => write!(f, "Primitive({})", op.name()),
            Expr::SpecialForm(form) => write!(f, "SpecialForm({})", form.name()),
            Expr::Procedure(p) => write!(f, "Procedure(params={:?})", p.params()),
            Expr::Var(name) => write!(f, "Var({name})"),
            Expr::Quote(datum) => write!(f, "Quote({datum})"),
            Expr::Unary { op, operand } => write!(f, "Unary({}, {operand:?})", op.name()),
            Expr::Binary { op, lhs, rhs } => {
                write!(f, "Binary({}, {lhs:?}, {rhs:?})", op.name())
            }
            Expr::Variadic { op, operands } => {
                write!(f, "Variadic({}, {operands:?})", op.name())
            }
            Expr::And(operands) => write!(f, "And({operands:?})"),
            Expr::Or(operands) => write!(f, "Or({operands:?})"),
            Expr::Begin(exprs) => write!(f, "Begin({exprs:?})"),
            Expr::If {
                test,
                consequent,
                alternate,
            } => write!(f, "If({test:?}, {consequent:?}, {alternate:?})"),
            Expr::Cond(clauses) => write!(f, "Cond({clauses:?})"),
            Expr::Let { bindings, body } => write!(f, "Let({bindings:?}, {body:?})"),
            Expr::Letrec { bindings, body } => write!(f, "Letrec({bindings:?}, {body:?})"),
            Expr::Set { name, value } => write!(f, "Set({name}, {value:?})"),
            Expr::Define { name, value } => write!(f, "Define({name}, {value:?})"),
            Expr::DefineFn { name, lambda } => {
                write!(f, "DefineFn({name}, {:?}, {:?})", lambda.params, lambda.body)
            }
            Expr::Lambda(lambda) => write!(f, "Lambda({:?}, {:?})", lambda.params, lambda.body),
            Expr::Apply { operator, operands } => write!(f, "Apply({operator:?}, {operands:?})"),
            value => write!(f, "{value}"),
        }
    }
}
