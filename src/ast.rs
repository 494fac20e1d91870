//! This module defines the generic syntax tree handed to the parser by a reader.
//! The main enum, [`Syntax`], is a plain discriminated union of numbers, rational
//! literals, symbols, strings, booleans and lists; it carries no evaluation
//! semantics. Ergonomic helper functions such as [`val`], [`sym`], [`rat`] and
//! [`nil`] are provided for convenient tree construction in code and tests, and
//! conversion traits exist for common Rust literals, arrays and vectors.
//!
//! The module also owns the variable-name validity rule applied wherever a
//! binding is introduced.

use crate::number::NumberType;

/// Characters that may never appear in a variable name
pub(crate) const FORBIDDEN_NAME_CHARS: &str = "#'\"`";

/// Characters that may not start a variable name (in addition to digits)
pub(crate) const FORBIDDEN_NAME_START: &str = ".@";

/// Check if a string is a valid variable name
/// Valid: non-empty, no leading digit, `.` or `@`, no whitespace, none of `# ' " \``
pub fn is_valid_variable_name(name: &str) -> bool {
    match name.chars().next() {
        None => false,
        Some(first) if first.is_ascii_digit() || FORBIDDEN_NAME_START.contains(first) => false,
        Some(_) => name
            .chars()
            .all(|c| !c.is_whitespace() && !FORBIDDEN_NAME_CHARS.contains(c)),
    }
}

/// Generic syntax tree produced by a reader
///
/// To build a tree, use the helper functions:
/// - `val(42)` for literals, `sym("name")` for symbols, `nil()` for empty lists
/// - `rat(1, 2)` for rational literals
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Debug, Clone, PartialEq)]
pub enum Syntax {
    /// Integer literal
    Number(NumberType),
    /// Rational literal as written; not yet normalized (`2/4`, `1/0`)
    Rational(NumberType, NumberType),
    /// Identifier
    Symbol(String),
    /// String literal
    String(String),
    /// `#t` / `#f`
    Boolean(bool),
    /// Parenthesized list, possibly empty
    List(Vec<Syntax>),
}

impl Syntax {
    /// The symbol name, if this node is a symbol
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Syntax::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_symbol(&self, name: &str) -> bool {
        self.as_symbol() == Some(name)
    }
}

impl From<&str> for Syntax {
    fn from(s: &str) -> Self {
        Syntax::String(s.to_owned())
    }
}

impl From<String> for Syntax {
    fn from(s: String) -> Self {
        Syntax::String(s)
    }
}

impl From<bool> for Syntax {
    fn from(b: bool) -> Self {
        Syntax::Boolean(b)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Syntax {
            fn from(n: $int_type) -> Self {
                Syntax::Number(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Syntax>> From<Vec<T>> for Syntax {
    fn from(v: Vec<T>) -> Self {
        Syntax::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Syntax>, const N: usize> From<[T; N]> for Syntax {
    fn from(arr: [T; N]) -> Self {
        Syntax::List(arr.into_iter().map(Into::into).collect())
    }
}

/// Helper function for creating symbols in mixed lists
pub fn sym<S: AsRef<str>>(name: S) -> Syntax {
    Syntax::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating syntax nodes from Rust literals
pub fn val<T: Into<Syntax>>(value: T) -> Syntax {
    value.into()
}

/// Helper function for creating rational literals
pub fn rat(numerator: NumberType, denominator: NumberType) -> Syntax {
    Syntax::Rational(numerator, denominator)
}

/// Helper function for creating empty lists
pub fn nil() -> Syntax {
    Syntax::List(vec![])
}

impl std::fmt::Display for Syntax {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Syntax::Number(n) => write!(f, "{n}"),
            Syntax::Rational(n, d) => write!(f, "{n}/{d}"),
            Syntax::Symbol(s) => write!(f, "{s}"),
            Syntax::String(s) => write!(f, "{s:?}"),
            Syntax::Boolean(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Syntax::List(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        let test_cases = vec![
            (val(42), Syntax::Number(42)),
            (val(-17), Syntax::Number(-17)),
            (val(255u8), Syntax::Number(255)),
            (val(NumberType::MIN), Syntax::Number(NumberType::MIN)),
            (val(true), Syntax::Boolean(true)),
            (val("hello"), Syntax::String("hello".to_owned())),
            (sym("set-car!"), Syntax::Symbol("set-car!".to_owned())),
            (rat(2, 4), Syntax::Rational(2, 4)),
            (nil(), Syntax::List(vec![])),
            (
                val([1, 2]),
                Syntax::List(vec![Syntax::Number(1), Syntax::Number(2)]),
            ),
            (
                val(vec![sym("define"), sym("x"), val(1)]),
                Syntax::List(vec![
                    Syntax::Symbol("define".to_owned()),
                    Syntax::Symbol("x".to_owned()),
                    Syntax::Number(1),
                ]),
            ),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_variable_name_validity() {
        let cases = [
            ("x", true),
            ("set-car!", true),
            ("+", true),
            ("a.b", true),
            ("x1", true),
            ("λ", true),
            ("-1x", true),
            ("", false),
            ("1x", false),
            (".x", false),
            ("@x", false),
            ("a b", false),
            ("a\tb", false),
            ("a#b", false),
            ("a'b", false),
            ("a\"b", false),
            ("a`b", false),
        ];
        for (name, expected) in cases {
            assert_eq!(is_valid_variable_name(name), expected, "name {name:?}");
        }
    }

    #[test]
    fn test_display() {
        let tree = val(vec![sym("quote"), val(vec![val(1), rat(1, 2), val("s")])]);
        assert_eq!(format!("{tree}"), "(quote (1 1/2 \"s\"))");
        assert_eq!(format!("{}", nil()), "()");
    }
}
