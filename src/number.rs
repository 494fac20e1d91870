//! Exact numeric tower: integers and reduced rationals.
//!
//! All arithmetic is carried out on [`Rational`] values. Intermediate products
//! are computed in 128-bit integers and the reduced result is narrowed back to
//! [`NumberType`]; a result that does not fit is an `Overflow` error rather
//! than a wrapped value. A rational whose denominator reduces to 1 becomes a
//! plain integer when converted back into an [`Expr`].

use std::cmp::Ordering;
use std::fmt;

use crate::Error;
use crate::expr::Expr;

/// Type alias for integer values in the interpreter
pub type NumberType = i64;

/// Wide type used for intermediate results
type Wide = i128;

/// A rational number in lowest terms with a positive denominator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    numer: NumberType,
    denom: NumberType,
}

fn gcd(mut a: Wide, mut b: Wide) -> Wide {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a.abs()
}

fn narrow(n: Wide, operation: &str) -> Result<NumberType, Error> {
    NumberType::try_from(n).map_err(|_| Error::Overflow(operation.to_owned()))
}

impl Rational {
    /// Normalize `numer/denom`: divide out the gcd and move the sign to the numerator
    pub fn new(numer: NumberType, denom: NumberType) -> Result<Self, Error> {
        Self::reduce(Wide::from(numer), Wide::from(denom), "rational literal")
    }

    pub fn from_integer(n: NumberType) -> Self {
        Rational { numer: n, denom: 1 }
    }

    fn reduce(numer: Wide, denom: Wide, operation: &str) -> Result<Self, Error> {
        if denom == 0 {
            return Err(Error::DivisionByZero);
        }
        let g = gcd(numer, denom);
        let (mut numer, mut denom) = (numer / g, denom / g);
        if denom < 0 {
            numer = -numer;
            denom = -denom;
        }
        Ok(Rational {
            numer: narrow(numer, operation)?,
            denom: narrow(denom, operation)?,
        })
    }

    pub fn numer(&self) -> NumberType {
        self.numer
    }

    pub fn denom(&self) -> NumberType {
        self.denom
    }

    pub fn is_integer(&self) -> bool {
        self.denom == 1
    }

    pub fn is_zero(&self) -> bool {
        self.numer == 0
    }

    fn wide(&self) -> (Wide, Wide) {
        (Wide::from(self.numer), Wide::from(self.denom))
    }

    pub fn add(self, other: Rational) -> Result<Rational, Error> {
        let ((a, b), (c, d)) = (self.wide(), other.wide());
        Self::reduce(a * d + b * c, b * d, "addition")
    }

    pub fn sub(self, other: Rational) -> Result<Rational, Error> {
        let ((a, b), (c, d)) = (self.wide(), other.wide());
        Self::reduce(a * d - b * c, b * d, "subtraction")
    }

    pub fn mul(self, other: Rational) -> Result<Rational, Error> {
        let ((a, b), (c, d)) = (self.wide(), other.wide());
        Self::reduce(a * c, b * d, "multiplication")
    }

    pub fn div(self, other: Rational) -> Result<Rational, Error> {
        if other.is_zero() {
            return Err(Error::DivisionByZero);
        }
        let ((a, b), (c, d)) = (self.wide(), other.wide());
        Self::reduce(a * d, b * c, "division")
    }
}

impl Ord for Rational {
    /// Three-way comparison by cross-multiplication (denominators are positive)
    fn cmp(&self, other: &Self) -> Ordering {
        let ((a, b), (c, d)) = (self.wide(), other.wide());
        (a * d).cmp(&(c * b))
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_integer() {
            write!(f, "{}", self.numer)
        } else {
            write!(f, "{}/{}", self.numer, self.denom)
        }
    }
}

impl From<Rational> for Expr {
    fn from(r: Rational) -> Self {
        if r.is_integer() {
            Expr::Integer(r.numer)
        } else {
            Expr::Rational(r)
        }
    }
}

/// Normalize a rational literal into a numeric expression
pub fn normalize(numer: NumberType, denom: NumberType) -> Result<Expr, Error> {
    Rational::new(numer, denom).map(Expr::from)
}

/// View a numeric expression as a rational
pub(crate) fn to_rational(value: &Expr, operator: &str) -> Result<Rational, Error> {
    match value {
        Expr::Integer(n) => Ok(Rational::from_integer(*n)),
        Expr::Rational(r) => Ok(*r),
        other => Err(Error::type_error(operator, "a number", other)),
    }
}

pub(crate) fn to_integer(value: &Expr, operator: &str) -> Result<NumberType, Error> {
    match value {
        Expr::Integer(n) => Ok(*n),
        other => Err(Error::type_error(operator, "an integer", other)),
    }
}

/// Integer modulo; the result takes the sign of the divisor
pub fn modulo(dividend: NumberType, divisor: NumberType) -> Result<NumberType, Error> {
    if divisor == 0 {
        return Err(Error::DivisionByZero);
    }
    let (a, b) = (Wide::from(dividend), Wide::from(divisor));
    let mut r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        r += b;
    }
    narrow(r, "modulo")
}

/// Integer exponentiation by squaring, defined for non-negative exponents
pub fn expt(base: NumberType, exponent: NumberType) -> Result<NumberType, Error> {
    if exponent < 0 {
        return Err(Error::UndefinedOperation(format!(
            "expt with negative exponent {exponent}"
        )));
    }
    if base == 0 && exponent == 0 {
        return Err(Error::UndefinedOperation("0^0 is undefined".to_owned()));
    }

    let overflow = || Error::Overflow("expt".to_owned());
    let mut result: NumberType = 1;
    let mut square = base;
    let mut remaining = exponent;
    while remaining > 0 {
        if remaining & 1 == 1 {
            result = result.checked_mul(square).ok_or_else(overflow)?;
        }
        remaining >>= 1;
        // The next square is only needed while bits remain
        if remaining > 0 {
            square = square.checked_mul(square).ok_or_else(overflow)?;
        }
    }
    Ok(result)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    fn r(n: NumberType, d: NumberType) -> Rational {
        Rational::new(n, d).unwrap()
    }

    #[test]
    fn test_normalization_data_driven() {
        // (numerator, denominator, expected numerator, expected denominator)
        let cases = [
            (2, 4, 1, 2),
            (-2, 4, -1, 2),
            (2, -4, -1, 2),
            (-2, -4, 1, 2),
            (0, 5, 0, 1),
            (0, -5, 0, 1),
            (6, 3, 2, 1),
            (7, 1, 7, 1),
            (NumberType::MAX, NumberType::MAX, 1, 1),
            (12, 18, 2, 3),
        ];
        for (i, (n, d, en, ed)) in cases.into_iter().enumerate() {
            let q = r(n, d);
            assert_eq!((q.numer(), q.denom()), (en, ed), "case #{}", i + 1);
        }
    }

    #[test]
    fn test_reduced_form_invariant() {
        for a in -12..=12 {
            for b in (-12..=12).filter(|b| *b != 0) {
                let q = r(a, b);
                assert!(q.denom() > 0, "{a}/{b}");
                assert_eq!(
                    gcd(Wide::from(q.numer()), Wide::from(q.denom())),
                    1,
                    "{a}/{b}"
                );
            }
        }
    }

    #[test]
    fn test_zero_denominator() {
        assert_eq!(Rational::new(1, 0), Err(Error::DivisionByZero));
        assert!(matches!(normalize(0, 0), Err(Error::DivisionByZero)));
    }

    #[test]
    fn test_min_denominator_sign_flip_overflows() {
        // 1 / MIN needs denominator -MIN, which does not fit
        assert!(matches!(
            Rational::new(1, NumberType::MIN),
            Err(Error::Overflow(_))
        ));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(r(1, 2).add(r(1, 3)).unwrap(), r(5, 6));
        assert_eq!(r(1, 2).add(r(1, 2)).unwrap(), r(1, 1));
        assert_eq!(r(1, 2).sub(r(3, 4)).unwrap(), r(-1, 4));
        assert_eq!(r(2, 3).mul(r(3, 4)).unwrap(), r(1, 2));
        assert_eq!(r(1, 2).div(r(1, 4)).unwrap(), r(2, 1));
        assert_eq!(r(1, 2).div(r(0, 1)), Err(Error::DivisionByZero));
        assert!(matches!(
            r(NumberType::MAX, 1).add(r(1, 1)),
            Err(Error::Overflow(_))
        ));
    }

    #[test]
    fn test_collapse_to_integer() {
        assert!(matches!(Expr::from(r(4, 2)), Expr::Integer(2)));
        assert!(matches!(Expr::from(r(1, 2)), Expr::Rational(_)));
    }

    #[test]
    fn test_ordering() {
        assert!(r(1, 3) < r(1, 2));
        assert!(r(-1, 2) < r(1, 3));
        assert_eq!(r(2, 4).cmp(&r(1, 2)), Ordering::Equal);
        assert!(r(NumberType::MAX, 1) > r(NumberType::MAX - 1, 1));
    }

    #[test]
    fn test_modulo() {
        assert_eq!(modulo(7, 2).unwrap(), 1);
        assert_eq!(modulo(-7, 2).unwrap(), 1);
        assert_eq!(modulo(7, -2).unwrap(), -1);
        assert_eq!(modulo(-7, -2).unwrap(), -1);
        assert_eq!(modulo(6, 3).unwrap(), 0);
        assert_eq!(modulo(NumberType::MIN, -1).unwrap(), 0);
        assert_eq!(modulo(1, 0), Err(Error::DivisionByZero));
    }

    #[test]
    fn test_expt() {
        assert_eq!(expt(2, 10).unwrap(), 1024);
        assert_eq!(expt(-3, 3).unwrap(), -27);
        assert_eq!(expt(5, 0).unwrap(), 1);
        assert_eq!(expt(0, 5).unwrap(), 0);
        assert_eq!(expt(2, 62).unwrap(), 1 << 62);
        assert_eq!(expt(-2, 63).unwrap(), NumberType::MIN);
        assert!(matches!(expt(2, 63), Err(Error::Overflow(_))));
        assert!(matches!(expt(10, 19), Err(Error::Overflow(_))));
        assert!(matches!(expt(0, 0), Err(Error::UndefinedOperation(_))));
        assert!(matches!(expt(2, -1), Err(Error::UndefinedOperation(_))));
    }
}
