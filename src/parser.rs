//! Syntax tree to expression conversion
//!
//! [`parse`] turns a [`Syntax`] tree into an [`Expr`]. List forms are resolved
//! by their head symbol in this order:
//!
//! 1. a name bound locally (by an enclosing `lambda`/`let`/`letrec`/`define`
//!    in the same tree, or already in the environment) makes the form an
//!    application, even if the name is also reserved;
//! 2. a primitive name builds the matching operator form;
//! 3. a special-form name is parsed by that form's grammar;
//! 4. anything else is an application of the head to the remaining elements.
//!
//! Arity of primitives and special forms is checked here, so evaluation never
//! sees a malformed operator form. [`q_parse`] is the separate traversal used
//! under `quote`, which produces data rather than code.

use std::collections::HashSet;
use std::rc::Rc;

use crate::Error;
use crate::ast::{Syntax, is_valid_variable_name};
use crate::builtinops::{Arity, Primitive, SpecialForm, find_primitive, find_special_form};
use crate::environment::Environment;
use crate::expr::{Binding, CondClause, Expr, Lambda};
use crate::number;

/// Parse a syntax tree against the current environment
pub fn parse(syntax: &Syntax, env: &Environment) -> Result<Expr, Error> {
    Parser::new(env).parse_expr(syntax)
}

/// Convert a syntax tree to literal data
///
/// Symbols become symbol data and lists become pair chains. A list of three or
/// more elements whose second-to-last element is the symbol `.` is dotted: its
/// final element is the tail instead of the empty list.
pub fn q_parse(syntax: &Syntax) -> Result<Expr, Error> {
    match syntax {
        Syntax::List(items) => match items.as_slice() {
            [init @ .., dot, last] if !init.is_empty() && dot.is_symbol(".") => {
                let init = init.iter().map(q_parse).collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::list_with_tail(init, q_parse(last)?))
            }
            _ => {
                let items = items.iter().map(q_parse).collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::list(items))
            }
        },
        Syntax::Symbol(name) => Ok(Expr::symbol(name)),
        atom => parse_atom(atom),
    }
}

fn parse_atom(syntax: &Syntax) -> Result<Expr, Error> {
    match syntax {
        Syntax::Number(n) => Ok(Expr::Integer(*n)),
        Syntax::Rational(n, d) => number::normalize(*n, *d),
        Syntax::String(s) => Ok(Expr::string(s)),
        Syntax::Boolean(b) => Ok(Expr::Bool(*b)),
        Syntax::Symbol(name) => Ok(Expr::Var(Rc::from(name.as_str()))),
        Syntax::List(_) => Err(Error::malformed("expected an atom")),
    }
}

fn binding_name(form: &str, syntax: &Syntax) -> Result<String, Error> {
    let name = syntax
        .as_symbol()
        .ok_or_else(|| Error::malformed(format!("{form}: expected a symbol, got {syntax}")))?;
    if !is_valid_variable_name(name) {
        return Err(Error::InvalidVariableName(name.to_owned()));
    }
    Ok(name.to_owned())
}

fn reject_duplicates(form: &str, names: &[String]) -> Result<(), Error> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(Error::malformed(format!("{form}: duplicate name {name}")));
        }
    }
    Ok(())
}

struct Parser<'a> {
    env: &'a Environment,
    /// Names bound by enclosing forms of the tree being parsed, innermost last
    scopes: Vec<HashSet<String>>,
}

impl<'a> Parser<'a> {
    fn new(env: &'a Environment) -> Self {
        Parser {
            env,
            scopes: vec![HashSet::new()],
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name)) || self.env.is_bound(name)
    }

    /// Record a `define`d name in the innermost scope, which is the enclosing
    /// body even when the `define` sits inside an `if` branch or initializer
    fn bind(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_owned());
        }
    }

    fn with_scope<T>(
        &mut self,
        names: &[String],
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.scopes.push(names.iter().cloned().collect());
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn parse_expr(&mut self, syntax: &Syntax) -> Result<Expr, Error> {
        match syntax {
            Syntax::List(items) => self.parse_list(items),
            atom => parse_atom(atom),
        }
    }

    fn parse_all(&mut self, items: &[Syntax]) -> Result<Vec<Expr>, Error> {
        items.iter().map(|item| self.parse_expr(item)).collect()
    }

    fn parse_list(&mut self, items: &[Syntax]) -> Result<Expr, Error> {
        let Some((head, rest)) = items.split_first() else {
            return Ok(Expr::Quote(Box::new(Expr::Null)));
        };

        if let Some(name) = head.as_symbol()
            && !self.is_local(name)
        {
            if let Some(op) = find_primitive(name) {
                return self.parse_operator(op, rest);
            }
            if let Some(form) = find_special_form(name) {
                form.arity().validate(form.name(), rest.len())?;
                return self.parse_special_form(form, rest);
            }
        }

        Ok(Expr::Apply {
            operator: Box::new(self.parse_expr(head)?),
            operands: self.parse_all(rest)?,
        })
    }

    fn parse_operator(&mut self, op: Primitive, rest: &[Syntax]) -> Result<Expr, Error> {
        op.arity().validate(op.name(), rest.len())?;
        let mut operands = self.parse_all(rest)?;
        Ok(match (op, op.arity()) {
            (Primitive::And, _) => Expr::And(operands),
            (Primitive::Or, _) => Expr::Or(operands),
            (_, Arity::Exact(2)) => {
                let rhs = operands.pop();
                let lhs = operands.pop();
                match (lhs, rhs) {
                    (Some(lhs), Some(rhs)) => Expr::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    },
                    _ => return Err(Error::arity_error(op.name(), op.arity(), rest.len())),
                }
            }
            (_, Arity::Exact(1)) => match operands.pop() {
                Some(operand) => Expr::Unary {
                    op,
                    operand: Box::new(operand),
                },
                None => return Err(Error::arity_error(op.name(), op.arity(), 0)),
            },
            _ => Expr::Variadic { op, operands },
        })
    }

    fn parse_special_form(&mut self, form: SpecialForm, rest: &[Syntax]) -> Result<Expr, Error> {
        match (form, rest) {
            (SpecialForm::Quote, [datum]) => Ok(Expr::Quote(Box::new(q_parse(datum)?))),
            (SpecialForm::Begin, body) => Ok(Expr::Begin(self.parse_all(body)?)),
            (SpecialForm::If, [test, consequent, alternate]) => Ok(Expr::If {
                test: Box::new(self.parse_expr(test)?),
                consequent: Box::new(self.parse_expr(consequent)?),
                alternate: Box::new(self.parse_expr(alternate)?),
            }),
            (SpecialForm::Cond, clauses) => self.parse_cond(clauses),
            (SpecialForm::Lambda, [params, body @ ..]) => {
                Ok(Expr::Lambda(self.parse_lambda("lambda", params, body)?))
            }
            (SpecialForm::Define, [target, body @ ..]) => self.parse_define(target, body),
            (SpecialForm::Let, [bindings, body @ ..]) => {
                let (names, inits) = self.parse_bindings("let", bindings)?;
                let values = self.parse_all(&inits)?;
                let body = self.with_scope(&names, |p| p.parse_body("let", body))?;
                Ok(Expr::Let {
                    bindings: names.into_iter().zip(values).collect(),
                    body: Box::new(body),
                })
            }
            (SpecialForm::Letrec, [bindings, body @ ..]) => {
                let (names, inits) = self.parse_bindings("letrec", bindings)?;
                let (bindings, body) = self.with_scope(&names, |p| {
                    let values = p.parse_all(&inits)?;
                    let body = p.parse_body("letrec", body)?;
                    Ok((names.iter().cloned().zip(values).collect::<Vec<Binding>>(), body))
                })?;
                Ok(Expr::Letrec {
                    bindings,
                    body: Box::new(body),
                })
            }
            (SpecialForm::Set, [target, value]) => Ok(Expr::Set {
                name: binding_name("set!", target)?,
                value: Box::new(self.parse_expr(value)?),
            }),
            (form, rest) => Err(Error::arity_error(form.name(), form.arity(), rest.len())),
        }
    }

    /// Parse body forms; several forms become a sequence
    fn parse_body(&mut self, form: &str, body: &[Syntax]) -> Result<Expr, Error> {
        match body {
            [] => Err(Error::malformed(format!("{form}: empty body"))),
            [single] => self.parse_expr(single),
            many => Ok(Expr::Begin(self.parse_all(many)?)),
        }
    }

    fn parse_params(&mut self, form: &str, params: &[Syntax]) -> Result<Vec<String>, Error> {
        let names = params
            .iter()
            .map(|param| binding_name(form, param))
            .collect::<Result<Vec<_>, _>>()?;
        reject_duplicates(form, &names)?;
        Ok(names)
    }

    fn parse_lambda(
        &mut self,
        form: &str,
        params: &Syntax,
        body: &[Syntax],
    ) -> Result<Rc<Lambda>, Error> {
        let Syntax::List(params) = params else {
            return Err(Error::malformed(format!(
                "{form}: expected a parameter list, got {params}"
            )));
        };
        let params = self.parse_params(form, params)?;
        let body = self.with_scope(&params, |p| p.parse_body(form, body))?;
        Ok(Rc::new(Lambda { params, body }))
    }

    fn parse_define(&mut self, target: &Syntax, body: &[Syntax]) -> Result<Expr, Error> {
        match target {
            Syntax::Symbol(_) => {
                let [value] = body else {
                    return Err(Error::arity_error("define", Arity::Exact(2), body.len() + 1));
                };
                let name = binding_name("define", target)?;
                self.bind(&name);
                Ok(Expr::Define {
                    name,
                    value: Box::new(self.parse_expr(value)?),
                })
            }
            Syntax::List(signature) => {
                let Some((name, params)) = signature.split_first() else {
                    return Err(Error::malformed("define: missing procedure name"));
                };
                let name = binding_name("define", name)?;
                self.bind(&name);
                let lambda = self.parse_lambda("define", &Syntax::List(params.to_vec()), body)?;
                Ok(Expr::DefineFn { name, lambda })
            }
            other => Err(Error::malformed(format!(
                "define: expected a name or signature, got {other}"
            ))),
        }
    }

    /// Split `((name init) ...)` into validated names and their initializers
    fn parse_bindings(
        &mut self,
        form: &str,
        bindings: &Syntax,
    ) -> Result<(Vec<String>, Vec<Syntax>), Error> {
        let Syntax::List(bindings) = bindings else {
            return Err(Error::malformed(format!(
                "{form}: expected a binding list, got {bindings}"
            )));
        };
        let mut names = Vec::with_capacity(bindings.len());
        let mut inits = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let Syntax::List(pair) = binding else {
                return Err(Error::malformed(format!(
                    "{form}: binding must be a (name value) list, got {binding}"
                )));
            };
            let [name, init] = pair.as_slice() else {
                return Err(Error::malformed(format!(
                    "{form}: binding must be a (name value) list, got {binding}"
                )));
            };
            names.push(binding_name(form, name)?);
            inits.push(init.clone());
        }
        reject_duplicates(form, &names)?;
        Ok((names, inits))
    }

    fn parse_cond(&mut self, clauses: &[Syntax]) -> Result<Expr, Error> {
        let else_reserved = !self.is_local("else");
        let mut parsed = Vec::with_capacity(clauses.len());
        for (i, clause) in clauses.iter().enumerate() {
            let Syntax::List(items) = clause else {
                return Err(Error::malformed(format!(
                    "cond: clause must be a list, got {clause}"
                )));
            };
            let Some((test, body)) = items.split_first() else {
                return Err(Error::malformed("cond: empty clause"));
            };
            if else_reserved && test.is_symbol("else") {
                if i + 1 != clauses.len() {
                    return Err(Error::malformed("cond: else must be the last clause"));
                }
                if body.is_empty() {
                    return Err(Error::malformed("cond: empty else clause"));
                }
                parsed.push(CondClause {
                    test: None,
                    body: self.parse_all(body)?,
                });
            } else {
                parsed.push(CondClause {
                    test: Some(self.parse_expr(test)?),
                    body: self.parse_all(body)?,
                });
            }
        }
        Ok(Expr::Cond(parsed))
    }
}
