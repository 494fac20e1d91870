use std::rc::Rc;

use tracing::trace;

use crate::Error;
use crate::MAX_EVAL_DEPTH;
use crate::builtinops::{
    Arity, SpecialForm, apply_binary, apply_primitive, apply_unary, apply_variadic,
    find_scheme_op,
};
use crate::environment::Environment;
use crate::expr::{Binding, CondClause, Expr, Procedure};

/// Remaining stack below which a new segment is allocated
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each additional stack segment
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Evaluate an expression (public API)
pub fn eval(expr: &Expr, env: &Environment) -> Result<Expr, Error> {
    eval_with_depth_tracking(expr, env, 0)
}

/// Evaluate an expression with depth tracking to prevent stack overflow
fn eval_with_depth_tracking(expr: &Expr, env: &Environment, depth: usize) -> Result<Expr, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::EvalDepthExceeded(MAX_EVAL_DEPTH));
    }
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
        eval_inner(expr, env, depth)
    })
}

fn eval_inner(expr: &Expr, env: &Environment, depth: usize) -> Result<Expr, Error> {
    let next = depth + 1;
    match expr {
        // Self-evaluating values
        Expr::Integer(_)
        | Expr::Rational(_)
        | Expr::Str(_)
        | Expr::Bool(_)
        | Expr::Symbol(_)
        | Expr::Void
        | Expr::Exit
        | Expr::Null
        | Expr::Pair(_)
        | Expr::Procedure(_)
        | Expr::Primitive(_)
        | Expr::SpecialForm(_) => Ok(expr.clone()),

        // Operator forms: operands left to right, then the semantic function
        // (arity already validated at parse time)
        Expr::Unary { op, operand } => {
            let value = eval_with_depth_tracking(operand, env, next)?;
            apply_unary(*op, value)
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval_with_depth_tracking(lhs, env, next)?;
            let rhs = eval_with_depth_tracking(rhs, env, next)?;
            apply_binary(*op, lhs, rhs)
        }
        Expr::Variadic { op, operands } => apply_variadic(*op, eval_args(operands, env, next)?),
        Expr::And(operands) => eval_and(operands, env, next),
        Expr::Or(operands) => eval_or(operands, env, next),

        Expr::Var(name) => lookup(name, env),
        Expr::Quote(datum) => Ok((**datum).clone()),
        Expr::Begin(exprs) => eval_sequence(exprs, env, next),
        Expr::If {
            test,
            consequent,
            alternate,
        } => {
            if eval_with_depth_tracking(test, env, next)?.is_truthy() {
                eval_with_depth_tracking(consequent, env, next)
            } else {
                eval_with_depth_tracking(alternate, env, next)
            }
        }
        Expr::Cond(clauses) => eval_cond(clauses, env, next),
        Expr::Let { bindings, body } => eval_let(bindings, body, env, next),
        Expr::Letrec { bindings, body } => eval_letrec(bindings, body, env, next),
        Expr::Set { name, value } => {
            let value = eval_with_depth_tracking(value, env, next)?;
            env.assign(name, value)?;
            Ok(Expr::Void)
        }
        Expr::Define { name, value } => {
            let value = eval_with_depth_tracking(value, env, next)?;
            env.define_in_place(name, value)?;
            Ok(Expr::Void)
        }
        Expr::DefineFn { name, lambda } => {
            // Bind first so the closure's frame already holds the name
            env.define_in_place(name, Expr::Void)?;
            let closure = Expr::Procedure(Rc::new(Procedure {
                lambda: Rc::clone(lambda),
                env: env.clone(),
            }));
            env.define_in_place(name, closure)?;
            Ok(Expr::Void)
        }
        Expr::Lambda(lambda) => Ok(Expr::Procedure(Rc::new(Procedure {
            lambda: Rc::clone(lambda),
            env: env.clone(),
        }))),
        Expr::Apply { operator, operands } => {
            let func = eval_with_depth_tracking(operator, env, next)?;
            let args = eval_args(operands, env, next)?;
            apply(func, args, next)
        }
    }
}

/// Local bindings first, then the reserved names as first-class values
fn lookup(name: &str, env: &Environment) -> Result<Expr, Error> {
    env.lookup(name)
        .or_else(|| find_scheme_op(name).map(|op| op.as_value()))
        .ok_or_else(|| Error::UnboundVariable(name.to_owned()))
}

/// Helper function to evaluate a list of argument expressions with depth tracking
fn eval_args(args: &[Expr], env: &Environment, depth: usize) -> Result<Vec<Expr>, Error> {
    args.iter()
        .map(|arg| eval_with_depth_tracking(arg, env, depth))
        .collect()
}

/// Evaluate in order and return the last value; empty is void
fn eval_sequence(exprs: &[Expr], env: &Environment, depth: usize) -> Result<Expr, Error> {
    let mut result = Expr::Void;
    for expr in exprs {
        result = eval_with_depth_tracking(expr, env, depth)?;
    }
    Ok(result)
}

fn eval_and(operands: &[Expr], env: &Environment, depth: usize) -> Result<Expr, Error> {
    let mut result = Expr::Bool(true);
    for operand in operands {
        result = eval_with_depth_tracking(operand, env, depth)?;
        if !result.is_truthy() {
            break;
        }
    }
    Ok(result)
}

fn eval_or(operands: &[Expr], env: &Environment, depth: usize) -> Result<Expr, Error> {
    let mut result = Expr::Bool(false);
    for operand in operands {
        result = eval_with_depth_tracking(operand, env, depth)?;
        if result.is_truthy() {
            break;
        }
    }
    Ok(result)
}

fn eval_cond(clauses: &[CondClause], env: &Environment, depth: usize) -> Result<Expr, Error> {
    for clause in clauses {
        let Some(test) = &clause.test else {
            return eval_sequence(&clause.body, env, depth);
        };
        let value = eval_with_depth_tracking(test, env, depth)?;
        if value.is_truthy() {
            if clause.body.is_empty() {
                return Ok(value);
            }
            return eval_sequence(&clause.body, env, depth);
        }
    }
    Ok(Expr::Void)
}

fn eval_let(
    bindings: &[Binding],
    body: &Expr,
    env: &Environment,
    depth: usize,
) -> Result<Expr, Error> {
    // Initializers see the outer environment only
    let values = bindings
        .iter()
        .map(|(name, init)| Ok((name.clone(), eval_with_depth_tracking(init, env, depth)?)))
        .collect::<Result<Vec<_>, Error>>()?;
    let frame = env.extend_all(values)?;
    eval_with_depth_tracking(body, &frame, depth)
}

fn eval_letrec(
    bindings: &[Binding],
    body: &Expr,
    env: &Environment,
    depth: usize,
) -> Result<Expr, Error> {
    let frame = env.extend_all(bindings.iter().map(|(name, _)| (name.clone(), Expr::Void)))?;
    for (name, init) in bindings {
        let value = eval_with_depth_tracking(init, &frame, depth)?;
        frame.define_in_place(name, value)?;
    }
    eval_with_depth_tracking(body, &frame, depth)
}

/// Apply an evaluated operator to evaluated arguments
fn apply(func: Expr, args: Vec<Expr>, depth: usize) -> Result<Expr, Error> {
    match func {
        Expr::Procedure(procedure) => {
            let params = procedure.params();
            Arity::Exact(params.len()).validate("procedure", args.len())?;
            trace!(params = ?params, "apply procedure");
            let frame = procedure
                .env
                .extend_all(params.iter().cloned().zip(args))?;
            eval_with_depth_tracking(procedure.body(), &frame, depth)
        }
        Expr::Primitive(op) => apply_primitive(op, args),
        Expr::SpecialForm(form) => apply_special_form(form, args),
        other => Err(Error::NotAProcedure(format!("{other}"))),
    }
}

/// A special form reached through a variable, applied to evaluated operands
fn apply_special_form(form: SpecialForm, args: Vec<Expr>) -> Result<Expr, Error> {
    trace!(form = form.name(), "apply special form as procedure");
    match form {
        SpecialForm::Begin => Ok(args.into_iter().last().unwrap_or(Expr::Void)),
        SpecialForm::If => {
            form.arity().validate(form.name(), args.len())?;
            let mut args = args.into_iter();
            match (args.next(), args.next(), args.next()) {
                (Some(test), Some(consequent), Some(alternate)) => Ok(if test.is_truthy() {
                    consequent
                } else {
                    alternate
                }),
                _ => Err(Error::arity_error(form.name(), form.arity(), 0)),
            }
        }
        other => Err(Error::malformed(format!(
            "{} cannot be applied as a procedure",
            other.name()
        ))),
    }
}

#[cfg(all(test, feature = "reader"))]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::reader::read;

    /// Expected outcome of evaluating one source form
    #[derive(Debug)]
    enum TestResult {
        /// Canonical rendering of the value
        EvalResult(&'static str),
        /// Error whose message contains the text
        SpecificError(&'static str),
        AnyError,
    }

    use TestResult::*;

    /// Forms evaluated in order against one shared environment
    struct TestEnvironment(Vec<(&'static str, TestResult)>);

    /// Macro for setup forms that evaluate to void (define, set!, ...)
    macro_rules! test_setup {
        ($expr:expr) => {
            ($expr, EvalResult("#<void>"))
        };
    }

    fn eval_source(input: &str, env: &Environment) -> Result<Expr, crate::Error> {
        let syntax = read(input)?;
        let expr = parse(&syntax, env)?;
        eval(&expr, env)
    }

    /// Execute a single test case with detailed error reporting
    fn execute_test_case(input: &str, expected: &TestResult, env: &Environment, test_id: &str) {
        match (eval_source(input, env), expected) {
            (Ok(actual), EvalResult(shown)) => {
                assert_eq!(format!("{actual}"), *shown, "{test_id}: {input}");
            }
            (Err(_), AnyError) => {}
            (Err(e), SpecificError(expected_text)) => {
                let error_msg = format!("{e}");
                assert!(
                    error_msg.contains(expected_text),
                    "{test_id}: error should contain '{expected_text}', got: {error_msg}"
                );
            }
            (Ok(actual), AnyError) => {
                panic!("{test_id}: expected error for '{input}', got {actual}");
            }
            (Ok(actual), SpecificError(expected_text)) => {
                panic!(
                    "{test_id}: expected error containing '{expected_text}' for '{input}', got {actual}"
                );
            }
            (Err(err), EvalResult(shown)) => {
                panic!("{test_id}: expected {shown} for '{input}', got error {err}");
            }
        }
    }

    /// Run independent test cases, each in a fresh environment
    fn run_comprehensive_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let env = Environment::new();
            execute_test_case(input, expected, &env, &format!("#{}", i + 1));
        }
    }

    /// Run tests in isolated environments with shared state
    fn run_tests_in_environment(test_environments: Vec<TestEnvironment>) {
        for (env_idx, TestEnvironment(test_cases)) in test_environments.iter().enumerate() {
            let env = Environment::new();
            for (test_idx, (input, expected)) in test_cases.iter().enumerate() {
                let test_id = format!("Environment #{} test #{}", env_idx + 1, test_idx + 1);
                execute_test_case(input, expected, &env, &test_id);
            }
        }
    }

    #[test]
    fn test_comprehensive_operations_data_driven() {
        let test_cases = vec![
            // === LITERALS ===
            ("42", EvalResult("42")),
            ("-7", EvalResult("-7")),
            ("2/4", EvalResult("1/2")),
            ("6/3", EvalResult("2")),
            ("1/0", SpecificError("DivisionByZero")),
            ("#t", EvalResult("#t")),
            ("\"hi\"", EvalResult("\"hi\"")),
            ("()", EvalResult("()")),
            // === ARITHMETIC ===
            ("(+ 1/2 1/3)", EvalResult("5/6")),
            ("(+ 1/2 1/2)", EvalResult("1")),
            ("(+)", EvalResult("0")),
            ("(- 10)", EvalResult("-10")),
            ("(- 10 3 2)", EvalResult("5")),
            ("(* 2/3 3/4)", EvalResult("1/2")),
            ("(/ 1 3)", EvalResult("1/3")),
            ("(/ 3)", EvalResult("1/3")),
            ("(/ 4 2)", EvalResult("2")),
            ("(/ 1 0)", SpecificError("DivisionByZero")),
            ("(/ 1 (- 1/2 1/2))", SpecificError("DivisionByZero")),
            ("(+ 9223372036854775807 1)", SpecificError("Overflow")),
            ("(* 4611686018427387904 2)", SpecificError("Overflow")),
            ("(+ 1 #t)", SpecificError("TypeError")),
            ("(modulo 7 2)", EvalResult("1")),
            ("(modulo -7 2)", EvalResult("1")),
            ("(modulo 7 -2)", EvalResult("-1")),
            ("(modulo 1/2 2)", SpecificError("TypeError")),
            ("(modulo 1 0)", SpecificError("DivisionByZero")),
            ("(expt 2 10)", EvalResult("1024")),
            ("(expt 2 63)", SpecificError("Overflow")),
            ("(expt 0 0)", SpecificError("UndefinedOperation")),
            // === COMPARISON ===
            ("(< 1 2 3)", EvalResult("#t")),
            ("(< 1 3 2)", EvalResult("#f")),
            ("(<)", EvalResult("#t")),
            ("(< 1)", EvalResult("#t")),
            ("(= 1/2 2/4)", EvalResult("#t")),
            ("(>= 3 3 1)", EvalResult("#t")),
            ("(> 1/3 1/2)", EvalResult("#f")),
            ("(< 1 \"a\")", SpecificError("TypeError")),
            // === LOGIC ===
            ("(and)", EvalResult("#t")),
            ("(or)", EvalResult("#f")),
            ("(and 1 2)", EvalResult("2")),
            ("(and 1 2 #f 3)", EvalResult("#f")),
            ("(and #f (car 1))", EvalResult("#f")),
            ("(or #f #f 7)", EvalResult("7")),
            ("(or 1 (car 1))", EvalResult("1")),
            ("(or #f #f)", EvalResult("#f")),
            ("(not #f)", EvalResult("#t")),
            ("(not 0)", EvalResult("#f")),
            ("(not '())", EvalResult("#f")),
            // === CONTROL ===
            ("(if 0 'yes 'no)", EvalResult("yes")),
            ("(if '() 'yes 'no)", EvalResult("yes")),
            ("(if #f (car 1) 2)", EvalResult("2")),
            ("(begin)", EvalResult("#<void>")),
            ("(begin 1 2 3)", EvalResult("3")),
            ("(cond (#f 1) (else 2))", EvalResult("2")),
            ("(cond (#f 1))", EvalResult("#<void>")),
            ("(cond)", EvalResult("#<void>")),
            ("(cond (#f 1) (7))", EvalResult("7")),
            ("(cond (1 2 3) (else 4))", EvalResult("3")),
            // === BINDING ===
            ("(let ((x 1)) (let ((y (+ x 1))) y))", EvalResult("2")),
            ("(let ((x 1) (y 2)) (+ x y))", EvalResult("3")),
            ("(let () 5)", EvalResult("5")),
            (
                "(letrec ((f (lambda () (g))) (g (lambda () 5))) (f))",
                EvalResult("5"),
            ),
            (
                "(let ((f (lambda () (g))) (g (lambda () 5))) (f))",
                SpecificError("UnboundVariable: g"),
            ),
            (
                "(letrec ((even? (lambda (n) (if (= n 0) #t (odd? (- n 1))))) \
                          (odd? (lambda (n) (if (= n 0) #f (even? (- n 1)))))) \
                   (even? 100))",
                EvalResult("#t"),
            ),
            ("(let ((x 1) (x 2)) x)", SpecificError("MalformedForm")),
            ("(set! z 1)", SpecificError("UnboundAssignment")),
            ("undefined-name", SpecificError("UnboundVariable: undefined-name")),
            // === PROCEDURES ===
            ("((lambda (x) (* x x)) 4)", EvalResult("16")),
            ("((lambda () 42))", EvalResult("42")),
            ("((lambda (x y) x) 1)", SpecificError("ArityError")),
            ("((lambda (x) x) 1 2)", SpecificError("ArityError")),
            ("(lambda (x) x)", EvalResult("#<procedure>")),
            ("(5 1)", SpecificError("NotAProcedure")),
            ("('a)", SpecificError("NotAProcedure")),
            ("((if #t + *) 2 3)", EvalResult("5")),
            ("((if #f + *) 2 3)", EvalResult("6")),
            ("car", EvalResult("#<procedure>")),
            ("(procedure? car)", EvalResult("#t")),
            ("(procedure? (lambda () 1))", EvalResult("#t")),
            ("(procedure? 'car)", EvalResult("#f")),
            // === LISTS AND PAIRS ===
            ("(car (cons 1 2))", EvalResult("1")),
            ("(cdr (cons 1 2))", EvalResult("2")),
            ("(cons 1 (cons 2 '()))", EvalResult("(1 2)")),
            ("(cons 1 (cons 2 3))", EvalResult("(1 2 . 3)")),
            ("(list 1 (list 2 3) '())", EvalResult("(1 (2 3) ())")),
            ("(list)", EvalResult("()")),
            ("(car '())", SpecificError("TypeError")),
            ("(cdr 5)", SpecificError("TypeError")),
            ("(list? '(1 2))", EvalResult("#t")),
            ("(list? (cons 1 2))", EvalResult("#f")),
            ("(list? '())", EvalResult("#t")),
            ("(pair? '())", EvalResult("#f")),
            ("(null? '())", EvalResult("#t")),
            // === QUOTING ===
            ("'(1 2 3)", EvalResult("(1 2 3)")),
            ("'(1 . 2)", EvalResult("(1 . 2)")),
            ("'(1 2 . 3)", EvalResult("(1 2 . 3)")),
            ("'((a . b) (c d))", EvalResult("((a . b) (c d))")),
            ("(quote (+ 1 2))", EvalResult("(+ 1 2)")),
            ("''x", EvalResult("(quote x)")),
            ("'hello", EvalResult("hello")),
            ("'()", EvalResult("()")),
            ("(car '(a . b))", EvalResult("a")),
            ("(cdr '(a . b))", EvalResult("b")),
            // === PREDICATES AND IDENTITY ===
            ("(number? 1/2)", EvalResult("#t")),
            ("(integer? 1/2)", EvalResult("#f")),
            ("(integer? 4/2)", EvalResult("#t")),
            ("(boolean? #f)", EvalResult("#t")),
            ("(symbol? 'a)", EvalResult("#t")),
            ("(string? \"a\")", EvalResult("#t")),
            ("(eq? 'a 'a)", EvalResult("#t")),
            ("(eq? 2 2)", EvalResult("#t")),
            ("(eq? '() '())", EvalResult("#t")),
            ("(eq? (cons 1 2) (cons 1 2))", EvalResult("#f")),
            ("(let ((p (cons 1 2))) (eq? p p))", EvalResult("#t")),
            ("(eq? car car)", EvalResult("#t")),
            // === MISC PRIMITIVES ===
            ("(void)", EvalResult("#<void>")),
            ("(exit)", EvalResult("")),
            ("(display \"\")", EvalResult("#<void>")),
            // === FIRST-CLASS RESERVED NAMES ===
            ("((lambda (f) (f 1 2)) cons)", EvalResult("(1 . 2)")),
            ("((lambda (f) (f 1 2)) +)", EvalResult("3")),
            ("((lambda (f) (f 1)) car)", SpecificError("TypeError")),
            ("((lambda (f) (f)) car)", SpecificError("ArityError")),
            ("((lambda (f) (f #f (car 1))) and)", SpecificError("TypeError")),
            ("((lambda (f) (f 1 2 3)) begin)", EvalResult("3")),
            ("((lambda (f) (f)) begin)", EvalResult("#<void>")),
            ("((lambda (f) (f #f 1 2)) if)", EvalResult("2")),
            ("((lambda (f) (f 1 2)) if)", SpecificError("ArityError")),
            ("((lambda (f) (f 'x 1)) define)", SpecificError("MalformedForm")),
            // === PARSE ERRORS SURFACE THROUGH EVAL ===
            ("(if 1 2)", SpecificError("ArityError")),
            ("(car 1 2)", SpecificError("ArityError")),
            ("(lambda (x x) x)", SpecificError("MalformedForm")),
            ("(define 1x 2)", SpecificError("InvalidVariableName")),
            ("(lambda ())", SpecificError("MalformedForm")),
            ("(1 2", AnyError),
        ];

        run_comprehensive_tests(test_cases);
    }

    #[test]
    fn test_environment_sensitive_operations() {
        let environment_test_cases = vec![
            // Pair mutation is visible through every alias
            TestEnvironment(vec![
                test_setup!("(define p (cons 1 2))"),
                test_setup!("(define q p)"),
                test_setup!("(set-car! p 9)"),
                ("(car p)", EvalResult("9")),
                ("q", EvalResult("(9 . 2)")),
                test_setup!("(set-cdr! q '(3))"),
                ("p", EvalResult("(9 3)")),
                ("(set-car! 5 1)", SpecificError("TypeError")),
            ]),
            // Recursive self-reference
            TestEnvironment(vec![
                test_setup!("(define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))"),
                ("(fact 5)", EvalResult("120")),
                ("(fact 20)", EvalResult("2432902008176640000")),
                ("(fact 21)", SpecificError("Overflow")),
                ("fact", EvalResult("#<procedure>")),
            ]),
            // Value definition of a lambda also recurses through the frame
            TestEnvironment(vec![
                test_setup!(
                    "(define countdown (lambda (n) (if (<= n 0) (list) (cons n (countdown (- n 1))))))"
                ),
                ("(countdown 3)", EvalResult("(3 2 1)")),
            ]),
            // Mutual recursion between top-level definitions
            TestEnvironment(vec![
                test_setup!("(define (is-even n) (if (= n 0) #t (is-odd (- n 1))))"),
                test_setup!("(define (is-odd n) (if (= n 0) #f (is-even (- n 1))))"),
                ("(is-even 10)", EvalResult("#t")),
                ("(is-odd 7)", EvalResult("#t")),
            ]),
            // Closures capture their frame by reference
            TestEnvironment(vec![
                test_setup!(
                    "(define (make-counter) (let ((n 0)) (lambda () (set! n (+ n 1)) n)))"
                ),
                test_setup!("(define c1 (make-counter))"),
                test_setup!("(define c2 (make-counter))"),
                ("(c1)", EvalResult("1")),
                ("(c1)", EvalResult("2")),
                ("(c2)", EvalResult("1")),
            ]),
            // set! reaches the nearest binding and never creates one
            TestEnvironment(vec![
                test_setup!("(define x 1)"),
                test_setup!("(define (bump) (set! x (+ x 1)))"),
                test_setup!("(bump)"),
                ("x", EvalResult("2")),
                ("(let ((x 10)) (set! x 20) x)", EvalResult("20")),
                ("x", EvalResult("2")),
                ("(set! y 1)", SpecificError("UnboundAssignment")),
                ("y", SpecificError("UnboundVariable")),
            ]),
            // Redefinition is seen by closures created earlier
            TestEnvironment(vec![
                test_setup!("(define (get) v)"),
                test_setup!("(define v 1)"),
                ("(get)", EvalResult("1")),
                test_setup!("(define v 2)"),
                ("(get)", EvalResult("2")),
            ]),
            // Local bindings shadow reserved names
            TestEnvironment(vec![
                test_setup!("(define (apply-twice car x) (car (car x)))"),
                ("(apply-twice (lambda (n) (* n 2)) 5)", EvalResult("20")),
                ("(let ((if (lambda (a b c) c))) (if 1 2 3))", EvalResult("3")),
                ("(let ((list 5)) list)", EvalResult("5")),
                ("(list 1 2)", EvalResult("(1 2)")),
                test_setup!("(define (square x) (* x x))"),
                ("((lambda (cond) (cond 3)) square)", EvalResult("9")),
            ]),
            // Internal defines mutate the call frame
            TestEnvironment(vec![
                test_setup!(
                    "(define (f x) (define y (* x 2)) (define (g) (+ y 1)) (g))"
                ),
                ("(f 3)", EvalResult("7")),
                ("y", SpecificError("UnboundVariable")),
            ]),
            // Quoted data round-trips through display rendering
            TestEnvironment(vec![
                test_setup!("(define data '(1 (2 . 3) () \"s\" #t 1/2))"),
                ("data", EvalResult("(1 (2 . 3) () \"s\" #t 1/2)")),
                ("(car (cdr data))", EvalResult("(2 . 3)")),
            ]),
            // A quoted literal evaluates to the same pair cells every time
            TestEnvironment(vec![
                test_setup!("(define (f) '(1 2))"),
                test_setup!("(set-car! (f) 9)"),
                ("(f)", EvalResult("(9 2)")),
                ("(eq? (f) (f))", EvalResult("#t")),
            ]),
            // Higher-order procedures
            TestEnvironment(vec![
                test_setup!(
                    "(define (map f xs) (if (null? xs) '() (cons (f (car xs)) (map f (cdr xs)))))"
                ),
                ("(map (lambda (x) (* x x)) '(1 2 3))", EvalResult("(1 4 9)")),
                ("(map car '((1 2) (3 4)))", EvalResult("(1 3)")),
                ("(map not '(#f 1))", EvalResult("(#t #f)")),
            ]),
        ];

        run_tests_in_environment(environment_test_cases);
    }

    #[test]
    fn test_knot_tying_binds_placeholder_first() {
        let env = Environment::new();
        eval_source("(define (self) self)", &env).unwrap();
        let result = eval_source("(self)", &env).unwrap();
        let stored = env.lookup("self").unwrap();
        assert!(result.is_eq(&stored));
        match stored {
            Expr::Procedure(p) => assert!(p.env.ptr_eq(&env)),
            other => panic!("expected procedure, got {other}"),
        }
    }

    #[test]
    fn test_letrec_uninitialized_reference_is_void() {
        let env = Environment::new();
        let result = eval_source("(letrec ((a b) (b 1)) a)", &env).unwrap();
        assert!(matches!(result, Expr::Void));
    }

    #[test]
    fn test_evaluation_depth_limit() {
        let depth_test_environments = vec![TestEnvironment(vec![
            test_setup!("(define (deep n) (if (= n 0) 0 (+ 1 (deep (- n 1)))))"),
            // Deep but bounded recursion runs on a grown stack
            ("(deep 1000)", EvalResult("1000")),
            ("(deep 5000)", SpecificError("EvalDepthExceeded")),
        ])];

        run_tests_in_environment(depth_test_environments);
    }
}
