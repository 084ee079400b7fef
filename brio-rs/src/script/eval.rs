//! brio tree evaluator.
//!
//! Evaluation is cooperative with respect to cancellation: the worker's
//! [`CancelToken`] is checked on every expression node and inside
//! `sleep()`, so an aborted task unwinds at the next suspension point. A
//! tight native computation between checkpoints finishes before the
//! cancellation is observed; that is the documented limitation of
//! cooperative interruption.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::context::ExecutionContext;
use crate::task::CancelToken;

use super::expr::{BinOp, Expr};
use super::stmt::Stmt;
use super::value::Value;
use super::{Engine, EngineError, Evaluated};

/// Granularity of the cancellation check inside `sleep()`.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Evaluate one top-level statement.
///
/// Enforces the call-stack invariant: the context must be back at the root
/// frame when the statement finishes. A deeper stack is an evaluator bug —
/// the context is forcibly reset and an internal error is returned so the
/// loop can report it without dying.
pub fn eval_top(
    engine: &Engine,
    stmt: &Stmt,
    ctx: &mut ExecutionContext,
    cancel: &CancelToken,
) -> Result<Evaluated, EngineError> {
    let result = eval_stmt(engine, stmt, ctx, cancel);

    if ctx.depth() > 1 {
        let depth = ctx.depth();
        ctx.reset();
        return Err(EngineError::Internal(format!(
            "call stack depth {depth} after top-level statement"
        )));
    }
    result
}

fn eval_stmt(
    engine: &Engine,
    stmt: &Stmt,
    ctx: &mut ExecutionContext,
    cancel: &CancelToken,
) -> Result<Evaluated, EngineError> {
    match stmt {
        Stmt::Empty => Ok(Evaluated::Value(Value::Void)),
        Stmt::Expr(e) => Ok(Evaluated::Value(eval_expr(engine, e, ctx, cancel)?)),
        Stmt::Return(e) => {
            let v = match e {
                Some(e) => eval_expr(engine, e, ctx, cancel)?,
                None => Value::Void,
            };
            Ok(Evaluated::Return(v))
        }
        Stmt::FnDef { name, params, body } => {
            engine.define_fn(name, params.clone(), body.clone());
            Ok(Evaluated::Value(Value::Void))
        }
    }
}

pub fn eval_expr(
    engine: &Engine,
    expr: &Expr,
    ctx: &mut ExecutionContext,
    cancel: &CancelToken,
) -> Result<Value, EngineError> {
    if cancel.is_cancelled() {
        return Err(EngineError::Interrupted);
    }

    match expr {
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Float(x) => Ok(Value::Float(*x)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Var(name) => lookup(engine, name, ctx),
        Expr::Assign(name, rhs) => {
            let v = eval_expr(engine, rhs, ctx, cancel)?;
            // Inside a call, assignment binds a local; at top level it
            // writes the shared global namespace.
            if !ctx.set_local(name, v.clone()) {
                engine.set_global(name, v.clone());
            }
            Ok(v)
        }
        Expr::Unary(op, e) => {
            let v = eval_expr(engine, e, ctx, cancel)?;
            match op {
                '-' => Ok(v.arith_sub_from_zero()),
                '!' => Ok(Value::Int(if v.as_bool() { 0 } else { 1 })),
                _ => Err(EngineError::Internal(format!("unknown unary op {op}"))),
            }
        }
        Expr::Bin(op, lhs, rhs) => eval_binop(engine, *op, lhs, rhs, ctx, cancel),
        Expr::Call(name, args) => {
            let mut vals = Vec::with_capacity(args.len());
            for a in args {
                vals.push(eval_expr(engine, a, ctx, cancel)?);
            }
            call(engine, name, vals, ctx, cancel)
        }
    }
}

fn lookup(engine: &Engine, name: &str, ctx: &ExecutionContext) -> Result<Value, EngineError> {
    if let Some(v) = ctx.get_local(name) {
        return Ok(v.clone());
    }
    engine
        .get_global(name)
        .ok_or_else(|| EngineError::Eval(format!("undefined variable `{name}`")))
}

fn eval_binop(
    engine: &Engine,
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut ExecutionContext,
    cancel: &CancelToken,
) -> Result<Value, EngineError> {
    // Short-circuit forms evaluate the right side lazily.
    if op == BinOp::And {
        let l = eval_expr(engine, lhs, ctx, cancel)?;
        if !l.as_bool() {
            return Ok(Value::Int(0));
        }
        let r = eval_expr(engine, rhs, ctx, cancel)?;
        return Ok(Value::Int(r.as_bool() as i64));
    }
    if op == BinOp::Or {
        let l = eval_expr(engine, lhs, ctx, cancel)?;
        if l.as_bool() {
            return Ok(Value::Int(1));
        }
        let r = eval_expr(engine, rhs, ctx, cancel)?;
        return Ok(Value::Int(r.as_bool() as i64));
    }

    let l = eval_expr(engine, lhs, ctx, cancel)?;
    let r = eval_expr(engine, rhs, ctx, cancel)?;
    let out = match op {
        BinOp::Add => l.arith_add(&r),
        BinOp::Sub => l.arith_sub(&r),
        BinOp::Mul => l.arith_mul(&r),
        BinOp::Div => l.arith_div(&r).map_err(EngineError::Eval)?,
        BinOp::Rem => l.arith_rem(&r).map_err(EngineError::Eval)?,
        BinOp::Eq => Value::Int(l.loose_eq(&r) as i64),
        BinOp::Ne => Value::Int(!l.loose_eq(&r) as i64),
        BinOp::Lt => Value::Int((l.compare(&r) == std::cmp::Ordering::Less) as i64),
        BinOp::Le => Value::Int((l.compare(&r) != std::cmp::Ordering::Greater) as i64),
        BinOp::Gt => Value::Int((l.compare(&r) == std::cmp::Ordering::Greater) as i64),
        BinOp::Ge => Value::Int((l.compare(&r) != std::cmp::Ordering::Less) as i64),
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    };
    Ok(out)
}

// ── Calls ─────────────────────────────────────────────────────────────────

fn call(
    engine: &Engine,
    name: &str,
    args: Vec<Value>,
    ctx: &mut ExecutionContext,
    cancel: &CancelToken,
) -> Result<Value, EngineError> {
    // User-defined functions shadow builtins.
    if let Some(def) = engine.get_fn(name) {
        if args.len() != def.params.len() {
            return Err(EngineError::Eval(format!(
                "{name}() takes {} argument(s), got {}",
                def.params.len(),
                args.len()
            )));
        }
        let locals: HashMap<String, Value> =
            def.params.iter().cloned().zip(args).collect();
        ctx.push(name, locals).map_err(EngineError::Eval)?;
        let result = eval_expr(engine, &def.body, ctx, cancel);
        ctx.pop();
        return result;
    }

    call_builtin(engine, name, args, cancel)
}

fn call_builtin(
    engine: &Engine,
    name: &str,
    args: Vec<Value>,
    cancel: &CancelToken,
) -> Result<Value, EngineError> {
    match name {
        "print" => {
            let line = args
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            engine.print_line(&line);
            Ok(Value::Void)
        }
        "sleep" => {
            let total = args.first().map(|v| v.as_int()).unwrap_or(0).max(0) as u64;
            let mut remaining = Duration::from_millis(total);
            while !remaining.is_zero() {
                if cancel.is_cancelled() {
                    return Err(EngineError::Interrupted);
                }
                let slice = remaining.min(SLEEP_SLICE);
                std::thread::sleep(slice);
                remaining -= slice;
            }
            Ok(Value::Void)
        }
        "len" => {
            let v = args
                .first()
                .ok_or_else(|| EngineError::Eval("len() takes 1 argument".into()))?;
            Ok(Value::Int(v.to_string().chars().count() as i64))
        }
        "str" => Ok(Value::Str(
            args.first().map(|v| v.to_string()).unwrap_or_default(),
        )),
        "int" => Ok(Value::Int(args.first().map(|v| v.as_int()).unwrap_or(0))),
        "typeof" => {
            let v = args
                .first()
                .ok_or_else(|| EngineError::Eval("typeof() takes 1 argument".into()))?;
            Ok(Value::Str(v.type_name().to_owned()))
        }
        "millis" => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default();
            Ok(Value::Int(now.as_millis() as i64))
        }
        _ => Err(EngineError::Eval(format!("undefined function `{name}()`"))),
    }
}

impl Value {
    fn arith_sub_from_zero(&self) -> Value {
        Value::Int(0).arith_sub(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::stmt::parse_statement;

    fn eval_str(engine: &Engine, src: &str) -> Result<Evaluated, EngineError> {
        let stmt = parse_statement(src).map_err(EngineError::Parse)?;
        let mut ctx = ExecutionContext::new();
        eval_top(engine, &stmt, &mut ctx, &CancelToken::new())
    }

    fn value(r: Result<Evaluated, EngineError>) -> Value {
        match r.unwrap() {
            Evaluated::Value(v) => v,
            Evaluated::Return(v) => panic!("unexpected return wrapper around {v}"),
        }
    }

    #[test]
    fn arithmetic() {
        let engine = Engine::new();
        assert_eq!(value(eval_str(&engine, "6 * 7")), Value::Int(42));
        assert_eq!(value(eval_str(&engine, "1 + 2 * 3")), Value::Int(7));
        assert_eq!(value(eval_str(&engine, "-(1 + 2)")), Value::Int(-3));
    }

    #[test]
    fn globals_persist_across_statements() {
        let engine = Engine::new();
        value(eval_str(&engine, "x = 40"));
        assert_eq!(value(eval_str(&engine, "x + 2")), Value::Int(42));
    }

    #[test]
    fn undefined_variable_is_an_eval_error() {
        let engine = Engine::new();
        assert!(matches!(
            eval_str(&engine, "nope"),
            Err(EngineError::Eval(_))
        ));
    }

    #[test]
    fn return_produces_the_control_wrapper() {
        let engine = Engine::new();
        match eval_str(&engine, "return 42").unwrap() {
            Evaluated::Return(v) => assert_eq!(v, Value::Int(42)),
            other => panic!("expected Return, got {other:?}"),
        }
    }

    #[test]
    fn user_functions_bind_params_as_locals() {
        let engine = Engine::new();
        value(eval_str(&engine, "fn add(a, b) = a + b"));
        assert_eq!(value(eval_str(&engine, "add(40, 2)")), Value::Int(42));
        // Params did not leak into the global namespace.
        assert!(eval_str(&engine, "a").is_err());
    }

    #[test]
    fn runaway_recursion_hits_the_depth_bound() {
        let engine = Engine::new();
        value(eval_str(&engine, "fn boom(n) = boom(n + 1)"));
        match eval_str(&engine, "boom(0)") {
            Err(EngineError::Eval(msg)) => assert!(msg.contains("call depth")),
            other => panic!("expected depth error, got {other:?}"),
        }
    }

    #[test]
    fn min_int_division_is_an_eval_error_not_a_panic() {
        let engine = Engine::new();
        // Subtraction saturates to i64::MIN; dividing that by -1 must
        // surface as an error, not abort the worker.
        match eval_str(&engine, "(0 - 9223372036854775807 - 1) / -1") {
            Err(EngineError::Eval(msg)) => assert!(msg.contains("overflow"), "got {msg}"),
            other => panic!("expected overflow error, got {other:?}"),
        }
    }

    #[test]
    fn short_circuit_skips_rhs() {
        let engine = Engine::new();
        // The undefined rhs is never evaluated.
        assert_eq!(value(eval_str(&engine, "0 && nope")), Value::Int(0));
        assert_eq!(value(eval_str(&engine, "1 || nope")), Value::Int(1));
    }

    #[test]
    fn cancelled_token_interrupts_evaluation() {
        let engine = Engine::new();
        let stmt = parse_statement("1 + 1").unwrap();
        let mut ctx = ExecutionContext::new();
        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(
            eval_top(&engine, &stmt, &mut ctx, &token),
            Err(EngineError::Interrupted)
        ));
    }

    #[test]
    fn sleep_observes_cancellation() {
        use std::sync::Arc;
        let engine = Arc::new(Engine::new());
        let token = CancelToken::new();
        let t2 = token.clone();
        let e2 = Arc::clone(&engine);
        let worker = std::thread::spawn(move || {
            let stmt = parse_statement("sleep(10000)").unwrap();
            let mut ctx = ExecutionContext::new();
            eval_top(&e2, &stmt, &mut ctx, &t2)
        });
        std::thread::sleep(Duration::from_millis(50));
        token.cancel();
        let result = worker.join().unwrap();
        assert!(matches!(result, Err(EngineError::Interrupted)));
    }
}
