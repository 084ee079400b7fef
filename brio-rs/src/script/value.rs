//! Runtime value type for the brio scripting language.
//!
//! brio is dynamically typed; the interpreter coerces freely between
//! integers, floats, and strings. `Void` is the "no value" result of
//! statements that produce nothing — it is never recorded into the
//! result slots and prints as `void`.

use std::fmt;

/// A brio runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Void,
}

impl Default for Value {
    fn default() -> Self {
        Value::Void
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => {
                // Print floats without an exponent, with a trailing .0 so
                // the type stays visible.
                if x.fract() == 0.0 && x.abs() < 1e15 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Str(s) => write!(f, "{s}"),
            Value::Void => write!(f, "void"),
        }
    }
}

impl Value {
    /// Coerce to boolean: `0`, `0.0`, `""`, `"0"`, and `void` are falsy.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty() && s != "0",
            Value::Void => false,
        }
    }

    /// Coerce to `i64` (0 for unparseable strings and `void`).
    pub fn as_int(&self) -> i64 {
        match self {
            Value::Int(n) => *n,
            Value::Float(x) => *x as i64,
            Value::Str(s) => s.trim().parse().unwrap_or(0),
            Value::Void => 0,
        }
    }

    /// Coerce to `f64`.
    pub fn as_float(&self) -> f64 {
        match self {
            Value::Int(n) => *n as f64,
            Value::Float(x) => *x,
            Value::Str(s) => s.trim().parse().unwrap_or(0.0),
            Value::Void => 0.0,
        }
    }

    /// Name of the type, as shown by `typeof()` and the result echo.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "real",
            Value::Str(_) => "string",
            Value::Void => "void",
        }
    }

    // ── Arithmetic helpers ────────────────────────────────────────────────

    /// Common numeric type for a binary operation: (lhs, rhs, is_float).
    fn numeric_promote(a: &Value, b: &Value) -> (f64, f64, bool) {
        let is_float = matches!(a, Value::Float(_))
            || matches!(b, Value::Float(_))
            || matches!(a, Value::Str(s) if s.contains('.'))
            || matches!(b, Value::Str(s) if s.contains('.'));
        (a.as_float(), b.as_float(), is_float)
    }

    fn make_numeric(f: f64, is_float: bool) -> Value {
        if is_float {
            Value::Float(f)
        } else {
            Value::Int(f as i64)
        }
    }

    /// `+` — string concatenation if either side is a string, numeric
    /// addition otherwise.
    pub fn arith_add(&self, rhs: &Value) -> Value {
        if matches!(self, Value::Str(_)) || matches!(rhs, Value::Str(_)) {
            return Value::Str(format!("{self}{rhs}"));
        }
        let (a, b, is_float) = Self::numeric_promote(self, rhs);
        Self::make_numeric(a + b, is_float)
    }

    pub fn arith_sub(&self, rhs: &Value) -> Value {
        let (a, b, is_float) = Self::numeric_promote(self, rhs);
        Self::make_numeric(a - b, is_float)
    }

    pub fn arith_mul(&self, rhs: &Value) -> Value {
        let (a, b, is_float) = Self::numeric_promote(self, rhs);
        Self::make_numeric(a * b, is_float)
    }

    pub fn arith_div(&self, rhs: &Value) -> Result<Value, String> {
        let (a, b, is_float) = Self::numeric_promote(self, rhs);
        if b == 0.0 {
            return Err("division by zero".to_owned());
        }
        if is_float {
            Ok(Value::Float(a / b))
        } else {
            // i64::MIN / -1 has no representable result.
            self.as_int()
                .checked_div(rhs.as_int())
                .map(Value::Int)
                .ok_or_else(|| "integer overflow in division".to_owned())
        }
    }

    pub fn arith_rem(&self, rhs: &Value) -> Result<Value, String> {
        let b = rhs.as_int();
        if b == 0 {
            return Err("division by zero".to_owned());
        }
        self.as_int()
            .checked_rem(b)
            .map(Value::Int)
            .ok_or_else(|| "integer overflow in remainder".to_owned())
    }

    /// Compare for the relational operators. Strings compare
    /// lexicographically, everything else numerically.
    pub fn compare(&self, rhs: &Value) -> std::cmp::Ordering {
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            _ => self
                .as_float()
                .partial_cmp(&rhs.as_float())
                .unwrap_or(std::cmp::Ordering::Equal),
        }
    }

    /// Equality for `==` / `!=`: numeric when both sides look numeric,
    /// string comparison otherwise.
    pub fn loose_eq(&self, rhs: &Value) -> bool {
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Void, Value::Void) => true,
            (Value::Void, _) | (_, Value::Void) => false,
            _ => self.as_float() == rhs.as_float(),
        }
    }
}
