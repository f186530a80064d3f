//! Scalar function registry
//!
//! The rewriter folds function calls over literal arguments only when the
//! function's determinism level permits it at the current phase, and
//! propagates NULL through functions that declare null-preservation. One
//! registry instance serves many concurrent rewrites.

use dashmap::DashMap;
use meridian_common::error::EvalError;
use meridian_common::types::Value;
use std::fmt;
use std::sync::Arc;

/// How stable a function's result is. Ordered from least to most stable:
/// a function may be folded at rewrite time only when its determinism is at
/// or above the phase the rewrite runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Determinism {
    /// Different result on every evaluation (`rand`)
    Nondeterministic,
    /// Stable within one command execution (`now`)
    CommandDeterministic,
    /// Stable for the lifetime of a session (`current_user`, `session_id`)
    SessionDeterministic,
    /// Pure function of its arguments
    Deterministic,
}

/// A scalar function
pub trait ScalarFunction: Send + Sync {
    /// Name of the function; arithmetic uses the canonical operator names
    fn name(&self) -> &str;

    /// Evaluate over fully-bound argument values
    fn invoke(&self, args: &[Value]) -> Result<Value, EvalError>;

    fn determinism(&self) -> Determinism {
        Determinism::Deterministic
    }

    /// Whether a NULL argument always yields a NULL result
    fn preserves_null(&self) -> bool {
        true
    }

    /// Number of arguments (None = variadic)
    fn num_args(&self) -> Option<usize> {
        None
    }
}

/// Registry of scalar functions, keyed case-insensitively
pub struct FunctionRegistry {
    functions: DashMap<String, Arc<dyn ScalarFunction>>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// Create a registry populated with the built-in functions
    pub fn new() -> Self {
        let registry = Self {
            functions: DashMap::new(),
        };

        registry.register(Arc::new(Arithmetic::Add));
        registry.register(Arc::new(Arithmetic::Sub));
        registry.register(Arc::new(Arithmetic::Mul));
        registry.register(Arc::new(Arithmetic::Div));
        registry.register(Arc::new(ConcatFunction));
        registry.register(Arc::new(UpperFunction));
        registry.register(Arc::new(LowerFunction));
        registry.register(Arc::new(LengthFunction));
        registry.register(Arc::new(SubstringFunction));
        registry.register(Arc::new(AbsFunction));
        registry.register(Arc::new(ModFunction));
        registry.register(Arc::new(CoalesceFunction));
        registry.register(Arc::new(NowFunction));
        registry.register(Arc::new(SessionValueFunction::new("current_user")));
        registry.register(Arc::new(SessionValueFunction::new("session_id")));
        registry.register(Arc::new(RandFunction));

        registry
    }

    pub fn register(&self, func: Arc<dyn ScalarFunction>) {
        self.functions.insert(func.name().to_lowercase(), func);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ScalarFunction>> {
        self.functions.get(&name.to_lowercase()).map(|f| f.clone())
    }

    /// Determinism of a named function. Unknown functions are treated as
    /// nondeterministic so that they are never folded.
    pub fn determinism(&self, name: &str) -> Determinism {
        self.get(name)
            .map(|f| f.determinism())
            .unwrap_or(Determinism::Nondeterministic)
    }

    /// Whether a NULL argument to the named function always yields NULL
    pub fn preserves_null(&self, name: &str) -> bool {
        self.get(name).map(|f| f.preserves_null()).unwrap_or(false)
    }

    /// Invoke a function over bound argument values
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        let func = self
            .get(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        if let Some(expected) = func.num_args() {
            if args.len() != expected {
                return Err(EvalError::FunctionFailed {
                    name: name.to_string(),
                    reason: format!("expects {} arguments, got {}", expected, args.len()),
                });
            }
        }
        func.invoke(args)
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.len())
            .finish()
    }
}

// ============================================================================
// Built-in functions
// ============================================================================

/// Canonical binary arithmetic: `+ - * /`
enum Arithmetic {
    Add,
    Sub,
    Mul,
    Div,
}

impl Arithmetic {
    fn apply_i64(&self, l: i64, r: i64) -> Result<i64, EvalError> {
        match self {
            Arithmetic::Add => l.checked_add(r).ok_or(EvalError::NumericOverflow),
            Arithmetic::Sub => l.checked_sub(r).ok_or(EvalError::NumericOverflow),
            Arithmetic::Mul => l.checked_mul(r).ok_or(EvalError::NumericOverflow),
            Arithmetic::Div => {
                if r == 0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    l.checked_div(r).ok_or(EvalError::NumericOverflow)
                }
            }
        }
    }

    fn apply_f64(&self, l: f64, r: f64) -> Result<f64, EvalError> {
        match self {
            Arithmetic::Add => Ok(l + r),
            Arithmetic::Sub => Ok(l - r),
            Arithmetic::Mul => Ok(l * r),
            Arithmetic::Div => {
                if r == 0.0 {
                    Err(EvalError::DivisionByZero)
                } else {
                    Ok(l / r)
                }
            }
        }
    }
}

impl ScalarFunction for Arithmetic {
    fn name(&self) -> &str {
        match self {
            Arithmetic::Add => "+",
            Arithmetic::Sub => "-",
            Arithmetic::Mul => "*",
            Arithmetic::Div => "/",
        }
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        let (l, r) = match args {
            [l, r] => (l, r),
            _ => {
                return Err(EvalError::FunctionFailed {
                    name: self.name().to_string(),
                    reason: "expects 2 arguments".to_string(),
                })
            }
        };
        if l.is_null() || r.is_null() {
            return Ok(Value::Null);
        }
        // Float operands compute in f64; otherwise checked integer math in
        // the wider of the two operand widths
        match (l, r) {
            (Value::Float32(_) | Value::Float64(_), _) | (_, Value::Float32(_) | Value::Float64(_)) => {
                let (a, b) = (as_f64(l, self.name())?, as_f64(r, self.name())?);
                Ok(Value::Float64(self.apply_f64(a, b)?))
            }
            _ => {
                let (a, b) = (as_i64(l, self.name())?, as_i64(r, self.name())?);
                let out = self.apply_i64(a, b)?;
                match (l, r) {
                    (Value::Int64(_), _) | (_, Value::Int64(_)) => Ok(Value::Int64(out)),
                    _ => {
                        let narrowed = i32::try_from(out).map_err(|_| EvalError::NumericOverflow)?;
                        Ok(Value::Int32(narrowed))
                    }
                }
            }
        }
    }

    fn num_args(&self) -> Option<usize> {
        Some(2)
    }
}

fn as_i64(v: &Value, func: &str) -> Result<i64, EvalError> {
    v.as_i64().ok_or_else(|| EvalError::FunctionFailed {
        name: func.to_string(),
        reason: format!("expected a numeric argument, got {}", v.data_type()),
    })
}

fn as_f64(v: &Value, func: &str) -> Result<f64, EvalError> {
    v.as_f64().ok_or_else(|| EvalError::FunctionFailed {
        name: func.to_string(),
        reason: format!("expected a numeric argument, got {}", v.data_type()),
    })
}

fn as_str<'a>(v: &'a Value, func: &str) -> Result<&'a str, EvalError> {
    v.as_str().ok_or_else(|| EvalError::FunctionFailed {
        name: func.to_string(),
        reason: format!("expected a string argument, got {}", v.data_type()),
    })
}

/// `||` string concatenation
struct ConcatFunction;

impl ScalarFunction for ConcatFunction {
    fn name(&self) -> &str {
        "||"
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        if args.iter().any(Value::is_null) {
            return Ok(Value::Null);
        }
        let mut out = String::new();
        for a in args {
            out.push_str(as_str(a, "||")?);
        }
        Ok(Value::String(Arc::from(out.as_str())))
    }

    fn num_args(&self) -> Option<usize> {
        Some(2)
    }
}

struct UpperFunction;

impl ScalarFunction for UpperFunction {
    fn name(&self) -> &str {
        "upper"
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        match args.first() {
            Some(Value::Null) => Ok(Value::Null),
            Some(v) => Ok(Value::String(Arc::from(
                as_str(v, "upper")?.to_uppercase().as_str(),
            ))),
            None => Err(EvalError::FunctionFailed {
                name: "upper".to_string(),
                reason: "expects 1 argument".to_string(),
            }),
        }
    }

    fn num_args(&self) -> Option<usize> {
        Some(1)
    }
}

struct LowerFunction;

impl ScalarFunction for LowerFunction {
    fn name(&self) -> &str {
        "lower"
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        match args.first() {
            Some(Value::Null) => Ok(Value::Null),
            Some(v) => Ok(Value::String(Arc::from(
                as_str(v, "lower")?.to_lowercase().as_str(),
            ))),
            None => Err(EvalError::FunctionFailed {
                name: "lower".to_string(),
                reason: "expects 1 argument".to_string(),
            }),
        }
    }

    fn num_args(&self) -> Option<usize> {
        Some(1)
    }
}

struct LengthFunction;

impl ScalarFunction for LengthFunction {
    fn name(&self) -> &str {
        "length"
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        match args.first() {
            Some(Value::Null) => Ok(Value::Null),
            Some(v) => Ok(Value::Int32(as_str(v, "length")?.chars().count() as i32)),
            None => Err(EvalError::FunctionFailed {
                name: "length".to_string(),
                reason: "expects 1 argument".to_string(),
            }),
        }
    }

    fn num_args(&self) -> Option<usize> {
        Some(1)
    }
}

/// `substring(string, start [, length])` with 1-based start
struct SubstringFunction;

impl ScalarFunction for SubstringFunction {
    fn name(&self) -> &str {
        "substring"
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        if !(2..=3).contains(&args.len()) {
            return Err(EvalError::FunctionFailed {
                name: "substring".to_string(),
                reason: format!("expects 2 or 3 arguments, got {}", args.len()),
            });
        }
        if args.iter().any(Value::is_null) {
            return Ok(Value::Null);
        }
        let s = as_str(&args[0], "substring")?;
        let start = as_i64(&args[1], "substring")?.max(1) as usize - 1;
        let chars: Vec<char> = s.chars().collect();
        let end = match args.get(2) {
            Some(len) => (start + as_i64(len, "substring")?.max(0) as usize).min(chars.len()),
            None => chars.len(),
        };
        let out: String = chars
            .get(start.min(chars.len())..end)
            .unwrap_or(&[])
            .iter()
            .collect();
        Ok(Value::String(Arc::from(out.as_str())))
    }
}

struct AbsFunction;

impl ScalarFunction for AbsFunction {
    fn name(&self) -> &str {
        "abs"
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        match args.first() {
            Some(Value::Null) => Ok(Value::Null),
            Some(Value::Int16(v)) => v
                .checked_abs()
                .map(Value::Int16)
                .ok_or(EvalError::NumericOverflow),
            Some(Value::Int32(v)) => v
                .checked_abs()
                .map(Value::Int32)
                .ok_or(EvalError::NumericOverflow),
            Some(Value::Int64(v)) => v
                .checked_abs()
                .map(Value::Int64)
                .ok_or(EvalError::NumericOverflow),
            Some(Value::Float32(v)) => Ok(Value::Float32(v.abs())),
            Some(Value::Float64(v)) => Ok(Value::Float64(v.abs())),
            _ => Err(EvalError::FunctionFailed {
                name: "abs".to_string(),
                reason: "expects a numeric argument".to_string(),
            }),
        }
    }

    fn num_args(&self) -> Option<usize> {
        Some(1)
    }
}

struct ModFunction;

impl ScalarFunction for ModFunction {
    fn name(&self) -> &str {
        "mod"
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        let (l, r) = match args {
            [l, r] => (l, r),
            _ => {
                return Err(EvalError::FunctionFailed {
                    name: "mod".to_string(),
                    reason: "expects 2 arguments".to_string(),
                })
            }
        };
        if l.is_null() || r.is_null() {
            return Ok(Value::Null);
        }
        let (a, b) = (as_i64(l, "mod")?, as_i64(r, "mod")?);
        if b == 0 {
            return Err(EvalError::DivisionByZero);
        }
        Ok(Value::Int64(a % b))
    }

    fn num_args(&self) -> Option<usize> {
        Some(2)
    }
}

/// First non-null argument, or NULL
struct CoalesceFunction;

impl ScalarFunction for CoalesceFunction {
    fn name(&self) -> &str {
        "coalesce"
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, EvalError> {
        Ok(args
            .iter()
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn preserves_null(&self) -> bool {
        false
    }
}

/// Current timestamp, stable within a command
struct NowFunction;

impl ScalarFunction for NowFunction {
    fn name(&self) -> &str {
        "now"
    }

    fn invoke(&self, _args: &[Value]) -> Result<Value, EvalError> {
        Ok(Value::Timestamp(chrono::Utc::now().timestamp_micros()))
    }

    fn determinism(&self) -> Determinism {
        Determinism::CommandDeterministic
    }

    fn preserves_null(&self) -> bool {
        false
    }

    fn num_args(&self) -> Option<usize> {
        Some(0)
    }
}

/// Session-scoped values. The actual value comes from the rewrite context's
/// session bindings; invoking one without a binding is an error.
struct SessionValueFunction {
    name: &'static str,
}

impl SessionValueFunction {
    fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl ScalarFunction for SessionValueFunction {
    fn name(&self) -> &str {
        self.name
    }

    fn invoke(&self, _args: &[Value]) -> Result<Value, EvalError> {
        Err(EvalError::FunctionFailed {
            name: self.name.to_string(),
            reason: "no session binding available".to_string(),
        })
    }

    fn determinism(&self) -> Determinism {
        Determinism::SessionDeterministic
    }

    fn preserves_null(&self) -> bool {
        false
    }

    fn num_args(&self) -> Option<usize> {
        Some(0)
    }
}

struct RandFunction;

impl ScalarFunction for RandFunction {
    fn name(&self) -> &str {
        "rand"
    }

    fn invoke(&self, _args: &[Value]) -> Result<Value, EvalError> {
        Err(EvalError::FunctionFailed {
            name: "rand".to_string(),
            reason: "cannot be evaluated at rewrite time".to_string(),
        })
    }

    fn determinism(&self) -> Determinism {
        Determinism::Nondeterministic
    }

    fn preserves_null(&self) -> bool {
        false
    }

    fn num_args(&self) -> Option<usize> {
        Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism_ordering() {
        assert!(Determinism::Nondeterministic < Determinism::CommandDeterministic);
        assert!(Determinism::CommandDeterministic < Determinism::SessionDeterministic);
        assert!(Determinism::SessionDeterministic < Determinism::Deterministic);
    }

    #[test]
    fn test_arithmetic() {
        let reg = FunctionRegistry::new();
        assert_eq!(
            reg.invoke("+", &[Value::Int32(2), Value::Int32(3)]).unwrap(),
            Value::Int32(5)
        );
        assert_eq!(
            reg.invoke("*", &[Value::Int64(4), Value::Int32(3)]).unwrap(),
            Value::Int64(12)
        );
        assert_eq!(
            reg.invoke("/", &[Value::Float64(1.0), Value::Float64(4.0)])
                .unwrap(),
            Value::Float64(0.25)
        );
        // Integer division truncates
        assert_eq!(
            reg.invoke("/", &[Value::Int32(7), Value::Int32(2)]).unwrap(),
            Value::Int32(3)
        );
    }

    #[test]
    fn test_arithmetic_errors() {
        let reg = FunctionRegistry::new();
        assert_eq!(
            reg.invoke("/", &[Value::Int32(1), Value::Int32(0)]),
            Err(EvalError::DivisionByZero)
        );
        assert_eq!(
            reg.invoke("+", &[Value::Int64(i64::MAX), Value::Int64(1)]),
            Err(EvalError::NumericOverflow)
        );
    }

    #[test]
    fn test_null_propagation() {
        let reg = FunctionRegistry::new();
        assert_eq!(
            reg.invoke("+", &[Value::Null, Value::Int32(1)]).unwrap(),
            Value::Null
        );
        assert_eq!(reg.invoke("upper", &[Value::Null]).unwrap(), Value::Null);
        assert!(reg.preserves_null("upper"));
        assert!(!reg.preserves_null("coalesce"));
    }

    #[test]
    fn test_string_functions() {
        let reg = FunctionRegistry::new();
        assert_eq!(
            reg.invoke("upper", &[Value::String("abc".into())]).unwrap(),
            Value::String("ABC".into())
        );
        assert_eq!(
            reg.invoke("length", &[Value::String("héllo".into())])
                .unwrap(),
            Value::Int32(5)
        );
        assert_eq!(
            reg.invoke(
                "substring",
                &[
                    Value::String("hello".into()),
                    Value::Int32(2),
                    Value::Int32(3)
                ]
            )
            .unwrap(),
            Value::String("ell".into())
        );
        assert_eq!(
            reg.invoke(
                "||",
                &[Value::String("a".into()), Value::String("b".into())]
            )
            .unwrap(),
            Value::String("ab".into())
        );
    }

    #[test]
    fn test_coalesce() {
        let reg = FunctionRegistry::new();
        assert_eq!(
            reg.invoke("coalesce", &[Value::Null, Value::Int32(2), Value::Int32(3)])
                .unwrap(),
            Value::Int32(2)
        );
        assert_eq!(reg.invoke("coalesce", &[Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn test_unknown_function_is_never_folded() {
        let reg = FunctionRegistry::new();
        assert_eq!(reg.determinism("frobnicate"), Determinism::Nondeterministic);
        assert_eq!(
            reg.invoke("frobnicate", &[]),
            Err(EvalError::UnknownFunction("frobnicate".to_string()))
        );
    }

    #[test]
    fn test_session_and_random_levels() {
        let reg = FunctionRegistry::new();
        assert_eq!(
            reg.determinism("current_user"),
            Determinism::SessionDeterministic
        );
        assert_eq!(reg.determinism("now"), Determinism::CommandDeterministic);
        assert_eq!(reg.determinism("rand"), Determinism::Nondeterministic);
        assert_eq!(reg.determinism("+"), Determinism::Deterministic);
    }
}
