//! Reference evaluation runtime.
//!
//! `FactEvaluator` interprets a small s-expression language over an
//! in-memory fact store. It exists to exercise every path of the session
//! core: fact assertion and querying, output capture, capability checks for
//! filesystem/network/process operations, and memory-ceiling accounting.
//! Production embedders are expected to bring their own [`Evaluator`].

mod parser;

use std::net::{TcpListener, TcpStream};

use crate::capture::CaptureSink;
use crate::error::{EvalError, InitError};
use crate::evaluator::{Evaluator, MemoryLimit};
use crate::value::Value;
use parser::Expr;
use policy::{AccessRequest, CapabilityPolicy};

/// Fact-store interpreter confined by a capability policy and memory ceiling.
pub struct FactEvaluator {
    policy: CapabilityPolicy,
    limit: MemoryLimit,
    used: u64,
    facts: Vec<Value>,
    stdout: CaptureSink,
    stderr: CaptureSink,
}

impl Evaluator for FactEvaluator {
    fn start(
        policy: CapabilityPolicy,
        limit: MemoryLimit,
        stdout: CaptureSink,
        stderr: CaptureSink,
    ) -> Result<Self, InitError> {
        Ok(Self {
            policy,
            limit,
            used: 0,
            facts: Vec::new(),
            stdout,
            stderr,
        })
    }

    fn submit(&mut self, expr: &str) -> Result<Value, EvalError> {
        let parsed = parser::parse(expr).map_err(|e| EvalError::Syntax(e.to_string()))?;
        self.eval(&parsed)
    }
}

impl FactEvaluator {
    fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Atom(name) => Ok(Value::Atom(name.clone())),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::List(items) => self.apply(items),
        }
    }

    fn apply(&mut self, items: &[Expr]) -> Result<Value, EvalError> {
        let Some(Expr::Atom(op)) = items.first() else {
            return Err(EvalError::Runtime(
                "expected an operation atom in head position".into(),
            ));
        };
        let args = &items[1..];

        match op.as_str() {
            "assert" => self.op_assert(args),
            "query" => self.op_query(args),
            "retract" => self.op_retract(args),
            "print" => self.op_print(args, false),
            "eprint" => self.op_print(args, true),
            "read-file" => self.op_read_file(args),
            "write-file" => self.op_write_file(args),
            "connect" => self.op_connect(args),
            "listen" => self.op_listen(args),
            "exec" => self.op_exec(args),
            "alloc" => self.op_alloc(args),
            "list" => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            }
            "error" => {
                let msg = one(args, "error")?;
                Err(EvalError::Runtime(self.string(msg, "error")?))
            }
            other => Err(EvalError::Runtime(format!("unknown operation: {other}"))),
        }
    }

    /// Store a fact, charging its footprint against the memory ceiling.
    fn op_assert(&mut self, args: &[Expr]) -> Result<Value, EvalError> {
        let arg = one(args, "assert")?;
        let fact = literal(arg);
        self.charge(fact.heap_size() as u64)?;
        self.facts.push(fact);
        Ok(Value::atom("ok"))
    }

    /// Return the canonical success marker followed by all matching facts.
    fn op_query(&mut self, args: &[Expr]) -> Result<Value, EvalError> {
        let arg = one(args, "query")?;
        let pattern = literal(arg);
        let matches: Vec<Value> = self
            .facts
            .iter()
            .filter(|fact| matches_pattern(&pattern, fact))
            .cloned()
            .collect();
        Ok(Value::List(vec![Value::atom("ok"), Value::List(matches)]))
    }

    /// Remove matching facts, releasing their footprint; returns the count.
    fn op_retract(&mut self, args: &[Expr]) -> Result<Value, EvalError> {
        let arg = one(args, "retract")?;
        let pattern = literal(arg);
        let before = self.facts.len();
        let mut freed = 0u64;
        self.facts.retain(|fact| {
            if matches_pattern(&pattern, fact) {
                freed += fact.heap_size() as u64;
                false
            } else {
                true
            }
        });
        self.used = self.used.saturating_sub(freed);
        Ok(Value::Int((before - self.facts.len()) as i64))
    }

    fn op_print(&mut self, args: &[Expr], to_stderr: bool) -> Result<Value, EvalError> {
        let mut rendered = String::new();
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                rendered.push(' ');
            }
            match self.eval(arg)? {
                // String contents go out raw, without the quoting Display adds.
                Value::Str(s) => rendered.push_str(&s),
                other => rendered.push_str(&other.to_string()),
            }
        }
        let sink = if to_stderr { &self.stderr } else { &self.stdout };
        sink.write_str(&rendered).map_err(|_| EvalError::Terminated)?;
        Ok(Value::Unit)
    }

    fn op_read_file(&mut self, args: &[Expr]) -> Result<Value, EvalError> {
        let arg = one(args, "read-file")?;
        let path = self.string(arg, "read-file")?;
        self.policy.require(&AccessRequest::read(&path))?;
        let content = std::fs::read_to_string(&path)
            .map_err(|e| EvalError::Runtime(format!("read-file {path}: {e}")))?;
        Ok(Value::Str(content))
    }

    fn op_write_file(&mut self, args: &[Expr]) -> Result<Value, EvalError> {
        let (path_arg, data_arg) = two(args, "write-file")?;
        let path = self.string(path_arg, "write-file")?;
        let data = self.string(data_arg, "write-file")?;
        self.policy.require(&AccessRequest::write(&path))?;
        std::fs::write(&path, data)
            .map_err(|e| EvalError::Runtime(format!("write-file {path}: {e}")))?;
        Ok(Value::Unit)
    }

    fn op_connect(&mut self, args: &[Expr]) -> Result<Value, EvalError> {
        let (host_arg, port_arg) = two(args, "connect")?;
        let host = self.string(host_arg, "connect")?;
        let port = self.port(port_arg, "connect")?;
        let target = format!("{host}:{port}");
        self.policy.require(&AccessRequest::network(&target))?;
        TcpStream::connect(&target)
            .map_err(|e| EvalError::Runtime(format!("connect {target}: {e}")))?;
        Ok(Value::Unit)
    }

    fn op_listen(&mut self, args: &[Expr]) -> Result<Value, EvalError> {
        let port_arg = one(args, "listen")?;
        let port = self.port(port_arg, "listen")?;
        self.policy
            .require(&AccessRequest::network(format!("0.0.0.0:{port}")))?;
        TcpListener::bind(("127.0.0.1", port))
            .map_err(|e| EvalError::Runtime(format!("listen on {port}: {e}")))?;
        Ok(Value::Unit)
    }

    fn op_exec(&mut self, args: &[Expr]) -> Result<Value, EvalError> {
        let arg = one(args, "exec")?;
        let command = self.string(arg, "exec")?;
        self.policy.require(&AccessRequest::execute(&command))?;

        let output = std::process::Command::new("/bin/sh")
            .arg("-c")
            .arg(&command)
            .output()
            .map_err(|e| EvalError::Runtime(format!("exec {command}: {e}")))?;
        self.stdout
            .write(&output.stdout)
            .map_err(|_| EvalError::Terminated)?;
        self.stderr
            .write(&output.stderr)
            .map_err(|_| EvalError::Terminated)?;
        Ok(Value::Int(i64::from(output.status.code().unwrap_or(-1))))
    }

    /// Charge raw ballast against the ceiling without storing anything
    /// useful. The unbounded-allocation primitive.
    fn op_alloc(&mut self, args: &[Expr]) -> Result<Value, EvalError> {
        let arg = one(args, "alloc")?;
        let bytes = match self.eval(arg)? {
            Value::Int(n) if n >= 0 => n as u64,
            other => {
                return Err(EvalError::Runtime(format!(
                    "alloc expects a non-negative integer, got {other}"
                )));
            }
        };
        self.charge(bytes)?;
        Ok(Value::atom("ok"))
    }

    fn charge(&mut self, bytes: u64) -> Result<(), EvalError> {
        self.used = self.used.saturating_add(bytes);
        if self.used > self.limit.bytes() {
            return Err(EvalError::ResourceExhausted {
                used: self.used,
                limit: self.limit.bytes(),
            });
        }
        Ok(())
    }

    fn string(&mut self, expr: &Expr, op: &str) -> Result<String, EvalError> {
        match self.eval(expr)? {
            Value::Str(s) => Ok(s),
            other => Err(EvalError::Runtime(format!(
                "{op} expects a string, got {other}"
            ))),
        }
    }

    fn port(&mut self, expr: &Expr, op: &str) -> Result<u16, EvalError> {
        match self.eval(expr)? {
            Value::Int(n) if (0..=i64::from(u16::MAX)).contains(&n) => Ok(n as u16),
            other => Err(EvalError::Runtime(format!(
                "{op} expects a port number, got {other}"
            ))),
        }
    }
}

fn one<'a>(args: &'a [Expr], op: &str) -> Result<&'a Expr, EvalError> {
    match args {
        [a] => Ok(a),
        _ => Err(arity(op, 1)),
    }
}

fn two<'a>(args: &'a [Expr], op: &str) -> Result<(&'a Expr, &'a Expr), EvalError> {
    match args {
        [a, b] => Ok((a, b)),
        _ => Err(arity(op, 2)),
    }
}

fn arity(op: &str, n: usize) -> EvalError {
    EvalError::Runtime(format!("{op} takes exactly {n} argument(s)"))
}

/// Convert an expression to a data value without evaluating it.
fn literal(expr: &Expr) -> Value {
    match expr {
        Expr::Atom(name) => Value::Atom(name.clone()),
        Expr::Int(n) => Value::Int(*n),
        Expr::Str(s) => Value::Str(s.clone()),
        Expr::List(items) => Value::List(items.iter().map(literal).collect()),
    }
}

/// Structural match with `_` as the wildcard term.
fn matches_pattern(pattern: &Value, fact: &Value) -> bool {
    match (pattern, fact) {
        (Value::Atom(name), _) if name == "_" => true,
        (Value::List(ps), Value::List(fs)) => {
            ps.len() == fs.len() && ps.iter().zip(fs).all(|(p, f)| matches_pattern(p, f))
        }
        _ => pattern == fact,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{self, OutputCapture, DEFAULT_CAPTURE_CAPACITY};
    use policy::{AccessKind, AllowRules};

    fn evaluator(
        policy: CapabilityPolicy,
        limit: MemoryLimit,
    ) -> (FactEvaluator, OutputCapture, OutputCapture) {
        let (stdout_sink, stdout) = capture::bounded(DEFAULT_CAPTURE_CAPACITY);
        let (stderr_sink, stderr) = capture::bounded(DEFAULT_CAPTURE_CAPACITY);
        let ev = FactEvaluator::start(policy, limit, stdout_sink, stderr_sink).unwrap();
        (ev, stdout, stderr)
    }

    fn deny_all() -> CapabilityPolicy {
        CapabilityPolicy::default()
    }

    #[test]
    fn assert_then_query_returns_marker_and_fact() {
        let (mut ev, _, _) = evaluator(deny_all(), MemoryLimit::DEFAULT);
        assert_eq!(
            ev.submit("(assert (parent tom bob))").unwrap(),
            Value::atom("ok")
        );

        let fact = Value::List(vec![
            Value::atom("parent"),
            Value::atom("tom"),
            Value::atom("bob"),
        ]);
        assert_eq!(
            ev.submit("(query (parent tom bob))").unwrap(),
            Value::List(vec![Value::atom("ok"), Value::List(vec![fact])])
        );
    }

    #[test]
    fn wildcard_matches_any_term() {
        let (mut ev, _, _) = evaluator(deny_all(), MemoryLimit::DEFAULT);
        ev.submit("(assert (parent tom bob))").unwrap();
        ev.submit("(assert (parent tom liz))").unwrap();
        ev.submit("(assert (age tom 61))").unwrap();

        let Value::List(result) = ev.submit("(query (parent tom _))").unwrap() else {
            panic!("query did not return a list");
        };
        assert_eq!(result[0], Value::atom("ok"));
        let Value::List(matches) = &result[1] else {
            panic!("result set is not a list");
        };
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn retract_removes_and_releases() {
        let limit = MemoryLimit::from_bytes(4096);
        let (mut ev, _, _) = evaluator(deny_all(), limit);

        ev.submit("(alloc 3000)").unwrap();
        ev.submit("(assert (ballast))").unwrap();
        assert_eq!(ev.submit("(retract (ballast))").unwrap(), Value::Int(1));

        // The fact is gone and its footprint released.
        assert_eq!(
            ev.submit("(query (ballast))").unwrap(),
            Value::List(vec![Value::atom("ok"), Value::List(vec![])])
        );
    }

    #[test]
    fn alloc_past_the_ceiling_is_out_of_memory() {
        let (mut ev, _, _) = evaluator(deny_all(), MemoryLimit::from_bytes(4096));
        ev.submit("(alloc 3000)").unwrap();
        let err = ev.submit("(alloc 3000)").unwrap_err();
        assert!(matches!(err, EvalError::ResourceExhausted { .. }));
        assert!(err.to_string().contains("out of memory"));
    }

    #[test]
    fn print_goes_to_stdout_eprint_to_stderr() {
        let (mut ev, stdout, stderr) = evaluator(deny_all(), MemoryLimit::DEFAULT);
        ev.submit(r#"(print "hello " world)"#).unwrap();
        ev.submit(r#"(eprint "oops")"#).unwrap();
        assert_eq!(stdout.drain(), b"hello  world");
        assert_eq!(stderr.drain(), b"oops");
    }

    #[test]
    fn denied_write_names_the_kind() {
        let (mut ev, _, _) = evaluator(deny_all(), MemoryLimit::DEFAULT);
        let err = ev.submit(r#"(write-file "/tmp/x" "data")"#).unwrap_err();
        match err {
            EvalError::AccessDenied { kind, .. } => assert_eq!(kind, AccessKind::Write),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn read_allowed_inside_subtree() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("greeting.txt");
        std::fs::write(&file, "hi there").unwrap();

        let policy = CapabilityPolicy {
            allow: AllowRules {
                fs_read: vec![dir.path().to_path_buf()],
                ..AllowRules::default()
            },
        };
        let (mut ev, _, _) = evaluator(policy, MemoryLimit::DEFAULT);

        let expr = format!(r#"(read-file "{}")"#, file.display());
        assert_eq!(ev.submit(&expr).unwrap(), Value::Str("hi there".into()));

        let err = ev.submit(r#"(read-file "/etc/hostname")"#).unwrap_err();
        assert!(matches!(
            err,
            EvalError::AccessDenied {
                kind: AccessKind::Read,
                ..
            }
        ));
    }

    #[test]
    fn malformed_and_unknown_inputs() {
        let (mut ev, _, _) = evaluator(deny_all(), MemoryLimit::DEFAULT);
        assert!(matches!(
            ev.submit("(assert").unwrap_err(),
            EvalError::Syntax(_)
        ));
        assert!(matches!(
            ev.submit("(frobnicate 1)").unwrap_err(),
            EvalError::Runtime(_)
        ));
        assert!(matches!(
            ev.submit("(assert a b)").unwrap_err(),
            EvalError::Runtime(_)
        ));
    }
}
