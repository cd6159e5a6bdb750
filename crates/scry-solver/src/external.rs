// SPDX-License-Identifier: AGPL-3.0

//! External SMT-LIB solver processes

use crate::{parse_model_str, precheck, Model, SolveError, SolverBridge};
use scry_exceptions::{ScryException, UnsatError};
use scry_smt::{free_vars_of, Constraint};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Exit code for timeout
pub const EXIT_TIMEDOUT: i32 = 124;

/// SMT query result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown,
    Error,
}

impl std::fmt::Display for SatResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SatResult::Sat => write!(f, "sat"),
            SatResult::Unsat => write!(f, "unsat"),
            SatResult::Unknown => write!(f, "unknown"),
            SatResult::Error => write!(f, "error"),
        }
    }
}

/// Render a QF_BV query asking for a model
pub fn render_query(constraints: &[Constraint]) -> String {
    let mut content = String::from("(set-logic QF_BV)\n(set-option :produce-models true)\n");
    for (name, sort) in free_vars_of(constraints) {
        content.push_str(&format!("(declare-fun |{}| () {})\n", name, sort));
    }
    for constraint in constraints {
        content.push_str(&format!("(assert {})\n", constraint));
    }
    content.push_str("(check-sat)\n(get-model)\n");
    content
}

/// Dump SMT query to file
pub fn dump_query(constraints: &[Constraint], path: &Path) -> Result<(), std::io::Error> {
    fs::write(path, render_query(constraints))
}

/// Solver output
#[derive(Debug, Clone)]
pub struct SolverOutput {
    pub result: SatResult,
    pub returncode: i32,
    pub query_file: String,
    pub model: Option<Model>,
    pub error: Option<String>,
}

impl SolverOutput {
    pub fn from_result(stdout: &str, stderr: &str, returncode: i32, query_file: String) -> Self {
        let first_line = stdout.lines().next().unwrap_or("").trim();

        let mut output = Self {
            result: SatResult::Error,
            returncode,
            query_file,
            model: None,
            error: None,
        };
        match first_line {
            "sat" => match parse_model_str(stdout) {
                Ok(model) => {
                    output.result = SatResult::Sat;
                    output.model = Some(model);
                }
                Err(e) => output.error = Some(e.to_string()),
            },
            "unsat" => output.result = SatResult::Unsat,
            "unknown" => output.result = SatResult::Unknown,
            _ => output.error = Some(stderr.to_string()),
        }
        output
    }

    pub fn from_error(error: String, query_file: String) -> Self {
        Self {
            result: SatResult::Error,
            returncode: -1,
            query_file,
            model: None,
            error: Some(error),
        }
    }

    pub fn into_model(self) -> Result<Model, SolveError> {
        match self.result {
            SatResult::Sat => Ok(self.model.unwrap_or_default()),
            SatResult::Unsat => Err(UnsatError::new(self.query_file).into()),
            SatResult::Unknown => Err(ScryException::Solver(format!(
                "solver returned unknown for {}{}",
                self.query_file,
                self.error.map(|e| format!(": {}", e)).unwrap_or_default()
            ))
            .into()),
            SatResult::Error => Err(ScryException::Solver(format!(
                "solver failed on {} (exit code {}): {}",
                self.query_file,
                self.returncode,
                self.error.unwrap_or_default().trim()
            ))
            .into()),
        }
    }
}

/// Solve SMT query with external solver
pub fn solve_external(solver_command: &[String], query_file: &Path, timeout: Option<Duration>) -> SolverOutput {
    let query_file_str = query_file.to_string_lossy().to_string();

    let Some((program, args)) = solver_command.split_first() else {
        return SolverOutput::from_error("empty solver command".to_string(), query_file_str);
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .arg(query_file)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return SolverOutput::from_error(format!("Failed to spawn solver: {}", e), query_file_str)
        }
    };

    if let Some(timeout_duration) = timeout {
        match wait_timeout::ChildExt::wait_timeout(&mut child, timeout_duration) {
            Ok(Some(_)) => {}
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                return SolverOutput {
                    result: SatResult::Unknown,
                    returncode: EXIT_TIMEDOUT,
                    query_file: query_file_str,
                    model: None,
                    error: Some("Solver timeout".to_string()),
                };
            }
            Err(e) => {
                return SolverOutput::from_error(format!("Wait error: {}", e), query_file_str)
            }
        }
    }

    match child.wait_with_output() {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            let returncode = output.status.code().unwrap_or(-1);
            SolverOutput::from_result(&stdout, &stderr, returncode, query_file_str)
        }
        Err(e) => SolverOutput::from_error(format!("Failed to read solver output: {}", e), query_file_str),
    }
}

static QUERY_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Bridge to a solver process reading SMT-LIB 2 files
#[derive(Debug, Clone)]
pub struct ExternalSolver {
    command: Vec<String>,
    timeout: Option<Duration>,
    dump_directory: Option<PathBuf>,
}

impl ExternalSolver {
    pub fn new(command: Vec<String>, timeout_ms: u64) -> Self {
        Self {
            command,
            timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            dump_directory: None,
        }
    }

    /// Keep every query, and the solver's answer, in `directory`
    pub fn with_dump_directory(mut self, directory: PathBuf) -> Self {
        self.dump_directory = Some(directory);
        self
    }

    fn query_path(&self) -> PathBuf {
        let n = QUERY_COUNTER.fetch_add(1, Ordering::Relaxed);
        let file_name = format!("scry-{}-{}.smt2", std::process::id(), n);
        match &self.dump_directory {
            Some(dir) => dir.join(file_name),
            None => std::env::temp_dir().join(file_name),
        }
    }
}

impl SolverBridge for ExternalSolver {
    fn solve(&self, constraints: &[Constraint]) -> Result<Model, SolveError> {
        precheck(constraints)?;

        let path = self.query_path();
        dump_query(constraints, &path).map_err(|e| {
            ScryException::Solver(format!("cannot write query {}: {}", path.display(), e))
        })?;

        let output = solve_external(&self.command, &path, self.timeout);
        tracing::debug!(query = %path.display(), result = %output.result, "external solver finished");

        if self.dump_directory.is_some() {
            let answer = format!("{}.out", path.display());
            if let Ok(mut file) = fs::File::create(&answer) {
                let _ = writeln!(file, "{}", output.result);
            }
        } else {
            let _ = fs::remove_file(&path);
        }

        output.into_model()
    }

    fn name(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or("external")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_smt::BitVec;

    #[test]
    fn test_render_query() {
        let c = BitVec::var("caller_1", 256).eq_to(BitVec::constant(1, 256));
        let query = render_query(&[c, Constraint::var("flag")]);
        assert!(query.starts_with("(set-logic QF_BV)\n"));
        assert!(query.contains("(declare-fun |caller_1| () (_ BitVec 256))\n"));
        assert!(query.contains("(declare-fun |flag| () Bool)\n"));
        assert!(query.contains("(assert (= |caller_1| (_ bv1 256)))\n"));
        assert!(query.ends_with("(check-sat)\n(get-model)\n"));
    }

    #[test]
    fn test_dump_query() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.smt2");
        dump_query(&[Constraint::var("p")], &path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("(assert |p|)"));
    }

    #[test]
    fn test_solver_output_from_sat() {
        let out = SolverOutput::from_result(
            "sat\n((define-fun x () (_ BitVec 8) #x05))\n",
            "",
            0,
            "q.smt2".to_string(),
        );
        assert_eq!(out.result, SatResult::Sat);
        assert_eq!(
            out.into_model().unwrap().get("x"),
            Some(&num_bigint::BigUint::from(5u32))
        );
    }

    #[test]
    fn test_solver_output_unsat_and_unknown() {
        let unsat = SolverOutput::from_result("unsat\n", "", 0, "q".to_string());
        assert!(unsat.into_model().unwrap_err().is_unsat());

        let unknown = SolverOutput::from_result("unknown\n", "", 0, "q".to_string());
        assert!(matches!(
            unknown.into_model(),
            Err(SolveError::Failed(ScryException::Solver(_)))
        ));
    }

    #[test]
    fn test_solver_output_from_error() {
        let out = SolverOutput::from_result("", "segfault", 139, "q".to_string());
        assert_eq!(out.result, SatResult::Error);
        assert!(!out.into_model().unwrap_err().is_unsat());
    }

    #[test]
    fn test_missing_solver_binary_is_a_failure() {
        let solver = ExternalSolver::new(vec!["scry-no-such-solver".to_string()], 100);
        let err = solver.solve(&[Constraint::var("p")]).unwrap_err();
        assert!(matches!(err, SolveError::Failed(_)));
    }

    #[test]
    fn test_dump_directory_keeps_queries() {
        let dir = tempfile::tempdir().unwrap();
        let solver = ExternalSolver::new(vec!["scry-no-such-solver".to_string()], 0)
            .with_dump_directory(dir.path().to_path_buf());
        let _ = solver.solve(&[Constraint::var("p")]);
        let kept: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert!(!kept.is_empty());
    }
}
