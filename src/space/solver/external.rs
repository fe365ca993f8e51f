use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read},
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::SolverError,
    space::solver::{
        format::{read_dense, write_sparse},
        Factors, SvdSolver,
    },
    utils::matrix::sparse_from_dense,
};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn default_args() -> Vec<String> {
    vec!["{input}".into(), "{output}".into(), "{dims}".into()]
}

fn default_timeout_ms() -> u64 {
    10 * 60 * 1000
}

/// How to run an external SVD program.
///
/// `args` may contain the placeholders `{input}` (sparse matrix file),
/// `{output}` (prefix of the `-U`, `-S`, `-V` result files) and `{dims}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalSolverConfig {
    pub program: PathBuf,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// parent of the scratch directory, system temp dir when unset
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

impl ExternalSolverConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: default_args(),
            timeout_ms: default_timeout_ms(),
            work_dir: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Runs an SVD program in a subprocess and parses its dense output
#[derive(Debug, Clone)]
pub struct ExternalSolver {
    config: ExternalSolverConfig,
}

impl ExternalSolver {
    pub fn new(config: ExternalSolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExternalSolverConfig {
        &self.config
    }

    fn scratch_dir(&self) -> io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("lsa-svd-");
        match &self.config.work_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }

    fn spawn(&self, input: &Path, output: &Path, dimensions: usize) -> Result<Child, SolverError> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        let dims = dimensions.to_string();
        let args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|a| a.replace("{input}", &input).replace("{output}", &output).replace("{dims}", &dims))
            .collect();
        debug!(program = %self.config.program.display(), ?args, "starting external solver");
        Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => SolverError::MissingExecutable(self.config.program.clone()),
                _ => SolverError::Io(e),
            })
    }
}

/// Wait for the child; kill it once `timeout` has elapsed
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<ExitStatus, SolverError> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        let elapsed = start.elapsed();
        if elapsed >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SolverError::Timeout(timeout));
        }
        thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
    }
}

fn read_factor(prefix: &Path, suffix: &str) -> Result<DMatrix<f64>, SolverError> {
    let mut path = prefix.as_os_str().to_owned();
    path.push(format!("-{suffix}"));
    let file = File::open(&path)?;
    read_dense(BufReader::new(file), suffix)
}

impl SvdSolver for ExternalSolver {
    fn name(&self) -> &'static str {
        "external"
    }

    fn decompose(&self, weighted: &DMatrix<f64>, dimensions: usize) -> Result<Factors, SolverError> {
        let scratch = self.scratch_dir()?;
        let input = scratch.path().join("matrix.st");
        let output = scratch.path().join("factors");
        write_sparse(
            BufWriter::new(File::create(&input)?),
            &sparse_from_dense(weighted),
            "lsa term-by-passage matrix",
        )?;

        let mut child = self.spawn(&input, &output, dimensions)?;
        // drain stderr so a chatty solver cannot block on a full pipe
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });
        // on timeout the reader is not joined: a process the solver spawned may
        // still hold the pipe, and the thread ends once the last writer closes it
        let status = wait_with_timeout(&mut child, self.config.timeout())?;
        let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
        if !status.success() {
            return Err(SolverError::Exited {
                status: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        if !stderr.trim().is_empty() {
            warn!(stderr = %stderr.trim(), "external solver wrote to stderr");
        }

        let factors = Factors {
            u: read_factor(&output, "U")?,
            s: read_factor(&output, "S")?,
            v: read_factor(&output, "V")?,
        };
        factors
            .check_shape(weighted.nrows(), weighted.ncols())
            .map_err(|reason| SolverError::Malformed {
                file: "factors".into(),
                line: 0,
                reason,
            })?;
        let s = &factors.s;
        for i in 0..s.nrows() {
            for j in 0..s.ncols() {
                if i != j && s[(i, j)] != 0.0 {
                    return Err(SolverError::Malformed {
                        file: "S".into(),
                        line: i + 2,
                        reason: format!("off-diagonal value at column {}", j + 1),
                    });
                }
            }
        }
        Ok(factors)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    /// Solver config running `script` through /bin/sh
    fn shell_solver(dir: &Path, script: &str, timeout_ms: u64) -> ExternalSolver {
        let path = dir.join("solver.sh");
        fs::write(&path, script).unwrap();
        let mut config = ExternalSolverConfig::new("/bin/sh");
        config.args = vec![
            path.to_string_lossy().into_owned(),
            "{input}".into(),
            "{output}".into(),
            "{dims}".into(),
        ];
        config.timeout_ms = timeout_ms;
        config.work_dir = Some(dir.to_path_buf());
        ExternalSolver::new(config)
    }

    fn matrix() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 2, &[2.0, 0.0, 0.0, 1.0, 0.0, 0.0])
    }

    const GOOD: &str = r#"test -s "$1" || exit 3
test "$3" = "2" || exit 4
printf '3 2\n1 0\n0 1\n0 0\n' > "$2-U"
printf '2 2\n2 0\n0 1\n' > "$2-S"
printf '2 2\n1 0\n0 1\n' > "$2-V"
"#;

    #[test]
    fn parses_solver_output() {
        let dir = tempfile::tempdir().unwrap();
        let solver = shell_solver(dir.path(), GOOD, 10_000);
        let factors = solver.decompose(&matrix(), 2).unwrap();
        assert_eq!(factors.singular_values(), vec![2.0, 1.0]);
        let back = &factors.u * &factors.s * factors.v.transpose();
        assert_eq!(back, matrix());
    }

    #[test]
    fn times_out() {
        let dir = tempfile::tempdir().unwrap();
        let solver = shell_solver(dir.path(), "sleep 5\n", 100);
        let start = Instant::now();
        let err = solver.decompose(&matrix(), 2).unwrap_err();
        assert!(matches!(err, SolverError::Timeout(_)), "{err}");
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn timeout_does_not_wait_for_stderr_of_spawned_processes() {
        let dir = tempfile::tempdir().unwrap();
        let solver = shell_solver(dir.path(), "sleep 5 &\nsleep 5\n", 100);
        let start = Instant::now();
        let err = solver.decompose(&matrix(), 2).unwrap_err();
        assert!(matches!(err, SolverError::Timeout(_)), "{err}");
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn reports_missing_executable() {
        let solver = ExternalSolver::new(ExternalSolverConfig::new("/nonexistent/lsa-solver"));
        let err = solver.decompose(&matrix(), 2).unwrap_err();
        assert!(matches!(err, SolverError::MissingExecutable(_)), "{err}");
    }

    #[test]
    fn reports_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let solver = shell_solver(dir.path(), "echo 'out of memory' >&2\nexit 2\n", 10_000);
        match solver.decompose(&matrix(), 2).unwrap_err() {
            SolverError::Exited { status, stderr } => {
                assert_eq!(status, Some(2));
                assert_eq!(stderr, "out of memory");
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn rejects_mis_shaped_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = r#"printf '3 2\n1 0\n0 1\n0 0\n' > "$2-U"
printf '2 2\n2 0\n0 1\n' > "$2-S"
printf '3 2\n1 0\n0 1\n0 0\n' > "$2-V"
"#;
        let solver = shell_solver(dir.path(), script, 10_000);
        let err = solver.decompose(&matrix(), 2).unwrap_err();
        assert!(matches!(err, SolverError::Malformed { .. }), "{err}");
    }
}
