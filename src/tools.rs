// src/tools.rs

use std::{
    env,
    ffi::OsStr,
    fmt,
    io::{self, Read},
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
    str::FromStr,
};

use tracing::{debug, instrument, warn};

use crate::error::{MdbError, MdbResult};
use crate::frame::date_parser::EXPORT_DATE_FORMAT;

/// Text encoding of `mdb-*` output, by WHATWG label (`utf-8`, `cp1252`, `latin1`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding(&'static encoding_rs::Encoding);

impl Encoding {
    pub fn utf_8() -> Self {
        Encoding(encoding_rs::UTF_8)
    }

    /// The usual code page of Access files written on Western Windows.
    pub fn windows_1252() -> Self {
        Encoding(encoding_rs::WINDOWS_1252)
    }

    pub fn name(self) -> &'static str {
        self.0.name()
    }

    /// Strict decode: malformed input is an error, never replaced.
    pub fn decode(self, program: &str, bytes: Vec<u8>) -> MdbResult<String> {
        if self.0 == encoding_rs::UTF_8 {
            return String::from_utf8(bytes).map_err(|_| self.decode_error(program));
        }
        self.0
            .decode_without_bom_handling_and_without_replacement(&bytes)
            .map(|text| text.into_owned())
            .ok_or_else(|| self.decode_error(program))
    }

    fn decode_error(self, program: &str) -> MdbError {
        MdbError::Decode {
            program: program.to_string(),
            encoding: self.name(),
        }
    }
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::utf_8()
    }
}

impl FromStr for Encoding {
    type Err = MdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        encoding_rs::Encoding::for_label(s.trim().as_bytes())
            .map(Encoding)
            .ok_or_else(|| MdbError::UnsupportedEncoding(s.trim().to_string()))
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Locations of the mdbtools programs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdbTools {
    pub tables_bin: PathBuf,
    pub schema_bin: PathBuf,
    pub export_bin: PathBuf,
}

impl Default for MdbTools {
    fn default() -> Self {
        Self {
            tables_bin: PathBuf::from("mdb-tables"),
            schema_bin: PathBuf::from("mdb-schema"),
            export_bin: PathBuf::from("mdb-export"),
        }
    }
}

impl MdbTools {
    /// All three programs inside `dir`.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            tables_bin: dir.join("mdb-tables"),
            schema_bin: dir.join("mdb-schema"),
            export_bin: dir.join("mdb-export"),
        }
    }

    /// `MDBTOOLS_DIR` picks the directory; `MDB_TABLES`, `MDB_SCHEMA` and
    /// `MDB_EXPORT` override single programs. Otherwise `$PATH` is searched.
    pub fn from_env() -> Self {
        let mut tools = match env::var_os("MDBTOOLS_DIR") {
            Some(dir) if !dir.is_empty() => Self::in_dir(dir),
            _ => Self::default(),
        };
        if let Some(p) = env::var_os("MDB_TABLES") {
            tools.tables_bin = p.into();
        }
        if let Some(p) = env::var_os("MDB_SCHEMA") {
            tools.schema_bin = p.into();
        }
        if let Some(p) = env::var_os("MDB_EXPORT") {
            tools.export_bin = p.into();
        }
        debug!(?tools, "Resolved mdbtools");
        tools
    }

    /// `mdb-tables -1 <db>`: one table name per line.
    #[instrument(level = "debug", skip(self))]
    pub fn run_tables(&self, db: &Path) -> MdbResult<Vec<u8>> {
        run(&self.tables_bin, [OsStr::new("-1"), db.as_os_str()])
    }

    /// `mdb-schema <db>`.
    #[instrument(level = "debug", skip(self))]
    pub fn run_schema(&self, db: &Path) -> MdbResult<Vec<u8>> {
        run(&self.schema_bin, [db.as_os_str()])
    }

    /// `mdb-export -D '%Y-%m-%d %H:%M:%S' <db> <table>`, streamed.
    #[instrument(level = "debug", skip(self))]
    pub fn spawn_export(&self, db: &Path, table: &str) -> MdbResult<ExportStream> {
        let program = display_name(&self.export_bin);
        let mut child = Command::new(&self.export_bin)
            .arg("-D")
            .arg(EXPORT_DATE_FORMAT)
            .arg(db)
            .arg(table)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| MdbError::Spawn {
                program: program.clone(),
                source,
            })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            MdbError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("`{}` has no stdout", program),
            ))
        })?;
        debug!(pid = child.id(), "Spawned export");
        Ok(ExportStream {
            program,
            child: Some(child),
            stdout,
        })
    }
}

/// Run a tool to completion and return its stdout.
fn run<I, S>(bin: &Path, args: I) -> MdbResult<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program = display_name(bin);
    let output = Command::new(bin)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| MdbError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(program = %program, status = %output.status, "Tool failed");
        return Err(MdbError::ProcessFailure {
            program,
            status: output.status,
            stderr,
        });
    }
    debug!(program = %program, bytes = output.stdout.len(), "Tool finished");
    Ok(output.stdout)
}

fn display_name(bin: &Path) -> String {
    bin.file_name()
        .unwrap_or(bin.as_os_str())
        .to_string_lossy()
        .into_owned()
}

/// Stdout of a running `mdb-export`.
///
/// Reaching EOF reaps the child and turns a failed exit into a read error.
/// Dropping the stream early kills and reaps the child.
#[derive(Debug)]
pub struct ExportStream {
    program: String,
    child: Option<Child>,
    stdout: ChildStdout,
}

impl ExportStream {
    /// OS pid of the export process, while it has not been reaped.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn reap(&mut self) -> io::Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        if status.success() {
            debug!(program = %self.program, "Export finished");
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!("`{}` exited with {}", self.program, status),
            ))
        }
    }
}

impl Read for ExportStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.stdout.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.reap()?;
        }
        Ok(n)
    }
}

impl Drop for ExportStream {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            match child.try_wait() {
                Ok(Some(_)) => {}
                _ => {
                    debug!(program = %self.program, pid = child.id(), "Killing abandoned export");
                    let _ = child.kill();
                }
            }
            let _ = child.wait();
        }
    }
}
