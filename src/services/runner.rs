use camino::Utf8Path;
use std::io;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Windows `CREATE_NO_WINDOW`; keeps the downloader from flashing a console.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Spawns external tools with stdout and stderr merged into one line stream.
pub struct ProcessRunner;

impl ProcessRunner {
    /// Start `program` with `args`.
    ///
    /// Both output pipes are read by their own task and forwarded into a
    /// single channel, so the consumer sees one interleaved stream. The
    /// channel closes once both pipes reach EOF.
    pub fn spawn(program: &Utf8Path, args: &[String]) -> io::Result<RunningProcess> {
        let mut cmd = Command::new(program.as_std_path());
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        tracing::debug!("Spawning {} {}", program, args.join(" "));
        let mut child = cmd.spawn()?;

        let (tx, rx) = mpsc::channel(256);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx));
        }

        Ok(RunningProcess { child, lines: rx })
    }
}

/// A spawned process and its merged output.
pub struct RunningProcess {
    child: Child,
    lines: mpsc::Receiver<String>,
}

impl RunningProcess {
    /// Next output line, or `None` once both pipes are closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Force-terminate the process. There is no graceful signal first.
    pub async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }

    /// Wait for exit; `-1` when the process was terminated by a signal.
    pub async fn wait(&mut self) -> io::Result<i32> {
        let status = self.child.wait().await?;
        Ok(status.code().unwrap_or(-1))
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Read `reader` until EOF, sending each trimmed line.
///
/// Carriage returns also end a line so in-place progress updates arrive one
/// by one. Invalid UTF-8 is replaced rather than ending the stream.
async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                for segment in buf.split(|b| *b == b'\r' || *b == b'\n') {
                    let line = String::from_utf8_lossy(segment);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if tx.send(line.to_string()).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Stopped reading process output: {}", e);
                break;
            }
        }
    }
}

/// Make sure `path` carries execute permission.
#[cfg(unix)]
pub fn ensure_executable(path: &Utf8Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = std::fs::metadata(path)?.permissions();
    let mode = permissions.mode();
    if mode & 0o111 == 0o111 {
        return Ok(());
    }

    permissions.set_mode(mode | 0o755);
    std::fs::set_permissions(path, permissions)?;
    tracing::debug!("Marked {} executable", path);
    Ok(())
}

#[cfg(not(unix))]
pub fn ensure_executable(_path: &Utf8Path) -> io::Result<()> {
    Ok(())
}
