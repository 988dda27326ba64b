use std::fs::File;
use std::io::{sink, stderr, stdout, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use anyhow::{anyhow, Context, Result};

use crate::fs::Fs;

/// Run a subprocess, storing stdout and stderr in the given `task_dir`.
/// Output is echoed to the terminal too if `echo` is set.
/// Based on:
/// <https://stackoverflow.com/questions/66060139/how-to-tee-stdout-stderr-from-a-subprocess-in-rust>
pub fn run_cmd(cmd: &mut Command, task_dir: &Path, fs: &Fs, echo: bool) -> Result<bool> {
    let mut pathbuf = PathBuf::with_capacity(256);
    let (out_file, err_file) = make_log_files(fs, task_dir, &mut pathbuf)?;

    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| {
            format!(
                "failed to execute child process {:?} {:?}",
                cmd.get_program(),
                cmd.get_args(),
            )
        })?;

    let child_out = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("cannot attach to child stdout"))?;
    let child_err = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("cannot attach to child stderr"))?;

    let thread_out = thread::spawn(move || {
        if echo {
            communicate(child_out, out_file, stdout())
        } else {
            communicate(child_out, out_file, sink())
        }
    });
    let thread_err = thread::spawn(move || {
        if echo {
            communicate(child_err, err_file, stderr())
        } else {
            communicate(child_err, err_file, sink())
        }
    });

    thread_out
        .join()
        .map_err(|_| anyhow!("error joining stdout thread"))?
        .context("error communicating with child stdout")?;
    thread_err
        .join()
        .map_err(|_| anyhow!("error joining stderr thread"))?
        .context("error communicating with child stderr")?;

    let status = child.wait().context("failed to wait on child process")?;
    log::debug!("process in {:?} finished with {status}", task_dir);
    Ok(status.success())
}

fn communicate<R: Read, W: Write>(
    mut stream: R,
    mut file: File,
    mut output: W,
) -> std::io::Result<()> {
    let mut buf = [0u8; 1024];
    loop {
        let num_read = stream.read(&mut buf)?;
        if num_read == 0 {
            break;
        }

        let buf = &buf[..num_read];
        file.write_all(buf)?;
        output.write_all(buf)?;
    }

    Ok(())
}

fn make_log_files(fs: &Fs, task_dir: &Path, pathbuf: &mut PathBuf) -> Result<(File, File)> {
    let out_file = fs
        .create_file(fs.stdout(task_dir, pathbuf))
        .context("creating stdout.txt file")?;

    let err_file = fs
        .create_file(fs.stderr(task_dir, pathbuf))
        .context("creating stderr.txt file")?;

    Ok((out_file, err_file))
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_logs_are_captured() -> Result<()> {
        let dir = tempdir()?;
        let mut fs = Fs::new(dir.path(), false);
        fs.prepare_roots(false)?;

        let mut cmd = Command::new("/usr/bin/env");
        cmd.args(["bash", "-c", "echo out; echo err >&2; exit 3"]);
        let success = run_cmd(&mut cmd, dir.path(), &fs, false)?;

        assert!(!success);
        assert_eq!("out\n", std::fs::read_to_string(dir.path().join("stdout.txt"))?);
        assert_eq!("err\n", std::fs::read_to_string(dir.path().join("stderr.txt"))?);
        Ok(())
    }
}
