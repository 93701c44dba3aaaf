// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `numerus logs` - job journal or per-task agent output.

use super::{open_runner, resolve_job};
use crate::exit_error::ExitError;
use crate::EXIT_USAGE;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;

pub fn logs(raw_job_id: &str, task: Option<&str>, follow: bool) -> Result<(), ExitError> {
    let runner = open_runner()?;
    let job_id = resolve_job(&runner, raw_job_id)?;
    let job_dir = nm_core::env::runs_dir().join(job_id.as_str());

    let path: PathBuf = match task {
        Some(task) => job_dir.join(task).join("stdout.log"),
        None => job_dir.join("events.ndjson"),
    };
    if !path.exists() {
        return Err(ExitError::new(
            EXIT_USAGE,
            format!("no logs at {}", path.display()),
        ));
    }

    if follow {
        tail(&path)
    } else {
        print!("{}", std::fs::read_to_string(&path)?);
        Ok(())
    }
}

/// Stream appended lines until interrupted.
fn tail(path: &std::path::Path) -> Result<(), ExitError> {
    println!("--- tailing {} ---", path.display());
    let file = std::fs::File::open(path)?;
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::End(0))?;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            std::thread::sleep(std::time::Duration::from_millis(500));
        } else {
            print!("{line}");
        }
    }
}
