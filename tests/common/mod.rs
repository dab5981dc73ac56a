#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use fetch_asset::{
    Error, FetchConfig, Fetcher, Invocation, ProcessOutput, ProcessRunner, Request, Response,
    Transport,
};
use zip::write::SimpleFileOptions;

/// Canned responses keyed by exact URL. Unknown URLs get a 404.
#[derive(Clone, Default)]
pub struct FakeTransport {
    routes: Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>>,
    calls: Arc<Mutex<Vec<Request>>>,
}

impl FakeTransport {
    pub fn route<S: Into<String>>(self, url: S, status: u16, body: Vec<u8>) -> Self {
        self.routes.lock().unwrap().insert(url.into(), (status, body));
        self
    }

    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transport for FakeTransport {
    fn get(&self, request: &Request, _timeout: Option<Duration>) -> Result<Response, Error> {
        self.calls.lock().unwrap().push(request.clone());
        let (status, body) = self
            .routes
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .unwrap_or((404, Vec::new()));
        Ok(Response {
            status,
            body: Box::new(Cursor::new(body)),
        })
    }
}

/// Records invocations. A successful run creates `<target>/.git` like a real clone would.
#[derive(Clone)]
pub struct FakeRunner {
    calls: Arc<Mutex<Vec<Invocation>>>,
    outcome: ProcessOutput,
    leaves_partial: bool,
}

impl FakeRunner {
    pub fn succeeding() -> Self {
        Self {
            calls: Default::default(),
            outcome: ProcessOutput {
                success: true,
                code: Some(0),
                ..Default::default()
            },
            leaves_partial: false,
        }
    }

    pub fn failing(code: i32, stderr: &str) -> Self {
        Self {
            calls: Default::default(),
            outcome: ProcessOutput {
                success: false,
                code: Some(code),
                stderr: stderr.to_string(),
                timed_out: false,
            },
            leaves_partial: false,
        }
    }

    /// Write a half-finished checkout into the target before failing.
    pub fn leaving_partial_clone(mut self) -> Self {
        self.leaves_partial = true;
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }
}

impl ProcessRunner for FakeRunner {
    fn run(
        &self,
        invocation: &Invocation,
        _deadline: Option<Instant>,
    ) -> std::io::Result<ProcessOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        if let Some(target) = invocation.args.last() {
            let target = Path::new(target);
            if self.outcome.success {
                std::fs::create_dir_all(target.join(".git"))?;
            } else if self.leaves_partial {
                std::fs::create_dir_all(target.join(".git/objects"))?;
                std::fs::write(target.join(".git/HEAD"), "ref: refs/heads/main\n")?;
            }
        }
        Ok(self.outcome.clone())
    }
}

pub fn fetcher(config: FetchConfig, transport: &FakeTransport, runner: &FakeRunner) -> Fetcher {
    Fetcher::with_backends(config, Box::new(transport.clone()), Box::new(runner.clone()))
}

/// A zip archive with the given `(name, contents)` entries.
pub fn zip_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Every file under `root`, relative and `/`-separated, sorted.
pub fn files_under(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(
                    path.strip_prefix(root)
                        .unwrap()
                        .to_string_lossy()
                        .replace('\\', "/"),
                );
            }
        }
    }
    out.sort();
    out
}
