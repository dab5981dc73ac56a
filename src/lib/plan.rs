//! The concrete action a fetch will take, computed before any I/O.

use std::path::PathBuf;

/// Which retrieval strategy handles a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Shallow clone with the git executable.
    Git,
    /// Repository archive or raw file over the REST API.
    Content,
    /// Plain download from the artifact service.
    Artifact,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Git => write!(f, "git"),
            Self::Content => write!(f, "content"),
            Self::Artifact => write!(f, "artifact"),
        }
    }
}

/// A subprocess to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", crate::redact(arg))?;
        }
        Ok(())
    }
}

/// Credentials attached to an HTTP request.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    None,
    /// A header carrying a private token verbatim.
    PrivateToken(String),
    Bearer(String),
    Basic { user: String, password: Option<String> },
}

impl Auth {
    /// A label that is safe to print.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::PrivateToken(_) => "private-token",
            Self::Bearer(_) => "bearer",
            Self::Basic { .. } => "basic",
        }
    }
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Auth({})", self.scheme())
    }
}

/// What a body should become once received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyHandling {
    /// A zip archive extracted under the target directory.
    ExtractArchive,
    /// Written as a single file at the target path.
    WriteFile,
}

/// A single HTTP GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub auth: Auth,
    pub body: BodyHandling,
}

/// The action half of an [`ExecutionPlan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Command(Invocation),
    Request(Request),
}

/// Strategy, resolved target and the single command or request a fetch issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub provider: Provider,
    /// Directory a clone or extraction populates, or the file a download writes.
    pub target: PathBuf,
    pub action: Action,
}

impl std::fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] ", self.provider)?;
        match &self.action {
            Action::Command(invocation) => write!(f, "{invocation}")?,
            Action::Request(request) => write!(
                f,
                "GET {} (auth: {})",
                crate::redact(&request.url),
                request.auth.scheme()
            )?,
        }
        write!(f, " -> {}", self.target.display())
    }
}

mod ser {
    use super::*;
    use serde::ser::{Serialize, SerializeStruct, Serializer};

    impl Serialize for Invocation {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let args: Vec<String> = self
                .args
                .iter()
                .map(|a| crate::redact(a).into_owned())
                .collect();
            let mut state = serializer.serialize_struct("Invocation", 2)?;
            state.serialize_field("program", &self.program)?;
            state.serialize_field("args", &args)?;
            state.end()
        }
    }

    impl Serialize for Request {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let mut state = serializer.serialize_struct("Request", 4)?;
            state.serialize_field("method", "GET")?;
            state.serialize_field("url", &crate::redact(&self.url))?;
            state.serialize_field("auth", self.auth.scheme())?;
            state.serialize_field("body", &self.body)?;
            state.end()
        }
    }

    impl Serialize for ExecutionPlan {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let mut state = serializer.serialize_struct("ExecutionPlan", 3)?;
            state.serialize_field("provider", &self.provider)?;
            state.serialize_field("target", &self.target)?;
            match &self.action {
                Action::Command(invocation) => state.serialize_field("command", invocation)?,
                Action::Request(request) => state.serialize_field("request", request)?,
            }
            state.end()
        }
    }
}

#[cfg(test)]
mod test_plan {
    use super::*;

    fn request_plan() -> ExecutionPlan {
        ExecutionPlan {
            provider: Provider::Artifact,
            target: PathBuf::from("/tmp/out/tool.tar.gz"),
            action: Action::Request(Request {
                url: "https://ci:pw@artifacts.example/repo/tool.tar.gz".into(),
                auth: Auth::Basic {
                    user: "ci".into(),
                    password: Some("hunter2".into()),
                },
                body: BodyHandling::WriteFile,
            }),
        }
    }

    #[test]
    fn serialized_request_hides_credentials() {
        let json = serde_json::to_string(&request_plan()).unwrap();
        assert!(!json.contains("hunter2"), "{json}");
        assert!(!json.contains("ci:pw"), "{json}");
        assert!(json.contains(r#""auth":"basic""#), "{json}");
        assert!(json.contains(r#""provider":"artifact""#), "{json}");
    }

    #[test]
    fn plans_serialize_to_toml() {
        let plan = ExecutionPlan {
            provider: Provider::Git,
            target: PathBuf::from("/tmp/out/repo"),
            action: Action::Command(
                Invocation::new("git")
                    .args(["clone", "--depth", "1"])
                    .arg("https://u:t@h/ns/repo.git"),
            ),
        };
        let doc = toml::to_string(&plan).unwrap();
        assert!(doc.contains("provider = \"git\""), "{doc}");
        assert!(doc.contains("https://***@h/ns/repo.git"), "{doc}");
    }

    #[test]
    fn display_and_debug_never_show_secrets() {
        let plan = request_plan();
        for shown in [plan.to_string(), format!("{plan:?}")] {
            assert!(!shown.contains("hunter2"), "{shown}");
        }
        assert!(plan.to_string().starts_with("[artifact] GET https://***@artifacts.example"));
    }
}
