use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arguments {
    #[default]
    None,
    /// Split on whitespace; no quoting rules apply.
    Line(String),
    List(Vec<String>),
}

impl Arguments {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Arguments::None => Vec::new(),
            Arguments::Line(line) => line.split_whitespace().map(str::to_string).collect(),
            Arguments::List(list) => list.clone(),
        }
    }
}

/// Who asked for the execution, as recorded in the execution log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub user: Option<String>,
    pub remote_addr: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    pub target: PathBuf,
    pub arguments: Arguments,
    /// Stored per-binary arguments, placed before `arguments`.
    pub default_arguments: Arguments,
    pub execution_id: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_output_bytes: Option<u64>,
    pub requester: Option<Requester>,
    pub working_dir: Option<PathBuf>,
}

impl ExecutionRequest {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn with_args_line(mut self, line: impl Into<String>) -> Self {
        self.arguments = Arguments::Line(line.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = Arguments::List(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_default_args(mut self, args: Arguments) -> Self {
        self.default_arguments = args;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.execution_id = Some(id.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_max_output_bytes(mut self, bytes: u64) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }

    pub fn with_requester(mut self, requester: Requester) -> Self {
        self.requester = Some(requester);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Default arguments followed by the caller's arguments.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.default_arguments.to_vec();
        argv.extend(self.arguments.to_vec());
        argv
    }
}
