use std::ffi::OsString;
use std::path::PathBuf;
use tokio::process::Command as TokioCommand;

/// Specification for a command to execute.
///
/// Arguments are stored as discrete `OsString` elements; no shell string
/// evaluation ever happens. This is the only way chatpipe spawns
/// processes.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// The program to execute.
    pub program: OsString,
    /// Arguments as discrete elements.
    pub args: Vec<OsString>,
    /// Optional working directory.
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Create a new spec for `program`.
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Append a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append multiple arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Build a tokio `Command` from this spec.
    #[must_use]
    pub fn to_tokio_command(&self) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Human-readable rendering for logs.
    #[must_use]
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().to_string()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().to_string()));
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_discrete_args() {
        let cmd = CommandSpec::new("ffmpeg")
            .arg("-i")
            .arg("in.opus")
            .args(["-ac", "1"]);
        assert_eq!(cmd.program, OsString::from("ffmpeg"));
        assert_eq!(cmd.args.len(), 4);
        assert_eq!(cmd.display(), "ffmpeg -i in.opus -ac 1");
    }

    #[test]
    fn args_with_spaces_stay_single_elements() {
        let cmd = CommandSpec::new("tool").arg("a b; rm -rf /");
        assert_eq!(cmd.args.len(), 1);
    }
}
