//! Warbler Script Sandbox - Script files as command actions
//!
//! A specification may point at a script instead of a native plugin. The
//! script runs in its own process with the interpreter configured for its
//! extension, receives the command as JSON on stdin and prints its deletion
//! vote as the last line of stdout.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use warbler_core::{
    Action, ActionRef, ActionResolver, InvalidVote, MessageContext, RuntimeHandle,
};

/// Filesystem locations exported to scripts as environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptEnv {
    pub asset_path: Option<PathBuf>,
    pub store_path: Option<PathBuf>,
    pub modules_path: Option<PathBuf>,
}

impl ScriptEnv {
    fn vars(&self) -> Vec<(&'static str, &Path)> {
        [
            ("WARBLER_ASSET_PATH", &self.asset_path),
            ("WARBLER_STORE_PATH", &self.store_path),
            ("WARBLER_MODULES_PATH", &self.modules_path),
        ]
        .into_iter()
        .filter_map(|(name, path)| path.as_deref().map(|path| (name, path)))
        .collect()
    }
}

/// JSON document written to the script's stdin
#[derive(Debug, Serialize)]
pub struct ScriptPayload<'a> {
    pub command: &'a str,
    pub args: &'a [String],
    pub context: &'a MessageContext,
}

/// Result of one script run
#[derive(Debug, Clone, Serialize)]
pub struct ScriptOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Read the deletion vote from a script's stdout.
///
/// The last non-empty line decides: `true`/`false` in any case, a JSON
/// boolean, or a JSON object with a boolean `delete` field.
pub fn parse_vote(stdout: &str) -> std::result::Result<bool, InvalidVote> {
    let Some(line) = stdout.lines().map(str::trim).filter(|l| !l.is_empty()).last() else {
        return Err(InvalidVote("script printed no vote".to_string()));
    };

    if line.eq_ignore_ascii_case("true") {
        return Ok(true);
    }
    if line.eq_ignore_ascii_case("false") {
        return Ok(false);
    }

    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(serde_json::Value::Bool(vote)) => Ok(vote),
        Ok(serde_json::Value::Object(fields)) => match fields.get("delete") {
            Some(serde_json::Value::Bool(vote)) => Ok(*vote),
            _ => Err(InvalidVote(format!("object without a boolean delete field: {}", line))),
        },
        _ => Err(InvalidVote(format!(
            "expected true, false or {{\"delete\": bool}}, got {:?}",
            line
        ))),
    }
}

/// Bytes kept from each of a script's output streams; anything earlier is
/// dropped so the vote on the last line survives
pub const DEFAULT_OUTPUT_LIMIT: usize = 64 * 1024;

/// Drain `reader`, keeping only its last `limit` bytes. Returns the kept tail
/// and the total number of bytes read.
async fn read_tail<R>(reader: Option<R>, limit: usize) -> std::io::Result<(Vec<u8>, usize)>
where
    R: AsyncRead + Unpin,
{
    let mut tail = Vec::new();
    let mut total = 0;
    let Some(mut reader) = reader else {
        return Ok((tail, total));
    };

    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        total += read;
        tail.extend_from_slice(&chunk[..read]);
        if tail.len() > limit {
            let excess = tail.len() - limit;
            tail.drain(..excess);
        }
    }
    Ok((tail, total))
}

/// A script run through an interpreter
#[derive(Clone)]
pub struct ScriptAction {
    script: PathBuf,
    interpreter: Vec<String>,
    env: ScriptEnv,
    output_limit: usize,
}

impl ScriptAction {
    /// `interpreter` is the program and its leading arguments; empty runs the
    /// script directly
    pub fn new(script: impl Into<PathBuf>, interpreter: Vec<String>, env: ScriptEnv) -> Self {
        Self {
            script: script.into(),
            interpreter,
            env,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    pub fn with_output_limit(mut self, limit: usize) -> Self {
        self.output_limit = limit;
        self
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Spawn the script, feed it the payload and collect its output
    pub async fn execute(&self, payload: &ScriptPayload<'_>) -> Result<ScriptOutput> {
        let mut command = match self.interpreter.split_first() {
            Some((program, leading)) => {
                let mut command = Command::new(program);
                command.args(leading).arg(&self.script);
                command
            }
            None => Command::new(&self.script),
        };

        if let Some(dir) = self.script.parent() {
            command.current_dir(dir);
        }
        command
            .envs(self.env.vars())
            .env("WARBLER_SCRIPT_PATH", &self.script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to start {}", self.script.display()))?;

        let mut input = serde_json::to_vec(payload)?;
        input.push(b'\n');
        if let Some(mut stdin) = child.stdin.take() {
            // Scripts that never read their input close the pipe early
            if let Err(e) = stdin.write_all(&input).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let (stdout, stderr) = tokio::join!(
            read_tail(child.stdout.take(), self.output_limit),
            read_tail(child.stderr.take(), self.output_limit),
        );
        let ((stdout, stdout_total), (stderr, stderr_total)) = (stdout?, stderr?);
        if stdout_total > stdout.len() || stderr_total > stderr.len() {
            tracing::debug!(
                "Script {} wrote {} bytes of output, kept the last {}",
                self.script.display(),
                stdout_total + stderr_total,
                stdout.len() + stderr.len()
            );
        }

        let status = child.wait().await?;
        Ok(ScriptOutput {
            success: status.success(),
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            exit_code: status.code().unwrap_or(-1),
        })
    }
}

#[async_trait]
impl Action for ScriptAction {
    async fn run(
        &self,
        _handle: &RuntimeHandle,
        context: &MessageContext,
        command: &str,
        args: &[String],
    ) -> Result<bool> {
        let output = self
            .execute(&ScriptPayload {
                command,
                args,
                context,
            })
            .await?;

        if !output.stderr.trim().is_empty() {
            tracing::debug!("{} stderr: {}", self.script.display(), output.stderr.trim());
        }

        if !output.success {
            return Err(InvalidVote(format!(
                "{} exited with status {}: {}",
                self.script.display(),
                output.exit_code,
                output.stderr.trim()
            ))
            .into());
        }

        Ok(parse_vote(&output.stdout)?)
    }
}

impl fmt::Debug for ScriptAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptAction")
            .field("script", &self.script)
            .field("interpreter", &self.interpreter)
            .finish()
    }
}

/// Resolves action references to script files with a known interpreter
#[derive(Debug, Clone)]
pub struct ScriptResolver {
    interpreters: BTreeMap<String, Vec<String>>,
    env: ScriptEnv,
}

impl Default for ScriptResolver {
    fn default() -> Self {
        Self::new()
            .with_interpreter("py", ["python3"])
            .with_interpreter("sh", ["sh"])
    }
}

impl ScriptResolver {
    /// A resolver with no interpreters
    pub fn new() -> Self {
        Self {
            interpreters: BTreeMap::new(),
            env: ScriptEnv::default(),
        }
    }

    pub fn with_interpreter<I, S>(mut self, extension: impl Into<String>, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interpreters
            .insert(extension.into(), command.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_env(mut self, env: ScriptEnv) -> Self {
        self.env = env;
        self
    }

    pub fn extensions(&self) -> Vec<&str> {
        self.interpreters.keys().map(String::as_str).collect()
    }

    fn interpreter_for(&self, script: &Path) -> Option<&Vec<String>> {
        let extension = script.extension()?.to_str()?;
        self.interpreters.get(extension)
    }

    /// `base` with each known extension appended, in extension order
    fn find_sibling(&self, base: &Path) -> Option<PathBuf> {
        self.interpreters.keys().find_map(|extension| {
            let mut candidate = OsString::from(base.as_os_str());
            candidate.push(".");
            candidate.push(extension);
            let candidate = PathBuf::from(candidate);
            candidate.is_file().then_some(candidate)
        })
    }
}

impl ActionResolver for ScriptResolver {
    fn resolve(&self, reference: &ActionRef) -> Option<Arc<dyn Action>> {
        let script = if reference.sibling {
            self.find_sibling(&reference.path)?
        } else if reference.path.is_file() {
            reference.path.clone()
        } else {
            return None;
        };

        let interpreter = self.interpreter_for(&script)?.clone();
        let script = script.canonicalize().unwrap_or(script);

        tracing::debug!("Script action resolved: {}", script.display());
        Some(Arc::new(ScriptAction::new(script, interpreter, self.env.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use warbler_core::{
        ActionError, ActionRuntime, Author, ChannelRef, CommandLine, SpecId,
    };

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn context() -> MessageContext {
        MessageContext::new("m1", "!slap bob", Author::new("u1"), ChannelRef::new("c1", "general"))
    }

    fn sh(script: PathBuf) -> ScriptAction {
        ScriptAction::new(script, vec!["sh".to_string()], ScriptEnv::default())
    }

    #[test]
    fn test_parse_vote() {
        assert_eq!(parse_vote("working...\nTRUE\n\n"), Ok(true));
        assert_eq!(parse_vote("false"), Ok(false));
        assert_eq!(parse_vote("{\"delete\": true}"), Ok(true));
        assert!(parse_vote("").is_err());
        assert!(parse_vote("maybe").is_err());
        assert!(parse_vote("{\"delete\": \"yes\"}").is_err());
        assert!(parse_vote("1").is_err());
    }

    #[tokio::test]
    async fn test_script_receives_payload_and_votes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let script = write_script(
            dir.path(),
            "slap.sh",
            r#"read -r payload
case "$payload" in
  *'"command":"slap","args":["bob"]'*) echo "slapping"; echo true ;;
  *) echo false ;;
esac
"#,
        );

        let vote = sh(script)
            .run(&RuntimeHandle::new(), &context(), "slap", &["bob".to_string()])
            .await?;
        assert!(vote);
        Ok(())
    }

    #[tokio::test]
    async fn test_script_sees_environment() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let script = write_script(
            dir.path(),
            "env.sh",
            r#"[ "$WARBLER_STORE_PATH" = "/srv/store" ] && [ -n "$WARBLER_SCRIPT_PATH" ] && echo '{"delete": true}' || echo false
"#,
        );
        let action = ScriptAction::new(
            script,
            vec!["sh".to_string()],
            ScriptEnv {
                store_path: Some(PathBuf::from("/srv/store")),
                ..ScriptEnv::default()
            },
        );

        assert!(action.run(&RuntimeHandle::new(), &context(), "env", &[]).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_chatty_script_keeps_only_output_tail() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let script = write_script(
            dir.path(),
            "chatty.sh",
            "cat > /dev/null\nyes spam | head -n 100000\nyes oops | head -n 50000 >&2\necho true\n",
        );

        let output = sh(script.clone())
            .execute(&ScriptPayload {
                command: "chatty",
                args: &[],
                context: &context(),
            })
            .await?;
        assert!(output.success);
        assert!(output.stdout.len() <= DEFAULT_OUTPUT_LIMIT);
        assert!(output.stderr.len() <= DEFAULT_OUTPUT_LIMIT);
        assert!(output.stdout.ends_with("spam\ntrue\n"));
        assert_eq!(parse_vote(&output.stdout), Ok(true));

        let output = sh(script)
            .with_output_limit(16)
            .execute(&ScriptPayload {
                command: "chatty",
                args: &[],
                context: &context(),
            })
            .await?;
        assert_eq!(output.stdout, "\nspam\nspam\ntrue\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_invalid_return() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "fail.sh", "echo true\necho oops >&2\nexit 3\n");
        let runtime = ActionRuntime::new(RuntimeHandle::new());

        let err = runtime
            .invoke(
                &SpecId::new("fail.yaml"),
                &sh(script),
                &context(),
                &CommandLine::new("fail", vec![]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ActionError::InvalidReturn { ref detail, .. } if detail.contains("oops")));
    }

    #[tokio::test]
    async fn test_runaway_script_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "hang.sh", "sleep 30\necho true\n");
        let runtime = ActionRuntime::new(RuntimeHandle::new())
            .with_timeout(Some(Duration::from_millis(300)));

        let err = runtime
            .invoke(
                &SpecId::new("hang.yaml"),
                &sh(script),
                &context(),
                &CommandLine::new("hang", vec![]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ActionError::TimedOut { .. }));
    }

    #[test]
    fn test_resolver_finds_siblings_and_checks_extension() {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "slap.sh", "echo true\n");
        write_script(dir.path(), "notes.txt", "hello\n");
        let spec = dir.path().join("slap.yaml");
        let resolver = ScriptResolver::default();

        assert!(resolver.resolve(&ActionRef::sibling(&spec)).is_some());
        assert!(resolver.resolve(&ActionRef::explicit("./slap.sh", &spec)).is_some());
        assert!(resolver.resolve(&ActionRef::explicit("notes.txt", &spec)).is_none());
        assert!(resolver.resolve(&ActionRef::explicit("missing.py", &spec)).is_none());
        assert!(resolver
            .resolve(&ActionRef::sibling(&dir.path().join("orphan.yaml")))
            .is_none());
        assert_eq!(resolver.extensions(), vec!["py", "sh"]);
    }
}
