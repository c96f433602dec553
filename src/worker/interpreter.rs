//! Interpreters the worker can run.
//!
//! An interpreter supplies three things: the command that starts it, the
//! bootstrap loop it runs (read a path per line, evaluate that file, write the
//! result with no framing), and the wrapper snippet used by server-side
//! evaluation to load a built module and report through a side-channel file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::sync::Arc;

/// An external interpreter driven through the bootstrap loop.
pub trait Interpreter: Send + Sync + fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Source of the bootstrap loop.
    fn bootstrap_source(&self) -> &'static str;

    /// File suffix for bootstrap and snippet files (including the dot).
    fn script_suffix(&self) -> &'static str;

    /// Command that runs the bootstrap script at `bootstrap`.
    fn command(&self, bootstrap: &Path) -> Command;

    /// Snippet that loads `artifact`, applies `template` to a loader, writes the
    /// stringified result to `output` and yields `OK`. On failure it yields the
    /// error description instead.
    fn wrap_module_call(&self, artifact: &Path, template: &str, output: &Path) -> String;
}

/// Node.js. Templates are JS functions taking a `loadModule` callable.
#[derive(Debug, Clone)]
pub struct NodeInterpreter {
    program: PathBuf,
}

const NODE_BOOTSTRAP: &str = r#"
const fs = require('fs')
// Snippets run in global scope, where the module-local require is not visible.
globalThis.require = require
console.log = () => {}

require('readline')
  .createInterface({ input: process.stdin, terminal: false })
  .on('line', inputPath => {
    try {
      const code = fs.readFileSync(inputPath)
      const res = (0, eval)(code.toString())
      process.stdout.write(res === null || res === undefined ? 'null' : res.toString())
    }
    catch(e) {
      process.stdout.write(String((e && e.stack) || e))
    }
  })
"#;

impl NodeInterpreter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for NodeInterpreter {
    fn default() -> Self {
        Self::new("node")
    }
}

impl Interpreter for NodeInterpreter {
    fn name(&self) -> &'static str {
        "node"
    }

    fn bootstrap_source(&self) -> &'static str {
        NODE_BOOTSTRAP
    }

    fn script_suffix(&self) -> &'static str {
        ".js"
    }

    fn command(&self, bootstrap: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(bootstrap);
        cmd
    }

    fn wrap_module_call(&self, artifact: &Path, template: &str, output: &Path) -> String {
        format!(
            "(() => {{
  try {{
    const loadModule = () => require({artifact})
    const output = ({template})(loadModule)
    require('fs').writeFileSync({output}, String(output))
    return 'OK'
  }} catch(e) {{
    return (e && e.stack) || String(e)
  }}
}})()",
            artifact = js_string(artifact),
            output = js_string(output),
        )
    }
}

/// POSIX shell. Templates are shell snippets that may call `load_module` to
/// source the artifact; stdout is the result, a non-zero status is a failure
/// described by the captured output.
#[derive(Debug, Clone)]
pub struct ShellInterpreter {
    program: PathBuf,
}

const SHELL_BOOTSTRAP: &str = r#"
while IFS= read -r input; do
  out=$(sh "$input" 2>&1)
  [ -n "$out" ] || out=null
  printf '%s' "$out"
done
"#;

impl ShellInterpreter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ShellInterpreter {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl Interpreter for ShellInterpreter {
    fn name(&self) -> &'static str {
        "sh"
    }

    fn bootstrap_source(&self) -> &'static str {
        SHELL_BOOTSTRAP
    }

    fn script_suffix(&self) -> &'static str {
        ".sh"
    }

    fn command(&self, bootstrap: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(bootstrap);
        cmd
    }

    fn wrap_module_call(&self, artifact: &Path, template: &str, output: &Path) -> String {
        format!(
            "load_module() {{ . {artifact}; }}
if result=$( {{
{template}
}} 2>&1 ); then
  printf '%s' \"$result\" > {output}
  printf OK
else
  printf '%s' \"$result\"
fi
",
            artifact = sh_quote(artifact),
            output = sh_quote(output),
        )
    }
}

/// Which interpreter to run, as named in configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InterpreterKind {
    #[default]
    Node,
    Shell,
}

impl InterpreterKind {
    /// Instantiate with the default program for this kind.
    pub fn instantiate(self) -> Arc<dyn Interpreter> {
        match self {
            Self::Node => Arc::new(NodeInterpreter::default()),
            Self::Shell => Arc::new(ShellInterpreter::default()),
        }
    }
}

impl FromStr for InterpreterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "node" | "nodejs" => Ok(Self::Node),
            "sh" | "shell" => Ok(Self::Shell),
            _ => Err(format!(
                "Unknown interpreter: '{}'. Valid options: node, sh",
                s
            )),
        }
    }
}

impl fmt::Display for InterpreterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Shell => write!(f, "sh"),
        }
    }
}

/// JSON string literals are valid JS string literals.
fn js_string(path: &Path) -> String {
    serde_json::Value::String(path.to_string_lossy().into_owned()).to_string()
}

fn sh_quote(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpreter_kind_from_str() {
        assert_eq!("node".parse::<InterpreterKind>().unwrap(), InterpreterKind::Node);
        assert_eq!("NodeJS".parse::<InterpreterKind>().unwrap(), InterpreterKind::Node);
        assert_eq!("sh".parse::<InterpreterKind>().unwrap(), InterpreterKind::Shell);
        assert!("python".parse::<InterpreterKind>().is_err());
    }

    #[test]
    fn test_node_wrapper_escapes_paths() {
        let node = NodeInterpreter::default();
        let code = node.wrap_module_call(
            Path::new("/srv/out/Foo \"Bar\".js"),
            "load => load().hello",
            Path::new("/tmp/side.output"),
        );
        assert!(code.contains(r#"require("/srv/out/Foo \"Bar\".js")"#));
        assert!(code.contains(r#"writeFileSync("/tmp/side.output""#));
        assert!(code.contains("(load => load().hello)(loadModule)"));
        assert!(code.contains("return 'OK'"));
    }

    #[test]
    fn test_shell_wrapper_quotes_paths() {
        let sh = ShellInterpreter::default();
        let code = sh.wrap_module_call(
            Path::new("/srv/it's/Foo.sh"),
            "load_module; greet",
            Path::new("/tmp/side.output"),
        );
        assert!(code.contains(r"load_module() { . '/srv/it'\''s/Foo.sh'; }"));
        assert!(code.contains("> '/tmp/side.output'"));
        assert!(code.contains("\nload_module; greet\n"));
    }

    #[test]
    fn test_bootstrap_suffixes() {
        assert_eq!(NodeInterpreter::default().script_suffix(), ".js");
        assert_eq!(ShellInterpreter::default().script_suffix(), ".sh");
    }
}
