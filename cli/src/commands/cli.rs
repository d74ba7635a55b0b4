use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "syncbridge", version, about = "Conflict arbitration and event relay for a background sync engine")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file; defaults to ~/.syncbridge/config.toml, then ./config.toml.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Overrides `engine.data_dir`.
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// Overrides `conflict.timeout_secs`.
    #[arg(long, global = true)]
    pub conflict_timeout_secs: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read JSON line requests from stdin, write responses and events to stdout.
    Serve(ServeArgs),
    /// Dispatch a single command and print its response.
    Call(CallArgs),
    /// List the commands the bridge binds.
    Commands,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    /// Id of the stdout surface on the relay.
    #[arg(long, default_value = "stdio")]
    pub surface_id: String,

    /// Buffered output lines before event delivery reports the surface full.
    #[arg(long, default_value_t = 1024)]
    pub output_capacity: usize,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            surface_id: "stdio".to_string(),
            output_capacity: 1024,
        }
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CallArgs {
    /// Command name, e.g. `get-status`.
    pub command: String,

    /// Command arguments as a JSON object.
    #[arg(long)]
    pub args: Option<String>,

    #[arg(long)]
    pub pretty: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_call() {
        let args = Args::parse_from([
            "syncbridge",
            "--data-dir",
            "/tmp/d",
            "call",
            "resolve-conflict",
            "--args",
            r#"{"conflictId":"conflict_1","resolution":"local"}"#,
        ]);
        assert_eq!(args.data_dir.as_deref(), Some("/tmp/d"));
        match args.command {
            Some(Commands::Call(call)) => {
                assert_eq!(call.command, "resolve-conflict");
                assert!(call.args.unwrap().contains("conflict_1"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_serve_is_optional() {
        let args = Args::parse_from(["syncbridge"]);
        assert!(args.command.is_none());
        let args = Args::parse_from(["syncbridge", "serve", "--surface-id", "desk"]);
        match args.command {
            Some(Commands::Serve(s)) => assert_eq!(s.surface_id, "desk"),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
