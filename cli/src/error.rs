use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid arguments: {0}")]
    Args(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("startup failed: {0:#}")]
    Startup(anyhow::Error),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    // 0: success
    // 1: command dispatched but reported failure (`call`)
    // 11: config / usage error
    // 20: startup / IO error
    // 50: internal/uncategorized
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Args(_) => 11,
            CliError::Io(_) | CliError::Startup(_) => 20,
            CliError::Anyhow(_) => 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Config("bad".into()).exit_code(), 11);
        assert_eq!(CliError::Args("bad".into()).exit_code(), 11);
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert_eq!(CliError::from(io).exit_code(), 20);
        assert_eq!(CliError::Startup(anyhow::anyhow!("no dir")).exit_code(), 20);
        assert_eq!(CliError::from(anyhow::anyhow!("?")).exit_code(), 50);
    }
}
