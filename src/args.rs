use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use crate::constants::TOKEN_TTL_SECS;

#[derive(Parser, Debug)]
#[command(version, about = "Salon booking and loyalty API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the HTTP API (the default)
    Serve,

    /// Print a bearer token for a user or employee, signed with AUTH_TOKEN_SECRET
    IssueToken {
        #[arg(long, value_enum)]
        kind: SubjectKind,

        #[arg(long)]
        id: Uuid,

        /// Token lifetime in seconds
        #[arg(long, default_value_t = TOKEN_TTL_SECS)]
        ttl_secs: i64,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    User,
    Employee,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_issue_token() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "salonbook-server",
            "issue-token",
            "--kind",
            "employee",
            "--id",
            &id.to_string(),
        ])
        .unwrap();

        assert_eq!(
            cli.command,
            Some(Command::IssueToken {
                kind: SubjectKind::Employee,
                id,
                ttl_secs: TOKEN_TTL_SECS,
            })
        );
    }

    #[test]
    fn test_no_subcommand_serves() {
        let cli = Cli::try_parse_from(["salonbook-server"]).unwrap();
        assert!(cli.command.is_none());
    }
}
