//! Engine-specific provisioning commands.
//!
//! Commands are plain shell text executed inside the provider container.
//! Every user-supplied value is single-quoted for the shell and escaped for
//! SQL string literals.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const MYSQL_ENGINE: &str = "mysql";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DatabaseOp {
    Create,
    Delete,
}

impl fmt::Display for DatabaseOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseOp::Create => write!(f, "create"),
            DatabaseOp::Delete => write!(f, "delete"),
        }
    }
}

/// Everything a provisioning command needs: the provider's root password
/// and the database being created or dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerExecSpec {
    pub root_password: String,
    pub db_user: String,
    pub db_name: String,
    pub password: String,
}

pub fn is_database_engine(engine: &str) -> bool {
    engine == MYSQL_ENGINE
}

/// Build the command text for `op` on `engine`. Unknown engines yield an
/// empty string, meaning there is nothing to run.
pub fn format_command(engine: &str, op: DatabaseOp, spec: &ContainerExecSpec) -> String {
    match engine {
        MYSQL_ENGINE => mysql_command(op, spec),
        _ => String::new(),
    }
}

fn mysql_command(op: DatabaseOp, spec: &ContainerExecSpec) -> String {
    let user = sql_literal(&spec.db_user);
    let db = &spec.db_name;
    let statements = match op {
        DatabaseOp::Create => vec![
            format!(
                "CREATE USER {user}@'%' IDENTIFIED BY {};",
                sql_literal(&spec.password)
            ),
            format!("CREATE DATABASE {db};"),
            format!("GRANT ALL ON {db}.* TO {user}@'%';"),
        ],
        DatabaseOp::Delete => vec![
            format!("DROP DATABASE IF EXISTS {db};"),
            format!("DROP USER IF EXISTS {user}@'%';"),
        ],
    };

    let mut cmd = format!("mysql -uroot -p{}", shell_quote(&spec.root_password));
    for statement in &statements {
        cmd.push_str(" -e ");
        cmd.push_str(&shell_quote(statement));
    }
    cmd
}

fn sql_literal(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

pub(crate) fn shell_quote(s: &str) -> String {
    // Single-quoting in POSIX shell: replace ' with '\'' then wrap in '
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ContainerExecSpec {
        ContainerExecSpec {
            root_password: "rootpw".to_owned(),
            db_user: "u".to_owned(),
            db_name: "d".to_owned(),
            password: "p".to_owned(),
        }
    }

    #[test]
    fn mysql_create_has_user_db_and_grant() {
        let cmd = format_command("mysql", DatabaseOp::Create, &spec());
        assert!(cmd.starts_with("mysql -uroot -p'rootpw'"));
        let user = cmd.find("CREATE USER").unwrap();
        let db = cmd.find("CREATE DATABASE d;").unwrap();
        let grant = cmd.find("GRANT ALL ON d.*").unwrap();
        assert!(user < db && db < grant);
        assert_eq!(cmd.matches(" -e ").count(), 3);
        assert!(cmd.contains("IDENTIFIED BY"));
    }

    #[test]
    fn mysql_delete_drops_db_then_user() {
        let cmd = format_command("mysql", DatabaseOp::Delete, &spec());
        let db = cmd.find("DROP DATABASE IF EXISTS d;").unwrap();
        let user = cmd.find("DROP USER IF EXISTS").unwrap();
        assert!(db < user);
        assert_eq!(cmd.matches(" -e ").count(), 2);
        assert!(cmd.starts_with("mysql -uroot -p'rootpw'"));
    }

    #[test]
    fn unknown_engine_yields_empty_command() {
        assert!(format_command("postgres", DatabaseOp::Create, &spec()).is_empty());
        assert!(format_command("", DatabaseOp::Delete, &spec()).is_empty());
    }

    #[test]
    fn password_quotes_are_escaped() {
        let mut s = spec();
        s.password = "it's".to_owned();
        let cmd = format_command("mysql", DatabaseOp::Create, &s);
        // SQL doubles the quote, then the shell wraps the whole statement.
        assert!(cmd.contains("it'\\'''\\''s"));
    }

    #[test]
    fn shell_quote_prevents_injection() {
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn database_engines() {
        assert!(is_database_engine("mysql"));
        assert!(!is_database_engine("redis"));
    }
}
