use crate::exec::ContainerExec;
use crate::sql::{format_command, ContainerExecSpec, DatabaseOp};
use crate::RuntimeError;
use stackyard_schema::ContainerName;
use std::sync::Arc;
use tracing::{debug, info};

/// Creates and drops database resources inside a provider container.
#[derive(Clone)]
pub struct ResourceProvisioner {
    exec: Arc<dyn ContainerExec>,
}

impl ResourceProvisioner {
    pub fn new(exec: Arc<dyn ContainerExec>) -> Self {
        Self { exec }
    }

    /// Run the `op` command for `engine` inside `container`.
    ///
    /// Returns `Ok(None)` without touching the container when the engine has
    /// no provisioning command.
    pub fn provision(
        &self,
        engine: &str,
        op: DatabaseOp,
        container: &ContainerName,
        spec: &ContainerExecSpec,
    ) -> Result<Option<String>, RuntimeError> {
        let command = format_command(engine, op, spec);
        if command.is_empty() {
            debug!("no {op} command for engine '{engine}', skipping");
            return Ok(None);
        }
        debug!(
            "{op} database '{}' in container {container} via {}",
            spec.db_name,
            self.exec.name()
        );
        let output = self.exec.exec(container, &command)?;
        info!("{op} database '{}' in {container}", spec.db_name);
        Ok(Some(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockExec;
    use crate::sql::MYSQL_ENGINE;

    fn spec() -> ContainerExecSpec {
        ContainerExecSpec {
            root_password: "rootpw".to_owned(),
            db_user: "wp".to_owned(),
            db_name: "wpdb".to_owned(),
            password: "secret".to_owned(),
        }
    }

    #[test]
    fn mysql_create_runs_in_provider_container() {
        let exec = Arc::new(MockExec::new());
        let p = ResourceProvisioner::new(exec.clone());
        let out = p
            .provision(
                MYSQL_ENGINE,
                DatabaseOp::Create,
                &ContainerName::new("1Panel-mysql-ab12"),
                &spec(),
            )
            .unwrap();
        assert!(out.is_some());
        let calls = exec.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].container, "1Panel-mysql-ab12");
        assert!(calls[0].command.contains("CREATE DATABASE wpdb"));
    }

    #[test]
    fn unknown_engine_is_skipped() {
        let exec = Arc::new(MockExec::new());
        let p = ResourceProvisioner::new(exec.clone());
        let out = p
            .provision("redis", DatabaseOp::Create, &ContainerName::new("r"), &spec())
            .unwrap();
        assert!(out.is_none());
        assert!(exec.calls().is_empty());
    }

    #[test]
    fn exec_failure_propagates_raw_output() {
        let exec = Arc::new(MockExec::new());
        exec.fail_with(Some("ERROR 1007 (HY000): database exists"));
        let p = ResourceProvisioner::new(exec);
        let err = p
            .provision(MYSQL_ENGINE, DatabaseOp::Create, &ContainerName::new("m"), &spec())
            .unwrap_err();
        assert_eq!(err.to_string(), "ERROR 1007 (HY000): database exists");
    }
}
