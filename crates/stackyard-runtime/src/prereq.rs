use std::fmt;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn succeeds(bin: &str, args: &[&str]) -> bool {
    Command::new(bin)
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check what the docker backends need. An empty list means everything is in place.
pub fn check_docker_prereqs(docker_bin: &str) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !succeeds(docker_bin, &["--version"]) {
        missing.push(MissingPrereq {
            name: "docker",
            purpose: "running application containers",
            install_hint: "apt install docker.io | dnf install moby-engine | pacman -S docker",
        });
        return missing;
    }

    if !succeeds(docker_bin, &["compose", "version"]) {
        missing.push(MissingPrereq {
            name: "docker compose",
            purpose: "bringing application stacks up and down",
            install_hint: "apt install docker-compose-plugin | dnf install docker-compose",
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nStackyard needs these tools to install and link applications.");
    msg
}
